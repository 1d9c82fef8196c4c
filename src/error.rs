//! Error kinds shared across the solver
//!
//! Input and I/O problems abort before any walker starts; work-file damage is
//! reported as `WorkFileCorrupt`; device failures as `Resource`. `Logic`
//! covers conditions that are reported but survivable (an unresolvable
//! cross-herd collision).

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("input error: {0}")]
    Input(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("work file corrupt: {0}")]
    WorkFileCorrupt(String),

    #[error("resource error: {0}")]
    Resource(String),

    #[error("logic error: {0}")]
    Logic(String),
}

pub type Result<T> = std::result::Result<T, Error>;

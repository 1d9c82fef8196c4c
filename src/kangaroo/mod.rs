//! Kangaroo engine: jump table, herds, walkers, collision resolution and the
//! search coordinator.

pub mod collision;
pub mod context;
pub mod coordinator;
pub mod herd;
pub mod jumps;
pub mod stepper;

pub use context::{init_search_key, KeyContext, SearchParams};
pub use coordinator::{Coordinator, KeyOutcome};
pub use jumps::{JumpTable, JUMP_SEED, NB_JUMP};
pub use stepper::{CpuStepper, Stepper};

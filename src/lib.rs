//! Pollard kangaroo interval-ECDLP solver for secp256k1
//!
//! Solves a single secp256k1 public key whose private scalar lies in a known
//! interval, using tame/wild random walks with distinguished-point collision
//! detection, parallel CPU workers, optional device offload, and resumable
//! on-disk work files.

pub mod check;
pub mod checkpoint;
pub mod config;
pub mod dp;
pub mod error;
pub mod gpu;
pub mod kangaroo;
pub mod math;
pub mod types;
pub mod workfile;

pub use error::{Error, Result};
pub use kangaroo::{Coordinator, KeyOutcome, SearchParams};
pub use math::{BigInt256, FieldElement, Secp256k1};
pub use types::{HerdKind, Point, Solution};

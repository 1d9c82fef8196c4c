//! Big-integer and secp256k1 arithmetic

pub mod bigint;
pub mod field;
pub mod secp;

pub use bigint::BigInt256;
pub use field::FieldElement;
pub use secp::Secp256k1;

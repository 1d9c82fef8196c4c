//! Shared types for the kangaroo solver
//!
//! Affine curve points, kangaroo state, herd classification, DP hits and
//! solutions. Group operations live in `math::secp`.

use std::fmt;

use crate::math::bigint::BigInt256;
use crate::math::field::FieldElement;

/// Affine secp256k1 point. Walk points are always finite; infinity only
/// appears transiently (degenerate ranges, translated keys).
#[derive(Debug, Clone, Copy)]
pub struct Point {
    pub x: FieldElement,
    pub y: FieldElement,
    pub infinity: bool,
}

impl Point {
    pub const INFINITY: Self = Point {
        x: FieldElement::ZERO,
        y: FieldElement::ZERO,
        infinity: true,
    };

    pub fn new(x: FieldElement, y: FieldElement) -> Self {
        Point { x, y, infinity: false }
    }

    pub fn is_infinity(&self) -> bool {
        self.infinity
    }
}

impl PartialEq for Point {
    fn eq(&self, other: &Self) -> bool {
        if self.infinity || other.infinity {
            return self.infinity && other.infinity;
        }
        self.x == other.x && self.y == other.y
    }
}

impl Eq for Point {}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.infinity {
            write!(f, "Infinity")
        } else {
            write!(f, "({}, {})", self.x.to_bigint().to_hex_padded(), self.y.to_bigint().to_hex_padded())
        }
    }
}

/// Which herd a kangaroo belongs to. Tame kangaroos sit at d·G, wild ones at
/// K + d·G for the translated search key K.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HerdKind {
    Tame = 0,
    Wild = 1,
}

impl HerdKind {
    /// Herd membership alternates with kangaroo index.
    pub fn from_index(index: u64, first: HerdKind) -> Self {
        if (index + first as u64) & 1 == HerdKind::Wild as u64 {
            HerdKind::Wild
        } else {
            HerdKind::Tame
        }
    }

    pub fn from_bit(bit: u64) -> Self {
        if bit & 1 == 1 {
            HerdKind::Wild
        } else {
            HerdKind::Tame
        }
    }
}

impl fmt::Display for HerdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HerdKind::Tame => write!(f, "tame"),
            HerdKind::Wild => write!(f, "wild"),
        }
    }
}

/// One walker: affine position, signed travelled distance (mod n) and, for
/// the symmetry variant, the current equivalence class and last jump index.
#[derive(Debug, Clone)]
pub struct Kangaroo {
    pub x: FieldElement,
    pub y: FieldElement,
    pub d: BigInt256,
    pub sym_class: u8,
    pub last_jump: u8,
}

impl Kangaroo {
    pub const NO_JUMP: u8 = u8::MAX;

    pub fn new(x: FieldElement, y: FieldElement, d: BigInt256) -> Self {
        Kangaroo { x, y, d, sym_class: 0, last_jump: Self::NO_JUMP }
    }
}

/// Raw kangaroo state as it appears in work files and device transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KangarooState {
    pub x: BigInt256,
    pub y: BigInt256,
    pub d: BigInt256,
}

/// A distinguished point produced by a walker pass.
#[derive(Debug, Clone)]
pub struct DpHit {
    pub x: FieldElement,
    pub d: BigInt256,
    pub kangaroo_index: u64,
}

/// A solved key.
#[derive(Debug, Clone)]
pub struct Solution {
    /// Recovered private scalar, absolute (range undone).
    pub private_key: BigInt256,
    /// The public key that was searched.
    pub public_key: Point,
    /// 'N' when the key matched directly, 'S' via the symmetric image.
    pub sign_info: char,
    /// Which of the four sign candidates resolved the collision.
    pub candidate: u8,
}

/// Search interval derived quantities.
#[derive(Debug, Clone)]
pub struct RangeInfo {
    pub start: BigInt256,
    pub end: BigInt256,
    pub width: BigInt256,
    pub width_div2: BigInt256,
    pub width_div4: BigInt256,
    pub width_div8: BigInt256,
    /// Bit length of the width.
    pub power: usize,
}

impl RangeInfo {
    pub fn new(start: BigInt256, end: BigInt256) -> Self {
        let width = end.wrapping_sub(&start);
        let width_div2 = width.shr(1);
        let width_div4 = width.shr(2);
        let width_div8 = width.shr(3);
        let power = width.bit_length();
        RangeInfo { start, end, width, width_div2, width_div4, width_div8, power }
    }
}

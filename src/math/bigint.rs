//! 256-bit integer helpers
//!
//! Plain unsigned 256-bit arithmetic on 4 little-endian u64 limbs. Modular
//! arithmetic lives in `field` (mod p) and `secp` (mod n); this type is the
//! raw integer used for distances, ranges and file serialization.

use std::cmp::Ordering;
use std::fmt;

use num_bigint::BigUint;

use crate::error::Error;

/// 256-bit unsigned integer, limbs in little-endian order (limb 0 least
/// significant).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BigInt256 {
    pub limbs: [u64; 4],
}

impl BigInt256 {
    pub const ZERO: Self = BigInt256 { limbs: [0; 4] };
    pub const ONE: Self = BigInt256 { limbs: [1, 0, 0, 0] };

    pub fn zero() -> Self {
        Self::ZERO
    }

    pub fn one() -> Self {
        Self::ONE
    }

    pub fn from_u64(x: u64) -> Self {
        BigInt256 { limbs: [x, 0, 0, 0] }
    }

    pub fn from_u128(x: u128) -> Self {
        BigInt256 { limbs: [x as u64, (x >> 64) as u64, 0, 0] }
    }

    pub fn from_limbs(limbs: [u64; 4]) -> Self {
        BigInt256 { limbs }
    }

    /// Parse a hex string (optional 0x prefix, up to 64 digits, shorter
    /// strings are zero-extended).
    pub fn from_hex(s: &str) -> Result<Self, Error> {
        let s = s.trim().trim_start_matches("0x").trim_start_matches("0X");
        if s.is_empty() || s.len() > 64 {
            return Err(Error::Input(format!("invalid 256-bit hex value: {s:?}")));
        }
        let padded = format!("{s:0>64}");
        let bytes = hex::decode(&padded)
            .map_err(|e| Error::Input(format!("invalid hex value {s:?}: {e}")))?;
        let mut be = [0u8; 32];
        be.copy_from_slice(&bytes);
        Ok(Self::from_bytes_be(&be))
    }

    /// Parse a decimal string.
    pub fn from_dec(s: &str) -> Result<Self, Error> {
        let v: BigUint = s
            .trim()
            .parse()
            .map_err(|e| Error::Input(format!("invalid decimal value {s:?}: {e}")))?;
        let bytes = v.to_bytes_le();
        if bytes.len() > 32 {
            return Err(Error::Input(format!("decimal value {s:?} exceeds 256 bits")));
        }
        let mut le = [0u8; 32];
        le[..bytes.len()].copy_from_slice(&bytes);
        Ok(Self::from_bytes_le(&le))
    }

    pub fn from_bytes_be(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for i in 0..4 {
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[(3 - i) * 8..(4 - i) * 8]);
            limbs[i] = u64::from_be_bytes(chunk);
        }
        BigInt256 { limbs }
    }

    pub fn from_bytes_le(bytes: &[u8; 32]) -> Self {
        let mut limbs = [0u64; 4];
        for i in 0..4 {
            let mut chunk = [0u8; 8];
            chunk.copy_from_slice(&bytes[i * 8..(i + 1) * 8]);
            limbs[i] = u64::from_le_bytes(chunk);
        }
        BigInt256 { limbs }
    }

    pub fn to_bytes_be(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for i in 0..4 {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&self.limbs[3 - i].to_be_bytes());
        }
        bytes
    }

    pub fn to_bytes_le(&self) -> [u8; 32] {
        let mut bytes = [0u8; 32];
        for i in 0..4 {
            bytes[i * 8..(i + 1) * 8].copy_from_slice(&self.limbs[i].to_le_bytes());
        }
        bytes
    }

    /// Hex without leading zeros (at least one digit), lowercase.
    pub fn to_hex(&self) -> String {
        format!("{:x}", BigUint::from_bytes_le(&self.to_bytes_le()))
    }

    /// Fixed-width 64-digit hex, lowercase.
    pub fn to_hex_padded(&self) -> String {
        format!(
            "{:016x}{:016x}{:016x}{:016x}",
            self.limbs[3], self.limbs[2], self.limbs[1], self.limbs[0]
        )
    }

    pub fn is_zero(&self) -> bool {
        self.limbs == [0; 4]
    }

    pub fn is_even(&self) -> bool {
        self.limbs[0] & 1 == 0
    }

    pub fn low_u64(&self) -> u64 {
        self.limbs[0]
    }

    pub fn low_u128(&self) -> u128 {
        self.limbs[0] as u128 | (self.limbs[1] as u128) << 64
    }

    pub fn get_bit(&self, bit: usize) -> bool {
        if bit >= 256 {
            return false;
        }
        (self.limbs[bit / 64] >> (bit % 64)) & 1 == 1
    }

    /// Number of significant bits (0 for zero).
    pub fn bit_length(&self) -> usize {
        for i in (0..4).rev() {
            if self.limbs[i] != 0 {
                return 64 * (i + 1) - self.limbs[i].leading_zeros() as usize;
            }
        }
        0
    }

    pub fn overflowing_add(&self, other: &Self) -> (Self, bool) {
        let mut r = [0u64; 4];
        let mut carry = 0u64;
        for i in 0..4 {
            let (s1, c1) = self.limbs[i].overflowing_add(other.limbs[i]);
            let (s2, c2) = s1.overflowing_add(carry);
            r[i] = s2;
            carry = (c1 as u64) + (c2 as u64);
        }
        (BigInt256 { limbs: r }, carry != 0)
    }

    pub fn wrapping_add(&self, other: &Self) -> Self {
        self.overflowing_add(other).0
    }

    pub fn overflowing_sub(&self, other: &Self) -> (Self, bool) {
        let mut r = [0u64; 4];
        let mut borrow = 0u64;
        for i in 0..4 {
            let (d1, b1) = self.limbs[i].overflowing_sub(other.limbs[i]);
            let (d2, b2) = d1.overflowing_sub(borrow);
            r[i] = d2;
            borrow = (b1 as u64) + (b2 as u64);
        }
        (BigInt256 { limbs: r }, borrow != 0)
    }

    pub fn wrapping_sub(&self, other: &Self) -> Self {
        self.overflowing_sub(other).0
    }

    /// Full 512-bit schoolbook product.
    pub fn mul_wide(&self, other: &Self) -> [u64; 8] {
        let mut t = [0u64; 8];
        for i in 0..4 {
            let mut carry = 0u128;
            for j in 0..4 {
                let acc = (self.limbs[i] as u128) * (other.limbs[j] as u128)
                    + t[i + j] as u128
                    + carry;
                t[i + j] = acc as u64;
                carry = acc >> 64;
            }
            t[i + 4] = carry as u64;
        }
        t
    }

    /// Low 256 bits of the product; only valid when the true product fits.
    pub fn mul_low(&self, other: &Self) -> Self {
        let t = self.mul_wide(other);
        BigInt256 { limbs: [t[0], t[1], t[2], t[3]] }
    }

    pub fn shl(&self, n: usize) -> Self {
        if n >= 256 {
            return Self::ZERO;
        }
        let limb_shift = n / 64;
        let bit_shift = n % 64;
        let mut r = [0u64; 4];
        for i in (limb_shift..4).rev() {
            let src = i - limb_shift;
            r[i] = self.limbs[src] << bit_shift;
            if bit_shift > 0 && src > 0 {
                r[i] |= self.limbs[src - 1] >> (64 - bit_shift);
            }
        }
        BigInt256 { limbs: r }
    }

    pub fn shr(&self, n: usize) -> Self {
        if n >= 256 {
            return Self::ZERO;
        }
        let limb_shift = n / 64;
        let bit_shift = n % 64;
        let mut r = [0u64; 4];
        for i in 0..4 - limb_shift {
            let src = i + limb_shift;
            r[i] = self.limbs[src] >> bit_shift;
            if bit_shift > 0 && src + 1 < 4 {
                r[i] |= self.limbs[src + 1] << (64 - bit_shift);
            }
        }
        BigInt256 { limbs: r }
    }

    /// Approximate conversion to f64 (exact below 2^53).
    pub fn to_f64(&self) -> f64 {
        let mut acc = 0.0f64;
        for i in (0..4).rev() {
            acc = acc * 18446744073709551616.0 + self.limbs[i] as f64;
        }
        acc
    }
}

impl Ord for BigInt256 {
    fn cmp(&self, other: &Self) -> Ordering {
        for i in (0..4).rev() {
            match self.limbs[i].cmp(&other.limbs[i]) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for BigInt256 {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for BigInt256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex_padded())
    }
}

//! secp256k1 prime-field arithmetic
//!
//! p = 2^256 - 2^32 - 977. Reduction uses the special form of p: the high
//! 256 bits of a product fold back in as a multiply by 0x1000003D1.

use crate::math::bigint::BigInt256;

/// Field prime p, little-endian limbs.
pub const P: [u64; 4] = [
    0xFFFFFFFEFFFFFC2F,
    0xFFFFFFFFFFFFFFFF,
    0xFFFFFFFFFFFFFFFF,
    0xFFFFFFFFFFFFFFFF,
];

/// 2^256 mod p.
const FOLD: u64 = 0x1000003D1;

/// p - 2, exponent for Fermat inversion.
const P_MINUS_2: [u64; 4] = [
    0xFFFFFFFEFFFFFC2D,
    0xFFFFFFFFFFFFFFFF,
    0xFFFFFFFFFFFFFFFF,
    0xFFFFFFFFFFFFFFFF,
];

/// (p + 1) / 4, exponent for square roots (p ≡ 3 mod 4).
const SQRT_EXP: [u64; 4] = [
    0xFFFFFFFFBFFFFF0C,
    0xFFFFFFFFFFFFFFFF,
    0xFFFFFFFFFFFFFFFF,
    0x3FFFFFFFFFFFFFFF,
];

/// (p - 1) / 2, used to pick the canonical representative of (x, ±y).
const P_HALF: [u64; 4] = [
    0xFFFFFFFF7FFFFE17,
    0xFFFFFFFFFFFFFFFF,
    0xFFFFFFFFFFFFFFFF,
    0x7FFFFFFFFFFFFFFF,
];

/// Prime-field element, limbs in little-endian order, always reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FieldElement {
    pub d: [u64; 4],
}

impl FieldElement {
    pub const ZERO: Self = FieldElement { d: [0; 4] };
    pub const ONE: Self = FieldElement { d: [1, 0, 0, 0] };

    pub fn new(d: [u64; 4]) -> Self {
        FieldElement { d }
    }

    pub fn from_bigint(v: &BigInt256) -> Self {
        let mut fe = FieldElement { d: v.limbs };
        while fe.gte_p() {
            fe.sub_p();
        }
        fe
    }

    pub fn to_bigint(&self) -> BigInt256 {
        BigInt256::from_limbs(self.d)
    }

    pub fn from_bytes_be(bytes: &[u8; 32]) -> Self {
        Self::from_bigint(&BigInt256::from_bytes_be(bytes))
    }

    pub fn to_bytes_be(&self) -> [u8; 32] {
        self.to_bigint().to_bytes_be()
    }

    pub fn is_zero(&self) -> bool {
        self.d == [0; 4]
    }

    pub fn is_odd(&self) -> bool {
        self.d[0] & 1 == 1
    }

    /// True for the larger of y and p-y; the symmetry variant keeps walks on
    /// the smaller representative.
    pub fn is_upper_half(&self) -> bool {
        for i in (0..4).rev() {
            if self.d[i] > P_HALF[i] {
                return true;
            }
            if self.d[i] < P_HALF[i] {
                return false;
            }
        }
        false
    }

    pub fn add(&self, other: &Self) -> Self {
        let mut r = [0u64; 4];
        let mut carry = 0u64;
        for i in 0..4 {
            let (s1, c1) = self.d[i].overflowing_add(other.d[i]);
            let (s2, c2) = s1.overflowing_add(carry);
            r[i] = s2;
            carry = (c1 as u64) + (c2 as u64);
        }
        let mut result = FieldElement { d: r };
        if carry != 0 || result.gte_p() {
            result.sub_p();
        }
        result
    }

    pub fn sub(&self, other: &Self) -> Self {
        let mut r = [0u64; 4];
        let mut borrow = 0u64;
        for i in 0..4 {
            let (d1, b1) = self.d[i].overflowing_sub(other.d[i]);
            let (d2, b2) = d1.overflowing_sub(borrow);
            r[i] = d2;
            borrow = (b1 as u64) + (b2 as u64);
        }
        let mut result = FieldElement { d: r };
        if borrow != 0 {
            result.add_p();
        }
        result
    }

    pub fn neg(&self) -> Self {
        if self.is_zero() {
            return *self;
        }
        let mut r = [0u64; 4];
        let mut borrow = 0u64;
        for i in 0..4 {
            let (d1, b1) = P[i].overflowing_sub(self.d[i]);
            let (d2, b2) = d1.overflowing_sub(borrow);
            r[i] = d2;
            borrow = (b1 as u64) + (b2 as u64);
        }
        FieldElement { d: r }
    }

    pub fn mul(&self, other: &Self) -> Self {
        let mut t = [0u64; 8];
        for i in 0..4 {
            let mut carry = 0u128;
            for j in 0..4 {
                let acc =
                    (self.d[i] as u128) * (other.d[j] as u128) + t[i + j] as u128 + carry;
                t[i + j] = acc as u64;
                carry = acc >> 64;
            }
            t[i + 4] = carry as u64;
        }
        Self::reduce_512(&t)
    }

    pub fn sqr(&self) -> Self {
        self.mul(self)
    }

    pub fn mul_u64(&self, k: u64) -> Self {
        let mut t = [0u64; 8];
        let mut carry = 0u128;
        for i in 0..4 {
            let acc = (self.d[i] as u128) * (k as u128) + carry;
            t[i] = acc as u64;
            carry = acc >> 64;
        }
        t[4] = carry as u64;
        Self::reduce_512(&t)
    }

    /// Reduce a 512-bit value mod p by folding the high half.
    fn reduce_512(t: &[u64; 8]) -> Self {
        let mut low = [t[0], t[1], t[2], t[3]];
        let mut high = [t[4], t[5], t[6], t[7]];

        // low += high * FOLD, repeated until the overflow limb clears.
        loop {
            let mut carry = 0u128;
            let mut r = [0u64; 5];
            for i in 0..4 {
                let acc = (high[i] as u128) * (FOLD as u128) + low[i] as u128 + carry;
                r[i] = acc as u64;
                carry = acc >> 64;
            }
            r[4] = carry as u64;
            low = [r[0], r[1], r[2], r[3]];
            if r[4] == 0 {
                break;
            }
            high = [r[4], 0, 0, 0];
        }

        let mut result = FieldElement { d: low };
        while result.gte_p() {
            result.sub_p();
        }
        result
    }

    /// Square-and-multiply exponentiation with a fixed 256-bit exponent.
    fn pow_limbs(&self, exp: &[u64; 4]) -> Self {
        let mut result = Self::ONE;
        let mut base = *self;
        for limb in exp {
            let mut bits = *limb;
            for _ in 0..64 {
                if bits & 1 == 1 {
                    result = result.mul(&base);
                }
                base = base.sqr();
                bits >>= 1;
            }
        }
        result
    }

    /// Modular inverse by Fermat; zero maps to zero (callers guard).
    pub fn inv(&self) -> Self {
        self.pow_limbs(&P_MINUS_2)
    }

    /// Square root, if one exists.
    pub fn sqrt(&self) -> Option<Self> {
        let candidate = self.pow_limbs(&SQRT_EXP);
        if candidate.sqr() == *self {
            Some(candidate)
        } else {
            None
        }
    }

    fn gte_p(&self) -> bool {
        for i in (0..4).rev() {
            if self.d[i] > P[i] {
                return true;
            }
            if self.d[i] < P[i] {
                return false;
            }
        }
        true
    }

    fn sub_p(&mut self) {
        let mut borrow = 0u64;
        for i in 0..4 {
            let (d1, b1) = self.d[i].overflowing_sub(P[i]);
            let (d2, b2) = d1.overflowing_sub(borrow);
            self.d[i] = d2;
            borrow = (b1 as u64) + (b2 as u64);
        }
    }

    fn add_p(&mut self) {
        let mut carry = 0u64;
        for i in 0..4 {
            let (s1, c1) = self.d[i].overflowing_add(P[i]);
            let (s2, c2) = s1.overflowing_add(carry);
            self.d[i] = s2;
            carry = (c1 as u64) + (c2 as u64);
        }
    }
}

/// Batch modular inverse (Montgomery's trick): one field inversion plus
/// 3(n-1) multiplications, in place. Inputs must be non-zero.
pub fn batch_inverse(vals: &mut [FieldElement]) {
    let n = vals.len();
    if n == 0 {
        return;
    }
    if n == 1 {
        vals[0] = vals[0].inv();
        return;
    }

    // Prefix products: prefix[i] = vals[0] * ... * vals[i]
    let mut prefix = Vec::with_capacity(n);
    let mut acc = vals[0];
    prefix.push(acc);
    for v in vals.iter().skip(1) {
        acc = acc.mul(v);
        prefix.push(acc);
    }

    let mut inv_all = prefix[n - 1].inv();
    for i in (1..n).rev() {
        let inv_i = inv_all.mul(&prefix[i - 1]);
        inv_all = inv_all.mul(&vals[i]);
        vals[i] = inv_i;
    }
    vals[0] = inv_all;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fe(x: u64) -> FieldElement {
        FieldElement::new([x, 0, 0, 0])
    }

    #[test]
    fn small_arithmetic() {
        assert_eq!(fe(2).add(&fe(3)), fe(5));
        assert_eq!(fe(5).sub(&fe(3)), fe(2));
        assert_eq!(fe(2).mul(&fe(3)), fe(6));
        assert_eq!(fe(7).sqr(), fe(49));
    }

    #[test]
    fn wraparound() {
        let p_minus_1 = FieldElement::new([P[0] - 1, P[1], P[2], P[3]]);
        assert_eq!(p_minus_1.add(&fe(1)), FieldElement::ZERO);
        assert_eq!(fe(0).sub(&fe(1)), p_minus_1);
        assert_eq!(p_minus_1.neg(), fe(1));
        // (p-1)^2 = p^2 - 2p + 1 ≡ 1
        assert_eq!(p_minus_1.sqr(), FieldElement::ONE);
    }

    #[test]
    fn inverse() {
        for k in [2u64, 3, 7, 65537, 0xDEADBEEF] {
            let a = fe(k);
            assert_eq!(a.mul(&a.inv()), FieldElement::ONE);
        }
    }

    #[test]
    fn sqrt_of_square() {
        let a = fe(0x1234_5678_9ABC_DEF1);
        let s = a.sqr();
        let r = s.sqrt().expect("square must have a root");
        assert!(r == a || r == a.neg());
    }

    #[test]
    fn sqrt_of_non_residue() {
        // 5 generates both residues and non-residues; 2*G.x style probing is
        // overkill, just find one by checking the Euler criterion via sqrt.
        let mut found_none = false;
        for k in 2u64..20 {
            if fe(k).sqrt().is_none() {
                found_none = true;
                break;
            }
        }
        assert!(found_none);
    }

    #[test]
    fn batch_inverse_matches_single() {
        let mut vals: Vec<FieldElement> =
            [3u64, 5, 17, 0xFFFF_FFFF, 12345].iter().map(|&k| fe(k)).collect();
        let expected: Vec<FieldElement> = vals.iter().map(|v| v.inv()).collect();
        batch_inverse(&mut vals);
        assert_eq!(vals, expected);
    }

    #[test]
    fn upper_half_split() {
        assert!(!fe(1).is_upper_half());
        let p_minus_1 = FieldElement::new([P[0] - 1, P[1], P[2], P[3]]);
        assert!(p_minus_1.is_upper_half());
        let half = FieldElement::new(super::P_HALF);
        assert!(!half.is_upper_half());
        assert!(half.add(&fe(1)).is_upper_half());
    }
}

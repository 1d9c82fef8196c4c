//! secp256k1 group operations
//!
//! Affine arithmetic for the walker, Jacobian internals for scalar
//! multiplication, batched start-point computation, order (mod n) helpers and
//! public key parsing.

use rand::RngCore;
use rayon::prelude::*;

use crate::error::Error;
use crate::math::bigint::BigInt256;
use crate::math::field::{batch_inverse, FieldElement};
use crate::types::Point;

/// Group order n.
pub const N: [u64; 4] = [
    0xBFD25E8CD0364141,
    0xBAAEDCE6AF48A03B,
    0xFFFFFFFFFFFFFFFE,
    0xFFFFFFFFFFFFFFFF,
];

/// Generator point G.
const G: Point = Point {
    x: FieldElement {
        d: [
            0x59F2815B16F81798,
            0x029BFCDB2DCE28D9,
            0x55A06295CE870B07,
            0x79BE667EF9DCBBAC,
        ],
    },
    y: FieldElement {
        d: [
            0x9C47D08FFB10D4B8,
            0xFD17B448A6855419,
            0x5DA4FBFC0E1108A8,
            0x483ADA7726A3C465,
        ],
    },
    infinity: false,
};

/// Jacobian point, internal to scalar multiplication. z = 0 encodes infinity.
#[derive(Debug, Clone, Copy)]
struct JacobianPoint {
    x: FieldElement,
    y: FieldElement,
    z: FieldElement,
}

impl JacobianPoint {
    const INFINITY: Self = JacobianPoint {
        x: FieldElement::ONE,
        y: FieldElement::ONE,
        z: FieldElement::ZERO,
    };

    fn is_infinity(&self) -> bool {
        self.z.is_zero()
    }

    fn from_affine(p: &Point) -> Self {
        if p.infinity {
            Self::INFINITY
        } else {
            JacobianPoint { x: p.x, y: p.y, z: FieldElement::ONE }
        }
    }
}

/// secp256k1 curve context: moduli, generator and the operations on them.
#[derive(Debug, Clone)]
pub struct Secp256k1 {
    pub p: BigInt256,
    pub n: BigInt256,
    pub half_n: BigInt256,
    pub g: Point,
}

impl Secp256k1 {
    pub fn new() -> Self {
        let p = BigInt256::from_limbs(crate::math::field::P);
        let n = BigInt256::from_limbs(N);
        Secp256k1 { p, n, half_n: n.shr(1), g: G }
    }

    // ---- order arithmetic (inputs reduced mod n) -------------------------

    pub fn order_add(&self, a: &BigInt256, b: &BigInt256) -> BigInt256 {
        let (sum, carry) = a.overflowing_add(b);
        if carry || sum >= self.n {
            sum.wrapping_sub(&self.n)
        } else {
            sum
        }
    }

    pub fn order_sub(&self, a: &BigInt256, b: &BigInt256) -> BigInt256 {
        let (diff, borrow) = a.overflowing_sub(b);
        if borrow {
            diff.wrapping_add(&self.n)
        } else {
            diff
        }
    }

    pub fn order_neg(&self, a: &BigInt256) -> BigInt256 {
        if a.is_zero() {
            BigInt256::ZERO
        } else {
            self.n.wrapping_sub(a)
        }
    }

    /// Reduce an arbitrary 256-bit value mod n (at most a handful of
    /// subtractions for the values this solver produces).
    pub fn order_reduce(&self, a: &BigInt256) -> BigInt256 {
        let mut v = *a;
        while v >= self.n {
            v = v.wrapping_sub(&self.n);
        }
        v
    }

    /// Uniform draw from [0, 2^bits).
    pub fn rand_scalar_bits<R: RngCore>(&self, rng: &mut R, bits: usize) -> BigInt256 {
        debug_assert!(bits <= 256);
        if bits == 0 {
            return BigInt256::ZERO;
        }
        let mut bytes = [0u8; 32];
        rng.fill_bytes(&mut bytes);
        let mut v = BigInt256::from_bytes_le(&bytes);
        // Clear everything at and above `bits`.
        for limb in (bits + 63) / 64..4 {
            v.limbs[limb] = 0;
        }
        if bits % 64 != 0 {
            v.limbs[(bits - 1) / 64] &= u64::MAX >> (64 - bits % 64);
        }
        v
    }

    // ---- affine group law ------------------------------------------------

    pub fn negate_point(&self, p: &Point) -> Point {
        if p.infinity {
            Point::INFINITY
        } else {
            Point::new(p.x, p.y.neg())
        }
    }

    pub fn add_affine(&self, p: &Point, q: &Point) -> Point {
        if p.infinity {
            return *q;
        }
        if q.infinity {
            return *p;
        }
        if p.x == q.x {
            if p.y == q.y {
                return self.double_affine(p);
            }
            return Point::INFINITY;
        }
        let dy = q.y.sub(&p.y);
        let dx_inv = q.x.sub(&p.x).inv();
        let s = dy.mul(&dx_inv);
        let x3 = s.sqr().sub(&p.x).sub(&q.x);
        let y3 = s.mul(&p.x.sub(&x3)).sub(&p.y);
        Point::new(x3, y3)
    }

    pub fn double_affine(&self, p: &Point) -> Point {
        if p.infinity || p.y.is_zero() {
            return Point::INFINITY;
        }
        let x_sq = p.x.sqr();
        let num = x_sq.add(&x_sq).add(&x_sq);
        let s = num.mul(&p.y.add(&p.y).inv());
        let x3 = s.sqr().sub(&p.x).sub(&p.x);
        let y3 = s.mul(&p.x.sub(&x3)).sub(&p.y);
        Point::new(x3, y3)
    }

    /// y² = x³ + 7 check; infinity counts as on-curve.
    pub fn is_on_curve(&self, p: &Point) -> bool {
        if p.infinity {
            return true;
        }
        let rhs = p.x.sqr().mul(&p.x).add(&FieldElement::new([7, 0, 0, 0]));
        p.y.sqr() == rhs
    }

    // ---- Jacobian internals ---------------------------------------------

    fn j_double(&self, p: &JacobianPoint) -> JacobianPoint {
        if p.is_infinity() || p.y.is_zero() {
            return JacobianPoint::INFINITY;
        }
        let a = p.x.sqr();
        let b = p.y.sqr();
        let c = b.sqr();
        let mut d = p.x.add(&b).sqr().sub(&a).sub(&c);
        d = d.add(&d);
        let e = a.add(&a).add(&a);
        let f = e.sqr();
        let x3 = f.sub(&d.add(&d));
        let c8 = c.mul_u64(8);
        let y3 = e.mul(&d.sub(&x3)).sub(&c8);
        let z3 = p.y.mul(&p.z).mul_u64(2);
        JacobianPoint { x: x3, y: y3, z: z3 }
    }

    /// Mixed addition: Jacobian p + affine q.
    fn j_add_affine(&self, p: &JacobianPoint, q: &Point) -> JacobianPoint {
        if q.infinity {
            return *p;
        }
        if p.is_infinity() {
            return JacobianPoint::from_affine(q);
        }
        let z1z1 = p.z.sqr();
        let u2 = q.x.mul(&z1z1);
        let s2 = q.y.mul(&p.z).mul(&z1z1);
        let h = u2.sub(&p.x);
        let r = s2.sub(&p.y).mul_u64(2);
        if h.is_zero() {
            if s2 == p.y {
                return self.j_double(p);
            }
            return JacobianPoint::INFINITY;
        }
        let hh = h.sqr();
        let i = hh.mul_u64(4);
        let j = h.mul(&i);
        let v = p.x.mul(&i);
        let x3 = r.sqr().sub(&j).sub(&v.mul_u64(2));
        let y3 = r.mul(&v.sub(&x3)).sub(&p.y.mul(&j).mul_u64(2));
        let z3 = p.z.add(&h).sqr().sub(&z1z1).sub(&hh);
        JacobianPoint { x: x3, y: y3, z: z3 }
    }

    fn j_to_affine(&self, p: &JacobianPoint) -> Point {
        if p.is_infinity() {
            return Point::INFINITY;
        }
        let z_inv = p.z.inv();
        let z_inv2 = z_inv.sqr();
        Point::new(p.x.mul(&z_inv2), p.y.mul(&z_inv2).mul(&z_inv))
    }

    fn j_mul(&self, k: &BigInt256, base: &Point) -> JacobianPoint {
        let mut acc = JacobianPoint::INFINITY;
        let bits = k.bit_length();
        for bit in (0..bits).rev() {
            acc = self.j_double(&acc);
            if k.get_bit(bit) {
                acc = self.j_add_affine(&acc, base);
            }
        }
        acc
    }

    // ---- scalar multiplication ------------------------------------------

    pub fn mul(&self, k: &BigInt256, base: &Point) -> Point {
        if k.is_zero() || base.infinity {
            return Point::INFINITY;
        }
        self.j_to_affine(&self.j_mul(k, base))
    }

    pub fn mul_g(&self, k: &BigInt256) -> Point {
        self.mul(k, &self.g)
    }

    /// Batched d[j]·G with a single inversion for the normalisation pass.
    pub fn compute_public_keys(&self, scalars: &[BigInt256]) -> Vec<Point> {
        let jacobians: Vec<JacobianPoint> =
            scalars.par_iter().map(|k| self.j_mul(k, &self.g)).collect();
        self.batch_normalize(&jacobians)
    }

    fn batch_normalize(&self, points: &[JacobianPoint]) -> Vec<Point> {
        let mut zs: Vec<FieldElement> = Vec::with_capacity(points.len());
        for p in points {
            zs.push(if p.is_infinity() { FieldElement::ONE } else { p.z });
        }
        batch_inverse(&mut zs);
        points
            .iter()
            .zip(zs.iter())
            .map(|(p, z_inv)| {
                if p.is_infinity() {
                    Point::INFINITY
                } else {
                    let z_inv2 = z_inv.sqr();
                    Point::new(p.x.mul(&z_inv2), p.y.mul(&z_inv2).mul(z_inv))
                }
            })
            .collect()
    }

    /// Pairwise lhs[j] + rhs[j] with one shared inversion for the generic
    /// pairs; infinity and equal-x pairs are handled directly.
    pub fn add_direct(&self, lhs: &[Point], rhs: &[Point]) -> Vec<Point> {
        debug_assert_eq!(lhs.len(), rhs.len());
        let mut dx: Vec<FieldElement> = Vec::with_capacity(lhs.len());
        let mut generic: Vec<bool> = Vec::with_capacity(lhs.len());
        for (p, q) in lhs.iter().zip(rhs.iter()) {
            let is_generic = !p.infinity && !q.infinity && p.x != q.x;
            generic.push(is_generic);
            dx.push(if is_generic { q.x.sub(&p.x) } else { FieldElement::ONE });
        }
        batch_inverse(&mut dx);
        lhs.iter()
            .zip(rhs.iter())
            .zip(generic.iter().zip(dx.iter()))
            .map(|((p, q), (is_generic, dx_inv))| {
                if !*is_generic {
                    return self.add_affine(p, q);
                }
                let s = q.y.sub(&p.y).mul(dx_inv);
                let x3 = s.sqr().sub(&p.x).sub(&q.x);
                let y3 = s.mul(&p.x.sub(&x3)).sub(&p.y);
                Point::new(x3, y3)
            })
            .collect()
    }

    // ---- key encoding ----------------------------------------------------

    pub fn compress(&self, p: &Point) -> [u8; 33] {
        let mut out = [0u8; 33];
        out[0] = if p.y.is_odd() { 0x03 } else { 0x02 };
        out[1..].copy_from_slice(&p.x.to_bytes_be());
        out
    }

    pub fn public_key_hex(&self, p: &Point) -> String {
        hex::encode_upper(self.compress(p))
    }

    pub fn decompress(&self, x_bytes: &[u8; 32], odd: bool) -> Option<Point> {
        let x_int = BigInt256::from_bytes_be(x_bytes);
        if x_int >= self.p {
            return None;
        }
        let x = FieldElement::from_bigint(&x_int);
        let rhs = x.sqr().mul(&x).add(&FieldElement::new([7, 0, 0, 0]));
        let y = rhs.sqrt()?;
        let y = if y.is_odd() == odd { y } else { y.neg() };
        Some(Point::new(x, y))
    }

    /// Parse a compressed (02/03) or uncompressed (04) public key; rejects
    /// off-curve points.
    pub fn parse_public_key_hex(&self, s: &str) -> Result<Point, Error> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| Error::Input(format!("invalid public key hex {s:?}: {e}")))?;
        let point = match (bytes.len(), bytes.first()) {
            (33, Some(0x02)) | (33, Some(0x03)) => {
                let mut x = [0u8; 32];
                x.copy_from_slice(&bytes[1..]);
                self.decompress(&x, bytes[0] == 0x03)
                    .ok_or_else(|| Error::Input(format!("public key not on curve: {s}")))?
            }
            (65, Some(0x04)) => {
                let mut x = [0u8; 32];
                let mut y = [0u8; 32];
                x.copy_from_slice(&bytes[1..33]);
                y.copy_from_slice(&bytes[33..]);
                Point::new(FieldElement::from_bytes_be(&x), FieldElement::from_bytes_be(&y))
            }
            _ => {
                return Err(Error::Input(format!(
                    "invalid public key encoding (expect 02/03 + 32 bytes or 04 + 64 bytes): {s}"
                )))
            }
        };
        if !self.is_on_curve(&point) {
            return Err(Error::Input(format!("public key not on curve: {s}")));
        }
        Ok(point)
    }
}

impl Default for Secp256k1 {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::elliptic_curve::ops::MulByGenerator;
    use k256::elliptic_curve::sec1::ToEncodedPoint;
    use k256::elliptic_curve::PrimeField;

    const TWO_G_X: &str = "C6047F9441ED7D6D3045406E95C07CD85C778E0B8DBE964BE379693126E3241F";
    const TWO_G_Y: &str = "1AE168FEA63DC339A3C58419466CEAEEF7F632653266D0E1236431A950CFE52A";
    const THREE_G_X: &str = "F9308A019258C31049344F85F89D5229B531C845836F99B08601F113BCE036F9";
    const THREE_G_Y: &str = "388F7B0F632DE8140FE337E62A37F3566500A99934C2231B6CB9FD7584B8E672";

    fn pt(x: &str, y: &str) -> Point {
        Point::new(
            FieldElement::from_bigint(&BigInt256::from_hex(x).unwrap()),
            FieldElement::from_bigint(&BigInt256::from_hex(y).unwrap()),
        )
    }

    #[test]
    fn generator_on_curve() {
        let curve = Secp256k1::new();
        assert!(curve.is_on_curve(&curve.g));
    }

    #[test]
    fn double_matches_known_2g() {
        let curve = Secp256k1::new();
        let two_g = curve.double_affine(&curve.g);
        assert_eq!(two_g, pt(TWO_G_X, TWO_G_Y));
        assert_eq!(curve.add_affine(&curve.g, &curve.g), two_g);
    }

    #[test]
    fn add_matches_known_3g() {
        let curve = Secp256k1::new();
        let two_g = curve.double_affine(&curve.g);
        let three_g = curve.add_affine(&two_g, &curve.g);
        assert_eq!(three_g, pt(THREE_G_X, THREE_G_Y));
        assert_eq!(curve.mul_g(&BigInt256::from_u64(3)), three_g);
    }

    #[test]
    fn mul_edge_cases() {
        let curve = Secp256k1::new();
        assert!(curve.mul_g(&BigInt256::ZERO).is_infinity());
        assert_eq!(curve.mul_g(&BigInt256::ONE), curve.g);
        // (n-1)·G = -G and n·G = infinity
        let n_minus_1 = curve.n.wrapping_sub(&BigInt256::ONE);
        assert_eq!(curve.mul_g(&n_minus_1), curve.negate_point(&curve.g));
        assert!(curve.mul_g(&curve.n).is_infinity());
    }

    #[test]
    fn add_inverse_is_infinity() {
        let curve = Secp256k1::new();
        let neg_g = curve.negate_point(&curve.g);
        assert!(curve.add_affine(&curve.g, &neg_g).is_infinity());
        assert_eq!(curve.add_affine(&Point::INFINITY, &curve.g), curve.g);
    }

    #[test]
    fn mul_matches_k256() {
        let curve = Secp256k1::new();
        for hexval in [
            "2",
            "7",
            "DEADBEEF",
            "123456789ABCDEF0123456789ABCDEF0",
            "FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364140",
        ] {
            let k = BigInt256::from_hex(hexval).unwrap();
            let ours = curve.mul_g(&k);
            let scalar = k256::Scalar::from_repr(k.to_bytes_be().into()).unwrap();
            let theirs = k256::ProjectivePoint::mul_by_generator(&scalar).to_affine();
            let encoded = theirs.to_encoded_point(false);
            assert_eq!(ours.x.to_bytes_be().as_slice(), encoded.x().unwrap().as_slice());
            assert_eq!(ours.y.to_bytes_be().as_slice(), encoded.y().unwrap().as_slice());
        }
    }

    #[test]
    fn batch_public_keys_match_single() {
        let curve = Secp256k1::new();
        let scalars: Vec<BigInt256> = (1u64..9).map(BigInt256::from_u64).collect();
        let batch = curve.compute_public_keys(&scalars);
        for (k, p) in scalars.iter().zip(batch.iter()) {
            assert_eq!(*p, curve.mul_g(k));
        }
    }

    #[test]
    fn add_direct_matches_add_affine() {
        let curve = Secp256k1::new();
        let base: Vec<Point> = (1u64..6).map(|k| curve.mul_g(&BigInt256::from_u64(k))).collect();
        let offsets = vec![
            curve.g,
            Point::INFINITY,
            curve.g,
            curve.negate_point(&curve.mul_g(&BigInt256::from_u64(4))),
            curve.mul_g(&BigInt256::from_u64(5)),
        ];
        let sums = curve.add_direct(&base, &offsets);
        for i in 0..base.len() {
            assert_eq!(sums[i], curve.add_affine(&base[i], &offsets[i]));
        }
        // 4G + (-4G) and 5G + 5G exercised the non-generic paths
        assert!(sums[3].is_infinity());
        assert_eq!(sums[4], curve.mul_g(&BigInt256::from_u64(10)));
    }

    #[test]
    fn order_arithmetic() {
        let curve = Secp256k1::new();
        let a = BigInt256::from_u64(5);
        assert_eq!(curve.order_add(&curve.order_neg(&a), &a), BigInt256::ZERO);
        let n_minus_2 = curve.n.wrapping_sub(&BigInt256::from_u64(2));
        assert_eq!(curve.order_add(&n_minus_2, &a), BigInt256::from_u64(3));
        assert_eq!(curve.order_sub(&BigInt256::from_u64(2), &a), curve.order_neg(&BigInt256::from_u64(3)));
    }

    #[test]
    fn parse_and_compress_round_trip() {
        let curve = Secp256k1::new();
        let g_hex = "0279BE667EF9DCBBAC55A06295CE870B07029BFCDB2DCE28D959F2815B16F81798";
        let parsed = curve.parse_public_key_hex(g_hex).unwrap();
        assert_eq!(parsed, curve.g);
        assert_eq!(curve.public_key_hex(&parsed), g_hex);

        // uncompressed form parses to the same point
        let mut unc = String::from("04");
        unc.push_str(&curve.g.x.to_bigint().to_hex_padded());
        unc.push_str(&curve.g.y.to_bigint().to_hex_padded());
        assert_eq!(curve.parse_public_key_hex(&unc).unwrap(), curve.g);
    }

    #[test]
    fn parse_rejects_off_curve() {
        let curve = Secp256k1::new();
        let mut unc = String::from("04");
        unc.push_str(&BigInt256::from_u64(1).to_hex_padded());
        unc.push_str(&BigInt256::from_u64(1).to_hex_padded());
        assert!(curve.parse_public_key_hex(&unc).is_err());
        assert!(curve.parse_public_key_hex("02zz").is_err());
    }

    #[test]
    fn rand_scalar_stays_below_bound() {
        let curve = Secp256k1::new();
        let mut rng = rand::thread_rng();
        for bits in [1usize, 20, 64, 65, 125] {
            let bound = BigInt256::ONE.shl(bits);
            for _ in 0..50 {
                assert!(curve.rand_scalar_bits(&mut rng, bits) < bound);
            }
        }
    }
}

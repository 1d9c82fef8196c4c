//! Herd creation
//!
//! Draws random starting distances, recentres the wild herd on the key and
//! computes all start points in one batched pass. Herd membership alternates
//! with the kangaroo index so every batch carries both herds.

use rand::RngCore;

use crate::math::bigint::BigInt256;
use crate::math::secp::Secp256k1;
use crate::types::{HerdKind, Kangaroo, Point, RangeInfo};

/// Parameters shared by every herd draw for one key.
pub struct HerdSpec<'a> {
    pub curve: &'a Secp256k1,
    pub range: &'a RangeInfo,
    /// Translated search key (wild kangaroos start at key + d·G).
    pub key_search: &'a Point,
    pub use_symmetry: bool,
}

impl HerdSpec<'_> {
    fn wild_offset(&self) -> &BigInt256 {
        if self.use_symmetry {
            &self.range.width_div4
        } else {
            &self.range.width_div2
        }
    }

    fn distance_bits(&self) -> usize {
        if self.use_symmetry {
            self.range.power.saturating_sub(1)
        } else {
            self.range.power
        }
    }

    /// Create `count` kangaroos, the first one belonging to herd `first`.
    pub fn create_herd<R: RngCore>(&self, count: usize, first: HerdKind, rng: &mut R) -> Vec<Kangaroo> {
        let mut distances: Vec<BigInt256> = Vec::with_capacity(count);
        for j in 0..count {
            let mut d = self.curve.rand_scalar_bits(rng, self.distance_bits());
            if HerdKind::from_index(j as u64, first) == HerdKind::Wild {
                d = self.curve.order_sub(&d, self.wild_offset());
            }
            distances.push(d);
        }

        let mut herd = self.materialize(&distances, first);

        // A start point at infinity (possible only in degenerate ranges)
        // cannot enter the walk; redraw it.
        for j in 0..count {
            while herd[j].x.is_zero() && herd[j].y.is_zero() {
                let kind = HerdKind::from_index(j as u64, first);
                let mut d = self.curve.rand_scalar_bits(rng, self.distance_bits());
                if kind == HerdKind::Wild {
                    d = self.curve.order_sub(&d, self.wild_offset());
                }
                let replacement = self.materialize(&[d], kind);
                herd[j] = replacement.into_iter().next().unwrap();
            }
        }

        herd
    }

    /// Positions for the given distances: tame d·G, wild key + d·G, with the
    /// symmetry normalisation applied. Infinity is encoded as (0, 0).
    fn materialize(&self, distances: &[BigInt256], first: HerdKind) -> Vec<Kangaroo> {
        let points = self.curve.compute_public_keys(distances);
        let offsets: Vec<Point> = (0..distances.len())
            .map(|j| {
                if HerdKind::from_index(j as u64, first) == HerdKind::Wild {
                    *self.key_search
                } else {
                    Point::INFINITY
                }
            })
            .collect();
        let starts = self.curve.add_direct(&offsets, &points);

        starts
            .into_iter()
            .zip(distances.iter())
            .map(|(p, d)| {
                if p.is_infinity() {
                    return Kangaroo::new(
                        crate::math::field::FieldElement::ZERO,
                        crate::math::field::FieldElement::ZERO,
                        *d,
                    );
                }
                let mut k = Kangaroo::new(p.x, p.y, *d);
                if self.use_symmetry && k.y.is_upper_half() {
                    k.y = k.y.neg();
                    k.d = self.curve.order_neg(&k.d);
                    k.sym_class = 1;
                }
                k
            })
            .collect()
    }
}

//! Jump table construction
//!
//! A deterministic set of NB_JUMP (distance, distance·G) pairs drives the
//! pseudo-random walk. The table is drawn from a fixed-seed ChaCha20 stream so
//! work files stay portable across runs, and redrawn until the empirical mean
//! distance falls inside the accepted window.

use log::{debug, info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

use crate::math::bigint::BigInt256;
use crate::math::secp::Secp256k1;
use crate::types::Point;

pub const NB_JUMP: usize = 32;

/// Fixed seed keeps jump tables identical across runs and machines.
pub const JUMP_SEED: u64 = 0x600DCAFE;

const MAX_RETRY: usize = 100;

#[derive(Debug, Clone)]
pub struct JumpTable {
    pub distance: [BigInt256; NB_JUMP],
    pub point: [Point; NB_JUMP],
    /// Residue-class primes (u, v) of the symmetry variant.
    pub sym_primes: Option<(u128, u128)>,
}

impl JumpTable {
    /// Build the table for a range of `range_power` bits.
    pub fn build(curve: &Secp256k1, range_power: usize, use_symmetry: bool) -> Self {
        let mut jump_bit = if use_symmetry {
            range_power / 2
        } else {
            range_power / 2 + 1
        };
        if jump_bit > 128 {
            jump_bit = 128;
        }

        let max_avg = 2f64.powf(jump_bit as f64 - 0.95);
        let min_avg = 2f64.powf(jump_bit as f64 - 1.05);

        let mut rng = ChaCha20Rng::seed_from_u64(JUMP_SEED);

        let sym_primes = if use_symmetry {
            let u = next_probable_prime((1u128 << (jump_bit / 2)) + 1);
            let v = next_probable_prime(u + 2);
            info!("U = {u:x}");
            info!("V = {v:x}");
            Some((u, v))
        } else {
            None
        };

        let mut distance = [BigInt256::ZERO; NB_JUMP];
        let mut dist_avg = 0.0;
        let mut accepted = false;
        for _ in 0..MAX_RETRY {
            let mut total = 0.0f64;
            for (i, d) in distance.iter_mut().enumerate() {
                *d = match sym_primes {
                    Some((u, v)) => {
                        let class = if i < NB_JUMP / 2 { u } else { v };
                        let r = curve.rand_scalar_bits(&mut rng, jump_bit / 2);
                        r.mul_low(&BigInt256::from_u128(class))
                    }
                    None => curve.rand_scalar_bits(&mut rng, jump_bit),
                };
                if d.is_zero() {
                    *d = BigInt256::ONE;
                }
                total += d.to_f64();
            }
            dist_avg = total / NB_JUMP as f64;
            if dist_avg > min_avg && dist_avg < max_avg {
                accepted = true;
                break;
            }
        }
        if !accepted {
            warn!("jump table mean 2^{:.2} outside the accepted window", dist_avg.log2());
        }

        let point_vec = curve.compute_public_keys(&distance);
        let mut point = [Point::INFINITY; NB_JUMP];
        point.copy_from_slice(&point_vec);

        debug!("jump avg distance: 2^{:.2}", dist_avg.log2());

        JumpTable { distance, point, sym_primes }
    }

    /// Empirical mean of the distance table.
    pub fn mean(&self) -> f64 {
        self.distance.iter().map(|d| d.to_f64()).sum::<f64>() / NB_JUMP as f64
    }
}

/// Smallest probable prime >= candidate (candidate must be odd).
fn next_probable_prime(mut candidate: u128) -> u128 {
    debug_assert!(candidate % 2 == 1);
    while !is_probable_prime(candidate) {
        candidate += 2;
    }
    candidate
}

/// Deterministic Miller-Rabin for the sizes used here (< 2^81).
fn is_probable_prime(n: u128) -> bool {
    if n < 2 {
        return false;
    }
    for p in [2u128, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        if n == p {
            return true;
        }
        if n % p == 0 {
            return false;
        }
    }
    let mut d = n - 1;
    let mut s = 0u32;
    while d % 2 == 0 {
        d /= 2;
        s += 1;
    }
    'witness: for a in [2u128, 3, 5, 7, 11, 13, 17, 19, 23, 29, 31, 37] {
        let mut x = pow_mod(a, d, n);
        if x == 1 || x == n - 1 {
            continue;
        }
        for _ in 0..s - 1 {
            x = mul_mod(x, x, n);
            if x == n - 1 {
                continue 'witness;
            }
        }
        return false;
    }
    true
}

fn mul_mod(a: u128, b: u128, m: u128) -> u128 {
    // Russian-peasant multiply; u128 products would overflow.
    let mut result = 0u128;
    let mut a = a % m;
    let mut b = b;
    while b > 0 {
        if b & 1 == 1 {
            result = (result + a) % m;
        }
        a = (a << 1) % m;
        b >>= 1;
    }
    result
}

fn pow_mod(base: u128, mut exp: u128, m: u128) -> u128 {
    let mut result = 1u128;
    let mut base = base % m;
    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, m);
        }
        base = mul_mod(base, base, m);
        exp >>= 1;
    }
    result
}

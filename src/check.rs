//! Self test (`-check`)
//!
//! Validates the homegrown arithmetic against k256, checks the walk
//! invariants on a freshly created herd and runs the reference device
//! backend against the CPU walker over one dispatch worth of steps.

use std::sync::Arc;

use k256::elliptic_curve::ops::MulByGenerator;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::gpu::stepper::DeviceStepper;
use crate::gpu::{create_backend, GPU_GRP_SIZE, NB_RUN};
use crate::kangaroo::context::{KeyContext, SearchParams};
use crate::kangaroo::coordinator::compute_expected;
use crate::kangaroo::jumps::JumpTable;
use crate::kangaroo::stepper::{CpuStepper, Stepper};
use crate::math::bigint::BigInt256;
use crate::math::secp::Secp256k1;
use crate::types::{HerdKind, Point, RangeInfo};

fn check_against_k256(curve: &Secp256k1) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    for _ in 0..16 {
        let k = curve.rand_scalar_bits(&mut rng, 250);
        if k.is_zero() {
            continue;
        }
        let ours = curve.mul_g(&k);
        let scalar = Option::<k256::Scalar>::from(k256::Scalar::from_repr(k.to_bytes_be().into()))
            .ok_or_else(|| Error::Logic("scalar out of k256 range".into()))?;
        let theirs = k256::ProjectivePoint::mul_by_generator(&scalar).to_affine();
        let encoded = theirs.to_encoded_point(false);
        let (ex, ey) = match (encoded.x(), encoded.y()) {
            (Some(x), Some(y)) => (x, y),
            _ => return Err(Error::Logic("k256 produced the identity".into())),
        };
        if ex.as_slice() != ours.x.to_bytes_be().as_slice()
            || ey.as_slice() != ours.y.to_bytes_be().as_slice()
        {
            return Err(Error::Logic(format!("scalar mult mismatch against k256 for k={k}")));
        }
    }
    info!("scalar multiplication matches k256");
    Ok(())
}

fn small_context(grid: (usize, usize)) -> Arc<KeyContext> {
    let curve = Secp256k1::new();
    let range = RangeInfo::new(BigInt256::from_u64(1 << 20), BigInt256::from_u64(1 << 26));
    let secret = BigInt256::from_u64((1 << 22) + 0xABCDE);
    let key = curve.mul_g(&secret);
    let params = SearchParams {
        dp_bits: 12,
        cpu_group_size: GPU_GRP_SIZE * grid.0 * grid.1,
        gpu_grid: grid,
        ..SearchParams::default()
    };
    let jumps = JumpTable::build(&curve, range.power, false);
    let (expected_ops, _, _) = compute_expected(12.0, 1024, range.power, false);
    Arc::new(KeyContext::new(curve, params, jumps, range, key, 0, expected_ops, &[1, 1]))
}

fn check_herd_invariants(ctx: &KeyContext) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    let herd = ctx.herd_spec().create_herd(64, HerdKind::Tame, &mut rng);
    for (j, k) in herd.iter().enumerate() {
        let expected = match HerdKind::from_index(j as u64, HerdKind::Tame) {
            HerdKind::Tame => ctx.curve.mul_g(&k.d),
            HerdKind::Wild => ctx.curve.add_affine(&ctx.key_search, &ctx.curve.mul_g(&k.d)),
        };
        if Point::new(k.x, k.y) != expected {
            return Err(Error::Logic(format!("herd invariant broken at kangaroo {j}")));
        }
    }
    info!("herd invariants hold");
    Ok(())
}

fn check_device_against_cpu(ctx: &Arc<KeyContext>) -> Result<()> {
    let mut rng = StdRng::from_entropy();
    let herd = ctx
        .herd_spec()
        .create_herd(ctx.params.cpu_group_size, HerdKind::Tame, &mut rng);
    let states: Vec<_> = herd
        .iter()
        .map(|k| crate::types::KangarooState { x: k.x.to_bigint(), y: k.y.to_bigint(), d: k.d })
        .collect();

    let mut cpu = CpuStepper::new(Arc::clone(ctx), Some(states.clone()));
    let backend = create_backend("reference")?;
    let mut dev = DeviceStepper::new(Arc::clone(ctx), backend, Some(states))?;

    // one device dispatch == NB_RUN CPU passes
    for _ in 0..NB_RUN {
        cpu.step()?;
    }
    dev.step()?;

    let cpu_states = cpu.snapshot()?;
    let dev_states = dev.snapshot()?;
    if cpu_states.len() != dev_states.len() {
        return Err(Error::Logic("device herd size mismatch".into()));
    }
    for (i, (c, d)) in cpu_states.iter().zip(dev_states.iter()).enumerate() {
        if c != d {
            return Err(Error::Logic(format!(
                "device walk diverged from CPU at kangaroo {i}"
            )));
        }
    }
    info!("reference device walk matches CPU over {NB_RUN} steps");
    Ok(())
}

/// Run all self tests.
pub fn self_test() -> Result<()> {
    let curve = Secp256k1::new();
    check_against_k256(&curve)?;

    let ctx = small_context((1, 1));
    check_herd_invariants(&ctx)?;
    check_device_against_cpu(&ctx)?;

    println!("Check OK");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_test_passes() {
        self_test().unwrap();
    }
}

//! Device worker
//!
//! Wraps a `GpuBackend` behind the common `Stepper` interface. Host staging
//! and device buffers form a two-buffer swap: kangaroo resets and checkpoints
//! download into the staging herd, patch it and upload it back.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{Error, Result};
use crate::kangaroo::context::KeyContext;
use crate::kangaroo::jumps::NB_JUMP;
use crate::kangaroo::stepper::Stepper;
use crate::math::field::FieldElement;
use crate::types::{DpHit, HerdKind, KangarooState};

use super::{
    pack_kangaroo, unpack_kangaroo, DeviceConfig, DeviceKangaroo, GpuBackend, GPU_GRP_SIZE,
    MAX_FOUND, NB_RUN,
};

pub struct DeviceStepper {
    ctx: Arc<KeyContext>,
    backend: Box<dyn GpuBackend>,
    staging: Vec<DeviceKangaroo>,
    rng: StdRng,
}

impl DeviceStepper {
    pub fn new(
        ctx: Arc<KeyContext>,
        mut backend: Box<dyn GpuBackend>,
        initial: Option<Vec<KangarooState>>,
    ) -> Result<Self> {
        if ctx.params.use_symmetry {
            return Err(Error::Resource(
                "device backends implement the plain walk only; drop --sym or --gpu".into(),
            ));
        }
        let (grid_x, grid_y) = ctx.params.gpu_grid;
        let cfg = DeviceConfig {
            grid_x,
            grid_y,
            iterations: NB_RUN,
            dp_mask: ctx.dp_mask,
            max_found: MAX_FOUND,
        };
        backend.init(&cfg)?;

        let dist: Vec<[u64; 2]> =
            ctx.jumps.distance.iter().map(|d| [d.limbs[0], d.limbs[1]]).collect();
        let px: Vec<[u64; 4]> = ctx.jumps.point.iter().map(|p| p.x.d).collect();
        let py: Vec<[u64; 4]> = ctx.jumps.point.iter().map(|p| p.y.d).collect();
        debug_assert_eq!(dist.len(), NB_JUMP);
        backend.upload_jumps(&dist, &px, &py)?;

        let total = cfg.kangaroo_count();
        let mut rng = StdRng::from_entropy();
        let mut states: Vec<KangarooState> = match initial {
            Some(s) => s.into_iter().take(total).collect(),
            None => Vec::new(),
        };
        if states.len() < total {
            // herds are created one device group at a time, preserving the
            // global index parity
            let mut remaining = total - states.len();
            let spec = ctx.herd_spec();
            while remaining > 0 {
                let chunk = remaining.min(GPU_GRP_SIZE);
                let base = (total - remaining) as u64;
                let herd = spec.create_herd(chunk, HerdKind::from_index(base, HerdKind::Tame), &mut rng);
                states.extend(herd.into_iter().map(|k| KangarooState {
                    x: k.x.to_bigint(),
                    y: k.y.to_bigint(),
                    d: k.d,
                }));
                remaining -= chunk;
            }
        }

        let staging: Vec<DeviceKangaroo> = states
            .iter()
            .enumerate()
            .map(|(i, s)| {
                pack_kangaroo(
                    &ctx.curve,
                    s,
                    HerdKind::from_bit(i as u64),
                    ctx.wild_offset(),
                )
            })
            .collect();
        backend.upload_kangaroos(&staging)?;

        Ok(DeviceStepper { ctx, backend, staging, rng })
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }
}

impl Stepper for DeviceStepper {
    fn step(&mut self) -> Result<Vec<DpHit>> {
        self.backend.run_once()?;
        let found = self.backend.read_dp()?;
        let mut hits = Vec::with_capacity(found.len());
        for dp in found {
            let kind = HerdKind::from_bit(dp.index);
            let state = unpack_kangaroo(
                &self.ctx.curve,
                &DeviceKangaroo { x: dp.x, y: [0; 4], d: dp.d },
                kind,
                self.ctx.wild_offset(),
            );
            hits.push(DpHit {
                x: FieldElement::new(dp.x),
                d: state.d,
                kangaroo_index: dp.index,
            });
        }
        Ok(hits)
    }

    fn ops_per_step(&self) -> u64 {
        (self.staging.len() * NB_RUN) as u64
    }

    fn kangaroo_count(&self) -> u64 {
        self.staging.len() as u64
    }

    fn reset_kangaroo(&mut self, index: u64) -> Result<()> {
        let kind = HerdKind::from_bit(index);
        let fresh = self
            .ctx
            .herd_spec()
            .create_herd(1, kind, &mut self.rng)
            .into_iter()
            .next()
            .unwrap();
        let state =
            KangarooState { x: fresh.x.to_bigint(), y: fresh.y.to_bigint(), d: fresh.d };
        self.backend.download_kangaroos(&mut self.staging)?;
        self.staging[index as usize] =
            pack_kangaroo(&self.ctx.curve, &state, kind, self.ctx.wild_offset());
        self.backend.upload_kangaroos(&self.staging)
    }

    fn snapshot(&self) -> Result<Vec<KangarooState>> {
        let mut out = vec![DeviceKangaroo::default(); self.staging.len()];
        self.backend.download_kangaroos(&mut out)?;
        Ok(out
            .iter()
            .enumerate()
            .map(|(i, dev)| {
                unpack_kangaroo(
                    &self.ctx.curve,
                    dev,
                    HerdKind::from_bit(i as u64),
                    self.ctx.wild_offset(),
                )
            })
            .collect())
    }

    fn restore(&mut self, states: &[KangarooState]) -> Result<()> {
        for (i, s) in states.iter().enumerate().take(self.staging.len()) {
            self.staging[i] = pack_kangaroo(
                &self.ctx.curve,
                s,
                HerdKind::from_bit(i as u64),
                self.ctx.wild_offset(),
            );
        }
        self.backend.upload_kangaroos(&self.staging)
    }
}

//! Batch walkers
//!
//! The `Stepper` trait is the substrate-independent walker interface: one
//! call steps a whole batch and yields the distinguished points it produced.
//! `CpuStepper` is the host implementation; the device variant lives in
//! `gpu::stepper`. A batch step runs three passes so that a single field
//! inversion serves every kangaroo.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::dp::is_dp;
use crate::error::Result;
use crate::kangaroo::context::KeyContext;
use crate::kangaroo::jumps::NB_JUMP;
use crate::math::field::{batch_inverse, FieldElement};
use crate::types::{DpHit, HerdKind, Kangaroo, KangarooState};

/// A walker owning a batch of kangaroos.
pub trait Stepper: Send {
    /// Advance every kangaroo one step (device: one dispatch) and return the
    /// distinguished points reached.
    fn step(&mut self) -> Result<Vec<DpHit>>;

    /// Operations counted per `step` call.
    fn ops_per_step(&self) -> u64;

    fn kangaroo_count(&self) -> u64;

    /// Replace one kangaroo after a same-herd collision.
    fn reset_kangaroo(&mut self, index: u64) -> Result<()>;

    /// Raw states for checkpoints.
    fn snapshot(&self) -> Result<Vec<KangarooState>>;

    fn restore(&mut self, states: &[KangarooState]) -> Result<()>;
}

pub struct CpuStepper {
    ctx: Arc<KeyContext>,
    herd: Vec<Kangaroo>,
    jmp: Vec<usize>,
    dx: Vec<FieldElement>,
    stale: Vec<usize>,
    rng: StdRng,
}

impl CpuStepper {
    /// Build a batch of `ctx.params.cpu_group_size` kangaroos; `initial`
    /// seeds the herd from a loaded work file, short counts are topped up.
    pub fn new(ctx: Arc<KeyContext>, initial: Option<Vec<KangarooState>>) -> Self {
        let size = ctx.params.cpu_group_size;
        let mut rng = StdRng::from_entropy();
        let mut herd: Vec<Kangaroo> = Vec::with_capacity(size);
        if let Some(states) = initial {
            for s in states.into_iter().take(size) {
                herd.push(Kangaroo::new(
                    FieldElement::from_bigint(&s.x),
                    FieldElement::from_bigint(&s.y),
                    s.d,
                ));
            }
        }
        if herd.len() < size {
            let missing = size - herd.len();
            let first = HerdKind::from_index(herd.len() as u64, HerdKind::Tame);
            herd.extend(ctx.herd_spec().create_herd(missing, first, &mut rng));
        }
        CpuStepper {
            herd,
            jmp: vec![0; size],
            dx: vec![FieldElement::ZERO; size],
            stale: Vec::new(),
            rng,
            ctx,
        }
    }

    fn select_jump(&self, g: usize) -> usize {
        let k = &self.herd[g];
        if self.ctx.params.use_symmetry {
            let mut jmp =
                (k.x.d[0] % (NB_JUMP / 2) as u64) as usize + (NB_JUMP / 2) * k.sym_class as usize;
            // length-2 cycle guard for the symmetric walk
            if jmp as u8 == k.last_jump {
                jmp = (jmp + 1) % NB_JUMP;
            }
            jmp
        } else {
            (k.x.d[0] % NB_JUMP as u64) as usize
        }
    }

    fn respawn(&mut self, g: usize) {
        let kind = HerdKind::from_index(g as u64, HerdKind::Tame);
        let fresh = self.ctx.herd_spec().create_herd(1, kind, &mut self.rng);
        self.herd[g] = fresh.into_iter().next().unwrap();
    }
}

impl Stepper for CpuStepper {
    fn step(&mut self) -> Result<Vec<DpHit>> {
        let n = self.herd.len();
        let jumps = &self.ctx.jumps;
        let sym = self.ctx.params.use_symmetry;

        // Pass 1: jump selection and x deltas for the shared inversion.
        self.stale.clear();
        for g in 0..n {
            let jmp = self.select_jump(g);
            self.jmp[g] = jmp;
            let d = self.herd[g].x.sub(&jumps.point[jmp].x);
            if d.is_zero() {
                // landing exactly on a jump point cannot be stepped
                self.stale.push(g);
                self.dx[g] = FieldElement::ONE;
            } else {
                self.dx[g] = d;
            }
        }

        batch_inverse(&mut self.dx[..n]);

        // Pass 2: affine addition with the precomputed inverses.
        for g in 0..n {
            if self.stale.binary_search(&g).is_ok() {
                continue;
            }
            let jmp = self.jmp[g];
            let jx = &jumps.point[jmp].x;
            let jy = &jumps.point[jmp].y;
            let k = &mut self.herd[g];

            let s = k.y.sub(jy).mul(&self.dx[g]);
            let rx = s.sqr().sub(jx).sub(&k.x);
            let mut ry = s.mul(&k.x.sub(&rx)).sub(&k.y);

            k.d = self.ctx.curve.order_add(&k.d, &jumps.distance[jmp]);
            if sym && ry.is_upper_half() {
                ry = ry.neg();
                k.d = self.ctx.curve.order_neg(&k.d);
                k.sym_class ^= 1;
            }
            k.x = rx;
            k.y = ry;
            k.last_jump = jmp as u8;
        }

        for i in 0..self.stale.len() {
            let g = self.stale[i];
            self.respawn(g);
            self.ctx
                .dead_kangaroos
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        // Pass 3: DP emission.
        let mut hits = Vec::new();
        for (g, k) in self.herd.iter().enumerate() {
            if is_dp(k.x.d[3], self.ctx.dp_mask) {
                hits.push(DpHit { x: k.x, d: k.d, kangaroo_index: g as u64 });
            }
        }
        Ok(hits)
    }

    fn ops_per_step(&self) -> u64 {
        self.herd.len() as u64
    }

    fn kangaroo_count(&self) -> u64 {
        self.herd.len() as u64
    }

    fn reset_kangaroo(&mut self, index: u64) -> Result<()> {
        self.respawn(index as usize);
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<KangarooState>> {
        Ok(self
            .herd
            .iter()
            .map(|k| KangarooState {
                x: k.x.to_bigint(),
                y: k.y.to_bigint(),
                d: k.d,
            })
            .collect())
    }

    fn restore(&mut self, states: &[KangarooState]) -> Result<()> {
        for (k, s) in self.herd.iter_mut().zip(states.iter()) {
            k.x = FieldElement::from_bigint(&s.x);
            k.y = FieldElement::from_bigint(&s.y);
            k.d = s.d;
            k.sym_class = 0;
            k.last_jump = Kangaroo::NO_JUMP;
        }
        Ok(())
    }
}

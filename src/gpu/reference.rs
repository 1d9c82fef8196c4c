//! Software reference backend
//!
//! Runs the device contract on the host: same packed buffers, same dispatch
//! granularity, same DP ring. Used by `-check` to validate device-shaped
//! plumbing against the CPU walker, and as the default `-gpu` backend where
//! no real device backend is compiled in.

use crate::error::{Error, Result};
use crate::kangaroo::jumps::NB_JUMP;
use crate::math::field::FieldElement;

use super::{DeviceConfig, DeviceDp, DeviceKangaroo, GpuBackend};

#[derive(Default)]
pub struct ReferenceBackend {
    cfg: Option<DeviceConfig>,
    jump_dist: Vec<u128>,
    jump_x: Vec<FieldElement>,
    jump_y: Vec<FieldElement>,
    herd: Vec<DeviceKangaroo>,
    ring: Vec<DeviceDp>,
}

impl ReferenceBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn cfg(&self) -> Result<&DeviceConfig> {
        self.cfg.as_ref().ok_or_else(|| Error::Resource("reference backend not initialised".into()))
    }
}

impl GpuBackend for ReferenceBackend {
    fn name(&self) -> &str {
        "reference"
    }

    fn init(&mut self, cfg: &DeviceConfig) -> Result<()> {
        if cfg.grid_x == 0 || cfg.grid_y == 0 {
            return Err(Error::Resource("empty device grid".into()));
        }
        self.herd = vec![DeviceKangaroo::default(); cfg.kangaroo_count()];
        self.ring = Vec::with_capacity(1024);
        self.cfg = Some(cfg.clone());
        Ok(())
    }

    fn upload_jumps(
        &mut self,
        distance: &[[u64; 2]],
        point_x: &[[u64; 4]],
        point_y: &[[u64; 4]],
    ) -> Result<()> {
        if distance.len() != NB_JUMP || point_x.len() != NB_JUMP || point_y.len() != NB_JUMP {
            return Err(Error::Resource("jump table upload size mismatch".into()));
        }
        self.jump_dist = distance.iter().map(|d| d[0] as u128 | (d[1] as u128) << 64).collect();
        self.jump_x = point_x.iter().map(|x| FieldElement::new(*x)).collect();
        self.jump_y = point_y.iter().map(|y| FieldElement::new(*y)).collect();
        Ok(())
    }

    fn upload_kangaroos(&mut self, herd: &[DeviceKangaroo]) -> Result<()> {
        if herd.len() != self.cfg()?.kangaroo_count() {
            return Err(Error::Resource("kangaroo upload size mismatch".into()));
        }
        self.herd.copy_from_slice(herd);
        Ok(())
    }

    fn download_kangaroos(&self, out: &mut [DeviceKangaroo]) -> Result<()> {
        if out.len() != self.herd.len() {
            return Err(Error::Resource("kangaroo download size mismatch".into()));
        }
        out.copy_from_slice(&self.herd);
        Ok(())
    }

    fn run_once(&mut self) -> Result<()> {
        let cfg = self.cfg()?.clone();
        if self.jump_dist.is_empty() {
            return Err(Error::Resource("jump table not uploaded".into()));
        }
        for (index, k) in self.herd.iter_mut().enumerate() {
            let mut x = FieldElement::new(k.x);
            let mut y = FieldElement::new(k.y);
            let mut d = k.d[0] as u128 | (k.d[1] as u128) << 64;
            for _ in 0..cfg.iterations {
                let jmp = (x.d[0] % NB_JUMP as u64) as usize;
                let dx = x.sub(&self.jump_x[jmp]);
                if dx.is_zero() {
                    continue;
                }
                let s = y.sub(&self.jump_y[jmp]).mul(&dx.inv());
                let rx = s.sqr().sub(&self.jump_x[jmp]).sub(&x);
                let ry = s.mul(&x.sub(&rx)).sub(&y);
                x = rx;
                y = ry;
                d = d.wrapping_add(self.jump_dist[jmp]);
                if (x.d[3] & cfg.dp_mask) == 0 {
                    if self.ring.len() >= cfg.max_found {
                        return Err(Error::Resource(
                            "DP ring overflow; raise max_found or dp bits".into(),
                        ));
                    }
                    self.ring.push(DeviceDp {
                        x: x.d,
                        d: [d as u64, (d >> 64) as u64],
                        index: index as u64,
                    });
                }
            }
            k.x = x.d;
            k.y = y.d;
            k.d = [d as u64, (d >> 64) as u64];
        }
        Ok(())
    }

    fn read_dp(&mut self) -> Result<Vec<DeviceDp>> {
        Ok(std::mem::take(&mut self.ring))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::GPU_GRP_SIZE;
    use crate::math::bigint::BigInt256;
    use crate::math::secp::Secp256k1;
    use crate::types::Point;

    fn tiny_cfg() -> DeviceConfig {
        DeviceConfig { grid_x: 1, grid_y: 1, iterations: 4, dp_mask: 0, max_found: 1 << 16 }
    }

    fn upload_table(backend: &mut ReferenceBackend, curve: &Secp256k1) -> crate::kangaroo::jumps::JumpTable {
        let table = crate::kangaroo::jumps::JumpTable::build(curve, 32, false);
        let dist: Vec<[u64; 2]> =
            table.distance.iter().map(|d| [d.limbs[0], d.limbs[1]]).collect();
        let px: Vec<[u64; 4]> = table.point.iter().map(|p| p.x.d).collect();
        let py: Vec<[u64; 4]> = table.point.iter().map(|p| p.y.d).collect();
        backend.upload_jumps(&dist, &px, &py).unwrap();
        table
    }

    #[test]
    fn single_dispatch_tracks_the_walk() {
        let curve = Secp256k1::new();
        let mut backend = ReferenceBackend::new();
        backend.init(&tiny_cfg()).unwrap();
        let table = upload_table(&mut backend, &curve);

        // all kangaroos tame at d·G
        let mut herd = Vec::new();
        for i in 0..GPU_GRP_SIZE as u64 {
            let d = BigInt256::from_u64(1000 + i);
            let p = curve.mul_g(&d);
            herd.push(DeviceKangaroo { x: p.x.d, y: p.y.d, d: [d.limbs[0], 0] });
        }
        backend.upload_kangaroos(&herd).unwrap();
        backend.run_once().unwrap();

        let mut out = vec![DeviceKangaroo::default(); herd.len()];
        backend.download_kangaroos(&mut out).unwrap();
        for k in &out {
            // walk invariant: position still equals d·G
            let d = BigInt256::from_limbs([k.d[0], k.d[1], 0, 0]);
            let expected = curve.mul_g(&d);
            assert_eq!(Point::new(FieldElement::new(k.x), FieldElement::new(k.y)), expected);
        }
        let _ = table;
    }

    #[test]
    fn dp_mask_zero_fills_ring_per_step() {
        let curve = Secp256k1::new();
        let mut backend = ReferenceBackend::new();
        backend.init(&tiny_cfg()).unwrap();
        upload_table(&mut backend, &curve);
        let mut herd = Vec::new();
        for i in 0..GPU_GRP_SIZE as u64 {
            let d = BigInt256::from_u64(5000 + i);
            let p = curve.mul_g(&d);
            herd.push(DeviceKangaroo { x: p.x.d, y: p.y.d, d: [d.limbs[0], 0] });
        }
        backend.upload_kangaroos(&herd).unwrap();
        backend.run_once().unwrap();
        let dps = backend.read_dp().unwrap();
        // mask 0: every step of every kangaroo is distinguished
        assert_eq!(dps.len(), GPU_GRP_SIZE * 4);
        // drained
        assert!(backend.read_dp().unwrap().is_empty());
    }

    #[test]
    fn ring_overflow_is_a_config_error() {
        let curve = Secp256k1::new();
        let mut backend = ReferenceBackend::new();
        let cfg = DeviceConfig { grid_x: 1, grid_y: 1, iterations: 4, dp_mask: 0, max_found: 8 };
        backend.init(&cfg).unwrap();
        upload_table(&mut backend, &curve);
        let mut herd = Vec::new();
        for i in 0..GPU_GRP_SIZE as u64 {
            let d = BigInt256::from_u64(9000 + i);
            let p = curve.mul_g(&d);
            herd.push(DeviceKangaroo { x: p.x.d, y: p.y.d, d: [d.limbs[0], 0] });
        }
        backend.upload_kangaroos(&herd).unwrap();
        assert!(matches!(backend.run_once(), Err(Error::Resource(_))));
    }
}

//! Device offload
//!
//! Device kernels are external collaborators behind the `GpuBackend` trait:
//! the host uploads the jump table and a packed herd, the device runs many
//! walk iterations per dispatch and fills a ring of distinguished points.
//! The built-in `reference` backend executes the same contract in software
//! and anchors the `-check` self test.

pub mod reference;
pub mod stepper;

use crate::error::{Error, Result};
use crate::math::bigint::BigInt256;
use crate::math::secp::Secp256k1;
use crate::types::{HerdKind, KangarooState};

/// Walk iterations per kangaroo per dispatch.
pub const NB_RUN: usize = 64;

/// Kangaroos per device thread group.
pub const GPU_GRP_SIZE: usize = 128;

/// DP ring capacity; overflowing it is a configuration error.
pub const MAX_FOUND: usize = 65536 * 2;

#[derive(Debug, Clone)]
pub struct DeviceConfig {
    pub grid_x: usize,
    pub grid_y: usize,
    pub iterations: usize,
    pub dp_mask: u64,
    pub max_found: usize,
}

impl DeviceConfig {
    pub fn kangaroo_count(&self) -> usize {
        self.grid_x * self.grid_y * GPU_GRP_SIZE
    }
}

/// Packed kangaroo as transferred to a device: full affine coordinates and a
/// non-negative 128-bit distance (wild offset baked in).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeviceKangaroo {
    pub x: [u64; 4],
    pub y: [u64; 4],
    pub d: [u64; 2],
}

/// One distinguished point drained from the device ring.
#[derive(Debug, Clone, Copy)]
pub struct DeviceDp {
    pub x: [u64; 4],
    pub d: [u64; 2],
    pub index: u64,
}

pub trait GpuBackend: Send {
    fn name(&self) -> &str;

    fn init(&mut self, cfg: &DeviceConfig) -> Result<()>;

    /// Jump distances are 128-bit, points full width.
    fn upload_jumps(
        &mut self,
        distance: &[[u64; 2]],
        point_x: &[[u64; 4]],
        point_y: &[[u64; 4]],
    ) -> Result<()>;

    fn upload_kangaroos(&mut self, herd: &[DeviceKangaroo]) -> Result<()>;

    fn download_kangaroos(&self, out: &mut [DeviceKangaroo]) -> Result<()>;

    /// One dispatch: `iterations` steps for every kangaroo.
    fn run_once(&mut self) -> Result<()>;

    /// Drain the DP ring.
    fn read_dp(&mut self) -> Result<Vec<DeviceDp>>;
}

/// Backend registry. Real device backends (CUDA, Metal, Vulkan) implement
/// `GpuBackend` out of tree; the software reference is always available.
pub fn create_backend(kind: &str) -> Result<Box<dyn GpuBackend>> {
    match kind {
        "reference" => Ok(Box::new(reference::ReferenceBackend::new())),
        other => Err(Error::Resource(format!(
            "gpu backend '{other}' is not available in this build"
        ))),
    }
}

/// Pack a kangaroo for transfer. Wild distances get the wild offset added so
/// the device only sees non-negative 128-bit values.
pub fn pack_kangaroo(
    curve: &Secp256k1,
    state: &KangarooState,
    kind: HerdKind,
    wild_offset: &BigInt256,
) -> DeviceKangaroo {
    let d = match kind {
        HerdKind::Wild => curve.order_add(&state.d, wild_offset),
        HerdKind::Tame => state.d,
    };
    DeviceKangaroo {
        x: state.x.limbs,
        y: state.y.limbs,
        d: [d.limbs[0], d.limbs[1]],
    }
}

/// Reverse of [`pack_kangaroo`].
pub fn unpack_kangaroo(
    curve: &Secp256k1,
    dev: &DeviceKangaroo,
    kind: HerdKind,
    wild_offset: &BigInt256,
) -> KangarooState {
    let d128 = BigInt256::from_limbs([dev.d[0], dev.d[1], 0, 0]);
    let d = match kind {
        HerdKind::Wild => curve.order_sub(&d128, wild_offset),
        HerdKind::Tame => d128,
    };
    KangarooState {
        x: BigInt256::from_limbs(dev.x),
        y: BigInt256::from_limbs(dev.y),
        d,
    }
}

//! Shared per-key search state
//!
//! One `KeyContext` is built for each key and shared by every worker thread,
//! the gap scanner and the checkpointer. Only the hash table, the gap stats
//! and the per-worker snapshot slots sit behind locks; the control flags are
//! atomics polled at pass boundaries.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::dp::{dp_mask, HashTable};
use crate::kangaroo::herd::HerdSpec;
use crate::kangaroo::jumps::JumpTable;
use crate::math::bigint::BigInt256;
use crate::math::secp::Secp256k1;
use crate::types::{KangarooState, Point, RangeInfo, Solution};

/// Tunables for one run, resolved from the CLI.
#[derive(Debug, Clone)]
pub struct SearchParams {
    /// Distinguished-point bits; negative selects the suggested value.
    pub dp_bits: i32,
    pub use_symmetry: bool,
    pub cpu_threads: usize,
    pub cpu_group_size: usize,
    /// One device worker per named backend.
    pub gpu_backends: Vec<String>,
    pub gpu_grid: (usize, usize),
    /// Abort after max_step · expected operations (0 disables).
    pub max_step: f64,
    pub save_kangaroo: bool,
    pub split_workfile: bool,
    pub save_period: f64,
    pub work_file: Option<PathBuf>,
    pub work_text_file: Option<PathBuf>,
    pub output_file: Option<PathBuf>,
}

impl Default for SearchParams {
    fn default() -> Self {
        SearchParams {
            dp_bits: -1,
            use_symmetry: false,
            cpu_threads: 1,
            cpu_group_size: 1024,
            gpu_backends: Vec::new(),
            gpu_grid: (4, 4),
            max_step: 0.0,
            save_kangaroo: false,
            split_workfile: false,
            save_period: 60.0,
            work_file: None,
            work_text_file: None,
            output_file: None,
        }
    }
}

/// Per-worker control block. Flags are written by the owning worker and read
/// by the coordinator; dirty reads are fine.
#[derive(Debug, Default)]
pub struct WorkerSlot {
    pub has_started: AtomicBool,
    pub is_running: AtomicBool,
    pub is_waiting: AtomicBool,
    pub nb_kangaroo: u64,
    /// Kangaroo states published at the save barrier when -ws is active.
    pub herd_snapshot: Mutex<Vec<KangarooState>>,
}

/// Smallest and most recent cross-herd distance gap seen by the scanner.
#[derive(Debug, Clone)]
pub struct GapStats {
    pub last_gap: u128,
    pub lowest_gap: u128,
}

impl Default for GapStats {
    fn default() -> Self {
        // matches the unset sentinel of the display (126-bit max)
        GapStats { last_gap: 0, lowest_gap: (1 << 126) - 1 }
    }
}

pub struct KeyContext {
    pub curve: Secp256k1,
    pub params: SearchParams,
    pub jumps: JumpTable,
    pub range: RangeInfo,
    /// The public key being solved, as given.
    pub key: Point,
    /// Key translated by -rangeStart (and -width/2 with symmetry): the walk
    /// is centred on zero.
    pub key_search: Point,
    pub key_search_neg: Point,
    pub key_index: usize,
    pub dp_mask: u64,
    pub expected_ops: f64,
    pub table: Mutex<HashTable>,
    pub end_of_search: AtomicBool,
    pub save_request: AtomicBool,
    pub save_barrier: Mutex<()>,
    pub solution: Mutex<Option<Solution>>,
    pub counters: Vec<AtomicU64>,
    pub dead_kangaroos: AtomicU64,
    pub gaps: Mutex<GapStats>,
    pub workers: Vec<WorkerSlot>,
}

/// Translate the target so the wild herd walks around zero.
pub fn init_search_key(
    curve: &Secp256k1,
    key: &Point,
    range: &RangeInfo,
    use_symmetry: bool,
) -> Point {
    let mut shift = range.start;
    if use_symmetry {
        shift = curve.order_add(&shift, &range.width_div2);
    }
    if shift.is_zero() {
        return *key;
    }
    let rs = curve.mul_g(&shift);
    curve.add_affine(key, &curve.negate_point(&rs))
}

impl KeyContext {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        curve: Secp256k1,
        params: SearchParams,
        jumps: JumpTable,
        range: RangeInfo,
        key: Point,
        key_index: usize,
        expected_ops: f64,
        worker_sizes: &[u64],
    ) -> Self {
        let key_search = init_search_key(&curve, &key, &range, params.use_symmetry);
        let key_search_neg = curve.negate_point(&key_search);
        let mask = dp_mask(params.dp_bits.max(0) as u32);
        let workers: Vec<WorkerSlot> = worker_sizes
            .iter()
            .map(|&nb| WorkerSlot { nb_kangaroo: nb, ..WorkerSlot::default() })
            .collect();
        let counters = (0..worker_sizes.len()).map(|_| AtomicU64::new(0)).collect();
        KeyContext {
            curve,
            params,
            jumps,
            range,
            key,
            key_search,
            key_search_neg,
            key_index,
            dp_mask: mask,
            expected_ops,
            table: Mutex::new(HashTable::new()),
            end_of_search: AtomicBool::new(false),
            save_request: AtomicBool::new(false),
            save_barrier: Mutex::new(()),
            solution: Mutex::new(None),
            counters,
            dead_kangaroos: AtomicU64::new(0),
            gaps: Mutex::new(GapStats::default()),
            workers,
        }
    }

    pub fn herd_spec(&self) -> HerdSpec<'_> {
        HerdSpec {
            curve: &self.curve,
            range: &self.range,
            key_search: &self.key_search,
            use_symmetry: self.params.use_symmetry,
        }
    }

    /// Offset baked into device-side wild distances.
    pub fn wild_offset(&self) -> &BigInt256 {
        if self.params.use_symmetry {
            &self.range.width_div4
        } else {
            &self.range.width_div2
        }
    }

    pub fn ended(&self) -> bool {
        self.end_of_search.load(Ordering::Acquire)
    }

    pub fn finish(&self, solution: Option<Solution>) {
        if let Some(sol) = solution {
            *self.solution.lock().unwrap() = Some(sol);
        }
        self.end_of_search.store(true, Ordering::Release);
    }

    pub fn is_alive(&self) -> bool {
        self.workers.iter().any(|w| w.is_running.load(Ordering::Relaxed))
    }

    pub fn all_started(&self) -> bool {
        self.workers.iter().all(|w| w.has_started.load(Ordering::Relaxed))
    }

    pub fn all_waiting(&self) -> bool {
        self.workers
            .iter()
            .all(|w| !w.is_running.load(Ordering::Relaxed) || w.is_waiting.load(Ordering::Relaxed))
    }

    pub fn total_count(&self) -> u64 {
        self.counters.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    pub fn total_kangaroos(&self) -> u64 {
        self.workers.iter().map(|w| w.nb_kangaroo).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_key_translation() {
        let curve = Secp256k1::new();
        let range = RangeInfo::new(BigInt256::from_u64(0x100), BigInt256::from_u64(0x200));
        // secret 0x123 in [0x100, 0x200)
        let key = curve.mul_g(&BigInt256::from_u64(0x123));
        let translated = init_search_key(&curve, &key, &range, false);
        assert_eq!(translated, curve.mul_g(&BigInt256::from_u64(0x23)));
    }

    #[test]
    fn search_key_zero_start_is_identity_translation() {
        let curve = Secp256k1::new();
        let range = RangeInfo::new(BigInt256::ZERO, BigInt256::from_u64(1 << 20));
        let key = curve.mul_g(&BigInt256::from_u64(0x5A5A5));
        assert_eq!(init_search_key(&curve, &key, &range, false), key);
    }

    #[test]
    fn search_key_translation_with_symmetry_recentres() {
        let curve = Secp256k1::new();
        let range = RangeInfo::new(BigInt256::from_u64(0x100), BigInt256::from_u64(0x200));
        let key = curve.mul_g(&BigInt256::from_u64(0x180));
        // start + width/2 = 0x180, the key itself: translation hits infinity
        let translated = init_search_key(&curve, &key, &range, true);
        assert!(translated.is_infinity());
    }
}

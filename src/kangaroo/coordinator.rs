//! Search coordination
//!
//! Drives the per-key lifecycle: range init, jump table, worker threads
//! (CPU batch walkers and device workers), the statistics loop with the
//! rolling rate filter, the gap scanner, periodic checkpoints and the
//! maxStep abort. Solved or aborted, workers are joined and the table reset
//! before the next key.

use std::io::Write as _;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::checkpoint::{save_work, CheckpointWriter};
use crate::dp::table::AddOutcome;
use crate::dp::HASH_SIZE;
use crate::error::Result;
use crate::gpu::create_backend;
use crate::gpu::stepper::DeviceStepper;
use crate::kangaroo::collision::Resolver;
use crate::kangaroo::context::{KeyContext, SearchParams};
use crate::kangaroo::jumps::JumpTable;
use crate::kangaroo::stepper::{CpuStepper, Stepper};
use crate::math::bigint::BigInt256;
use crate::math::secp::Secp256k1;
use crate::types::{HerdKind, KangarooState, Point, RangeInfo, Solution};
use crate::dp::table::bucket_min_gap;
use crate::workfile::LoadedWork;

const STATS_PERIOD: Duration = Duration::from_millis(2000);
const GAP_SCAN_PERIOD: Duration = Duration::from_millis(3000);
const RATE_FILTER: usize = 8;

/// Expected-work model: operations, memory and DP overhead for a dp size.
pub fn compute_expected(
    dp_bits: f64,
    total_rw: u64,
    range_power: usize,
    use_symmetry: bool,
) -> (f64, f64, f64) {
    let gain_s = if use_symmetry { 1.0 / 2f64.sqrt() } else { 1.0 };
    let k = total_rw as f64;
    let n = 2f64.powi(range_power as i32);
    let theta = 2f64.powf(dp_bits);
    let z0 = 2.0 * (2.0 - 2f64.sqrt()) * gain_s * std::f64::consts::PI.sqrt();
    let avg_dp0 = z0 * n.sqrt();
    let op = z0 * (n * (k * theta + n.sqrt())).powf(1.0 / 3.0);
    let ram = (16.0 * HASH_SIZE as f64 + 32.0 * (op / theta)) / (1024.0 * 1024.0);
    (op, ram, op / avg_dp0)
}

/// Suggested dp size: start at rangeBits/2 - log2(kangaroos) and walk down
/// until the DP overhead stays under 5%.
pub fn suggest_dp_bits(total_rw: u64, range_power: usize, use_symmetry: bool) -> u32 {
    let mut dp = (range_power as f64 / 2.0 - (total_rw.max(1) as f64).log2()).floor() as i64;
    if dp < 0 {
        dp = 0;
    }
    let mut dp = dp as u32;
    loop {
        let (_, _, overhead) = compute_expected(dp as f64, total_rw, range_power, use_symmetry);
        if overhead <= 1.05 || dp == 0 {
            return dp;
        }
        dp -= 1;
    }
}

/// Outcome for one key.
#[derive(Debug, Clone)]
pub enum KeyOutcome {
    Solved(Solution),
    Aborted,
}

pub struct Coordinator {
    curve: Secp256k1,
    params: SearchParams,
    range_start: BigInt256,
    range_end: BigInt256,
    keys: Vec<Point>,
    /// Resume state (-i): table and kangaroos for the first key.
    loaded: Option<LoadedWork>,
    offset_count: u64,
    offset_time: f64,
}

impl Coordinator {
    pub fn new(
        params: SearchParams,
        range_start: BigInt256,
        range_end: BigInt256,
        keys: Vec<Point>,
    ) -> Self {
        Coordinator {
            curve: Secp256k1::new(),
            params,
            range_start,
            range_end,
            keys,
            loaded: None,
            offset_count: 0,
            offset_time: 0.0,
        }
    }

    /// Resume from a loaded work file: range, key, dp bits and table come
    /// from the file.
    pub fn from_loaded(mut params: SearchParams, loaded: LoadedWork) -> Self {
        if params.dp_bits < 0 {
            params.dp_bits = loaded.header.dp_bits as i32;
        }
        let mut c = Coordinator::new(
            params,
            loaded.header.range_start,
            loaded.header.range_end,
            vec![loaded.header.key],
        );
        c.offset_count = loaded.header.total_count;
        c.offset_time = loaded.header.total_time;
        c.loaded = Some(loaded);
        c
    }

    fn worker_sizes(&self) -> Vec<u64> {
        let mut sizes = Vec::new();
        for _ in 0..self.params.cpu_threads {
            sizes.push(self.params.cpu_group_size as u64);
        }
        for _ in &self.params.gpu_backends {
            let (gx, gy) = self.params.gpu_grid;
            sizes.push((gx * gy * crate::gpu::GPU_GRP_SIZE) as u64);
        }
        sizes
    }

    /// Solve every configured key in turn.
    pub fn run(&mut self) -> Result<Vec<KeyOutcome>> {
        let started = Instant::now();
        let range = RangeInfo::new(self.range_start, self.range_end);
        info!("range width: 2^{}", range.power);

        let worker_sizes = self.worker_sizes();
        let total_rw: u64 = worker_sizes.iter().sum();
        if total_rw == 0 {
            return Err(crate::error::Error::Input("no CPU or GPU worker configured".into()));
        }
        info!("number of kangaroos: 2^{:.2}", (total_rw as f64).log2());

        let suggested = suggest_dp_bits(total_rw, range.power, self.params.use_symmetry);
        if self.params.dp_bits < 0 {
            self.params.dp_bits = suggested as i32;
            if self.loaded.is_none() {
                info!("suggested DP: {suggested}");
            }
        }
        let (expected_ops, expected_ram, _) = compute_expected(
            self.params.dp_bits as f64,
            total_rw,
            range.power,
            self.params.use_symmetry,
        );
        info!(
            "DP size: {} [0x{:016x}]",
            self.params.dp_bits,
            crate::dp::dp_mask(self.params.dp_bits as u32)
        );
        info!("expected operations: 2^{:.2}", expected_ops.log2());
        info!("expected RAM: {expected_ram:.1}MB");

        let jumps = JumpTable::build(&self.curve, range.power, self.params.use_symmetry);

        let mut outcomes = Vec::new();
        for key_index in 0..self.keys.len() {
            let key = self.keys[key_index];
            let ctx = Arc::new(KeyContext::new(
                self.curve.clone(),
                self.params.clone(),
                jumps.clone(),
                range.clone(),
                key,
                key_index,
                expected_ops,
                &worker_sizes,
            ));

            // resume state applies to the first key only
            let mut loaded_kangaroos: Vec<KangarooState> = Vec::new();
            if key_index == 0 {
                if let Some(loaded) = self.loaded.take() {
                    *ctx.table.lock().unwrap() = loaded.table;
                    loaded_kangaroos = loaded.kangaroos;
                    info!(
                        "resumed work: {} DPs, {} kangaroos",
                        ctx.table.lock().unwrap().nb_item(),
                        loaded_kangaroos.len()
                    );
                }
            }

            let outcome = self.solve_key(Arc::clone(&ctx), loaded_kangaroos)?;
            outcomes.push(outcome);
        }

        info!(
            "done: total time {:.1}s",
            started.elapsed().as_secs_f64() + self.offset_time
        );
        Ok(outcomes)
    }

    fn solve_key(
        &mut self,
        ctx: Arc<KeyContext>,
        mut loaded_kangaroos: Vec<KangarooState>,
    ) -> Result<KeyOutcome> {
        let mut handles = Vec::new();

        // CPU workers
        for t in 0..ctx.params.cpu_threads {
            let ctx_w = Arc::clone(&ctx);
            let initial = take_states(&mut loaded_kangaroos, ctx.params.cpu_group_size);
            handles.push(std::thread::spawn(move || {
                if ctx_w.key_index == 0 {
                    info!(
                        "SolveKeyCPU thread {t}: {} kangaroos",
                        ctx_w.params.cpu_group_size
                    );
                }
                let stepper = CpuStepper::new(Arc::clone(&ctx_w), initial);
                worker_loop(ctx_w, Box::new(stepper), t);
            }));
        }

        // device workers
        for (i, backend_name) in ctx.params.gpu_backends.iter().enumerate() {
            let worker_id = ctx.params.cpu_threads + i;
            let ctx_w = Arc::clone(&ctx);
            let name = backend_name.clone();
            let (gx, gy) = ctx.params.gpu_grid;
            let initial =
                take_states(&mut loaded_kangaroos, gx * gy * crate::gpu::GPU_GRP_SIZE);
            handles.push(std::thread::spawn(move || {
                let slot = &ctx_w.workers[worker_id];
                slot.is_running.store(true, Ordering::Relaxed);
                match create_backend(&name)
                    .and_then(|b| DeviceStepper::new(Arc::clone(&ctx_w), b, initial))
                {
                    Ok(stepper) => {
                        if ctx_w.key_index == 0 {
                            info!(
                                "SolveKeyGPU [{}]: 2^{:.2} kangaroos",
                                stepper.backend_name(),
                                (stepper.kangaroo_count() as f64).log2()
                            );
                        }
                        worker_loop(ctx_w, Box::new(stepper), worker_id);
                    }
                    Err(e) => {
                        // a failed device aborts that worker only
                        error!("device worker {name}: {e}");
                        let slot = &ctx_w.workers[worker_id];
                        slot.has_started.store(true, Ordering::Relaxed);
                        slot.is_running.store(false, Ordering::Relaxed);
                    }
                }
            }));
        }

        if !loaded_kangaroos.is_empty() {
            warn!("{} loaded kangaroos could not be placed", loaded_kangaroos.len());
        }

        // gap scanner
        let gap_ctx = Arc::clone(&ctx);
        let gap_handle = std::thread::spawn(move || gap_scanner(gap_ctx));

        self.process(&ctx);
        // every worker is gone (solved, aborted or failed); release the
        // scanner and any late barrier waiters
        ctx.end_of_search.store(true, Ordering::Release);

        for h in handles {
            let _ = h.join();
        }
        let _ = gap_handle.join();

        ctx.table.lock().unwrap().reset();

        let solution = ctx.solution.lock().unwrap().take();
        match solution {
            Some(sol) => Ok(KeyOutcome::Solved(sol)),
            None => Ok(KeyOutcome::Aborted),
        }
    }

    /// Statistics/checkpoint loop; returns when every worker has stopped.
    fn process(&mut self, ctx: &KeyContext) {
        let writer = CheckpointWriter::new();

        while !ctx.all_started() {
            std::thread::sleep(Duration::from_millis(5));
        }

        let start = Instant::now();
        let mut t0 = Instant::now();
        let mut last_count = ctx.total_count();
        let mut last_save = Instant::now();
        let mut rates = [0f64; RATE_FILTER];
        let mut filter_pos = 0usize;

        while ctx.is_alive() {
            let mut waited = Duration::ZERO;
            while ctx.is_alive() && waited < STATS_PERIOD {
                std::thread::sleep(Duration::from_millis(50));
                waited += Duration::from_millis(50);
            }

            let count = ctx.total_count();
            let dt = t0.elapsed().as_secs_f64();
            t0 = Instant::now();
            rates[filter_pos % RATE_FILTER] = (count - last_count) as f64 / dt.max(1e-9);
            filter_pos += 1;
            let samples = filter_pos.min(RATE_FILTER);
            let avg_rate = rates[..samples].iter().sum::<f64>() / samples as f64;
            let expected_time = ctx.expected_ops / avg_rate.max(1e-9);

            if ctx.is_alive() && !ctx.ended() {
                let (nb_tame, nb_wild, size_info) = {
                    let table = ctx.table.lock().unwrap();
                    (table.nb_tame(), table.nb_wild(), table.size_info())
                };
                let tw = if nb_wild > 0 { nb_tame as f64 / nb_wild as f64 } else { 0.0 };
                let gaps = ctx.gaps.lock().unwrap().clone();
                print!(
                    "\r[{:.2} MK/s][Count 2^{:.2}][Dead {}][T/W:{:.3}][Gap:{:.1}][L.Gap:{:.1}][{:.0}s (Avg {:.0}s)][{}]  ",
                    avg_rate / 1e6,
                    ((count + self.offset_count).max(1) as f64).log2(),
                    ctx.dead_kangaroos.load(Ordering::Relaxed),
                    tw,
                    gaps.last_gap as f64 / 1e9,
                    gaps.lowest_gap as f64 / 1e9,
                    start.elapsed().as_secs_f64() + self.offset_time,
                    expected_time,
                    size_info,
                );
                let _ = std::io::stdout().flush();
            }

            // periodic checkpoint
            if !ctx.ended()
                && last_save.elapsed().as_secs_f64() > ctx.params.save_period
                && (ctx.params.work_file.is_some() || ctx.params.work_text_file.is_some())
            {
                save_work(
                    ctx,
                    &writer,
                    count + self.offset_count,
                    start.elapsed().as_secs_f64() + self.offset_time,
                );
                last_save = Instant::now();
            }

            // give up when past maxStep * expected
            if self.params.max_step > 0.0
                && (count as f64) > ctx.expected_ops * self.params.max_step
                && !ctx.ended()
            {
                println!(
                    "\nKey#{:2} [XX]Pub:  0x{} ",
                    ctx.key_index,
                    ctx.curve.public_key_hex(&ctx.key)
                );
                println!("       Aborted !");
                ctx.finish(None);
            }

            last_count = count;
        }

        writer.shutdown();
    }
}

fn take_states(pool: &mut Vec<KangarooState>, count: usize) -> Option<Vec<KangarooState>> {
    if pool.is_empty() {
        return None;
    }
    let take = pool.len().min(count);
    Some(pool.drain(..take).collect())
}

/// Common worker loop for both substrates: step, submit DPs, resolve
/// collisions, honour the save barrier.
fn worker_loop(ctx: Arc<KeyContext>, mut stepper: Box<dyn Stepper>, worker_id: usize) {
    let slot = &ctx.workers[worker_id];
    slot.is_running.store(true, Ordering::Relaxed);
    slot.has_started.store(true, Ordering::Relaxed);

    while !ctx.ended() {
        let hits = match stepper.step() {
            Ok(hits) => hits,
            Err(e) => {
                error!("worker {worker_id}: {e}");
                break;
            }
        };
        ctx.counters[worker_id].fetch_add(stepper.ops_per_step(), Ordering::Relaxed);

        for hit in hits {
            if ctx.ended() {
                break;
            }
            let kind = HerdKind::from_bit(hit.kangaroo_index);
            let outcome = {
                let mut table = ctx.table.lock().unwrap();
                if ctx.ended() {
                    break;
                }
                table.add(&ctx.curve, &hit.x, &hit.d, kind)
            };
            match outcome {
                AddOutcome::Ok => {}
                AddOutcome::SameHerd => {
                    // two walkers of one herd merged; restart one of them
                    if let Err(e) = stepper.reset_kangaroo(hit.kangaroo_index) {
                        error!("worker {worker_id}: kangaroo reset failed: {e}");
                        break;
                    }
                    ctx.dead_kangaroos.fetch_add(1, Ordering::Relaxed);
                }
                AddOutcome::Cross { d, kind: stored_kind } => {
                    let resolver = Resolver::new(&ctx);
                    if let Some(sol) = resolver.resolve(&hit.d, kind, &d, stored_kind) {
                        ctx.finish(Some(sol));
                    }
                }
            }
        }

        if ctx.save_request.load(Ordering::Acquire) && !ctx.ended() {
            if ctx.params.save_kangaroo {
                if let Ok(states) = stepper.snapshot() {
                    *slot.herd_snapshot.lock().unwrap() = states;
                }
            }
            slot.is_waiting.store(true, Ordering::Release);
            drop(ctx.save_barrier.lock().unwrap());
            slot.is_waiting.store(false, Ordering::Release);
        }
    }

    slot.is_running.store(false, Ordering::Relaxed);
}

/// Periodically sweeps the table for the smallest cross-herd distance gap.
fn gap_scanner(ctx: Arc<KeyContext>) {
    while !ctx.ended() {
        let mut waited = Duration::ZERO;
        while !ctx.ended() && waited < GAP_SCAN_PERIOD {
            std::thread::sleep(Duration::from_millis(50));
            waited += Duration::from_millis(50);
        }
        if ctx.ended() {
            break;
        }

        let mut min_gap: Option<u128> = None;
        let mut last_gap: Option<u128> = None;
        for h in 0..HASH_SIZE {
            if ctx.ended() {
                break;
            }
            let items = {
                let table = ctx.table.lock().unwrap();
                let bucket = table.bucket(h);
                if bucket.items.len() < 2 {
                    continue;
                }
                bucket.items.clone()
            };
            if let Some((bucket_min, bucket_last)) = bucket_min_gap(&items) {
                last_gap = Some(bucket_last);
                min_gap = Some(min_gap.map_or(bucket_min, |m| m.min(bucket_min)));
            }
        }

        if let Some(min) = min_gap {
            let mut gaps = ctx.gaps.lock().unwrap();
            gaps.last_gap = last_gap.unwrap_or(min);
            if min < gaps.lowest_gap {
                gaps.lowest_gap = min;
            }
        }
    }
}

/// Assemble a ready-to-use context around `secret`·G for unit tests.
#[cfg(test)]
pub(crate) fn build_context_for_tests(
    mut params: SearchParams,
    range_start: BigInt256,
    range_end: BigInt256,
    secret: BigInt256,
) -> Arc<KeyContext> {
    let curve = Secp256k1::new();
    let range = RangeInfo::new(range_start, range_end);
    let key = curve.mul_g(&secret);
    if params.dp_bits < 0 {
        params.dp_bits = 0;
    }
    let jumps = JumpTable::build(&curve, range.power, params.use_symmetry);
    let (expected_ops, _, _) =
        compute_expected(params.dp_bits as f64, 1024, range.power, params.use_symmetry);
    Arc::new(KeyContext::new(curve, params, jumps, range, key, 0, expected_ops, &[1]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suggested_dp_is_clamped_at_zero() {
        // tiny range with many kangaroos: rangeBits/2 - log2(W) is negative
        assert_eq!(suggest_dp_bits(1 << 12, 20, false), 0);
    }

    #[test]
    fn suggested_dp_for_large_range() {
        let dp = suggest_dp_bits(1 << 12, 64, false);
        assert!(dp > 0 && dp <= 20, "dp {dp}");
        let (_, _, overhead) = compute_expected(dp as f64, 1 << 12, 64, false);
        assert!(overhead <= 1.05);
    }

    #[test]
    fn expected_ops_scale_with_sqrt_n() {
        let (op40, _, _) = compute_expected(0.0, 1, 40, false);
        let (op44, _, _) = compute_expected(0.0, 1, 44, false);
        // dp 0, one kangaroo: op ≈ Z0·√N, so +4 range bits ≈ ×4
        let ratio = op44 / op40;
        assert!(ratio > 3.0 && ratio < 5.5, "ratio {ratio}");
    }

    #[test]
    fn symmetry_reduces_expected_work() {
        let (plain, _, _) = compute_expected(4.0, 64, 40, false);
        let (sym, _, _) = compute_expected(4.0, 64, 40, true);
        assert!(sym < plain);
    }
}

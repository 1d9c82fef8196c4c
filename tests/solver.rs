//! End-to-end solver scenarios

use kangaroo::math::bigint::BigInt256;
use kangaroo::math::secp::Secp256k1;
use kangaroo::workfile;
use kangaroo::{Coordinator, KeyOutcome, SearchParams};
use tempfile::tempdir;

fn solve_once(
    params: SearchParams,
    start: BigInt256,
    end: BigInt256,
    secret: BigInt256,
) -> KeyOutcome {
    let curve = Secp256k1::new();
    let key = curve.mul_g(&secret);
    let mut coordinator = Coordinator::new(params, start, end, vec![key]);
    coordinator.run().expect("run must not error").remove(0)
}

fn assert_solved(outcome: &KeyOutcome, secret: &BigInt256) {
    match outcome {
        KeyOutcome::Solved(sol) => assert_eq!(&sol.private_key, secret),
        KeyOutcome::Aborted => panic!("search aborted instead of solving"),
    }
}

#[test]
fn solves_small_range_key() {
    // range [0x100, 0x200), pubkey 0x123·G
    let secret = BigInt256::from_u64(0x123);
    let params = SearchParams {
        dp_bits: 0,
        cpu_threads: 1,
        cpu_group_size: 16,
        ..SearchParams::default()
    };
    let outcome = solve_once(
        params,
        BigInt256::from_u64(0x100),
        BigInt256::from_u64(0x200),
        secret,
    );
    assert_solved(&outcome, &secret);
    if let KeyOutcome::Solved(sol) = outcome {
        assert!(sol.private_key.to_hex_padded().ends_with("123"));
    }
}

#[test]
fn solves_mid_range_key_with_auto_dp() {
    // range [2^32, 2^32 + 2^20), pubkey (2^32 + 0x5A5A5)·G
    let start = BigInt256::from_u64(1 << 32);
    let end = BigInt256::from_u64((1 << 32) + (1 << 20));
    let secret = BigInt256::from_u64((1 << 32) + 0x5A5A5);
    let params = SearchParams {
        dp_bits: -1,
        cpu_threads: 1,
        cpu_group_size: 256,
        ..SearchParams::default()
    };
    assert_solved(&solve_once(params, start, end, secret), &secret);
}

#[test]
fn width_one_range_solves_immediately() {
    let secret = BigInt256::from_u64(0x100);
    let params = SearchParams {
        dp_bits: 0,
        cpu_threads: 1,
        cpu_group_size: 8,
        ..SearchParams::default()
    };
    let outcome = solve_once(
        params,
        BigInt256::from_u64(0x100),
        BigInt256::from_u64(0x101),
        secret,
    );
    assert_solved(&outcome, &secret);
}

#[test]
fn symmetric_walk_solves() {
    let secret = BigInt256::from_u64(0x1B3);
    let params = SearchParams {
        dp_bits: 0,
        use_symmetry: true,
        cpu_threads: 1,
        cpu_group_size: 16,
        ..SearchParams::default()
    };
    let outcome = solve_once(
        params,
        BigInt256::from_u64(0x100),
        BigInt256::from_u64(0x200),
        secret,
    );
    assert_solved(&outcome, &secret);
}

#[test]
fn device_worker_solves() {
    // reference backend only, no CPU workers
    let start = BigInt256::from_u64(1 << 20);
    let end = BigInt256::from_u64((1 << 20) + (1 << 16));
    let secret = BigInt256::from_u64((1 << 20) + 0x1234);
    let params = SearchParams {
        dp_bits: -1,
        cpu_threads: 0,
        gpu_backends: vec!["reference".into()],
        gpu_grid: (1, 1),
        ..SearchParams::default()
    };
    assert_solved(&solve_once(params, start, end, secret), &secret);
}

#[test]
fn two_threads_share_the_table() {
    let secret = BigInt256::from_u64(0x8_0000 + 0x777);
    let params = SearchParams {
        dp_bits: 2,
        cpu_threads: 2,
        cpu_group_size: 64,
        ..SearchParams::default()
    };
    let outcome = solve_once(
        params,
        BigInt256::from_u64(0x8_0000),
        BigInt256::from_u64(0x10_0000),
        secret,
    );
    assert_solved(&outcome, &secret);
}

#[test]
fn checkpoint_then_resume_finds_the_key() {
    use kangaroo::kangaroo::context::KeyContext;
    use kangaroo::kangaroo::coordinator::compute_expected;
    use kangaroo::kangaroo::{CpuStepper, JumpTable, Stepper};
    use kangaroo::types::{HerdKind, RangeInfo};
    use kangaroo::workfile::{save_work_binary, TableImage, WorkHeader};
    use std::sync::Arc;

    let dir = tempdir().unwrap();
    let work = dir.path().join("resume.work");
    let curve = Secp256k1::new();

    let start = BigInt256::from_u64(1 << 24);
    let end = BigInt256::from_u64(1 << 25);
    let secret = BigInt256::from_u64((1 << 24) + 0xBEEF5);
    let key = curve.mul_g(&secret);

    // phase 1: walk a herd for a while, recording DPs but never resolving,
    // then checkpoint table and kangaroos
    let dp_bits = 4;
    let params = SearchParams {
        dp_bits,
        cpu_threads: 1,
        cpu_group_size: 64,
        ..SearchParams::default()
    };
    let range = RangeInfo::new(start, end);
    let jumps = JumpTable::build(&curve, range.power, false);
    let (expected, _, _) = compute_expected(dp_bits as f64, 64, range.power, false);
    let ctx = Arc::new(KeyContext::new(
        curve.clone(),
        params,
        jumps,
        range,
        key,
        0,
        expected,
        &[1],
    ));
    let mut stepper = CpuStepper::new(Arc::clone(&ctx), None);
    let mut steps = 0u64;
    for _ in 0..20 {
        for hit in stepper.step().unwrap() {
            let kind = HerdKind::from_bit(hit.kangaroo_index);
            let mut table = ctx.table.lock().unwrap();
            // cross collisions are deliberately dropped: phase 1 must not solve
            let _ = table.add(&ctx.curve, &hit.x, &hit.d, kind);
        }
        steps += stepper.ops_per_step();
    }
    let states = stepper.snapshot().unwrap();
    let header = WorkHeader {
        dp_bits: dp_bits as u32,
        range_start: start,
        range_end: end,
        key,
        total_count: steps,
        total_time: 1.0,
    };
    let image = TableImage::capture(&ctx.table.lock().unwrap());
    save_work_binary(&work, &header, &image, Some(&states)).unwrap();

    // phase 2: resume and run to completion
    let loaded = workfile::load_work(&work, &curve).unwrap();
    assert_eq!(loaded.header.range_start, start);
    assert_eq!(loaded.kangaroos.len(), 64);
    let params = SearchParams {
        dp_bits: -1,
        cpu_threads: 1,
        cpu_group_size: 64,
        ..SearchParams::default()
    };
    let mut phase2 = Coordinator::from_loaded(params, loaded);
    let outcome = phase2.run().unwrap().remove(0);
    assert_solved(&outcome, &secret);
}

#[test]
fn abort_gives_up_when_the_key_is_not_in_range() {
    // secret far outside the range: every cross collision fails resolution
    // and the maxStep limit eventually fires
    let secret = BigInt256::from_u64(1 << 40);
    let params = SearchParams {
        dp_bits: 0,
        cpu_threads: 1,
        cpu_group_size: 16,
        max_step: 2.0,
        ..SearchParams::default()
    };
    let outcome = solve_once(
        params,
        BigInt256::from_u64(0x100),
        BigInt256::from_u64(0x200),
        secret,
    );
    assert!(matches!(outcome, KeyOutcome::Aborted));
}

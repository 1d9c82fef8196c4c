//! Work file format scenarios

use kangaroo::dp::HashTable;
use kangaroo::error::Error;
use kangaroo::math::bigint::BigInt256;
use kangaroo::math::field::FieldElement;
use kangaroo::math::secp::Secp256k1;
use kangaroo::types::{HerdKind, KangarooState, Point};
use kangaroo::workfile::{
    load_work, load_work_text, save_work_binary, save_work_text, TableImage, WorkHeader,
};
use tempfile::tempdir;

fn sample_state(curve: &Secp256k1) -> (WorkHeader, HashTable, Vec<KangarooState>) {
    let header = WorkHeader {
        dp_bits: 6,
        range_start: BigInt256::from_u64(0x4000),
        range_end: BigInt256::from_u64(0x8000),
        key: curve.mul_g(&BigInt256::from_u64(0x5123)),
        total_count: 9876,
        total_time: 12.25,
    };
    let mut table = HashTable::new();
    for i in 1..100u64 {
        let x = FieldElement::new([i, i * i, i * 31, 0]);
        let kind = if i % 3 == 0 { HerdKind::Wild } else { HerdKind::Tame };
        let d = if i % 2 == 0 {
            BigInt256::from_u64(i * 17)
        } else {
            // negative distances exercise the signed packing
            Secp256k1::new().order_neg(&BigInt256::from_u64(i * 17))
        };
        table.add(curve, &x, &d, kind);
    }
    let kangaroos = (0..8u64)
        .map(|i| KangarooState {
            x: BigInt256::from_u64(i + 1),
            y: BigInt256::from_u64(i + 100),
            d: BigInt256::from_u64(i + 1000),
        })
        .collect();
    (header, table, kangaroos)
}

#[test]
fn binary_and_text_mirrors_agree() {
    let curve = Secp256k1::new();
    let dir = tempdir().unwrap();
    let bin = dir.path().join("w.work");
    let txt = dir.path().join("w.txt");

    let (header, table, kangaroos) = sample_state(&curve);
    let image = TableImage::capture(&table);
    save_work_binary(&bin, &header, &image, Some(&kangaroos)).unwrap();
    save_work_text(&txt, &header, &image, Some(&kangaroos)).unwrap();

    let from_bin = load_work(&bin, &curve).unwrap();
    let from_txt = load_work_text(&txt, &curve).unwrap();

    assert_eq!(from_bin.header.dp_bits, from_txt.header.dp_bits);
    assert_eq!(from_bin.header.range_start, from_txt.header.range_start);
    assert_eq!(from_bin.header.total_count, from_txt.header.total_count);
    assert_eq!(from_bin.header.total_time, from_txt.header.total_time);
    assert_eq!(from_bin.header.key, from_txt.header.key);
    assert_eq!(from_bin.kangaroos, from_txt.kangaroos);
    assert_eq!(from_bin.table.nb_item(), from_txt.table.nb_item());
    for h in 0..kangaroo::dp::HASH_SIZE {
        assert_eq!(from_bin.table.bucket(h).items, from_txt.table.bucket(h).items);
    }
}

#[test]
fn text_kangaroo_count_mismatch_is_corrupt() {
    let curve = Secp256k1::new();
    let dir = tempdir().unwrap();
    let txt = dir.path().join("bad.txt");
    let (header, table, kangaroos) = sample_state(&curve);
    save_work_text(&txt, &header, &TableImage::capture(&table), Some(&kangaroos)).unwrap();

    // drop the last two K lines so KANGAROOS disagrees with reality
    let content = std::fs::read_to_string(&txt).unwrap();
    let mut lines: Vec<&str> = content.lines().collect();
    lines.truncate(lines.len() - 2);
    std::fs::write(&txt, lines.join("\n")).unwrap();

    match load_work_text(&txt, &curve) {
        Err(Error::WorkFileCorrupt(_)) => {}
        other => panic!("expected WorkFileCorrupt, got {other:?}"),
    }
}

#[test]
fn binary_bucket_header_mismatch_is_corrupt() {
    let curve = Secp256k1::new();
    let dir = tempdir().unwrap();
    let bin = dir.path().join("forged.work");
    let (header, table, _) = sample_state(&curve);
    save_work_binary(&bin, &header, &TableImage::capture(&table), None).unwrap();

    // the first bucket header sits right after the fixed 156-byte header;
    // claim one item in a bucket recorded as empty
    let mut bytes = std::fs::read(&bin).unwrap();
    assert_eq!(&bytes[..4], 0xFA6A8001u32.to_le_bytes().as_slice());
    bytes[156..160].copy_from_slice(&1u32.to_le_bytes());
    std::fs::write(&bin, &bytes).unwrap();

    match load_work(&bin, &curve) {
        Err(Error::WorkFileCorrupt(_)) => {}
        other => panic!("expected WorkFileCorrupt, got {other:?}"),
    }
}

#[test]
fn off_curve_key_in_header_is_rejected() {
    let curve = Secp256k1::new();
    let dir = tempdir().unwrap();
    let bin = dir.path().join("badkey.work");
    let (mut header, table, _) = sample_state(&curve);
    header.key = Point::new(
        FieldElement::new([1, 0, 0, 0]),
        FieldElement::new([1, 0, 0, 0]),
    );
    save_work_binary(&bin, &header, &TableImage::capture(&table), None).unwrap();
    match load_work(&bin, &curve) {
        Err(Error::Input(_)) => {}
        other => panic!("expected input error, got {other:?}"),
    }
}

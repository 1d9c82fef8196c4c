//! Work files
//!
//! Binary format (little-endian): header, per-bucket entry dump, optional
//! kangaroo states. The text format is a line-oriented mirror meant for
//! inspection and diffing. Only the low 128 bits of each stored x and the
//! 127-bit packed distance are meaningful; upper bits are zero on write and
//! ignored on read.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, Write};
use std::path::Path;

use log::info;
use rayon::prelude::*;

use crate::dp::table::{unpack_dist, Entry};
use crate::dp::{dp_mask, is_dp, HashTable, HASH_SIZE};
use crate::error::{Error, Result};
use crate::kangaroo::context::init_search_key;
use crate::math::bigint::BigInt256;
use crate::math::field::FieldElement;
use crate::math::secp::Secp256k1;
use crate::types::{HerdKind, KangarooState, Point, RangeInfo};

/// Work file with hash table.
pub const HEADW: u32 = 0xFA6A8001;
/// Kangaroo-only file (client saves, external tools).
pub const HEADK: u32 = 0xFA6A8002;
/// Compressed kangaroo-only file.
pub const HEADKS: u32 = 0xFA6A8003;

pub const VERSION: u32 = 0;

#[derive(Debug, Clone)]
pub struct WorkHeader {
    pub dp_bits: u32,
    pub range_start: BigInt256,
    pub range_end: BigInt256,
    pub key: Point,
    pub total_count: u64,
    pub total_time: f64,
}

/// Flat copy of the hash table, cheap to move to the writer thread.
#[derive(Debug, Clone, Default)]
pub struct TableImage {
    /// (nb_item, max_item) per bucket.
    pub headers: Vec<(u32, u32)>,
    pub entries: Vec<Entry>,
}

impl TableImage {
    pub fn capture(table: &HashTable) -> Self {
        let mut headers = Vec::with_capacity(HASH_SIZE);
        let mut entries = Vec::with_capacity(table.nb_item() as usize);
        for h in 0..HASH_SIZE {
            let bucket = table.bucket(h);
            headers.push((bucket.items.len() as u32, bucket.max_item));
            entries.extend_from_slice(&bucket.items);
        }
        TableImage { headers, entries }
    }
}

#[derive(Debug)]
pub struct LoadedWork {
    pub version: u32,
    pub header: WorkHeader,
    pub table: HashTable,
    pub kangaroos: Vec<KangarooState>,
}

// ---- binary ---------------------------------------------------------------

fn u128_to_bytes32(v: u128) -> [u8; 32] {
    let mut out = [0u8; 32];
    out[..16].copy_from_slice(&v.to_le_bytes());
    out
}

fn read_exact(r: &mut impl Read, buf: &mut [u8], what: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::WorkFileCorrupt(format!("truncated {what}"))
        } else {
            Error::Io(e)
        }
    })
}

fn read_u32(r: &mut impl Read, what: &str) -> Result<u32> {
    let mut b = [0u8; 4];
    read_exact(r, &mut b, what)?;
    Ok(u32::from_le_bytes(b))
}

fn read_u64(r: &mut impl Read, what: &str) -> Result<u64> {
    let mut b = [0u8; 8];
    read_exact(r, &mut b, what)?;
    Ok(u64::from_le_bytes(b))
}

fn read_f64(r: &mut impl Read, what: &str) -> Result<f64> {
    let mut b = [0u8; 8];
    read_exact(r, &mut b, what)?;
    Ok(f64::from_le_bytes(b))
}

fn read_u256(r: &mut impl Read, what: &str) -> Result<BigInt256> {
    let mut b = [0u8; 32];
    read_exact(r, &mut b, what)?;
    Ok(BigInt256::from_bytes_le(&b))
}

/// Write a HEADW work file; returns the byte size.
pub fn save_work_binary(
    path: &Path,
    header: &WorkHeader,
    image: &TableImage,
    kangaroos: Option<&[KangarooState]>,
) -> Result<u64> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    w.write_all(&HEADW.to_le_bytes())?;
    w.write_all(&VERSION.to_le_bytes())?;
    w.write_all(&header.dp_bits.to_le_bytes())?;
    w.write_all(&header.range_start.to_bytes_le())?;
    w.write_all(&header.range_end.to_bytes_le())?;
    w.write_all(&header.key.x.to_bigint().to_bytes_le())?;
    w.write_all(&header.key.y.to_bigint().to_bytes_le())?;
    w.write_all(&header.total_count.to_le_bytes())?;
    w.write_all(&header.total_time.to_le_bytes())?;

    let mut offset = 0usize;
    for &(nb, max) in &image.headers {
        w.write_all(&nb.to_le_bytes())?;
        w.write_all(&max.to_le_bytes())?;
        for entry in &image.entries[offset..offset + nb as usize] {
            w.write_all(&u128_to_bytes32(entry.x))?;
            w.write_all(&u128_to_bytes32(entry.d))?;
            let k_type = (entry.d >> 127) as u32;
            w.write_all(&k_type.to_le_bytes())?;
        }
        offset += nb as usize;
    }

    let nb_kangaroos = kangaroos.map_or(0, |k| k.len() as u64);
    w.write_all(&nb_kangaroos.to_le_bytes())?;
    if let Some(states) = kangaroos {
        for s in states {
            w.write_all(&s.x.to_bytes_le())?;
            w.write_all(&s.y.to_bytes_le())?;
            w.write_all(&s.d.to_bytes_le())?;
        }
    }

    w.flush()?;
    Ok(std::fs::metadata(path)?.len())
}

/// Load a HEADW work file. Structural damage is rejected before any kangaroo
/// is returned.
pub fn load_work(path: &Path, curve: &Secp256k1) -> Result<LoadedWork> {
    let file = File::open(path)?;
    let len = file.metadata()?.len();
    let mut r = BufReader::new(file);

    let magic = read_u32(&mut r, "header")?;
    match magic {
        HEADW => {}
        HEADK | HEADKS => {
            return Err(Error::Input(format!(
                "{} is a kangaroo-only file, a work file is expected here",
                path.display()
            )))
        }
        _ => {
            return Err(Error::WorkFileCorrupt(format!("{} is not a work file", path.display())))
        }
    }
    let version = read_u32(&mut r, "header")?;
    let dp_bits = read_u32(&mut r, "header")?;
    let range_start = read_u256(&mut r, "header")?;
    let range_end = read_u256(&mut r, "header")?;
    let key_x = read_u256(&mut r, "header")?;
    let key_y = read_u256(&mut r, "header")?;
    let total_count = read_u64(&mut r, "header")?;
    let total_time = read_f64(&mut r, "header")?;

    let key = Point::new(FieldElement::from_bigint(&key_x), FieldElement::from_bigint(&key_y));
    if !curve.is_on_curve(&key) {
        return Err(Error::Input("work file key does not lie on the curve".into()));
    }

    let mut table = HashTable::new();
    for h in 0..HASH_SIZE {
        let nb = read_u32(&mut r, "bucket header")?;
        let max = read_u32(&mut r, "bucket header")?;
        if nb > max {
            return Err(Error::WorkFileCorrupt(format!(
                "bucket {h}: item count {nb} exceeds recorded capacity {max}"
            )));
        }
        let mut items = Vec::with_capacity(nb as usize);
        for _ in 0..nb {
            let x = read_u256(&mut r, "entry")?.low_u128();
            let d = read_u256(&mut r, "entry")?.low_u128();
            let k_type = read_u32(&mut r, "entry")?;
            if k_type > 1 {
                return Err(Error::WorkFileCorrupt(format!(
                    "bucket {h}: invalid herd type {k_type}"
                )));
            }
            if k_type as u128 != d >> 127 {
                return Err(Error::WorkFileCorrupt(format!(
                    "bucket {h}: herd type disagrees with packed distance"
                )));
            }
            items.push(Entry { x, d });
        }
        table.load_bucket(h, max, items);
    }

    let nb_kangaroos = read_u64(&mut r, "kangaroo count")?;
    let pos = r.stream_position()?;
    if nb_kangaroos.checked_mul(96) != Some(len - pos) {
        return Err(Error::WorkFileCorrupt(format!(
            "kangaroo count {nb_kangaroos} disagrees with file size"
        )));
    }
    let mut kangaroos = Vec::with_capacity(nb_kangaroos as usize);
    for _ in 0..nb_kangaroos {
        let x = read_u256(&mut r, "kangaroo")?;
        let y = read_u256(&mut r, "kangaroo")?;
        let d = read_u256(&mut r, "kangaroo")?;
        kangaroos.push(KangarooState { x, y, d });
    }

    Ok(LoadedWork {
        version,
        header: WorkHeader { dp_bits, range_start, range_end, key, total_count, total_time },
        table,
        kangaroos,
    })
}

// ---- text -----------------------------------------------------------------

/// Line-oriented mirror of the binary format.
pub fn save_work_text(
    path: &Path,
    header: &WorkHeader,
    image: &TableImage,
    kangaroos: Option<&[KangarooState]>,
) -> Result<u64> {
    let file = File::create(path)?;
    let mut w = BufWriter::new(file);

    writeln!(w, "VERSION {VERSION}")?;
    writeln!(w, "DP_BITS {}", header.dp_bits)?;
    writeln!(w, "START {}", header.range_start.to_hex())?;
    writeln!(w, "STOP {}", header.range_end.to_hex())?;
    writeln!(w, "KEYX {}", header.key.x.to_bigint().to_hex())?;
    writeln!(w, "KEYY {}", header.key.y.to_bigint().to_hex())?;
    writeln!(w, "COUNT {}", header.total_count)?;
    writeln!(w, "TIME {}", header.total_time)?;
    writeln!(w, "HASH_SIZE {HASH_SIZE}")?;

    let mut offset = 0usize;
    for (h, &(nb, max)) in image.headers.iter().enumerate() {
        writeln!(w, "BUCKET {h} {nb} {max}")?;
        for entry in &image.entries[offset..offset + nb as usize] {
            writeln!(
                w,
                "ITEM {} {} {}",
                BigInt256::from_u128(entry.x).to_hex(),
                BigInt256::from_u128(entry.d).to_hex(),
                (entry.d >> 127) as u32
            )?;
        }
        offset += nb as usize;
    }

    let nb_kangaroos = kangaroos.map_or(0, |k| k.len() as u64);
    writeln!(w, "KANGAROOS {nb_kangaroos}")?;
    if let Some(states) = kangaroos {
        for s in states {
            writeln!(w, "K {} {} {}", s.x.to_hex(), s.y.to_hex(), s.d.to_hex())?;
        }
    }

    w.flush()?;
    Ok(std::fs::metadata(path)?.len())
}

fn text_field<'a>(line: Option<&'a str>, key: &str) -> Result<&'a str> {
    let line = line
        .ok_or_else(|| Error::WorkFileCorrupt(format!("missing {key} line")))?;
    line.strip_prefix(key)
        .map(str::trim)
        .ok_or_else(|| Error::WorkFileCorrupt(format!("expected {key} line, got {line:?}")))
}

fn parse_num<T: std::str::FromStr>(s: &str, what: &str) -> Result<T> {
    s.parse()
        .map_err(|_| Error::WorkFileCorrupt(format!("invalid {what}: {s:?}")))
}

/// Parse the text mirror back into the same structures.
pub fn load_work_text(path: &Path, curve: &Secp256k1) -> Result<LoadedWork> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let lines: Vec<String> = reader.lines().collect::<std::io::Result<_>>()?;
    let mut it = lines.iter().map(String::as_str);

    let version: u32 = parse_num(text_field(it.next(), "VERSION")?, "version")?;
    let dp_bits: u32 = parse_num(text_field(it.next(), "DP_BITS")?, "dp bits")?;
    let range_start = BigInt256::from_hex(text_field(it.next(), "START")?)
        .map_err(|e| Error::WorkFileCorrupt(e.to_string()))?;
    let range_end = BigInt256::from_hex(text_field(it.next(), "STOP")?)
        .map_err(|e| Error::WorkFileCorrupt(e.to_string()))?;
    let key_x = BigInt256::from_hex(text_field(it.next(), "KEYX")?)
        .map_err(|e| Error::WorkFileCorrupt(e.to_string()))?;
    let key_y = BigInt256::from_hex(text_field(it.next(), "KEYY")?)
        .map_err(|e| Error::WorkFileCorrupt(e.to_string()))?;
    let total_count: u64 = parse_num(text_field(it.next(), "COUNT")?, "count")?;
    let total_time: f64 = parse_num(text_field(it.next(), "TIME")?, "time")?;
    let hash_size: usize = parse_num(text_field(it.next(), "HASH_SIZE")?, "hash size")?;
    if hash_size != HASH_SIZE {
        return Err(Error::WorkFileCorrupt(format!("unexpected hash size {hash_size}")));
    }

    let key = Point::new(FieldElement::from_bigint(&key_x), FieldElement::from_bigint(&key_y));
    if !curve.is_on_curve(&key) {
        return Err(Error::Input("work file key does not lie on the curve".into()));
    }

    let mut table = HashTable::new();
    let mut line = it.next();
    while let Some(l) = line {
        if !l.starts_with("BUCKET") {
            break;
        }
        let parts: Vec<&str> = l.split_whitespace().collect();
        if parts.len() != 4 {
            return Err(Error::WorkFileCorrupt(format!("malformed bucket line {l:?}")));
        }
        let h: usize = parse_num(parts[1], "bucket index")?;
        let nb: u32 = parse_num(parts[2], "bucket count")?;
        let max: u32 = parse_num(parts[3], "bucket capacity")?;
        if h >= HASH_SIZE || nb > max {
            return Err(Error::WorkFileCorrupt(format!("inconsistent bucket line {l:?}")));
        }
        let mut items = Vec::with_capacity(nb as usize);
        for _ in 0..nb {
            let item = it
                .next()
                .ok_or_else(|| Error::WorkFileCorrupt(format!("bucket {h} truncated")))?;
            let parts: Vec<&str> = item.split_whitespace().collect();
            if parts.len() != 4 || parts[0] != "ITEM" {
                return Err(Error::WorkFileCorrupt(format!(
                    "bucket {h}: item count disagrees with bucket header"
                )));
            }
            let x = BigInt256::from_hex(parts[1])
                .map_err(|e| Error::WorkFileCorrupt(e.to_string()))?
                .low_u128();
            let d = BigInt256::from_hex(parts[2])
                .map_err(|e| Error::WorkFileCorrupt(e.to_string()))?
                .low_u128();
            let k_type: u32 = parse_num(parts[3], "herd type")?;
            if k_type > 1 || k_type as u128 != d >> 127 {
                return Err(Error::WorkFileCorrupt(format!("bucket {h}: invalid herd type")));
            }
            items.push(Entry { x, d });
        }
        table.load_bucket(h, max, items);
        line = it.next();
    }

    let kang_line =
        line.ok_or_else(|| Error::WorkFileCorrupt("missing KANGAROOS line".into()))?;
    let nb_kangaroos: u64 = parse_num(text_field(Some(kang_line), "KANGAROOS")?, "kangaroo count")?;
    let mut kangaroos = Vec::with_capacity(nb_kangaroos as usize);
    for _ in 0..nb_kangaroos {
        let l = it
            .next()
            .ok_or_else(|| Error::WorkFileCorrupt("kangaroo count disagrees with K lines".into()))?;
        let parts: Vec<&str> = l.split_whitespace().collect();
        if parts.len() != 4 || parts[0] != "K" {
            return Err(Error::WorkFileCorrupt("kangaroo count disagrees with K lines".into()));
        }
        kangaroos.push(KangarooState {
            x: BigInt256::from_hex(parts[1]).map_err(|e| Error::WorkFileCorrupt(e.to_string()))?,
            y: BigInt256::from_hex(parts[2]).map_err(|e| Error::WorkFileCorrupt(e.to_string()))?,
            d: BigInt256::from_hex(parts[3]).map_err(|e| Error::WorkFileCorrupt(e.to_string()))?,
        });
    }
    if it.next().map(|l| l.starts_with('K')).unwrap_or(false) {
        return Err(Error::WorkFileCorrupt("kangaroo count disagrees with K lines".into()));
    }

    Ok(LoadedWork {
        version,
        header: WorkHeader { dp_bits, range_start, range_end, key, total_count, total_time },
        table,
        kangaroos,
    })
}

// ---- integrity check and info --------------------------------------------

/// Verify every stored DP and kangaroo against the walk invariants.
pub fn check_work_file(path: &Path, curve: &Secp256k1, use_symmetry: bool) -> Result<()> {
    let work = load_work(path, curve)?;
    let range = RangeInfo::new(work.header.range_start, work.header.range_end);
    let key_search = init_search_key(curve, &work.header.key, &range, use_symmetry);
    let mask = dp_mask(work.header.dp_bits);

    let failures: u64 = (0..HASH_SIZE)
        .into_par_iter()
        .map(|h| {
            let mut bad = 0u64;
            for entry in &work.table.bucket(h).items {
                let (d, kind) = unpack_dist(curve, entry.d);
                let candidates = entry_candidates(curve, &key_search, &d, kind, use_symmetry);
                let ok = candidates.iter().any(|p| {
                    !p.is_infinity()
                        && p.x.d[0] as u128 | (p.x.d[1] as u128) << 64 == entry.x
                        && HashTable::bucket_index(&p.x) == h
                        && is_dp(p.x.d[3], mask)
                });
                if !ok {
                    bad += 1;
                }
            }
            bad
        })
        .sum();

    let kangaroo_failures: u64 = work
        .kangaroos
        .par_iter()
        .enumerate()
        .map(|(i, s)| {
            let pos = Point::new(FieldElement::from_bigint(&s.x), FieldElement::from_bigint(&s.y));
            let candidates = entry_candidates(
                curve,
                &key_search,
                &s.d,
                HerdKind::from_bit(i as u64),
                use_symmetry,
            );
            u64::from(!candidates.iter().any(|p| p.x == pos.x))
        })
        .sum();

    info!(
        "wcheck: {} DPs, {} kangaroos",
        work.table.nb_item(),
        work.kangaroos.len()
    );
    if failures > 0 || kangaroo_failures > 0 {
        return Err(Error::WorkFileCorrupt(format!(
            "{failures} invalid DP entries, {kangaroo_failures} invalid kangaroos"
        )));
    }
    Ok(())
}

/// Expected positions for a stored distance: tame d·G, wild K + d·G, plus
/// the sign images when the symmetric walk is in use.
fn entry_candidates(
    curve: &Secp256k1,
    key_search: &Point,
    d: &BigInt256,
    kind: HerdKind,
    use_symmetry: bool,
) -> Vec<Point> {
    let dg = curve.mul_g(d);
    let mut out = match kind {
        HerdKind::Tame => vec![dg],
        HerdKind::Wild => vec![curve.add_affine(key_search, &dg)],
    };
    if use_symmetry {
        if let HerdKind::Wild = kind {
            out.push(curve.add_affine(&curve.negate_point(key_search), &dg));
        }
    }
    out
}

/// Print work file metadata (`-winfo`).
pub fn work_info(path: &Path, curve: &Secp256k1) -> Result<()> {
    let work = load_work(path, curve)?;
    println!("Version   : {}", work.version);
    println!("DP bits   : {}", work.header.dp_bits);
    println!("Start     : {}", work.header.range_start.to_hex());
    println!("Stop      : {}", work.header.range_end.to_hex());
    println!("Key       : {}", curve.public_key_hex(&work.header.key));
    println!(
        "Count     : {} 2^{:.3}",
        work.header.total_count,
        (work.header.total_count.max(1) as f64).log2()
    );
    println!("Time      : {:.1}s", work.header.total_time);
    println!(
        "DP        : {} [tame {} / wild {}] [{}]",
        work.table.nb_item(),
        work.table.nb_tame(),
        work.table.nb_wild(),
        work.table.size_info()
    );
    println!(
        "Kangaroos : {} 2^{:.3}",
        work.kangaroos.len(),
        (work.kangaroos.len().max(1) as f64).log2()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HerdKind;
    use tempfile::tempdir;

    fn sample_header(curve: &Secp256k1) -> WorkHeader {
        WorkHeader {
            dp_bits: 8,
            range_start: BigInt256::from_u64(0x100),
            range_end: BigInt256::from_u64(0x200),
            key: curve.mul_g(&BigInt256::from_u64(0x123)),
            total_count: 123456,
            total_time: 42.5,
        }
    }

    fn sample_table(curve: &Secp256k1) -> HashTable {
        let mut table = HashTable::new();
        for i in 1..40u64 {
            let x = FieldElement::new([i * 7, i, i * 3, 0]);
            let kind = if i % 2 == 0 { HerdKind::Tame } else { HerdKind::Wild };
            table.add(curve, &x, &BigInt256::from_u64(i * 1000), kind);
        }
        table
    }

    #[test]
    fn binary_round_trip_is_byte_identical() {
        let curve = Secp256k1::new();
        let dir = tempdir().unwrap();
        let p1 = dir.path().join("a.work");
        let p2 = dir.path().join("b.work");

        let header = sample_header(&curve);
        let table = sample_table(&curve);
        let kangaroos = vec![
            KangarooState {
                x: BigInt256::from_u64(11),
                y: BigInt256::from_u64(22),
                d: BigInt256::from_u64(33),
            };
            4
        ];

        save_work_binary(&p1, &header, &TableImage::capture(&table), Some(&kangaroos)).unwrap();
        let loaded = load_work(&p1, &curve).unwrap();
        assert_eq!(loaded.header.dp_bits, 8);
        assert_eq!(loaded.header.total_count, 123456);
        assert_eq!(loaded.table.nb_item(), table.nb_item());
        assert_eq!(loaded.kangaroos, kangaroos);

        save_work_binary(
            &p2,
            &loaded.header,
            &TableImage::capture(&loaded.table),
            Some(&loaded.kangaroos),
        )
        .unwrap();
        assert_eq!(std::fs::read(&p1).unwrap(), std::fs::read(&p2).unwrap());
    }

    #[test]
    fn text_round_trip_entry_for_entry() {
        let curve = Secp256k1::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.txt");

        let header = sample_header(&curve);
        let table = sample_table(&curve);
        save_work_text(&path, &header, &TableImage::capture(&table), None).unwrap();
        let loaded = load_work_text(&path, &curve).unwrap();
        assert_eq!(loaded.header.total_time, header.total_time);
        assert_eq!(loaded.table.nb_item(), table.nb_item());
        for h in 0..HASH_SIZE {
            assert_eq!(loaded.table.bucket(h).items, table.bucket(h).items);
            assert_eq!(loaded.table.bucket(h).max_item, table.bucket(h).max_item);
        }
    }

    #[test]
    fn truncated_file_is_rejected_without_kangaroos() {
        let curve = Secp256k1::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.work");
        let header = sample_header(&curve);
        let table = sample_table(&curve);
        let kangaroos = vec![
            KangarooState {
                x: BigInt256::from_u64(1),
                y: BigInt256::from_u64(2),
                d: BigInt256::from_u64(3),
            };
            8
        ];
        save_work_binary(&path, &header, &TableImage::capture(&table), Some(&kangaroos)).unwrap();

        // chop half a kangaroo off: count now disagrees with the file size
        let bytes = std::fs::read(&path).unwrap();
        std::fs::write(&path, &bytes[..bytes.len() - 48]).unwrap();
        match load_work(&path, &curve) {
            Err(Error::WorkFileCorrupt(_)) => {}
            other => panic!("expected corrupt error, got {other:?}"),
        }
    }

    #[test]
    fn wrong_magic_is_rejected() {
        let curve = Secp256k1::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("m.work");
        std::fs::write(&path, 0xDEADBEEFu32.to_le_bytes()).unwrap();
        assert!(matches!(load_work(&path, &curve), Err(Error::WorkFileCorrupt(_))));

        std::fs::write(&path, HEADK.to_le_bytes()).unwrap();
        assert!(matches!(load_work(&path, &curve), Err(Error::Input(_))));
    }

    #[test]
    fn wcheck_accepts_genuine_entries() {
        let curve = Secp256k1::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("good.work");

        // build a table whose entries really are walk states
        let range = RangeInfo::new(BigInt256::from_u64(0x100), BigInt256::from_u64(0x200));
        let key = curve.mul_g(&BigInt256::from_u64(0x155));
        let key_search = init_search_key(&curve, &key, &range, false);
        let mut table = HashTable::new();
        for i in 1..20u64 {
            let d = BigInt256::from_u64(i * 3);
            let kind = if i % 2 == 0 { HerdKind::Tame } else { HerdKind::Wild };
            let p = match kind {
                HerdKind::Tame => curve.mul_g(&d),
                HerdKind::Wild => curve.add_affine(&key_search, &curve.mul_g(&d)),
            };
            table.add(&curve, &p.x, &d, kind);
        }
        let header = WorkHeader {
            dp_bits: 0,
            range_start: range.start,
            range_end: range.end,
            key,
            total_count: 0,
            total_time: 0.0,
        };
        save_work_binary(&path, &header, &TableImage::capture(&table), None).unwrap();
        check_work_file(&path, &curve, false).unwrap();
    }

    #[test]
    fn wcheck_rejects_forged_distance() {
        let curve = Secp256k1::new();
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.work");
        let header = sample_header(&curve);
        // arbitrary x with an unrelated distance
        let mut table = HashTable::new();
        table.add(
            &curve,
            &FieldElement::new([1, 2, 3, 0]),
            &BigInt256::from_u64(999),
            HerdKind::Tame,
        );
        save_work_binary(&path, &header, &TableImage::capture(&table), None).unwrap();
        assert!(matches!(
            check_work_file(&path, &curve, false),
            Err(Error::WorkFileCorrupt(_))
        ));
    }

}

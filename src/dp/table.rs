//! DP hash table
//!
//! Fixed array of 2^18 buckets keyed on x.limb2. Each stored entry is 32
//! bytes: the low 128 bits of x plus the travelled distance packed as a
//! 127-bit signed value with the herd type in the top bit. A matching x from
//! the opposite herd is the collision that solves the key.

use crate::math::bigint::BigInt256;
use crate::math::field::FieldElement;
use crate::math::secp::Secp256k1;
use crate::types::HerdKind;

pub const HASH_SIZE: usize = 1 << 18;

const MASK127: u128 = (1 << 127) - 1;
const SIGN_BIT: u128 = 1 << 126;
const TYPE_BIT: u128 = 1 << 127;

/// Outcome of a table insertion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Ok,
    /// Same x from the same herd: the walker must reset that kangaroo.
    SameHerd,
    /// Same x from the other herd: candidate solution, stored entry returned.
    Cross { d: BigInt256, kind: HerdKind },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entry {
    pub x: u128,
    pub d: u128,
}

#[derive(Debug, Clone, Default)]
pub struct Bucket {
    pub items: Vec<Entry>,
    /// Serialized growth watermark; kept explicit so binary work files
    /// round-trip byte for byte.
    pub max_item: u32,
}

#[derive(Debug)]
pub struct HashTable {
    buckets: Vec<Bucket>,
    nb_item: u64,
    nb_tame: u64,
    nb_wild: u64,
}

/// Smallest and most recent cross-herd gap inside one bucket, on the packed
/// signed distances. Used by the gap-scanner statistic.
pub fn bucket_min_gap(entries: &[Entry]) -> Option<(u128, u128)> {
    let mut best: Option<u128> = None;
    let mut last: Option<u128> = None;
    for i in 0..entries.len() {
        for j in i + 1..entries.len() {
            if (entries[i].d >> 127) != (entries[j].d >> 127) {
                let a = packed_to_i128(entries[i].d);
                let b = packed_to_i128(entries[j].d);
                let gap = a.abs_diff(b);
                last = Some(gap);
                best = Some(best.map_or(gap, |g| g.min(gap)));
            }
        }
    }
    best.map(|b| (b, last.unwrap_or(b)))
}

/// Pack a distance (reduced mod n) into the 127-bit signed convention with
/// the herd type in bit 127.
pub fn pack_dist(curve: &Secp256k1, d: &BigInt256, kind: HerdKind) -> u128 {
    let signed = if *d <= curve.half_n {
        d.low_u128() & MASK127
    } else {
        let magnitude = curve.n.wrapping_sub(d);
        (0u128.wrapping_sub(magnitude.low_u128())) & MASK127
    };
    signed | ((kind as u128) << 127)
}

/// Reverse of [`pack_dist`].
pub fn unpack_dist(curve: &Secp256k1, packed: u128) -> (BigInt256, HerdKind) {
    let kind = HerdKind::from_bit((packed >> 127) as u64);
    let v = packed & MASK127;
    let d = if v & SIGN_BIT != 0 {
        let magnitude = (1u128 << 127) - v;
        curve.n.wrapping_sub(&BigInt256::from_u128(magnitude))
    } else {
        BigInt256::from_u128(v)
    };
    (d, kind)
}

/// Signed 127-bit pattern as an i128 (for gap statistics).
pub fn packed_to_i128(packed: u128) -> i128 {
    let v = packed & MASK127;
    if v & SIGN_BIT != 0 {
        (v | TYPE_BIT) as i128
    } else {
        v as i128
    }
}

impl HashTable {
    pub fn new() -> Self {
        HashTable {
            buckets: vec![Bucket::default(); HASH_SIZE],
            nb_item: 0,
            nb_tame: 0,
            nb_wild: 0,
        }
    }

    pub fn bucket_index(x: &FieldElement) -> usize {
        (x.d[2] as usize) & (HASH_SIZE - 1)
    }

    /// Insert a DP. Collisions are detected on the low 128 bits of x.
    pub fn add(
        &mut self,
        curve: &Secp256k1,
        x: &FieldElement,
        d: &BigInt256,
        kind: HerdKind,
    ) -> AddOutcome {
        let h = Self::bucket_index(x);
        let x128 = x.d[0] as u128 | (x.d[1] as u128) << 64;
        self.add_packed(curve, h, x128, pack_dist(curve, d, kind))
    }

    /// Insert a pre-packed entry (device readback and file load path).
    pub fn add_packed(
        &mut self,
        curve: &Secp256k1,
        h: usize,
        x128: u128,
        d128: u128,
    ) -> AddOutcome {
        let bucket = &mut self.buckets[h];
        for entry in &bucket.items {
            if entry.x == x128 {
                let (stored_d, stored_kind) = unpack_dist(curve, entry.d);
                let new_kind = HerdKind::from_bit((d128 >> 127) as u64);
                if stored_kind == new_kind {
                    return AddOutcome::SameHerd;
                }
                return AddOutcome::Cross { d: stored_d, kind: stored_kind };
            }
        }
        if bucket.items.len() as u32 >= bucket.max_item {
            bucket.max_item = (bucket.max_item * 2).max(16);
            bucket.items.reserve(bucket.max_item as usize - bucket.items.len());
        }
        bucket.items.push(Entry { x: x128, d: d128 });
        self.nb_item += 1;
        if d128 & TYPE_BIT == 0 {
            self.nb_tame += 1;
        } else {
            self.nb_wild += 1;
        }
        AddOutcome::Ok
    }

    /// Raw load path for work files: no collision handling, bucket headers as
    /// recorded.
    pub fn load_bucket(&mut self, h: usize, max_item: u32, items: Vec<Entry>) {
        for e in &items {
            if e.d & TYPE_BIT == 0 {
                self.nb_tame += 1;
            } else {
                self.nb_wild += 1;
            }
        }
        self.nb_item += items.len() as u64;
        self.buckets[h] = Bucket { items, max_item };
    }

    pub fn reset(&mut self) {
        for bucket in &mut self.buckets {
            *bucket = Bucket::default();
        }
        self.nb_item = 0;
        self.nb_tame = 0;
        self.nb_wild = 0;
    }

    pub fn bucket(&self, h: usize) -> &Bucket {
        &self.buckets[h]
    }

    pub fn nb_item(&self) -> u64 {
        self.nb_item
    }

    pub fn nb_tame(&self) -> u64 {
        self.nb_tame
    }

    pub fn nb_wild(&self) -> u64 {
        self.nb_wild
    }

    /// Approximate resident size, formatted.
    pub fn size_info(&self) -> String {
        let bytes = self.buckets.capacity() * std::mem::size_of::<Bucket>()
            + self.nb_item as usize * std::mem::size_of::<Entry>();
        format!("{:.1}MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

impl Default for HashTable {
    fn default() -> Self {
        Self::new()
    }
}

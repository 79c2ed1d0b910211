//! Shared pawn-structure cache.
//!
//! Pawn structure depends only on pawn placement, so its evaluation is
//! cached under the pawn-only Zobrist key. Entries use the same
//! XOR-verification scheme as the main transposition table: a torn
//! read fails the key check and is simply treated as a miss.

use std::sync::atomic::{AtomicU64, Ordering};

/// Cached pawn-structure scores (white minus black)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PawnEntry {
    pub mg: i32,
    pub eg: i32,
}

#[inline]
fn pack(entry: PawnEntry) -> u64 {
    (entry.mg as u32 as u64) | ((entry.eg as u32 as u64) << 32)
}

#[inline]
fn unpack(data: u64) -> PawnEntry {
    PawnEntry {
        mg: data as u32 as i32,
        eg: (data >> 32) as u32 as i32,
    }
}

/// One lock-free slot: `key_xor` holds `pawn_key ^ data`, so a read is
/// valid only when the two words belong together.
struct Slot {
    key_xor: AtomicU64,
    data: AtomicU64,
}

impl Slot {
    fn new() -> Self {
        Slot {
            key_xor: AtomicU64::new(0),
            data: AtomicU64::new(0),
        }
    }

    fn store(&self, key: u64, packed: u64) {
        self.data.store(packed, Ordering::Relaxed);
        self.key_xor.store(key ^ packed, Ordering::Relaxed);
    }

    fn probe(&self, key: u64) -> Option<PawnEntry> {
        let key_xor = self.key_xor.load(Ordering::Relaxed);
        let data = self.data.load(Ordering::Relaxed);
        if key_xor ^ data == key && data != 0 {
            Some(unpack(data))
        } else {
            None
        }
    }

    fn is_vacant(&self) -> bool {
        self.data.load(Ordering::Relaxed) == 0
    }
}

const SLOTS_PER_BUCKET: usize = 2;

struct Bucket {
    slots: [Slot; SLOTS_PER_BUCKET],
}

/// Thread-safe pawn hash table shared by all search workers.
pub struct PawnHashTable {
    buckets: Vec<Bucket>,
    mask: usize,
}

impl PawnHashTable {
    /// Create a table of roughly `size_kb` kilobytes (rounded down to a
    /// power of two of buckets).
    #[must_use]
    pub fn new(size_kb: usize) -> Self {
        let bucket_size = std::mem::size_of::<Bucket>();
        let mut num_buckets = (size_kb * 1024 / bucket_size).next_power_of_two();
        if num_buckets * bucket_size > size_kb * 1024 {
            num_buckets /= 2;
        }
        if num_buckets == 0 {
            num_buckets = 1024;
        }

        let mut buckets = Vec::with_capacity(num_buckets);
        for _ in 0..num_buckets {
            buckets.push(Bucket {
                slots: [Slot::new(), Slot::new()],
            });
        }

        PawnHashTable {
            buckets,
            mask: num_buckets - 1,
        }
    }

    #[inline]
    fn bucket(&self, key: u64) -> &Bucket {
        &self.buckets[(key as usize) & self.mask]
    }

    /// Look up the cached pawn evaluation for `pawn_key`.
    #[must_use]
    pub fn probe(&self, pawn_key: u64) -> Option<PawnEntry> {
        self.bucket(pawn_key)
            .slots
            .iter()
            .find_map(|slot| slot.probe(pawn_key))
    }

    /// Cache a pawn evaluation. Prefers a vacant or matching slot,
    /// falling back to overwriting the first one.
    pub fn store(&self, pawn_key: u64, entry: PawnEntry) {
        let packed = pack(entry);
        let bucket = self.bucket(pawn_key);
        for slot in &bucket.slots {
            if slot.is_vacant() || slot.probe(pawn_key).is_some() {
                slot.store(pawn_key, packed);
                return;
            }
        }
        bucket.slots[0].store(pawn_key, packed);
    }

    pub fn clear(&self) {
        for bucket in &self.buckets {
            for slot in &bucket.slots {
                slot.key_xor.store(0, Ordering::Relaxed);
                slot.data.store(0, Ordering::Relaxed);
            }
        }
    }
}

impl Default for PawnHashTable {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        for (mg, eg) in [(100, 200), (-500, 300), (0, 1), (i32::MAX, i32::MIN)] {
            let entry = PawnEntry { mg, eg };
            assert_eq!(unpack(pack(entry)), entry);
        }
    }

    #[test]
    fn test_store_and_probe() {
        let table = PawnHashTable::new(64);
        let key = 0x1234_5678_9ABC_DEF0;
        table.store(key, PawnEntry { mg: 150, eg: -50 });

        let entry = table.probe(key).expect("entry should be cached");
        assert_eq!(entry.mg, 150);
        assert_eq!(entry.eg, -50);
    }

    #[test]
    fn test_miss_on_other_key() {
        let table = PawnHashTable::new(64);
        table.store(0x1234_5678_9ABC_DEF0, PawnEntry { mg: 100, eg: 200 });
        assert!(table.probe(0xFEDC_BA98_7654_3210).is_none());
    }

    #[test]
    fn test_update_in_place() {
        let table = PawnHashTable::new(64);
        let key = 42;
        table.store(key, PawnEntry { mg: 1, eg: 2 });
        table.store(key, PawnEntry { mg: 3, eg: 4 });
        assert_eq!(table.probe(key), Some(PawnEntry { mg: 3, eg: 4 }));
    }

    #[test]
    fn test_clear_empties_table() {
        let table = PawnHashTable::new(64);
        table.store(7, PawnEntry { mg: 9, eg: 9 });
        table.clear();
        assert!(table.probe(7).is_none());
    }
}

//! Shared transposition table.
//!
//! Four-entry buckets of 16-byte entries, written and read lock-free by
//! all search workers. Each entry is two words: `key_word = key ^ data`
//! and `data_word = data`, so a torn read (the two words from different
//! writes) fails the `key_word ^ data_word == key` test and is treated
//! as a miss. No locks are taken anywhere on the probe/store path.
//!
//! Mate scores are stored relative to the storing node (distance to
//! mate shifted by ply) and re-offset on probe, so a mate found through
//! one path decodes correctly on any other path to the same position.

use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};

use crate::board::Move;
use crate::search::{MATE_BOUND, MATE_SCORE};

/// Bound kind of a stored score, low 2 bits of the flag byte.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Bound {
    Exact = 0,
    /// Fail-low: the score is an upper bound (`score <= alpha`)
    Alpha = 1,
    /// Fail-high: the score is a lower bound (`score >= beta`)
    Beta = 2,
}

impl Bound {
    #[inline]
    fn from_bits(bits: u8) -> Bound {
        match bits & 0x3 {
            1 => Bound::Alpha,
            2 => Bound::Beta,
            _ => Bound::Exact,
        }
    }
}

/// Decoded entry as returned by [`TranspositionTable::probe`].
#[derive(Clone, Copy, Debug)]
pub struct TTProbe {
    /// Score usable as an immediate cutoff, when depth and bound allow
    pub cutoff: Option<i32>,
    /// Stored best move (null when none); useful for ordering even
    /// when no cutoff applies
    pub mv: Move,
    /// Mate-normalized stored score
    pub score: i32,
    pub depth: u8,
    pub bound: Bound,
}

/// data layout: move (bits 0-31) | score as i16 (32-47) | depth (48-55)
/// | flag_age (56-63, bound in [1:0], age in [7:2])
#[inline]
fn encode(mv: Move, score: i32, depth: u8, flag_age: u8) -> u64 {
    (mv.as_u32() as u64)
        | (((score as i16) as u16 as u64) << 32)
        | ((depth as u64) << 48)
        | ((flag_age as u64) << 56)
}

#[inline]
fn decode_move(data: u64) -> Move {
    Move::from_u32(data as u32)
}

#[inline]
fn decode_score(data: u64) -> i32 {
    ((data >> 32) as u16 as i16) as i32
}

#[inline]
fn decode_depth(data: u64) -> u8 {
    (data >> 48) as u8
}

#[inline]
fn decode_flag_age(data: u64) -> u8 {
    (data >> 56) as u8
}

/// Shift a score into storage form: mate distances become relative to
/// the storing node.
#[inline]
fn score_to_tt(score: i32, ply: i32) -> i32 {
    if score > MATE_BOUND {
        score + ply
    } else if score < -MATE_BOUND {
        score - ply
    } else {
        score
    }
}

/// Inverse of [`score_to_tt`] at the probing node's ply.
#[inline]
fn score_from_tt(score: i32, ply: i32) -> i32 {
    if score > MATE_BOUND {
        (score - ply).min(MATE_SCORE)
    } else if score < -MATE_BOUND {
        (score + ply).max(-MATE_SCORE)
    } else {
        score
    }
}

struct Entry {
    key_word: AtomicU64,
    data_word: AtomicU64,
}

impl Entry {
    fn new() -> Self {
        Entry {
            key_word: AtomicU64::new(0),
            data_word: AtomicU64::new(0),
        }
    }

    /// Read both words; `Some(data)` only when they belong together.
    #[inline]
    fn load(&self, key: u64) -> Option<u64> {
        let key_word = self.key_word.load(Ordering::Relaxed);
        let data = self.data_word.load(Ordering::Relaxed);
        if key_word ^ data == key {
            Some(data)
        } else {
            None
        }
    }

    #[inline]
    fn store(&self, key: u64, data: u64) {
        self.key_word.store(key ^ data, Ordering::Relaxed);
        self.data_word.store(data, Ordering::Relaxed);
    }

    #[inline]
    fn raw_data(&self) -> u64 {
        self.data_word.load(Ordering::Relaxed)
    }

    #[inline]
    fn is_vacant(&self) -> bool {
        self.key_word.load(Ordering::Relaxed) == 0 && self.raw_data() == 0
    }
}

const ENTRIES_PER_BUCKET: usize = 4;

struct TTBucket {
    entries: [Entry; ENTRIES_PER_BUCKET],
}

/// Lock-free transposition table shared by all workers.
pub struct TranspositionTable {
    buckets: Vec<TTBucket>,
    mask: usize,
    /// Age lives in bits [7:2] of the flag byte, so it advances by 4
    age: AtomicU8,
}

/// Survival bonus for entries written in the current search generation
const CURRENT_GEN_PRIORITY: i32 = 100;

impl TranspositionTable {
    /// Create a table of roughly `size_mb` MiB (1..=2048), rounded down
    /// to a power of two of buckets.
    #[must_use]
    pub fn new(size_mb: usize) -> Self {
        let size_mb = size_mb.clamp(1, 2048);
        let bucket_size = std::mem::size_of::<TTBucket>();
        let want = size_mb * 1024 * 1024 / bucket_size;
        let mut num_buckets = 1usize;
        while num_buckets * 2 <= want {
            num_buckets *= 2;
        }

        let mut buckets = Vec::with_capacity(num_buckets);
        for _ in 0..num_buckets {
            buckets.push(TTBucket {
                entries: [Entry::new(), Entry::new(), Entry::new(), Entry::new()],
            });
        }

        TranspositionTable {
            buckets,
            mask: num_buckets - 1,
            age: AtomicU8::new(0),
        }
    }

    #[inline]
    fn bucket(&self, key: u64) -> &TTBucket {
        &self.buckets[(key as usize) & self.mask]
    }

    #[inline]
    fn current_age(&self) -> u8 {
        self.age.load(Ordering::Relaxed)
    }

    /// Advance the generation counter; call once per `go`.
    pub fn next_generation(&self) {
        let age = self.current_age();
        self.age.store(age.wrapping_add(4) & 0xFC, Ordering::Relaxed);
    }

    pub fn clear(&self) {
        for bucket in &self.buckets {
            for entry in &bucket.entries {
                entry.key_word.store(0, Ordering::Relaxed);
                entry.data_word.store(0, Ordering::Relaxed);
            }
        }
        self.age.store(0, Ordering::Relaxed);
    }

    /// Look up `key`. Returns the decoded entry when present; the
    /// `cutoff` field is set only when the stored depth reaches
    /// `depth` and the bound justifies returning the score at this
    /// node. The move is always returned for ordering.
    #[must_use]
    pub fn probe(&self, key: u64, depth: u8, ply: i32, alpha: i32, beta: i32) -> Option<TTProbe> {
        let bucket = self.bucket(key);
        for entry in &bucket.entries {
            let Some(data) = entry.load(key) else {
                continue;
            };

            let score = score_from_tt(decode_score(data), ply);
            let bound = Bound::from_bits(decode_flag_age(data));
            let stored_depth = decode_depth(data);

            let cutoff = if stored_depth >= depth {
                match bound {
                    Bound::Exact => Some(score),
                    Bound::Alpha if score <= alpha => Some(alpha),
                    Bound::Beta if score >= beta => Some(beta),
                    _ => None,
                }
            } else {
                None
            };

            return Some(TTProbe {
                cutoff,
                mv: decode_move(data),
                score,
                depth: stored_depth,
                bound,
            });
        }
        None
    }

    /// Stored best move for `key`, for PV extraction and ordering.
    #[must_use]
    pub fn get_move(&self, key: u64) -> Move {
        let bucket = self.bucket(key);
        for entry in &bucket.entries {
            if let Some(data) = entry.load(key) {
                return decode_move(data);
            }
        }
        Move::null()
    }

    /// Store a search result. Same-key slots are updated in place when
    /// the new record is deeper or the old one is stale, keeping the
    /// existing move if the new one is null; otherwise the
    /// lowest-priority slot in the bucket is replaced.
    pub fn store(&self, key: u64, depth: u8, ply: i32, score: i32, bound: Bound, mv: Move) {
        let age = self.current_age();
        let flag_age = bound as u8 | age;
        let tt_score = score_to_tt(score, ply);
        let bucket = self.bucket(key);

        let mut victim = 0usize;
        let mut worst_priority = i32::MAX;

        for (i, entry) in bucket.entries.iter().enumerate() {
            if let Some(data) = entry.load(key) {
                // Key hit: refresh unless we would clobber a deeper
                // record from this same generation
                let stale = (decode_flag_age(data) ^ age) & 0xFC != 0;
                if depth >= decode_depth(data) || stale {
                    let keep_move = if mv.is_null() { decode_move(data) } else { mv };
                    entry.store(key, encode(keep_move, tt_score, depth, flag_age));
                }
                return;
            }

            let priority = if entry.is_vacant() {
                i32::MIN
            } else {
                let data = entry.raw_data();
                let mut p = decode_depth(data) as i32;
                if (decode_flag_age(data) ^ age) & 0xFC == 0 {
                    p += CURRENT_GEN_PRIORITY;
                }
                p
            };
            if priority < worst_priority {
                worst_priority = priority;
                victim = i;
            }
        }

        bucket.entries[victim].store(key, encode(mv, tt_score, depth, flag_age));
    }

    /// Occupancy estimate in permille, sampled over the first buckets.
    #[must_use]
    pub fn hashfull(&self) -> u32 {
        let sample = self.buckets.len().min(1000);
        let mut used = 0u32;
        for bucket in &self.buckets[..sample] {
            for entry in &bucket.entries {
                if !entry.is_vacant() {
                    used += 1;
                }
            }
        }
        used * 1000 / (sample as u32 * ENTRIES_PER_BUCKET as u32)
    }

    #[inline]
    pub fn prefetch(&self, key: u64) {
        #[cfg(target_arch = "x86_64")]
        unsafe {
            use std::arch::x86_64::{_mm_prefetch, _MM_HINT_T0};
            let bucket = &self.buckets[(key as usize) & self.mask];
            _mm_prefetch::<_MM_HINT_T0>((bucket as *const TTBucket).cast());
        }
        #[cfg(not(target_arch = "x86_64"))]
        let _ = key;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::Square;

    fn test_move() -> Move {
        Move::double_push(Square::new(1, 4), Square::new(3, 4))
    }

    #[test]
    fn test_probe_empty_misses() {
        let tt = TranspositionTable::new(1);
        assert!(tt.probe(0xDEAD_BEEF, 1, 0, -100, 100).is_none());
    }

    #[test]
    fn test_store_probe_roundtrip() {
        let tt = TranspositionTable::new(1);
        let key = 0x1234_5678_9ABC_DEF0;
        tt.store(key, 8, 0, 42, Bound::Exact, test_move());

        let probe = tt.probe(key, 8, 0, -100, 100).expect("entry stored");
        assert_eq!(probe.score, 42);
        assert_eq!(probe.depth, 8);
        assert_eq!(probe.bound, Bound::Exact);
        assert_eq!(probe.mv, test_move());
        assert_eq!(probe.cutoff, Some(42));
    }

    #[test]
    fn test_insufficient_depth_still_returns_move() {
        let tt = TranspositionTable::new(1);
        let key = 99;
        tt.store(key, 4, 0, 10, Bound::Exact, test_move());

        let probe = tt.probe(key, 9, 0, -100, 100).expect("entry stored");
        assert_eq!(probe.cutoff, None);
        assert_eq!(probe.mv, test_move());
    }

    #[test]
    fn test_bound_gating() {
        let tt = TranspositionTable::new(1);
        tt.store(1, 6, 0, 50, Bound::Beta, test_move());
        // Lower bound of 50 only cuts when it clears beta
        assert_eq!(tt.probe(1, 6, 0, -100, 40).unwrap().cutoff, Some(40));
        assert_eq!(tt.probe(1, 6, 0, -100, 100).unwrap().cutoff, None);

        tt.store(2, 6, 0, -50, Bound::Alpha, test_move());
        // Upper bound of -50 only cuts when it fails alpha
        assert_eq!(tt.probe(2, 6, 0, -40, 100).unwrap().cutoff, Some(-40));
        assert_eq!(tt.probe(2, 6, 0, -100, 100).unwrap().cutoff, None);
    }

    #[test]
    fn test_mate_score_normalization_across_plies() {
        let tt = TranspositionTable::new(1);
        let key = 7;

        // A "mated in N" score found at ply 15
        let ply = 15;
        let mated = -MATE_SCORE + ply;
        tt.store(key, 10, ply, mated, Bound::Exact, test_move());

        // Reading at ply 2 must shift the distance accordingly
        let probe = tt.probe(key, 10, 2, -32500, 32500).unwrap();
        assert_eq!(probe.score, -MATE_SCORE + 2);

        // And a winning mate stored at ply 12, read at ply 4
        let ply = 12;
        let mating = MATE_SCORE - ply;
        tt.store(key, 10, ply, mating, Bound::Exact, test_move());
        let probe = tt.probe(key, 10, 4, -32500, 32500).unwrap();
        assert_eq!(probe.score, MATE_SCORE - 4);
    }

    #[test]
    fn test_null_move_store_preserves_old_move() {
        let tt = TranspositionTable::new(1);
        let key = 3;
        tt.store(key, 5, 0, 10, Bound::Exact, test_move());
        tt.store(key, 7, 0, 20, Bound::Exact, Move::null());

        let probe = tt.probe(key, 5, 0, -100, 100).unwrap();
        assert_eq!(probe.mv, test_move(), "null move must not erase the stored move");
        assert_eq!(probe.score, 20);
    }

    #[test]
    fn test_shallower_same_generation_does_not_clobber() {
        let tt = TranspositionTable::new(1);
        let key = 11;
        tt.store(key, 10, 0, 30, Bound::Exact, test_move());
        tt.store(key, 2, 0, -5, Bound::Alpha, Move::null());

        let probe = tt.probe(key, 1, 0, -100, 100).unwrap();
        assert_eq!(probe.depth, 10);
        assert_eq!(probe.score, 30);
    }

    #[test]
    fn test_aging_allows_replacement() {
        let tt = TranspositionTable::new(1);
        let key = 13;
        tt.store(key, 10, 0, 30, Bound::Exact, test_move());
        tt.next_generation();
        // Stale entries lose their priority even against shallow stores
        tt.store(key, 1, 0, 7, Bound::Exact, test_move());

        let probe = tt.probe(key, 1, 0, -100, 100).unwrap();
        assert_eq!(probe.depth, 1);
        assert_eq!(probe.score, 7);
    }

    #[test]
    fn test_bucket_replacement_prefers_shallow_victims() {
        let tt = TranspositionTable::new(1);
        // Five distinct keys landing in the same bucket (identical low bits)
        let keys: Vec<u64> = (0..5).map(|i| (i << 40) | 5).collect();
        let depths = [12u8, 3, 9, 11, 8];
        for (&k, &d) in keys.iter().zip(depths.iter()) {
            tt.store(k, d, 0, d as i32, Bound::Exact, test_move());
        }
        // The depth-3 entry was the weakest; the depth-12 one survives
        assert!(tt.probe(keys[0], 1, 0, -100, 100).is_some());
        assert!(tt.probe(keys[1], 1, 0, -100, 100).is_none());
        assert!(tt.probe(keys[4], 1, 0, -100, 100).is_some());
    }

    #[test]
    fn test_hashfull_reports_usage() {
        let tt = TranspositionTable::new(1);
        assert_eq!(tt.hashfull(), 0);
        for i in 0..1000u64 {
            tt.store(i.wrapping_mul(0x9E37_79B9_7F4A_7C15), 5, 0, 0, Bound::Exact, test_move());
        }
        assert!(tt.hashfull() > 0);
    }
}

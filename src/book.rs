//! Polyglot-format opening book.
//!
//! The on-disk format is the Polyglot one: 16-byte big-endian records
//! `{key: u64, move: u16, weight: u16, learn: u32}`, sorted by key.
//! Records are keyed with the engine's own (fixed-seed) Zobrist hash,
//! so books must be built against it; the reader does not vendor the
//! original PolyGlot key constants.
//!
//! A probed move is never trusted as-is: the decoded from/to/promotion
//! triple is matched against the current legal move list, and castling
//! is translated from Polyglot's king-takes-rook encoding.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use rand::prelude::*;

use crate::board::{Board, Move, Piece, Square};

#[derive(Debug, Clone, Copy)]
struct BookEntry {
    key: u64,
    raw_move: u16,
    weight: u16,
    #[allow(dead_code)]
    learn: u32,
}

impl BookEntry {
    fn from_bytes(bytes: &[u8; 16]) -> Self {
        BookEntry {
            key: u64::from_be_bytes(bytes[0..8].try_into().unwrap()),
            raw_move: u16::from_be_bytes(bytes[8..10].try_into().unwrap()),
            weight: u16::from_be_bytes(bytes[10..12].try_into().unwrap()),
            learn: u32::from_be_bytes(bytes[12..16].try_into().unwrap()),
        }
    }
}

/// Decoded fields of a Polyglot move word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PolyMove {
    from: Square,
    to: Square,
    promotion: Option<Piece>,
}

fn decode_poly_move(raw: u16) -> PolyMove {
    let to_file = (raw & 0x7) as usize;
    let to_rank = ((raw >> 3) & 0x7) as usize;
    let from_file = ((raw >> 6) & 0x7) as usize;
    let from_rank = ((raw >> 9) & 0x7) as usize;
    let promotion = match (raw >> 12) & 0x7 {
        1 => Some(Piece::Knight),
        2 => Some(Piece::Bishop),
        3 => Some(Piece::Rook),
        4 => Some(Piece::Queen),
        _ => None,
    };
    PolyMove {
        from: Square::new(from_rank, from_file),
        to: Square::new(to_rank, to_file),
        promotion,
    }
}

/// Polyglot castling is encoded king-takes-rook; translate to the
/// engine's king-destination squares.
fn translate_castling(poly: PolyMove, board: &Board) -> PolyMove {
    let is_king = board
        .piece_at(poly.from)
        .is_some_and(|(_, piece)| piece == Piece::King);
    if !is_king {
        return poly;
    }
    let translated_to = match (poly.from.index(), poly.to.index()) {
        (4, 7) => 6,    // e1h1 -> e1g1
        (4, 0) => 2,    // e1a1 -> e1c1
        (60, 63) => 62, // e8h8 -> e8g8
        (60, 56) => 58, // e8a8 -> e8c8
        _ => return poly,
    };
    PolyMove {
        to: Square::from_index(translated_to),
        ..poly
    }
}

/// An opening book held fully in memory.
pub struct PolyglotBook {
    entries: Vec<BookEntry>,
}

impl PolyglotBook {
    /// Load a book file. The whole file is read and sorted by key.
    pub fn load<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;
        Ok(Self::from_bytes(&buffer))
    }

    /// Parse book records from raw bytes (trailing partial records are
    /// ignored).
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let mut entries = Vec::with_capacity(bytes.len() / 16);
        for chunk in bytes.chunks_exact(16) {
            let record: &[u8; 16] = chunk.try_into().unwrap();
            entries.push(BookEntry::from_bytes(record));
        }
        entries.sort_by_key(|e| e.key);
        PolyglotBook { entries }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Weighted-random book move for the current position, or `None`
    /// when out of book. The returned move is always legal.
    #[must_use]
    pub fn pick(&self, board: &Board) -> Option<Move> {
        let key = board.hash();
        let start = self.entries.partition_point(|e| e.key < key);
        if start >= self.entries.len() || self.entries[start].key != key {
            return None;
        }
        let end = start
            + self.entries[start..]
                .iter()
                .take_while(|e| e.key == key)
                .count();
        let candidates = &self.entries[start..end];

        let legal = board.generate_legal();
        let resolve = |entry: &BookEntry| -> Option<Move> {
            let poly = translate_castling(decode_poly_move(entry.raw_move), board);
            legal
                .iter()
                .find(|m| {
                    m.from() == poly.from && m.to() == poly.to && m.promotion() == poly.promotion
                })
                .copied()
        };

        let total_weight: u32 = candidates.iter().map(|e| u32::from(e.weight)).sum();
        if total_weight == 0 {
            return candidates.iter().find_map(|e| resolve(e));
        }

        let mut pick = thread_rng().gen_range(0..total_weight);
        for entry in candidates {
            let w = u32::from(entry.weight);
            if pick < w {
                // A corrupt or illegal record falls through to the
                // remaining candidates
                if let Some(m) = resolve(entry) {
                    return Some(m);
                }
            } else {
                pick -= w;
            }
        }
        candidates.iter().find_map(|e| resolve(e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(key: u64, raw_move: u16, weight: u16) -> [u8; 16] {
        let mut bytes = [0u8; 16];
        bytes[0..8].copy_from_slice(&key.to_be_bytes());
        bytes[8..10].copy_from_slice(&raw_move.to_be_bytes());
        bytes[10..12].copy_from_slice(&weight.to_be_bytes());
        bytes
    }

    /// Polyglot move word for from/to given as (rank, file)
    fn poly_word(from: (u16, u16), to: (u16, u16), promo: u16) -> u16 {
        (promo << 12) | (from.0 << 9) | (from.1 << 6) | (to.0 << 3) | to.1
    }

    #[test]
    fn test_record_decoding() {
        let entry = BookEntry::from_bytes(&record(0xABCD, poly_word((1, 4), (3, 4), 0), 7));
        assert_eq!(entry.key, 0xABCD);
        assert_eq!(entry.weight, 7);
        let poly = decode_poly_move(entry.raw_move);
        assert_eq!(poly.from, Square::new(1, 4)); // e2
        assert_eq!(poly.to, Square::new(3, 4)); // e4
        assert_eq!(poly.promotion, None);
    }

    #[test]
    fn test_promotion_decoding() {
        let poly = decode_poly_move(poly_word((6, 2), (7, 2), 4));
        assert_eq!(poly.promotion, Some(Piece::Queen));
    }

    #[test]
    fn test_probe_returns_legal_book_move() {
        let board = Board::new();
        // Single entry: e2e4 for the starting position
        let bytes = record(board.hash(), poly_word((1, 4), (3, 4), 0), 10);
        let book = PolyglotBook::from_bytes(&bytes);
        assert_eq!(book.len(), 1);

        let m = book.pick(&board).expect("book hit expected");
        assert_eq!(m.to_string(), "e2e4");
        assert!(board.generate_legal().contains(m));
    }

    #[test]
    fn test_probe_misses_unknown_position() {
        let board = Board::new();
        let bytes = record(board.hash() ^ 1, poly_word((1, 4), (3, 4), 0), 10);
        let book = PolyglotBook::from_bytes(&bytes);
        assert!(book.pick(&board).is_none());
    }

    #[test]
    fn test_castling_translation() {
        // White to castle kingside: book says e1h1, engine move is e1g1
        let board: Board = "4k3/8/8/8/8/8/8/4K2R w K - 0 1".parse().unwrap();
        let bytes = record(board.hash(), poly_word((0, 4), (0, 7), 0), 1);
        let book = PolyglotBook::from_bytes(&bytes);
        let m = book.pick(&board).expect("castle from book");
        assert!(m.is_castling());
        assert_eq!(m.to_string(), "e1g1");
    }

    #[test]
    fn test_illegal_record_is_skipped() {
        let board = Board::new();
        // a1a8 is not legal from the starting position
        let bad = record(board.hash(), poly_word((0, 0), (7, 0), 0), 100);
        let good = record(board.hash(), poly_word((0, 6), (2, 5), 0), 1); // g1f3
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&bad);
        bytes.extend_from_slice(&good);
        let book = PolyglotBook::from_bytes(&bytes);

        let m = book.pick(&board).expect("fallback to legal record");
        assert_eq!(m.to_string(), "g1f3");
    }
}

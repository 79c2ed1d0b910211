//! Make/unmake move implementation.
//!
//! `play` pushes an [`UndoInfo`] snapshot and applies the move with
//! incremental Zobrist and evaluation updates; `unplay` reverses every
//! mutation in exact inverse order and restores the saved hash rather
//! than recomputing it. A `play`/`unplay` round trip is bit-for-bit.

use crate::zobrist::ZOBRIST;

use super::eval_state::{castle_rook_squares, ep_victim_square};
use super::state::{Board, UndoInfo};
use super::types::{Color, Move, Piece, Square, CASTLING_MASK, EMPTY_MOVE};

/// Saved state for null-move pruning. Null moves bypass the undo stack:
/// they are not game moves and must not shift repetition indices.
pub struct NullMoveInfo {
    en_passant: Option<Square>,
    zobrist: u64,
}

impl Board {
    /// Play a move. The caller guarantees pseudo-legality; legality
    /// (own king safety) is the move generator's business.
    pub fn play(&mut self, m: Move) {
        let keys = &*ZOBRIST;
        let us = self.side_to_move;
        let them = us.opponent();

        self.history.push(UndoInfo {
            zobrist: self.zobrist,
            halfmove_clock: self.halfmove_clock,
            last_irreversible: self.last_irreversible,
            mv: m,
            en_passant: self.en_passant,
            castling_rights: self.castling_rights,
        });

        if m.piece() == Piece::Pawn || m.is_capture() {
            self.halfmove_clock = 0;
            self.last_irreversible = self.history.len() as i32 - 1;
        } else {
            self.halfmove_clock += 1;
        }

        let mut hash = self.zobrist;
        hash ^= keys.castling_hash(self.castling_rights);
        if let Some(ep) = self.en_passant {
            hash ^= keys.en_passant_keys[ep.file()];
        }

        // Lift the mover, then clear the captured piece
        self.remove_piece(m.from(), us, m.piece());
        hash ^= keys.piece_key(m.piece(), us, m.from());

        if m.is_en_passant() {
            let victim_sq = ep_victim_square(m.to(), us);
            self.remove_piece(victim_sq, them, Piece::Pawn);
            hash ^= keys.piece_key(Piece::Pawn, them, victim_sq);
        } else if let Some(victim) = m.captured() {
            self.remove_piece(m.to(), them, victim);
            hash ^= keys.piece_key(victim, them, m.to());
        }

        // Promotion replaces the pawn with the chosen piece
        let arriving = m.promotion().unwrap_or(m.piece());
        self.set_piece(m.to(), us, arriving);
        hash ^= keys.piece_key(arriving, us, m.to());

        self.en_passant = None;
        if m.is_double_push() {
            let ep = Square::from_index((m.from().index() + m.to().index()) / 2);
            self.en_passant = Some(ep);
        } else if m.is_castling() {
            let (rook_from, rook_to) = castle_rook_squares(m, us);
            self.remove_piece(rook_from, us, Piece::Rook);
            self.set_piece(rook_to, us, Piece::Rook);
            hash ^= keys.piece_key(Piece::Rook, us, rook_from)
                ^ keys.piece_key(Piece::Rook, us, rook_to);
        }

        self.castling_rights &=
            CASTLING_MASK[m.from().index()] & CASTLING_MASK[m.to().index()];

        hash ^= keys.castling_hash(self.castling_rights);
        if let Some(ep) = self.en_passant {
            hash ^= keys.en_passant_keys[ep.file()];
        }
        hash ^= keys.black_to_move_key;

        self.zobrist = hash;
        self.side_to_move = them;
        if us == Color::Black {
            self.fullmove_number += 1;
        }

        self.eval_state.apply(m, us);
    }

    /// Unplay the last move. Must mirror the matching `play` call.
    pub fn unplay(&mut self, m: Move) {
        let info = self
            .history
            .pop()
            .expect("unplay without a matching play");
        debug_assert_eq!(info.mv, m, "unplay order violated");

        let us = self.side_to_move.opponent();
        let them = us.opponent();

        self.side_to_move = us;
        self.en_passant = info.en_passant;
        self.castling_rights = info.castling_rights;
        self.halfmove_clock = info.halfmove_clock;
        self.last_irreversible = info.last_irreversible;
        self.zobrist = info.zobrist;
        if us == Color::Black {
            self.fullmove_number -= 1;
        }

        if m.is_castling() {
            let (rook_from, rook_to) = castle_rook_squares(m, us);
            self.remove_piece(rook_to, us, Piece::Rook);
            self.set_piece(rook_from, us, Piece::Rook);
        }

        let arriving = m.promotion().unwrap_or(m.piece());
        self.remove_piece(m.to(), us, arriving);

        if m.is_en_passant() {
            self.set_piece(ep_victim_square(m.to(), us), them, Piece::Pawn);
        } else if let Some(victim) = m.captured() {
            self.set_piece(m.to(), them, victim);
        }

        self.set_piece(m.from(), us, m.piece());

        self.eval_state.revert(m, us);
    }

    /// Null move for pruning: flip the side to move and clear en passant.
    pub fn play_null(&mut self) -> NullMoveInfo {
        let keys = &*ZOBRIST;
        let info = NullMoveInfo {
            en_passant: self.en_passant,
            zobrist: self.zobrist,
        };

        let mut hash = self.zobrist;
        if let Some(ep) = self.en_passant {
            hash ^= keys.en_passant_keys[ep.file()];
        }
        hash ^= keys.black_to_move_key;

        self.en_passant = None;
        self.zobrist = hash;
        self.side_to_move = self.side_to_move.opponent();
        info
    }

    pub fn unplay_null(&mut self, info: NullMoveInfo) {
        self.side_to_move = self.side_to_move.opponent();
        self.en_passant = info.en_passant;
        self.zobrist = info.zobrist;
    }

    /// Last move pushed on the undo stack, if any (null for the root)
    #[inline]
    #[must_use]
    pub fn last_move(&self) -> Move {
        self.history.last().map_or(EMPTY_MOVE, |info| info.mv)
    }
}

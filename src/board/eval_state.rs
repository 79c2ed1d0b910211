//! Incrementally-maintained evaluation accumulator.
//!
//! Tracks per-side PST sums (middlegame and endgame), material, the game
//! phase, the pawn-only Zobrist key, and the king squares. `apply` /
//! `revert` are exact inverses, so a make/unmake round trip restores the
//! accumulator bit-for-bit.
//!
//! The stored phase is deliberately unclamped (two queens after a
//! promotion push it past the opening total); it is saturated at the
//! point of use in the taper. Clamping here would make promotion
//! sequences irreversible.

use crate::zobrist::ZOBRIST;

use super::pst::{pst_square, MATERIAL, PHASE_WEIGHTS, PST_EG, PST_MG};
use super::types::{Color, Move, Piece, Square};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvalState {
    pub(crate) mg_pst: [i32; 2],
    pub(crate) eg_pst: [i32; 2],
    pub(crate) piece_val: [i32; 2],
    pub(crate) phase: i32,
    pub(crate) pawn_key: u64,
    pub(crate) king_sq: [Square; 2],
}

impl EvalState {
    pub(crate) fn zeroed() -> Self {
        EvalState {
            mg_pst: [0; 2],
            eg_pst: [0; 2],
            piece_val: [0; 2],
            phase: 0,
            pawn_key: 0,
            king_sq: [Square::from_index(0); 2],
        }
    }

    #[inline]
    pub(crate) fn add_piece(&mut self, piece: Piece, sq: Square, color: Color) {
        let c = color.index();
        let p = piece.index();
        let mirror = pst_square(sq.index(), color == Color::White);

        self.mg_pst[c] += PST_MG[p][mirror];
        self.eg_pst[c] += PST_EG[p][mirror];
        self.piece_val[c] += MATERIAL[p];
        self.phase += PHASE_WEIGHTS[p];

        if piece == Piece::Pawn {
            self.pawn_key ^= ZOBRIST.piece_key(Piece::Pawn, color, sq);
        } else if piece == Piece::King {
            self.king_sq[c] = sq;
        }
    }

    #[inline]
    pub(crate) fn remove_piece(&mut self, piece: Piece, sq: Square, color: Color) {
        let c = color.index();
        let p = piece.index();
        let mirror = pst_square(sq.index(), color == Color::White);

        self.mg_pst[c] -= PST_MG[p][mirror];
        self.eg_pst[c] -= PST_EG[p][mirror];
        self.piece_val[c] -= MATERIAL[p];
        self.phase -= PHASE_WEIGHTS[p];

        if piece == Piece::Pawn {
            self.pawn_key ^= ZOBRIST.piece_key(Piece::Pawn, color, sq);
        }
    }

    /// Update the accumulator for a move about to be played by `us`.
    pub(crate) fn apply(&mut self, m: Move, us: Color) {
        let them = us.opponent();
        let from = m.from();
        let to = m.to();

        self.remove_piece(m.piece(), from, us);

        if m.is_en_passant() {
            self.remove_piece(Piece::Pawn, ep_victim_square(to, us), them);
        } else if let Some(victim) = m.captured() {
            self.remove_piece(victim, to, them);
        }

        let arriving = m.promotion().unwrap_or(m.piece());
        self.add_piece(arriving, to, us);

        if m.is_castling() {
            let (rook_from, rook_to) = castle_rook_squares(m, us);
            self.remove_piece(Piece::Rook, rook_from, us);
            self.add_piece(Piece::Rook, rook_to, us);
        }
    }

    /// Exact inverse of [`apply`](Self::apply), for unmake.
    pub(crate) fn revert(&mut self, m: Move, us: Color) {
        let them = us.opponent();
        let from = m.from();
        let to = m.to();

        if m.is_castling() {
            let (rook_from, rook_to) = castle_rook_squares(m, us);
            self.remove_piece(Piece::Rook, rook_to, us);
            self.add_piece(Piece::Rook, rook_from, us);
        }

        let arriving = m.promotion().unwrap_or(m.piece());
        self.remove_piece(arriving, to, us);

        if m.is_en_passant() {
            self.add_piece(Piece::Pawn, ep_victim_square(to, us), them);
        } else if let Some(victim) = m.captured() {
            self.add_piece(victim, to, them);
        }

        self.add_piece(m.piece(), from, us);
    }
}

/// The pawn captured en passant sits behind the target square.
#[inline]
pub(crate) fn ep_victim_square(to: Square, us: Color) -> Square {
    match us {
        Color::White => Square::from_index(to.index() - 8),
        Color::Black => Square::from_index(to.index() + 8),
    }
}

/// Rook origin and destination for a castle move by `us`.
#[inline]
pub(crate) fn castle_rook_squares(m: Move, us: Color) -> (Square, Square) {
    let rank = if us == Color::White { 0 } else { 7 };
    if m.is_castle_kingside() {
        (Square::new(rank, 7), Square::new(rank, 5))
    } else {
        (Square::new(rank, 0), Square::new(rank, 3))
    }
}

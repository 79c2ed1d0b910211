//! Move generation: pseudo-legal, capture-only, castles, and the
//! legality filter.
//!
//! Generation order is pawns, knights, bishops, rooks, queens, king,
//! castles, pop-LSB within each type. The enemy king is excluded from
//! every target mask, so a king capture is never emitted.

use super::attack_tables::{
    bishop_attacks, queen_attacks, rook_attacks, KING_ATTACKS, KNIGHT_ATTACKS, PAWN_ATTACKS,
    PAWN_PUSHES,
};
use super::eval_state::ep_victim_square;
use super::state::Board;
use super::types::{
    bit_for_square, Bitboard, Color, Move, MoveList, Piece, Square, CASTLE_BLACK_K,
    CASTLE_BLACK_Q, CASTLE_WHITE_K, CASTLE_WHITE_Q, PROMOTION_PIECES,
};

impl Board {
    /// All moves plausibly legal ignoring own-king safety.
    pub fn generate_pseudo_legal(&self, list: &mut MoveList) {
        self.generate_pawn_moves(list, false);
        self.generate_piece_moves(Piece::Knight, list, false);
        self.generate_piece_moves(Piece::Bishop, list, false);
        self.generate_piece_moves(Piece::Rook, list, false);
        self.generate_piece_moves(Piece::Queen, list, false);
        self.generate_piece_moves(Piece::King, list, false);
        self.generate_castles(list);
    }

    /// Captures, en passant, and promotions; used by quiescence.
    pub fn generate_pseudo_legal_captures(&self, list: &mut MoveList) {
        self.generate_pawn_moves(list, true);
        self.generate_piece_moves(Piece::Knight, list, true);
        self.generate_piece_moves(Piece::Bishop, list, true);
        self.generate_piece_moves(Piece::Rook, list, true);
        self.generate_piece_moves(Piece::Queen, list, true);
        self.generate_piece_moves(Piece::King, list, true);
    }

    /// Promotion moves only (pushes and captures)
    pub(crate) fn generate_pseudo_legal_promotions(&self, list: &mut MoveList) {
        let us = self.side_to_move;
        let c = us.index();
        let pawns = self.pieces[c][Piece::Pawn.index()];
        let promo_rank = match us {
            Color::White => Bitboard::RANK_7,
            Color::Black => Bitboard::RANK_2,
        };
        let candidates = Bitboard(pawns.0 & promo_rank.0);
        if candidates.is_empty() {
            return;
        }
        self.pawn_moves_from(candidates, list, false, true);
    }

    /// Pseudo-legal moves filtered down to fully legal ones.
    #[must_use]
    pub fn generate_legal(&self) -> MoveList {
        let mut pseudo = MoveList::new();
        self.generate_pseudo_legal(&mut pseudo);

        let mut legal = MoveList::new();
        for &m in pseudo.iter() {
            if self.is_move_legal(m) {
                legal.push(m);
            }
        }
        legal
    }

    fn generate_pawn_moves(&self, list: &mut MoveList, captures_only: bool) {
        let us = self.side_to_move;
        let pawns = self.pieces[us.index()][Piece::Pawn.index()];
        if pawns.is_empty() {
            return;
        }
        self.pawn_moves_from(pawns, list, captures_only, false);
    }

    /// Pawn move emission from a set of source pawns. `promos_only`
    /// restricts to last-rank pushes/captures (picker stage 2).
    fn pawn_moves_from(
        &self,
        pawns: Bitboard,
        list: &mut MoveList,
        captures_only: bool,
        promos_only: bool,
    ) {
        let us = self.side_to_move;
        let them = us.opponent();
        let empty = !self.all_occupied.0;
        // Enemy king never appears in a target mask
        let enemy = self.occupied[them.index()].0 & !self.bb(them, Piece::King).0;

        let (promo_rank, start_third): (u64, u64) = match us {
            Color::White => (Bitboard::RANK_8.0, Bitboard::RANK_3.0),
            Color::Black => (Bitboard::RANK_1.0, Bitboard::RANK_6.0),
        };
        let push = |bb: u64| -> u64 {
            match us {
                Color::White => bb << 8,
                Color::Black => bb >> 8,
            }
        };
        let push_back = |sq: usize| -> usize {
            match us {
                Color::White => sq - 8,
                Color::Black => sq + 8,
            }
        };

        // Pushes. Promotion pushes count as tactical and are emitted in
        // every mode; plain pushes only in the full generator.
        let single = push(pawns.0) & empty;
        if !captures_only && !promos_only {
            let mut quiet_push = Bitboard(single & !promo_rank);
            while !quiet_push.is_empty() {
                let to = super::types::pop_lsb(&mut quiet_push);
                let from = Square::from_index(push_back(to.index()));
                list.push(Move::quiet(from, to, Piece::Pawn));
            }

            let mut double = Bitboard(push(single & start_third) & empty);
            while !double.is_empty() {
                let to = super::types::pop_lsb(&mut double);
                let from = Square::from_index(push_back(push_back(to.index())));
                list.push(Move::double_push(from, to));
            }
        }

        let mut push_promo = Bitboard(single & promo_rank);
        while !push_promo.is_empty() {
            let to = super::types::pop_lsb(&mut push_promo);
            let from = Square::from_index(push_back(to.index()));
            for promo in PROMOTION_PIECES {
                list.push(Move::promotion_move(from, to, promo, None));
            }
        }

        // Diagonal captures
        let mut sources = pawns;
        while !sources.is_empty() {
            let from = super::types::pop_lsb(&mut sources);
            let mut targets = Bitboard(PAWN_ATTACKS[us.index()][from.index()] & enemy);
            while !targets.is_empty() {
                let to = super::types::pop_lsb(&mut targets);
                let victim = self.piece_on(to).expect("capture target empty");
                if bit_for_square(to).0 & promo_rank != 0 {
                    for promo in PROMOTION_PIECES {
                        list.push(Move::promotion_move(from, to, promo, Some(victim)));
                    }
                } else if !promos_only {
                    list.push(Move::capture(from, to, Piece::Pawn, victim));
                }
            }
        }

        // En passant
        if promos_only {
            return;
        }
        if let Some(ep) = self.en_passant {
            let mut sources = Bitboard(PAWN_ATTACKS[them.index()][ep.index()] & pawns.0);
            while !sources.is_empty() {
                let from = super::types::pop_lsb(&mut sources);
                list.push(Move::en_passant(from, ep));
            }
        }
    }

    fn generate_piece_moves(&self, piece: Piece, list: &mut MoveList, captures_only: bool) {
        let us = self.side_to_move;
        let them = us.opponent();
        let own = self.occupied[us.index()].0;
        let enemy = self.occupied[them.index()].0 & !self.bb(them, Piece::King).0;
        let occ = self.all_occupied.0;

        let target_mask = if captures_only { enemy } else { !own & !self.bb(them, Piece::King).0 };

        let mut sources = self.bb(us, piece);
        while !sources.is_empty() {
            let from = super::types::pop_lsb(&mut sources);
            let attacks = match piece {
                Piece::Knight => KNIGHT_ATTACKS[from.index()],
                Piece::Bishop => bishop_attacks(from.index(), occ),
                Piece::Rook => rook_attacks(from.index(), occ),
                Piece::Queen => queen_attacks(from.index(), occ),
                Piece::King => KING_ATTACKS[from.index()],
                Piece::Pawn => unreachable!("pawns have their own generator"),
            };
            let mut targets = Bitboard(attacks & target_mask);
            while !targets.is_empty() {
                let to = super::types::pop_lsb(&mut targets);
                match self.piece_on(to) {
                    Some(victim) => list.push(Move::capture(from, to, piece, victim)),
                    None => list.push(Move::quiet(from, to, piece)),
                }
            }
        }
    }

    /// Emit castle moves when rights are present, the path is empty, and
    /// the king's start/pass/end squares are not attacked.
    pub fn generate_castles(&self, list: &mut MoveList) {
        let us = self.side_to_move;
        let them = us.opponent();
        let occ = self.all_occupied.0;

        let (k_right, q_right, rank) = match us {
            Color::White => (CASTLE_WHITE_K, CASTLE_WHITE_Q, 0usize),
            Color::Black => (CASTLE_BLACK_K, CASTLE_BLACK_Q, 7usize),
        };
        let king_from = Square::new(rank, 4);
        if self.piece_at(king_from) != Some((us, Piece::King)) {
            return;
        }

        if self.has_castling_right(k_right)
            && self.piece_at(Square::new(rank, 7)) == Some((us, Piece::Rook))
        {
            let between = (1u64 << Square::new(rank, 5).index()) | (1u64 << Square::new(rank, 6).index());
            if occ & between == 0
                && !self.is_square_attacked(king_from, them)
                && !self.is_square_attacked(Square::new(rank, 5), them)
                && !self.is_square_attacked(Square::new(rank, 6), them)
            {
                list.push(Move::castle_kingside(king_from, Square::new(rank, 6)));
            }
        }

        if self.has_castling_right(q_right)
            && self.piece_at(Square::new(rank, 0)) == Some((us, Piece::Rook))
        {
            let between = (1u64 << Square::new(rank, 1).index())
                | (1u64 << Square::new(rank, 2).index())
                | (1u64 << Square::new(rank, 3).index());
            if occ & between == 0
                && !self.is_square_attacked(king_from, them)
                && !self.is_square_attacked(Square::new(rank, 3), them)
                && !self.is_square_attacked(Square::new(rank, 2), them)
            {
                list.push(Move::castle_queenside(king_from, Square::new(rank, 2)));
            }
        }
    }

    /// All pieces of either color attacking `sq` under the given occupancy
    pub(crate) fn attackers_to(&self, sq: Square, occupancy: u64) -> Bitboard {
        let idx = sq.index();
        let mut attackers = 0u64;

        attackers |= PAWN_ATTACKS[Color::Black.index()][idx]
            & self.bb(Color::White, Piece::Pawn).0;
        attackers |= PAWN_ATTACKS[Color::White.index()][idx]
            & self.bb(Color::Black, Piece::Pawn).0;

        let knights =
            self.bb(Color::White, Piece::Knight).0 | self.bb(Color::Black, Piece::Knight).0;
        attackers |= KNIGHT_ATTACKS[idx] & knights;

        let kings = self.bb(Color::White, Piece::King).0 | self.bb(Color::Black, Piece::King).0;
        attackers |= KING_ATTACKS[idx] & kings;

        let diag = self.diagonal_sliders();
        attackers |= bishop_attacks(idx, occupancy) & diag.0;

        let straight = self.straight_sliders();
        attackers |= rook_attacks(idx, occupancy) & straight.0;

        Bitboard(attackers & occupancy)
    }

    /// Bishops and queens of both colors
    #[inline]
    pub(crate) fn diagonal_sliders(&self) -> Bitboard {
        Bitboard(
            self.bb(Color::White, Piece::Bishop).0
                | self.bb(Color::White, Piece::Queen).0
                | self.bb(Color::Black, Piece::Bishop).0
                | self.bb(Color::Black, Piece::Queen).0,
        )
    }

    /// Rooks and queens of both colors
    #[inline]
    pub(crate) fn straight_sliders(&self) -> Bitboard {
        Bitboard(
            self.bb(Color::White, Piece::Rook).0
                | self.bb(Color::White, Piece::Queen).0
                | self.bb(Color::Black, Piece::Rook).0
                | self.bb(Color::Black, Piece::Queen).0,
        )
    }

    /// Is `sq` attacked by any piece of `by` on the current occupancy?
    #[must_use]
    pub fn is_square_attacked(&self, sq: Square, by: Color) -> bool {
        self.attacked_with(sq, by, self.all_occupied.0, 0)
    }

    /// Attack test under a modified occupancy, with `removed` squares
    /// masked out of the attacker sets (captured pieces stop attacking).
    fn attacked_with(&self, sq: Square, by: Color, occupancy: u64, removed: u64) -> bool {
        let c = by.index();
        let idx = sq.index();

        let pawns = self.pieces[c][Piece::Pawn.index()].0 & !removed;
        if PAWN_ATTACKS[by.opponent().index()][idx] & pawns != 0 {
            return true;
        }

        let knights = self.pieces[c][Piece::Knight.index()].0 & !removed;
        if KNIGHT_ATTACKS[idx] & knights != 0 {
            return true;
        }

        let kings = self.pieces[c][Piece::King.index()].0 & !removed;
        if KING_ATTACKS[idx] & kings != 0 {
            return true;
        }

        let straight = (self.pieces[c][Piece::Rook.index()].0
            | self.pieces[c][Piece::Queen.index()].0)
            & !removed;
        if straight != 0 && rook_attacks(idx, occupancy) & straight != 0 {
            return true;
        }

        let diag = (self.pieces[c][Piece::Bishop.index()].0
            | self.pieces[c][Piece::Queen.index()].0)
            & !removed;
        if diag != 0 && bishop_attacks(idx, occupancy) & diag != 0 {
            return true;
        }

        false
    }

    #[must_use]
    pub fn is_in_check(&self, color: Color) -> bool {
        self.is_square_attacked(self.king_square(color), color.opponent())
    }

    /// Does the pseudo-legal move `m` leave our own king safe?
    ///
    /// The board is not mutated: the move's occupancy deltas are applied
    /// to a shadow occupancy and the attack test runs against it.
    #[must_use]
    pub fn is_move_legal(&self, m: Move) -> bool {
        let us = self.side_to_move;
        let them = us.opponent();

        if m.is_castling() {
            // Path attacks were checked at generation time, but a TT or
            // killer castle arrives here unchecked.
            let rank = if us == Color::White { 0 } else { 7 };
            let files: [usize; 3] = if m.is_castle_kingside() {
                [4, 5, 6]
            } else {
                [4, 3, 2]
            };
            return files
                .iter()
                .all(|&f| !self.is_square_attacked(Square::new(rank, f), them));
        }

        let from_bb = bit_for_square(m.from()).0;
        let to_bb = bit_for_square(m.to()).0;
        let captured_bb = if m.is_en_passant() {
            bit_for_square(ep_victim_square(m.to(), us)).0
        } else if m.is_capture() {
            to_bb
        } else {
            0
        };

        let occupancy = (self.all_occupied.0 ^ from_bb ^ captured_bb) | to_bb;
        let king_sq = if m.piece() == Piece::King {
            m.to()
        } else {
            self.king_square(us)
        };

        !self.attacked_with(king_sq, them, occupancy, captured_bb)
    }

    /// Validate that a foreign move (typically from the transposition
    /// table) is consistent with the current position. Guards against
    /// Zobrist collisions handing the search a corrupt move.
    #[must_use]
    pub fn is_move_pseudo_legal(&self, m: Move) -> bool {
        if m.is_null() {
            return false;
        }
        let us = self.side_to_move;
        let them = us.opponent();
        let from = m.from();
        let to = m.to();

        // The right piece must sit on the from square
        if self.piece_at(from) != Some((us, m.piece())) {
            return false;
        }
        // Never capture a king, never land on our own piece
        if self.bb(them, Piece::King).contains(to) || self.occupancy(us).contains(to) {
            return false;
        }
        // The captured field must match the board
        if m.is_en_passant() {
            if self.en_passant != Some(to) || m.piece() != Piece::Pawn {
                return false;
            }
        } else if self.piece_on(to) != m.captured() {
            return false;
        }

        let occ = self.all_occupied.0;
        match m.piece() {
            Piece::Pawn => {
                let attacks = PAWN_ATTACKS[us.index()][from.index()];
                let last_rank = match us {
                    Color::White => 7,
                    Color::Black => 0,
                };
                // A pawn reaching the last rank must carry the promotion flag
                if (to.rank() == last_rank) != m.is_promotion() {
                    return false;
                }
                if m.is_capture() {
                    attacks & bit_for_square(to).0 != 0
                } else if m.is_double_push() {
                    let start_rank = match us {
                        Color::White => 1,
                        Color::Black => 6,
                    };
                    let mid = Square::from_index((from.index() + to.index()) / 2);
                    from.rank() == start_rank
                        && from.file() == to.file()
                        && (to.index() as i32 - from.index() as i32).abs() == 16
                        && self.is_empty_sq(mid)
                        && self.is_empty_sq(to)
                } else {
                    PAWN_PUSHES[us.index()][from.index()] & bit_for_square(to).0 != 0
                        && self.is_empty_sq(to)
                }
            }
            Piece::Knight => KNIGHT_ATTACKS[from.index()] & bit_for_square(to).0 != 0,
            Piece::Bishop => bishop_attacks(from.index(), occ) & bit_for_square(to).0 != 0,
            Piece::Rook => rook_attacks(from.index(), occ) & bit_for_square(to).0 != 0,
            Piece::Queen => queen_attacks(from.index(), occ) & bit_for_square(to).0 != 0,
            Piece::King => {
                if m.is_castling() {
                    let mut castles = MoveList::new();
                    self.generate_castles(&mut castles);
                    castles.contains(m)
                } else {
                    KING_ATTACKS[from.index()] & bit_for_square(to).0 != 0
                }
            }
        }
    }

    /// Does `m` check the opponent? Called on the pre-move position.
    #[must_use]
    pub(crate) fn gives_check(&mut self, m: Move) -> bool {
        self.play(m);
        let checks = self.is_in_check(self.side_to_move);
        self.unplay(m);
        checks
    }

    #[must_use]
    pub fn is_checkmate(&self) -> bool {
        self.is_in_check(self.side_to_move) && self.generate_legal().is_empty()
    }

    #[must_use]
    pub fn is_stalemate(&self) -> bool {
        !self.is_in_check(self.side_to_move) && self.generate_legal().is_empty()
    }

    /// Node count of the legal move tree to `depth`
    #[must_use]
    pub fn perft(&mut self, depth: usize) -> u64 {
        if depth == 0 {
            return 1;
        }

        let moves = self.generate_legal();
        if depth == 1 {
            return moves.len() as u64;
        }

        let mut nodes = 0;
        for &m in moves.iter() {
            self.play(m);
            nodes += self.perft(depth - 1);
            self.unplay(m);
        }
        nodes
    }

    /// Perft split by root move, for movegen debugging
    pub fn perft_divide(&mut self, depth: usize) -> Vec<(Move, u64)> {
        let moves = self.generate_legal();
        let mut out = Vec::with_capacity(moves.len());
        for &m in moves.iter() {
            self.play(m);
            let nodes = if depth <= 1 { 1 } else { self.perft(depth - 1) };
            self.unplay(m);
            out.push((m, nodes));
        }
        out
    }
}

//! Search worker: negamax with quiescence and the pruning battery.
//!
//! One worker per thread. Workers communicate only through the shared
//! transposition table; killers, history, and counter-move tables are
//! thread-local so helper threads prune differently and populate the
//! TT with diverse lines.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use crate::board::{
    Board, Move, Piece, ScoredMoveList, EMPTY_MOVE, MAX_PLY, SEE_VALUES,
};
use crate::pawn_hash::PawnHashTable;
use crate::tt::{Bound, TranspositionTable};

use super::picker::MovePicker;
use super::{
    lmr_table, SearchInfoCallback, SearchIterationInfo, TablebaseProbe, Wdl, MATE_BOUND,
    MATE_SCORE, MAX_SEARCH_DEPTH, SCORE_INFINITE, TB_MAX_PIECES, TB_WIN_SCORE,
};

/// Flush the local node count and poll the stop state at this interval
const NODE_CHECK_MASK: u64 = 32767;

/// Contempt for early repetitions: a draw in the opening is slightly
/// worse than equal
const SHUFFLE_CONTEMPT: i32 = -25;
const CONTEMPT_HISTORY_PLIES: usize = 20;

/// State shared by every worker of one search.
pub(crate) struct SharedSearch {
    pub tt: Arc<TranspositionTable>,
    pub pawn_table: Arc<PawnHashTable>,
    pub stop: Arc<AtomicBool>,
    pub nodes: Arc<AtomicU64>,
    pub start_time: Instant,
    /// Written by the manager (initial deadline, `ponderhit`), read by
    /// thread 0 on its node-count ticks
    pub deadline: Arc<Mutex<Option<Instant>>>,
    pub max_depth: i32,
    pub infinite: bool,
    pub tablebase: Option<Arc<dyn TablebaseProbe>>,
    pub info: Option<SearchInfoCallback>,
}

pub(crate) struct SearchWorker {
    pub board: Board,
    pub thread_id: usize,
    shared: Arc<SharedSearch>,
    killers: [[Move; 2]; MAX_PLY],
    /// `[color][from][to]` quiet-move history
    history: Box<[[[i32; 64]; 64]; 2]>,
    /// `[color][previous mover][previous to-square]`
    counters: Box<[[[Move; 64]; 6]; 2]>,
    local_nodes: u64,
    seldepth: i32,
    /// Best root move of the current (possibly unfinished) iteration
    iter_root_move: Move,
    /// Best root move of the last completed iteration
    pub best_root_move: Move,
    pub last_score: i32,
}

impl SearchWorker {
    pub(crate) fn new(board: Board, thread_id: usize, shared: Arc<SharedSearch>) -> Self {
        SearchWorker {
            board,
            thread_id,
            shared,
            killers: [[EMPTY_MOVE; 2]; MAX_PLY],
            history: Box::new([[[0; 64]; 64]; 2]),
            counters: Box::new([[[EMPTY_MOVE; 64]; 6]; 2]),
            local_nodes: 0,
            seldepth: 0,
            iter_root_move: EMPTY_MOVE,
            best_root_move: EMPTY_MOVE,
            last_score: 0,
        }
    }

    /// Periodic stop poll. Flushes the local node count into the shared
    /// counter; thread 0 additionally compares the wall clock against
    /// the deadline and raises the stop flag for everyone.
    #[inline]
    fn check_stop(&mut self) -> bool {
        if self.local_nodes & NODE_CHECK_MASK == 0 {
            self.shared
                .nodes
                .fetch_add(self.local_nodes, Ordering::Relaxed);
            self.local_nodes = 0;

            if self.thread_id == 0 && self.deadline_passed() {
                self.shared.stop.store(true, Ordering::Relaxed);
            }
            if self.shared.stop.load(Ordering::Relaxed) {
                return true;
            }
        }
        self.local_nodes += 1;
        false
    }

    #[inline]
    fn deadline_passed(&self) -> bool {
        self.shared
            .deadline
            .lock()
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    #[inline]
    fn stopped(&self) -> bool {
        self.shared.stop.load(Ordering::Relaxed)
    }

    fn tb_probe(&self, ply: i32) -> Option<i32> {
        let tb = self.shared.tablebase.as_ref()?;
        if ply == 0
            || self.board.halfmove_clock() != 0
            || self.board.castling_rights != 0
            || self.board.occupied().popcount() > TB_MAX_PIECES
        {
            return None;
        }
        tb.probe_wdl(&self.board).map(|wdl| match wdl {
            Wdl::Win => TB_WIN_SCORE - ply,
            Wdl::Loss => -(TB_WIN_SCORE - ply),
            Wdl::BlessedLoss | Wdl::Draw | Wdl::CursedWin => 0,
        })
    }

    /// Negamax with all pruning and extension techniques.
    #[allow(clippy::too_many_lines)]
    pub(crate) fn negamax(
        &mut self,
        depth: i32,
        mut alpha: i32,
        beta: i32,
        ply: i32,
        allow_null: bool,
        excluded: Move,
    ) -> i32 {
        if self.check_stop() {
            return alpha;
        }
        if self.seldepth < ply {
            self.seldepth = ply;
        }

        // Draws by rule; slight contempt keeps the engine from
        // shuffling into repetitions straight out of the opening
        if ply > 0 && (self.board.halfmove_clock() >= 100 || self.board.is_repetition()) {
            return if self.board.ply_count() < CONTEMPT_HISTORY_PLIES {
                SHUFFLE_CONTEMPT
            } else {
                0
            };
        }

        if let Some(score) = self.tb_probe(ply) {
            return score;
        }

        if ply >= MAX_PLY as i32 - 1 {
            return self.board.evaluate_lazy();
        }

        let is_pv = beta - alpha > 1;
        let us = self.board.side_to_move();
        let in_check = self.board.is_in_check(us);
        let lazy_eval = if in_check {
            -SCORE_INFINITE
        } else {
            self.board.evaluate_lazy()
        };

        // Razoring: hopeless shallow nodes drop straight to quiescence
        if !in_check && !is_pv && ply > 0 && depth <= 3 && lazy_eval + 150 * depth + 50 <= alpha {
            return self.qsearch(alpha, beta, ply);
        }

        // Transposition table
        let mut tt_move = EMPTY_MOVE;
        let probe = self
            .shared
            .tt
            .probe(self.board.hash(), depth.max(0) as u8, ply, alpha, beta);
        if let Some(entry) = probe {
            tt_move = entry.mv;
            if ply > 0 && tt_move != excluded {
                if let Some(score) = entry.cutoff {
                    let usable = !is_pv
                        || entry.bound == Bound::Exact
                        || (entry.bound == Bound::Beta && score >= beta);
                    if usable {
                        return score;
                    }
                }
            }
        }

        // Leaf: quiescence, except one free ply of evasions in check
        let depth = if depth <= 0 {
            if in_check && ply < MAX_SEARCH_DEPTH - 5 {
                1
            } else {
                return self.qsearch(alpha, beta, ply);
            }
        } else {
            depth
        };

        // Reverse futility: far above beta with depth to spare
        if depth <= 6
            && !in_check
            && !is_pv
            && ply > 0
            && beta.abs() < MATE_BOUND
            && lazy_eval - (70 * depth + 50) >= beta
        {
            return beta;
        }

        // Internal iterative deepening: a PV node without a TT move is
        // worth a shallow pre-search just to get one
        if tt_move.is_null() && is_pv && depth >= 6 {
            self.negamax(depth - 2, alpha, beta, ply, true, EMPTY_MOVE);
            tt_move = self.shared.tt.get_move(self.board.hash());
        }

        // Null move pruning
        if depth >= 3
            && ply > 0
            && allow_null
            && !in_check
            && excluded.is_null()
            && self.board.has_non_pawn_material(us)
            && alpha > -MATE_BOUND
            && beta < MATE_BOUND
        {
            let r = (2 + depth / 4).min(depth - 1);
            let info = self.board.play_null();
            let score = -self.negamax(depth - 1 - r, -beta, -beta + 1, ply + 1, false, EMPTY_MOVE);
            self.board.unplay_null(info);

            if score >= beta {
                // Never trust a null-move mate
                return if score > MATE_BOUND { beta } else { score };
            }
        }

        let futility_applies =
            depth <= 4 && !in_check && ply > 0 && lazy_eval + 100 + 120 * depth <= alpha;

        let prev = self.board.last_move();
        let counter = if prev.is_null() {
            EMPTY_MOVE
        } else {
            self.counters[us.index()][prev.piece().index()][prev.to().index()]
        };
        let ply_idx = ply as usize;
        let mut picker = MovePicker::new(
            &self.board,
            tt_move,
            ply_idx,
            self.killers[ply_idx],
            counter,
            self.thread_id,
        );

        let alpha_orig = alpha;
        let mut best_score = -SCORE_INFINITE;
        let mut best_move = EMPTY_MOVE;
        let mut moves_searched: i32 = 0;
        let mut quiets_tried = [EMPTY_MOVE; 64];
        let mut quiets_count = 0usize;

        loop {
            let Some(m) = picker.next(&self.board, &self.history[us.index()]) else {
                break;
            };
            if m == excluded || !self.board.is_move_legal(m) {
                continue;
            }
            let is_tactical = picker.current_is_tactical;

            // Late move pruning: shallow quiet tails are noise
            if !in_check
                && depth <= 4
                && !is_tactical
                && moves_searched >= 3 + depth * depth * 2
            {
                continue;
            }

            if futility_applies && moves_searched >= 1 && !is_tactical {
                continue;
            }

            // SEE pruning of clearly losing captures
            if !in_check
                && !is_pv
                && depth <= 6
                && moves_searched > 1
                && m != tt_move
                && m.is_capture()
            {
                let victim = if m.is_en_passant() {
                    Piece::Pawn
                } else {
                    m.captured().unwrap_or(Piece::Pawn)
                };
                if SEE_VALUES[m.piece().index()] > SEE_VALUES[victim.index()] {
                    let threshold = -20 * depth - SEE_VALUES[victim.index()] / 2;
                    if self.board.see(m) < threshold {
                        continue;
                    }
                }
            }

            // Singular extension: verify the TT move is uniquely best by
            // re-searching this node without it under a lowered window
            let mut extension = 0;
            if m == tt_move && !in_check && depth >= 8 && ply > 0 && excluded.is_null() {
                if let Some(entry) = self.shared.tt.probe(
                    self.board.hash(),
                    (depth - 3).max(0) as u8,
                    ply,
                    -SCORE_INFINITE,
                    SCORE_INFINITE,
                ) {
                    if entry.depth as i32 >= depth - 3
                        && entry.bound != Bound::Alpha
                        && entry.score.abs() < MATE_BOUND
                    {
                        let singular_beta = entry.score - 2 * depth;
                        let singular_depth = (depth - 1) / 2;
                        let score = self.negamax(
                            singular_depth,
                            singular_beta - 1,
                            singular_beta,
                            ply,
                            false,
                            m,
                        );
                        if score < singular_beta {
                            extension = 1;
                        }
                    }
                }
            }

            moves_searched += 1;
            if !is_tactical && quiets_count < quiets_tried.len() {
                quiets_tried[quiets_count] = m;
                quiets_count += 1;
            }

            self.board.play(m);
            self.shared.tt.prefetch(self.board.hash());
            let gives_check = self.board.is_in_check(self.board.side_to_move());
            if gives_check && depth >= 2 {
                extension = extension.max(1);
            }
            let mut new_depth = depth - 1 + extension;
            if ply + new_depth >= MAX_SEARCH_DEPTH {
                new_depth = MAX_SEARCH_DEPTH - ply;
            }

            let mut score;
            let reduction_ok = depth >= 3
                && moves_searched >= 4
                && !is_tactical
                && !in_check
                && !gives_check
                && extension == 0;

            if reduction_ok {
                let r = (lmr_table()[depth.min(63) as usize][moves_searched.min(63) as usize]
                    as i32)
                    .clamp(0, depth - 2);
                score = -self.negamax(depth - 1 - r, -alpha - 1, -alpha, ply + 1, true, EMPTY_MOVE);
                if score > alpha && r > 0 {
                    score =
                        -self.negamax(depth - 1, -alpha - 1, -alpha, ply + 1, true, EMPTY_MOVE);
                }
            } else if moves_searched > 1 {
                score = -self.negamax(new_depth, -alpha - 1, -alpha, ply + 1, true, EMPTY_MOVE);
            } else {
                score = -self.negamax(new_depth, -beta, -alpha, ply + 1, true, EMPTY_MOVE);
            }

            // PVS re-search on a fail inside the window
            if moves_searched > 1 && score > alpha && score < beta {
                score = -self.negamax(new_depth, -beta, -alpha, ply + 1, true, EMPTY_MOVE);
            }

            self.board.unplay(m);

            if score >= beta {
                self.shared
                    .tt
                    .store(self.board.hash(), depth as u8, ply, score, Bound::Beta, m);

                if !is_tactical {
                    let bonus = depth * depth;
                    let hist = &mut self.history[us.index()];
                    let slot = &mut hist[m.from().index()][m.to().index()];
                    *slot = slot.saturating_add(bonus);
                    // Quiets tried before the cutoff move failed here
                    for &quiet in quiets_tried.iter().take(quiets_count) {
                        if quiet != m && !quiet.is_null() {
                            let slot = &mut hist[quiet.from().index()][quiet.to().index()];
                            *slot = (*slot - bonus).max(-10000);
                        }
                    }

                    if m != self.killers[ply_idx][0] {
                        self.killers[ply_idx][1] = self.killers[ply_idx][0];
                        self.killers[ply_idx][0] = m;
                    }
                    if !prev.is_null() {
                        self.counters[us.index()][prev.piece().index()][prev.to().index()] = m;
                    }
                }
                return score;
            }

            if score > best_score {
                best_score = score;
                best_move = m;
                if score > alpha {
                    alpha = score;
                }
            }
        }

        if ply == 0 {
            self.iter_root_move = best_move;
        }

        // Checkmate or stalemate
        if moves_searched == 0 {
            let score = if in_check { -MATE_SCORE + ply } else { 0 };
            self.shared.tt.store(
                self.board.hash(),
                depth as u8,
                ply,
                score,
                Bound::Exact,
                EMPTY_MOVE,
            );
            return score;
        }

        // A cancelled node must not pollute the table
        if self.stopped() {
            return best_score;
        }

        let flag = if best_score <= alpha_orig {
            Bound::Alpha
        } else {
            Bound::Exact
        };
        self.shared
            .tt
            .store(self.board.hash(), depth as u8, ply, best_score, flag, best_move);

        best_score
    }

    /// Quiescence: captures (and evasions while in check) until the
    /// position goes quiet.
    fn qsearch(&mut self, mut alpha: i32, beta: i32, ply: i32) -> i32 {
        if self.check_stop() {
            return alpha;
        }

        let probe = self
            .shared
            .tt
            .probe(self.board.hash(), 0, ply, alpha, beta);
        let mut tt_move = EMPTY_MOVE;
        if let Some(entry) = probe {
            tt_move = entry.mv;
            if let Some(score) = entry.cutoff {
                return score;
            }
        }

        let us = self.board.side_to_move();
        let in_check = self.board.is_in_check(us);

        let stand_pat = if in_check {
            -SCORE_INFINITE
        } else {
            let score = self
                .board
                .eval_relative(&self.shared.pawn_table, alpha, beta);
            if score >= beta {
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
            score
        };

        if ply >= MAX_PLY as i32 - 1 {
            return if in_check { 0 } else { stand_pat };
        }

        let mut list = crate::board::MoveList::new();
        if in_check {
            self.board.generate_pseudo_legal(&mut list);
        } else {
            self.board.generate_pseudo_legal_captures(&mut list);
        }

        // TT move first, then MVV-LVA over tactical moves, history for
        // the evasions
        let mut scored = ScoredMoveList::new();
        for &m in list.iter() {
            let score = if m == tt_move {
                2_000_000
            } else if m.is_capture() || m.is_promotion() {
                let victim_index = if m.is_en_passant() {
                    Piece::Pawn.index() as i32
                } else {
                    m.captured().map_or(-1, |v| v.index() as i32)
                };
                let promo_bonus = if m.is_promotion() { 10_000 } else { 0 };
                1_000_000 + 100 * (victim_index + 1) + 5 - m.piece().index() as i32 + promo_bonus
            } else {
                self.history[us.index()][m.from().index()][m.to().index()]
            };
            scored.push(m, score);
        }

        let mut best_score = if in_check { -SCORE_INFINITE } else { stand_pat };
        let mut best_move = EMPTY_MOVE;
        let alpha_orig = alpha;
        let mut moves_searched = 0;

        let mut idx = 0;
        while let Some(m) = scored.pick_best(idx) {
            idx += 1;

            if !in_check {
                let victim_value = if m.is_en_passant() {
                    SEE_VALUES[Piece::Pawn.index()]
                } else {
                    m.captured().map_or(0, |v| SEE_VALUES[v.index()])
                };

                // Delta pruning: even the full victim plus a margin
                // cannot lift alpha
                let promo_bonus = if m.is_promotion() { 800 } else { 0 };
                if stand_pat + victim_value + promo_bonus + 200 < alpha {
                    continue;
                }

                // Losing captures are not worth resolving here
                if m.is_capture()
                    && SEE_VALUES[m.piece().index()] > victim_value
                    && self.board.see(m) < 0
                {
                    continue;
                }
            }

            if !self.board.is_move_legal(m) {
                continue;
            }

            moves_searched += 1;
            self.board.play(m);
            let score = -self.qsearch(-beta, -alpha, ply + 1);
            self.board.unplay(m);

            if score >= beta {
                self.shared
                    .tt
                    .store(self.board.hash(), 0, ply, beta, Bound::Beta, m);
                return beta;
            }
            if score > best_score {
                best_score = score;
                if score > alpha {
                    alpha = score;
                    best_move = m;
                }
            }
        }

        // Mate is only provable here when every evasion failed
        if moves_searched == 0 && in_check {
            let score = -MATE_SCORE + ply;
            self.shared.tt.store(
                self.board.hash(),
                0,
                ply,
                score,
                Bound::Exact,
                EMPTY_MOVE,
            );
            return score;
        }

        if !self.stopped() {
            let flag = if best_score <= alpha_orig {
                Bound::Alpha
            } else {
                Bound::Exact
            };
            self.shared
                .tt
                .store(self.board.hash(), 0, ply, best_score, flag, best_move);
        }

        best_score
    }

    /// Aspiration windows around the previous iteration's score.
    fn aspiration(&mut self, depth: i32, last_score: i32) -> i32 {
        let mut delta = if depth >= 12 {
            100
        } else if depth >= 8 {
            50
        } else {
            16
        };

        let mut alpha = -SCORE_INFINITE;
        let mut beta = SCORE_INFINITE;
        if depth >= 5 {
            alpha = last_score - delta;
            beta = last_score + delta;
        }

        let mut iterations = 0;
        const MAX_FAILED_WINDOWS: i32 = 5;

        loop {
            iterations += 1;
            let score = self.negamax(depth, alpha, beta, 0, true, EMPTY_MOVE);

            // Mates within the horizon are final for this iteration
            if score.abs() >= MATE_SCORE - depth {
                if !self.iter_root_move.is_null() {
                    self.best_root_move = self.iter_root_move;
                }
                return score;
            }
            // Near-mate scores make narrow windows meaningless
            if score.abs() >= MATE_SCORE - 256 {
                alpha = -SCORE_INFINITE;
                beta = SCORE_INFINITE;
                continue;
            }

            if self.stopped() {
                return score;
            }
            if self.thread_id == 0 && self.deadline_passed() {
                self.shared.stop.store(true, Ordering::Relaxed);
                return score;
            }

            if score > alpha && score < beta {
                if !self.iter_root_move.is_null() {
                    self.best_root_move = self.iter_root_move;
                }
                return score;
            }

            if score <= alpha {
                delta = (delta * 2).max(50);
                alpha = (-SCORE_INFINITE).max(alpha - delta);
            } else {
                delta = (delta * 2).max(50);
                beta = SCORE_INFINITE.min(beta + delta);
            }

            if iterations >= MAX_FAILED_WINDOWS || delta > 2000 {
                alpha = -SCORE_INFINITE;
                beta = SCORE_INFINITE;
            }
        }
    }

    /// Iterative deepening loop. Thread 0 reports each completed depth
    /// and raises the stop flag once the last one finishes.
    pub(crate) fn iterative_deepening(&mut self) {
        let mut last_score = 0;

        for depth in 1..=self.shared.max_depth {
            self.age_history();
            self.seldepth = 0;
            last_score = self.aspiration(depth, last_score);
            self.last_score = last_score;

            if self.stopped() {
                return;
            }

            if self.thread_id == 0 {
                self.report_iteration(depth, last_score);
            }
        }

        if self.thread_id == 0 && !self.shared.infinite {
            self.shared.stop.store(true, Ordering::Relaxed);
        }
    }

    fn report_iteration(&mut self, depth: i32, score: i32) {
        // Fold outstanding local nodes into the shared counter first
        self.shared
            .nodes
            .fetch_add(self.local_nodes, Ordering::Relaxed);
        self.local_nodes = 0;

        let Some(callback) = self.shared.info.clone() else {
            return;
        };

        let nodes = self.shared.nodes.load(Ordering::Relaxed);
        let elapsed = self.shared.start_time.elapsed().as_millis().max(1) as u64;
        let mate_in = if score.abs() >= MATE_BOUND {
            let plies = MATE_SCORE - score.abs();
            let moves = (plies + 1) / 2;
            Some(if score > 0 { moves } else { -moves })
        } else {
            None
        };

        let info = SearchIterationInfo {
            depth,
            seldepth: self.seldepth,
            score,
            mate_in,
            nodes,
            nps: nodes * 1000 / elapsed,
            time_ms: elapsed,
            hashfull: self.shared.tt.hashfull(),
            pv: self.pv_line(depth),
        };
        callback(&info);
    }

    /// Walk the PV out of the transposition table, guarding against
    /// corrupt moves and cycles.
    fn pv_line(&mut self, max_len: i32) -> String {
        let mut pv = String::new();
        let mut played: Vec<Move> = Vec::new();
        let mut visited: Vec<u64> = Vec::new();

        for _ in 0..max_len {
            let m = self.shared.tt.get_move(self.board.hash());
            if m.is_null() {
                break;
            }
            if !self.board.is_move_pseudo_legal(m) || !self.board.is_move_legal(m) {
                break;
            }
            if visited.contains(&self.board.hash()) {
                break;
            }
            visited.push(self.board.hash());

            if !pv.is_empty() {
                pv.push(' ');
            }
            pv.push_str(&m.to_string());
            self.board.play(m);
            played.push(m);
        }

        for m in played.into_iter().rev() {
            self.board.unplay(m);
        }
        pv
    }

    /// Decay history between iterations so fresh cutoffs dominate
    fn age_history(&mut self) {
        for side in self.history.iter_mut() {
            for from in side.iter_mut() {
                for entry in from.iter_mut() {
                    *entry /= 2;
                }
            }
        }
    }
}

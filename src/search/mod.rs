//! Parallel alpha-beta search.
//!
//! A manager spawns one worker per thread (Lazy SMP); workers share
//! only the transposition table, the pawn cache, a stop flag, and a
//! node counter. Each worker owns its board copy and its ordering
//! tables (killers, history, counter moves).

mod manager;
mod picker;
pub mod time;
mod worker;

use std::sync::Arc;

pub use manager::{Engine, SearchReport};
pub use time::SearchLimits;

use crate::board::Board;

/// Absolute score bound for the alpha-beta window
pub const SCORE_INFINITE: i32 = 32500;

/// Mate at the root
pub const MATE_SCORE: i32 = 32000;

/// Scores beyond this are mate-in-N and get ply-normalized in the TT
pub const MATE_BOUND: i32 = MATE_SCORE - 1000;

/// Tablebase win score, kept outside the mate window
pub(crate) const TB_WIN_SCORE: i32 = 29000;

/// Iterative deepening never goes past this depth
pub(crate) const MAX_SEARCH_DEPTH: i32 = 64;

/// Maximum number of pieces for a tablebase probe
pub(crate) const TB_MAX_PIECES: u32 = 5;

/// Win/draw/loss result of a tablebase probe.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wdl {
    Loss,
    BlessedLoss,
    Draw,
    CursedWin,
    Win,
}

/// Hook for an external endgame tablebase. The engine ships none; a
/// front end may install a Syzygy prober here.
pub trait TablebaseProbe: Send + Sync {
    /// WDL from the side to move's perspective, or `None` when the
    /// position is not covered.
    fn probe_wdl(&self, board: &Board) -> Option<Wdl>;
}

/// Per-iteration report sent to the front end.
#[derive(Debug, Clone)]
pub struct SearchIterationInfo {
    pub depth: i32,
    pub seldepth: i32,
    pub score: i32,
    /// Moves to mate (negative when getting mated), if the score is a mate
    pub mate_in: Option<i32>,
    pub nodes: u64,
    pub nps: u64,
    pub time_ms: u64,
    pub hashfull: u32,
    pub pv: String,
}

/// Callback type for iteration info.
pub type SearchInfoCallback = Arc<dyn Fn(&SearchIterationInfo) + Send + Sync>;

/// Precomputed late-move-reduction table, indexed `[depth][move number]`.
pub(crate) fn lmr_table() -> &'static [[u8; 64]; 64] {
    use std::sync::OnceLock;
    static TABLE: OnceLock<[[u8; 64]; 64]> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut t = [[0u8; 64]; 64];
        for (depth, row) in t.iter_mut().enumerate().skip(1) {
            for (moves, cell) in row.iter_mut().enumerate().skip(1) {
                let r = 0.5 + (depth as f64).ln() * (moves as f64).ln() / 2.25;
                *cell = r as u8;
            }
        }
        t
    })
}

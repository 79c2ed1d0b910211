//! Search manager: thread pool, shared state, and root move selection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

use parking_lot::Mutex;

use crate::board::{Board, Move, EMPTY_MOVE};
use crate::book::PolyglotBook;
use crate::pawn_hash::PawnHashTable;
use crate::tt::TranspositionTable;

use super::time::SearchLimits;
use super::worker::{SearchWorker, SharedSearch};
use super::{SearchInfoCallback, TablebaseProbe, MAX_SEARCH_DEPTH};

/// Default transposition table size in MiB
pub const DEFAULT_HASH_MB: usize = 64;

/// Search thread stack size; the recursion is deep enough that the
/// platform default is not guaranteed to fit.
const SEARCH_STACK_SIZE: usize = 16 * 1024 * 1024;

/// Outcome of a completed (or cancelled) search.
#[derive(Debug, Clone, Copy)]
pub struct SearchReport {
    /// Best move found; `None` only when the position has no legal move
    pub best_move: Option<Move>,
    /// Expected reply, for pondering
    pub ponder_move: Option<Move>,
    pub score: i32,
    pub nodes: u64,
}

/// Engine facade: owns the shared tables and configuration, spawns the
/// workers. Cloning shares the stop flag and deadline, so a clone moved
/// onto a search thread still responds to `stop()` from the original.
#[derive(Clone)]
pub struct Engine {
    tt: Arc<TranspositionTable>,
    pawn_table: Arc<PawnHashTable>,
    stop: Arc<AtomicBool>,
    deadline: Arc<Mutex<Option<Instant>>>,
    threads: usize,
    book: Option<Arc<PolyglotBook>>,
    tablebase: Option<Arc<dyn TablebaseProbe>>,
    info: Option<SearchInfoCallback>,
}

impl Engine {
    #[must_use]
    pub fn new() -> Self {
        crate::board::init_attack_tables();
        Engine {
            tt: Arc::new(TranspositionTable::new(DEFAULT_HASH_MB)),
            pawn_table: Arc::new(PawnHashTable::default()),
            stop: Arc::new(AtomicBool::new(false)),
            deadline: Arc::new(Mutex::new(None)),
            threads: 1,
            book: None,
            tablebase: None,
            info: None,
        }
    }

    /// Resize the transposition table (MiB, clamped to 1..=2048). The
    /// old table stays alive for any search still holding it.
    pub fn set_hash_mb(&mut self, mb: usize) {
        self.tt = Arc::new(TranspositionTable::new(mb));
    }

    pub fn set_threads(&mut self, threads: usize) {
        self.threads = threads.clamp(1, 128);
    }

    /// Use every hardware thread
    pub fn set_threads_auto(&mut self) {
        let n = thread::available_parallelism().map_or(1, |n| n.get());
        self.set_threads(n);
    }

    pub fn set_info_callback(&mut self, callback: SearchInfoCallback) {
        self.info = Some(callback);
    }

    pub fn set_book(&mut self, book: Option<PolyglotBook>) {
        self.book = book.map(Arc::new);
    }

    pub fn set_tablebase(&mut self, tablebase: Option<Arc<dyn TablebaseProbe>>) {
        self.tablebase = tablebase;
    }

    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Abort the current search from any thread.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// Convert a pondering search into a timed one: the opponent played
    /// the expected move, the clock is ours now.
    pub fn ponderhit(&self, limits: &SearchLimits) {
        let now = Instant::now();
        let real = SearchLimits {
            ponder: false,
            ..limits.clone()
        };
        *self.deadline.lock() = real.deadline(now);
    }

    /// Drop all cached state between games.
    pub fn new_game(&self) {
        self.tt.clear();
        self.pawn_table.clear();
    }

    /// Run a search on `board` under `limits` and return the chosen
    /// move. Blocks until the search finishes or is stopped; callers
    /// that need `stop()` run this on its own thread via `clone()`.
    #[must_use]
    pub fn start_search(&self, board: &Board, limits: &SearchLimits) -> SearchReport {
        // Opening book: a hit plays instantly and skips the search
        if let Some(book) = &self.book {
            if let Some(book_move) = book.pick(board) {
                return SearchReport {
                    best_move: Some(book_move),
                    ponder_move: None,
                    score: 0,
                    nodes: 0,
                };
            }
        }

        self.stop.store(false, Ordering::Relaxed);
        let start_time = Instant::now();
        *self.deadline.lock() = limits.deadline(start_time);
        self.tt.next_generation();

        #[cfg(feature = "logging")]
        log::debug!(
            "search start: {} threads, budget {:?} ms, depth cap {:?}",
            self.threads,
            limits.think_time_ms(),
            limits.depth
        );

        let nodes = Arc::new(AtomicU64::new(0));
        let shared = Arc::new(SharedSearch {
            tt: Arc::clone(&self.tt),
            pawn_table: Arc::clone(&self.pawn_table),
            stop: Arc::clone(&self.stop),
            nodes: Arc::clone(&nodes),
            start_time,
            deadline: Arc::clone(&self.deadline),
            max_depth: limits.depth.unwrap_or(MAX_SEARCH_DEPTH).clamp(1, MAX_SEARCH_DEPTH),
            infinite: limits.infinite || limits.ponder,
            tablebase: self.tablebase.clone(),
            info: self.info.clone(),
        });

        let mut results: Vec<(Move, i32)> = Vec::with_capacity(self.threads);
        thread::scope(|scope| {
            let mut handles = Vec::with_capacity(self.threads);
            for thread_id in 0..self.threads {
                let shared = Arc::clone(&shared);
                let board = board.clone();
                let handle = thread::Builder::new()
                    .name(format!("search-{thread_id}"))
                    .stack_size(SEARCH_STACK_SIZE)
                    .spawn_scoped(scope, move || {
                        let mut worker = SearchWorker::new(board, thread_id, shared);
                        worker.iterative_deepening();
                        (worker.best_root_move, worker.last_score)
                    })
                    .expect("failed to spawn search worker");
                handles.push(handle);
            }
            for handle in handles {
                if let Ok(result) = handle.join() {
                    results.push(result);
                }
            }
        });

        // Worker 0 owns the answer; helpers only feed the TT
        let mut best_move = results.first().map_or(EMPTY_MOVE, |r| r.0);
        let score = results.first().map_or(0, |r| r.1);
        let mut scratch = board.clone();

        // Degenerate endings: fall back to the TT move, then to any
        // legal move at all
        if best_move.is_null() {
            let tt_move = self.tt.get_move(scratch.hash());
            if !tt_move.is_null()
                && scratch.is_move_pseudo_legal(tt_move)
                && scratch.is_move_legal(tt_move)
            {
                best_move = tt_move;
            }
        }
        if best_move.is_null() {
            best_move = scratch.generate_legal().first().unwrap_or(EMPTY_MOVE);
        }

        let ponder_move = if best_move.is_null() {
            None
        } else {
            scratch.play(best_move);
            let reply = self.tt.get_move(scratch.hash());
            let reply = (!reply.is_null()
                && scratch.is_move_pseudo_legal(reply)
                && scratch.is_move_legal(reply))
            .then_some(reply);
            scratch.unplay(best_move);
            reply
        };

        #[cfg(feature = "logging")]
        log::debug!(
            "search done: best {best_move:?}, {} nodes",
            nodes.load(Ordering::Relaxed)
        );

        SearchReport {
            best_move: (!best_move.is_null()).then_some(best_move),
            ponder_move,
            score,
            nodes: nodes.load(Ordering::Relaxed),
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Engine::new()
    }
}

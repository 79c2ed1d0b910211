//! Time budget for a search.

use std::time::{Duration, Instant};

/// Floor for any timed search, keeps the engine from flagging on
/// sub-millisecond budgets.
const MIN_THINK_MS: u64 = 20;

/// Overhead subtracted from an explicit `movetime`
const MOVE_OVERHEAD_MS: u64 = 50;

/// Limits parsed from a `go` command.
#[derive(Debug, Clone, Default)]
pub struct SearchLimits {
    /// Fixed depth limit (`go depth D`)
    pub depth: Option<i32>,
    /// Exact time for this move in ms (`go movetime N`)
    pub movetime_ms: Option<u64>,
    /// Our remaining clock time in ms (`go wtime/btime`)
    pub time_left_ms: Option<u64>,
    /// Our increment in ms (`go winc/binc`)
    pub increment_ms: u64,
    /// `go infinite`: only an external stop ends the search
    pub infinite: bool,
    /// `go ponder`: search without a deadline until `ponderhit`
    pub ponder: bool,
}

impl SearchLimits {
    /// Fixed-depth limits, mostly for tests
    #[must_use]
    pub fn depth(depth: i32) -> Self {
        SearchLimits {
            depth: Some(depth),
            ..Default::default()
        }
    }

    /// Fixed time per move
    #[must_use]
    pub fn movetime(ms: u64) -> Self {
        SearchLimits {
            movetime_ms: Some(ms),
            ..Default::default()
        }
    }

    /// Milliseconds to think, or `None` for no deadline.
    ///
    /// `movetime` wins when present (minus a transmission overhead);
    /// otherwise the classic clock split `time/28 + inc/2`. Both are
    /// floored at 20 ms.
    #[must_use]
    pub fn think_time_ms(&self) -> Option<u64> {
        if self.infinite || self.ponder {
            return None;
        }
        if let Some(movetime) = self.movetime_ms {
            return Some(movetime.saturating_sub(MOVE_OVERHEAD_MS).max(MIN_THINK_MS));
        }
        if let Some(time_left) = self.time_left_ms {
            let budget = time_left / 28 + self.increment_ms / 2;
            return Some(budget.max(MIN_THINK_MS));
        }
        None
    }

    /// Absolute deadline for this search, if any.
    #[must_use]
    pub fn deadline(&self, start: Instant) -> Option<Instant> {
        self.think_time_ms()
            .map(|ms| start + Duration::from_millis(ms))
    }
}

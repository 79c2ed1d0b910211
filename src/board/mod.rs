//! Chess board representation and game logic.
//!
//! Bitboards plus a redundant mailbox for fast piece lookup, with
//! make/unmake, magic-bitboard move generation, FEN I/O, static
//! exchange evaluation, and the tapered evaluation.
//!
//! # Example
//! ```
//! use krait::board::Board;
//!
//! let mut board = Board::new();
//! let moves = board.generate_legal();
//! println!("Starting position has {} legal moves", moves.len());
//! ```

mod attack_tables;
mod error;
mod eval;
mod eval_state;
mod fen;
mod make_unmake;
mod movegen;
mod pst;
mod see;
mod state;
mod types;

#[cfg(test)]
mod tests;

// Public API - types users need
pub use error::{FenError, MoveParseError, SquareError};
pub use make_unmake::NullMoveInfo;
pub use state::{Board, UndoInfo};
pub use types::{
    Bitboard, CastlingRights, Color, Move, MoveFlag, MoveList, MoveListIntoIter, Piece, Square,
};

// Internals shared with the search and book modules
pub(crate) use attack_tables::init as init_attack_tables;
pub(crate) use see::SEE_VALUES;
pub(crate) use types::{ScoredMoveList, EMPTY_MOVE, MAX_MOVES, MAX_PLY};

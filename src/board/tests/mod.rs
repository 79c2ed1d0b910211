//! Board test suite.

mod draw;
mod fen;

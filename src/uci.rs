//! UCI protocol front end.
//!
//! The loop owns the game board and the engine configuration; `go`
//! hands a cloned engine and board to a background thread so `stop`
//! and `ponderhit` stay responsive. Malformed input is reported as an
//! `info string` diagnostic and never corrupts the engine state.

use std::io::BufRead;
use std::sync::Arc;
use std::thread::JoinHandle;

use crate::board::Board;
use crate::book::PolyglotBook;
use crate::search::{Engine, SearchIterationInfo, SearchLimits};

const ENGINE_NAME: &str = concat!("krait ", env!("CARGO_PKG_VERSION"));

struct UciState {
    engine: Engine,
    board: Board,
    last_limits: SearchLimits,
    search_thread: Option<JoinHandle<()>>,
    own_book: bool,
    book_path: Option<String>,
}

impl UciState {
    fn new() -> Self {
        let mut engine = Engine::new();
        engine.set_info_callback(Arc::new(print_info));
        UciState {
            engine,
            board: Board::new(),
            last_limits: SearchLimits::default(),
            search_thread: None,
            own_book: false,
            book_path: None,
        }
    }

    /// Stop any running search and wait for its bestmove.
    fn finish_search(&mut self) {
        if let Some(handle) = self.search_thread.take() {
            self.engine.stop();
            let _ = handle.join();
        }
    }
}

fn print_info(info: &SearchIterationInfo) {
    let score = match info.mate_in {
        Some(mate) => format!("mate {mate}"),
        None => format!("cp {}", info.score),
    };
    println!(
        "info depth {} seldepth {} score {} nodes {} nps {} hashfull {} time {} pv {}",
        info.depth,
        info.seldepth,
        score,
        info.nodes,
        info.nps,
        info.hashfull,
        info.time_ms,
        info.pv
    );
}

/// Blocking UCI command loop over stdin.
pub fn run_uci_loop() {
    let stdin = std::io::stdin();
    let mut state = UciState::new();

    for line in stdin.lock().lines() {
        let Ok(line) = line else { break };
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let Some(&command) = tokens.first() else {
            continue;
        };

        match command {
            "uci" => {
                println!("id name {ENGINE_NAME}");
                println!("id author the krait developers");
                println!("option name Hash type spin default 64 min 1 max 2048");
                println!("option name Threads type spin default 1 min 1 max 128");
                println!("option name Ponder type check default false");
                println!("option name OwnBook type check default false");
                println!("option name BookFile type string default <empty>");
                println!("uciok");
            }
            "isready" => println!("readyok"),
            "ucinewgame" => {
                state.finish_search();
                state.engine.new_game();
                state.board = Board::new();
            }
            "position" => {
                state.finish_search();
                handle_position(&mut state, &tokens[1..]);
            }
            "go" => {
                state.finish_search();
                handle_go(&mut state, &tokens[1..]);
            }
            "stop" => state.engine.stop(),
            "ponderhit" => state.engine.ponderhit(&state.last_limits),
            "setoption" => handle_setoption(&mut state, &tokens[1..]),
            "perft" => {
                let depth = tokens
                    .get(1)
                    .and_then(|t| t.parse::<usize>().ok())
                    .unwrap_or(1);
                handle_perft(&mut state.board, depth);
            }
            "quit" => {
                state.finish_search();
                break;
            }
            _ => println!("info string unknown command '{command}'"),
        }
    }
}

fn handle_position(state: &mut UciState, args: &[&str]) {
    let mut board;
    let index;

    match args.first() {
        Some(&"startpos") => {
            board = Board::new();
            index = 1;
        }
        Some(&"fen") => {
            // FEN is the next up-to-six fields, until "moves"
            let fen_end = args
                .iter()
                .position(|&t| t == "moves")
                .unwrap_or(args.len());
            let fen = args[1..fen_end].join(" ");
            match Board::try_from_fen(&fen) {
                Ok(parsed) => board = parsed,
                Err(err) => {
                    println!("info string bad fen: {err}");
                    return;
                }
            }
            index = fen_end;
        }
        _ => {
            println!("info string position needs 'startpos' or 'fen'");
            return;
        }
    }

    if args.get(index) == Some(&"moves") {
        for uci in &args[index + 1..] {
            if let Err(err) = board.play_uci(uci) {
                println!("info string {err}");
                break;
            }
        }
    }

    state.board = board;
}

fn handle_go(state: &mut UciState, args: &[&str]) {
    let mut limits = SearchLimits::default();
    let white_to_move = state.board.side_to_move() == crate::board::Color::White;

    fn parse_u64(token: Option<&&str>) -> Option<u64> {
        token.and_then(|t| t.parse().ok())
    }

    let mut iter = args.iter();
    while let Some(&token) = iter.next() {
        match token {
            "wtime" => {
                if let Some(v) = parse_u64(iter.next()) {
                    if white_to_move {
                        limits.time_left_ms = Some(v);
                    }
                }
            }
            "btime" => {
                if let Some(v) = parse_u64(iter.next()) {
                    if !white_to_move {
                        limits.time_left_ms = Some(v);
                    }
                }
            }
            "winc" => {
                if let Some(v) = parse_u64(iter.next()) {
                    if white_to_move {
                        limits.increment_ms = v;
                    }
                }
            }
            "binc" => {
                if let Some(v) = parse_u64(iter.next()) {
                    if !white_to_move {
                        limits.increment_ms = v;
                    }
                }
            }
            "movetime" => limits.movetime_ms = parse_u64(iter.next()),
            "depth" => {
                limits.depth = iter.next().and_then(|t| t.parse::<i32>().ok());
            }
            "movestogo" | "nodes" | "mate" => {
                // Accepted but unused by the time model
                let _ = iter.next();
            }
            "infinite" => limits.infinite = true,
            "ponder" => limits.ponder = true,
            _ => {}
        }
    }

    state.last_limits = limits.clone();

    // Reload the book lazily when enabled
    if state.own_book {
        if let Some(path) = &state.book_path {
            match PolyglotBook::load(path) {
                Ok(book) => state.engine.set_book(Some(book)),
                Err(err) => {
                    println!("info string book '{path}' not loaded: {err}");
                    state.engine.set_book(None);
                }
            }
        }
    } else {
        state.engine.set_book(None);
    }

    let engine = state.engine.clone();
    let board = state.board.clone();
    state.search_thread = Some(std::thread::spawn(move || {
        let report = engine.start_search(&board, &limits);
        match (report.best_move, report.ponder_move) {
            (Some(best), Some(ponder)) => println!("bestmove {best} ponder {ponder}"),
            (Some(best), None) => println!("bestmove {best}"),
            (None, _) => println!("bestmove (none)"),
        }
    }));
}

fn handle_setoption(state: &mut UciState, args: &[&str]) {
    // setoption name <tokens...> [value <tokens...>]
    let Some(name_at) = args.iter().position(|&t| t == "name") else {
        println!("info string setoption needs a name");
        return;
    };
    let value_at = args.iter().position(|&t| t == "value");
    let name = args[name_at + 1..value_at.unwrap_or(args.len())]
        .join(" ")
        .to_lowercase();
    let value = value_at.map(|at| args[at + 1..].join(" ")).unwrap_or_default();

    match name.as_str() {
        "hash" => match value.parse::<usize>() {
            Ok(mb) if (1..=2048).contains(&mb) => state.engine.set_hash_mb(mb),
            _ => println!("info string Hash must be 1..2048, got '{value}'"),
        },
        "threads" => match value.parse::<usize>() {
            Ok(n) if (1..=128).contains(&n) => state.engine.set_threads(n),
            _ => println!("info string Threads must be 1..128, got '{value}'"),
        },
        "ponder" => {
            // Pondering is driven per-`go`; the option just has to parse
            if value.parse::<bool>().is_err() {
                println!("info string Ponder must be true or false, got '{value}'");
            }
        }
        "ownbook" => match value.parse::<bool>() {
            Ok(enabled) => state.own_book = enabled,
            Err(_) => println!("info string OwnBook must be true or false, got '{value}'"),
        },
        "bookfile" => {
            state.book_path = (!value.is_empty() && value != "<empty>").then_some(value);
        }
        _ => println!("info string unknown option '{name}'"),
    }
}

fn handle_perft(board: &mut Board, depth: usize) {
    let start = std::time::Instant::now();
    let mut total = 0u64;
    for (m, nodes) in board.perft_divide(depth) {
        println!("{m}: {nodes}");
        total += nodes;
    }
    let elapsed = start.elapsed().as_millis().max(1);
    println!(
        "nodes {total} time {elapsed}ms nps {}",
        total as u128 * 1000 / elapsed
    );
}

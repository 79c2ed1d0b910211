//! End-to-end search behavior.

use std::time::Duration;

use krait::board::Board;
use krait::search::{Engine, SearchLimits};

fn best_move(fen: &str, limits: SearchLimits) -> Option<String> {
    let engine = Engine::new();
    let board = Board::from_fen(fen);
    let report = engine.start_search(&board, &limits);
    report.best_move.map(|m| m.to_string())
}

#[test]
fn test_finds_back_rank_mate_in_one() {
    let best = best_move("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1", SearchLimits::depth(4));
    assert_eq!(best.as_deref(), Some("a1a8"));
}

#[test]
fn test_finds_queen_mate_in_one() {
    let best = best_move("6k1/5ppp/8/8/8/8/8/1Q4K1 w - - 0 1", SearchLimits::depth(4));
    assert_eq!(best.as_deref(), Some("b1b8"));
}

#[test]
fn test_takes_the_hanging_rook() {
    // The long diagonal is open and the rook on a8 is loose
    let best = best_move("r3k3/8/8/8/8/8/8/4K2Q w - - 0 1", SearchLimits::depth(4));
    assert_eq!(best.as_deref(), Some("h1a8"));
}

#[test]
fn test_mated_position_reports_none() {
    // Fool's mate delivered: black to move has no legal moves
    let best = best_move(
        "rnb1kbnr/pppp1ppp/8/4p3/6Pq/5P2/PPPPP2P/RNBQKBNR w KQkq - 1 3",
        SearchLimits::depth(3),
    );
    // White is mated here (Qh4#), so there is no move to report
    assert_eq!(best, None);
}

#[test]
fn test_stalemate_reports_none() {
    let best = best_move("7k/5Q2/6K1/8/8/8/8/8 b - - 0 1", SearchLimits::depth(3));
    assert_eq!(best, None);
}

#[test]
fn test_castles_to_safety_under_time() {
    // Open c-file with an enemy queen: tucking the king away wins the
    // safety race
    let best = best_move(
        "2q1k3/8/8/8/8/3PPPPP/3PPPPP/4K2R w K - 0 1",
        SearchLimits::movetime(500),
    );
    assert_eq!(best.as_deref(), Some("e1g1"));
}

#[test]
fn test_pinned_position_yields_only_legal_play() {
    // Heavily pinned middlegame: whatever the engine picks must be
    // verifiably legal (no self-exposure along the e-file)
    let fen = "r1q1r1k1/3b1p1p/3p4/2p3p1/1p1Pn3/1P1PPQ2/P2PK1PP/R2RBB2 w - - 0 1";
    let mut board = Board::from_fen(fen);
    let legal = board.generate_legal();
    for &m in legal.iter() {
        board.play(m);
        assert!(
            !board.is_in_check(board.side_to_move().opponent()),
            "generated move {m} exposes the king"
        );
        board.unplay(m);
    }

    let best = best_move(fen, SearchLimits::movetime(500)).expect("a move must be found");
    assert!(
        legal.iter().any(|m| m.to_string() == best),
        "search returned non-legal move {best}"
    );
}

#[test]
fn test_depth_limited_search_terminates_quickly() {
    let engine = Engine::new();
    let board = Board::new();
    let start = std::time::Instant::now();
    let report = engine.start_search(&board, &SearchLimits::depth(5));
    assert!(report.best_move.is_some());
    assert!(report.nodes > 0);
    assert!(start.elapsed() < Duration::from_secs(30));
}

#[test]
fn test_stop_flag_aborts_infinite_search() {
    let engine = Engine::new();
    let board = Board::new();

    let handle = {
        let engine = engine.clone();
        std::thread::spawn(move || {
            let limits = SearchLimits {
                infinite: true,
                ..Default::default()
            };
            engine.start_search(&board, &limits)
        })
    };

    std::thread::sleep(Duration::from_millis(300));
    engine.stop();
    let report = handle.join().expect("search thread panicked");
    assert!(report.best_move.is_some(), "cancelled search still reports a move");
}

#[test]
fn test_multithreaded_search_agrees_on_legality() {
    let mut engine = Engine::new();
    engine.set_threads(4);
    let board =
        Board::from_fen("r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4");
    let report = engine.start_search(&board, &SearchLimits::depth(6));

    let best = report.best_move.expect("move expected");
    assert!(board.generate_legal().contains(best));
}

#[test]
fn test_movetime_deadline_is_respected() {
    let engine = Engine::new();
    let board = Board::new();
    let start = std::time::Instant::now();
    let report = engine.start_search(&board, &SearchLimits::movetime(200));
    let elapsed = start.elapsed();
    assert!(report.best_move.is_some());
    // Generous slack: the deadline is polled every 32k nodes
    assert!(
        elapsed < Duration::from_millis(2000),
        "search overshot its budget: {elapsed:?}"
    );
}

#[test]
fn test_search_result_is_reproducible_single_thread() {
    // One thread, fixed depth, cleared tables: the same move each time
    let fen = "r1bqkb1r/pppp1ppp/2n2n2/4p3/2B1P3/5N2/PPPP1PPP/RNBQK2R w KQkq - 4 4";
    let run = || {
        let engine = Engine::new();
        let board = Board::from_fen(fen);
        engine
            .start_search(&board, &SearchLimits::depth(5))
            .best_move
            .map(|m| m.to_string())
    };
    assert_eq!(run(), run());
}

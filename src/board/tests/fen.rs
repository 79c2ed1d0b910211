//! FEN parsing and serialization tests.

use crate::board::{Board, Color, FenError, Piece, Square};

#[test]
fn test_startpos_fields() {
    let board = Board::new();
    assert_eq!(board.side_to_move(), Color::White);
    assert_eq!(board.halfmove_clock(), 0);
    assert_eq!(board.fullmove_number(), 1);
    assert_eq!(board.en_passant_target(), None);
    assert_eq!(
        board.piece_at(Square::new(0, 4)),
        Some((Color::White, Piece::King))
    );
    assert_eq!(board.occupied().popcount(), 32);
    assert!(board.castling().has(Color::White, true));
    assert!(board.castling().has(Color::Black, false));
}

#[test]
fn test_round_trip_preserves_all_six_fields() {
    let fens = [
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3",
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 b - - 12 42",
        "4k3/8/8/8/8/8/8/4K2R w K - 99 120",
    ];
    for fen in fens {
        let board = Board::from_fen(fen);
        assert_eq!(board.to_fen(), fen, "round trip broke for {fen}");
        // Parse the serialized form again: identical state
        let reparsed = Board::from_fen(&board.to_fen());
        assert_eq!(reparsed.hash(), board.hash());
        assert_eq!(reparsed.castling_rights, board.castling_rights);
        assert_eq!(reparsed.halfmove_clock(), board.halfmove_clock());
        assert_eq!(reparsed.fullmove_number(), board.fullmove_number());
    }
}

#[test]
fn test_invalid_fens_are_rejected() {
    assert!(matches!(
        Board::try_from_fen("8/8/8/8 w"),
        Err(FenError::TooFewParts { .. })
    ));
    assert!(matches!(
        Board::try_from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1"),
        Err(FenError::InvalidSideToMove { .. })
    ));
    assert!(matches!(
        Board::try_from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w XQkq - 0 1"),
        Err(FenError::InvalidCastling { .. })
    ));
    assert!(matches!(
        Board::try_from_fen("rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e9 0 1"),
        Err(FenError::InvalidEnPassant { .. })
    ));
    assert!(matches!(
        Board::try_from_fen("rnbqxbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1"),
        Err(FenError::InvalidPiece { .. })
    ));
    // No kings
    assert!(matches!(
        Board::try_from_fen("8/8/8/8/8/8/8/8 w - - 0 1"),
        Err(FenError::BadKingCount { .. })
    ));
}

#[test]
fn test_parse_move_accepts_legal_rejects_illegal() {
    let mut board = Board::new();
    let m = board.parse_move("e2e4").unwrap();
    assert_eq!(m.to_string(), "e2e4");
    assert!(m.is_double_push());

    assert!(board.parse_move("e2e5").is_err());
    assert!(board.parse_move("e9e4").is_err());
    assert!(board.parse_move("e2").is_err());
    assert!(board.parse_move("e7e8k").is_err());
}

#[test]
fn test_parse_move_promotion_letter() {
    let mut board = Board::from_fen("4k3/2P5/8/8/8/8/8/4K3 w - - 0 1");
    let m = board.parse_move("c7c8n").unwrap();
    assert_eq!(m.promotion(), Some(Piece::Knight));
    // Bare c7c8 is not a legal move: the promotion piece is mandatory
    assert!(board.parse_move("c7c8").is_err());
}

#[test]
fn test_illegal_move_leaves_board_untouched() {
    let mut board = Board::new();
    let fen = board.to_fen();
    let hash = board.hash();
    assert!(board.play_uci("e2e5").is_err());
    assert_eq!(board.to_fen(), fen);
    assert_eq!(board.hash(), hash);
}

#[test]
fn test_every_legal_move_round_trips_through_uci() {
    let positions = [
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "rnbqkbnr/ppp1p1pp/8/3pPp2/8/8/PPPP1PPP/RNBQKBNR w KQkq f6 0 3",
        "4k3/2P5/8/8/8/8/8/4K3 w - - 0 1",
    ];
    for fen in positions {
        let board = Board::from_fen(fen);
        for &m in board.generate_legal().iter() {
            let parsed = board.parse_move(&m.to_string()).unwrap();
            assert_eq!(parsed, m, "UCI round trip broke for {m} in {fen}");
        }
    }
}

#[test]
fn test_fullmove_counter_advances_after_black() {
    let mut board = Board::new();
    assert_eq!(board.fullmove_number(), 1);
    board.play_uci("e2e4").unwrap();
    assert_eq!(board.fullmove_number(), 1);
    board.play_uci("e7e5").unwrap();
    assert_eq!(board.fullmove_number(), 2);
}

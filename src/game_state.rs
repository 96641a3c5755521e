//! Game-state classification: ongoing, or which terminal condition applies.

use std::fmt;

use crate::board::{Board, Color, Piece};
use crate::movegen::MoveGenerator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameResult {
    Playing,
    WhiteIsMated,
    BlackIsMated,
    Stalemate,
    Repetition,
    FiftyMoveRule,
    InsufficientMaterial,
}

impl GameResult {
    pub fn is_terminal(self) -> bool {
        self != GameResult::Playing
    }

    pub fn is_draw(self) -> bool {
        matches!(
            self,
            GameResult::Stalemate
                | GameResult::Repetition
                | GameResult::FiftyMoveRule
                | GameResult::InsufficientMaterial
        )
    }

    pub fn winner(self) -> Option<Color> {
        match self {
            GameResult::WhiteIsMated => Some(Color::Black),
            GameResult::BlackIsMated => Some(Color::White),
            _ => None,
        }
    }

    /// Result marker used at the end of a move-list transcript.
    pub fn marker(self) -> &'static str {
        match self {
            GameResult::Playing => "*",
            GameResult::WhiteIsMated => "0-1",
            GameResult::BlackIsMated => "1-0",
            _ => "1/2-1/2",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            GameResult::Playing => "",
            GameResult::WhiteIsMated => "Checkmate! Black wins",
            GameResult::BlackIsMated => "Checkmate! White wins",
            GameResult::Stalemate => "Draw - Stalemate",
            GameResult::Repetition => "Draw - 3 fold repetition",
            GameResult::FiftyMoveRule => "Draw - 50 move rule",
            GameResult::InsufficientMaterial => "Draw - Insufficient material",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GameResult::Playing => write!(f, "Playing"),
            other => write!(f, "{}", other.description()),
        }
    }
}

/// Classify `board`. The first matching rule wins: no legal moves (mate or
/// stalemate), fifty-move rule, threefold repetition, insufficient material.
///
/// The board is never modified; `generator` is left holding this position's
/// check status.
pub fn classify(board: &Board, generator: &mut MoveGenerator) -> GameResult {
    let moves = generator.generate_moves(board);

    if moves.is_empty() {
        if generator.in_check() {
            return match board.side_to_move() {
                Color::White => GameResult::WhiteIsMated,
                Color::Black => GameResult::BlackIsMated,
            };
        }
        return GameResult::Stalemate;
    }

    if board.halfmove_clock() >= 100 {
        return GameResult::FiftyMoveRule;
    }

    let key = board.zobrist_key();
    let repetitions = board
        .repetition_history()
        .iter()
        .filter(|&&k| k == key)
        .count();
    if repetitions >= 3 {
        return GameResult::Repetition;
    }

    if is_insufficient_material(board) {
        return GameResult::InsufficientMaterial;
    }

    GameResult::Playing
}

/// Only lone-minor-piece endings are detected. Other dead positions (for
/// example bishops of opposite colours) keep playing.
fn is_insufficient_material(board: &Board) -> bool {
    let heavy = board.count(Piece::Pawn) + board.count(Piece::Rook) + board.count(Piece::Queen);
    heavy == 0 && (board.count(Piece::Knight) == 1 || board.count(Piece::Bishop) == 1)
}

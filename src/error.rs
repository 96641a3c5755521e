//! Error types for the chess core.

use thiserror::Error;

use crate::movegen::Move;

/// Errors surfaced by position loading, notation import and search.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChessError {
    /// Position text could not be parsed.
    #[error("Malformed position: {reason}")]
    MalformedPosition { reason: String },

    /// A move-list token did not match exactly one legal move.
    #[error("Notation error at ply {ply} ('{token}'): {reason}")]
    Notation {
        ply: usize,
        token: String,
        reason: String,
    },

    /// Search was asked to move in a position with no legal moves.
    #[error("No legal move available in this position")]
    NoLegalMove,

    /// A submitted move is not legal in the current position.
    #[error("Illegal move: {mv}")]
    IllegalMove { mv: Move },
}

impl ChessError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        ChessError::MalformedPosition {
            reason: reason.into(),
        }
    }

    pub(crate) fn notation(ply: usize, token: &str, reason: impl Into<String>) -> Self {
        ChessError::Notation {
            ply,
            token: token.to_string(),
            reason: reason.into(),
        }
    }
}

pub type ChessResult<T> = Result<T, ChessError>;

//! Zobrist keys for position identity.
//!
//! Keys come from a fixed-seed generator so hashes are identical across runs
//! and across independent games in the same process. The table is built once
//! and never written afterwards.

use std::sync::OnceLock;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::board::{file_of, Board, Color, Piece, Square};

const SEED: u64 = 2_361_912;

struct ZobristKeys {
    piece_square: [[[u64; 64]; 6]; 2],
    side_to_move: u64,
    castling: [u64; 16],
    en_passant_file: [u64; 8],
}

static KEYS: OnceLock<ZobristKeys> = OnceLock::new();

fn keys() -> &'static ZobristKeys {
    KEYS.get_or_init(build_keys)
}

fn build_keys() -> ZobristKeys {
    let mut rng = StdRng::seed_from_u64(SEED);

    let mut piece_square = [[[0u64; 64]; 6]; 2];
    for color in piece_square.iter_mut() {
        for piece in color.iter_mut() {
            for key in piece.iter_mut() {
                *key = rng.gen();
            }
        }
    }

    let side_to_move = rng.gen();

    let mut castling = [0u64; 16];
    for key in castling.iter_mut() {
        *key = rng.gen();
    }

    let mut en_passant_file = [0u64; 8];
    for key in en_passant_file.iter_mut() {
        *key = rng.gen();
    }

    ZobristKeys {
        piece_square,
        side_to_move,
        castling,
        en_passant_file,
    }
}

pub fn piece_square_key(color: Color, piece: Piece, square: Square) -> u64 {
    keys().piece_square[color.index()][piece.index()][square as usize]
}

/// Toggled in whenever black is to move.
pub fn side_to_move_key() -> u64 {
    keys().side_to_move
}

/// One key per combination of the four castling rights.
pub fn castling_key(castling_rights: u8) -> u64 {
    keys().castling[(castling_rights & 0x0F) as usize]
}

pub fn en_passant_key(file: u8) -> u64 {
    keys().en_passant_file[file as usize]
}

/// Full key computed from scratch. `Board::make_move` maintains the same value incrementally.
pub fn hash_position(board: &Board) -> u64 {
    let mut key = 0u64;

    for color in [Color::White, Color::Black] {
        for piece in Piece::ALL {
            for &square in board.pieces(color, piece).squares() {
                key ^= piece_square_key(color, piece, square);
            }
        }
    }

    if board.side_to_move() == Color::Black {
        key ^= side_to_move_key();
    }

    key ^= castling_key(board.castling_rights());

    if let Some(ep) = board.en_passant_square() {
        key ^= en_passant_key(file_of(ep));
    }

    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_distinct() {
        let a = piece_square_key(Color::White, Piece::Pawn, 12);
        let b = piece_square_key(Color::Black, Piece::Pawn, 12);
        let c = piece_square_key(Color::White, Piece::Pawn, 13);
        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_ne!(castling_key(0), castling_key(15));
        assert_ne!(en_passant_key(0), en_passant_key(7));
    }

    #[test]
    fn side_to_move_changes_hash() {
        let white = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - - 0 1").unwrap();
        let black = Board::from_fen("4k3/8/8/8/8/8/8/4K3 b - - 0 1").unwrap();
        assert_eq!(
            hash_position(&white) ^ side_to_move_key(),
            hash_position(&black)
        );
    }
}

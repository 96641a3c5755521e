//! Position notation (FEN) import and export.

use crate::board::{
    parse_square, rank_of, square_at, square_name, Board, Color, Piece, BLACK_KINGSIDE,
    BLACK_QUEENSIDE, WHITE_KINGSIDE, WHITE_QUEENSIDE,
};
use crate::error::{ChessError, ChessResult};

const CASTLING_LETTERS: [(char, u8); 4] = [
    ('K', WHITE_KINGSIDE),
    ('Q', WHITE_QUEENSIDE),
    ('k', BLACK_KINGSIDE),
    ('q', BLACK_QUEENSIDE),
];

impl Board {
    /// Parse a position description. The halfmove and fullmove fields may be omitted.
    pub fn from_fen(fen: &str) -> ChessResult<Board> {
        let fields: Vec<&str> = fen.split_whitespace().collect();
        if fields.len() != 6 && fields.len() != 4 {
            return Err(ChessError::malformed(format!(
                "expected 6 fields, found {}",
                fields.len()
            )));
        }

        let mut board = Board::empty();
        parse_placement(&mut board, fields[0])?;

        let side_to_move = match fields[1] {
            "w" => Color::White,
            "b" => Color::Black,
            other => {
                return Err(ChessError::malformed(format!(
                    "invalid side to move '{}'",
                    other
                )))
            }
        };

        let castling_rights = parse_castling(fields[2])?;
        let en_passant_square = parse_en_passant(fields[3], side_to_move)?;

        let halfmove_clock = match fields.get(4) {
            Some(text) => text.parse::<u16>().map_err(|_| {
                ChessError::malformed(format!("invalid halfmove clock '{}'", text))
            })?,
            None => 0,
        };
        let fullmove_number = match fields.get(5) {
            Some(text) => match text.parse::<u16>() {
                Ok(n) if n >= 1 => n,
                _ => {
                    return Err(ChessError::malformed(format!(
                        "invalid fullmove number '{}'",
                        text
                    )))
                }
            },
            None => 1,
        };

        board.set_state(
            side_to_move,
            castling_rights,
            en_passant_square,
            halfmove_clock,
            fullmove_number,
        );
        board.reset_history();
        Ok(board)
    }

    pub fn to_fen(&self) -> String {
        let mut fen = String::with_capacity(90);

        for rank in (0..8).rev() {
            let mut empty = 0;
            for file in 0..8 {
                match self.piece_at(square_at(file, rank)) {
                    Some((piece, color)) => {
                        if empty > 0 {
                            fen.push((b'0' + empty) as char);
                            empty = 0;
                        }
                        fen.push(piece.to_char(color));
                    }
                    None => empty += 1,
                }
            }
            if empty > 0 {
                fen.push((b'0' + empty) as char);
            }
            if rank > 0 {
                fen.push('/');
            }
        }

        fen.push(' ');
        fen.push(if self.white_to_move() { 'w' } else { 'b' });

        fen.push(' ');
        if self.castling_rights() == 0 {
            fen.push('-');
        } else {
            for (letter, bit) in CASTLING_LETTERS {
                if self.castling_rights() & bit != 0 {
                    fen.push(letter);
                }
            }
        }

        fen.push(' ');
        match self.en_passant_square() {
            Some(square) => fen.push_str(&square_name(square)),
            None => fen.push('-'),
        }

        fen.push_str(&format!(
            " {} {}",
            self.halfmove_clock(),
            self.fullmove_number()
        ));
        fen
    }

    /// Reinitialise every field from `fen`. On error the board is left untouched.
    pub fn load_position(&mut self, fen: &str) -> ChessResult<()> {
        *self = Board::from_fen(fen)?;
        Ok(())
    }

    pub fn load_start_position(&mut self) {
        *self = Board::new();
    }
}

fn parse_placement(board: &mut Board, placement: &str) -> ChessResult<()> {
    let ranks: Vec<&str> = placement.split('/').collect();
    if ranks.len() != 8 {
        return Err(ChessError::malformed(format!(
            "expected 8 ranks, found {}",
            ranks.len()
        )));
    }

    let mut counts = [0usize; 2];
    for (i, rank_text) in ranks.iter().enumerate() {
        let rank = 7 - i as u8;
        let mut file = 0u8;
        let mut previous_was_digit = false;
        for c in rank_text.chars() {
            if let Some(skip) = c.to_digit(10) {
                if !(1..=8).contains(&skip) {
                    return Err(ChessError::malformed(format!("invalid empty count '{}'", c)));
                }
                if previous_was_digit {
                    return Err(ChessError::malformed(format!(
                        "adjacent empty counts in rank {}",
                        rank + 1
                    )));
                }
                previous_was_digit = true;
                file += skip as u8;
            } else {
                previous_was_digit = false;
                let (piece, color) = Piece::from_char(c).ok_or_else(|| {
                    ChessError::malformed(format!("illegal piece letter '{}'", c))
                })?;
                if file >= 8 {
                    return Err(ChessError::malformed(format!(
                        "rank {} has more than 8 squares",
                        rank + 1
                    )));
                }
                if piece == Piece::Pawn && (rank == 0 || rank == 7) {
                    return Err(ChessError::malformed(format!(
                        "pawn on back rank {}",
                        rank + 1
                    )));
                }
                counts[color.index()] += 1;
                if counts[color.index()] > 16 {
                    return Err(ChessError::malformed("more than 16 pieces for one side"));
                }
                board.place_piece(square_at(file, rank), piece, color);
                file += 1;
            }
            if file > 8 {
                return Err(ChessError::malformed(format!(
                    "rank {} has more than 8 squares",
                    rank + 1
                )));
            }
        }
        if file != 8 {
            return Err(ChessError::malformed(format!(
                "rank {} has {} squares",
                rank + 1,
                file
            )));
        }
    }

    for color in [Color::White, Color::Black] {
        if board.pieces(color, Piece::King).len() != 1 {
            return Err(ChessError::malformed(format!(
                "{:?} must have exactly one king",
                color
            )));
        }
    }
    Ok(())
}

fn parse_castling(text: &str) -> ChessResult<u8> {
    if text == "-" {
        return Ok(0);
    }
    let mut rights = 0u8;
    let mut next = 0;
    for c in text.chars() {
        // Letters must appear at most once and in KQkq order
        let position = CASTLING_LETTERS[next..]
            .iter()
            .position(|&(letter, _)| letter == c)
            .ok_or_else(|| ChessError::malformed(format!("invalid castling field '{}'", text)))?;
        rights |= CASTLING_LETTERS[next + position].1;
        next += position + 1;
    }
    if rights == 0 {
        return Err(ChessError::malformed("empty castling field"));
    }
    Ok(rights)
}

fn parse_en_passant(text: &str, side_to_move: Color) -> ChessResult<Option<u8>> {
    if text == "-" {
        return Ok(None);
    }
    let square = parse_square(text)
        .ok_or_else(|| ChessError::malformed(format!("invalid en passant square '{}'", text)))?;
    let expected_rank = match side_to_move {
        Color::White => 5,
        Color::Black => 2,
    };
    if rank_of(square) != expected_rank {
        return Err(ChessError::malformed(format!(
            "en passant square {} is inconsistent with side to move",
            text
        )));
    }
    Ok(Some(square))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::START_FEN;

    #[test]
    fn start_fen_round_trip() {
        let board = Board::from_fen(START_FEN).unwrap();
        assert_eq!(board.to_fen(), START_FEN);
        assert_eq!(Board::new().to_fen(), START_FEN);
        assert_eq!(board.zobrist_key(), Board::new().zobrist_key());
    }

    #[test]
    fn round_trip_preserves_every_field() {
        let fens = [
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
            "rnbqkbnr/pp1ppppp/8/2p5/4P3/8/PPPP1PPP/RNBQKBNR w KQkq c6 0 2",
            "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
            "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1",
            "4k3/8/8/8/8/8/8/4K3 b - - 99 120",
            "1rbq1r1k/2pp2pp/p1n3p1/2b1p3/R3P3/1BP2N2/1P3PPP/1NBQ1RK1 w - - 0 1",
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b Kq e3 0 1",
        ];
        for fen in fens {
            let board = Board::from_fen(fen).unwrap();
            assert_eq!(board.to_fen(), fen);
            assert!(board.is_consistent());
        }
    }

    #[test]
    fn four_field_form_defaults_counters() {
        let board = Board::from_fen("4k3/8/8/8/8/8/8/4K3 w - -").unwrap();
        assert_eq!(board.halfmove_clock(), 0);
        assert_eq!(board.fullmove_number(), 1);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        let bad = [
            "",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNRR w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBN w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNX w KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR x KQkq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQxq - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w QK - 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq e3 0 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - x 1",
            "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 0",
            "rnbq1bnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "Pnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "rnbqkbnr/pppppppp/9/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "rnbqkbnr/pppppppp/44/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
            "4k3/8/8/8/8/8/8/R12K3 w - - 0 1",
        ];
        for fen in bad {
            assert!(
                matches!(Board::from_fen(fen), Err(ChessError::MalformedPosition { .. })),
                "accepted {}",
                fen
            );
        }
    }

    #[test]
    fn failed_load_leaves_board_untouched() {
        let mut board = Board::new();
        board.make_move(crate::movegen::Move::new(6, 21));
        let before = board.to_fen();
        assert!(board.load_position("not a position").is_err());
        assert_eq!(board.to_fen(), before);

        board.load_start_position();
        assert_eq!(board.to_fen(), START_FEN);
        assert_eq!(board.ply_depth(), 0);
    }
}

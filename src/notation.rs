//! Move-list codec: short algebraic notation in and out, long algebraic for UCI.

use crate::board::{file_of, parse_square, rank_of, square_name, Board, Piece, Square};
use crate::error::{ChessError, ChessResult};
use crate::game_state::{classify, GameResult};
use crate::movegen::{Move, MoveFlag, MoveGenerator};

const RESULT_MARKERS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// Short algebraic form of a legal move, with `+` or `#` appended.
pub fn move_to_san(board: &Board, mv: Move) -> String {
    let mut generator = MoveGenerator::new();
    let legal_moves = generator.generate_moves(board);
    let mut san = san_without_suffix(board, mv, &legal_moves);

    let mut after = board.clone();
    after.make_move(mv);
    match classify(&after, &mut generator) {
        GameResult::WhiteIsMated | GameResult::BlackIsMated => san.push('#'),
        _ if generator.in_check() => san.push('+'),
        _ => {}
    }
    san
}

fn san_without_suffix(board: &Board, mv: Move, legal_moves: &[Move]) -> String {
    match mv.flag {
        MoveFlag::CastleKingside => return "O-O".to_string(),
        MoveFlag::CastleQueenside => return "O-O-O".to_string(),
        _ => {}
    }
    let Some((piece, _)) = board.piece_at(mv.from) else {
        return mv.to_string();
    };

    let mut san = String::new();
    if piece == Piece::Pawn {
        if board.is_capture(mv) {
            san.push(file_char(mv.from));
            san.push('x');
        }
        san.push_str(&square_name(mv.to));
        if let Some(promotion) = mv.promotion() {
            san.push('=');
            san.push(promotion.letter());
        }
        return san;
    }

    san.push(piece.letter());
    let rivals: Vec<Square> = legal_moves
        .iter()
        .filter(|other| {
            other.to == mv.to
                && other.from != mv.from
                && board.piece_at(other.from).map(|(p, _)| p) == Some(piece)
        })
        .map(|other| other.from)
        .collect();
    if !rivals.is_empty() {
        let file_clash = rivals.iter().any(|&sq| file_of(sq) == file_of(mv.from));
        let rank_clash = rivals.iter().any(|&sq| rank_of(sq) == rank_of(mv.from));
        if !file_clash {
            san.push(file_char(mv.from));
        } else if !rank_clash {
            san.push(rank_char(mv.from));
        } else {
            san.push_str(&square_name(mv.from));
        }
    }
    if board.is_capture(mv) {
        san.push('x');
    }
    san.push_str(&square_name(mv.to));
    san
}

fn file_char(square: Square) -> char {
    (b'a' + file_of(square)) as char
}

fn rank_char(square: Square) -> char {
    (b'1' + rank_of(square)) as char
}

/// What a short algebraic token pins down about a move.
#[derive(Debug, Default)]
struct SanPattern {
    piece: Option<Piece>,
    castle: Option<MoveFlag>,
    from_file: Option<u8>,
    from_rank: Option<u8>,
    to: Option<Square>,
    promotion: Option<Piece>,
}

impl SanPattern {
    fn parse(token: &str) -> Option<SanPattern> {
        match token {
            "O-O" | "0-0" => {
                return Some(SanPattern {
                    castle: Some(MoveFlag::CastleKingside),
                    ..SanPattern::default()
                })
            }
            "O-O-O" | "0-0-0" => {
                return Some(SanPattern {
                    castle: Some(MoveFlag::CastleQueenside),
                    ..SanPattern::default()
                })
            }
            _ => {}
        }

        let mut body = token;
        let mut promotion = None;
        if let Some((head, tail)) = body.split_once('=') {
            let mut letters = tail.chars();
            promotion = Some(Piece::from_letter(letters.next()?)?);
            if letters.next().is_some() {
                return None;
            }
            body = head;
        } else if let Some(last) = body.chars().last().filter(|c| c.is_ascii_uppercase()) {
            // Tolerate `e8Q`
            promotion = Some(Piece::from_letter(last)?);
            body = &body[..body.len() - 1];
        }

        let mut chars = body.chars();
        let piece = match body.chars().next()? {
            c if c.is_ascii_uppercase() => {
                chars.next();
                Piece::from_letter(c)?
            }
            _ => Piece::Pawn,
        };
        let rest: String = chars.filter(|&c| c != 'x' && c != ':').collect();
        if rest.len() < 2 || !rest.is_ascii() {
            return None;
        }
        let (prefix, destination) = rest.split_at(rest.len() - 2);
        let to = parse_square(destination)?;

        let mut pattern = SanPattern {
            piece: Some(piece),
            to: Some(to),
            promotion,
            ..SanPattern::default()
        };
        for c in prefix.chars() {
            match c {
                'a'..='h' => pattern.from_file = Some(c as u8 - b'a'),
                '1'..='8' => pattern.from_rank = Some(c as u8 - b'1'),
                _ => return None,
            }
        }
        Some(pattern)
    }

    fn matches(&self, board: &Board, mv: Move) -> bool {
        if let Some(castle) = self.castle {
            return mv.flag == castle;
        }
        if mv.flag.is_castle() {
            return false;
        }
        let moving = board.piece_at(mv.from).map(|(piece, _)| piece);
        moving == self.piece
            && Some(mv.to) == self.to
            && self.from_file.map_or(true, |file| file == file_of(mv.from))
            && self.from_rank.map_or(true, |rank| rank == rank_of(mv.from))
            && mv.promotion() == self.promotion
    }
}

/// Resolve one short algebraic token (suffixes allowed) against the legal moves of `board`.
pub fn move_from_san(board: &Board, token: &str) -> Result<Move, String> {
    let cleaned = token.trim_end_matches(&['+', '#', '!', '?'][..]);
    let mut generator = MoveGenerator::new();
    let legal_moves = generator.generate_moves(board);

    if let Some(mv) = find_long_algebraic(&legal_moves, cleaned) {
        return Ok(mv);
    }

    let pattern = SanPattern::parse(cleaned).ok_or_else(|| "unreadable move".to_string())?;
    let candidates: Vec<Move> = legal_moves
        .into_iter()
        .filter(|&mv| pattern.matches(board, mv))
        .collect();
    match candidates.as_slice() {
        [mv] => Ok(*mv),
        [] => Err("no legal move matches".to_string()),
        _ => Err(format!("ambiguous between {} legal moves", candidates.len())),
    }
}

/// Parse a `e2e4` / `e7e8q` style move and check it is legal in `board`.
pub fn move_from_long_algebraic(board: &Board, text: &str) -> Option<Move> {
    let legal_moves = MoveGenerator::new().generate_moves(board);
    find_long_algebraic(&legal_moves, text)
}

fn find_long_algebraic(legal_moves: &[Move], text: &str) -> Option<Move> {
    if !(4..=5).contains(&text.len()) || !text.is_ascii() {
        return None;
    }
    let from = parse_square(&text[0..2])?;
    let to = parse_square(&text[2..4])?;
    let promotion = match text[4..].chars().next() {
        Some(c) => Some(Piece::from_letter(c.to_ascii_uppercase())?),
        None => None,
    };
    legal_moves
        .iter()
        .copied()
        .find(|mv| mv.from == from && mv.to == to && mv.promotion() == promotion)
}

/// Strip tag pairs, `{}` and `;` comments, and `()` variations from a transcript.
fn movetext(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    // Comments and variations may span lines
    let mut brace = false;
    let mut paren_depth = 0usize;
    for line in text.lines() {
        let trimmed = line.trim_start();
        let in_comment = brace || paren_depth > 0;
        if !in_comment && (trimmed.starts_with('[') || trimmed.starts_with('%')) {
            continue;
        }
        for c in line.chars() {
            match c {
                '{' if !brace => {
                    brace = true;
                    out.push(' ');
                }
                '}' if brace => {
                    brace = false;
                    out.push(' ');
                }
                _ if brace => {}
                ';' if paren_depth == 0 => break,
                '(' => {
                    paren_depth += 1;
                    out.push(' ');
                }
                ')' if paren_depth > 0 => {
                    paren_depth -= 1;
                    out.push(' ');
                }
                _ if paren_depth > 0 => {}
                _ => out.push(c),
            }
        }
        out.push(' ');
    }
    out
}

/// Drop a leading move number (`12.`, `12...`, `12.e4`). `None` if nothing remains.
fn strip_move_number(token: &str) -> Option<&str> {
    let digits = token.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 || !token[digits..].starts_with('.') {
        return Some(token);
    }
    let rest = token[digits..].trim_start_matches('.');
    (!rest.is_empty()).then_some(rest)
}

/// Replay a transcript from `start`. Each token must match exactly one legal move.
pub fn parse_move_list_from(start: &Board, text: &str) -> ChessResult<Vec<Move>> {
    let mut board = start.clone();
    let mut moves = Vec::new();

    for raw in movetext(text).split_whitespace() {
        if RESULT_MARKERS.contains(&raw) {
            break;
        }
        if raw.starts_with('$') {
            continue;
        }
        let Some(token) = strip_move_number(raw) else {
            continue;
        };
        let ply = moves.len() + 1;
        let mv = move_from_san(&board, token)
            .map_err(|reason| ChessError::notation(ply, token, reason))?;
        board.make_move(mv);
        moves.push(mv);
    }
    Ok(moves)
}

pub fn parse_move_list(text: &str) -> ChessResult<Vec<Move>> {
    parse_move_list_from(&Board::new(), text)
}

/// Numbered short algebraic transcript of `moves` played from `start`.
pub fn render_from(start: &Board, moves: &[Move]) -> ChessResult<String> {
    let mut board = start.clone();
    let mut generator = MoveGenerator::new();
    let mut parts = Vec::with_capacity(moves.len() + moves.len() / 2 + 1);

    for (index, &mv) in moves.iter().enumerate() {
        if !generator.generate_moves(&board).contains(&mv) {
            return Err(ChessError::notation(
                index + 1,
                &mv.to_string(),
                "not legal in this position",
            ));
        }
        if board.white_to_move() {
            parts.push(format!("{}.", board.fullmove_number()));
        } else if index == 0 {
            parts.push(format!("{}...", board.fullmove_number()));
        }
        parts.push(move_to_san(&board, mv));
        board.make_move(mv);
    }
    Ok(parts.join(" "))
}

pub fn render(moves: &[Move]) -> ChessResult<String> {
    render_from(&Board::new(), moves)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHOLARS_MATE: &str = "1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7#";

    fn san(fen: &str, from: Square, to: Square) -> String {
        let board = Board::from_fen(fen).unwrap();
        let mv = MoveGenerator::new()
            .generate_moves(&board)
            .into_iter()
            .find(|mv| mv.from == from && mv.to == to)
            .unwrap();
        move_to_san(&board, mv)
    }

    #[test]
    fn simple_moves() {
        let board = Board::new();
        assert_eq!(move_to_san(&board, Move::with_flag(12, 28, MoveFlag::DoublePawnPush)), "e4");
        assert_eq!(move_to_san(&board, Move::new(6, 21)), "Nf3");
    }

    #[test]
    fn disambiguation_by_file_rank_and_square() {
        let knights = "4k3/8/8/8/8/8/8/1N2KN2 w - - 0 1";
        assert_eq!(san(knights, 1, 11), "Nbd2");
        assert_eq!(san(knights, 5, 11), "Nfd2");

        let rooks = "4k3/8/8/R7/8/8/8/R3K3 w - - 0 1";
        assert_eq!(san(rooks, 32, 16), "R5a3");
        assert_eq!(san(rooks, 0, 16), "R1a3");

        let queens = "4k3/8/8/8/8/Q1Q5/8/Q3K3 w - - 0 1";
        assert_eq!(san(queens, 0, 9), "Q1b2");
        assert_eq!(san(queens, 16, 9), "Qa3b2");
    }

    #[test]
    fn castling_promotion_and_suffixes() {
        assert_eq!(san("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", 4, 6), "O-O");
        assert_eq!(san("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1", 4, 2), "O-O-O");
        assert_eq!(san("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1", 0, 56), "Ra8#");
        assert_eq!(san("4k3/8/8/8/8/8/8/R3K3 w - - 0 1", 0, 56), "Ra8+");
        assert_eq!(san("rnbqkbnr/ppp1pppp/8/3p4/4P3/8/PPPP1PPP/RNBQKBNR w KQkq d6 0 2", 28, 35), "exd5");

        let board = Board::from_fen("8/4P2k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let knight = Move::with_flag(52, 60, MoveFlag::PromoteKnight);
        assert_eq!(move_to_san(&board, knight), "e8=N");
        assert_eq!(move_from_san(&board, "e8=N"), Ok(knight));
    }

    #[test]
    fn scholars_mate_round_trip() {
        let moves = parse_move_list(SCHOLARS_MATE).unwrap();
        assert_eq!(moves.len(), 7);
        assert_eq!(render(&moves).unwrap(), SCHOLARS_MATE);
    }

    #[test]
    fn import_tolerates_transcript_noise() {
        let text = r#"[Event "Casual"]
[Result "1-0"]

1.e4 {king pawn} e5 2. Qh5 $1 Nc6 (2... g6) 3. Bc4 Nf6?? 4. Qxf7# 1-0"#;
        let moves = parse_move_list(text).unwrap();
        assert_eq!(render(&moves).unwrap(), SCHOLARS_MATE);

        let black_numbering = parse_move_list("1. e4 1... e5 2. Nf3").unwrap();
        assert_eq!(black_numbering.len(), 3);
    }

    #[test]
    fn comments_and_variations_may_span_lines() {
        let expected = parse_move_list("1. e4 e5 2. Nf3").unwrap();
        let wrapped_comment = "1. e4 {a comment that\nspans two lines} e5 2. Nf3";
        assert_eq!(parse_move_list(wrapped_comment).unwrap(), expected);

        let wrapped_variation = "1. e4 e5 (1... c5\n2. Nf3) 2. Nf3";
        assert_eq!(parse_move_list(wrapped_variation).unwrap(), expected);

        let nested = "1. e4 e5 (1... c5 2. Nf3 (2. c3\nd5) d6\n) 2. Nf3 *";
        assert_eq!(parse_move_list(nested).unwrap(), expected);
    }

    #[test]
    fn notation_errors_report_ply_and_token() {
        let err = parse_move_list("1. e4 e5 2. Ke3").unwrap_err();
        assert_eq!(
            err,
            ChessError::Notation {
                ply: 3,
                token: "Ke3".to_string(),
                reason: "no legal move matches".to_string(),
            }
        );

        let knights = Board::from_fen("4k3/8/8/8/8/8/8/1N2KN2 w - - 0 1").unwrap();
        match parse_move_list_from(&knights, "1. Nd2") {
            Err(ChessError::Notation { ply, token, .. }) => {
                assert_eq!(ply, 1);
                assert_eq!(token, "Nd2");
            }
            other => panic!("expected notation error, got {:?}", other),
        }

        assert!(parse_move_list("1. e4 zz").is_err());
    }

    #[test]
    fn render_starting_with_black() {
        let board = Board::from_fen(
            "rnbqkbnr/pppppppp/8/8/4P3/8/PPPP1PPP/RNBQKBNR b KQkq e3 0 1",
        )
        .unwrap();
        let moves = parse_move_list_from(&board, "1... e5 2. Nf3").unwrap();
        assert_eq!(render_from(&board, &moves).unwrap(), "1... e5 2. Nf3");
    }

    #[test]
    fn render_rejects_illegal_moves() {
        let err = render(&[Move::new(12, 36)]).unwrap_err();
        assert!(matches!(err, ChessError::Notation { ply: 1, .. }));
    }

    #[test]
    fn long_algebraic() {
        let board = Board::new();
        let mv = move_from_long_algebraic(&board, "e2e4").unwrap();
        assert_eq!(mv.flag, MoveFlag::DoublePawnPush);
        assert_eq!(mv.to_string(), "e2e4");
        assert!(move_from_long_algebraic(&board, "e2e5").is_none());
        assert!(move_from_long_algebraic(&board, "e9e4").is_none());

        let promotion = Board::from_fen("8/4P2k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let mv = move_from_long_algebraic(&promotion, "e7e8q").unwrap();
        assert_eq!(mv.promotion(), Some(Piece::Queen));
        assert!(move_from_long_algebraic(&promotion, "e7e8").is_none());
    }
}

use std::fmt;
use std::sync::OnceLock;

use crate::board::{
    castle_rook_squares, file_of, rank_of, square_name, Board, Color, Piece, Square, Squares,
    BLACK_KINGSIDE, BLACK_QUEENSIDE, WHITE_KINGSIDE, WHITE_QUEENSIDE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MoveFlag {
    Normal,
    DoublePawnPush,
    EnPassant,
    CastleKingside,
    CastleQueenside,
    PromoteKnight,
    PromoteBishop,
    PromoteRook,
    PromoteQueen,
}

impl MoveFlag {
    pub fn promotion_piece(self) -> Option<Piece> {
        match self {
            MoveFlag::PromoteKnight => Some(Piece::Knight),
            MoveFlag::PromoteBishop => Some(Piece::Bishop),
            MoveFlag::PromoteRook => Some(Piece::Rook),
            MoveFlag::PromoteQueen => Some(Piece::Queen),
            _ => None,
        }
    }

    pub fn promote_to(piece: Piece) -> Option<MoveFlag> {
        match piece {
            Piece::Knight => Some(MoveFlag::PromoteKnight),
            Piece::Bishop => Some(MoveFlag::PromoteBishop),
            Piece::Rook => Some(MoveFlag::PromoteRook),
            Piece::Queen => Some(MoveFlag::PromoteQueen),
            _ => None,
        }
    }

    pub fn is_castle(self) -> bool {
        matches!(self, MoveFlag::CastleKingside | MoveFlag::CastleQueenside)
    }
}

/// A single ply. `Move::NULL` (no origin) stands for "no move yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Move {
    pub from: Square,
    pub to: Square,
    pub flag: MoveFlag,
}

impl Move {
    pub const NULL: Move = Move {
        from: 0,
        to: 0,
        flag: MoveFlag::Normal,
    };

    pub fn new(from: Square, to: Square) -> Self {
        Self {
            from,
            to,
            flag: MoveFlag::Normal,
        }
    }

    pub fn with_flag(from: Square, to: Square, flag: MoveFlag) -> Self {
        Self { from, to, flag }
    }

    pub fn is_null(&self) -> bool {
        self.from == self.to
    }

    pub fn promotion(&self) -> Option<Piece> {
        self.flag.promotion_piece()
    }
}

impl Default for Move {
    fn default() -> Self {
        Move::NULL
    }
}

/// Long algebraic form (`e2e4`, `e7e8q`), `0000` for the null move.
impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_null() {
            return write!(f, "0000");
        }
        write!(f, "{}{}", square_name(self.from), square_name(self.to))?;
        if let Some(promotion) = self.promotion() {
            write!(f, "{}", promotion.letter().to_ascii_lowercase())?;
        }
        Ok(())
    }
}

// N, S, W, E, NW, SE, NE, SW
const DIRECTION_OFFSETS: [i8; 8] = [8, -8, -1, 1, 7, -7, 9, -9];
const ORTHOGONAL: std::ops::Range<usize> = 0..4;
const DIAGONAL: std::ops::Range<usize> = 4..8;

const PROMOTION_FLAGS: [MoveFlag; 4] = [
    MoveFlag::PromoteQueen,
    MoveFlag::PromoteRook,
    MoveFlag::PromoteBishop,
    MoveFlag::PromoteKnight,
];

struct Tables {
    squares_to_edge: [[u8; 8]; 64],
    knight_attacks: [u64; 64],
    king_attacks: [u64; 64],
}

static TABLES: OnceLock<Tables> = OnceLock::new();

fn tables() -> &'static Tables {
    TABLES.get_or_init(build_tables)
}

fn build_tables() -> Tables {
    let mut squares_to_edge = [[0u8; 8]; 64];
    let mut knight_attacks = [0u64; 64];
    let mut king_attacks = [0u64; 64];

    for square in 0..64u8 {
        let rank = rank_of(square) as i8;
        let file = file_of(square) as i8;

        let north = 7 - rank as u8;
        let south = rank as u8;
        let west = file as u8;
        let east = 7 - file as u8;
        squares_to_edge[square as usize] = [
            north,
            south,
            west,
            east,
            north.min(west),
            south.min(east),
            north.min(east),
            south.min(west),
        ];

        for (dr, df) in [
            (-2, -1),
            (-2, 1),
            (-1, -2),
            (-1, 2),
            (1, -2),
            (1, 2),
            (2, -1),
            (2, 1),
        ] {
            if let Some(target) = offset_square(rank, file, dr, df) {
                knight_attacks[square as usize] |= 1u64 << target;
            }
        }

        for (dr, df) in [
            (-1, -1),
            (-1, 0),
            (-1, 1),
            (0, -1),
            (0, 1),
            (1, -1),
            (1, 0),
            (1, 1),
        ] {
            if let Some(target) = offset_square(rank, file, dr, df) {
                king_attacks[square as usize] |= 1u64 << target;
            }
        }
    }

    Tables {
        squares_to_edge,
        knight_attacks,
        king_attacks,
    }
}

fn offset_square(rank: i8, file: i8, dr: i8, df: i8) -> Option<Square> {
    let r = rank + dr;
    let f = file + df;
    if (0..8).contains(&r) && (0..8).contains(&f) {
        Some((r * 8 + f) as Square)
    } else {
        None
    }
}

/// Iterate the set squares of a mask in ascending order.
fn squares_of(mut mask: u64) -> impl Iterator<Item = Square> {
    std::iter::from_fn(move || {
        if mask == 0 {
            return None;
        }
        let square = mask.trailing_zeros() as Square;
        mask &= mask - 1;
        Some(square)
    })
}

fn step(square: Square, direction: usize, distance: u8) -> Square {
    (square as i8 + DIRECTION_OFFSETS[direction] * distance as i8) as Square
}

/// Whether `square` is attacked by any piece of `attacker` on the given placement.
pub fn is_square_attacked(squares: &Squares, square: Square, attacker: Color) -> bool {
    let tables = tables();
    let rank = rank_of(square);
    let file = file_of(square);

    // Pawns attack diagonally forward, so look one rank behind the target
    let pawn_sources: [Option<Square>; 2] = match attacker {
        Color::White if rank > 0 => [
            (file > 0).then(|| square - 9),
            (file < 7).then(|| square - 7),
        ],
        Color::Black if rank < 7 => [
            (file > 0).then(|| square + 7),
            (file < 7).then(|| square + 9),
        ],
        _ => [None, None],
    };
    for source in pawn_sources.into_iter().flatten() {
        if squares[source as usize] == Some((Piece::Pawn, attacker)) {
            return true;
        }
    }

    if squares_of(tables.knight_attacks[square as usize])
        .any(|s| squares[s as usize] == Some((Piece::Knight, attacker)))
    {
        return true;
    }

    if squares_of(tables.king_attacks[square as usize])
        .any(|s| squares[s as usize] == Some((Piece::King, attacker)))
    {
        return true;
    }

    for direction in 0..8 {
        for distance in 1..=tables.squares_to_edge[square as usize][direction] {
            let target = step(square, direction, distance);
            if let Some((piece, color)) = squares[target as usize] {
                let slides_here = piece == Piece::Queen
                    || (piece == Piece::Rook && ORTHOGONAL.contains(&direction))
                    || (piece == Piece::Bishop && DIAGONAL.contains(&direction));
                if color == attacker && slides_here {
                    return true;
                }
                break;
            }
        }
    }

    false
}

pub fn is_in_check(board: &Board, color: Color) -> bool {
    match board.king_square(color) {
        Some(king) => is_square_attacked(board.squares(), king, color.opposite()),
        None => false,
    }
}

/// Legal move generation. Holds the check status and opponent attack map of the
/// most recent `generate_moves` call.
#[derive(Debug, Clone, Default)]
pub struct MoveGenerator {
    in_check: bool,
    opponent_attack_map: u64,
}

impl MoveGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the side to move was in check in the last generated position.
    pub fn in_check(&self) -> bool {
        self.in_check
    }

    /// Squares attacked by the side not to move in the last generated position.
    pub fn opponent_attack_map(&self) -> u64 {
        self.opponent_attack_map
    }

    /// All legal moves for the side to move, in a deterministic order
    /// (ascending origin square, then generation order per piece).
    pub fn generate_moves(&mut self, board: &Board) -> Vec<Move> {
        let us = board.side_to_move();
        let them = us.opposite();

        self.opponent_attack_map = attack_map(board, them);
        self.in_check = match board.king_square(us) {
            Some(king) => self.opponent_attack_map & (1u64 << king) != 0,
            None => false,
        };

        let mut pseudo_legal = Vec::with_capacity(64);
        for from in 0..64u8 {
            match board.piece_at(from) {
                Some((piece, color)) if color == us => match piece {
                    Piece::Pawn => self.pawn_moves(board, from, &mut pseudo_legal),
                    Piece::Knight => {
                        self.jump_moves(board, from, &tables().knight_attacks, &mut pseudo_legal)
                    }
                    Piece::Bishop => self.slide_moves(board, from, DIAGONAL, &mut pseudo_legal),
                    Piece::Rook => self.slide_moves(board, from, ORTHOGONAL, &mut pseudo_legal),
                    Piece::Queen => self.slide_moves(board, from, 0..8, &mut pseudo_legal),
                    Piece::King => {
                        self.jump_moves(board, from, &tables().king_attacks, &mut pseudo_legal);
                        self.castling_moves(board, from, &mut pseudo_legal);
                    }
                },
                _ => {}
            }
        }

        pseudo_legal
            .into_iter()
            .filter(|&mv| leaves_king_safe(board, mv))
            .collect()
    }

    fn pawn_moves(&self, board: &Board, from: Square, moves: &mut Vec<Move>) {
        let us = board.side_to_move();
        let (forward, start_rank, last_rank): (i8, u8, u8) = match us {
            Color::White => (8, 1, 7),
            Color::Black => (-8, 6, 0),
        };
        let rank = rank_of(from);
        let file = file_of(from);

        let one = (from as i8 + forward) as Square;
        if board.piece_at(one).is_none() {
            push_pawn_move(from, one, last_rank, moves);
            if rank == start_rank {
                let two = (one as i8 + forward) as Square;
                if board.piece_at(two).is_none() {
                    moves.push(Move::with_flag(from, two, MoveFlag::DoublePawnPush));
                }
            }
        }

        for df in [-1i8, 1] {
            let target_file = file as i8 + df;
            if !(0..8).contains(&target_file) {
                continue;
            }
            let to = (one as i8 + df) as Square;
            match board.piece_at(to) {
                Some((_, color)) if color != us => push_pawn_move(from, to, last_rank, moves),
                None if board.en_passant_square() == Some(to) => {
                    moves.push(Move::with_flag(from, to, MoveFlag::EnPassant))
                }
                _ => {}
            }
        }
    }

    fn jump_moves(&self, board: &Board, from: Square, targets: &[u64; 64], moves: &mut Vec<Move>) {
        let us = board.side_to_move();
        for to in squares_of(targets[from as usize]) {
            match board.piece_at(to) {
                Some((_, color)) if color == us => {}
                _ => moves.push(Move::new(from, to)),
            }
        }
    }

    fn slide_moves(
        &self,
        board: &Board,
        from: Square,
        directions: std::ops::Range<usize>,
        moves: &mut Vec<Move>,
    ) {
        let us = board.side_to_move();
        let tables = tables();
        for direction in directions {
            for distance in 1..=tables.squares_to_edge[from as usize][direction] {
                let to = step(from, direction, distance);
                match board.piece_at(to) {
                    None => moves.push(Move::new(from, to)),
                    Some((_, color)) => {
                        if color != us {
                            moves.push(Move::new(from, to));
                        }
                        break;
                    }
                }
            }
        }
    }

    fn castling_moves(&self, board: &Board, from: Square, moves: &mut Vec<Move>) {
        if self.in_check {
            return;
        }
        let us = board.side_to_move();
        let (home, kingside, queenside) = match us {
            Color::White => (4, WHITE_KINGSIDE, WHITE_QUEENSIDE),
            Color::Black => (60, BLACK_KINGSIDE, BLACK_QUEENSIDE),
        };
        if from != home {
            return;
        }
        let rights = board.castling_rights();
        let empty = |s: Square| board.piece_at(s).is_none();
        let safe = |s: Square| self.opponent_attack_map & (1u64 << s) == 0;
        let rook_home = |flag: MoveFlag| {
            castle_rook_squares(flag, us)
                .map(|(rook_from, _)| board.piece_at(rook_from) == Some((Piece::Rook, us)))
                .unwrap_or(false)
        };

        if rights & kingside != 0
            && empty(home + 1)
            && empty(home + 2)
            && safe(home + 1)
            && safe(home + 2)
            && rook_home(MoveFlag::CastleKingside)
        {
            moves.push(Move::with_flag(home, home + 2, MoveFlag::CastleKingside));
        }

        if rights & queenside != 0
            && empty(home - 1)
            && empty(home - 2)
            && empty(home - 3)
            && safe(home - 1)
            && safe(home - 2)
            && rook_home(MoveFlag::CastleQueenside)
        {
            moves.push(Move::with_flag(home, home - 2, MoveFlag::CastleQueenside));
        }
    }
}

fn push_pawn_move(from: Square, to: Square, last_rank: u8, moves: &mut Vec<Move>) {
    if rank_of(to) == last_rank {
        for flag in PROMOTION_FLAGS {
            moves.push(Move::with_flag(from, to, flag));
        }
    } else {
        moves.push(Move::new(from, to));
    }
}

/// Every square attacked by `color`, sliders stopping on the first occupied square.
fn attack_map(board: &Board, color: Color) -> u64 {
    let tables = tables();
    let mut map = 0u64;

    for &square in board.pieces(color, Piece::Pawn).squares() {
        let file = file_of(square);
        let ahead = match color {
            Color::White if rank_of(square) < 7 => Some(square + 8),
            Color::Black if rank_of(square) > 0 => Some(square - 8),
            _ => None,
        };
        if let Some(ahead) = ahead {
            if file > 0 {
                map |= 1u64 << (ahead - 1);
            }
            if file < 7 {
                map |= 1u64 << (ahead + 1);
            }
        }
    }
    for &square in board.pieces(color, Piece::Knight).squares() {
        map |= tables.knight_attacks[square as usize];
    }
    for &square in board.pieces(color, Piece::King).squares() {
        map |= tables.king_attacks[square as usize];
    }

    let sliders = [
        (Piece::Bishop, DIAGONAL),
        (Piece::Rook, ORTHOGONAL),
        (Piece::Queen, 0..8),
    ];
    for (piece, directions) in sliders {
        for &square in board.pieces(color, piece).squares() {
            for direction in directions.clone() {
                for distance in 1..=tables.squares_to_edge[square as usize][direction] {
                    let target = step(square, direction, distance);
                    map |= 1u64 << target;
                    if board.piece_at(target).is_some() {
                        break;
                    }
                }
            }
        }
    }

    map
}

/// Play `mv` on a copy of the placement and test the mover's king.
fn leaves_king_safe(board: &Board, mv: Move) -> bool {
    let us = board.side_to_move();
    let mut squares = *board.squares();

    if mv.flag == MoveFlag::EnPassant {
        let captured = match us {
            Color::White => mv.to - 8,
            Color::Black => mv.to + 8,
        };
        squares[captured as usize] = None;
    }
    squares[mv.to as usize] = squares[mv.from as usize].take();
    if let Some((rook_from, rook_to)) = castle_rook_squares(mv.flag, us) {
        squares[rook_to as usize] = squares[rook_from as usize].take();
    }

    let king = match squares[mv.to as usize] {
        Some((Piece::King, _)) => Some(mv.to),
        _ => board.king_square(us),
    };
    match king {
        Some(king) => !is_square_attacked(&squares, king, us.opposite()),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn moves_for(fen: &str) -> (Vec<Move>, MoveGenerator) {
        let board = Board::from_fen(fen).unwrap();
        let mut generator = MoveGenerator::new();
        let moves = generator.generate_moves(&board);
        (moves, generator)
    }

    #[test]
    fn start_position_has_twenty_moves() {
        let (moves, generator) = moves_for(crate::board::START_FEN);
        assert_eq!(moves.len(), 20);
        assert!(!generator.in_check());
    }

    #[test]
    fn generation_order_is_deterministic() {
        let fen = "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1";
        let (first, _) = moves_for(fen);
        let (second, _) = moves_for(fen);
        assert_eq!(first, second);
        assert_eq!(first.len(), 48);
    }

    #[test]
    fn promotions_are_emitted_per_piece() {
        let (moves, _) = moves_for("8/P7/8/8/8/8/8/k1K5 w - - 0 1");
        let promotions: Vec<_> = moves.iter().filter(|mv| mv.promotion().is_some()).collect();
        assert_eq!(promotions.len(), 4);
        assert!(promotions.iter().all(|mv| mv.from == 48 && mv.to == 56));
    }

    #[test]
    fn castling_both_sides() {
        let (moves, _) = moves_for("r3k2r/8/8/8/8/8/8/R3K2R w KQkq - 0 1");
        assert!(moves.contains(&Move::with_flag(4, 6, MoveFlag::CastleKingside)));
        assert!(moves.contains(&Move::with_flag(4, 2, MoveFlag::CastleQueenside)));
    }

    #[test]
    fn no_castling_through_attacked_square() {
        // Black rook on f8 covers f1
        let (moves, _) = moves_for("4kr2/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        assert!(!moves.iter().any(|mv| mv.flag == MoveFlag::CastleKingside));
        assert!(moves.iter().any(|mv| mv.flag == MoveFlag::CastleQueenside));
    }

    #[test]
    fn no_castling_out_of_check_or_when_blocked() {
        let (moves, generator) = moves_for("4r1k1/8/8/8/8/8/8/R3K2R w KQ - 0 1");
        assert!(generator.in_check());
        assert!(!moves.iter().any(|mv| mv.flag.is_castle()));

        let (moves, _) = moves_for("4k3/8/8/8/8/8/8/RN2K1NR w KQ - 0 1");
        assert!(!moves.iter().any(|mv| mv.flag.is_castle()));
    }

    #[test]
    fn en_passant_uses_target_field() {
        let (moves, _) = moves_for("4k3/8/8/3pP3/8/8/8/4K3 w - d6 0 2");
        assert!(moves.contains(&Move::with_flag(36, 43, MoveFlag::EnPassant)));

        // Same placement without the field: no capture
        let (moves, _) = moves_for("4k3/8/8/3pP3/8/8/8/4K3 w - - 0 2");
        assert!(!moves.iter().any(|mv| mv.flag == MoveFlag::EnPassant));
    }

    #[test]
    fn en_passant_discovering_rank_check_is_illegal() {
        let (moves, _) = moves_for("8/8/8/K2pP2r/8/8/8/7k w - d6 0 2");
        assert!(!moves.iter().any(|mv| mv.flag == MoveFlag::EnPassant));
    }

    #[test]
    fn pinned_piece_stays_on_pin_line() {
        // Knight on e2 pinned by the rook on e8
        let (moves, _) = moves_for("4r1k1/8/8/8/8/8/4N3/4K3 w - - 0 1");
        assert!(!moves.iter().any(|mv| mv.from == 12));
    }

    #[test]
    fn no_move_leaves_king_attacked() {
        let fen = "r3k2r/Pppp1ppp/1b3nbN/nP6/BBP1P3/q4N2/Pp1P2PP/R2Q1RK1 w kq - 0 1";
        let mut board = Board::from_fen(fen).unwrap();
        let mut generator = MoveGenerator::new();
        let moves = generator.generate_moves(&board);
        assert_eq!(moves.len(), 6);
        for mv in moves {
            board.make_move(mv);
            assert!(!is_in_check(&board, Color::White), "{} leaves king attacked", mv);
            board.unmake_move();
        }
    }

    #[test]
    fn attack_map_matches_square_queries() {
        let board = Board::from_fen("r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1").unwrap();
        let mut generator = MoveGenerator::new();
        generator.generate_moves(&board);
        for square in 0..64u8 {
            let in_map = generator.opponent_attack_map() & (1u64 << square) != 0;
            assert_eq!(
                in_map,
                is_square_attacked(board.squares(), square, Color::Black),
                "square {}",
                square_name(square)
            );
        }
    }

    #[test]
    fn move_display() {
        assert_eq!(Move::new(12, 28).to_string(), "e2e4");
        assert_eq!(Move::with_flag(52, 60, MoveFlag::PromoteKnight).to_string(), "e7e8n");
        assert_eq!(Move::NULL.to_string(), "0000");
        assert!(Move::default().is_null());
    }
}

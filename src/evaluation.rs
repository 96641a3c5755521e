use crate::board::{file_of, rank_of, Board, Color, Piece, Square};

/// Tunable evaluation weights, in centipawns.
#[derive(Debug, Clone, PartialEq)]
pub struct EvalWeights {
    pub pawn_value: i32,
    pub knight_value: i32,
    pub bishop_value: i32,
    pub rook_value: i32,
    pub queen_value: i32,

    // Pawn structure
    pub doubled_pawn_penalty: i32,
    pub isolated_pawn_penalty: i32,
    pub passed_pawn_bonus: i32,

    // King safety (middlegame only)
    pub pawn_shield_bonus: i32,
    pub open_file_penalty: i32,
    pub semi_open_file_penalty: i32,
}

impl Default for EvalWeights {
    fn default() -> Self {
        Self {
            pawn_value: 100,
            knight_value: 320,
            bishop_value: 330,
            rook_value: 500,
            queen_value: 900,

            doubled_pawn_penalty: -10,
            isolated_pawn_penalty: -15,
            passed_pawn_bonus: 20,

            pawn_shield_bonus: 10,
            open_file_penalty: -25,
            semi_open_file_penalty: -10,
        }
    }
}

impl EvalWeights {
    pub fn piece_value(&self, piece: Piece) -> i32 {
        match piece {
            Piece::Pawn => self.pawn_value,
            Piece::Knight => self.knight_value,
            Piece::Bishop => self.bishop_value,
            Piece::Rook => self.rook_value,
            Piece::Queen => self.queen_value,
            Piece::King => 0,
        }
    }
}

// Piece-square tables, written from white's side with rank 8 on the first row.
#[rustfmt::skip]
const PAWN_TABLE: [[i32; 8]; 8] = [
    [  0,   0,   0,   0,   0,   0,   0,   0],
    [ 50,  50,  50,  50,  50,  50,  50,  50],
    [ 10,  10,  20,  30,  30,  20,  10,  10],
    [  5,   5,  10,  25,  25,  10,   5,   5],
    [  0,   0,   0,  20,  20,   0,   0,   0],
    [  5,  -5, -10,   0,   0, -10,  -5,   5],
    [  5,  10,  10, -20, -20,  10,  10,   5],
    [  0,   0,   0,   0,   0,   0,   0,   0],
];

#[rustfmt::skip]
const KNIGHT_TABLE: [[i32; 8]; 8] = [
    [-50, -40, -30, -30, -30, -30, -40, -50],
    [-40, -20,   0,   0,   0,   0, -20, -40],
    [-30,   0,  10,  15,  15,  10,   0, -30],
    [-30,   5,  15,  20,  20,  15,   5, -30],
    [-30,   0,  15,  20,  20,  15,   0, -30],
    [-30,   5,  10,  15,  15,  10,   5, -30],
    [-40, -20,   0,   5,   5,   0, -20, -40],
    [-50, -40, -30, -30, -30, -30, -40, -50],
];

#[rustfmt::skip]
const BISHOP_TABLE: [[i32; 8]; 8] = [
    [-20, -10, -10, -10, -10, -10, -10, -20],
    [-10,   0,   0,   0,   0,   0,   0, -10],
    [-10,   0,   5,  10,  10,   5,   0, -10],
    [-10,   5,   5,  10,  10,   5,   5, -10],
    [-10,   0,  10,  10,  10,  10,   0, -10],
    [-10,  10,  10,  10,  10,  10,  10, -10],
    [-10,   5,   0,   0,   0,   0,   5, -10],
    [-20, -10, -10, -10, -10, -10, -10, -20],
];

#[rustfmt::skip]
const ROOK_TABLE: [[i32; 8]; 8] = [
    [  0,   0,   0,   0,   0,   0,   0,   0],
    [  5,  10,  10,  10,  10,  10,  10,   5],
    [ -5,   0,   0,   0,   0,   0,   0,  -5],
    [ -5,   0,   0,   0,   0,   0,   0,  -5],
    [ -5,   0,   0,   0,   0,   0,   0,  -5],
    [ -5,   0,   0,   0,   0,   0,   0,  -5],
    [ -5,   0,   0,   0,   0,   0,   0,  -5],
    [  0,   0,   0,   5,   5,   0,   0,   0],
];

#[rustfmt::skip]
const QUEEN_TABLE: [[i32; 8]; 8] = [
    [-20, -10, -10,  -5,  -5, -10, -10, -20],
    [-10,   0,   0,   0,   0,   0,   0, -10],
    [-10,   0,   5,   5,   5,   5,   0, -10],
    [ -5,   0,   5,   5,   5,   5,   0,  -5],
    [  0,   0,   5,   5,   5,   5,   0,  -5],
    [-10,   5,   5,   5,   5,   5,   0, -10],
    [-10,   0,   5,   0,   0,   0,   0, -10],
    [-20, -10, -10,  -5,  -5, -10, -10, -20],
];

#[rustfmt::skip]
const KING_TABLE: [[i32; 8]; 8] = [
    [-30, -40, -40, -50, -50, -40, -40, -30],
    [-30, -40, -40, -50, -50, -40, -40, -30],
    [-30, -40, -40, -50, -50, -40, -40, -30],
    [-30, -40, -40, -50, -50, -40, -40, -30],
    [-20, -30, -30, -40, -40, -30, -30, -20],
    [-10, -20, -20, -20, -20, -20, -20, -10],
    [ 20,  20,   0,   0,   0,   0,  20,  20],
    [ 20,  30,  10,   0,   0,  10,  30,  20],
];

#[rustfmt::skip]
const KING_ENDGAME_TABLE: [[i32; 8]; 8] = [
    [-50, -40, -30, -20, -20, -30, -40, -50],
    [-30, -20, -10,   0,   0, -10, -20, -30],
    [-30, -10,  20,  30,  30,  20, -10, -30],
    [-30, -10,  30,  40,  40,  30, -10, -30],
    [-30, -10,  30,  40,  40,  30, -10, -30],
    [-30, -10,  20,  30,  30,  20, -10, -30],
    [-30, -30,   0,   0,   0,   0, -30, -30],
    [-50, -30, -30, -30, -30, -30, -30, -50],
];

/// Non-pawn material (both sides) at or below which the king table switches to the endgame one.
const ENDGAME_MATERIAL: i32 = 1300;

/// Static evaluation of a position.
#[derive(Debug, Clone, Default)]
pub struct Evaluator {
    pub weights: EvalWeights,
}

impl Evaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_weights(weights: EvalWeights) -> Self {
        Self { weights }
    }

    /// Score in centipawns from the perspective of the side to move.
    pub fn evaluate(&self, board: &Board) -> i32 {
        let is_endgame = self.is_endgame(board);

        let white = self.evaluate_side(board, Color::White, is_endgame);
        let black = self.evaluate_side(board, Color::Black, is_endgame);
        let score = white - black;

        match board.side_to_move() {
            Color::White => score,
            Color::Black => -score,
        }
    }

    fn evaluate_side(&self, board: &Board, color: Color, is_endgame: bool) -> i32 {
        let mut score = 0;

        for piece in Piece::ALL {
            for &square in board.pieces(color, piece).squares() {
                score += self.weights.piece_value(piece);
                score += position_bonus(piece, square, color, is_endgame);
            }
        }

        score += self.evaluate_pawn_structure(board, color);
        if !is_endgame {
            score += self.evaluate_king_safety(board, color);
        }

        score
    }

    fn is_endgame(&self, board: &Board) -> bool {
        let material: i32 = [Piece::Knight, Piece::Bishop, Piece::Rook, Piece::Queen]
            .iter()
            .map(|&piece| board.count(piece) as i32 * self.weights.piece_value(piece))
            .sum();
        material <= ENDGAME_MATERIAL
    }

    fn evaluate_pawn_structure(&self, board: &Board, color: Color) -> i32 {
        let own = pawn_files(board, color);
        let enemy_pawns = board.pieces(color.opposite(), Piece::Pawn).squares();
        let mut score = 0;

        for file in 0..8 {
            if own[file] > 1 {
                score += self.weights.doubled_pawn_penalty * (own[file] - 1);
            }
            if own[file] > 0 {
                let has_neighbor = (file > 0 && own[file - 1] > 0) || (file < 7 && own[file + 1] > 0);
                if !has_neighbor {
                    score += self.weights.isolated_pawn_penalty * own[file];
                }
            }
        }

        for &square in board.pieces(color, Piece::Pawn).squares() {
            let file = file_of(square) as i32;
            let rank = rank_of(square);
            let blocked = enemy_pawns.iter().any(|&enemy| {
                let enemy_rank = rank_of(enemy);
                let ahead = match color {
                    Color::White => enemy_rank > rank,
                    Color::Black => enemy_rank < rank,
                };
                ahead && (file_of(enemy) as i32 - file).abs() <= 1
            });
            if !blocked {
                score += self.weights.passed_pawn_bonus;
            }
        }

        score
    }

    fn evaluate_king_safety(&self, board: &Board, color: Color) -> i32 {
        let king = match board.king_square(color) {
            Some(square) => square,
            None => return 0,
        };
        let file = file_of(king) as i8;
        let rank = rank_of(king) as i8;
        let mut score = 0;

        let shield_rank = match color {
            Color::White => rank + 1,
            Color::Black => rank - 1,
        };
        if (0..8).contains(&shield_rank) {
            for shield_file in (file - 1)..=(file + 1) {
                if !(0..8).contains(&shield_file) {
                    continue;
                }
                let square = (shield_rank * 8 + shield_file) as Square;
                if board.piece_at(square) == Some((Piece::Pawn, color)) {
                    score += self.weights.pawn_shield_bonus;
                }
            }
        }

        let own = pawn_files(board, color)[file as usize] > 0;
        let enemy = pawn_files(board, color.opposite())[file as usize] > 0;
        if !own && !enemy {
            score += self.weights.open_file_penalty;
        } else if !own {
            score += self.weights.semi_open_file_penalty;
        }

        score
    }
}

fn position_bonus(piece: Piece, square: Square, color: Color, is_endgame: bool) -> i32 {
    let file = file_of(square) as usize;
    let row = match color {
        Color::White => 7 - rank_of(square) as usize,
        Color::Black => rank_of(square) as usize,
    };
    let table = match piece {
        Piece::Pawn => &PAWN_TABLE,
        Piece::Knight => &KNIGHT_TABLE,
        Piece::Bishop => &BISHOP_TABLE,
        Piece::Rook => &ROOK_TABLE,
        Piece::Queen => &QUEEN_TABLE,
        Piece::King if is_endgame => &KING_ENDGAME_TABLE,
        Piece::King => &KING_TABLE,
    };
    table[row][file]
}

fn pawn_files(board: &Board, color: Color) -> [i32; 8] {
    let mut files = [0; 8];
    for &square in board.pieces(color, Piece::Pawn).squares() {
        files[file_of(square) as usize] += 1;
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_position_is_balanced() {
        let evaluator = Evaluator::new();
        assert_eq!(evaluator.evaluate(&Board::new()), 0);
    }

    #[test]
    fn score_is_from_side_to_move() {
        let evaluator = Evaluator::new();
        let white = Board::from_fen("4k3/8/8/8/8/8/8/3QK3 w - - 0 1").unwrap();
        let black = Board::from_fen("4k3/8/8/8/8/8/8/3QK3 b - - 0 1").unwrap();
        assert!(evaluator.evaluate(&white) > 800);
        assert_eq!(evaluator.evaluate(&white), -evaluator.evaluate(&black));
    }

    #[test]
    fn mirrored_positions_score_equally() {
        let evaluator = Evaluator::new();
        let a = Board::from_fen("r1bqkbnr/pppp1ppp/2n5/4p3/4P3/5N2/PPPP1PPP/RNBQKB1R w KQkq - 2 3").unwrap();
        let b = Board::from_fen("rnbqkb1r/pppp1ppp/5n2/4p3/4P3/2N5/PPPP1PPP/R1BQKBNR b KQkq - 2 3").unwrap();
        assert_eq!(evaluator.evaluate(&a), evaluator.evaluate(&b));
    }

    #[test]
    fn custom_weights_are_used() {
        let weights = EvalWeights {
            pawn_value: 150,
            ..EvalWeights::default()
        };
        let board = Board::from_fen("4k3/8/8/8/8/8/3PP3/4K3 w - - 0 1").unwrap();
        let heavy = Evaluator::with_weights(weights).evaluate(&board);
        let normal = Evaluator::new().evaluate(&board);
        assert_eq!(heavy - normal, 100);
    }

    #[test]
    fn passed_pawn_is_rewarded() {
        let evaluator = Evaluator::new();
        let passed = Board::from_fen("4k3/8/8/8/3P4/8/8/4K3 w - - 0 1").unwrap();
        let blocked = Board::from_fen("4k3/4p3/8/8/3P4/8/8/4K3 w - - 0 1").unwrap();
        // The blocked position also gives black a pawn, so compare white's structure term directly
        assert_eq!(evaluator.evaluate_pawn_structure(&passed, Color::White), -15 + 20);
        assert_eq!(evaluator.evaluate_pawn_structure(&blocked, Color::White), -15);
    }
}

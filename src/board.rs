use std::fmt;

use tracing::warn;

use crate::movegen::{Move, MoveFlag};
use crate::zobrist;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Piece {
    Pawn,
    Knight,
    Bishop,
    Rook,
    Queen,
    King,
}

impl Piece {
    pub const ALL: [Piece; 6] = [
        Piece::Pawn,
        Piece::Knight,
        Piece::Bishop,
        Piece::Rook,
        Piece::Queen,
        Piece::King,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// Upper-case letter used by position and move notation.
    pub fn letter(self) -> char {
        match self {
            Piece::Pawn => 'P',
            Piece::Knight => 'N',
            Piece::Bishop => 'B',
            Piece::Rook => 'R',
            Piece::Queen => 'Q',
            Piece::King => 'K',
        }
    }

    pub fn from_letter(letter: char) -> Option<Piece> {
        match letter.to_ascii_uppercase() {
            'P' => Some(Piece::Pawn),
            'N' => Some(Piece::Knight),
            'B' => Some(Piece::Bishop),
            'R' => Some(Piece::Rook),
            'Q' => Some(Piece::Queen),
            'K' => Some(Piece::King),
            _ => None,
        }
    }

    /// Letter as written in position notation: upper case for white, lower case for black.
    pub fn to_char(self, color: Color) -> char {
        match color {
            Color::White => self.letter(),
            Color::Black => self.letter().to_ascii_lowercase(),
        }
    }

    pub fn from_char(c: char) -> Option<(Piece, Color)> {
        let piece = Piece::from_letter(c)?;
        let color = if c.is_ascii_uppercase() {
            Color::White
        } else {
            Color::Black
        };
        Some((piece, color))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Color {
    White,
    Black,
}

impl Color {
    pub fn opposite(&self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

/// Square index, a1 = 0, h1 = 7, a8 = 56, h8 = 63.
pub type Square = u8;

/// Square-indexed piece placement.
pub type Squares = [Option<(Piece, Color)>; 64];

pub const WHITE_KINGSIDE: u8 = 0b0001;
pub const WHITE_QUEENSIDE: u8 = 0b0010;
pub const BLACK_KINGSIDE: u8 = 0b0100;
pub const BLACK_QUEENSIDE: u8 = 0b1000;
pub const ALL_CASTLING: u8 = 0b1111;

pub const START_FEN: &str = "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1";

pub fn file_of(square: Square) -> u8 {
    square % 8
}

pub fn rank_of(square: Square) -> u8 {
    square / 8
}

pub fn square_at(file: u8, rank: u8) -> Square {
    rank * 8 + file
}

pub fn square_name(square: Square) -> String {
    let mut name = String::with_capacity(2);
    name.push((b'a' + file_of(square)) as char);
    name.push((b'1' + rank_of(square)) as char);
    name
}

pub fn parse_square(name: &str) -> Option<Square> {
    let bytes = name.as_bytes();
    if bytes.len() != 2 {
        return None;
    }
    let file = bytes[0].wrapping_sub(b'a');
    let rank = bytes[1].wrapping_sub(b'1');
    if file < 8 && rank < 8 {
        Some(square_at(file, rank))
    } else {
        None
    }
}

/// Castling rights that survive a move touching `square` (as origin or destination).
fn castling_mask(square: Square) -> u8 {
    match square {
        0 => ALL_CASTLING & !WHITE_QUEENSIDE,
        4 => ALL_CASTLING & !(WHITE_KINGSIDE | WHITE_QUEENSIDE),
        7 => ALL_CASTLING & !WHITE_KINGSIDE,
        56 => ALL_CASTLING & !BLACK_QUEENSIDE,
        60 => ALL_CASTLING & !(BLACK_KINGSIDE | BLACK_QUEENSIDE),
        63 => ALL_CASTLING & !BLACK_KINGSIDE,
        _ => ALL_CASTLING,
    }
}

/// Rook origin and destination for a castling move of `color`.
pub fn castle_rook_squares(flag: MoveFlag, color: Color) -> Option<(Square, Square)> {
    let back_rank = match color {
        Color::White => 0,
        Color::Black => 56,
    };
    match flag {
        MoveFlag::CastleKingside => Some((back_rank + 7, back_rank + 5)),
        MoveFlag::CastleQueenside => Some((back_rank, back_rank + 3)),
        _ => None,
    }
}

/// Squares occupied by one kind of piece of one color, with O(1) add, remove and relocate.
#[derive(Debug, Clone)]
pub struct PieceList {
    occupied: [Square; 16],
    map: [u8; 64],
    count: usize,
}

impl PieceList {
    pub fn new() -> Self {
        Self {
            occupied: [0; 16],
            map: [0; 64],
            count: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn squares(&self) -> &[Square] {
        &self.occupied[..self.count]
    }

    fn add(&mut self, square: Square) {
        self.occupied[self.count] = square;
        self.map[square as usize] = self.count as u8;
        self.count += 1;
    }

    fn remove(&mut self, square: Square) {
        let index = self.map[square as usize] as usize;
        let last = self.occupied[self.count - 1];
        self.occupied[index] = last;
        self.map[last as usize] = index as u8;
        self.count -= 1;
    }

    fn relocate(&mut self, from: Square, to: Square) {
        let index = self.map[from as usize] as usize;
        self.occupied[index] = to;
        self.map[to as usize] = index as u8;
    }
}

impl Default for PieceList {
    fn default() -> Self {
        Self::new()
    }
}

/// State needed to take a move back exactly.
#[derive(Debug, Clone, Copy)]
struct UndoState {
    mv: Move,
    captured: Option<Piece>,
    castling_rights: u8,
    en_passant_square: Option<Square>,
    halfmove_clock: u16,
    fullmove_number: u16,
    zobrist_key: u64,
    repetition_start: usize,
}

/// The authoritative game position.
#[derive(Debug, Clone)]
pub struct Board {
    squares: Squares,
    piece_lists: [[PieceList; 6]; 2],
    side_to_move: Color,
    castling_rights: u8, // 4 bits: KQkq
    en_passant_square: Option<Square>,
    halfmove_clock: u16,
    fullmove_number: u16,
    zobrist_key: u64,
    // Every key since the position was loaded; the repetition window starts at `repetition_start`.
    position_history: Vec<u64>,
    repetition_start: usize,
    undo_stack: Vec<UndoState>,
}

impl Board {
    /// The standard start position.
    pub fn new() -> Self {
        let mut board = Board::empty();
        let back_rank = [
            Piece::Rook,
            Piece::Knight,
            Piece::Bishop,
            Piece::Queen,
            Piece::King,
            Piece::Bishop,
            Piece::Knight,
            Piece::Rook,
        ];
        for (file, &piece) in back_rank.iter().enumerate() {
            let file = file as u8;
            board.place_piece(square_at(file, 0), piece, Color::White);
            board.place_piece(square_at(file, 1), Piece::Pawn, Color::White);
            board.place_piece(square_at(file, 6), Piece::Pawn, Color::Black);
            board.place_piece(square_at(file, 7), piece, Color::Black);
        }
        board.castling_rights = ALL_CASTLING;
        board.reset_history();
        board
    }

    /// A board with no pieces, white to move. Only useful as a starting point for loaders.
    pub(crate) fn empty() -> Self {
        Self {
            squares: [None; 64],
            piece_lists: Default::default(),
            side_to_move: Color::White,
            castling_rights: 0,
            en_passant_square: None,
            halfmove_clock: 0,
            fullmove_number: 1,
            zobrist_key: 0,
            position_history: Vec::with_capacity(128),
            repetition_start: 0,
            undo_stack: Vec::with_capacity(128),
        }
    }

    pub fn piece_at(&self, square: Square) -> Option<(Piece, Color)> {
        self.squares[square as usize]
    }

    pub fn squares(&self) -> &Squares {
        &self.squares
    }

    pub fn pieces(&self, color: Color, piece: Piece) -> &PieceList {
        &self.piece_lists[color.index()][piece.index()]
    }

    pub fn count(&self, piece: Piece) -> usize {
        self.pieces(Color::White, piece).len() + self.pieces(Color::Black, piece).len()
    }

    pub fn king_square(&self, color: Color) -> Option<Square> {
        self.pieces(color, Piece::King).squares().first().copied()
    }

    pub fn side_to_move(&self) -> Color {
        self.side_to_move
    }

    pub fn white_to_move(&self) -> bool {
        self.side_to_move == Color::White
    }

    pub fn castling_rights(&self) -> u8 {
        self.castling_rights
    }

    pub fn en_passant_square(&self) -> Option<Square> {
        self.en_passant_square
    }

    pub fn halfmove_clock(&self) -> u16 {
        self.halfmove_clock
    }

    pub fn fullmove_number(&self) -> u16 {
        self.fullmove_number
    }

    pub fn zobrist_key(&self) -> u64 {
        self.zobrist_key
    }

    /// Keys of every position since the last capture or pawn move, current position last.
    pub fn repetition_history(&self) -> &[u64] {
        &self.position_history[self.repetition_start..]
    }

    /// Number of moves that can currently be taken back.
    pub fn ply_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn last_move(&self) -> Option<Move> {
        self.undo_stack.last().map(|undo| undo.mv)
    }

    pub fn is_capture(&self, mv: Move) -> bool {
        mv.flag == MoveFlag::EnPassant || self.squares[mv.to as usize].is_some()
    }

    pub(crate) fn place_piece(&mut self, square: Square, piece: Piece, color: Color) {
        self.squares[square as usize] = Some((piece, color));
        self.piece_lists[color.index()][piece.index()].add(square);
    }

    fn remove_piece(&mut self, square: Square) -> Option<(Piece, Color)> {
        let occupant = self.squares[square as usize].take();
        if let Some((piece, color)) = occupant {
            self.piece_lists[color.index()][piece.index()].remove(square);
        }
        occupant
    }

    fn relocate_piece(&mut self, from: Square, to: Square) {
        if let Some((piece, color)) = self.squares[from as usize].take() {
            self.piece_lists[color.index()][piece.index()].relocate(from, to);
            self.squares[to as usize] = Some((piece, color));
        }
    }

    pub(crate) fn set_state(
        &mut self,
        side_to_move: Color,
        castling_rights: u8,
        en_passant_square: Option<Square>,
        halfmove_clock: u16,
        fullmove_number: u16,
    ) {
        self.side_to_move = side_to_move;
        self.castling_rights = castling_rights & ALL_CASTLING;
        self.en_passant_square = en_passant_square;
        self.halfmove_clock = halfmove_clock;
        self.fullmove_number = fullmove_number;
    }

    /// Recompute the key from scratch and start a fresh history at the current position.
    pub(crate) fn reset_history(&mut self) {
        self.zobrist_key = zobrist::hash_position(self);
        self.position_history.clear();
        self.position_history.push(self.zobrist_key);
        self.repetition_start = 0;
        self.undo_stack.clear();
    }

    /// Play `mv`, which must be legal in this position.
    pub fn make_move(&mut self, mv: Move) {
        let us = self.side_to_move;
        let them = us.opposite();
        debug_assert!(
            self.squares[mv.from as usize].is_some(),
            "make_move {} from an empty square",
            mv
        );
        let (moving, _) = match self.squares[mv.from as usize] {
            Some(occupant) => occupant,
            None => {
                warn!(%mv, "make_move called with an empty origin square");
                return;
            }
        };

        let mut undo = UndoState {
            mv,
            captured: None,
            castling_rights: self.castling_rights,
            en_passant_square: self.en_passant_square,
            halfmove_clock: self.halfmove_clock,
            fullmove_number: self.fullmove_number,
            zobrist_key: self.zobrist_key,
            repetition_start: self.repetition_start,
        };

        let mut key = self.zobrist_key;
        if let Some(ep) = self.en_passant_square {
            key ^= zobrist::en_passant_key(file_of(ep));
        }
        key ^= zobrist::castling_key(self.castling_rights);

        // Capture, possibly on a different square than the destination
        let capture_square = if mv.flag == MoveFlag::EnPassant {
            match us {
                Color::White => mv.to - 8,
                Color::Black => mv.to + 8,
            }
        } else {
            mv.to
        };
        if let Some((captured, captured_color)) = self.remove_piece(capture_square) {
            key ^= zobrist::piece_square_key(captured_color, captured, capture_square);
            undo.captured = Some(captured);
        }

        self.relocate_piece(mv.from, mv.to);
        key ^= zobrist::piece_square_key(us, moving, mv.from);
        key ^= zobrist::piece_square_key(us, moving, mv.to);

        if let Some(promotion) = mv.flag.promotion_piece() {
            self.remove_piece(mv.to);
            self.place_piece(mv.to, promotion, us);
            key ^= zobrist::piece_square_key(us, Piece::Pawn, mv.to);
            key ^= zobrist::piece_square_key(us, promotion, mv.to);
        }

        if let Some((rook_from, rook_to)) = castle_rook_squares(mv.flag, us) {
            self.relocate_piece(rook_from, rook_to);
            key ^= zobrist::piece_square_key(us, Piece::Rook, rook_from);
            key ^= zobrist::piece_square_key(us, Piece::Rook, rook_to);
        }

        self.castling_rights &= castling_mask(mv.from) & castling_mask(mv.to);
        key ^= zobrist::castling_key(self.castling_rights);

        self.en_passant_square = if mv.flag == MoveFlag::DoublePawnPush {
            Some((mv.from + mv.to) / 2)
        } else {
            None
        };
        if let Some(ep) = self.en_passant_square {
            key ^= zobrist::en_passant_key(file_of(ep));
        }

        if moving == Piece::Pawn || undo.captured.is_some() {
            self.halfmove_clock = 0;
        } else {
            self.halfmove_clock = self.halfmove_clock.saturating_add(1);
        }
        if us == Color::Black {
            self.fullmove_number = self.fullmove_number.saturating_add(1);
        }

        self.side_to_move = them;
        key ^= zobrist::side_to_move_key();
        self.zobrist_key = key;

        self.position_history.push(key);
        if self.halfmove_clock == 0 {
            // Repetition cannot span an irreversible move
            self.repetition_start = self.position_history.len() - 1;
        }
        self.undo_stack.push(undo);
    }

    /// Take back the most recent move, restoring the exact prior state.
    pub fn unmake_move(&mut self) -> Option<Move> {
        let undo = self.undo_stack.pop()?;
        let mv = undo.mv;
        let us = self.side_to_move.opposite();
        let them = self.side_to_move;

        if mv.flag.promotion_piece().is_some() {
            self.remove_piece(mv.to);
            self.place_piece(mv.to, Piece::Pawn, us);
        }
        self.relocate_piece(mv.to, mv.from);

        if let Some((rook_from, rook_to)) = castle_rook_squares(mv.flag, us) {
            self.relocate_piece(rook_to, rook_from);
        }

        if let Some(captured) = undo.captured {
            let capture_square = if mv.flag == MoveFlag::EnPassant {
                match us {
                    Color::White => mv.to - 8,
                    Color::Black => mv.to + 8,
                }
            } else {
                mv.to
            };
            self.place_piece(capture_square, captured, them);
        }

        self.side_to_move = us;
        self.castling_rights = undo.castling_rights;
        self.en_passant_square = undo.en_passant_square;
        self.halfmove_clock = undo.halfmove_clock;
        self.fullmove_number = undo.fullmove_number;
        self.zobrist_key = undo.zobrist_key;
        self.repetition_start = undo.repetition_start;
        self.position_history.pop();

        Some(mv)
    }

    /// Square array, piece lists, king count and key all agree with each other.
    pub fn is_consistent(&self) -> bool {
        for color in [Color::White, Color::Black] {
            if self.pieces(color, Piece::King).len() != 1 {
                return false;
            }
            for piece in Piece::ALL {
                for &square in self.pieces(color, piece).squares() {
                    if self.squares[square as usize] != Some((piece, color)) {
                        return false;
                    }
                }
            }
        }
        let listed: usize = Piece::ALL.iter().map(|&piece| self.count(piece)).sum();
        let occupied = self.squares.iter().filter(|s| s.is_some()).count();
        listed == occupied && self.zobrist_key == zobrist::hash_position(self)
    }
}

impl Default for Board {
    fn default() -> Self {
        Board::new()
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for rank in (0..8).rev() {
            for file in 0..8 {
                let c = match self.piece_at(square_at(file, rank)) {
                    Some((piece, color)) => piece.to_char(color),
                    None => '.',
                };
                write!(f, "{}", c)?;
                if file < 7 {
                    write!(f, " ")?;
                }
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

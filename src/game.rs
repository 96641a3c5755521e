//! Turn loop and game record.

use tracing::{debug, info};

use crate::board::{Board, Color, START_FEN};
use crate::error::{ChessError, ChessResult};
use crate::game_state::{classify, GameResult};
use crate::movegen::{Move, MoveGenerator};
use crate::notation;
use crate::player::Player;

const EVENT_NAME: &str = "Fantom Chess Game";

/// The moves of one game and where it started.
#[derive(Debug, Clone, PartialEq)]
pub struct GameRecord {
    initial_fen: String,
    moves: Vec<Move>,
    result: GameResult,
}

impl GameRecord {
    pub fn new(initial: &Board) -> Self {
        Self {
            initial_fen: initial.to_fen(),
            moves: Vec::new(),
            result: GameResult::Playing,
        }
    }

    pub fn initial_fen(&self) -> &str {
        &self.initial_fen
    }

    pub fn initial_board(&self) -> ChessResult<Board> {
        Board::from_fen(&self.initial_fen)
    }

    pub fn moves(&self) -> &[Move] {
        &self.moves
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn push(&mut self, mv: Move) {
        self.moves.push(mv);
    }

    pub fn finish(&mut self, result: GameResult) {
        self.result = result;
    }

    /// Play every recorded move from the initial position.
    pub fn replay(&self) -> ChessResult<Board> {
        let mut board = self.initial_board()?;
        let mut generator = MoveGenerator::new();
        for &mv in &self.moves {
            if !generator.generate_moves(&board).contains(&mv) {
                return Err(ChessError::IllegalMove { mv });
            }
            board.make_move(mv);
        }
        Ok(board)
    }

    /// Transcript with tag pairs, numbered short algebraic moves and a result marker.
    pub fn to_pgn(&self) -> ChessResult<String> {
        let mut pgn = String::new();
        pgn.push_str(&format!("[Event \"{}\"]\n", EVENT_NAME));
        pgn.push_str(&format!("[Result \"{}\"]\n", self.result.marker()));
        if self.initial_fen != START_FEN {
            pgn.push_str("[SetUp \"1\"]\n");
            pgn.push_str(&format!("[FEN \"{}\"]\n", self.initial_fen));
        }
        pgn.push('\n');

        let movetext = notation::render_from(&self.initial_board()?, &self.moves)?;
        if !movetext.is_empty() {
            pgn.push_str(&movetext);
            pgn.push(' ');
        }
        pgn.push_str(self.result.marker());
        pgn.push('\n');
        Ok(pgn)
    }

    /// Read a transcript written by `to_pgn` or any tool producing the same
    /// format. The result is recomputed from the final position, so a
    /// resignation marker reads back as an unfinished game.
    pub fn from_pgn(text: &str) -> ChessResult<GameRecord> {
        let initial = match tag_value(text, "FEN") {
            Some(fen) => Board::from_fen(fen)?,
            None => Board::new(),
        };
        let moves = notation::parse_move_list_from(&initial, text)?;

        let mut record = GameRecord::new(&initial);
        record.moves = moves;
        let final_board = record.replay()?;
        record.result = classify(&final_board, &mut MoveGenerator::new());
        Ok(record)
    }
}

fn tag_value<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    text.lines().find_map(|line| {
        let inner = line.trim().strip_prefix('[')?.strip_suffix(']')?;
        let (key, value) = inner.split_once(char::is_whitespace)?;
        (key == name).then(|| value.trim().trim_matches('"'))
    })
}

/// One game between two players on an authoritative board.
pub struct Game {
    board: Board,
    white: Player,
    black: Player,
    move_generator: MoveGenerator,
    record: GameRecord,
    result: GameResult,
    started: bool,
}

impl Game {
    pub fn new(white: Player, black: Player) -> Self {
        let board = Board::new();
        Self {
            record: GameRecord::new(&board),
            board,
            white,
            black,
            move_generator: MoveGenerator::new(),
            result: GameResult::Playing,
            started: false,
        }
    }

    pub fn from_fen(fen: &str, white: Player, black: Player) -> ChessResult<Self> {
        let board = Board::from_fen(fen)?;
        Ok(Self {
            record: GameRecord::new(&board),
            board,
            white,
            black,
            move_generator: MoveGenerator::new(),
            result: GameResult::Playing,
            started: false,
        })
    }

    pub fn board(&self) -> &Board {
        &self.board
    }

    pub fn result(&self) -> GameResult {
        self.result
    }

    pub fn record(&self) -> &GameRecord {
        &self.record
    }

    pub fn player(&self, color: Color) -> &Player {
        match color {
            Color::White => &self.white,
            Color::Black => &self.black,
        }
    }

    pub fn player_to_move(&mut self) -> &mut Player {
        match self.board.side_to_move() {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    /// Classify the starting position and hand the first turn out.
    pub fn start(&mut self) -> ChessResult<()> {
        self.started = true;
        self.result = classify(&self.board, &mut self.move_generator);
        if self.result.is_terminal() {
            self.record.finish(self.result);
            info!(result = %self.result, "game over before the first move");
            return Ok(());
        }
        let board = &self.board;
        match board.side_to_move() {
            Color::White => self.white.notify_turn_to_move(board),
            Color::Black => self.black.notify_turn_to_move(board),
        }
    }

    /// Apply the mover's choice if one is ready. Returns whether a move was played.
    pub fn step(&mut self) -> ChessResult<bool> {
        if !self.started {
            self.start()?;
        }
        if self.result.is_terminal() {
            return Ok(false);
        }

        let mut chosen = None;
        self.player_to_move().update(|mv| chosen = Some(mv));
        let Some(mv) = chosen else {
            return Ok(false);
        };

        let san = notation::move_to_san(&self.board, mv);
        self.board.make_move(mv);
        self.record.push(mv);
        debug!(ply = self.board.ply_depth(), %mv, %san, "move played");

        self.result = classify(&self.board, &mut self.move_generator);
        if self.result.is_terminal() {
            self.record.finish(self.result);
            info!(result = %self.result, plies = self.record.moves().len(), "game over");
            return Ok(true);
        }

        let board = &self.board;
        match board.side_to_move() {
            Color::White => self.white.notify_turn_to_move(board)?,
            Color::Black => self.black.notify_turn_to_move(board)?,
        }
        Ok(true)
    }

    /// Step until the game ends, `max_plies` moves have been played, or a
    /// human player has not chosen yet.
    pub fn play_out(&mut self, max_plies: usize) -> ChessResult<GameResult> {
        let mut played = 0;
        while played < max_plies && self.step()? {
            played += 1;
        }
        Ok(self.result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchSettings;

    fn quick_engine() -> Player {
        Player::engine(SearchSettings {
            max_depth: 1,
            max_time_ms: 60_000,
            ..SearchSettings::default()
        })
    }

    fn human_moves(game: &mut Game, moves: &[(u8, u8)]) {
        for &(from, to) in moves {
            game.player_to_move()
                .as_human_mut()
                .unwrap()
                .try_move(from, to, None)
                .unwrap();
            assert!(game.step().unwrap());
        }
    }

    #[test]
    fn engine_delivers_mate_in_one() {
        let fen = "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1";
        let mut game = Game::from_fen(fen, quick_engine(), quick_engine()).unwrap();
        assert_eq!(game.play_out(10).unwrap(), GameResult::BlackIsMated);
        assert_eq!(game.record().moves(), &[Move::new(0, 56)]);

        let pgn = game.record().to_pgn().unwrap();
        assert!(pgn.contains("[Result \"1-0\"]"));
        assert!(pgn.contains(&format!("[FEN \"{}\"]", fen)));
        assert!(pgn.ends_with("1. Ra8# 1-0\n"));
        // Nothing more happens after the end
        assert!(!game.step().unwrap());
    }

    #[test]
    fn engine_game_keeps_record_and_board_in_step() {
        let mut game = Game::new(quick_engine(), quick_engine());
        game.play_out(12).unwrap();

        let board = game.board();
        assert!(board.is_consistent());
        assert_eq!(game.record().moves().len(), board.ply_depth());
        assert_eq!(game.record().replay().unwrap().to_fen(), board.to_fen());

        let pgn = game.record().to_pgn().unwrap();
        let reread = GameRecord::from_pgn(&pgn).unwrap();
        assert_eq!(reread.moves(), game.record().moves());
        assert_eq!(reread.result(), game.result());
    }

    #[test]
    fn human_players_scholars_mate() {
        let mut game = Game::new(Player::human(), Player::human());
        game.start().unwrap();
        assert!(!game.step().unwrap());

        human_moves(
            &mut game,
            &[(12, 28), (52, 36), (3, 39), (57, 42), (5, 26), (62, 45), (39, 53)],
        );
        assert_eq!(game.result(), GameResult::BlackIsMated);
        assert_eq!(
            game.record().to_pgn().unwrap(),
            "[Event \"Fantom Chess Game\"]\n[Result \"1-0\"]\n\n\
             1. e4 e5 2. Qh5 Nc6 3. Bc4 Nf6 4. Qxf7# 1-0\n"
        );
    }

    #[test]
    fn fifty_move_rule_ends_the_game() {
        let mut game = Game::from_fen(
            "4k3/8/8/8/8/8/8/R3K3 w - - 99 80",
            Player::human(),
            Player::human(),
        )
        .unwrap();
        game.start().unwrap();
        human_moves(&mut game, &[(4, 3)]);
        assert_eq!(game.result(), GameResult::FiftyMoveRule);
        assert_eq!(game.record().result().marker(), "1/2-1/2");
    }

    #[test]
    fn terminal_start_position() {
        let mut game =
            Game::from_fen("4k3/8/8/8/8/8/8/4KB2 w - - 0 1", quick_engine(), quick_engine())
                .unwrap();
        assert_eq!(game.play_out(5).unwrap(), GameResult::InsufficientMaterial);
        assert!(game.record().moves().is_empty());
        assert!(game.record().to_pgn().unwrap().ends_with("\n\n1/2-1/2\n"));
    }

    #[test]
    fn pgn_import_reads_setup_tags() {
        let pgn = "[Event \"Test\"]\n[SetUp \"1\"]\n[FEN \"6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1\"]\n\n1. Ra8# 1-0\n";
        let record = GameRecord::from_pgn(pgn).unwrap();
        assert_eq!(record.initial_fen(), "6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1");
        assert_eq!(record.moves().len(), 1);
        assert_eq!(record.result(), GameResult::BlackIsMated);

        assert!(matches!(
            GameRecord::from_pgn("1. e4 e5 2. Kxe8"),
            Err(ChessError::Notation { ply: 3, .. })
        ));
    }
}

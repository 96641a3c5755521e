//! Players: something that picks a move when it is its turn.
//!
//! Every player follows the same protocol. `notify_turn_to_move` hands it the
//! position. `update` then polls it and fires the callback exactly once, as
//! soon as a move has been chosen.

use tracing::debug;

use crate::board::{Board, Piece, Square};
use crate::error::{ChessError, ChessResult};
use crate::movegen::{Move, MoveFlag, MoveGenerator};
use crate::search::{Search, SearchDiagnostics, SearchSettings};

/// Moves come from outside, one `try_move` at a time.
#[derive(Debug, Default)]
pub struct HumanPlayer {
    move_generator: MoveGenerator,
    legal_moves: Vec<Move>,
    awaiting_move: bool,
    chosen: Option<Move>,
}

impl HumanPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_turn_to_move(&mut self, board: &Board) {
        self.legal_moves = self.move_generator.generate_moves(board);
        self.awaiting_move = true;
        self.chosen = None;
    }

    pub fn is_awaiting_move(&self) -> bool {
        self.awaiting_move && self.chosen.is_none()
    }

    /// Legal moves for the piece on `square`, for highlighting.
    pub fn legal_moves_from(&self, square: Square) -> Vec<Move> {
        self.legal_moves
            .iter()
            .copied()
            .filter(|mv| mv.from == square)
            .collect()
    }

    /// Submit a move by its squares. A pawn reaching the last rank becomes a
    /// queen unless `promotion` says otherwise.
    pub fn try_move(
        &mut self,
        from: Square,
        to: Square,
        promotion: Option<Piece>,
    ) -> ChessResult<Move> {
        let wanted = promotion.unwrap_or(Piece::Queen);
        let found = self.legal_moves.iter().copied().find(|mv| {
            mv.from == from
                && mv.to == to
                && mv.promotion().map_or(promotion.is_none(), |piece| piece == wanted)
        });

        match found {
            Some(mv) if self.is_awaiting_move() => {
                self.chosen = Some(mv);
                Ok(mv)
            }
            _ => {
                let flag = promotion
                    .and_then(MoveFlag::promote_to)
                    .unwrap_or(MoveFlag::Normal);
                Err(ChessError::IllegalMove {
                    mv: Move::with_flag(from, to, flag),
                })
            }
        }
    }

    /// Submit a fully specified move, for example one parsed from notation.
    pub fn submit(&mut self, mv: Move) -> ChessResult<Move> {
        if self.is_awaiting_move() && self.legal_moves.contains(&mv) {
            self.chosen = Some(mv);
            Ok(mv)
        } else {
            Err(ChessError::IllegalMove { mv })
        }
    }

    fn take_chosen(&mut self) -> Option<Move> {
        let mv = self.chosen.take()?;
        self.awaiting_move = false;
        self.legal_moves.clear();
        Some(mv)
    }
}

/// Wraps a `Search`; the move is chosen synchronously when the turn starts.
pub struct EnginePlayer {
    search: Search,
    chosen: Option<Move>,
    diagnostics: Option<SearchDiagnostics>,
}

impl EnginePlayer {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            search: Search::new(settings),
            chosen: None,
            diagnostics: None,
        }
    }

    pub fn notify_turn_to_move(&mut self, board: &Board) -> ChessResult<()> {
        let (mv, diagnostics) = self.search.choose_move(board)?;
        debug!(best_move = %mv, depth = diagnostics.last_completed_depth, "engine chose move");
        self.chosen = Some(mv);
        self.diagnostics = Some(diagnostics);
        Ok(())
    }

    /// Diagnostics of the most recent search.
    pub fn diagnostics(&self) -> Option<&SearchDiagnostics> {
        self.diagnostics.as_ref()
    }

    pub fn search_mut(&mut self) -> &mut Search {
        &mut self.search
    }
}

pub enum Player {
    Human(HumanPlayer),
    Engine(EnginePlayer),
}

impl Player {
    pub fn human() -> Self {
        Player::Human(HumanPlayer::new())
    }

    pub fn engine(settings: SearchSettings) -> Self {
        Player::Engine(EnginePlayer::new(settings))
    }

    pub fn is_human(&self) -> bool {
        matches!(self, Player::Human(_))
    }

    pub fn notify_turn_to_move(&mut self, board: &Board) -> ChessResult<()> {
        match self {
            Player::Human(human) => {
                human.notify_turn_to_move(board);
                Ok(())
            }
            Player::Engine(engine) => engine.notify_turn_to_move(board),
        }
    }

    /// Fire `on_move_chosen` if a move is ready. Returns whether it fired.
    pub fn update<F: FnOnce(Move)>(&mut self, on_move_chosen: F) -> bool {
        let chosen = match self {
            Player::Human(human) => human.take_chosen(),
            Player::Engine(engine) => engine.chosen.take(),
        };
        match chosen {
            Some(mv) => {
                on_move_chosen(mv);
                true
            }
            None => false,
        }
    }

    pub fn as_human_mut(&mut self) -> Option<&mut HumanPlayer> {
        match self {
            Player::Human(human) => Some(human),
            Player::Engine(_) => None,
        }
    }

    pub fn as_engine(&self) -> Option<&EnginePlayer> {
        match self {
            Player::Engine(engine) => Some(engine),
            Player::Human(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_move_fires_once() {
        let board = Board::new();
        let mut player = Player::human();
        player.notify_turn_to_move(&board).unwrap();
        assert!(!player.update(|_| panic!("nothing chosen yet")));

        let human = player.as_human_mut().unwrap();
        assert_eq!(human.legal_moves_from(6).len(), 2);
        let mv = human.try_move(12, 28, None).unwrap();
        assert_eq!(mv.flag, MoveFlag::DoublePawnPush);

        let mut fired = Vec::new();
        assert!(player.update(|mv| fired.push(mv)));
        assert!(!player.update(|mv| fired.push(mv)));
        assert_eq!(fired, vec![mv]);
    }

    #[test]
    fn human_illegal_or_out_of_turn_moves_are_rejected() {
        let mut human = HumanPlayer::new();
        assert_eq!(
            human.try_move(12, 28, None),
            Err(ChessError::IllegalMove {
                mv: Move::new(12, 28)
            })
        );

        human.notify_turn_to_move(&Board::new());
        assert!(matches!(
            human.try_move(12, 36, None),
            Err(ChessError::IllegalMove { .. })
        ));
        assert!(human.submit(Move::new(1, 18)).is_ok());
        // Already chosen for this turn
        assert!(human.try_move(6, 21, None).is_err());
    }

    #[test]
    fn human_promotion_defaults_to_queen() {
        let board = Board::from_fen("8/4P2k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let mut human = HumanPlayer::new();
        human.notify_turn_to_move(&board);
        assert_eq!(human.legal_moves_from(52).len(), 4);
        let mv = human.try_move(52, 60, None).unwrap();
        assert_eq!(mv.promotion(), Some(Piece::Queen));

        human.notify_turn_to_move(&board);
        let mv = human.try_move(52, 60, Some(Piece::Knight)).unwrap();
        assert_eq!(mv.flag, MoveFlag::PromoteKnight);
    }

    #[test]
    fn engine_chooses_a_legal_move() {
        let board = Board::new();
        let mut player = Player::engine(SearchSettings {
            max_depth: 2,
            max_time_ms: 60_000,
            ..SearchSettings::default()
        });
        player.notify_turn_to_move(&board).unwrap();

        let mut chosen = None;
        assert!(player.update(|mv| chosen = Some(mv)));
        let chosen = chosen.unwrap();
        assert!(MoveGenerator::new().generate_moves(&board).contains(&chosen));
        let diagnostics = player.as_engine().unwrap().diagnostics().unwrap();
        assert_eq!(diagnostics.best_move, chosen);
        assert_eq!(diagnostics.last_completed_depth, 2);
        assert!(!player.update(|_| panic!("fired twice")));
    }

    #[test]
    fn engine_without_moves_reports_error() {
        let board = Board::from_fen("8/8/8/8/8/1q6/2k5/K7 w - - 0 1").unwrap();
        let mut player = Player::engine(SearchSettings::default());
        assert_eq!(
            player.notify_turn_to_move(&board),
            Err(ChessError::NoLegalMove)
        );
        assert!(!player.update(|_| {}));
    }
}

pub mod board;
pub mod error;
pub mod evaluation;
pub mod fen;
pub mod game;
pub mod game_state;
pub mod movegen;
pub mod notation;
pub mod player;
pub mod search;
pub mod transposition;
pub mod uci;
pub mod zobrist;

pub use board::{Board, Color, Piece, Square};
pub use error::{ChessError, ChessResult};
pub use game::{Game, GameRecord};
pub use game_state::{classify, GameResult};
pub use movegen::{Move, MoveFlag, MoveGenerator};
pub use player::Player;
pub use search::{PromotionMode, Search, SearchDiagnostics, SearchSettings};

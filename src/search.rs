use std::cmp::Reverse;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::board::{Board, Piece};
use crate::error::{ChessError, ChessResult};
use crate::evaluation::{EvalWeights, Evaluator};
use crate::movegen::{Move, MoveFlag, MoveGenerator};
use crate::notation;
use crate::transposition::{NodeType, TranspositionTable};

pub const IMMEDIATE_MATE_SCORE: i32 = 100_000;
const MAX_MATE_DEPTH: i32 = 1000;
const INFINITY: i32 = 1_000_000;
// Nodes between clock reads.
const TIME_CHECK_INTERVAL: u64 = 2048;

pub fn is_mate_score(score: i32) -> bool {
    score.abs() > IMMEDIATE_MATE_SCORE - MAX_MATE_DEPTH
}

/// Plies until mate for a score where `is_mate_score` holds.
pub fn ply_to_mate_from_score(score: i32) -> u32 {
    (IMMEDIATE_MATE_SCORE - score.abs()).max(0) as u32
}

/// Which promotion choices the engine considers. Human input is never restricted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromotionMode {
    #[default]
    All,
    QueenAndKnight,
    QueenOnly,
}

impl PromotionMode {
    fn allows(self, mv: Move) -> bool {
        match (self, mv.promotion()) {
            (_, None) | (PromotionMode::All, _) => true,
            (PromotionMode::QueenAndKnight, Some(piece)) => {
                matches!(piece, Piece::Queen | Piece::Knight)
            }
            (PromotionMode::QueenOnly, Some(piece)) => piece == Piece::Queen,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub max_time_ms: u64,
    pub max_depth: u32,
    pub use_iterative_deepening: bool,
    pub use_transposition_table: bool,
    pub clear_tt_each_move: bool,
    /// Number of table entries.
    pub tt_size: usize,
    pub promotions_to_search: PromotionMode,
    pub weights: EvalWeights,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_time_ms: 1000,
            max_depth: 64,
            use_iterative_deepening: true,
            use_transposition_table: true,
            clear_tt_each_move: false,
            tt_size: 1 << 16,
            promotions_to_search: PromotionMode::All,
            weights: EvalWeights::default(),
        }
    }
}

/// What the last call to `Search::choose_move` found.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchDiagnostics {
    pub last_completed_depth: u32,
    /// Score of the chosen move from the mover's perspective.
    pub eval: i32,
    pub best_move: Move,
    pub move_name: String,
    /// The position had a single legal move and no search was run.
    pub from_shortcut: bool,
    pub nodes: u64,
    pub cutoffs: u64,
    pub tt_hits: u64,
    pub elapsed_ms: u64,
}

impl SearchDiagnostics {
    pub fn eval_string(&self) -> String {
        if self.from_shortcut {
            "Forced".to_string()
        } else if is_mate_score(self.eval) {
            let plies = ply_to_mate_from_score(self.eval);
            if self.eval > 0 {
                format!("mate in {} ply", plies)
            } else {
                format!("mated in {} ply", plies)
            }
        } else {
            format!("{:+.2}", self.eval as f64 / 100.0)
        }
    }
}

pub struct Search {
    settings: SearchSettings,
    evaluator: Evaluator,
    move_generator: MoveGenerator,
    transposition_table: TranspositionTable,
    // Working copy; the caller's board is never touched.
    board: Board,
    start_time: Instant,
    time_limit: Option<Duration>,
    aborted: bool,
    nodes: u64,
    cutoffs: u64,
    tt_hits: u64,
}

impl Search {
    pub fn new(settings: SearchSettings) -> Self {
        Self {
            evaluator: Evaluator::with_weights(settings.weights.clone()),
            move_generator: MoveGenerator::new(),
            transposition_table: TranspositionTable::new(settings.tt_size),
            board: Board::new(),
            start_time: Instant::now(),
            time_limit: None,
            aborted: false,
            nodes: 0,
            cutoffs: 0,
            tt_hits: 0,
            settings,
        }
    }

    pub fn settings(&self) -> &SearchSettings {
        &self.settings
    }

    pub fn set_settings(&mut self, settings: SearchSettings) {
        if settings.tt_size != self.settings.tt_size {
            self.transposition_table = TranspositionTable::new(settings.tt_size);
        }
        self.evaluator = Evaluator::with_weights(settings.weights.clone());
        self.settings = settings;
    }

    pub fn set_max_depth(&mut self, depth: u32) {
        self.settings.max_depth = depth;
    }

    pub fn set_max_time_ms(&mut self, millis: u64) {
        self.settings.max_time_ms = millis;
    }

    pub fn nodes_searched(&self) -> u64 {
        self.nodes
    }

    pub fn clear_transposition_table(&mut self) {
        self.transposition_table.clear();
    }

    /// Pick a move for the side to move in `position`.
    ///
    /// With iterative deepening the result comes from the deepest fully
    /// completed depth; depth 1 always completes, however small the budget.
    pub fn choose_move(&mut self, position: &Board) -> ChessResult<(Move, SearchDiagnostics)> {
        self.start_time = Instant::now();
        self.nodes = 0;
        self.cutoffs = 0;
        self.tt_hits = 0;
        self.aborted = false;

        let legal_moves = self.move_generator.generate_moves(position);
        if legal_moves.is_empty() {
            warn!(fen = %position.to_fen(), "search requested with no legal moves");
            return Err(ChessError::NoLegalMove);
        }

        if legal_moves.len() == 1 {
            let mv = legal_moves[0];
            let diagnostics = SearchDiagnostics {
                eval: self.evaluator.evaluate(position),
                best_move: mv,
                move_name: notation::move_to_san(position, mv),
                from_shortcut: true,
                ..SearchDiagnostics::default()
            };
            info!(best_move = %mv, "only one legal move");
            return Ok((mv, diagnostics));
        }

        if self.settings.clear_tt_each_move {
            self.transposition_table.clear();
        }
        self.board = position.clone();

        let promotions = self.settings.promotions_to_search;
        let root_moves: Vec<Move> = legal_moves
            .into_iter()
            .filter(|&mv| promotions.allows(mv))
            .collect();

        let max_depth = self.settings.max_depth.max(1);
        let (first_depth, budget) = if self.settings.use_iterative_deepening {
            (1, Some(Duration::from_millis(self.settings.max_time_ms)))
        } else {
            (max_depth, None)
        };

        let mut best: Option<(Move, i32)> = None;
        let mut completed_depth = 0;
        for depth in first_depth..=max_depth {
            // Until one depth has completed there is nothing to fall back on.
            self.time_limit = if best.is_some() { budget } else { None };

            let previous_best = best.map(|(mv, _)| mv);
            let Some((mv, score)) = self.search_root(depth, &root_moves, previous_best) else {
                debug!(depth, "depth aborted on time, keeping previous result");
                break;
            };
            best = Some((mv, score));
            completed_depth = depth;
            debug!(depth, score, best_move = %mv, nodes = self.nodes, "depth completed");

            if is_mate_score(score) && ply_to_mate_from_score(score) <= depth {
                break;
            }
            if budget.is_some_and(|limit| self.start_time.elapsed() >= limit) {
                break;
            }
        }

        let (best_move, eval) = best.ok_or(ChessError::NoLegalMove)?;
        let diagnostics = SearchDiagnostics {
            last_completed_depth: completed_depth,
            eval,
            best_move,
            move_name: notation::move_to_san(position, best_move),
            from_shortcut: false,
            nodes: self.nodes,
            cutoffs: self.cutoffs,
            tt_hits: self.tt_hits,
            elapsed_ms: self.start_time.elapsed().as_millis() as u64,
        };
        info!(
            depth = completed_depth,
            eval = %diagnostics.eval_string(),
            best_move = %diagnostics.move_name,
            nodes = self.nodes,
            elapsed_ms = diagnostics.elapsed_ms,
            "search finished"
        );
        Ok((best_move, diagnostics))
    }

    /// Search every root move to `depth`. Returns `None` if the clock ran out.
    ///
    /// Equal scores go to the move generated first, whatever order the moves
    /// were searched in.
    fn search_root(
        &mut self,
        depth: u32,
        root_moves: &[Move],
        previous_best: Option<Move>,
    ) -> Option<(Move, i32)> {
        let mut order: Vec<usize> = (0..root_moves.len()).collect();
        order.sort_by_cached_key(|&i| Reverse(self.move_score(root_moves[i], previous_best)));

        let mut best: Option<(usize, i32)> = None;
        for index in order {
            let mv = root_moves[index];
            // A move generated before the current best must be searched one point
            // lower so that an equal score is still recognised as a tie.
            let alpha = match best {
                None => -INFINITY,
                Some((best_index, best_score)) if index < best_index => best_score - 1,
                Some((_, best_score)) => best_score,
            };

            self.board.make_move(mv);
            let score = -self.negamax(depth - 1, 1, -INFINITY, -alpha);
            self.board.unmake_move();

            if self.aborted {
                return None;
            }

            let improves = match best {
                None => true,
                Some((best_index, best_score)) => {
                    score > best_score || (score == best_score && index < best_index)
                }
            };
            if improves {
                best = Some((index, score));
            }
        }

        best.map(|(index, score)| (root_moves[index], score))
    }

    fn negamax(&mut self, depth: u32, ply: u32, mut alpha: i32, beta: i32) -> i32 {
        if self.should_abort() {
            return 0;
        }
        if depth == 0 {
            return self.quiescence(ply, alpha, beta);
        }
        self.nodes += 1;

        let key = self.board.zobrist_key();
        let use_tt = self.settings.use_transposition_table;
        if use_tt {
            if let Some(score) = self.transposition_table.probe(key, depth, ply, alpha, beta) {
                self.tt_hits += 1;
                return score.clamp(alpha, beta);
            }
        }

        let mut moves = self.move_generator.generate_moves(&self.board);
        if moves.is_empty() {
            return self.terminal_score(ply).clamp(alpha, beta);
        }

        let promotions = self.settings.promotions_to_search;
        moves.retain(|&mv| promotions.allows(mv));
        let hash_move = if use_tt {
            self.transposition_table.get_best_move(key)
        } else {
            None
        };
        self.order_moves(&mut moves, hash_move);

        let mut node_type = NodeType::UpperBound;
        let mut best_move = None;
        for mv in moves {
            self.board.make_move(mv);
            let score = -self.negamax(depth - 1, ply + 1, -beta, -alpha);
            self.board.unmake_move();

            if self.aborted {
                return 0;
            }

            if score >= beta {
                self.cutoffs += 1;
                if use_tt {
                    self.transposition_table
                        .store(key, depth, ply, beta, NodeType::LowerBound, Some(mv));
                }
                return beta;
            }
            if score > alpha {
                alpha = score;
                best_move = Some(mv);
                node_type = NodeType::Exact;
            }
        }

        if use_tt {
            self.transposition_table
                .store(key, depth, ply, alpha, node_type, best_move);
        }
        alpha
    }

    /// Captures and promotions only, until the position is quiet.
    fn quiescence(&mut self, ply: u32, mut alpha: i32, beta: i32) -> i32 {
        if self.should_abort() {
            return 0;
        }
        self.nodes += 1;

        let mut moves = self.move_generator.generate_moves(&self.board);
        if moves.is_empty() {
            return self.terminal_score(ply).clamp(alpha, beta);
        }

        let stand_pat = self.evaluator.evaluate(&self.board);
        if stand_pat >= beta {
            return beta;
        }
        if stand_pat > alpha {
            alpha = stand_pat;
        }

        let board = &self.board;
        let promotions = self.settings.promotions_to_search;
        moves.retain(|&mv| {
            (board.is_capture(mv) || mv.promotion().is_some()) && promotions.allows(mv)
        });
        self.order_moves(&mut moves, None);

        for mv in moves {
            self.board.make_move(mv);
            let score = -self.quiescence(ply + 1, -beta, -alpha);
            self.board.unmake_move();

            if self.aborted {
                return 0;
            }
            if score >= beta {
                self.cutoffs += 1;
                return beta;
            }
            if score > alpha {
                alpha = score;
            }
        }
        alpha
    }

    /// Score of a position with no legal moves for the side to move.
    fn terminal_score(&self, ply: u32) -> i32 {
        if self.move_generator.in_check() {
            -(IMMEDIATE_MATE_SCORE - ply as i32)
        } else {
            0
        }
    }

    fn should_abort(&mut self) -> bool {
        if !self.aborted {
            if let Some(limit) = self.time_limit {
                if self.nodes % TIME_CHECK_INTERVAL == 0 && self.start_time.elapsed() >= limit {
                    self.aborted = true;
                }
            }
        }
        self.aborted
    }

    fn order_moves(&self, moves: &mut [Move], hash_move: Option<Move>) {
        moves.sort_by_cached_key(|&mv| Reverse(self.move_score(mv, hash_move)));
    }

    /// Hash move first, then captures by most valuable victim and least valuable attacker, then promotions.
    fn move_score(&self, mv: Move, hash_move: Option<Move>) -> i32 {
        if Some(mv) == hash_move {
            return INFINITY;
        }
        let weights = &self.evaluator.weights;
        let mut score = 0;

        let victim = match mv.flag {
            MoveFlag::EnPassant => Some(Piece::Pawn),
            _ => self.board.piece_at(mv.to).map(|(piece, _)| piece),
        };
        if let Some(victim) = victim {
            let attacker = self
                .board
                .piece_at(mv.from)
                .map_or(0, |(piece, _)| weights.piece_value(piece));
            score += 10 * weights.piece_value(victim) - attacker;
        }
        if let Some(promotion) = mv.promotion() {
            score += weights.piece_value(promotion);
        }
        score
    }
}

impl Default for Search {
    fn default() -> Self {
        Self::new(SearchSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixed_depth(depth: u32) -> SearchSettings {
        SearchSettings {
            max_depth: depth,
            max_time_ms: 60_000,
            ..SearchSettings::default()
        }
    }

    #[test]
    fn takes_the_hanging_queen() {
        let board = Board::from_fen("4k3/8/8/3q4/8/8/3Q4/4K3 w - - 0 1").unwrap();
        let mut search = Search::new(fixed_depth(1));
        let (mv, diagnostics) = search.choose_move(&board).unwrap();
        assert_eq!(mv, Move::new(11, 35));
        assert_eq!(diagnostics.last_completed_depth, 1);
        assert!(diagnostics.eval > 500);
        assert_eq!(diagnostics.move_name, "Qxd5");
        assert!(!diagnostics.from_shortcut);
    }

    #[test]
    fn finds_mate_in_one() {
        let board = Board::from_fen("6k1/5ppp/8/8/8/8/8/R5K1 w - - 0 1").unwrap();
        let mut search = Search::new(fixed_depth(5));
        let (mv, diagnostics) = search.choose_move(&board).unwrap();
        assert_eq!(mv, Move::new(0, 56));
        assert!(is_mate_score(diagnostics.eval));
        assert_eq!(ply_to_mate_from_score(diagnostics.eval), 1);
        assert_eq!(diagnostics.eval_string(), "mate in 1 ply");
        // Deepening stops once the mate is inside the horizon
        assert_eq!(diagnostics.last_completed_depth, 1);
    }

    #[test]
    fn no_legal_move_is_an_error() {
        let board = Board::from_fen("8/8/8/8/8/1q6/2k5/K7 w - - 0 1").unwrap();
        let mut search = Search::default();
        assert_eq!(search.choose_move(&board), Err(ChessError::NoLegalMove));
    }

    #[test]
    fn single_legal_move_skips_the_search() {
        let board = Board::from_fen("k7/2Q5/8/7p/8/7P/8/7K b - - 0 1").unwrap();
        let mut search = Search::default();
        let (mv, diagnostics) = search.choose_move(&board).unwrap();
        assert_eq!(mv, Move::new(39, 31));
        assert!(diagnostics.from_shortcut);
        assert_eq!(diagnostics.nodes, 0);
        assert_eq!(diagnostics.eval_string(), "Forced");
    }

    #[test]
    fn caller_board_is_untouched() {
        let board = Board::from_fen(
            "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        )
        .unwrap();
        let fen = board.to_fen();
        let key = board.zobrist_key();
        let mut search = Search::new(fixed_depth(1));
        search.choose_move(&board).unwrap();
        assert_eq!(board.to_fen(), fen);
        assert_eq!(board.zobrist_key(), key);
        assert_eq!(board.ply_depth(), 0);
    }

    #[test]
    fn tiny_budget_still_completes_depth_one() {
        let board = Board::new();
        let mut search = Search::new(SearchSettings {
            max_time_ms: 0,
            ..SearchSettings::default()
        });
        let (mv, diagnostics) = search.choose_move(&board).unwrap();
        assert!(!mv.is_null());
        assert_eq!(diagnostics.last_completed_depth, 1);
    }

    #[test]
    fn result_does_not_depend_on_table_or_deepening() {
        let board = Board::from_fen("4k3/8/8/3q4/8/8/3Q4/4K3 w - - 0 1").unwrap();

        let mut deepening = Search::new(fixed_depth(3));
        let mut plain = Search::new(SearchSettings {
            use_iterative_deepening: false,
            use_transposition_table: false,
            ..fixed_depth(3)
        });
        let (a, diag_a) = deepening.choose_move(&board).unwrap();
        let (b, diag_b) = plain.choose_move(&board).unwrap();
        assert_eq!(a, b);
        assert_eq!(diag_a.eval, diag_b.eval);
        assert_eq!(diag_b.last_completed_depth, 3);

        // Repeating the search with a warm table gives the same answer
        let (c, diag_c) = deepening.choose_move(&board).unwrap();
        assert_eq!(a, c);
        assert_eq!(diag_a.eval, diag_c.eval);
    }

    #[test]
    fn queen_only_promotions() {
        let board = Board::from_fen("8/P6k/8/8/8/8/8/K7 w - - 0 1").unwrap();
        let mut search = Search::new(SearchSettings {
            promotions_to_search: PromotionMode::QueenOnly,
            ..fixed_depth(2)
        });
        let (mv, _) = search.choose_move(&board).unwrap();
        assert_eq!(mv, Move::with_flag(48, 56, MoveFlag::PromoteQueen));
    }

    #[test]
    fn eval_string_formats() {
        let mut diagnostics = SearchDiagnostics {
            eval: 35,
            ..SearchDiagnostics::default()
        };
        assert_eq!(diagnostics.eval_string(), "+0.35");
        diagnostics.eval = -120;
        assert_eq!(diagnostics.eval_string(), "-1.20");
        diagnostics.eval = -(IMMEDIATE_MATE_SCORE - 4);
        assert_eq!(diagnostics.eval_string(), "mated in 4 ply");
    }
}

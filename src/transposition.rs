use crate::movegen::Move;
use crate::search::is_mate_score;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeType {
    Exact,
    LowerBound,
    UpperBound,
}

#[derive(Debug, Clone, Copy)]
pub struct TranspositionEntry {
    pub key: u64,
    pub depth: u32,
    pub score: i32,
    pub node_type: NodeType,
    pub best_move: Option<Move>,
}

/// Fixed-size always-replace table indexed by the low bits of the position key.
#[derive(Debug, Clone)]
pub struct TranspositionTable {
    entries: Vec<Option<TranspositionEntry>>,
}

impl TranspositionTable {
    pub fn new(size: usize) -> Self {
        Self {
            entries: vec![None; size.max(1)],
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.iter_mut().for_each(|entry| *entry = None);
    }

    fn index(&self, key: u64) -> usize {
        (key % self.entries.len() as u64) as usize
    }

    /// Store a node result. Mate scores are kept relative to the stored node, not the root.
    pub fn store(
        &mut self,
        key: u64,
        depth: u32,
        ply: u32,
        score: i32,
        node_type: NodeType,
        best_move: Option<Move>,
    ) {
        let index = self.index(key);
        self.entries[index] = Some(TranspositionEntry {
            key,
            depth,
            score: correct_mate_score_for_storage(score, ply),
            node_type,
            best_move,
        });
    }

    pub fn get(&self, key: u64) -> Option<&TranspositionEntry> {
        self.entries[self.index(key)]
            .as_ref()
            .filter(|entry| entry.key == key)
    }

    /// A usable score for a search of exactly `depth` at `ply`, if the stored bound decides the window.
    pub fn probe(&self, key: u64, depth: u32, ply: u32, alpha: i32, beta: i32) -> Option<i32> {
        let entry = self.get(key)?;
        if entry.depth != depth {
            return None;
        }
        let score = correct_mate_score_for_retrieval(entry.score, ply);
        match entry.node_type {
            NodeType::Exact => Some(score),
            NodeType::LowerBound if score >= beta => Some(score),
            NodeType::UpperBound if score <= alpha => Some(score),
            _ => None,
        }
    }

    pub fn get_best_move(&self, key: u64) -> Option<Move> {
        self.get(key).and_then(|entry| entry.best_move)
    }
}

fn correct_mate_score_for_storage(score: i32, ply: u32) -> i32 {
    if is_mate_score(score) {
        score + score.signum() * ply as i32
    } else {
        score
    }
}

fn correct_mate_score_for_retrieval(score: i32, ply: u32) -> i32 {
    if is_mate_score(score) {
        score - score.signum() * ply as i32
    } else {
        score
    }
}

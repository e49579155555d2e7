//! DAG rescoring: single best path and A* N-best.
//!
//! Both searches run on a `Dag` whose fillers have been bypassed (they do it
//! themselves if needed). Scores combine link acoustic scores with weighted
//! trigram LM scores over the preceding non-filler words; fillers receive a
//! weighted penalty instead (see `Scorer`).

mod astar;
mod backtrace;
mod bestpath;
mod heuristic;

#[cfg(test)]
mod tests;

pub use astar::{AstarConfig, AstarSession, SearchStats};
pub use backtrace::backtrace;
pub use bestpath::best_path;
pub use heuristic::compute_heuristic;
pub use crate::scorer::Scorer;

use crate::dag::{DagError, NodeId};
use crate::dict::{Dictionary, WordId};
use crate::{Frame, Score};

#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error(transparent)]
    Dag(#[from] DagError),

    #[error("LM operation budget of {limit} exhausted")]
    LmBudgetExceeded { limit: u64 },

    #[error("partial path budget of {limit} exhausted")]
    PartialPathBudgetExceeded { limit: usize },

    #[error("positive acoustic score {score} on link {from:?} -> {to:?}")]
    InvalidScoreSign {
        from: Option<NodeId>,
        to: NodeId,
        score: Score,
    },

    #[error("no path reaches the exit node")]
    NoPath,

    #[error("heuristic scores have not been computed")]
    HeuristicMissing,

    #[error("internal inconsistency: {0}")]
    Inconsistent(String),
}

/// One word of a hypothesis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub word: WordId,
    pub start_frame: Frame,
    pub end_frame: Frame,
    pub ascr: Score,
    /// LM score, or filler penalty for fillers.
    pub lscr: Score,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hypothesis {
    /// Segments in time order, `<s>` first and the exit word last.
    pub segments: Vec<Segment>,
    /// Sum of every segment's acoustic and LM score.
    pub score: Score,
}

impl Hypothesis {
    pub fn acoustic_score(&self) -> Score {
        self.segments.iter().fold(0, |acc, s| acc.saturating_add(s.ascr))
    }

    pub fn lm_score(&self) -> Score {
        self.segments.iter().fold(0, |acc, s| acc.saturating_add(s.lscr))
    }

    /// Word strings, fillers included.
    pub fn words<'d>(&self, dict: &'d dyn Dictionary) -> Vec<&'d str> {
        self.segments.iter().map(|s| dict.display(s.word)).collect()
    }

    /// Base word ids without fillers.
    pub fn content_words(&self, dict: &dyn Dictionary) -> Vec<WordId> {
        self.segments
            .iter()
            .filter(|s| !dict.is_filler(s.word))
            .map(|s| dict.base_word_id(s.word))
            .collect()
    }
}

/// Per-search count of LM lookups.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LmBudget {
    used: u64,
    limit: u64,
}

impl LmBudget {
    pub(crate) fn new(limit: u64) -> Self {
        Self { used: 0, limit }
    }

    pub(crate) fn charge(&mut self) -> Result<(), SearchError> {
        if self.used >= self.limit {
            return Err(SearchError::LmBudgetExceeded { limit: self.limit });
        }
        self.used += 1;
        Ok(())
    }

    pub(crate) fn used(&self) -> u64 {
        self.used
    }
}

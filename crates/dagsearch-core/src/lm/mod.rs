//! Language model seam.
//!
//! Word ids passed to a `LanguageModel` are dictionary base ids; callers map
//! alternate pronunciations before asking. Scores are integer logs in the
//! engine's log base, unweighted.

mod ngram;

pub use ngram::NgramModel;

use std::io;

use crate::dict::WordId;
use crate::Score;

#[derive(Debug, thiserror::Error)]
pub enum LmError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("ARPA parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

pub trait LanguageModel: Send + Sync {
    fn unigram_score(&self, w: WordId) -> Score;
    fn bigram_score(&self, w1: WordId, w2: WordId) -> Score;
    fn trigram_score(&self, w1: WordId, w2: WordId, w3: WordId) -> Score;

    /// Score `w` given up to two words of history (`w2` is the older word).
    fn score(&self, w2: Option<WordId>, w1: Option<WordId>, w: WordId) -> Score {
        match (w2, w1) {
            (Some(a), Some(b)) => self.trigram_score(a, b, w),
            (None, Some(b)) => self.bigram_score(b, w),
            (_, None) => self.unigram_score(w),
        }
    }
}

/// Language model that scores every word the same. Rescoring with
/// `FlatModel(0)` ranks paths by acoustic score alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct FlatModel(pub Score);

impl LanguageModel for FlatModel {
    fn unigram_score(&self, _w: WordId) -> Score {
        self.0
    }

    fn bigram_score(&self, _w1: WordId, _w2: WordId) -> Score {
        self.0
    }

    fn trigram_score(&self, _w1: WordId, _w2: WordId, _w3: WordId) -> Score {
        self.0
    }
}

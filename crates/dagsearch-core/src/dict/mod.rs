//! Word dictionary: word-string ↔ id mapping and filler classification.
//!
//! `Dictionary` is the seam the search engines consume. `Vocabulary` is the
//! in-memory implementation loaded from Sphinx-style dictionary text.

mod vocab;

pub use vocab::Vocabulary;

use std::io;

use crate::Score;

/// Dictionary word identifier. Alternate pronunciations have their own id and
/// map to a shared base id via [`Dictionary::base_word_id`].
pub type WordId = u32;

pub const START_WORD: &str = "<s>";
pub const FINISH_WORD: &str = "</s>";
pub const SILENCE_WORD: &str = "<sil>";

#[derive(Debug, thiserror::Error)]
pub enum DictError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("parse error at line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

pub trait Dictionary: Send + Sync {
    fn word_id(&self, word: &str) -> Option<WordId>;
    fn word_str(&self, id: WordId) -> Option<&str>;
    fn base_word_id(&self, id: WordId) -> WordId;

    /// Fillers (silence, noise) are scored with a fixed penalty instead of
    /// the language model. Sentence start/end are never fillers.
    fn is_filler(&self, id: WordId) -> bool;
    fn filler_penalty(&self, id: WordId) -> Score;

    fn start_word(&self) -> WordId;
    fn finish_word(&self) -> WordId;

    /// Word string, or `"<unk>"` for ids outside the dictionary.
    fn display(&self, id: WordId) -> &str {
        self.word_str(id).unwrap_or("<unk>")
    }
}

//! Word-lattice rescoring.
//!
//! A recognizer's word lattice is turned into a DAG of word occurrences
//! (`dag`), fillers are bypassed, and the DAG is rescored with a trigram
//! language model: `search::best_path` finds the single best hypothesis,
//! `search::AstarSession` enumerates N-best hypotheses in score order.

pub mod dag;
pub mod dict;
pub mod lm;
pub mod logmath;
pub mod scorer;
pub mod search;
pub mod settings;

#[cfg(test)]
mod testutil;

/// Integer log-domain score in `log_base` units. Higher is better; acoustic
/// and language scores are never positive.
pub type Score = i32;

/// Acoustic frame index, 0-based.
pub type Frame = i32;

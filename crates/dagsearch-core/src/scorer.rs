//! Word scores in context.
//!
//! A regular word scores `lm_weight × lm(w | w2 w1) + wip`; a filler scores
//! `lm_weight × log(filler_prob) + wip`, where `wip` is the word insertion
//! penalty in log units. `<s>` is never scored.

use crate::dict::{Dictionary, WordId};
use crate::lm::LanguageModel;
use crate::logmath::LogMath;
use crate::settings::SearchSettings;
use crate::Score;

/// Scores words in context: weighted LM scores for regular words, weighted
/// penalties for fillers, and the insertion penalty for both.
#[derive(Clone, Copy)]
pub struct Scorer<'a> {
    lm: &'a dyn LanguageModel,
    dict: &'a dyn Dictionary,
    lm_weight: f64,
    word_penalty: Score,
}

impl<'a> Scorer<'a> {
    /// A scorer without insertion penalty.
    pub fn new(lm: &'a dyn LanguageModel, dict: &'a dyn Dictionary, lm_weight: f64) -> Self {
        Self {
            lm,
            dict,
            lm_weight,
            word_penalty: 0,
        }
    }

    pub fn from_settings(
        lm: &'a dyn LanguageModel,
        dict: &'a dyn Dictionary,
        search: &SearchSettings,
        logmath: &LogMath,
    ) -> Self {
        Self::new(lm, dict, search.lm_weight).with_word_penalty(logmath.log(search.word_insertion_penalty))
    }

    /// Add `penalty` (a log score, normally negative) to every scored word.
    pub fn with_word_penalty(mut self, penalty: Score) -> Self {
        self.word_penalty = penalty;
        self
    }

    pub fn dict(&self) -> &'a dyn Dictionary {
        self.dict
    }

    pub fn lm_weight(&self) -> f64 {
        self.lm_weight
    }

    pub fn word_penalty(&self) -> Score {
        self.word_penalty
    }

    pub fn is_filler(&self, w: WordId) -> bool {
        self.dict.is_filler(w)
    }

    pub fn filler_penalty(&self, w: WordId) -> Score {
        self.weight(self.dict.filler_penalty(w)).saturating_add(self.word_penalty)
    }

    /// LM score of `w` after `w2 w1` (`w2` older). Alternate pronunciations
    /// are scored as their base word.
    pub fn lm_score(&self, w2: Option<WordId>, w1: Option<WordId>, w: WordId) -> Score {
        let base = |x: WordId| self.dict.base_word_id(x);
        let raw = self.lm.score(w2.map(base), w1.map(base), base(w));
        self.weight(raw).saturating_add(self.word_penalty)
    }

    /// Identifies the filler penalties this scorer produces, so scores baked
    /// into bypass links can be checked against a later scorer.
    pub(crate) fn penalty_key(&self) -> (u64, Score) {
        (self.lm_weight.to_bits(), self.word_penalty)
    }

    fn weight(&self, raw: Score) -> Score {
        (f64::from(raw) * self.lm_weight) as Score
    }
}

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::{LanguageModel, LmError};
use crate::dict::{Dictionary, WordId};
use crate::logmath::LogMath;
use crate::settings::LmSettings;
use crate::Score;

/// Backoff trigram model loaded from an ARPA file.
///
/// Words are mapped to dictionary base ids at load time; n-grams mentioning a
/// word outside the dictionary are dropped. Unigram misses score
/// `unknown_word_prob`.
#[derive(Debug, Clone)]
pub struct NgramModel {
    unigrams: HashMap<WordId, (Score, Score)>,
    bigrams: HashMap<(WordId, WordId), (Score, Score)>,
    trigrams: HashMap<(WordId, WordId, WordId), Score>,
    unknown: Score,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Section {
    Preamble,
    Data,
    Ngrams(usize),
    End,
}

impl NgramModel {
    pub fn open(
        path: &Path,
        dict: &dyn Dictionary,
        logmath: &LogMath,
        settings: &LmSettings,
    ) -> Result<Self, LmError> {
        let text = fs::read_to_string(path)?;
        Self::from_arpa(&text, dict, logmath, settings)
    }

    pub fn from_arpa(
        text: &str,
        dict: &dyn Dictionary,
        logmath: &LogMath,
        settings: &LmSettings,
    ) -> Result<Self, LmError> {
        let mut model = Self {
            unigrams: HashMap::new(),
            bigrams: HashMap::new(),
            trigrams: HashMap::new(),
            unknown: logmath.log(settings.unknown_word_prob),
        };
        let mut declared = [0usize; 4];
        let mut seen = [0usize; 4];
        let mut dropped = 0usize;
        let mut section = Section::Preamble;

        for (i, raw) in text.lines().enumerate() {
            let line = raw.trim();
            let line_no = i + 1;
            if line.is_empty() {
                continue;
            }
            if line == "\\data\\" {
                section = Section::Data;
                continue;
            }
            if line == "\\end\\" {
                section = Section::End;
                break;
            }
            if let Some(order) = parse_section_header(line) {
                if !(1..=3).contains(&order) {
                    return Err(LmError::Parse {
                        line: line_no,
                        reason: format!("unsupported n-gram order {order}"),
                    });
                }
                section = Section::Ngrams(order);
                continue;
            }

            match section {
                Section::Preamble | Section::End => {}
                Section::Data => {
                    let Some(spec) = line.strip_prefix("ngram ") else {
                        continue;
                    };
                    let (order, count) = spec.split_once('=').ok_or_else(|| LmError::Parse {
                        line: line_no,
                        reason: format!("bad count line '{line}'"),
                    })?;
                    let order: usize = parse_field(order.trim(), line_no, "order")?;
                    let count: usize = parse_field(count.trim(), line_no, "count")?;
                    if order > 3 {
                        return Err(LmError::Parse {
                            line: line_no,
                            reason: format!("unsupported n-gram order {order}"),
                        });
                    }
                    if order >= 1 {
                        declared[order] = count;
                    }
                }
                Section::Ngrams(order) => {
                    seen[order] += 1;
                    let fields: Vec<&str> = line.split_whitespace().collect();
                    if fields.len() < order + 1 || fields.len() > order + 2 {
                        return Err(LmError::Parse {
                            line: line_no,
                            reason: format!("expected {} or {} fields, got {}", order + 1, order + 2, fields.len()),
                        });
                    }
                    let prob: f64 = parse_field(fields[0], line_no, "probability")?;
                    let backoff: f64 = match fields.get(order + 1) {
                        Some(f) => parse_field(f, line_no, "backoff")?,
                        None => 0.0,
                    };
                    let mut ids = [0 as WordId; 3];
                    let mut known = true;
                    for (slot, word) in ids.iter_mut().zip(&fields[1..=order]) {
                        match dict.word_id(word) {
                            Some(id) => *slot = dict.base_word_id(id),
                            None => known = false,
                        }
                    }
                    if !known {
                        dropped += 1;
                        continue;
                    }
                    let prob = logmath.from_log10(prob);
                    let backoff = logmath.from_log10(backoff);
                    match order {
                        1 => {
                            model.unigrams.insert(ids[0], (prob, backoff));
                        }
                        2 => {
                            model.bigrams.insert((ids[0], ids[1]), (prob, backoff));
                        }
                        _ => {
                            model.trigrams.insert((ids[0], ids[1], ids[2]), prob);
                        }
                    }
                }
            }
        }

        if section != Section::End {
            return Err(LmError::Parse {
                line: text.lines().count(),
                reason: "missing \\end\\ marker".to_string(),
            });
        }
        for order in 1..=3 {
            if declared[order] != seen[order] {
                warn!(order, declared = declared[order], found = seen[order], "n-gram count mismatch");
            }
        }
        debug!(
            unigrams = model.unigrams.len(),
            bigrams = model.bigrams.len(),
            trigrams = model.trigrams.len(),
            dropped,
            "ARPA model loaded"
        );
        Ok(model)
    }

    fn bigram_backoff(&self, w1: WordId, w2: WordId) -> Score {
        self.bigrams.get(&(w1, w2)).map_or(0, |&(_, bo)| bo)
    }
}

fn parse_section_header(line: &str) -> Option<usize> {
    let rest = line.strip_prefix('\\')?.strip_suffix("-grams:")?;
    rest.parse().ok()
}

fn parse_field<T: std::str::FromStr>(s: &str, line: usize, what: &str) -> Result<T, LmError>
where
    T::Err: std::fmt::Display,
{
    s.parse().map_err(|e| LmError::Parse {
        line,
        reason: format!("invalid {what} '{s}': {e}"),
    })
}

impl LanguageModel for NgramModel {
    fn unigram_score(&self, w: WordId) -> Score {
        self.unigrams.get(&w).map_or(self.unknown, |&(p, _)| p)
    }

    fn bigram_score(&self, w1: WordId, w2: WordId) -> Score {
        match self.bigrams.get(&(w1, w2)) {
            Some(&(p, _)) => p,
            None => {
                let backoff = self.unigrams.get(&w1).map_or(0, |&(_, bo)| bo);
                backoff.saturating_add(self.unigram_score(w2))
            }
        }
    }

    fn trigram_score(&self, w1: WordId, w2: WordId, w3: WordId) -> Score {
        match self.trigrams.get(&(w1, w2, w3)) {
            Some(&p) => p,
            None => self
                .bigram_backoff(w1, w2)
                .saturating_add(self.bigram_score(w2, w3)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dict::Vocabulary;
    use crate::settings::Settings;

    const ARPA: &str = "\
\\data\\
ngram 1=5
ngram 2=3
ngram 3=1

\\1-grams:
-1.0 <s> -0.5
-1.0 </s>
-0.5 A -0.3
-0.7 B -0.2
-2.0 ZEBRA

\\2-grams:
-0.2 <s> A -0.1
-0.3 A B
-0.4 B </s>

\\3-grams:
-0.05 <s> A B

\\end\\
";

    fn setup() -> (Vocabulary, LogMath, NgramModel) {
        let settings = Settings::default();
        let logmath = LogMath::new(settings.lm.log_base);
        let vocab = Vocabulary::from_words(&["A", "B", "A(2)"], &["<sil>"], &logmath, &settings.fillers);
        let lm = NgramModel::from_arpa(ARPA, &vocab, &logmath, &settings.lm).unwrap();
        (vocab, logmath, lm)
    }

    #[test]
    fn explicit_ngrams() {
        let (v, lmath, lm) = setup();
        let s = v.start_word();
        let a = v.word_id("A").unwrap();
        let b = v.word_id("B").unwrap();
        assert_eq!(lm.unigram_score(a), lmath.from_log10(-0.5));
        assert_eq!(lm.bigram_score(a, b), lmath.from_log10(-0.3));
        assert_eq!(lm.trigram_score(s, a, b), lmath.from_log10(-0.05));
    }

    #[test]
    fn bigram_backs_off_to_unigram() {
        let (v, lmath, lm) = setup();
        let a = v.word_id("A").unwrap();
        let b = v.word_id("B").unwrap();
        // B A is absent: backoff(B) + P(A)
        assert_eq!(
            lm.bigram_score(b, a),
            lmath.from_log10(-0.2) + lmath.from_log10(-0.5)
        );
    }

    #[test]
    fn trigram_backs_off_through_bigram_weight() {
        let (v, lmath, lm) = setup();
        let s = v.start_word();
        let a = v.word_id("A").unwrap();
        // <s> A A: backoff(<s> A) + P(A | A) where A A backs off to backoff(A) + P(A)
        let expected = lmath.from_log10(-0.1) + lmath.from_log10(-0.3) + lmath.from_log10(-0.5);
        assert_eq!(lm.trigram_score(s, a, a), expected);
    }

    #[test]
    fn unknown_word_uses_floor_probability() {
        let (v, lmath, lm) = setup();
        let settings = Settings::default();
        let sil = v.word_id("<sil>").unwrap();
        assert_eq!(lm.unigram_score(sil), lmath.log(settings.lm.unknown_word_prob));
    }

    #[test]
    fn ngrams_with_unknown_words_are_dropped() {
        let (_, _, lm) = setup();
        assert_eq!(lm.unigrams.len(), 4);
    }

    #[test]
    fn missing_end_marker_is_error() {
        let settings = Settings::default();
        let logmath = LogMath::new(settings.lm.log_base);
        let vocab = Vocabulary::from_words(&["A"], &[], &logmath, &settings.fillers);
        let text = ARPA.replace("\\end\\", "");
        let err = NgramModel::from_arpa(&text, &vocab, &logmath, &settings.lm).unwrap_err();
        assert!(matches!(err, LmError::Parse { .. }));
    }

    #[test]
    fn malformed_probability_reports_line() {
        let settings = Settings::default();
        let logmath = LogMath::new(settings.lm.log_base);
        let vocab = Vocabulary::from_words(&["A"], &[], &logmath, &settings.fillers);
        let text = "\\data\\\nngram 1=1\n\n\\1-grams:\nabc A\n\\end\\\n";
        match NgramModel::from_arpa(text, &vocab, &logmath, &settings.lm) {
            Err(LmError::Parse { line, .. }) => assert_eq!(line, 5),
            other => panic!("expected parse error, got {other:?}"),
        }
    }

    #[test]
    fn four_gram_sections_rejected() {
        let settings = Settings::default();
        let logmath = LogMath::new(settings.lm.log_base);
        let vocab = Vocabulary::from_words(&["A"], &[], &logmath, &settings.fillers);
        let text = "\\data\\\nngram 4=1\n\\end\\\n";
        assert!(NgramModel::from_arpa(text, &vocab, &logmath, &settings.lm).is_err());
    }
}

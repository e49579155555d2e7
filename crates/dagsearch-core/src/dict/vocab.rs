use std::collections::HashMap;
use std::fs;
use std::path::Path;

use tracing::{debug, warn};

use super::{DictError, Dictionary, WordId, FINISH_WORD, SILENCE_WORD, START_WORD};
use crate::logmath::LogMath;
use crate::settings::FillerSettings;
use crate::Score;

#[derive(Debug, Clone)]
struct WordEntry {
    text: String,
    base: WordId,
    filler: bool,
}

/// In-memory dictionary built from a main and a filler pronunciation dictionary.
///
/// Both files use one entry per line: `WORD PHONE PHONE ...`. Alternate
/// pronunciations are written `WORD(2)` and share the base id of `WORD`.
/// Every word of the filler dictionary is a filler except `<s>` and `</s>`.
#[derive(Debug, Clone)]
pub struct Vocabulary {
    words: Vec<WordEntry>,
    index: HashMap<String, WordId>,
    start: WordId,
    finish: WordId,
    silence_penalty: Score,
    filler_penalty: Score,
}

impl Vocabulary {
    pub fn from_text(
        dict_text: &str,
        filler_text: &str,
        logmath: &LogMath,
        fillers: &FillerSettings,
    ) -> Result<Self, DictError> {
        let mut vocab = Self::empty(logmath, fillers);
        vocab.load(dict_text, false)?;
        vocab.load(filler_text, true)?;
        vocab.finish_setup();
        debug!(words = vocab.words.len(), "vocabulary loaded");
        Ok(vocab)
    }

    pub fn open(
        dict_path: &Path,
        filler_path: Option<&Path>,
        logmath: &LogMath,
        fillers: &FillerSettings,
    ) -> Result<Self, DictError> {
        let dict_text = fs::read_to_string(dict_path)?;
        let filler_text = match filler_path {
            Some(p) => fs::read_to_string(p)?,
            None => String::new(),
        };
        Self::from_text(&dict_text, &filler_text, logmath, fillers)
    }

    /// Build directly from word lists, bypassing the text format.
    pub fn from_words(words: &[&str], fillers: &[&str], logmath: &LogMath, settings: &FillerSettings) -> Self {
        let mut vocab = Self::empty(logmath, settings);
        for w in words {
            vocab.insert(w, false);
        }
        for w in fillers {
            vocab.insert(w, true);
        }
        vocab.finish_setup();
        vocab
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    fn empty(logmath: &LogMath, fillers: &FillerSettings) -> Self {
        Self {
            words: Vec::new(),
            index: HashMap::new(),
            start: 0,
            finish: 0,
            silence_penalty: logmath.log(fillers.silence_prob),
            filler_penalty: logmath.log(fillers.filler_prob),
        }
    }

    fn load(&mut self, text: &str, filler: bool) -> Result<(), DictError> {
        for (i, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("##") || line.starts_with(";;") {
                continue;
            }
            let Some(word) = line.split_whitespace().next() else {
                continue;
            };
            if self.index.contains_key(word) {
                warn!(word, line = i + 1, "duplicate dictionary entry ignored");
                continue;
            }
            if let Some(base) = alternate_base(word) {
                if !self.index.contains_key(base) {
                    return Err(DictError::Parse {
                        line: i + 1,
                        reason: format!("alternate '{word}' precedes its base word '{base}'"),
                    });
                }
            }
            self.insert(word, filler);
        }
        Ok(())
    }

    fn insert(&mut self, word: &str, filler: bool) -> WordId {
        if let Some(&id) = self.index.get(word) {
            return id;
        }
        let id = self.words.len() as WordId;
        let base = alternate_base(word)
            .and_then(|b| self.index.get(b).copied())
            .unwrap_or(id);
        let filler = filler && word != START_WORD && word != FINISH_WORD;
        self.words.push(WordEntry {
            text: word.to_string(),
            base,
            filler,
        });
        self.index.insert(word.to_string(), id);
        id
    }

    fn finish_setup(&mut self) {
        self.start = self.insert(START_WORD, false);
        self.finish = self.insert(FINISH_WORD, false);
    }
}

/// `WORD(2)` → `Some("WORD")`.
fn alternate_base(word: &str) -> Option<&str> {
    let open = word.rfind('(')?;
    let inner = word[open + 1..].strip_suffix(')')?;
    if open == 0 || inner.is_empty() || !inner.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some(&word[..open])
}

impl Dictionary for Vocabulary {
    fn word_id(&self, word: &str) -> Option<WordId> {
        self.index.get(word).copied()
    }

    fn word_str(&self, id: WordId) -> Option<&str> {
        self.words.get(id as usize).map(|w| w.text.as_str())
    }

    fn base_word_id(&self, id: WordId) -> WordId {
        self.words.get(id as usize).map_or(id, |w| w.base)
    }

    fn is_filler(&self, id: WordId) -> bool {
        self.words.get(id as usize).is_some_and(|w| w.filler)
    }

    fn filler_penalty(&self, id: WordId) -> Score {
        let base = self.base_word_id(id);
        if self.word_str(base) == Some(SILENCE_WORD) {
            self.silence_penalty
        } else {
            self.filler_penalty
        }
    }

    fn start_word(&self) -> WordId {
        self.start
    }

    fn finish_word(&self) -> WordId {
        self.finish
    }
}

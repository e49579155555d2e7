//! Decoder settings loaded from TOML.
//!
//! - `parse_settings_toml(toml_content)` parses and validates a settings file
//! - `Settings::default()` parses the embedded defaults
//! - Default values are embedded via `include_str!("default_settings.toml")`
//!
//! Settings are plain values handed to each utterance; nothing here is global,
//! so independent searches can run with different budgets in one process.

use serde::Deserialize;

pub const DEFAULT_SETTINGS_TOML: &str = include_str!("default_settings.toml");

/// Returns the embedded default settings TOML content.
pub fn default_toml() -> &'static str {
    DEFAULT_SETTINGS_TOML
}

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("TOML parse error: {0}")]
    Parse(String),
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub dag: DagSettings,
    pub search: SearchSettings,
    pub lm: LmSettings,
    pub fillers: FillerSettings,
}

impl Default for Settings {
    fn default() -> Self {
        parse_settings_toml(DEFAULT_SETTINGS_TOML).expect("embedded settings TOML must be valid")
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DagSettings {
    pub max_edges: usize,
    pub min_ef_range: i32,
    pub fudge: u8,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchSettings {
    pub lm_weight: f64,
    /// Probability charged for every word and filler, applied in log form.
    pub word_insertion_penalty: f64,
    pub max_lm_ops: u64,
    pub max_lm_ops_per_frame: u64,
    pub max_partial_paths: usize,
    pub beam: f64,
    pub nbest: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LmSettings {
    pub log_base: f64,
    pub unknown_word_prob: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FillerSettings {
    pub silence_prob: f64,
    pub filler_prob: f64,
}

pub fn parse_settings_toml(toml_str: &str) -> Result<Settings, SettingsError> {
    let s: Settings = toml::from_str(toml_str).map_err(|e| SettingsError::Parse(e.to_string()))?;
    validate(&s)?;
    Ok(s)
}

fn validate(s: &Settings) -> Result<(), SettingsError> {
    macro_rules! check_positive {
        ($section:ident . $field:ident) => {
            if s.$section.$field <= Default::default() {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        };
    }
    macro_rules! check_probability {
        ($section:ident . $field:ident) => {
            if !(s.$section.$field > 0.0 && s.$section.$field <= 1.0) {
                return Err(SettingsError::InvalidValue {
                    field: concat!(stringify!($section), ".", stringify!($field)).to_string(),
                    reason: "must be in (0, 1]".to_string(),
                });
            }
        };
    }

    check_positive!(dag.max_edges);
    check_positive!(dag.min_ef_range);
    if s.dag.fudge > 2 {
        return Err(SettingsError::InvalidValue {
            field: "dag.fudge".to_string(),
            reason: "must be in 0..=2".to_string(),
        });
    }

    check_positive!(search.lm_weight);
    check_probability!(search.word_insertion_penalty);
    check_positive!(search.max_lm_ops);
    check_positive!(search.max_partial_paths);
    check_positive!(search.nbest);
    check_probability!(search.beam);

    if s.lm.log_base <= 1.0 {
        return Err(SettingsError::InvalidValue {
            field: "lm.log_base".to_string(),
            reason: "must be greater than 1.0".to_string(),
        });
    }
    check_probability!(lm.unknown_word_prob);

    check_probability!(fillers.silence_prob);
    check_probability!(fillers.filler_prob);

    Ok(())
}

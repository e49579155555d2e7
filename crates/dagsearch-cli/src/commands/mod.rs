//! Subcommand implementations for `dagtool`.

pub mod config_ops;
pub mod decode_ops;
pub mod info_ops;

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use dagsearch::dag::{BuildOptions, DagError, Lattice};
use dagsearch::dict::{DictError, Vocabulary};
use dagsearch::lm::{FlatModel, LanguageModel, LmError, NgramModel};
use dagsearch::logmath::LogMath;
use dagsearch::search::{Scorer, SearchError};
use dagsearch::settings::{self, Settings, SettingsError};

/// Relative log-base difference tolerated between a lattice and the models.
const LOG_BASE_TOLERANCE: f64 = 1e-4;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("reading {}: {source}", .path.display())]
    Read { path: PathBuf, source: io::Error },

    #[error("writing {}: {source}", .path.display())]
    Write { path: PathBuf, source: io::Error },

    #[error(transparent)]
    Settings(#[from] SettingsError),

    #[error(transparent)]
    Dict(#[from] DictError),

    #[error(transparent)]
    Lm(#[from] LmError),

    #[error(transparent)]
    Dag(#[from] DagError),

    #[error(transparent)]
    Search(#[from] SearchError),
}

/// Model files named on the command line.
#[derive(Debug, Clone, Copy)]
pub struct ModelPaths<'a> {
    pub dict: &'a Path,
    pub fillers: Option<&'a Path>,
    /// Without an LM, lattices are rescored on acoustic scores alone.
    pub lm: Option<&'a Path>,
    pub settings: Option<&'a Path>,
}

/// Everything loaded once and shared by every utterance of a run.
pub struct Resources {
    pub settings: Settings,
    pub logmath: LogMath,
    pub vocab: Vocabulary,
    pub lm: Box<dyn LanguageModel>,
}

impl Resources {
    pub fn load(paths: &ModelPaths<'_>) -> Result<Self, CliError> {
        let settings = match paths.settings {
            Some(p) => {
                let text = fs::read_to_string(p).map_err(|source| CliError::Read {
                    path: p.to_path_buf(),
                    source,
                })?;
                settings::parse_settings_toml(&text)?
            }
            None => Settings::default(),
        };
        let logmath = LogMath::new(settings.lm.log_base);
        let vocab = Vocabulary::open(paths.dict, paths.fillers, &logmath, &settings.fillers)?;
        let lm: Box<dyn LanguageModel> = match paths.lm {
            Some(p) => Box::new(NgramModel::open(p, &vocab, &logmath, &settings.lm)?),
            None => Box::new(FlatModel(0)),
        };
        info!(words = vocab.len(), with_lm = paths.lm.is_some(), "resources loaded");
        Ok(Self {
            settings,
            logmath,
            vocab,
            lm,
        })
    }

    pub fn build_options(&self) -> BuildOptions {
        BuildOptions::from_settings(&self.settings)
    }

    pub fn scorer(&self) -> Scorer<'_> {
        Scorer::from_settings(&*self.lm, &self.vocab, &self.settings.search, &self.logmath)
    }

    /// Read a lattice, warning when its declared log base differs from ours.
    pub fn read_lattice(&self, path: &Path) -> Result<Lattice, CliError> {
        let lattice = Lattice::open(path, &self.vocab)?;
        if let Some(base) = lattice.log_base {
            let ours = self.logmath.base();
            if ((base - ours) / ours).abs() > LOG_BASE_TOLERANCE {
                warn!(path = %path.display(), lattice = base, models = ours, "log base mismatch");
            }
        }
        Ok(lattice)
    }
}

/// One utterance to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub id: String,
    pub path: PathBuf,
}

impl Utterance {
    pub fn from_path(path: &Path) -> Self {
        let id = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self {
            id,
            path: path.to_path_buf(),
        }
    }
}

/// Parse a control file: one utterance per line, the first field naming the
/// lattice `<dir>/<field>.<ext>`. Blank lines and `#` comments are skipped.
pub fn parse_control(text: &str, dir: &Path, ext: &str) -> Vec<Utterance> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter_map(|l| l.split_whitespace().next())
        .map(|name| {
            let path = dir.join(format!("{name}.{ext}"));
            let id = Path::new(name)
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.to_string());
            Utterance { id, path }
        })
        .collect()
}

/// Where a run's lattices come from.
#[derive(Debug, Clone)]
pub struct InputSpec<'a> {
    pub lattices: &'a [PathBuf],
    pub control: Option<&'a Path>,
    pub lattice_dir: &'a Path,
    pub lattice_ext: &'a str,
}

impl InputSpec<'_> {
    pub fn utterances(&self) -> Result<Vec<Utterance>, CliError> {
        let mut out: Vec<Utterance> = self.lattices.iter().map(|p| Utterance::from_path(p)).collect();
        if let Some(ctl) = self.control {
            let text = fs::read_to_string(ctl).map_err(|source| CliError::Read {
                path: ctl.to_path_buf(),
                source,
            })?;
            out.extend(parse_control(&text, self.lattice_dir, self.lattice_ext));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_file() {
        let text = "\
# batch 1
spk1/utt1 0 200
utt2

spk2/utt3
";
        let utts = parse_control(text, Path::new("/lat"), "lat");
        assert_eq!(
            utts,
            vec![
                Utterance {
                    id: "utt1".into(),
                    path: PathBuf::from("/lat/spk1/utt1.lat"),
                },
                Utterance {
                    id: "utt2".into(),
                    path: PathBuf::from("/lat/utt2.lat"),
                },
                Utterance {
                    id: "utt3".into(),
                    path: PathBuf::from("/lat/spk2/utt3.lat"),
                },
            ]
        );
    }

    #[test]
    fn test_utterance_id_from_path() {
        let utt = Utterance::from_path(Path::new("/data/lat/an4_01.lat"));
        assert_eq!(utt.id, "an4_01");
    }
}

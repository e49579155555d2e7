use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process;

use tracing::{info, info_span, warn};

use dagsearch::dag::Dag;
use dagsearch::search::{best_path, compute_heuristic, AstarConfig, AstarSession, Hypothesis, SearchError, SearchStats};

use super::{CliError, InputSpec, ModelPaths, Resources, Utterance};
use crate::output::{format_hypothesis, write_nbest, NbestHeader, UtteranceJson};

macro_rules! die {
    ($result:expr, $($arg:tt)*) => {
        $result.unwrap_or_else(|e| {
            eprintln!($($arg)*, e);
            process::exit(1);
        })
    };
}

#[derive(Debug, Clone)]
pub enum Mode {
    BestPath,
    /// Up to `n` hypotheses; with `out_dir`, also written as `<id>.nbest`.
    Nbest { n: usize, out_dir: Option<PathBuf> },
}

#[derive(Debug)]
pub struct Decoded {
    pub hypotheses: Vec<Hypothesis>,
    pub stats: Option<SearchStats>,
}

/// Decode one lattice. Every failure is confined to this utterance.
pub fn decode_utterance(res: &Resources, utt: &Utterance, mode: &Mode) -> Result<Decoded, CliError> {
    let _span = info_span!("utterance", id = %utt.id).entered();
    let lattice = res.read_lattice(&utt.path)?;
    let mut dag = Dag::build(&lattice, &res.vocab, &res.build_options())?;
    let scorer = res.scorer();

    let decoded = match mode {
        Mode::BestPath => Decoded {
            hypotheses: vec![best_path(&mut dag, &scorer)?],
            stats: None,
        },
        Mode::Nbest { n, out_dir } => {
            compute_heuristic(&mut dag, &scorer)?;
            let config = AstarConfig::from_settings(&res.settings, &res.logmath);
            let header_beam = config.beam;
            let mut session = AstarSession::new(&dag, scorer, config)?;
            let hypotheses = harvest(&mut session, *n)?;
            if let Some(dir) = out_dir {
                let header = NbestHeader {
                    utterance: &utt.id,
                    frames: dag.frames(),
                    log_base: res.logmath.base(),
                    lm_weight: res.settings.search.lm_weight,
                    beam: res.settings.search.beam,
                    beam_score: header_beam,
                };
                let path = dir.join(format!("{}.nbest", utt.id));
                write_nbest_file(&path, &header, &hypotheses, res)?;
                info!(path = %path.display(), "N-best list written");
            }
            Decoded {
                hypotheses,
                stats: Some(session.stats().clone()),
            }
        }
    };

    info!(
        frames = dag.frames(),
        nodes = dag.node_count(),
        links = dag.link_count(),
        bypass_links = dag.bypass_count(),
        hypotheses = decoded.hypotheses.len(),
        best = decoded.hypotheses.first().map(|h| h.score),
        "utterance decoded"
    );
    Ok(decoded)
}

/// Up to `n` hypotheses. A search that runs out of budget after finding
/// some keeps what it found.
fn harvest(session: &mut AstarSession<'_>, n: usize) -> Result<Vec<Hypothesis>, CliError> {
    let mut hyps = Vec::new();
    while hyps.len() < n {
        match session.next_hypothesis() {
            Ok(Some(hyp)) => hyps.push(hyp),
            Ok(None) => break,
            Err(e) if !hyps.is_empty() => {
                warn!(error = %e, found = hyps.len(), "N-best search stopped early");
                break;
            }
            Err(e) => return Err(e.into()),
        }
    }
    if hyps.is_empty() {
        return Err(SearchError::NoPath.into());
    }
    Ok(hyps)
}

fn write_nbest_file(
    path: &std::path::Path,
    header: &NbestHeader<'_>,
    hyps: &[Hypothesis],
    res: &Resources,
) -> Result<(), CliError> {
    let wrap = |source: io::Error| CliError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(wrap)?;
    }
    let mut w = BufWriter::new(File::create(path).map_err(wrap)?);
    write_nbest(&mut w, header, hyps, &res.vocab).map_err(wrap)?;
    w.flush().map_err(wrap)
}

/// Print one decoded utterance: a JSON line, or text lines.
pub fn print_decoded(
    out: &mut dyn Write,
    res: &Resources,
    utt: &Utterance,
    decoded: &Decoded,
    json: bool,
) -> io::Result<()> {
    if json {
        let record = UtteranceJson::new(&utt.id, &decoded.hypotheses, &res.vocab, decoded.stats.as_ref());
        let line = serde_json::to_string(&record).map_err(io::Error::other)?;
        return writeln!(out, "{line}");
    }
    match decoded.hypotheses.as_slice() {
        [only] if decoded.stats.is_none() => {
            writeln!(out, "{} {}", utt.id, format_hypothesis(only, &res.vocab))
        }
        hyps => {
            writeln!(out, "{}", utt.id)?;
            for (i, hyp) in hyps.iter().enumerate() {
                writeln!(out, "#{:>2}: {}", i + 1, format_hypothesis(hyp, &res.vocab))?;
            }
            Ok(())
        }
    }
}

/// Decode every utterance, reporting failures and carrying on. Exits with
/// status 1 only when nothing could be decoded.
pub fn decode_cmd(models: &ModelPaths<'_>, input: &InputSpec<'_>, mode: &Mode, json: bool) {
    let res = die!(Resources::load(models), "Error loading models: {}");
    let utts = die!(input.utterances(), "Error: {}");
    if utts.is_empty() {
        eprintln!("Error: no lattices given");
        process::exit(2);
    }

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let mut failed = 0usize;
    for utt in &utts {
        match decode_utterance(&res, utt, mode) {
            Ok(decoded) => {
                die!(print_decoded(&mut out, &res, utt, &decoded, json), "Error writing output: {}");
            }
            Err(e) => {
                failed += 1;
                warn!(utterance = %utt.id, error = %e, "utterance failed");
                eprintln!("{}: {e}", utt.id);
            }
        }
    }
    die!(out.flush(), "Error writing output: {}");

    info!(utterances = utts.len(), failed, "batch finished");
    if failed > 0 {
        eprintln!("{failed} of {} utterances failed", utts.len());
        if failed == utts.len() {
            process::exit(1);
        }
    }
}

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

use dagsearch_cli::commands::decode_ops::{self, Mode};
use dagsearch_cli::commands::{config_ops, info_ops, InputSpec, ModelPaths};

#[derive(Parser)]
#[command(name = "dagtool", version = dagsearch::version(), about = "Word-lattice rescoring tool")]
struct Cli {
    /// Write JSON trace logs to this directory instead of stderr (needs the `trace` feature)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,
    /// Log engine debug events
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct ModelArgs {
    /// Main pronunciation dictionary
    #[arg(long)]
    dict: PathBuf,
    /// Filler dictionary
    #[arg(long)]
    fdict: Option<PathBuf>,
    /// ARPA trigram language model (omit to rescore on acoustics alone)
    #[arg(long)]
    lm: Option<PathBuf>,
    /// Settings TOML (defaults to the built-in settings)
    #[arg(long)]
    settings: Option<PathBuf>,
}

impl ModelArgs {
    fn paths(&self) -> ModelPaths<'_> {
        ModelPaths {
            dict: &self.dict,
            fillers: self.fdict.as_deref(),
            lm: self.lm.as_deref(),
            settings: self.settings.as_deref(),
        }
    }
}

#[derive(Args)]
struct InputArgs {
    /// Lattice files
    lattices: Vec<PathBuf>,
    /// Control file listing utterances, one per line
    #[arg(long)]
    ctl: Option<PathBuf>,
    /// Directory holding the lattices named in the control file
    #[arg(long, default_value = ".")]
    lattice_dir: PathBuf,
    /// Lattice file extension for control-file entries
    #[arg(long, default_value = "lat")]
    lattice_ext: String,
}

impl InputArgs {
    fn spec(&self) -> InputSpec<'_> {
        InputSpec {
            lattices: &self.lattices,
            control: self.ctl.as_deref(),
            lattice_dir: &self.lattice_dir,
            lattice_ext: &self.lattice_ext,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Rescore lattices and print the single best hypothesis
    Bestpath {
        #[command(flatten)]
        models: ModelArgs,
        #[command(flatten)]
        input: InputArgs,
        /// Output JSON lines instead of text
        #[arg(long)]
        json: bool,
    },
    /// Rescore lattices and print the N best hypotheses
    Nbest {
        #[command(flatten)]
        models: ModelArgs,
        #[command(flatten)]
        input: InputArgs,
        /// Number of hypotheses (defaults to search.nbest from the settings)
        #[arg(short, long)]
        n: Option<usize>,
        /// Also write `<utterance>.nbest` files into this directory
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Output JSON lines instead of text
        #[arg(long)]
        json: bool,
    },
    /// Show the DAG built from a lattice
    Info {
        #[command(flatten)]
        models: ModelArgs,
        /// Lattice file
        lattice: PathBuf,
        /// Output as JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Drop unreachable nodes and write the lattice back out
    Rewrite {
        #[command(flatten)]
        models: ModelArgs,
        /// Input lattice file
        lattice: PathBuf,
        /// Output lattice file
        output: PathBuf,
    },
    /// Export default settings as TOML
    SettingsExport,
    /// Validate a custom settings TOML file
    SettingsValidate {
        /// Path to the TOML file
        file: String,
    },
}

fn main() {
    let cli = Cli::parse();
    dagsearch::trace_init::init_tracing(cli.log_dir.as_deref(), cli.verbose);

    match cli.command {
        Command::Bestpath {
            models,
            input,
            json,
        } => decode_ops::decode_cmd(&models.paths(), &input.spec(), &Mode::BestPath, json),
        Command::Nbest {
            models,
            input,
            n,
            out_dir,
            json,
        } => {
            let n = n.unwrap_or_else(|| nbest_default(models.settings.as_deref()));
            let mode = Mode::Nbest { n, out_dir };
            decode_ops::decode_cmd(&models.paths(), &input.spec(), &mode, json);
        }
        Command::Info {
            models,
            lattice,
            json,
        } => info_ops::info_cmd(&models.paths(), &lattice, json),
        Command::Rewrite {
            models,
            lattice,
            output,
        } => info_ops::rewrite_cmd(&models.paths(), &lattice, &output),
        Command::SettingsExport => config_ops::settings_export(),
        Command::SettingsValidate { file } => config_ops::settings_validate(&file),
    }
}

/// `search.nbest` from the given settings file, or the built-in default.
/// An unreadable file falls back too; the decode reports it properly.
fn nbest_default(settings: Option<&Path>) -> usize {
    settings
        .and_then(|p| std::fs::read_to_string(p).ok())
        .and_then(|text| dagsearch::settings::parse_settings_toml(&text).ok())
        .unwrap_or_default()
        .search
        .nbest
}

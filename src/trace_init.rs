//! Process-wide `tracing` setup for the command-line tools.
//!
//! With a log directory, events go to `dagsearch-trace.jsonl` there as JSON
//! lines with span close timings. Without one, they go to stderr in the
//! compact text format. `RUST_LOG` overrides the default filter in both cases.

#[cfg(feature = "trace")]
use std::path::Path;
#[cfg(feature = "trace")]
use std::sync::Once;

#[cfg(feature = "trace")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "trace")]
use tracing_subscriber::EnvFilter;

#[cfg(feature = "trace")]
static INIT: Once = Once::new();

#[cfg(feature = "trace")]
fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("dagsearch_core=debug,dagsearch_cli=debug")
        } else {
            EnvFilter::new("dagsearch_core=warn,dagsearch_cli=info")
        }
    })
}

/// Install the global subscriber. Later calls are ignored.
#[cfg(feature = "trace")]
pub fn init_tracing(log_dir: Option<&Path>, verbose: bool) {
    INIT.call_once(|| match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::never(dir, "dagsearch-trace.jsonl");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            // Flushed at process exit; a batch run never drops it earlier.
            std::mem::forget(guard);
            tracing_subscriber::fmt()
                .json()
                .with_writer(writer)
                .with_target(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_env_filter(filter(verbose))
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .compact()
                .with_writer(std::io::stderr)
                .with_target(false)
                .with_env_filter(filter(verbose))
                .init();
        }
    });
}

#[cfg(not(feature = "trace"))]
pub fn init_tracing(_log_dir: Option<&std::path::Path>, _verbose: bool) {}

//! Word-lattice rescoring: DAG best path and A* N-best search.
//!
//! This facade re-exports the engine crate and owns process-level logging
//! setup. See `dagsearch_core` for the engine itself.

pub mod trace_init;

pub use dagsearch_core::*;

/// Engine version reported by the command-line tools.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

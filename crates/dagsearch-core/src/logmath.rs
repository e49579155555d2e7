//! Integer log-domain arithmetic.
//!
//! All scores in the engine are integers in `log_base` units: a probability
//! `p` is represented as `round(ln(p) / ln(base))`. With a base close to 1
//! (1.0003 by default) this keeps useful precision in 32-bit integers.

use crate::Score;

/// Score used for impossible events. Far enough from `i32::MIN` that a few
/// of them can be summed without overflow.
pub const LOG_ZERO: Score = -0x3800_0000;

#[derive(Debug, Clone, Copy)]
pub struct LogMath {
    base: f64,
    inv_ln_base: f64,
}

impl LogMath {
    pub fn new(base: f64) -> Self {
        debug_assert!(base > 1.0, "log base must exceed 1.0");
        Self {
            base,
            inv_ln_base: 1.0 / base.ln(),
        }
    }

    pub fn base(&self) -> f64 {
        self.base
    }

    /// Log of a probability (or any positive ratio).
    pub fn log(&self, p: f64) -> Score {
        if p <= 0.0 {
            return LOG_ZERO;
        }
        self.clamp(p.ln() * self.inv_ln_base)
    }

    /// Convert a base-10 log (as found in ARPA files) to engine units.
    pub fn from_log10(&self, log10: f64) -> Score {
        self.clamp(log10 * std::f64::consts::LN_10 * self.inv_ln_base)
    }

    /// Convert engine units back to a natural log.
    pub fn to_ln(&self, score: Score) -> f64 {
        score as f64 / self.inv_ln_base
    }

    fn clamp(&self, v: f64) -> Score {
        let v = v.round();
        if v < LOG_ZERO as f64 {
            LOG_ZERO
        } else if v > i32::MAX as f64 {
            i32::MAX
        } else {
            v as Score
        }
    }
}

//! Error types for the localization filter

use thiserror::Error;

/// Errors surfaced by the particle filter and its supporting modules.
///
/// Contract violations are checked before any state is touched, so a filter that returned an
/// error is left exactly as it was before the call.
#[derive(Error, Debug)]
pub enum FilterError {
    #[error("particle filter has not been initialized")]
    NotInitialized,

    #[error("invalid argument `{name}` = {value}: {reason}")]
    InvalidArgument {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("expected {expected} weights, got {actual}")]
    WeightMismatch { expected: usize, actual: usize },

    #[error("resampling failed: {0}")]
    Resampling(String),

    #[error("unknown sense axis '{0}', expected X or Y")]
    UnknownAxis(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<csv::Error> for FilterError {
    fn from(e: csv::Error) -> Self {
        FilterError::Io(std::io::Error::other(e))
    }
}

impl From<rand::distr::weighted::Error> for FilterError {
    fn from(e: rand::distr::weighted::Error) -> Self {
        FilterError::Resampling(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, FilterError>;

/// Require a finite, strictly positive value.
pub(crate) fn ensure_positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(FilterError::InvalidArgument {
            name,
            value,
            reason: "must be finite and strictly positive",
        })
    }
}

/// Require a finite, non-negative value. Used for standard deviations that may legitimately be
/// zero (a perfectly known prior or a noiseless motion model).
pub(crate) fn ensure_non_negative(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(FilterError::InvalidArgument {
            name,
            value,
            reason: "must be finite and non-negative",
        })
    }
}

/// Require a finite value.
pub(crate) fn ensure_finite(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(FilterError::InvalidArgument {
            name,
            value,
            reason: "must be finite",
        })
    }
}

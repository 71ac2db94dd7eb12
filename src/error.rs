use thiserror::Error;

use crate::preprocess::EyeLabel;

// ---------------------------------------------------------------------------
// InvalidInput – every hard failure of the core
// ---------------------------------------------------------------------------

/// Input that the pipeline refuses to process.
///
/// All variants are raised before any numeric work starts, so an `Err` never
/// comes with partial output. Poor data quality is *not* an error; see
/// [`crate::preprocess::Reconstruction::Degraded`].
#[derive(Debug, Error, Clone, PartialEq)]
pub enum InvalidInput {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unknown configuration key: {0}")]
    UnknownConfigKey(String),
    #[error("invalid channel: {0}")]
    InvalidChannel(String),
    #[error("channel '{0}' not found in session")]
    MissingChannel(String),
    #[error("cannot combine eyes: both channels are labelled '{0}'")]
    SameEye(EyeLabel),
    #[error("cannot combine eyes: sample rates differ ({left} Hz vs {right} Hz)")]
    SampleRateMismatch { left: f64, right: f64 },
    #[error("cannot combine eyes: units differ ('{left}' vs '{right}')")]
    UnitMismatch { left: String, right: String },
    #[error("cannot combine eyes: lengths differ ({left} vs {right} samples)")]
    LengthMismatch { left: usize, right: usize },
    #[error("invalid segment #{index}: {reason}")]
    InvalidSegment { index: usize, reason: String },
}

pub type Result<T> = std::result::Result<T, InvalidInput>;

impl InvalidInput {
    /// Map a serde_json error from a `deny_unknown_fields` struct onto the
    /// matching variant.
    pub(crate) fn from_config_error(err: &serde_json::Error) -> Self {
        let msg = err.to_string();
        match msg.strip_prefix("unknown field `") {
            Some(rest) => {
                let key = rest.split('`').next().unwrap_or(rest);
                InvalidInput::UnknownConfigKey(key.to_string())
            }
            None => InvalidInput::InvalidConfig(msg),
        }
    }
}

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{InvalidInput, Result};

use super::segments::SegmentRecord;

// ---------------------------------------------------------------------------
// Eye labels and roles
// ---------------------------------------------------------------------------

/// Which eye a raw recording belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EyeLabel {
    #[serde(rename = "l")]
    Left,
    #[serde(rename = "r")]
    Right,
}

impl EyeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            EyeLabel::Left => "l",
            EyeLabel::Right => "r",
        }
    }

    /// Infer the eye from a chantype such as `pupil_l` or `pupil_r`.
    pub fn from_chantype(chantype: &str) -> Option<Self> {
        if chantype.ends_with("_l") {
            Some(EyeLabel::Left)
        } else if chantype.ends_with("_r") {
            Some(EyeLabel::Right)
        } else {
            None
        }
    }
}

impl fmt::Display for EyeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical origin of a signal value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EyeRole {
    SingleEye(EyeLabel),
    Combined,
}

impl Serialize for EyeRole {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl fmt::Display for EyeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EyeRole::SingleEye(label) => write!(f, "{label}"),
            EyeRole::Combined => f.write_str("lr"),
        }
    }
}

// ---------------------------------------------------------------------------
// RawChannel – one eye's recording, never mutated
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct RawChannel {
    pub sample_rate: f64,
    pub unit: String,
    pub values: Vec<f64>,
    pub eye: EyeLabel,
}

impl RawChannel {
    pub fn new(sample_rate: f64, unit: impl Into<String>, values: Vec<f64>, eye: EyeLabel) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(InvalidInput::InvalidChannel(format!(
                "sample rate must be positive, got {sample_rate}"
            )));
        }
        Ok(Self {
            sample_rate,
            unit: unit.into(),
            values,
            eye,
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Time of sample `i` in seconds.
    #[inline]
    pub fn time_of(&self, i: usize) -> f64 {
        i as f64 / self.sample_rate
    }
}

// ---------------------------------------------------------------------------
// ValidityMask
// ---------------------------------------------------------------------------

/// Per-sample validity flags, index-aligned with the raw series.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidityMask(Vec<bool>);

impl ValidityMask {
    pub fn new(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn valid_count(&self) -> usize {
        self.0.iter().filter(|&&v| v).count()
    }

    /// Fraction of valid samples; `0.0` for an empty mask.
    pub fn fraction_valid(&self) -> f64 {
        if self.0.is_empty() {
            0.0
        } else {
            self.valid_count() as f64 / self.0.len() as f64
        }
    }
}

// ---------------------------------------------------------------------------
// ValidSampleInfo
// ---------------------------------------------------------------------------

/// The valid-only subset of a raw series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidSampleInfo {
    /// Source sample rate the indices refer to.
    pub sample_rate: f64,
    /// Length of the raw series.
    pub source_len: usize,
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
    pub fraction_valid: f64,
}

impl ValidSampleInfo {
    /// Samples beyond the shorter of `raw` and `mask` count as invalid.
    pub fn from_mask(raw: &RawChannel, mask: &ValidityMask) -> Self {
        let (indices, values): (Vec<usize>, Vec<f64>) = raw
            .values
            .iter()
            .zip(mask.as_slice())
            .enumerate()
            .filter(|(_, (_, &ok))| ok)
            .map(|(i, (&v, _))| (i, v))
            .unzip();
        let fraction_valid = if raw.is_empty() {
            0.0
        } else {
            indices.len() as f64 / raw.len() as f64
        };
        Self {
            sample_rate: raw.sample_rate,
            source_len: raw.len(),
            indices,
            values,
            fraction_valid,
        }
    }
}

// ---------------------------------------------------------------------------
// SmoothSignal and the reconstruction outcome
// ---------------------------------------------------------------------------

/// A reconstructed signal on a uniform output grid. `None` marks missing data.
#[derive(Debug, Clone, PartialEq)]
pub struct SmoothSignal {
    pub role: EyeRole,
    pub sample_rate: f64,
    pub values: Vec<Option<f64>>,
    pub valid_samples: BTreeMap<EyeLabel, ValidSampleInfo>,
    /// Single-eye reconstructions that make up a combined signal.
    pub per_eye: BTreeMap<EyeLabel, Vec<Option<f64>>>,
    pub segments: Vec<SegmentRecord>,
}

impl SmoothSignal {
    /// A signal of `len` missing markers.
    pub fn missing(role: EyeRole, sample_rate: f64, len: usize) -> Self {
        Self {
            role,
            sample_rate,
            values: vec![None; len],
            valid_samples: BTreeMap::new(),
            per_eye: BTreeMap::new(),
            segments: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Why a reconstruction fell back to an all-missing signal.
#[derive(Debug, Clone, PartialEq)]
pub enum DataQuality {
    InsufficientValidSamples { valid: usize },
    EmptyInterior,
    NonFiniteOutput,
    BothEyesDegraded,
}

impl fmt::Display for DataQuality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataQuality::InsufficientValidSamples { valid } => {
                write!(f, "only {valid} valid sample(s), at least 2 are needed for interpolation")
            }
            DataQuality::EmptyInterior => {
                f.write_str("valid samples span less than one output sample")
            }
            DataQuality::NonFiniteOutput => {
                f.write_str("interpolation produced non-finite values")
            }
            DataQuality::BothEyesDegraded => {
                f.write_str("neither eye could be reconstructed")
            }
        }
    }
}

/// Result of reconstructing one signal.
#[derive(Debug, Clone, PartialEq)]
pub enum Reconstruction {
    Success(SmoothSignal),
    Degraded(SmoothSignal, DataQuality),
}

impl Reconstruction {
    pub fn signal(&self) -> &SmoothSignal {
        match self {
            Reconstruction::Success(s) | Reconstruction::Degraded(s, _) => s,
        }
    }

    pub fn signal_mut(&mut self) -> &mut SmoothSignal {
        match self {
            Reconstruction::Success(s) | Reconstruction::Degraded(s, _) => s,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Reconstruction::Degraded(..))
    }

    pub fn degradation(&self) -> Option<&DataQuality> {
        match self {
            Reconstruction::Success(_) => None,
            Reconstruction::Degraded(_, reason) => Some(reason),
        }
    }
}

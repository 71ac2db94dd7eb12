use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{InvalidInput, Result};
use crate::pipeline::Processed;
use crate::preprocess::{EyeLabel, EyeRole, RawChannel, SegmentRecord, ValidSampleInfo};

/// Chantype of a combined-eye output channel.
pub const COMBINED_CHANTYPE: &str = "pupil_lr_pp";

// ---------------------------------------------------------------------------
// ChannelRecord – one stored channel
// ---------------------------------------------------------------------------

/// A channel as stored in a session file. `None` values are missing samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRecord {
    pub chantype: String,
    pub sample_rate: f64,
    #[serde(default)]
    pub unit: String,
    pub values: Vec<Option<f64>>,
    /// Free-form header; derived channels carry a [`ChannelHeader`] here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header: Option<JsonValue>,
}

/// Header written alongside every derived channel.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelHeader<'a> {
    pub valid_samples: &'a BTreeMap<EyeLabel, ValidSampleInfo>,
    pub segments: &'a [SegmentRecord],
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degraded: Option<String>,
}

impl ChannelRecord {
    /// Interpret this record as one eye's raw recording. Missing values
    /// become NaN and are rejected by the range filter.
    pub fn to_raw(&self) -> Result<RawChannel> {
        let eye = EyeLabel::from_chantype(&self.chantype).ok_or_else(|| {
            InvalidInput::InvalidChannel(format!(
                "cannot tell which eye '{}' belongs to",
                self.chantype
            ))
        })?;
        let values = self
            .values
            .iter()
            .map(|v| v.unwrap_or(f64::NAN))
            .collect();
        RawChannel::new(self.sample_rate, self.unit.clone(), values, eye)
    }

    /// Build the derived channel for `processed`, named after `source`.
    pub fn from_processed(processed: &Processed, source: &ChannelRecord) -> Self {
        let signal = processed.reconstruction.signal();
        let chantype = match signal.role {
            EyeRole::SingleEye(_) => format!("{}_pp", source.chantype),
            EyeRole::Combined => COMBINED_CHANTYPE.to_string(),
        };
        let header = ChannelHeader {
            valid_samples: &signal.valid_samples,
            segments: &signal.segments,
            degraded: processed.reconstruction.degradation().map(|d| d.to_string()),
        };
        ChannelRecord {
            chantype,
            sample_rate: signal.sample_rate,
            unit: source.unit.clone(),
            values: signal.values.clone(),
            header: Some(serde_json::to_value(&header).unwrap_or(JsonValue::Null)),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Session – ordered list of channels from one recording
// ---------------------------------------------------------------------------

/// How a derived channel is written into a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteMode {
    /// Append as a new channel.
    #[default]
    Add,
    /// Overwrite the last channel of the same chantype, or append if none.
    Replace,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub channels: Vec<ChannelRecord>,
}

impl Session {
    /// First channel with the given chantype.
    pub fn find(&self, chantype: &str) -> Result<&ChannelRecord> {
        self.channels
            .iter()
            .find(|c| c.chantype == chantype)
            .ok_or_else(|| InvalidInput::MissingChannel(chantype.to_string()))
    }

    /// Store `record` and return its index.
    pub fn write_channel(&mut self, record: ChannelRecord, mode: WriteMode) -> usize {
        let existing = match mode {
            WriteMode::Add => None,
            WriteMode::Replace => self
                .channels
                .iter()
                .rposition(|c| c.chantype == record.chantype),
        };
        match existing {
            Some(i) => {
                self.channels[i] = record;
                i
            }
            None => {
                self.channels.push(record);
                self.channels.len() - 1
            }
        }
    }
}

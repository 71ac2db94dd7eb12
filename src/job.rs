use std::path::PathBuf;

use log::info;
use serde::Deserialize;

use crate::config::{SettingsOverride, ValiditySettings};
use crate::data::model::{ChannelRecord, Session, WriteMode};
use crate::error::{InvalidInput, Result};
use crate::pipeline::{preprocess, EyeInput, Processed};
use crate::preprocess::{parse_segments, Segment, SegmentSpec};

fn default_channel() -> String {
    "pupil_l".to_string()
}

/// A job file as written by the user.
///
/// ```json
/// {
///   "channel": "pupil_r",
///   "combine": false,
///   "mode": "replace",
///   "settings": { "range": { "max": 8.0 } },
///   "segments": [ { "start": 0, "end": 10, "name": "baseline" } ],
///   "segmentsCsv": "stats.csv"
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobFile {
    #[serde(default = "default_channel")]
    pub channel: String,
    #[serde(default)]
    pub combine: bool,
    #[serde(default)]
    pub mode: WriteMode,
    #[serde(default)]
    pub settings: SettingsOverride,
    #[serde(default)]
    pub segments: Vec<SegmentSpec>,
    pub segments_csv: Option<PathBuf>,
}

impl Default for JobFile {
    fn default() -> Self {
        Self {
            channel: default_channel(),
            combine: false,
            mode: WriteMode::Add,
            settings: SettingsOverride::default(),
            segments: Vec::new(),
            segments_csv: None,
        }
    }
}

/// A validated job.
#[derive(Debug, Clone)]
pub struct Job {
    pub channel: String,
    pub combine: bool,
    pub mode: WriteMode,
    pub settings: ValiditySettings,
    pub segments: Vec<Segment>,
    pub segments_csv: Option<PathBuf>,
}

impl JobFile {
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| InvalidInput::from_config_error(&e))
    }

    pub fn resolve(&self) -> Result<Job> {
        Ok(Job {
            channel: self.channel.clone(),
            combine: self.combine,
            mode: self.mode,
            settings: ValiditySettings::resolve(&self.settings)?,
            segments: parse_segments(&self.segments)?,
            segments_csv: self.segments_csv.clone(),
        })
    }
}

/// Run `job` on `session` and write the derived channel back into it.
///
/// Returns the pipeline output and the index of the written channel.
pub fn run_job(session: &mut Session, job: &Job) -> Result<(Processed, usize)> {
    let (input, source) = if job.combine {
        let left = session.find("pupil_l")?;
        let right = session.find("pupil_r")?;
        (EyeInput::Pair(left.to_raw()?, right.to_raw()?), left.clone())
    } else {
        let channel = session.find(&job.channel)?;
        (EyeInput::Single(channel.to_raw()?), channel.clone())
    };

    let processed = preprocess(&input, &job.segments, &job.settings)?;
    let record = ChannelRecord::from_processed(&processed, &source);
    info!(
        "writing '{}' ({} samples at {} Hz, mode {:?})",
        record.chantype,
        record.len(),
        record.sample_rate,
        job.mode
    );
    let index = session.write_channel(record, job.mode);
    Ok((processed, index))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_when_empty() {
        let job = JobFile::from_json("{}").unwrap().resolve().unwrap();
        assert_eq!(job.channel, "pupil_l");
        assert!(!job.combine);
        assert_eq!(job.mode, WriteMode::Add);
        assert_eq!(job.settings, ValiditySettings::default());
        assert!(job.segments.is_empty());
    }

    #[test]
    fn full_job_parses() {
        let job = JobFile::from_json(
            r#"{
                "channel": "pupil_r",
                "mode": "replace",
                "settings": {"outputSampleRate": 250},
                "segments": [{"start": 0, "end": 5, "name": "baseline"}],
                "segmentsCsv": "out.csv"
            }"#,
        )
        .unwrap()
        .resolve()
        .unwrap();
        assert_eq!(job.mode, WriteMode::Replace);
        assert_eq!(job.settings.output_sample_rate, 250.0);
        assert_eq!(job.segments, vec![Segment::new(0.0, 5.0, "baseline")]);
        assert_eq!(job.segments_csv, Some(PathBuf::from("out.csv")));
    }

    #[test]
    fn unknown_job_key_is_rejected() {
        let err = JobFile::from_json(r#"{"plot": true}"#).unwrap_err();
        assert_eq!(err, InvalidInput::UnknownConfigKey("plot".into()));
    }

    #[test]
    fn segment_without_name_is_rejected() {
        let err = JobFile::from_json(r#"{"segments": [{"start": 0, "end": 1}]}"#)
            .unwrap()
            .resolve()
            .unwrap_err();
        assert!(matches!(err, InvalidInput::InvalidSegment { index: 0, .. }));
    }

    #[test]
    fn missing_channel_is_reported() {
        let mut session = Session::default();
        let job = JobFile::default().resolve().unwrap();
        assert_eq!(
            run_job(&mut session, &job).unwrap_err(),
            InvalidInput::MissingChannel("pupil_l".into())
        );
    }
}

//! Per-segment summary statistics.
//!
//! Each segment is evaluated over two views for every eye-role:
//! the smooth view (output grid, missing markers counted) and the valid view
//! (source grid, only samples that survived the validity filter).
//!
//! Bounds outside the data are clamped to the extent of each view; a window
//! that clamps to nothing reports zero samples.

use std::borrow::Cow;
use std::ops::Range;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{InvalidInput, Result};

use super::model::{EyeLabel, EyeRole, SmoothSignal, ValidSampleInfo};

// ---------------------------------------------------------------------------
// Segment definitions
// ---------------------------------------------------------------------------

/// A named window in absolute seconds.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub start: f64,
    pub end: f64,
    pub name: String,
}

/// A segment as it arrives from configuration, every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SegmentSpec {
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub name: Option<String>,
}

impl Segment {
    pub fn new(start: f64, end: f64, name: impl Into<String>) -> Self {
        Self {
            start,
            end,
            name: name.into(),
        }
    }

    /// Validate the `index`-th entry of a segment list.
    pub fn from_spec(index: usize, spec: &SegmentSpec) -> Result<Self> {
        let fail = |reason: &str| InvalidInput::InvalidSegment {
            index,
            reason: reason.to_string(),
        };
        let start = spec.start.ok_or_else(|| fail("missing start"))?;
        let end = spec.end.ok_or_else(|| fail("missing end"))?;
        let name = spec.name.clone().ok_or_else(|| fail("missing name"))?;
        Segment::new(start, end, name).validated(index)
    }

    fn validated(self, index: usize) -> Result<Self> {
        let reason = if !self.start.is_finite() || !self.end.is_finite() {
            Some("bounds must be finite")
        } else if self.end < self.start {
            Some("end lies before start")
        } else {
            None
        };
        match reason {
            Some(r) => Err(InvalidInput::InvalidSegment {
                index,
                reason: r.to_string(),
            }),
            None => Ok(self),
        }
    }
}

/// Validate a whole segment list, failing on the first bad entry.
pub fn validate_segments(segments: &[Segment]) -> Result<()> {
    for (i, seg) in segments.iter().enumerate() {
        seg.clone().validated(i)?;
    }
    Ok(())
}

/// Parse a list of raw specs into segments.
pub fn parse_segments(specs: &[SegmentSpec]) -> Result<Vec<Segment>> {
    specs
        .iter()
        .enumerate()
        .map(|(i, spec)| Segment::from_spec(i, spec))
        .collect()
}

// ---------------------------------------------------------------------------
// Statistics records
// ---------------------------------------------------------------------------

/// Summary of one view of one segment.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentStats {
    pub mean_diameter: Option<f64>,
    pub min_diameter: Option<f64>,
    pub max_diameter: Option<f64>,
    /// Missing percentage in the smooth view, valid percentage in the valid view.
    pub percent: f64,
    pub sample_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleStats {
    pub role: EyeRole,
    pub smooth: SegmentStats,
    pub valid: SegmentStats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SegmentRecord {
    #[serde(flatten)]
    pub segment: Segment,
    pub stats: Vec<RoleStats>,
}

impl SegmentRecord {
    pub fn for_role(&self, role: EyeRole) -> Option<&RoleStats> {
        self.stats.iter().find(|s| s.role == role)
    }
}

// ---------------------------------------------------------------------------
// Calculator
// ---------------------------------------------------------------------------

struct View<'a> {
    role: EyeRole,
    smooth: &'a [Option<f64>],
    valid: Cow<'a, ValidSampleInfo>,
}

/// Compute statistics for every segment and store them on `signal`.
pub fn attach_segment_stats(signal: &mut SmoothSignal, segments: &[Segment]) {
    let records = segment_stats(signal, segments);
    info!(
        "computed statistics for {} segment(s), role {}",
        records.len(),
        signal.role
    );
    signal.segments = records;
}

/// Compute statistics for every segment × eye-role of `signal`.
pub fn segment_stats(signal: &SmoothSignal, segments: &[Segment]) -> Vec<SegmentRecord> {
    let views = views_of(signal);
    segments
        .iter()
        .map(|seg| SegmentRecord {
            segment: seg.clone(),
            stats: views
                .iter()
                .map(|view| {
                    let window = output_window(seg, signal.sample_rate, view.smooth.len());
                    RoleStats {
                        role: view.role,
                        smooth: smooth_stats(view.smooth, window.clone()),
                        valid: valid_stats(&view.valid, window, signal.sample_rate),
                    }
                })
                .collect(),
        })
        .collect()
}

fn views_of(signal: &SmoothSignal) -> Vec<View<'_>> {
    let info_for = move |eye: EyeLabel| match signal.valid_samples.get(&eye) {
        Some(info) => Cow::Borrowed(info),
        None => Cow::Owned(empty_info(signal)),
    };

    match signal.role {
        EyeRole::SingleEye(eye) => vec![View {
            role: signal.role,
            smooth: &signal.values,
            valid: info_for(eye),
        }],
        EyeRole::Combined => {
            let left = info_for(EyeLabel::Left);
            let right = info_for(EyeLabel::Right);
            let mean = union_mean(&left, &right);
            let per_eye = move |eye: EyeLabel| {
                signal
                    .per_eye
                    .get(&eye)
                    .map_or(&[][..], |v| v.as_slice())
            };
            vec![
                View {
                    role: EyeRole::SingleEye(EyeLabel::Left),
                    smooth: per_eye(EyeLabel::Left),
                    valid: left,
                },
                View {
                    role: EyeRole::SingleEye(EyeLabel::Right),
                    smooth: per_eye(EyeLabel::Right),
                    valid: right,
                },
                View {
                    role: EyeRole::Combined,
                    smooth: &signal.values,
                    valid: Cow::Owned(mean),
                },
            ]
        }
    }
}

fn empty_info(signal: &SmoothSignal) -> ValidSampleInfo {
    ValidSampleInfo {
        sample_rate: signal.sample_rate,
        source_len: 0,
        indices: Vec::new(),
        values: Vec::new(),
        fraction_valid: 0.0,
    }
}

/// Valid view of the mean: indices valid in either eye, averaged where both are.
fn union_mean(a: &ValidSampleInfo, b: &ValidSampleInfo) -> ValidSampleInfo {
    let mut indices = Vec::with_capacity(a.indices.len().max(b.indices.len()));
    let mut values = Vec::with_capacity(indices.capacity());
    let (mut i, mut j) = (0, 0);
    while i < a.indices.len() || j < b.indices.len() {
        let ia = a.indices.get(i).copied().unwrap_or(usize::MAX);
        let ib = b.indices.get(j).copied().unwrap_or(usize::MAX);
        if ia == ib {
            indices.push(ia);
            values.push(0.5 * (a.values[i] + b.values[j]));
            i += 1;
            j += 1;
        } else if ia < ib {
            indices.push(ia);
            values.push(a.values[i]);
            i += 1;
        } else {
            indices.push(ib);
            values.push(b.values[j]);
            j += 1;
        }
    }
    let source_len = a.source_len.max(b.source_len);
    let fraction_valid = if source_len == 0 {
        0.0
    } else {
        indices.len() as f64 / source_len as f64
    };
    ValidSampleInfo {
        sample_rate: a.sample_rate,
        source_len,
        indices,
        values,
        fraction_valid,
    }
}

/// Index of time `t` on a grid of rate `fs`, clamped to `[0, len]`.
fn clamp_index(t: f64, fs: f64, len: usize) -> usize {
    let x = (t * fs).round();
    if x <= 0.0 {
        0
    } else {
        (x as usize).min(len)
    }
}

fn summarize(values: impl Iterator<Item = f64>) -> (usize, Option<f64>, Option<f64>, Option<f64>) {
    let mut n = 0usize;
    let mut sum = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values {
        n += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }
    if n == 0 {
        (0, None, None, None)
    } else {
        (n, Some(sum / n as f64), Some(min), Some(max))
    }
}

/// Output-grid window of `seg`, clamped to `[0, len]`.
fn output_window(seg: &Segment, fs: f64, len: usize) -> Range<usize> {
    let a = clamp_index(seg.start, fs, len);
    let b = clamp_index(seg.end, fs, len).max(a);
    a..b
}

/// First index `i` of a `len`-sample grid at rate `fs` with `i / fs >= t`.
fn first_index_at(t: f64, fs: f64, len: usize) -> usize {
    let mut i = ((t * fs).ceil().max(0.0) as usize).min(len);
    while i > 0 && (i - 1) as f64 / fs >= t {
        i -= 1;
    }
    while i < len && (i as f64) / fs < t {
        i += 1;
    }
    i
}

fn smooth_stats(values: &[Option<f64>], window: Range<usize>) -> SegmentStats {
    let window = &values[window];
    let (present, mean, min, max) = summarize(window.iter().flatten().copied());
    let total = window.len();
    let percent = if total == 0 {
        100.0
    } else {
        (total - present) as f64 / total as f64 * 100.0
    };
    SegmentStats {
        mean_diameter: mean,
        min_diameter: min,
        max_diameter: max,
        percent,
        sample_count: total,
    }
}

/// Source samples whose time falls inside the output window. Sharing the
/// window keeps the valid count at or below the smooth count whenever the
/// output rate is at least the source rate.
fn valid_stats(info: &ValidSampleInfo, window: Range<usize>, out_fs: f64) -> SegmentStats {
    let (t_start, t_end) = (window.start as f64 / out_fs, window.end as f64 / out_fs);
    let a = first_index_at(t_start, info.sample_rate, info.source_len);
    let b = first_index_at(t_end, info.sample_rate, info.source_len).max(a);
    let lo = info.indices.partition_point(|&i| i < a);
    let hi = info.indices.partition_point(|&i| i < b);
    let (count, mean, min, max) = summarize(info.values[lo..hi].iter().copied());
    let percent = if b > a {
        count as f64 / (b - a) as f64 * 100.0
    } else {
        0.0
    };
    SegmentStats {
        mean_diameter: mean,
        min_diameter: min,
        max_diameter: max,
        percent,
        sample_count: count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn info(fs: f64, len: usize, valid: &[usize], value: f64) -> ValidSampleInfo {
        ValidSampleInfo {
            sample_rate: fs,
            source_len: len,
            indices: valid.to_vec(),
            values: vec![value; valid.len()],
            fraction_valid: valid.len() as f64 / len as f64,
        }
    }

    fn single(values: Vec<Option<f64>>, fs: f64, info: ValidSampleInfo) -> SmoothSignal {
        SmoothSignal {
            role: EyeRole::SingleEye(EyeLabel::Left),
            sample_rate: fs,
            values,
            valid_samples: BTreeMap::from([(EyeLabel::Left, info)]),
            per_eye: BTreeMap::new(),
            segments: Vec::new(),
        }
    }

    #[test]
    fn malformed_segments_are_rejected() {
        let ok = SegmentSpec {
            start: Some(1.0),
            end: Some(2.0),
            name: Some("a".into()),
        };
        assert_eq!(Segment::from_spec(0, &ok).unwrap(), Segment::new(1.0, 2.0, "a"));

        let no_end = SegmentSpec {
            end: None,
            ..ok.clone()
        };
        assert_eq!(
            Segment::from_spec(3, &no_end),
            Err(InvalidInput::InvalidSegment {
                index: 3,
                reason: "missing end".into()
            })
        );

        let reversed = SegmentSpec {
            start: Some(5.0),
            ..ok.clone()
        };
        assert!(Segment::from_spec(0, &reversed).is_err());

        let unnamed = SegmentSpec {
            name: None,
            ..ok
        };
        assert!(matches!(
            parse_segments(&[SegmentSpec::default(), unnamed]),
            Err(InvalidInput::InvalidSegment { index: 0, .. })
        ));
    }

    #[test]
    fn smooth_and_valid_views() {
        // 2 s at 10 Hz source, 20 Hz output; samples 5..15 valid at 4.0.
        let valid: Vec<usize> = (5..15).collect();
        let mut values = vec![None; 40];
        for v in &mut values[10..30] {
            *v = Some(4.0);
        }
        let signal = single(values, 20.0, info(10.0, 20, &valid, 4.0));
        let rec = &segment_stats(&signal, &[Segment::new(0.0, 1.0, "first")])[0];
        let stats = rec.for_role(EyeRole::SingleEye(EyeLabel::Left)).unwrap();

        assert_eq!(stats.smooth.sample_count, 20);
        assert!((stats.smooth.percent - 50.0).abs() < 1e-12);
        assert_eq!(stats.smooth.mean_diameter, Some(4.0));

        assert_eq!(stats.valid.sample_count, 5);
        assert!((stats.valid.percent - 50.0).abs() < 1e-12);
        assert!(stats.valid.sample_count <= stats.smooth.sample_count);
    }

    #[test]
    fn window_outside_data_is_empty() {
        let signal = single(vec![Some(1.0); 10], 10.0, info(10.0, 10, &[0, 1, 2], 1.0));
        let rec = &segment_stats(&signal, &[Segment::new(5.0, 8.0, "late")])[0];
        let stats = &rec.stats[0];
        assert_eq!(stats.smooth.sample_count, 0);
        assert_eq!(stats.smooth.mean_diameter, None);
        assert_eq!(stats.smooth.percent, 100.0);
        assert_eq!(stats.valid.sample_count, 0);
        assert_eq!(stats.valid.percent, 0.0);
    }

    #[test]
    fn combined_signal_has_three_roles() {
        let mut signal = single(vec![Some(5.0); 20], 10.0, info(10.0, 20, &[0, 1, 2, 3], 4.0));
        signal.role = EyeRole::Combined;
        signal
            .valid_samples
            .insert(EyeLabel::Right, info(10.0, 20, &[2, 3, 4], 6.0));
        signal.per_eye.insert(EyeLabel::Left, vec![Some(4.0); 20]);
        signal.per_eye.insert(EyeLabel::Right, vec![Some(6.0); 20]);

        let rec = &segment_stats(&signal, &[Segment::new(0.0, 2.0, "all")])[0];
        let roles: Vec<EyeRole> = rec.stats.iter().map(|s| s.role).collect();
        assert_eq!(
            roles,
            vec![
                EyeRole::SingleEye(EyeLabel::Left),
                EyeRole::SingleEye(EyeLabel::Right),
                EyeRole::Combined
            ]
        );

        let mean = rec.for_role(EyeRole::Combined).unwrap();
        // Union of {0,1,2,3} and {2,3,4}: 0,1 -> 4.0; 2,3 -> 5.0; 4 -> 6.0.
        assert_eq!(mean.valid.sample_count, 5);
        assert_eq!(mean.valid.min_diameter, Some(4.0));
        assert_eq!(mean.valid.max_diameter, Some(6.0));
        assert!((mean.valid.mean_diameter.unwrap() - 4.8).abs() < 1e-12);
        assert_eq!(rec.for_role(EyeRole::SingleEye(EyeLabel::Right)).unwrap().smooth.mean_diameter, Some(6.0));
    }

    #[test]
    fn valid_count_bounded_by_smooth_count_at_fractional_ratio() {
        // 10 Hz source, 11 Hz output, every source sample valid.
        let valid: Vec<usize> = (0..100).collect();
        let signal = single(vec![Some(3.0); 110], 11.0, info(10.0, 100, &valid, 3.0));
        let mut segments = vec![Segment::new(0.0455, 0.05, "narrow")];
        for k in 0..200 {
            let start = k as f64 * 0.0437;
            segments.push(Segment::new(start, start + 0.013 * (k % 17) as f64, format!("s{k}")));
        }
        for rec in segment_stats(&signal, &segments) {
            let stats = &rec.stats[0];
            assert!(
                stats.valid.sample_count <= stats.smooth.sample_count,
                "{}: valid {} > smooth {}",
                rec.segment.name,
                stats.valid.sample_count,
                stats.smooth.sample_count
            );
        }
    }

    #[test]
    fn first_index_handles_exact_grid_times() {
        assert_eq!(first_index_at(0.1, 10.0, 20), 1);
        assert_eq!(first_index_at(0.10001, 10.0, 20), 2);
        assert_eq!(first_index_at(-1.0, 10.0, 20), 0);
        assert_eq!(first_index_at(5.0, 10.0, 20), 20);
    }

    #[test]
    fn attach_stores_records() {
        let mut signal = single(vec![Some(2.0); 10], 10.0, info(10.0, 10, &[0], 2.0));
        attach_segment_stats(&mut signal, &[Segment::new(0.0, 0.5, "a"), Segment::new(0.5, 1.0, "b")]);
        assert_eq!(signal.segments.len(), 2);
        assert_eq!(signal.segments[1].segment.name, "b");
    }
}

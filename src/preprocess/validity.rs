//! Validity filter engine.
//!
//! Five stages run in a fixed order over a shared mask. Each stage only
//! clears flags, so once a sample is invalid it stays invalid.
//!
//! ```text
//!  range → speed → edge → trend (≤ passes rounds) → isolated islands
//! ```

use log::debug;

use crate::config::{GapSettings, IslandSettings, TrendSettings, ValiditySettings};

use super::model::ValidityMask;
use super::trend::TrendEstimator;

/// Float slack for comparing durations built from sample counts.
const DURATION_EPS: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Range,
    Speed,
    Edge,
    Trend,
    Island,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageReport {
    pub stage: Stage,
    pub invalidated: usize,
}

/// Per-stage invalidation counts of one filter run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterReport {
    pub stages: Vec<StageReport>,
    /// Trend rounds actually executed.
    pub trend_rounds: u32,
}

impl FilterReport {
    pub fn invalidated_by(&self, stage: Stage) -> usize {
        self.stages
            .iter()
            .filter(|r| r.stage == stage)
            .map(|r| r.invalidated)
            .sum()
    }
}

/// Runs all five stages with one set of resolved settings.
#[derive(Debug, Clone, Copy)]
pub struct ValidityFilter<'a> {
    settings: &'a ValiditySettings,
}

impl<'a> ValidityFilter<'a> {
    pub fn new(settings: &'a ValiditySettings) -> Self {
        Self { settings }
    }

    /// Compute the validity mask of `values` sampled at `sample_rate`.
    pub fn detect(&self, values: &[f64], sample_rate: f64) -> ValidityMask {
        self.detect_with_report(values, sample_rate).0
    }

    pub fn detect_with_report(&self, values: &[f64], sample_rate: f64) -> (ValidityMask, FilterReport) {
        let s = self.settings;
        let mut mask = vec![true; values.len()];
        let mut report = FilterReport::default();

        let track = |stage: Stage, mask: &[bool], before: usize, report: &mut FilterReport| {
            let after = count_valid(mask);
            debug!("{stage:?} filter invalidated {} sample(s), {after} remain", before - after);
            report.stages.push(StageReport {
                stage,
                invalidated: before - after,
            });
            after
        };

        let before = mask.len();
        range_stage(values, &mut mask, s.range.min, s.range.max);
        let before = track(Stage::Range, &mask, before, &mut report);

        speed_stage(values, &mut mask, sample_rate, s.speed.max);
        let before = track(Stage::Speed, &mask, before, &mut report);

        edge_stage(&mut mask, sample_rate, &s.gap);
        let before = track(Stage::Edge, &mask, before, &mut report);

        report.trend_rounds = trend_stage(values, &mut mask, sample_rate, &s.trend);
        let before = track(Stage::Trend, &mask, before, &mut report);

        island_stage(&mut mask, sample_rate, &s.isolated_islands);
        track(Stage::Island, &mask, before, &mut report);

        (ValidityMask::new(mask), report)
    }
}

fn count_valid(mask: &[bool]) -> usize {
    mask.iter().filter(|&&v| v).count()
}

/// Maximal runs of `state` as half-open `(start, end)` index pairs.
fn runs(mask: &[bool], state: bool) -> Vec<(usize, usize)> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, &m) in mask.iter().enumerate() {
        match (m == state, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                out.push((s, i));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        out.push((s, mask.len()));
    }
    out
}

// ---------------------------------------------------------------------------
// Stage 1: range
// ---------------------------------------------------------------------------

fn range_stage(values: &[f64], mask: &mut [bool], min: f64, max: f64) {
    for (m, &v) in mask.iter_mut().zip(values) {
        if !v.is_finite() || v < min || v > max {
            *m = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 2: speed
// ---------------------------------------------------------------------------

/// Both endpoints of every too-fast pair of consecutive valid samples are
/// cleared. Speeds are taken from the mask as it was on entry.
fn speed_stage(values: &[f64], mask: &mut [bool], sample_rate: f64, max_speed: f64) {
    let valid: Vec<usize> = (0..mask.len()).filter(|&i| mask[i]).collect();
    let mut reject = Vec::new();
    for pair in valid.windows(2) {
        let (i, j) = (pair[0], pair[1]);
        let dt = (j - i) as f64 / sample_rate;
        let speed = (values[j] - values[i]).abs() / dt;
        if speed > max_speed {
            reject.push(i);
            reject.push(j);
        }
    }
    for i in reject {
        mask[i] = false;
    }
}

// ---------------------------------------------------------------------------
// Stage 3: edge
// ---------------------------------------------------------------------------

fn edge_stage(mask: &mut [bool], sample_rate: f64, gap: &GapSettings) {
    let n = mask.len();
    let before = (gap.margin_before * sample_rate + DURATION_EPS).floor() as usize;
    let after = (gap.margin_after * sample_rate + DURATION_EPS).floor() as usize;

    for (start, end) in runs(mask, false) {
        let duration = (end - start) as f64 / sample_rate;
        if duration + DURATION_EPS < gap.min_duration {
            continue;
        }
        for m in &mut mask[start.saturating_sub(before)..start] {
            *m = false;
        }
        for m in &mut mask[end..(end + after).min(n)] {
            *m = false;
        }
    }
}

// ---------------------------------------------------------------------------
// Stage 4: trend
// ---------------------------------------------------------------------------

/// Returns the number of rounds executed.
fn trend_stage(values: &[f64], mask: &mut [bool], sample_rate: f64, trend: &TrendSettings) -> u32 {
    let estimator = TrendEstimator::new(trend.smoothing_window, sample_rate);
    let mut rounds = 0;

    while rounds < trend.passes {
        let Some(curve) = estimator.estimate(values, mask) else {
            break;
        };
        rounds += 1;

        let mut removed = 0usize;
        for ((m, &v), &t) in mask.iter_mut().zip(values).zip(&curve) {
            if *m && (v - t).abs() > trend.deviation_threshold {
                *m = false;
                removed += 1;
            }
        }
        debug!("trend round {rounds}: {removed} outlier(s)");
        if removed == 0 {
            break;
        }
    }
    rounds
}

// ---------------------------------------------------------------------------
// Stage 5: isolated islands
// ---------------------------------------------------------------------------

/// Drops short valid runs with a short invalid gap on both sides. A side
/// that touches the series boundary has no gap and never counts as short.
fn island_stage(mask: &mut [bool], sample_rate: f64, islands: &IslandSettings) {
    let found = runs(mask, true);
    let mut drop = Vec::new();
    let gap = |from: usize, to: usize| {
        if from == to {
            f64::INFINITY
        } else {
            (to - from) as f64 / sample_rate
        }
    };

    for (k, &(start, end)) in found.iter().enumerate() {
        let duration = (end - start) as f64 / sample_rate;
        let prev_end = if k == 0 { 0 } else { found[k - 1].1 };
        let next_start = found.get(k + 1).map_or(mask.len(), |r| r.0);
        let gap_before = gap(prev_end, start);
        let gap_after = gap(end, next_start);

        if duration + DURATION_EPS < islands.min_size
            && gap_before + DURATION_EPS < islands.max_gap
            && gap_after + DURATION_EPS < islands.max_gap
        {
            drop.push((start, end));
        }
    }
    for (start, end) in drop {
        for m in &mut mask[start..end] {
            *m = false;
        }
    }
}

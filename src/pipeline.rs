use log::{debug, info, warn};

use crate::config::ValiditySettings;
use crate::error::{InvalidInput, Result};
use crate::preprocess::segments::validate_segments;
use crate::preprocess::{
    attach_segment_stats, check_pair, EyeCombiner, EyeLabel, FilterReport, RawChannel,
    Reconstruction, Reconstructor, Segment, ValidityFilter, ValidityMask,
};

// ---------------------------------------------------------------------------
// Pipeline input / output
// ---------------------------------------------------------------------------

/// The eye selection of one invocation.
#[derive(Debug, Clone)]
pub enum EyeInput {
    Single(RawChannel),
    Pair(RawChannel, RawChannel),
}

impl EyeInput {
    fn channels(&self) -> Vec<&RawChannel> {
        match self {
            EyeInput::Single(raw) => vec![raw],
            EyeInput::Pair(a, b) => vec![a, b],
        }
    }
}

/// Completed output of one invocation.
#[derive(Debug, Clone)]
pub struct Processed {
    /// The single-eye signal, or the mean signal in combined mode.
    pub reconstruction: Reconstruction,
    /// Filter statistics per processed eye.
    pub reports: Vec<(EyeLabel, FilterReport)>,
    /// One entry per eye whose reconstruction degraded.
    pub warnings: Vec<String>,
}

impl Processed {
    pub fn is_degraded(&self) -> bool {
        self.reconstruction.is_degraded()
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the whole preprocessing chain for one channel or one eye pair.
///
/// Every input check happens before filtering starts, so an `Err` means no
/// numeric work was done.
pub fn preprocess(input: &EyeInput, segments: &[Segment], settings: &ValiditySettings) -> Result<Processed> {
    settings.validate()?;
    validate_segments(segments)?;
    for raw in input.channels() {
        check_channel(raw)?;
    }
    if let EyeInput::Pair(a, b) = input {
        check_pair(a, b)?;
    }

    let filter = ValidityFilter::new(settings);
    let mut reports = Vec::new();
    let mut masks: Vec<ValidityMask> = Vec::new();
    for raw in input.channels() {
        let (mask, report) = filter.detect_with_report(&raw.values, raw.sample_rate);
        info!(
            "eye {}: {} of {} sample(s) valid ({:.1}%)",
            raw.eye,
            mask.valid_count(),
            mask.len(),
            mask.fraction_valid() * 100.0
        );
        reports.push((raw.eye, report));
        masks.push(mask);
    }

    let mut warnings = Vec::new();
    let mut reconstruction = match input {
        EyeInput::Single(raw) => {
            let out = Reconstructor::new(settings).reconstruct(raw, &masks[0]);
            if let Some(reason) = out.degradation() {
                warnings.push(format!("eye {}: {reason}; output is all missing", raw.eye));
            }
            out
        }
        EyeInput::Pair(a, b) => {
            let combination = EyeCombiner::new(settings).combine((a, &masks[0]), (b, &masks[1]))?;
            for (eye, part) in [
                (EyeLabel::Left, &combination.left),
                (EyeLabel::Right, &combination.right),
            ] {
                if let Some(reason) = part.degradation() {
                    warnings.push(format!("eye {eye}: {reason}; mean uses the other eye only"));
                }
            }
            if let Some(reason) = combination.mean.degradation() {
                warnings.push(format!("combined: {reason}; output is all missing"));
            }
            combination.mean
        }
    };

    for w in &warnings {
        warn!("{w}");
    }

    if segments.is_empty() {
        debug!("no segments requested, skipping statistics");
    } else {
        attach_segment_stats(reconstruction.signal_mut(), segments);
    }

    Ok(Processed {
        reconstruction,
        reports,
        warnings,
    })
}

fn check_channel(raw: &RawChannel) -> Result<()> {
    if raw.sample_rate.is_finite() && raw.sample_rate > 0.0 {
        Ok(())
    } else {
        Err(InvalidInput::InvalidChannel(format!(
            "eye {}: sample rate must be positive, got {}",
            raw.eye, raw.sample_rate
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::EyeRole;

    fn raw(eye: EyeLabel, fs: f64, values: Vec<f64>) -> RawChannel {
        RawChannel::new(fs, "mm", values, eye).unwrap()
    }

    #[test]
    fn invalid_segment_fails_before_filtering() {
        let s = ValiditySettings::default();
        let input = EyeInput::Single(raw(EyeLabel::Left, 100.0, vec![4.0; 100]));
        let err = preprocess(&input, &[Segment::new(2.0, 1.0, "bad")], &s).unwrap_err();
        assert!(matches!(err, InvalidInput::InvalidSegment { index: 0, .. }));
    }

    #[test]
    fn corrupted_sample_rate_is_rejected() {
        let s = ValiditySettings::default();
        let mut channel = raw(EyeLabel::Left, 100.0, vec![4.0; 10]);
        channel.sample_rate = -1.0;
        let err = preprocess(&EyeInput::Single(channel), &[], &s).unwrap_err();
        assert!(matches!(err, InvalidInput::InvalidChannel(_)));
    }

    #[test]
    fn degraded_single_eye_reports_a_warning() {
        let s = ValiditySettings::default();
        let input = EyeInput::Single(raw(EyeLabel::Right, 100.0, vec![0.5; 200]));
        let out = preprocess(&input, &[], &s).unwrap();
        assert!(out.is_degraded());
        assert_eq!(out.warnings.len(), 1);
        assert!(out.warnings[0].starts_with("eye r:"));
        assert!(out.reconstruction.signal().segments.is_empty());
    }

    #[test]
    fn pair_produces_combined_role() {
        let mut s = ValiditySettings::default();
        s.output_sample_rate = 100.0;
        let input = EyeInput::Pair(
            raw(EyeLabel::Left, 100.0, vec![4.0; 300]),
            raw(EyeLabel::Right, 100.0, vec![4.4; 300]),
        );
        let out = preprocess(&input, &[Segment::new(0.0, 1.0, "a")], &s).unwrap();
        let signal = out.reconstruction.signal();
        assert_eq!(signal.role, EyeRole::Combined);
        assert_eq!(signal.segments[0].stats.len(), 3);
        assert_eq!(out.reports.len(), 2);
        assert!(out.warnings.is_empty());
    }
}

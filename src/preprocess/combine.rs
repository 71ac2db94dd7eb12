use log::info;

use crate::config::ValiditySettings;
use crate::error::{InvalidInput, Result};

use super::model::{DataQuality, EyeLabel, EyeRole, RawChannel, Reconstruction, SmoothSignal, ValidityMask};
use super::reconstruct::Reconstructor;

/// Both eyes reconstructed separately plus their mean.
#[derive(Debug, Clone)]
pub struct Combination {
    pub mean: Reconstruction,
    pub left: Reconstruction,
    pub right: Reconstruction,
}

/// Reject eye pairs that cannot be averaged sample by sample.
///
/// Checked in order: eye label, sample rate, unit, length.
pub fn check_pair(a: &RawChannel, b: &RawChannel) -> Result<()> {
    if a.eye == b.eye {
        return Err(InvalidInput::SameEye(a.eye));
    }
    if a.sample_rate != b.sample_rate {
        return Err(InvalidInput::SampleRateMismatch {
            left: a.sample_rate,
            right: b.sample_rate,
        });
    }
    if a.unit != b.unit {
        return Err(InvalidInput::UnitMismatch {
            left: a.unit.clone(),
            right: b.unit.clone(),
        });
    }
    if a.len() != b.len() {
        return Err(InvalidInput::LengthMismatch {
            left: a.len(),
            right: b.len(),
        });
    }
    Ok(())
}

pub struct EyeCombiner<'a> {
    settings: &'a ValiditySettings,
}

impl<'a> EyeCombiner<'a> {
    pub fn new(settings: &'a ValiditySettings) -> Self {
        Self { settings }
    }

    /// Reconstruct both eyes and average them.
    ///
    /// Where only one eye has a value, the mean is that eye's value; it is
    /// missing only where both eyes are missing. The mean is degraded only
    /// when both eyes are.
    pub fn combine(
        &self,
        a: (&RawChannel, &ValidityMask),
        b: (&RawChannel, &ValidityMask),
    ) -> Result<Combination> {
        check_pair(a.0, b.0)?;
        let (left, right) = if a.0.eye == EyeLabel::Left { (a, b) } else { (b, a) };

        let reconstructor = Reconstructor::new(self.settings);
        let left = reconstructor.reconstruct(left.0, left.1);
        let right = reconstructor.reconstruct(right.0, right.1);

        let (l, r) = (left.signal(), right.signal());
        let values: Vec<Option<f64>> = l
            .values
            .iter()
            .zip(&r.values)
            .map(|(a, b)| match (a, b) {
                (Some(x), Some(y)) => Some(0.5 * (x + y)),
                (Some(x), None) | (None, Some(x)) => Some(*x),
                (None, None) => None,
            })
            .collect();

        let mut signal = SmoothSignal::missing(EyeRole::Combined, self.settings.output_sample_rate, 0);
        signal.values = values;
        for eye in [l, r] {
            signal.valid_samples.extend(eye.valid_samples.clone());
        }
        signal.per_eye.insert(EyeLabel::Left, l.values.clone());
        signal.per_eye.insert(EyeLabel::Right, r.values.clone());

        info!(
            "combined eyes: {} of {} output samples missing",
            signal.missing_count(),
            signal.len()
        );

        let mean = if left.is_degraded() && right.is_degraded() {
            Reconstruction::Degraded(signal, DataQuality::BothEyesDegraded)
        } else {
            Reconstruction::Success(signal)
        };
        Ok(Combination { mean, left, right })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eye(label: EyeLabel, fs: f64, unit: &str, values: Vec<f64>) -> RawChannel {
        RawChannel::new(fs, unit, values, label).unwrap()
    }

    fn settings() -> ValiditySettings {
        let mut s = ValiditySettings::default();
        s.output_sample_rate = 20.0;
        s.reconstruction.lowpass_cutoff = 0.0;
        s
    }

    #[test]
    fn preconditions_in_order() {
        let l = eye(EyeLabel::Left, 500.0, "mm", vec![3.0; 10]);
        let l2 = eye(EyeLabel::Left, 250.0, "px", vec![3.0; 4]);
        assert_eq!(check_pair(&l, &l2), Err(InvalidInput::SameEye(EyeLabel::Left)));

        let r = eye(EyeLabel::Right, 250.0, "px", vec![3.0; 4]);
        assert!(matches!(
            check_pair(&l, &r),
            Err(InvalidInput::SampleRateMismatch { left, right }) if left == 500.0 && right == 250.0
        ));

        let r = eye(EyeLabel::Right, 500.0, "px", vec![3.0; 4]);
        assert!(matches!(check_pair(&l, &r), Err(InvalidInput::UnitMismatch { .. })));

        let r = eye(EyeLabel::Right, 500.0, "mm", vec![3.0; 4]);
        assert_eq!(
            check_pair(&l, &r),
            Err(InvalidInput::LengthMismatch { left: 10, right: 4 })
        );
    }

    #[test]
    fn mean_of_two_eyes_in_any_argument_order() {
        let s = settings();
        let l = eye(EyeLabel::Left, 10.0, "mm", vec![4.0; 40]);
        let r = eye(EyeLabel::Right, 10.0, "mm", vec![6.0; 40]);
        let ok = ValidityMask::new(vec![true; 40]);

        let c = EyeCombiner::new(&s).combine((&r, &ok), (&l, &ok)).unwrap();
        let mean = c.mean.signal();
        assert_eq!(mean.role, EyeRole::Combined);
        assert_eq!(mean.len(), 80);
        let interior = mean.values.iter().flatten().collect::<Vec<_>>();
        assert!(!interior.is_empty());
        assert!(interior.iter().all(|&&v| (v - 5.0).abs() < 1e-12));
        assert_eq!(mean.valid_samples.len(), 2);
        assert_eq!(c.left.signal().role, EyeRole::SingleEye(EyeLabel::Left));
    }

    #[test]
    fn one_missing_eye_falls_back_to_the_other() {
        let s = settings();
        let l = eye(EyeLabel::Left, 10.0, "mm", vec![4.0; 40]);
        let r = eye(EyeLabel::Right, 10.0, "mm", vec![6.0; 40]);
        let ok = ValidityMask::new(vec![true; 40]);
        let none = ValidityMask::new(vec![false; 40]);

        let c = EyeCombiner::new(&s).combine((&l, &ok), (&r, &none)).unwrap();
        assert!(!c.mean.is_degraded());
        assert!(c.right.is_degraded());
        assert_eq!(c.mean.signal().values, c.left.signal().values);
        assert_eq!(c.mean.signal().per_eye[&EyeLabel::Right].len(), 80);
    }

    #[test]
    fn both_eyes_degraded() {
        let s = settings();
        let l = eye(EyeLabel::Left, 10.0, "mm", vec![4.0; 40]);
        let r = eye(EyeLabel::Right, 10.0, "mm", vec![6.0; 40]);
        let none = ValidityMask::new(vec![false; 40]);
        let c = EyeCombiner::new(&s).combine((&l, &none), (&r, &none)).unwrap();
        assert_eq!(c.mean.degradation(), Some(&DataQuality::BothEyesDegraded));
        assert_eq!(c.mean.signal().missing_count(), 80);
    }
}

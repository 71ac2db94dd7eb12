//! Trend curve used by the trendline filter.
//!
//! The curve is a centred moving mean over the currently valid samples,
//! windowed in time rather than in sample count so that invalid stretches do
//! not widen the window. It is evaluated at valid sample times and linearly
//! interpolated onto every other sample time. Callers use it only to measure
//! deviations; it never leaves the validity engine.

/// Time-windowed mean smoother over a masked series.
#[derive(Debug, Clone, Copy)]
pub struct TrendEstimator {
    /// Half window expressed in samples.
    half_width: f64,
}

impl TrendEstimator {
    /// `window` is the full window width in seconds.
    pub fn new(window: f64, sample_rate: f64) -> Self {
        Self {
            half_width: 0.5 * window * sample_rate,
        }
    }

    /// Trend at every sample index, or `None` when no sample is valid.
    pub fn estimate(&self, values: &[f64], mask: &[bool]) -> Option<Vec<f64>> {
        let idx: Vec<usize> = mask
            .iter()
            .enumerate()
            .filter(|(_, &v)| v)
            .map(|(i, _)| i)
            .collect();
        if idx.is_empty() {
            return None;
        }

        let mut prefix = Vec::with_capacity(idx.len() + 1);
        prefix.push(0.0);
        let mut acc = 0.0;
        for &i in &idx {
            acc += values[i];
            prefix.push(acc);
        }

        // Mean over valid samples within ±half_width of each valid sample.
        let reach = self.half_width + 1e-9;
        let mut at_valid = Vec::with_capacity(idx.len());
        let (mut lo, mut hi) = (0usize, 0usize);
        for (k, &center) in idx.iter().enumerate() {
            while (center - idx[lo]) as f64 > reach {
                lo += 1;
            }
            if hi < k {
                hi = k;
            }
            while hi + 1 < idx.len() && (idx[hi + 1] - center) as f64 <= reach {
                hi += 1;
            }
            let n = (hi - lo + 1) as f64;
            at_valid.push((prefix[hi + 1] - prefix[lo]) / n);
        }

        Some(interpolate_onto_all(&idx, &at_valid, mask.len()))
    }
}

/// Linear interpolation between anchor points, constant beyond the ends.
fn interpolate_onto_all(anchors: &[usize], values: &[f64], len: usize) -> Vec<f64> {
    let mut out = vec![0.0; len];
    let first = anchors[0];
    let last = anchors[anchors.len() - 1];

    for slot in out.iter_mut().take(first) {
        *slot = values[0];
    }
    for w in 0..anchors.len() {
        let a = anchors[w];
        out[a] = values[w];
        if w + 1 < anchors.len() {
            let b = anchors[w + 1];
            let span = (b - a) as f64;
            for i in (a + 1)..b {
                let alpha = (i - a) as f64 / span;
                out[i] = values[w] + alpha * (values[w + 1] - values[w]);
            }
        }
    }
    for slot in out.iter_mut().skip(last + 1) {
        *slot = values[values.len() - 1];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_series_gives_constant_trend() {
        let values = vec![4.0; 50];
        let mask = vec![true; 50];
        let trend = TrendEstimator::new(1.0, 10.0).estimate(&values, &mask).unwrap();
        assert!(trend.iter().all(|&t| (t - 4.0).abs() < 1e-12));
    }

    #[test]
    fn invalid_samples_are_ignored_and_bridged() {
        let mut values = vec![2.0; 20];
        values[10] = 100.0;
        let mut mask = vec![true; 20];
        mask[10] = false;
        let trend = TrendEstimator::new(0.4, 10.0).estimate(&values, &mask).unwrap();
        assert_eq!(trend.len(), 20);
        assert!((trend[10] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn linear_ramp_is_reproduced_in_the_interior() {
        let values: Vec<f64> = (0..40).map(|i| i as f64 * 0.1).collect();
        let mask = vec![true; 40];
        let trend = TrendEstimator::new(0.5, 10.0).estimate(&values, &mask).unwrap();
        // Symmetric windows away from the edges reproduce a ramp exactly.
        for i in 3..37 {
            assert!((trend[i] - values[i]).abs() < 1e-9, "index {i}");
        }
    }

    #[test]
    fn ends_are_held_constant() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let mask = vec![false, true, true, true, false];
        let trend = TrendEstimator::new(0.0, 1.0).estimate(&values, &mask).unwrap();
        assert_eq!(trend, vec![2.0, 2.0, 3.0, 4.0, 4.0]);
    }

    #[test]
    fn empty_mask_has_no_trend() {
        assert!(TrendEstimator::new(1.0, 10.0)
            .estimate(&[1.0, 2.0], &[false, false])
            .is_none());
    }
}

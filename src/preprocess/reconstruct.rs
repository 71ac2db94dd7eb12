//! Signal reconstruction: valid samples → uniform output grid.
//!
//! ```text
//!   valid (t, v) ──► PCHIP onto grid ──► zero-phase low-pass ──► pad with None
//!                    [t_first, t_last]    (forward + backward)     to out_len
//! ```
//!
//! The output always has `round(out_fs / src_fs * N)` samples. Leading
//! padding is `round(t_first * out_fs)`; trailing padding takes the rest.

use std::f64::consts::{PI, SQRT_2};

use log::debug;

use crate::config::ValiditySettings;

use super::model::{
    DataQuality, EyeRole, RawChannel, Reconstruction, SmoothSignal, ValidSampleInfo, ValidityMask,
};

/// Tolerance, in output samples, when locating the last grid point.
const GRID_EPS: f64 = 1e-6;

/// Number of output samples for `n` input samples.
pub fn output_len(source_rate: f64, output_rate: f64, n: usize) -> usize {
    (output_rate / source_rate * n as f64).round() as usize
}

pub struct Reconstructor<'a> {
    settings: &'a ValiditySettings,
}

impl<'a> Reconstructor<'a> {
    pub fn new(settings: &'a ValiditySettings) -> Self {
        Self { settings }
    }

    /// Rebuild `raw` from its valid samples. Never fails: unusable input
    /// yields [`Reconstruction::Degraded`] with an all-missing signal.
    pub fn reconstruct(&self, raw: &RawChannel, mask: &ValidityMask) -> Reconstruction {
        let out_fs = self.settings.output_sample_rate;
        let out_len = output_len(raw.sample_rate, out_fs, raw.len());
        let info = ValidSampleInfo::from_mask(raw, mask);
        let role = EyeRole::SingleEye(raw.eye);

        let degraded = |info: ValidSampleInfo, reason: DataQuality| {
            debug!("eye {}: degraded reconstruction ({reason})", raw.eye);
            let mut signal = SmoothSignal::missing(role, out_fs, out_len);
            signal.valid_samples.insert(raw.eye, info);
            Reconstruction::Degraded(signal, reason)
        };

        if info.indices.len() < 2 {
            let valid = info.indices.len();
            return degraded(info, DataQuality::InsufficientValidSamples { valid });
        }

        let times: Vec<f64> = info.indices.iter().map(|&i| raw.time_of(i)).collect();
        let t_first = times[0];
        let t_last = times[times.len() - 1];

        let lead = ((t_first * out_fs).round() as usize).min(out_len);
        let end = (((t_last * out_fs + GRID_EPS).floor() as usize) + 1).min(out_len);
        if end <= lead {
            return degraded(info, DataQuality::EmptyInterior);
        }

        let interp = Pchip::new(&times, &info.values);
        let mut interior = interp.evaluate_sorted((lead..end).map(|k| k as f64 / out_fs));
        lowpass_zero_phase(&mut interior, out_fs, self.settings.reconstruction.lowpass_cutoff);

        if interior.iter().any(|v| !v.is_finite()) {
            return degraded(info, DataQuality::NonFiniteOutput);
        }

        let mut values = vec![None; out_len];
        for (slot, v) in values[lead..end].iter_mut().zip(interior) {
            *slot = Some(v);
        }

        let max_gap = self.settings.reconstruction.max_gap;
        if max_gap > 0.0 {
            mask_long_gaps(&mut values, &info.indices, raw.sample_rate, out_fs, max_gap);
        }

        debug!(
            "eye {}: {} interior sample(s), {} leading and {} trailing missing",
            raw.eye,
            end - lead,
            lead,
            out_len - end
        );

        let mut signal = SmoothSignal::missing(role, out_fs, 0);
        signal.values = values;
        signal.valid_samples.insert(raw.eye, info);
        Reconstruction::Success(signal)
    }
}

/// Clear output samples lying strictly inside source gaps longer than
/// `max_gap` seconds.
fn mask_long_gaps(values: &mut [Option<f64>], indices: &[usize], src_fs: f64, out_fs: f64, max_gap: f64) {
    for pair in indices.windows(2) {
        let (a, b) = (pair[0], pair[1]);
        let gap = (b - a - 1) as f64 / src_fs;
        if gap <= max_gap {
            continue;
        }
        let (ta, tb) = (a as f64 / src_fs, b as f64 / src_fs);
        let first = (ta * out_fs).floor() as usize + 1;
        let last = ((tb * out_fs).ceil() as usize).min(values.len());
        for k in first..last {
            let t = k as f64 / out_fs;
            if t > ta && t < tb {
                values[k] = None;
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Monotone piecewise cubic Hermite interpolation (Fritsch–Carlson)
// ---------------------------------------------------------------------------

struct Pchip<'a> {
    x: &'a [f64],
    y: &'a [f64],
    slopes: Vec<f64>,
}

impl<'a> Pchip<'a> {
    /// `x` must be strictly increasing with at least two points.
    fn new(x: &'a [f64], y: &'a [f64]) -> Self {
        let n = x.len();
        let h: Vec<f64> = x.windows(2).map(|w| w[1] - w[0]).collect();
        let delta: Vec<f64> = (0..n - 1).map(|k| (y[k + 1] - y[k]) / h[k]).collect();

        let mut slopes = vec![0.0; n];
        if n == 2 {
            slopes[0] = delta[0];
            slopes[1] = delta[0];
            return Self { x, y, slopes };
        }

        for k in 1..n - 1 {
            if delta[k - 1] * delta[k] > 0.0 {
                let w1 = 2.0 * h[k] + h[k - 1];
                let w2 = h[k] + 2.0 * h[k - 1];
                slopes[k] = (w1 + w2) / (w1 / delta[k - 1] + w2 / delta[k]);
            }
        }
        slopes[0] = end_slope(h[0], h[1], delta[0], delta[1]);
        slopes[n - 1] = end_slope(h[n - 2], h[n - 3], delta[n - 2], delta[n - 3]);

        Self { x, y, slopes }
    }

    /// Evaluate at non-decreasing query points, clamping outside the knots.
    fn evaluate_sorted(&self, queries: impl Iterator<Item = f64>) -> Vec<f64> {
        let n = self.x.len();
        let mut k = 0usize;
        let mut out = Vec::new();
        for t in queries {
            if t <= self.x[0] {
                out.push(self.y[0]);
                continue;
            }
            if t >= self.x[n - 1] {
                out.push(self.y[n - 1]);
                continue;
            }
            while self.x[k + 1] < t {
                k += 1;
            }
            let h = self.x[k + 1] - self.x[k];
            let delta = (self.y[k + 1] - self.y[k]) / h;
            let (d0, d1) = (self.slopes[k], self.slopes[k + 1]);
            let c2 = (3.0 * delta - 2.0 * d0 - d1) / h;
            let c3 = (d0 - 2.0 * delta + d1) / (h * h);
            let s = t - self.x[k];
            out.push(self.y[k] + s * (d0 + s * (c2 + s * c3)));
        }
        out
    }
}

/// One-sided three-point end slope, limited to keep the curve monotone.
fn end_slope(h0: f64, h1: f64, d0: f64, d1: f64) -> f64 {
    let slope = ((2.0 * h0 + h1) * d0 - h0 * d1) / (h0 + h1);
    if slope.signum() != d0.signum() || d0 == 0.0 {
        0.0
    } else if d0.signum() != d1.signum() && slope.abs() > (3.0 * d0).abs() {
        3.0 * d0
    } else {
        slope
    }
}

// ---------------------------------------------------------------------------
// Zero-phase Butterworth low-pass
// ---------------------------------------------------------------------------

/// Normalised biquad coefficients (a0 = 1).
#[derive(Clone, Copy, Debug)]
struct Biquad {
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,
}

impl Biquad {
    /// Second-order Butterworth low-pass.
    fn butterworth_lowpass(sample_rate: f64, cutoff: f64) -> Self {
        let omega = 2.0 * PI * cutoff / sample_rate;
        let (sin_omega, cos_omega) = omega.sin_cos();
        let alpha = sin_omega / SQRT_2;

        let a0 = 1.0 + alpha;
        let b0 = (1.0 - cos_omega) / 2.0;
        Self {
            b0: b0 / a0,
            b1: (1.0 - cos_omega) / a0,
            b2: b0 / a0,
            a1: -2.0 * cos_omega / a0,
            a2: (1.0 - alpha) / a0,
        }
    }

    /// Filter in place, starting from the steady state of the first sample.
    fn run<'s>(&self, samples: impl Iterator<Item = &'s mut f64>) {
        let mut state: Option<(f64, f64, f64, f64)> = None;
        for x in samples {
            let (x1, x2, y1, y2) = *state.get_or_insert((*x, *x, *x, *x));
            let y = self.b0 * *x + self.b1 * x1 + self.b2 * x2 - self.a1 * y1 - self.a2 * y2;
            state = Some((*x, x1, y, y1));
            *x = y;
        }
    }
}

/// Forward-backward filtering; skipped when `cutoff` is zero or not below
/// the Nyquist frequency.
fn lowpass_zero_phase(samples: &mut [f64], sample_rate: f64, cutoff: f64) {
    if cutoff <= 0.0 || cutoff >= 0.5 * sample_rate || samples.len() < 2 {
        return;
    }
    let biquad = Biquad::butterworth_lowpass(sample_rate, cutoff);
    biquad.run(samples.iter_mut());
    biquad.run(samples.iter_mut().rev());
}

use std::path::Path;

use anyhow::Result;

use pupil_pp::data::loader::save_session;
use pupil_pp::data::model::{ChannelRecord, Session, WriteMode};

const SAMPLE_RATE: f64 = 500.0;
const DURATION: f64 = 60.0;

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    /// Box-Muller transform for normal distribution
    fn gauss(&mut self, mean: f64, std_dev: f64) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        let z = (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos();
        mean + std_dev * z
    }
}

/// Slow pupil response: baseline plus a dilation after each stimulus.
fn pupil_trace(t: f64, baseline: f64, stimuli: &[f64]) -> f64 {
    let drift = 0.15 * (2.0 * std::f64::consts::PI * t / 40.0).sin();
    let responses: f64 = stimuli
        .iter()
        .filter(|&&onset| t >= onset)
        .map(|&onset| {
            // Gamma-shaped response peaking about 1 s after onset.
            let x = t - onset;
            0.4 * x * (1.0 - x).exp()
        })
        .sum();
    baseline + drift + responses
}

/// One eye with blinks (gaps framed by edge artefacts), spikes and
/// dropped samples.
fn generate_eye(
    baseline: f64,
    stimuli: &[f64],
    blinks: &[(f64, f64)],
    rng: &mut SimpleRng,
) -> Vec<Option<f64>> {
    let n = (DURATION * SAMPLE_RATE) as usize;
    let mut values: Vec<Option<f64>> = (0..n)
        .map(|i| {
            let t = i as f64 / SAMPLE_RATE;
            Some(pupil_trace(t, baseline, stimuli) + rng.gauss(0.0, 0.01))
        })
        .collect();

    for &(start, len) in blinks {
        let first = (start * SAMPLE_RATE) as usize;
        let last = ((start + len) * SAMPLE_RATE) as usize;
        for (k, v) in values[first..last.min(n)].iter_mut().enumerate() {
            // Lid closing / opening drags the estimate down at the edges.
            let edge = k < 10 || k + 10 >= last - first;
            *v = if edge { v.map(|d| d - 1.0) } else { None };
        }
    }

    for _ in 0..40 {
        let i = (rng.next_f64() * n as f64) as usize % n;
        values[i] = values[i].map(|d| d + 2.5);
    }
    for _ in 0..100 {
        let i = (rng.next_f64() * n as f64) as usize % n;
        values[i] = None;
    }
    values
}

fn main() -> Result<()> {
    env_logger::init();
    let mut rng = SimpleRng::new(42);

    let stimuli: Vec<f64> = (0..10).map(|k| 5.0 + k as f64 * 5.0).collect();
    let left = generate_eye(4.0, &stimuli, &[(12.3, 0.15), (31.0, 0.2), (47.5, 0.12)], &mut rng);
    let right = generate_eye(4.2, &stimuli, &[(12.3, 0.15), (31.0, 0.2), (52.0, 0.4)], &mut rng);

    let mut session = Session::default();
    for (chantype, values) in [("pupil_l", left), ("pupil_r", right)] {
        session.write_channel(
            ChannelRecord {
                chantype: chantype.into(),
                sample_rate: SAMPLE_RATE,
                unit: "mm".into(),
                values,
                header: None,
            },
            WriteMode::Add,
        );
    }

    let path = Path::new("sample_session.parquet");
    save_session(path, &session)?;

    println!(
        "Generated {} with {} channels of {} samples",
        path.display(),
        session.channels.len(),
        session.channels[0].len()
    );
    Ok(())
}

use serde::{Deserialize, Serialize};

use crate::error::{InvalidInput, Result};

// ---------------------------------------------------------------------------
// Resolved settings – what every core operation consumes
// ---------------------------------------------------------------------------

/// Fully resolved preprocessing parameters.
///
/// Obtained from [`ValiditySettings::default`] or [`ValiditySettings::resolve`]
/// and passed by reference into every stage. Durations are in seconds, rates
/// in Hz, diameters in the unit of the input channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValiditySettings {
    pub range: RangeSettings,
    pub speed: SpeedSettings,
    pub gap: GapSettings,
    pub trend: TrendSettings,
    pub isolated_islands: IslandSettings,
    pub output_sample_rate: f64,
    pub reconstruction: ReconstructionSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RangeSettings {
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpeedSettings {
    /// Maximum |Δvalue / Δt| in unit per second.
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GapSettings {
    pub min_duration: f64,
    pub margin_before: f64,
    pub margin_after: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendSettings {
    pub deviation_threshold: f64,
    /// Full width of the smoothing window.
    pub smoothing_window: f64,
    pub passes: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IslandSettings {
    pub min_size: f64,
    pub max_gap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconstructionSettings {
    /// Low-pass cutoff applied after interpolation; `0` disables the filter.
    pub lowpass_cutoff: f64,
    /// Source gaps longer than this stay missing in the output; `0` bridges
    /// every gap.
    pub max_gap: f64,
}

impl Default for ValiditySettings {
    fn default() -> Self {
        Self {
            range: RangeSettings { min: 1.5, max: 9.0 },
            speed: SpeedSettings { max: 25.0 },
            gap: GapSettings {
                min_duration: 0.075,
                margin_before: 0.05,
                margin_after: 0.05,
            },
            trend: TrendSettings {
                deviation_threshold: 0.5,
                smoothing_window: 0.5,
                passes: 4,
            },
            isolated_islands: IslandSettings {
                min_size: 0.05,
                max_gap: 0.04,
            },
            output_sample_rate: 1000.0,
            reconstruction: ReconstructionSettings {
                lowpass_cutoff: 4.0,
                max_gap: 0.0,
            },
        }
    }
}

// ---------------------------------------------------------------------------
// User overrides – same schema, every leaf optional, unknown keys rejected
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsOverride {
    pub range: Option<RangeOverride>,
    pub speed: Option<SpeedOverride>,
    pub gap: Option<GapOverride>,
    pub trend: Option<TrendOverride>,
    pub isolated_islands: Option<IslandOverride>,
    pub output_sample_rate: Option<f64>,
    pub reconstruction: Option<ReconstructionOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RangeOverride {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpeedOverride {
    pub max: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct GapOverride {
    pub min_duration: Option<f64>,
    pub margin_before: Option<f64>,
    pub margin_after: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct TrendOverride {
    pub deviation_threshold: Option<f64>,
    pub smoothing_window: Option<f64>,
    pub passes: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct IslandOverride {
    pub min_size: Option<f64>,
    pub max_gap: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReconstructionOverride {
    pub lowpass_cutoff: Option<f64>,
    pub max_gap: Option<f64>,
}

impl SettingsOverride {
    /// Parse an override tree from JSON text.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| InvalidInput::from_config_error(&e))
    }

    /// Parse an override tree that was embedded in a larger JSON document.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|e| InvalidInput::from_config_error(&e))
    }
}

fn merge<T: Copy>(slot: &mut T, value: Option<T>) {
    if let Some(v) = value {
        *slot = v;
    }
}

impl ValiditySettings {
    /// Merge `overrides` onto the defaults and validate the result.
    pub fn resolve(overrides: &SettingsOverride) -> Result<Self> {
        let mut s = Self::default();

        if let Some(o) = &overrides.range {
            merge(&mut s.range.min, o.min);
            merge(&mut s.range.max, o.max);
        }
        if let Some(o) = &overrides.speed {
            merge(&mut s.speed.max, o.max);
        }
        if let Some(o) = &overrides.gap {
            merge(&mut s.gap.min_duration, o.min_duration);
            merge(&mut s.gap.margin_before, o.margin_before);
            merge(&mut s.gap.margin_after, o.margin_after);
        }
        if let Some(o) = &overrides.trend {
            merge(&mut s.trend.deviation_threshold, o.deviation_threshold);
            merge(&mut s.trend.smoothing_window, o.smoothing_window);
            merge(&mut s.trend.passes, o.passes);
        }
        if let Some(o) = &overrides.isolated_islands {
            merge(&mut s.isolated_islands.min_size, o.min_size);
            merge(&mut s.isolated_islands.max_gap, o.max_gap);
        }
        merge(&mut s.output_sample_rate, overrides.output_sample_rate);
        if let Some(o) = &overrides.reconstruction {
            merge(&mut s.reconstruction.lowpass_cutoff, o.lowpass_cutoff);
            merge(&mut s.reconstruction.max_gap, o.max_gap);
        }

        s.validate()?;
        Ok(s)
    }

    /// Shorthand for `resolve(&SettingsOverride::from_json(text)?)`.
    pub fn from_json(text: &str) -> Result<Self> {
        Self::resolve(&SettingsOverride::from_json(text)?)
    }

    /// Check every field for a usable value.
    pub fn validate(&self) -> Result<()> {
        fn bad(msg: String) -> Result<()> {
            Err(InvalidInput::InvalidConfig(msg))
        }
        fn non_negative(name: &str, v: f64) -> Result<()> {
            if v.is_finite() && v >= 0.0 {
                Ok(())
            } else {
                bad(format!("{name} must be a finite value >= 0, got {v}"))
            }
        }
        fn positive(name: &str, v: f64) -> Result<()> {
            if v.is_finite() && v > 0.0 {
                Ok(())
            } else {
                bad(format!("{name} must be a finite value > 0, got {v}"))
            }
        }

        if !self.range.min.is_finite() || !self.range.max.is_finite() {
            return bad("range bounds must be finite".into());
        }
        if self.range.min >= self.range.max {
            return bad(format!(
                "range.min ({}) must be below range.max ({})",
                self.range.min, self.range.max
            ));
        }
        positive("speed.max", self.speed.max)?;
        non_negative("gap.minDuration", self.gap.min_duration)?;
        non_negative("gap.marginBefore", self.gap.margin_before)?;
        non_negative("gap.marginAfter", self.gap.margin_after)?;
        positive("trend.deviationThreshold", self.trend.deviation_threshold)?;
        positive("trend.smoothingWindow", self.trend.smoothing_window)?;
        non_negative("isolatedIslands.minSize", self.isolated_islands.min_size)?;
        non_negative("isolatedIslands.maxGap", self.isolated_islands.max_gap)?;
        positive("outputSampleRate", self.output_sample_rate)?;
        non_negative("reconstruction.lowpassCutoff", self.reconstruction.lowpass_cutoff)?;
        non_negative("reconstruction.maxGap", self.reconstruction.max_gap)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_override_yields_defaults() {
        let s = ValiditySettings::from_json("{}").unwrap();
        assert_eq!(s, ValiditySettings::default());
    }

    #[test]
    fn partial_override_keeps_siblings() {
        let s = ValiditySettings::from_json(
            r#"{"range": {"max": 7.5}, "trend": {"passes": 2}, "outputSampleRate": 250}"#,
        )
        .unwrap();
        let d = ValiditySettings::default();
        assert_eq!(s.range.max, 7.5);
        assert_eq!(s.range.min, d.range.min);
        assert_eq!(s.trend.passes, 2);
        assert_eq!(s.trend.smoothing_window, d.trend.smoothing_window);
        assert_eq!(s.output_sample_rate, 250.0);
        assert_eq!(s.gap, d.gap);
    }

    #[test]
    fn unknown_nested_key_is_rejected() {
        let err = ValiditySettings::from_json(r#"{"gap": {"minDurationMs": 10}}"#).unwrap_err();
        assert_eq!(err, InvalidInput::UnknownConfigKey("minDurationMs".into()));
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = ValiditySettings::from_json(r#"{"plot": true}"#).unwrap_err();
        assert!(matches!(err, InvalidInput::UnknownConfigKey(k) if k == "plot"));
    }

    #[test]
    fn inverted_range_is_invalid() {
        let err = ValiditySettings::from_json(r#"{"range": {"min": 5, "max": 2}}"#).unwrap_err();
        assert!(matches!(err, InvalidInput::InvalidConfig(_)));
    }

    #[test]
    fn non_positive_output_rate_is_invalid() {
        let err = ValiditySettings::from_json(r#"{"outputSampleRate": 0}"#).unwrap_err();
        assert!(matches!(err, InvalidInput::InvalidConfig(m) if m.contains("outputSampleRate")));
    }

    #[test]
    fn wrong_type_is_invalid_config() {
        let err = ValiditySettings::from_json(r#"{"speed": {"max": "fast"}}"#).unwrap_err();
        assert!(matches!(err, InvalidInput::InvalidConfig(_)));
    }
}

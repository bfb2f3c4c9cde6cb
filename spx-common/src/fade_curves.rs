//! Fade curve shapes for click-suppression envelopes
//!
//! A fade-in curve maps normalized position `t ∈ [0, 1]` to a gain that is
//! exactly 0.0 at `t = 0`, exactly 1.0 at `t = 1`, and monotonically
//! non-decreasing in between. Fade-out is the mirror image. Positions outside
//! `[0, 1]` are clamped, so anything past the fade duration is unity gain.

use crate::Error;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI};
use std::str::FromStr;

/// Envelope curve shape
///
/// - Linear: constant rate of change
/// - Exponential: slow start, fast finish (t²)
/// - Logarithmic: fast start, slow finish (√t on fade-in, (1-t)² on fade-out)
/// - SCurve: raised cosine, zero slope at both ends
/// - EqualPower: quarter sine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FadeCurve {
    /// v(t) = t
    Linear,

    /// v(t) = t²
    Exponential,

    /// v(t) = √t
    Logarithmic,

    /// v(t) = 0.5 × (1 - cos(π × t))
    #[serde(alias = "cosine", alias = "raised_cosine")]
    SCurve,

    /// v(t) = sin(t × π/2)
    EqualPower,
}

impl FadeCurve {
    /// Fade-in multiplier at a normalized position through the fade
    ///
    /// Computed in f64 so that the envelope does not add quantization of its own
    /// on top of the sample buffer.
    pub fn calculate_fade_in(&self, position: f64) -> f64 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => t,
            FadeCurve::Exponential => t * t,
            FadeCurve::Logarithmic => t.sqrt(),
            FadeCurve::SCurve => 0.5 * (1.0 - (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).sin(),
        }
    }

    /// Fade-out multiplier at a normalized position through the fade
    ///
    /// 1.0 at the start of the fade-out, 0.0 at the final sample boundary.
    pub fn calculate_fade_out(&self, position: f64) -> f64 {
        let t = position.clamp(0.0, 1.0);

        match self {
            FadeCurve::Linear => 1.0 - t,
            FadeCurve::Exponential | FadeCurve::Logarithmic => {
                let inv = 1.0 - t;
                inv * inv
            }
            FadeCurve::SCurve => 0.5 * (1.0 + (PI * t).cos()),
            FadeCurve::EqualPower => (t * FRAC_PI_2).cos(),
        }
    }

    /// Canonical lever-file value
    pub fn as_str(&self) -> &'static str {
        match self {
            FadeCurve::Linear => "linear",
            FadeCurve::Exponential => "exponential",
            FadeCurve::Logarithmic => "logarithmic",
            FadeCurve::SCurve => "cosine",
            FadeCurve::EqualPower => "equal_power",
        }
    }

    /// All curve variants
    pub fn all_variants() -> &'static [FadeCurve] {
        &[
            FadeCurve::Linear,
            FadeCurve::Exponential,
            FadeCurve::Logarithmic,
            FadeCurve::SCurve,
            FadeCurve::EqualPower,
        ]
    }
}

impl FromStr for FadeCurve {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "linear" => Ok(FadeCurve::Linear),
            "exponential" => Ok(FadeCurve::Exponential),
            "logarithmic" => Ok(FadeCurve::Logarithmic),
            "cosine" | "raised_cosine" | "scurve" | "s-curve" | "s_curve" => Ok(FadeCurve::SCurve),
            "equal_power" | "equalpower" => Ok(FadeCurve::EqualPower),
            other => Err(Error::InvalidInput(format!("Unknown fade curve: '{}'", other))),
        }
    }
}

impl Default for FadeCurve {
    /// Raised cosine: zero slope at both ends of the ramp
    fn default() -> Self {
        FadeCurve::SCurve
    }
}

impl std::fmt::Display for FadeCurve {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fade_in_bounds() {
        for curve in FadeCurve::all_variants() {
            assert_eq!(curve.calculate_fade_in(0.0), 0.0, "{:?} fade-in must start at zero", curve);
            assert!(
                (curve.calculate_fade_in(1.0) - 1.0).abs() < 1e-12,
                "{:?} fade-in must reach unity",
                curve
            );
        }
    }

    #[test]
    fn test_fade_out_bounds() {
        for curve in FadeCurve::all_variants() {
            assert!((curve.calculate_fade_out(0.0) - 1.0).abs() < 1e-12);
            assert!(
                curve.calculate_fade_out(1.0).abs() < 1e-12,
                "{:?} fade-out must end at zero",
                curve
            );
        }
    }

    #[test]
    fn test_monotonic() {
        for curve in FadeCurve::all_variants() {
            let mut prev_in = -1.0;
            let mut prev_out = 2.0;
            for step in 0..=100 {
                let t = step as f64 / 100.0;
                let v_in = curve.calculate_fade_in(t);
                let v_out = curve.calculate_fade_out(t);
                assert!(v_in >= prev_in, "{:?} fade-in not monotonic at {}", curve, t);
                assert!(v_out <= prev_out, "{:?} fade-out not monotonic at {}", curve, t);
                prev_in = v_in;
                prev_out = v_out;
            }
        }
    }

    #[test]
    fn test_positions_past_fade_are_unity() {
        for curve in FadeCurve::all_variants() {
            assert!((curve.calculate_fade_in(3.5) - 1.0).abs() < 1e-12);
            assert_eq!(curve.calculate_fade_in(-1.0), 0.0);
        }
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!("cosine".parse::<FadeCurve>().unwrap(), FadeCurve::SCurve);
        assert_eq!("s-curve".parse::<FadeCurve>().unwrap(), FadeCurve::SCurve);
        assert_eq!("EqualPower".parse::<FadeCurve>().unwrap(), FadeCurve::EqualPower);
        assert_eq!("LINEAR".parse::<FadeCurve>().unwrap(), FadeCurve::Linear);
        assert!("stepped".parse::<FadeCurve>().is_err());
    }

    #[test]
    fn test_canonical_names_parse_back() {
        for curve in FadeCurve::all_variants() {
            assert_eq!(curve.as_str().parse::<FadeCurve>().unwrap(), *curve);
        }
    }

    #[test]
    fn test_default_is_raised_cosine() {
        assert_eq!(FadeCurve::default(), FadeCurve::SCurve);
    }
}

//! Thermal comfort indices: the steady-state [fanger] equation and the
//! dynamic 16-segment [zhang] model.

pub mod fanger;
pub mod zhang;

use crate::imports::*;
use std::fmt;

/// Predicted percentage dissatisfied for a predicted mean vote
pub fn ppd_from_pmv(pmv: f64) -> f64 {
    100.0 - 95.0 * (-0.03353 * pmv.powi(4) - 0.2179 * pmv.powi(2)).exp()
}

/// Nine-point sensation scale
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sensation {
    #[serde(rename = "Very Cold")]
    VeryCold,
    Cold,
    Cool,
    #[serde(rename = "Slightly Cool")]
    SlightlyCool,
    Neutral,
    #[serde(rename = "Slightly Warm")]
    SlightlyWarm,
    Warm,
    Hot,
    #[serde(rename = "Very Hot")]
    VeryHot,
}

impl Sensation {
    /// Band of `pmv`: `ceil(pmv + sign(pmv)·0.1)` limited to ±4
    pub fn from_pmv(pmv: f64) -> Self {
        let sign = if pmv > 0.0 {
            1.0
        } else if pmv < 0.0 {
            -1.0
        } else {
            0.0
        };
        let band = (pmv + sign * 0.1).ceil().clamp(-4.0, 4.0) as i32;
        match band {
            i32::MIN..=-4 => Self::VeryCold,
            -3 => Self::Cold,
            -2 => Self::Cool,
            -1 => Self::SlightlyCool,
            0 => Self::Neutral,
            1 => Self::SlightlyWarm,
            2 => Self::Warm,
            3 => Self::Hot,
            _ => Self::VeryHot,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::VeryCold => "Very Cold",
            Self::Cold => "Cold",
            Self::Cool => "Cool",
            Self::SlightlyCool => "Slightly Cool",
            Self::Neutral => "Neutral",
            Self::SlightlyWarm => "Slightly Warm",
            Self::Warm => "Warm",
            Self::Hot => "Hot",
            Self::VeryHot => "Very Hot",
        }
    }
}

impl fmt::Display for Sensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// PMV with its derived PPD and sensation band
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ComfortIndex {
    pub pmv: f64,
    pub ppd: f64,
    pub sensation: Sensation,
}

impl ComfortIndex {
    pub fn from_pmv(pmv: f64) -> Self {
        Self {
            pmv,
            ppd: ppd_from_pmv(pmv),
            sensation: Sensation::from_pmv(pmv),
        }
    }
}

/// Settings of the comfort evaluations made during a run
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
#[serde(default)]
pub struct ComfortParams {
    /// include the skin and core rate terms of the dynamic model
    pub include_rate_terms: bool,
    /// clothing insulation for the steady-state equation \[m²·K/W\]
    pub clothing_insulation: f64,
    /// external work for the steady-state equation \[met\]
    pub external_work: f64,
}

impl Default for ComfortParams {
    fn default() -> Self {
        Self {
            include_rate_terms: false,
            clothing_insulation: 0.10,
            external_work: 0.0,
        }
    }
}

impl SerdeAPI for ComfortParams {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.clothing_insulation.is_finite() && self.clothing_insulation >= 0.0,
            config_err!("clothing insulation must be non-negative")
        );
        ensure!(
            self.external_work.is_finite() && self.external_work >= 0.0,
            config_err!("external work must be non-negative")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ppd_at_neutral_is_five_percent() {
        assert!(ppd_from_pmv(0.0).approx_eq(&5.0, 1e-12));
        assert!(ppd_from_pmv(1.0) > 25.0 && ppd_from_pmv(1.0) < 27.0);
    }

    #[test]
    fn test_sensation_bands() {
        assert_eq!(Sensation::from_pmv(0.0), Sensation::Neutral);
        assert_eq!(Sensation::from_pmv(-0.05), Sensation::Neutral);
        assert_eq!(Sensation::from_pmv(0.5), Sensation::SlightlyWarm);
        assert_eq!(Sensation::from_pmv(-1.5), Sensation::SlightlyCool);
        assert_eq!(Sensation::from_pmv(-2.5), Sensation::Cool);
        assert_eq!(Sensation::from_pmv(2.5), Sensation::Hot);
        assert_eq!(Sensation::from_pmv(2.95), Sensation::VeryHot);
        assert_eq!(Sensation::from_pmv(-9.0), Sensation::VeryCold);
        assert_eq!(Sensation::from_pmv(12.0), Sensation::VeryHot);
        assert_eq!(Sensation::VeryHot.to_string(), "Very Hot");
    }

    proptest! {
        #[test]
        fn ppd_is_bounded_and_symmetric(pmv in -10.0f64..10.0) {
            let ppd = ppd_from_pmv(pmv);
            prop_assert!((0.0..=100.0).contains(&ppd));
            prop_assert!(ppd >= 5.0 - 1e-9);
            prop_assert!((ppd - ppd_from_pmv(-pmv)).abs() < 1e-9);
            let expected = 100.0 - 95.0 * (-0.03353 * pmv.powi(4) - 0.2179 * pmv.powi(2)).exp();
            prop_assert!((ppd - expected).abs() < 1e-9);
        }

        #[test]
        fn sensation_is_monotonic(a in -6.0f64..6.0, b in -6.0f64..6.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(Sensation::from_pmv(lo) <= Sensation::from_pmv(hi));
        }
    }
}

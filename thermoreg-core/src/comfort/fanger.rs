//! Steady-state PMV by the Fanger heat balance of the clothed body.

use super::ComfortIndex;
use crate::air_properties::fanger_vapor_pressure_pa;
use crate::imports::*;
use crate::params::W_PER_M2_PER_MET_FANGER;

/// Iteration cap of the clothing surface temperature solve
pub const MAX_ITERATIONS: usize = 150;
const TOLERANCE: f64 = 0.00015;

/// Whole-body conditions of one steady-state evaluation
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct FangerInputs {
    /// \[°C\]
    pub ambient_temperature: f64,
    /// \[°C\]
    pub mean_radiant_temperature: f64,
    /// \[m/s\]
    pub air_velocity: f64,
    /// fraction in \[0, 1\]
    pub relative_humidity: f64,
    /// \[met\]
    pub met: f64,
    /// external work \[met\]
    pub work: f64,
    /// \[m²·K/W\]
    pub clothing_insulation: f64,
}

impl SerdeAPI for FangerInputs {}

impl FangerInputs {
    pub fn evaluate(&self) -> anyhow::Result<ComfortIndex> {
        self.evaluate_with_limit(MAX_ITERATIONS)
    }

    /// Solves for the clothing surface temperature by damped fixed-point
    /// iteration and returns the resulting PMV. Exceeding `max_iterations`
    /// fails with [ThermoError::IterativeSolveNonConvergence].
    pub fn evaluate_with_limit(&self, max_iterations: usize) -> anyhow::Result<ComfortIndex> {
        let ta = self.ambient_temperature;
        let icl = self.clothing_insulation;
        ensure!(
            icl >= 0.0 && self.met >= 0.0 && self.air_velocity >= 0.0,
            config_err!("comfort inputs must be non-negative: {self:?}")
        );
        let pa = fanger_vapor_pressure_pa(ta, self.relative_humidity);
        let m = self.met * W_PER_M2_PER_MET_FANGER;
        let w = self.work * W_PER_M2_PER_MET_FANGER;
        let mw = m - w;
        let fcl = if icl <= 0.078 {
            1.0 + 1.29 * icl
        } else {
            1.05 + 0.645 * icl
        };
        let hcf = 12.1 * self.air_velocity.sqrt();
        let taa = ta + 273.0;
        let tra = self.mean_radiant_temperature + 273.0;
        let tcla = taa + (35.5 - ta) / (3.5 * icl + 0.1);

        let p1 = icl * fcl;
        let p2 = p1 * 3.96;
        let p3 = p1 * 100.0;
        let p4 = p1 * taa;
        let p5 = 308.7 - 0.028 * mw + p2 * (tra / 100.0).powi(4);
        let mut xn = tcla / 100.0;
        let mut xf = tcla / 50.0;
        let mut hc = hcf;
        let mut iterations = 0;
        while (xn - xf).abs() > TOLERANCE {
            iterations += 1;
            if iterations > max_iterations {
                bail!(ThermoError::IterativeSolveNonConvergence {
                    iterations: max_iterations,
                    residual: (xn - xf).abs(),
                });
            }
            xf = (xf + xn) / 2.0;
            let hcn = 2.38 * (100.0 * xf - taa).abs().powf(0.25);
            hc = hcf.max(hcn);
            xn = (p5 + p4 * hc - p2 * xf.powi(4)) / (100.0 + p3 * hc);
        }
        let tcl = 100.0 * xn - 273.0;

        // skin diffusion, sweating, latent and dry respiration, radiation,
        // convection
        let hl1 = 3.05 * 0.001 * (5733.0 - 6.99 * mw - pa);
        let hl2 = if mw > W_PER_M2_PER_MET_FANGER {
            0.42 * (mw - W_PER_M2_PER_MET_FANGER)
        } else {
            0.0
        };
        let hl3 = 1.7 * 0.00001 * m * (5867.0 - pa);
        let hl4 = 0.0014 * m * (34.0 - ta);
        let hl5 = 3.96 * fcl * (xn.powi(4) - (tra / 100.0).powi(4));
        let hl6 = fcl * hc * (tcl - ta);

        let ts = 0.303 * (-0.036 * m).exp() + 0.028;
        let pmv = ts * (mw - hl1 - hl2 - hl3 - hl4 - hl5 - hl6);
        Ok(ComfortIndex::from_pmv(pmv))
    }
}

//! Dynamic whole-body sensation from regional skin temperatures.
//!
//! Each region's local sensation is a logistic function of its skin
//! temperature offset from set point, corrected by the whole-body mean offset,
//! optionally plus linear terms in the skin and core rates of change. The
//! overall vote is the weighted sum of the local sensations.

use super::{ComfortIndex, ComfortParams};
use crate::imports::*;
use crate::segment::ComfortRegion;

/// Per-segment temperatures fed to [ZhangModel::evaluate]; every array has
/// [N_SEGMENTS] entries
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct ZhangInputs {
    /// \[°C\]
    pub skin_temperature: Array1<f64>,
    /// \[K/s\]
    pub skin_rate: Array1<f64>,
    /// \[°C\]
    pub core_temperature: Array1<f64>,
    /// \[K/s\]
    pub core_rate: Array1<f64>,
    /// \[°C\]
    pub skin_set_point: Array1<f64>,
}

/// Regression coefficients of one region
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, ApproxEq)]
pub struct RegionCoefficients {
    pub weight: f64,
    /// static gain when the skin is below its set point
    pub c1_cool: f64,
    /// static gain when the skin is at or above its set point
    pub c1_warm: f64,
    /// whole-body offset gain
    pub k1: f64,
    /// skin rate gain while cooling
    pub c2_cool: f64,
    /// skin rate gain while warming
    pub c2_warm: f64,
    /// core rate gain
    pub c3: f64,
}

impl RegionCoefficients {
    const fn new(weight: f64, c: [f64; 6]) -> Self {
        Self {
            weight,
            c1_cool: c[0],
            c1_warm: c[1],
            k1: c[2],
            c2_cool: c[3],
            c2_warm: c[4],
            c3: c[5],
        }
    }

    /// Standard coefficients and sensation weight of `region`
    pub const fn standard(region: ComfortRegion) -> Self {
        match region {
            ComfortRegion::Head => Self::new(0.07, [0.38, 1.32, 0.18, 543.0, 90.0, 0.0]),
            ComfortRegion::Chest => Self::new(0.35, [0.35, 0.60, 0.10, 39.0, 136.0, -2135.0]),
            ComfortRegion::LowerArm => Self::new(0.14, [0.30, 0.70, 0.10, 144.0, 125.0, 0.0]),
            ComfortRegion::Hand => Self::new(0.05, [0.20, 0.45, 0.15, 19.0, 46.0, 0.0]),
            ComfortRegion::Thigh => Self::new(0.19, [0.20, 0.29, 0.11, 151.0, 263.0, 0.0]),
            ComfortRegion::LowerLeg => Self::new(0.13, [0.29, 0.40, 0.10, 206.0, 212.0, 0.0]),
            ComfortRegion::Foot => Self::new(0.07, [0.25, 0.26, 0.15, 109.0, 162.0, 0.0]),
        }
    }
}

/// Dynamic comfort model over the seven sensation regions
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct ZhangModel {
    /// coefficients in [ComfortRegion::ALL] order
    pub regions: Vec<RegionCoefficients>,
}

impl Default for ZhangModel {
    fn default() -> Self {
        Self {
            regions: ComfortRegion::ALL
                .iter()
                .map(|r| RegionCoefficients::standard(*r))
                .collect(),
        }
    }
}

impl SerdeAPI for ZhangModel {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.regions.len() == ComfortRegion::ALL.len(),
            config_err!(
                "expected {} comfort regions, got {}",
                ComfortRegion::ALL.len(),
                self.regions.len()
            )
        );
        let total: f64 = self.regions.iter().map(|r| r.weight).sum();
        ensure!(
            (total - 1.0).abs() < 1e-9,
            config_err!("comfort region weights sum to {total}, expected 1")
        );
        Ok(())
    }
}

/// Region averages of the inputs
struct RegionState {
    skin: f64,
    skin_rate: f64,
    core_rate: f64,
    set_point: f64,
}

fn region_state(region: ComfortRegion, inputs: &ZhangInputs) -> RegionState {
    let segments = region.segments();
    let mean = |values: &Array1<f64>| {
        segments.iter().map(|s| values[s.index()]).sum::<f64>() / segments.len() as f64
    };
    RegionState {
        skin: mean(&inputs.skin_temperature),
        skin_rate: mean(&inputs.skin_rate),
        core_rate: mean(&inputs.core_rate),
        set_point: mean(&inputs.skin_set_point),
    }
}

impl ZhangModel {
    /// Local sensation per region in [ComfortRegion::ALL] order
    pub fn local_sensations(
        &self,
        inputs: &ZhangInputs,
        params: &ComfortParams,
    ) -> anyhow::Result<Vec<f64>> {
        let arrays = [
            &inputs.skin_temperature,
            &inputs.skin_rate,
            &inputs.core_temperature,
            &inputs.core_rate,
            &inputs.skin_set_point,
        ];
        ensure!(
            arrays.iter().all(|a| a.len() == N_SEGMENTS),
            config_err!("comfort inputs must hold {N_SEGMENTS} values each")
        );
        let mean_skin = inputs.skin_temperature.mean().unwrap_or_default();
        let mean_set_point = inputs.skin_set_point.mean().unwrap_or_default();

        Ok(ComfortRegion::ALL
            .iter()
            .zip(&self.regions)
            .map(|(region, coef)| {
                let st = region_state(*region, inputs);
                let offset = st.skin - st.set_point;
                let c1 = if st.skin < st.set_point {
                    coef.c1_cool
                } else {
                    coef.c1_warm
                };
                let body_offset = offset - (mean_skin - mean_set_point);
                let mut local =
                    4.0 * (2.0 / (1.0 + (-c1 * offset - coef.k1 * body_offset).exp()) - 1.0);
                if params.include_rate_terms {
                    let c2 = if st.skin_rate < 0.0 {
                        coef.c2_cool
                    } else {
                        coef.c2_warm
                    };
                    local += c2 * st.skin_rate + coef.c3 * st.core_rate;
                }
                local
            })
            .collect())
    }

    /// Weighted overall vote with its PPD and sensation band
    pub fn evaluate(&self, inputs: &ZhangInputs, params: &ComfortParams) -> anyhow::Result<ComfortIndex> {
        let local = self.local_sensations(inputs, params)?;
        let pmv = local
            .iter()
            .zip(&self.regions)
            .map(|(s, coef)| s * coef.weight)
            .sum();
        Ok(ComfortIndex::from_pmv(pmv))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::comfort::Sensation;

    fn at_set_point() -> ZhangInputs {
        let set_point = Array1::from_shape_fn(N_SEGMENTS, |i| 33.0 + 0.1 * i as f64);
        ZhangInputs {
            skin_temperature: set_point.clone(),
            skin_rate: Array1::zeros(N_SEGMENTS),
            core_temperature: Array1::from_elem(N_SEGMENTS, 37.0),
            core_rate: Array1::zeros(N_SEGMENTS),
            skin_set_point: set_point,
        }
    }

    #[test]
    fn test_weights_sum_to_one() {
        let model = ZhangModel::from_yaml(ZhangModel::default().to_yaml().unwrap()).unwrap();
        assert_eq!(model.regions.len(), 7);
    }

    #[test]
    fn test_neutral_at_set_point() {
        let index = ZhangModel::default()
            .evaluate(&at_set_point(), &ComfortParams::default())
            .unwrap();
        assert_eq!(index.pmv, 0.0);
        assert_eq!(index.sensation, Sensation::Neutral);
        assert!(index.ppd.approx_eq(&5.0, 1e-12));
    }

    #[test]
    fn test_cool_skin_uses_cool_gain() {
        let mut inputs = at_set_point();
        inputs.skin_temperature -= 2.0;
        let local = ZhangModel::default()
            .local_sensations(&inputs, &ComfortParams::default())
            .unwrap();
        // uniform offset cancels the whole-body term
        let head = 4.0 * (2.0 / (1.0 + (0.38_f64 * 2.0).exp()) - 1.0);
        assert!(local[0].approx_eq(&head, 1e-12));
        let index = ZhangModel::default()
            .evaluate(&inputs, &ComfortParams::default())
            .unwrap();
        assert!(index.pmv < -1.0);
    }

    #[test]
    fn test_rate_terms_only_when_enabled() {
        let mut inputs = at_set_point();
        inputs.skin_rate.fill(-1e-3);
        let model = ZhangModel::default();
        let off = model.evaluate(&inputs, &ComfortParams::default()).unwrap();
        let on = model
            .evaluate(
                &inputs,
                &ComfortParams {
                    include_rate_terms: true,
                    ..Default::default()
                },
            )
            .unwrap();
        assert_eq!(off.pmv, 0.0);
        assert!(on.pmv < 0.0);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let mut inputs = at_set_point();
        inputs.core_rate = Array1::zeros(3);
        assert!(ZhangModel::default()
            .evaluate(&inputs, &ComfortParams::default())
            .is_err());
    }
}

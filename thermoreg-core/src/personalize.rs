//! Scaling of the reference body to a specific subject.

use crate::imports::*;
use crate::reference::{BloodPool, ControlCoefficients, ReferenceBody};
use std::str::FromStr;
use validator::Validate;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    #[default]
    Male,
    Female,
}

impl FromStr for Gender {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "male" | "m" => Ok(Gender::Male),
            "female" | "f" => Ok(Gender::Female),
            _ => bail!(config_err!("unknown gender {s:?}")),
        }
    }
}

/// Subject description. Optional coefficients fall back to the standard
/// subject's values.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Validate)]
pub struct Anthropometrics {
    #[serde(default)]
    pub gender: Gender,
    /// \[m\]
    #[validate(range(min = 0.5, max = 2.75))]
    pub height: f64,
    /// \[kg\]
    #[validate(range(min = 2.0, max = 650.0))]
    pub weight: f64,
    /// \[years\]
    #[validate(range(min = 0.0, max = 130.0))]
    pub age: f64,
    /// cardiac output per body surface area \[L/(min·m²)\]
    #[serde(default)]
    #[validate(range(min = 0.5, max = 10.0))]
    pub cardiac_index: Option<f64>,
    /// ageing coefficient applied to whole-body blood flow
    #[serde(default)]
    #[validate(range(min = 0.1, max = 3.0))]
    pub aging_coefficient: Option<f64>,
    /// metabolic rate relative to the standard male subject
    #[serde(default)]
    #[validate(range(min = 0.1, max = 3.0))]
    pub sex_metabolic_ratio: Option<f64>,
}

impl Default for Anthropometrics {
    fn default() -> Self {
        Self::standard()
    }
}

impl SerdeAPI for Anthropometrics {
    fn init(&mut self) -> anyhow::Result<()> {
        self.check()
    }
}

/// Ratios relating a subject to the standard subject
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, ApproxEq)]
pub struct ScalingRatios {
    /// DuBois body surface area, rounded to 2 decimals \[m²\]
    pub body_surface_area: f64,
    pub area_ratio: f64,
    pub weight_ratio: f64,
    /// whole-body blood flow \[L/h\]
    pub total_blood_flow: f64,
    pub blood_flow_ratio: f64,
    pub metabolic_ratio: f64,
}

impl Anthropometrics {
    /// The subject the reference tables were tabulated for
    pub fn standard() -> Self {
        Self {
            gender: Gender::Male,
            height: 1.72,
            weight: 74.43,
            age: 35.0,
            cardiac_index: None,
            aging_coefficient: None,
            sex_metabolic_ratio: None,
        }
    }

    /// Range validation plus a finiteness check, since NaN passes range rules
    pub fn check(&self) -> anyhow::Result<()> {
        let finite = [self.height, self.weight, self.age]
            .into_iter()
            .chain(self.cardiac_index)
            .chain(self.aging_coefficient)
            .chain(self.sex_metabolic_ratio)
            .all(f64::is_finite);
        ensure!(
            finite,
            config_err!("{}\nanthropometrics must be finite", format_dbg!(self))
        );
        self.validate()
            .map_err(|e| config_err!("invalid anthropometrics: {e}"))?;
        Ok(())
    }

    /// Ratios against `reference`'s standard subject
    pub fn ratios(&self, reference: &ReferenceBody) -> ScalingRatios {
        let subject = &reference.subject;
        let body_surface_area = utils::round_to(
            0.202 * self.weight.powf(0.425) * self.height.powf(0.725),
            2,
        );
        let area_ratio = body_surface_area / subject.body_surface_area;
        let weight_ratio = utils::round_to(self.weight, 2) / subject.weight;
        let total_blood_flow = self.cardiac_index.unwrap_or(subject.cardiac_index)
            * 60.0
            * body_surface_area
            * self.aging_coefficient.unwrap_or(1.0);
        ScalingRatios {
            body_surface_area,
            area_ratio,
            weight_ratio,
            total_blood_flow,
            blood_flow_ratio: total_blood_flow / subject.total_blood_flow,
            metabolic_ratio: area_ratio * self.sex_metabolic_ratio.unwrap_or(1.0),
        }
    }

    /// Scales `reference` to this subject
    pub fn personalize(&self, reference: &ReferenceBody) -> anyhow::Result<ParameterBundle> {
        self.check()?;
        reference.validate()?;
        let ratios = self.ratios(reference);
        log::debug!("personalization ratios: {:?}", ratios);

        let mut bundle = ParameterBundle::from_reference(reference);
        bundle.surface_area *= ratios.area_ratio;
        bundle.weight *= ratios.weight_ratio;
        bundle.heat_capacity *= ratios.weight_ratio;
        bundle.blood_pool.heat_capacity *= ratios.blood_flow_ratio;
        bundle.basal_blood_flow *= ratios.blood_flow_ratio;
        bundle.metabolic_rate *= ratios.metabolic_ratio;
        bundle.work_distribution *= ratios.metabolic_ratio;
        bundle.basal_met *= self.sex_metabolic_ratio.unwrap_or(1.0);
        bundle.check()?;
        Ok(bundle)
    }
}

/// Per-segment physiological parameters of one subject. Every table has
/// exactly [N_SEGMENTS] rows.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct ParameterBundle {
    /// \[m²\]
    pub surface_area: Array1<f64>,
    /// \[kg\]
    pub weight: Array1<f64>,
    /// 16×4 \[Wh/°C\]
    pub heat_capacity: Array2<f64>,
    /// 16×4 basal metabolic heat \[W\]
    pub metabolic_rate: Array2<f64>,
    pub work_distribution: Array1<f64>,
    /// 16×4 \[L/h\]
    pub basal_blood_flow: Array2<f64>,
    /// 16×3 \[W/°C\]
    pub conductance: Array2<f64>,
    /// 16×4 \[°C\]
    pub set_point: Array2<f64>,
    pub skin_receptor_weight: Array1<f64>,
    pub sweat_distribution: Array1<f64>,
    pub vasodilation_distribution: Array1<f64>,
    pub vasoconstriction_distribution: Array1<f64>,
    pub shivering_distribution: Array1<f64>,
    /// 16×3
    pub heat_exchange: Array2<f64>,
    pub blood_pool: BloodPool,
    pub control: ControlCoefficients,
    /// basal metabolic rate \[met\]
    pub basal_met: f64,
    /// total surface area of the unscaled reference body \[m²\]; geometry
    /// rescaling is measured against it
    pub reference_surface_area: f64,
}

impl SerdeAPI for ParameterBundle {
    fn init(&mut self) -> anyhow::Result<()> {
        self.check()
    }
}

fn rows<const N: usize>(reference: &ReferenceBody, f: impl Fn(&crate::reference::SegmentRecord) -> [f64; N]) -> Array2<f64> {
    Array2::from_shape_fn((N_SEGMENTS, N), |(i, j)| f(&reference.segments[i])[j])
}

fn column(reference: &ReferenceBody, f: impl Fn(&crate::reference::SegmentRecord) -> f64) -> Array1<f64> {
    reference.segments.iter().map(f).collect()
}

impl ParameterBundle {
    /// Unscaled copy of the reference tables
    pub fn from_reference(reference: &ReferenceBody) -> Self {
        Self {
            surface_area: column(reference, |r| r.surface_area),
            weight: column(reference, |r| r.weight),
            heat_capacity: rows(reference, |r| r.heat_capacity),
            metabolic_rate: rows(reference, |r| r.metabolic_rate),
            work_distribution: column(reference, |r| r.work_distribution),
            basal_blood_flow: rows(reference, |r| r.basal_blood_flow),
            conductance: rows(reference, |r| r.conductance),
            set_point: rows(reference, |r| r.set_point),
            skin_receptor_weight: column(reference, |r| r.skin_receptor_weight),
            sweat_distribution: column(reference, |r| r.sweat_distribution),
            vasodilation_distribution: column(reference, |r| r.vasodilation_distribution),
            vasoconstriction_distribution: column(reference, |r| r.vasoconstriction_distribution),
            shivering_distribution: column(reference, |r| r.shivering_distribution),
            heat_exchange: rows(reference, |r| r.heat_exchange),
            blood_pool: reference.blood_pool.clone(),
            control: reference.control.clone(),
            basal_met: reference.subject.basal_met,
            reference_surface_area: reference.segments.iter().map(|r| r.surface_area).sum(),
        }
    }

    pub fn total_surface_area(&self) -> f64 {
        self.surface_area.sum()
    }

    /// Adopts the segment areas of a geometry and rescales the metabolic
    /// quantities by `(actual/reference)^exponent` of the total area, where
    /// the reference is the unscaled reference body whatever the subject.
    pub fn scale_to_surface_area(
        mut self,
        segment_areas: ArrayView1<f64>,
        exponent: f64,
    ) -> anyhow::Result<Self> {
        ensure!(
            segment_areas.len() == N_SEGMENTS,
            config_err!("expected {N_SEGMENTS} segment areas, got {}", segment_areas.len())
        );
        ensure!(
            segment_areas.iter().all(|a| a.is_finite() && *a > 0.0),
            config_err!("segment areas must be positive")
        );
        let factor = (segment_areas.sum() / self.reference_surface_area).powf(exponent);
        self.surface_area.assign(&segment_areas);
        for col in 0..3 {
            self.metabolic_rate.column_mut(col).mapv_inplace(|x| x * factor);
            self.basal_blood_flow.column_mut(col).mapv_inplace(|x| x * factor);
            self.conductance.column_mut(col).mapv_inplace(|x| x * factor);
        }
        self.work_distribution *= factor;
        self.sweat_distribution *= factor;
        self.shivering_distribution *= factor;
        self.basal_met *= factor;
        self.check()?;
        Ok(self)
    }

    /// Shape and finiteness invariants
    pub fn check(&self) -> anyhow::Result<()> {
        let vectors = [
            ("surface_area", &self.surface_area),
            ("weight", &self.weight),
            ("work_distribution", &self.work_distribution),
            ("skin_receptor_weight", &self.skin_receptor_weight),
            ("sweat_distribution", &self.sweat_distribution),
            ("vasodilation_distribution", &self.vasodilation_distribution),
            ("vasoconstriction_distribution", &self.vasoconstriction_distribution),
            ("shivering_distribution", &self.shivering_distribution),
        ];
        for (name, v) in vectors {
            ensure!(
                v.len() == N_SEGMENTS && utils::all_finite(v),
                config_err!("`{name}` must hold {N_SEGMENTS} finite values")
            );
        }
        let tables = [
            ("heat_capacity", &self.heat_capacity, N_COMPARTMENTS),
            ("metabolic_rate", &self.metabolic_rate, N_COMPARTMENTS),
            ("basal_blood_flow", &self.basal_blood_flow, N_COMPARTMENTS),
            ("conductance", &self.conductance, N_COMPARTMENTS - 1),
            ("set_point", &self.set_point, N_COMPARTMENTS),
            ("heat_exchange", &self.heat_exchange, 3),
        ];
        for (name, t, ncols) in tables {
            ensure!(
                t.dim() == (N_SEGMENTS, ncols) && utils::all_finite(t),
                config_err!("`{name}` must be a finite {N_SEGMENTS}x{ncols} table")
            );
        }
        ensure!(
            self.reference_surface_area.is_finite() && self.reference_surface_area > 0.0,
            config_err!("reference surface area must be positive")
        );
        ensure!(
            self.heat_capacity.iter().all(|c| *c > 0.0) && self.blood_pool.heat_capacity > 0.0,
            config_err!("heat capacities must be positive")
        );
        Ok(())
    }
}

#[cfg(all(test, feature = "resources"))]
mod tests {
    use super::*;

    #[test]
    fn test_standard_subject_reproduces_reference() {
        let reference = ReferenceBody::standard().unwrap();
        let ratios = Anthropometrics::standard().ratios(&reference);
        assert_eq!(ratios.area_ratio, 1.0);
        assert_eq!(ratios.weight_ratio, 1.0);
        assert!(ratios.blood_flow_ratio.approx_eq(&1.0, 1e-12));
        let bundle = Anthropometrics::standard().personalize(&reference).unwrap();
        assert!(bundle.approx_eq(&ParameterBundle::from_reference(&reference), 1e-12));
    }

    #[test]
    fn test_larger_subject_scales_area_mass_and_blood() {
        let reference = ReferenceBody::standard().unwrap();
        let subject = Anthropometrics {
            height: 1.85,
            weight: 90.0,
            ..Anthropometrics::standard()
        };
        let ratios = subject.ratios(&reference);
        let bundle = subject.personalize(&reference).unwrap();
        let base = ParameterBundle::from_reference(&reference);
        let head = Segment::Head.index();
        assert!(ratios.area_ratio > 1.0);
        assert!(bundle.surface_area[head].approx_eq(&(base.surface_area[head] * ratios.area_ratio), 1e-12));
        assert!(bundle.heat_capacity[[head, 2]]
            .approx_eq(&(base.heat_capacity[[head, 2]] * 90.0 / 74.43), 1e-12));
        assert!(bundle
            .blood_pool
            .heat_capacity
            .approx_eq(&(base.blood_pool.heat_capacity * ratios.blood_flow_ratio), 1e-12));
        // conductances and set points are not subject-specific
        assert_eq!(bundle.conductance, base.conductance);
        assert_eq!(bundle.set_point, base.set_point);
    }

    #[test]
    fn test_invalid_anthropometrics_fail_fast() {
        let reference = ReferenceBody::standard().unwrap();
        for subject in [
            Anthropometrics {
                height: 0.0,
                ..Anthropometrics::standard()
            },
            Anthropometrics {
                weight: -3.0,
                ..Anthropometrics::standard()
            },
            Anthropometrics {
                weight: f64::NAN,
                ..Anthropometrics::standard()
            },
        ] {
            let err = subject.personalize(&reference).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<ThermoError>(),
                Some(ThermoError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_sex_ratio_scales_metabolism_and_basal_met() {
        let reference = ReferenceBody::standard().unwrap();
        let subject = Anthropometrics {
            gender: Gender::Female,
            sex_metabolic_ratio: Some(0.9),
            ..Anthropometrics::standard()
        };
        let bundle = subject.personalize(&reference).unwrap();
        let base = ParameterBundle::from_reference(&reference);
        assert!(bundle.metabolic_rate.approx_eq(&(&base.metabolic_rate * 0.9), 1e-12));
        assert!(bundle.basal_met.approx_eq(&(0.778 * 0.9), 1e-12));
    }

    #[test]
    fn test_surface_area_scaling_uses_exponent() {
        let reference = ReferenceBody::standard().unwrap();
        let base = ParameterBundle::from_reference(&reference);
        let doubled = &base.surface_area * 2.0;
        let scaled = base.clone().scale_to_surface_area(doubled.view(), 1.5).unwrap();
        let factor = 2f64.powf(1.5);
        assert!(scaled.metabolic_rate[[0, 0]].approx_eq(&(base.metabolic_rate[[0, 0]] * factor), 1e-12));
        // skin metabolism is not rescaled
        assert_eq!(scaled.metabolic_rate[[0, 3]], base.metabolic_rate[[0, 3]]);
        assert!(scaled.conductance[[2, 2]].approx_eq(&(base.conductance[[2, 2]] * factor), 1e-12));
        assert!(scaled.basal_met.approx_eq(&(base.basal_met * factor), 1e-12));
        assert_eq!(scaled.vasodilation_distribution, base.vasodilation_distribution);
    }

    #[test]
    fn test_surface_area_scaling_of_personalized_subject_uses_reference_total() {
        let reference = ReferenceBody::standard().unwrap();
        let subject = Anthropometrics {
            height: 1.85,
            weight: 90.0,
            ..Anthropometrics::standard()
        };
        let bundle = subject.personalize(&reference).unwrap();
        assert!(bundle.reference_surface_area.approx_eq(&1.869, 1e-9));
        assert!(bundle.total_surface_area() > bundle.reference_surface_area);

        let mesh_areas = &bundle.surface_area * 1.2;
        let factor = (mesh_areas.sum() / 1.869).powf(1.5);
        let scaled = bundle
            .clone()
            .scale_to_surface_area(mesh_areas.view(), 1.5)
            .unwrap();
        assert!(scaled.basal_met.approx_eq(&(bundle.basal_met * factor), 1e-12));
        assert!(scaled.metabolic_rate[[1, 1]]
            .approx_eq(&(bundle.metabolic_rate[[1, 1]] * factor), 1e-12));
        assert_eq!(scaled.reference_surface_area, bundle.reference_surface_area);
    }

    #[test]
    fn test_gender_parses() {
        assert_eq!("Female".parse::<Gender>().unwrap(), Gender::Female);
        assert!("x".parse::<Gender>().is_err());
    }
}

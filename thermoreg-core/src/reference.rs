//! Reference (standard) body dataset: per-segment physiological tables of
//! the 65-node thermoregulation model for the standard subject.

use crate::imports::*;

/// Schema version the loader accepts. Bump whenever a table is added, removed
/// or changes meaning.
pub const REFERENCE_SCHEMA_VERSION: u32 = 1;

/// Anthropometric description of the subject the tables were tabulated for
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct StandardSubject {
    /// \[m\]
    pub height: f64,
    /// \[kg\]
    pub weight: f64,
    /// \[years\]
    pub age: f64,
    /// DuBois body surface area \[m²\]
    pub body_surface_area: f64,
    /// cardiac output per body surface area \[L/(min·m²)\]
    pub cardiac_index: f64,
    /// whole-body basal blood flow \[L/h\]
    pub total_blood_flow: f64,
    /// whole-body basal metabolic heat \[W\]
    pub whole_body_metabolism: f64,
    /// basal metabolic rate \[met\]
    pub basal_met: f64,
}

/// One row of every per-segment table
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct SegmentRecord {
    pub segment: Segment,
    /// \[m²\]
    pub surface_area: f64,
    /// \[kg\]
    pub weight: f64,
    /// core, muscle, fat, skin \[Wh/°C\]
    pub heat_capacity: [f64; 4],
    /// basal metabolic heat of core, muscle, fat, skin \[W\]
    pub metabolic_rate: [f64; 4],
    /// share of external work heat released in this segment's muscle
    pub work_distribution: f64,
    /// core, muscle, fat, skin \[L/h\]
    pub basal_blood_flow: [f64; 4],
    /// core-muscle, muscle-fat, fat-skin \[W/°C\]
    pub conductance: [f64; 3],
    /// core, muscle, fat, skin \[°C\]
    pub set_point: [f64; 4],
    pub skin_receptor_weight: f64,
    pub sweat_distribution: f64,
    pub vasodilation_distribution: f64,
    pub vasoconstriction_distribution: f64,
    pub shivering_distribution: f64,
    /// radiative, convective, evaporative \[W/(m²·°C), W/(m²·°C), W/(m²·kPa)\]
    pub heat_exchange: [f64; 3],
    /// basal heat production of core, muscle, fat, skin and basal
    /// evaporation \[W\]
    pub basal_heat_and_evaporation: [f64; 5],
}

/// Central blood pool
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct BloodPool {
    /// \[Wh/°C\]
    pub heat_capacity: f64,
    /// \[°C\]
    pub set_point: f64,
}

/// Gains of the thermoregulatory control laws. `c*` multiply the head core
/// error, `s*` the skin error balance, `p*` the product of both.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct ControlCoefficients {
    pub cch: f64,
    pub sch: f64,
    pub pch: f64,
    pub csw: f64,
    pub ssw: f64,
    pub psw: f64,
    pub cdl: f64,
    pub sdl: f64,
    pub pdl: f64,
    pub cst: f64,
    pub sst: f64,
    pub pst: f64,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct ReferenceBody {
    pub schema_version: u32,
    pub subject: StandardSubject,
    /// one record per segment, in [Segment::ALL] order
    pub segments: Vec<SegmentRecord>,
    pub blood_pool: BloodPool,
    pub control: ControlCoefficients,
}

impl SerdeAPI for ReferenceBody {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate()
    }
}

impl ReferenceBody {
    /// Standard body bundled with the crate
    #[cfg(feature = "resources")]
    pub fn standard() -> anyhow::Result<Self> {
        Self::from_resource("standard_body.yaml")
            .with_context(|| format_dbg!("failed to load bundled standard body"))
    }

    pub fn record(&self, segment: Segment) -> &SegmentRecord {
        &self.segments[segment.index()]
    }

    /// Sum of the segment surface areas \[m²\]
    pub fn total_surface_area(&self) -> f64 {
        self.segments.iter().map(|r| r.surface_area).sum()
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.schema_version == REFERENCE_SCHEMA_VERSION,
            config_err!(
                "reference dataset schema version {} is not supported (expected {})",
                self.schema_version,
                REFERENCE_SCHEMA_VERSION
            )
        );
        ensure!(
            self.segments.len() == N_SEGMENTS,
            config_err!(
                "reference dataset has {} segment records, expected {}",
                self.segments.len(),
                N_SEGMENTS
            )
        );
        for (record, expected) in self.segments.iter().zip(Segment::ALL) {
            ensure!(
                record.segment == expected,
                config_err!(
                    "segment record {} is out of order, expected {}",
                    record.segment,
                    expected
                )
            );
            let values = [record.surface_area, record.weight, record.work_distribution]
                .into_iter()
                .chain(record.heat_capacity)
                .chain(record.metabolic_rate)
                .chain(record.basal_blood_flow)
                .chain(record.conductance)
                .chain(record.set_point)
                .chain([
                    record.skin_receptor_weight,
                    record.sweat_distribution,
                    record.vasodilation_distribution,
                    record.vasoconstriction_distribution,
                    record.shivering_distribution,
                ])
                .chain(record.heat_exchange)
                .chain(record.basal_heat_and_evaporation);
            for value in values {
                ensure!(
                    value.is_finite() && value >= 0.0,
                    config_err!("{}: tabulated values must be finite and non-negative", record.segment)
                );
            }
            ensure!(
                record.surface_area > 0.0 && record.heat_capacity.iter().all(|c| *c > 0.0),
                config_err!(
                    "{}: surface area and heat capacities must be positive",
                    record.segment
                )
            );
        }
        ensure!(
            self.blood_pool.heat_capacity > 0.0,
            config_err!("blood pool heat capacity must be positive")
        );
        let s = &self.subject;
        ensure!(
            [
                s.height,
                s.weight,
                s.body_surface_area,
                s.cardiac_index,
                s.total_blood_flow
            ]
            .iter()
            .all(|x| x.is_finite() && *x > 0.0),
            config_err!("{}\nstandard subject must be positive", format_dbg!(s))
        );
        Ok(())
    }
}

#[cfg(all(test, feature = "resources"))]
mod tests {
    use super::*;

    #[test]
    fn test_standard_body_loads_and_is_consistent() {
        let body = ReferenceBody::standard().unwrap();
        assert_eq!(body.segments.len(), N_SEGMENTS);
        assert!(body.total_surface_area().approx_eq(&1.869, 1e-9));
        // tabulated basal flows add up to the whole-body figure
        let flow: f64 = body
            .segments
            .iter()
            .map(|r| r.basal_blood_flow.iter().sum::<f64>())
            .sum();
        assert!((flow - body.subject.total_blood_flow).abs() < 0.5, "{flow}");
        assert_eq!(body.record(Segment::LeftHand).segment, Segment::LeftHand);
    }

    #[test]
    fn test_schema_version_is_pinned() {
        let mut body = ReferenceBody::standard().unwrap();
        body.schema_version = 0;
        let err = body.validate().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ThermoError>(),
            Some(ThermoError::Configuration(_))
        ));
    }

    #[test]
    fn test_missing_segment_is_rejected() {
        let mut body = ReferenceBody::standard().unwrap();
        body.segments.pop();
        assert!(ReferenceBody::from_yaml(body.to_yaml().unwrap()).is_err());
    }

    #[test]
    fn test_negative_value_is_rejected() {
        let mut body = ReferenceBody::standard().unwrap();
        body.segments[3].conductance[1] = -0.1;
        assert!(body.validate().is_err());
    }
}

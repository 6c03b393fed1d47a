//! Radiant flux served per element, with redistribution between segment
//! resolution and element resolution.

use crate::geometry::GeometryIndexing;
use crate::imports::*;
use std::collections::BTreeMap;

/// Radiant flux density \[W/m²\], one value per segment or per element
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
#[serde(try_from = "RadiationDef", into = "Vec<f64>")]
pub struct RadiationFlux {
    values: Vec<f64>,
}

/// Accepted serialized forms of a radiation definition
#[derive(Deserialize)]
#[serde(untagged)]
enum RadiationDef {
    Values(Vec<f64>),
    BySegment(BTreeMap<String, f64>),
}

impl TryFrom<RadiationDef> for RadiationFlux {
    type Error = anyhow::Error;

    fn try_from(def: RadiationDef) -> Result<Self, Self::Error> {
        match def {
            RadiationDef::Values(values) => Self::new(values),
            RadiationDef::BySegment(map) => Self::by_segment(&map),
        }
    }
}

impl From<RadiationFlux> for Vec<f64> {
    fn from(flux: RadiationFlux) -> Self {
        flux.values
    }
}

impl SerdeAPI for RadiationFlux {}

impl RadiationFlux {
    pub fn new(values: Vec<f64>) -> anyhow::Result<Self> {
        ensure!(
            !values.is_empty(),
            config_err!("radiation definition has no values")
        );
        ensure!(
            utils::all_finite(&values),
            config_err!("radiation definition contains non-finite values")
        );
        Ok(Self { values })
    }

    /// Builds a 16-value flux from segment labels or symmetric names; missing
    /// segments receive no flux
    pub fn by_segment(map: &BTreeMap<String, f64>) -> anyhow::Result<Self> {
        let mut values = vec![0.0; N_SEGMENTS];
        // symmetric names first so an explicit side label wins
        let mut entries: Vec<(&String, &f64)> = map.iter().collect();
        entries.sort_by_key(|(key, _)| key.parse::<Segment>().is_ok());
        for (key, flux) in entries {
            let segments = Segment::resolve(key)
                .ok_or_else(|| config_err!("radiation definition: unknown segment {key:?}"))?;
            for segment in segments {
                values[segment.index()] = *flux;
            }
        }
        Self::new(values)
    }

    /// Same flux density on every segment
    pub fn uniform(flux: f64) -> anyhow::Result<Self> {
        Self::new(vec![flux; N_SEGMENTS])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// Flux density per solved element \[W/m²\].
    ///
    /// Segment-resolution values are applied to every element of the
    /// segment. Values at output resolution are averaged per segment by area
    /// when the model solves fewer elements than it reports on.
    pub fn redistribute<G: GeometryIndexing + ?Sized>(
        &self,
        indexing: &G,
        source_name: &str,
    ) -> anyhow::Result<Array1<f64>> {
        let n = indexing.n_elements();
        let n_out = indexing.n_output_elements();
        let found = self.values.len();
        if found == n {
            return Ok(Array1::from_vec(self.values.clone()));
        }
        let per_segment: Array1<f64> = if found == N_SEGMENTS {
            Array1::from_vec(self.values.clone())
        } else if found == n_out {
            let mut sum = Array1::<f64>::zeros(N_SEGMENTS);
            let mut weight = Array1::<f64>::zeros(N_SEGMENTS);
            for (out, flux) in self.values.iter().enumerate() {
                let seg = indexing.output_segment_of(out).index();
                let frac = indexing.output_area_fraction_of(out);
                sum[seg] += flux * frac;
                weight[seg] += frac;
            }
            Zip::from(&mut sum).and(&weight).for_each(|s, &w| {
                if w > 0.0 {
                    *s /= w
                }
            });
            sum
        } else {
            bail!(ThermoError::BoundaryMismatch {
                source_name: source_name.to_string(),
                found,
                elements: n_out,
            });
        };
        Ok(Array1::from_iter(
            (0..n).map(|e| per_segment[indexing.segment_of(e).index()]),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{MeshGeometry, MeshIndexing, ProjectedIndexing};

    fn mesh(per_segment: usize) -> MeshIndexing {
        MeshIndexing::new(MeshGeometry::uniform_split(
            Array1::from_elem(N_SEGMENTS, 0.1).view(),
            per_segment,
        ))
        .unwrap()
    }

    #[test]
    fn test_map_definition_with_symmetric_names() {
        let flux: RadiationFlux = serde_yaml::from_str("{Arm: 50.0, R-arm: 80.0, Head: 10.0}").unwrap();
        assert_eq!(flux.len(), N_SEGMENTS);
        assert_eq!(flux.values()[Segment::LeftArm.index()], 50.0);
        assert_eq!(flux.values()[Segment::RightArm.index()], 80.0);
        assert_eq!(flux.values()[Segment::Head.index()], 10.0);
        assert_eq!(flux.values()[Segment::Chest.index()], 0.0);
    }

    #[test]
    fn test_list_definition_round_trips_as_list() {
        let flux = RadiationFlux::from_json("[1.0, 2.0, 3.0]").unwrap();
        assert_eq!(flux.to_json().unwrap(), "[1.0,2.0,3.0]");
        assert!(RadiationFlux::from_yaml("{Tail: 3.0}").is_err());
    }

    #[test]
    fn test_segment_flux_applies_to_every_element() {
        let indexing = mesh(3);
        let mut values = vec![0.0; N_SEGMENTS];
        values[Segment::Back.index()] = 100.0;
        let per_element = RadiationFlux::new(values)
            .unwrap()
            .redistribute(&indexing, "sun")
            .unwrap();
        assert_eq!(per_element.len(), 48);
        for &e in indexing.elements_of(Segment::Back) {
            assert_eq!(per_element[e], 100.0);
        }
        assert_eq!(per_element.sum(), 300.0);
    }

    #[test]
    fn test_element_flux_is_averaged_onto_projected_segments() {
        let geometry = MeshGeometry::uniform_split(Array1::from_elem(N_SEGMENTS, 0.1).view(), 2);
        let indexing = ProjectedIndexing::with_target(geometry).unwrap();
        let values: Vec<f64> = (0..32).map(|i| if i % 2 == 0 { 10.0 } else { 30.0 }).collect();
        let per_segment = RadiationFlux::new(values)
            .unwrap()
            .redistribute(&indexing, "lamp")
            .unwrap();
        assert_eq!(per_segment.len(), N_SEGMENTS);
        assert!(per_segment.iter().all(|f| f.approx_eq(&20.0, 1e-12)));
    }

    #[test]
    fn test_mismatched_count_is_a_boundary_error() {
        let err = RadiationFlux::new(vec![1.0; 7])
            .unwrap()
            .redistribute(&mesh(2), "window")
            .unwrap_err();
        match err.downcast_ref::<ThermoError>() {
            Some(ThermoError::BoundaryMismatch {
                found, elements, ..
            }) => {
                assert_eq!(*found, 7);
                assert_eq!(*elements, 32);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

//! Element indexing. The thermal model solves one 4-compartment state per
//! element; a [GeometryIndexing] strategy says which segment each element
//! belongs to and how results map back to the elements a caller reports on.
//!
//! - [MeshIndexing]: one element per mesh face
//! - [ProjectedIndexing]: one element per segment, optionally expanded onto a
//!   mesh for reporting

use crate::imports::*;

pub trait GeometryIndexing {
    /// Number of elements the thermal state is solved on
    fn n_elements(&self) -> usize;

    fn segment_of(&self, element: usize) -> Segment;

    /// Fraction of its segment's surface area that `element` represents
    fn area_fraction_of(&self, element: usize) -> f64;

    /// Solved elements belonging to `segment`
    fn elements_of(&self, segment: Segment) -> &[usize];

    /// Exposed face regions get fixed exchange coefficients regardless of
    /// clothing
    fn is_exposed_face(&self, _element: usize) -> bool {
        false
    }

    /// Segment surface areas \[m²\] measured on the geometry, if it carries
    /// its own; `None` keeps the personalized areas
    fn segment_areas(&self) -> Option<Array1<f64>>;

    /// Number of elements results are reported on
    fn n_output_elements(&self) -> usize;

    fn output_segment_of(&self, output_element: usize) -> Segment;

    fn output_area_fraction_of(&self, output_element: usize) -> f64;

    /// Maps one value per solved element onto the output elements
    fn expand_segment_result_to_elements(&self, values: ArrayView1<f64>) -> Array1<f64>;
}

/// Output of the geometry preprocessing step for a surface mesh
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct MeshGeometry {
    /// parent segment of every element
    pub element_segment: Vec<Segment>,
    /// absolute surface area of every element \[m²\]
    pub element_area: Vec<f64>,
    /// exposed face region flags; empty means none
    #[serde(default)]
    pub exposed_face: Vec<bool>,
}

impl SerdeAPI for MeshGeometry {
    fn init(&mut self) -> anyhow::Result<()> {
        self.validate()
    }
}

impl MeshGeometry {
    /// Builds a geometry from one membership mask per segment, as produced by
    /// mesh segmentation. Every element must belong to exactly one segment.
    pub fn from_membership_masks(
        masks: &[Vec<bool>],
        element_area: Vec<f64>,
        exposed_face: Option<Vec<bool>>,
    ) -> anyhow::Result<Self> {
        ensure!(
            masks.len() == N_SEGMENTS,
            config_err!("expected {N_SEGMENTS} membership masks, got {}", masks.len())
        );
        let n = element_area.len();
        let mut element_segment = Vec::with_capacity(n);
        for element in 0..n {
            let mut owners = masks
                .iter()
                .enumerate()
                .filter(|(_, mask)| mask.get(element).copied().unwrap_or(false))
                .map(|(i, _)| i);
            let owner = owners
                .next()
                .ok_or_else(|| config_err!("element {element} belongs to no segment"))?;
            ensure!(
                owners.next().is_none(),
                config_err!("element {element} belongs to more than one segment")
            );
            // indices come from a mask list of length N_SEGMENTS
            element_segment.push(Segment::ALL[owner]);
        }
        let geometry = Self {
            element_segment,
            element_area,
            exposed_face: exposed_face.unwrap_or_default(),
        };
        geometry.validate()?;
        Ok(geometry)
    }

    /// Splits every segment of `segment_areas` into `per_segment` equal elements
    pub fn uniform_split(segment_areas: ArrayView1<f64>, per_segment: usize) -> Self {
        let mut element_segment = Vec::with_capacity(N_SEGMENTS * per_segment);
        let mut element_area = Vec::with_capacity(N_SEGMENTS * per_segment);
        for (segment, area) in Segment::ALL.iter().zip(segment_areas.iter()) {
            for _ in 0..per_segment {
                element_segment.push(*segment);
                element_area.push(area / per_segment as f64);
            }
        }
        Self {
            element_segment,
            element_area,
            exposed_face: vec![],
        }
    }

    pub fn n_elements(&self) -> usize {
        self.element_area.len()
    }

    /// Sum of element areas per segment \[m²\]
    pub fn segment_areas(&self) -> Array1<f64> {
        let mut areas = Array1::zeros(N_SEGMENTS);
        for (segment, area) in self.element_segment.iter().zip(&self.element_area) {
            areas[segment.index()] += area;
        }
        areas
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        let n = self.n_elements();
        ensure!(n > 0, config_err!("mesh geometry has no elements"));
        ensure!(
            self.element_segment.len() == n,
            config_err!(
                "{} segment memberships for {n} element areas",
                self.element_segment.len()
            )
        );
        ensure!(
            self.exposed_face.is_empty() || self.exposed_face.len() == n,
            config_err!(
                "{} exposed face flags for {n} elements",
                self.exposed_face.len()
            )
        );
        ensure!(
            self.element_area.iter().all(|a| a.is_finite() && *a > 0.0),
            config_err!("element areas must be positive")
        );
        let areas = self.segment_areas();
        if let Some(empty) = Segment::ALL.iter().find(|s| areas[s.index()] == 0.0) {
            bail!(config_err!("segment {empty} has no elements"));
        }
        Ok(())
    }
}

/// Elements of each segment, in table order
fn group_by_segment(segments: impl Iterator<Item = Segment>) -> Vec<Vec<usize>> {
    let mut members = vec![Vec::new(); N_SEGMENTS];
    for (element, segment) in segments.enumerate() {
        members[segment.index()].push(element);
    }
    members
}

/// One element per mesh face
#[derive(Debug, Clone, PartialEq)]
pub struct MeshIndexing {
    geometry: MeshGeometry,
    fractions: Vec<f64>,
    members: Vec<Vec<usize>>,
}

impl MeshIndexing {
    pub fn new(geometry: MeshGeometry) -> anyhow::Result<Self> {
        geometry.validate()?;
        let areas = geometry.segment_areas();
        let fractions = geometry
            .element_segment
            .iter()
            .zip(&geometry.element_area)
            .map(|(segment, area)| area / areas[segment.index()])
            .collect();
        let members = group_by_segment(geometry.element_segment.iter().copied());
        Ok(Self {
            geometry,
            fractions,
            members,
        })
    }

    pub fn geometry(&self) -> &MeshGeometry {
        &self.geometry
    }
}

impl GeometryIndexing for MeshIndexing {
    fn n_elements(&self) -> usize {
        self.geometry.n_elements()
    }

    fn segment_of(&self, element: usize) -> Segment {
        self.geometry.element_segment[element]
    }

    fn area_fraction_of(&self, element: usize) -> f64 {
        self.fractions[element]
    }

    fn elements_of(&self, segment: Segment) -> &[usize] {
        &self.members[segment.index()]
    }

    fn is_exposed_face(&self, element: usize) -> bool {
        self.geometry.exposed_face.get(element).copied().unwrap_or(false)
    }

    fn segment_areas(&self) -> Option<Array1<f64>> {
        Some(self.geometry.segment_areas())
    }

    fn n_output_elements(&self) -> usize {
        self.n_elements()
    }

    fn output_segment_of(&self, output_element: usize) -> Segment {
        self.segment_of(output_element)
    }

    fn output_area_fraction_of(&self, output_element: usize) -> f64 {
        self.area_fraction_of(output_element)
    }

    fn expand_segment_result_to_elements(&self, values: ArrayView1<f64>) -> Array1<f64> {
        values.to_owned()
    }
}

/// One element per segment. With a target mesh, results are broadcast onto
/// the mesh faces for reporting while the state stays 16 elements wide.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectedIndexing {
    members: Vec<Vec<usize>>,
    target: Option<MeshIndexing>,
}

impl Default for ProjectedIndexing {
    fn default() -> Self {
        Self::new()
    }
}

impl ProjectedIndexing {
    pub fn new() -> Self {
        Self {
            members: group_by_segment(Segment::ALL.into_iter()),
            target: None,
        }
    }

    pub fn with_target(geometry: MeshGeometry) -> anyhow::Result<Self> {
        Ok(Self {
            target: Some(MeshIndexing::new(geometry)?),
            ..Self::new()
        })
    }
}

impl GeometryIndexing for ProjectedIndexing {
    fn n_elements(&self) -> usize {
        N_SEGMENTS
    }

    fn segment_of(&self, element: usize) -> Segment {
        Segment::ALL[element]
    }

    fn area_fraction_of(&self, _element: usize) -> f64 {
        1.0
    }

    fn elements_of(&self, segment: Segment) -> &[usize] {
        &self.members[segment.index()]
    }

    fn segment_areas(&self) -> Option<Array1<f64>> {
        None
    }

    fn n_output_elements(&self) -> usize {
        self.target
            .as_ref()
            .map_or(N_SEGMENTS, |t| t.n_elements())
    }

    fn output_segment_of(&self, output_element: usize) -> Segment {
        match &self.target {
            Some(t) => t.segment_of(output_element),
            None => Segment::ALL[output_element],
        }
    }

    fn output_area_fraction_of(&self, output_element: usize) -> f64 {
        match &self.target {
            Some(t) => t.area_fraction_of(output_element),
            None => 1.0,
        }
    }

    fn expand_segment_result_to_elements(&self, values: ArrayView1<f64>) -> Array1<f64> {
        match &self.target {
            Some(t) => (0..t.n_elements())
                .map(|k| values[t.segment_of(k).index()])
                .collect(),
            None => values.to_owned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn areas() -> Array1<f64> {
        Array1::from_shape_fn(N_SEGMENTS, |i| 0.05 + 0.01 * i as f64)
    }

    #[test]
    fn test_uniform_split_fractions_sum_to_one_per_segment() {
        let mesh = MeshIndexing::new(MeshGeometry::uniform_split(areas().view(), 3)).unwrap();
        assert_eq!(mesh.n_elements(), 48);
        for segment in Segment::ALL {
            let total: f64 = mesh
                .elements_of(segment)
                .iter()
                .map(|e| mesh.area_fraction_of(*e))
                .sum();
            assert!(total.approx_eq(&1.0, 1e-12));
        }
        assert!(mesh.segment_areas().unwrap().approx_eq(&areas(), 1e-12));
    }

    #[test]
    fn test_membership_masks() {
        let mut masks = vec![vec![false; 17]; N_SEGMENTS];
        for (i, mask) in masks.iter_mut().enumerate() {
            mask[i] = true;
        }
        masks[Segment::Head.index()][16] = true;
        let geometry = MeshGeometry::from_membership_masks(&masks, vec![0.1; 17], None).unwrap();
        assert_eq!(geometry.element_segment[16], Segment::Head);
        let mesh = MeshIndexing::new(geometry).unwrap();
        assert_eq!(mesh.elements_of(Segment::Head), &[0, 16]);
        assert!(mesh.area_fraction_of(16).approx_eq(&0.5, 1e-12));

        masks[Segment::Chest.index()][16] = true;
        assert!(MeshGeometry::from_membership_masks(&masks, vec![0.1; 17], None).is_err());
    }

    #[test]
    fn test_missing_segment_is_a_configuration_error() {
        let mut geometry = MeshGeometry::uniform_split(areas().view(), 1);
        geometry.element_segment[Segment::RightFoot.index()] = Segment::LeftFoot;
        let err = MeshIndexing::new(geometry).unwrap_err();
        assert!(err.to_string().contains("R-foot"));
    }

    #[test]
    fn test_projected_expansion_onto_target_mesh() {
        let geometry = MeshGeometry::uniform_split(areas().view(), 2);
        let projected = ProjectedIndexing::with_target(geometry).unwrap();
        assert_eq!(projected.n_elements(), N_SEGMENTS);
        assert_eq!(projected.n_output_elements(), 32);
        let values = Array1::from_shape_fn(N_SEGMENTS, |i| i as f64);
        let expanded = projected.expand_segment_result_to_elements(values.view());
        assert_eq!(expanded[0], 0.0);
        assert_eq!(expanded[1], 0.0);
        assert_eq!(expanded[31], 15.0);
        assert_eq!(
            ProjectedIndexing::new()
                .expand_segment_result_to_elements(values.view())
                .len(),
            N_SEGMENTS
        );
    }
}

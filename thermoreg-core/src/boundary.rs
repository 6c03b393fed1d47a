//! Boundary condition snapshot pushed into the thermal model once per
//! activity and read on every derivative evaluation.

use crate::clothing::ClothingResistance;
use crate::geometry::GeometryIndexing;
use crate::imports::*;
use crate::params::ModelParams;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct BoundaryConditions {
    /// \[°C\]
    pub ambient_temperature: f64,
    /// fraction in \[0, 1\]
    pub relative_humidity: f64,
    /// \[m/s\]
    pub air_velocity: f64,
    /// metabolic rate of the current activity \[met\]
    pub met: f64,
    /// convective heat transfer coefficient per element \[W/(m²·°C)\]
    pub h_c: Array1<f64>,
    /// evaporative value per element
    pub h_e: Array1<f64>,
    /// radiant flux density per element \[W/m²\]
    pub radiant_flux: Array1<f64>,
}

impl BoundaryConditions {
    /// Thermoneutral still-air conditions over `n_elements` nude elements
    pub fn neutral(n_elements: usize) -> Self {
        Self {
            ambient_temperature: 28.8,
            relative_humidity: 0.5,
            air_velocity: 0.0,
            met: 1.0,
            h_c: Array1::from_elem(n_elements, crate::params::EXPOSED_FACE_H_C),
            h_e: Array1::from_elem(n_elements, crate::params::EXPOSED_FACE_H_E),
            radiant_flux: Array1::zeros(n_elements),
        }
    }

    pub fn n_elements(&self) -> usize {
        self.h_c.len()
    }

    /// Sets the per-element exchange values from a clothing model at the
    /// current air velocity. Exposed face elements keep the fixed values.
    pub fn set_clothing<G, C>(&mut self, clothing: &C, indexing: &G, params: &ModelParams)
    where
        G: GeometryIndexing + ?Sized,
        C: ClothingResistance + ?Sized,
    {
        let v = self.air_velocity;
        for e in 0..indexing.n_elements() {
            let (h_c, h_e) = if indexing.is_exposed_face(e) {
                (params.exposed_face_h_c, params.exposed_face_h_e)
            } else {
                let segment = indexing.segment_of(e);
                (
                    clothing.heat_transfer_coefficient(segment, v),
                    clothing.vapour_transfer_coefficient(segment, v),
                )
            };
            self.h_c[e] = h_c;
            self.h_e[e] = h_e;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(
            self.ambient_temperature.is_finite()
                && (-50.0..=100.0).contains(&self.ambient_temperature),
            config_err!("ambient temperature {} °C out of range", self.ambient_temperature)
        );
        ensure!(
            (0.0..=1.0).contains(&self.relative_humidity),
            config_err!("relative humidity {} outside [0, 1]", self.relative_humidity)
        );
        ensure!(
            self.air_velocity.is_finite() && self.air_velocity >= 0.0,
            config_err!("air velocity {} must be non-negative", self.air_velocity)
        );
        ensure!(
            self.met.is_finite() && self.met >= 0.0,
            config_err!("metabolic rate {} must be non-negative", self.met)
        );
        let n = self.n_elements();
        ensure!(
            self.h_e.len() == n && self.radiant_flux.len() == n,
            config_err!("boundary arrays disagree on element count")
        );
        ensure!(
            self.h_c.iter().chain(self.h_e.iter()).all(|h| h.is_finite() && *h > 0.0),
            config_err!("exchange coefficients must be positive")
        );
        ensure!(
            utils::all_finite(&self.radiant_flux),
            config_err!("radiant flux must be finite")
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clothing::{nude_coefficients, NudeClothing};
    use crate::geometry::{MeshGeometry, MeshIndexing};

    #[test]
    fn test_clothing_sets_values_except_on_face() {
        let mut geometry =
            MeshGeometry::uniform_split(Array1::from_elem(N_SEGMENTS, 0.1).view(), 2);
        geometry.exposed_face = vec![false; 32];
        geometry.exposed_face[0] = true;
        let indexing = MeshIndexing::new(geometry).unwrap();
        let mut bc = BoundaryConditions::neutral(32);
        bc.air_velocity = 1.0;
        bc.set_clothing(&NudeClothing, &indexing, &ModelParams::default());
        let (vapour, heat) = nude_coefficients(1.0);
        assert_eq!(bc.h_c[0], ModelParams::default().exposed_face_h_c);
        assert_eq!(bc.h_c[1], heat);
        assert_eq!(bc.h_e[31], vapour);
        bc.validate().unwrap();
    }

    #[test]
    fn test_out_of_range_humidity_is_rejected() {
        let mut bc = BoundaryConditions::neutral(N_SEGMENTS);
        bc.relative_humidity = 40.0;
        assert!(bc.validate().is_err());
    }
}

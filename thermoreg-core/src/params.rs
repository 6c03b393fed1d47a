//! Module containing physical constants and model-wide parameters.

use crate::imports::*;

/// Unit conversions that should NEVER change
pub const J_PER_CAL: f64 = 4.184;
pub const S_PER_H: f64 = 3600.0;

/// Metabolic heat per unit body surface area of 1 met \[W/m²\]
pub const W_PER_M2_PER_MET: f64 = 58.2;
/// Value of 1 met used by the steady-state comfort equation \[W/m²\]
pub const W_PER_M2_PER_MET_FANGER: f64 = 58.15;
/// Heat carried by blood per litre and degree \[Wh/(L·°C)\], used to turn
/// work and shivering heat into extra muscle blood flow
pub const BLOOD_FLOW_HEAT_EQUIVALENT: f64 = 1.16;

/// Exposed-face convective coefficient \[W/(m²·°C)\], equal to the nude
/// value at still air
pub const EXPOSED_FACE_H_C: f64 = 7.752798575994982;
/// Exposed-face evaporative value, equal to the nude value at still air
pub const EXPOSED_FACE_H_E: f64 = 0.3789018620063181;

/// Model-wide coefficients of the thermoregulation model
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, ApproxEq)]
pub struct ModelParams {
    /// counter-current heat exchange factor of blood flow
    pub alpha: f64,
    /// volumetric heat capacity of blood \[Wh/(L·°C)\]
    pub rho_c: f64,
    /// radiative heat transfer coefficient \[W/(m²·°C)\]
    pub h_r: f64,
    /// scales the evaporative shortfall when sweat exceeds capacity
    pub esw_scale_factor: f64,
    /// Lewis-relation factor for maximum evaporative capacity
    pub emax_factor: f64,
    pub exposed_face_h_c: f64,
    pub exposed_face_h_e: f64,
    /// exponent applied to the area ratio when a geometry's total surface area
    /// differs from the personalized body's
    pub metabolic_scaling_exponent: f64,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            rho_c: 1.067,
            h_r: 4.9,
            esw_scale_factor: 1.04921477,
            emax_factor: 19.7289316,
            exposed_face_h_c: EXPOSED_FACE_H_C,
            exposed_face_h_e: EXPOSED_FACE_H_E,
            metabolic_scaling_exponent: 1.5,
        }
    }
}

impl SerdeAPI for ModelParams {
    fn init(&mut self) -> anyhow::Result<()> {
        ensure!(
            self.rho_c > 0.0 && self.h_r >= 0.0 && self.emax_factor > 0.0,
            config_err!("{}\nmodel coefficients must be positive", format_dbg!(self))
        );
        Ok(())
    }
}

//! Typed failures that callers are expected to tell apart.
//!
//! Everything else travels as a plain [anyhow::Error]; these variants are
//! raised into `anyhow` and recovered with `downcast_ref::<ThermoError>()`.

use ndarray::Array1;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ThermoError {
    /// Bad or missing reference data, invalid anthropometrics, inconsistent
    /// geometry or activity definitions. Fatal for model construction.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A clothing or radiation definition whose resolution matches neither the
    /// 16 segments nor the element count of the geometry.
    #[error(
        "{source_name} provides {found} values but the geometry accepts {} or {elements}",
        crate::segment::N_SEGMENTS
    )]
    BoundaryMismatch {
        source_name: String,
        found: usize,
        elements: usize,
    },

    /// The stiff solver could not take an acceptable step. `last_state` is the
    /// last accepted flat state vector `[T_00..T_N3, T_cbp]`.
    #[error("integration failed at t = {time:.3} s: {reason}")]
    IntegrationFailure {
        time: f64,
        reason: String,
        last_state: Array1<f64>,
    },

    /// A fixed-point iteration exhausted its iteration cap.
    #[error("iterative solve did not converge in {iterations} iterations (residual {residual:.3e})")]
    IterativeSolveNonConvergence { iterations: usize, residual: f64 },
}

impl ThermoError {
    /// Short machine-readable name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::BoundaryMismatch { .. } => "boundary_mismatch",
            Self::IntegrationFailure { .. } => "integration_failure",
            Self::IterativeSolveNonConvergence { .. } => "non_convergence",
        }
    }
}

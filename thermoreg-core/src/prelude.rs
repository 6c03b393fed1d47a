//! Convenience re-exports of the types needed to set up and run a simulation.

pub use crate::activity::{Activity, ActivitySchedule};
pub use crate::clothing::{ClothingEnsemble, ClothingLayer, ClothingModel, ClothingResistance};
pub use crate::comfort::{
    fanger::FangerInputs, ppd_from_pmv, zhang::ZhangModel, ComfortIndex, ComfortParams, Sensation,
};
pub use crate::error::ThermoError;
pub use crate::geometry::{GeometryIndexing, MeshGeometry, MeshIndexing, ProjectedIndexing};
pub use crate::integrator::SolverParams;
pub use crate::params::ModelParams;
pub use crate::personalize::{Anthropometrics, Gender, ParameterBundle};
pub use crate::radiation::RadiationFlux;
pub use crate::reference::ReferenceBody;
pub use crate::segment::{Segment, N_SEGMENTS};
pub use crate::simulation::{
    batch::SimulationBatch, CancelToken, Progress, RunStatus, SimulationParams, SimulationTrace,
    Simulator, TraceQuantity,
};
pub use crate::thermal::ThermalModel;
pub use crate::traits::*;

#![allow(clippy::field_reassign_with_default)]
// TODO: uncomment when docs are somewhat mature to check for missing docs
// #![warn(missing_docs)]

//! Crate containing a multi-segment model of human thermoregulation and the
//! thermal comfort indices derived from it.
//!
//! A run goes through these stages:
//! - [personalize] scales the [reference] body to a subject
//! - [thermal] holds the compartment temperatures and the control laws,
//!   solved element by element over a [geometry] indexing strategy
//! - [integrator] advances the resulting stiff ODE system
//! - [comfort] maps temperatures to PMV/PPD
//! - [simulation] sequences activities and records the trace
//!
//! # Features:
//! - resources: embed the standard reference body and sample schedules

#[macro_use]
pub mod macros;

pub mod activity;
pub mod air_properties;
pub mod boundary;
pub mod clothing;
pub mod comfort;
pub mod error;
pub mod geometry;
pub mod imports;
pub mod integrator;
pub mod params;
pub mod personalize;
pub mod prelude;
pub mod radiation;
pub mod reference;
#[cfg(feature = "resources")]
pub mod resources;
pub mod segment;
pub mod simulation;
pub mod thermal;
pub mod traits;
pub mod utils;

pub mod proc_macros {
    pub use thermoreg_proc_macros::*;
}

/// List of enabled features
pub fn enabled_features() -> Vec<String> {
    #[allow(unused_mut)]
    let mut enabled = vec![];

    #[cfg(feature = "resources")]
    enabled.push("resources".into());

    enabled
}

//! Support library for climate-model evaluation diagnostics.
//!
//! A diagnostic run is driven by a `settings.yml` written by the workflow
//! manager. [`run::run_diagnostic`] reads it, indexes the preprocessed input
//! files through their metadata, prepares output directories and then hands
//! the [`config::DiagnosticConfig`] to the diagnostic itself. Diagnostics
//! organise their inputs with [`metadata`], decide on regridding with
//! [`grid`], compute comparisons with [`stats`] and record what they produced
//! with [`provenance`]. Loading model output goes through dataset
//! [`fixes`] and, for variables that are not stored, [`derive`].

pub mod config;
pub mod cube;
pub mod derive;
pub mod error;
pub mod fixes;
pub mod grid;
pub mod inventory;
pub mod metadata;
pub mod provenance;
pub mod run;
pub mod stats;

pub use error::{DiagError, DiagResult};

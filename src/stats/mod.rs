//! Comparison statistics on gridded fields.
//!
//! Fields arrive as `(time, lat, lon)` arrays with a missing-value mask;
//! reading them from netCDF is left to the caller.

pub mod field;
pub mod percentile;
pub mod uncertainty;

pub use field::{MaskedField, MaskedMap};
pub use percentile::{
    percentile_comparison, percentile_steps, spatial_correlation, write_percentile_correlations,
    PercentileComparison,
};
pub use uncertainty::{year_uncertainty, UncertaintyBand};

//! Variables computed from other variables.
//!
//! Each derivation is registered under the short name it produces. The
//! preprocessor asks [`get_required`] which inputs to load, then hands them
//! to [`derive`].

use std::collections::BTreeMap;
use std::sync::LazyLock;

use log::debug;

use crate::cube::Cube;
use crate::error::{DiagError, DiagResult};
use crate::metadata::{MetadataRecord, MetadataValue};

/// An input a derivation needs: a short name and a field type such as `T4M`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Requirement {
    pub short_name: String,
    pub field: String,
}

impl Requirement {
    pub fn new(short_name: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            short_name: short_name.into(),
            field: field.into(),
        }
    }
}

pub trait DerivedVariable: Send + Sync {
    /// Short name of the variable this derivation produces.
    fn short_name(&self) -> &'static str;

    /// Inputs needed at `frequency`, the third character of a field type.
    fn required(&self, frequency: char) -> Vec<Requirement>;

    fn calculate(&self, cubes: &[Cube]) -> DiagResult<Cube>;
}

// ---------------------------------------------------------------------------
// cllmtisccp
// ---------------------------------------------------------------------------

/// ISCCP low-level medium-thickness cloud area fraction, summed from the
/// `clisccp` histogram over optical depths in `(3.6, 23]` and pressures
/// above 680 hPa.
#[derive(Debug, Clone, Copy)]
pub struct Cllmtisccp;

const ISCCP_CLOUD_FRACTION: &str = "isccp_cloud_area_fraction";
const OPTICAL_THICKNESS: &str = "atmosphere_optical_thickness_due_to_cloud";
const AIR_PRESSURE: &str = "air_pressure";

impl DerivedVariable for Cllmtisccp {
    fn short_name(&self) -> &'static str {
        "cllmtisccp"
    }

    fn required(&self, frequency: char) -> Vec<Requirement> {
        vec![Requirement::new("clisccp", format!("T4{frequency}"))]
    }

    fn calculate(&self, cubes: &[Cube]) -> DiagResult<Cube> {
        let clisccp = cubes
            .iter()
            .find(|c| c.standard_name.as_deref() == Some(ISCCP_CLOUD_FRACTION))
            .ok_or_else(|| DiagError::MissingInput(ISCCP_CLOUD_FRACTION.to_string()))?;

        clisccp
            .sum_where(OPTICAL_THICKNESS, |tau| tau > 3.6 && tau <= 23.0)?
            .sum_where(AIR_PRESSURE, |p| p > 68000.0)
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

static DERIVED_VARIABLES: LazyLock<BTreeMap<&'static str, Box<dyn DerivedVariable>>> =
    LazyLock::new(|| {
        let all: Vec<Box<dyn DerivedVariable>> = vec![Box::new(Cllmtisccp)];
        all.into_iter().map(|v| (v.short_name(), v)).collect()
    });

/// Every known derivation, keyed by the short name it produces.
pub fn all_derived_variables() -> &'static BTreeMap<&'static str, Box<dyn DerivedVariable>> {
    &DERIVED_VARIABLES
}

pub fn derived_variable(short_name: &str) -> DiagResult<&'static dyn DerivedVariable> {
    DERIVED_VARIABLES
        .get(short_name)
        .map(|v| v.as_ref())
        .ok_or_else(|| DiagError::UnknownDerivedVariable(short_name.to_string()))
}

/// Inputs needed to derive `short_name`. The frequency is taken from the
/// third character of `field` and defaults to monthly (`M`).
pub fn get_required(short_name: &str, field: Option<&str>) -> DiagResult<Vec<Requirement>> {
    let frequency = field.and_then(|f| f.chars().nth(2)).unwrap_or('M');
    Ok(derived_variable(short_name)?.required(frequency))
}

fn text_attribute<'a>(variable: &'a MetadataRecord, name: &str) -> Option<&'a str> {
    variable.get(name).and_then(MetadataValue::as_str)
}

/// Derive the variable described by `variable` from `cubes`.
///
/// The first cube is returned as is when it already is the variable.
/// Otherwise the result takes its names and units from `variable`, records
/// the source `filename` in `_filename` and the whole description as YAML in
/// `metadata`.
pub fn derive(mut cubes: Vec<Cube>, variable: &MetadataRecord) -> DiagResult<Cube> {
    let short_name = text_attribute(variable, "short_name")
        .ok_or_else(|| DiagError::MissingInput("short_name of the derived variable".to_string()))?;

    let first = cubes
        .first()
        .ok_or_else(|| DiagError::MissingInput(format!("input cubes for {short_name}")))?;
    if first.var_name == short_name {
        debug!("{short_name} is already available, not deriving it");
        return Ok(cubes.swap_remove(0));
    }

    let mut cube = derived_variable(short_name)?.calculate(&cubes)?;
    cube.var_name = short_name.to_string();
    cube.standard_name = text_attribute(variable, "standard_name").map(str::to_string);
    cube.long_name = text_attribute(variable, "long_name").map(str::to_string);
    if let Some(units) = text_attribute(variable, "units") {
        cube.units = units.to_string();
    }
    if let Some(filename) = variable.get("filename") {
        cube.attributes.insert("_filename".to_string(), filename.to_string());
    }
    cube.attributes
        .insert("metadata".to_string(), serde_yaml::to_string(variable)?);
    Ok(cube)
}

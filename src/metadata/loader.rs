use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use log::{debug, info};
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

use super::model::{MetadataRecord, MetadataValue};

/// Data-file path → attributes, in the order the metadata files list them.
pub type InputData = IndexMap<String, MetadataRecord>;

/// File-name suffixes recognised as metadata files.
pub const METADATA_SUFFIXES: [&str; 4] = [
    "metadata.yml",
    "metadata.yaml",
    "metadata.json",
    "metadata.csv",
];

// ---------------------------------------------------------------------------
// Public entry-points
// ---------------------------------------------------------------------------

/// Build the input index from the `input_files` entries of a settings file.
///
/// Directories contribute every metadata file directly inside them (in name
/// order); files contribute themselves if they look like metadata files.
/// Later files override earlier ones for the same data file; the entry keeps
/// the position where it was first seen.
pub fn load_input_data(input_files: &[PathBuf]) -> Result<InputData> {
    let mut metadata_files = Vec::new();
    for entry in input_files {
        if entry.is_dir() {
            let mut found: Vec<PathBuf> = std::fs::read_dir(entry)
                .with_context(|| format!("listing {}", entry.display()))?
                .filter_map(|e| e.ok().map(|e| e.path()))
                .filter(|p| p.is_file() && is_metadata_file(p))
                .collect();
            found.sort();
            metadata_files.extend(found);
        } else if is_metadata_file(entry) {
            metadata_files.push(entry.clone());
        } else {
            debug!("Skipping input entry {}", entry.display());
        }
    }

    let mut input_data = InputData::new();
    for path in &metadata_files {
        let loaded = load_file(path)?;
        info!("Loaded {} records from {}", loaded.len(), path.display());
        input_data.extend(loaded);
    }
    Ok(input_data)
}

/// Whether the file name ends with one of [`METADATA_SUFFIXES`].
pub fn is_metadata_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|name| METADATA_SUFFIXES.iter().any(|s| name.ends_with(s)))
        .unwrap_or(false)
}

/// Load a metadata file.  Dispatch by extension.
///
/// Supported formats:
/// * `.yml` / `.yaml` – mapping of data-file path → attributes
/// * `.json`          – same layout as YAML
/// * `.csv`           – one record per row, with a `filename` column
pub fn load_file(path: &Path) -> Result<InputData> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "yml" | "yaml" => load_yaml(path),
        "json" => load_json(path),
        "csv" => load_csv(path),
        other => bail!("Unsupported metadata file extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// YAML loader
// ---------------------------------------------------------------------------

/// Expected layout (the preprocessor's `metadata.yml`):
///
/// ```yaml
/// /path/to/CMIP5_MPI-ESM-LR_Amon_historical_r1i1p1_tas_2000-2002.nc:
///   dataset: MPI-ESM-LR
///   short_name: tas
///   start_year: 2000
/// ```
fn load_yaml(path: &Path) -> Result<InputData> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let root: YamlValue = serde_yaml::from_str(&text)
        .with_context(|| format!("parsing YAML in {}", path.display()))?;

    let entries = match root {
        YamlValue::Null => return Ok(InputData::new()),
        YamlValue::Mapping(m) => m,
        _ => bail!("{}: expected a top-level mapping", path.display()),
    };

    let mut input_data = InputData::new();
    for (key, attributes) in entries {
        let filename = match key {
            YamlValue::String(s) => s,
            other => bail!("{}: non-string file key {other:?}", path.display()),
        };
        let attributes = match attributes {
            YamlValue::Mapping(m) => m,
            _ => bail!("{}: entry '{filename}' is not a mapping", path.display()),
        };

        let mut record = MetadataRecord::new();
        for (name, value) in attributes {
            let name = yaml_key(&name)
                .with_context(|| format!("{}: entry '{filename}'", path.display()))?;
            record.insert(name, yaml_to_metadata(&value));
        }
        input_data.insert(filename, record);
    }
    Ok(input_data)
}

fn yaml_key(key: &YamlValue) -> Result<String> {
    match key {
        YamlValue::String(s) => Ok(s.clone()),
        YamlValue::Number(n) => Ok(n.to_string()),
        YamlValue::Bool(b) => Ok(b.to_string()),
        other => bail!("unsupported attribute name {other:?}"),
    }
}

/// Convert a YAML value into a metadata value. Nested sequences and mappings
/// are kept as their compact text.
pub fn yaml_to_metadata(val: &YamlValue) -> MetadataValue {
    match val {
        YamlValue::String(s) => MetadataValue::String(s.clone()),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        YamlValue::Bool(b) => MetadataValue::Bool(*b),
        YamlValue::Null => MetadataValue::Null,
        YamlValue::Tagged(tagged) => yaml_to_metadata(&tagged.value),
        other => MetadataValue::String(
            serde_json::to_string(other).unwrap_or_else(|_| format!("{other:?}")),
        ),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Same layout as the YAML index:
///
/// ```json
/// { "/path/to/file.nc": { "dataset": "MPI-ESM-LR", "start_year": 2000 } }
/// ```
fn load_json(path: &Path) -> Result<InputData> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let root: JsonValue = serde_json::from_str(&text)
        .with_context(|| format!("parsing JSON in {}", path.display()))?;

    let entries = root
        .as_object()
        .with_context(|| format!("{}: expected a top-level JSON object", path.display()))?;

    let mut input_data = InputData::new();
    for (filename, attributes) in entries {
        let obj = attributes
            .as_object()
            .with_context(|| format!("{}: entry '{filename}' is not an object", path.display()))?;

        let record = obj
            .iter()
            .map(|(name, value)| (name.clone(), json_to_metadata(value)))
            .collect();
        input_data.insert(filename.clone(), record);
    }
    Ok(input_data)
}

fn json_to_metadata(val: &JsonValue) -> MetadataValue {
    match val {
        JsonValue::String(s) => MetadataValue::String(s.clone()),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                MetadataValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                MetadataValue::Float(f)
            } else {
                MetadataValue::String(n.to_string())
            }
        }
        JsonValue::Bool(b) => MetadataValue::Bool(*b),
        JsonValue::Null => MetadataValue::Null,
        other => MetadataValue::String(other.to_string()),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with attribute names, one data file per row.
/// The `filename` column is the index key; every other column is an attribute.
fn load_csv(path: &Path) -> Result<InputData> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    let headers: Vec<String> = reader
        .headers()
        .context("reading CSV headers")?
        .iter()
        .map(|h| h.to_string())
        .collect();

    let file_idx = headers
        .iter()
        .position(|h| h == "filename")
        .with_context(|| format!("{}: CSV missing 'filename' column", path.display()))?;

    let mut input_data = InputData::new();

    for (row_no, result) in reader.records().enumerate() {
        let row = result.with_context(|| format!("CSV row {row_no}"))?;

        let filename = match row.get(file_idx) {
            Some(f) if !f.is_empty() => f.to_string(),
            _ => bail!("{}: CSV row {row_no} has no filename", path.display()),
        };

        let mut record = MetadataRecord::new();
        for (col_idx, value) in row.iter().enumerate() {
            if col_idx == file_idx {
                continue;
            }
            record.insert(headers[col_idx].clone(), guess_metadata_type(value));
        }
        input_data.insert(filename, record);
    }

    Ok(input_data)
}

fn guess_metadata_type(s: &str) -> MetadataValue {
    if s.is_empty() {
        return MetadataValue::Null;
    }
    if let Ok(i) = s.parse::<i64>() {
        return MetadataValue::Integer(i);
    }
    if let Ok(f) = s.parse::<f64>() {
        return MetadataValue::Float(f);
    }
    if s == "true" || s == "false" {
        return MetadataValue::Bool(s == "true");
    }
    MetadataValue::String(s.to_string())
}

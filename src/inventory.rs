//! Inventory diagnostic: a grouped table of every input file.
//!
//! Settings (all optional):
//! * `group_by` – attribute to group by, default `dataset`
//! * `sort_by`  – attributes to sort each group by, default `[short_name, exp]`
//! * `select`   – mapping of attribute constraints (`"*"` = any value)
//! * `authors`  – provenance authors of the table

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::info;

use crate::config::DiagnosticConfig;
use crate::metadata::loader::yaml_to_metadata;
use crate::metadata::{group, select, Constraints, InputData, MetadataGroups, MetadataRecord, Sort};
use crate::provenance::{ProvenanceLogger, ProvenanceRecord};

pub const DEFAULT_GROUP_BY: &str = "dataset";
pub const DEFAULT_SORT_BY: [&str; 2] = ["short_name", "exp"];

/// Attribute holding a record's data-file path.
const FILENAME: &str = "filename";

/// The records of the input index, each carrying its `filename`.
pub fn records(input_data: &InputData) -> Vec<MetadataRecord> {
    input_data
        .iter()
        .map(|(filename, attributes)| {
            let mut rec = attributes.clone();
            rec.entry(FILENAME.to_string())
                .or_insert_with(|| filename.as_str().into());
            rec
        })
        .collect()
}

/// Constraints from the `select` setting.
fn constraints(cfg: &DiagnosticConfig) -> Result<Constraints> {
    let raw: BTreeMap<String, serde_yaml::Value> = cfg.extra("select")?.unwrap_or_default();
    Ok(raw
        .iter()
        .map(|(name, value)| (name.clone(), yaml_to_metadata(value)))
        .collect())
}

/// Write one row per record: group key, filename, then every other attribute.
pub fn write_inventory(path: &Path, groups: &MetadataGroups) -> Result<()> {
    let columns: BTreeSet<&str> = groups
        .iter()
        .flat_map(|(_, members)| members.iter())
        .flat_map(|rec| rec.keys().map(String::as_str))
        .filter(|name| *name != FILENAME)
        .collect();

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;

    let mut header = vec!["group", FILENAME];
    header.extend(columns.iter().copied());
    writer.write_record(&header)?;

    for (key, members) in groups.iter() {
        for rec in members {
            let cell = |name: &str| rec.get(name).map(|v| v.to_string()).unwrap_or_default();
            let mut row = vec![key.to_string(), cell(FILENAME)];
            row.extend(columns.iter().map(|c| cell(*c)));
            writer.write_record(&row)?;
        }
    }
    writer.flush()?;
    Ok(())
}

/// Run the inventory diagnostic. Returns the table path when one was written.
pub fn run(cfg: &DiagnosticConfig) -> Result<Option<PathBuf>> {
    let group_by: String = cfg
        .extra("group_by")?
        .unwrap_or_else(|| DEFAULT_GROUP_BY.to_string());
    let sort_by: Vec<String> = cfg
        .extra("sort_by")?
        .unwrap_or_else(|| DEFAULT_SORT_BY.iter().map(|s| s.to_string()).collect());
    let authors: Vec<String> = cfg.extra("authors")?.unwrap_or_default();

    let selected = select(&records(&cfg.input_data), &constraints(cfg)?);
    let ancestors: Vec<String> = selected
        .iter()
        .filter_map(|rec| rec.get(FILENAME).map(|f| f.to_string()))
        .collect();

    let groups = group(selected, &group_by, Some(&Sort::By(sort_by)));
    for (key, members) in groups.iter() {
        info!("{group_by} = {key}: {} files", members.len());
    }

    if !cfg.write_netcdf {
        info!("write_netcdf is off, not writing the inventory table");
        return Ok(None);
    }

    let path = cfg.diagnostic_filename_with_extension("inventory", "csv");
    write_inventory(&path, &groups)?;
    info!("Wrote {}", path.display());

    let mut provenance = ProvenanceLogger::open(cfg)?;
    let record = ProvenanceRecord::new(format!(
        "Inventory of {} input files grouped by {group_by}.",
        ancestors.len()
    ))
    .with_ancestors(ancestors)
    .with_authors(authors)
    .with_statistics(["other"]);
    provenance.log(&path, record)?;
    provenance.close()?;

    Ok(Some(path))
}

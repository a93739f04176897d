//! Write a sample run directory (settings plus a metadata index) that the
//! `climdiag` binary can be pointed at:
//!
//! ```text
//! generate_sample [DIR]          # default: sample_run
//! climdiag DIR/settings.yml
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use log::info;
use serde_yaml::{Mapping, Value};

#[derive(Parser, Debug)]
#[command(about = "Write a sample run directory for climdiag")]
struct Args {
    /// Directory to create
    #[arg(default_value = "sample_run")]
    dir: PathBuf,
}

/// Years covered by the `n`-th file: starts spread over 1980..=1995,
/// lengths over 5..=20.
fn year_range(n: usize) -> (i64, i64) {
    let start = 1980 + (n * 7 % 16) as i64;
    (start, start + 5 + (n * 11 % 16) as i64)
}

fn entry(pairs: &[(&str, Value)]) -> Value {
    let mut m = Mapping::new();
    for (k, v) in pairs {
        m.insert(Value::from(*k), v.clone());
    }
    Value::Mapping(m)
}

fn write_metadata(preproc: &Path) -> Result<usize> {
    let datasets = [("MPI-ESM-LR", "CMIP5"), ("ACCESS1-0", "CMIP5"), ("ESACCI-SST", "OBS")];
    let variables = [("tas", "Amon"), ("pr", "Amon"), ("tos", "Omon")];
    let experiments = ["historical", "rcp85"];

    let mut index: IndexMap<String, Value> = IndexMap::new();
    for &(dataset, project) in &datasets {
        for &(short_name, mip) in &variables {
            let exps: &[&str] = if project == "OBS" { &["reanaly"] } else { &experiments };
            for &exp in exps {
                let (start, end) = year_range(index.len());
                let filename = preproc
                    .join(format!("{project}_{dataset}_{mip}_{exp}_{short_name}_{start}-{end}.nc"))
                    .display()
                    .to_string();
                let attributes = entry(&[
                    ("dataset", dataset.into()),
                    ("project", project.into()),
                    ("short_name", short_name.into()),
                    ("mip", mip.into()),
                    ("exp", exp.into()),
                    ("start_year", start.into()),
                    ("end_year", end.into()),
                    ("filename", filename.clone().into()),
                ]);
                index.insert(filename, attributes);
            }
        }
    }

    let path = preproc.join("metadata.yml");
    std::fs::write(&path, serde_yaml::to_string(&index)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(index.len())
}

fn write_settings(root: &Path, preproc: &Path) -> Result<PathBuf> {
    let settings = entry(&[
        ("work_dir", root.join("work").display().to_string().into()),
        ("plot_dir", root.join("plots").display().to_string().into()),
        ("output_file_type", "png".into()),
        ("write_netcdf", true.into()),
        ("write_plots", false.into()),
        ("log_level", "info".into()),
        ("script", "inventory".into()),
        (
            "input_files",
            Value::Sequence(vec![preproc.display().to_string().into()]),
        ),
        ("group_by", "project".into()),
        ("authors", Value::Sequence(vec!["sample_author".into()])),
    ]);

    let path = root.join("settings.yml");
    std::fs::write(&path, serde_yaml::to_string(&settings)?)
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let root = Args::parse().dir;
    let preproc = root.join("preproc");
    std::fs::create_dir_all(&preproc)
        .with_context(|| format!("creating {}", preproc.display()))?;

    let n = write_metadata(&preproc)?;
    let settings = write_settings(&root, &preproc)?;

    info!("Wrote {n} metadata records to {}", preproc.display());
    println!("Run: climdiag {}", settings.display());
    Ok(())
}

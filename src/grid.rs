//! Resolution matching for gridded inputs.
//!
//! Observation and model files arrive on arbitrary grids. Files already on
//! one of the native grids are used as they are; everything else is
//! aggregated once to T63 by an external tool and cached in a per-diagnostic
//! directory under `work_dir`.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;

use log::{debug, info};

use crate::error::{DiagError, DiagResult};

/// Suffix appended to the source file name of an aggregated copy.
pub const AGGREGATED_SUFFIX: &str = ".T63built.nc";

/// Target resolution of every aggregation.
pub const TARGET_RESOLUTION: &str = "T63";

// ---------------------------------------------------------------------------
// Grid shapes
// ---------------------------------------------------------------------------

/// Horizontal grid size, as read from the `lat`/`lon` dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridShape {
    pub lat: usize,
    pub lon: usize,
}

impl GridShape {
    pub const fn new(lat: usize, lon: usize) -> Self {
        Self { lat, lon }
    }

    /// T63 Gaussian grid.
    pub const T63: GridShape = GridShape::new(96, 192);

    pub fn is_native(&self) -> bool {
        NATIVE_GRIDS.contains(self)
    }
}

impl fmt::Display for GridShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.lat, self.lon)
    }
}

/// Grids that need no aggregation: T63 and the 30° and 10° regular grids.
pub const NATIVE_GRIDS: [GridShape; 3] = [
    GridShape::T63,
    GridShape::new(6, 12),
    GridShape::new(18, 36),
];

// ---------------------------------------------------------------------------
// Diagnostic families
// ---------------------------------------------------------------------------

/// The observation-versus-model diagnostics that share the loading path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticFamily {
    SeaSurfaceTemperature,
    Albedo,
    LandCover,
}

impl DiagnosticFamily {
    /// Directory under `work_dir` caching aggregated files.
    pub fn aux_dir(self) -> &'static str {
        match self {
            DiagnosticFamily::SeaSurfaceTemperature => "AUX_Files_sst_ESACCI",
            DiagnosticFamily::Albedo => "AUX_Files_alb_QA4ECV",
            DiagnosticFamily::LandCover => "AUX_Files_lc_ESACCI",
        }
    }

    /// Variables for which a reference dataset can be loaded.
    pub fn reference_variables(self) -> &'static [&'static str] {
        match self {
            DiagnosticFamily::SeaSurfaceTemperature => &["ts", "tos"],
            DiagnosticFamily::Albedo => &["alb"],
            DiagnosticFamily::LandCover => &["baresoilFrac", "grassNcropFrac", "shrubNtreeFrac"],
        }
    }

    /// Unit forced onto loaded data, if any.
    pub fn unit_override(self) -> Option<&'static str> {
        match self {
            DiagnosticFamily::Albedo => Some("-"),
            _ => None,
        }
    }

    /// Fail for variables this diagnostic has no reference loader for.
    pub fn check_reference_variable(self, variable: &str) -> DiagResult<()> {
        if self.reference_variables().contains(&variable) {
            Ok(())
        } else {
            Err(DiagError::UnsupportedVariable {
                family: self.to_string(),
                variable: variable.to_string(),
            })
        }
    }
}

impl fmt::Display for DiagnosticFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DiagnosticFamily::SeaSurfaceTemperature => "sea surface temperature",
            DiagnosticFamily::Albedo => "albedo",
            DiagnosticFamily::LandCover => "land cover",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Regrid planning
// ---------------------------------------------------------------------------

/// Whether a file can be loaded as is or must go through aggregation first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegridPlan {
    Native(PathBuf),
    Aggregate { source: PathBuf, cached: PathBuf },
}

/// Decide how to load `source` given its grid shape.
///
/// `shape` is `None` when the file has no `lat`/`lon` dimensions, in which
/// case aggregation is always required.
pub fn plan_regrid(
    shape: Option<GridShape>,
    source: &Path,
    work_dir: &Path,
    family: DiagnosticFamily,
) -> RegridPlan {
    match shape {
        Some(shape) if shape.is_native() => {
            debug!("{} is on native grid {shape}", source.display());
            RegridPlan::Native(source.to_path_buf())
        }
        _ => RegridPlan::Aggregate {
            source: source.to_path_buf(),
            cached: cached_path(source, work_dir, family),
        },
    }
}

/// `<work_dir>/<aux dir>/<source file name>.T63built.nc`
pub fn cached_path(source: &Path, work_dir: &Path, family: DiagnosticFamily) -> PathBuf {
    let name = source
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    work_dir
        .join(family.aux_dir())
        .join(format!("{name}{AGGREGATED_SUFFIX}"))
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Produces a copy of a file at a coarser resolution.
pub trait Aggregator {
    /// Aggregate `source` to `resolution`, returning the path of a temporary
    /// result that the caller takes ownership of.
    fn aggregate(&self, source: &Path, resolution: &str) -> DiagResult<PathBuf>;
}

/// Aggregates with the `cdo` command line tool (conservative remapping).
#[derive(Debug, Clone)]
pub struct CdoAggregator {
    pub program: PathBuf,
    pub scratch_dir: PathBuf,
}

impl Default for CdoAggregator {
    fn default() -> Self {
        Self {
            program: PathBuf::from("cdo"),
            scratch_dir: std::env::temp_dir(),
        }
    }
}

impl Aggregator for CdoAggregator {
    fn aggregate(&self, source: &Path, resolution: &str) -> DiagResult<PathBuf> {
        let name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let target = self
            .scratch_dir
            .join(format!("{name}.{}.{resolution}.nc", std::process::id()));
        let grid = format!("remapcon,{}grid", resolution.to_ascii_lowercase());

        debug!("Running {} -s {grid} on {}", self.program.display(), source.display());
        let output = Command::new(&self.program)
            .arg("-s")
            .arg(&grid)
            .arg(source)
            .arg(&target)
            .output()?;
        if !output.status.success() {
            return Err(DiagError::Aggregation {
                path: source.to_path_buf(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(target)
    }
}

/// Turn a plan into the path to load, aggregating on a cache miss.
pub fn resolve(plan: &RegridPlan, aggregator: &dyn Aggregator) -> DiagResult<PathBuf> {
    match plan {
        RegridPlan::Native(path) => Ok(path.clone()),
        RegridPlan::Aggregate { source, cached } => {
            if cached.exists() {
                debug!("Reusing aggregated {}", cached.display());
                return Ok(cached.clone());
            }
            info!(
                "Aggregating {} to {TARGET_RESOLUTION}",
                source.display()
            );
            if let Some(dir) = cached.parent() {
                std::fs::create_dir_all(dir)?;
            }
            let temporary = aggregator.aggregate(source, TARGET_RESOLUTION)?;
            std::fs::copy(&temporary, cached)?;
            std::fs::remove_file(&temporary)?;
            Ok(cached.clone())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Writes the source name into a scratch file and counts calls.
    struct FakeAggregator {
        scratch: PathBuf,
        calls: Cell<usize>,
    }

    impl Aggregator for FakeAggregator {
        fn aggregate(&self, source: &Path, resolution: &str) -> DiagResult<PathBuf> {
            self.calls.set(self.calls.get() + 1);
            let out = self.scratch.join(format!("tmp_{}.nc", self.calls.get()));
            std::fs::write(&out, format!("{} @ {resolution}", source.display()))?;
            Ok(out)
        }
    }

    #[test]
    fn native_grids_are_loaded_directly() {
        let work = Path::new("/work");
        for shape in NATIVE_GRIDS {
            let plan = plan_regrid(Some(shape), Path::new("/obs/sst.nc"), work, DiagnosticFamily::SeaSurfaceTemperature);
            assert_eq!(plan, RegridPlan::Native(PathBuf::from("/obs/sst.nc")));
        }
    }

    #[test]
    fn other_grids_need_aggregation() {
        let work = Path::new("/work");
        let expected = RegridPlan::Aggregate {
            source: PathBuf::from("/obs/alb.nc"),
            cached: PathBuf::from("/work/AUX_Files_alb_QA4ECV/alb.nc.T63built.nc"),
        };
        let odd = plan_regrid(Some(GridShape::new(180, 360)), Path::new("/obs/alb.nc"), work, DiagnosticFamily::Albedo);
        assert_eq!(odd, expected);
        let swapped = plan_regrid(Some(GridShape::new(192, 96)), Path::new("/obs/alb.nc"), work, DiagnosticFamily::Albedo);
        assert_eq!(swapped, expected);
        let unknown = plan_regrid(None, Path::new("/obs/alb.nc"), work, DiagnosticFamily::Albedo);
        assert_eq!(unknown, expected);
    }

    #[test]
    fn aggregation_is_cached() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("lc.nc");
        std::fs::write(&source, "raw").unwrap();
        let work = dir.path().join("work");
        let aggregator = FakeAggregator {
            scratch: dir.path().to_path_buf(),
            calls: Cell::new(0),
        };

        let plan = plan_regrid(None, &source, &work, DiagnosticFamily::LandCover);
        let first = resolve(&plan, &aggregator).unwrap();
        let second = resolve(&plan, &aggregator).unwrap();

        assert_eq!(first, second);
        assert_eq!(aggregator.calls.get(), 1);
        assert!(first.starts_with(work.join("AUX_Files_lc_ESACCI")));
        assert!(std::fs::read_to_string(&first).unwrap().ends_with("@ T63"));
        assert!(!dir.path().join("tmp_1.nc").exists());
    }

    #[test]
    fn missing_cdo_binary_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let aggregator = CdoAggregator {
            program: dir.path().join("no-such-cdo"),
            scratch_dir: dir.path().to_path_buf(),
        };
        let err = aggregator
            .aggregate(Path::new("/obs/sst.nc"), TARGET_RESOLUTION)
            .unwrap_err();
        assert!(matches!(err, DiagError::Io(_)));
    }

    #[test]
    fn unsupported_reference_variables_are_rejected() {
        assert!(DiagnosticFamily::SeaSurfaceTemperature.check_reference_variable("tos").is_ok());
        assert!(DiagnosticFamily::LandCover.check_reference_variable("grassNcropFrac").is_ok());

        let err = DiagnosticFamily::Albedo.check_reference_variable("ts").unwrap_err();
        assert!(matches!(err, DiagError::UnsupportedVariable { ref variable, .. } if variable == "ts"));
        assert_eq!(DiagnosticFamily::Albedo.unit_override(), Some("-"));
    }
}

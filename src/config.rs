use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DiagError;
use crate::metadata::InputData;

// ---------------------------------------------------------------------------
// Log level
// ---------------------------------------------------------------------------

/// Verbosity accepted in settings files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
        }
    }

    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl FromStr for LogLevel {
    type Err = DiagError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warning" | "warn" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            _ => Err(DiagError::InvalidLogLevel(s.to_string())),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Diagnostic configuration (settings.yml)
// ---------------------------------------------------------------------------

/// Settings handed to a diagnostic script.
///
/// The required keys are typed; anything else in the file ends up in
/// [`DiagnosticConfig::extra`]. `input_data` is never read from the file, it
/// is filled by the run setup from the metadata files in `input_files`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticConfig {
    pub work_dir: PathBuf,
    pub plot_dir: PathBuf,
    pub output_file_type: String,
    pub write_netcdf: bool,
    pub write_plots: bool,
    pub log_level: String,
    pub script: String,
    pub input_files: Vec<PathBuf>,
    #[serde(default, skip_deserializing)]
    pub input_data: InputData,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl DiagnosticConfig {
    /// Read a settings file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings file {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("parsing settings file {}", path.display()))
    }

    /// Parsed `log_level`.
    pub fn log_level(&self) -> Result<LogLevel, DiagError> {
        self.log_level.parse()
    }

    /// A path for saving a diagnostic plot: `<plot_dir>/<basename>.<output_file_type>`.
    pub fn plot_filename(&self, basename: &str) -> PathBuf {
        self.plot_dir
            .join(format!("{basename}.{}", self.output_file_type))
    }

    /// A path for saving a diagnostic netCDF file: `<work_dir>/<basename>.nc`.
    pub fn diagnostic_filename(&self, basename: &str) -> PathBuf {
        self.diagnostic_filename_with_extension(basename, "nc")
    }

    pub fn diagnostic_filename_with_extension(&self, basename: &str, extension: &str) -> PathBuf {
        self.work_dir.join(format!("{basename}.{extension}"))
    }

    /// A diagnostic-specific setting, `None` when the key is absent.
    pub fn extra<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.extra
            .get(key)
            .map(|value| {
                serde_yaml::from_value(value.clone())
                    .with_context(|| format!("invalid value for setting '{key}'"))
            })
            .transpose()
    }

    /// The configuration rendered as YAML, as logged at the start of a run.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).context("serializing configuration")
    }
}

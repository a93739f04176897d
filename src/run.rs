use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, error, info};

use crate::config::{DiagnosticConfig, LogLevel};
use crate::error::{DiagError, DiagResult};
use crate::metadata::load_input_data;

// ---------------------------------------------------------------------------
// Command line
// ---------------------------------------------------------------------------

/// Command line shared by every diagnostic binary.
#[derive(Parser, Debug, Clone)]
#[command(about = "Diagnostic script")]
pub struct RunArgs {
    /// Path to settings.yml
    pub filename: PathBuf,

    /// Force emptying the output directories (useful when re-running the script)
    #[arg(short, long)]
    pub force: bool,

    /// Force running the script, even if output files exist
    /// (useful when re-running the script, use at your own risk)
    #[arg(short, long)]
    pub ignore_existing: bool,

    /// Set the log level
    #[arg(short, long, value_enum)]
    pub log_level: Option<LogLevel>,
}

/// What to do with output directories left over from an earlier run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputPolicy {
    /// Refuse to run.
    Abort,
    /// Remove them and start empty.
    Force,
    /// Keep them and write into them.
    IgnoreExisting,
}

impl RunArgs {
    pub fn output_policy(&self) -> OutputPolicy {
        if self.force {
            OutputPolicy::Force
        } else if self.ignore_existing {
            OutputPolicy::IgnoreExisting
        } else {
            OutputPolicy::Abort
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Install the process-wide logger. Later calls only adjust the level.
pub fn init_logging(level: LogLevel) {
    let result = env_logger::Builder::new()
        .filter_level(level.to_filter())
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {:<8} {},{}\t{}",
                buf.timestamp(),
                std::process::id(),
                record.level(),
                record.target(),
                record.line().unwrap_or(0),
                record.args()
            )
        })
        .try_init();
    if result.is_err() {
        log::set_max_level(level.to_filter());
        debug!("Logger already initialised, level set to {level}");
    }
}

// ---------------------------------------------------------------------------
// Output directories
// ---------------------------------------------------------------------------

/// Directories the run writes to: `work_dir` for data, `plot_dir` for plots.
pub fn output_directories(cfg: &DiagnosticConfig) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if cfg.write_netcdf {
        dirs.push(cfg.work_dir.clone());
    }
    if cfg.write_plots {
        dirs.push(cfg.plot_dir.clone());
    }
    dirs
}

/// Create the output directories, dealing with existing ones per `policy`.
///
/// With [`OutputPolicy::Abort`] nothing is touched when any directory
/// already exists.
pub fn prepare_output_directories(cfg: &DiagnosticConfig, policy: OutputPolicy) -> DiagResult<()> {
    let dirs = output_directories(cfg);
    let existing: Vec<PathBuf> = dirs.iter().filter(|p| p.exists()).cloned().collect();

    if !existing.is_empty() {
        match policy {
            OutputPolicy::Force => {
                for dir in &existing {
                    info!("Removing {}", dir.display());
                    std::fs::remove_dir_all(dir)?;
                }
            }
            OutputPolicy::IgnoreExisting => {}
            OutputPolicy::Abort => {
                let listing = existing
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join("\n");
                error!(
                    "Script will abort to prevent accidentally overwriting your data in these directories:\n{listing}\n\
                     Use -f or --force to force emptying the output directories or use -i or \
                     --ignore-existing to ignore existing output directories."
                );
                return Err(DiagError::OutputExists(existing));
            }
        }
    }

    for dir in &dirs {
        if dir.exists() {
            debug!("Keeping existing {}", dir.display());
            continue;
        }
        info!("Creating {}", dir.display());
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Run setup
// ---------------------------------------------------------------------------

/// Everything a diagnostic needs before its own logic starts: settings with
/// the log-level override applied, logging, the input index and output
/// directories.
pub fn setup(args: &RunArgs) -> Result<DiagnosticConfig> {
    let mut cfg = DiagnosticConfig::load(&args.filename)?;

    if let Some(level) = args.log_level {
        cfg.log_level = level.as_str().to_string();
    }
    init_logging(cfg.log_level()?);

    cfg.input_data = load_input_data(&cfg.input_files).context("reading input metadata")?;

    info!(
        "Starting diagnostic script {} with configuration:\n{}",
        cfg.script,
        cfg.to_yaml()?
    );

    prepare_output_directories(&cfg, args.output_policy())?;
    Ok(cfg)
}

/// Run a diagnostic: set up, hand the configuration to `diagnostic`, and log
/// the end of the run.
///
/// ```no_run
/// use clap::Parser;
/// use climdiag::run::{run_diagnostic, RunArgs};
///
/// fn main() -> anyhow::Result<()> {
///     run_diagnostic(&RunArgs::parse(), |cfg| {
///         println!("{}", cfg.script);
///         Ok(())
///     })
/// }
/// ```
pub fn run_diagnostic<F>(args: &RunArgs, diagnostic: F) -> Result<()>
where
    F: FnOnce(&DiagnosticConfig) -> Result<()>,
{
    let cfg = setup(args)?;
    diagnostic(&cfg)?;
    info!("End of diagnostic script run.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn write_settings(root: &Path, write_plots: bool) -> PathBuf {
        let preproc = root.join("preproc");
        fs::create_dir_all(&preproc).unwrap();
        fs::write(
            preproc.join("metadata.yml"),
            "/data/tas.nc: {short_name: tas, dataset: MPI-ESM-LR}\n",
        )
        .unwrap();

        let settings = root.join("settings.yml");
        let text = format!(
            "work_dir: {work}\nplot_dir: {plot}\noutput_file_type: png\n\
             write_netcdf: true\nwrite_plots: {write_plots}\nlog_level: info\n\
             script: test\ninput_files: [{preproc}]\n",
            work = root.join("work").display(),
            plot = root.join("plots").display(),
            preproc = preproc.display(),
        );
        fs::write(&settings, text).unwrap();
        settings
    }

    fn args(filename: PathBuf) -> RunArgs {
        RunArgs {
            filename,
            force: false,
            ignore_existing: false,
            log_level: None,
        }
    }

    #[test]
    fn cli_flags_parse() {
        let parsed = RunArgs::try_parse_from(["diag", "settings.yml", "-f", "-l", "debug"]).unwrap();
        assert_eq!(parsed.filename, PathBuf::from("settings.yml"));
        assert_eq!(parsed.output_policy(), OutputPolicy::Force);
        assert_eq!(parsed.log_level, Some(LogLevel::Debug));

        let parsed = RunArgs::try_parse_from(["diag", "s.yml", "--ignore-existing"]).unwrap();
        assert_eq!(parsed.output_policy(), OutputPolicy::IgnoreExisting);

        assert!(RunArgs::try_parse_from(["diag", "s.yml", "-l", "verbose"]).is_err());
    }

    #[test]
    fn setup_builds_index_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(dir.path(), true);

        let mut run_args = args(settings);
        run_args.log_level = Some(LogLevel::Warning);
        let cfg = setup(&run_args).unwrap();

        assert_eq!(cfg.log_level, "warning");
        assert!(cfg.input_data.contains_key("/data/tas.nc"));
        assert!(dir.path().join("work").is_dir());
        assert!(dir.path().join("plots").is_dir());
    }

    #[test]
    fn existing_outputs_abort_without_flags() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(dir.path(), false);
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("keep.nc"), "data").unwrap();

        let err = setup(&args(settings)).unwrap_err();
        let diag = err.downcast_ref::<DiagError>().unwrap();
        assert!(matches!(diag, DiagError::OutputExists(dirs) if dirs == &vec![work.clone()]));
        assert!(work.join("keep.nc").exists());
    }

    #[test]
    fn force_empties_existing_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(dir.path(), false);
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("old.nc"), "data").unwrap();

        let mut run_args = args(settings);
        run_args.force = true;
        setup(&run_args).unwrap();
        assert!(work.is_dir());
        assert!(!work.join("old.nc").exists());
    }

    #[test]
    fn ignore_existing_keeps_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(dir.path(), false);
        let work = dir.path().join("work");
        fs::create_dir_all(&work).unwrap();
        fs::write(work.join("old.nc"), "data").unwrap();

        let mut run_args = args(settings);
        run_args.ignore_existing = true;
        setup(&run_args).unwrap();
        assert!(work.join("old.nc").exists());
        // plots are disabled, so no plot directory is created
        assert!(!dir.path().join("plots").exists());
    }

    #[test]
    fn run_diagnostic_hands_over_the_configuration() {
        let dir = tempfile::tempdir().unwrap();
        let settings = write_settings(dir.path(), false);

        let mut seen = None;
        run_diagnostic(&args(settings), |cfg| {
            seen = Some(cfg.script.clone());
            Ok(())
        })
        .unwrap();
        assert_eq!(seen.as_deref(), Some("test"));
    }
}

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, error};
use serde::{Deserialize, Deserializer, Serialize};

use crate::config::DiagnosticConfig;
use crate::error::{DiagError, DiagResult};

/// File name of the provenance log inside `work_dir`.
pub const PROVENANCE_FILE: &str = "diagnostic_provenance.yml";

// ---------------------------------------------------------------------------
// Provenance record
// ---------------------------------------------------------------------------

/// How one output file was produced.
///
/// The usual keys are typed; any other key is kept in `extra` and written
/// back unchanged. List keys also accept a single string, which some
/// diagnostics write for a lone ancestor or plot file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub ancestors: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub projects: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plot_type: Option<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub plot_types: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub plot_file: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub statistics: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<String>,
    #[serde(default, deserialize_with = "one_or_many", skip_serializing_if = "Vec::is_empty")]
    pub realms: Vec<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// A string or a list of strings; `null` is an empty list.
fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::One(s)) => vec![s],
        Some(OneOrMany::Many(v)) => v,
    })
}

fn strings<I, S>(items: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(Into::into).collect()
}

impl ProvenanceRecord {
    pub fn new(caption: impl Into<String>) -> Self {
        Self {
            caption: Some(caption.into()),
            ..Default::default()
        }
    }

    pub fn with_ancestors<I, S>(mut self, ancestors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ancestors = strings(ancestors);
        self
    }

    pub fn with_authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.authors = strings(authors);
        self
    }

    pub fn with_references<I, S>(mut self, references: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.references = strings(references);
        self
    }

    pub fn with_projects<I, S>(mut self, projects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projects = strings(projects);
        self
    }

    pub fn with_statistics<I, S>(mut self, statistics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.statistics = strings(statistics);
        self
    }

    pub fn with_domains<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.domains = strings(domains);
        self
    }

    pub fn with_realms<I, S>(mut self, realms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.realms = strings(realms);
        self
    }

    pub fn with_plot(mut self, plot_type: impl Into<String>, plot_file: &Path) -> Self {
        self.plot_type = Some(plot_type.into());
        self.plot_file = vec![plot_file.display().to_string()];
        self
    }

    pub fn with_plot_files<I, P>(mut self, plot_files: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.plot_file = plot_files
            .into_iter()
            .map(|p| p.as_ref().display().to_string())
            .collect();
        self
    }

    pub fn with_plot_types<I, S>(mut self, plot_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.plot_types = strings(plot_types);
        self
    }

    /// Attach a key that has no dedicated field.
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<serde_yaml::Value>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Output path → provenance record.
pub type ProvenanceTable = BTreeMap<String, ProvenanceRecord>;

// ---------------------------------------------------------------------------
// Provenance logger
// ---------------------------------------------------------------------------

/// Accumulates provenance records for one run and writes them to
/// `<work_dir>/diagnostic_provenance.yml`.
///
/// Call [`ProvenanceLogger::close`] to save and see I/O errors. A logger that
/// goes out of scope without being closed (early return, panic) still saves
/// its table on drop and logs any failure.
///
/// ```no_run
/// # use climdiag::config::DiagnosticConfig;
/// # use climdiag::provenance::{ProvenanceLogger, ProvenanceRecord};
/// # fn run(cfg: &DiagnosticConfig) -> anyhow::Result<()> {
/// let mut provenance = ProvenanceLogger::open(cfg)?;
/// let record = ProvenanceRecord::new("Zonal mean of tas.")
///     .with_authors(["first_author"])
///     .with_ancestors(["/path/to/input_file_1.nc"]);
/// provenance.log("/path/to/result.nc", record)?;
/// provenance.close()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ProvenanceLogger {
    log_file: PathBuf,
    table: ProvenanceTable,
    saved: bool,
}

impl ProvenanceLogger {
    /// Open the logger for a run, loading any table a previous session wrote.
    pub fn open(cfg: &DiagnosticConfig) -> DiagResult<Self> {
        Self::open_file(cfg.work_dir.join(PROVENANCE_FILE))
    }

    /// Open a logger backed by an explicit file.
    pub fn open_file(log_file: PathBuf) -> DiagResult<Self> {
        let table = if log_file.exists() {
            let text = std::fs::read_to_string(&log_file)?;
            if text.trim().is_empty() {
                ProvenanceTable::new()
            } else {
                serde_yaml::from_str(&text)?
            }
        } else {
            ProvenanceTable::new()
        };
        debug!(
            "Opened provenance log {} with {} records",
            log_file.display(),
            table.len()
        );
        Ok(Self {
            log_file,
            table,
            saved: false,
        })
    }

    /// Record provenance for `filename`. Each file may be logged only once.
    pub fn log(&mut self, filename: impl AsRef<Path>, record: ProvenanceRecord) -> DiagResult<()> {
        let key = filename.as_ref().display().to_string();
        if self.table.contains_key(&key) {
            return Err(DiagError::DuplicateProvenance(key));
        }
        debug!("Logging provenance for {key}");
        self.table.insert(key, record);
        self.saved = false;
        Ok(())
    }

    pub fn table(&self) -> &ProvenanceTable {
        &self.table
    }

    pub fn log_file(&self) -> &Path {
        &self.log_file
    }

    /// Save the table and consume the logger.
    pub fn close(mut self) -> DiagResult<()> {
        self.save()
    }

    fn save(&mut self) -> DiagResult<()> {
        if let Some(dir) = self.log_file.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let text = serde_yaml::to_string(&self.table)?;
        std::fs::write(&self.log_file, text)?;
        self.saved = true;
        Ok(())
    }
}

impl Drop for ProvenanceLogger {
    fn drop(&mut self) {
        if self.saved {
            return;
        }
        if let Err(e) = self.save() {
            error!(
                "Failed to write provenance log {}: {e}",
                self.log_file.display()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(caption: &str) -> ProvenanceRecord {
        ProvenanceRecord::new(caption)
            .with_authors(["serv_fe", "hard_jo"])
            .with_references(["baldwin09qjrms"])
            .with_ancestors(["/preproc/zg_1979-2008.nc"])
    }

    #[test]
    fn duplicate_filename_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut logger = ProvenanceLogger::open_file(dir.path().join(PROVENANCE_FILE)).unwrap();
        logger.log("/work/pc.nc", record("first")).unwrap();

        let err = logger.log("/work/pc.nc", record("second")).unwrap_err();
        assert!(matches!(err, DiagError::DuplicateProvenance(ref f) if f == "/work/pc.nc"));
        assert_eq!(logger.table()["/work/pc.nc"].caption.as_deref(), Some("first"));
    }

    #[test]
    fn closed_log_can_be_reopened() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join(PROVENANCE_FILE);

        let mut logger = ProvenanceLogger::open_file(path.clone()).unwrap();
        logger.log("/work/a.nc", record("a")).unwrap();
        logger
            .log("/work/b.png", record("b").with_plot("zonal", Path::new("/plots/b.png")))
            .unwrap();
        logger.close().unwrap();

        let mut reopened = ProvenanceLogger::open_file(path).unwrap();
        assert_eq!(reopened.table().len(), 2);
        assert_eq!(reopened.table()["/work/a.nc"], record("a"));
        assert_eq!(reopened.table()["/work/b.png"].plot_type.as_deref(), Some("zonal"));
        // entries from the previous session still count as logged
        assert!(reopened.log("/work/a.nc", record("again")).is_err());
    }

    #[test]
    fn dropped_logger_saves_its_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROVENANCE_FILE);

        let result: DiagResult<()> = (|| {
            let mut logger = ProvenanceLogger::open_file(path.clone())?;
            logger.log("/work/a.nc", record("a"))?;
            logger.log("/work/a.nc", record("a"))?;
            Ok(())
        })();
        assert!(result.is_err());

        let reopened = ProvenanceLogger::open_file(path).unwrap();
        assert_eq!(reopened.table().keys().collect::<Vec<_>>(), vec!["/work/a.nc"]);
    }

    #[test]
    fn single_strings_load_as_lists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROVENANCE_FILE);
        std::fs::write(
            &path,
            "/work/pc.nc:\n  caption: NAM\n  ancestors: /preproc/zg.nc\n  \
             plot_file: [/p/a.png, /p/b.png]\n  domains: null\n",
        )
        .unwrap();

        let mut logger = ProvenanceLogger::open_file(path.clone()).unwrap();
        let rec = &logger.table()["/work/pc.nc"];
        assert_eq!(rec.ancestors, vec!["/preproc/zg.nc"]);
        assert_eq!(rec.plot_file, vec!["/p/a.png", "/p/b.png"]);
        assert!(rec.domains.is_empty());

        logger
            .log(
                "/work/pc_2.nc",
                record("next").with_plot_files(["/p/c.png"]),
            )
            .unwrap();
        logger.close().unwrap();
        let reopened = ProvenanceLogger::open_file(path).unwrap();
        assert_eq!(reopened.table()["/work/pc_2.nc"].plot_file, vec!["/p/c.png"]);
    }

    #[test]
    fn empty_file_is_an_empty_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROVENANCE_FILE);
        std::fs::write(&path, "").unwrap();
        assert!(ProvenanceLogger::open_file(path).unwrap().table().is_empty());
    }

    #[test]
    fn unknown_keys_survive_a_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROVENANCE_FILE);
        std::fs::write(
            &path,
            "/work/x.nc:\n  caption: x\n  themes: [phys]\n  ancestors: [/in.nc]\n",
        )
        .unwrap();

        let logger = ProvenanceLogger::open_file(path.clone()).unwrap();
        let rec = &logger.table()["/work/x.nc"];
        assert_eq!(rec.ancestors, vec!["/in.nc"]);
        assert!(rec.extra.contains_key("themes"));
        drop(logger);

        let text = std::fs::read_to_string(path).unwrap();
        assert!(text.contains("themes"));
        assert!(!text.contains("authors"));
    }
}

//! Dataset holder: owns the single in-memory table and its profile.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use polars::prelude::*;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("csv file not found: {0}")]
    NotFound(PathBuf),
    #[error("not a regular file: {0}")]
    NotAFile(PathBuf),
    #[error("csv file is {actual_mb:.1} MB, over the {limit_mb} MB limit")]
    TooLarge { actual_mb: f64, limit_mb: u64 },
    #[error("failed to read csv: {0}")]
    Csv(#[from] PolarsError),
    #[error("no dataset loaded; use `load <path>` first")]
    NoDatasetLoaded,
}

#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub max_size_mb: u64,
    pub infer_schema_rows: usize,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self { max_size_mb: 100, infer_schema_rows: 1000 }
    }
}

#[derive(Debug, Clone)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
}

/// Snapshot of the loaded table's shape and schema, used both for the
/// `load` banner and for describing the dataset to the model.
#[derive(Debug, Clone)]
pub struct DatasetProfile {
    pub rows: usize,
    pub cols: usize,
    pub fields: Vec<ColumnProfile>,
    pub preview: String,
}

impl DatasetProfile {
    pub fn column_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "{} rows x {} columns", self.rows, self.cols);
        let _ = writeln!(out, "columns:");
        for f in &self.fields {
            if f.null_count > 0 {
                let _ = writeln!(out, "  - {} ({}, {} nulls)", f.name, f.dtype, f.null_count);
            } else {
                let _ = writeln!(out, "  - {} ({})", f.name, f.dtype);
            }
        }
        let _ = writeln!(out, "sample rows:");
        let _ = write!(out, "{}", self.preview);
        out
    }
}

/// Holds at most one table at a time. A successful `load` replaces the held
/// frame wholesale; sandbox evaluation works on snapshots and never mutates
/// it in place.
#[derive(Debug)]
pub struct DatasetHolder {
    frame: Option<DataFrame>,
    path: Option<PathBuf>,
    sample_rows: usize,
}

impl DatasetHolder {
    pub fn new(sample_rows: usize) -> Self {
        Self { frame: None, path: None, sample_rows: sample_rows.max(1) }
    }

    pub fn load(&mut self, path: &Path, opts: &LoadOptions) -> Result<DatasetProfile, LoadError> {
        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        if !path.is_file() {
            return Err(LoadError::NotAFile(path.to_path_buf()));
        }
        if let Ok(meta) = fs::metadata(path) {
            let actual_mb = meta.len() as f64 / (1024.0 * 1024.0);
            if meta.len() > opts.max_size_mb.saturating_mul(1024 * 1024) {
                return Err(LoadError::TooLarge { actual_mb, limit_mb: opts.max_size_mb });
            }
        }

        let frame = LazyCsvReader::new(path)
            .with_infer_schema_length(Some(opts.infer_schema_rows))
            .with_try_parse_dates(true)
            .finish()?
            .collect()?;

        info!(rows = frame.height(), cols = frame.width(), path = %path.display(), "dataset loaded");

        self.frame = Some(frame);
        self.path = Some(path.to_path_buf());
        self.profile()
    }

    pub fn current(&self) -> Result<&DataFrame, LoadError> {
        self.frame.as_ref().ok_or(LoadError::NoDatasetLoaded)
    }

    pub fn is_loaded(&self) -> bool {
        self.frame.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn profile(&self) -> Result<DatasetProfile, LoadError> {
        let df = self.current()?;
        let fields = df
            .get_columns()
            .iter()
            .map(|s| ColumnProfile {
                name: s.name().to_string(),
                dtype: format!("{}", s.dtype()),
                null_count: s.null_count(),
            })
            .collect();
        Ok(DatasetProfile {
            rows: df.height(),
            cols: df.width(),
            fields,
            preview: format!("{}", df.head(Some(self.sample_rows))),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn scratch_csv(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(content.as_bytes()).expect("write csv");
        f
    }

    const PEOPLE: &str = "name,age,salary\nAlice,25,50000\nBob,30,60000\nCharlie,35,70000\nDiana,28,55000\n";

    #[test]
    fn load_reports_matching_shape() {
        let f = scratch_csv(PEOPLE);
        let mut holder = DatasetHolder::new(5);
        let profile = holder.load(f.path(), &LoadOptions::default()).expect("load");
        assert_eq!(profile.rows, 4);
        assert_eq!(profile.cols, 3);
        assert_eq!(profile.column_names(), vec!["name", "age", "salary"]);
        assert!(holder.is_loaded());
    }

    #[test]
    fn load_rejects_missing_path() {
        let mut holder = DatasetHolder::new(5);
        let err = holder
            .load(Path::new("/no/such/file.csv"), &LoadOptions::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        assert!(!holder.is_loaded());
    }

    #[test]
    fn load_enforces_size_limit() {
        let f = scratch_csv(PEOPLE);
        let mut holder = DatasetHolder::new(5);
        let opts = LoadOptions { max_size_mb: 0, ..Default::default() };
        let err = holder.load(f.path(), &opts).unwrap_err();
        assert!(matches!(err, LoadError::TooLarge { .. }));
    }

    #[test]
    fn current_before_load_fails() {
        let holder = DatasetHolder::new(5);
        assert!(matches!(holder.current(), Err(LoadError::NoDatasetLoaded)));
        assert!(matches!(holder.profile(), Err(LoadError::NoDatasetLoaded)));
    }

    #[test]
    fn reload_replaces_the_held_frame() {
        let first = scratch_csv(PEOPLE);
        let second = scratch_csv("city,country\nParis,France\nOslo,Norway\n");
        let mut holder = DatasetHolder::new(5);
        holder.load(first.path(), &LoadOptions::default()).expect("first load");
        let profile = holder.load(second.path(), &LoadOptions::default()).expect("second load");
        assert_eq!(profile.rows, 2);
        assert_eq!(profile.cols, 2);
        assert_eq!(holder.path(), Some(second.path()));
    }

    #[test]
    fn profile_counts_nulls() {
        let f = scratch_csv("a,b\n1,x\n2,\n3,y\n");
        let mut holder = DatasetHolder::new(5);
        let profile = holder.load(f.path(), &LoadOptions::default()).expect("load");
        let b = profile.fields.iter().find(|c| c.name == "b").expect("column b");
        assert_eq!(b.null_count, 1);
    }
}

//! CSV export of the consolidated table plus a verification manifest.
//!
//! Both files are written all-or-nothing: the bytes are rendered in memory,
//! written to a `.tmp` sibling and renamed over the destination. A failed
//! write leaves any previous file untouched.

use crate::consolidate::ConsolidatedTable;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to render CSV: {0}")]
    Render(String),

    #[error("failed to write {}: {reason}", path.display())]
    Write { path: PathBuf, reason: String },

    #[error("failed to read {}: {reason}", path.display())]
    Read { path: PathBuf, reason: String },

    #[error("invalid manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },
}

/// What was written, for the downstream uploader to check against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportManifest {
    pub rows: usize,
    pub columns: usize,
    /// `DD-MM-YYYY`, absent for an empty table.
    pub first_date: Option<String>,
    pub last_date: Option<String>,
    /// BLAKE3 of the CSV bytes, hex.
    pub blake3: String,
    pub written_at: DateTime<Utc>,
}

impl ExportManifest {
    pub fn describe(table: &ConsolidatedTable, csv: &[u8], written_at: DateTime<Utc>) -> Self {
        Self {
            rows: table.rows.len(),
            columns: table.column_count(),
            first_date: table.first_date().map(|d| d.display()),
            last_date: table.last_date().map(|d| d.display()),
            blake3: blake3::hash(csv).to_hex().to_string(),
            written_at,
        }
    }

    /// Whether `csv` is the file this manifest describes.
    pub fn matches(&self, csv: &[u8]) -> bool {
        blake3::hash(csv).to_hex().as_str() == self.blake3
    }
}

/// `<output>.manifest.json`
pub fn manifest_path(output: &Path) -> PathBuf {
    with_suffix(output, ".manifest.json")
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// The table as CSV bytes: header, then one line per date.
pub fn render_csv(table: &ConsolidatedTable) -> Result<Vec<u8>, ExportError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(&table.header)
        .map_err(|e| ExportError::Render(e.to_string()))?;
    for row in &table.rows {
        wtr.write_record(row.to_record())
            .map_err(|e| ExportError::Render(e.to_string()))?;
    }
    wtr.into_inner()
        .map_err(|e| ExportError::Render(e.to_string()))
}

/// Write `bytes` to `path` through a temporary sibling and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ExportError> {
    let write_err = |reason: String| ExportError::Write {
        path: path.to_path_buf(),
        reason,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
    }
    let tmp = with_suffix(path, ".tmp");
    if let Err(e) = fs::write(&tmp, bytes) {
        let _ = fs::remove_file(&tmp);
        return Err(write_err(e.to_string()));
    }
    fs::rename(&tmp, path).map_err(|e| {
        let _ = fs::remove_file(&tmp);
        write_err(e.to_string())
    })
}

/// Write the CSV and its manifest. Returns the manifest written.
pub fn export_table(table: &ConsolidatedTable, output: &Path) -> Result<ExportManifest, ExportError> {
    let csv = render_csv(table)?;
    write_atomic(output, &csv)?;

    let manifest = ExportManifest::describe(table, &csv, Utc::now());
    let json = serde_json::to_vec_pretty(&manifest).map_err(|e| ExportError::Render(e.to_string()))?;
    write_atomic(&manifest_path(output), &json)?;

    tracing::info!(
        path = %output.display(),
        rows = manifest.rows,
        columns = manifest.columns,
        first = manifest.first_date.as_deref().unwrap_or("-"),
        last = manifest.last_date.as_deref().unwrap_or("-"),
        "CSV written"
    );
    Ok(manifest)
}

pub fn read_manifest(output: &Path) -> Result<ExportManifest, ExportError> {
    let path = manifest_path(output);
    let content = fs::read_to_string(&path).map_err(|e| ExportError::Read {
        path: path.clone(),
        reason: e.to_string(),
    })?;
    serde_json::from_str(&content).map_err(|e| ExportError::Manifest {
        path,
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consolidate::ConsolidatedRow;
    use marketstat_core::domain::DateKey;

    fn table() -> ConsolidatedTable {
        ConsolidatedTable {
            header: vec!["Date".into(), "A_X".into(), "B_Y".into()],
            rows: vec![
                ConsolidatedRow {
                    date: DateKey::parse("03022025").unwrap(),
                    cells: vec!["5".into(), String::new()],
                },
                ConsolidatedRow {
                    date: DateKey::parse("04022025").unwrap(),
                    cells: vec![String::new(), "1.50".into()],
                },
            ],
        }
    }

    #[test]
    fn renders_header_and_empty_cells() {
        let csv = String::from_utf8(render_csv(&table()).unwrap()).unwrap();
        assert_eq!(csv, "Date,A_X,B_Y\n03-02-2025,5,\n04-02-2025,,1.50\n");
    }

    #[test]
    fn writes_csv_and_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out").join("data.csv");

        let manifest = export_table(&table(), &out).unwrap();
        assert_eq!(manifest.rows, 2);
        assert_eq!(manifest.columns, 3);
        assert_eq!(manifest.first_date.as_deref(), Some("03-02-2025"));
        assert_eq!(manifest.last_date.as_deref(), Some("04-02-2025"));

        let bytes = fs::read(&out).unwrap();
        assert!(manifest.matches(&bytes));
        assert_eq!(read_manifest(&out).unwrap(), manifest);
        assert!(!with_suffix(&out, ".tmp").exists());
    }

    #[test]
    fn failed_write_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("data.csv");
        fs::write(&out, "previous").unwrap();
        // A directory where the temp file should go makes the write fail.
        fs::create_dir(with_suffix(&out, ".tmp")).unwrap();

        assert!(matches!(
            write_atomic(&out, b"new"),
            Err(ExportError::Write { .. })
        ));
        assert_eq!(fs::read_to_string(&out).unwrap(), "previous");
    }

    #[test]
    fn manifest_detects_edits() {
        let t = table();
        let csv = render_csv(&t).unwrap();
        let manifest = ExportManifest::describe(&t, &csv, Utc::now());
        assert!(!manifest.matches(b"Date\n"));
        assert_eq!(manifest_path(Path::new("x/data.csv")), PathBuf::from("x/data.csv.manifest.json"));
    }
}

// src/orchestrator/status.rs

//! The per-list build status file, `<work>/<list>.stat`
//!
//! CSV with header `package name, build, vararg-build, vararg-error` and
//! one row per attempted source package. Rows are only ever appended; on
//! read the latest row for a package wins.

use crate::error::{Error, Result};
use crate::model::{BuildStatus, VarargType};
use fs2::FileExt;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const STATUS_HEADER: &str = "package name, build, vararg-build, vararg-error";

/// A row as read back from disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    pub package: String,
    pub build: bool,
    pub vararg_type: VarargType,
    pub vararg_error: Option<bool>,
}

fn py_bool(b: bool) -> &'static str {
    if b { "True" } else { "False" }
}

fn parse_bool(field: &str) -> Option<bool> {
    match field {
        "True" | "true" => Some(true),
        "False" | "false" => Some(false),
        _ => None,
    }
}

/// Render one status row
pub fn format_row(status: &BuildStatus) -> String {
    let vararg_error = match status.vararg_error {
        Some(e) => py_bool(e),
        None => "None",
    };
    format!(
        "{}, {}, {}, {}",
        status.package,
        py_bool(status.succeeded()),
        status.vararg_type,
        vararg_error
    )
}

/// Parse one data row; `None` for headers and malformed lines
pub fn parse_row(line: &str) -> Option<StatusRecord> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();
    if fields.len() < 2 || fields[0].is_empty() || fields[0] == "package name" {
        return None;
    }
    let build = parse_bool(fields[1])?;
    let vararg_type = fields
        .get(2)
        .and_then(|f| f.parse::<VarargType>().ok())
        .unwrap_or_default();
    let vararg_error = fields.get(3).and_then(|f| parse_bool(f));
    Some(StatusRecord {
        package: fields[0].to_string(),
        build,
        vararg_type,
        vararg_error,
    })
}

/// Append-only status file guarded by an exclusive file lock
#[derive(Debug, Clone)]
pub struct StatusFile {
    path: PathBuf,
}

impl StatusFile {
    pub fn new(work: &Path, list_name: &str) -> Self {
        Self {
            path: work.join(format!("{}.stat", list_name)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one row, writing the header first if the file is empty
    pub fn append(&self, status: &BuildStatus) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                Error::IoError(format!("Failed to open {}: {}", self.path.display(), e))
            })?;
        file.lock_exclusive().map_err(|e| {
            Error::IoError(format!("Failed to lock {}: {}", self.path.display(), e))
        })?;

        let mut text = String::new();
        if file.metadata()?.len() == 0 {
            text.push_str(STATUS_HEADER);
            text.push('\n');
        }
        text.push_str(&format_row(status));
        text.push('\n');
        let written = file.write_all(text.as_bytes());
        let _ = FileExt::unlock(&file);
        written?;
        Ok(())
    }

    /// Latest record per package
    pub fn read(&self) -> Result<BTreeMap<String, StatusRecord>> {
        read_status(&self.path)
    }
}

/// Read a status file; the last row for each package wins
pub fn read_status(path: &Path) -> Result<BTreeMap<String, StatusRecord>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    let mut records = BTreeMap::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match parse_row(line) {
            Some(record) => {
                records.insert(record.package.clone(), record);
            }
            None if line.starts_with("package name") => {}
            None => warn!("Ignoring malformed status row: {}", line),
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::BuildOutcome;
    use tempfile::TempDir;

    #[test]
    fn test_row_format() {
        let ok = BuildStatus::new("zlib", BuildOutcome::DummyBuildSucceeded)
            .with_vararg(VarargType::Dpkg, false);
        assert_eq!(format_row(&ok), "zlib, True, dpkg, False");

        let failed = BuildStatus::new("libfoo", BuildOutcome::OriginalBuildFailed);
        assert_eq!(format_row(&failed), "libfoo, False, none, None");
    }

    #[test]
    fn test_append_writes_header_once_and_latest_wins() {
        let temp = TempDir::new().unwrap();
        let status = StatusFile::new(temp.path(), "vlc");

        status
            .append(&BuildStatus::new("zlib", BuildOutcome::DummyBuildFailed))
            .unwrap();
        status
            .append(&BuildStatus::new("libpng", BuildOutcome::MakeFallbackSucceeded))
            .unwrap();
        status
            .append(
                &BuildStatus::new("zlib", BuildOutcome::DummyBuildSucceeded)
                    .with_vararg(VarargType::Manual, true),
            )
            .unwrap();

        let text = fs::read_to_string(status.path()).unwrap();
        assert_eq!(text.matches(STATUS_HEADER).count(), 1);
        assert_eq!(text.lines().count(), 4);

        let records = status.read().unwrap();
        assert_eq!(records.len(), 2);
        assert!(records["zlib"].build);
        assert_eq!(records["zlib"].vararg_type, VarargType::Manual);
        assert_eq!(records["zlib"].vararg_error, Some(true));
        assert!(records["libpng"].build);
        assert_eq!(records["libpng"].vararg_error, None);
    }

    #[test]
    fn test_read_skips_repeated_headers() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("x.stat");
        fs::write(
            &path,
            "package name, build, vararg-build, vararg-error\nzlib, False, none, None\npackage name, build, vararg-build, vararg-error\nzlib, True, none, None\n",
        )
        .unwrap();
        let records = read_status(&path).unwrap();
        assert!(records["zlib"].build);
    }
}

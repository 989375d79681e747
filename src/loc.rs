// src/loc.rs

//! Lines-of-code report over an application and its dependencies
//!
//! Every dependency directory produced by a build run (`<base>/<dep>/`)
//! holds exactly one unpacked source package. Source packages shared by
//! several dependencies are counted once and list every dependency that
//! pulled them in. The application itself is fetched with
//! `apt-get source` into a temporary directory.

use crate::error::{Error, Result};
use crate::process::{Invocation, ToolRunner};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tracing::{debug, info};
use walkdir::WalkDir;

const SOURCE_PATTERN: &str = r"(?i)\.(c|cc|cxx|h|hh|hxx|hpp)$";

/// One counted source package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePackageLoc {
    pub packages: Vec<String>,
    #[serde(rename = "lines-of-code")]
    pub lines_of_code: u64,
}

/// The JSON document written by `debslim loc`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocReport {
    pub application: String,
    #[serde(rename = "lines-of-code")]
    pub lines_of_code: u64,
    #[serde(rename = "source-packages")]
    pub source_packages: BTreeMap<String, SourcePackageLoc>,
}

impl LocReport {
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")
            .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))
    }
}

/// Accumulates per-source-package counts
pub struct LocCounter {
    pattern: Regex,
    source_packages: BTreeMap<String, SourcePackageLoc>,
}

impl LocCounter {
    pub fn new() -> Result<Self> {
        let pattern = Regex::new(SOURCE_PATTERN)
            .map_err(|e| Error::ParseError(format!("Invalid source pattern: {}", e)))?;
        Ok(Self {
            pattern,
            source_packages: BTreeMap::new(),
        })
    }

    pub fn is_source_file(&self, path: &Path) -> bool {
        self.pattern.is_match(&path.to_string_lossy())
    }

    /// C and C++ source files under `dir`, sorted
    pub fn source_files(&self, dir: &Path) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && self.is_source_file(e.path()))
            .map(|e| e.into_path())
            .collect();
        files.sort();
        files
    }

    /// Newline count over all source files under `dir`
    pub fn count_dir(&self, dir: &Path) -> Result<u64> {
        let files = self.source_files(dir);
        if files.is_empty() {
            debug!("No C/C++ source files under {}", dir.display());
        }
        let mut total = 0;
        for file in files {
            let bytes = fs::read(&file)
                .map_err(|e| Error::IoError(format!("Failed to read {}: {}", file.display(), e)))?;
            total += bytes.iter().filter(|b| **b == b'\n').count() as u64;
        }
        Ok(total)
    }

    /// Count `<base>/<package>`
    ///
    /// `None` when the directory is missing or does not hold exactly one
    /// source directory; `Some(0)` when its source package was already
    /// counted for another dependency.
    pub fn count_package(&mut self, base: &Path, package: &str) -> Result<Option<u64>> {
        let dir = base.join(package);
        if !dir.is_dir() {
            info!("  {}: not present", package);
            return Ok(None);
        }

        let subdirs: Vec<String> = fs::read_dir(&dir)?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        let [src_package] = subdirs.as_slice() else {
            info!("  {}: {} source directories, skipped", package, subdirs.len());
            return Ok(None);
        };

        if let Some(entry) = self.source_packages.get_mut(src_package) {
            entry.packages.push(package.to_string());
            info!("  {}: {} already counted", package, src_package);
            return Ok(Some(0));
        }

        let loc = self.count_dir(&dir)?;
        info!("  {}: {} ({} lines)", package, src_package, loc);
        self.source_packages.insert(
            src_package.clone(),
            SourcePackageLoc {
                packages: vec![package.to_string()],
                lines_of_code: loc,
            },
        );
        Ok(Some(loc))
    }

    /// Fetch the source of `application` into a temporary directory and count it
    pub fn count_application(
        &mut self,
        runner: &dyn ToolRunner,
        application: &str,
        timeout: Duration,
    ) -> Result<u64> {
        let temp = TempDir::new()
            .map_err(|e| Error::IoError(format!("Failed to create temporary directory: {}", e)))?;
        let home = temp.path().join(application);
        fs::create_dir_all(&home)?;

        let inv = Invocation::new("apt-get")
            .args(["source", application])
            .cwd(&home)
            .timeout(timeout);
        runner.run_checked(&inv)?;

        Ok(self.count_package(temp.path(), application)?.unwrap_or(0))
    }

    pub fn into_report(self, application: &str, lines_of_code: u64) -> LocReport {
        LocReport {
            application: application.to_string(),
            lines_of_code,
            source_packages: self.source_packages,
        }
    }
}

/// Count `application` and every dependency under `base`
pub fn calculate(
    runner: &dyn ToolRunner,
    application: &str,
    deps: &[String],
    base: &Path,
    timeout: Duration,
) -> Result<LocReport> {
    let mut counter = LocCounter::new()?;

    info!("Main package: {}", application);
    let mut total = counter.count_application(runner, application, timeout)?;

    let mut sorted: Vec<&String> = deps.iter().collect();
    sorted.sort();
    for dep in sorted {
        if let Some(loc) = counter.count_package(base, dep)? {
            total += loc;
        }
    }
    info!("Total LoC: {}", total);
    Ok(counter.into_report(application, total))
}

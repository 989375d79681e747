// src/trace.rs

//! Folding of per-process trace files
//!
//! The runtime loader writes one `<name>.<pid>` file per process. Folding
//! merges their distinct entries into `<name>`, which the closure resolver
//! reads as its trace.

use crate::error::{Error, Result};
use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

/// Loader trace: entries on one space separated line, `nodep` when empty
pub const LOADER_TRACE: &str = "lzload.trace";

/// What a fold did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FoldReport {
    pub merged_files: Vec<PathBuf>,
    pub entries: BTreeSet<String>,
    pub output: PathBuf,
}

/// Merge `<dir>/<trace_name>.*` into `<dir>/<trace_name>` (append)
///
/// The inputs are deleted unless `preserve` is set.
pub fn fold(dir: &Path, trace_name: &str, preserve: bool) -> Result<FoldReport> {
    let pattern = format!(
        "{}/{}.*",
        glob::Pattern::escape(&dir.to_string_lossy()),
        glob::Pattern::escape(trace_name)
    );

    let mut report = FoldReport {
        output: dir.join(trace_name),
        ..Default::default()
    };
    for path in glob::glob(&pattern)?.filter_map(|p| p.ok()) {
        info!("Merging {}", path.display());
        let text = fs::read_to_string(&path)
            .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
        report.entries.extend(
            text.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string),
        );
        if !preserve {
            fs::remove_file(&path)?;
        }
        report.merged_files.push(path);
    }

    let is_loader = trace_name == LOADER_TRACE;
    let mut out = String::new();
    if !report.entries.is_empty() {
        let sep = if is_loader { " " } else { "\n" };
        for entry in &report.entries {
            out.push_str(entry);
            out.push_str(sep);
        }
        out.push('\n');
    } else if is_loader {
        out.push_str("nodep\n");
    }

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&report.output)
        .map_err(|e| {
            Error::IoError(format!("Failed to open {}: {}", report.output.display(), e))
        })?;
    file.write_all(out.as_bytes())?;
    Ok(report)
}

// src/orchestrator/workspace.rs

//! Per-package stage trees under the working directory
//!
//! A fetched source package lives in `<work>/<src>/`. Each build stage
//! works in its own copy, `<work>/<src><suffix>/`, so stages never see
//! each other's build products.

use crate::error::{Error, Result};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Stage tree suffixes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Original,
    Dpkg,
    Make,
    Vararg,
}

impl Stage {
    pub fn suffix(&self) -> &'static str {
        match self {
            Stage::Original => ".original",
            Stage::Dpkg => ".dpkg",
            Stage::Make => ".make",
            Stage::Vararg => ".vararg",
        }
    }
}

/// Path of the `stage` tree of `src`
pub fn stage_path(work: &Path, src: &str, stage: Stage) -> PathBuf {
    work.join(format!("{}{}", src, stage.suffix()))
}

/// Recursively copy `from` into a new directory `to`, keeping symlinks as links
pub fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    for entry in WalkDir::new(from).follow_links(false) {
        let entry = entry?;
        let rel = entry
            .path()
            .strip_prefix(from)
            .map_err(|e| Error::IoError(format!("Bad path under {}: {}", from.display(), e)))?;
        let dest = to.join(rel);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&dest)?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(entry.path())?;
            symlink(&target, &dest)?;
        } else {
            fs::copy(entry.path(), &dest).map_err(|e| {
                Error::IoError(format!(
                    "Failed to copy {} to {}: {}",
                    entry.path().display(),
                    dest.display(),
                    e
                ))
            })?;
        }
    }
    Ok(())
}

/// Create the `stage` copy of `<work>/<src>`
///
/// With `force` an existing copy is deleted first; otherwise it is reused.
pub fn copy_stage(work: &Path, src: &str, stage: Stage, force: bool) -> Result<PathBuf> {
    let origin = work.join(src);
    let dest = stage_path(work, src, stage);

    if dest.exists() && force {
        debug!("Removing {}", dest.display());
        fs::remove_dir_all(&dest)?;
    }
    if dest.exists() {
        warn!("{} exists, reusing it", dest.display());
        return Ok(dest);
    }
    copy_tree(&origin, &dest)?;
    Ok(dest)
}

/// The single unpacked source directory inside a stage tree
pub fn single_subdir(src: &str, home: &Path) -> Result<PathBuf> {
    let mut dirs: Vec<PathBuf> = fs::read_dir(home)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_dir())
        .collect();

    match dirs.len() {
        0 => Err(Error::build(src, "no source directories")),
        1 => Ok(dirs.remove(0)),
        n => Err(Error::build(
            src,
            format!("{} source directories, expected exactly one", n),
        )),
    }
}

/// Paths of `candidates` relative to `root`; paths outside it are kept whole
pub fn relative_to_tree(root: &Path, candidates: &[PathBuf]) -> Vec<PathBuf> {
    candidates
        .iter()
        .map(|c| c.strip_prefix(root).map(Path::to_path_buf).unwrap_or_else(|_| c.clone()))
        .collect()
}

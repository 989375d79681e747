// src/install.rs

//! Moving dummy libraries in and out of use
//!
//! `install` moves the scraped libraries of each dependency from
//! `<work>/lib` to `<work>/installed-lib`; `restore` moves everything
//! back.

use crate::error::{Error, Result};
use crate::exclude::ExclusionList;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

pub const INSTALLED_DIR: &str = "installed-lib";

/// Outcome of an install run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallReport {
    pub installed: Vec<String>,
    /// Listed libraries with no scraped counterpart
    pub missing: Vec<String>,
    /// Dependencies without an entry in `packages.txt`
    pub unknown_packages: Vec<String>,
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    if fs::rename(from, to).is_ok() {
        return Ok(());
    }
    // rename fails across filesystems
    fs::copy(from, to).map_err(|e| {
        Error::IoError(format!(
            "Failed to move {} to {}: {}",
            from.display(),
            to.display(),
            e
        ))
    })?;
    fs::remove_file(from)?;
    Ok(())
}

/// Install the dummy libraries of every non-excluded dependency
pub fn install(
    work: &Path,
    deps: &[String],
    packages: &BTreeMap<String, Vec<String>>,
    excludes: &ExclusionList,
) -> Result<InstallReport> {
    let installed_home = work.join(INSTALLED_DIR);
    fs::create_dir_all(&installed_home)?;
    let lib_home = work.join(crate::orchestrator::LIB_DIR);

    let mut report = InstallReport::default();
    for dep in deps.iter().filter(|d| !excludes.excludes(d)) {
        let Some(libs) = packages.get(dep) else {
            warn!("No package information for {}", dep);
            report.unknown_packages.push(dep.clone());
            continue;
        };
        for lib in libs {
            let path = lib_home.join(lib);
            if path.exists() {
                info!("Installing {} from {}", lib, dep);
                move_file(&path, &installed_home.join(lib))?;
                report.installed.push(lib.clone());
            } else {
                warn!("{} not in dummy libs", lib);
                report.missing.push(lib.clone());
            }
        }
    }
    Ok(report)
}

/// Move every installed library back; returns the restored file names
pub fn restore(work: &Path) -> Result<Vec<String>> {
    let installed_home = work.join(INSTALLED_DIR);
    if !installed_home.exists() {
        return Err(Error::NotFoundError(format!(
            "{} does not exist, nothing to restore",
            installed_home.display()
        )));
    }
    let lib_home = work.join(crate::orchestrator::LIB_DIR);
    fs::create_dir_all(&lib_home)?;

    let mut restored = Vec::new();
    for entry in fs::read_dir(&installed_home)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().into_owned();
        info!("Restoring {}", name);
        move_file(&entry.path(), &lib_home.join(&name))?;
        restored.push(name);
    }
    restored.sort();
    Ok(restored)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_install_and_restore() {
        let temp = TempDir::new().unwrap();
        let work = temp.path();
        fs::create_dir_all(work.join("lib")).unwrap();
        fs::write(work.join("lib/libz.so.1"), "z").unwrap();

        let mut packages = BTreeMap::new();
        packages.insert(
            "zlib1g".to_string(),
            vec!["libz.so.1".to_string(), "libzz.so.1".to_string()],
        );
        let deps = vec!["zlib1g".to_string(), "libpng16-16".to_string(), "libc6".to_string()];
        let excludes = ExclusionList::new(["libc6"]);

        let report = install(work, &deps, &packages, &excludes).unwrap();
        assert_eq!(report.installed, vec!["libz.so.1"]);
        assert_eq!(report.missing, vec!["libzz.so.1"]);
        assert_eq!(report.unknown_packages, vec!["libpng16-16"]);
        assert!(work.join("installed-lib/libz.so.1").exists());
        assert!(!work.join("lib/libz.so.1").exists());

        assert_eq!(restore(work).unwrap(), vec!["libz.so.1"]);
        assert!(work.join("lib/libz.so.1").exists());
    }

    #[test]
    fn test_restore_without_install_dir() {
        let temp = TempDir::new().unwrap();
        assert!(matches!(restore(temp.path()), Err(Error::NotFoundError(_))));
    }
}

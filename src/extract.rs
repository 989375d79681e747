// src/extract.rs

//! Package Extractor
//!
//! Fetches binary `.deb` archives, unpacks them once into
//! `<work>/<dep>/` (control files) and `<work>/<dep>/tmp/` (payload), and
//! turns the payload into a [`Package`] record plus the [`Library`] records
//! of every shared object it ships.
//!
//! Failures here are soft: a package whose archive is corrupt or whose
//! symbol generation fails is still returned, with `has_symbols` false.

use crate::elf::{Introspector, soname_or_filename};
use crate::error::{Error, Result};
use crate::exclude::ExclusionList;
use crate::model::{Library, Package};
use crate::process::{Invocation, ToolRunner};
use flate2::read::GzDecoder;
use glob::Pattern;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::Read;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use xz2::read::XzDecoder;

/// Name of the payload directory inside a package directory
pub const PAYLOAD_DIR: &str = "tmp";

/// Concatenated symbol-definition output inside a package directory
pub const SYMBOLS_FILE: &str = "symbols";

const GENSYMBOLS_OUT: &str = "symbols-t";

/// Conventional executable locations, relative to the payload root
const BIN_DIRS: &[&str] = &["bin", "sbin", "usr/bin", "usr/sbin"];

/// Shared library file names: `lib*.so*`
pub fn is_library_name(name: &str) -> bool {
    name.strip_prefix("lib")
        .map(|rest| rest.contains(".so"))
        .unwrap_or(false)
}

/// All files named like shared libraries under `root`, sorted, symlinks included
pub fn gather_libs(root: &Path) -> Vec<PathBuf> {
    let mut libs: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .filter(|e| is_library_name(&e.file_name().to_string_lossy()))
        .map(|e| e.into_path())
        .collect();
    libs.sort();
    libs
}

/// Whether `path` is a symbolic link (not followed)
pub fn is_symlink(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

fn member_reader<'a, R: Read + 'a>(name: &str, reader: R) -> Result<Box<dyn Read + 'a>> {
    if name.ends_with(".tar.gz") {
        Ok(Box::new(GzDecoder::new(reader)))
    } else if name.ends_with(".tar.xz") {
        Ok(Box::new(XzDecoder::new(reader)))
    } else if name.ends_with(".tar.zst") {
        let decoder = zstd::Decoder::new(reader)
            .map_err(|e| Error::ArchiveError(format!("Failed to create zstd decoder: {}", e)))?;
        Ok(Box::new(decoder))
    } else if name.ends_with(".tar") {
        Ok(Box::new(reader))
    } else {
        Err(Error::ArchiveError(format!(
            "Unsupported archive member: {}",
            name
        )))
    }
}

/// Unpack a `.deb`: control members into `control_dir`, payload into `data_dir`
pub fn unpack_deb(deb: &Path, control_dir: &Path, data_dir: &Path) -> Result<()> {
    let file = File::open(deb)
        .map_err(|e| Error::ArchiveError(format!("Failed to open {}: {}", deb.display(), e)))?;
    let mut archive = ar::Archive::new(file);
    let mut found_data = false;

    while let Some(entry) = archive.next_entry() {
        let entry = entry.map_err(|e| {
            Error::ArchiveError(format!("Corrupt ar archive {}: {}", deb.display(), e))
        })?;
        let name = String::from_utf8_lossy(entry.header().identifier()).to_string();

        let dest = if name.starts_with("control.tar") {
            control_dir
        } else if name.starts_with("data.tar") {
            found_data = true;
            data_dir
        } else {
            debug!("Skipping ar member {}", name);
            continue;
        };

        fs::create_dir_all(dest)?;
        let reader = member_reader(&name, entry)?;
        tar::Archive::new(reader).unpack(dest).map_err(|e| {
            Error::ArchiveError(format!("Failed to unpack {} from {}: {}", name, deb.display(), e))
        })?;
    }

    if !found_data {
        return Err(Error::ArchiveError(format!(
            "{} has no data.tar member",
            deb.display()
        )));
    }
    Ok(())
}

fn dir_is_populated(dir: &Path) -> bool {
    fs::read_dir(dir)
        .map(|mut it| it.next().is_some())
        .unwrap_or(false)
}

fn find_deb(dir: &Path, dep: &str) -> Option<PathBuf> {
    let escaped = Pattern::escape(dep);
    for pattern in [format!("{}_*.deb", escaped), format!("{}*.deb", escaped)] {
        let full = dir.join(pattern);
        let Ok(paths) = glob::glob(&full.to_string_lossy()) else {
            continue;
        };
        let mut hits: Vec<PathBuf> = paths.filter_map(|p| p.ok()).collect();
        hits.sort();
        if let Some(first) = hits.into_iter().next() {
            return Some(first);
        }
    }
    None
}

/// Locate or download the binary archive for `dep`
///
/// An existing `<work>/<dep>/` is reused as-is. Otherwise the archive is
/// downloaded into `work` and moved into a fresh `<work>/<dep>/`.
/// Returns `None` (after a warning) when no archive can be found.
pub fn fetch_binary_package(
    runner: &dyn ToolRunner,
    work: &Path,
    dep: &str,
    timeout: Duration,
) -> Option<PathBuf> {
    let pkg_dir = work.join(dep);
    if pkg_dir.is_dir() {
        let found = find_deb(&pkg_dir, dep);
        if found.is_none() {
            warn!("{} exists but holds no archive for {}", pkg_dir.display(), dep);
        }
        return found;
    }

    let inv = Invocation::new("apt-get")
        .args(["download", dep])
        .cwd(work)
        .timeout(timeout);
    match runner.run_checked(&inv) {
        Ok(_) => {}
        Err(e) => {
            warn!("No package found for {}: {}", dep, e);
            return None;
        }
    }

    let Some(downloaded) = find_deb(work, dep) else {
        warn!("No package found for {}", dep);
        return None;
    };
    let file_name = downloaded.file_name()?.to_owned();
    let dest = pkg_dir.join(file_name);
    if let Err(e) = fs::create_dir_all(&pkg_dir).and_then(|_| fs::rename(&downloaded, &dest)) {
        warn!("Failed to move {} into {}: {}", downloaded.display(), pkg_dir.display(), e);
        return None;
    }
    Some(dest)
}

/// Result of extracting one package
#[derive(Debug, Clone)]
pub struct Extraction {
    pub package: Package,
    /// One record per distinct SONAME, first occurrence wins
    pub libraries: Vec<Library>,
}

/// Extracts packages and generates their symbol data
pub struct PackageExtractor<'a> {
    runner: &'a dyn ToolRunner,
    introspector: &'a dyn Introspector,
    ldd_excludes: &'a ExclusionList,
    timeout: Duration,
}

impl<'a> PackageExtractor<'a> {
    pub fn new(
        runner: &'a dyn ToolRunner,
        introspector: &'a dyn Introspector,
        ldd_excludes: &'a ExclusionList,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            introspector,
            ldd_excludes,
            timeout,
        }
    }

    /// Extract `deb` into `pkg_dir` and describe its contents
    pub fn extract(&self, name: &str, deb: &Path, pkg_dir: &Path) -> Extraction {
        let mut package = Package::new(name, deb);
        let payload = pkg_dir.join(PAYLOAD_DIR);

        if dir_is_populated(&payload) {
            debug!("Reusing extracted tree {}", payload.display());
        } else {
            info!("Extracting {}", deb.display());
            if let Err(e) = unpack_deb(deb, pkg_dir, &payload) {
                warn!("Failed to extract {}: {}", deb.display(), e);
                return Extraction {
                    package,
                    libraries: Vec::new(),
                };
            }
        }

        let libs = gather_libs(&payload);
        package.raw_libs = libs.iter().filter(|l| !is_symlink(l)).cloned().collect();

        match self.generate_symbols(&package, pkg_dir) {
            Ok(()) => package.has_symbols = true,
            Err(e) => warn!("Failed to build symbols file for {}: {}", deb.display(), e),
        }

        let libraries = self.read_libraries(&package);
        self.read_binaries(&mut package, &payload);

        Extraction { package, libraries }
    }

    /// Run the symbol generator once per distinct SONAME and concatenate its output
    fn generate_symbols(&self, package: &Package, pkg_dir: &Path) -> Result<()> {
        let symbols_path = pkg_dir.join(SYMBOLS_FILE);
        let scratch = pkg_dir.join(GENSYMBOLS_OUT);
        let mut combined = String::new();
        let mut added = HashSet::new();

        for lib in &package.raw_libs {
            let soname = soname_or_filename(self.introspector, lib);
            if !added.insert(soname) {
                continue;
            }

            let inv = Invocation::new("dpkg-gensymbols")
                .arg("-v0")
                .arg(format!("-p{}", package.name))
                .arg(format!("-e{}", lib.display()))
                .arg(format!("-O{}", GENSYMBOLS_OUT))
                .cwd(pkg_dir)
                .timeout(self.timeout);
            self.runner.run_checked(&inv)?;

            combined.push_str(&fs::read_to_string(&scratch).map_err(|e| {
                Error::IoError(format!("Failed to read {}: {}", scratch.display(), e))
            })?);
            fs::remove_file(&scratch)?;
        }

        fs::write(&symbols_path, combined)?;
        Ok(())
    }

    fn read_libraries(&self, package: &Package) -> Vec<Library> {
        let mut seen = HashSet::new();
        let mut libraries = Vec::new();
        for lib in &package.raw_libs {
            let soname = soname_or_filename(self.introspector, lib);
            if !seen.insert(soname.clone()) {
                continue;
            }
            let needed = self
                .introspector
                .needed(lib)
                .into_iter()
                .filter(|n| !self.ldd_excludes.excludes(n))
                .collect();
            libraries.push(Library::new(soname, needed));
        }
        libraries
    }

    fn read_binaries(&self, package: &mut Package, payload: &Path) {
        let mut binaries: Vec<String> = BIN_DIRS
            .iter()
            .map(|d| payload.join(d))
            .filter(|d| d.is_dir())
            .flat_map(|d| WalkDir::new(d).into_iter().filter_map(|e| e.ok()))
            .filter(|e| !e.file_type().is_dir())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        binaries.sort();

        if binaries.is_empty() {
            let executables: Vec<PathBuf> = find_executables(payload)
                .into_iter()
                .filter(|p| {
                    p.file_name()
                        .map(|n| !is_library_name(&n.to_string_lossy()))
                        .unwrap_or(false)
                })
                .collect();
            if !executables.is_empty() {
                warn!(
                    "Permission scan found executables outside the binary directories of {}: {:?}",
                    package.name, executables
                );
                binaries.extend(
                    executables
                        .iter()
                        .filter_map(|p| p.file_name())
                        .map(|n| n.to_string_lossy().into_owned()),
                );
            }

            package.has_perlmodules = any_file(payload, |name| name.ends_with(".pm"));
            package.has_locale = any_file(payload, |name| name.ends_with(".mo"));
            package.has_man = any_file(payload, |name| name.contains("man"));
        }

        for b in &binaries {
            package.add_binary(b);
        }
    }
}

/// Regular files with any execute bit set
pub fn find_executables(root: &Path) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter(|e| {
            e.metadata()
                .map(|m| m.permissions().mode() & 0o111 != 0)
                .unwrap_or(false)
        })
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

fn any_file(root: &Path, pred: impl Fn(&str) -> bool) -> bool {
    WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .any(|e| pred(&e.file_name().to_string_lossy()))
}

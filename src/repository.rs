// src/repository.rs

//! Symbol Repository
//!
//! The queryable index built from extracted packages: SONAME to
//! [`Library`] (needed list and exported symbols), library to owning
//! package, binary to owning package, and the extra classification of
//! packages that ship neither.
//!
//! On-disk layout under the working directory:
//!
//! ```text
//! libraries.txt            one SONAME per line
//! meta/<soname>.libraries  one needed SONAME per line
//! meta/<soname>.symbols    "<soname> <symbol>" per line
//! packages.txt             "<soname> <package>" per line
//! binaries.txt             "<binary> <package>" per line
//! extra.txt                "<package> <kind>" per line
//! ```

use crate::error::{Error, Result};
use crate::extract::{Extraction, SYMBOLS_FILE};
use crate::model::{Library, Package};
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

pub const LIBRARIES_FILE: &str = "libraries.txt";
pub const PACKAGES_FILE: &str = "packages.txt";
pub const BINARIES_FILE: &str = "binaries.txt";
pub const EXTRA_FILE: &str = "extra.txt";
pub const META_DIR: &str = "meta";

/// Needed-library lookups used by the closure resolver
pub trait LibraryIndex {
    /// Needed list of `soname`, empty when unknown
    fn needed_of(&self, soname: &str) -> Vec<String>;

    /// Whether `soname` has an entry in the index
    fn is_known(&self, soname: &str) -> bool;
}

/// In-memory symbol repository
#[derive(Debug, Default, Clone)]
pub struct SymbolRepository {
    libraries: BTreeMap<String, Library>,
    /// Insertion order of SONAMEs, used for `libraries.txt`
    order: Vec<String>,
    packages: Vec<Package>,
}

/// Counts from one parsed symbol file
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ParseStats {
    pub libraries: usize,
    pub symbols: usize,
    /// Symbol lines seen before any library header
    pub orphans: usize,
}

impl SymbolRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a library unless its SONAME is already present
    pub fn insert_library(&mut self, library: Library) -> bool {
        if self.libraries.contains_key(&library.soname) {
            return false;
        }
        self.order.push(library.soname.clone());
        self.libraries.insert(library.soname.clone(), library);
        true
    }

    pub fn add_package(&mut self, package: Package) {
        self.packages.push(package);
    }

    /// Merge one extraction: libraries first, then the package record
    pub fn add_extraction(&mut self, extraction: Extraction) {
        for lib in extraction.libraries {
            self.insert_library(lib);
        }
        self.add_package(extraction.package);
    }

    pub fn library(&self, soname: &str) -> Option<&Library> {
        self.libraries.get(soname)
    }

    pub fn libraries(&self) -> impl Iterator<Item = &Library> {
        self.order.iter().filter_map(|s| self.libraries.get(s))
    }

    pub fn packages(&self) -> &[Package] {
        &self.packages
    }

    pub fn package(&self, name: &str) -> Option<&Package> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// Parse symbol-definition text, registering libraries against `package`
    ///
    /// Header lines (first character not space, `|` or `*`) open a library
    /// section; indented lines add one symbol with any `@version` suffix
    /// stripped. Lines whose first token is `|` or `*` are metadata.
    pub fn parse_symbols(&mut self, package: &mut Package, text: &str) -> ParseStats {
        let mut stats = ParseStats::default();
        let mut current = String::new();

        for line in text.lines() {
            let Some(first) = line.chars().next() else {
                continue;
            };

            if first != ' ' && first != '|' && first != '*' {
                let Some(soname) = line.split_whitespace().next() else {
                    continue;
                };
                current = soname.to_string();
                package.add_lib(&current);
                stats.libraries += 1;
                if !self.libraries.contains_key(&current) {
                    warn!("Library {} not in library table", current);
                    self.insert_library(Library::new(current.clone(), Vec::new()));
                }
                continue;
            }

            let Some(token) = line.split_whitespace().next() else {
                continue;
            };
            if token == "|" || token == "*" {
                continue;
            }

            if current.is_empty() {
                warn!(
                    "Symbol line before any library header in {}: {}",
                    package.name,
                    line.trim()
                );
                stats.orphans += 1;
                continue;
            }

            let name = token.split('@').next().unwrap_or(token);
            if let Some(lib) = self.libraries.get_mut(&current) {
                lib.add_symbol(name);
                stats.symbols += 1;
            }
        }

        stats
    }

    /// Parse `<work>/<package>/symbols` for every package that has symbols
    pub fn load_symbols(&mut self, work: &Path) {
        let mut packages = std::mem::take(&mut self.packages);
        for package in packages.iter_mut().filter(|p| p.has_symbols) {
            let path = work.join(&package.name).join(SYMBOLS_FILE);
            match fs::read_to_string(&path) {
                Ok(text) => {
                    let stats = self.parse_symbols(package, &text);
                    debug!(
                        "{}: {} libraries, {} symbols",
                        package.name, stats.libraries, stats.symbols
                    );
                }
                Err(e) => warn!("Cannot read {}: {}", path.display(), e),
            }
        }
        self.packages = packages;
    }

    /// Write every index file under `work`
    pub fn save(&self, work: &Path) -> Result<()> {
        let meta = work.join(META_DIR);
        fs::create_dir_all(&meta)?;

        let mut out = create(&work.join(LIBRARIES_FILE))?;
        for lib in self.libraries() {
            writeln!(out, "{}", lib.soname)?;
        }
        out.flush()?;

        for lib in self.libraries() {
            let mut needed = create(&meta.join(format!("{}.libraries", lib.soname)))?;
            for n in &lib.needed {
                writeln!(needed, "{}", n)?;
            }
            needed.flush()?;

            let mut symbols = create(&meta.join(format!("{}.symbols", lib.soname)))?;
            for s in &lib.symbols {
                writeln!(symbols, "{} {}", lib.soname, s)?;
            }
            symbols.flush()?;
        }

        let mut out = create(&work.join(PACKAGES_FILE))?;
        for p in &self.packages {
            for l in &p.shared_libs {
                writeln!(out, "{} {}", l, p.name)?;
            }
        }
        out.flush()?;

        let mut out = create(&work.join(BINARIES_FILE))?;
        for p in &self.packages {
            for b in &p.binaries {
                writeln!(out, "{} {}", b, p.name)?;
            }
        }
        out.flush()?;

        let mut out = create(&work.join(EXTRA_FILE))?;
        for p in &self.packages {
            if let Some(kind) = p.extra_kind() {
                writeln!(out, "{} {}", p.name, kind)?;
            }
        }
        out.flush()?;

        info!(
            "Saved {} libraries from {} packages to {}",
            self.order.len(),
            self.packages.len(),
            work.display()
        );
        Ok(())
    }
}

impl LibraryIndex for SymbolRepository {
    fn needed_of(&self, soname: &str) -> Vec<String> {
        self.libraries
            .get(soname)
            .map(|l| l.needed.clone())
            .unwrap_or_default()
    }

    fn is_known(&self, soname: &str) -> bool {
        self.libraries.contains_key(soname)
    }
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    File::create(path)
        .map(BufWriter::new)
        .map_err(|e| Error::IoError(format!("Failed to create {}: {}", path.display(), e)))
}

/// The persisted repository, read back lazily
#[derive(Debug, Clone)]
pub struct DiskIndex {
    meta: PathBuf,
}

impl DiskIndex {
    pub fn new(work: &Path) -> Self {
        Self {
            meta: work.join(META_DIR),
        }
    }

    fn needed_path(&self, soname: &str) -> PathBuf {
        self.meta.join(format!("{}.libraries", soname))
    }
}

impl LibraryIndex for DiskIndex {
    fn needed_of(&self, soname: &str) -> Vec<String> {
        fs::read_to_string(self.needed_path(soname))
            .map(|text| {
                text.lines()
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    fn is_known(&self, soname: &str) -> bool {
        self.needed_path(soname).exists()
    }
}

/// Read a two-column "<key> <value>" file into a key map (last wins)
pub fn read_pairs(path: &Path) -> Result<HashMap<String, String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    Ok(text
        .lines()
        .filter_map(|l| {
            let mut toks = l.split_whitespace();
            Some((toks.next()?.to_string(), toks.next()?.to_string()))
        })
        .collect())
}

/// `binaries.txt` as binary to package
pub fn read_binaries(work: &Path) -> Result<HashMap<String, String>> {
    read_pairs(&work.join(BINARIES_FILE))
}

/// `packages.txt` as package to its libraries, in file order
pub fn read_package_libraries(path: &Path) -> Result<BTreeMap<String, Vec<String>>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read {}: {}", path.display(), e)))?;
    let mut packages: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for line in text.lines() {
        let mut toks = line.split_whitespace();
        if let (Some(lib), Some(pkg)) = (toks.next(), toks.next()) {
            packages.entry(pkg.to_string()).or_default().push(lib.to_string());
        }
    }
    Ok(packages)
}

/// Outcome of [`patch_symbols`]
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatchReport {
    pub patched: Vec<String>,
    /// Libraries named in the patch file with no symbol file
    pub skipped: Vec<String>,
}

/// Append `"<symbol> <soname>"` lines from `patch` onto `meta/<soname>.symbols`
pub fn patch_symbols(work: &Path, patch: &Path) -> Result<PatchReport> {
    let mut report = PatchReport::default();
    if !patch.exists() {
        warn!("{} does not exist", patch.display());
        return Ok(report);
    }

    let text = fs::read_to_string(patch)?;
    let mut table: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for line in text.lines() {
        let mut toks = line.split_whitespace();
        match (toks.next(), toks.next()) {
            (Some(sym), Some(lib)) => table.entry(lib).or_default().push(sym),
            (Some(_), None) => warn!("Malformed patch line: {}", line),
            _ => {}
        }
    }

    let meta = work.join(META_DIR);
    for (lib, syms) in table {
        let path = meta.join(format!("{}.symbols", lib));
        if !path.exists() {
            warn!("No symbol repository for library {}", lib);
            report.skipped.push(lib.to_string());
            continue;
        }
        let mut out = OpenOptions::new().append(true).open(&path)?;
        for s in syms {
            writeln!(out, "{} {}", lib, s)?;
        }
        report.patched.push(lib.to_string());
    }
    Ok(report)
}

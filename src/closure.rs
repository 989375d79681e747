// src/closure.rs

//! Runtime Closure Resolver
//!
//! Computes every library a binary can load at runtime: the binary's own
//! NEEDED entries plus an optional trace of observed loads, closed over
//! the repository's needed-library edges. Entries that are paths are
//! introspected directly instead of looked up by name.

use crate::elf::{Introspector, trim_libname};
use crate::error::{Error, Result};
use crate::exclude::ExclusionList;
use crate::repository::LibraryIndex;
use std::collections::{BTreeSet, HashMap};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use tracing::{debug, warn};

/// Resolved runtime dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Closure {
    /// Trimmed names present in the repository or binaries map
    pub libraries: BTreeSet<String>,
    /// Trimmed names reached but absent from the repository
    pub missing: BTreeSet<String>,
}

pub struct ClosureResolver<'a> {
    index: &'a dyn LibraryIndex,
    introspector: &'a dyn Introspector,
    excludes: &'a ExclusionList,
    binaries: &'a HashMap<String, String>,
}

impl<'a> ClosureResolver<'a> {
    pub fn new(
        index: &'a dyn LibraryIndex,
        introspector: &'a dyn Introspector,
        excludes: &'a ExclusionList,
        binaries: &'a HashMap<String, String>,
    ) -> Self {
        Self {
            index,
            introspector,
            excludes,
            binaries,
        }
    }

    /// Direct dependencies of `binary`, always-present libraries removed
    pub fn root_needed(&self, binary: &Path) -> Vec<String> {
        self.introspector
            .needed(binary)
            .into_iter()
            .filter(|n| !self.excludes.excludes(n))
            .collect()
    }

    /// Direct dependencies of a closure entry; always-present libraries removed
    /// whether they came from the file itself or from the repository
    fn needed(&self, lib: &str) -> Vec<String> {
        let needed = if lib.contains('/') {
            self.introspector.needed(Path::new(lib))
        } else {
            self.index.needed_of(lib)
        };
        needed
            .into_iter()
            .filter(|n| !self.excludes.excludes(n))
            .collect()
    }

    /// Close `root_needed` and `trace` over the needed-library graph
    pub fn resolve(&self, root_needed: &[String], trace: &[String]) -> Closure {
        let mut reached: BTreeSet<String> = root_needed.iter().cloned().collect();
        reached.extend(trace.iter().cloned());

        let mut work: Vec<String> = reached.iter().cloned().collect();
        let mut analyzed = BTreeSet::new();

        while let Some(lib) = work.pop() {
            if !analyzed.insert(lib.clone()) {
                continue;
            }
            for dep in self.needed(&lib) {
                if !analyzed.contains(&dep) {
                    work.push(dep.clone());
                }
                reached.insert(dep);
            }
        }
        debug!("Closure reached {} entries", reached.len());

        let mut closure = Closure::default();
        for lib in &reached {
            let name = trim_libname(lib).to_string();
            if self.index.is_known(&name) || self.binaries.contains_key(&name) {
                closure.libraries.insert(name);
            } else {
                warn!("{} not in symbol repository", name);
                closure.missing.insert(name);
            }
        }
        // a name can reach the repository through one path spelling and miss through another
        let known = closure.libraries.clone();
        closure.missing.retain(|m| !known.contains(m));
        closure
    }
}

/// Read a trace file: one library name or path per line
pub fn read_trace(path: &Path) -> Result<Vec<String>> {
    let text = fs::read_to_string(path)
        .map_err(|e| Error::IoError(format!("Failed to read trace {}: {}", path.display(), e)))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(str::to_string)
        .collect())
}

/// Write the runtime-dependency file: count, then one name per line
pub fn write_runtime_deps(path: &Path, closure: &Closure) -> Result<()> {
    let mut out = String::new();
    out.push_str(&format!("{}\n", closure.libraries.len()));
    for lib in &closure.libraries {
        out.push_str(lib);
        out.push('\n');
    }
    fs::write(path, out)
        .map_err(|e| Error::IoError(format!("Failed to write {}: {}", path.display(), e)))
}

/// Append one line naming the traced entries that are known binaries
pub fn append_binary_trace(
    path: &Path,
    trace: &[String],
    binaries: &HashMap<String, String>,
) -> Result<()> {
    let names: BTreeSet<&str> = trace
        .iter()
        .map(|t| trim_libname(t))
        .filter(|n| binaries.contains_key(*n))
        .collect();

    let mut line = String::new();
    for name in names {
        line.push_str(name);
        line.push(' ');
    }
    line.push('\n');

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_runtime_file_format() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("runtime.txt");
        let closure = Closure {
            libraries: ["libz.so.1", "libc.so.6"].iter().map(|s| s.to_string()).collect(),
            missing: BTreeSet::new(),
        };
        write_runtime_deps(&path, &closure).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "2\nlibc.so.6\nlibz.so.1\n");
    }

    #[test]
    fn test_binary_trace_appends() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("binary.trace");
        let mut binaries = HashMap::new();
        binaries.insert("gzip".to_string(), "gzip".to_string());
        let trace = vec!["/bin/gzip".to_string(), "libz.so.1".to_string()];

        append_binary_trace(&path, &trace, &binaries).unwrap();
        append_binary_trace(&path, &[], &binaries).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "gzip \n\n");
    }

    #[test]
    fn test_read_trace_skips_blank_lines() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("lzload.trace");
        fs::write(&path, "libz.so.1\n\n/usr/lib/libpng16.so.16\n").unwrap();
        assert_eq!(
            read_trace(&path).unwrap(),
            vec!["libz.so.1", "/usr/lib/libpng16.so.16"]
        );
    }
}

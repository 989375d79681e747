// src/elf.rs

//! Binary introspection
//!
//! Answers three questions about an ELF shared object or executable:
//! its SONAME, its direct NEEDED entries, and whether it defines symbols
//! whose names contain a marker substring (erasure and vararg markers).
//!
//! Every failure (missing file, not ELF, tool error) degrades to
//! "no information": `None` or an empty list.

use crate::process::{Invocation, ToolRunner};
use goblin::Object;
use goblin::elf::Elf;
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Introspection of ELF objects
pub trait Introspector: Send + Sync {
    /// The SONAME recorded in the dynamic section
    fn soname(&self, path: &Path) -> Option<String>;

    /// Direct NEEDED entries, in dynamic-section order
    fn needed(&self, path: &Path) -> Vec<String>;

    /// Symbol names containing `marker`, deduplicated, sorted
    fn marker_symbols(&self, path: &Path, marker: &str) -> Vec<String>;

    fn has_marker_symbol(&self, path: &Path, marker: &str) -> bool {
        !self.marker_symbols(path, marker).is_empty()
    }
}

/// Pure-Rust introspection with goblin
#[derive(Debug, Default, Clone, Copy)]
pub struct GoblinIntrospector;

impl GoblinIntrospector {
    fn with_elf<T>(path: &Path, default: T, f: impl FnOnce(&Elf) -> T) -> T {
        let bytes = match fs::read(path) {
            Ok(b) => b,
            Err(e) => {
                debug!("Cannot read {}: {}", path.display(), e);
                return default;
            }
        };
        match Object::parse(&bytes) {
            Ok(Object::Elf(elf)) => f(&elf),
            Ok(_) => {
                debug!("{} is not an ELF object", path.display());
                default
            }
            Err(e) => {
                debug!("Failed to parse {}: {}", path.display(), e);
                default
            }
        }
    }
}

impl Introspector for GoblinIntrospector {
    fn soname(&self, path: &Path) -> Option<String> {
        Self::with_elf(path, None, |elf| elf.soname.map(str::to_string))
    }

    fn needed(&self, path: &Path) -> Vec<String> {
        Self::with_elf(path, Vec::new(), |elf| {
            elf.libraries.iter().map(|l| (*l).to_string()).collect()
        })
    }

    fn marker_symbols(&self, path: &Path, marker: &str) -> Vec<String> {
        Self::with_elf(path, Vec::new(), |elf| {
            let mut found = BTreeSet::new();
            for sym in &elf.dynsyms {
                if let Some(name) = elf.dynstrtab.get_at(sym.st_name)
                    && name.contains(marker)
                {
                    found.insert(name.to_string());
                }
            }
            for sym in &elf.syms {
                if let Some(name) = elf.strtab.get_at(sym.st_name)
                    && name.contains(marker)
                {
                    found.insert(name.to_string());
                }
            }
            found.into_iter().collect()
        })
    }
}

/// Introspection through `objdump -p` and `readelf -Ws`
pub struct BinutilsIntrospector {
    runner: Arc<dyn ToolRunner>,
}

impl BinutilsIntrospector {
    pub fn new(runner: Arc<dyn ToolRunner>) -> Self {
        Self { runner }
    }

    fn capture(&self, program: &str, flag: &str, path: &Path) -> Option<String> {
        let inv = Invocation::new(program)
            .arg(flag)
            .arg(path.to_string_lossy());
        match self.runner.run(&inv) {
            Ok(out) if out.success() => Some(out.stdout),
            Ok(out) => {
                debug!("{} exited with {:?}", inv.display(), out.code);
                None
            }
            Err(e) => {
                debug!("{} failed: {}", inv.display(), e);
                None
            }
        }
    }

    fn dynamic_entries(&self, path: &Path, tag: &str) -> Vec<String> {
        let Some(out) = self.capture("objdump", "-p", path) else {
            return Vec::new();
        };
        parse_objdump_entries(&out, tag)
    }
}

/// Values of `tag` lines ("  NEEDED   libc.so.6") in `objdump -p` output
pub fn parse_objdump_entries(output: &str, tag: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(t), Some(value)) if t == tag => Some(value.to_string()),
                _ => None,
            }
        })
        .collect()
}

/// Symbol names (last column) of `readelf -Ws` lines containing `marker`
pub fn parse_readelf_symbols(output: &str, marker: &str) -> Vec<String> {
    let found: BTreeSet<String> = output
        .lines()
        .filter(|line| line.contains(marker))
        .filter_map(|line| line.split_whitespace().last())
        .map(|name| name.split('@').next().unwrap_or(name).to_string())
        .collect();
    found.into_iter().collect()
}

impl Introspector for BinutilsIntrospector {
    fn soname(&self, path: &Path) -> Option<String> {
        self.dynamic_entries(path, "SONAME").into_iter().next()
    }

    fn needed(&self, path: &Path) -> Vec<String> {
        self.dynamic_entries(path, "NEEDED")
    }

    fn marker_symbols(&self, path: &Path, marker: &str) -> Vec<String> {
        self.capture("readelf", "-Ws", path)
            .map(|out| parse_readelf_symbols(&out, marker))
            .unwrap_or_default()
    }
}

/// Final path component of a library path or name
pub fn trim_libname(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// SONAME of `path`, or its file name when it has none
pub fn soname_or_filename(introspector: &dyn Introspector, path: &Path) -> String {
    introspector.soname(path).unwrap_or_else(|| {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_trim_libname() {
        assert_eq!(trim_libname("/usr/lib/x86_64-linux-gnu/libz.so.1"), "libz.so.1");
        assert_eq!(trim_libname("libz.so.1"), "libz.so.1");
    }

    #[test]
    fn test_parse_objdump_entries() {
        let out = "\nDynamic Section:\n  NEEDED               libz.so.1\n  NEEDED               libc.so.6\n  SONAME               libpng16.so.16\n  INIT                 0x0000000000003000\n";
        assert_eq!(
            parse_objdump_entries(out, "NEEDED"),
            vec!["libz.so.1".to_string(), "libc.so.6".to_string()]
        );
        assert_eq!(
            parse_objdump_entries(out, "SONAME"),
            vec!["libpng16.so.16".to_string()]
        );
    }

    #[test]
    fn test_parse_readelf_symbols() {
        let out = "\
   Num:    Value          Size Type    Bind   Vis      Ndx Name
     5: 0000000000001139    11 FUNC    GLOBAL DEFAULT   14 __loadsym_foo
     6: 0000000000001144    11 FUNC    GLOBAL DEFAULT   14 bar
     7: 0000000000001150    11 FUNC    GLOBAL DEFAULT   14 __dummy__va_printf@@V1
     8: 0000000000001139    11 FUNC    GLOBAL DEFAULT   14 __loadsym_foo
";
        assert_eq!(parse_readelf_symbols(out, "__loadsym"), vec!["__loadsym_foo"]);
        assert_eq!(
            parse_readelf_symbols(out, "__dummy__va"),
            vec!["__dummy__va_printf"]
        );
        assert!(parse_readelf_symbols(out, "__absent").is_empty());
    }

    #[test]
    fn test_goblin_non_elf_yields_nothing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("libfake.so.1");
        std::fs::write(&path, b"not an elf file at all").unwrap();

        let intro = GoblinIntrospector;
        assert_eq!(intro.soname(&path), None);
        assert!(intro.needed(&path).is_empty());
        assert!(!intro.has_marker_symbol(&path, "__loadsym"));
        assert_eq!(soname_or_filename(&intro, &path), "libfake.so.1");
    }

    #[test]
    fn test_goblin_missing_file_yields_nothing() {
        let intro = GoblinIntrospector;
        let path = Path::new("/nonexistent/libnothing.so");
        assert_eq!(intro.soname(path), None);
        assert!(intro.needed(path).is_empty());
    }

    #[test]
    fn test_goblin_reads_real_binary() {
        // /bin/sh exists on every Debian host; it is dynamically linked against libc
        let path = Path::new("/bin/sh");
        if !path.exists() {
            return;
        }
        let needed = GoblinIntrospector.needed(path);
        if !needed.is_empty() {
            assert!(needed.iter().any(|n| n.starts_with("libc.so")));
        }
    }
}

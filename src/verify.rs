// src/verify.rs

//! Erasure and vararg classification of built libraries

use crate::elf::Introspector;
use crate::extract::is_symlink;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

/// Libraries split by presence of the erasure marker
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Classification {
    pub erased: Vec<PathBuf>,
    pub unerased: Vec<PathBuf>,
}

pub struct Verifier<'a> {
    introspector: &'a dyn Introspector,
    erasure_marker: &'a str,
    vararg_marker: &'a str,
}

impl<'a> Verifier<'a> {
    pub fn new(
        introspector: &'a dyn Introspector,
        erasure_marker: &'a str,
        vararg_marker: &'a str,
    ) -> Self {
        Self {
            introspector,
            erasure_marker,
            vararg_marker,
        }
    }

    pub fn is_erased(&self, path: &Path) -> bool {
        self.introspector.has_marker_symbol(path, self.erasure_marker)
    }

    /// Split non-symlink libraries into erased and unerased, input order kept
    pub fn classify(&self, libs: &[PathBuf]) -> Classification {
        let flags: Vec<(PathBuf, bool)> = libs
            .par_iter()
            .filter(|l| !is_symlink(l))
            .map(|l| (l.clone(), self.is_erased(l)))
            .collect();

        let mut out = Classification::default();
        for (lib, erased) in flags {
            if erased {
                out.erased.push(lib);
            } else {
                out.unerased.push(lib);
            }
        }
        out
    }

    /// Libraries carrying the vararg marker
    pub fn detect_vararg(&self, libs: &[PathBuf]) -> Vec<PathBuf> {
        libs.par_iter()
            .filter(|l| self.introspector.has_marker_symbol(l, self.vararg_marker))
            .cloned()
            .collect()
    }

    /// Vararg marker symbols defined by `lib`
    pub fn vararg_symbols(&self, lib: &Path) -> Vec<String> {
        self.introspector.marker_symbols(lib, self.vararg_marker)
    }
}

// src/orchestrator/vararg.rs

//! Vararg-safe replacement libraries
//!
//! Erased libraries that define vararg marker symbols cannot be used as
//! is. Their marker symbols are recorded in `symbols.txt` and the package
//! is rebuilt binary-only with dummy generation on. The replacements end up
//! in `<work>/mod-lib`, either by unpacking the rebuilt `.deb`s or by
//! copying matching library files out of the rebuilt tree.

use super::build::SourceBuild;
use super::dpkg::{build_with_dpkg, extract_deb};
use super::workspace::{Stage, copy_stage, single_subdir, stage_path};
use super::VARARG_SYMBOLS_FILE;
use crate::elf::{soname_or_filename, trim_libname};
use crate::error::Result;
use crate::extract::gather_libs;
use crate::model::VarargType;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Files under `root` whose name ends with `suffix`, sorted
fn find_by_suffix(root: &Path, suffix: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_type().is_dir())
        .filter(|e| e.file_name().to_string_lossy().ends_with(suffix))
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

/// Files under `root` named exactly `name`, sorted
fn find_by_name(root: &Path, name: &str) -> Vec<PathBuf> {
    let mut found: Vec<PathBuf> = WalkDir::new(root)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy() == name)
        .map(|e| e.into_path())
        .collect();
    found.sort();
    found
}

/// Whether `deb` was built for binary package `src` and not a sibling
/// (`libssl1.1_...` but not `libssl1.1-dev_...`)
pub fn is_proper_deb(src: &str, deb: &Path) -> bool {
    deb.file_name()
        .map(|n| n.to_string_lossy().contains(&format!("{}_", src)))
        .unwrap_or(false)
}

impl<'a> SourceBuild<'a> {
    /// Produce replacements for `vararg_libs`; returns how, and whether anything failed
    pub(super) fn vararg(
        &self,
        vararg_libs: &[PathBuf],
        env: &BTreeMap<String, String>,
    ) -> Result<(VarargType, bool)> {
        self.write_vararg_symbols(vararg_libs)?;
        let varargpath = self.build_vararg(env)?;

        let mod_home = self.ctx.mod_home();
        fs::create_dir_all(&mod_home)?;

        let debs = find_by_suffix(&stage_path(self.ctx.work(), self.src, Stage::Vararg), ".deb");
        if !debs.is_empty() {
            Ok((VarargType::Dpkg, self.dpkg_install(&debs, &mod_home)))
        } else {
            Ok((
                VarargType::Manual,
                self.manual_install(vararg_libs, &varargpath, &mod_home)?,
            ))
        }
    }

    /// Append `"<symbol> <soname>"` for every vararg marker symbol
    fn write_vararg_symbols(&self, libs: &[PathBuf]) -> Result<()> {
        let verifier = self.ctx.verifier();
        let mut lines = String::new();
        for lib in libs {
            let symbols = verifier.vararg_symbols(lib);
            if symbols.is_empty() {
                warn!(
                    "Expected vararg symbols in {} but found none",
                    lib.display()
                );
                continue;
            }
            let soname = soname_or_filename(self.ctx.introspector.as_ref(), lib);
            for symbol in symbols {
                lines.push_str(&format!("{} {}\n", symbol, soname));
            }
        }

        let path = self.ctx.work().join(VARARG_SYMBOLS_FILE);
        let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
        file.write_all(lines.as_bytes())?;
        Ok(())
    }

    /// Binary-only dummy rebuild in the vararg tree, skipped if it already has libraries
    fn build_vararg(&self, env: &BTreeMap<String, String>) -> Result<PathBuf> {
        info!("Building vararg {}", self.src);
        let home = copy_stage(
            self.ctx.work(),
            self.src,
            Stage::Vararg,
            self.ctx.config.force,
        )?;
        let srcpath = single_subdir(self.src, &home)?;

        // dpkg-gensymbols fails the build when the exported set changes
        for symbols in find_by_suffix(&srcpath, ".symbols") {
            debug!("Removing {}", symbols.display());
            fs::remove_file(&symbols)?;
        }

        if !gather_libs(&srcpath).is_empty() {
            debug!("Vararg tree of {} already built", self.src);
            return Ok(srcpath);
        }

        self.ctx.log_stage(self.src, "vararg");
        let mut vararg_env = env.clone();
        vararg_env.insert("DEB_BUILD_OPTIONS".to_string(), "nocheck notest".to_string());
        vararg_env.insert("DUMMY_LIB_GEN".to_string(), "ON".to_string());
        build_with_dpkg(self.ctx, &srcpath, &vararg_env, false, true)?;
        Ok(srcpath)
    }

    fn dpkg_install(&self, debs: &[PathBuf], mod_home: &Path) -> bool {
        let mut errored = false;
        for deb in debs.iter().filter(|d| is_proper_deb(self.src, d)) {
            match extract_deb(self.ctx, deb, mod_home) {
                Ok(()) => info!("Installed {}", deb.display()),
                Err(e) => {
                    warn!("Could not install {}: {}", deb.display(), e);
                    errored = true;
                }
            }
        }
        errored
    }

    fn manual_install(
        &self,
        vararg_libs: &[PathBuf],
        varargpath: &Path,
        mod_home: &Path,
    ) -> Result<bool> {
        debug!("Searching {} for vararg libraries", varargpath.display());
        let mut errored = false;
        for lib in vararg_libs {
            let lib_str = lib.to_string_lossy();
            let name = trim_libname(&lib_str);
            let candidates = find_by_name(varargpath, name);
            let Some(candidate) = candidates.first() else {
                warn!("Found no candidate vararg library for {}", lib.display());
                errored = true;
                continue;
            };
            if candidates.len() > 1 {
                warn!("Multiple candidate vararg libraries for {}", name);
            }

            let soname = soname_or_filename(self.ctx.introspector.as_ref(), candidate);
            fs::copy(candidate, mod_home.join(&soname))?;
            info!("Vararg {} => {}", name, soname);
        }
        Ok(errored)
    }
}

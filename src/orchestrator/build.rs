// src/orchestrator/build.rs

//! SourceBuild: the stages of one source package

use super::dpkg::{build_with_dpkg, install_build_deps};
use super::workspace::{Stage, copy_stage, relative_to_tree, single_subdir, stage_path};
use super::BuildContext;
use crate::elf::{soname_or_filename, trim_libname};
use crate::error::{Error, Result};
use crate::extract::gather_libs;
use crate::model::{BuildOutcome, BuildStatus, VarargType};
use crate::process::Invocation;
use crate::progress::BuildPhase;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const DEB_BUILD_OPTIONS: &str = "nocheck notest";

/// Compile database and unpacked tree of the original build
pub(super) struct OriginalBuild {
    pub(super) command_db: PathBuf,
    pub(super) srcpath: PathBuf,
}

/// A single source package build
pub struct SourceBuild<'a> {
    pub(super) ctx: &'a BuildContext,
    pub(super) src: &'a str,
    compiler_root: &'a Path,
    /// Furthest state reached so far
    outcome: BuildOutcome,
}

impl<'a> SourceBuild<'a> {
    pub fn new(ctx: &'a BuildContext, src: &'a str, compiler_root: &'a Path) -> Self {
        Self {
            ctx,
            src,
            compiler_root,
            outcome: BuildOutcome::NotAttempted,
        }
    }

    /// Run every stage and report where the package ended up
    pub fn run(mut self) -> BuildStatus {
        match self.cook() {
            Ok(status) => status,
            Err(e) => {
                warn!("{}", e);
                BuildStatus::new(self.src, self.outcome)
            }
        }
    }

    fn cook(&mut self) -> Result<BuildStatus> {
        self.outcome = BuildOutcome::OriginalBuildFailed;
        let original = self.original()?;

        let env = self.instrumented_env();
        self.outcome = BuildOutcome::DummyBuildFailed;
        let mut libs = self.dummy(&original, &env).unwrap_or_else(|e| {
            warn!("Dummy build of {} failed: {}", self.src, e);
            None
        });
        if libs.is_some() {
            self.outcome = BuildOutcome::DummyBuildSucceeded;
        }

        if libs.is_none() && has_build_system(&original.srcpath) {
            self.outcome = BuildOutcome::MakeFallbackFailed;
            libs = self.make_fallback(&original, &env)?;
            if libs.is_some() {
                self.outcome = BuildOutcome::MakeFallbackSucceeded;
            }
        }
        if libs.is_none() {
            return Ok(BuildStatus::new(self.src, self.outcome));
        }

        self.ctx.progress.set_phase(self.src, BuildPhase::Scraping);
        let scraped = scrape_source(self.ctx, self.src)?;

        let vararg_libs = self.ctx.verifier().detect_vararg(&scraped);
        let status = BuildStatus::new(self.src, self.outcome);
        if vararg_libs.is_empty() {
            return Ok(status);
        }

        self.ctx.progress.set_phase(self.src, BuildPhase::Vararg);
        let (vararg_type, errored) = match self.vararg(&vararg_libs, &env) {
            Ok(result) => result,
            Err(e) => {
                warn!("Vararg build of {} failed: {}", self.src, e);
                (VarargType::None, true)
            }
        };
        Ok(status.with_vararg(vararg_type, errored))
    }

    /// Build the unmodified package once to obtain its compile command database
    pub(super) fn original(&self) -> Result<OriginalBuild> {
        let config = &self.ctx.config;
        self.ctx.progress.set_phase(self.src, BuildPhase::BuildingOriginal);
        info!("Building original {}", self.src);

        let home = copy_stage(self.ctx.work(), self.src, Stage::Original, config.force)?;
        let srcpath = single_subdir(self.src, &home)?;

        if !install_build_deps(self.ctx, self.src) {
            warn!("Issue installing build dependencies for {}", self.src);
        }

        let saved = config.saved_compile_db(self.src);
        let reuse = saved.exists();
        if reuse && !config.force {
            info!("Reusing saved compilation db for {}", self.src);
        } else {
            self.ctx.log_stage(self.src, "original");
            let env = BTreeMap::from([(
                "DEB_BUILD_OPTIONS".to_string(),
                DEB_BUILD_OPTIONS.to_string(),
            )]);
            build_with_dpkg(self.ctx, &srcpath, &env, false, false)?;

            let produced = srcpath.join("compile_commands.json");
            if !produced.exists() {
                return Err(Error::build(
                    self.src,
                    "failed to generate compile_commands.json",
                ));
            }
            if let Some(parent) = saved.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&produced, &saved)?;
        }

        Ok(OriginalBuild {
            command_db: std::path::absolute(&saved)?,
            srcpath,
        })
    }

    /// CC and CXX pointing at the instrumented compiler
    pub(super) fn instrumented_env(&self) -> BTreeMap<String, String> {
        let bin = self.compiler_root.join("build").join("bin");
        BTreeMap::from([
            ("CC".to_string(), bin.join("clang").to_string_lossy().into_owned()),
            ("CXX".to_string(), bin.join("clang++").to_string_lossy().into_owned()),
        ])
    }

    /// Instrumented dpkg build; `None` when no erased library came out
    fn dummy(
        &self,
        original: &OriginalBuild,
        env: &BTreeMap<String, String>,
    ) -> Result<Option<Vec<PathBuf>>> {
        let config = &self.ctx.config;
        if config.is_make_only(self.src) {
            debug!("{} is built with make only", self.src);
            return Ok(None);
        }
        self.ctx.progress.set_phase(self.src, BuildPhase::BuildingDummy);
        info!("Building dummy {}", self.src);

        let home = copy_stage(self.ctx.work(), self.src, Stage::Dpkg, false)?;
        let srcpath = single_subdir(self.src, &home)?;
        let success = srcpath.join(&config.success_marker);

        if success.exists() {
            warn!("Reusing previous dummy build of {}", self.src);
        } else {
            self.ctx.log_stage(self.src, "dummy");
            let mut dummy_env = env.clone();
            dummy_env.insert(
                "COMPILE_COMMAND_DB".to_string(),
                original.command_db.to_string_lossy().into_owned(),
            );
            dummy_env.insert("DUMMY_LIB_GEN".to_string(), "ON".to_string());
            dummy_env.insert("DEB_LDFLAGS_APPEND".to_string(), config.link_flags.clone());
            dummy_env.insert("DEB_BUILD_OPTIONS".to_string(), DEB_BUILD_OPTIONS.to_string());
            build_with_dpkg(self.ctx, &srcpath, &dummy_env, true, false)?;
        }

        let dummy_libs = gather_libs(&srcpath);
        self.compare_libs(&original.srcpath, &srcpath, &dummy_libs);
        self.finish_stage(&srcpath, &dummy_libs)
    }

    /// Instrumented configure and make build
    fn make_fallback(
        &self,
        original: &OriginalBuild,
        env: &BTreeMap<String, String>,
    ) -> Result<Option<Vec<PathBuf>>> {
        let config = &self.ctx.config;
        self.ctx.progress.set_phase(self.src, BuildPhase::MakeFallback);

        let home = copy_stage(self.ctx.work(), self.src, Stage::Make, false)?;
        let srcpath = single_subdir(self.src, &home)?;
        let success = srcpath.join(&config.success_marker);

        if success.exists() {
            warn!("Reusing previous make build of {}", self.src);
        } else {
            info!("Trying to build {} with configure/make", self.src);
            self.ctx.log_stage(self.src, "make");

            let mut configure_env = env.clone();
            configure_env.insert("CFLAGS".to_string(), config.link_flags.clone());
            configure_env.insert("LDFLAGS".to_string(), config.link_flags.clone());

            let configure = self
                .ctx
                .tool("./configure")
                .cwd(&srcpath)
                .envs(&configure_env);
            if srcpath.join("configure").exists() {
                let configure = configure.args(config.configure_options_for(self.src));
                self.run_logged(&configure)?;
            } else if srcpath.join("autogen.sh").exists() {
                let autogen = self
                    .ctx
                    .tool("./autogen.sh")
                    .cwd(&srcpath)
                    .envs(&configure_env);
                self.run_logged(&autogen)?;
                self.run_logged(&configure)?;
            }

            if !srcpath.join("Makefile").exists() {
                warn!("Makefile not found for {}", self.src);
                return Ok(None);
            }

            let mut compile_env = env.clone();
            compile_env.insert("DUMMY_LIB_GEN".to_string(), "ON".to_string());
            compile_env.insert(
                "COMPILE_COMMAND_DB".to_string(),
                original.command_db.to_string_lossy().into_owned(),
            );
            let make = self
                .ctx
                .tool("make")
                .arg(format!("-j{}", config.jobs))
                .cwd(&srcpath)
                .envs(&compile_env);
            self.run_logged(&make)?;
        }

        let libs = gather_libs(&srcpath);
        self.finish_stage(&srcpath, &libs)
    }

    fn run_logged(&self, inv: &Invocation) -> Result<()> {
        let out = self.ctx.runner.run(inv)?;
        if !out.success() {
            warn!("{} failed for {}", inv.display(), self.src);
        }
        Ok(())
    }

    /// Keep the erased libraries of a stage, marking the tree on success
    fn finish_stage(&self, srcpath: &Path, libs: &[PathBuf]) -> Result<Option<Vec<PathBuf>>> {
        let erased = self.ctx.verifier().classify(libs).erased;
        if erased.is_empty() {
            warn!("Failed to erase libraries of {}", self.src);
            return Ok(None);
        }
        fs::write(srcpath.join(&self.ctx.config.success_marker), "\n")?;
        Ok(Some(erased))
    }

    /// Warn when the dummy build produced a different set of libraries
    fn compare_libs(&self, origpath: &Path, dummypath: &Path, dummy_libs: &[PathBuf]) {
        if !self.ctx.config.verbose {
            return;
        }
        let reference = gather_libs(origpath);
        let rset: BTreeSet<PathBuf> = relative_to_tree(origpath, &reference).into_iter().collect();
        let dset: BTreeSet<PathBuf> = relative_to_tree(dummypath, dummy_libs).into_iter().collect();

        if rset.difference(&dset).next().is_some() {
            warn!("Original and dummy libraries of {} differ", self.src);
            for lib in &reference {
                debug!("  reference: {}", lib.display());
            }
            for lib in dummy_libs {
                debug!("  dummy: {}", lib.display());
            }
        }
    }
}

fn has_build_system(srcpath: &Path) -> bool {
    ["configure", "autogen.sh", "Makefile"]
        .iter()
        .any(|f| srcpath.join(f).exists())
}

/// Copy the erased libraries of `src` into `<work>/lib/<soname>`
///
/// Looks in the dpkg tree first, then the make tree. When some paths are
/// libtool `.libs` outputs only those are kept. Returns the source paths
/// of the copied libraries.
pub fn scrape_source(ctx: &BuildContext, src: &str) -> Result<Vec<PathBuf>> {
    let work = ctx.work();
    let verifier = ctx.verifier();
    let erased_in = |stage: Stage| -> Result<Vec<PathBuf>> {
        let home = stage_path(work, src, stage);
        if !home.exists() {
            return Ok(Vec::new());
        }
        let srcpath = single_subdir(src, &home)?;
        Ok(verifier.classify(&gather_libs(&srcpath)).erased)
    };

    let mut libs = erased_in(Stage::Dpkg)?;
    if libs.is_empty() {
        libs = erased_in(Stage::Make)?;
    }
    if libs.is_empty() {
        warn!("No libraries built for {}", src);
        return Ok(libs);
    }

    let libtool: Vec<PathBuf> = libs
        .iter()
        .filter(|l| l.to_string_lossy().contains(".lib"))
        .cloned()
        .collect();
    if !libtool.is_empty() {
        libs = libtool;
    }

    let lib_home = ctx.lib_home();
    fs::create_dir_all(&lib_home)?;
    for lib in &libs {
        let soname = soname_or_filename(ctx.introspector.as_ref(), lib);
        fs::copy(lib, lib_home.join(&soname))?;
        info!(
            "Built {} => {}",
            trim_libname(&lib.to_string_lossy()),
            soname
        );
    }
    Ok(libs)
}

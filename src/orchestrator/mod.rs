// src/orchestrator/mod.rs

//! Source Build Orchestrator
//!
//! Drives every non-excluded source package of a dependency list through
//! the build state machine:
//! - fetch the source package
//! - build it once unmodified to capture a compile command database
//! - rebuild it with the instrumented compiler (dpkg, then configure/make)
//! - scrape the erased libraries into `<work>/lib`
//! - produce vararg-safe replacements into `<work>/mod-lib`
//!
//! One status row is appended per package. A failure anywhere in one
//! package's pipeline becomes that package's status; it never stops the
//! run.

mod build;
pub mod dpkg;
pub mod status;
mod vararg;
pub mod workspace;

pub use build::{SourceBuild, scrape_source};
pub use status::{StatusFile, StatusRecord, read_status};
pub use workspace::Stage;

use crate::config::Config;
use crate::elf::Introspector;
use crate::error::{Error, Result};
use crate::exclude::ExclusionList;
use crate::model::{BuildOutcome, BuildStatus};
use crate::process::{Invocation, ToolRunner};
use crate::progress::{BuildPhase, ProgressTracker, SilentProgress};
use crate::verify::Verifier;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Scraped erased libraries, named by SONAME
pub const LIB_DIR: &str = "lib";
/// Vararg-safe replacement libraries
pub const MOD_LIB_DIR: &str = "mod-lib";
/// Vararg symbol to SONAME mapping for `debslim patch`
pub const VARARG_SYMBOLS_FILE: &str = "symbols.txt";

/// Everything a build stage needs, constructed once per run
pub struct BuildContext {
    pub config: Config,
    pub runner: Arc<dyn ToolRunner>,
    pub introspector: Arc<dyn Introspector>,
    pub progress: Arc<dyn ProgressTracker>,
}

impl BuildContext {
    pub fn new(
        config: Config,
        runner: Arc<dyn ToolRunner>,
        introspector: Arc<dyn Introspector>,
    ) -> Self {
        Self {
            config,
            runner,
            introspector,
            progress: Arc::new(SilentProgress::new()),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressTracker>) -> Self {
        self.progress = progress;
        self
    }

    pub fn work(&self) -> &Path {
        &self.config.working_dir
    }

    pub fn lib_home(&self) -> PathBuf {
        self.work().join(LIB_DIR)
    }

    pub fn mod_home(&self) -> PathBuf {
        self.work().join(MOD_LIB_DIR)
    }

    pub fn verifier(&self) -> Verifier<'_> {
        Verifier::new(
            self.introspector.as_ref(),
            &self.config.erasure_marker,
            &self.config.vararg_marker,
        )
    }

    /// A long-running tool call whose output goes to the build log
    pub(crate) fn tool(&self, program: &str) -> Invocation {
        Invocation::new(program)
            .timeout(self.config.build_timeout())
            .log_to(self.config.build_log_path())
    }

    /// Write a timestamped stage header into the build log
    pub(crate) fn log_stage(&self, src: &str, stage: &str) {
        let path = self.config.build_log_path();
        let header = format!(
            "\n==== {} {}: {} ====\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            src,
            stage
        );
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .and_then(|mut f| f.write_all(header.as_bytes()));
        if let Err(e) = written {
            warn!("Failed to write build log {}: {}", path.display(), e);
        }
    }
}

/// Runs the build pipeline over a dependency list
pub struct Orchestrator {
    ctx: BuildContext,
    excludes: ExclusionList,
}

impl Orchestrator {
    pub fn new(ctx: BuildContext) -> Self {
        let excludes = ctx.config.source_excludes();
        Self { ctx, excludes }
    }

    pub fn context(&self) -> &BuildContext {
        &self.ctx
    }

    /// Dependencies the build pipeline will attempt, in list order
    pub fn candidates<'d>(&self, deps: &'d [String]) -> Vec<&'d str> {
        deps.iter()
            .map(String::as_str)
            .filter(|d| !self.excludes.excludes(d))
            .collect()
    }

    fn prepare_dirs(&self) -> Result<()> {
        for dir in [
            self.ctx.work().to_path_buf(),
            self.ctx.lib_home(),
            self.ctx.mod_home(),
        ] {
            fs::create_dir_all(&dir).map_err(|e| {
                Error::InitError(format!("Failed to create {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }

    /// Build every non-excluded dependency, appending to `<work>/<list_name>.stat`
    ///
    /// Only setup problems are errors; per-package failures are recorded
    /// as status rows.
    pub fn build_all(&self, deps: &[String], list_name: &str) -> Result<Vec<BuildStatus>> {
        let compiler_root = self.ctx.config.resolve_compiler_root()?;
        self.prepare_dirs()?;

        let symbols = self.ctx.work().join(VARARG_SYMBOLS_FILE);
        if symbols.exists() {
            fs::remove_file(&symbols)?;
        }

        let status_file = StatusFile::new(self.ctx.work(), list_name);
        let candidates = self.candidates(deps);
        info!(
            "Building {} of {} dependencies from {}",
            candidates.len(),
            deps.len(),
            list_name
        );

        let mut statuses = Vec::with_capacity(candidates.len());
        for src in candidates {
            let status = self.build_package(src, &compiler_root);
            info!("{}: {}", src, status.outcome);
            if let Err(e) = status_file.append(&status) {
                error!("Failed to record status of {}: {}", src, e);
            }
            self.ctx.progress.increment(1);
            statuses.push(status);
        }

        let built = statuses.iter().filter(|s| s.succeeded()).count();
        self.ctx
            .progress
            .finish_with_message(&format!("{} of {} packages built", built, statuses.len()));
        Ok(statuses)
    }

    /// Fetch and build one source package; never fails
    pub fn build_package(&self, src: &str, compiler_root: &Path) -> BuildStatus {
        self.ctx.progress.set_phase(src, BuildPhase::Fetching);
        if let Err(e) = dpkg::fetch_source(&self.ctx, src) {
            warn!("Could not fetch source of {}: {}", src, e);
            self.ctx
                .progress
                .set_phase(src, BuildPhase::Failed("fetch".to_string()));
            return BuildStatus::new(src, BuildOutcome::NotAttempted);
        }

        let status = SourceBuild::new(&self.ctx, src, compiler_root).run();
        let phase = if status.succeeded() {
            BuildPhase::Done
        } else {
            BuildPhase::Failed(status.outcome.to_string())
        };
        self.ctx.progress.set_phase(src, phase);
        status
    }

    /// Re-run the scrape step for every non-excluded dependency
    ///
    /// Returns the number of libraries copied into `<work>/lib`.
    pub fn scrape_all(&self, deps: &[String]) -> Result<usize> {
        self.prepare_dirs()?;
        let mut copied = 0;
        for src in self.candidates(deps) {
            self.ctx.progress.set_phase(src, BuildPhase::Scraping);
            match scrape_source(&self.ctx, src) {
                Ok(libs) => copied += libs.len(),
                Err(e) => warn!("Scrape of {} failed: {}", src, e),
            }
            self.ctx.progress.increment(1);
        }
        self.ctx
            .progress
            .finish_with_message(&format!("{} libraries scraped", copied));
        Ok(copied)
    }
}

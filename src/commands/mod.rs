// src/commands/mod.rs

//! Command handlers for the debslim CLI

mod build;
mod check;
mod loc;
pub mod progress;
mod runtime;
mod symbols;
mod tools;

pub use build::{cmd_build, cmd_scrape};
pub use check::cmd_check;
pub use loc::cmd_loc;
pub use runtime::{cmd_patch, cmd_runtime};
pub use symbols::cmd_symbols;
pub use tools::{cmd_completions, cmd_fold, cmd_install, cmd_preflight, cmd_restore};

use crate::cli::GlobalArgs;
use anyhow::{Context, Result};
use debslim::config::{Config, IntrospectorKind, read_dependency_list};
use debslim::{BinutilsIntrospector, GoblinIntrospector, Introspector, SystemRunner, ToolRunner};
use std::path::Path;
use std::sync::Arc;

/// Configuration file, then command-line overrides
pub fn load_config(global: &GlobalArgs) -> Result<Config> {
    let mut config = Config::discover(global.config.as_deref())
        .context("Failed to load configuration")?;
    if let Some(dir) = &global.dir {
        config = config.with_working_dir(dir);
    }
    if global.force {
        config = config.with_force(true);
    }
    if global.verbose {
        config = config.with_verbose(true);
    }
    Ok(config)
}

/// Runner for external tools, bounded by the configured tool timeout
pub(crate) fn system_runner(config: &Config) -> Arc<dyn ToolRunner> {
    Arc::new(SystemRunner::new(config.tool_timeout()))
}

pub(crate) fn introspector(config: &Config, runner: Arc<dyn ToolRunner>) -> Arc<dyn Introspector> {
    match config.introspector {
        IntrospectorKind::Goblin => Arc::new(GoblinIntrospector),
        IntrospectorKind::Binutils => Arc::new(BinutilsIntrospector::new(runner)),
    }
}

pub(crate) fn dependency_list(path: &Path) -> Result<Vec<String>> {
    read_dependency_list(path)
        .with_context(|| format!("Failed to read dependency list: {}", path.display()))
}

/// Create the working directory if needed
pub(crate) fn ensure_working_dir(config: &Config) -> Result<()> {
    std::fs::create_dir_all(&config.working_dir).with_context(|| {
        format!(
            "Failed to create working directory: {}",
            config.working_dir.display()
        )
    })
}

// src/commands/check.rs

//! Check command - reconcile a build run against a symbol run

use super::{dependency_list, introspector, system_runner};
use anyhow::{Context, Result};
use debslim::config::{Config, list_name};
use debslim::orchestrator::{LIB_DIR, read_status};
use debslim::report::Reconciler;
use debslim::repository::{PACKAGES_FILE, read_package_libraries};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::warn;

pub fn cmd_check(config: &Config, dep_list: &Path, against: &Path) -> Result<()> {
    let deps = dependency_list(dep_list)?;

    let packages_path = against.join(PACKAGES_FILE);
    let packages = read_package_libraries(&packages_path)
        .with_context(|| format!("Failed to read {}", packages_path.display()))?;

    let status_path = config
        .working_dir
        .join(format!("{}.stat", list_name(dep_list)));
    let status = if status_path.exists() {
        read_status(&status_path)
            .with_context(|| format!("Failed to read build status {}", status_path.display()))?
    } else {
        warn!("No build status at {}", status_path.display());
        BTreeMap::new()
    };

    let runner = system_runner(config);
    let introspector = introspector(config, runner);
    let excludes = config.source_excludes();
    let verifier = debslim::Verifier::new(
        introspector.as_ref(),
        &config.erasure_marker,
        &config.vararg_marker,
    );
    let reconciler = Reconciler::new(
        &excludes,
        verifier,
        config.working_dir.join(LIB_DIR),
        against,
    );

    let summary = reconciler.report(&deps, &packages, &status);
    println!("{}", summary);
    Ok(())
}

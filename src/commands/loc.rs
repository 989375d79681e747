// src/commands/loc.rs

//! Loc command - lines-of-code report for an application and its dependencies

use super::{dependency_list, system_runner};
use anyhow::{Context, Result, bail};
use debslim::config::Config;
use debslim::loc;
use std::path::{Path, PathBuf};

pub fn cmd_loc(
    config: &Config,
    application: &str,
    base_dir: &Path,
    dep_list: Option<&Path>,
    out_file: Option<&Path>,
) -> Result<()> {
    let dep_list = dep_list
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("{}.dep", application)));
    let out_file = out_file
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(format!("loc-{}.json", application)));

    if !base_dir.is_dir() {
        bail!("Base directory does not exist: {}", base_dir.display());
    }
    let deps = dependency_list(&dep_list)?;

    let runner = system_runner(config);
    let report = loc::calculate(
        runner.as_ref(),
        application,
        &deps,
        base_dir,
        config.tool_timeout(),
    )
    .with_context(|| format!("Failed to count lines of code for {}", application))?;
    report
        .write(&out_file)
        .with_context(|| format!("Failed to write {}", out_file.display()))?;

    println!(
        "{}: {} lines of code in {} source packages, written to {}",
        application,
        report.lines_of_code,
        report.source_packages.len(),
        out_file.display()
    );
    Ok(())
}

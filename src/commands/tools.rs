// src/commands/tools.rs

//! Helper commands: install, restore, fold, preflight, completions

use super::dependency_list;
use crate::cli::Cli;
use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;
use debslim::config::Config;
use debslim::process::tool_available;
use debslim::repository::read_package_libraries;
use debslim::{install, trace};
use std::path::Path;

/// External tools the pipelines call, with what needs them
const TOOLS: &[(&str, &str)] = &[
    ("apt-get", "fetching packages and sources"),
    ("dpkg", "unpacking vararg packages"),
    ("dpkg-buildpackage", "source builds"),
    ("dpkg-gensymbols", "symbol generation"),
    ("fakeroot", "source builds"),
    ("make", "configure/make fallback"),
    ("objdump", "binutils introspection"),
    ("readelf", "binutils introspection"),
];

pub fn cmd_install(config: &Config, dep_list: &Path, packages: &Path) -> Result<()> {
    let deps = dependency_list(dep_list)?;
    let table = read_package_libraries(packages)
        .with_context(|| format!("Failed to read {}", packages.display()))?;

    let report = install::install(
        &config.working_dir,
        &deps,
        &table,
        &config.source_excludes(),
    )
    .context("Install failed")?;

    println!(
        "Installed {} libraries ({} missing, {} packages without information)",
        report.installed.len(),
        report.missing.len(),
        report.unknown_packages.len()
    );
    Ok(())
}

pub fn cmd_restore(config: &Config) -> Result<()> {
    let restored = install::restore(&config.working_dir).context("Restore failed")?;
    println!("Restored {} libraries", restored.len());
    Ok(())
}

pub fn cmd_fold(trace_dir: &Path, trace_name: &str, preserve: bool) -> Result<()> {
    let report = trace::fold(trace_dir, trace_name, preserve)
        .with_context(|| format!("Failed to fold {} traces", trace_name))?;
    println!(
        "Merged {} files ({} entries) into {}",
        report.merged_files.len(),
        report.entries.len(),
        report.output.display()
    );
    Ok(())
}

pub fn cmd_preflight(config: &Config) -> Result<()> {
    let mut missing = 0;
    for (tool, purpose) in TOOLS {
        if tool_available(tool) {
            println!("[OK]      {:<18} {}", tool, purpose);
        } else {
            missing += 1;
            println!("[MISSING] {:<18} {}", tool, purpose);
        }
    }

    match config.resolve_compiler_root() {
        Ok(root) => {
            let clang = root.join("build/bin/clang");
            let state = if clang.exists() { "[OK]     " } else { "[MISSING]" };
            println!("{} {:<18} {}", state, "clang", clang.display());
        }
        Err(e) => println!("[MISSING] {:<18} {}", "compiler root", e),
    }

    if missing > 0 {
        println!("{} tools missing", missing);
    }
    Ok(())
}

pub fn cmd_completions(shell: Shell) -> Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "debslim", &mut std::io::stdout());
    Ok(())
}

// src/commands/runtime.rs

//! Runtime and patch commands - queries and updates on a symbol repository

use super::{introspector, system_runner};
use anyhow::{Context, Result};
use debslim::closure::{ClosureResolver, append_binary_trace, read_trace, write_runtime_deps};
use debslim::config::Config;
use debslim::repository::{DiskIndex, patch_symbols, read_binaries};
use std::collections::HashMap;
use std::path::Path;
use tracing::warn;

/// Write the runtime library closure of `binary` to `outfile`
pub fn cmd_runtime(
    config: &Config,
    binary: &Path,
    trace: Option<&Path>,
    outfile: &Path,
    binary_trace: &Path,
) -> Result<()> {
    let work = config.working_dir.as_path();
    let binaries: HashMap<String, String> = match read_binaries(work) {
        Ok(map) => map,
        Err(e) => {
            warn!("{}; no binaries known", e);
            HashMap::new()
        }
    };

    let trace_entries = match trace {
        Some(path) => read_trace(path)
            .with_context(|| format!("Failed to read trace: {}", path.display()))?,
        None => Vec::new(),
    };

    let runner = system_runner(config);
    let introspector = introspector(config, runner);
    let index = DiskIndex::new(work);
    let excludes = config.ldd_excludes();
    let resolver = ClosureResolver::new(&index, introspector.as_ref(), &excludes, &binaries);

    println!("{}", binary.display());
    let root = resolver.root_needed(binary);
    let closure = resolver.resolve(&root, &trace_entries);
    write_runtime_deps(outfile, &closure)
        .with_context(|| format!("Failed to write {}", outfile.display()))?;

    if trace.is_some() {
        append_binary_trace(binary_trace, &trace_entries, &binaries)
            .with_context(|| format!("Failed to write {}", binary_trace.display()))?;
    }

    println!(
        "{} runtime libraries written to {}",
        closure.libraries.len(),
        outfile.display()
    );
    if !closure.missing.is_empty() {
        println!(
            "{} libraries not in symbol repository: {}",
            closure.missing.len(),
            closure.missing.iter().cloned().collect::<Vec<_>>().join(", ")
        );
    }
    Ok(())
}

/// Append vararg symbols from a build run onto the repository's symbol files
pub fn cmd_patch(config: &Config, symbols: &Path) -> Result<()> {
    let report = patch_symbols(&config.working_dir, symbols)
        .with_context(|| format!("Failed to patch symbols from {}", symbols.display()))?;
    println!(
        "Patched {} libraries, skipped {}",
        report.patched.len(),
        report.skipped.len()
    );
    Ok(())
}

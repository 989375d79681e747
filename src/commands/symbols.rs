// src/commands/symbols.rs

//! Symbols command - build the symbol repository for a dependency list

use super::progress::tracker;
use super::{dependency_list, ensure_working_dir, introspector, system_runner};
use anyhow::{Context, Result};
use debslim::config::Config;
use debslim::extract::{Extraction, PackageExtractor, fetch_binary_package};
use debslim::repository::SymbolRepository;
use rayon::prelude::*;
use std::path::Path;
use tracing::info;

/// Fetch, extract and index every non-excluded dependency
pub fn cmd_symbols(config: &Config, dep_list: &Path) -> Result<()> {
    let deps = dependency_list(dep_list)?;
    ensure_working_dir(config)?;

    let work = config.working_dir.as_path();
    let runner = system_runner(config);
    let introspector = introspector(config, runner.clone());
    let excludes = config.symbol_excludes();
    let ldd_excludes = config.ldd_excludes();

    // downloads share the working directory, so they run one at a time
    let mut debs = Vec::new();
    for dep in deps.iter().filter(|d| !excludes.excludes(d)) {
        info!("Fetching {}", dep);
        if let Some(deb) = fetch_binary_package(runner.as_ref(), work, dep, config.tool_timeout()) {
            debs.push((dep.clone(), deb));
        }
    }
    println!("Fetched {} of {} dependencies", debs.len(), deps.len());

    let progress = tracker(debs.len() as u64, "Extracting");
    let extractor = PackageExtractor::new(
        runner.as_ref(),
        introspector.as_ref(),
        &ldd_excludes,
        config.tool_timeout(),
    );
    let extractions: Vec<Extraction> = debs
        .par_iter()
        .map(|(dep, deb)| {
            progress.set_message(&format!("Extracting {}...", dep));
            let extraction = extractor.extract(dep, deb, &work.join(dep));
            progress.increment(1);
            extraction
        })
        .collect();
    progress.finish_with_message("extracted");

    let mut repo = SymbolRepository::new();
    for extraction in extractions {
        repo.add_extraction(extraction);
    }
    repo.load_symbols(work);
    repo.save(work)
        .with_context(|| format!("Failed to save symbol repository to {}", work.display()))?;

    let without_symbols: Vec<&str> = repo
        .packages()
        .iter()
        .filter(|p| !p.has_symbols)
        .map(|p| p.name.as_str())
        .collect();
    println!(
        "Symbol repository: {} libraries from {} packages",
        repo.libraries().count(),
        repo.packages().len()
    );
    if !without_symbols.is_empty() {
        println!("Packages without symbols: {}", without_symbols.join(", "));
    }
    Ok(())
}

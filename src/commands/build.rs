// src/commands/build.rs

//! Build and scrape commands - rebuild source packages with erased libraries

use super::progress::tracker;
use super::{dependency_list, ensure_working_dir, introspector, system_runner};
use anyhow::{Context, Result};
use debslim::config::{Config, list_name};
use debslim::orchestrator::{BuildContext, Orchestrator};
use std::path::Path;

fn orchestrator(config: &Config, total: usize, operation: &str) -> Orchestrator {
    let runner = system_runner(config);
    let introspector = introspector(config, runner.clone());
    let ctx = BuildContext::new(config.clone(), runner, introspector)
        .with_progress(tracker(total as u64, operation));
    Orchestrator::new(ctx)
}

fn candidate_count(config: &Config, deps: &[String]) -> usize {
    let excludes = config.source_excludes();
    deps.iter().filter(|d| !excludes.excludes(d)).count()
}

/// Run the build pipeline over a dependency list
pub fn cmd_build(config: &Config, dep_list: &Path) -> Result<()> {
    let deps = dependency_list(dep_list)?;
    ensure_working_dir(config)?;
    config
        .resolve_compiler_root()
        .context("Instrumented compiler not configured")?;

    let name = list_name(dep_list);
    let statuses = orchestrator(config, candidate_count(config, &deps), "Building")
        .build_all(&deps, &name)
        .context("Build run failed")?;

    let succeeded = statuses.iter().filter(|s| s.succeeded()).count();
    println!(
        "Built {} of {} source packages; status in {}",
        succeeded,
        statuses.len(),
        config.working_dir.join(format!("{}.stat", name)).display()
    );
    for status in statuses.iter().filter(|s| !s.succeeded()) {
        println!("  {}: {}", status.package, status.outcome);
    }
    Ok(())
}

/// Copy the erased libraries of already built packages into `<work>/lib`
pub fn cmd_scrape(config: &Config, dep_list: &Path) -> Result<()> {
    let deps = dependency_list(dep_list)?;
    let copied = orchestrator(config, candidate_count(config, &deps), "Scraping")
        .scrape_all(&deps)
        .context("Scrape failed")?;
    println!("Scraped {} libraries", copied);
    Ok(())
}

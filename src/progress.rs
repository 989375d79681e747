// src/progress.rs

//! Progress reporting for long package runs
//!
//! The `ProgressTracker` trait is implemented by:
//! - `LogProgress`: logs through tracing
//! - `SilentProgress`: no-op for tests and scripted runs
//! - the CLI's indicatif bar (in `commands::progress`)

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::info;

/// Stage of a source package in the build pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildPhase {
    Fetching,
    BuildingOriginal,
    BuildingDummy,
    MakeFallback,
    Scraping,
    Vararg,
    Done,
    Failed(String),
}

impl BuildPhase {
    pub fn describe(&self, package: &str) -> String {
        match self {
            BuildPhase::Fetching => format!("Fetching source of {}...", package),
            BuildPhase::BuildingOriginal => format!("Building original {}...", package),
            BuildPhase::BuildingDummy => format!("Building dummy {}...", package),
            BuildPhase::MakeFallback => format!("Trying configure/make for {}...", package),
            BuildPhase::Scraping => format!("Scraping libraries of {}...", package),
            BuildPhase::Vararg => format!("Building vararg {}...", package),
            BuildPhase::Done => format!("{} [done]", package),
            BuildPhase::Failed(reason) => format!("{} [FAILED: {}]", package, reason),
        }
    }
}

/// Progress over a list of packages
pub trait ProgressTracker: Send + Sync {
    fn set_message(&self, message: &str);

    fn set_phase(&self, package: &str, phase: BuildPhase) {
        self.set_message(&phase.describe(package));
    }

    fn increment(&self, amount: u64);

    fn position(&self) -> u64;

    fn finish_with_message(&self, message: &str);
}

/// Progress tracker that reports nothing
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    finished: AtomicBool,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

impl ProgressTracker for SilentProgress {
    fn set_message(&self, _message: &str) {}

    fn increment(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }
}

/// Logging progress tracker
///
/// Every message goes to tracing at info level, with a position
/// counter prefix ("[3/40]").
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    position: AtomicU64,
    length: u64,
}

impl LogProgress {
    pub fn new(name: impl Into<String>, length: u64) -> Self {
        Self {
            name: name.into(),
            position: AtomicU64::new(0),
            length,
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_message(&self, message: &str) {
        info!(
            "{} [{}/{}]: {}",
            self.name,
            self.position.load(Ordering::Relaxed) + 1,
            self.length,
            message
        );
    }

    fn increment(&self, amount: u64) {
        self.position.fetch_add(amount, Ordering::Relaxed);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        info!("{}: {}", self.name, message);
    }
}

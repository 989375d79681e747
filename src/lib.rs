// src/lib.rs

//! debslim: library debloating for Debian-based distributions
//!
//! Given an application and the binary packages it depends on, debslim
//! works out which shared libraries the application can load, rebuilds the
//! dependencies' source packages with an instrumented compiler so their
//! libraries load symbols lazily, and reconciles what was built.
//!
//! # Pipeline
//!
//! - Symbol repository: extract the dependency packages, index their
//!   libraries, NEEDED edges, exported symbols and binaries
//!   ([`extract`], [`repository`])
//! - Runtime closure: libraries reachable from a binary plus a load trace
//!   ([`closure`], [`trace`])
//! - Source builds: original, dummy, make fallback and vararg stages per
//!   source package ([`orchestrator`], [`verify`])
//! - Reconciliation: coverage statistics over the results ([`report`])

pub mod closure;
pub mod config;
pub mod elf;
mod error;
pub mod exclude;
pub mod extract;
pub mod install;
pub mod loc;
pub mod model;
pub mod orchestrator;
pub mod process;
pub mod progress;
pub mod report;
pub mod repository;
pub mod trace;
pub mod verify;

pub use closure::{Closure, ClosureResolver};
pub use config::Config;
pub use elf::{BinutilsIntrospector, GoblinIntrospector, Introspector};
pub use error::{Error, Result};
pub use exclude::{ExclusionList, MatchPolicy};
pub use extract::{Extraction, PackageExtractor};
pub use model::{BuildInfo, BuildOutcome, BuildStatus, Library, Package, VarargType};
pub use orchestrator::{BuildContext, Orchestrator};
pub use process::{Invocation, SystemRunner, ToolOutput, ToolRunner};
pub use progress::{BuildPhase, LogProgress, ProgressTracker, SilentProgress};
pub use report::{Reconciler, Summary};
pub use repository::{DiskIndex, LibraryIndex, SymbolRepository};
pub use verify::{Classification, Verifier};

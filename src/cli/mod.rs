// src/cli/mod.rs
//! CLI definitions for debslim
//!
//! This module contains all command-line interface definitions using clap.
//! The actual command implementations are in the `commands` module.
//!
//! Pipelines, in the order they are usually run:
//! - `symbols` - Build the symbol repository for a dependency list
//! - `runtime` - Runtime closure of a binary over the repository
//! - `build` - Rebuild source packages with erased libraries
//! - `patch` - Add vararg symbols from a build run to the repository
//! - `check` - Reconcile a build run against a symbol run
//!
//! Helpers: `scrape`, `install`, `restore`, `fold`, `loc`, `preflight`,
//! `completions`.

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "debslim")]
#[command(version)]
#[command(about = "Debloat the shared libraries an application depends on", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Use DIR as working output directory [default: symbol-out]
    #[arg(short = 'd', long = "dir", global = true, value_name = "DIR")]
    pub dir: Option<PathBuf>,

    /// Force rebuild of original packages
    #[arg(short, long, global = true)]
    pub force: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file [default: $XDG_CONFIG_HOME/debslim/config.toml]
    #[arg(short, long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract dependency packages and build the symbol repository
    Symbols {
        /// Dependency list, one package per line
        dep_list: PathBuf,
    },

    /// Compute the runtime library closure of a binary
    Runtime {
        /// Binary whose dependencies are resolved
        #[arg(short, long, value_name = "BINARY")]
        bin: PathBuf,

        /// Load trace of the binary (lzload.trace)
        #[arg(short, long, value_name = "TRACE")]
        trace: Option<PathBuf>,

        /// Output file for runtime dependencies
        #[arg(short, long, default_value = "runtime.txt", value_name = "PATH")]
        outfile: PathBuf,

        /// File the traced binaries are appended to
        #[arg(long, default_value = "binary.trace", value_name = "PATH")]
        binary_trace: PathBuf,
    },

    /// Patch vararg symbols from a build run onto the symbol repository
    Patch {
        /// symbols.txt written by `debslim build`
        symbols: PathBuf,
    },

    /// Rebuild source packages with erased libraries
    Build {
        /// Dependency list, one package per line
        dep_list: PathBuf,
    },

    /// Copy erased libraries of already built packages into the lib directory
    Scrape {
        /// Dependency list, one package per line
        dep_list: PathBuf,
    },

    /// Move the dummy libraries of a dependency list into installed-lib
    Install {
        /// Dependency list, one package per line
        dep_list: PathBuf,

        /// packages.txt from `debslim symbols`
        #[arg(short, long, value_name = "PACKAGES")]
        packages: PathBuf,
    },

    /// Move every installed library back into the lib directory
    Restore,

    /// Reconcile a build run against a symbol run
    Check {
        /// Dependency list, one package per line
        dep_list: PathBuf,

        /// Working directory of the symbol run (holds packages.txt)
        #[arg(long, value_name = "DIR")]
        against: PathBuf,
    },

    /// Count C/C++ lines of code of an application and its dependencies
    Loc {
        /// Application source package
        application: String,

        /// Directory holding one fetched source directory per dependency
        #[arg(short = 'b', long, value_name = "DIR")]
        base_dir: PathBuf,

        /// Dependency list [default: <application>.dep]
        #[arg(short = 'D', long, value_name = "FILE")]
        dep_list: Option<PathBuf>,

        /// Output file [default: loc-<application>.json]
        #[arg(short, long, value_name = "FILE")]
        out_file: Option<PathBuf>,
    },

    /// Merge per-process trace files
    Fold {
        /// Directory holding the trace files
        #[arg(short = 'T', long, default_value = ".", value_name = "DIR")]
        trace_dir: PathBuf,

        /// Keep the per-process files
        #[arg(short, long)]
        preserve: bool,

        /// Trace name (lzload.trace or lztrace.trace)
        #[arg(short = 'n', long, default_value = "lzload.trace")]
        trace_name: String,
    },

    /// Report which external tools are available
    Preflight,

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

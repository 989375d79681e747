// src/config.rs

//! Run configuration
//!
//! Every recognised option lives in [`Config`]. Values come from a TOML
//! file (explicit path, else `$XDG_CONFIG_HOME/debslim/config.toml`),
//! then command-line flags override them.

use crate::error::{Error, Result};
use crate::exclude::{ExclusionList, MatchPolicy, SOURCE_EXCLUDES, SYMBOL_EXCLUDES};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Environment variable naming the instrumented compiler installation
pub const COMPILER_ROOT_ENV: &str = "KLLVM";

/// Which introspection backend to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntrospectorKind {
    /// In-process ELF parsing
    #[default]
    Goblin,
    /// objdump and readelf subprocesses
    Binutils,
}

/// Complete run configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Root of every artifact this tool writes
    pub working_dir: PathBuf,
    /// Recopy the original and vararg trees and rebuild originals even when cached
    pub force: bool,
    /// Log extra detail (library set differences, debug events)
    pub verbose: bool,
    /// Parallel jobs for make and dpkg dummy builds
    pub jobs: usize,
    /// Bound for short tool invocations, in seconds
    pub tool_timeout_secs: u64,
    /// Bound for package builds, in seconds
    pub build_timeout_secs: u64,
    /// Cache of compile_commands.json per source package, relative to the
    /// working directory unless absolute
    pub compile_db_dir: PathBuf,
    /// Instrumented LLVM installation; falls back to `$KLLVM`
    pub compiler_root: Option<PathBuf>,
    /// Appended to link flags of instrumented builds
    pub link_flags: String,
    pub erasure_marker: String,
    pub vararg_marker: String,
    /// File written into a stage tree once it produced erased libraries
    pub success_marker: String,
    /// Build log, relative to the working directory unless absolute
    pub build_log: PathBuf,
    pub introspector: IntrospectorKind,
    pub exclude_policy: MatchPolicy,
    pub symbol_excludes: Option<Vec<String>>,
    pub source_excludes: Option<Vec<String>>,
    pub ldd_excludes: Option<Vec<String>>,
    /// Extra `./configure` flags per source package
    pub configure_options: BTreeMap<String, Vec<String>>,
    /// Packages that skip the dpkg dummy build
    pub make_only: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("symbol-out"),
            force: false,
            verbose: false,
            jobs: 32,
            tool_timeout_secs: 600,
            build_timeout_secs: 4 * 60 * 60,
            compile_db_dir: PathBuf::from("compilation_db"),
            compiler_root: None,
            link_flags: "-L/usr/local/lib -llzload".to_string(),
            erasure_marker: "__loadsym".to_string(),
            vararg_marker: "__dummy__va".to_string(),
            success_marker: ".petablox_success".to_string(),
            build_log: PathBuf::from("build.log"),
            introspector: IntrospectorKind::default(),
            exclude_policy: MatchPolicy::default(),
            symbol_excludes: None,
            source_excludes: None,
            ldd_excludes: None,
            configure_options: default_configure_options(),
            make_only: vec!["libbluray2".to_string(), "libprotobuf-lite17".to_string()],
        }
    }
}

fn default_configure_options() -> BTreeMap<String, Vec<String>> {
    let table: &[(&str, &[&str])] = &[
        ("libtinfo5", &["--with-shared", "--with-termlib"]),
        ("libtinfo6", &["--with-shared", "--with-termlib"]),
        ("libncurses5", &["--with-shared"]),
        ("libncurses6", &["--with-shared"]),
        ("libncursesw5", &["--with-shared"]),
        ("libncursesw6", &["--with-shared"]),
        ("libopus0", &["--disable-maintainer-mode"]),
        (
            "libprotobuf-lite17",
            &["--disable-maintainer-mode", "--disable-dependency-tracking"],
        ),
    ];
    table
        .iter()
        .map(|(pkg, opts)| {
            (
                (*pkg).to_string(),
                opts.iter().map(|o| (*o).to_string()).collect(),
            )
        })
        .collect()
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `explicit` if given, else the per-user file when it exists, else defaults
    pub fn discover(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        if let Some(path) = default_config_path()
            && path.exists()
        {
            debug!("Using config file {}", path.display());
            return Self::load(&path);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<()> {
        if self.jobs == 0 {
            return Err(Error::ConfigError("jobs must be at least 1".to_string()));
        }
        if self.erasure_marker.is_empty() || self.vararg_marker.is_empty() {
            return Err(Error::ConfigError("marker symbols must not be empty".to_string()));
        }
        if self.success_marker.is_empty() || self.success_marker.contains('/') {
            return Err(Error::ConfigError(format!(
                "success_marker must be a plain file name, got '{}'",
                self.success_marker
            )));
        }
        Ok(())
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_compiler_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.compiler_root = Some(root.into());
        self
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.build_timeout_secs)
    }

    pub fn symbol_excludes(&self) -> ExclusionList {
        self.exclusions(self.symbol_excludes.as_ref(), SYMBOL_EXCLUDES)
    }

    pub fn source_excludes(&self) -> ExclusionList {
        self.exclusions(self.source_excludes.as_ref(), SOURCE_EXCLUDES)
    }

    /// Always-present runtime libraries (always entry-in-name)
    pub fn ldd_excludes(&self) -> ExclusionList {
        match &self.ldd_excludes {
            Some(list) => ExclusionList::new(list.iter().cloned()),
            None => ExclusionList::ldd_defaults(),
        }
    }

    fn exclusions(&self, custom: Option<&Vec<String>>, defaults: &[&str]) -> ExclusionList {
        let list = match custom {
            Some(list) => ExclusionList::new(list.iter().cloned()),
            None => ExclusionList::new(defaults.iter().copied()),
        };
        list.with_policy(self.exclude_policy)
    }

    /// Instrumented compiler root from config or `$KLLVM`
    pub fn resolve_compiler_root(&self) -> Result<PathBuf> {
        if let Some(root) = &self.compiler_root {
            return Ok(root.clone());
        }
        match std::env::var_os(COMPILER_ROOT_ENV) {
            Some(v) if !v.is_empty() => Ok(PathBuf::from(v)),
            _ => Err(Error::ConfigError(format!(
                "Set {} (or compiler_root in the config file) to the instrumented LLVM installation",
                COMPILER_ROOT_ENV
            ))),
        }
    }

    pub fn configure_options_for(&self, package: &str) -> &[String] {
        self.configure_options
            .get(package)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn is_make_only(&self, package: &str) -> bool {
        self.make_only.iter().any(|p| p == package)
    }

    /// Build log location
    pub fn build_log_path(&self) -> PathBuf {
        self.working_dir.join(&self.build_log)
    }

    /// Compile database cache for `package`
    pub fn saved_compile_db(&self, package: &str) -> PathBuf {
        self.working_dir
            .join(&self.compile_db_dir)
            .join(package)
            .join("compile_commands.json")
    }
}

/// Per-user configuration file location
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("debslim").join("config.toml"))
}

/// Read a dependency list: one name per line, `#` comments and blanks
/// ignored, duplicates collapsed in first-seen order
pub fn read_dependency_list(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        Error::InitError(format!(
            "Failed to read dependency list {}: {}",
            path.display(),
            e
        ))
    })?;

    let mut seen = HashSet::new();
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .filter(|l| seen.insert(l.to_string()))
        .map(str::to_string)
        .collect())
}

/// Name of a dependency list, used to name its status file
pub fn list_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "deps".to_string())
}

// src/model.rs

//! Core data model
//!
//! - [`Package`]: one extracted binary package and what it provides
//! - [`Library`]: a shared object keyed by SONAME, owned by the repository
//! - [`BuildOutcome`] / [`BuildStatus`]: result of one source package build
//! - [`BuildInfo`]: per-package reconciliation view, never persisted

use std::path::PathBuf;
use strum_macros::{AsRefStr, Display, EnumString, IntoStaticStr};

/// Classification of packages that provide neither libraries nor binaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, AsRefStr)]
pub enum ExtraKind {
    #[strum(serialize = "perl-module")]
    PerlModule,
    #[strum(serialize = "locale")]
    Locale,
    #[strum(serialize = "man")]
    Man,
}

/// An extracted binary package
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Package {
    pub name: String,
    /// The `.deb` this package was extracted from
    pub archive: PathBuf,
    /// SONAMEs registered from the symbol file, in first-seen order
    pub shared_libs: Vec<String>,
    /// Executable file names, in first-seen order
    pub binaries: Vec<String>,
    pub has_symbols: bool,
    pub has_locale: bool,
    pub has_perlmodules: bool,
    pub has_man: bool,
    /// Non-symlink library files found in the extracted tree
    pub raw_libs: Vec<PathBuf>,
}

impl Package {
    pub fn new(name: impl Into<String>, archive: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            archive: archive.into(),
            ..Default::default()
        }
    }

    /// Register a library; duplicates are ignored
    pub fn add_lib(&mut self, soname: &str) {
        if !self.shared_libs.iter().any(|l| l == soname) {
            self.shared_libs.push(soname.to_string());
        }
    }

    /// Register a binary; duplicates are ignored
    pub fn add_binary(&mut self, name: &str) {
        if !self.binaries.iter().any(|b| b == name) {
            self.binaries.push(name.to_string());
        }
    }

    /// Extra classification, only for packages without libraries or binaries
    pub fn extra_kind(&self) -> Option<ExtraKind> {
        if !self.shared_libs.is_empty() || !self.binaries.is_empty() {
            return None;
        }
        if self.has_perlmodules {
            Some(ExtraKind::PerlModule)
        } else if self.has_locale {
            Some(ExtraKind::Locale)
        } else if self.has_man {
            Some(ExtraKind::Man)
        } else {
            None
        }
    }
}

/// A shared library in the symbol repository
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Library {
    pub soname: String,
    /// Direct NEEDED entries with always-present libraries filtered out
    pub needed: Vec<String>,
    /// Exported symbol names, version suffixes stripped
    pub symbols: Vec<String>,
}

impl Library {
    pub fn new(soname: impl Into<String>, needed: Vec<String>) -> Self {
        Self {
            soname: soname.into(),
            needed,
            symbols: Vec::new(),
        }
    }

    pub fn add_symbol(&mut self, symbol: impl Into<String>) {
        self.symbols.push(symbol.into());
    }
}

/// Where one source package ended up in the build state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum BuildOutcome {
    NotAttempted,
    OriginalBuildFailed,
    DummyBuildSucceeded,
    DummyBuildFailed,
    MakeFallbackSucceeded,
    MakeFallbackFailed,
}

impl BuildOutcome {
    pub fn as_str(&self) -> &'static str {
        self.into()
    }

    /// Whether erased libraries were produced
    pub fn succeeded(&self) -> bool {
        matches!(
            self,
            BuildOutcome::DummyBuildSucceeded | BuildOutcome::MakeFallbackSucceeded
        )
    }
}

/// How vararg-safe replacement libraries were produced
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum VarargType {
    #[default]
    None,
    Dpkg,
    Manual,
}

/// One row of the status file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildStatus {
    pub package: String,
    pub outcome: BuildOutcome,
    pub vararg_type: VarargType,
    /// `None` when no vararg handling was attempted
    pub vararg_error: Option<bool>,
}

impl BuildStatus {
    pub fn new(package: impl Into<String>, outcome: BuildOutcome) -> Self {
        Self {
            package: package.into(),
            outcome,
            vararg_type: VarargType::None,
            vararg_error: None,
        }
    }

    pub fn with_vararg(mut self, vararg_type: VarargType, errored: bool) -> Self {
        self.vararg_type = vararg_type;
        self.vararg_error = Some(errored);
        self
    }

    pub fn succeeded(&self) -> bool {
        self.outcome.succeeded()
    }
}

/// Reconciliation view of one non-excluded dependency
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildInfo {
    pub package: String,
    pub erased_libs: Vec<String>,
    pub unerased_libs: Vec<String>,
    /// No shared libraries in the extracted package
    pub is_binary: bool,
    pub has_symbols: bool,
    pub did_erase: bool,
}

impl BuildInfo {
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            ..Default::default()
        }
    }
}

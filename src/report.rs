// src/report.rs

//! Reconciliation Reporter
//!
//! Cross-checks a dependency list against the exclusion policy, the
//! symbol pipeline's `packages.txt`, the build status file and the
//! libraries actually scraped into `<work>/lib`, and renders the
//! findings and totals as text.

use crate::exclude::ExclusionList;
use crate::extract::gather_libs;
use crate::model::BuildInfo;
use crate::orchestrator::StatusRecord;
use crate::verify::Verifier;
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

/// One tagged line of the report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Finding {
    Accidental(String),
    NoLibraries(String),
    Unerased { library: String, package: String },
    MissingSymbols(String),
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::Accidental(pkg) => {
                write!(f, "[ACCIDENTAL]: package {} was accidently excluded", pkg)
            }
            Finding::NoLibraries(pkg) => write!(f, "[NO LIBRARIES]: {} has no erased libraries", pkg),
            Finding::Unerased { library, package } => write!(
                f,
                "[UNERASED LIBRARIES]: library {} from package {} not erased",
                library, package
            ),
            Finding::MissingSymbols(pkg) => {
                write!(f, "[MISSING SYMBOLS]: package {} does not have any symbols", pkg)
            }
        }
    }
}

/// Aggregate result of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub findings: Vec<Finding>,
    pub infos: Vec<BuildInfo>,
    pub total_dependencies: usize,
    pub possible_excludes: usize,
    pub excluded: usize,
    pub accidental_excludes: usize,
    pub binary_builds: usize,
    pub library_success: usize,
    pub library_failed: usize,
    pub library_erased: usize,
    pub with_unerased: usize,
    pub missing_symbols: usize,
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for finding in &self.findings {
            writeln!(f, "{}", finding)?;
        }
        writeln!(f)?;
        writeln!(f, "Total dependencies: {}", self.total_dependencies)?;
        writeln!(f, "Non-excluded dependencies: {}", self.infos.len())?;
        writeln!(f)?;
        writeln!(f, "Total possible excludes: {}", self.possible_excludes)?;
        writeln!(f, "Excluded dependencies: {}", self.excluded)?;
        writeln!(f, "Accidental excludes: {}", self.accidental_excludes)?;
        writeln!(f)?;
        writeln!(f, "Binary builds: {}", self.binary_builds)?;
        writeln!(f, "Reported succesful library builds: {}", self.library_success)?;
        writeln!(f, "Reported failing library builds: {}", self.library_failed)?;
        writeln!(f)?;
        writeln!(f, "Library builds with erased: {}", self.library_erased)?;
        writeln!(
            f,
            "Builds with unerased libraries (non-binary): {}",
            self.with_unerased
        )?;
        write!(
            f,
            "Builds missing symbols (non-binary): {}",
            self.missing_symbols
        )
    }
}

pub struct Reconciler<'a> {
    excludes: &'a ExclusionList,
    verifier: Verifier<'a>,
    /// Scraped libraries (`<work>/lib`)
    lib_home: PathBuf,
    /// Working directory of a symbol pipeline run over the same list
    check_dir: PathBuf,
}

impl<'a> Reconciler<'a> {
    pub fn new(
        excludes: &'a ExclusionList,
        verifier: Verifier<'a>,
        lib_home: impl Into<PathBuf>,
        check_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            excludes,
            verifier,
            lib_home: lib_home.into(),
            check_dir: check_dir.into(),
        }
    }

    /// Per-package view of one non-excluded dependency
    pub fn build_info(
        &self,
        dep: &str,
        packages: &BTreeMap<String, Vec<String>>,
        status: &BTreeMap<String, StatusRecord>,
    ) -> BuildInfo {
        let mut info = BuildInfo::new(dep);
        info.is_binary = gather_libs(&self.check_dir.join(dep)).is_empty();
        if let Some(libs) = packages.get(dep) {
            info.has_symbols = true;
            for lib in libs {
                let path = self.lib_home.join(lib);
                if path.exists() && self.verifier.is_erased(&path) {
                    info.erased_libs.push(lib.clone());
                } else {
                    info.unerased_libs.push(lib.clone());
                }
            }
        }
        info.did_erase = status.get(dep).map(|r| r.build).unwrap_or(false);
        info
    }

    pub fn report(
        &self,
        deps: &[String],
        packages: &BTreeMap<String, Vec<String>>,
        status: &BTreeMap<String, StatusRecord>,
    ) -> Summary {
        let mut summary = Summary {
            total_dependencies: deps.len(),
            possible_excludes: self.excludes.len(),
            ..Default::default()
        };

        for dep in deps.iter().filter(|d| self.excludes.is_accidental(d)) {
            summary.accidental_excludes += 1;
            summary.findings.push(Finding::Accidental(dep.clone()));
        }

        for dep in deps {
            if self.excludes.excludes(dep) {
                summary.excluded += 1;
                continue;
            }
            summary.infos.push(self.build_info(dep, packages, status));
        }

        for info in &summary.infos {
            if info.is_binary {
                summary.binary_builds += 1;
                continue;
            }
            if !info.did_erase {
                summary.library_failed += 1;
                continue;
            }
            summary.library_success += 1;

            if info.erased_libs.is_empty() {
                summary.findings.push(Finding::NoLibraries(info.package.clone()));
            } else {
                summary.library_erased += 1;
            }

            if !info.unerased_libs.is_empty() {
                summary.with_unerased += 1;
                for lib in &info.unerased_libs {
                    summary.findings.push(Finding::Unerased {
                        library: lib.clone(),
                        package: info.package.clone(),
                    });
                }
            }

            if !info.has_symbols {
                summary.missing_symbols += 1;
                summary
                    .findings
                    .push(Finding::MissingSymbols(info.package.clone()));
            }
        }
        summary
    }
}

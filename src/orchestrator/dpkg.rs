// src/orchestrator/dpkg.rs

//! Debian packaging tools used by the build stages
//!
//! Every call goes through the context's `ToolRunner` with the build
//! timeout and output redirected into the build log. A non-zero exit from
//! a build is not an error here: stages judge success by the libraries
//! they find afterwards.

use super::BuildContext;
use crate::error::{Error, Result};
use crate::process::Invocation;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Fetch the source of `src` into `<work>/<src>/`; an existing directory is reused
pub fn fetch_source(ctx: &BuildContext, src: &str) -> Result<PathBuf> {
    let home = ctx.work().join(src);
    if home.exists() {
        debug!("Source of {} already fetched", src);
        return Ok(home);
    }

    info!("Fetching {}", src);
    fs::create_dir_all(&home)?;
    let inv = Invocation::new("apt-get")
        .args(["source", src])
        .cwd(&home)
        .timeout(ctx.config.tool_timeout());

    let fetched = ctx.runner.run(&inv).and_then(|out| out.check(&inv));
    if let Err(e) = fetched {
        // leave nothing behind so the next run retries the download
        let _ = fs::remove_dir_all(&home);
        return Err(e);
    }
    Ok(home)
}

/// Install the build dependencies of `src`, repairing dpkg state and retrying once
///
/// Returns whether the install eventually succeeded. Runner errors are
/// logged and count as a failed attempt.
pub fn install_build_deps(ctx: &BuildContext, src: &str) -> bool {
    let attempt = |inv: &Invocation| match ctx.runner.run(inv) {
        Ok(out) => out.success(),
        Err(e) => {
            warn!("{} failed for {}: {}", inv.display(), src, e);
            false
        }
    };

    let build_dep = ctx.tool("apt-get").args(["build-dep", "-y", src]);
    if attempt(&build_dep) {
        return true;
    }

    debug!("apt-get build-dep {} failed, running dpkg --configure -a", src);
    let repair = ctx.tool("dpkg").args(["--configure", "-a"]);
    if !attempt(&repair) {
        warn!("dpkg --configure -a failed");
    }
    attempt(&build_dep)
}

/// Clean, then build binary packages in `path`
///
/// `binary_only` builds architecture dependent packages only (`-B`).
/// Returns whether the build exited successfully.
pub fn build_with_dpkg(
    ctx: &BuildContext,
    path: &Path,
    env: &BTreeMap<String, String>,
    parallel: bool,
    binary_only: bool,
) -> Result<bool> {
    let clean = ctx
        .tool("dpkg-buildpackage")
        .args(["-rfakeroot", "-Tclean"])
        .cwd(path);
    if !ctx.runner.run(&clean)?.success() {
        debug!("dpkg-buildpackage clean failed in {}", path.display());
    }

    let mut build = ctx
        .tool("dpkg-buildpackage")
        .args(["-us", "-uc", "-d"])
        .arg(if binary_only { "-B" } else { "-b" })
        .cwd(path)
        .envs(env);
    if parallel {
        build = build.arg(format!("-j{}", ctx.config.jobs));
    }

    let out = ctx.runner.run(&build)?;
    if !out.success() {
        warn!(
            "dpkg-buildpackage exited with {} in {}",
            out.code.map_or_else(|| "a signal".to_string(), |c| c.to_string()),
            path.display()
        );
    }
    Ok(out.success())
}

/// Unpack the payload of `deb` into `dest`
pub fn extract_deb(ctx: &BuildContext, deb: &Path, dest: &Path) -> Result<()> {
    let inv = Invocation::new("dpkg")
        .arg("-x")
        .arg(deb.to_string_lossy())
        .arg(dest.to_string_lossy())
        .timeout(ctx.config.tool_timeout());
    ctx.runner.run_checked(&inv).map(|_| ()).map_err(|e| match e {
        Error::CommandFailed { reason, .. } => Error::ArchiveError(format!(
            "dpkg -x {} failed: {}",
            deb.display(),
            reason
        )),
        other => other,
    })
}

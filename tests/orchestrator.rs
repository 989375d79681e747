// tests/orchestrator.rs

//! Source build state machine driven through a scripted tool runner.

mod common;

use common::{FakeIntrospector, MockRunner, failed, fake_lib, ok, test_config};
use debslim::config::Config;
use debslim::exclude::SOURCE_EXCLUDES;
use debslim::orchestrator::{BuildContext, Orchestrator, read_status, scrape_source};
use debslim::{BuildOutcome, Error, Invocation, ToolOutput, VarargType};
use std::fs;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::Arc;

type Answer = debslim::Result<ToolOutput>;

/// What a dpkg-buildpackage call is doing
#[derive(Debug, PartialEq)]
enum DpkgBuild {
    Clean,
    Original,
    Dummy,
    Vararg,
}

fn dpkg_build(inv: &Invocation) -> DpkgBuild {
    let has = |a: &str| inv.args.iter().any(|x| x == a);
    if has("-Tclean") {
        DpkgBuild::Clean
    } else if has("-B") {
        DpkgBuild::Vararg
    } else if inv.env.get("DUMMY_LIB_GEN").map(String::as_str) == Some("ON") {
        DpkgBuild::Dummy
    } else {
        DpkgBuild::Original
    }
}

fn cwd(inv: &Invocation) -> PathBuf {
    inv.cwd.clone().unwrap()
}

/// `apt-get source` stand-in: `<home>/<src>-1.0/` with a debian dir and `extra` files
fn unpack_source(inv: &Invocation, extra: &[&str]) {
    let src = &inv.args[1];
    let dir = cwd(inv).join(format!("{}-1.0", src));
    fs::create_dir_all(dir.join("debian")).unwrap();
    fs::write(dir.join("debian/control"), format!("Source: {}\n", src)).unwrap();
    for f in extra {
        fs::write(dir.join(f), "#!/bin/sh\n").unwrap();
    }
}

fn is_source_fetch(inv: &Invocation) -> bool {
    inv.program == "apt-get" && inv.args.first().map(String::as_str) == Some("source")
}

fn orchestrator(config: &Config, runner: &Arc<MockRunner>) -> Orchestrator {
    let ctx = BuildContext::new(config.clone(), runner.clone(), Arc::new(FakeIntrospector));
    Orchestrator::new(ctx)
}

fn deps(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| n.to_string()).collect()
}

fn zlib_runner() -> Arc<MockRunner> {
    zlib_runner_with(|_| None)
}

/// zlib builds cleanly unless `intercept` answers a call first
fn zlib_runner_with(
    intercept: impl Fn(&Invocation) -> Option<Answer> + Send + Sync + 'static,
) -> Arc<MockRunner> {
    Arc::new(MockRunner::fallible(move |inv| {
        if let Some(answer) = intercept(inv) {
            return answer;
        }
        if is_source_fetch(inv) {
            unpack_source(inv, &[]);
            return Ok(ok());
        }
        if inv.program != "dpkg-buildpackage" {
            return Ok(ok());
        }
        let dir = cwd(inv);
        match dpkg_build(inv) {
            DpkgBuild::Original => {
                fs::write(dir.join("compile_commands.json"), "[]").unwrap();
                fake_lib(&dir.join("build/libz.so.1.2.11"), "libz.so.1", &[], &["deflate"]);
            }
            DpkgBuild::Dummy => {
                let lib = dir.join("build/libz.so.1.2.11");
                fake_lib(&lib, "libz.so.1", &[], &["deflate", "deflate__loadsym"]);
                symlink("libz.so.1.2.11", dir.join("build/libz.so.1")).unwrap();
            }
            _ => {}
        }
        Ok(ok())
    }))
}

#[test]
fn test_dummy_build_then_cached_rerun() {
    let (temp, config) = test_config();
    let work = config.working_dir.clone();
    let list = deps(&[SOURCE_EXCLUDES[0], "zlib"]);

    let runner = zlib_runner();
    let statuses = orchestrator(&config, &runner).build_all(&list, "vlc").unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].package, "zlib");
    assert_eq!(statuses[0].outcome, BuildOutcome::DummyBuildSucceeded);
    assert_eq!(statuses[0].vararg_error, None);

    assert!(work.join("lib/libz.so.1").exists());
    assert!(work.join("zlib.dpkg/zlib-1.0/.petablox_success").exists());
    let saved_db = temp.path().join("compilation_db/zlib/compile_commands.json");
    assert!(saved_db.exists());

    let calls = runner.calls();
    let original = calls
        .iter()
        .find(|c| c.program == "dpkg-buildpackage" && dpkg_build(c) == DpkgBuild::Original)
        .unwrap();
    assert_eq!(cwd(original), work.join("zlib.original/zlib-1.0"));
    assert_eq!(original.env["DEB_BUILD_OPTIONS"], "nocheck notest");
    assert!(!original.args.iter().any(|a| a.starts_with("-j")));

    let dummy = calls
        .iter()
        .find(|c| c.program == "dpkg-buildpackage" && dpkg_build(c) == DpkgBuild::Dummy)
        .unwrap();
    assert_eq!(cwd(dummy), work.join("zlib.dpkg/zlib-1.0"));
    assert_eq!(dummy.env["CC"], "/opt/kllvm/build/bin/clang");
    assert_eq!(dummy.env["CXX"], "/opt/kllvm/build/bin/clang++");
    assert_eq!(dummy.env["COMPILE_COMMAND_DB"], saved_db.to_string_lossy());
    assert_eq!(dummy.env["DEB_LDFLAGS_APPEND"], config.link_flags);
    assert!(dummy.args.iter().any(|a| a == "-j4"));

    // stage trees never see each other's products
    assert!(!work.join("zlib.dpkg/zlib-1.0/compile_commands.json").exists());
    assert!(!work.join("zlib/zlib-1.0/build").exists());

    // second run: cached compile db and success marker, no builds at all
    let rerun = zlib_runner();
    let statuses = orchestrator(&config, &rerun).build_all(&list, "vlc").unwrap();
    assert_eq!(statuses[0].outcome, BuildOutcome::DummyBuildSucceeded);
    assert!(rerun.calls().iter().all(|c| c.program != "dpkg-buildpackage"));
    assert_eq!(rerun.count("apt-get", "source"), 0);
    assert_eq!(rerun.count("apt-get", "build-dep"), 1);

    let stat = fs::read_to_string(work.join("vlc.stat")).unwrap();
    assert_eq!(
        stat,
        "package name, build, vararg-build, vararg-error\nzlib, True, none, None\nzlib, True, none, None\n"
    );
}

#[test]
fn test_failures_stay_with_their_package() {
    let (_temp, config) = test_config();
    let work = config.working_dir.clone();

    let runner = Arc::new(MockRunner::new(|inv| {
        if is_source_fetch(inv) {
            if inv.args[1] == "nosrc" {
                return failed("E: Unable to find a source package for nosrc");
            }
            unpack_source(inv, &[]);
            return ok();
        }
        if inv.program != "dpkg-buildpackage" {
            return ok();
        }
        let dir = cwd(inv);
        let src = dir.file_name().unwrap().to_string_lossy().into_owned();
        match dpkg_build(inv) {
            // "broken" never produces a compile database
            DpkgBuild::Original if src.starts_with("plain") => {
                fs::write(dir.join("compile_commands.json"), "[]").unwrap();
            }
            DpkgBuild::Dummy => {
                fake_lib(&dir.join("libplain.so.0"), "libplain.so.0", &[], &["plain"]);
            }
            DpkgBuild::Original => return failed("build failed"),
            _ => {}
        }
        ok()
    }));

    let statuses = orchestrator(&config, &runner)
        .build_all(&deps(&["nosrc", "broken", "plain"]), "apps")
        .unwrap();
    let outcomes: Vec<BuildOutcome> = statuses.iter().map(|s| s.outcome).collect();
    assert_eq!(
        outcomes,
        vec![
            BuildOutcome::NotAttempted,
            BuildOutcome::OriginalBuildFailed,
            BuildOutcome::DummyBuildFailed,
        ]
    );
    assert!(!work.join("nosrc").exists());
    assert!(!work.join("plain.dpkg/plain-1.0/.petablox_success").exists());

    let records = read_status(&work.join("apps.stat")).unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.values().all(|r| !r.build));
}

#[test]
fn test_make_fallback_after_failed_dummy_build() {
    let (_temp, config) = test_config();
    let work = config.working_dir.clone();

    let runner = Arc::new(MockRunner::new(|inv| {
        if is_source_fetch(inv) {
            unpack_source(inv, &["configure"]);
            return ok();
        }
        let dir = inv.cwd.clone().unwrap_or_default();
        match inv.program.as_str() {
            "dpkg-buildpackage" => match dpkg_build(inv) {
                DpkgBuild::Original => fs::write(dir.join("compile_commands.json"), "[]").unwrap(),
                DpkgBuild::Dummy => {
                    fake_lib(&dir.join("build/libfoo.so.1"), "libfoo.so.1", &[], &["foo"])
                }
                _ => {}
            },
            "./configure" => fs::write(dir.join("Makefile"), "all:\n").unwrap(),
            "make" => {
                let syms = ["foo", "foo__loadsym"];
                fake_lib(&dir.join("src/.libs/libfoo.so.1.0.0"), "libfoo.so.1", &[], &syms);
                fake_lib(&dir.join("tests/libfoo.so.1.0.0"), "libfoo.so.1", &[], &syms);
            }
            _ => {}
        }
        ok()
    }));

    let orch = orchestrator(&config, &runner);
    let statuses = orch.build_all(&deps(&["libfoo"]), "foo").unwrap();
    assert_eq!(statuses[0].outcome, BuildOutcome::MakeFallbackSucceeded);
    assert!(work.join("lib/libfoo.so.1").exists());
    assert!(work.join("libfoo.make/libfoo-1.0/.petablox_success").exists());

    let configure = runner
        .calls()
        .into_iter()
        .find(|c| c.program == "./configure")
        .unwrap();
    assert_eq!(configure.env["CFLAGS"], config.link_flags);
    assert_eq!(configure.env["LDFLAGS"], config.link_flags);
    let make = runner.calls().into_iter().find(|c| c.program == "make").unwrap();
    assert_eq!(make.args, vec!["-j4"]);
    assert_eq!(make.env["DUMMY_LIB_GEN"], "ON");

    // libtool outputs win over other copies
    let scraped = scrape_source(orch.context(), "libfoo").unwrap();
    assert_eq!(scraped.len(), 1);
    assert!(scraped[0].to_string_lossy().contains("/.libs/"));
}

fn timed_out(inv: &Invocation) -> Answer {
    Err(Error::TimeoutError {
        tool: inv.program.clone(),
        seconds: 5,
    })
}

#[test]
fn test_dummy_build_timeout_falls_back_to_make() {
    let (_temp, config) = test_config();
    let work = config.working_dir.clone();

    let runner = Arc::new(MockRunner::fallible(|inv| {
        if is_source_fetch(inv) {
            unpack_source(inv, &["configure"]);
            return Ok(ok());
        }
        let dir = inv.cwd.clone().unwrap_or_default();
        match inv.program.as_str() {
            "dpkg-buildpackage" => match dpkg_build(inv) {
                DpkgBuild::Original => fs::write(dir.join("compile_commands.json"), "[]").unwrap(),
                DpkgBuild::Dummy => return timed_out(inv),
                _ => {}
            },
            "./configure" => fs::write(dir.join("Makefile"), "all:\n").unwrap(),
            "make" => {
                fake_lib(&dir.join("libfoo.so.1"), "libfoo.so.1", &[], &["foo__loadsym"]);
            }
            _ => {}
        }
        Ok(ok())
    }));

    let statuses = orchestrator(&config, &runner)
        .build_all(&deps(&["libfoo"]), "foo")
        .unwrap();
    assert_eq!(statuses[0].outcome, BuildOutcome::MakeFallbackSucceeded);
    assert_eq!(runner.count("make", "-j4"), 1);
    assert!(work.join("lib/libfoo.so.1").exists());
}

#[test]
fn test_dummy_build_timeout_without_build_system() {
    let (_temp, config) = test_config();

    let runner = Arc::new(MockRunner::fallible(|inv| {
        if is_source_fetch(inv) {
            unpack_source(inv, &[]);
            return Ok(ok());
        }
        if inv.program == "dpkg-buildpackage" {
            match dpkg_build(inv) {
                DpkgBuild::Original => {
                    fs::write(cwd(inv).join("compile_commands.json"), "[]").unwrap()
                }
                DpkgBuild::Dummy => return timed_out(inv),
                _ => {}
            }
        }
        Ok(ok())
    }));

    let statuses = orchestrator(&config, &runner)
        .build_all(&deps(&["zlib"]), "z")
        .unwrap();
    assert_eq!(statuses[0].outcome, BuildOutcome::DummyBuildFailed);
}

#[test]
fn test_build_dependency_errors_do_not_abort() {
    let (_temp, config) = test_config();
    let runner = zlib_runner_with(|inv| {
        let build_dep = inv.program == "apt-get" && inv.args[0] == "build-dep";
        let repair = inv.program == "dpkg" && inv.args[0] == "--configure";
        (build_dep || repair).then(|| timed_out(inv))
    });

    let statuses = orchestrator(&config, &runner)
        .build_all(&deps(&["zlib"]), "z")
        .unwrap();
    assert_eq!(statuses[0].outcome, BuildOutcome::DummyBuildSucceeded);
    // first attempt, repair, retry
    assert_eq!(runner.count("apt-get", "build-dep"), 2);
    assert_eq!(runner.count("dpkg", "--configure"), 1);
    assert!(runner.count("dpkg-buildpackage", "-b") > 0);
}

/// Dummy build yields an erased library with one vararg symbol
fn vararg_runner(with_debs: bool) -> Arc<MockRunner> {
    Arc::new(MockRunner::new(move |inv| {
        if is_source_fetch(inv) {
            unpack_source(inv, &["debian/libbar.symbols"]);
            return ok();
        }
        if inv.program != "dpkg-buildpackage" {
            return ok();
        }
        let dir = cwd(inv);
        let lib = dir.join("build/libbar.so.2.0");
        match dpkg_build(inv) {
            DpkgBuild::Original => fs::write(dir.join("compile_commands.json"), "[]").unwrap(),
            DpkgBuild::Dummy => fake_lib(
                &lib,
                "libbar.so.2",
                &[],
                &["bar__loadsym", "bar_printf__dummy__va"],
            ),
            DpkgBuild::Vararg => {
                fake_lib(&lib, "libbar.so.2", &[], &["bar__loadsym"]);
                if with_debs {
                    let stage: &Path = dir.parent().unwrap();
                    fs::write(stage.join("libbar_1.0_amd64.deb"), "deb").unwrap();
                    fs::write(stage.join("libbar-dev_1.0_amd64.deb"), "deb").unwrap();
                }
            }
            DpkgBuild::Clean => {}
        }
        ok()
    }))
}

#[test]
fn test_vararg_libraries_installed_manually() {
    let (_temp, config) = test_config();
    let work = config.working_dir.clone();
    let runner = vararg_runner(false);

    let statuses = orchestrator(&config, &runner)
        .build_all(&deps(&["libbar"]), "bar")
        .unwrap();
    assert_eq!(statuses[0].outcome, BuildOutcome::DummyBuildSucceeded);
    assert_eq!(statuses[0].vararg_type, VarargType::Manual);
    assert_eq!(statuses[0].vararg_error, Some(false));

    assert_eq!(
        fs::read_to_string(work.join("symbols.txt")).unwrap(),
        "bar_printf__dummy__va libbar.so.2\n"
    );
    let replacement = fs::read_to_string(work.join("mod-lib/libbar.so.2")).unwrap();
    assert!(!replacement.contains("__dummy__va"));

    // symbol files are dropped from the vararg tree only
    assert!(!work.join("libbar.vararg/libbar-1.0/debian/libbar.symbols").exists());
    assert!(work.join("libbar.dpkg/libbar-1.0/debian/libbar.symbols").exists());

    let vararg = runner
        .calls()
        .into_iter()
        .find(|c| c.program == "dpkg-buildpackage" && dpkg_build(c) == DpkgBuild::Vararg)
        .unwrap();
    assert_eq!(vararg.env["DUMMY_LIB_GEN"], "ON");
    assert!(!vararg.args.iter().any(|a| a.starts_with("-j")));

    let stat = fs::read_to_string(work.join("bar.stat")).unwrap();
    assert!(stat.ends_with("libbar, True, manual, False\n"));
}

#[test]
fn test_vararg_debs_unpacked_into_mod_lib() {
    let (_temp, config) = test_config();
    let work = config.working_dir.clone();
    let runner = vararg_runner(true);

    let statuses = orchestrator(&config, &runner)
        .build_all(&deps(&["libbar"]), "bar")
        .unwrap();
    assert_eq!(statuses[0].vararg_type, VarargType::Dpkg);
    assert_eq!(statuses[0].vararg_error, Some(false));

    let unpacked: Vec<Invocation> = runner
        .calls()
        .into_iter()
        .filter(|c| c.program == "dpkg" && c.args.first().map(String::as_str) == Some("-x"))
        .collect();
    assert_eq!(unpacked.len(), 1);
    assert!(unpacked[0].args[1].ends_with("libbar_1.0_amd64.deb"));
    assert_eq!(PathBuf::from(&unpacked[0].args[2]), work.join("mod-lib"));
}

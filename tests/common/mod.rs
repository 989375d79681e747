// tests/common/mod.rs

//! Shared test utilities and helpers for integration tests.

#![allow(dead_code)]

use debslim::config::Config;
use debslim::{Introspector, Invocation, ToolOutput, ToolRunner};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::Mutex;
use tempfile::TempDir;

type Handler = Box<dyn Fn(&Invocation) -> debslim::Result<ToolOutput> + Send + Sync>;

/// Records every invocation and answers through a handler closure.
///
/// The handler can create files (build products, downloaded archives) to
/// stand in for what the real tool would leave behind.
pub struct MockRunner {
    calls: Mutex<Vec<Invocation>>,
    handler: Handler,
}

impl MockRunner {
    pub fn new(handler: impl Fn(&Invocation) -> ToolOutput + Send + Sync + 'static) -> Self {
        Self::fallible(move |inv| Ok(handler(inv)))
    }

    /// Like `new`, but the handler may fail the way a spawn or timeout does
    pub fn fallible(
        handler: impl Fn(&Invocation) -> debslim::Result<ToolOutput> + Send + Sync + 'static,
    ) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Every command succeeds and does nothing
    pub fn succeeding() -> Self {
        Self::new(|_| ok())
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.lock().unwrap().clone()
    }

    /// Calls of `program` whose arguments include `arg`
    pub fn count(&self, program: &str, arg: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.program == program && c.args.iter().any(|a| a == arg))
            .count()
    }
}

impl ToolRunner for MockRunner {
    fn run(&self, invocation: &Invocation) -> debslim::Result<ToolOutput> {
        self.calls.lock().unwrap().push(invocation.clone());
        (self.handler)(invocation)
    }
}

pub fn ok() -> ToolOutput {
    ToolOutput {
        code: Some(0),
        ..Default::default()
    }
}

pub fn failed(stderr: &str) -> ToolOutput {
    ToolOutput {
        code: Some(1),
        stdout: String::new(),
        stderr: stderr.to_string(),
    }
}

/// Introspector over plain-text stand-ins for ELF files.
///
/// A fake object is a text file with one directive per line:
/// `SONAME <name>`, `NEEDED <name>` or `SYM <symbol>`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FakeIntrospector;

impl FakeIntrospector {
    fn directives(path: &Path, key: &str) -> Vec<String> {
        let Ok(text) = fs::read_to_string(path) else {
            return Vec::new();
        };
        text.lines()
            .filter_map(|l| l.strip_prefix(key))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }
}

impl Introspector for FakeIntrospector {
    fn soname(&self, path: &Path) -> Option<String> {
        Self::directives(path, "SONAME ").into_iter().next()
    }

    fn needed(&self, path: &Path) -> Vec<String> {
        Self::directives(path, "NEEDED ")
    }

    fn marker_symbols(&self, path: &Path, marker: &str) -> Vec<String> {
        let found: BTreeSet<String> = Self::directives(path, "SYM ")
            .into_iter()
            .filter(|s| s.contains(marker))
            .collect();
        found.into_iter().collect()
    }
}

/// Write a fake shared object understood by [`FakeIntrospector`]
pub fn fake_lib(path: &Path, soname: &str, needed: &[&str], symbols: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let mut text = format!("SONAME {}\n", soname);
    for n in needed {
        text.push_str(&format!("NEEDED {}\n", n));
    }
    for s in symbols {
        text.push_str(&format!("SYM {}\n", s));
    }
    fs::write(path, text).unwrap();
}

/// Write a fake executable with only NEEDED entries
pub fn fake_binary(path: &Path, needed: &[&str]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    let text: String = needed.iter().map(|n| format!("NEEDED {}\n", n)).collect();
    fs::write(path, text).unwrap();
}

/// A configuration rooted in a fresh temporary directory.
///
/// Returns (TempDir, Config) - keep the TempDir alive to prevent cleanup.
pub fn test_config() -> (TempDir, Config) {
    let temp = TempDir::new().unwrap();
    let mut config = Config::default()
        .with_working_dir(temp.path().join("work"))
        .with_compiler_root("/opt/kllvm");
    config.compile_db_dir = temp.path().join("compilation_db");
    config.jobs = 4;
    fs::create_dir_all(&config.working_dir).unwrap();
    (temp, config)
}

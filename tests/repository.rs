// tests/repository.rs

//! Symbol pipeline: fetch, extract and index binary packages.

mod common;

use common::{FakeIntrospector, MockRunner, failed, ok};
use debslim::extract::{PackageExtractor, fetch_binary_package};
use debslim::repository::{read_binaries, read_package_libraries};
use debslim::{ExclusionList, Introspector, SymbolRepository};
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::TempDir;

const TIMEOUT: Duration = Duration::from_secs(5);

enum Entry<'a> {
    File(&'a str, &'a str),
    Link(&'a str, &'a str),
}

fn tar_gz(entries: &[Entry]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for entry in entries {
        let mut header = tar::Header::new_gnu();
        match entry {
            Entry::File(path, content) => {
                header.set_size(content.len() as u64);
                header.set_mode(0o644);
                header.set_cksum();
                builder.append_data(&mut header, path, content.as_bytes()).unwrap();
            }
            Entry::Link(path, target) => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_size(0);
                header.set_mode(0o777);
                builder.append_link(&mut header, path, target).unwrap();
            }
        }
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Write a minimal .deb: debian-binary, control.tar.gz, data.tar.gz
fn write_deb(path: &Path, package: &str, payload: &[Entry]) {
    let control = tar_gz(&[Entry::File(
        "control",
        &format!("Package: {}\nVersion: 1.0\n", package),
    )]);
    let data = tar_gz(payload);

    let mut builder = ar::Builder::new(fs::File::create(path).unwrap());
    for (name, bytes) in [
        ("debian-binary", b"2.0\n".to_vec()),
        ("control.tar.gz", control),
        ("data.tar.gz", data),
    ] {
        let header = ar::Header::new(name.as_bytes().to_vec(), bytes.len() as u64);
        builder.append(&header, bytes.as_slice()).unwrap();
    }
    builder.into_inner().unwrap().flush().unwrap();
}

fn libfoo_payload() -> Vec<Entry<'static>> {
    vec![
        Entry::File(
            "usr/lib/x86_64-linux-gnu/libfoo.so.1.0",
            "SONAME libfoo.so.1\nNEEDED libbar.so.2\nNEEDED libdl.so.2\nSYM foo_init\n",
        ),
        Entry::Link("usr/lib/x86_64-linux-gnu/libfoo.so.1", "libfoo.so.1.0"),
        Entry::File("usr/bin/footool", "NEEDED libfoo.so.1\n"),
    ]
}

/// dpkg-gensymbols stand-in: one section per library with two symbols
fn gensymbols() -> MockRunner {
    MockRunner::new(|inv| {
        if inv.program != "dpkg-gensymbols" {
            return ok();
        }
        let arg = |prefix: &str| {
            inv.args
                .iter()
                .find_map(|a| a.strip_prefix(prefix))
                .unwrap()
                .to_string()
        };
        let (package, lib, out) = (arg("-p"), arg("-e"), arg("-O"));
        let soname = FakeIntrospector.soname(Path::new(&lib)).unwrap();
        let text = format!(
            "{} {} #MINVER#\n* Build-Depends-Package: {}-dev\n {}_init@Base 1.0\n {}_run@FOO_1 1.0\n",
            soname, package, package, package, package
        );
        fs::write(inv.cwd.as_ref().unwrap().join(out), text).unwrap();
        ok()
    })
}

#[test]
fn test_extract_and_save_repository() {
    let temp = TempDir::new().unwrap();
    let work = temp.path();
    let pkg_dir = work.join("libfoo1");
    fs::create_dir_all(&pkg_dir).unwrap();
    let deb = pkg_dir.join("libfoo1_1.0_amd64.deb");
    write_deb(&deb, "libfoo1", &libfoo_payload());

    let doc_dir = work.join("libfoo-doc");
    fs::create_dir_all(&doc_dir).unwrap();
    let doc_deb = doc_dir.join("libfoo-doc_1.0_all.deb");
    write_deb(
        &doc_deb,
        "libfoo-doc",
        &[Entry::File("usr/share/man/man3/foo_init.3.gz", "x")],
    );

    let runner = gensymbols();
    let excludes = ExclusionList::ldd_defaults();
    let extractor = PackageExtractor::new(&runner, &FakeIntrospector, &excludes, TIMEOUT);

    let foo = extractor.extract("libfoo1", &deb, &pkg_dir);
    assert!(foo.package.has_symbols);
    // the symlink is not a second library
    assert_eq!(foo.package.raw_libs.len(), 1);
    assert_eq!(foo.libraries.len(), 1);
    assert_eq!(foo.libraries[0].needed, vec!["libbar.so.2"]);
    assert_eq!(foo.package.binaries, vec!["footool"]);
    assert_eq!(runner.count("dpkg-gensymbols", "-plibfoo1"), 1);

    let doc = extractor.extract("libfoo-doc", &doc_deb, &doc_dir);
    assert!(doc.libraries.is_empty());

    let mut repo = SymbolRepository::new();
    repo.add_extraction(foo);
    repo.add_extraction(doc);
    repo.load_symbols(work);
    repo.save(work).unwrap();

    assert_eq!(fs::read_to_string(work.join("libraries.txt")).unwrap(), "libfoo.so.1\n");
    assert_eq!(
        fs::read_to_string(work.join("meta/libfoo.so.1.libraries")).unwrap(),
        "libbar.so.2\n"
    );
    assert_eq!(
        fs::read_to_string(work.join("meta/libfoo.so.1.symbols")).unwrap(),
        "libfoo.so.1 libfoo1_init\nlibfoo.so.1 libfoo1_run\n"
    );
    assert_eq!(fs::read_to_string(work.join("extra.txt")).unwrap(), "libfoo-doc man\n");

    let packages = read_package_libraries(&work.join("packages.txt")).unwrap();
    assert_eq!(packages["libfoo1"], vec!["libfoo.so.1"]);
    let binaries = read_binaries(work).unwrap();
    assert_eq!(binaries["footool"], "libfoo1");
}

#[test]
fn test_extraction_is_reused() {
    let temp = TempDir::new().unwrap();
    let pkg_dir = temp.path().join("libfoo1");
    fs::create_dir_all(&pkg_dir).unwrap();
    let deb = pkg_dir.join("libfoo1_1.0_amd64.deb");
    write_deb(&deb, "libfoo1", &libfoo_payload());

    let runner = gensymbols();
    let excludes = ExclusionList::ldd_defaults();
    let extractor = PackageExtractor::new(&runner, &FakeIntrospector, &excludes, TIMEOUT);
    extractor.extract("libfoo1", &deb, &pkg_dir);

    // a corrupted archive no longer matters once the payload exists
    fs::write(&deb, b"garbage").unwrap();
    let again = extractor.extract("libfoo1", &deb, &pkg_dir);
    assert_eq!(again.libraries.len(), 1);
}

#[test]
fn test_failed_symbol_generation_keeps_package() {
    let temp = TempDir::new().unwrap();
    let pkg_dir = temp.path().join("libfoo1");
    fs::create_dir_all(&pkg_dir).unwrap();
    let deb = pkg_dir.join("libfoo1_1.0_amd64.deb");
    write_deb(&deb, "libfoo1", &libfoo_payload());

    let runner = MockRunner::new(|_| failed("dpkg-gensymbols: error: no symbols"));
    let excludes = ExclusionList::ldd_defaults();
    let extractor = PackageExtractor::new(&runner, &FakeIntrospector, &excludes, TIMEOUT);
    let extraction = extractor.extract("libfoo1", &deb, &pkg_dir);

    assert!(!extraction.package.has_symbols);
    assert_eq!(extraction.libraries.len(), 1);
}

#[test]
fn test_fetch_moves_download_into_package_dir() {
    let temp = TempDir::new().unwrap();
    let work = temp.path();
    let runner = MockRunner::new(|inv| {
        if inv.program == "apt-get" && inv.args.first().map(String::as_str) == Some("download") {
            let cwd = inv.cwd.as_ref().unwrap();
            fs::write(cwd.join(format!("{}_2.0_amd64.deb", inv.args[1])), b"deb").unwrap();
            return ok();
        }
        failed("unexpected")
    });

    let deb = fetch_binary_package(&runner, work, "zlib1g", TIMEOUT).unwrap();
    assert_eq!(deb, work.join("zlib1g/zlib1g_2.0_amd64.deb"));
    assert!(!work.join("zlib1g_2.0_amd64.deb").exists());

    // second call finds the archive without downloading
    let again = fetch_binary_package(&runner, work, "zlib1g", TIMEOUT).unwrap();
    assert_eq!(again, deb);
    assert_eq!(runner.count("apt-get", "download"), 1);
}

#[test]
fn test_fetch_failure_yields_none() {
    let temp = TempDir::new().unwrap();
    let runner = MockRunner::new(|_| failed("E: Unable to locate package nosuch"));
    assert!(fetch_binary_package(&runner, temp.path(), "nosuch", TIMEOUT).is_none());
    assert!(!temp.path().join("nosuch").exists());
}

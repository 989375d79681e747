// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: dependency list
fn dep_list_arg() -> Arg {
    Arg::new("dep_list")
        .required(true)
        .value_name("DEP_LIST")
        .help("Dependency list, one package per line")
}

fn build_cli() -> Command {
    Command::new("debslim")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Debslim Contributors")
        .about("Debloat the shared libraries an application depends on")
        .subcommand_required(true)
        .arg(
            Arg::new("dir")
                .short('d')
                .long("dir")
                .value_name("DIR")
                .global(true)
                .help("Use DIR as working output directory [default: symbol-out]"),
        )
        .arg(
            Arg::new("force")
                .short('f')
                .long("force")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Force rebuild of original packages"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Verbose output"),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("PATH")
                .global(true)
                .help("Configuration file"),
        )
        .subcommand(
            Command::new("symbols")
                .about("Extract dependency packages and build the symbol repository")
                .arg(dep_list_arg()),
        )
        .subcommand(
            Command::new("runtime")
                .about("Compute the runtime library closure of a binary")
                .arg(Arg::new("bin").short('b').long("bin").required(true).help("Binary whose dependencies are resolved"))
                .arg(Arg::new("trace").short('t').long("trace").help("Load trace of the binary"))
                .arg(
                    Arg::new("outfile")
                        .short('o')
                        .long("outfile")
                        .default_value("runtime.txt")
                        .help("Output file for runtime dependencies"),
                )
                .arg(
                    Arg::new("binary_trace")
                        .long("binary-trace")
                        .default_value("binary.trace")
                        .help("File the traced binaries are appended to"),
                ),
        )
        .subcommand(
            Command::new("patch")
                .about("Patch vararg symbols from a build run onto the symbol repository")
                .arg(Arg::new("symbols").required(true).help("symbols.txt written by a build run")),
        )
        .subcommand(
            Command::new("build")
                .about("Rebuild source packages with erased libraries")
                .arg(dep_list_arg()),
        )
        .subcommand(
            Command::new("scrape")
                .about("Copy erased libraries of already built packages into the lib directory")
                .arg(dep_list_arg()),
        )
        .subcommand(
            Command::new("install")
                .about("Move the dummy libraries of a dependency list into installed-lib")
                .arg(dep_list_arg())
                .arg(
                    Arg::new("packages")
                        .short('p')
                        .long("packages")
                        .required(true)
                        .help("packages.txt from a symbols run"),
                ),
        )
        .subcommand(Command::new("restore").about("Move every installed library back into the lib directory"))
        .subcommand(
            Command::new("check")
                .about("Reconcile a build run against a symbol run")
                .arg(dep_list_arg())
                .arg(
                    Arg::new("against")
                        .long("against")
                        .required(true)
                        .value_name("DIR")
                        .help("Working directory of the symbol run"),
                ),
        )
        .subcommand(
            Command::new("loc")
                .about("Count C/C++ lines of code of an application and its dependencies")
                .arg(Arg::new("application").required(true).help("Application source package"))
                .arg(
                    Arg::new("base_dir")
                        .short('b')
                        .long("base-dir")
                        .required(true)
                        .help("Directory holding one fetched source directory per dependency"),
                )
                .arg(Arg::new("dep_list").short('D').long("dep-list").help("Dependency list"))
                .arg(Arg::new("out_file").short('o').long("out-file").help("Output file")),
        )
        .subcommand(
            Command::new("fold")
                .about("Merge per-process trace files")
                .arg(Arg::new("trace_dir").short('T').long("trace-dir").default_value(".").help("Directory holding the trace files"))
                .arg(
                    Arg::new("preserve")
                        .short('p')
                        .long("preserve")
                        .action(ArgAction::SetTrue)
                        .help("Keep the per-process files"),
                )
                .arg(
                    Arg::new("trace_name")
                        .short('n')
                        .long("trace-name")
                        .default_value("lzload.trace")
                        .help("Trace name"),
                ),
        )
        .subcommand(Command::new("preflight").about("Report which external tools are available"))
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "zsh", "fish", "powershell", "elvish"])
                        .help("Shell type"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();
    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("debslim.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}

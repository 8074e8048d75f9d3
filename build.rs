// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::io;
use std::path::PathBuf;

fn store_arg() -> Arg {
    Arg::new("store")
        .short('s')
        .long("store")
        .value_name("PATH")
        .default_value("package_versions.json")
        .help("Pinned version store")
}

fn build_cli() -> Command {
    Command::new("bci-build")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Package version resolution for container build recipes")
        .subcommand_required(true)
        .subcommand(
            Command::new("query")
                .about("Query packages of an RPM repository")
                .arg(Arg::new("base_url").required(true).help("Repository base URL"))
                .arg(Arg::new("name").required(true).help("Package name"))
                .arg(Arg::new("arch").short('a').long("arch").help("Architecture"))
                .arg(
                    Arg::new("version")
                        .short('v')
                        .long("version")
                        .help("Version prefix"),
                )
                .arg(
                    Arg::new("latest")
                        .short('l')
                        .long("latest")
                        .action(ArgAction::SetTrue)
                        .help("Only the newest package per architecture"),
                ),
        )
        .subcommand(
            Command::new("update-versions")
                .about("Refresh the pinned version store from the build service")
                .arg(store_arg())
                .arg(
                    Arg::new("api_url")
                        .long("api-url")
                        .default_value("https://api.opensuse.org")
                        .help("Build service API URL"),
                ),
        )
        .subcommand(
            Command::new("get-version")
                .about("Print the pinned version of a package")
                .arg(Arg::new("package").required(true).help("Package name"))
                .arg(
                    Arg::new("code_stream")
                        .required(true)
                        .help("Code stream (3-7, 16.0 or Tumbleweed)"),
                )
                .arg(store_arg()),
        )
        .subcommand(
            Command::new("format-version")
                .about("Truncate a version to the given granularity")
                .arg(Arg::new("version").required(true).help("Version string"))
                .arg(
                    Arg::new("granularity")
                        .required(true)
                        .value_parser(["major", "minor", "patch"])
                        .help("Granularity"),
                ),
        )
}

fn main() -> io::Result<()> {
    println!("cargo:rerun-if-changed=build.rs");

    let out_dir = PathBuf::from(env::var("OUT_DIR").map_err(io::Error::other)?);
    let man_dir = out_dir.join("man");
    fs::create_dir_all(&man_dir)?;

    let mut buffer = Vec::new();
    Man::new(build_cli()).render(&mut buffer)?;

    fs::write(man_dir.join("bci-build.1"), buffer)?;
    Ok(())
}

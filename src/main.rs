// src/main.rs

use anyhow::Result;
use bci_build::os_version::OsVersion;
use bci_build::repository::repomd::PackageQuery;
use bci_build::repository::{HttpSource, RepoMdParser};
use bci_build::version::{ParseVersion, format_version};
use bci_build::versions::{DEFAULT_OBS_API_URL, PackageVersions, VersionUpdater, run_version_update};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Default location of the pinned version store
const DEFAULT_STORE: &str = "package_versions.json";

#[derive(Parser)]
#[command(name = "bci-build")]
#[command(author, version, about = "Package version resolution for container build recipes", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Query packages of an RPM repository
    Query {
        /// Repository base URL (must end with '/')
        base_url: String,
        /// Package name
        name: String,
        /// Only packages built for this architecture
        #[arg(short, long)]
        arch: Option<String>,
        /// Only packages whose version starts with this prefix
        #[arg(short, long)]
        version: Option<String>,
        /// Only the newest package per architecture
        #[arg(short, long)]
        latest: bool,
    },
    /// Refresh the pinned version store from the build service
    UpdateVersions {
        /// Pinned version store
        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: PathBuf,
        /// Build service API URL
        #[arg(long, default_value = DEFAULT_OBS_API_URL)]
        api_url: String,
    },
    /// Print the pinned version of a package
    GetVersion {
        /// Package name
        package: String,
        /// Code stream (3-7, 16.0 or Tumbleweed)
        code_stream: OsVersion,
        /// Pinned version store
        #[arg(short, long, default_value = DEFAULT_STORE)]
        store: PathBuf,
    },
    /// Truncate a version to the given granularity
    FormatVersion {
        /// Version string, e.g. 1:2.4.3~rc1
        version: String,
        /// major, minor or patch
        granularity: ParseVersion,
    },
}

fn main() -> Result<()> {
    // Initialize tracing subscriber for logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Query {
            base_url,
            name,
            arch,
            version,
            latest,
        } => {
            let source = Arc::new(HttpSource::new()?);
            let mut parser = RepoMdParser::new(base_url, source);

            let mut query = PackageQuery::new(&name).latest(latest);
            if let Some(ref arch) = arch {
                query = query.arch(arch);
            }
            if let Some(ref version) = version {
                query = query.version(version);
            }

            let packages = parser.query(&query)?;
            if packages.is_empty() {
                info!("No packages named {} found", name);
            }
            for pkg in packages {
                println!("{}\t{}\t{}\t{}", pkg.name, pkg.evr, pkg.arch, pkg.url);
            }
            Ok(())
        }
        Commands::UpdateVersions { store, api_url } => {
            info!("Updating package versions in {}", store.display());
            let updater = VersionUpdater::new(api_url, Arc::new(HttpSource::new()?));
            let refreshed = run_version_update(&store, &updater)?;
            println!(
                "Updated {} packages in {}",
                refreshed.packages().count(),
                store.display()
            );
            Ok(())
        }
        Commands::GetVersion {
            package,
            code_stream,
            store,
        } => {
            let versions = PackageVersions::load(&store)?;
            println!("{}", versions.get(&package, code_stream)?);
            Ok(())
        }
        Commands::FormatVersion {
            version,
            granularity,
        } => {
            println!("{}", format_version(&version, granularity)?);
            Ok(())
        }
    }
}

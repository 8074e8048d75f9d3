// src/versions.rs

//! Pinned package versions per code stream
//!
//! Some versions must be known when the build description is generated,
//! not only when the image is built (e.g. to write them into a README, which
//! the substitution service does not touch). These are kept in a JSON file
//! of the form:
//!
//! ```json
//! {
//!     "nginx": {
//!         "5": "1.21.5",
//!         "6": "1.21.5",
//!         "Tumbleweed": "1.25.5"
//!     },
//!     "mariadb": {
//!         "Tumbleweed": "11.4",
//!         "version_format": "minor"
//!     }
//! }
//! ```
//!
//! The optional `version_format` key limits the granularity of the stored
//! versions (default: patch). The file is only rewritten by an explicit
//! refresh, which asks the build service for the current version of every
//! tracked package and code stream.

use crate::error::{Error, Result};
use crate::os_version::OsVersion;
use crate::repository::MetadataSource;
use crate::version::{ParseVersion, format_version};
use quick_xml::Reader;
use quick_xml::events::Event;
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Key inside a package entry holding its version granularity
pub const VERSION_FORMAT_KEY: &str = "version_format";

/// Default location of the build service's public API
pub const DEFAULT_OBS_API_URL: &str = "https://api.opensuse.org";

type VersionTable = BTreeMap<String, BTreeMap<String, String>>;

/// The pinned version store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageVersions {
    packages: VersionTable,
}

impl PackageVersions {
    /// Parse a store from its JSON representation
    pub fn from_json(json: &str) -> Result<Self> {
        let packages: VersionTable = serde_json::from_str(json)?;
        Ok(Self { packages })
    }

    /// Load the store from `path`
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading package versions from {}", path.display());
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Serialize with sorted keys and 4 space indentation
    pub fn to_json(&self) -> Result<String> {
        let mut out = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
        let mut serializer = serde_json::Serializer::with_formatter(&mut out, formatter);
        serde::Serialize::serialize(&self.packages, &mut serializer)?;

        let mut json = String::from_utf8(out)
            .map_err(|e| Error::ParseError(format!("Invalid UTF-8 in JSON output: {}", e)))?;
        json.push('\n');
        Ok(json)
    }

    /// Replace the file at `path` with this store
    ///
    /// The contents are written to a temporary file in the same directory
    /// first and then renamed over the destination.
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut temp = NamedTempFile::new_in(dir)?;
        temp.write_all(json.as_bytes())?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;

        info!("Wrote package versions to {}", path.display());
        Ok(())
    }

    /// Pinned version of `package` on `os_version`
    ///
    /// Untracked packages and code streams are errors, there is no fallback.
    pub fn get(&self, package: &str, os_version: OsVersion) -> Result<&str> {
        let versions = self
            .packages
            .get(package)
            .ok_or_else(|| Error::UntrackedPackage(package.to_string()))?;

        let code_stream = os_version.to_string();
        versions
            .get(&code_stream)
            .map(String::as_str)
            .ok_or_else(|| Error::UntrackedCodeStream {
                package: package.to_string(),
                code_stream,
            })
    }

    /// Version granularity of `package`
    pub fn version_format(&self, package: &str) -> Result<ParseVersion> {
        let versions = self
            .packages
            .get(package)
            .ok_or_else(|| Error::UntrackedPackage(package.to_string()))?;

        match versions.get(VERSION_FORMAT_KEY) {
            Some(format) => format.parse(),
            None => Ok(ParseVersion::Patch),
        }
    }

    /// All tracked packages
    pub fn packages(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(String::as_str)
    }

    /// Every tracked (package, code stream) pair
    pub fn tracked(&self) -> Result<Vec<(String, OsVersion)>> {
        let mut pairs = Vec::new();
        for (package, versions) in &self.packages {
            for code_stream in versions.keys().filter(|k| *k != VERSION_FORMAT_KEY) {
                let os_version = OsVersion::parse(code_stream).map_err(|_| {
                    Error::ConfigError(format!(
                        "Unknown code stream {} for package {}",
                        code_stream, package
                    ))
                })?;
                pairs.push((package.clone(), os_version));
            }
        }
        Ok(pairs)
    }
}

/// Client for the build service's source info endpoint
pub struct VersionUpdater {
    api_url: String,
    source: Arc<dyn MetadataSource>,
}

impl VersionUpdater {
    pub fn new(api_url: impl Into<String>, source: Arc<dyn MetadataSource>) -> Self {
        Self {
            api_url: api_url.into(),
            source,
        }
    }

    /// URL of the parsed source info of `package` in `project`
    pub fn source_info_url(&self, project: &str, package: &str) -> String {
        format!(
            "{}/public/source/{}/{}?view=info&parse=1",
            self.api_url.trim_end_matches('/'),
            project,
            package
        )
    }

    /// Ask the build service for the version in the spec file of `package`
    pub fn fetch_package_version(&self, project: &str, package: &str) -> Result<String> {
        let url = self.source_info_url(project, package);
        let xml = self.source.fetch_text(&url)?;
        let version = parse_source_info_version(&xml)?.ok_or_else(|| {
            Error::ParseError(format!("No version for {} in {}", package, project))
        })?;

        debug!("{} in {} has version {}", package, project, version);
        Ok(version)
    }

    /// Fetch fresh versions for every tracked pair of `current`
    ///
    /// All lookups run in parallel. The result is only returned if every
    /// single lookup succeeded.
    pub fn refresh(&self, current: &PackageVersions) -> Result<PackageVersions> {
        let mut lookups = Vec::new();
        for (package, os_version) in current.tracked()? {
            let format = current.version_format(&package)?;
            lookups.push((package, os_version, format));
        }
        info!("Refreshing {} package versions", lookups.len());

        let fetched: Vec<(String, OsVersion, String)> = lookups
            .into_par_iter()
            .map(|(package, os_version, format)| -> Result<(String, OsVersion, String)> {
                let raw = self.fetch_package_version(&os_version.obs_project(), &package)?;
                let version = format_version(&raw, format)?;
                Ok((package, os_version, version))
            })
            .collect::<Result<_>>()?;

        let mut packages = VersionTable::new();
        for (package, versions) in &current.packages {
            let entry = packages.entry(package.clone()).or_default();
            if let Some(format) = versions.get(VERSION_FORMAT_KEY) {
                entry.insert(VERSION_FORMAT_KEY.to_string(), format.clone());
            }
        }
        for (package, os_version, version) in fetched {
            packages
                .entry(package)
                .or_default()
                .insert(os_version.to_string(), version);
        }

        Ok(PackageVersions { packages })
    }
}

/// Refresh the store at `path` in place
///
/// The file is left untouched if any lookup fails.
pub fn run_version_update(path: &Path, updater: &VersionUpdater) -> Result<PackageVersions> {
    let current = PackageVersions::load(path)?;
    let refreshed = updater.refresh(&current)?;
    refreshed.save(path)?;
    Ok(refreshed)
}

/// Extract the `<version>` text of a source info document
fn parse_source_info_version(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut in_version = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                depth += 1;
                in_version = depth == 2 && e.local_name().as_ref() == b"version";
            }
            Ok(Event::Text(e)) if in_version => {
                let text = e
                    .unescape()
                    .map_err(|e| Error::ParseError(format!("Invalid source info: {}", e)))?;
                return Ok(Some(text.into_owned()));
            }
            Ok(Event::End(_)) => {
                depth = depth.saturating_sub(1);
                in_version = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse source info: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

// src/repository/repomd.rs

//! repomd repository metadata parser
//!
//! Parses `repodata/repomd.xml` to locate the primary metadata, then
//! downloads and parses the compressed `primary.xml` into a package index.
//! The index is sorted so that, for every name and architecture, the newest
//! package comes first.

use super::{MetadataSource, RpmPackage, decompress, join_url, normalize_url};
use crate::error::{Error, Result};
use crate::version::Evr;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Filter for querying a package index
#[derive(Debug, Clone, Copy)]
pub struct PackageQuery<'a> {
    /// Exact package name
    pub name: &'a str,

    /// Exact architecture
    pub arch: Option<&'a str>,

    /// Prefix of the version component (release is not considered)
    pub version: Option<&'a str>,

    /// Only return the newest package per architecture
    pub latest: bool,
}

impl<'a> PackageQuery<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            arch: None,
            version: None,
            latest: false,
        }
    }

    pub fn arch(mut self, arch: &'a str) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn version(mut self, version: &'a str) -> Self {
        self.version = Some(version);
        self
    }

    pub fn latest(mut self, latest: bool) -> Self {
        self.latest = latest;
        self
    }

    fn matches(&self, pkg: &RpmPackage) -> bool {
        pkg.name == self.name
            && self.arch.is_none_or(|arch| pkg.arch == arch)
            && self
                .version
                .is_none_or(|version| pkg.evr.version.starts_with(version))
    }

    /// Apply this query to a sorted package index
    pub fn select(&self, packages: &[RpmPackage]) -> Vec<RpmPackage> {
        let matching = packages.iter().filter(|pkg| self.matches(pkg));

        if !self.latest {
            return matching.cloned().collect();
        }

        // the index is sorted newest first per name and arch
        let mut seen_arch = HashSet::new();
        matching
            .filter(|pkg| seen_arch.insert(pkg.arch.as_str()))
            .cloned()
            .collect()
    }
}

/// Order of the package index: name, then arch, then newest EVR first
pub fn index_order(a: &RpmPackage, b: &RpmPackage) -> Ordering {
    a.name
        .cmp(&b.name)
        .then_with(|| a.arch.cmp(&b.arch))
        .then_with(|| b.evr.compare(&a.evr))
}

/// Parser and package index of a single repomd repository
pub struct RepoMdParser {
    base_url: String,
    source: Arc<dyn MetadataSource>,
    packages: Vec<RpmPackage>,
}

impl RepoMdParser {
    /// Create a parser for the repository at `base_url`
    ///
    /// Relative locations are resolved against `base_url`, so it should end
    /// with a `/`.
    pub fn new(base_url: impl Into<String>, source: Arc<dyn MetadataSource>) -> Self {
        Self {
            base_url: base_url.into(),
            source,
            packages: Vec::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// The current package index
    pub fn packages(&self) -> &[RpmPackage] {
        &self.packages
    }

    /// Fetch and parse the repository metadata, replacing the package index
    ///
    /// Returns the number of packages in the new index. A repository without
    /// primary metadata yields an empty index.
    pub fn parse(&mut self) -> Result<usize> {
        info!("Parsing repository {}", self.base_url);

        // joined URLs come back normalized, so compare against the same form
        let base_url = normalize_url(&self.base_url)?;
        let Some(primary_location) = self.primary_location(&base_url)? else {
            warn!("No primary metadata in {}", self.base_url);
            self.packages.clear();
            return Ok(0);
        };

        let bytes = self.source.fetch(&primary_location)?;
        let primary_xml = decompress(&primary_location, &bytes)?;

        let mut packages = parse_primary_xml(&primary_xml, &base_url)?;
        packages.sort_by(index_order);
        self.packages = packages;

        info!(
            "Parsed {} packages from {}",
            self.packages.len(),
            self.base_url
        );
        Ok(self.packages.len())
    }

    /// Query the index, parsing the repository first if the index is empty
    ///
    /// An empty result is not an error.
    pub fn query(&mut self, query: &PackageQuery<'_>) -> Result<Vec<RpmPackage>> {
        if self.packages.is_empty() {
            self.parse()?;
        }

        let result = query.select(&self.packages);
        debug!(
            "Query {:?} in {} returned {} packages",
            query,
            self.base_url,
            result.len()
        );
        Ok(result)
    }

    /// Absolute URL of the primary metadata listed in repomd.xml
    fn primary_location(&self, base_url: &str) -> Result<Option<String>> {
        let repomd_url = join_url(base_url, "repodata/repomd.xml")?;
        let repomd = self.source.fetch_text(&repomd_url)?;

        let Some(href) = parse_repomd_primary(&repomd)? else {
            return Ok(None);
        };

        let location = join_url(base_url, &href)?;
        if !location.starts_with(base_url) {
            return Err(Error::ParseError(format!(
                "Primary metadata {} is outside of repository {}",
                location, self.base_url
            )));
        }

        debug!("Primary metadata for {} at {}", self.base_url, location);
        Ok(Some(location))
    }
}

fn attribute(e: &BytesStart<'_>, key: &str) -> Result<Option<String>> {
    let attr = e
        .try_get_attribute(key)
        .map_err(|e| Error::ParseError(format!("Malformed attribute '{}': {}", key, e)))?;

    attr.map(|attr| {
        attr.unescape_value()
            .map(|value| value.into_owned())
            .map_err(|e| Error::ParseError(format!("Malformed attribute '{}': {}", key, e)))
    })
    .transpose()
}

/// Find the `location/@href` of the `<data type="primary">` entry
pub fn parse_repomd_primary(xml: &str) -> Result<Option<String>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut buf = Vec::new();
    let mut in_primary = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"data" => {
                in_primary = attribute(&e, "type")?.as_deref() == Some("primary");
            }
            Ok(Event::Start(e) | Event::Empty(e))
                if in_primary && e.local_name().as_ref() == b"location" =>
            {
                if let Some(href) = attribute(&e, "href")? {
                    return Ok(Some(href));
                }
            }
            Ok(Event::End(e)) if e.local_name().as_ref() == b"data" => {
                in_primary = false;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::ParseError(format!(
                    "Failed to parse repomd.xml: {}",
                    e
                )));
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(None)
}

/// Parse primary.xml into package records located below `base_url`
pub fn parse_primary_xml(xml: &str, base_url: &str) -> Result<Vec<RpmPackage>> {
    let mut reader = Reader::from_str(xml);
    reader.trim_text(true);

    let mut packages = Vec::new();
    let mut buf = Vec::new();

    let mut current_package: Option<PackageBuilder> = None;
    let mut current_tag = String::new();
    let mut in_format = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| Error::ParseError(format!("Failed to parse primary.xml: {}", e)))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let tag_name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if matches!(event, Event::Start(_)) {
                    current_tag = tag_name.clone();
                }

                match tag_name.as_str() {
                    "package" => {
                        current_package = Some(PackageBuilder::default());
                    }
                    "format" => {
                        in_format = matches!(event, Event::Start(_));
                    }
                    "version" if !in_format => {
                        if let Some(ref mut pkg) = current_package {
                            pkg.epoch = attribute(e, "epoch")?;
                            pkg.ver = attribute(e, "ver")?;
                            pkg.rel = attribute(e, "rel")?;
                        }
                    }
                    "location" if !in_format => {
                        if let Some(ref mut pkg) = current_package {
                            pkg.location = attribute(e, "href")?;
                        }
                    }
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let Some(ref mut pkg) = current_package {
                    if !in_format {
                        let text = e
                            .unescape()
                            .map_err(|e| Error::ParseError(format!("Invalid text: {}", e)))?
                            .to_string();
                        match current_tag.as_str() {
                            "name" => pkg.name = Some(text),
                            "arch" => pkg.arch = Some(text),
                            "checksum" => pkg.checksum = Some(text),
                            _ => {}
                        }
                    }
                }
            }
            Event::End(e) => {
                match e.local_name().as_ref() {
                    b"package" => {
                        if let Some(builder) = current_package.take() {
                            packages.push(builder.build(base_url)?);
                        }
                    }
                    b"format" => in_format = false,
                    _ => {}
                }
                current_tag.clear();
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    Ok(packages)
}

/// Builder for constructing RpmPackage from XML parsing
#[derive(Default)]
struct PackageBuilder {
    name: Option<String>,
    epoch: Option<String>,
    ver: Option<String>,
    rel: Option<String>,
    arch: Option<String>,
    checksum: Option<String>,
    location: Option<String>,
}

impl PackageBuilder {
    fn build(self, base_url: &str) -> Result<RpmPackage> {
        let name = self
            .name
            .ok_or_else(|| Error::ParseError("Missing package name".to_string()))?;
        let ver = self
            .ver
            .ok_or_else(|| Error::ParseError(format!("Missing version of {}", name)))?;
        let arch = self
            .arch
            .ok_or_else(|| Error::ParseError(format!("Missing arch of {}", name)))?;
        let location = self
            .location
            .ok_or_else(|| Error::ParseError(format!("Missing location of {}", name)))?;

        let evr = Evr::new(
            self.epoch.unwrap_or_default(),
            ver,
            self.rel.unwrap_or_default(),
        );
        let url = join_url(base_url, &location)?;

        RpmPackage::new(base_url, name, evr, arch, url, self.checksum)
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::repository::StaticSource;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write;

    pub const BASE_URL: &str = "https://packages.example.com/sles/15.7/";

    pub const REPO_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <data type="primary">
    <location href="repodata/primary.xml.gz"/>
  </data>
  <data type="filelists">
    <location href="repodata/filelists.xml.gz"/>
  </data>
  <data type="other">
    <location href="repodata/other.xml.gz"/>
  </data>
</repomd>
"#;

    /// Primary metadata listing `dummy-pkg-1..6` at 1.0.0, 1.0.1 and 1.0.2
    /// for x86_64 and aarch64, deliberately out of order
    pub fn primary_xml() -> String {
        let mut packages = String::new();
        for pkg in [
            "dummy-pkg-3",
            "dummy-pkg-1",
            "dummy-pkg-4",
            "dummy-pkg-2",
            "dummy-pkg-6",
            "dummy-pkg-5",
        ] {
            for arch in ["x86_64", "aarch64"] {
                for ver in ["1.0.0", "1.0.2", "1.0.1"] {
                    packages.push_str(&format!(
                        r#"<package type="rpm">
  <name>{pkg}</name>
  <arch>{arch}</arch>
  <version epoch="0" ver="{ver}" rel="1"/>
  <checksum type="sha256" pkgid="YES">value</checksum>
  <summary>{pkg}</summary>
  <description>{pkg}</description>
  <location href="Packages/{pkg}-{ver}.{arch}.rpm"/>
  <format>
    <rpm:license>MIT</rpm:license>
    <rpm:provides>
      <rpm:entry name="{pkg}" flags="EQ" epoch="0" ver="{ver}" rel="1"/>
    </rpm:provides>
  </format>
</package>
"#
                    ));
                }
            }
        }

        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="36">
{packages}</metadata>
"#
        )
    }

    pub fn gzip(data: &str) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    pub fn fake_repo() -> StaticSource {
        StaticSource::new()
            .with(format!("{}repodata/repomd.xml", BASE_URL), REPO_XML)
            .with(
                format!("{}repodata/primary.xml.gz", BASE_URL),
                gzip(&primary_xml()),
            )
    }
}

// src/repository/package.rs

//! Package records discovered in repository metadata

use super::normalize_url;
use crate::error::{Error, Result};
use crate::version::Evr;
use std::fmt;

/// An RPM advertised by a repository's primary metadata
///
/// Instances are only created from parsed metadata and are never modified
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpmPackage {
    /// Package name
    pub name: String,

    /// Epoch, version and release
    pub evr: Evr,

    /// Architecture token (x86_64, aarch64, noarch, ...)
    pub arch: String,

    /// Basename of the package's location
    pub filename: String,

    /// Absolute download URL
    pub url: String,

    /// Checksum of the package file as advertised by the repository
    pub checksum: Option<String>,
}

impl RpmPackage {
    /// Create a package record discovered under `base_url`
    ///
    /// Fails if the name contains a `/` or the download URL is not located
    /// below the repository's base URL.
    pub fn new(
        base_url: &str,
        name: String,
        evr: Evr,
        arch: String,
        url: String,
        checksum: Option<String>,
    ) -> Result<Self> {
        if name.contains('/') {
            return Err(Error::UntrustedPackage {
                name,
                reason: "package name contains '/'".to_string(),
            });
        }
        let base_url = normalize_url(base_url)?;
        if !url.starts_with(&base_url) {
            return Err(Error::UntrustedPackage {
                name,
                reason: format!("download URL {} is outside of {}", url, base_url),
            });
        }

        let filename = url.rsplit('/').next().unwrap_or_default().to_string();

        Ok(Self {
            name,
            evr,
            arch,
            filename,
            url,
            checksum,
        })
    }

    /// Version component of the EVR
    pub fn version(&self) -> &str {
        &self.evr.version
    }
}

impl fmt::Display for RpmPackage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://packages.example.com/sles/15.7/";

    #[test]
    fn test_package_creation() {
        let pkg = RpmPackage::new(
            BASE,
            "foo".to_string(),
            Evr::new("", "1.0.2", "1"),
            "x86_64".to_string(),
            format!("{}Packages/foo-1.0.2.x86_64.rpm", BASE),
            Some("abc123".to_string()),
        )
        .unwrap();

        assert_eq!(pkg.filename, "foo-1.0.2.x86_64.rpm");
        assert_eq!(pkg.version(), "1.0.2");
        assert_eq!(pkg.to_string(), pkg.url);
    }

    #[test]
    fn test_rejects_slash_in_name() {
        let result = RpmPackage::new(
            BASE,
            "../foo".to_string(),
            Evr::new("", "1.0", "1"),
            "noarch".to_string(),
            format!("{}foo.rpm", BASE),
            None,
        );
        assert!(matches!(result, Err(Error::UntrustedPackage { .. })));
    }

    #[test]
    fn test_rejects_foreign_url() {
        let result = RpmPackage::new(
            BASE,
            "foo".to_string(),
            Evr::new("", "1.0", "1"),
            "noarch".to_string(),
            "https://evil.example.org/foo.rpm".to_string(),
            None,
        );
        assert!(matches!(result, Err(Error::UntrustedPackage { .. })));
    }

    #[test]
    fn test_base_url_with_default_port() {
        let pkg = RpmPackage::new(
            "https://Packages.Example.com:443/sles/15.7/",
            "foo".to_string(),
            Evr::new("", "1.0", "1"),
            "noarch".to_string(),
            format!("{}noarch/foo-1.0-1.noarch.rpm", BASE),
            None,
        )
        .unwrap();
        assert_eq!(pkg.filename, "foo-1.0-1.noarch.rpm");
    }
}

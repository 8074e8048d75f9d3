// src/os_version.rs

//! Operating system code streams
//!
//! A code stream identifies the base OS an image is built on. It is the
//! second key of the pinned version store and selects the build service
//! project that is authoritative for package versions.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Base operating system version of an image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OsVersion {
    /// SLE 15 Service Pack 3..7
    Sp(u8),
    /// SUSE Linux 16.0
    Sl16_0,
    /// openSUSE Tumbleweed
    Tumbleweed,
}

impl OsVersion {
    pub const ALL: [OsVersion; 7] = [
        OsVersion::Sp(7),
        OsVersion::Sp(6),
        OsVersion::Sp(5),
        OsVersion::Sp(4),
        OsVersion::Sp(3),
        OsVersion::Sl16_0,
        OsVersion::Tumbleweed,
    ];

    /// Parse a code stream identifier as it appears in the version store
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "16.0" => Ok(OsVersion::Sl16_0),
            "Tumbleweed" => Ok(OsVersion::Tumbleweed),
            _ => match s.parse::<u8>() {
                Ok(sp @ 3..=7) => Ok(OsVersion::Sp(sp)),
                _ => Err(Error::ConfigError(format!("Unknown code stream: {}", s))),
            },
        }
    }

    /// Build service project whose sources define the package versions
    pub fn obs_project(&self) -> String {
        match self {
            OsVersion::Sp(sp) => format!("SUSE:SLE-15-SP{}:Update", sp),
            OsVersion::Sl16_0 => "SUSE:SLFO:Main:Build".to_string(),
            OsVersion::Tumbleweed => "openSUSE:Factory".to_string(),
        }
    }
}

impl fmt::Display for OsVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OsVersion::Sp(sp) => write!(f, "{}", sp),
            OsVersion::Sl16_0 => f.write_str("16.0"),
            OsVersion::Tumbleweed => f.write_str("Tumbleweed"),
        }
    }
}

impl FromStr for OsVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        OsVersion::parse(s)
    }
}

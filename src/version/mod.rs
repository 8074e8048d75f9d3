// src/version/mod.rs

//! RPM version comparison and version truncation
//!
//! This module provides:
//! - `rpmvercmp`, the segment-wise string comparison RPM uses for versions
//!   and releases (numeric segments compare numerically, alphabetic ones
//!   lexically, `~` sorts before anything and `^` after the base version)
//! - `Evr`, the epoch/version/release triple with RPM label comparison
//! - `ParseVersion` and `format_version` for truncating versions to a
//!   given granularity

use crate::error::{Error, Result};
use semver::Version;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Epoch, version and release of an RPM
///
/// The epoch is kept verbatim and may be empty, which compares like `0`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Evr {
    pub epoch: String,
    pub version: String,
    pub release: String,
}

impl Evr {
    pub fn new(
        epoch: impl Into<String>,
        version: impl Into<String>,
        release: impl Into<String>,
    ) -> Self {
        Self {
            epoch: epoch.into(),
            version: version.into(),
            release: release.into(),
        }
    }

    /// Compare two EVRs the way `rpm`'s labelCompare does
    pub fn compare(&self, other: &Evr) -> Ordering {
        label_compare(self, other)
    }
}

impl fmt::Display for Evr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.epoch.is_empty() && self.epoch != "0" {
            write!(f, "{}:", self.epoch)?;
        }
        write!(f, "{}", self.version)?;
        if !self.release.is_empty() {
            write!(f, "-{}", self.release)?;
        }
        Ok(())
    }
}

/// Compare epoch, then version, then release
pub fn label_compare(a: &Evr, b: &Evr) -> Ordering {
    compare_epoch(&a.epoch, &b.epoch)
        .then_with(|| rpmvercmp(&a.version, &b.version))
        .then_with(|| rpmvercmp(&a.release, &b.release))
}

fn compare_epoch(a: &str, b: &str) -> Ordering {
    let a = if a.is_empty() { "0" } else { a };
    let b = if b.is_empty() { "0" } else { b };
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(a), Ok(b)) => a.cmp(&b),
        _ => rpmvercmp(a, b),
    }
}

fn is_separator(c: u8) -> bool {
    !c.is_ascii_alphanumeric() && c != b'~' && c != b'^'
}

/// RPM's version segment comparison
pub fn rpmvercmp(a: &str, b: &str) -> Ordering {
    if a == b {
        return Ordering::Equal;
    }

    let one = a.as_bytes();
    let two = b.as_bytes();
    let (mut i, mut j) = (0, 0);

    while i < one.len() || j < two.len() {
        while i < one.len() && is_separator(one[i]) {
            i += 1;
        }
        while j < two.len() && is_separator(two[j]) {
            j += 1;
        }

        // tilde sorts before everything, even the end of the string
        let one_tilde = one.get(i) == Some(&b'~');
        let two_tilde = two.get(j) == Some(&b'~');
        if one_tilde || two_tilde {
            if !one_tilde {
                return Ordering::Greater;
            }
            if !two_tilde {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        // caret sorts after the end of the string but before anything else
        let one_caret = one.get(i) == Some(&b'^');
        let two_caret = two.get(j) == Some(&b'^');
        if one_caret || two_caret {
            if i >= one.len() {
                return Ordering::Less;
            }
            if j >= two.len() {
                return Ordering::Greater;
            }
            if !one_caret {
                return Ordering::Greater;
            }
            if !two_caret {
                return Ordering::Less;
            }
            i += 1;
            j += 1;
            continue;
        }

        if i >= one.len() || j >= two.len() {
            break;
        }

        let (start1, start2) = (i, j);
        let numeric = one[i].is_ascii_digit();
        if numeric {
            while i < one.len() && one[i].is_ascii_digit() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_digit() {
                j += 1;
            }
        } else {
            while i < one.len() && one[i].is_ascii_alphabetic() {
                i += 1;
            }
            while j < two.len() && two[j].is_ascii_alphabetic() {
                j += 1;
            }
        }

        let seg1 = &one[start1..i];
        let seg2 = &two[start2..j];

        // segments of different types: numeric is newer
        if seg2.is_empty() {
            return if numeric {
                Ordering::Greater
            } else {
                Ordering::Less
            };
        }

        let ordering = if numeric {
            let seg1 = trim_leading_zeros(seg1);
            let seg2 = trim_leading_zeros(seg2);
            seg1.len().cmp(&seg2.len()).then_with(|| seg1.cmp(seg2))
        } else {
            seg1.cmp(seg2)
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }

    match (i >= one.len(), j >= two.len()) {
        (true, true) => Ordering::Equal,
        (false, _) => Ordering::Greater,
        (true, false) => Ordering::Less,
    }
}

fn trim_leading_zeros(seg: &[u8]) -> &[u8] {
    let first = seg.iter().position(|&c| c != b'0').unwrap_or(seg.len());
    &seg[first..]
}

/// Granularity a version is reduced to before substitution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseVersion {
    Major,
    Minor,
    Patch,
    PatchUpdate,
    Offset,
    Release,
}

impl ParseVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseVersion::Major => "major",
            ParseVersion::Minor => "minor",
            ParseVersion::Patch => "patch",
            ParseVersion::PatchUpdate => "patch_update",
            ParseVersion::Offset => "offset",
            ParseVersion::Release => "release",
        }
    }
}

impl fmt::Display for ParseVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ParseVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "major" => Ok(ParseVersion::Major),
            "minor" => Ok(ParseVersion::Minor),
            "patch" => Ok(ParseVersion::Patch),
            "patch_update" => Ok(ParseVersion::PatchUpdate),
            "offset" => Ok(ParseVersion::Offset),
            "release" => Ok(ParseVersion::Release),
            _ => Err(Error::UnsupportedVersionFormat(s.to_string())),
        }
    }
}

/// Extract major.minor.patch from a package version
///
/// An `epoch:` prefix and everything after `~` are dropped. Missing
/// components default to 0, trailing non-numeric parts are ignored.
fn parse_release_numbers(ver: &str) -> Result<Version> {
    let without_epoch = match ver.split_once(':') {
        Some((_, rest)) => rest,
        None => ver,
    };
    let base = without_epoch.split('~').next().unwrap_or_default();
    let base = base.strip_prefix('v').unwrap_or(base);

    let mut numbers = Vec::with_capacity(3);
    for component in base.split('.') {
        let digits: String = component.chars().take_while(|c| c.is_ascii_digit()).collect();
        if digits.is_empty() {
            break;
        }
        let value = digits
            .parse::<u64>()
            .map_err(|_| Error::InvalidVersion(ver.to_string()))?;
        numbers.push(value);
        if digits.len() != component.len() || numbers.len() == 3 {
            break;
        }
    }

    if numbers.is_empty() {
        return Err(Error::InvalidVersion(ver.to_string()));
    }

    let get = |idx: usize| numbers.get(idx).copied().unwrap_or(0);
    Ok(Version::new(get(0), get(1), get(2)))
}

/// Format `ver` to the supplied granularity
///
/// ```
/// use bci_build::version::{format_version, ParseVersion};
///
/// assert_eq!(format_version("1.2.3", ParseVersion::Major).unwrap(), "1");
/// assert_eq!(format_version("1.2.3", ParseVersion::Minor).unwrap(), "1.2");
/// assert_eq!(format_version("1.2", ParseVersion::Patch).unwrap(), "1.2.0");
/// ```
///
/// `PatchUpdate`, `Offset` and `Release` depend on the package's build
/// counters and are only understood by the substitution service; requesting
/// them here is an error.
pub fn format_version(ver: &str, format: ParseVersion) -> Result<String> {
    match format {
        ParseVersion::Major => Ok(parse_release_numbers(ver)?.major.to_string()),
        ParseVersion::Minor => {
            let v = parse_release_numbers(ver)?;
            Ok(format!("{}.{}", v.major, v.minor))
        }
        ParseVersion::Patch => {
            let v = parse_release_numbers(ver)?;
            Ok(format!("{}.{}.{}", v.major, v.minor, v.patch))
        }
        ParseVersion::PatchUpdate | ParseVersion::Offset | ParseVersion::Release => {
            Err(Error::UnsupportedVersionFormat(format.to_string()))
        }
    }
}

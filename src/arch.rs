// src/arch.rs

//! Target architectures of container images

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Architecture an image can be built for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Arch {
    X86_64,
    Aarch64,
    Ppc64le,
    S390x,
}

impl Arch {
    pub const ALL: [Arch; 4] = [Arch::X86_64, Arch::Aarch64, Arch::Ppc64le, Arch::S390x];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
            Arch::Ppc64le => "ppc64le",
            Arch::S390x => "s390x",
        }
    }

    /// RPM architecture tokens installable on this architecture
    ///
    /// `noarch` packages match every architecture.
    pub fn rpm_arches(&self) -> &'static [&'static str] {
        match self {
            Arch::X86_64 => &["x86_64", "x86", "noarch"],
            Arch::Aarch64 => &["aarch64", "noarch"],
            Arch::Ppc64le => &["ppc64le", "noarch"],
            Arch::S390x => &["s390x", "noarch"],
        }
    }

    /// Whether an RPM built for `rpm_arch` installs on this architecture
    pub fn accepts(&self, rpm_arch: &str) -> bool {
        self.rpm_arches().contains(&rpm_arch)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Arch::ALL
            .into_iter()
            .find(|arch| arch.as_str() == s)
            .ok_or_else(|| Error::ConfigError(format!("Unknown architecture: {}", s)))
    }
}

// src/image.rs

//! Container image definitions
//!
//! An image definition carries everything the version resolution needs:
//! which build description it generates, for which architectures, the
//! replacements to emit into its `_service` file and optionally the
//! third-party packages it ships.

use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::os_version::OsVersion;
use crate::replacement::Replacement;
use crate::service::ServiceManifest;
use crate::thirdparty::ThirdPartyResolver;
use crate::versions::PackageVersions;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Name of the generated source service file
pub const SERVICE_FILE_NAME: &str = "_service";

/// Format of the generated build description
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum BuildType {
    #[default]
    Docker,
    Kiwi,
}

/// Static configuration of an image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageConfig {
    /// Image name, e.g. `nginx`
    pub name: String,

    /// Name of the build service package (defaults to `name`)
    pub package_name: String,

    /// Code stream the image is built on
    pub os_version: OsVersion,

    pub build_type: BuildType,

    /// Architectures the image is built for
    pub exclusive_arch: Vec<Arch>,

    pub replacements: Vec<Replacement>,
}

impl ImageConfig {
    /// Docker image built for all architectures
    pub fn new(name: impl Into<String>, os_version: OsVersion) -> Self {
        let name = name.into();
        Self {
            package_name: name.clone(),
            name,
            os_version,
            build_type: BuildType::Docker,
            exclusive_arch: Arch::ALL.to_vec(),
            replacements: Vec::new(),
        }
    }

    pub fn with_package_name(mut self, package_name: impl Into<String>) -> Self {
        self.package_name = package_name.into();
        self
    }

    pub fn with_build_type(mut self, build_type: BuildType) -> Self {
        self.build_type = build_type;
        self
    }

    pub fn with_exclusive_arch(mut self, exclusive_arch: Vec<Arch>) -> Self {
        self.exclusive_arch = exclusive_arch;
        self
    }

    pub fn with_replacement(mut self, replacement: Replacement) -> Self {
        self.replacements.push(replacement);
        self
    }
}

/// An image definition with its optional third-party package resolver
pub struct Image {
    config: ImageConfig,
    third_party: Option<ThirdPartyResolver>,
}

impl Image {
    pub fn new(config: ImageConfig) -> Result<Self> {
        if config.exclusive_arch.is_empty() {
            return Err(Error::ConfigError(format!(
                "Image {} has no architecture",
                config.name
            )));
        }
        Ok(Self {
            config,
            third_party: None,
        })
    }

    /// An image installing packages from third-party repositories
    ///
    /// Only Docker builds are supported.
    pub fn with_third_party(config: ImageConfig, resolver: ThirdPartyResolver) -> Result<Self> {
        if config.build_type != BuildType::Docker {
            return Err(Error::ConfigError(format!(
                "Build type {:?} is not supported for third-party image {}",
                config.build_type, config.name
            )));
        }
        let mut image = Self::new(config)?;
        image.third_party = Some(resolver);
        Ok(image)
    }

    pub fn config(&self) -> &ImageConfig {
        &self.config
    }

    /// `Dockerfile` or `<package_name>.kiwi`
    pub fn build_description_file_name(&self) -> String {
        match self.config.build_type {
            BuildType::Docker => "Dockerfile".to_string(),
            BuildType::Kiwi => format!("{}.kiwi", self.config.package_name),
        }
    }

    /// Source services for all replacements of this image
    pub fn service_manifest(&self) -> ServiceManifest {
        let default_file_name = self.build_description_file_name();
        ServiceManifest::new(
            self.config
                .replacements
                .iter()
                .map(|replacement| replacement.to_service(&default_file_name))
                .collect(),
        )
    }

    /// Pinned version of `package` on this image's code stream
    pub fn pinned_version<'a>(&self, store: &'a PackageVersions, package: &str) -> Result<&'a str> {
        store.get(package, self.config.os_version)
    }

    /// Dockerfile instructions installing the third-party packages
    pub fn third_party_fragment(&mut self) -> Result<Option<String>> {
        let exclusive_arch = self.config.exclusive_arch.clone();
        self.third_party
            .as_mut()
            .map(|resolver| resolver.dockerfile_fragment(&exclusive_arch))
            .transpose()
    }

    /// Generated files besides the build description itself
    pub fn extra_files(&self) -> Result<BTreeMap<String, String>> {
        let mut files = BTreeMap::new();

        let manifest = self.service_manifest();
        if !manifest.is_empty() {
            files.insert(SERVICE_FILE_NAME.to_string(), manifest.to_xml()?);
        }
        if let Some(ref resolver) = self.third_party {
            files.extend(resolver.extra_files());
        }

        Ok(files)
    }

    /// Write the generated files into `dest`
    pub fn write_files(&self, dest: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dest)?;

        let mut written = Vec::new();
        for (name, contents) in self.extra_files()? {
            let path = dest.join(&name);
            debug!("Writing {}", path.display());
            fs::write(&path, contents)?;
            written.push(path);
        }

        info!(
            "Wrote {} files for {} to {}",
            written.len(),
            self.config.name,
            dest.display()
        );
        Ok(written)
    }
}

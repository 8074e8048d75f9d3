// src/thirdparty.rs

//! Packages from third-party repositories
//!
//! Images can ship RPMs from repositories outside of the build service.
//! The RPMs are resolved when the build description is generated: exactly
//! one package per requested name and target architecture, declared as
//! remote assets so the build service downloads them verbatim. The
//! repository's signing key and a `.repo` file are added to the image so
//! the package manager can keep using the repository afterwards.

use crate::arch::Arch;
use crate::error::{Error, Result};
use crate::repository::repomd::PackageQuery;
use crate::repository::{MetadataSource, RepoMdParser, RpmPackage, normalize_url};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// A package requested from a third-party repository
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThirdPartyPackage {
    pub name: String,

    /// Only resolve for this architecture
    pub arch: Option<Arch>,

    /// Prefix of the package version
    pub version: Option<String>,
}

impl ThirdPartyPackage {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            arch: None,
            version: None,
        }
    }

    pub fn with_arch(mut self, arch: Arch) -> Self {
        self.arch = Some(arch);
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }
}

impl From<&str> for ThirdPartyPackage {
    fn from(name: &str) -> Self {
        ThirdPartyPackage::new(name)
    }
}

/// A third-party repository and how it is configured inside the image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThirdPartyRepo {
    /// Short name, used for the generated key and repo file names
    pub name: String,

    /// Base URL of the repomd repository
    pub url: String,

    /// ASCII armored signing key
    pub key: Option<String>,

    /// Where the signing key is published
    pub key_url: Option<String>,

    /// Section name in the `.repo` file (default: `name`)
    pub repo_name: Option<String>,

    /// File name below `/etc/zypp/repos.d` (default: `<name>.repo`)
    pub repo_filename: Option<String>,

    /// File name of the imported key (default: `<name>.gpg.key`)
    pub key_filename: Option<String>,
}

impl ThirdPartyRepo {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            key: None,
            key_url: None,
            repo_name: None,
            repo_filename: None,
            key_filename: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    pub fn with_key_url(mut self, key_url: impl Into<String>) -> Self {
        self.key_url = Some(key_url.into());
        self
    }

    pub fn repo_name(&self) -> &str {
        self.repo_name.as_deref().unwrap_or(&self.name)
    }

    pub fn repo_filename(&self) -> String {
        self.repo_filename
            .clone()
            .unwrap_or_else(|| format!("{}.repo", self.name))
    }

    pub fn key_filename(&self) -> String {
        self.key_filename
            .clone()
            .unwrap_or_else(|| format!("{}.gpg.key", self.name))
    }

    /// Name of the key file in the build context
    pub fn key_source_file(&self) -> String {
        format!("{}.gpg.key", self.name)
    }

    /// Name of the repo file in the build context
    pub fn repo_source_file(&self) -> String {
        format!("{}.repo", self.name)
    }

    /// Contents of the generated `.repo` file
    pub fn repo_file(&self) -> String {
        let mut repo = format!(
            "[{name}]\nname={name}\nbaseurl={url}\nenabled=1\ngpgcheck=1\n",
            name = self.repo_name(),
            url = self.url
        );
        if let Some(ref key_url) = self.key_url {
            repo.push_str(&format!("gpgkey={}\n", key_url));
        }
        repo
    }
}

/// Package index spanning several repositories
pub struct ThirdPartyRepoParser {
    parsers: Vec<RepoMdParser>,
}

impl ThirdPartyRepoParser {
    pub fn new(repos: &[ThirdPartyRepo], source: Arc<dyn MetadataSource>) -> Self {
        let parsers = repos
            .iter()
            .map(|repo| RepoMdParser::new(repo.url.clone(), source.clone()))
            .collect();
        Self { parsers }
    }

    /// Query every repository and concatenate the results
    pub fn query(&mut self, query: &PackageQuery<'_>) -> Result<Vec<RpmPackage>> {
        let mut result = Vec::new();
        for parser in &mut self.parsers {
            result.extend(parser.query(query)?);
        }
        Ok(result)
    }
}

/// Resolves and stages the third-party packages of one image
pub struct ThirdPartyResolver {
    repos: Vec<ThirdPartyRepo>,
    packages: Vec<ThirdPartyPackage>,
    index: ThirdPartyRepoParser,
    resolved: Option<(Vec<Arch>, Vec<RpmPackage>)>,
}

impl ThirdPartyResolver {
    /// Create a resolver, downloading signing keys that are only given by URL
    pub fn new(
        repos: Vec<ThirdPartyRepo>,
        packages: Vec<ThirdPartyPackage>,
        source: Arc<dyn MetadataSource>,
    ) -> Result<Self> {
        if repos.is_empty() {
            return Err(Error::ConfigError(
                "No third-party repository given".to_string(),
            ));
        }
        if packages.is_empty() {
            return Err(Error::ConfigError(
                "The third-party package list is empty".to_string(),
            ));
        }

        let mut repos = repos;
        for repo in &mut repos {
            if repo.key.is_some() {
                continue;
            }
            let key_url = repo.key_url.as_deref().ok_or_else(|| {
                Error::ConfigError(format!(
                    "Repository {} has neither a key nor a key URL",
                    repo.name
                ))
            })?;
            debug!("Fetching signing key of {} from {}", repo.name, key_url);
            repo.key = Some(source.fetch_text(key_url)?);
        }

        let index = ThirdPartyRepoParser::new(&repos, source);
        Ok(Self {
            repos,
            packages,
            index,
            resolved: None,
        })
    }

    pub fn repos(&self) -> &[ThirdPartyRepo] {
        &self.repos
    }

    pub fn packages(&self) -> &[ThirdPartyPackage] {
        &self.packages
    }

    /// Resolve `pkg` for every architecture in `exclusive_arch`
    ///
    /// Every targeted architecture must yield exactly one package. A package
    /// pinned to an architecture is only resolved for that architecture.
    pub fn fetch_rpm_package(
        &mut self,
        pkg: &ThirdPartyPackage,
        exclusive_arch: &[Arch],
        latest: bool,
    ) -> Result<Vec<RpmPackage>> {
        if exclusive_arch.is_empty() {
            return Err(Error::ConfigError(format!(
                "No target architecture to resolve {} for",
                pkg.name
            )));
        }

        let mut query = PackageQuery::new(&pkg.name).latest(latest);
        if let Some(ref version) = pkg.version {
            query = query.version(version);
        }
        let candidates = self.index.query(&query)?;

        let targets: Vec<Arch> = exclusive_arch
            .iter()
            .copied()
            .filter(|arch| pkg.arch.is_none_or(|pinned| pinned == *arch))
            .collect();

        let pkgs: Vec<RpmPackage> = candidates
            .into_iter()
            .filter(|p| targets.iter().any(|arch| arch.accepts(&p.arch)))
            .collect();

        for arch in &targets {
            let found = pkgs.iter().filter(|p| arch.accepts(&p.arch)).count();
            if found != 1 {
                return Err(Error::PackageCount {
                    package: pkg.name.clone(),
                    arch: arch.to_string(),
                    found,
                });
            }
        }

        debug!("Resolved {} to {:?}", pkg.name, pkgs);
        Ok(pkgs)
    }

    /// Resolve all requested packages for `exclusive_arch`
    ///
    /// The result is cached until the resolver is asked for a different set
    /// of architectures.
    pub fn fetch_rpm_packages(&mut self, exclusive_arch: &[Arch]) -> Result<&[RpmPackage]> {
        let cached = matches!(
            self.resolved,
            Some((ref arches, _)) if arches.as_slice() == exclusive_arch
        );
        if !cached {
            let mut rpms = Vec::new();
            for pkg in self.packages.clone() {
                rpms.extend(self.fetch_rpm_package(&pkg, exclusive_arch, true)?);
            }

            let repo_urls = self
                .repos
                .iter()
                .map(|repo| normalize_url(&repo.url))
                .collect::<Result<Vec<_>>>()?;
            for rpm in &rpms {
                if rpm.name.contains('/') {
                    return Err(Error::UntrustedPackage {
                        name: rpm.name.clone(),
                        reason: "bad package name in repository".to_string(),
                    });
                }
                if !repo_urls.iter().any(|url| rpm.url.starts_with(url)) {
                    return Err(Error::UntrustedPackage {
                        name: rpm.name.clone(),
                        reason: "download URL does not match repository".to_string(),
                    });
                }
            }

            info!("Resolved {} third-party packages", rpms.len());
            self.resolved = Some((exclusive_arch.to_vec(), rpms));
        }

        Ok(self
            .resolved
            .as_ref()
            .map(|(_, rpms)| rpms.as_slice())
            .unwrap_or_default())
    }

    /// Signing keys and repo files to add to the build context
    pub fn extra_files(&self) -> BTreeMap<String, String> {
        let mut files = BTreeMap::new();
        for repo in &self.repos {
            files.insert(
                repo.key_source_file(),
                repo.key.clone().unwrap_or_default(),
            );
            files.insert(repo.repo_source_file(), repo.repo_file());
        }
        files
    }

    /// Dockerfile instructions fetching, verifying and installing the packages
    pub fn dockerfile_fragment(&mut self, exclusive_arch: &[Arch]) -> Result<String> {
        let pkgs = self.fetch_rpm_packages(exclusive_arch)?.to_vec();

        let mut out = String::from("RUN mkdir -p /tmp/\n");
        for pkg in &pkgs {
            match pkg.checksum {
                Some(ref checksum) => {
                    out.push_str(&format!("#!RemoteAssetUrl: {} sha256:{}\n", pkg.url, checksum))
                }
                None => out.push_str(&format!("#!RemoteAssetUrl: {}\n", pkg.url)),
            }
            out.push_str(&format!("COPY {} /tmp/\n", pkg.filename));
        }

        out.push('\n');
        for repo in &self.repos {
            let key_filename = repo.key_filename();
            out.push_str(&format!("COPY {} /tmp/{}\n", repo.key_source_file(), key_filename));
            out.push_str(&format!("RUN rpm --import /tmp/{}\n", key_filename));
        }
        out.push('\n');

        for arch in exclusive_arch {
            let files: Vec<&str> = pkgs
                .iter()
                .filter(|p| arch.accepts(&p.arch))
                .map(|p| p.filename.as_str())
                .collect();
            if files.is_empty() {
                continue;
            }

            out.push_str(&format!("\nRUN if [ \"$(uname -m)\" = \"{}\" ]; then \\\n", arch));
            out.push_str("        zypper -n install \\\n");
            out.push_str(&format!("            /tmp/{}; \\\n", files.join(" \\\n            /tmp/")));
            out.push_str("    fi");
        }

        out.push_str("\n\n");
        for repo in &self.repos {
            out.push_str(&format!(
                "COPY {} /etc/zypp/repos.d/{}\n",
                repo.repo_source_file(),
                repo.repo_filename()
            ));
        }
        out.push_str("\nRUN rm -rf /tmp/*\n");

        Ok(out)
    }
}

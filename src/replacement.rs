// src/replacement.rs

//! Package version replacements
//!
//! A replacement tells the build service's `replace_using_package_version`
//! source service to substitute a `%%placeholder%%` in a build description
//! with the version of a package at build time.

use crate::error::{Error, Result};
use crate::service::Service;
use crate::version::ParseVersion;

/// Name of the source service performing the substitution
pub const REPLACE_SERVICE_NAME: &str = "replace_using_package_version";

/// A substitution of a placeholder with a package's version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Replacement {
    regex_in_build_description: String,
    package_name: String,
    file_name: Option<String>,
    parse_version: Option<ParseVersion>,
}

/// Whether `regex` contains a placeholder of the form `%%token%%`
fn has_placeholder(regex: &str) -> bool {
    regex
        .find("%%")
        .and_then(|start| {
            let token = &regex[start + 2..];
            token.find("%%")
        })
        .is_some_and(|len| len > 0)
}

impl Replacement {
    /// Create a replacement of `regex_in_build_description` with the version of
    /// `package_name`
    ///
    /// Fails if the regex has no `%%token%%` placeholder or if `file_name`
    /// refers to a README. READMEs are not part of the build description the
    /// substitution service operates on.
    pub fn new(
        regex_in_build_description: impl Into<String>,
        package_name: impl Into<String>,
        file_name: Option<String>,
        parse_version: Option<ParseVersion>,
    ) -> Result<Self> {
        let regex_in_build_description = regex_in_build_description.into();
        let package_name = package_name.into();

        if !has_placeholder(&regex_in_build_description) {
            return Err(Error::InvalidReplacement(format!(
                "regex_in_build_description must be in the form %%foo%%, got '{}'",
                regex_in_build_description
            )));
        }
        if package_name.is_empty() {
            return Err(Error::InvalidReplacement(format!(
                "No package given for {}",
                regex_in_build_description
            )));
        }
        if let Some(ref file_name) = file_name {
            if file_name.to_lowercase().contains("readme") {
                return Err(Error::InvalidReplacement(format!(
                    "Cannot replace variables in {}!",
                    file_name
                )));
            }
        }

        Ok(Self {
            regex_in_build_description,
            package_name,
            file_name,
            parse_version,
        })
    }

    /// Shorthand for a replacement in the default build description
    pub fn in_build_description(
        regex_in_build_description: impl Into<String>,
        package_name: impl Into<String>,
    ) -> Result<Self> {
        Self::new(regex_in_build_description, package_name, None, None)
    }

    pub fn regex_in_build_description(&self) -> &str {
        &self.regex_in_build_description
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    pub fn parse_version(&self) -> Option<ParseVersion> {
        self.parse_version
    }

    /// Convert into a source service directive
    ///
    /// `default_file_name` is used when no file name override is set.
    pub fn to_service(&self, default_file_name: &str) -> Service {
        let mut params = vec![
            (
                "file".to_string(),
                self.file_name
                    .clone()
                    .unwrap_or_else(|| default_file_name.to_string()),
            ),
            (
                "regex".to_string(),
                self.regex_in_build_description.clone(),
            ),
            ("package".to_string(), self.package_name.clone()),
        ];
        if let Some(parse_version) = self.parse_version {
            params.push(("parse-version".to_string(), parse_version.to_string()));
        }

        Service::new(REPLACE_SERVICE_NAME, params)
    }

    /// Reconstruct a replacement from its service directive
    ///
    /// The target file is always explicit in the directive, so the result
    /// carries it as a file name override.
    pub fn from_service(service: &Service) -> Result<Self> {
        if service.name != REPLACE_SERVICE_NAME {
            return Err(Error::InvalidReplacement(format!(
                "Service {} is not a {} service",
                service.name, REPLACE_SERVICE_NAME
            )));
        }
        let required = |name: &str| {
            service.param(name).ok_or_else(|| {
                Error::InvalidReplacement(format!("Service is missing parameter '{}'", name))
            })
        };

        let parse_version = service
            .param("parse-version")
            .map(str::parse::<ParseVersion>)
            .transpose()?;

        Self::new(
            required("regex")?,
            required("package")?,
            Some(required("file")?.to_string()),
            parse_version,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_replacement() {
        let replacement = Replacement::new(
            "%%nginx_version%%",
            "nginx",
            None,
            Some(ParseVersion::Minor),
        )
        .unwrap();

        assert_eq!(replacement.package_name(), "nginx");
        assert_eq!(replacement.file_name(), None);
        assert_eq!(replacement.parse_version(), Some(ParseVersion::Minor));
    }

    #[test]
    fn test_rejects_missing_placeholder() {
        for regex in ["nginx_version", "%%nginx_version", "%%%%", "%nginx%"] {
            assert!(matches!(
                Replacement::in_build_description(regex, "nginx"),
                Err(Error::InvalidReplacement(_))
            ));
        }
    }

    #[test]
    fn test_rejects_readme() {
        for file_name in ["README.md", "readme.txt", "ReadMe", "docs/README.md"] {
            let result = Replacement::new("%%ver%%", "nginx", Some(file_name.to_string()), None);
            assert!(matches!(result, Err(Error::InvalidReplacement(_))));
        }
    }

    #[test]
    fn test_to_service_default_file() {
        let service = Replacement::in_build_description("%%ver%%", "pkgconf")
            .unwrap()
            .to_service("Dockerfile");

        assert_eq!(service.name, REPLACE_SERVICE_NAME);
        assert_eq!(
            service.params,
            vec![
                ("file".to_string(), "Dockerfile".to_string()),
                ("regex".to_string(), "%%ver%%".to_string()),
                ("package".to_string(), "pkgconf".to_string()),
            ]
        );
    }

    #[test]
    fn test_to_service_round_trip() {
        let replacement = Replacement::new(
            "%%pg_version%%",
            "postgresql16",
            Some("postgres.kiwi".to_string()),
            Some(ParseVersion::PatchUpdate),
        )
        .unwrap();

        let service = replacement.to_service("Dockerfile");
        assert_eq!(service.param("file"), Some("postgres.kiwi"));
        assert_eq!(service.param("parse-version"), Some("patch_update"));

        assert_eq!(Replacement::from_service(&service).unwrap(), replacement);
    }

    #[test]
    fn test_from_foreign_service() {
        let service = Service::new("kiwi_metainfo_helper", vec![]);
        assert!(Replacement::from_service(&service).is_err());
    }
}

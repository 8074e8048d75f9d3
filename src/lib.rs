// src/lib.rs

//! BCI build recipe generator
//!
//! Resolves the package versions that go into generated container build
//! descriptions (Dockerfiles and kiwi files).
//!
//! # Architecture
//!
//! - Repository index: `repomd.xml` + `primary.xml` parsed into an
//!   RPM-version-ordered package list with name/arch/version queries
//! - Replacements: `%%placeholder%%` directives emitted as build-time source
//!   services, resolved by the build service
//! - Pinned versions: a JSON store of versions per code stream, refreshed
//!   from the build service on request
//! - Third-party packages: exactly one RPM per target architecture, fetched
//!   from external repositories and embedded into the build context

pub mod arch;
mod error;
pub mod image;
pub mod os_version;
pub mod replacement;
pub mod repository;
pub mod service;
pub mod thirdparty;
pub mod version;
pub mod versions;

pub use error::{Error, Result};

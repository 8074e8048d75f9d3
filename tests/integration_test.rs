// tests/integration_test.rs

//! Integration tests for bci-build
//!
//! These tests verify end-to-end functionality across modules, with the
//! network replaced by an in-memory metadata source.

use bci_build::arch::Arch;
use bci_build::image::{Image, ImageConfig};
use bci_build::os_version::OsVersion;
use bci_build::replacement::Replacement;
use bci_build::repository::repomd::PackageQuery;
use bci_build::repository::{RepoMdParser, StaticSource};
use bci_build::thirdparty::{ThirdPartyPackage, ThirdPartyRepo, ThirdPartyResolver};
use bci_build::version::ParseVersion;
use bci_build::versions::{PackageVersions, VersionUpdater, run_version_update};
use bci_build::Error;
use std::fs;
use std::sync::Arc;

const BASE_URL: &str = "https://download.example.org/repositories/tools/";
const KEY_URL: &str = "https://download.example.org/repositories/tools/repodata/repomd.xml.key";
const API_URL: &str = "https://api.example.org";

const REPOMD: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo" xmlns:rpm="http://linux.duke.edu/metadata/rpm">
  <revision>1718104512</revision>
  <data type="primary">
    <checksum type="sha256">0f3e</checksum>
    <location href="repodata/0f3e-primary.xml.zst"/>
  </data>
</repomd>
"#;

fn primary_xml() -> String {
    let mut packages = String::new();
    for arch in ["x86_64", "aarch64"] {
        for ver in ["1.0.1", "1.0.0", "1.0.2"] {
            packages.push_str(&format!(
                r#"<package type="rpm">
  <name>dummy-pkg-1</name>
  <arch>{arch}</arch>
  <version epoch="0" ver="{ver}" rel="1.1"/>
  <checksum type="sha256" pkgid="YES">c0ffee</checksum>
  <location href="{arch}/dummy-pkg-1-{ver}-1.1.{arch}.rpm"/>
</package>
"#
            ));
        }
    }
    packages.push_str(
        r#"<package type="rpm">
  <name>dummy-data</name>
  <arch>noarch</arch>
  <version ver="2.0" rel="3"/>
  <checksum type="sha256" pkgid="YES">beef</checksum>
  <location href="noarch/dummy-data-2.0-3.noarch.rpm"/>
</package>
"#,
    );

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" packages="7">
{packages}</metadata>
"#
    )
}

fn fake_network() -> StaticSource {
    let primary = zstd::encode_all(primary_xml().as_bytes(), 0).unwrap();
    StaticSource::new()
        .with(format!("{}repodata/repomd.xml", BASE_URL), REPOMD)
        .with(format!("{}repodata/0f3e-primary.xml.zst", BASE_URL), primary)
        .with(KEY_URL, "-----BEGIN PGP PUBLIC KEY BLOCK-----\n")
}

fn source_info(package: &str, version: &str) -> String {
    format!(
        r#"<sourceinfo package="{package}" rev="12" vrev="1" srcmd5="abc">
  <filename>{package}.spec</filename>
  <name>{package}</name>
  <version>{version}</version>
  <release>0</release>
</sourceinfo>
"#
    )
}

#[test]
fn test_repository_query() {
    let mut repo = RepoMdParser::new(BASE_URL, Arc::new(fake_network()));

    let latest = repo
        .query(&PackageQuery::new("dummy-pkg-1").arch("aarch64").latest(true))
        .unwrap();
    assert_eq!(latest.len(), 1, "Exactly one latest aarch64 package");
    assert_eq!(latest[0].evr.version, "1.0.2");
    assert_eq!(
        latest[0].url,
        format!("{}aarch64/dummy-pkg-1-1.0.2-1.1.aarch64.rpm", BASE_URL)
    );

    let missing = repo
        .query(&PackageQuery::new("dummy-pkg-1").arch("ppc64le"))
        .unwrap();
    assert!(missing.is_empty(), "No ppc64le packages in the repository");

    // epoch is optional in primary metadata
    let data = repo.query(&PackageQuery::new("dummy-data")).unwrap();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].evr.epoch, "");
    assert_eq!(repo.packages().len(), 7);
}

#[test]
fn test_third_party_image() {
    let source = Arc::new(fake_network());
    let repo = ThirdPartyRepo::new("tools", BASE_URL).with_key_url(KEY_URL);
    let resolver = ThirdPartyResolver::new(
        vec![repo],
        vec![
            ThirdPartyPackage::new("dummy-pkg-1").with_version("1.0.1"),
            "dummy-data".into(),
        ],
        source,
    )
    .unwrap();

    let config = ImageConfig::new("tools", OsVersion::Tumbleweed)
        .with_exclusive_arch(vec![Arch::X86_64, Arch::Aarch64])
        .with_replacement(
            Replacement::new("%%tools_version%%", "dummy-pkg-1", None, Some(ParseVersion::Minor))
                .unwrap(),
        );
    let mut image = Image::with_third_party(config, resolver).unwrap();

    let fragment = image.third_party_fragment().unwrap().unwrap();
    assert!(fragment.contains("COPY dummy-pkg-1-1.0.1-1.1.x86_64.rpm /tmp/"));
    assert!(fragment.contains("COPY dummy-pkg-1-1.0.1-1.1.aarch64.rpm /tmp/"));
    assert!(fragment.contains(&format!(
        "#!RemoteAssetUrl: {}noarch/dummy-data-2.0-3.noarch.rpm sha256:beef",
        BASE_URL
    )));
    assert!(!fragment.contains("1.0.2"), "Pinned version must win over latest");

    let dir = tempfile::tempdir().unwrap();
    let written = image.write_files(dir.path()).unwrap();
    assert_eq!(written.len(), 3, "_service, key and repo file");

    let repo_file = fs::read_to_string(dir.path().join("tools.repo")).unwrap();
    assert!(repo_file.starts_with("[tools]\n"));
    assert!(repo_file.contains(&format!("baseurl={}\n", BASE_URL)));
    assert!(repo_file.contains(&format!("gpgkey={}\n", KEY_URL)));

    let key = fs::read_to_string(dir.path().join("tools.gpg.key")).unwrap();
    assert!(key.starts_with("-----BEGIN PGP PUBLIC KEY BLOCK-----"));

    let service = fs::read_to_string(dir.path().join("_service")).unwrap();
    assert!(service.contains(r#"<service name="replace_using_package_version" mode="buildtime">"#));
    assert!(service.contains(r#"<param name="parse-version">minor</param>"#));
}

#[test]
fn test_third_party_ambiguous_match() {
    let repo = ThirdPartyRepo::new("tools", BASE_URL).with_key("KEY");
    let mut resolver = ThirdPartyResolver::new(
        vec![repo],
        vec!["dummy-pkg-1".into()],
        Arc::new(fake_network()),
    )
    .unwrap();

    // without latest selection every build of the package matches
    let result =
        resolver.fetch_rpm_package(&ThirdPartyPackage::new("dummy-pkg-1"), &[Arch::X86_64], false);
    assert!(matches!(
        result,
        Err(Error::PackageCount { found: 3, .. })
    ));
}

#[test]
fn test_pinned_version_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("package_versions.json");
    fs::write(
        &store,
        r#"{
    "nginx": {
        "6": "1.21.5",
        "Tumbleweed": "1.25.5"
    },
    "mariadb": {
        "Tumbleweed": "11.4",
        "version_format": "minor"
    }
}
"#,
    )
    .unwrap();

    let info_url = |project: &str, package: &str| {
        format!(
            "{}/public/source/{}/{}?view=info&parse=1",
            API_URL, project, package
        )
    };
    let source = StaticSource::new()
        .with(
            info_url("SUSE:SLE-15-SP6:Update", "nginx"),
            source_info("nginx", "1.21.5"),
        )
        .with(
            info_url("openSUSE:Factory", "nginx"),
            source_info("nginx", "1.27.3"),
        )
        .with(
            info_url("openSUSE:Factory", "mariadb"),
            source_info("mariadb", "11.7.2"),
        );
    let updater = VersionUpdater::new(API_URL, Arc::new(source));

    let refreshed = run_version_update(&store, &updater).unwrap();
    assert_eq!(refreshed.get("nginx", OsVersion::Tumbleweed).unwrap(), "1.27.3");
    assert_eq!(refreshed.get("mariadb", OsVersion::Tumbleweed).unwrap(), "11.7");

    let reloaded = PackageVersions::load(&store).unwrap();
    assert_eq!(reloaded, refreshed, "Store on disk matches the refresh");
    assert_eq!(
        reloaded.version_format("mariadb").unwrap(),
        ParseVersion::Minor
    );
    assert!(matches!(
        reloaded.get("nginx", OsVersion::Sp(7)),
        Err(Error::UntrackedCodeStream { .. })
    ));
}

#[test]
fn test_failed_refresh_keeps_store() {
    let dir = tempfile::tempdir().unwrap();
    let store = dir.path().join("package_versions.json");
    let original = "{\n    \"nginx\": {\n        \"Tumbleweed\": \"1.25.5\"\n    }\n}\n";
    fs::write(&store, original).unwrap();

    let updater = VersionUpdater::new(API_URL, Arc::new(StaticSource::new()));
    assert!(run_version_update(&store, &updater).is_err());

    assert_eq!(
        fs::read_to_string(&store).unwrap(),
        original,
        "Store must be untouched after a failed refresh"
    );
}

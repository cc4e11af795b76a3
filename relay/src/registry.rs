//! Translation package registry.
//!
//! The catalog only needs three operations from a package source: what is
//! installed, what could be installed, and installing one package. The
//! production source is the Argos Translate package index, whose packages
//! are zip archives unpacked into a local directory (one subdirectory per
//! package, each holding a `metadata.json`).

use crate::error::{RelayError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub const DEFAULT_INDEX_URL: &str =
    "https://raw.githubusercontent.com/argosopentech/argospm-index/main/index.json";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct InstalledPackage {
    pub from_code: String,
    pub to_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AvailablePackage {
    pub from_code: String,
    pub to_code: String,
    #[serde(default)]
    pub package_version: Option<String>,
    #[serde(default)]
    pub links: Vec<String>, // download mirrors, first one wins
}

impl AvailablePackage {
    pub fn name(&self) -> String {
        format!("{}->{}", self.from_code, self.to_code)
    }
}

#[async_trait]
pub trait PackageRegistry: Send + Sync {
    async fn list_installed(&self) -> Result<Vec<InstalledPackage>>;

    async fn list_available(&self) -> Result<Vec<AvailablePackage>>;

    async fn install(&self, package: &AvailablePackage) -> Result<()>;
}

/// Where argos-translate keeps packages on this machine.
pub fn default_packages_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from(".local/share"))
        .join("argos-translate")
        .join("packages")
}

pub struct ArgosRegistry {
    packages_dir: PathBuf,
    index_url: String,
    client: reqwest::Client,
}

impl ArgosRegistry {
    pub fn new(packages_dir: PathBuf, index_url: impl Into<String>) -> Self {
        Self {
            packages_dir,
            index_url: index_url.into(),
            client: reqwest::Client::new(),
        }
    }

    pub fn packages_dir(&self) -> &Path {
        &self.packages_dir
    }
}

#[async_trait]
impl PackageRegistry for ArgosRegistry {
    async fn list_installed(&self) -> Result<Vec<InstalledPackage>> {
        let dir = self.packages_dir.clone();
        tokio::task::spawn_blocking(move || read_installed(&dir))
            .await
            .map_err(|e| RelayError::Io(std::io::Error::other(e)))?
    }

    async fn list_available(&self) -> Result<Vec<AvailablePackage>> {
        let response = self
            .client
            .get(&self.index_url)
            .send()
            .await
            .map_err(|e| RelayError::Registry {
                message: format!("cannot fetch {}: {e}", self.index_url),
            })?;
        if !response.status().is_success() {
            return Err(RelayError::Registry {
                message: format!("{} returned status {}", self.index_url, response.status()),
            });
        }
        let packages: Vec<AvailablePackage> =
            response.json().await.map_err(|e| RelayError::Registry {
                message: format!("cannot parse package index: {e}"),
            })?;
        debug!("package index lists {} packages", packages.len());
        Ok(packages)
    }

    async fn install(&self, package: &AvailablePackage) -> Result<()> {
        let install_err = |message: String| RelayError::Install {
            package: package.name(),
            message,
        };
        let link = package
            .links
            .first()
            .ok_or_else(|| install_err("package has no download link".to_string()))?;

        let response = self
            .client
            .get(link)
            .send()
            .await
            .map_err(|e| install_err(format!("download failed: {e}")))?;
        if !response.status().is_success() {
            return Err(install_err(format!(
                "download returned status {}",
                response.status()
            )));
        }
        let archive = response
            .bytes()
            .await
            .map_err(|e| install_err(format!("download interrupted: {e}")))?;

        let dir = self.packages_dir.clone();
        tokio::task::spawn_blocking(move || extract_package(&archive, &dir))
            .await
            .map_err(|e| install_err(e.to_string()))?
            .map_err(|e| install_err(e.to_string()))
    }
}

fn read_installed(dir: &Path) -> Result<Vec<InstalledPackage>> {
    if !dir.exists() {
        return Ok(Vec::new()); // nothing installed yet
    }
    let mut installed = Vec::new();
    for entry in fs::read_dir(dir)? {
        let metadata_path = entry?.path().join("metadata.json");
        if !metadata_path.is_file() {
            continue;
        }
        let parsed = fs::read_to_string(&metadata_path)
            .map_err(RelayError::from)
            .and_then(|text| Ok(serde_json::from_str::<InstalledPackage>(&text)?));
        match parsed {
            Ok(package) => installed.push(package),
            Err(e) => warn!("skipping {}: {}", metadata_path.display(), e),
        }
    }
    Ok(installed)
}

pub(crate) fn extract_package(archive: &[u8], dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir)?;
    let mut zip = zip::ZipArchive::new(Cursor::new(archive)).map_err(std::io::Error::other)?;
    zip.extract(dir).map_err(std::io::Error::other)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_package(root: &Path, name: &str, metadata: &str) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("metadata.json"), metadata).unwrap();
    }

    fn zipped_package(name: &str, from: &str, to: &str) -> Vec<u8> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        let options = zip::write::SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored);
        writer
            .start_file(format!("{name}/metadata.json"), options)
            .unwrap();
        write!(writer, r#"{{"from_code":"{from}","to_code":"{to}"}}"#).unwrap();
        writer.finish().unwrap().into_inner()
    }

    #[tokio::test]
    async fn missing_directory_means_nothing_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ArgosRegistry::new(tmp.path().join("absent"), DEFAULT_INDEX_URL);
        assert!(registry.list_installed().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn lists_packages_with_metadata() {
        let tmp = tempfile::tempdir().unwrap();
        write_package(
            tmp.path(),
            "translate-en_es",
            r#"{"from_code":"en","to_code":"es","package_version":"1.0"}"#,
        );
        write_package(tmp.path(), "broken", "{not json");
        fs::create_dir_all(tmp.path().join("no-metadata")).unwrap();

        let registry = ArgosRegistry::new(tmp.path().to_path_buf(), DEFAULT_INDEX_URL);
        let installed = registry.list_installed().await.unwrap();
        assert_eq!(
            installed,
            vec![InstalledPackage {
                from_code: "en".into(),
                to_code: "es".into(),
            }]
        );
    }

    #[tokio::test]
    async fn extracted_archive_shows_up_as_installed() {
        let tmp = tempfile::tempdir().unwrap();
        let archive = zipped_package("translate-fr_de-1_0", "fr", "de");
        extract_package(&archive, tmp.path()).unwrap();

        let registry = ArgosRegistry::new(tmp.path().to_path_buf(), DEFAULT_INDEX_URL);
        let installed = registry.list_installed().await.unwrap();
        assert_eq!(installed.len(), 1);
        assert_eq!(installed[0].from_code, "fr");
        assert_eq!(installed[0].to_code, "de");
    }

    #[test]
    fn garbage_archive_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        assert!(extract_package(b"definitely not a zip", tmp.path()).is_err());
    }

    #[tokio::test]
    async fn install_without_link_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let registry = ArgosRegistry::new(tmp.path().to_path_buf(), DEFAULT_INDEX_URL);
        let package = AvailablePackage {
            from_code: "en".into(),
            to_code: "pl".into(),
            package_version: None,
            links: Vec::new(),
        };
        let err = registry.install(&package).await.unwrap_err();
        assert!(matches!(err, RelayError::Install { .. }));
    }

    #[test]
    fn parses_index_entries() {
        let index = r#"[{"package_version":"1.9","argos_version":"1.0","from_code":"en",
            "from_name":"English","to_code":"es","to_name":"Spanish",
            "links":["https://example.invalid/en_es.argosmodel"]}]"#;
        let packages: Vec<AvailablePackage> = serde_json::from_str(index).unwrap();
        assert_eq!(packages[0].name(), "en->es");
        assert_eq!(packages[0].package_version.as_deref(), Some("1.9"));
        assert_eq!(packages[0].links.len(), 1);
    }
}

//! Fetching missing source archives from a Python package index.
//!
//! The index's JSON API lists the files of one release. The first sdist
//! in a tar format the extractor understands is downloaded, checked
//! against the index's SHA-256 and stored as
//! `<sources>/<source-name>-<version>.<ext>`.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::info;

use super::collect::tmp_suffix;
use super::source::ARCHIVE_EXTENSIONS;
use crate::error::DownloadError;
use crate::manifest::DependencyEntry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Provides source archives missing from the sources directory.
pub trait SourceFetcher: fmt::Debug + Send + Sync {
    /// Store the source archive of `entry` in `sources_dir` and return its
    /// path.
    fn fetch(&self, entry: &DependencyEntry, sources_dir: &Path) -> Result<PathBuf, DownloadError>;
}

#[derive(Debug, Deserialize)]
struct ReleaseInfo {
    #[serde(default)]
    urls: Vec<ReleaseFile>,
}

#[derive(Debug, Clone, Deserialize)]
struct ReleaseFile {
    filename: String,
    url: String,
    packagetype: String,
    #[serde(default)]
    digests: Digests,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct Digests {
    sha256: Option<String>,
}

/// The sdist to download and the extension it is stored with. Extensions
/// are tried in [`ARCHIVE_EXTENSIONS`] order; zip sdists are not usable.
fn select_sdist(files: &[ReleaseFile]) -> Option<(&ReleaseFile, &'static str)> {
    ARCHIVE_EXTENSIONS.iter().find_map(|ext| {
        files
            .iter()
            .filter(|file| file.packagetype == "sdist")
            .find(|file| file.filename.ends_with(&format!(".{ext}")))
            .map(|file| (file, *ext))
    })
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Check `bytes` against `expected` and write them to `dest` through a
/// temporary file in the same directory.
fn store_verified(
    bytes: &[u8],
    expected: Option<&str>,
    dest: &Path,
    url: &str,
) -> Result<(), DownloadError> {
    if let Some(expected) = expected {
        let actual = sha256_hex(bytes);
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(DownloadError::ChecksumMismatch {
                url: url.to_string(),
                expected: expected.to_string(),
                actual,
            });
        }
    }

    let io_error = |source| DownloadError::Io {
        path: dest.to_path_buf(),
        source,
    };
    let parent = dest.parent().unwrap_or(Path::new("."));
    fs::create_dir_all(parent).map_err(io_error)?;
    let file_name = dest
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = parent.join(format!(".{file_name}.{}", tmp_suffix()));
    fs::write(&tmp, bytes).map_err(io_error)?;
    if let Err(err) = fs::rename(&tmp, dest) {
        let _ = fs::remove_file(&tmp);
        return Err(io_error(err));
    }
    Ok(())
}

/// Downloads sdists from a PyPI-compatible index.
#[derive(Debug, Clone)]
pub struct PypiDownloader {
    index_url: String,
    client: reqwest::blocking::Client,
}

impl PypiDownloader {
    pub fn new(index_url: &str) -> Result<Self, DownloadError> {
        let index_url = index_url.trim_end_matches('/').to_string();
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("dep-builder/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|source| DownloadError::Http {
                url: index_url.clone(),
                source,
            })?;
        Ok(Self { index_url, client })
    }

    /// JSON API URL of the release `entry` builds.
    fn release_url(&self, entry: &DependencyEntry) -> String {
        format!(
            "{}/pypi/{}/{}/json",
            self.index_url,
            entry.pypi_name(),
            entry.version_string()
        )
    }

    fn get(&self, url: &str) -> Result<reqwest::blocking::Response, DownloadError> {
        let http_error = |source| DownloadError::Http {
            url: url.to_string(),
            source,
        };
        self.client
            .get(url)
            .send()
            .and_then(|response| response.error_for_status())
            .map_err(http_error)
    }
}

impl SourceFetcher for PypiDownloader {
    fn fetch(&self, entry: &DependencyEntry, sources_dir: &Path) -> Result<PathBuf, DownloadError> {
        let release_url = self.release_url(entry);
        let release: ReleaseInfo = self
            .get(&release_url)?
            .json()
            .map_err(|source| DownloadError::Http {
                url: release_url.clone(),
                source,
            })?;
        let (file, ext) = select_sdist(&release.urls).ok_or_else(|| DownloadError::NoSdist {
            project: entry.pypi_name(),
            version: entry.version_string().to_string(),
            index: self.index_url.clone(),
        })?;

        info!(entry = %entry.name, url = %file.url, "downloading source");
        let bytes = self
            .get(&file.url)?
            .bytes()
            .map_err(|source| DownloadError::Http {
                url: file.url.clone(),
                source,
            })?;
        let dest = sources_dir.join(format!(
            "{}-{}.{ext}",
            entry.source_name(),
            entry.version_string()
        ));
        store_verified(&bytes, file.digests.sha256.as_deref(), &dest, &file.url)?;
        Ok(dest)
    }
}

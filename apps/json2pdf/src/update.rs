//! Update checker for the render backend.
//!
//! A release manifest (`{"version": "1.2.3", "url": "...", "notes": "..."}`) is
//! compared against the running version and whatever was installed earlier into
//! the backend directory. Newer releases are downloaded and installed atomically.

use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::errors::UpdateError;

const INSTALLED_RECORD: &str = "installed.json";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl FromStr for Version {
    type Err = UpdateError;

    /// `MAJOR.MINOR.PATCH`, optionally prefixed with `v`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || UpdateError::InvalidVersion(s.to_string());
        let trimmed = s.trim();
        let digits = trimmed.strip_prefix('v').unwrap_or(trimmed);

        let mut parts = digits.split('.').map(|p| p.parse::<u32>().map_err(|_| invalid()));
        let (Some(major), Some(minor), Some(patch), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(invalid());
        };

        Ok(Version {
            major: major?,
            minor: minor?,
            patch: patch?,
        })
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseManifest {
    pub version: String,
    pub url: String,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Where releases come from.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    async fn latest(&self) -> Result<ReleaseManifest, UpdateError>;

    async fn fetch(&self, manifest: &ReleaseManifest) -> Result<Bytes, UpdateError>;
}

/// Reads the manifest and artifacts over HTTP(S).
#[derive(Clone)]
pub struct HttpReleaseSource {
    client: Client,
    manifest_url: String,
}

impl HttpReleaseSource {
    pub fn new(manifest_url: String) -> Result<Self, UpdateError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            manifest_url,
        })
    }

    async fn get(&self, url: &str) -> Result<Bytes, UpdateError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(UpdateError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl ReleaseSource for HttpReleaseSource {
    async fn latest(&self) -> Result<ReleaseManifest, UpdateError> {
        let body = self.get(&self.manifest_url).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn fetch(&self, manifest: &ReleaseManifest) -> Result<Bytes, UpdateError> {
        self.get(&manifest.url).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateStatus {
    UpToDate { version: Version },
    Installed { version: Version, path: PathBuf },
}

#[derive(Debug, Serialize, Deserialize)]
struct InstalledRecord {
    version: String,
    artifact: PathBuf,
    installed_at: DateTime<Utc>,
}

pub struct Updater<S: ReleaseSource> {
    source: S,
    backend_dir: PathBuf,
}

impl Updater<HttpReleaseSource> {
    /// Builds the HTTP updater for `-u`. Fails when no manifest URL is configured.
    pub fn from_config(config: &Config) -> Result<Self, UpdateError> {
        let url = config.update_url.clone().ok_or(UpdateError::NotConfigured)?;
        Ok(Self::new(HttpReleaseSource::new(url)?, config.backend_dir.clone()))
    }
}

impl<S: ReleaseSource> Updater<S> {
    pub fn new(source: S, backend_dir: PathBuf) -> Self {
        Self {
            source,
            backend_dir,
        }
    }

    /// Installs the advertised release if it is newer than both `current` and
    /// the last installed release.
    pub async fn update(&self, current: &str) -> Result<UpdateStatus, UpdateError> {
        let current: Version = current.parse()?;
        let baseline = match self.installed_version()? {
            Some(installed) => installed.max(current),
            None => current,
        };

        let manifest = self.source.latest().await?;
        let latest: Version = manifest.version.parse()?;
        debug!(current = %baseline, latest = %latest, "checked release manifest");

        if latest <= baseline {
            info!(version = %baseline, "backend is up to date");
            return Ok(UpdateStatus::UpToDate { version: baseline });
        }

        info!(from = %baseline, to = %latest, "downloading backend update");
        let artifact = self.source.fetch(&manifest).await?;
        let path = self.install(latest, &artifact)?;
        if let Some(notes) = manifest.notes.as_deref() {
            info!(version = %latest, "release notes: {notes}");
        }
        info!(version = %latest, path = %path.display(), bytes = artifact.len(), "backend update installed");

        Ok(UpdateStatus::Installed {
            version: latest,
            path,
        })
    }

    /// [`Updater::update`], abandoned as soon as `shutdown` is cancelled. A
    /// dropped install leaves only its temp file behind, which is removed.
    pub async fn update_until(
        &self,
        current: &str,
        shutdown: &CancellationToken,
    ) -> Result<UpdateStatus, UpdateError> {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                warn!("update check interrupted");
                Err(UpdateError::Interrupted)
            }
            status = self.update(current) => status,
        }
    }

    /// Version recorded by the last successful install, if any.
    pub fn installed_version(&self) -> Result<Option<Version>, UpdateError> {
        let raw = match fs::read(self.backend_dir.join(INSTALLED_RECORD)) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let record: InstalledRecord = serde_json::from_slice(&raw)?;
        Ok(Some(record.version.parse()?))
    }

    fn install(&self, version: Version, artifact: &[u8]) -> Result<PathBuf, UpdateError> {
        fs::create_dir_all(&self.backend_dir)?;

        let path = self.backend_dir.join(format!("json2pdf-backend-{version}"));
        write_atomically(&self.backend_dir, &path, artifact)?;

        let record = InstalledRecord {
            version: version.to_string(),
            artifact: path.clone(),
            installed_at: Utc::now(),
        };
        let record = serde_json::to_vec_pretty(&record)?;
        write_atomically(&self.backend_dir, &self.backend_dir.join(INSTALLED_RECORD), &record)?;

        Ok(path)
    }
}

fn write_atomically(dir: &Path, path: &Path, contents: &[u8]) -> Result<(), UpdateError> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubSource {
        manifest: ReleaseManifest,
        artifact: Bytes,
        fetches: AtomicUsize,
    }

    impl StubSource {
        fn new(version: &str) -> Self {
            Self {
                manifest: ReleaseManifest {
                    version: version.to_string(),
                    url: format!("https://releases.example.com/{version}"),
                    notes: None,
                },
                artifact: Bytes::from_static(b"backend-binary"),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ReleaseSource for StubSource {
        async fn latest(&self) -> Result<ReleaseManifest, UpdateError> {
            Ok(self.manifest.clone())
        }

        async fn fetch(&self, _manifest: &ReleaseManifest) -> Result<Bytes, UpdateError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.artifact.clone())
        }
    }

    fn v(s: &str) -> Version {
        s.parse().unwrap()
    }

    #[test]
    fn test_version_parsing() {
        assert_eq!(v("1.2.3"), Version { major: 1, minor: 2, patch: 3 });
        assert_eq!(v("v0.4.0"), v("0.4.0"));
        for bad in ["1.2", "1.2.3.4", "a.b.c", "", "v", "1..3", "-1.0.0"] {
            assert!(
                matches!(bad.parse::<Version>(), Err(UpdateError::InvalidVersion(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_version_ordering_is_numeric() {
        assert!(v("0.10.0") > v("0.9.9"));
        assert!(v("1.0.0") > v("0.99.99"));
        assert_eq!(v("2.0.1").to_string(), "2.0.1");
    }

    #[tokio::test]
    async fn test_same_version_is_up_to_date() {
        let dir = tempfile::tempdir().unwrap();
        let updater = Updater::new(StubSource::new("0.4.0"), dir.path().to_path_buf());

        let status = updater.update("0.4.0").await.unwrap();
        assert_eq!(status, UpdateStatus::UpToDate { version: v("0.4.0") });
        assert_eq!(updater.source.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_newer_release_is_installed_once() {
        let dir = tempfile::tempdir().unwrap();
        let updater = Updater::new(StubSource::new("v0.5.0"), dir.path().join("backend"));

        let status = updater.update("0.4.0").await.unwrap();
        let UpdateStatus::Installed { version, path } = status else {
            panic!("expected an install, got {status:?}");
        };
        assert_eq!(version, v("0.5.0"));
        assert_eq!(fs::read(&path).unwrap(), b"backend-binary");
        assert_eq!(updater.installed_version().unwrap(), Some(v("0.5.0")));

        // The install is now the baseline.
        let again = updater.update("0.4.0").await.unwrap();
        assert_eq!(again, UpdateStatus::UpToDate { version: v("0.5.0") });
        assert_eq!(updater.source.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_older_release_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let updater = Updater::new(StubSource::new("0.3.9"), dir.path().to_path_buf());
        let status = updater.update("0.4.0").await.unwrap();
        assert_eq!(status, UpdateStatus::UpToDate { version: v("0.4.0") });
        assert!(updater.installed_version().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalid_manifest_version_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let updater = Updater::new(StubSource::new("latest"), dir.path().to_path_buf());
        let err = updater.update("0.4.0").await.unwrap_err();
        assert!(matches!(err, UpdateError::InvalidVersion(v) if v == "latest"));
    }

    #[tokio::test]
    async fn test_cancelled_update_installs_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let updater = Updater::new(StubSource::new("0.5.0"), dir.path().join("backend"));
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let err = updater.update_until("0.4.0", &shutdown).await.unwrap_err();
        assert!(matches!(err, UpdateError::Interrupted));
        assert!(updater.installed_version().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_uncancelled_update_runs_to_completion() {
        let dir = tempfile::tempdir().unwrap();
        let updater = Updater::new(StubSource::new("0.5.0"), dir.path().join("backend"));

        let status = updater.update_until("0.4.0", &CancellationToken::new()).await.unwrap();
        assert!(matches!(status, UpdateStatus::Installed { .. }));
        assert_eq!(updater.source.fetches.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_without_url_is_not_configured() {
        let config = Config::default();
        assert!(matches!(
            Updater::from_config(&config),
            Err(UpdateError::NotConfigured)
        ));
    }

    #[test]
    fn test_manifest_notes_are_optional() {
        let manifest: ReleaseManifest =
            serde_json::from_str(r#"{ "version": "1.0.0", "url": "https://x/y" }"#).unwrap();
        assert_eq!(manifest.notes, None);
    }
}

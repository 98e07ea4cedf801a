//! Protocol implementations of the [`Downloader`](crate::job::Downloader) contract.

mod git;
mod http;

pub use git::GitDownloader;
pub use http::HttpDownloader;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::config::MdmConfig;
use crate::fetch::CurlClient;
use crate::job::{JobKind, Registry};
use crate::retry::RetryPolicy;

/// Settings every downloader shares, taken from [`MdmConfig`].
#[derive(Debug, Clone)]
pub struct DownloadSettings {
    /// Base for outputs given as relative paths, and for derived names.
    pub download_dir: PathBuf,
    pub min_chunk_size: u64,
    pub retry: RetryPolicy,
}

impl DownloadSettings {
    pub fn from_config(config: &MdmConfig) -> Self {
        Self {
            download_dir: config.download_dir.clone().unwrap_or_else(|| PathBuf::from(".")),
            min_chunk_size: config.min_chunk_size,
            retry: config.retry.policy(),
        }
    }

    /// `output` if absolute, else relative to the download directory.
    pub fn resolve(&self, output: &Path) -> PathBuf {
        if output.is_absolute() {
            output.to_path_buf()
        } else {
            self.download_dir.join(output)
        }
    }
}

/// Registry with every built-in protocol, wired to the given configuration.
pub fn standard_registry(config: &MdmConfig) -> Registry {
    let settings = DownloadSettings::from_config(config);
    let client = Arc::new(CurlClient::new(config.http.clone()).with_buffer_size(config.buffer_size));
    let mut registry = Registry::new();
    registry
        .register(JobKind::Http, HttpDownloader::new(client, settings.clone()))
        .register(JobKind::Git, GitDownloader::new(settings));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_registry_covers_every_kind() {
        let registry = standard_registry(&MdmConfig::default());
        for kind in JobKind::ALL {
            assert!(registry.contains(kind), "{} not registered", kind);
        }
    }

    #[test]
    fn resolve_keeps_absolute_paths() {
        let mut cfg = MdmConfig::default();
        cfg.download_dir = Some(PathBuf::from("/srv/dl"));
        let settings = DownloadSettings::from_config(&cfg);
        assert_eq!(settings.resolve(Path::new("/tmp/a.iso")), PathBuf::from("/tmp/a.iso"));
        assert_eq!(settings.resolve(Path::new("isos/a.iso")), PathBuf::from("/srv/dl/isos/a.iso"));
    }
}

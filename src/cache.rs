//! On-disk image cache shared by the session thread and the workers.
//!
//! Entries are keyed by a URL-derived file name. Every write lands in a
//! `temp_` file first and is renamed into place, so a reader never sees a
//! partially written entry.

use crate::providers::{HttpTransport, ProviderError};
use crate::record::ImageRecord;
use crate::utils::{is_image_file, IMAGE_EXTENSIONS};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use walkdir::WalkDir;

const TEMP_PREFIX: &str = "temp_";

#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Download(#[from] ProviderError),

    #[error("empty response body from {url}")]
    Empty { url: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> CacheError + '_ {
    move |source| CacheError::Io {
        path: path.to_path_buf(),
        source,
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub files: usize,
    pub bytes: u64,
}

/// Last path segment of a URL, without query or fragment
fn url_file_name(url: &str) -> Option<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next()?;
    let valid = name.len() >= 3
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    valid.then_some(name)
}

fn url_digest(url: &str) -> String {
    hex::encode(Sha256::digest(url.as_bytes()))
}

/// Cache file name for a URL: short digest plus the URL's own file name, or
/// the full digest when the URL has no usable file name. The digest keeps
/// `/image/x.jpg` and `/thumbnail/x.jpg` apart.
pub fn cache_key(url: &str) -> String {
    let digest = url_digest(url);
    match url_file_name(url) {
        Some(name) => format!("{}-{}", &digest[..8], name),
        None => format!("{}.jpg", &digest[..32]),
    }
}

/// Write via a temp file in the same directory, then rename into place
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), CacheError> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent).map_err(io_error(parent))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let temp = parent.join(format!("{}{}_{}", TEMP_PREFIX, uuid::Uuid::new_v4().simple(), name));

    fs::write(&temp, bytes).map_err(io_error(&temp))?;
    if let Err(source) = fs::rename(&temp, path) {
        let _ = fs::remove_file(&temp);
        return Err(CacheError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

fn is_temp(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(TEMP_PREFIX))
        .unwrap_or(false)
}

pub struct ImageCache {
    dir: PathBuf,
    enabled: bool,
    transport: Arc<dyn HttpTransport>,
}

impl ImageCache {
    pub fn new(dir: PathBuf, enabled: bool, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            dir,
            enabled,
            transport,
        }
    }

    /// Default cache location
    pub fn default_dir() -> PathBuf {
        directories::ProjectDirs::from("com", "pixelvault", "pixelvault")
            .map(|dirs| dirs.cache_dir().join("images"))
            .unwrap_or_else(|| std::env::temp_dir().join("pixelvault").join("images"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Where `url` is (or would be) stored. With caching disabled assets go
    /// to the system temp directory instead.
    pub fn path_for(&self, url: &str) -> PathBuf {
        let key = cache_key(url);
        if self.enabled {
            self.dir.join(key)
        } else {
            std::env::temp_dir().join(format!("pixelvault_temp_{}", key))
        }
    }

    /// Local path holding the bytes of `url`, downloading on a miss.
    /// Bytes that don't decode as an image are still stored.
    pub fn fetch(&self, url: &str) -> Result<PathBuf, CacheError> {
        let path = self.path_for(url);
        if self.enabled && path.exists() {
            debug!(url, "cache hit");
            return Ok(path);
        }

        debug!(url, cached = self.enabled, "cache miss");
        let bytes = self.transport.fetch_bytes(url)?;
        if bytes.is_empty() {
            return Err(CacheError::Empty {
                url: url.to_string(),
            });
        }
        if let Err(e) = image::load_from_memory(&bytes) {
            warn!(url, "not a decodable image, storing raw bytes: {}", e);
        }

        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    /// Download the full-size asset of `record` into `target_dir`, optionally
    /// under a per-source subdirectory. An existing file is left untouched.
    pub fn download(
        &self,
        record: &ImageRecord,
        target_dir: &Path,
        by_source: bool,
    ) -> Result<PathBuf, CacheError> {
        let dir = if by_source {
            target_dir.join(record.source.id())
        } else {
            target_dir.to_path_buf()
        };
        let path = dir.join(download_file_name(record, by_source));
        if path.exists() {
            debug!(path = %path.display(), "already downloaded");
            return Ok(path);
        }

        // Reuse a cached copy of the full-size asset when there is one
        let cached = self.path_for(&record.url);
        let bytes = if self.enabled && cached.exists() {
            fs::read(&cached).map_err(io_error(&cached))?
        } else {
            self.transport.fetch_bytes(&record.url)?
        };
        if bytes.is_empty() {
            return Err(CacheError::Empty {
                url: record.url.clone(),
            });
        }

        write_atomic(&path, &bytes)?;
        Ok(path)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && !is_temp(e.path()))
        {
            stats.files += 1;
            stats.bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
        }
        stats
    }

    /// Remove cached files, skipping writes still in progress.
    /// Returns the number of files removed.
    pub fn clear(&self) -> Result<usize, CacheError> {
        if !self.dir.exists() {
            return Ok(0);
        }
        let mut removed = 0;
        for entry in WalkDir::new(&self.dir)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && !is_temp(e.path()))
        {
            fs::remove_file(entry.path()).map_err(io_error(entry.path()))?;
            removed += 1;
        }
        Ok(removed)
    }
}

/// URL file name when it names an image, else `<source>-<id>.<ext>`
/// File name for a download. In a flat layout the URL's name is prefixed
/// with the source so two providers never share a path.
fn download_file_name(record: &ImageRecord, by_source: bool) -> String {
    if let Some(name) = url_file_name(&record.url) {
        if is_image_file(Path::new(name)) {
            return if by_source {
                name.to_string()
            } else {
                format!("{}-{}", record.source.id(), name)
            };
        }
    }
    let ext = record
        .url
        .split(['?', '#'])
        .next()
        .and_then(|p| p.rsplit('/').next())
        .and_then(|n| n.rsplit_once('.'))
        .map(|(_, ext)| ext.to_lowercase())
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or_else(|| "jpg".to_string());
    let id: String = record
        .id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
        .collect();
    format!("{}-{}.{}", record.source.id(), id, ext)
}

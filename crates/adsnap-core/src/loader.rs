//! Fetching image resources referenced by a banner document.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use thiserror::Error;
use tracing::debug;
use url::Url;

/// Errors raised while fetching a resource.
#[derive(Debug, Error)]
pub enum LoadError {
    /// No loader handles this URL scheme.
    #[error("Unsupported URL scheme {scheme:?} for {url}")]
    UnsupportedScheme { scheme: String, url: String },

    /// The resource does not exist.
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Reading the resource failed.
    #[error("I/O error reading {url}: {reason}")]
    Io { url: String, reason: String },

    /// A `data:` URL whose payload cannot be decoded.
    #[error("Malformed data URL: {0}")]
    MalformedDataUrl(String),
}

/// Standard alphabet, padding optional, as browsers accept in `data:` URLs.
const DATA_URL_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Whether `raw` is a `data:` URL (scheme is case-insensitive).
pub fn is_data_url(raw: &str) -> bool {
    raw.trim_start()
        .get(..5)
        .is_some_and(|scheme| scheme.eq_ignore_ascii_case("data:"))
}

/// Decode the payload of a `data:` URL.
///
/// `;base64` payloads are decoded with ASCII whitespace ignored. Other
/// payloads are returned as written, without percent-decoding.
pub fn decode_data_url(raw: &str) -> Result<Vec<u8>, LoadError> {
    if !is_data_url(raw) {
        return Err(LoadError::MalformedDataUrl("missing data: scheme".into()));
    }
    let (header, payload) = raw.trim_start()[5..]
        .split_once(',')
        .ok_or_else(|| LoadError::MalformedDataUrl("missing ',' separator".into()))?;

    let is_base64 = header
        .rsplit(';')
        .next()
        .is_some_and(|param| param.trim().eq_ignore_ascii_case("base64"));
    if !is_base64 {
        return Ok(payload.as_bytes().to_vec());
    }

    let compact: String = payload
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    DATA_URL_BASE64
        .decode(compact)
        .map_err(|e| LoadError::MalformedDataUrl(e.to_string()))
}

/// Source of bytes for image URLs.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, LoadError>;
}

/// Loads `file:` URLs from the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLoader;

#[async_trait]
impl ResourceLoader for FileLoader {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        if url.scheme() != "file" {
            return Err(LoadError::UnsupportedScheme {
                scheme: url.scheme().to_string(),
                url: url.to_string(),
            });
        }

        let path = url
            .to_file_path()
            .map_err(|_| LoadError::NotFound(url.to_string()))?;
        debug!(path = %path.display(), "reading resource");

        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => LoadError::NotFound(url.to_string()),
            _ => LoadError::Io {
                url: url.to_string(),
                reason: e.to_string(),
            },
        })
    }
}

/// Serves resources from memory, keyed by absolute URL.
#[derive(Debug, Default)]
pub struct MemoryLoader {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `bytes` under `url`, replacing any previous entry.
    pub fn insert(&self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(url.into(), bytes.into());
    }

    pub fn with(self, url: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(url, bytes);
        self
    }
}

#[async_trait]
impl ResourceLoader for MemoryLoader {
    async fn fetch(&self, url: &Url) -> Result<Vec<u8>, LoadError> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(url.as_str())
            .cloned()
            .ok_or_else(|| LoadError::NotFound(url.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_loader_hit_and_miss() {
        let loader = MemoryLoader::new().with("file:///deploy/a/logo.svg", b"<svg/>".to_vec());

        let url = Url::parse("file:///deploy/a/logo.svg").unwrap();
        assert_eq!(loader.fetch(&url).await.unwrap(), b"<svg/>");

        let missing = Url::parse("file:///deploy/a/other.svg").unwrap();
        assert!(matches!(
            loader.fetch(&missing).await,
            Err(LoadError::NotFound(_))
        ));
    }

    #[test]
    fn test_decode_base64_data_url() {
        assert_eq!(
            decode_data_url("data:application/octet-stream;base64,AQID").unwrap(),
            vec![1, 2, 3]
        );
        // unpadded, wrapped, upper-case scheme
        assert_eq!(
            decode_data_url("DATA:text/plain;BASE64,aGk\n").unwrap(),
            b"hi".to_vec()
        );
        assert_eq!(decode_data_url("data:text/plain,abc").unwrap(), b"abc".to_vec());
    }

    #[test]
    fn test_decode_data_url_errors() {
        assert!(matches!(
            decode_data_url("data:image/png;base64"),
            Err(LoadError::MalformedDataUrl(_))
        ));
        assert!(matches!(
            decode_data_url("data:image/png;base64,@@@"),
            Err(LoadError::MalformedDataUrl(_))
        ));
        assert!(matches!(
            decode_data_url("img/a.png"),
            Err(LoadError::MalformedDataUrl(_))
        ));
        assert!(is_data_url("  data:,x"));
        assert!(!is_data_url("dat"));
    }

    #[tokio::test]
    async fn test_file_loader_rejects_http() {
        let url = Url::parse("https://cdn.example.com/a.png").unwrap();
        assert!(matches!(
            FileLoader.fetch(&url).await,
            Err(LoadError::UnsupportedScheme { .. })
        ));
    }

    #[tokio::test]
    async fn test_file_loader_reads_file() {
        let path = std::env::temp_dir().join(format!("adsnap-loader-{}.bin", std::process::id()));
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let url = Url::from_file_path(&path).unwrap();
        assert_eq!(FileLoader.fetch(&url).await.unwrap(), vec![1, 2, 3]);

        std::fs::remove_file(&path).unwrap();
        assert!(matches!(
            FileLoader.fetch(&url).await,
            Err(LoadError::NotFound(_))
        ));
    }
}

//! Fetching dependency payloads from local files or HTTP.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// URI scheme for payloads stored inside the buildpack itself.
pub const FILE_SCHEME: &str = "file://";

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Errors that can occur while opening a payload stream.
#[derive(Error, Debug)]
pub enum TransportError {
    /// A `file://` payload could not be opened.
    #[error("failed to open file {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The HTTP request could not be made.
    #[error("failed to make request to {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// The server answered with a non-success status.
    #[error("failed to download {url}: status code {status}")]
    Status { url: String, status: u16 },

    /// The HTTP client could not be built.
    #[error("failed to create HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Settings shared by every HTTP client this crate builds.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// User agent for HTTP requests.
    pub user_agent: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("jam/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Build a blocking HTTP client from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn build_client(&self) -> Result<reqwest::blocking::Client, TransportError> {
        reqwest::blocking::Client::builder()
            .user_agent(&self.user_agent)
            .timeout(self.timeout)
            .build()
            .map_err(TransportError::Client)
    }
}

/// Opens the byte stream behind a dependency URI.
pub trait Transport {
    /// Open `uri` for reading.
    ///
    /// `file://` URIs resolve against `root`; anything else is fetched
    /// remotely.
    fn fetch(&self, root: &Path, uri: &str) -> Result<Box<dyn Read>, TransportError>;
}

/// [`Transport`] backed by the local filesystem and a blocking HTTP client.
pub struct HttpTransport {
    http_client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Create a transport with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(&ClientConfig::default())
    }

    /// Create a transport with custom configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn with_config(config: &ClientConfig) -> Result<Self, TransportError> {
        Ok(Self {
            http_client: config.build_client()?,
        })
    }
}

impl Transport for HttpTransport {
    fn fetch(&self, root: &Path, uri: &str) -> Result<Box<dyn Read>, TransportError> {
        if let Some(path) = uri.strip_prefix(FILE_SCHEME) {
            let path = root.join(path.trim_start_matches('/'));
            let file = File::open(&path).map_err(|source| TransportError::Open { path, source })?;
            return Ok(Box::new(file));
        }

        tracing::debug!("GET {uri}");
        let response = self
            .http_client
            .get(uri)
            .send()
            .map_err(|source| TransportError::Request {
                url: uri.to_string(),
                source,
            })?;

        if !response.status().is_success() {
            return Err(TransportError::Status {
                url: uri.to_string(),
                status: response.status().as_u16(),
            });
        }

        Ok(Box::new(response))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestServer;
    use std::io::Read;
    use tempfile::TempDir;

    fn read_all(mut reader: Box<dyn Read>) -> String {
        let mut s = String::new();
        reader.read_to_string(&mut s).unwrap();
        s
    }

    #[test]
    fn test_fetch_file_uri_relative_to_root() {
        let root = TempDir::new().unwrap();
        std::fs::create_dir(root.path().join("dependencies")).unwrap();
        std::fs::write(root.path().join("dependencies/some-file"), "some-contents").unwrap();

        let transport = HttpTransport::new().unwrap();
        let reader = transport
            .fetch(root.path(), "file:///dependencies/some-file")
            .unwrap();
        assert_eq!(read_all(reader), "some-contents");
    }

    #[test]
    fn test_fetch_missing_file_fails() {
        let root = TempDir::new().unwrap();
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .fetch(root.path(), "file:///dependencies/missing")
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Open { .. }));
        assert!(err.to_string().starts_with("failed to open file"));
    }

    #[test]
    fn test_fetch_http_uri() {
        let server = TestServer::start(vec![("/some-bundle", 200, b"some-contents".to_vec())]);
        let transport = HttpTransport::new().unwrap();
        let reader = transport
            .fetch(Path::new("/unused"), &format!("{}/some-bundle", server.url))
            .unwrap();
        assert_eq!(read_all(reader), "some-contents");
    }

    #[test]
    fn test_fetch_http_error_status() {
        let server = TestServer::start(vec![]);
        let transport = HttpTransport::new().unwrap();
        let url = format!("{}/missing", server.url);
        let err = transport.fetch(Path::new("/unused"), &url).err().unwrap();
        assert!(matches!(err, TransportError::Status { status: 404, .. }));
        assert!(err.to_string().contains(&url));
    }

    #[test]
    fn test_fetch_unreachable_host_fails() {
        let transport = HttpTransport::new().unwrap();
        let err = transport
            .fetch(Path::new("/unused"), "http://127.0.0.1:1/some-bundle")
            .err()
            .unwrap();
        assert!(matches!(err, TransportError::Request { .. }));
    }
}

use std::{
    fmt::Debug,
    future::Future,
    path::{Path, PathBuf},
};

use bytes::Bytes;

use crate::{config::FetchConfig, error::FetchError};

/// Retrieves the raw bytes behind a feed URL.
pub trait FeedFetcher: Clone + Send + Sync + Debug + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<Bytes, FetchError>> + Send;
}

// ================================================================================================
// HTTP
// ================================================================================================

/// Fetches over HTTP with explicit request and connect timeouts.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &FetchConfig) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .connect_timeout(config.connect_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

impl FeedFetcher for HttpFetcher {
    #[tracing::instrument(skip(self), level = "debug")]
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let request_err = |e: reqwest::Error| {
            if e.is_timeout() {
                FetchError::Timeout {
                    url: url.to_string(),
                }
            } else {
                FetchError::Request {
                    url: url.to_string(),
                    msg: e.to_string(),
                }
            }
        };

        let response = self.client.get(url).send().await.map_err(request_err)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        response.bytes().await.map_err(request_err)
    }
}

// ================================================================================================
// Local Mirror
// ================================================================================================

/// Serves each URL from a local directory by its last path segment.
///
/// Used for offline re-runs against previously downloaded raw files.
#[derive(Debug, Clone)]
pub struct MirrorFetcher {
    root: PathBuf,
}

impl MirrorFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_for(&self, url: &str) -> PathBuf {
        let name = url.rsplit('/').next().unwrap_or(url);
        self.root.join(name)
    }
}

impl FeedFetcher for MirrorFetcher {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        let path = self.path_for(url);
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Bytes::from(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::MissingMirrorFile {
                    url: url.to_string(),
                    path,
                })
            }
            Err(e) => Err(FetchError::Request {
                url: url.to_string(),
                msg: e.to_string(),
            }),
        }
    }
}

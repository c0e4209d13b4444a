//! Core log-client implementation.

use std::time::Duration;

use reqwest::Client as HttpClient;
use serde::Deserialize;

use crate::error::{ClientError, Result};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Response to `get-sth`: the frontend's current signed tree head, with
/// binary fields base64-encoded as on the wire.
#[derive(Debug, Clone, Deserialize)]
pub struct GetSthResponse {
    /// Number of leaves in the tree.
    pub tree_size: u64,
    /// Milliseconds since the UNIX epoch at signing time.
    pub timestamp: u64,
    /// Base64-encoded Merkle root hash.
    pub sha256_root_hash: String,
    /// Base64-encoded `DigitallySigned` blob.
    pub tree_head_signature: String,
}

/// A single leaf returned by `get-entries`.
#[derive(Debug, Clone, Deserialize)]
pub struct LeafEntry {
    /// Base64-encoded `MerkleTreeLeaf` structure.
    pub leaf_input: String,
    /// Base64-encoded auxiliary data (chain, precert, ...).
    pub extra_data: String,
}

/// Response to `get-entries`.
#[derive(Debug, Clone, Deserialize)]
pub struct GetEntriesResponse {
    /// Consecutive leaves starting at the requested index.
    pub entries: Vec<LeafEntry>,
}

/// Async client for a peer node's log frontend.
///
/// Bound to `http://{hostname}:{log_port}` at construction; the endpoint
/// never changes for the lifetime of the client (a peer whose endpoint
/// changes gets a fresh client).
#[derive(Debug, Clone)]
pub struct LogClient {
    base_url: String,
    http: HttpClient,
}

impl LogClient {
    /// Create a client for the log frontend at `hostname:port`.
    ///
    /// An empty hostname or a zero port means the cluster state entry is
    /// corrupt, which is fatal.
    pub fn new(hostname: &str, port: u16) -> Self {
        assert!(!hostname.is_empty(), "peer hostname must not be empty");
        assert!(port > 0, "peer log port must be non-zero");

        // TODO: support https endpoints once frontends can serve them.
        Self {
            base_url: format!("http://{hostname}:{port}"),
            http: HttpClient::builder()
                .timeout(DEFAULT_TIMEOUT)
                .build()
                .expect("http client construction"),
        }
    }

    /// Replace the request timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .expect("http client construction");
        self
    }

    /// The endpoint this client is bound to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the peer's current signed tree head.
    pub async fn get_sth(&self) -> Result<GetSthResponse> {
        self.get("ct/v1/get-sth", &[]).await
    }

    /// Fetch leaves `[start, end]` (inclusive) from the peer.
    pub async fn get_entries(&self, start: u64, end: u64) -> Result<GetEntriesResponse> {
        self.get(
            "ct/v1/get-entries",
            &[("start", start.to_string()), ("end", end.to_string())],
        )
        .await
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = format!("{}/{path}", self.base_url);
        let response = self.http.get(&url).query(query).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                url,
            });
        }

        Ok(response.json().await?)
    }
}

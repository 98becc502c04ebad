//! Minimal JSON-RPC client for the three calls the spammer makes.

use crate::blockhash::{Blockhash, BlockhashParseError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// JSON-RPC client bound to a single endpoint.
///
/// Cloning is cheap: the underlying `reqwest::Client` (and its connection
/// pool) is shared.
#[derive(Clone, Debug)]
pub struct RpcClient {
    base_url: String,
    http: reqwest::Client,
    timeout: Duration,
}

#[derive(Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

/// A JSON-RPC response envelope.
///
/// An `error` member that is present counts as an error even when it is
/// `null` or empty; only an absent member means success.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse<T> {
    pub result: Option<T>,
    #[serde(default, deserialize_with = "present_error")]
    pub error: Option<RpcErrorObject>,
}

fn present_error<'de, D>(deserializer: D) -> Result<Option<RpcErrorObject>, D::Error>
where
    D: Deserializer<'de>,
{
    let error = Option::<RpcErrorObject>::deserialize(deserializer)?;
    Ok(Some(error.unwrap_or_default()))
}

/// The `error` member of a JSON-RPC response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RpcErrorObject {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Raw response to `sendTransaction`.
pub type SubmitResponse = JsonRpcResponse<Value>;

#[derive(Deserialize)]
struct LatestBlockhash {
    value: LatestBlockhashValue,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LatestBlockhashValue {
    blockhash: String,
}

impl RpcClient {
    /// Create a client for `base_url` sharing the given HTTP client.
    pub fn new(base_url: impl Into<String>, http: reqwest::Client, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            http,
            timeout,
        }
    }

    /// The endpoint URL this client talks to.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<JsonRpcResponse<T>, RpcError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params,
        };

        let response = self
            .http
            .post(&self.base_url)
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
            .map_err(RpcError::from_transport)?;

        let body = response.bytes().await.map_err(RpcError::from_transport)?;
        serde_json::from_slice(&body).map_err(RpcError::Decode)
    }

    /// Fetch the most recent blockhash.
    pub async fn get_latest_blockhash(&self) -> Result<Blockhash, RpcError> {
        let response: JsonRpcResponse<LatestBlockhash> =
            self.call("getLatestBlockhash", json!([])).await?;

        if let Some(error) = response.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        let result = response.result.ok_or(RpcError::MissingResult)?;
        Ok(result.value.blockhash.parse()?)
    }

    /// Submit a base58-encoded transaction.
    ///
    /// Application-level rejections come back inside the response, not as an
    /// `Err`; only transport and decoding failures are errors here.
    pub async fn send_transaction(&self, encoded: &str) -> Result<SubmitResponse, RpcError> {
        self.call("sendTransaction", json!([encoded])).await
    }

    /// Check whether the node reports itself healthy.
    pub async fn is_healthy(&self) -> bool {
        match self.call::<Value>("getHealth", json!([])).await {
            Ok(response) => response.error.is_none() && response.result == Some(json!("ok")),
            Err(_) => false,
        }
    }
}

/// Poll `getHealth` on every client until all report healthy or `timeout`
/// elapses. Returns whether they all became healthy.
pub async fn wait_until_healthy(
    clients: &[RpcClient],
    timeout: Duration,
    poll_interval: Duration,
) -> bool {
    let start = std::time::Instant::now();

    while start.elapsed() < timeout {
        let mut all_ready = true;

        for client in clients {
            if !client.is_healthy().await {
                all_ready = false;
                break;
            }
        }

        if all_ready {
            return true;
        }

        tokio::time::sleep(poll_interval).await;
    }

    false
}

/// RPC client errors.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(reqwest::Error),

    #[error("Failed to decode response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("Response carried neither result nor error")]
    MissingResult,

    #[error("Invalid blockhash in response: {0}")]
    InvalidBlockhash(#[from] BlockhashParseError),
}

impl RpcError {
    fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RpcError::Timeout
        } else {
            RpcError::Http(err)
        }
    }
}

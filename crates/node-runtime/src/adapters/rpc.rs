//! # JSON-RPC Client
//!
//! Minimal Ethereum JSON-RPC over HTTP. One client per endpoint; every
//! call gets a fresh request id.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use shared_types::{Amount, ChainReadError, SubmitError};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::trace;

/// Provider code for "request limit exceeded".
pub const RATE_LIMITED_CODE: i64 = -32005;

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("transport: {0}")]
    Transport(String),

    #[error("http status {0}")]
    Status(u16),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("decode: {0}")]
    Decode(String),
}

impl RpcError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, RpcError::Status(429))
            || matches!(self, RpcError::Rpc { code, .. } if *code == RATE_LIMITED_CODE)
    }
}

impl From<RpcError> for ChainReadError {
    fn from(e: RpcError) -> Self {
        ChainReadError::Rpc(e.to_string())
    }
}

impl From<RpcError> for SubmitError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Rpc { message, .. } => SubmitError::Rejected(message),
            other => SubmitError::Rpc(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    method: &'a str,
    params: Value,
    id: u64,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorBody>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorBody {
    code: i64,
    message: String,
}

#[derive(Clone, Debug)]
pub struct JsonRpcClient {
    http: reqwest::Client,
    url: String,
    next_id: Arc<AtomicU64>,
}

impl JsonRpcClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, RpcError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .build()
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Raw `result`. A JSON `null` result is returned as `Value::Null`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };
        trace!(method, id, url = %self.url, "[rpc] request");

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RpcError::Transport(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(RpcError::Status(status.as_u16()));
        }
        let body: JsonRpcResponse = response
            .json()
            .await
            .map_err(|e| RpcError::Decode(e.to_string()))?;

        if let Some(error) = body.error {
            return Err(RpcError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        Ok(body.result.unwrap_or(Value::Null))
    }

    pub async fn call_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> Result<T, RpcError> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| RpcError::Decode(format!("{method}: {e}")))
    }
}

// =============================================================================
// QUANTITY ENCODING
// =============================================================================

/// `0x`-prefixed minimal hex, as JSON-RPC expects quantities.
pub fn to_quantity(value: u64) -> String {
    format!("{value:#x}")
}

pub fn amount_to_quantity(value: Amount) -> String {
    format!("{value:#x}")
}

pub fn parse_quantity(raw: &str) -> Result<u64, RpcError> {
    let digits = strip_0x(raw)?;
    if digits.is_empty() {
        return Ok(0);
    }
    u64::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("{raw}: {e}")))
}

pub fn parse_amount_quantity(raw: &str) -> Result<Amount, RpcError> {
    let digits = strip_0x(raw)?;
    if digits.is_empty() {
        return Ok(Amount::zero());
    }
    Amount::from_str_radix(digits, 16).map_err(|e| RpcError::Decode(format!("{raw}: {e:?}")))
}

pub fn parse_bytes(raw: &str) -> Result<Vec<u8>, RpcError> {
    hex::decode(strip_0x(raw)?).map_err(|e| RpcError::Decode(format!("{raw}: {e}")))
}

fn strip_0x(raw: &str) -> Result<&str, RpcError> {
    raw.strip_prefix("0x")
        .ok_or_else(|| RpcError::Decode(format!("{raw}: missing 0x prefix")))
}

//! HTTP client for Circle's Iris attestation API.
//!
//! `GET {base}/v1/attestations/{0xmessageHash}` answers
//! `{"status": "complete" | "pending_confirmations", "attestation": "0x.." }`.
//! A 404 means the attestor has not seen the message yet.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use shared_types::MessageHash;
use std::time::Duration;

use crate::domain::errors::{AttestationError, RelayError};
use crate::domain::state::AttestationResponse;
use crate::ports::outbound::AttestationService;

#[derive(Debug, Deserialize)]
struct IrisBody {
    status: Option<String>,
    attestation: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IrisClient {
    http: reqwest::Client,
    base_url: String,
}

impl IrisClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, RelayError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RelayError::InvalidConfiguration(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn url_for(&self, message_hash: &MessageHash) -> String {
        format!("{}/v1/attestations/{}", self.base_url, message_hash)
    }
}

/// Interpret one Iris reply.
pub fn parse_response(status: u16, body: &str) -> Result<AttestationResponse, AttestationError> {
    if status == StatusCode::NOT_FOUND.as_u16() {
        return Ok(AttestationResponse::Pending);
    }
    if !(200..300).contains(&status) {
        return Err(AttestationError::Status(status));
    }
    let body: IrisBody =
        serde_json::from_str(body).map_err(|e| AttestationError::Malformed(e.to_string()))?;
    if body.status.as_deref() != Some("complete") {
        return Ok(AttestationResponse::Pending);
    }
    let encoded = body
        .attestation
        .filter(|a| a != "PENDING")
        .ok_or_else(|| AttestationError::Malformed("complete without attestation".into()))?;
    let attestation = hex::decode(encoded.trim_start_matches("0x"))
        .map_err(|e| AttestationError::Malformed(format!("attestation hex: {e}")))?;
    if attestation.is_empty() {
        return Err(AttestationError::Malformed("empty attestation".into()));
    }
    Ok(AttestationResponse::Complete { attestation })
}

#[async_trait]
impl AttestationService for IrisClient {
    async fn fetch(
        &self,
        message_hash: &MessageHash,
    ) -> Result<AttestationResponse, AttestationError> {
        let response = self
            .http
            .get(self.url_for(message_hash))
            .send()
            .await
            .map_err(|e| AttestationError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| AttestationError::Http(e.to_string()))?;
        parse_response(status, &body)
    }
}

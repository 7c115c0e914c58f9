//! Client for the claim service's `POST /api/claim`.

use crate::config::Network;
use crate::error::ReclaimError;
use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use log::debug;
use serde::{Deserialize, Serialize};
use solana_sdk::transaction::Transaction;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClaimRequest {
    pub wallet: String,
    /// Lamports.
    pub amount: u64,
    pub network: Network,
}

#[derive(Debug, Deserialize)]
struct ClaimResponse {
    transaction: String,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClaimService: Send + Sync {
    /// The base64 encoded unsigned transaction prepared by the service.
    async fn request_claim(&self, request: &ClaimRequest) -> Result<String, ReclaimError>;
}

pub struct HttpClaimService {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpClaimService {
    pub fn new(base_url: &str) -> Result<Self, ReclaimError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ReclaimError::ClaimRequestFailed(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: format!("{}/api/claim", base_url.trim_end_matches('/')),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ClaimService for HttpClaimService {
    async fn request_claim(&self, request: &ClaimRequest) -> Result<String, ReclaimError> {
        debug!("POST {} for {}", self.endpoint, request.wallet);
        let response = self
            .client
            .post(&self.endpoint)
            .json(request)
            .send()
            .await
            .map_err(|e| ReclaimError::ClaimRequestFailed(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ReclaimError::ClaimRequestFailed(format!(
                "claim service returned {}",
                response.status()
            )));
        }

        let body: ClaimResponse = response
            .json()
            .await
            .map_err(|e| ReclaimError::ClaimRequestFailed(e.to_string()))?;
        Ok(body.transaction)
    }
}

pub fn decode_transaction(encoded: &str) -> Result<Transaction, ReclaimError> {
    let bytes = BASE64_STANDARD
        .decode(encoded)
        .map_err(|e| ReclaimError::ClaimRequestFailed(format!("invalid base64 transaction: {}", e)))?;
    bincode::deserialize(&bytes)
        .map_err(|e| ReclaimError::ClaimRequestFailed(format!("invalid transaction: {}", e)))
}

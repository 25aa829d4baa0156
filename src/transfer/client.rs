//! HTTP client for the transfer endpoints, used by device-side tooling to
//! push a profile up and pull it down on another device.

use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::models::Profile;
use crate::transfer::code::normalize_code;

#[derive(Debug, Error)]
pub enum TransferClientError {
    #[error("transfer code is too short")]
    CodeTooShort,
    #[error("transfer request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("transfer service rejected the request ({status}): {message}")]
    Rejected { status: StatusCode, message: String },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedTransfer {
    pub code: String,
    pub expires_at: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RedeemResponse {
    profile_data: Profile,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

pub struct TransferClient {
    http: reqwest::Client,
    base_url: String,
}

impl TransferClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Uploads a profile snapshot and returns the code to read out loud.
    pub async fn create_code(&self, profile: &Profile) -> Result<CreatedTransfer, TransferClientError> {
        let url = format!("{}/api/transfer/create", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "profileData": profile }))
            .send()
            .await?;
        Self::parse(response).await
    }

    /// Redeems a code typed in on the receiving device. Input is normalized
    /// the same way the server normalizes it, so obviously-too-short codes
    /// never leave the device.
    pub async fn redeem_code(&self, code: &str) -> Result<Profile, TransferClientError> {
        let code = normalize_code(code).ok_or(TransferClientError::CodeTooShort)?;
        let url = format!("{}/api/transfer/redeem", self.base_url);
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({ "code": code }))
            .send()
            .await?;
        let body: RedeemResponse = Self::parse(response).await?;
        Ok(body.profile_data)
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, TransferClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        let message = response
            .json::<ErrorBody>()
            .await
            .map(|body| body.error)
            .unwrap_or_else(|_| status.to_string());
        Err(TransferClientError::Rejected { status, message })
    }
}

//! Google ID-token verification for "Sign in with Google".

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::warn;

const TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

#[derive(Debug, thiserror::Error)]
pub enum GoogleAuthError {
    #[error("google sign-in is not configured")]
    NotConfigured,
    #[error("google verification unavailable: {0}")]
    Request(String),
    #[error("{0}")]
    Rejected(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoogleProfile {
    pub email: String,
    pub name: Option<String>,
    pub picture: Option<String>,
}

#[async_trait]
pub trait GoogleVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<GoogleProfile, GoogleAuthError>;
}

#[derive(Deserialize)]
struct TokenInfo {
    aud: String,
    email: Option<String>,
    // tokeninfo renders booleans as strings
    email_verified: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

pub struct HttpGoogleVerifier {
    client: reqwest::Client,
    client_id: Option<String>,
}

impl HttpGoogleVerifier {
    pub fn new(client_id: Option<String>) -> Result<Self, GoogleAuthError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| GoogleAuthError::Request(e.to_string()))?;
        Ok(Self { client, client_id })
    }
}

#[async_trait]
impl GoogleVerifier for HttpGoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<GoogleProfile, GoogleAuthError> {
        let client_id = self.client_id.as_deref().ok_or(GoogleAuthError::NotConfigured)?;
        let resp = self
            .client
            .get(TOKENINFO_URL)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "google tokeninfo request failed");
                GoogleAuthError::Request(e.to_string())
            })?;

        let status = resp.status();
        if status.is_client_error() {
            return Err(GoogleAuthError::Rejected("invalid google token".into()));
        }
        if !status.is_success() {
            warn!(%status, "google tokeninfo returned an error");
            return Err(GoogleAuthError::Request(format!("tokeninfo status {status}")));
        }
        let info: TokenInfo = resp.json().await.map_err(|e| GoogleAuthError::Request(e.to_string()))?;
        profile_from(info, client_id)
    }
}

fn profile_from(info: TokenInfo, client_id: &str) -> Result<GoogleProfile, GoogleAuthError> {
    if info.aud != client_id {
        return Err(GoogleAuthError::Rejected("google token issued for another client".into()));
    }
    if info.email_verified.as_deref() != Some("true") {
        return Err(GoogleAuthError::Rejected("google email is not verified".into()));
    }
    let email = info
        .email
        .ok_or_else(|| GoogleAuthError::Rejected("google token carries no email".into()))?;
    Ok(GoogleProfile { email, name: info.name, picture: info.picture })
}

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::config::GoogleConfig;

const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_INFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";
const SCOPES: &str = "openid email profile";

/// Profile attributes taken from a verified Google ID token.
#[derive(Debug, Clone, Deserialize)]
pub struct GoogleProfile {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub picture: String,
    #[serde(default)]
    pub aud: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("token rejected by identity provider")]
    Rejected,
    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}

/// The external identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn consent_url(&self, state: &str) -> anyhow::Result<String>;
    async fn verify_id_token(&self, token: &str) -> Result<GoogleProfile, ProviderError>;
}

pub struct GoogleClient {
    http: reqwest::Client,
    client_id: Option<String>,
    redirect_url: Option<String>,
}

impl GoogleClient {
    pub fn new(cfg: &GoogleConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id: cfg.client_id.clone(),
            redirect_url: cfg.redirect_url.clone(),
        }
    }
}

#[async_trait]
impl IdentityProvider for GoogleClient {
    fn consent_url(&self, state: &str) -> anyhow::Result<String> {
        let client_id = self
            .client_id
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("GOOGLE_CLIENT_ID is not configured"))?;
        let mut params = vec![
            ("client_id", client_id),
            ("response_type", "code"),
            ("scope", SCOPES),
            ("access_type", "online"),
            ("state", state),
        ];
        if let Some(redirect) = self.redirect_url.as_deref() {
            params.push(("redirect_uri", redirect));
        }
        Ok(Url::parse_with_params(AUTH_URL, &params)?.to_string())
    }

    async fn verify_id_token(&self, token: &str) -> Result<GoogleProfile, ProviderError> {
        let resp = self
            .http
            .get(TOKEN_INFO_URL)
            .query(&[("id_token", token)])
            .send()
            .await
            .map_err(|e| ProviderError::Upstream(e.into()))?;

        if !resp.status().is_success() {
            debug!(status = %resp.status(), "tokeninfo refused token");
            return Err(ProviderError::Rejected);
        }

        let profile: GoogleProfile = resp
            .json()
            .await
            .map_err(|e| ProviderError::Upstream(e.into()))?;

        if let Some(expected) = self.client_id.as_deref() {
            if profile.aud.as_deref() != Some(expected) {
                warn!(aud = ?profile.aud, "id token issued for another client");
                return Err(ProviderError::Rejected);
            }
        }
        Ok(profile)
    }
}

/// Accepts any token that looks like an email address and treats it as the
/// account's email.
#[cfg(test)]
pub struct FakeIdentity;

#[cfg(test)]
#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn consent_url(&self, state: &str) -> anyhow::Result<String> {
        Ok(format!("{AUTH_URL}?client_id=test&state={state}"))
    }

    async fn verify_id_token(&self, token: &str) -> Result<GoogleProfile, ProviderError> {
        let (name, _) = token.split_once('@').ok_or(ProviderError::Rejected)?;
        Ok(GoogleProfile {
            email: token.to_string(),
            name: name.to_string(),
            picture: format!("https://img.example/{name}.png"),
            aud: None,
        })
    }
}

//! Credential providers
//!
//! Spreadsheet access is authorized with OAuth bearer tokens. A
//! [`ServiceAccountCredentials`] provider mints them from a service account
//! key file using the JWT bearer grant; [`StaticToken`] hands out a fixed
//! token for tests and pre-authorized environments.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dataflow_core::{CredentialProvider, EtlError, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::client::HttpClient;
use crate::error::{ensure_success, network_error};

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Tokens are refreshed this long before they expire.
const REFRESH_MARGIN_SECS: i64 = 60;

// ===== Static Token =====

#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl CredentialProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

// ===== Service Account =====

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// The fields of a service account key file this provider needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: String,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

pub struct ServiceAccountCredentials {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    scopes: Vec<String>,
    http: HttpClient,
    cached: Mutex<Option<CachedToken>>,
}

impl std::fmt::Debug for ServiceAccountCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceAccountCredentials")
            .field("client_email", &self.key.client_email)
            .field("scopes", &self.scopes)
            .finish()
    }
}

impl ServiceAccountCredentials {
    pub fn from_file(path: impl AsRef<Path>, scopes: Vec<String>, http: HttpClient) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => EtlError::NotFound(format!(
                "Service account key {} not found",
                path.display()
            )),
            _ => EtlError::Io(format!("Reading {}: {}", path.display(), e)),
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&raw).map_err(|e| {
            EtlError::Configuration(format!("Malformed service account key: {}", e))
        })?;

        Self::from_key(key, scopes, http)
    }

    pub fn from_key(key: ServiceAccountKey, scopes: Vec<String>, http: HttpClient) -> Result<Self> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| EtlError::Configuration(format!("Invalid service account private key: {}", e)))?;

        Ok(Self {
            key,
            encoding_key,
            scopes,
            http,
            cached: Mutex::new(None),
        })
    }

    pub fn client_email(&self) -> &str {
        &self.key.client_email
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String> {
        let claims = AssertionClaims {
            iss: &self.key.client_email,
            scope: self.scopes.join(" "),
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };

        let mut header = Header::new(Algorithm::RS256);
        header.kid = self.key.private_key_id.clone();

        encode(&header, &claims, &self.encoding_key)
            .map_err(|e| EtlError::Configuration(format!("Failed to sign token assertion: {}", e)))
    }

    async fn exchange(&self) -> Result<CachedToken> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;

        let response = self
            .http
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| network_error("Token endpoint", e))?;

        let response = ensure_success("Token endpoint", response).await?;
        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| network_error("Token endpoint", e))?;

        let lifetime = token.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS);
        info!(
            "Obtained access token for {} (expires in {}s)",
            self.key.client_email, lifetime
        );

        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + ChronoDuration::seconds(lifetime),
        })
    }
}

#[async_trait]
impl CredentialProvider for ServiceAccountCredentials {
    async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            if token.expires_at - ChronoDuration::seconds(REFRESH_MARGIN_SECS) > Utc::now() {
                debug!("Reusing cached access token");
                return Ok(token.token.clone());
            }
        }

        let fresh = self.exchange().await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_token() {
        let provider = StaticToken::new("abc");
        assert_eq!(provider.access_token().await.unwrap(), "abc");
    }

    #[test]
    fn test_missing_key_file_is_not_found() {
        let http = HttpClient::new(Default::default()).unwrap();
        let result = ServiceAccountCredentials::from_file("/nonexistent/key.json", vec![], http);
        assert!(matches!(result, Err(EtlError::NotFound(_))));
    }

    #[test]
    fn test_key_defaults_token_uri() {
        let key: ServiceAccountKey = serde_json::from_str(
            r#"{"client_email": "etl@example.iam.gserviceaccount.com", "private_key": "x"}"#,
        )
        .unwrap();
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }
}

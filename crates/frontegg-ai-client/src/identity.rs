//! End-user token verification.
//!
//! [`FronteggIdentityVerifier`] fetches the account's RSA public key from the
//! identity service once, then verifies RS256 end-user JWTs locally.

use std::sync::Arc;

use async_trait::async_trait;
use frontegg_ai_common::{TokenKind, VerifiedToken};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use log::{debug, error, warn};
use secrecy::ExposeSecret;
use serde::Deserialize;
use tokio::sync::OnceCell;

use crate::credentials::CredentialManager;
use crate::error::{ClientError, Result};

const USER_TOKEN_TYPE: &str = "userToken";
const VENDOR_TOKEN_HEADER: &str = "x-access-token";

/// Verifies end-user tokens.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    /// Verify `token` and extract its claims.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Verification`] for invalid, expired or foreign tokens.
    async fn validate_token(&self, token: &str) -> Result<VerifiedToken>;
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityClaims {
    #[serde(rename = "type", default)]
    token_type: Option<String>,
    sub: String,
    #[serde(default)]
    tenant_id: Option<String>,
    #[serde(default)]
    tenant_ids: Option<Vec<String>>,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
    #[serde(default)]
    permissions: Option<Vec<String>>,
    #[serde(default)]
    profile_picture_url: Option<String>,
}

impl IdentityClaims {
    fn into_verified(self) -> Result<VerifiedToken> {
        let kind = if self.token_type.as_deref() == Some(USER_TOKEN_TYPE) {
            TokenKind::User
        } else {
            TokenKind::Machine
        };
        let tenant_id = self
            .tenant_id
            .ok_or_else(|| ClientError::Verification("token has no tenantId claim".to_string()))?;

        Ok(VerifiedToken {
            kind,
            sub: self.sub,
            tenant_id,
            tenant_ids: self.tenant_ids,
            name: self.name,
            email: self.email,
            roles: self.roles,
            permissions: self.permissions,
            profile_picture_url: self.profile_picture_url,
        })
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    public_key: String,
}

/// Verifies tokens against the Frontegg identity service.
pub struct FronteggIdentityVerifier {
    http: reqwest::Client,
    identity_url: String,
    credentials: Arc<CredentialManager>,
    key: OnceCell<DecodingKey>,
}

impl std::fmt::Debug for FronteggIdentityVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FronteggIdentityVerifier")
            .field("identity_url", &self.identity_url)
            .field("key_loaded", &self.key.initialized())
            .finish_non_exhaustive()
    }
}

impl FronteggIdentityVerifier {
    /// Verifier for the identity service at `identity_url` (`{api}/identity`).
    ///
    /// The public key request is authenticated with the vendor token held by
    /// `credentials`.
    pub fn new(
        http: reqwest::Client,
        identity_url: impl Into<String>,
        credentials: Arc<CredentialManager>,
    ) -> Self {
        Self {
            http,
            identity_url: identity_url.into(),
            credentials,
            key: OnceCell::new(),
        }
    }

    fn public_key_url(&self) -> String {
        format!(
            "{}/resources/configurations/v1",
            self.identity_url.trim_end_matches('/')
        )
    }

    async fn fetch_key(&self) -> Result<DecodingKey> {
        self.credentials.ensure_fresh().await?;
        let token = self
            .credentials
            .current_token()
            .await
            .ok_or(ClientError::MissingCredential)?;

        let url = self.public_key_url();
        debug!("Fetching identity public key from {url}");
        let response = self
            .http
            .get(&url)
            .header(VENDOR_TOKEN_HEADER, token.expose_secret())
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            error!(
                "Identity public key request failed with status {}: {text}",
                status.as_u16()
            );
            return Err(ClientError::Http {
                status: status.as_u16(),
                body: text,
            });
        }

        let body: PublicKeyResponse = serde_json::from_str(&text)?;
        DecodingKey::from_rsa_pem(body.public_key.as_bytes()).map_err(|e| {
            ClientError::InvalidResponse(format!("identity public key is not a valid RSA PEM: {e}"))
        })
    }

    async fn decoding_key(&self) -> Result<&DecodingKey> {
        self.key.get_or_try_init(|| self.fetch_key()).await
    }
}

#[async_trait]
impl IdentityVerifier for FronteggIdentityVerifier {
    async fn validate_token(&self, token: &str) -> Result<VerifiedToken> {
        let key = self.decoding_key().await.map_err(|e| {
            warn!("Identity public key unavailable: {e}");
            ClientError::Verification(format!("public key unavailable: {e}"))
        })?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;

        let data = decode::<IdentityClaims>(token, key, &validation)
            .map_err(|e| ClientError::Verification(e.to_string()))?;
        data.claims.into_verified()
    }
}

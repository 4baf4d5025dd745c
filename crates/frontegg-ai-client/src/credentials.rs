//! Vendor token issuance and caching.
//!
//! The [`CredentialManager`] owns the single service credential of a client. It is
//! refreshed lazily: [`CredentialManager::ensure_fresh`] issues a new token only when
//! none is cached or the cached one has expired.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use log::{debug, error, info};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{ClientError, Result};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Clock frozen at `start`.
    #[must_use]
    pub const fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = TimeDelta::from_std(by).unwrap_or(TimeDelta::MAX);
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now = now.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A service bearer token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct Credential {
    /// Bearer token sent as `authorization`.
    pub token: SecretString,
    /// Instant the issuer said the token stops being valid.
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IssueRequest<'a> {
    client_id: &'a str,
    secret: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct IssueResponse {
    token: String,
    expires_in: i64,
}

/// Issues and caches the vendor token.
pub struct CredentialManager {
    http: reqwest::Client,
    issuance_url: String,
    client_id: String,
    client_secret: SecretString,
    skew: TimeDelta,
    clock: Arc<dyn Clock>,
    credential: RwLock<Option<Credential>>,
}

impl std::fmt::Debug for CredentialManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialManager")
            .field("issuance_url", &self.issuance_url)
            .field("client_id", &self.client_id)
            .field("skew", &self.skew)
            .finish_non_exhaustive()
    }
}

impl CredentialManager {
    /// Create a manager that issues tokens from `issuance_url`.
    pub fn new(
        http: reqwest::Client,
        issuance_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            http,
            issuance_url: issuance_url.into(),
            client_id: client_id.into(),
            client_secret,
            skew: TimeDelta::zero(),
            clock,
            credential: RwLock::new(None),
        }
    }

    /// Treat credentials as expired `skew` before their actual expiry.
    #[must_use]
    pub fn with_skew(mut self, skew: Duration) -> Self {
        self.skew = TimeDelta::from_std(skew).unwrap_or(TimeDelta::MAX);
        self
    }

    /// Whether `credential` can still be used at the clock's current time.
    fn is_usable(&self, credential: &Credential) -> bool {
        let deadline = credential
            .expires_at
            .checked_sub_signed(self.skew)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        self.clock.now() < deadline
    }

    /// Whether a usable credential is cached.
    pub async fn is_fresh(&self) -> bool {
        self.credential
            .read()
            .await
            .as_ref()
            .is_some_and(|c| self.is_usable(c))
    }

    /// Issue a new token if none is cached or the cached one has expired.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Authentication`] if issuance is rejected and
    /// [`ClientError::Network`] if the issuance endpoint cannot be reached.
    pub async fn ensure_fresh(&self) -> Result<()> {
        if self.is_fresh().await {
            return Ok(());
        }
        debug!("Service credential missing or expired, issuing a new one");
        self.issue().await
    }

    /// Issue a new token unconditionally and replace the cached one.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Authentication`] on a non-success status or an
    /// unparsable body, [`ClientError::Network`] on transport failure.
    pub async fn issue(&self) -> Result<()> {
        let body = IssueRequest {
            client_id: &self.client_id,
            secret: self.client_secret.expose_secret(),
        };

        let response = self
            .http
            .post(&self.issuance_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                error!("Vendor token request to {} failed: {e}", self.issuance_url);
                ClientError::Network(e)
            })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            error!(
                "Vendor token issuance failed with status {}: {text}",
                status.as_u16()
            );
            return Err(ClientError::Authentication {
                status: status.as_u16(),
                body: text,
            });
        }

        let parsed: IssueResponse = serde_json::from_str(&text).map_err(|e| {
            error!("Vendor token response could not be parsed: {e}");
            ClientError::Authentication {
                status: status.as_u16(),
                body: text.clone(),
            }
        })?;

        let issued_at = self.clock.now();
        let expires_at = issued_at
            .checked_add_signed(TimeDelta::try_seconds(parsed.expires_in).unwrap_or(TimeDelta::MAX))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        *self.credential.write().await = Some(Credential {
            token: SecretString::new(parsed.token.into()),
            expires_at,
        });
        info!(
            "Issued service credential valid for {}s (expires at {expires_at})",
            parsed.expires_in
        );
        Ok(())
    }

    /// The cached token, whether or not it is still fresh.
    pub async fn current_token(&self) -> Option<SecretString> {
        self.credential
            .read()
            .await
            .as_ref()
            .map(|c| c.token.clone())
    }

    /// The cached credential.
    pub async fn current(&self) -> Option<Credential> {
        self.credential.read().await.clone()
    }

    /// Clock used for expiry decisions.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }
}

//! Token Types
//!
//! Token record and credential definitions.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;

use crate::core::clock::{checked_after, saturating_after};

/// Lifetime assumed when the provider omits `expires_in`.
pub const DEFAULT_TOKEN_TTL_SECS: u64 = 3600;

/// Token response from the provider token endpoint.
#[derive(Clone, Debug, Deserialize)]
pub struct TokenResponse {
    /// Access token.
    pub access_token: String,
    /// Token type (usually "Bearer").
    #[serde(default = "default_token_type")]
    pub token_type: String,
    /// Expires in seconds.
    #[serde(default)]
    pub expires_in: Option<u64>,
    /// Refresh token.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Granted scopes (space-delimited).
    #[serde(default)]
    pub scope: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Credentials held for one principal.
///
/// Records are immutable: a refresh produces a new record that replaces the
/// cached one.
#[derive(Clone)]
pub struct TokenRecord {
    access_credential: SecretString,
    refresh_credential: Option<SecretString>,
    /// Token type used in the Authorization header.
    pub token_type: String,
    /// When the provider issued the token.
    pub issued_at: DateTime<Utc>,
    /// When the access credential stops being accepted.
    pub expires_at: DateTime<Utc>,
    /// Granted permissions.
    pub scope_set: BTreeSet<String>,
}

impl TokenRecord {
    /// Create a bearer record valid for `ttl` from `issued_at`.
    pub fn new(access_credential: impl Into<String>, issued_at: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            access_credential: SecretString::new(access_credential.into()),
            refresh_credential: None,
            token_type: default_token_type(),
            issued_at,
            expires_at: saturating_after(issued_at, ttl),
            scope_set: BTreeSet::new(),
        }
    }

    /// Build a record from a token endpoint response.
    ///
    /// When the response carries no `scope`, the requested scopes are assumed
    /// to have been granted.
    pub fn from_response(
        response: TokenResponse,
        issued_at: DateTime<Utc>,
        requested_scopes: &[String],
    ) -> Self {
        let ttl = Duration::from_secs(response.expires_in.unwrap_or(DEFAULT_TOKEN_TTL_SECS));

        let scope_set = match response.scope.as_deref() {
            Some(scope) => scope.split_whitespace().map(String::from).collect(),
            None => requested_scopes.iter().cloned().collect(),
        };

        Self {
            access_credential: SecretString::new(response.access_token),
            refresh_credential: response.refresh_token.map(SecretString::new),
            token_type: response.token_type,
            issued_at,
            expires_at: saturating_after(issued_at, ttl),
            scope_set,
        }
    }

    /// Attach a refresh credential.
    pub fn with_refresh_credential(mut self, refresh_credential: impl Into<String>) -> Self {
        self.refresh_credential = Some(SecretString::new(refresh_credential.into()));
        self
    }

    /// Keep `fallback` when the provider did not rotate the refresh credential.
    pub fn or_refresh_credential(mut self, fallback: &str) -> Self {
        if self.refresh_credential.is_none() {
            self.refresh_credential = Some(SecretString::new(fallback.to_string()));
        }
        self
    }

    /// Replace the granted scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scope_set = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Move the expiry to `expires_at`.
    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = expires_at;
        self
    }

    /// Access credential value.
    pub fn access_credential(&self) -> &str {
        self.access_credential.expose_secret()
    }

    /// Refresh credential value, if the provider issued one.
    pub fn refresh_credential(&self) -> Option<&str> {
        self.refresh_credential
            .as_ref()
            .map(|secret| secret.expose_secret().as_str())
    }

    /// Check if the record can be renewed without user interaction.
    pub fn has_refresh_credential(&self) -> bool {
        self.refresh_credential.is_some()
    }

    /// Check if the access credential is still good for `margin` after `now`.
    pub fn is_usable_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        checked_after(now, margin).is_some_and(|deadline| self.expires_at > deadline)
    }

    /// Check if the access credential has expired.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Remaining lifetime at `now`.
    pub fn remaining_lifetime(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_at - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Credential handed to callers.
    pub fn to_credential(&self) -> AccessCredential {
        AccessCredential {
            value: self.access_credential.clone(),
            token_type: self.token_type.clone(),
            expires_at: self.expires_at,
        }
    }
}

impl std::fmt::Debug for TokenRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRecord")
            .field("access_credential", &"[REDACTED]")
            .field(
                "refresh_credential",
                &self.refresh_credential.as_ref().map(|_| "[REDACTED]"),
            )
            .field("token_type", &self.token_type)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .field("scope_set", &self.scope_set)
            .finish()
    }
}

/// Access credential wrapper for safe handling.
#[derive(Clone)]
pub struct AccessCredential {
    value: SecretString,
    /// Token type.
    pub token_type: String,
    /// Expiration time.
    pub expires_at: DateTime<Utc>,
}

impl AccessCredential {
    /// Get token value.
    pub fn secret(&self) -> &str {
        self.value.expose_secret()
    }

    /// Format as Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.value.expose_secret())
    }
}

impl std::fmt::Debug for AccessCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessCredential")
            .field("value", &"[REDACTED]")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Outcome of asking for a usable credential.
#[derive(Clone, Debug)]
pub enum CredentialStatus {
    /// Credential ready for an outbound call.
    Usable(AccessCredential),
    /// The principal must go through authorization again.
    NeedsInteractiveAuth,
}

impl CredentialStatus {
    /// Get the credential, if usable.
    pub fn credential(&self) -> Option<&AccessCredential> {
        match self {
            Self::Usable(credential) => Some(credential),
            Self::NeedsInteractiveAuth => None,
        }
    }

    pub fn is_usable(&self) -> bool {
        matches!(self, Self::Usable(_))
    }
}

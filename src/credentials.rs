//! Channel token issuance.
//!
//! The control plane embeds a subscriber token in each materialized
//! configuration and hands publisher tokens to callers. The issuance
//! algorithm is opaque to the rest of the crate; [`SignedTokenIssuer`]
//! is the bundled implementation.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{AppError, Result};

/// Access role bound into a channel token.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TokenRole {
    /// May send media into the channel.
    Publisher,
    /// May only receive media.
    Subscriber,
}

impl TokenRole {
    fn code(self) -> u8 {
        match self {
            Self::Publisher => 1,
            Self::Subscriber => 2,
        }
    }
}

/// Issues channel access tokens.
pub trait CredentialIssuer: Send + Sync {
    /// Identifier of the application the tokens belong to.
    fn app_id(&self) -> &str;

    /// Issue a token for `uid` on `channel_name`, valid for `expiry_seconds`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credential` if the token cannot be built.
    fn issue_token(
        &self,
        channel_name: &str,
        uid: u32,
        role: TokenRole,
        expiry_seconds: u32,
    ) -> Result<String>;
}

/// Tokens signed with the app certificate.
///
/// Without a certificate the app id itself is returned, which channels
/// running in testing mode accept.
#[derive(Debug, Clone)]
pub struct SignedTokenIssuer {
    app_id: String,
    app_certificate: String,
}

impl SignedTokenIssuer {
    /// Build an issuer for an app.
    #[must_use]
    pub fn new(app_id: impl Into<String>, app_certificate: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            app_certificate: app_certificate.into(),
        }
    }

    /// Deterministic token for an absolute expiry time.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Credential` when `channel_name` is empty.
    pub fn sign(
        &self,
        channel_name: &str,
        uid: u32,
        role: TokenRole,
        expires_at: i64,
    ) -> Result<String> {
        if channel_name.is_empty() {
            return Err(AppError::Credential("channel name is empty".into()));
        }
        if self.app_certificate.is_empty() {
            return Ok(self.app_id.clone());
        }

        let mut hasher = Sha256::new();
        hasher.update(self.app_certificate.as_bytes());
        hasher.update(self.app_id.as_bytes());
        hasher.update(channel_name.as_bytes());
        hasher.update(uid.to_be_bytes());
        hasher.update([role.code()]);
        hasher.update(expires_at.to_be_bytes());
        let signature = hasher.finalize();

        Ok(format!(
            "007{}.{}.{uid:x}.{expires_at:x}.{signature:x}",
            self.app_id,
            role.code()
        ))
    }
}

impl CredentialIssuer for SignedTokenIssuer {
    fn app_id(&self) -> &str {
        &self.app_id
    }

    fn issue_token(
        &self,
        channel_name: &str,
        uid: u32,
        role: TokenRole,
        expiry_seconds: u32,
    ) -> Result<String> {
        let expires_at = Utc::now().timestamp() + i64::from(expiry_seconds);
        self.sign(channel_name, uid, role, expires_at)
    }
}

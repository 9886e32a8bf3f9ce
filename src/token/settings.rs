use super::errors::ConfigurationError;
use crate::binder::Settings;
use serde::{Deserialize, Serialize};
use std::fmt;
use zeroize::Zeroize;

/// Signing settings for [`TokenIssuer`](super::TokenIssuer), bound from the `Jwt` section.
///
/// ```text
/// Jwt:Key            = <shared secret>
/// Jwt:Issuer         = https://auth.example.org
/// Jwt:Audience       = api
/// Jwt:ExpiryMinutes  = 30
/// ```
///
/// All fields default to empty or zero, so a section missing any of them fails
/// [`JwtSettings::validate`]. The settings are zeroized on drop and the key is
/// redacted from `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize, Zeroize)]
#[zeroize(drop)]
pub struct JwtSettings {
    /// Shared HMAC secret.
    pub key: String,
    /// Value of the `iss` claim.
    pub issuer: String,
    /// Value of the `aud` claim.
    pub audience: String,
    /// Token lifetime in minutes.
    pub expiry_minutes: i64,
}

impl Settings for JwtSettings {
    const SECTION: Option<&'static str> = Some("Jwt");
}

impl fmt::Debug for JwtSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JwtSettings")
            .field("key", &if self.key.is_empty() { "<empty>" } else { "<redacted>" })
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("expiry_minutes", &self.expiry_minutes)
            .finish()
    }
}

impl JwtSettings {
    /// Checks that the settings can sign a token.
    ///
    /// Issuer and audience are only required to be non-empty.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigurationError`] found, checking the key first.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.key.is_empty() {
            return Err(ConfigurationError::MissingSigningKey);
        }
        if self.issuer.is_empty() {
            return Err(ConfigurationError::MissingIssuer);
        }
        if self.audience.is_empty() {
            return Err(ConfigurationError::MissingAudience);
        }
        if self.expiry_minutes <= 0 {
            return Err(ConfigurationError::InvalidExpiry(self.expiry_minutes));
        }
        Ok(())
    }

    /// Returns the token lifetime in seconds.
    pub fn expires_in_seconds(&self) -> i64 {
        self.expiry_minutes.saturating_mul(60)
    }
}

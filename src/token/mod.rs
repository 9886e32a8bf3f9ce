//! Signed bearer tokens.
//!
//! [`TokenIssuer`] signs HS256 JWTs from a principal and a [`JwtSettings`] snapshot.
//! The issuer has no freshness policy of its own: whether a rotated key is used
//! immediately, at the next operation or only after a restart depends on which
//! settings tier it is given.
//!
//! ```
//! use std::sync::Arc;
//! use tiered_settings::source::MemorySource;
//! use tiered_settings::token::{JwtSettings, PrincipalClaims, TokenIssuer};
//! use tiered_settings::{Binder, OptionsCache};
//!
//! let source = Arc::new(MemorySource::default());
//! source.set("Jwt:Key", "secret");
//! source.set("Jwt:Issuer", "https://auth.example.org");
//! source.set("Jwt:Audience", "api");
//! source.set("Jwt:ExpiryMinutes", 15i64);
//!
//! let cache = OptionsCache::<JwtSettings>::new(Binder::new(source));
//! let principal = PrincipalClaims::new("user-42").with_email("ada@example.org");
//!
//! let token = TokenIssuer::new().issue_from(&principal, &cache)?;
//! assert_eq!(token.expires_in_seconds(), 900);
//! # Ok::<(), tiered_settings::token::TokenError>(())
//! ```

mod errors;
mod settings;

pub use errors::{ConfigurationError, TokenError};
pub use settings::JwtSettings;

use crate::options::SettingsSource;
use crate::prelude::debug;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;
use zeroize::Zeroize;

/// Identity of the token subject.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrincipalClaims {
    /// Subject identifier, the `sub` claim.
    pub subject: String,
    /// The `email` claim.
    pub email: String,
    /// The `given_name` claim.
    pub given_name: String,
    /// The `family_name` claim.
    pub family_name: String,
}

impl PrincipalClaims {
    /// Creates claims for `subject` with empty profile fields.
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            ..Self::default()
        }
    }

    /// Sets the email.
    #[must_use]
    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    /// Sets the given and family name.
    #[must_use]
    pub fn with_name(mut self, given: impl Into<String>, family: impl Into<String>) -> Self {
        self.given_name = given.into();
        self.family_name = family.into();
        self
    }
}

/// The claim set carried by an issued token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject.
    pub sub: String,
    /// Email of the subject.
    pub email: String,
    /// Given name of the subject.
    pub given_name: String,
    /// Family name of the subject.
    pub family_name: String,
    /// Unique token identifier (random UUID v4).
    pub jti: String,
    /// Issuer, copied from the settings.
    pub iss: String,
    /// Audience, copied from the settings.
    pub aud: String,
    /// Issued at, seconds since the Unix epoch.
    pub iat: i64,
    /// Not before, seconds since the Unix epoch.
    pub nbf: i64,
    /// Expiration, seconds since the Unix epoch.
    pub exp: i64,
}

#[derive(Clone, PartialEq, Eq, Zeroize)]
#[zeroize(drop)]
struct Token {
    inner: String,
}

/// A signed token and its lifetime.
///
/// The serialized token is zeroized on drop and omitted from `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct IssuedToken {
    token: Token,
    token_id: String,
    expires_at: OffsetDateTime,
    expires_in_seconds: i64,
}

impl fmt::Debug for IssuedToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssuedToken")
            .field("token", &"<redacted>")
            .field("token_id", &self.token_id)
            .field("expires_at", &self.expires_at)
            .field("expires_in_seconds", &self.expires_in_seconds)
            .finish()
    }
}

impl IssuedToken {
    /// Returns the compact JWS serialization.
    pub fn token(&self) -> &str {
        &self.token.inner
    }

    /// Returns the `jti` claim.
    pub fn token_id(&self) -> &str {
        &self.token_id
    }

    /// Returns the `exp` claim as a timestamp.
    pub fn expires_at(&self) -> OffsetDateTime {
        self.expires_at
    }

    /// Returns the token lifetime in seconds.
    pub fn expires_in_seconds(&self) -> i64 {
        self.expires_in_seconds
    }
}

/// Issues HS256-signed JWTs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenIssuer {
    _private: (),
}

impl TokenIssuer {
    /// Creates a token issuer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues a token for `principal`, valid from now.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Configuration`] if `settings` cannot sign a token and
    /// [`TokenError::Signing`] if encoding fails.
    pub fn issue(
        &self,
        principal: &PrincipalClaims,
        settings: &JwtSettings,
    ) -> Result<IssuedToken, TokenError> {
        self.issue_at(principal, settings, OffsetDateTime::now_utc())
    }

    /// Issues a token for `principal`, valid from `now`.
    ///
    /// # Errors
    ///
    /// See [`TokenIssuer::issue`].
    pub fn issue_at(
        &self,
        principal: &PrincipalClaims,
        settings: &JwtSettings,
        now: OffsetDateTime,
    ) -> Result<IssuedToken, TokenError> {
        settings.validate()?;

        let expires_in_seconds = settings.expires_in_seconds();
        let expires_at = now
            .checked_add(Duration::seconds(expires_in_seconds))
            .ok_or(ConfigurationError::InvalidExpiry(settings.expiry_minutes))?;
        let claims = TokenClaims {
            sub: principal.subject.clone(),
            email: principal.email.clone(),
            given_name: principal.given_name.clone(),
            family_name: principal.family_name.clone(),
            jti: Uuid::new_v4().to_string(),
            iss: settings.issuer.clone(),
            aud: settings.audience.clone(),
            iat: now.unix_timestamp(),
            nbf: now.unix_timestamp(),
            exp: expires_at.unix_timestamp(),
        };

        let key = EncodingKey::from_secret(settings.key.as_bytes());
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &key)?;
        debug!(
            "Token issued: jti={}, exp={}, expires_in_seconds={}",
            claims.jti, claims.exp, expires_in_seconds
        );

        Ok(IssuedToken {
            token: Token { inner: token },
            token_id: claims.jti,
            expires_at,
            expires_in_seconds,
        })
    }

    /// Resolves the signing settings from `source`, then issues a token.
    ///
    /// # Errors
    ///
    /// Returns [`TokenError::Settings`] if the source cannot provide settings, and
    /// otherwise the errors of [`TokenIssuer::issue`].
    pub fn issue_from<S>(
        &self,
        principal: &PrincipalClaims,
        source: &S,
    ) -> Result<IssuedToken, TokenError>
    where
        S: SettingsSource<Item = JwtSettings>,
    {
        let settings = source
            .settings()
            .map_err(|e| TokenError::Settings(Box::new(e)))?;
        self.issue(principal, &settings)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use jsonwebtoken::{DecodingKey, Validation};
    use std::collections::HashSet;

    fn settings(minutes: i64) -> JwtSettings {
        JwtSettings {
            key: "k1".to_owned(),
            issuer: "https://auth.example.org".to_owned(),
            audience: "api".to_owned(),
            expiry_minutes: minutes,
        }
    }

    fn principal() -> PrincipalClaims {
        PrincipalClaims::new("user-42")
            .with_email("ada@example.org")
            .with_name("Ada", "Lovelace")
    }

    fn decode(token: &str, key: &str) -> TokenClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["api"]);
        validation.set_issuer(&["https://auth.example.org"]);
        jsonwebtoken::decode::<TokenClaims>(
            token,
            &DecodingKey::from_secret(key.as_bytes()),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn test_expiry_is_relative_to_now() {
        let now = OffsetDateTime::now_utc();
        let issued = TokenIssuer::new()
            .issue_at(&principal(), &settings(30), now)
            .unwrap();

        assert_eq!(issued.expires_in_seconds(), 1800);
        let claims = decode(issued.token(), "k1");
        assert_eq!(claims.exp, now.unix_timestamp() + 1800);
        assert_eq!(claims.iat, now.unix_timestamp());
        assert_eq!(claims.nbf, now.unix_timestamp());
        assert_eq!(issued.expires_at().unix_timestamp(), claims.exp);
    }

    #[test]
    fn test_claims_are_stamped() {
        let issued = TokenIssuer::new().issue(&principal(), &settings(5)).unwrap();
        let claims = decode(issued.token(), "k1");

        assert_eq!(claims.sub, "user-42");
        assert_eq!(claims.email, "ada@example.org");
        assert_eq!(claims.given_name, "Ada");
        assert_eq!(claims.family_name, "Lovelace");
        assert_eq!(claims.iss, "https://auth.example.org");
        assert_eq!(claims.aud, "api");
        assert_eq!(claims.jti, issued.token_id());
        assert!(Uuid::parse_str(&claims.jti).is_ok());
    }

    #[test]
    fn test_empty_key_issues_nothing() {
        let mut s = settings(30);
        s.key.clear();
        let err = TokenIssuer::new().issue(&principal(), &s).unwrap_err();
        assert!(matches!(
            err,
            TokenError::Configuration(ConfigurationError::MissingSigningKey)
        ));
    }

    #[test]
    fn test_non_positive_expiry_is_rejected() {
        let err = TokenIssuer::new()
            .issue(&principal(), &settings(-1))
            .unwrap_err();
        assert!(matches!(
            err,
            TokenError::Configuration(ConfigurationError::InvalidExpiry(-1))
        ));
    }

    #[test]
    fn test_token_ids_are_unique() {
        let issuer = TokenIssuer::new();
        let ids: HashSet<String> = (0..64)
            .map(|_| {
                issuer
                    .issue(&principal(), &settings(1))
                    .unwrap()
                    .token_id()
                    .to_owned()
            })
            .collect();
        assert_eq!(ids.len(), 64);
    }

    #[test]
    fn test_wrong_key_fails_verification() {
        let issued = TokenIssuer::new().issue(&principal(), &settings(5)).unwrap();
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_audience(&["api"]);
        assert!(jsonwebtoken::decode::<TokenClaims>(
            issued.token(),
            &DecodingKey::from_secret(b"k2"),
            &validation,
        )
        .is_err());
    }

    #[test]
    fn test_debug_redacts_token() {
        let issued = TokenIssuer::new().issue(&principal(), &settings(5)).unwrap();
        let out = format!("{issued:?}");
        assert!(!out.contains(issued.token()));
    }
}

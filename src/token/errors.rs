use thiserror::Error;

/// A required signing setting is missing or invalid.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// The signing key is empty.
    #[error("signing key is not configured")]
    MissingSigningKey,

    /// The issuer is empty.
    #[error("token issuer is not configured")]
    MissingIssuer,

    /// The audience is empty.
    #[error("token audience is not configured")]
    MissingAudience,

    /// The expiry is zero or negative.
    #[error("token expiry must be positive (expiry_minutes={0})")]
    InvalidExpiry(i64),
}

/// Errors that can arise issuing a token.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum TokenError {
    /// The signing settings are not usable; no token was signed.
    #[error("invalid signing settings")]
    Configuration(#[from] ConfigurationError),

    /// Error returned by the JWT encoding library.
    #[error("cannot sign token")]
    Signing(#[from] jsonwebtoken::errors::Error),

    /// Error returned by the settings source while resolving the signing settings.
    #[error("settings source error")]
    Settings(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl From<std::convert::Infallible> for TokenError {
    fn from(never: std::convert::Infallible) -> Self {
        match never {}
    }
}

//! Signed session tokens (compact JWS, HS256).

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use thiserror::Error;

use crate::claims::{ClaimsError, validate_claims};
use crate::{Identity, SessionClaims};

/// The only signing algorithm issued or accepted.
pub const ALGORITHM: Algorithm = Algorithm::HS256;

/// Default validity window of an issued token.
pub const DEFAULT_TTL_HOURS: i64 = 72;

/// Longest validity window a token may be configured with (one year).
pub const MAX_TTL_HOURS: i64 = 24 * 366;

const RECOMMENDED_SECRET_LEN: usize = 32;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    MalformedToken,

    #[error("invalid token signature")]
    InvalidSignature,

    #[error("token has expired")]
    Expired,

    #[error("invalid token configuration: {0}")]
    Configuration(String),

    #[error("failed to sign token: {0}")]
    Signing(String),
}

impl From<ClaimsError> for TokenError {
    fn from(value: ClaimsError) -> Self {
        match value {
            ClaimsError::Expired => TokenError::Expired,
            ClaimsError::InvalidTimeWindow => TokenError::MalformedToken,
        }
    }
}

fn map_decode_error(err: jsonwebtoken::errors::Error) -> TokenError {
    match err.kind() {
        ErrorKind::InvalidSignature | ErrorKind::InvalidAlgorithm => TokenError::InvalidSignature,
        ErrorKind::ExpiredSignature => TokenError::Expired,
        _ => TokenError::MalformedToken,
    }
}

/// Signing secret and token lifetime, fixed at startup.
#[derive(Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub ttl: Duration,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn validate(&self) -> Result<(), TokenError> {
        if self.secret.is_empty() {
            return Err(TokenError::Configuration("signing secret is empty".into()));
        }
        if self.ttl <= Duration::zero() {
            return Err(TokenError::Configuration("token ttl must be positive".into()));
        }
        if self.ttl > Duration::hours(MAX_TTL_HOURS) {
            return Err(TokenError::Configuration(format!(
                "token ttl must not exceed {MAX_TTL_HOURS} hours"
            )));
        }
        if self.secret.len() < RECOMMENDED_SECRET_LEN {
            tracing::warn!(
                len = self.secret.len(),
                "token signing secret is shorter than {RECOMMENDED_SECRET_LEN} bytes"
            );
        }
        Ok(())
    }
}

impl core::fmt::Debug for TokenConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenConfig")
            .field("secret", &"<redacted>")
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// Issues and validates session tokens.
///
/// Holds only the keys derived from the configured secret; clones share them.
#[derive(Clone)]
pub struct TokenService {
    ttl: Duration,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl TokenService {
    pub fn new(config: TokenConfig) -> Result<Self, TokenError> {
        config.validate()?;

        let secret = config.secret.as_bytes();

        // Expiry is checked by `validate_claims` against the caller's clock;
        // the library only has to insist that `exp` is present.
        let mut validation = Validation::new(ALGORITHM);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Ok(Self {
            ttl: config.ttl,
            encoding_key: Arc::new(EncodingKey::from_secret(secret)),
            decoding_key: Arc::new(DecodingKey::from_secret(secret)),
            validation: Arc::new(validation),
        })
    }

    /// Mint a token for `identity`, valid from `now` for the configured TTL.
    pub fn issue(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String, TokenError> {
        let claims = SessionClaims::for_identity(identity, now, self.ttl)
            .map_err(|e| TokenError::Configuration(e.to_string()))?;
        self.issue_claims(&claims)
    }

    /// Sign an explicit claim set.
    pub fn issue_claims(&self, claims: &SessionClaims) -> Result<String, TokenError> {
        encode(&Header::new(ALGORITHM), claims, &self.encoding_key)
            .map_err(|e| TokenError::Signing(e.to_string()))
    }

    /// Verify structure, signature and expiry, returning the decoded claims.
    pub fn validate(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims, TokenError> {
        let data = decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .map_err(map_decode_error)?;
        validate_claims(&data.claims, now)?;
        Ok(data.claims)
    }
}

impl core::fmt::Debug for TokenService {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TokenService")
            .field("algorithm", &ALGORITHM)
            .field("ttl", &self.ttl)
            .finish()
    }
}

/// One-shot issuance with an explicit secret and TTL.
pub fn issue_token(
    identity: &Identity,
    secret: &str,
    ttl: Duration,
    now: DateTime<Utc>,
) -> Result<String, TokenError> {
    TokenService::new(TokenConfig::new(secret).with_ttl(ttl))?.issue(identity, now)
}

/// One-shot validation with an explicit secret.
pub fn validate_token(
    token: &str,
    secret: &str,
    now: DateTime<Utc>,
) -> Result<SessionClaims, TokenError> {
    TokenService::new(TokenConfig::new(secret))?.validate(token, now)
}

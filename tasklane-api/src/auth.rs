//! Authentication Module
//!
//! Credential hashing, JWT issuance and validation, and activation tokens.
//! Write routes authenticate with `Authorization: Bearer <jwt>`; the token
//! carries the user id and email that handlers act on.

use crate::constants::{
    ACTIVATION_TOKEN_BYTES, DEFAULT_BCRYPT_COST, DEFAULT_JWT_EXPIRATION_SECS,
    DEFAULT_JWT_LEEWAY_SECS, INSECURE_DEFAULT_SECRET, MAX_BCRYPT_COST, MIN_BCRYPT_COST,
    MIN_JWT_SECRET_LENGTH,
};
use crate::error::{ApiError, ApiResult};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tasklane_core::{ConfigError, UserError, UserId};

// ============================================================================
// CLOCK ABSTRACTION
// ============================================================================

/// Clock abstraction for JWT time validation.
///
/// Time checks are done here rather than inside `jsonwebtoken`, so tests can
/// pin the clock.
pub trait JwtClock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl JwtClock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl JwtClock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// JWT SECRET (TYPE-SAFE)
// ============================================================================

/// Signing secret that never shows up in logs.
#[derive(Clone)]
pub struct JwtSecret(SecretString);

impl JwtSecret {
    /// # Errors
    /// Returns error if the secret is empty.
    pub fn new(secret: String) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::MissingRequired {
                field: "jwt_secret".to_string(),
            });
        }
        Ok(Self(SecretString::new(secret.into())))
    }

    /// Expose the secret value (only for cryptographic operations).
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    pub fn len(&self) -> usize {
        self.0.expose_secret().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.expose_secret().is_empty()
    }

    pub fn is_insecure_default(&self) -> bool {
        self.0.expose_secret() == INSECURE_DEFAULT_SECRET
    }
}

impl std::fmt::Debug for JwtSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JwtSecret([REDACTED, {} chars])", self.len())
    }
}

fn build_jwt_secret(secret_str: Option<String>) -> JwtSecret {
    let normalized = secret_str
        .filter(|s| !s.trim().is_empty())
        .unwrap_or_else(|| INSECURE_DEFAULT_SECRET.to_string());
    JwtSecret::new(normalized)
        .unwrap_or_else(|_| JwtSecret(SecretString::new(INSECURE_DEFAULT_SECRET.into())))
}

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Authentication configuration.
#[derive(Clone)]
pub struct AuthConfig {
    /// JWT secret key for signing and verification
    pub jwt_secret: JwtSecret,

    /// JWT algorithm (HS256)
    pub jwt_algorithm: Algorithm,

    /// JWT token lifetime in seconds (default: 4 hours)
    pub jwt_expiration_secs: i64,

    /// Clock skew tolerated on `exp`
    pub jwt_leeway_secs: i64,

    /// bcrypt work factor for stored passwords
    pub bcrypt_cost: u32,

    /// Clock for JWT time validation (injected for testing)
    pub clock: Arc<dyn JwtClock>,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &self.jwt_secret)
            .field("jwt_algorithm", &self.jwt_algorithm)
            .field("jwt_expiration_secs", &self.jwt_expiration_secs)
            .field("jwt_leeway_secs", &self.jwt_leeway_secs)
            .field("bcrypt_cost", &self.bcrypt_cost)
            .field("clock", &"<JwtClock>")
            .finish()
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: build_jwt_secret(None),
            jwt_algorithm: Algorithm::HS256,
            jwt_expiration_secs: DEFAULT_JWT_EXPIRATION_SECS,
            jwt_leeway_secs: DEFAULT_JWT_LEEWAY_SECS,
            bcrypt_cost: DEFAULT_BCRYPT_COST,
            clock: Arc::new(SystemClock),
        }
    }
}

impl AuthConfig {
    /// # Environment Variables
    /// - `TASKLANE_JWT_SECRET`: JWT signing secret
    /// - `TASKLANE_JWT_EXPIRATION_SECS`: token lifetime (default: 14400)
    /// - `TASKLANE_JWT_LEEWAY_SECS`: clock skew tolerance (default: 30)
    /// - `TASKLANE_BCRYPT_COST`: bcrypt work factor, 4 to 31 (default: 12)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            jwt_secret: build_jwt_secret(std::env::var("TASKLANE_JWT_SECRET").ok()),
            jwt_expiration_secs: std::env::var("TASKLANE_JWT_EXPIRATION_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jwt_expiration_secs),
            jwt_leeway_secs: std::env::var("TASKLANE_JWT_LEEWAY_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.jwt_leeway_secs),
            bcrypt_cost: std::env::var("TASKLANE_BCRYPT_COST")
                .ok()
                .and_then(|s| s.parse().ok())
                .filter(|cost| (MIN_BCRYPT_COST..=MAX_BCRYPT_COST).contains(cost))
                .unwrap_or(defaults.bcrypt_cost),
            ..defaults
        }
    }

    /// Config with a fixed secret and clock, for tests.
    pub fn for_testing(secret: &str, clock: Arc<dyn JwtClock>) -> Self {
        Self {
            jwt_secret: build_jwt_secret(Some(secret.to_string())),
            bcrypt_cost: MIN_BCRYPT_COST,
            clock,
            ..Self::default()
        }
    }

    /// Refuse insecure secrets in production; warn about them elsewhere.
    pub fn validate_for_production(&self, is_production: bool) -> ApiResult<()> {
        if self.jwt_secret.is_insecure_default() {
            if is_production {
                return Err(ApiError::invalid_input(
                    "Cannot start server in production with insecure JWT secret. \
                     Set TASKLANE_JWT_SECRET to a secure value.",
                ));
            }
            tracing::warn!(
                "Using insecure default JWT secret. Set TASKLANE_JWT_SECRET before deploying."
            );
        }

        if self.jwt_secret.len() < MIN_JWT_SECRET_LENGTH {
            if is_production {
                return Err(ApiError::invalid_input(format!(
                    "JWT secret is too short for production use ({} chars). \
                     It must be at least {} characters long.",
                    self.jwt_secret.len(),
                    MIN_JWT_SECRET_LENGTH
                )));
            }
            tracing::warn!(
                secret_len = self.jwt_secret.len(),
                "JWT secret is short; use at least {} characters in production",
                MIN_JWT_SECRET_LENGTH
            );
        }

        Ok(())
    }
}

// ============================================================================
// JWT CLAIMS
// ============================================================================

/// JWT claims issued at login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,

    pub email: String,

    pub user_id: i64,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: UserId, email: &str, expiration_secs: i64, clock: &dyn JwtClock) -> Self {
        let now = clock.now_epoch_secs();
        Self {
            sub: email.to_string(),
            email: email.to_string(),
            user_id: user_id.get(),
            iat: now,
            exp: now + expiration_secs,
        }
    }

    pub fn is_expired(&self, clock: &dyn JwtClock) -> bool {
        self.exp < clock.now_epoch_secs()
    }
}

/// The authenticated caller, injected into request extensions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthUser {
    pub user_id: UserId,
    pub email: String,
}

impl From<Claims> for AuthUser {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: UserId::new(claims.user_id),
            email: claims.email,
        }
    }
}

// ============================================================================
// JWT ISSUANCE AND VALIDATION
// ============================================================================

fn validate_claim_times(now: i64, exp: i64, leeway_secs: i64) -> ApiResult<()> {
    if exp < now - leeway_secs {
        return Err(ApiError::token_expired());
    }
    Ok(())
}

/// Sign a token for `user_id`.
pub fn generate_jwt_token(config: &AuthConfig, user_id: UserId, email: &str) -> ApiResult<String> {
    let claims = Claims::new(user_id, email, config.jwt_expiration_secs, &*config.clock);
    let encoding_key = EncodingKey::from_secret(config.jwt_secret.expose().as_bytes());
    let header = Header::new(config.jwt_algorithm);

    encode(&header, &claims, &encoding_key).map_err(|e| {
        ApiError::from(UserError::Signing {
            reason: e.to_string(),
        })
    })
}

/// Check the signature, then expiry against the configured clock.
pub fn validate_jwt_token(config: &AuthConfig, token: &str) -> ApiResult<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.expose().as_bytes());

    // Signature only; time is checked below with the injected clock.
    let mut validation = Validation::new(config.jwt_algorithm);
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.required_spec_claims = std::collections::HashSet::from(["exp".to_string()]);

    let token_data =
        decode::<Claims>(token, &decoding_key, &validation).map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::InvalidSignature => {
                ApiError::invalid_token("Invalid Token")
            }
            _ => {
                tracing::debug!(error = %e, "JWT rejected");
                ApiError::invalid_token("Invalid Token")
            }
        })?;

    let claims = token_data.claims;
    let now = config.clock.now_epoch_secs();
    if now < 0 {
        tracing::error!(timestamp = now, "System clock returned pre-epoch time");
        return Err(ApiError::internal_error("Internal server error"));
    }
    validate_claim_times(now, claims.exp, config.jwt_leeway_secs)?;

    Ok(claims)
}

/// Parse an `Authorization` header value of the form `Bearer <token>`.
pub fn bearer_token(header_value: &str) -> ApiResult<&str> {
    let token = header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .ok_or_else(|| ApiError::invalid_token("Authorization header must use Bearer scheme"))?;
    if token.is_empty() {
        return Err(ApiError::invalid_token("Invalid Input Auth Header"));
    }
    Ok(token)
}

/// Hex SHA-256 of a token, stored instead of the token itself.
pub fn token_digest(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

// ============================================================================
// CREDENTIAL HASHING
// ============================================================================

/// Password hashing capability.
pub trait CredentialHasher: Send + Sync {
    fn hash(&self, secret: &str) -> Result<String, UserError>;

    /// Whether `secret` matches `hash`. Malformed hashes never match.
    fn verify(&self, hash: &str, secret: &str) -> bool;
}

/// bcrypt-backed [`CredentialHasher`].
///
/// Stored form is the standard `$2b$<cost>$<salt+digest>` string, so the
/// cost travels with each hash and can be raised without a migration.
#[derive(Debug, Clone, Copy)]
pub struct BcryptCredentialHasher {
    cost: u32,
}

impl BcryptCredentialHasher {
    pub fn new(cost: u32) -> Self {
        Self {
            cost: cost.clamp(MIN_BCRYPT_COST, MAX_BCRYPT_COST),
        }
    }

    pub fn cost(&self) -> u32 {
        self.cost
    }
}

impl Default for BcryptCredentialHasher {
    fn default() -> Self {
        Self::new(DEFAULT_BCRYPT_COST)
    }
}

impl CredentialHasher for BcryptCredentialHasher {
    fn hash(&self, secret: &str) -> Result<String, UserError> {
        bcrypt::hash(secret, self.cost).map_err(|e| UserError::Hashing {
            reason: e.to_string(),
        })
    }

    fn verify(&self, hash: &str, secret: &str) -> bool {
        bcrypt::verify(secret, hash).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            false
        })
    }
}

/// Random hex token mailed to a new account for activation.
pub fn generate_activation_token() -> String {
    let bytes: [u8; ACTIVATION_TOKEN_BYTES] = rand::random();
    hex::encode(bytes)
}

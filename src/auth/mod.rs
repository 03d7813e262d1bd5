use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, errors::ErrorKind, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::{self, SecurityConfig};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("JWT secret not configured")]
    MissingSecret,

    #[error("token expired")]
    ExpiredToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("JWT generation error: {0}")]
    TokenGeneration(String),

    #[error("password hashing error: {0}")]
    Hash(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: i64,
    pub email: String,
    pub roles: Vec<String>,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

impl Claims {
    pub fn new(user_id: i64, email: impl Into<String>, roles: Vec<String>, expiry_hours: u64) -> Self {
        let now = Utc::now();
        let exp = (now + Duration::hours(expiry_hours as i64)).timestamp();

        Self {
            sub: user_id,
            email: email.into(),
            roles,
            iat: now.timestamp(),
            exp,
            jti: Uuid::new_v4().to_string(),
        }
    }
}

/// A freshly signed token and its lifetime, as returned by login and refresh
#[derive(Debug, Clone, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in: i64,
}

fn secret(security: &SecurityConfig) -> Result<&str, AuthError> {
    let secret = security.jwt_secret.as_str();
    if secret.is_empty() {
        return Err(AuthError::MissingSecret);
    }
    Ok(secret)
}

pub fn generate_jwt(claims: &Claims, security: &SecurityConfig) -> Result<String, AuthError> {
    let encoding_key = EncodingKey::from_secret(secret(security)?.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| AuthError::TokenGeneration(e.to_string()))
}

pub fn validate_jwt(token: &str, security: &SecurityConfig) -> Result<Claims, AuthError> {
    let decoding_key = DecodingKey::from_secret(secret(security)?.as_bytes());

    decode::<Claims>(token, &decoding_key, &Validation::default())
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
            _ => AuthError::InvalidToken(e.to_string()),
        })
}

/// Sign a token for the user with the global security settings
pub fn issue_token(user_id: i64, email: &str, roles: Vec<String>) -> Result<IssuedToken, AuthError> {
    let security = &config::config().security;
    let claims = Claims::new(user_id, email, roles, security.jwt_expiry_hours);
    let token = generate_jwt(&claims, security)?;

    Ok(IssuedToken {
        token,
        token_type: "Bearer",
        expires_in: claims.exp - claims.iat,
    })
}

/// Argon2id PHC string for the password
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AuthError::Hash(e.to_string()))
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is malformed
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|e| AuthError::Hash(format!("invalid hash format: {e}")))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(AuthError::Hash(format!("verify error: {e}"))),
    }
}

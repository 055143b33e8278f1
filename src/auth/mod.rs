pub mod permissions;

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::config;

pub use permissions::Permission;

/// Access level carried by platform administrators
pub const ROOT_ACCESS: &str = "root";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// External id or email of the user
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access: Option<String>,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn new(sub: impl Into<String>, tenant: Option<String>, access: Option<String>) -> Self {
        let security = &config::config().security;
        let now = Utc::now();
        let exp = (now + Duration::hours(security.jwt_expiry_hours as i64)).timestamp();

        Self {
            sub: sub.into(),
            tenant,
            access,
            iss: security.jwt_issuer.clone(),
            iat: now.timestamp(),
            exp,
        }
    }

    pub fn is_root(&self) -> bool {
        self.access.as_deref() == Some(ROOT_ACCESS)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum JwtError {
    #[error("JWT secret not configured")]
    InvalidSecret,
    #[error("JWT generation error: {0}")]
    TokenGeneration(String),
    #[error("Invalid JWT token: {0}")]
    InvalidToken(String),
}

pub fn generate_jwt(claims: &Claims) -> Result<String, JwtError> {
    let secret = &config::config().security.jwt_secret;

    if secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let encoding_key = EncodingKey::from_secret(secret.as_bytes());
    encode(&Header::default(), claims, &encoding_key).map_err(|e| JwtError::TokenGeneration(e.to_string()))
}

/// Verify signature, expiry and issuer, then return the claims
pub fn decode_jwt(token: &str) -> Result<Claims, JwtError> {
    let security = &config::config().security;

    if security.jwt_secret.is_empty() {
        return Err(JwtError::InvalidSecret);
    }

    let decoding_key = DecodingKey::from_secret(security.jwt_secret.as_bytes());
    let mut validation = Validation::default();
    validation.set_issuer(&[security.jwt_issuer.as_str()]);

    decode::<Claims>(token, &decoding_key, &validation)
        .map(|data| data.claims)
        .map_err(|e| JwtError::InvalidToken(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_round_trip() {
        let claims = Claims::new("ops@acme.io", Some("acme".into()), None);
        let token = generate_jwt(&claims).unwrap();

        let decoded = decode_jwt(&token).unwrap();
        assert_eq!(decoded.sub, "ops@acme.io");
        assert_eq!(decoded.tenant.as_deref(), Some("acme"));
        assert!(!decoded.is_root());
    }

    #[test]
    fn root_access_is_recognised() {
        let claims = Claims::new("platform", None, Some(ROOT_ACCESS.into()));
        let decoded = decode_jwt(&generate_jwt(&claims).unwrap()).unwrap();
        assert!(decoded.is_root());
        assert_eq!(decoded.tenant, None);
    }

    #[test]
    fn foreign_issuer_is_rejected() {
        let mut claims = Claims::new("ops@acme.io", Some("acme".into()), None);
        claims.iss = "someone-else".into();
        let token = generate_jwt(&claims).unwrap();

        assert!(matches!(decode_jwt(&token), Err(JwtError::InvalidToken(_))));
    }

    #[test]
    fn expired_token_is_rejected() {
        let mut claims = Claims::new("ops@acme.io", None, None);
        claims.iat -= 7200;
        claims.exp = claims.iat + 60;
        let token = generate_jwt(&claims).unwrap();

        assert!(decode_jwt(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(decode_jwt("not.a.jwt").is_err());
    }
}

//! Bearer-token issuing and validation.
//!
//! HS256 JWTs with a unique `jti` per token so individual tokens can be
//! revoked at logout. Signature and expiry are checked here; the caller is
//! responsible for consulting the revocation registry afterwards.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::config::schema::AuthConfig;

/// Claims carried by gateway-issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user identifier).
    pub sub: String,
    /// Unique token identifier, the revocation key.
    pub jti: String,
    /// Caller role ("user" or "admin").
    pub role: String,
    /// Issuer.
    pub iss: String,
    /// Issued at (seconds since epoch).
    pub iat: u64,
    /// Expiry (seconds since epoch).
    pub exp: u64,
}

/// Why a credential was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    Expired,
    Invalid,
}

impl AuthError {
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::Expired => "token expired",
            AuthError::Invalid => "invalid token",
        }
    }
}

/// Signs and verifies the gateway's bearer tokens.
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    token_ttl_secs: u64,
    issuer: String,
}

impl AuthManager {
    pub fn new(config: &AuthConfig) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        // Expiry is exact; the revocation registry purges entries at the
        // same instant, so a leeway window would let revoked tokens linger.
        validation.leeway = 0;
        validation.set_issuer(&[&config.issuer]);

        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            validation,
            token_ttl_secs: config.token_ttl_secs,
            issuer: config.issuer.clone(),
        }
    }

    /// Issue a token for `sub` with the given role.
    pub fn issue(&self, sub: &str, role: &str) -> Result<(String, Claims), AuthError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = Claims {
            sub: sub.to_string(),
            jti: Uuid::new_v4().to_string(),
            role: role.to_string(),
            iss: self.issuer.clone(),
            iat: now,
            exp: now + self.token_ttl_secs,
        };
        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AuthError::Invalid)?;
        Ok((token, claims))
    }

    /// Verify signature, expiry, and issuer.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|err| match err.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            })
    }

    /// Configured token lifetime in seconds.
    pub fn token_ttl_secs(&self) -> u64 {
        self.token_ttl_secs
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(headers: &axum::http::HeaderMap) -> Option<&str> {
    headers
        .get(axum::http::header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager(ttl: u64) -> AuthManager {
        AuthManager::new(&AuthConfig {
            jwt_secret: "test-secret".to_string(),
            token_ttl_secs: ttl,
            issuer: "service-gateway".to_string(),
            revocation_sweep_secs: 60,
        })
    }

    #[test]
    fn issue_verify_round_trip() {
        let auth = manager(3_600);
        let (token, issued) = auth.issue("u-1", "admin").unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, "u-1");
        assert_eq!(claims.role, "admin");
        assert_eq!(claims.jti, issued.jti);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn jti_is_unique_per_token() {
        let auth = manager(3_600);
        let (_, a) = auth.issue("u-1", "user").unwrap();
        let (_, b) = auth.issue("u-1", "user").unwrap();
        assert_ne!(a.jti, b.jti);
    }

    #[test]
    fn tampered_token_rejected() {
        let auth = manager(3_600);
        let (token, _) = auth.issue("u-1", "user").unwrap();
        let other = AuthManager::new(&AuthConfig {
            jwt_secret: "different-secret".to_string(),
            ..AuthConfig::default()
        });
        assert_eq!(other.verify(&token).unwrap_err(), AuthError::Invalid);
    }

    #[test]
    fn expired_token_rejected() {
        let auth = manager(0);
        let (token, _) = auth.issue("u-1", "user").unwrap();
        std::thread::sleep(std::time::Duration::from_millis(1_100));
        assert_eq!(auth.verify(&token).unwrap_err(), AuthError::Expired);
    }

    #[test]
    fn bearer_extraction() {
        let mut headers = axum::http::HeaderMap::new();
        assert!(bearer_token(&headers).is_none());
        headers.insert(
            axum::http::header::AUTHORIZATION,
            "Bearer abc.def.ghi".parse().unwrap(),
        );
        assert_eq!(bearer_token(&headers), Some("abc.def.ghi"));
        headers.insert(axum::http::header::AUTHORIZATION, "Basic xyz".parse().unwrap());
        assert!(bearer_token(&headers).is_none());
    }
}

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::Config;
use crate::error::{AppError, AppResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub jti: String, // JWT ID (unique per token)
    pub exp: i64,    // Expiration time
    pub iat: i64,    // Issued at
    pub iss: String, // Issuer
}

/// Issues and verifies bearer credentials (JWT, HS256).
///
/// Used by the REST extractor and, critically, at live-connection handshake
/// time: a connection must present a verifiable token before it is ever
/// registered.
pub struct AuthManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_token_ttl_hours: i64,
    refresh_token_ttl_days: i64,
    issuer: String,
}

impl AuthManager {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            access_token_ttl_hours: config.access_token_ttl_hours,
            refresh_token_ttl_days: config.refresh_token_ttl_days,
            issuer: config.jwt_issuer.clone(),
        }
    }

    /// Create access token (short-lived, for REST and websocket handshake).
    /// Returns `(token, jti, expires_at)`.
    pub fn create_token(&self, user_id: &Uuid) -> AppResult<(String, String, i64)> {
        self.create_with_ttl(user_id, Duration::hours(self.access_token_ttl_hours))
    }

    /// Create refresh token (long-lived, for token refresh).
    pub fn create_refresh_token(&self, user_id: &Uuid) -> AppResult<(String, String, i64)> {
        self.create_with_ttl(user_id, Duration::days(self.refresh_token_ttl_days))
    }

    fn create_with_ttl(&self, user_id: &Uuid, ttl: Duration) -> AppResult<(String, String, i64)> {
        let now = Utc::now();
        let exp = now + ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: user_id.to_string(),
            jti: jti.clone(),
            exp: exp.timestamp(),
            iat: now.timestamp(),
            iss: self.issuer.clone(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)?;
        Ok((token, jti, exp.timestamp()))
    }

    /// Verify a token and return its claims, or `Unauthenticated`.
    pub fn verify_token(&self, token: &str) -> AppResult<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.issuer.clone()]);

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::unauthenticated(format!("invalid token: {}", e)))?;
        Ok(token_data.claims)
    }

    /// Verify a credential and derive the identity it was issued for.
    pub fn verify_identity(&self, token: &str) -> AppResult<Uuid> {
        let claims = self.verify_token(token)?;
        Uuid::parse_str(&claims.sub)
            .map_err(|_| AppError::unauthenticated("malformed subject claim"))
    }
}

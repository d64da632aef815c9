use anyhow::Result;

// Default port values
const DEFAULT_PORT: u16 = 8080;
const DEFAULT_HTTP_PORT: u16 = 8081;

// Default token lifetimes
const DEFAULT_ACCESS_TOKEN_TTL_HOURS: i64 = 24;
const DEFAULT_REFRESH_TOKEN_TTL_DAYS: i64 = 7;

/// Maximum length of a message text after trimming, in bytes.
/// Larger payloads are rejected before any store write.
pub const MAX_MESSAGE_LEN: usize = 4 * 1024;

#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    /// Symmetric JWT secret (HS256). Must be at least 32 characters.
    pub jwt_secret: String,
    pub jwt_issuer: String,
    /// Websocket listener port.
    pub port: u16,
    /// REST / health / metrics listener port.
    pub http_port: u16,
    pub access_token_ttl_hours: i64,
    pub refresh_token_ttl_days: i64,
    /// Origin allowed to call the REST API from a browser.
    pub cors_origin: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            jwt_secret: {
                let secret = std::env::var("JWT_SECRET")?;
                if secret.len() < 32 {
                    anyhow::bail!(
                        "JWT_SECRET must be at least 32 characters long. \
                        Generate one with: openssl rand -base64 32"
                    );
                }
                secret
            },
            jwt_issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "tether-server".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_PORT),
            http_port: std::env::var("HTTP_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(DEFAULT_HTTP_PORT),
            access_token_ttl_hours: std::env::var("ACCESS_TOKEN_TTL_HOURS")
                .ok()
                .and_then(|h| h.parse().ok())
                .unwrap_or(DEFAULT_ACCESS_TOKEN_TTL_HOURS),
            refresh_token_ttl_days: std::env::var("REFRESH_TOKEN_TTL_DAYS")
                .ok()
                .and_then(|d| d.parse().ok())
                .unwrap_or(DEFAULT_REFRESH_TOKEN_TTL_DAYS),
            cors_origin: std::env::var("CORS_ORIGIN")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
        })
    }
}

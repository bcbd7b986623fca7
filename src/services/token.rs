//! JWT issuing and validation
//!
//! Tokens are HS256-signed and carry the user's id, name and email.
//! Validation checks signature, issuer, audience and expiry with no leeway.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::{AuthConfig, MAX_TOKEN_LIFETIME_HOURS};
use crate::models::User;

/// Claims carried by an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub sub: String,
    pub name: String,
    pub email: String,
    pub iss: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
}

impl Claims {
    pub fn user_id(&self) -> Result<Uuid> {
        Uuid::parse_str(&self.sub).context("Token subject is not a user id")
    }
}

/// Signs and verifies access tokens.
///
/// Holds only the keys and settings derived from `AuthConfig`.
pub struct TokenService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    audience: String,
    lifetime: Duration,
}

impl TokenService {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            issuer: config.issuer.clone(),
            audience: config.audience.clone(),
            // Unvalidated configs are clamped rather than overflowing
            lifetime: Duration::hours(
                config
                    .token_lifetime_hours
                    .clamp(-MAX_TOKEN_LIFETIME_HOURS, MAX_TOKEN_LIFETIME_HOURS),
            ),
        }
    }

    /// Issue a token for `user`, returning it with its expiry
    pub fn issue(&self, user: &User) -> Result<(String, DateTime<Utc>)> {
        let now = Utc::now();
        let expires_at = now + self.lifetime;
        let claims = Claims {
            sub: user.id.to_string(),
            name: user.username.clone(),
            email: user.email.clone(),
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .context("Failed to sign token")?;

        // exp has second precision
        let expires_at = Utc
            .timestamp_opt(claims.exp, 0)
            .single()
            .unwrap_or(expires_at);
        Ok((token, expires_at))
    }

    /// Verify a token and return its claims
    pub fn validate(&self, token: &str) -> Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);
        validation.set_required_spec_claims(&["exp", "iss", "aud", "sub"]);

        let data = decode::<Claims>(token, &self.decoding_key, &validation)
            .context("Invalid access token")?;
        Ok(data.claims)
    }
}

//! Bearer token issuing and verification.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::{AuthConfig, MAX_TOKEN_TTL_HOURS};
use crate::error::{Result, TripError};
use crate::model::UserId;

/// Claims carried by an access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct Claims {
    /// User id as a decimal string
    sub: String,
    exp: i64,
    iat: i64,
}

/// Issues and checks HS256 access tokens.
#[derive(Clone)]
pub struct TokenVerifier {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier").field("ttl", &self.ttl).finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Build from configuration, generating a process-local secret when none is set.
    pub fn from_config(config: &AuthConfig) -> Self {
        let ttl = Duration::hours(config.token_ttl_hours.min(MAX_TOKEN_TTL_HOURS) as i64);
        match &config.jwt_secret {
            Some(secret) => Self::new(secret.as_bytes(), ttl),
            None => {
                warn!("No auth.jwt_secret configured; tokens will not survive a restart");
                let secret: String = rand::thread_rng()
                    .sample_iter(&Alphanumeric)
                    .take(48)
                    .map(char::from)
                    .collect();
                Self::new(secret.as_bytes(), ttl)
            }
        }
    }

    /// Issue a token for `user_id` valid for the configured lifetime.
    pub fn issue(&self, user_id: UserId) -> Result<String> {
        self.issue_at(user_id, Utc::now().timestamp())
    }

    fn issue_at(&self, user_id: UserId, iat: i64) -> Result<String> {
        let claims = Claims {
            sub: user_id.to_string(),
            iat,
            exp: iat + self.ttl.num_seconds(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| TripError::internal(format!("sign token: {}", e)))
    }

    /// Check signature and expiry and return the token's user.
    pub fn verify(&self, token: &str) -> Result<UserId> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding, &validation).map_err(|e| {
            debug!(error = %e, "Token rejected");
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
                    TripError::Unauthenticated("token expired".into())
                }
                _ => TripError::Unauthenticated("invalid token".into()),
            }
        })?;

        data.claims
            .sub
            .parse()
            .map_err(|_| TripError::Unauthenticated("invalid token subject".into()))
    }

    /// Verify the value of an `Authorization` header.
    pub fn verify_header(&self, header: Option<&str>) -> Result<UserId> {
        let header =
            header.ok_or_else(|| TripError::Unauthenticated("missing authorization header".into()))?;
        self.verify(parse_bearer(header)?)
    }
}

/// Extract the token from `Bearer <token>`.
pub fn parse_bearer(header: &str) -> Result<&str> {
    match header.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => {
            Ok(token.trim())
        }
        _ => Err(TripError::Unauthenticated(
            "expected: Bearer <token>".into(),
        )),
    }
}

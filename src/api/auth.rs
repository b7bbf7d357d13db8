use anyhow::{Context, Result};
use axum::http::HeaderMap;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user_id
    pub exp: usize,
}

pub fn create_jwt(user_id: &str, secret: &str, ttl_hours: i64) -> Result<String> {
    let exp = (chrono::Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp() as usize;
    let claims = Claims {
        sub: user_id.to_string(),
        exp,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .context("creating jwt")
}

pub fn verify_jwt(token: &str, secret: &str) -> Result<Claims> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .context("invalid token")?;
    Ok(data.claims)
}

/// Resolve the calling user. With auth enabled this demands a valid bearer
/// token; disabled (dev/demo), the `x-user-id` header or a fixed demo user
/// stands in so the composed reads stay exercisable.
pub fn resolve_user(state: &AppState, headers: &HeaderMap) -> Result<String, ApiError> {
    if state.cfg.enable_auth {
        let header = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::Unauthorized("missing authorization header".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ApiError::Unauthorized("expected bearer token".into()))?;
        let claims = verify_jwt(token, &state.cfg.auth.secret)
            .map_err(|e| ApiError::Unauthorized(format!("{e:#}")))?;
        return Ok(claims.sub);
    }

    Ok(headers
        .get("x-user-id")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("demo")
        .to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwt_round_trip() {
        let token = create_jwt("user-1", "secret", 1).unwrap();
        let claims = verify_jwt(&token, "secret").unwrap();
        assert_eq!(claims.sub, "user-1");
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = create_jwt("user-1", "secret", 1).unwrap();
        assert!(verify_jwt(&token, "other").is_err());
    }
}

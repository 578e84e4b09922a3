//! JWT authentication module.
//!
//! Tokens are issued by `POST /login` and carried as
//! `Authorization: Bearer <token>`. [`AuthUser`] resolves the caller for
//! every prescription endpoint.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use apotek_core::{Id, User};
use apotek_db::CatalogRepository;

use crate::error::ApiError;
use crate::state::AppState;

/// JWT claims structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user id)
    pub sub: Id,

    /// User name at issue time
    pub name: String,

    /// Administrator flag at issue time
    pub admin: bool,

    /// Issued at (Unix timestamp)
    pub iat: i64,

    /// Expiration (Unix timestamp)
    pub exp: i64,

    /// JWT ID (unique identifier for this token)
    pub jti: String,
}

/// JWT token manager.
pub struct JwtManager {
    secret: String,
    lifetime_secs: i64,
}

impl JwtManager {
    /// Create a new JWT manager.
    pub fn new(secret: String, lifetime_secs: i64) -> Self {
        JwtManager {
            secret,
            lifetime_secs,
        }
    }

    /// Generate a token for `user`.
    pub fn generate_token(&self, user: &User) -> Result<String, ApiError> {
        let now = Utc::now();
        let exp = now + Duration::seconds(self.lifetime_secs);

        let claims = Claims {
            sub: user.id,
            name: user.name.clone(),
            admin: user.admin,
            iat: now.timestamp(),
            exp: exp.timestamp(),
            jti: Uuid::new_v4().to_string(),
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .map_err(|e| ApiError::Auth(format!("Failed to generate token: {}", e)))
    }

    /// Validate and decode a token.
    pub fn validate_token(&self, token: &str) -> Result<Claims, ApiError> {
        let token_data: TokenData<Claims> = decode(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .map_err(|e| ApiError::Auth(format!("Invalid token: {}", e)))?;

        Ok(token_data.claims)
    }
}

/// Extract bearer token from authorization header.
pub fn extract_bearer_token(auth_header: &str) -> Option<&str> {
    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

// =============================================================================
// Extractor
// =============================================================================

/// The authenticated caller, loaded fresh from the `user` table.
///
/// The admin flag comes from the database rather than the token, so a
/// revoked administrator loses delete rights without waiting for expiry.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| ApiError::Auth("missing authorization header".to_string()))?;

        let token = extract_bearer_token(header)
            .ok_or_else(|| ApiError::Auth("expected a bearer token".to_string()))?;

        let claims = state.jwt.validate_token(token)?;

        let mut conn = state.db.acquire().await?;
        let user = CatalogRepository::new(&mut conn)
            .get_user(claims.sub)
            .await?
            .ok_or_else(|| ApiError::Auth(format!("user {} no longer exists", claims.sub)))?;

        Ok(AuthUser(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(admin: bool) -> User {
        User {
            id: 7,
            name: "admin".to_string(),
            admin,
        }
    }

    #[test]
    fn test_jwt_roundtrip() {
        let manager = JwtManager::new("test-secret".to_string(), 3600);

        let token = manager.generate_token(&user(true)).unwrap();
        let claims = manager.validate_token(&token).unwrap();

        assert_eq!(claims.sub, 7);
        assert_eq!(claims.name, "admin");
        assert!(claims.admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let issuer = JwtManager::new("one".to_string(), 3600);
        let verifier = JwtManager::new("two".to_string(), 3600);

        let token = issuer.generate_token(&user(false)).unwrap();
        assert!(matches!(verifier.validate_token(&token), Err(ApiError::Auth(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let manager = JwtManager::new("test-secret".to_string(), -3600);
        let token = manager.generate_token(&user(false)).unwrap();
        assert!(manager.validate_token(&token).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        assert_eq!(extract_bearer_token("Bearer abc.def"), Some("abc.def"));
        assert_eq!(extract_bearer_token("Basic abc"), None);
        assert_eq!(extract_bearer_token("Bearer "), None);
    }
}

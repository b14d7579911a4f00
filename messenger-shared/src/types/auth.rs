use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult, ErrorCode};

/// Access token claims issued by the auth service.
///
/// `id` is the user id in decimal string form, `otp` is set while a second
/// factor is still pending.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub id: String,
    #[serde(default)]
    pub otp: bool,
    pub exp: i64,
}

impl Claims {
    pub fn new(user_id: i64, otp: bool, duration_secs: i64) -> Self {
        Self {
            id: user_id.to_string(),
            otp,
            exp: Utc::now().timestamp() + duration_secs,
        }
    }

    pub fn user_id(&self) -> AppResult<i64> {
        self.id
            .parse::<i64>()
            .map_err(|_| AppError::new(ErrorCode::TokenInvalid, format!("non-numeric subject id: {}", self.id)))
    }
}

/// An identity that passed token verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser {
    pub id: i64,
}

/// Verify an HS512 access token and return the caller it identifies.
///
/// Tokens with a pending second factor do not identify anyone.
pub fn verify_access_token(token: &str, secret: &str, leeway_secs: u64) -> AppResult<AuthUser> {
    let mut validation = Validation::new(Algorithm::HS512);
    validation.validate_exp = true;
    validation.leeway = leeway_secs;

    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => {
            AppError::new(ErrorCode::TokenExpired, "token has expired")
        }
        _ => AppError::new(ErrorCode::TokenInvalid, format!("invalid token: {e}")),
    })?;

    if token_data.claims.otp {
        return Err(AppError::new(ErrorCode::OtpPending, "second factor not yet validated"));
    }

    Ok(AuthUser {
        id: token_data.claims.user_id()?,
    })
}

/// Sign claims the way the auth service does. Used by tooling and tests.
pub fn sign_access_token(claims: &Claims, secret: &str) -> AppResult<String> {
    encode(
        &Header::new(Algorithm::HS512),
        claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| AppError::Internal(e.into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "test-access-key";

    #[test]
    fn valid_token_resolves_user() {
        let token = sign_access_token(&Claims::new(7, false, 300), SECRET).unwrap();
        let user = verify_access_token(&token, SECRET, 0).unwrap();
        assert_eq!(user.id, 7);
    }

    #[test]
    fn otp_pending_token_is_rejected() {
        let token = sign_access_token(&Claims::new(7, true, 300), SECRET).unwrap();
        let err = verify_access_token(&token, SECRET, 0).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::OtpPending));
    }

    #[test]
    fn expired_token_is_rejected() {
        let token = sign_access_token(&Claims::new(7, false, -3600), SECRET).unwrap();
        let err = verify_access_token(&token, SECRET, 0).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenExpired));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let token = sign_access_token(&Claims::new(7, false, 300), SECRET).unwrap();
        let err = verify_access_token(&token, "another-key", 0).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenInvalid));
    }

    #[test]
    fn non_numeric_subject_is_rejected() {
        let claims = Claims {
            id: "abc".into(),
            otp: false,
            exp: Utc::now().timestamp() + 300,
        };
        let token = sign_access_token(&claims, SECRET).unwrap();
        let err = verify_access_token(&token, SECRET, 0).unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::TokenInvalid));
    }
}

//! Bearer-token authentication.
//!
//! Tokens are HS256 JWTs. `/login` issues tokens signed with `JWT_SECRET_KEY`;
//! when `SUPABASE_JWT_SECRET` is set, Supabase user tokens (audience
//! `authenticated`) are accepted as well.

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::app::AppState;
use crate::config::Config;
use crate::error::AppError;

const SUPABASE_AUDIENCE: &str = "authenticated";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub exp: usize,
}

pub struct Authenticator {
    secret: String,
    supabase_secret: Option<String>,
    token_ttl: Duration,
    credentials: Option<(String, String)>,
}

impl Authenticator {
    pub fn from_config(config: &Config) -> Self {
        let secret = config.jwt_secret.clone().unwrap_or_else(|| {
            warn!("JWT_SECRET_KEY not set, tokens will not survive a restart");
            format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
        });
        let credentials = match (&config.auth_username, &config.auth_password) {
            (Some(user), Some(password)) => Some((user.clone(), password.clone())),
            _ => None,
        };

        Self {
            secret,
            supabase_secret: config.supabase_jwt_secret.clone(),
            token_ttl: Duration::minutes(config.token_ttl_minutes),
            credentials,
        }
    }

    /// Checks a login form against the configured user. Always false when
    /// no user is configured.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.credentials
            .as_ref()
            .is_some_and(|(user, pass)| user == username && pass == password)
    }

    pub fn issue_token(&self, username: &str) -> anyhow::Result<String> {
        let exp = (Utc::now() + self.token_ttl).timestamp().max(0) as usize;
        let claims = Claims {
            sub: username.to_string(),
            email: None,
            user_id: Some(username.to_string()),
            exp,
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;
        Ok(token)
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims, AppError> {
        let mut own = Validation::new(Algorithm::HS256);
        own.validate_aud = false;
        match decode::<Claims>(token, &DecodingKey::from_secret(self.secret.as_bytes()), &own) {
            Ok(data) => return Ok(data.claims),
            Err(e) => debug!("Token rejected by service key: {}", e),
        }

        if let Some(secret) = &self.supabase_secret {
            let mut supabase = Validation::new(Algorithm::HS256);
            supabase.set_audience(&[SUPABASE_AUDIENCE]);
            match decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &supabase) {
                Ok(data) => {
                    let mut claims = data.claims;
                    claims.user_id.get_or_insert_with(|| claims.sub.clone());
                    return Ok(claims);
                }
                Err(e) => debug!("Token rejected by Supabase key: {}", e),
            }
        }

        Err(AppError::Unauthorized(
            "Could not validate credentials".to_string(),
        ))
    }
}

/// The authenticated caller, extracted from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::Unauthorized("Not authenticated".to_string()))?;

        state.auth.verify_token(token).map(AuthUser)
    }
}

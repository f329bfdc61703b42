//! Authentication gate for every HTTP route.
//!
//! Authentication is enabled through the `basicAuth` or `bearerAuth` section
//! of the configuration. The active configuration is read on each request, so
//! a reload takes effect for the next request without restarting the server.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{Duration, Utc};
use http::{header, HeaderMap, HeaderValue, StatusCode};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::{
    config::{BasicAuthConfig, BearerAuthConfig, Config, ConfigHolder},
    Error, Result,
};

const TOKEN_USER: &str = "am-executor";
const TOKEN_LIFETIME_DAYS: i64 = 365;
const BASIC_CHALLENGE: &str = "Basic realm=\"am-executor\"";

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing credentials")]
    MissingCredentials,
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("invalid token: {0}")]
    InvalidToken(#[from] jsonwebtoken::errors::Error),
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub authorized: bool,
    pub user: String,
    pub exp: i64,
}

/// Checks the request headers against whichever scheme `config` enables.
pub fn authorize(config: &Config, headers: &HeaderMap) -> std::result::Result<(), AuthError> {
    if config.basic_auth.enabled {
        check_basic(&config.basic_auth, headers)
    } else if config.bearer_auth.enabled {
        check_bearer(&config.bearer_auth, headers)
    } else {
        Ok(())
    }
}

pub async fn require_auth(
    State(config): State<Arc<ConfigHolder>>,
    request: Request,
    next: Next,
) -> Response {
    let config = config.snapshot().await;
    match authorize(&config, request.headers()) {
        Ok(()) => next.run(request).await,
        Err(e) => {
            debug!("Rejected request to {}: {}", request.uri().path(), e);
            let mut response = (StatusCode::UNAUTHORIZED, "Unauthorized\n").into_response();
            if config.basic_auth.enabled {
                response.headers_mut().insert(
                    header::WWW_AUTHENTICATE,
                    HeaderValue::from_static(BASIC_CHALLENGE),
                );
            }
            response
        }
    }
}

/// Signs a bearer token with the configured signing key.
pub fn create_token(config: &Config) -> Result<String> {
    let key = &config.bearer_auth.signing_key;
    if key.is_empty() {
        return Err(Error::Config(
            "bearerAuth.signingKey must be set to create a token".to_string(),
        ));
    }

    let claims = Claims {
        authorized: true,
        user: TOKEN_USER.to_string(),
        exp: (Utc::now() + Duration::days(TOKEN_LIFETIME_DAYS)).timestamp(),
    };
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(key.as_bytes()),
    )?;
    Ok(token)
}

fn check_basic(config: &BasicAuthConfig, headers: &HeaderMap) -> std::result::Result<(), AuthError> {
    let encoded = credentials(headers, "Basic ")?;
    let decoded = STANDARD
        .decode(encoded)
        .map_err(|_| AuthError::InvalidCredentials)?;
    let decoded = String::from_utf8(decoded).map_err(|_| AuthError::InvalidCredentials)?;
    let (username, password) = decoded
        .split_once(':')
        .ok_or(AuthError::InvalidCredentials)?;

    let username_ok = username.as_bytes().ct_eq(config.username.as_bytes());
    let password_ok = password.as_bytes().ct_eq(config.password.as_bytes());
    if bool::from(username_ok & password_ok) {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

fn check_bearer(config: &BearerAuthConfig, headers: &HeaderMap) -> std::result::Result<(), AuthError> {
    let token = credentials(headers, "Bearer ")?;
    let data = jsonwebtoken::decode::<Claims>(
        token,
        &DecodingKey::from_secret(config.signing_key.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )?;
    if data.claims.authorized {
        Ok(())
    } else {
        Err(AuthError::InvalidCredentials)
    }
}

fn credentials<'a>(headers: &'a HeaderMap, scheme: &str) -> std::result::Result<&'a str, AuthError> {
    let value = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingCredentials)?
        .to_str()
        .map_err(|_| AuthError::InvalidCredentials)?;
    match value.get(..scheme.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(scheme) => Ok(value[scheme.len()..].trim()),
        _ => Err(AuthError::InvalidCredentials),
    }
}

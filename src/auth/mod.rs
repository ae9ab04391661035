//! Authentication module for the Anime Catalog API
//!
//! This module provides authentication functionality including:
//! - Password hashing with bcrypt
//! - JWT token generation and verification (login + authorities in the claims)
//! - Random activation / reset keys
//! - The `Auth` extractor and authority checks for protected routes
//! - HTTP-only cookie support for secure token storage

use actix_web::cookie::time::Duration as CookieDuration;
use actix_web::cookie::{Cookie, SameSite};
use actix_web::{web, FromRequest, HttpRequest, HttpResponse};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, TokenData, Validation};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::{ready, Ready};
use thiserror::Error;

use crate::config::Config;
use crate::models::ApiError;

/// Default bcrypt cost factor (12 is recommended for production)
const BCRYPT_COST: u32 = 12;

/// Length of activation and reset keys
const RANDOM_KEY_LENGTH: usize = 20;

/// Cookie name for JWT token
pub const AUTH_COOKIE_NAME: &str = "auth_token";

/// Administrator authority
pub const ROLE_ADMIN: &str = "ROLE_ADMIN";

/// Authority granted to every registered user
pub const ROLE_USER: &str = "ROLE_USER";

/// Auditor name for self-registered accounts
pub const ANONYMOUS_USER: &str = "anonymousUser";

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User {0} was not activated")]
    UserNotActivated(String),

    #[error("Password hashing failed: {0}")]
    HashingError(String),

    #[error("Token generation failed: {0}")]
    TokenGenerationError(String),

    #[error("Token verification failed: {0}")]
    TokenVerificationError(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Missing authorization header")]
    MissingAuthHeader,

    #[error("Invalid authorization header format")]
    InvalidAuthHeaderFormat,

    #[error("Access denied")]
    AccessDenied,
}

/// JWT claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user login)
    pub sub: String,
    /// Comma separated authorities
    pub auth: String,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at time (Unix timestamp)
    pub iat: i64,
}

impl Claims {
    /// Split the `auth` claim back into a set
    pub fn authorities(&self) -> BTreeSet<String> {
        self.auth
            .split(',')
            .map(str::trim)
            .filter(|a| !a.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// Hash a password using bcrypt
///
/// # Arguments
/// * `password` - The plain text password to hash
///
/// # Returns
/// * `Ok(String)` - The hashed password
/// * `Err(AuthError)` - If hashing fails
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    bcrypt::hash(password, BCRYPT_COST).map_err(|e| AuthError::HashingError(e.to_string()))
}

/// Verify a password against a bcrypt hash
///
/// # Arguments
/// * `password` - The plain text password to verify
/// * `hash` - The bcrypt hash to verify against
///
/// # Returns
/// * `Ok(true)` - If the password matches
/// * `Ok(false)` - If the password doesn't match
/// * `Err(AuthError)` - If verification fails
pub fn verify_password(password: &str, hash: &str) -> Result<bool, AuthError> {
    bcrypt::verify(password, hash).map_err(|e| AuthError::HashingError(e.to_string()))
}

/// Generate a random alphanumeric key for activation and password reset
pub fn generate_random_key() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(RANDOM_KEY_LENGTH)
        .map(char::from)
        .collect()
}

/// Generate a JWT token for a user
///
/// # Arguments
/// * `login` - The user's login, stored as the subject
/// * `authorities` - Authorities granted to the user
/// * `validity_seconds` - Lifetime of the token
/// * `secret` - The JWT secret key for signing
///
/// # Returns
/// * `Ok(String)` - The generated JWT token
/// * `Err(AuthError)` - If token generation fails
pub fn generate_token<'a>(
    login: &str,
    authorities: impl IntoIterator<Item = &'a String>,
    validity_seconds: i64,
    secret: &[u8],
) -> Result<String, AuthError> {
    let now = Utc::now();
    let expiry = now + Duration::seconds(validity_seconds);

    let claims = Claims {
        sub: login.to_string(),
        auth: authorities
            .into_iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(","),
        exp: expiry.timestamp(),
        iat: now.timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
        .map_err(|e| AuthError::TokenGenerationError(e.to_string()))
}

/// Verify and decode a JWT token
///
/// # Arguments
/// * `token` - The JWT token to verify
/// * `secret` - The JWT secret key for verification
///
/// # Returns
/// * `Ok(Claims)` - The decoded claims if valid
/// * `Err(AuthError)` - If verification fails or token is expired
pub fn verify_token(token: &str, secret: &[u8]) -> Result<Claims, AuthError> {
    let token_data: TokenData<Claims> = decode(
        token,
        &DecodingKey::from_secret(secret),
        &Validation::default(),
    )
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        _ => AuthError::TokenVerificationError(e.to_string()),
    })?;

    Ok(token_data.claims)
}

// ============================================================================
// HTTP-Only Cookie Management
// ============================================================================

/// Create an HTTP-only cookie containing the JWT token
///
/// # Arguments
/// * `token` - The JWT token to store in the cookie
/// * `max_age_seconds` - Cookie lifetime, matching the token validity
pub fn create_auth_cookie(token: &str, max_age_seconds: i64) -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE_NAME, token.to_owned())
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::seconds(max_age_seconds))
        .finish()
}

/// Create a cookie that clears the auth token (for logout)
pub fn create_logout_cookie() -> Cookie<'static> {
    Cookie::build(AUTH_COOKIE_NAME, "")
        .path("/")
        .http_only(true)
        .secure(true)
        .same_site(SameSite::Lax)
        .max_age(CookieDuration::ZERO)
        .finish()
}

/// Extract JWT token from cookie
pub fn extract_token_from_cookie(req: &HttpRequest) -> Option<String> {
    req.cookie(AUTH_COOKIE_NAME).map(|c| c.value().to_owned())
}

/// Extract JWT token from Authorization header
///
/// # Arguments
/// * `auth_header` - The Authorization header value
///
/// # Returns
/// * `Ok(&str)` - The extracted token
/// * `Err(AuthError)` - If the header format is invalid
pub fn extract_token_from_header(auth_header: &str) -> Result<&str, AuthError> {
    if !auth_header.starts_with("Bearer ") {
        return Err(AuthError::InvalidAuthHeaderFormat);
    }

    let token = auth_header.trim_start_matches("Bearer ").trim();
    if token.is_empty() {
        return Err(AuthError::InvalidAuthHeaderFormat);
    }

    Ok(token)
}

/// Validate an HTTP request and extract the authenticated user
///
/// This function checks for JWT token in the following order:
/// 1. Authorization header (Bearer token)
/// 2. HTTP-only cookie (auth_token)
pub fn validate_http_request(req: &HttpRequest, secret: &[u8]) -> Result<Auth, AuthError> {
    let token = if let Some(auth_header) = req
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        extract_token_from_header(auth_header)?.to_owned()
    } else if let Some(cookie_token) = extract_token_from_cookie(req) {
        cookie_token
    } else {
        return Err(AuthError::MissingAuthHeader);
    };

    let claims = verify_token(&token, secret)?;
    if claims.sub.is_empty() {
        return Err(AuthError::InvalidToken);
    }

    Ok(Auth {
        authorities: claims.authorities(),
        login: claims.sub,
    })
}

/// Configuration for the auth extractor and token issuing
#[derive(Clone)]
pub struct AuthConfig {
    /// JWT signing key
    pub jwt_secret: Vec<u8>,
    /// Token lifetime in seconds
    pub token_validity_seconds: i64,
    /// Token lifetime in seconds when "remember me" is checked
    pub remember_me_validity_seconds: i64,
}

impl AuthConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            jwt_secret: config.jwt_secret.clone(),
            token_validity_seconds: config.token_validity_seconds,
            remember_me_validity_seconds: config.remember_me_validity_seconds,
        }
    }

    /// Token lifetime for a login
    pub fn validity_seconds(&self, remember_me: bool) -> i64 {
        if remember_me {
            self.remember_me_validity_seconds
        } else {
            self.token_validity_seconds
        }
    }
}

/// Authenticated user extractor for Actix-web routes
///
/// Requires a valid token; use `Option<Auth>` for endpoints that also serve
/// anonymous callers.
///
/// # Example
/// ```ignore
/// async fn protected_route(user: Auth) -> impl Responder {
///     HttpResponse::Ok().json(format!("Hello, {}", user.login))
/// }
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Auth {
    /// The authenticated user's login
    pub login: String,
    /// Authorities carried by the token
    pub authorities: BTreeSet<String>,
}

impl Auth {
    pub fn has_authority(&self, authority: &str) -> bool {
        self.authorities.contains(authority)
    }

    pub fn is_admin(&self) -> bool {
        self.has_authority(ROLE_ADMIN)
    }

    /// Fail with `AccessDenied` unless the user holds `authority`
    pub fn require(&self, authority: &str) -> Result<(), AuthError> {
        if self.has_authority(authority) {
            Ok(())
        } else {
            Err(AuthError::AccessDenied)
        }
    }
}

impl FromRequest for Auth {
    type Error = actix_web::Error;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut actix_web::dev::Payload) -> Self::Future {
        let config = req.app_data::<web::Data<AuthConfig>>();

        let result = match config {
            Some(config) => match validate_http_request(req, &config.jwt_secret) {
                Ok(auth) => Ok(auth),
                Err(e) => {
                    let error_response = match &e {
                        AuthError::MissingAuthHeader => HttpResponse::Unauthorized()
                            .json(ApiError::new("Missing authorization header")),
                        AuthError::InvalidAuthHeaderFormat => HttpResponse::Unauthorized()
                            .json(ApiError::new("Invalid authorization header format")),
                        AuthError::TokenExpired => {
                            HttpResponse::Unauthorized().json(ApiError::new("Token expired"))
                        }
                        AuthError::TokenVerificationError(_) | AuthError::InvalidToken => {
                            HttpResponse::Unauthorized().json(ApiError::new("Invalid token"))
                        }
                        _ => HttpResponse::Unauthorized()
                            .json(ApiError::new("Authentication failed")),
                    };
                    Err(actix_web::error::InternalError::from_response(e, error_response).into())
                }
            },
            None => {
                tracing::error!("AuthConfig is not registered as app data");
                let error_response = HttpResponse::InternalServerError()
                    .json(ApiError::new("Auth configuration not found"));
                Err(actix_web::error::InternalError::from_response(
                    AuthError::TokenVerificationError("Config not found".to_string()),
                    error_response,
                )
                .into())
            }
        };

        ready(result)
    }
}

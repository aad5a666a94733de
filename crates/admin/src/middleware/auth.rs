//! Bearer token authentication and role extractors.
//!
//! Tokens are HS256 JWTs carrying the employee ID, display name and role.
//! Handlers take [`RequireEmployee`] for any signed-in employee or
//! [`RequireManager`] for catalog management and audits.
//!
//! # Example
//!
//! ```rust,ignore
//! async fn protected_handler(
//!     RequireManager(employee): RequireManager,
//! ) -> impl IntoResponse {
//!     format!("Hello, {}!", employee.name)
//! }
//! ```

use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use garage_core::{EmployeeId, EmployeeRole};

use crate::config::JwtConfig;
use crate::error::{AppError, set_sentry_user};
use crate::state::AppState;

/// Token claims.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Employee ID, as a decimal string.
    pub sub: String,
    /// Employee display name.
    pub name: String,
    pub role: EmployeeRole,
    /// Issued at (unix seconds).
    pub iat: i64,
    /// Expiry (unix seconds).
    pub exp: i64,
}

/// Token errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(#[source] jsonwebtoken::errors::Error),

    #[error("invalid subject: {0}")]
    InvalidSubject(String),

    #[error("failed to sign token: {0}")]
    Signing(#[source] jsonwebtoken::errors::Error),
}

/// Signing and verification keys derived from the configured secret.
#[derive(Clone)]
pub struct JwtKeys {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for JwtKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtKeys")
            .field("keys", &"[REDACTED]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl JwtKeys {
    #[must_use]
    pub fn new(config: &JwtConfig) -> Self {
        let secret = config.secret.expose_secret().as_bytes();
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl: Duration::minutes(config.ttl_minutes),
        }
    }

    /// Mint a token for an employee.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Signing` if encoding fails.
    pub fn issue(
        &self,
        employee_id: EmployeeId,
        name: &str,
        role: EmployeeRole,
    ) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: employee_id.to_string(),
            name: name.to_string(),
            role,
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding).map_err(AuthError::Signing)
    }

    /// Verify a token's signature and expiry.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidToken` for a bad signature, malformed claims
    /// or an expired token.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(AuthError::InvalidToken)
    }
}

/// The authenticated employee behind a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentEmployee {
    pub employee_id: EmployeeId,
    pub name: String,
    pub role: EmployeeRole,
}

impl Claims {
    /// The employee ID carried in `sub`.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidSubject` if `sub` is not an integer.
    pub fn employee_id(&self) -> Result<EmployeeId, AuthError> {
        self.sub
            .parse::<i32>()
            .map(EmployeeId::new)
            .map_err(|_| AuthError::InvalidSubject(self.sub.clone()))
    }
}

impl TryFrom<Claims> for CurrentEmployee {
    type Error = AuthError;

    fn try_from(claims: Claims) -> Result<Self, Self::Error> {
        Ok(Self {
            employee_id: claims.employee_id()?,
            name: claims.name,
            role: claims.role,
        })
    }
}

fn bearer_token(parts: &Parts) -> Result<&str, AuthError> {
    parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| {
            value
                .strip_prefix("Bearer ")
                .or_else(|| value.strip_prefix("bearer "))
        })
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingToken)
}

fn authenticate(parts: &Parts, state: &AppState) -> Result<CurrentEmployee, AppError> {
    let token = bearer_token(parts).map_err(|e| AppError::Unauthorized(e.to_string()))?;
    let employee = state
        .jwt()
        .verify(token)
        .and_then(CurrentEmployee::try_from)
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            AppError::Unauthorized("invalid or expired token".to_string())
        })?;

    set_sentry_user(employee.employee_id, &employee.name);
    Ok(employee)
}

/// Extractor that requires any authenticated employee.
#[derive(Debug, Clone)]
pub struct RequireEmployee(pub CurrentEmployee);

impl FromRequestParts<AppState> for RequireEmployee {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).map(Self)
    }
}

/// Extractor that requires a manager or admin.
#[derive(Debug, Clone)]
pub struct RequireManager(pub CurrentEmployee);

impl FromRequestParts<AppState> for RequireManager {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let employee = authenticate(parts, state)?;
        if !employee.role.can_manage_catalog() {
            return Err(AppError::Forbidden(format!(
                "role '{}' cannot perform this action",
                employee.role
            )));
        }
        Ok(Self(employee))
    }
}

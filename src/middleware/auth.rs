//! Authentication middleware for administrative model routes

use axum::{
    extract::{State, Request},
    middleware::Next,
    response::Response,
    http::header::AUTHORIZATION,
};
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::{AppError, AppState};

pub const ADMIN_ROLE: &str = "admin";

#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,      // Operator ID
    pub role: String,     // Operator role
    pub exp: usize,       // Expiration timestamp
}

/// Operator context extracted from JWT
#[derive(Debug, Clone)]
pub struct AdminContext {
    pub subject: String,
    pub role: String,
}

impl AdminContext {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Middleware: Require an admin JWT
pub async fn require_admin_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req)?;

    let token_data = decode::<Claims>(
        &token,
        &DecodingKey::from_secret(state.config.jwt_secret.as_bytes()),
        &Validation::default()
    )?;

    let ctx = AdminContext {
        subject: token_data.claims.sub,
        role: token_data.claims.role,
    };

    if !ctx.is_admin() {
        tracing::warn!("Admin required but {} has role '{}'", ctx.subject, ctx.role);
        return Err(AppError::Forbidden);
    }

    // Insert into request extensions
    req.extensions_mut().insert(ctx);

    Ok(next.run(req).await)
}

/// Issue an HS256 token (operator tooling and tests)
pub fn issue_token(secret: &str, subject: &str, role: &str, ttl_hours: i64) -> Result<String, AppError> {
    let exp = (chrono::Utc::now() + chrono::Duration::hours(ttl_hours)).timestamp();
    let claims = Claims {
        sub: subject.to_string(),
        role: role.to_string(),
        exp: exp.max(0) as usize,
    };

    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

/// Extract bearer token from Authorization header
fn extract_bearer_token(req: &Request) -> Result<String, AppError> {
    let auth_header = req.headers()
        .get(AUTHORIZATION)
        .ok_or(AppError::Unauthorized)?
        .to_str()
        .map_err(|_| AppError::Unauthorized)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::to_string)
        .ok_or(AppError::Unauthorized)
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for AdminContext
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts.extensions
            .get::<AdminContext>()
            .cloned()
            .ok_or(AppError::Unauthorized)
    }
}

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{authorization::Bearer, Authorization, HeaderMapExt};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::AppError;
use crate::state::AppState;

pub const SWEEP_SECRET_HEADER: &str = "x-sweep-secret";

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Customer,
    Staff,
    Admin,
}

impl FromStr for Role {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw {
            "CUSTOMER" => Ok(Role::Customer),
            "STAFF" => Ok(Role::Staff),
            "ADMIN" => Ok(Role::Admin),
            other => Err(AppError::Forbidden(format!("unknown role {}", other))),
        }
    }
}

/// The caller as resolved from the bearer token. Trusted as-is downstream.
#[derive(Debug, Clone)]
pub struct Identity {
    pub user_id: String,
    pub role: Role,
}

impl Identity {
    pub fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff | Role::Admin)
    }

    pub fn require_staff(&self) -> Result<(), AppError> {
        if self.is_staff() {
            Ok(())
        } else {
            Err(AppError::Forbidden("restaurant staff only".to_string()))
        }
    }

    /// Owners see their own records; staff see everything.
    pub fn require_owner_or_staff(&self, owner: &str) -> Result<(), AppError> {
        if self.is_staff() || self.user_id == owner {
            Ok(())
        } else {
            Err(AppError::Forbidden("not your reservation".to_string()))
        }
    }
}

// ============================================================================
// Bearer Authentication Middleware
// ============================================================================

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 1. Extract token from Authorization header
    let bearer = req
        .headers()
        .typed_get::<Authorization<Bearer>>()
        .ok_or_else(|| AppError::Unauthorized("missing bearer token".to_string()))?;

    // 2. Decode and validate JWT
    let token_data = decode::<Claims>(
        bearer.token(),
        &DecodingKey::from_secret(state.auth.secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| AppError::Unauthorized(e.to_string()))?;

    // 3. Resolve role
    let role = token_data.claims.role.parse::<Role>()?;

    // 4. Inject identity into request extensions
    req.extensions_mut().insert(Identity {
        user_id: token_data.claims.sub,
        role,
    });

    Ok(next.run(req).await)
}

// ============================================================================
// Scheduler Authentication Middleware
// ============================================================================

/// The sweep trigger carries a shared secret instead of a user token.
pub async fn sweep_secret_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let presented = req
        .headers()
        .get(SWEEP_SECRET_HEADER)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| AppError::Unauthorized("missing sweep secret".to_string()))?;

    if state.sweep_secret.is_empty() || presented != state.sweep_secret {
        tracing::warn!("Rejected sweep trigger with a bad secret");
        return Err(AppError::Unauthorized("invalid sweep secret".to_string()));
    }

    Ok(next.run(req).await)
}

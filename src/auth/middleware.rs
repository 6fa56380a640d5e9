//! Authentication Middleware
//!
//! Axum middleware guarding the trigger routes with a shared bearer key.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

/// The configured trigger key; `None` leaves the routes open.
#[derive(Clone, Default)]
pub struct TriggerKey(pub Option<Arc<str>>);

impl TriggerKey {
    pub fn new(key: Option<String>) -> Self {
        Self(key.map(Arc::from))
    }

    fn accepts(&self, presented: Option<&str>) -> bool {
        match (&self.0, presented) {
            (None, _) => true,
            (Some(expected), Some(token)) => bool::from(expected.as_bytes().ct_eq(token.as_bytes())),
            (Some(_), None) => false,
        }
    }
}

pub struct AuthMiddleware;

impl AuthMiddleware {
    /// Middleware function for validating the trigger bearer key
    pub async fn validate_trigger_key(
        State(key): State<TriggerKey>,
        req: Request,
        next: Next,
    ) -> Result<Response, StatusCode> {
        let token = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|auth_header| auth_header.strip_prefix("Bearer "));

        if !key.accepts(token) {
            tracing::warn!("[AuthMiddleware] Rejected {} {}: missing or invalid key", req.method(), req.uri());
            return Err(StatusCode::UNAUTHORIZED);
        }

        Ok(next.run(req).await)
    }
}

//! API middleware
//!
//! Request-id propagation, API-key authentication, and the admin gate.

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use uuid::Uuid;

use crate::domain::{AuthContext, LedgerError};
use crate::error::AppError;

use super::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
const API_KEY_HEADER: &str = "x-api-key";

/// Request id, echoed from the caller or freshly generated.
#[derive(Debug, Clone)]
pub struct RequestId(pub String);

/// Echoes `X-Request-Id` on every response; generates a UUIDv4 when the
/// caller did not send one.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    request
        .extensions_mut()
        .insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Resolves the request credential to an `AuthContext` extension.
///
/// The credential comes from `X-Api-Key`, or from `Authorization: Bearer`
/// when the former is absent.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, Response> {
    let headers = request.headers();
    let credential = headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
                .map(str::to_owned)
        });

    let Some(credential) = credential else {
        return Err(unauthorized("API key is required"));
    };

    let context = state
        .api_keys
        .authenticate(&credential)
        .await
        .map_err(|err| AppError::from(err).into_response())?;

    tracing::debug!(
        tenant_id = %context.tenant_id,
        api_key_id = %context.api_key_id,
        "authenticated request"
    );

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Rejects non-ADMIN callers. Layered onto the admin subtree only, after
/// `auth_middleware` has populated the extension.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, Response> {
    match request.extensions().get::<AuthContext>() {
        Some(context) if context.is_admin() => Ok(next.run(request).await),
        Some(_) => Err(AppError::from(LedgerError::Forbidden(
            "ADMIN role required".into(),
        ))
        .into_response()),
        None => Err(unauthorized("API key is required")),
    }
}

fn unauthorized(message: &'static str) -> Response {
    AppError::from(LedgerError::Unauthorized(message)).into_response()
}

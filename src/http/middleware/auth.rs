//! Tenant authentication.
//!
//! [`Auth`] takes the tenant from the `X-Scope-OrgID` header and rejects the
//! request with `401` when it is missing. [`FakeAuth`] is used when auth is
//! disabled and always injects the same tenant.

use axum::extract::Request;
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{from_fn, Next};
use axum::response::{IntoResponse, Response};
use tower::Layer;

use crate::http::context::RequestContext;
use crate::http::middleware::logging::log_request;
use crate::http::middleware::{into_handler, Handler, Middleware};

/// Header carrying the tenant id.
pub const ORG_ID_HEADER: &str = "X-Scope-OrgID";

/// Header carrying the (optional) user id.
pub const USER_ID_HEADER: &str = "X-Scope-UserID";

/// Tenant injected by [`FakeAuth`].
pub const FAKE_ORG_ID: &str = "fake";

/// Tenant extraction failure.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("no org id")]
    MissingOrgId,
    #[error("multiple org IDs present")]
    MultipleOrgIds,
}

/// Extract the tenant id from request headers.
pub fn extract_org_id(headers: &HeaderMap) -> Result<String, AuthError> {
    let mut values = headers.get_all(ORG_ID_HEADER).iter();
    let value = values.next().ok_or(AuthError::MissingOrgId)?;
    if values.next().is_some() {
        return Err(AuthError::MultipleOrgIds);
    }

    match value.to_str() {
        Ok(org_id) if !org_id.trim().is_empty() => Ok(org_id.trim().to_owned()),
        _ => Err(AuthError::MissingOrgId),
    }
}

fn current_context(request: &Request) -> RequestContext {
    request
        .extensions()
        .get::<RequestContext>()
        .cloned()
        .unwrap_or_default()
}

/// Header based tenant authentication.
#[derive(Debug, Clone, Copy, Default)]
pub struct Auth;

impl Middleware for Auth {
    fn wrap(&self, next: Handler) -> Handler {
        into_handler(from_fn(authenticate).layer(next))
    }
}

async fn authenticate(mut request: Request, next: Next) -> Response {
    let ctx = current_context(&request);

    let org_id = match extract_org_id(request.headers()) {
        Ok(org_id) => org_id,
        Err(err) => {
            // Logging sits inside this middleware, so the rejection is logged here.
            log_request(
                request.method(),
                request.uri(),
                request.headers(),
                Some(&ctx),
                StatusCode::UNAUTHORIZED,
            );
            return (StatusCode::UNAUTHORIZED, err.to_string()).into_response();
        }
    };

    let mut ctx = ctx.with_org_id(org_id);
    if let Some(user_id) = request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
    {
        ctx = ctx.with_user_id(user_id);
    }
    request.extensions_mut().insert(ctx);

    next.run(request).await
}

/// Authentication stand-in that never fails.
#[derive(Debug, Clone, Copy, Default)]
pub struct FakeAuth;

impl Middleware for FakeAuth {
    fn wrap(&self, next: Handler) -> Handler {
        into_handler(from_fn(inject_fake_org).layer(next))
    }
}

async fn inject_fake_org(mut request: Request, next: Next) -> Response {
    let ctx = current_context(&request).with_org_id(FAKE_ORG_ID);
    request.extensions_mut().insert(ctx);
    next.run(request).await
}

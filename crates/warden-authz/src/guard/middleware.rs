//! Axum integration: a per-route guard layer and the `Authorized` extractor.
//!
//! # Example
//!
//! ```ignore
//! use axum::{Router, routing::delete};
//! use warden_authz::guard::{Authorized, GuardLayer, OperationMeta};
//!
//! static GROUP_DELETE: OperationMeta =
//!     OperationMeta::permission("group.delete", "group", "delete");
//!
//! async fn delete_group(Authorized(caller): Authorized) -> &'static str {
//!     "deleted"
//! }
//!
//! let app: Router = Router::new().route(
//!     "/groups/{id}",
//!     delete(delete_group).route_layer(GuardLayer::new(guard, &GROUP_DELETE)),
//! );
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::{FromRequestParts, RawPathParams, Request};
use axum::http::header::AUTHORIZATION;
use axum::http::{HeaderMap, request::Parts};
use axum::response::{IntoResponse, Response};
use tower::{Layer, Service};

use crate::error::AuthzError;

use super::context::RequestFields;
use super::enforce::{AuthorizedPrincipal, EnforcementGuard};
use super::operation::OperationMeta;

/// Path parameter treated as the operation's target record.
pub const TARGET_PARAM: &str = "id";

/// Extracts the token from an `Authorization: Bearer <token>` header.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

async fn request_fields(parts: &mut Parts) -> RequestFields {
    match RawPathParams::from_request_parts(parts, &()).await {
        Ok(params) => RequestFields {
            target_id: params
                .iter()
                .find(|(name, _)| *name == TARGET_PARAM)
                .map(|(_, value)| value.to_string()),
            ..RequestFields::default()
        },
        Err(_) => RequestFields::default(),
    }
}

// =============================================================================
// Layer
// =============================================================================

/// Enforces one operation's access requirement in front of a route.
///
/// On success the [`AuthorizedPrincipal`] is stored in the request
/// extensions; on failure the error response is returned without calling
/// the handler.
#[derive(Clone)]
pub struct GuardLayer {
    guard: Arc<EnforcementGuard>,
    operation: &'static OperationMeta,
}

impl GuardLayer {
    /// Creates a layer for `operation`.
    pub fn new(guard: Arc<EnforcementGuard>, operation: &'static OperationMeta) -> Self {
        Self { guard, operation }
    }
}

impl<S> Layer<S> for GuardLayer {
    type Service = GuardService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        GuardService {
            inner,
            guard: Arc::clone(&self.guard),
            operation: self.operation,
        }
    }
}

/// Service produced by [`GuardLayer`].
#[derive(Clone)]
pub struct GuardService<S> {
    inner: S,
    guard: Arc<EnforcementGuard>,
    operation: &'static OperationMeta,
}

impl<S> Service<Request> for GuardService<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Response, Infallible>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let guard = Arc::clone(&self.guard);
        let operation = self.operation;
        // The readied service must handle this request; leave a fresh clone behind.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        Box::pin(async move {
            let (mut parts, body) = request.into_parts();
            let fields = request_fields(&mut parts).await;

            let outcome = guard
                .enforce(operation, bearer_token(&parts.headers), &fields)
                .await;

            match outcome {
                Ok(principal) => {
                    if let Some(principal) = principal {
                        parts.extensions.insert(principal);
                    }
                    inner.call(Request::from_parts(parts, body)).await
                }
                Err(error) => Ok(error.into_response()),
            }
        })
    }
}

// =============================================================================
// Extractor
// =============================================================================

/// Principal established by the guard layer.
///
/// Rejects with `Unauthorized` if the route is not behind a non-public
/// [`GuardLayer`].
#[derive(Debug, Clone)]
pub struct Authorized(pub AuthorizedPrincipal);

impl<S> FromRequestParts<S> for Authorized
where
    S: Send + Sync,
{
    type Rejection = AuthzError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthorizedPrincipal>()
            .cloned()
            .map(Authorized)
            .ok_or_else(|| AuthzError::unauthorized("Request was not authenticated"))
    }
}

use std::{net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    BoxError, Router,
    error_handling::HandleErrorLayer,
    http::StatusCode,
    response::IntoResponse,
    routing::{MethodRouter, delete, get, patch, post},
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use warden_authz::{EnforcementGuard, GuardLayer, OperationMeta};

use crate::{config::AppConfig, handlers, state::AppState};

static HEALTH: OperationMeta = OperationMeta::public("health");
static ME_PERMISSIONS: OperationMeta = OperationMeta::authenticated("me.permissions");
static AUTHZ_CHECK: OperationMeta = OperationMeta::authenticated("authz.check");
static PRINCIPAL_CREATE: OperationMeta =
    OperationMeta::permission("principal.create", "principal", "create");
static PRINCIPAL_REAUTHORIZE: OperationMeta =
    OperationMeta::permission("principal.reauthorize", "principal", "update");
static PERMISSION_LIST: OperationMeta =
    OperationMeta::permission("permission.list", "permission", "read");
static PERMISSION_CREATE: OperationMeta =
    OperationMeta::permission("permission.create", "permission", "create");
static GROUP_LIST: OperationMeta = OperationMeta::permission("group.list", "group", "read");
static GROUP_CREATE: OperationMeta = OperationMeta::permission("group.create", "group", "create");
static GROUP_UPDATE: OperationMeta = OperationMeta::permission("group.update", "group", "update");
static GROUP_DELETE: OperationMeta = OperationMeta::permission("group.delete", "group", "delete");
static GRANT_ASSIGN: OperationMeta = OperationMeta::permission("grant.assign", "grant", "create");
static GRANT_REVOKE: OperationMeta = OperationMeta::permission("grant.revoke", "grant", "delete");
static MEMBERSHIP_ADD: OperationMeta =
    OperationMeta::permission("membership.add", "membership", "create");
static MEMBERSHIP_REMOVE: OperationMeta =
    OperationMeta::permission("membership.remove", "membership", "delete");

/// Every route with the operation it enforces.
pub static OPERATIONS: &[&OperationMeta] = &[
    &HEALTH,
    &ME_PERMISSIONS,
    &AUTHZ_CHECK,
    &PRINCIPAL_CREATE,
    &PRINCIPAL_REAUTHORIZE,
    &PERMISSION_LIST,
    &PERMISSION_CREATE,
    &GROUP_LIST,
    &GROUP_CREATE,
    &GROUP_UPDATE,
    &GROUP_DELETE,
    &GRANT_ASSIGN,
    &GRANT_REVOKE,
    &MEMBERSHIP_ADD,
    &MEMBERSHIP_REMOVE,
];

fn guarded(
    guard: &Arc<EnforcementGuard>,
    operation: &'static OperationMeta,
    route: MethodRouter<AppState>,
) -> MethodRouter<AppState> {
    route.route_layer(GuardLayer::new(guard.clone(), operation))
}

pub fn build_app(state: AppState, cfg: &AppConfig) -> Router {
    let body_limit = cfg.server.body_limit_bytes;
    let timeout = cfg.request_timeout();
    let guard = state.guard.clone();
    let g = &guard;

    Router::new()
        .route("/health", guarded(g, &HEALTH, get(handlers::health)))
        .route(
            "/me/permissions",
            guarded(g, &ME_PERMISSIONS, get(handlers::my_permissions)),
        )
        .route(
            "/authz/check",
            guarded(g, &AUTHZ_CHECK, post(handlers::check)),
        )
        // Principals
        .route(
            "/principals",
            guarded(g, &PRINCIPAL_CREATE, post(handlers::create_principal)),
        )
        .route(
            "/principals/{id}/reauthorize",
            guarded(g, &PRINCIPAL_REAUTHORIZE, post(handlers::reauthorize_principal)),
        )
        .route(
            "/principals/{id}/permissions",
            guarded(g, &GRANT_ASSIGN, post(handlers::assign_user_permission)),
        )
        .route(
            "/principals/{id}/permissions/{permission_id}",
            guarded(g, &GRANT_REVOKE, delete(handlers::revoke_user_permission)),
        )
        .route(
            "/principals/{id}/groups",
            guarded(g, &MEMBERSHIP_ADD, post(handlers::add_group_member)),
        )
        .route(
            "/principals/{id}/groups/{group_id}",
            guarded(g, &MEMBERSHIP_REMOVE, delete(handlers::remove_group_member)),
        )
        // Permission catalog
        .route(
            "/permissions",
            guarded(g, &PERMISSION_LIST, get(handlers::list_permissions)).merge(guarded(
                g,
                &PERMISSION_CREATE,
                post(handlers::create_permission),
            )),
        )
        // Groups
        .route(
            "/groups",
            guarded(g, &GROUP_LIST, get(handlers::list_groups)).merge(guarded(
                g,
                &GROUP_CREATE,
                post(handlers::create_group),
            )),
        )
        .route(
            "/groups/{id}",
            guarded(g, &GROUP_UPDATE, patch(handlers::update_group)).merge(guarded(
                g,
                &GROUP_DELETE,
                delete(handlers::delete_group),
            )),
        )
        .route(
            "/groups/{id}/permissions",
            guarded(g, &GRANT_ASSIGN, post(handlers::assign_group_permission)),
        )
        .route(
            "/groups/{id}/permissions/{permission_id}",
            guarded(g, &GRANT_REVOKE, delete(handlers::revoke_group_permission)),
        )
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(HandleErrorLayer::new(handle_timeout))
                .timeout(timeout),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|req: &axum::http::Request<_>| {
                    use tracing::field::Empty;
                    tracing::info_span!(
                        "http.request",
                        http.method = %req.method(),
                        http.target = %req.uri(),
                        http.status_code = Empty,
                    )
                })
                .on_response(
                    |res: &axum::http::Response<_>, latency: Duration, span: &tracing::Span| {
                        span.record(
                            "http.status_code",
                            tracing::field::display(res.status().as_u16()),
                        );
                        tracing::info!(
                            http.status = %res.status().as_u16(),
                            elapsed_ms = %latency.as_millis(),
                            "request handled"
                        );
                    },
                ),
        )
        .layer(axum::extract::DefaultBodyLimit::max(body_limit))
}

async fn handle_timeout(err: BoxError) -> impl IntoResponse {
    if err.is::<tower::timeout::error::Elapsed>() {
        (StatusCode::REQUEST_TIMEOUT, "request timed out".to_string())
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("unhandled internal error: {err}"),
        )
    }
}

pub struct ServerBuilder {
    addr: SocketAddr,
    config: AppConfig,
}

impl Default for ServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerBuilder {
    pub fn new() -> Self {
        let cfg = AppConfig::default();
        Self {
            addr: cfg.addr(),
            config: cfg,
        }
    }

    pub fn with_config(mut self, cfg: AppConfig) -> Self {
        self.addr = cfg.addr();
        self.config = cfg;
        self
    }

    /// Wires the engine, runs bootstrap and builds the router.
    pub async fn build(self) -> anyhow::Result<WardenServer> {
        let (state, report) = AppState::init(&self.config).await?;

        if let (Some(admin), true) = (report.admin, self.config.bootstrap.log_admin_token) {
            let tenant = state.grants.global_tenant().clone();
            let (claims, token) = state.tokens.issue(admin, &tenant).await?;
            tracing::warn!(
                principal = %admin,
                tenant = %claims.tenant,
                exp = claims.exp,
                token = %token,
                "Issued bootstrap admin token"
            );
        }

        let cleanup_every = self.config.authz.cache.ttl;
        let app = build_app(state.clone(), &self.config);

        Ok(WardenServer {
            addr: self.addr,
            app,
            state,
            cleanup_every,
        })
    }
}

pub struct WardenServer {
    addr: SocketAddr,
    app: Router,
    state: AppState,
    cleanup_every: Duration,
}

impl WardenServer {
    pub async fn run(self) -> anyhow::Result<()> {
        let cleanup = spawn_cache_cleanup(self.state.clone(), self.cleanup_every);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        tracing::info!("listening on {}", self.addr);
        let served = axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await;

        cleanup.abort();
        served?;
        Ok(())
    }
}

/// Periodically drops expired local cache entries and reports cache counters.
fn spawn_cache_cleanup(state: AppState, every: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = state.cache.cleanup_expired();
            let stats = state.cache.stats();
            tracing::debug!(
                removed,
                hits = stats.hits,
                misses = stats.misses,
                fail_opens = stats.fail_opens,
                invalidations = stats.invalidations,
                "permission cache sweep"
            );
        }
    })
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

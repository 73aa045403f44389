use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use uuid::Uuid;
use warden_authz::{
    Authorized, AuthorizedPrincipal, AuthzResult, Effect, GroupUpdate, NewGroup,
    PermissionSnapshot, RequestFields, TenantId,
};

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

// ---- Caller ----

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MyPermissions {
    principal_id: Uuid,
    tenant: TenantId,
    #[serde(flatten)]
    snapshot: PermissionSnapshot,
}

pub async fn my_permissions(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
) -> AuthzResult<Json<MyPermissions>> {
    let snapshot = state
        .cache
        .snapshot(caller.principal_id, &caller.tenant, caller.token_version)
        .await?;
    Ok(Json(MyPermissions {
        principal_id: caller.principal_id,
        tenant: caller.tenant,
        snapshot,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub target_id: Option<String>,
    #[serde(default)]
    pub attributes: Map<String, Value>,
}

/// Evaluates a permission for the caller in the token's tenant.
pub async fn check(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Json(body): Json<CheckRequest>,
) -> AuthzResult<impl IntoResponse> {
    let fields = RequestFields {
        target_id: body.target_id,
        attributes: body.attributes,
    };
    let context = fields.to_context(caller.principal_id);
    let decision = state
        .cache
        .decide(
            caller.principal_id,
            &caller.tenant,
            caller.token_version,
            &body.resource,
            &body.action,
            Some(&context),
        )
        .await?;

    Ok(Json(json!({
        "allowed": decision.is_allowed(),
        "decision": decision,
    })))
}

// ---- Principals ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePrincipal {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub display_name: String,
}

pub async fn create_principal(
    State(state): State<AppState>,
    Json(body): Json<CreatePrincipal>,
) -> AuthzResult<impl IntoResponse> {
    let principal = state
        .grants
        .register_principal(body.id, &body.display_name)
        .await?;
    Ok((StatusCode::CREATED, Json(principal)))
}

pub async fn reauthorize_principal(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> AuthzResult<StatusCode> {
    state.grants.force_reauthorization(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Permission catalog ----

#[derive(Debug, Deserialize)]
pub struct CreatePermission {
    pub resource: String,
    pub action: String,
    #[serde(default)]
    pub description: Option<String>,
}

pub async fn list_permissions(State(state): State<AppState>) -> AuthzResult<impl IntoResponse> {
    let permissions = state.grants.store().list_permissions().await?;
    Ok(Json(permissions))
}

pub async fn create_permission(
    State(state): State<AppState>,
    Json(body): Json<CreatePermission>,
) -> AuthzResult<impl IntoResponse> {
    let permission = state
        .grants
        .create_permission(&body.resource, &body.action, body.description)
        .await?;
    Ok((StatusCode::CREATED, Json(permission)))
}

// ---- Tenant scope ----

/// The tenant a request targets, defaulting to the caller's own. Tenant-scoped
/// callers cannot name another tenant.
fn target_tenant(
    state: &AppState,
    caller: &AuthorizedPrincipal,
    requested: Option<TenantId>,
) -> AuthzResult<TenantId> {
    let tenant = requested.unwrap_or_else(|| caller.tenant.clone());
    state.grants.authorize_tenant(&caller.tenant, &tenant)?;
    Ok(tenant)
}

// ---- Groups ----

#[derive(Debug, Default, Deserialize)]
pub struct TenantQuery {
    #[serde(default)]
    pub tenant: Option<TenantId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateGroup {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    /// Defaults to the caller's tenant.
    #[serde(default)]
    pub tenant: Option<TenantId>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

/// Global callers list every tenant unless one is named; everyone else sees
/// their own tenant.
pub async fn list_groups(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Query(query): Query<TenantQuery>,
) -> AuthzResult<impl IntoResponse> {
    let tenant = if caller.tenant == *state.grants.global_tenant() {
        query.tenant
    } else {
        Some(target_tenant(&state, &caller, query.tenant)?)
    };
    let groups = state.grants.store().list_groups(tenant.as_ref()).await?;
    Ok(Json(groups))
}

pub async fn create_group(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Json(body): Json<CreateGroup>,
) -> AuthzResult<impl IntoResponse> {
    let tenant = target_tenant(&state, &caller, body.tenant)?;
    let mut input = NewGroup::new(body.name, tenant);
    input.description = body.description;
    if let Some(active) = body.is_active {
        input.is_active = active;
    }
    let group = state.grants.create_group(input).await?;
    Ok((StatusCode::CREATED, Json(group)))
}

pub async fn update_group(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path(id): Path<Uuid>,
    Json(update): Json<GroupUpdate>,
) -> AuthzResult<impl IntoResponse> {
    state.grants.managed_group(&caller.tenant, id).await?;
    let group = state.grants.update_group(id, update).await?;
    Ok(Json(group))
}

pub async fn delete_group(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path(id): Path<Uuid>,
) -> AuthzResult<StatusCode> {
    state.grants.managed_group(&caller.tenant, id).await?;
    state.grants.delete_group(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Grants ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignGrant {
    pub permission_id: Uuid,
    pub effect: Effect,
    #[serde(default)]
    pub conditions: Option<Vec<Value>>,
    /// Direct grants only. Defaults to the caller's tenant.
    #[serde(default)]
    pub tenant: Option<TenantId>,
}

pub async fn assign_group_permission(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignGrant>,
) -> AuthzResult<impl IntoResponse> {
    state.grants.managed_group(&caller.tenant, id).await?;
    let grant = state
        .grants
        .assign_group_permission(
            id,
            body.permission_id,
            body.effect,
            body.conditions.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn revoke_group_permission(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
) -> AuthzResult<StatusCode> {
    state.grants.managed_group(&caller.tenant, id).await?;
    state
        .grants
        .revoke_group_permission(id, permission_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn assign_user_permission(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path(id): Path<Uuid>,
    Json(body): Json<AssignGrant>,
) -> AuthzResult<impl IntoResponse> {
    let tenant = target_tenant(&state, &caller, body.tenant)?;
    let grant = state
        .grants
        .assign_user_permission(
            id,
            body.permission_id,
            tenant,
            body.effect,
            body.conditions.as_deref(),
        )
        .await?;
    Ok((StatusCode::CREATED, Json(grant)))
}

pub async fn revoke_user_permission(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path((id, permission_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<TenantQuery>,
) -> AuthzResult<StatusCode> {
    let tenant = target_tenant(&state, &caller, query.tenant)?;
    state
        .grants
        .revoke_user_permission(id, permission_id, tenant)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- Memberships ----

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddMember {
    pub group_id: Uuid,
    #[serde(default)]
    pub tenant: Option<TenantId>,
}

pub async fn add_group_member(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path(id): Path<Uuid>,
    Json(body): Json<AddMember>,
) -> AuthzResult<impl IntoResponse> {
    let tenant = target_tenant(&state, &caller, body.tenant)?;
    state
        .grants
        .joinable_group(&caller.tenant, body.group_id)
        .await?;
    let membership = state
        .grants
        .add_group_member(id, body.group_id, tenant)
        .await?;
    Ok((StatusCode::CREATED, Json(membership)))
}

pub async fn remove_group_member(
    State(state): State<AppState>,
    Authorized(caller): Authorized,
    Path((id, group_id)): Path<(Uuid, Uuid)>,
    Query(query): Query<TenantQuery>,
) -> AuthzResult<StatusCode> {
    let tenant = target_tenant(&state, &caller, query.tenant)?;
    state.grants.joinable_group(&caller.tenant, group_id).await?;
    state
        .grants
        .remove_group_member(id, group_id, tenant)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

//! Framework-agnostic enforcement.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::AuthzResult;
use crate::cache::EdgePermissionCache;
use crate::error::AuthzError;
use crate::policy::DenyReason;
use crate::token::{AccessClaims, TokenCodec};
use crate::types::TenantId;

use super::context::RequestFields;
use super::operation::OperationMeta;

/// Identity the guard established for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizedPrincipal {
    /// Authenticated principal.
    pub principal_id: Uuid,
    /// Tenant from the token.
    pub tenant: TenantId,
    /// Auth version stamped in the token.
    pub token_version: i64,
}

impl From<&AccessClaims> for AuthorizedPrincipal {
    fn from(claims: &AccessClaims) -> Self {
        Self {
            principal_id: claims.principal_id,
            tenant: claims.tenant.clone(),
            token_version: claims.ver,
        }
    }
}

/// Checks identity and permissions for inbound operations.
pub struct EnforcementGuard {
    tokens: Arc<TokenCodec>,
    cache: Arc<EdgePermissionCache>,
}

impl EnforcementGuard {
    /// Creates a guard.
    pub fn new(tokens: Arc<TokenCodec>, cache: Arc<EdgePermissionCache>) -> Self {
        Self { tokens, cache }
    }

    /// The permission cache the guard consults.
    pub fn cache(&self) -> &EdgePermissionCache {
        &self.cache
    }

    /// The token codec the guard verifies with.
    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Enforces `operation` for a request.
    ///
    /// Returns `Ok(None)` for public operations (no identity is established)
    /// and the authorized principal otherwise.
    ///
    /// # Errors
    ///
    /// - `Unauthorized` for a missing or invalid token, or a principal that
    ///   no longer exists. No permission check runs in that case.
    /// - `Forbidden` when the principal lacks the required permission.
    /// - `Evaluation` for unexpected store failures.
    pub async fn enforce(
        &self,
        operation: &OperationMeta,
        bearer: Option<&str>,
        fields: &RequestFields,
    ) -> AuthzResult<Option<AuthorizedPrincipal>> {
        if operation.is_public() {
            return Ok(None);
        }

        let token = bearer
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AuthzError::unauthorized("Missing bearer token"))?;
        let claims = self.tokens.verify(token)?;
        let principal = AuthorizedPrincipal::from(&claims);

        let Some((resource, action)) = operation.required() else {
            self.cache
                .permissions(principal.principal_id, &principal.tenant, principal.token_version)
                .await
                .map_err(unknown_principal)?;
            return Ok(Some(principal));
        };

        let context = fields.to_context(principal.principal_id);
        let decision = self
            .cache
            .decide(
                principal.principal_id,
                &principal.tenant,
                principal.token_version,
                resource,
                action,
                Some(&context),
            )
            .await
            .map_err(unknown_principal)?;

        if let Some(reason) = decision.deny_reason() {
            let why = match reason {
                DenyReason::DeniedBy { grant } => format!("denied by {:?} grant", grant.source),
                DenyReason::NoMatchingGrant => "no matching grant".to_string(),
            };
            tracing::debug!(
                principal = %principal.principal_id,
                tenant = %principal.tenant,
                operation = operation.name,
                resource,
                action,
                reason = %why,
                "Operation denied"
            );
            return Err(AuthzError::forbidden(format!(
                "{} requires {resource}:{action}",
                operation.name
            )));
        }

        Ok(Some(principal))
    }
}

fn unknown_principal(error: AuthzError) -> AuthzError {
    if error.is_not_found("principal") {
        AuthzError::unauthorized("Unknown principal")
    } else {
        error
    }
}

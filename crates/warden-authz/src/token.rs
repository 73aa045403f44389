//! Access token claims carrying the auth version.
//!
//! Tokens are HS256 JWTs with the claim set
//! `{ principalId, tenant, ver, iss, iat, exp }`. `ver` is the principal's
//! auth version at issuance; the edge cache uses it as a key partition and a
//! consistency check, never as a staleness gate.
//!
//! # Example
//!
//! ```ignore
//! let codec = TokenCodec::new(&config.token, ledger)?;
//! let (claims, token) = codec.issue(principal, &tenant).await?;
//! let verified = codec.verify(&token)?;
//! assert_eq!(verified.ver, claims.ver);
//! ```

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthzResult;
use crate::config::{StoreConfig, TokenConfig};
use crate::error::AuthzError;
use crate::ledger::AuthVersionLedger;
use crate::storage::bounded;
use crate::types::TenantId;

/// Claims embedded in every access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessClaims {
    /// Authenticated principal.
    pub principal_id: Uuid,
    /// Tenant the token is scoped to.
    pub tenant: TenantId,
    /// Auth version at issuance.
    pub ver: i64,
    /// Issuer.
    pub iss: String,
    /// Issued-at (Unix seconds).
    pub iat: i64,
    /// Expiry (Unix seconds).
    pub exp: i64,
}

/// Issues and verifies access tokens.
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    issuer: String,
    lifetime: time::Duration,
    leeway: u64,
    ledger: Arc<dyn AuthVersionLedger>,
    ledger_timeout: Duration,
}

impl TokenCodec {
    /// Creates a codec from configuration.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the secret is shorter than 32 bytes or the
    /// lifetime does not fit a timestamp offset.
    pub fn new(config: &TokenConfig, ledger: Arc<dyn AuthVersionLedger>) -> AuthzResult<Self> {
        if config.secret.len() < 32 {
            return Err(AuthzError::configuration(
                "token.secret must be at least 32 bytes",
            ));
        }
        let lifetime = time::Duration::try_from(config.lifetime)
            .map_err(|e| AuthzError::configuration(format!("token.lifetime: {e}")))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            issuer: config.issuer.clone(),
            lifetime,
            leeway: config.leeway.as_secs(),
            ledger,
            ledger_timeout: StoreConfig::default().operation_timeout,
        })
    }

    /// Bounds the ledger read made while issuing.
    #[must_use]
    pub fn with_ledger_timeout(mut self, timeout: Duration) -> Self {
        self.ledger_timeout = timeout;
        self
    }

    /// Stamps claims for `principal` with its current auth version, creating
    /// the ledger row at version 1 if needed, and signs them.
    ///
    /// # Errors
    ///
    /// Returns ledger errors, `Timeout` if the ledger does not answer in
    /// time, or `Internal` if signing fails.
    pub async fn issue(
        &self,
        principal: Uuid,
        tenant: &TenantId,
    ) -> AuthzResult<(AccessClaims, String)> {
        let ver = bounded(
            self.ledger_timeout,
            "ensure_auth_version",
            self.ledger.ensure(principal),
        )
        .await?;
        let now = OffsetDateTime::now_utc();
        let claims = AccessClaims {
            principal_id: principal,
            tenant: tenant.clone(),
            ver,
            iss: self.issuer.clone(),
            iat: now.unix_timestamp(),
            exp: (now + self.lifetime).unix_timestamp(),
        };
        let token = self.encode(&claims)?;

        tracing::debug!(principal = %principal, tenant = %tenant, ver, "Issued access token");
        Ok((claims, token))
    }

    /// Signs a claim set as-is.
    ///
    /// # Errors
    ///
    /// Returns `Internal` if signing fails.
    pub fn encode(&self, claims: &AccessClaims) -> AuthzResult<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| AuthzError::internal(format!("failed to sign token: {e}")))
    }

    /// Verifies signature, issuer and expiry and returns the claims.
    ///
    /// # Errors
    ///
    /// Returns `Unauthorized` for any invalid token.
    pub fn verify(&self, token: &str) -> AuthzResult<AccessClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&self.issuer]);
        validation.validate_exp = true;
        validation.validate_aud = false;
        validation.leeway = self.leeway;

        decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                use jsonwebtoken::errors::ErrorKind;

                let message = match e.kind() {
                    ErrorKind::ExpiredSignature => "token expired".to_string(),
                    ErrorKind::InvalidSignature => "invalid token signature".to_string(),
                    ErrorKind::InvalidIssuer => "invalid token issuer".to_string(),
                    _ => format!("invalid token: {e}"),
                };
                AuthzError::unauthorized(message)
            })
    }
}

//! Principal resolution: raw request credentials to a [`Principal`].
//!
//! Three credential sources are reconciled here, selected by `auth.mode`:
//! bearer JWTs, trusted forwarded headers, and the local development
//! fallback. Each source follows the same shape:
//!
//! - `None`: the source is not applicable (no credentials of that kind present)
//! - `Some(Ok(principal))`: successful resolution
//! - `Some(Err(error))`: credentials were present but invalid
//!
//! Resolution establishes *who* is calling, nothing more: an inactive user
//! resolves successfully and is denied later by the authorization gate.

use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::request::Parts,
};
use tracing::{debug, instrument, trace};

use crate::{
    auth::{
        principal::{AuthMethod, Principal},
        provisioning::{ensure_user, ForwardedClaims},
        token,
    },
    config::{AuthMode, Environment},
    db::handlers::{Repository, Users},
    errors::{Error, Result},
    AppState,
};

/// Extract and verify a bearer token, then re-read the user row so the
/// principal reflects current `is_admin`/`is_active`, not stale claims.
#[instrument(skip(parts, state))]
async fn try_bearer_auth(parts: &Parts, state: &AppState) -> Option<Result<Principal>> {
    let auth_header = parts.headers.get(axum::http::header::AUTHORIZATION)?;

    let auth_str = match auth_header.to_str() {
        Ok(s) => s,
        Err(e) => {
            return Some(Err(Error::BadRequest {
                message: format!("Invalid authorization header: {e}"),
            }))
        }
    };

    // Not a bearer token - other schemes are not credentials we understand
    let token = auth_str.strip_prefix("Bearer ")?;

    let claims = match token::verify_token(token, &state.config) {
        Ok(claims) => claims,
        Err(e) => return Some(Err(e)),
    };

    let mut conn = match state.db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(Error::Database(e.into()))),
    };
    let mut users = Users::new(&mut conn);

    match users.get_by_id(claims.sub).await {
        Ok(Some(user)) => Some(Ok(Principal::from_user(&user, AuthMethod::Jwt))),
        Ok(None) => Some(Err(Error::Unauthenticated {
            message: Some("Unknown token subject".to_string()),
        })),
        Err(e) => Some(Err(Error::Database(e))),
    }
}

/// Resolve identity from the forwarded-header allow-list.
///
/// Only the configured headers are ever consulted, and only because the
/// deployment guarantees the request came through the proxy hop that sets
/// them. Unseen identities are provisioned on the spot.
#[instrument(skip(parts, state))]
async fn try_forwarded_auth(parts: &Parts, state: &AppState) -> Option<Result<Principal>> {
    let forwarded = &state.config.auth.forwarded;

    let email = parts
        .headers
        .get(&forwarded.email_header)
        .and_then(|h| h.to_str().ok())?
        .to_string();

    let username = parts
        .headers
        .get(&forwarded.user_header)
        .and_then(|h| h.to_str().ok())
        .unwrap_or(&email)
        .to_string();
    let preferred_username = parts
        .headers
        .get(&forwarded.preferred_username_header)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());
    let full_name = preferred_username.unwrap_or_else(|| username.clone());

    let claims = ForwardedClaims {
        email,
        username,
        full_name: Some(full_name),
        provider: forwarded.provider_label.clone(),
    };

    let mut conn = match state.db.acquire().await {
        Ok(conn) => conn,
        Err(e) => return Some(Err(Error::Database(e.into()))),
    };

    match ensure_user(&mut conn, &claims, forwarded.allow_email_linking).await {
        Ok(user) => Some(Ok(Principal::from_user(&user, AuthMethod::ForwardedHeaders))),
        Err(e) => Some(Err(e)),
    }
}

/// Synthesize the fixed development identity. Only reachable when the config
/// enables it in a `local` environment and the request carried no credentials.
#[instrument(skip(state))]
async fn local_fallback_principal(state: &AppState) -> Result<Principal> {
    let fallback = &state.config.auth.local_fallback;
    let claims = ForwardedClaims {
        email: fallback.email.clone(),
        username: fallback.username.clone(),
        full_name: None,
        provider: "local-fallback".to_string(),
    };

    let mut conn = state.db.acquire().await.map_err(|e| Error::Database(e.into()))?;
    let user = ensure_user(&mut conn, &claims, false).await?;
    Ok(Principal::from_user(&user, AuthMethod::LocalFallback))
}

/// Resolve the request's credentials according to the configured auth mode.
#[instrument(skip(parts, state), fields(mode = ?state.config.auth.mode))]
pub async fn resolve(parts: &Parts, state: &AppState) -> Result<Principal> {
    let mode = state.config.auth.mode;
    let mut credentials_seen = false;

    if matches!(mode, AuthMode::Jwt | AuthMode::Hybrid) {
        match try_bearer_auth(parts, state).await {
            Some(Ok(principal)) => {
                debug!(user_id = %principal.user_id, "authenticated via bearer token");
                return Ok(principal);
            }
            Some(Err(e)) => {
                credentials_seen = true;
                if mode == AuthMode::Jwt {
                    return Err(e);
                }
                // Hybrid: an invalid token falls through to forwarded headers
                trace!("bearer authentication failed, trying forwarded headers: {e:?}");
            }
            None => {
                trace!("no bearer credentials present");
            }
        }
    }

    if matches!(mode, AuthMode::ForwardedHeaders | AuthMode::Hybrid) {
        match try_forwarded_auth(parts, state).await {
            Some(Ok(principal)) => {
                debug!(user_id = %principal.user_id, "authenticated via forwarded headers");
                return Ok(principal);
            }
            Some(Err(e)) => return Err(e),
            None => {
                trace!("no forwarded-header credentials present");
            }
        }
    }

    // The fallback identity only stands in when *no* credentials were present
    if !credentials_seen && state.config.auth.local_fallback.enabled && state.config.environment == Environment::Local {
        debug!("no credentials present, using local fallback identity");
        return local_fallback_principal(state).await;
    }

    Err(Error::Unauthenticated { message: None })
}

impl FromRequestParts<AppState> for Principal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        resolve(parts, state).await
    }
}

/// Optional extraction for endpoints that serve both authenticated and
/// anonymous callers (the GraphQL endpoint). Absent or invalid credentials
/// become `None`; infrastructure failures still propagate.
impl OptionalFromRequestParts<AppState> for Principal {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        match resolve(parts, state).await {
            Ok(principal) => Ok(Some(principal)),
            Err(Error::Unauthenticated { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

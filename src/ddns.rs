//! Dynamic-DNS update path.
//!
//! A credential is an opaque secret stored only as its SHA-256 hash, bound
//! to one owner name inside one zone. Presenting the secret replaces the
//! A-record for that name, appends an audit row and clears the lookup cache
//! so the new address is served immediately.
//!
//! The HTTP surface is a single `GET /update` endpoint, enabled by setting
//! `DNS_UPDATE_LISTEN`. The effective address is taken from the `ip` query
//! parameter when present, otherwise from `X-Forwarded-For` (first entry),
//! otherwise from `X-Real-IP`.

use crate::cache::LookupCache;
use crate::error::DnsError;
use crate::metrics;
use crate::store::Store;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::net::Ipv4Addr;
use std::sync::Arc;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// SHA-256 hex digest of a token, the form stored in `ddns_credentials`.
pub fn hash_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

/// Why an update was rejected.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Unknown or disabled credential.
    #[error("invalid credential")]
    InvalidToken,
    /// The effective address is absent or not an IPv4 literal.
    #[error("invalid ip: {0}")]
    InvalidIp(String),
    /// The store rejected the write; no partial state remains.
    #[error(transparent)]
    Store(#[from] DnsError),
}

/// Result of a successful update.
#[derive(Debug, Clone, Serialize)]
pub struct UpdateOutcome {
    /// The owner name that was rewritten.
    pub fqdn: String,
    /// The address now served.
    pub ip: Ipv4Addr,
    /// True when the address differs from the previous value.
    pub changed: bool,
}

/// Caller-supplied update parameters, already extracted from transport.
#[derive(Debug, Default)]
pub struct UpdateRequest<'a> {
    /// The opaque credential secret.
    pub token: &'a str,
    /// Explicit address; wins over headers.
    pub ip: Option<&'a str>,
    /// `X-Forwarded-For` header value, if any.
    pub forwarded_for: Option<&'a str>,
    /// `X-Real-IP` header value, if any.
    pub real_ip: Option<&'a str>,
    /// Caller user agent, recorded in the audit trail.
    pub user_agent: Option<&'a str>,
}

/// Authenticate, replace the bound A-record and invalidate the cache.
pub fn apply_update(
    store: &Store,
    cache: &LookupCache,
    request: &UpdateRequest<'_>,
) -> Result<UpdateOutcome, UpdateError> {
    let cred = store
        .ddns_credential_by_hash(&hash_token(request.token))?
        .filter(|c| c.enabled)
        .ok_or(UpdateError::InvalidToken)?;

    let ip = effective_ip(request)?;

    let previous = store.ddns_replace_a(&cred, ip, request.user_agent)?;
    cache.clear();

    let new_value = ip.to_string();
    let changed = previous.as_deref() != Some(new_value.as_str());
    metrics::record_ddns_update(changed);
    info!(fqdn = %cred.fqdn, %ip, changed, "ddns update applied");

    Ok(UpdateOutcome {
        fqdn: cred.fqdn,
        ip,
        changed,
    })
}

/// Explicit `ip` wins, then the first `X-Forwarded-For` entry, then
/// `X-Real-IP`. Whatever is chosen must parse as an IPv4 literal.
fn effective_ip(request: &UpdateRequest<'_>) -> Result<Ipv4Addr, UpdateError> {
    let candidate = request
        .ip
        .filter(|s| !s.trim().is_empty())
        .or_else(|| {
            request
                .forwarded_for
                .and_then(|v| v.split(',').next())
                .map(str::trim)
                .filter(|s| !s.is_empty())
        })
        .or(request.real_ip)
        .ok_or_else(|| UpdateError::InvalidIp("no address supplied".into()))?;
    candidate
        .trim()
        .parse()
        .map_err(|_| UpdateError::InvalidIp(candidate.trim().to_string()))
}

#[derive(Clone)]
struct UpdateState {
    store: Arc<Store>,
    cache: LookupCache,
}

#[derive(Debug, Deserialize)]
struct UpdateParams {
    token: String,
    ip: Option<String>,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// Build the update router over a shared store and cache.
pub fn router(store: Arc<Store>, cache: LookupCache) -> Router {
    Router::new()
        .route("/update", get(update_handler))
        .with_state(UpdateState { store, cache })
}

async fn update_handler(
    State(state): State<UpdateState>,
    Query(params): Query<UpdateParams>,
    headers: HeaderMap,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let request = UpdateRequest {
        token: &params.token,
        ip: params.ip.as_deref(),
        forwarded_for: header("x-forwarded-for"),
        real_ip: header("x-real-ip"),
        user_agent: header("user-agent"),
    };

    match apply_update(&state.store, &state.cache, &request) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(UpdateError::InvalidToken) => {
            metrics::record_ddns_rejected("invalid_token");
            error_response(StatusCode::UNAUTHORIZED, "invalid credential")
        }
        Err(UpdateError::InvalidIp(got)) => {
            metrics::record_ddns_rejected("invalid_ip");
            error_response(StatusCode::BAD_REQUEST, &format!("invalid ip: {got}"))
        }
        Err(UpdateError::Store(e)) => {
            warn!("ddns update failed: {e}");
            metrics::record_ddns_rejected("store");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(ErrorBody {
            error: message.to_string(),
        }),
    )
        .into_response()
}

/// Serve the update endpoint until cancelled.
pub async fn serve(
    listen: std::net::SocketAddr,
    store: Arc<Store>,
    cache: LookupCache,
    cancel: CancellationToken,
) -> Result<(), DnsError> {
    let listener = tokio::net::TcpListener::bind(listen).await?;
    info!(addr = %listen, "DDNS update endpoint listening");
    axum::serve(listener, router(store, cache))
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;
    Ok(())
}

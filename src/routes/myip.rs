use axum::extract::{Request, State};
use axum::http::request::Parts;
use axum::middleware::Next;
use axum::response::Response;

use crate::address;
use crate::error::AppError;
use crate::render::{self, ClientKind};
use crate::response::{self, AggregateResponse, ErrorRecord, Reply, RequestMeta};
use crate::routes::{is_tls, peer_addr};
use crate::AppState;

/// Resolve, enrich, compose. Only address resolution can fail here; lookup
/// failures are folded into the response.
pub async fn handle_myip(
    state: &AppState,
    parts: &Parts,
    meta: &RequestMeta,
) -> Result<AggregateResponse, AppError> {
    let peer = peer_addr(parts);
    let remote_addr =
        address::resolve_remote_addr(&state.config, &parts.uri, &parts.headers, peer)?;

    let results = state.lookups.enrich(&remote_addr, &meta.user_agent).await;
    Ok(response::compose(
        &remote_addr,
        address::observed_addr(peer),
        meta,
        results,
    ))
}

pub async fn json(State(state): State<AppState>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let meta = RequestMeta::from_parts(&parts);

    let reply = match handle_myip(&state, &parts, &meta).await {
        Ok(response) => Reply::Ok(Box::new(response)),
        Err(err) => {
            let peer = address::observed_addr(peer_addr(&parts));
            let diagnostics = response::add_insights(&state.lookups, &meta, peer, &err).await;
            tracing::error!(
                request_id = %meta.request_id,
                insights = ?diagnostics.insights,
                "Failed to handle request: {err}"
            );
            Reply::Err(ErrorRecord::from(&err))
        }
    };

    render::write_json(&state.config.public_host, is_tls(&parts), &reply)
}

pub async fn text(State(state): State<AppState>, request: Request) -> Response {
    let (parts, _body) = request.into_parts();
    let meta = RequestMeta::from_parts(&parts);
    render::write_text(handle_myip(&state, &parts, &meta).await)
}

/// Command-line clients get the text report on every path, static fallback included.
pub async fn script_clients(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if render::classify(request.headers()) == ClientKind::Script {
        text(State(state), request).await
    } else {
        next.run(request).await
    }
}

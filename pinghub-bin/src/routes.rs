//! The `axum::Router` that fronts the engine (§4.5), ported from
//! `original_source/handlers.go`'s three handler types (`wsHandler`,
//! `getHandler`, `postHandler`) and `main.go`'s `-origin` check.

use crate::template;
use crate::transport::AxumTransport;
use axum::body::{Body, Bytes};
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, State};
use axum::http::{HeaderMap, Request, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use pinghub_core::{HubCommand, Metrics, Path, Session, Ticker};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{instrument, warn};

#[derive(Clone)]
pub struct AppState {
    pub hub: pinghub_core::HubHandle,
    pub ticker: Ticker,
    pub metrics: Arc<Metrics>,
    /// The `--addr` operators bound to, interpolated into the landing page's
    /// WebSocket URL the way `original_source/pinghub.go`'s `templateArgs`
    /// carries `*addr`.
    pub addr: String,
    /// `--origin`, checked against the `Origin` header on upgrade requests
    /// when non-empty (`original_source/main.go`'s `-origin` flag).
    pub origin: Option<String>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(get_handler).post(post_handler))
        .route("/*path", get(get_handler).post(post_handler))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

const PATH_LEN_MIN: usize = 1;
const PATH_LEN_MAX: usize = 256;

/// Unicode-scalar-value length check, matching `handlers.go`'s
/// `utf8.RuneCountInString` bound (UTF-8 validity is already guaranteed by
/// `Uri::path` returning a Rust `str`).
fn validate_path(path: &str) -> Result<(), String> {
    let len = path.chars().count();
    if !(PATH_LEN_MIN..=PATH_LEN_MAX).contains(&len) {
        return Err(format!(
            "Path length must be {PATH_LEN_MIN}-{PATH_LEN_MAX} Unicode characters (UTF-8)."
        ));
    }
    Ok(())
}

fn bad_request(message: impl Into<String>) -> Response {
    (
        StatusCode::BAD_REQUEST,
        format!("Error: bad request. {}\n", message.into()),
    )
        .into_response()
}

fn is_upgrade_request(headers: &HeaderMap) -> bool {
    let connection_has_upgrade = headers
        .get(axum::http::header::CONNECTION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.to_ascii_lowercase().contains("upgrade"));
    let upgrade_is_websocket = headers
        .get(axum::http::header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    connection_has_upgrade && upgrade_is_websocket
}

/// `None` if the request's `Origin` header matches `state.origin` (or
/// `state.origin` is unset); `Some(response)` with a rejection otherwise.
fn check_origin(state: &AppState, headers: &HeaderMap) -> Option<Response> {
    let Some(expected) = state.origin.as_deref().filter(|o| !o.is_empty()) else {
        return None;
    };
    let actual = headers
        .get(axum::http::header::ORIGIN)
        .and_then(|v| v.to_str().ok());
    if actual == Some(expected) {
        None
    } else {
        Some((StatusCode::FORBIDDEN, "Error: origin not allowed.\n").into_response())
    }
}

/// `GET /*path`: upgrades to a WebSocket when the request carries the
/// `Connection: Upgrade` / `Upgrade: websocket` pair; otherwise renders the
/// browser landing page. A single `Request` is taken (rather than
/// `WebSocketUpgrade` as a plain parameter) because that extractor fails
/// outright on a non-upgrade request, which would break the landing page.
#[instrument(skip(state, req))]
async fn get_handler(State(state): State<AppState>, req: Request<Body>) -> Response {
    let path = req.uri().path().to_string();
    if let Err(message) = validate_path(&path) {
        return bad_request(message);
    }

    if !is_upgrade_request(req.headers()) {
        return Html(template::render(&state.addr, &path)).into_response();
    }

    if let Some(rejected) = check_origin(&state, req.headers()) {
        return rejected;
    }

    let (mut parts, _body) = req.into_parts();
    match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
        Ok(ws) => {
            let path = Path::from(path);
            ws.on_upgrade(move |socket| handle_socket(socket, path, state))
        }
        Err(rejection) => rejection.into_response(),
    }
}

async fn handle_socket(socket: axum::extract::ws::WebSocket, path: Path, state: AppState) {
    let transport = AxumTransport(socket);
    let session = Session::spawn(transport, path, state.hub, state.ticker, state.metrics).await;
    session.join().await;
}

/// `POST /*path`: submits the request body as a one-shot `PUBLISH`,
/// matching `handlers.go`'s `postHandler`.
#[instrument(skip(state, body))]
async fn post_handler(State(state): State<AppState>, uri: Uri, body: Bytes) -> Response {
    let path = uri.path().to_string();
    if let Err(message) = validate_path(&path) {
        return bad_request(message);
    }

    state.metrics.postmsg();
    if state
        .hub
        .enqueue(HubCommand::Publish {
            path: Path::from(path),
            payload: body,
        })
        .await
        .is_err()
    {
        warn!("hub mailbox closed, dropping one-shot publish");
    }

    (StatusCode::OK, "OK\n").into_response()
}

//! REST endpoints + WebSocket feed for the wizard.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{
        Path, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::guard::{self, GuardDecision, Route};
use super::lookup::{CountrySelection, RegionLookup, SelectionTicket};
use super::model::{Notice, Region, SubmissionResult};
use super::redirect::SuccessRedirect;
use super::schema;
use super::state::WizardState;
use super::store::{UNEXPECTED_ERROR_MESSAGE, WizardStore};
use crate::error::{Error, WizardError};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<WizardStore>,
    pub lookup: Arc<dyn RegionLookup>,
    pub redirect: Arc<SuccessRedirect>,
}

/// Build the Axum router with wizard, lookup and WebSocket routes.
pub fn wizard_routes(
    store: Arc<WizardStore>,
    lookup: Arc<dyn RegionLookup>,
    redirect: Arc<SuccessRedirect>,
) -> Router {
    let state = AppState {
        store,
        lookup,
        redirect,
    };

    Router::new()
        .route("/health", get(health))
        .route("/ws/wizard", get(ws_handler))
        .route("/api/wizard/state", get(get_state))
        .route("/api/wizard/navigate", get(navigate_path))
        .route("/api/wizard/navigate/{step}", get(navigate))
        .route("/api/wizard/step/account", post(submit_account))
        .route("/api/wizard/step/location", post(submit_location))
        .route("/api/wizard/back", post(go_back))
        .route("/api/wizard/jump/{step}", post(jump_to_step))
        .route("/api/wizard/validate/{step}", post(validate))
        .route("/api/wizard/submit", post(submit))
        .route("/api/wizard/reset", post(reset))
        .route("/api/wizard/home", post(go_home))
        .route("/api/lookup/countries", get(list_countries))
        .route("/api/lookup/countries/{code}/states", get(list_states))
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(serde_json::json!({"error": message.to_string()}))).into_response()
}

// ── Health ──────────────────────────────────────────────────────────────

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "signup-wizard"
    }))
}

// ── WebSocket ───────────────────────────────────────────────────────────

/// Commands a WebSocket client may send.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsCommand {
    Back,
    Jump { step: u32 },
    Reset,
    Home,
    SelectCountry {
        country: String,
        #[serde(default)]
        search: String,
    },
}

/// State-list lookups requested over one socket. Results come back through
/// the channel and are forwarded only for the latest country selection.
struct StateListFeed {
    selection: CountrySelection,
    tx: mpsc::UnboundedSender<(SelectionTicket, Vec<Region>)>,
}

impl StateListFeed {
    fn request(&self, lookup: &Arc<dyn RegionLookup>, country: &str, search: String) {
        let ticket = self.selection.select(&country.to_uppercase());
        let lookup = Arc::clone(lookup);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            let states = lookup.list_states(ticket.country(), &search).await;
            // The receiver is gone once the socket closed.
            let _ = tx.send((ticket, states));
        });
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket client connecting");
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn send_sync(socket: &mut WebSocket, store: &WizardStore) -> bool {
    let sync = serde_json::json!({
        "type": "state_sync",
        "state": store.snapshot().await,
    });
    socket
        .send(Message::Text(sync.to_string().into()))
        .await
        .is_ok()
}

async fn handle_socket(mut socket: WebSocket, state: AppState) {
    info!("WebSocket client connected");

    // Subscribe first so no change between sync and loop is lost
    let mut rx = state.store.subscribe();

    if !send_sync(&mut socket, &state.store).await {
        warn!("Failed to send initial sync, client disconnected");
        return;
    }

    let (tx, mut states_rx) = mpsc::unbounded_channel();
    let feed = StateListFeed {
        selection: CountrySelection::new(),
        tx,
    };

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(event) => {
                        if let Ok(json) = serde_json::to_string(&event) {
                            if socket.send(Message::Text(json.into())).await.is_err() {
                                debug!("Client disconnected during send");
                                break;
                            }
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                        warn!(missed = n, "WS client lagged behind broadcast");
                        if !send_sync(&mut socket, &state.store).await {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                        debug!("Broadcast channel closed");
                        break;
                    }
                }
            }

            Some((ticket, states)) = states_rx.recv() => {
                let Some(states) = feed.selection.accept(&ticket, states) else {
                    continue;
                };
                let options = serde_json::json!({
                    "type": "state_options",
                    "country": ticket.country(),
                    "states": states,
                });
                if socket.send(Message::Text(options.to_string().into())).await.is_err() {
                    debug!("Client disconnected during send");
                    break;
                }
            }

            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Text(text))) => {
                        handle_client_message(&text, &state, &feed).await;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        info!("WebSocket client disconnected");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket error");
                        break;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

async fn handle_client_message(text: &str, state: &AppState, feed: &StateListFeed) {
    match serde_json::from_str::<WsCommand>(text) {
        Ok(WsCommand::Back) => state.store.previous_step().await,
        Ok(WsCommand::Jump { step }) => state.store.set_current_step(step).await,
        Ok(WsCommand::Reset) => {
            state.redirect.cancel().await;
            state.store.reset_form().await;
        }
        Ok(WsCommand::Home) => {
            state.redirect.cancel().await;
            state.store.go_to_home().await;
        }
        Ok(WsCommand::SelectCountry { country, search }) => {
            feed.request(&state.lookup, &country, search);
        }
        Err(e) => {
            debug!(error = %e, text = text, "Unrecognized WS message from client");
        }
    }
}

// ── Wizard ──────────────────────────────────────────────────────────────

async fn get_state(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.snapshot().await)
}

async fn navigate(State(state): State<AppState>, Path(step): Path<u32>) -> Response {
    let snapshot = state.store.snapshot().await;
    let Some(route) = Route::from_number(step, snapshot.step_count()) else {
        return error_response(StatusCode::BAD_REQUEST, WizardError::InvalidStep(step.to_string()));
    };
    guard_route(&state, route, &snapshot)
}

#[derive(Deserialize)]
struct NavigateQuery {
    path: String,
}

/// Guard decision for a screen path such as `/` or `/step2`.
async fn navigate_path(State(state): State<AppState>, Query(query): Query<NavigateQuery>) -> Response {
    let snapshot = state.store.snapshot().await;
    let Some(route) = Route::parse(&query.path, snapshot.step_count()) else {
        return error_response(StatusCode::BAD_REQUEST, WizardError::InvalidStep(query.path));
    };
    guard_route(&state, route, &snapshot)
}

fn guard_route(state: &AppState, route: Route, snapshot: &WizardState) -> Response {
    let decision = guard::evaluate(route, snapshot);
    if let GuardDecision::Redirect { to, notice } = &decision {
        info!(requested = %route.path(), redirect = %to.path(), "Navigation redirected");
        if let Some(notice) = notice {
            state.store.announce(notice.clone());
        }
    }
    Json(decision).into_response()
}

async fn submit_account(State(state): State<AppState>, Json(body): Json<serde_json::Value>) -> Response {
    submit_step(&state, "account", &body).await
}

async fn submit_location(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Response {
    submit_step(&state, "location", &body).await
}

/// Validate a step form and advance the wizard with it.
async fn submit_step(state: &AppState, step: &str, body: &serde_json::Value) -> Response {
    match state.store.submit_step(step, body).await {
        Ok(()) => Json(serde_json::json!({"state": state.store.snapshot().await})).into_response(),
        Err(Error::Validation(errors)) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"errors": errors})),
        )
            .into_response(),
        Err(Error::Wizard(e @ WizardError::StepMismatch { .. })) => {
            warn!(step, error = %e, "Step payload refused");
            error_response(StatusCode::CONFLICT, e)
        }
        Err(e) => error_response(StatusCode::BAD_REQUEST, e),
    }
}

async fn go_back(State(state): State<AppState>) -> impl IntoResponse {
    state.store.previous_step().await;
    Json(serde_json::json!({"state": state.store.snapshot().await}))
}

async fn jump_to_step(State(state): State<AppState>, Path(step): Path<u32>) -> Response {
    let count = state.store.snapshot().await.step_count();
    if step == 0 || step > count {
        return error_response(StatusCode::BAD_REQUEST, WizardError::InvalidStep(step.to_string()));
    }
    state.store.set_current_step(step).await;
    Json(serde_json::json!({"state": state.store.snapshot().await})).into_response()
}

async fn validate(Path(step): Path<String>, Json(body): Json<serde_json::Value>) -> Response {
    match schema::validate_step(&step, &body) {
        Ok(_) => Json(serde_json::json!({"valid": true})).into_response(),
        Err(errors) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(serde_json::json!({"valid": false, "errors": errors})),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
struct SubmitResponse {
    #[serde(flatten)]
    result: SubmissionResult,
    notice: Notice,
}

async fn submit(State(state): State<AppState>) -> Response {
    match state.store.submit_form().await {
        Ok(result) if result.success => {
            let notice = Notice::success(result.message.clone());
            state.store.announce(notice.clone());
            state.redirect.arm(Arc::clone(&state.store)).await;
            Json(SubmitResponse { result, notice }).into_response()
        }
        Ok(result) => {
            let notice = Notice::error(result.message.clone());
            state.store.announce(notice.clone());
            (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(SubmitResponse { result, notice }),
            )
                .into_response()
        }
        Err(WizardError::SubmissionInFlight) => {
            error_response(StatusCode::CONFLICT, WizardError::SubmissionInFlight)
        }
        Err(e) => {
            warn!(error = %e, "Submission failed unexpectedly");
            let notice = Notice::error(UNEXPECTED_ERROR_MESSAGE);
            state.store.announce(notice.clone());
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({"error": e.to_string(), "notice": notice})),
            )
                .into_response()
        }
    }
}

async fn reset(State(state): State<AppState>) -> impl IntoResponse {
    state.redirect.cancel().await;
    state.store.reset_form().await;
    Json(serde_json::json!({"state": state.store.snapshot().await}))
}

async fn go_home(State(state): State<AppState>) -> impl IntoResponse {
    state.redirect.cancel().await;
    state.store.go_to_home().await;
    Json(serde_json::json!({"state": state.store.snapshot().await}))
}

// ── Lookup ──────────────────────────────────────────────────────────────

async fn list_countries(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.lookup.list_countries().await)
}

#[derive(Deserialize)]
struct StatesQuery {
    #[serde(default)]
    search: String,
}

async fn list_states(
    State(state): State<AppState>,
    Path(code): Path<String>,
    Query(query): Query<StatesQuery>,
) -> impl IntoResponse {
    let code = code.to_uppercase();
    Json(state.lookup.list_states(&code, &query.search).await)
}

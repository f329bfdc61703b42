use axum::{
    body::{to_bytes, Body},
    extract::State,
    response::{IntoResponse, Response},
};
use http::{header, StatusCode};
use std::fmt::Display;
use tracing::{debug, error};

use super::AppState;
use crate::{alert::AlertPayload, env, metrics::Stage};

/// Largest notification body accepted; anything bigger is a read error.
const BODY_LIMIT: usize = 16 * 1024 * 1024;

pub async fn health() -> &'static str {
    "All systems are functioning within normal specifications.\n"
}

pub async fn metrics(State(state): State<AppState>) -> Response {
    match state.metrics.gather() {
        Ok(body) => (
            [(header::CONTENT_TYPE, state.metrics.content_type())],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n")).into_response()
        }
    }
}

/// Runs the configured command for one Alertmanager notification. The
/// response is sent once the command has exited.
pub async fn webhook(State(state): State<AppState>, body: Body) -> Response {
    debug!("Webhook triggered");

    let data = match to_bytes(body, BODY_LIMIT).await {
        Ok(data) => data,
        Err(e) => return handle_error(&state, Stage::Read, e),
    };
    debug!("Body: {}", String::from_utf8_lossy(&data));

    // A `null` body decodes to an empty notification.
    let payload = match serde_json::from_slice::<Option<AlertPayload>>(&data) {
        Ok(payload) => payload.unwrap_or_default(),
        Err(e) => return handle_error(&state, Stage::Unmarshal, e),
    };
    debug!("Got: {:?}", payload);

    // The run lives on its own task: if the client goes away and this handler
    // is dropped, the command keeps being tracked until it exits.
    let runner = state.runner.clone();
    let metrics = state.metrics.clone();
    let env = env::encode(&payload);
    let run = tokio::spawn(async move {
        let result = runner.run(&env).await;
        if let Err(e) = &result {
            metrics.record_error(Stage::Start);
            error!(stage = Stage::Start.as_str(), "{}", e);
        }
        result
    });

    match run.await {
        Ok(Ok(())) => StatusCode::OK.into_response(),
        Ok(Err(e)) => error_response(e),
        Err(e) => handle_error(&state, Stage::Start, e),
    }
}

fn handle_error(state: &AppState, stage: Stage, err: impl Display) -> Response {
    state.metrics.record_error(stage);
    error!(stage = stage.as_str(), "{}", err);
    error_response(err)
}

fn error_response(err: impl Display) -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, format!("{err}\n")).into_response()
}

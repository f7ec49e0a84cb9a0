use std::time::Instant;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use metrics::{counter, histogram};
use tracing::{info, warn};

use line_relay_core::{parse_events, signature};

use crate::dispatch::dispatch;
use crate::problem::ProblemResponse;
use crate::router::AppState;

pub const HEADER_SIGNATURE: &str = "X-Line-Signature";

/// `POST /webhook`: verify, parse, dispatch, acknowledge.
///
/// Nothing in the body is looked at before the signature checks out. Once it
/// does, the platform always gets `200 OK`, even when individual events fail.
pub async fn handle(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ProblemResponse> {
    let start = Instant::now();
    let body_len = body.len();

    let outcome = accept(&state, &headers, &body).await;

    let result = match &outcome {
        Ok(()) => "ok",
        Err(problem) => problem.problem_type(),
    };
    counter!("webhook_requests_total", "result" => result).increment(1);
    histogram!("webhook_ack_latency_seconds").record(start.elapsed().as_secs_f64());

    outcome?;
    info!(
        stage = "ingress",
        body_len,
        elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
        "webhook acknowledged"
    );
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
        "OK",
    )
        .into_response())
}

async fn accept(state: &AppState, headers: &HeaderMap, body: &[u8]) -> Result<(), ProblemResponse> {
    let provided = get_required_header(headers, HEADER_SIGNATURE).map_err(|problem| {
        counter!("webhook_invalid_signature_total").increment(1);
        warn!(stage = "ingress", body_len = body.len(), "webhook without signature header");
        problem
    })?;

    signature::verify(body, provided, state.channel_secret()).map_err(|err| {
        counter!("webhook_invalid_signature_total").increment(1);
        warn!(
            stage = "ingress",
            body_len = body.len(),
            error = %err,
            "rejected webhook with invalid signature"
        );
        ProblemResponse::bad_request("invalid_signature", err.to_string())
    })?;

    let batch = parse_events(body).map_err(|err| {
        warn!(stage = "ingress", body_len = body.len(), error = %err, "malformed webhook payload");
        ProblemResponse::bad_request("invalid_payload", err.to_string())
    })?;

    for skipped in &batch.skipped {
        warn!(
            stage = "ingress",
            index = skipped.index,
            error = %skipped.error,
            "skipping undecodable event"
        );
    }
    info!(
        stage = "ingress",
        destination = batch.destination.as_deref().unwrap_or("-"),
        events = batch.events.len(),
        skipped = batch.skipped.len(),
        "webhook verified"
    );

    dispatch(&batch.events, state.orchestrator()).await;
    Ok(())
}

fn get_required_header<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, ProblemResponse> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ProblemResponse::bad_request("missing_header", format!("missing header {name}")))
}

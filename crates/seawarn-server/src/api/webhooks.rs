use axum::body::Bytes;
use axum::extract::{Extension, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use seawarn_ledger::{ApplyOutcome, NormalizeError};
use serde::Serialize;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::{error_response, success_response, ApiError};
use crate::logging::TraceId;
use crate::state::AppState;

const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Outcome tally for one webhook request.
#[derive(Serialize, ToSchema)]
pub struct WebhookReceipt {
    pub provider: String,
    /// Events carried in the request body.
    pub events: usize,
    /// Events that advanced an attempt's status.
    pub applied: usize,
    /// Events that only added timestamps or metadata.
    pub metadata: usize,
    /// Duplicate, stale, or post-terminal events.
    pub duplicates: usize,
    /// Events whose provider message ID matched no attempt.
    pub discarded: usize,
}

/// Provider delivery callback.
///
/// Returns 200 whenever the batch was processed, including events that
/// were discarded as unknown: providers retry on non-2xx and an
/// unknown message ID will never become known. 401 is reserved for
/// signature failures, 400 for bodies that do not parse.
#[utoipa::path(
    post,
    path = "/v1/webhooks/{provider}",
    tag = "Webhooks",
    params(
        ("provider" = String, Path, description = "Provider route: sms_gateway, voice_gateway, whatsapp, or email")
    ),
    responses(
        (status = 200, description = "Batch processed", body = WebhookReceipt),
        (status = 400, description = "Malformed payload", body = ApiError),
        (status = 401, description = "Invalid signature", body = ApiError),
        (status = 404, description = "Unknown provider", body = ApiError)
    )
)]
async fn provider_webhook(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(normalizer) = state.normalizers.get(provider.as_str()).cloned() else {
        return error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            &format!("unknown webhook provider '{provider}'"),
        );
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok());

    if let Err(e) = normalizer.verify(&body, signature) {
        tracing::warn!(provider = %provider, error = %e, "Webhook signature rejected");
        return error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "invalid_signature",
            "webhook signature verification failed",
        );
    }

    let events = match normalizer.normalize(&body) {
        Ok(events) => events,
        Err(NormalizeError::Malformed(msg)) => {
            tracing::warn!(provider = %provider, error = %msg, "Webhook payload rejected");
            return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &msg);
        }
        Err(e) => {
            tracing::warn!(provider = %provider, error = %e, "Webhook rejected");
            return error_response(
                StatusCode::BAD_REQUEST,
                &trace_id,
                "bad_request",
                &e.to_string(),
            );
        }
    };

    let mut receipt = WebhookReceipt {
        provider: provider.clone(),
        events: events.len(),
        applied: 0,
        metadata: 0,
        duplicates: 0,
        discarded: 0,
    };

    for (channel, event) in &events {
        match state.ledger.apply(*channel, event).await {
            Ok(ApplyOutcome::Applied) => receipt.applied += 1,
            Ok(ApplyOutcome::Metadata) => receipt.metadata += 1,
            Ok(ApplyOutcome::Duplicate) => receipt.duplicates += 1,
            Ok(ApplyOutcome::Discarded) => receipt.discarded += 1,
            Err(e) => {
                tracing::error!(
                    provider = %provider,
                    provider_message_id = %event.provider_message_id,
                    error = %e,
                    "Ledger apply failed"
                );
                return error_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    &trace_id,
                    "storage_error",
                    "failed to record delivery event",
                );
            }
        }
    }

    success_response(StatusCode::OK, &trace_id, receipt)
}

pub fn webhook_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(provider_webhook))
}

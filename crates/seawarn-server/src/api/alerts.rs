use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use seawarn_common::types::{AlertStatus, Severity};
use seawarn_escalation::{EscalationError, EscalationPlan};
use seawarn_ledger::DeliveryRecord;
use seawarn_storage::{AlertFilter, AlertRow, AttemptFilter};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::pagination::PaginationParams;
use crate::api::{error_response, success_paginated_response, success_response, ApiError};
use crate::logging::TraceId;
use crate::state::AppState;

/// Alert details.
#[derive(Serialize, ToSchema)]
pub struct AlertResponse {
    pub id: String,
    pub event_type: String,
    pub severity: String,
    pub headline: String,
    pub recommendation: Option<String>,
    pub target: Option<String>,
    pub status: String,
    pub policy_id: Option<String>,
    pub escalation_step: i32,
    pub escalation_started: bool,
    pub exhausted: bool,
    pub acknowledged_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl From<AlertRow> for AlertResponse {
    fn from(row: AlertRow) -> Self {
        Self {
            id: row.id,
            event_type: row.event_type,
            severity: row.severity.to_string(),
            headline: row.headline,
            recommendation: row.recommendation,
            target: row.target,
            status: row.status.to_string(),
            policy_id: row.policy_id,
            escalation_step: row.escalation_step,
            escalation_started: row.escalation_started,
            exhausted: row.exhausted,
            acknowledged_by: row.acknowledged_by,
            created_at: row.created_at,
            sent_at: row.sent_at,
            acknowledged_at: row.acknowledged_at,
            resolved_at: row.resolved_at,
            expires_at: row.expires_at,
        }
    }
}

/// One ledger row for an outbound attempt.
#[derive(Serialize, ToSchema)]
pub struct DeliveryAttemptResponse {
    pub id: String,
    pub alert_id: String,
    pub step_index: i32,
    pub contact_id: String,
    pub channel: String,
    pub address: String,
    pub provider_message_id: Option<String>,
    pub status: String,
    pub queued_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
    pub delivered_at: Option<DateTime<Utc>>,
    pub read_at: Option<DateTime<Utc>>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub closed_at: Option<DateTime<Utc>>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
}

impl From<DeliveryRecord> for DeliveryAttemptResponse {
    fn from(r: DeliveryRecord) -> Self {
        Self {
            id: r.id,
            alert_id: r.alert_id,
            step_index: r.step_index,
            contact_id: r.contact_id,
            channel: r.channel.to_string(),
            address: r.address,
            provider_message_id: r.provider_message_id,
            status: r.status.to_string(),
            queued_at: r.queued_at,
            sent_at: r.sent_at,
            delivered_at: r.delivered_at,
            read_at: r.read_at,
            acknowledged_at: r.acknowledged_at,
            closed_at: r.closed_at,
            error_code: r.error_code,
            error_message: r.error_message,
            metadata: r.metadata,
        }
    }
}

fn escalation_error_response(trace_id: &str, e: &EscalationError) -> Response {
    match e {
        EscalationError::AlertNotFound(_) => {
            error_response(StatusCode::NOT_FOUND, trace_id, "not_found", &e.to_string())
        }
        EscalationError::PolicyResolution(_) => error_response(
            StatusCode::BAD_REQUEST,
            trace_id,
            "policy_resolution",
            &e.to_string(),
        ),
        EscalationError::InvalidState(_) => error_response(
            StatusCode::CONFLICT,
            trace_id,
            "invalid_state",
            &e.to_string(),
        ),
        EscalationError::Storage(inner) => {
            tracing::error!(error = %inner, "Storage error");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                trace_id,
                "storage_error",
                "internal storage error",
            )
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct CreateAlertBody {
    /// Hierarchical event type, e.g. `tsunami.warning`.
    pub event_type: String,
    pub severity: Severity,
    pub headline: String,
    #[serde(default)]
    pub recommendation: Option<String>,
    /// Vessel ID or ad hoc contact-set tag.
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Create an alert and start its escalation.
///
/// A matching zero-step policy is a 400; with no matching policy at all
/// the alert is stored `pending` for operator follow-up and escalation
/// does not start.
#[utoipa::path(
    post,
    path = "/v1/alerts",
    tag = "Alerts",
    security(("bearer_auth" = [])),
    request_body = CreateAlertBody,
    responses(
        (status = 201, description = "Alert created, escalation started", body = AlertResponse),
        (status = 202, description = "Alert stored pending, no matching policy", body = AlertResponse),
        (status = 400, description = "Invalid request or unrunnable policy", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError)
    )
)]
async fn create_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Json(body): Json<CreateAlertBody>,
) -> impl IntoResponse {
    if body.event_type.trim().is_empty() || body.headline.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "event_type and headline are required",
        );
    }

    let resolved = match state
        .engine
        .resolve_policy(&body.event_type, body.severity)
        .await
    {
        Ok(r) => r,
        Err(e) => return escalation_error_response(&trace_id, &e),
    };

    let row = AlertRow {
        id: seawarn_common::id::next_id(),
        event_type: body.event_type,
        severity: body.severity,
        headline: body.headline,
        recommendation: body.recommendation,
        target: body.target,
        status: AlertStatus::Pending,
        policy_id: resolved.as_ref().map(|(p, _)| p.id.clone()),
        escalation_step: 0,
        escalation_started: false,
        exhausted: false,
        acknowledged_by: None,
        created_at: Utc::now(),
        sent_at: None,
        acknowledged_at: None,
        resolved_at: None,
        expires_at: body.expires_at,
    };

    let inserted = match state.store.insert_alert(&row).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "Failed to insert alert");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "failed to store alert",
            );
        }
    };

    match resolved {
        Some((policy, _)) => {
            tracing::info!(
                alert_id = %inserted.id,
                policy = %policy.name,
                "Alert created, starting escalation"
            );
            let engine = state.engine.clone();
            let alert_id = inserted.id.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.start(&alert_id).await {
                    tracing::error!(alert_id, error = %e, "Escalation start failed");
                }
            });
            success_response(
                StatusCode::CREATED,
                &trace_id,
                AlertResponse::from(inserted),
            )
        }
        None => {
            tracing::warn!(
                alert_id = %inserted.id,
                event_type = %inserted.event_type,
                severity = %inserted.severity,
                "No escalation policy matches; alert left pending"
            );
            success_response(
                StatusCode::ACCEPTED,
                &trace_id,
                AlertResponse::from(inserted),
            )
        }
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct AlertQueryParams {
    /// Status filter (`pending`, `sent`, `acknowledged`, ...)
    #[param(required = false)]
    #[serde(rename = "status__eq")]
    status_eq: Option<String>,
    /// Severity filter
    #[param(required = false)]
    #[serde(rename = "severity__eq")]
    severity_eq: Option<String>,
    /// Exact event type filter
    #[param(required = false)]
    #[serde(rename = "event_type__eq")]
    event_type_eq: Option<String>,
}

/// List alerts, newest first.
#[utoipa::path(
    get,
    path = "/v1/alerts",
    tag = "Alerts",
    security(("bearer_auth" = [])),
    params(AlertQueryParams, PaginationParams),
    responses(
        (status = 200, description = "Paginated alert list", body = Vec<AlertResponse>),
        (status = 401, description = "Unauthenticated", body = ApiError)
    )
)]
async fn list_alerts(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<AlertQueryParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let mut filter = AlertFilter::default();
    if let Some(ref s) = params.status_eq {
        match s.parse::<AlertStatus>() {
            Ok(v) => filter.status_eq = Some(v),
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &e)
            }
        }
    }
    if let Some(ref s) = params.severity_eq {
        match s.parse::<Severity>() {
            Ok(v) => filter.severity_eq = Some(v),
            Err(e) => {
                return error_response(StatusCode::BAD_REQUEST, &trace_id, "bad_request", &e)
            }
        }
    }
    filter.event_type_eq = params.event_type_eq.clone();

    let limit = pagination.limit();
    let offset = pagination.offset();

    let total = match state.store.count_alerts(&filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count alerts");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "internal query error",
            );
        }
    };
    match state.store.list_alerts(&filter, limit, offset).await {
        Ok(rows) => {
            let items: Vec<AlertResponse> = rows.into_iter().map(AlertResponse::from).collect();
            success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list alerts");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "internal query error",
            )
        }
    }
}

/// Get one alert.
#[utoipa::path(
    get,
    path = "/v1/alerts/{id}",
    tag = "Alerts",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Alert details", body = AlertResponse),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 404, description = "Alert not found", body = ApiError)
    )
)]
async fn get_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.get_alert_by_id(&id).await {
        Ok(Some(row)) => success_response(StatusCode::OK, &trace_id, AlertResponse::from(row)),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            &trace_id,
            "not_found",
            &format!("alert '{id}' not found"),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to load alert");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "internal query error",
            )
        }
    }
}

#[derive(Deserialize, ToSchema)]
pub struct AcknowledgeBody {
    /// Operator or contact identifier taking responsibility.
    pub by: String,
}

/// Acknowledge an alert. Idempotent; stops escalation and closes every
/// open delivery attempt.
#[utoipa::path(
    post,
    path = "/v1/alerts/{id}/acknowledge",
    tag = "Alerts",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Alert ID")),
    request_body = AcknowledgeBody,
    responses(
        (status = 200, description = "Alert acknowledged", body = AlertResponse),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 404, description = "Alert not found", body = ApiError)
    )
)]
async fn acknowledge_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<AcknowledgeBody>,
) -> impl IntoResponse {
    if body.by.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "by is required",
        );
    }
    match state.engine.acknowledge(&id, &body.by).await {
        Ok(row) => success_response(StatusCode::OK, &trace_id, AlertResponse::from(row)),
        Err(e) => escalation_error_response(&trace_id, &e),
    }
}

/// Preview the full escalation without dispatching anything.
///
/// Uses the same per-step contact and channel resolution as live
/// execution, so the preview is exactly what would run.
#[utoipa::path(
    get,
    path = "/v1/alerts/{id}/plan",
    tag = "Alerts",
    security(("bearer_auth" = [])),
    params(("id" = String, Path, description = "Alert ID")),
    responses(
        (status = 200, description = "Escalation preview", body = EscalationPlan),
        (status = 400, description = "Unrunnable policy", body = ApiError),
        (status = 401, description = "Unauthenticated", body = ApiError),
        (status = 404, description = "Alert not found", body = ApiError)
    )
)]
async fn plan_alert(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.engine.dry_run(&id).await {
        Ok(plan) => success_response(StatusCode::OK, &trace_id, plan),
        Err(e) => escalation_error_response(&trace_id, &e),
    }
}

#[derive(Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
struct DeliveryQueryParams {
    /// Alert filter
    #[param(required = false)]
    #[serde(rename = "alert_id__eq")]
    alert_id_eq: Option<String>,
    /// Channel filter (`sms`, `voice`, `whatsapp`, `email`)
    #[param(required = false)]
    #[serde(rename = "channel__eq")]
    channel_eq: Option<String>,
    /// Delivery status filter
    #[param(required = false)]
    #[serde(rename = "status__eq")]
    status_eq: Option<String>,
    /// Contact filter
    #[param(required = false)]
    #[serde(rename = "contact_id__eq")]
    contact_id_eq: Option<String>,
}

fn delivery_filter(
    trace_id: &str,
    params: &DeliveryQueryParams,
) -> Result<AttemptFilter, Response> {
    let mut filter = AttemptFilter {
        alert_id: params.alert_id_eq.clone(),
        contact_id: params.contact_id_eq.clone(),
        ..AttemptFilter::default()
    };
    if let Some(ref s) = params.channel_eq {
        filter.channel_eq = Some(s.parse().map_err(|e: String| {
            error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", &e)
        })?);
    }
    if let Some(ref s) = params.status_eq {
        filter.status_eq = Some(s.parse().map_err(|e: String| {
            error_response(StatusCode::BAD_REQUEST, trace_id, "bad_request", &e)
        })?);
    }
    Ok(filter)
}

/// Delivery ledger view: per-attempt status with reconciliation
/// timestamps, newest first.
#[utoipa::path(
    get,
    path = "/v1/deliveries",
    tag = "Deliveries",
    security(("bearer_auth" = [])),
    params(DeliveryQueryParams, PaginationParams),
    responses(
        (status = 200, description = "Paginated delivery attempts", body = Vec<DeliveryAttemptResponse>),
        (status = 401, description = "Unauthenticated", body = ApiError)
    )
)]
async fn list_deliveries(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    Query(params): Query<DeliveryQueryParams>,
    Query(pagination): Query<PaginationParams>,
) -> impl IntoResponse {
    let filter = match delivery_filter(&trace_id, &params) {
        Ok(f) => f,
        Err(resp) => return resp,
    };
    let limit = pagination.limit();
    let offset = pagination.offset();

    let total = match state.store.count_attempts(&filter).await {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "Failed to count delivery attempts");
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "internal query error",
            );
        }
    };
    match state.store.list_attempts(&filter, limit, offset).await {
        Ok(rows) => {
            let items: Vec<DeliveryAttemptResponse> = rows
                .into_iter()
                .map(DeliveryAttemptResponse::from)
                .collect();
            success_paginated_response(StatusCode::OK, &trace_id, items, total, limit, offset)
        }
        Err(e) => {
            tracing::error!(error = %e, "Failed to list delivery attempts");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "storage_error",
                "internal query error",
            )
        }
    }
}

pub fn alert_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(create_alert, list_alerts))
        .routes(routes!(get_alert))
        .routes(routes!(acknowledge_alert))
        .routes(routes!(plan_alert))
        .routes(routes!(list_deliveries))
}

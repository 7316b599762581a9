use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use seawarn_dispatch::plugin::DispatcherRegistry;
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

use crate::api::{success_response, ApiError};
use crate::logging::TraceId;
use crate::state::AppState;

/// One configured outbound provider, secrets masked.
#[derive(Serialize, ToSchema)]
pub struct ChannelConfigResponse {
    /// Plugin type name
    pub r#type: String,
    pub channel: String,
    pub enabled: bool,
    /// Provider config with API keys and passwords replaced by `***`
    pub config: Value,
}

/// Configured outbound channels. Secrets never leave the server:
/// configs pass through the plugin's redaction before serialization.
#[utoipa::path(
    get,
    path = "/v1/channels",
    tag = "Channels",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Configured channels", body = Vec<ChannelConfigResponse>),
        (status = 401, description = "Unauthenticated", body = ApiError)
    )
)]
async fn list_channels(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let registry = DispatcherRegistry::default();
    let items: Vec<ChannelConfigResponse> = state
        .config
        .dispatchers
        .iter()
        .map(|entry| {
            let (channel, config) = match registry.get_plugin(&entry.type_name) {
                Some(plugin) => (
                    plugin.channel().to_string(),
                    plugin.redact_config(&entry.config),
                ),
                // Unknown plugin names were already rejected at startup;
                // mask the whole blob if one is still in the file.
                None => ("unknown".to_string(), Value::String("***".to_string())),
            };
            ChannelConfigResponse {
                r#type: entry.type_name.clone(),
                channel,
                enabled: entry.enabled,
                config,
            }
        })
        .collect();
    success_response(StatusCode::OK, &trace_id, items)
}

pub fn channel_routes() -> OpenApiRouter<AppState> {
    OpenApiRouter::new().routes(routes!(list_channels))
}

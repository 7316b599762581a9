use axum::body::Body;
use axum::extract::{Extension, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt::Write;
use utoipa::ToSchema;

use crate::api::{error_response, rate_limited_response, success_empty_response, success_response, ApiError};
use crate::logging::TraceId;
use crate::state::{AppState, OtpEntry};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// The verified contact address.
    pub sub: String,
    pub iat: u64,
    pub exp: u64,
}

/// Random hex secret for installs without a configured `jwt_secret`.
pub fn random_secret() -> String {
    let bytes: [u8; 32] = rand::thread_rng().gen();
    let mut s = String::with_capacity(64);
    for b in bytes {
        let _ = write!(s, "{b:02x}");
    }
    s
}

pub fn create_token(secret: &str, address: &str, expire_secs: u64) -> anyhow::Result<String> {
    let now = Utc::now().timestamp() as u64;
    let claims = Claims {
        sub: address.to_string(),
        iat: now,
        exp: now + expire_secs,
    };
    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )?;
    Ok(token)
}

pub fn validate_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(token_data.claims)
}

/// JWT auth middleware for operator routes.
pub async fn jwt_auth_middleware(
    State(state): State<AppState>,
    mut req: Request<Body>,
    next: Next,
) -> axum::response::Response {
    let trace_id = req
        .extensions()
        .get::<TraceId>()
        .map(|t| t.0.clone())
        .unwrap_or_default();

    let auth_header = req
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let token = match auth_header.and_then(|h| h.strip_prefix("Bearer ")) {
        Some(token) if !token.is_empty() => token,
        _ => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                &trace_id,
                "unauthorized",
                "missing or invalid authorization header",
            );
        }
    };

    match validate_token(&state.jwt_secret, token) {
        Ok(claims) => {
            req.extensions_mut().insert(claims);
            next.run(req).await
        }
        Err(e) => {
            if matches!(e.kind(), jsonwebtoken::errors::ErrorKind::ExpiredSignature) {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    &trace_id,
                    "token_expired",
                    "token expired",
                )
            } else {
                error_response(
                    StatusCode::UNAUTHORIZED,
                    &trace_id,
                    "unauthorized",
                    "invalid token",
                )
            }
        }
    }
}

/// Caller origin for the rate-limit gate: the first address in
/// `X-Forwarded-For`, or a fixed bucket when the header is absent.
fn client_origin(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| "direct".to_string())
}

fn six_digit_code() -> String {
    format!("{:06}", rand::thread_rng().gen_range(0..1_000_000u32))
}

#[derive(Deserialize, ToSchema)]
pub struct RequestCodeBody {
    /// Phone number or email address to send the code to.
    pub address: String,
}

#[derive(Deserialize, ToSchema)]
pub struct VerifyCodeBody {
    pub address: String,
    pub code: String,
}

#[derive(Serialize, ToSchema)]
pub struct TokenResponse {
    pub token: String,
    pub expires_in: u64,
}

/// Request a one-time verification code.
///
/// Gated on both the caller origin and the target address; a denial
/// charges neither budget. The response does not reveal whether the
/// address is known.
#[utoipa::path(
    post,
    path = "/v1/auth/request-code",
    tag = "Auth",
    request_body = RequestCodeBody,
    responses(
        (status = 202, description = "Code issued if the address is reachable"),
        (status = 400, description = "Missing address", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    )
)]
pub async fn request_code(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<RequestCodeBody>,
) -> impl IntoResponse {
    if body.address.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            &trace_id,
            "bad_request",
            "address is required",
        );
    }
    let origin_key = format!("origin:{}", client_origin(&headers));
    let addr_key = format!("addr:{}", body.address);
    if let Err(deny) = state.guard.check_pair(&origin_key, &addr_key) {
        return rate_limited_response(&trace_id, &deny);
    }

    let code = six_digit_code();
    let expires_at = Utc::now() + Duration::seconds(state.otp_ttl_secs as i64);
    state
        .otp_codes
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(
            body.address.clone(),
            OtpEntry {
                code: code.clone(),
                expires_at,
            },
        );

    send_code(&state, &body.address, &code).await;

    success_empty_response(StatusCode::ACCEPTED, &trace_id, "verification code issued")
}

/// Delivers the code over SMS or email depending on the address shape.
/// Send failures are logged but not surfaced: the endpoint's response
/// must not act as an address oracle.
async fn send_code(state: &AppState, address: &str, code: &str) {
    use seawarn_common::types::{Channel, MessageContent};

    let channel = if address.contains('@') {
        Channel::Email
    } else {
        Channel::Sms
    };
    let Some(dispatcher) = state.dispatchers.get(channel) else {
        tracing::warn!(channel = %channel, "No dispatcher for verification codes; code not sent");
        return;
    };
    let content = MessageContent {
        subject: "Your verification code".to_string(),
        body: format!("Your verification code is {code}. It expires shortly."),
    };
    if let Err(e) = dispatcher.dispatch(address, &content).await {
        tracing::warn!(channel = %channel, error = %e, "Failed to send verification code");
    }
}

/// Exchange a verification code for a session token.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-code",
    tag = "Auth",
    request_body = VerifyCodeBody,
    responses(
        (status = 200, description = "Session token", body = TokenResponse),
        (status = 401, description = "Invalid or expired code", body = ApiError),
        (status = 429, description = "Rate limited", body = ApiError)
    )
)]
pub async fn verify_code(
    Extension(trace_id): Extension<TraceId>,
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VerifyCodeBody>,
) -> impl IntoResponse {
    let origin_key = format!("origin:{}", client_origin(&headers));
    let addr_key = format!("addr:{}", body.address);
    if let Err(deny) = state.guard.check_pair(&origin_key, &addr_key) {
        return rate_limited_response(&trace_id, &deny);
    }

    let valid = {
        let mut codes = state.otp_codes.lock().unwrap_or_else(|e| e.into_inner());
        match codes.get(&body.address) {
            Some(entry) if entry.expires_at > Utc::now() && entry.code == body.code => {
                codes.remove(&body.address);
                true
            }
            _ => false,
        }
    };

    if !valid {
        state.guard.record_failure(&origin_key);
        state.guard.record_failure(&addr_key);
        return error_response(
            StatusCode::UNAUTHORIZED,
            &trace_id,
            "unauthorized",
            "invalid or expired verification code",
        );
    }

    state.guard.clear_failures(&origin_key);
    state.guard.clear_failures(&addr_key);

    match create_token(&state.jwt_secret, &body.address, state.token_expire_secs) {
        Ok(token) => success_response(
            StatusCode::OK,
            &trace_id,
            TokenResponse {
                token,
                expires_in: state.token_expire_secs,
            },
        ),
        Err(e) => {
            tracing::error!(error = %e, "Failed to create token");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &trace_id,
                "internal_error",
                "internal error",
            )
        }
    }
}

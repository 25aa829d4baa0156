use std::net::SocketAddr;

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::response::AppError;
use crate::state::AppState;
use crate::transfer::code::{generate_transfer_code, normalize_code};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/create", post(create))
        .route("/redeem", post(redeem))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateRequest {
    profile_data: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateResponse {
    code: String,
    expires_at: String,
}

#[derive(Debug, Deserialize)]
struct RedeemRequest {
    code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RedeemResponse {
    profile_data: Value,
}

async fn create(
    State(state): State<AppState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(body): Json<CreateRequest>,
) -> Result<Response, AppError> {
    let Some(mut profile) = body.profile_data else {
        return Err(AppError::validation("profileData is required"));
    };
    let id_ok = profile
        .get("id")
        .and_then(Value::as_str)
        .is_some_and(|id| !id.trim().is_empty());
    let name_ok = profile
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.trim().is_empty());
    if !id_ok || !name_ok {
        return Err(AppError::validation("profileData must include id and name"));
    }

    let now = Utc::now();
    if let Some(object) = profile.as_object_mut() {
        object.insert("lastModified".to_string(), now.timestamp_millis().into());
    }
    let serialized = serde_json::to_string(&profile)
        .map_err(|err| AppError::internal(format!("failed to serialize profile: {err}")))?;

    let ip = client_ip(&headers, connect_info);
    let code = generate_transfer_code(&mut rand::rng());
    let row = state.transfer().create_code(&code, &serialized, &ip, now).await?;

    tracing::info!(code = %row.code, ip = %ip, "transfer code created");
    let response = CreateResponse {
        code: row.code,
        expires_at: row.expires_at,
    };
    Ok((StatusCode::CREATED, Json(response)).into_response())
}

async fn redeem(
    State(state): State<AppState>,
    Json(body): Json<RedeemRequest>,
) -> Result<Response, AppError> {
    let code = body
        .code
        .as_deref()
        .and_then(normalize_code)
        .ok_or_else(|| AppError::validation("A valid transfer code is required"))?;

    let Some(row) = state.transfer().find_by_code(&code).await? else {
        return Err(AppError::not_found("Invalid code. Check the spelling and try again."));
    };

    if row.redeemed_at.is_some() {
        return Err(AppError::code_already_used());
    }

    let now = Utc::now();
    let expired = DateTime::parse_from_rfc3339(&row.expires_at)
        .map(|expires| expires.with_timezone(&Utc) <= now)
        .unwrap_or(true);
    if expired {
        return Err(AppError::code_expired());
    }

    let profile: Value = serde_json::from_str(&row.profile_data)
        .map_err(|err| AppError::internal(format!("stored profile is unreadable: {err}")))?;

    // Redeem wins even if the marker write fails; the code stays hot for the
    // rest of its 15 minutes in that case, which the logs make visible.
    state.transfer().mark_redeemed(&row.id, now).await;

    Ok(Json(RedeemResponse { profile_data: profile }).into_response())
}

fn client_ip(headers: &HeaderMap, connect_info: Option<ConnectInfo<SocketAddr>>) -> String {
    if trust_proxy_enabled() {
        if let Some(forwarded) = headers
            .get("x-forwarded-for")
            .and_then(|value| value.to_str().ok())
            .and_then(|raw| raw.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return forwarded.to_string();
        }
    }
    connect_info
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn trust_proxy_enabled() -> bool {
    std::env::var("TRUST_PROXY")
        .map(|value| {
            let normalized = value.trim().to_ascii_lowercase();
            !normalized.is_empty() && !matches!(normalized.as_str(), "0" | "false")
        })
        .unwrap_or(false)
}

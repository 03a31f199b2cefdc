//! Lead transfer routes.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use leadrelay_core::{LeadTransferRequest, LeadTransferResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::json_body;
use crate::error::DispatchError;
use crate::state::AppState;

/// Forward a lead to the gateway
///
/// POST /users/motor_lead
pub async fn lead_transfer(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<LeadTransferResponse>, DispatchError> {
    let request: LeadTransferRequest = json_body(&headers, &body)?;
    info!(source = %request.source, "Lead transfer request received");

    let response = state.dispatcher.dispatch(request).await?;
    Ok(Json(response))
}

/// Read back a persisted lead
///
/// GET /api/v1/leads/:uuid
pub async fn get_lead(State(state): State<Arc<AppState>>, Path(uuid): Path<String>) -> Response {
    match state.dispatcher.worker().sink().find_lead(&uuid).await {
        Ok(Some(lead)) => Json(lead).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("Lead '{}' not found", uuid) })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, uuid = %uuid, "Lead lookup failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "success": false, "error": "Lead lookup unavailable" })),
            )
                .into_response()
        }
    }
}

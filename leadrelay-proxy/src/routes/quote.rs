//! Quick quote routes.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use leadrelay_core::{QuickQuoteRequest, QuickQuoteResponse};
use serde_json::json;
use std::sync::Arc;
use tracing::{error, info};

use super::json_body;
use crate::error::DispatchError;
use crate::state::AppState;

/// Request a quick quote from the gateway
///
/// POST /api/v1/quote/quick-quote
pub async fn quick_quote(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<QuickQuoteResponse>, DispatchError> {
    let request: QuickQuoteRequest = json_body(&headers, &body)?;
    info!(
        source = %request.source,
        vehicles = request.vehicles.len(),
        "Quick quote request received"
    );

    let response = state.dispatcher.dispatch(request).await?;
    Ok(Json(response))
}

/// Read back a persisted quote
///
/// GET /api/v1/quotes/:id
pub async fn get_quote(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    match state.dispatcher.worker().sink().find_quote(&id).await {
        Ok(Some(quote)) => Json(quote).into_response(),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": format!("Quote '{}' not found", id) })),
        )
            .into_response(),
        Err(e) => {
            error!(error = %e, id = %id, "Quote lookup failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "success": false, "error": "Quote lookup unavailable" })),
            )
                .into_response()
        }
    }
}

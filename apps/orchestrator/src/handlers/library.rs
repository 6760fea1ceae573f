// [apps/orchestrator/src/handlers/library.rs]
/*!
 * =================================================================
 * APARATO: PROMPT LIBRARY HANDLERS (V4.0)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: FRAGMENTOS DE PROMPT Y CONTADOR DE USO
 * =================================================================
 */

use crate::handlers::{error_response, parse_query_pairs, success_response};
use crate::state::AppState;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use mysti_domain_models::LibraryItem;
use tracing::warn;

/// GET /v1/library?category=
pub async fn list_items(State(state): State<AppState>, RawQuery(raw_query): RawQuery) -> Response {
    let category = parse_query_pairs(raw_query.as_deref().unwrap_or(""))
        .into_iter()
        .find(|(key, _)| key == "category")
        .map(|(_, value)| value)
        .unwrap_or_default();

    match state.library.list(&category).await {
        Ok(items) => Json(items).into_response(),
        Err(fault) => {
            warn!("📖 [LIBRARY]: Listing degraded to empty: {}", fault);
            Json(Vec::<LibraryItem>::new()).into_response()
        }
    }
}

/// POST /v1/library
pub async fn add_item(State(state): State<AppState>, Json(item): Json<LibraryItem>) -> Response {
    if item.label.is_empty() || item.content.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "label and content are required");
    }
    match state.library.add(&item).await {
        Ok(item_id) => Json(serde_json::json!({ "status": "success", "id": item_id })).into_response(),
        Err(fault) => {
            warn!("📖 [LIBRARY]: Add dropped for [{}]: {}", item.label, fault);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "library persistence failed")
        }
    }
}

/// DELETE /v1/library/:id
pub async fn delete_item(State(state): State<AppState>, Path(item_id): Path<i64>) -> Response {
    if let Err(fault) = state.library.delete(item_id).await {
        warn!("📖 [LIBRARY]: Delete dropped for [{}]: {}", item_id, fault);
    }
    success_response()
}

/// POST /v1/library/:id/use — incrementa el contador de uso.
pub async fn mark_item_used(State(state): State<AppState>, Path(item_id): Path<i64>) -> Response {
    if let Err(fault) = state.library.increment_usage(item_id).await {
        warn!("📖 [LIBRARY]: Usage bump dropped for [{}]: {}", item_id, fault);
    }
    success_response()
}

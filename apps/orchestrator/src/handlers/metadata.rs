// [apps/orchestrator/src/handlers/metadata.rs]
/*!
 * =================================================================
 * APARATO: MODEL METADATA HANDLERS (V4.0)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: CRUD DEL JSON LIBRE POR MODELO
 * =================================================================
 */

use crate::handlers::{error_response, success_response};
use crate::state::AppState;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct SaveMetadataBody {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// GET /v1/models/metadata — catálogo completo.
pub async fn list_metadata(State(state): State<AppState>) -> Response {
    match state.metadata.get_all().await {
        Ok(catalog) => Json(catalog).into_response(),
        Err(fault) => {
            warn!("🧾 [METADATA]: Catalog degraded to empty: {}", fault);
            Json(Vec::<serde_json::Value>::new()).into_response()
        }
    }
}

/// GET /v1/models/metadata/*id — lookup con match por sufijo.
pub async fn get_metadata(State(state): State<AppState>, Path(model_id): Path<String>) -> Response {
    match state.metadata.get(&model_id).await {
        Ok(metadata) => Json(metadata).into_response(),
        Err(fault) => {
            warn!("🧾 [METADATA]: Lookup degraded for [{}]: {}", model_id, fault);
            Json(serde_json::json!({})).into_response()
        }
    }
}

/// POST /v1/models/metadata
pub async fn save_metadata(
    State(state): State<AppState>,
    Json(body): Json<SaveMetadataBody>,
) -> Response {
    if body.id.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "model id is required");
    }
    if let Err(fault) = state.metadata.save(&body.id, &body.metadata).await {
        warn!("🧾 [METADATA]: Save dropped for [{}]: {}", body.id, fault);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "metadata persistence failed");
    }
    success_response()
}

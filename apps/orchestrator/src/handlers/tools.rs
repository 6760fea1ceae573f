// [apps/orchestrator/src/handlers/tools.rs]
/*!
 * =================================================================
 * APARATO: TOOL EXECUTION HANDLER (V4.0 - LLM TOOLBOX)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: HERRAMIENTAS INVOCABLES POR EL ASISTENTE DE LA UI
 * =================================================================
 */

use crate::handlers::error_response;
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use tracing::warn;

/// Tope de resultados de la herramienta de búsqueda de historial.
const SEARCH_HISTORY_LIMIT: i64 = 10;

#[derive(Debug, Deserialize)]
pub struct ExecuteToolBody {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub arguments: serde_json::Value,
}

/// POST /v1/tools/execute — despacho por nombre de herramienta.
pub async fn execute_tool(
    State(state): State<AppState>,
    body: Result<Json<ExecuteToolBody>, axum::extract::rejection::JsonRejection>,
) -> Response {
    let Ok(Json(body)) = body else {
        return error_response(StatusCode::BAD_REQUEST, "Invalid JSON");
    };

    let result = match body.name.as_str() {
        "get_library_items" => {
            let category = body
                .arguments
                .get("category")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            match state.library.list(category).await {
                Ok(items) => serde_json::to_value(items).unwrap_or_default(),
                Err(fault) => {
                    warn!("🧰 [TOOLS]: Library tool degraded: {}", fault);
                    serde_json::json!([])
                }
            }
        }
        "search_history" => {
            let query = body
                .arguments
                .get("query")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            match state.generations.search(query, SEARCH_HISTORY_LIMIT).await {
                Ok(records) => serde_json::to_value(records).unwrap_or_default(),
                Err(fault) => {
                    warn!("🧰 [TOOLS]: Search tool degraded: {}", fault);
                    serde_json::json!([])
                }
            }
        }
        "get_vram_status" => {
            let total = state.vram_probe.total_gb().await;
            let free = state.vram_probe.free_gb().await;
            let usage_percent = if total > 0.0 {
                (total - free) / total * 100.0
            } else {
                0.0
            };
            serde_json::json!({
                "total_gb": total,
                "free_gb": free,
                "usage_percent": usage_percent,
            })
        }
        _ => serde_json::json!({ "error": "unknown_tool" }),
    };

    Json(result).into_response()
}

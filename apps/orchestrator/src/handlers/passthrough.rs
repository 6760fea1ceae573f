// [apps/orchestrator/src/handlers/passthrough.rs]
/*!
 * =================================================================
 * APARATO: PASSTHROUGH & INTERCEPT HANDLERS (V4.2 - STATE CAPTURE)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: PROXIES FINOS, INTERCEPTORES DE CARGA Y /health
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. CAPTURE ON 200: El cuerpo de una carga de modelo se sella en la
 *    bóveda de recuperación SOLO tras la aceptación del worker.
 * 2. COMPANION MERGE: '/v1/models/load' enriquece el cuerpo con las
 *    rutas compañeras ('vae', 'llm') registradas en los metadatos del
 *    modelo antes de reenviar.
 * =================================================================
 */

use crate::handlers::error_response;
use crate::proxy::MAX_REQUEST_BODY_BYTES;
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use tracing::{info, warn};

/// Proxy fino hacia el worker de difusión.
pub async fn proxy_sd(State(state): State<AppState>, request: Request) -> Response {
    let sd_port = state.config.sd_worker_port();
    state.proxy.forward(sd_port, request).await
}

/// Proxy fino hacia el worker de lenguaje.
pub async fn proxy_llm(State(state): State<AppState>, request: Request) -> Response {
    let llm_port = state.config.llm_worker_port();
    state.proxy.forward(llm_port, request).await
}

/**
 * Interceptor de '/v1/models/load': fusiona rutas compañeras desde los
 * metadatos, reenvía y captura el cuerpo final como payload de
 * recuperación del worker SD.
 */
pub async fn intercept_sd_load(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let Ok(body_bytes) = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await else {
        return error_response(StatusCode::BAD_REQUEST, "request body unreadable");
    };

    let final_body = merge_companion_paths(&state, &body_bytes).await;

    let response = state
        .proxy
        .forward_with_body(
            state.config.sd_worker_port(),
            parts.method,
            &parts.uri,
            &parts.headers,
            Bytes::from(final_body.clone()),
            None,
        )
        .await;

    if response.status() == StatusCode::OK {
        state.sd_load_state.capture(final_body);
        // Carga manual aceptada: rearma el latch de modo seguro.
        state
            .sd_crash_count
            .store(0, std::sync::atomic::Ordering::SeqCst);
        info!("🧷 [CAPTURE]: SD model state saved for auto-recovery.");
    }
    response
}

/**
 * Interceptor de '/v1/llm/load': reenvía (ruta de streaming) y captura
 * el cuerpo verbatim tras el 200 del worker.
 */
pub async fn intercept_llm_load(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let Ok(body_bytes) = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await else {
        return error_response(StatusCode::BAD_REQUEST, "request body unreadable");
    };
    let body_text = String::from_utf8_lossy(&body_bytes).into_owned();

    let response = state
        .proxy
        .forward_with_body(
            state.config.llm_worker_port(),
            parts.method,
            &parts.uri,
            &parts.headers,
            body_bytes,
            None,
        )
        .await;

    if response.status() == StatusCode::OK {
        state.llm_load_state.capture(body_text);
        info!("🧷 [CAPTURE]: LLM model state saved for auto-recovery.");
    }
    response
}

/// Fusión de rutas compañeras ('vae', 'llm') desde los metadatos.
async fn merge_companion_paths(state: &AppState, body_bytes: &[u8]) -> String {
    let fallback = String::from_utf8_lossy(body_bytes).into_owned();

    let Ok(mut load_request) = serde_json::from_slice::<serde_json::Value>(body_bytes) else {
        return fallback;
    };
    let Some(model_id) = load_request
        .get("model_id")
        .and_then(|value| value.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
    else {
        return fallback;
    };

    let metadata = match state.metadata.get(&model_id).await {
        Ok(metadata) => metadata,
        Err(fault) => {
            warn!("🧷 [CAPTURE]: Metadata lookup failed for [{}]: {}", model_id, fault);
            return fallback;
        }
    };

    for companion_key in ["vae", "llm"] {
        if let Some(companion_path) = metadata
            .get(companion_key)
            .and_then(|value| value.as_str())
            .filter(|path| !path.is_empty())
        {
            load_request[companion_key] = serde_json::Value::from(companion_path);
        }
    }

    load_request.to_string()
}

/**
 * Resumen de salud del sistema: estado de ambos workers y VRAM.
 */
pub async fn health_summary(State(state): State<AppState>) -> Response {
    let mut status = state.resource_manager.vram_status().await;

    let sd_alive = state.sd_control.is_healthy().await;
    let llm_alive = state.llm_control.is_healthy().await;

    status["status"] = serde_json::Value::from("ok");
    status["sd_worker"] = serde_json::Value::from(if sd_alive { "ok" } else { "down" });
    status["llm_worker"] = serde_json::Value::from(if llm_alive { "ok" } else { "down" });
    status["vram_total_gb"] = status["total_gb"].clone();
    status["vram_free_gb"] = status["free_gb"].clone();

    axum::Json(status).into_response()
}

/**
 * Archivos de salida: las vistas previas se sirven localmente (las
 * genera el orquestador); el resto se delega al worker SD, dueño del
 * directorio de outputs.
 */
pub async fn serve_outputs(
    State(state): State<AppState>,
    Path(relative_path): Path<String>,
    request: Request,
) -> Response {
    if let Some(preview_name) = relative_path.strip_prefix("previews/") {
        // Rechazo de fugas de directorio en el nombre solicitado.
        if preview_name.contains("..") || preview_name.contains('/') {
            return error_response(StatusCode::BAD_REQUEST, "invalid preview name");
        }
        let preview_path = std::path::Path::new(&state.config.output_dir)
            .join("previews")
            .join(preview_name);
        return match tokio::fs::read(&preview_path).await {
            Ok(payload) => {
                let mime = if preview_name.ends_with(".jpg") || preview_name.ends_with(".jpeg") {
                    "image/jpeg"
                } else {
                    "image/png"
                };
                Response::builder()
                    .status(StatusCode::OK)
                    .header("content-type", mime)
                    .body(axum::body::Body::from(payload))
                    .unwrap_or_else(|_| {
                        error_response(StatusCode::INTERNAL_SERVER_ERROR, "preview read failed")
                    })
            }
            Err(_) => error_response(StatusCode::NOT_FOUND, "preview not found"),
        };
    }

    proxy_sd(State(state), request).await
}

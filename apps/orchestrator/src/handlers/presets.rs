// [apps/orchestrator/src/handlers/presets.rs]
/*!
 * =================================================================
 * APARATO: PRESET HANDLERS (V4.2 - BUNDLE MATERIALIZATION)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: CRUD DE PRESETS Y CARGA MATERIALIZADA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SIZE-DERIVED ESTIMATES: Un preset sin estimación de VRAM la deriva
 *    de los tamaños de archivo de sus componentes (+5% de margen).
 * 2. MATERIALIZED LOAD: Cargar un preset sintetiza el cuerpo de
 *    '/v1/models/load' con las rutas no vacías; el 200 captura el
 *    payload de recuperación y sella la huella medida.
 * =================================================================
 */

use crate::handlers::{error_response, success_response};
use crate::state::AppState;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Json, Response};
use mysti_domain_models::{ImagePreset, LlmPreset};
use serde::Deserialize;
use tracing::{info, warn};

/// Margen sobre la suma de tamaños de archivo (contexto y buffers).
const SIZE_ESTIMATE_MARGIN: f64 = 1.05;

#[derive(Debug, Deserialize)]
pub struct LoadPresetBody {
    #[serde(default)]
    pub id: i64,
}

// --- ESTRATO DE IMAGEN ---

/// GET /v1/presets/image
pub async fn list_image_presets(State(state): State<AppState>) -> Response {
    match state.presets.list_image_presets().await {
        Ok(presets) => Json(presets).into_response(),
        Err(fault) => {
            warn!("📦 [PRESETS]: Image listing degraded to empty: {}", fault);
            Json(Vec::<ImagePreset>::new()).into_response()
        }
    }
}

/// POST /v1/presets/image — upsert con estimación de VRAM derivada.
pub async fn save_image_preset(
    State(state): State<AppState>,
    Json(mut preset): Json<ImagePreset>,
) -> Response {
    if preset.name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "preset name is required");
    }

    if preset.vram_weights_mb_estimate <= 0 {
        preset.vram_weights_mb_estimate =
            estimate_component_weights_mb(&state.config.model_dir, &preset).await;
    }

    if let Err(fault) = state.presets.save_image_preset(&preset).await {
        warn!("📦 [PRESETS]: Image preset save dropped for [{}]: {}", preset.name, fault);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "preset persistence failed");
    }
    success_response()
}

/// DELETE /v1/presets/image/:id
pub async fn delete_image_preset(
    State(state): State<AppState>,
    Path(preset_id): Path<i64>,
) -> Response {
    if let Err(fault) = state.presets.delete_image_preset(preset_id).await {
        warn!("📦 [PRESETS]: Image preset delete dropped for [{}]: {}", preset_id, fault);
    }
    success_response()
}

/**
 * POST /v1/presets/image/load — materializa las rutas del preset en un
 * cuerpo sintético de '/v1/models/load' y lo reenvía al worker SD.
 */
pub async fn load_image_preset(
    State(state): State<AppState>,
    Json(body): Json<LoadPresetBody>,
) -> Response {
    let presets = match state.presets.list_image_presets().await {
        Ok(presets) => presets,
        Err(fault) => {
            warn!("📦 [PRESETS]: Preset lookup failed: {}", fault);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "preset lookup failed");
        }
    };
    let Some(selected) = presets.into_iter().find(|preset| preset.id == body.id) else {
        return error_response(StatusCode::NOT_FOUND, "preset not found");
    };

    let load_request = materialize_load_request(&selected);
    let load_body = load_request.to_string();

    let synthetic_uri: Uri = "/v1/models/load".parse().expect("static uri must parse");
    let response = state
        .proxy
        .forward_with_body(
            state.config.sd_worker_port(),
            Method::POST,
            &synthetic_uri,
            &axum::http::HeaderMap::new(),
            Bytes::from(load_body.clone()),
            Some("/v1/models/load"),
        )
        .await;

    if response.status() == StatusCode::OK {
        state.sd_load_state.capture(load_body);
        state
            .sd_crash_count
            .store(0, std::sync::atomic::Ordering::SeqCst);
        info!("📦 [PRESETS]: Preset [{}] loaded; recovery payload captured.", selected.name);
        record_measured_footprint(&state, selected.id).await;
    }
    response
}

/// Huella medida post-carga: los signos vitales del worker la reportan.
async fn record_measured_footprint(state: &AppState, preset_id: i64) {
    let Ok(vitals) = state.sd_control.health().await else {
        return;
    };
    if vitals.vram_gb <= 0.05 {
        return;
    }
    let measured_mb = (vitals.vram_gb as f64 * 1024.0) as i64;
    if let Err(fault) = state.presets.record_measured_vram(preset_id, measured_mb).await {
        warn!("📦 [PRESETS]: Measured footprint dropped for [{}]: {}", preset_id, fault);
    }
}

/// Cuerpo sintético de carga: solo las rutas de componente no vacías.
pub fn materialize_load_request(preset: &ImagePreset) -> serde_json::Value {
    let mut load_request = serde_json::json!({ "model_id": preset.unet_path });
    let component_slots = [
        ("vae", &preset.vae_path),
        ("clip_l", &preset.clip_l_path),
        ("clip_g", &preset.clip_g_path),
        ("t5xxl", &preset.t5xxl_path),
    ];
    for (slot_key, slot_path) in component_slots {
        if !slot_path.is_empty() {
            load_request[slot_key] = serde_json::Value::from(slot_path.clone());
        }
    }
    load_request
}

/// Suma de tamaños de componente bajo la raíz de modelos, en MB.
async fn estimate_component_weights_mb(model_dir: &str, preset: &ImagePreset) -> i64 {
    let mut total_bytes: u64 = 0;
    for component_path in preset.component_paths() {
        let full_path = std::path::Path::new(model_dir).join(component_path);
        if let Ok(file_metadata) = tokio::fs::metadata(&full_path).await {
            total_bytes += file_metadata.len();
        }
    }
    if total_bytes == 0 {
        return 0;
    }
    ((total_bytes as f64 * SIZE_ESTIMATE_MARGIN) / (1024.0 * 1024.0)) as i64
}

// --- ESTRATO DE LENGUAJE ---

/// GET /v1/presets/llm
pub async fn list_llm_presets(State(state): State<AppState>) -> Response {
    match state.presets.list_llm_presets().await {
        Ok(presets) => Json(presets).into_response(),
        Err(fault) => {
            warn!("📦 [PRESETS]: LLM listing degraded to empty: {}", fault);
            Json(Vec::<LlmPreset>::new()).into_response()
        }
    }
}

/// POST /v1/presets/llm
pub async fn save_llm_preset(
    State(state): State<AppState>,
    Json(preset): Json<LlmPreset>,
) -> Response {
    if preset.name.is_empty() || preset.model_path.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "preset name and model_path are required");
    }
    if let Err(fault) = state.presets.save_llm_preset(&preset).await {
        warn!("📦 [PRESETS]: LLM preset save dropped for [{}]: {}", preset.name, fault);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "preset persistence failed");
    }
    success_response()
}

/// DELETE /v1/presets/llm/:id
pub async fn delete_llm_preset(
    State(state): State<AppState>,
    Path(preset_id): Path<i64>,
) -> Response {
    if let Err(fault) = state.presets.delete_llm_preset(preset_id).await {
        warn!("📦 [PRESETS]: LLM preset delete dropped for [{}]: {}", preset_id, fault);
    }
    success_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn materialized_load_request_skips_empty_components() {
        let preset = ImagePreset {
            id: 1,
            name: "SDXL".into(),
            unet_path: "sdxl/unet.gguf".into(),
            vae_path: "sdxl/vae.gguf".into(),
            ..Default::default()
        };
        let load_request = materialize_load_request(&preset);
        assert_eq!(load_request["model_id"], "sdxl/unet.gguf");
        assert_eq!(load_request["vae"], "sdxl/vae.gguf");
        assert!(load_request.get("clip_l").is_none());
        assert!(load_request.get("t5xxl").is_none());
    }
}

// [apps/orchestrator/src/handlers/generate.rs]
/*!
 * =================================================================
 * APARATO: GENERATION HOT LOOP (V4.5 - ADMIT/ENRICH/PERSIST)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: EL CAMINO CALIENTE DE '/v1/images/generations'
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ARBITRATE FIRST: Sin veredicto de admisión no se toca al worker;
 *    el rechazo viaja como 503 con razón humana.
 * 2. FILL-IN, NEVER OVERWRITE: Los metadatos del modelo solo completan
 *    campos ausentes o con valor por defecto; lo que el usuario fijó
 *    explícitamente se respeta.
 * 3. PERSIST AFTER 200: La fila de generación nace estrictamente tras
 *    el éxito del worker y antes de notificar al tagger.
 * 4. COMMIT SYMMETRY: Todo compromiso de VRAM admitido se libera al
 *    salir del camino caliente, con o sin éxito upstream.
 * =================================================================
 */

use crate::handlers::error_response;
use crate::proxy::MAX_REQUEST_BODY_BYTES;
use crate::state::AppState;
use axum::body::{Body, Bytes};
use axum::extract::{Request, State};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use mysti_domain_models::{ArbitrationRequest, Generation};
use tracing::{info, instrument, warn};

/// Estimación total nominal de una generación (base + overhead), GB.
const ESTIMATED_GENERATION_TOTAL_GB: f32 = 4.0;

/// Valores "de fábrica" que los metadatos pueden completar.
const DEFAULT_DIMENSION: i64 = 512;
const DEFAULT_CFG_SCALE: f64 = 7.0;
const DEFAULT_STEP_VALUES: &[i64] = &[0, 20, 15];

#[instrument(skip(state, request))]
pub async fn handle_generate(State(state): State<AppState>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let Ok(body_bytes) = axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await else {
        return error_response(StatusCode::BAD_REQUEST, "request body unreadable");
    };

    let mut generation_request = match serde_json::from_slice::<serde_json::Value>(&body_bytes) {
        Ok(value) if value.is_object() => value,
        _ => return error_response(StatusCode::BAD_REQUEST, "malformed generation request body"),
    };

    // 1. ARBITRAJE DE VRAM: la estimación de megapíxeles nace de la
    // petición cruda; sin veredicto de admisión no se toca al worker.
    let width = generation_request
        .get("width")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_DIMENSION);
    let height = generation_request
        .get("height")
        .and_then(|v| v.as_i64())
        .unwrap_or(DEFAULT_DIMENSION);
    let megapixels = (width * height) as f32 / 1_000_000.0;

    let resident_model_id = state.sd_load_state.peek_model_id().unwrap_or_default();
    let verdict = state
        .resource_manager
        .prepare_for_image_generation(&ArbitrationRequest {
            estimated_total_needed_gb: ESTIMATED_GENERATION_TOTAL_GB,
            megapixels,
            model_id: resident_model_id.clone(),
            base_gb_override: 0.0,
            clip_size_gb: 0.0,
        })
        .await;

    if !verdict.admit {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, verdict.reason);
    }

    // 2. HINTS DEL ÁRBITRO HACIA EL WORKER
    if verdict.request_clip_offload {
        generation_request["clip_on_cpu"] = serde_json::Value::from(true);
    }
    if verdict.request_vae_tiling {
        generation_request["vae_tiling"] = serde_json::Value::from(true);
    }

    // 3. ENRIQUECIMIENTO: metadatos del modelo activo completan defaults.
    if let Ok(worker_config) = state.sd_control.get_json("/v1/config").await {
        if let Some(active_model_id) = worker_config
            .get("model")
            .and_then(|value| value.as_str())
            .filter(|id| !id.is_empty())
        {
            if let Ok(model_metadata) = state.metadata.get(active_model_id).await {
                enrich_generation_request(&mut generation_request, &model_metadata);
            }
        }
    }

    let forwarded_body = generation_request.to_string();

    // 4. PRIORIDAD DE VRAM: el tagger cede mientras generamos.
    state.set_generation_active(true);

    let round_trip = state
        .proxy
        .round_trip_buffered(
            state.config.sd_worker_port(),
            Method::POST,
            "/v1/images/generations",
            &parts.headers,
            Bytes::from(forwarded_body.clone()),
        )
        .await;

    state.set_generation_active(false);
    state.resource_manager.uncommit_vram(verdict.committed_gb);

    match round_trip {
        Ok((status, headers, payload)) => {
            if status == StatusCode::OK {
                if let Ok(worker_response) =
                    serde_json::from_slice::<serde_json::Value>(&payload)
                {
                    persist_generation(
                        &state,
                        &generation_request,
                        &worker_response,
                        &forwarded_body,
                        &resident_model_id,
                    )
                    .await;
                }
            }
            let mut response = Response::builder().status(status);
            if let Some(headers_slot) = response.headers_mut() {
                *headers_slot = headers;
            }
            response.body(Body::from(payload)).unwrap_or_else(|_| {
                error_response(StatusCode::INTERNAL_SERVER_ERROR, "response build failed")
            })
        }
        Err(fault) => {
            warn!("🎨 [GENERATE]: Worker round-trip failed: {}", fault);
            error_response(StatusCode::BAD_GATEWAY, "Proxy failed to connect to worker")
        }
    }
}

/**
 * Completa campos de fábrica desde los metadatos del modelo activo.
 * Un valor fijado por el usuario fuera de los defaults nunca se pisa.
 */
pub fn enrich_generation_request(
    generation_request: &mut serde_json::Value,
    model_metadata: &serde_json::Value,
) {
    if model_metadata.as_object().map_or(true, |m| m.is_empty()) {
        return;
    }

    for dimension_key in ["width", "height"] {
        let current = generation_request.get(dimension_key).and_then(|v| v.as_i64());
        if current.is_none() || current == Some(DEFAULT_DIMENSION) {
            if let Some(preferred) = model_metadata.get(dimension_key).and_then(|v| v.as_i64()) {
                generation_request[dimension_key] = serde_json::Value::from(preferred);
            }
        }
    }

    let current_steps = generation_request
        .get("sample_steps")
        .and_then(|v| v.as_i64())
        .or_else(|| generation_request.get("steps").and_then(|v| v.as_i64()))
        .unwrap_or(0);
    if DEFAULT_STEP_VALUES.contains(&current_steps) {
        if let Some(preferred_steps) = model_metadata.get("sample_steps").and_then(|v| v.as_i64()) {
            generation_request["sample_steps"] = serde_json::Value::from(preferred_steps);
            generation_request["steps"] = serde_json::Value::from(preferred_steps);
        }
    }

    let current_cfg = generation_request.get("cfg_scale").and_then(|v| v.as_f64());
    if current_cfg.is_none() || current_cfg == Some(DEFAULT_CFG_SCALE) {
        if let Some(preferred_cfg) = model_metadata.get("cfg_scale").and_then(|v| v.as_f64()) {
            generation_request["cfg_scale"] = serde_json::Value::from(preferred_cfg);
        }
    }
}

/**
 * Identidad externa de la generación: el 'id' de la respuesta, con
 * fallback al último segmento de la URL del primer archivo producido.
 */
pub fn derive_generation_identity(worker_response: &serde_json::Value) -> Option<(String, String)> {
    let file_path = worker_response
        .get("data")
        .and_then(|data| data.as_array())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("url"))
        .and_then(|url| url.as_str())
        .unwrap_or_default()
        .to_string();

    let uuid = worker_response
        .get("id")
        .and_then(|id| id.as_str())
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .or_else(|| {
            if file_path.is_empty() {
                None
            } else {
                Some(
                    file_path
                        .rsplit('/')
                        .next()
                        .unwrap_or(file_path.as_str())
                        .to_string(),
                )
            }
        })?;

    if file_path.is_empty() {
        return None;
    }
    Some((uuid, file_path))
}

/// Semilla efectiva: la pedida, o la reportada por el worker si se delegó.
pub fn resolve_seed(
    generation_request: &serde_json::Value,
    worker_response: &serde_json::Value,
) -> i64 {
    let requested_seed = generation_request
        .get("seed")
        .and_then(|v| v.as_i64())
        .unwrap_or(-1);
    if requested_seed != -1 {
        return requested_seed;
    }
    worker_response
        .get("data")
        .and_then(|data| data.as_array())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("seed"))
        .and_then(|seed| seed.as_i64())
        .unwrap_or(requested_seed)
}

async fn persist_generation(
    state: &AppState,
    generation_request: &serde_json::Value,
    worker_response: &serde_json::Value,
    forwarded_body: &str,
    resident_model_id: &str,
) {
    let Some((uuid, file_path)) = derive_generation_identity(worker_response) else {
        warn!("🎨 [GENERATE]: Worker response carried no identity; nothing persisted.");
        return;
    };

    let steps = generation_request
        .get("sample_steps")
        .and_then(|v| v.as_i64())
        .or_else(|| generation_request.get("steps").and_then(|v| v.as_i64()))
        .unwrap_or(20);

    let generation_row = Generation {
        uuid: uuid.clone(),
        file_path,
        prompt: text_field(generation_request, "prompt"),
        negative_prompt: text_field(generation_request, "negative_prompt"),
        seed: resolve_seed(generation_request, worker_response),
        width: generation_request.get("width").and_then(|v| v.as_i64()).unwrap_or(512),
        height: generation_request.get("height").and_then(|v| v.as_i64()).unwrap_or(512),
        steps,
        cfg_scale: generation_request
            .get("cfg_scale")
            .and_then(|v| v.as_f64())
            .unwrap_or(7.0),
        generation_time: worker_response
            .get("generation_time")
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0),
        model_id: resident_model_id.to_string(),
        params_json: forwarded_body.to_string(),
        ..Default::default()
    };

    match state.generations.insert(&generation_row).await {
        Ok(()) => {
            info!("🎨 [GENERATE]: Generation [{}] persisted. Notifying tagger.", uuid);
            state.notify_tagger();
        }
        Err(fault) => warn!("🎨 [GENERATE]: Persistence dropped for [{}]: {}", uuid, fault),
    }
}

fn text_field(value: &serde_json::Value, key: &str) -> String {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_prefers_response_id_then_url_segment() {
        let with_id = serde_json::json!({
            "id": "img-1",
            "data": [{"url": "/outputs/img-1.png"}]
        });
        assert_eq!(
            derive_generation_identity(&with_id),
            Some(("img-1".into(), "/outputs/img-1.png".into()))
        );

        let without_id = serde_json::json!({
            "data": [{"url": "/outputs/img-7.png"}]
        });
        assert_eq!(
            derive_generation_identity(&without_id),
            Some(("img-7.png".into(), "/outputs/img-7.png".into()))
        );

        let empty = serde_json::json!({ "data": [] });
        assert_eq!(derive_generation_identity(&empty), None);
    }

    #[test]
    fn metadata_fills_defaults_but_never_user_values() {
        let metadata = serde_json::json!({
            "width": 1024, "height": 1024, "sample_steps": 30, "cfg_scale": 4.5
        });

        let mut defaulted = serde_json::json!({
            "prompt": "a cat", "width": 512, "height": 512, "steps": 20, "cfg_scale": 7.0
        });
        enrich_generation_request(&mut defaulted, &metadata);
        assert_eq!(defaulted["width"], 1024);
        assert_eq!(defaulted["sample_steps"], 30);
        assert_eq!(defaulted["steps"], 30);
        assert_eq!(defaulted["cfg_scale"], 4.5);

        let mut user_pinned = serde_json::json!({
            "prompt": "a cat", "width": 768, "height": 640, "steps": 45, "cfg_scale": 3.0
        });
        enrich_generation_request(&mut user_pinned, &metadata);
        assert_eq!(user_pinned["width"], 768);
        assert_eq!(user_pinned["height"], 640);
        assert_eq!(user_pinned["steps"], 45);
        assert_eq!(user_pinned["cfg_scale"], 3.0);
    }

    #[test]
    fn seed_falls_back_to_worker_reported_value() {
        let request = serde_json::json!({ "seed": -1 });
        let response = serde_json::json!({ "data": [{"url": "/o/x.png", "seed": 42}] });
        assert_eq!(resolve_seed(&request, &response), 42);

        let pinned = serde_json::json!({ "seed": 7 });
        assert_eq!(resolve_seed(&pinned, &response), 7);
    }
}

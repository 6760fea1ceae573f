// [apps/orchestrator/src/services/style_preview.rs]
/*!
 * =================================================================
 * APARATO: STYLE PREVIEW RENDERER (V4.1 - DEFERRED THUMBNAILS)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: RENDER 512x512 DE VISTAS PREVIAS DE ESTILO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. IN-MEMORY ROUNDTRIP: El worker devuelve 'b64_json' con
 *    'save_image=false'; el orquestador decide dónde vive el PNG.
 * 2. METADATA TUNING: Los pasos y CFG de la vista previa provienen de
 *    los metadatos del modelo activo cuando existen.
 * =================================================================
 */

use crate::state::AppState;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use mysti_domain_models::Style;
use tracing::{info, instrument, warn};

/// Sujeto neutral para materializar el efecto del estilo.
const PREVIEW_SUBJECT: &str = "a generic test subject";
const PREVIEW_DIMENSION: i64 = 512;
const DEFAULT_PREVIEW_STEPS: i64 = 15;
const DEFAULT_PREVIEW_CFG: f64 = 7.0;

/**
 * Renderiza la vista previa de un estilo y sella su 'preview_path'.
 * Pensado como handler del job 'style_preview'.
 */
#[instrument(skip(state, style), fields(style = %style.name))]
pub async fn generate_style_preview(state: &AppState, mut style: Style) -> Result<(), String> {
    if style.prompt.is_empty() {
        return Ok(());
    }

    let final_prompt = style.apply_to(PREVIEW_SUBJECT);

    // Afinación desde los metadatos del modelo activo, si los hay.
    let mut preview_steps = DEFAULT_PREVIEW_STEPS;
    let mut preview_cfg = DEFAULT_PREVIEW_CFG;
    if let Ok(worker_config) = state.sd_control.get_json("/v1/config").await {
        if let Some(active_model_id) = worker_config.get("model").and_then(|m| m.as_str()) {
            if let Ok(model_metadata) = state.metadata.get(active_model_id).await {
                if let Some(steps) = model_metadata.get("sample_steps").and_then(|v| v.as_i64()) {
                    preview_steps = steps;
                }
                if let Some(cfg) = model_metadata.get("cfg_scale").and_then(|v| v.as_f64()) {
                    preview_cfg = cfg;
                }
            }
        }
    }

    let generation_request = serde_json::json!({
        "prompt": final_prompt,
        "negative_prompt": style.negative_prompt,
        "width": PREVIEW_DIMENSION,
        "height": PREVIEW_DIMENSION,
        "sample_steps": preview_steps,
        "cfg_scale": preview_cfg,
        "n": 1,
        "save_image": false,
    });

    let worker_response = state
        .sd_control
        .image_generations(&generation_request)
        .await
        .map_err(|fault| format!("preview generation failed: {}", fault))?;

    let encoded_image = worker_response
        .get("data")
        .and_then(|data| data.as_array())
        .and_then(|entries| entries.first())
        .and_then(|entry| entry.get("b64_json"))
        .and_then(|b64| b64.as_str())
        .ok_or_else(|| "worker response carried no b64_json payload".to_string())?;

    let image_bytes = BASE64_STANDARD
        .decode(encoded_image)
        .map_err(|fault| format!("preview decode failed: {}", fault))?;

    let previews_dir = std::path::Path::new(&state.config.output_dir).join("previews");
    tokio::fs::create_dir_all(&previews_dir)
        .await
        .map_err(|fault| format!("previews dir unavailable: {}", fault))?;

    let preview_filename = format!("style_{}.png", style.name.replace(' ', "_"));
    let preview_file_path = previews_dir.join(&preview_filename);
    tokio::fs::write(&preview_file_path, &image_bytes)
        .await
        .map_err(|fault| format!("preview write failed: {}", fault))?;

    style.preview_path = format!("/outputs/previews/{}", preview_filename);
    if let Err(fault) = state.styles.save(&style).await {
        warn!("🖼️ [PREVIEW]: Style row update dropped for [{}]: {}", style.name, fault);
    } else {
        info!("🖼️ [PREVIEW]: Preview sealed at [{}].", style.preview_path);
    }
    Ok(())
}

// [apps/orchestrator/src/handlers/styles.rs]
/*!
 * =================================================================
 * APARATO: STYLE HANDLERS (V4.3 - LLM EXTRACTION)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: CRUD DE ESTILOS, EXTRACCIÓN LLM Y VISTAS PREVIAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. ASYNC PREVIEWS: Las vistas previas viajan por el ledger de jobs
 *    ('style_preview'); el alta de un estilo responde de inmediato.
 * 2. PLACEHOLDER GOVERNANCE: Todo prompt extraído sin '{prompt}' se
 *    normaliza anteponiéndolo, preservando el contrato de sustitución.
 * 3. TOLERANT PARSING: El JSON del LLM se acepta como arreglo, como
 *    objeto {styles: [...]} o como estilo único.
 * =================================================================
 */

use crate::handlers::{error_response, success_response};
use crate::state::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use mysti_domain_models::{Style, STYLE_PROMPT_PLACEHOLDER};
use serde::Deserialize;
use tracing::{info, warn};

/// Prompt de sistema del analizador de estilos (contrato JSON estricto).
const STYLE_EXTRACTION_SYSTEM_PROMPT: &str = "You are an expert art style analyzer. Analyze the \
given image prompt and extract distinct art styles, artists, or aesthetic descriptors. Return a \
JSON object with a 'styles' key containing an array of objects. Each style object must have \
'name' (concise style name), 'prompt' (keywords to append, MUST include '{prompt}' placeholder), \
and 'negative_prompt' (optional tags to avoid).";

#[derive(Debug, Deserialize)]
pub struct DeleteStyleBody {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct ExtractStylesBody {
    #[serde(default)]
    pub prompt: String,
}

/// GET /v1/styles
pub async fn list_styles(State(state): State<AppState>) -> Response {
    match state.styles.list().await {
        Ok(styles) => Json(styles).into_response(),
        Err(fault) => {
            warn!("🎭 [STYLES]: Listing degraded to empty: {}", fault);
            Json(Vec::<Style>::new()).into_response()
        }
    }
}

/// POST /v1/styles — alta/actualización + vista previa diferida.
pub async fn save_style(State(state): State<AppState>, Json(style): Json<Style>) -> Response {
    if style.name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "style name is required");
    }
    if let Err(fault) = state.styles.save(&style).await {
        warn!("🎭 [STYLES]: Save dropped for [{}]: {}", style.name, fault);
        return error_response(StatusCode::INTERNAL_SERVER_ERROR, "style persistence failed");
    }
    enqueue_preview_job(&state, &style).await;
    success_response()
}

/// DELETE /v1/styles
pub async fn delete_style(
    State(state): State<AppState>,
    Json(body): Json<DeleteStyleBody>,
) -> Response {
    if body.name.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "style name is required");
    }
    if let Err(fault) = state.styles.delete(&body.name).await {
        warn!("🎭 [STYLES]: Delete dropped for [{}]: {}", body.name, fault);
    }
    success_response()
}

/**
 * POST /v1/styles/extract — el LLM descompone un prompt en estilos
 * reutilizables que se upsertan y reciben vista previa diferida.
 */
pub async fn extract_styles(
    State(state): State<AppState>,
    Json(body): Json<ExtractStylesBody>,
) -> Response {
    if body.prompt.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Prompt is required");
    }

    let chat_request = serde_json::json!({
        "messages": [
            { "role": "system", "content": STYLE_EXTRACTION_SYSTEM_PROMPT },
            { "role": "user", "content": body.prompt },
        ],
        "temperature": 0.2,
        "max_tokens": 1024,
        "response_format": { "type": "json_object" },
    });

    let chat_response = match state.llm_control.chat_completions(&chat_request).await {
        Ok(response) => response,
        Err(fault) => {
            warn!("🎭 [STYLES]: Extraction chat failed: {}", fault);
            return error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to extract styles from LLM",
            );
        }
    };

    let content = chat_response
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.pointer("/message/content"))
        .and_then(|content| content.as_str())
        .unwrap_or_default();

    let extracted_styles = parse_extracted_styles(content);
    if extracted_styles.is_empty() {
        return error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to extract styles from LLM",
        );
    }

    for style in &extracted_styles {
        if let Err(fault) = state.styles.save(style).await {
            warn!("🎭 [STYLES]: Extracted style [{}] dropped: {}", style.name, fault);
            continue;
        }
        enqueue_preview_job(&state, style).await;
    }
    info!("🎭 [STYLES]: {} styles extracted and queued for preview.", extracted_styles.len());

    match state.styles.list().await {
        Ok(styles) => Json(styles).into_response(),
        Err(_) => Json(extracted_styles).into_response(),
    }
}

/**
 * POST /v1/styles/previews/fix — re-encola vistas previas faltantes.
 */
pub async fn fix_previews(State(state): State<AppState>) -> Response {
    let styles = match state.styles.list().await {
        Ok(styles) => styles,
        Err(fault) => {
            warn!("🎭 [STYLES]: Preview backfill listing failed: {}", fault);
            return error_response(StatusCode::INTERNAL_SERVER_ERROR, "style listing failed");
        }
    };

    let missing: Vec<&Style> = styles
        .iter()
        .filter(|style| style.preview_path.is_empty())
        .collect();
    for style in &missing {
        enqueue_preview_job(&state, style).await;
    }

    Json(serde_json::json!({ "count": missing.len() })).into_response()
}

/// Encola la generación diferida de la vista previa de un estilo.
async fn enqueue_preview_job(state: &AppState, style: &Style) {
    let payload = serde_json::to_value(style).unwrap_or(serde_json::Value::Null);
    if let Err(fault) = state.jobs.enqueue("style_preview", &payload, 0).await {
        warn!("🎭 [STYLES]: Preview job for [{}] dropped: {}", style.name, fault);
    }
}

/**
 * Interpreta la respuesta del LLM en sus tres formas toleradas y
 * normaliza el marcador '{prompt}'.
 */
pub fn parse_extracted_styles(llm_content: &str) -> Vec<Style> {
    let json_block = crate::services::tagging_service::extract_json_block(llm_content);
    if json_block.is_empty() {
        return Vec::new();
    }
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(&json_block) else {
        return Vec::new();
    };

    let style_entries: Vec<serde_json::Value> = if parsed.is_array() {
        parsed.as_array().cloned().unwrap_or_default()
    } else if let Some(styles) = parsed.get("styles").and_then(|s| s.as_array()) {
        styles.clone()
    } else if parsed.get("name").is_some() {
        vec![parsed]
    } else {
        Vec::new()
    };

    style_entries
        .into_iter()
        .filter_map(|entry| {
            let name = entry.get("name")?.as_str()?.to_string();
            let mut prompt = entry.get("prompt")?.as_str()?.to_string();
            if name.is_empty() || prompt.is_empty() {
                return None;
            }
            if !prompt.contains(STYLE_PROMPT_PLACEHOLDER) {
                prompt = format!("{}, {}", STYLE_PROMPT_PLACEHOLDER, prompt);
            }
            Some(Style {
                name,
                prompt,
                negative_prompt: entry
                    .get("negative_prompt")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string(),
                preview_path: String::new(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_accepts_object_array_and_single_forms() {
        let object_form = r#"{"styles":[{"name":"Cyberpunk","prompt":"{prompt}, neon"}]}"#;
        let parsed = parse_extracted_styles(object_form);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "Cyberpunk");

        let array_form = r#"[{"name":"Oil","prompt":"oil painting"}]"#;
        let parsed = parse_extracted_styles(array_form);
        assert_eq!(parsed[0].prompt, "{prompt}, oil painting");

        let single_form = r#"{"name":"Noir","prompt":"{prompt}, noir"}"#;
        assert_eq!(parse_extracted_styles(single_form).len(), 1);
    }

    #[test]
    fn extraction_survives_chatter_around_the_json() {
        let noisy = "Sure! Here you go:\n{\"styles\":[{\"name\":\"Ukiyo-e\",\"prompt\":\"{prompt}, woodblock\"}]}\nEnjoy.";
        let parsed = parse_extracted_styles(noisy);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].name, "Ukiyo-e");
    }

    #[test]
    fn extraction_drops_incomplete_entries() {
        let incomplete = r#"{"styles":[{"name":"","prompt":"x"},{"name":"Ok","prompt":""}]}"#;
        assert!(parse_extracted_styles(incomplete).is_empty());
    }
}

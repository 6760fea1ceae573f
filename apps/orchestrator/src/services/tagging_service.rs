// [apps/orchestrator/src/services/tagging_service.rs]
/*!
 * =================================================================
 * APARATO: OPPORTUNISTIC TAGGING SERVICE (V4.4 - VISION/TEXT DUAL)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: ETIQUETADO AUTOMÁTICO DE GENERACIONES FRESCAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. VRAM COURTESY: El bucle cede el turno mientras una generación está
 *    en vuelo; la difusión siempre tiene prioridad sobre la memoria.
 * 2. DUAL MODALITY: Con proyector multimodal, la imagen viaja como
 *    data-URI; sin él, el tagger degrada al prompt textual.
 * 3. QUEUE PROGRESS: Todo candidato procesado se marca como etiquetado
 *    aunque el parseo falle; una imagen corrupta no bloquea la cola.
 * 4. LOAD COOLDOWN: Un auto-load fallido del LLM impone 60 s de
 *    enfriamiento antes de volver a presionar la VRAM.
 * =================================================================
 */

use crate::state::AppState;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use mysti_domain_models::WorkerVitals;
use mysti_infra_db::repositories::UntaggedGeneration;
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, info, instrument, warn};

/// Prompt de sistema del motor de etiquetado (contrato JSON estricto).
const TAGGING_SYSTEM_PROMPT: &str = "You are a specialized image tagging engine. Output a JSON \
object with a 'tags' key containing an array of 5-8 descriptive tags (Subject, Style, Mood). \
Example: {\"tags\": [\"cat\", \"forest\", \"ethereal\"]}. Output ONLY valid JSON.";

/// Instrucción del camino multimodal.
const VISION_USER_INSTRUCTION: &str =
    "Analyze this image and provide descriptive tags (Subject, Style, Mood). Return JSON.";

/// Candidatas por ronda.
const TAGGING_BATCH_SIZE: i64 = 5;
/// Espera máxima sin señal antes de sondear la cola.
const IDLE_WAIT: Duration = Duration::from_secs(10);
/// Enfriamiento tras un auto-load de LLM fallido.
const LOAD_FAILURE_COOLDOWN: Duration = Duration::from_secs(60);
/// Longitud mínima de una etiqueta aceptable.
const MIN_TAG_LENGTH: usize = 2;

/// Enciende el daemon de etiquetado.
pub fn spawn_tagging_daemon(state: AppState) {
    tokio::spawn(async move {
        info!("🏷️ [TAGGER]: Opportunistic tagging daemon initiated.");
        run_tagging_loop(state).await;
        info!("🏷️ [TAGGER]: Tagging daemon stopped.");
    });
}

async fn run_tagging_loop(state: AppState) {
    let mut last_load_failure: Option<Instant> = None;

    loop {
        // Señal de generación persistida o vencimiento del plazo.
        tokio::select! {
            _ = state.tagger_notifier.notified() => {}
            _ = tokio::time::sleep(IDLE_WAIT) => {}
        }

        if state.is_shutting_down() {
            break;
        }
        if state.is_generation_active() {
            continue;
        }

        let pending_batch = match state.generations.untagged_batch(TAGGING_BATCH_SIZE).await {
            Ok(batch) if !batch.is_empty() => batch,
            Ok(_) => continue,
            Err(fault) => {
                warn!("🏷️ [TAGGER]: Queue read degraded: {}", fault);
                continue;
            }
        };
        info!("🏷️ [TAGGER]: Found {} images to tag.", pending_batch.len());

        let Some(vitals) = ensure_llm_ready(&state, &mut last_load_failure).await else {
            continue;
        };

        for candidate in pending_batch {
            if state.is_generation_active() || state.is_shutting_down() {
                break;
            }
            process_candidate(&state, &candidate, &vitals).await;
        }
    }
}

/**
 * Garantiza un LLM con pesos residentes: sondeo de salud, cooldown de
 * fallos y replay del último cuerpo de carga capturado (o del modelo
 * configurado en el arranque, con descarga completa a GPU).
 */
async fn ensure_llm_ready(
    state: &AppState,
    last_load_failure: &mut Option<Instant>,
) -> Option<WorkerVitals> {
    let vitals = state.llm_control.health().await.unwrap_or_default();
    if vitals.loaded {
        return Some(vitals);
    }

    if let Some(failed_at) = *last_load_failure {
        if failed_at.elapsed() < LOAD_FAILURE_COOLDOWN {
            debug!("🏷️ [TAGGER]: LLM load in cooldown; yielding this round.");
            return None;
        }
    }

    let load_body = state.llm_load_state.peek().or_else(|| {
        state.config.llm_model.as_ref().map(|model_path| {
            serde_json::json!({ "model_id": model_path, "n_gpu_layers": -1 }).to_string()
        })
    })?;

    info!("🏷️ [TAGGER]: Auto-loading LLM for tagging...");
    match state
        .llm_control
        .replay_model_load("/v1/llm/load", &load_body)
        .await
    {
        Ok(status) if status.is_success() => {
            *last_load_failure = None;
            // Re-sondeo: el proyector multimodal decide la modalidad.
            Some(state.llm_control.health().await.unwrap_or_default())
        }
        _ => {
            warn!("🏷️ [TAGGER]: Failed to load LLM; entering cooldown.");
            *last_load_failure = Some(Instant::now());
            None
        }
    }
}

/// Procesa una candidata; el fracaso de parseo también marca progreso.
#[instrument(skip(state, candidate, vitals), fields(row_id = candidate.row_id))]
async fn process_candidate(state: &AppState, candidate: &UntaggedGeneration, vitals: &WorkerVitals) {
    let use_vision = vitals.is_multimodal();

    let chat_request = if use_vision {
        match encode_image_as_data_uri(&candidate.file_path).await {
            Some(data_uri) => build_vision_request(&data_uri),
            None => {
                warn!("🏷️ [TAGGER]: Could not read image [{}]; marking as tagged.", candidate.file_path);
                mark_tagged(state, candidate.row_id).await;
                return;
            }
        }
    } else {
        build_text_request(&candidate.prompt)
    };

    debug!(
        "🏷️ [TAGGER]: Tagging image ID {} ({}).",
        candidate.row_id,
        if use_vision { "Vision" } else { "Text-Only" }
    );

    let chat_response = match state.llm_control.chat_completions(&chat_request).await {
        Ok(response) => response,
        Err(fault) => {
            // Fallo del worker: la candidata sigue pendiente para la
            // próxima ronda.
            warn!("🏷️ [TAGGER]: LLM request failed for ID {}: {}", candidate.row_id, fault);
            return;
        }
    };

    let content = extract_message_content(&chat_response);
    let tag_names = parse_tag_list(&extract_json_block(&content));

    let tag_source = if use_vision { "llm_vision" } else { "llm_auto" };
    let mut saved_count = 0usize;
    for tag_name in &tag_names {
        match state
            .tags
            .add_by_generation_id(candidate.row_id, tag_name, tag_source)
            .await
        {
            Ok(()) => saved_count += 1,
            Err(fault) => warn!("🏷️ [TAGGER]: Tag [{}] dropped: {}", tag_name, fault),
        }
    }
    if saved_count > 0 {
        info!("🏷️ [TAGGER]: ID {}: saved {} tags.", candidate.row_id, saved_count);
    }

    mark_tagged(state, candidate.row_id).await;
}

async fn mark_tagged(state: &AppState, generation_row_id: i64) {
    if let Err(fault) = state.generations.mark_as_tagged(generation_row_id).await {
        warn!("🏷️ [TAGGER]: Mark-as-tagged dropped for {}: {}", generation_row_id, fault);
    }
}

// --- ESTRATO DE CONSTRUCCIÓN DE PETICIONES ---

fn build_vision_request(image_data_uri: &str) -> serde_json::Value {
    serde_json::json!({
        "messages": [
            { "role": "system", "content": TAGGING_SYSTEM_PROMPT },
            { "role": "user", "content": [
                { "type": "text", "text": VISION_USER_INSTRUCTION },
                { "type": "image_url", "image_url": { "url": image_data_uri } },
            ]},
        ],
        "temperature": 0.1,
        "response_format": { "type": "json_object" },
    })
}

fn build_text_request(generation_prompt: &str) -> serde_json::Value {
    serde_json::json!({
        "messages": [
            { "role": "system", "content": TAGGING_SYSTEM_PROMPT },
            { "role": "user", "content": generation_prompt },
        ],
        "temperature": 0.1,
        "response_format": { "type": "json_object" },
    })
}

/// Lee la imagen (tolerando rutas '/outputs/…' relativas al cwd) y la
/// codifica como data-URI con el MIME de su extensión.
async fn encode_image_as_data_uri(file_path: &str) -> Option<String> {
    let resolved_path = resolve_output_file(file_path).await?;
    let image_bytes = tokio::fs::read(&resolved_path).await.ok()?;
    let encoded = BASE64_STANDARD.encode(&image_bytes);
    Some(format!("data:{};base64,{}", mime_for_extension(file_path), encoded))
}

/// Rutas '/outputs/…' son URLs relativas a la raíz del proceso.
async fn resolve_output_file(file_path: &str) -> Option<PathBuf> {
    let direct = PathBuf::from(file_path);
    if tokio::fs::metadata(&direct).await.is_ok() {
        return Some(direct);
    }
    if file_path.starts_with('/') {
        let cwd_relative = PathBuf::from(format!(".{}", file_path));
        if tokio::fs::metadata(&cwd_relative).await.is_ok() {
            return Some(cwd_relative);
        }
    }
    None
}

/// MIME por extensión; PNG es el default del stack.
pub fn mime_for_extension(file_path: &str) -> &'static str {
    let lowered = file_path.to_ascii_lowercase();
    if lowered.ends_with(".jpg") || lowered.ends_with(".jpeg") {
        "image/jpeg"
    } else if lowered.ends_with(".webp") {
        "image/webp"
    } else {
        "image/png"
    }
}

// --- ESTRATO DE PARSEO TOLERANTE ---

/// Contenido textual de la primera choice ('content', con fallback al
/// 'reasoning_content' de modelos razonadores).
pub fn extract_message_content(chat_response: &serde_json::Value) -> String {
    let message = chat_response
        .get("choices")
        .and_then(|choices| choices.as_array())
        .and_then(|choices| choices.first())
        .and_then(|choice| choice.get("message"));

    let Some(message) = message else {
        return String::new();
    };

    message
        .get("content")
        .and_then(|content| content.as_str())
        .filter(|content| !content.is_empty())
        .or_else(|| {
            message
                .get("reasoning_content")
                .and_then(|content| content.as_str())
        })
        .unwrap_or_default()
        .to_string()
}

/**
 * Extrae el bloque JSON más externo de una respuesta con ruido:
 * primero '{…}', luego '[…]', según cuál abra antes.
 */
pub fn extract_json_block(content: &str) -> String {
    let object_start = content.find('{');
    let array_start = content.find('[');

    match (object_start, array_start) {
        (Some(obj_at), arr) if arr.map_or(true, |arr_at| obj_at < arr_at) => {
            match content.rfind('}') {
                Some(obj_end) if obj_end > obj_at => content[obj_at..=obj_end].to_string(),
                _ => String::new(),
            }
        }
        (_, Some(arr_at)) => match content.rfind(']') {
            Some(arr_end) if arr_end > arr_at => content[arr_at..=arr_end].to_string(),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

/**
 * Interpreta el bloque JSON como lista de etiquetas: arreglo directo,
 * campo 'tags', o el primer campo-arreglo del objeto. Filtra cadenas
 * por longitud mínima.
 */
pub fn parse_tag_list(json_block: &str) -> Vec<String> {
    if json_block.is_empty() {
        return Vec::new();
    }
    let Ok(parsed) = serde_json::from_str::<serde_json::Value>(json_block) else {
        return Vec::new();
    };

    let tag_array: Vec<serde_json::Value> = if let Some(entries) = parsed.as_array() {
        entries.clone()
    } else if let Some(entries) = parsed.get("tags").and_then(|tags| tags.as_array()) {
        entries.clone()
    } else if let Some(object) = parsed.as_object() {
        object
            .values()
            .find_map(|value| value.as_array())
            .cloned()
            .unwrap_or_default()
    } else {
        Vec::new()
    };

    tag_array
        .into_iter()
        .filter_map(|entry| entry.as_str().map(str::to_string))
        .filter(|tag_name| tag_name.len() >= MIN_TAG_LENGTH)
        .collect()
}

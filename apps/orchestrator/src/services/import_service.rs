// [apps/orchestrator/src/services/import_service.rs]
/*!
 * =================================================================
 * APARATO: ORPHAN IMPORT SERVICE (V4.1 - SIDECAR ARCHAEOLOGY)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: ADOPCIÓN DE IMÁGENES HUÉRFANAS EN EL ARRANQUE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SIDECAR PRIORITY: El sidecar '.json' es la fuente preferida de
 *    metadatos; el '.txt' legado se interpreta con el formato histórico
 *    (primera línea como prompt, token 'Time: <float>').
 * 2. IDEMPOTENCY: Una imagen ya registrada por 'file_path' jamás se
 *    duplica; re-ejecutar la importación es inocuo.
 * =================================================================
 */

use crate::state::AppState;
use mysti_domain_models::Generation;
use tracing::{info, warn};

const IMPORTABLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/**
 * Escanea el directorio de salidas e importa como generaciones los
 * archivos de imagen sin fila en el ledger.
 */
pub async fn auto_import_outputs(state: &AppState) {
    let output_dir = state.config.output_dir.clone();
    info!("📥 [IMPORT]: Scanning {} for images to import...", output_dir);

    let mut directory_entries = match tokio::fs::read_dir(&output_dir).await {
        Ok(entries) => entries,
        Err(fault) => {
            warn!("📥 [IMPORT]: Output directory unavailable ({}): {}", output_dir, fault);
            return;
        }
    };

    let mut checked_count = 0usize;
    let mut imported_count = 0usize;

    while let Ok(Some(entry)) = directory_entries.next_entry().await {
        let entry_path = entry.path();
        if !entry_path.is_file() {
            continue;
        }
        let extension = entry_path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if !IMPORTABLE_EXTENSIONS.contains(&extension.as_str()) {
            continue;
        }
        checked_count += 1;

        let file_name = entry_path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let file_url = format!("/outputs/{}", file_name);

        match state.generations.exists_by_path(&file_url).await {
            Ok(true) => continue,
            Ok(false) => {}
            Err(fault) => {
                warn!("📥 [IMPORT]: Existence check failed for [{}]: {}", file_url, fault);
                continue;
            }
        }

        let mut generation = Generation {
            uuid: format!("legacy-{}", file_name),
            file_path: file_url,
            width: 512,
            height: 512,
            steps: 20,
            cfg_scale: 7.0,
            ..Default::default()
        };

        // Arqueología de sidecars: '.json' preferido, '.txt' legado.
        let json_sidecar = entry_path.with_extension("json");
        let txt_sidecar = entry_path.with_extension("txt");
        if let Ok(raw_json) = tokio::fs::read_to_string(&json_sidecar).await {
            hydrate_from_json_sidecar(&mut generation, &raw_json);
        } else if let Ok(raw_text) = tokio::fs::read_to_string(&txt_sidecar).await {
            let (prompt, generation_time) = parse_legacy_sidecar(&raw_text);
            generation.prompt = prompt;
            generation.generation_time = generation_time;
        }

        match state.generations.insert(&generation).await {
            Ok(()) => imported_count += 1,
            Err(fault) => warn!("📥 [IMPORT]: Row dropped for [{}]: {}", generation.uuid, fault),
        }
    }

    info!(
        "📥 [IMPORT]: Checked {} files, imported {} new records.",
        checked_count, imported_count
    );
}

/// Hidrata la generación desde un sidecar JSON (provenance verbatim).
fn hydrate_from_json_sidecar(generation: &mut Generation, raw_json: &str) {
    let Ok(sidecar) = serde_json::from_str::<serde_json::Value>(raw_json) else {
        return;
    };
    let text = |key: &str| {
        sidecar
            .get(key)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };

    generation.prompt = text("prompt");
    generation.negative_prompt = text("negative_prompt");
    generation.seed = sidecar.get("seed").and_then(|v| v.as_i64()).unwrap_or(0);
    generation.width = sidecar.get("width").and_then(|v| v.as_i64()).unwrap_or(512);
    generation.height = sidecar.get("height").and_then(|v| v.as_i64()).unwrap_or(512);
    generation.steps = sidecar.get("steps").and_then(|v| v.as_i64()).unwrap_or(20);
    generation.cfg_scale = sidecar.get("cfg_scale").and_then(|v| v.as_f64()).unwrap_or(7.0);
    generation.generation_time = sidecar
        .get("generation_time")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    generation.params_json = raw_json.to_string();
}

/**
 * Formato '.txt' legado: la primera línea es el prompt salvo que sea la
 * sección 'Negative prompt:'; el token 'Time: <float>' aporta el tiempo.
 */
pub fn parse_legacy_sidecar(content: &str) -> (String, f64) {
    let prompt = content
        .lines()
        .next()
        .filter(|line| !line.starts_with("Negative prompt:"))
        .unwrap_or_default()
        .to_string();

    let generation_time = content
        .split("Time:")
        .nth(1)
        .map(|after_token| {
            after_token
                .trim_start()
                .chars()
                .take_while(|character| character.is_ascii_digit() || *character == '.')
                .collect::<String>()
        })
        .and_then(|numeric_text| numeric_text.parse::<f64>().ok())
        .unwrap_or(0.0);

    (prompt, generation_time)
}

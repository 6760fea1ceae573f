// [apps/orchestrator/src/services/metrics_loop.rs]
/*!
 * =================================================================
 * APARATO: METRICS TELEMETRY LOOP (V4.2 - PANOPTIC PULSE)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: PULSO DE VRAM CADA 2s Y APRENDIZAJE DE HUELLAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE OBSERVER: Este bucle es el único que alimenta las huellas
 *    observadas del árbitro; los demás estratos solo las consumen.
 * 2. FOOTPRINT LEARNING: Con un modelo SD residente y su id capturado,
 *    la huella medida se sella en el ledger del árbitro.
 * 3. PATH HYGIENE: El modelo del LLM se reporta relativo a la raíz de
 *    modelos para que la UI no exhiba rutas absolutas del host.
 * =================================================================
 */

use crate::state::AppState;
use mysti_domain_models::{LlmWorkerMetrics, SdWorkerMetrics, SystemMetrics, WorkerFleetMetrics};
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Cadencia del pulso de métricas hacia el Dashboard.
const METRICS_TICK: Duration = Duration::from_secs(2);

/// Enciende el bucle de telemetría.
pub fn spawn_metrics_loop(state: AppState) {
    tokio::spawn(async move {
        info!("📊 [METRICS]: Telemetry pulse loop initiated (tick: 2s).");
        run_metrics_loop(state).await;
        info!("📊 [METRICS]: Telemetry pulse loop stopped.");
    });
}

async fn run_metrics_loop(state: AppState) {
    let mut pulse_ticker = tokio::time::interval(METRICS_TICK);

    loop {
        pulse_ticker.tick().await;
        if state.is_shutting_down() {
            break;
        }

        let vram_total_gb = state.vram_probe.total_gb().await;
        let vram_free_gb = state.vram_probe.free_gb().await;

        let sd_vitals = state.sd_control.health().await.unwrap_or_default();
        let llm_vitals = state.llm_control.health().await.unwrap_or_default();

        state
            .resource_manager
            .update_worker_usage(sd_vitals.vram_gb, llm_vitals.vram_gb)
            .await;

        // Aprendizaje de huella: modelo residente + id capturado.
        if sd_vitals.loaded {
            if let Some(resident_model_id) = state.sd_load_state.peek_model_id() {
                state
                    .resource_manager
                    .update_model_footprint(&resident_model_id, sd_vitals.vram_gb)
                    .await;
            }
        }

        let llm_model_display =
            relativize_model_path(&llm_vitals.model_path, &state.config.model_dir);

        state.event_bus.broadcast_metrics_pulse(SystemMetrics {
            vram_total_gb,
            vram_free_gb,
            workers: WorkerFleetMetrics {
                sd: SdWorkerMetrics {
                    vram_gb: sd_vitals.vram_gb,
                },
                llm: LlmWorkerMetrics {
                    vram_gb: llm_vitals.vram_gb,
                    model: llm_model_display,
                    loaded: llm_vitals.loaded,
                },
            },
        });
    }
}

/// Ruta del modelo relativa a la raíz de modelos (o solo el nombre).
pub fn relativize_model_path(model_path: &str, model_dir: &str) -> String {
    if model_path.is_empty() {
        return String::new();
    }
    let path = Path::new(model_path);
    if !path.is_absolute() {
        return model_path.replace('\\', "/");
    }
    match path.strip_prefix(model_dir) {
        Ok(relative) => relative.to_string_lossy().replace('\\', "/"),
        Err(_) => path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| model_path.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_paths_are_relativized_for_display() {
        assert_eq!(relativize_model_path("", "/models"), "");
        assert_eq!(relativize_model_path("llm/qwen.gguf", "/models"), "llm/qwen.gguf");
        assert_eq!(
            relativize_model_path("/models/llm/qwen.gguf", "/models"),
            "llm/qwen.gguf"
        );
        assert_eq!(
            relativize_model_path("/elsewhere/qwen.gguf", "/models"),
            "qwen.gguf"
        );
    }
}

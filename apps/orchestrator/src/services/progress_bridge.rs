// [apps/orchestrator/src/services/progress_bridge.rs]
/*!
 * =================================================================
 * APARATO: SSE PROGRESS BRIDGE (V4.2 - STREAM MIRROR)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: ESPEJO DEL STREAM DE PROGRESO SD HACIA EL BUS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. FRAME DISCIPLINE: Los frames SSE se cortan en '\n\n'; solo los
 *    bloques 'data: ' con JSON válido cruzan al bus (los ': ping' de
 *    keepalive se descartan).
 * 2. ETERNAL RECONNECT: La conexión se reintenta cada 5 s mientras el
 *    proceso viva; una generación larga no derriba el tubo (presupuesto
 *    de lectura de 1 h).
 * =================================================================
 */

use crate::state::AppState;
use futures_util::StreamExt;
use mysti_infra_worker_client::INTERNAL_TOKEN_HEADER;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Presupuesto total de una conexión al stream (generaciones largas).
const STREAM_READ_TIMEOUT: Duration = Duration::from_secs(3600);
/// Espera de salud del worker antes de intentar conectar.
const HEALTH_WAIT_BUDGET: Duration = Duration::from_secs(5);
/// Pausa entre reconexiones.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(5);

/// Enciende el puente de progreso.
pub fn spawn_progress_bridge(state: AppState) {
    tokio::spawn(async move {
        info!("🛰️ [PROGRESS]: SSE bridge initiated (target: SD worker).");
        run_bridge_loop(state).await;
        info!("🛰️ [PROGRESS]: SSE bridge stopped.");
    });
}

async fn run_bridge_loop(state: AppState) {
    let stream_client = reqwest::Client::new();
    let stream_url = format!(
        "http://127.0.0.1:{}/v1/stream/progress",
        state.config.sd_worker_port()
    );

    loop {
        if state.is_shutting_down() {
            break;
        }

        if state.sd_control.wait_for_health(HEALTH_WAIT_BUDGET).await {
            debug!("🛰️ [PROGRESS]: Connecting to SD progress stream...");
            mirror_stream_until_eof(&state, &stream_client, &stream_url).await;
        }

        tokio::time::sleep(RECONNECT_BACKOFF).await;
    }
}

/// Bombea el stream al bus hasta EOF, error o apagado.
async fn mirror_stream_until_eof(state: &AppState, client: &reqwest::Client, stream_url: &str) {
    let mut request = client.get(stream_url).timeout(STREAM_READ_TIMEOUT);
    if !state.config.internal_token.is_empty() {
        request = request.header(INTERNAL_TOKEN_HEADER, state.config.internal_token.clone());
    }

    let response = match request.send().await {
        Ok(response) if response.status().as_u16() == 200 => response,
        Ok(response) => {
            warn!("🛰️ [PROGRESS]: Stream rejected with HTTP {}.", response.status());
            return;
        }
        Err(fault) => {
            debug!("🛰️ [PROGRESS]: Stream connect failed: {}", fault);
            return;
        }
    };

    info!("🛰️ [PROGRESS]: Stream connected successfully.");
    let mut frame_buffer = String::new();
    let mut upstream_chunks = response.bytes_stream();

    while let Some(chunk_result) = upstream_chunks.next().await {
        if state.is_shutting_down() {
            break;
        }
        let Ok(chunk) = chunk_result else {
            break;
        };
        frame_buffer.push_str(&String::from_utf8_lossy(&chunk));

        for progress_payload in drain_sse_frames(&mut frame_buffer) {
            state.event_bus.emit_progress_frame(progress_payload);
        }
    }
}

/**
 * Extrae los payloads 'data: {json}' de los frames completos del
 * buffer, dejando el residuo parcial para el siguiente chunk.
 */
pub fn drain_sse_frames(frame_buffer: &mut String) -> Vec<serde_json::Value> {
    let mut drained_payloads = Vec::new();

    while let Some(frame_boundary) = frame_buffer.find("\n\n") {
        let frame_block = frame_buffer[..frame_boundary].to_string();
        frame_buffer.drain(..frame_boundary + 2);

        let Some(data_offset) = frame_block.find("data: ") else {
            continue; // keepalive ': ping' u otros comentarios
        };
        let payload_text = &frame_block[data_offset + 6..];
        if let Ok(payload) = serde_json::from_str::<serde_json::Value>(payload_text) {
            drained_payloads.push(payload);
        }
    }

    drained_payloads
}

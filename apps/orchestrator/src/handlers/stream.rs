// [apps/orchestrator/src/handlers/stream.rs]
/*!
 * =================================================================
 * APARATO: WEBSOCKET FANOUT HANDLER (V4.1 - PUSH ONLY)
 * CLASIFICACIÓN: API HANDLER (ESTRATO L4)
 * RESPONSABILIDAD: ENLACE DE SOLO-EMPUJE HACIA EL DASHBOARD
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PUSH-ONLY: Los mensajes entrantes se ignoran salvo el ciclo de
 *    vida (apertura/cierre registrados); el canal existe para métricas,
 *    progreso y alertas.
 * 2. LAG TOLERANCE: Un suscriptor rezagado se re-engancha al presente
 *    del bus; el productor jamás se bloquea por él.
 * =================================================================
 */

use crate::state::AppState;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use tokio::sync::broadcast::error::RecvError;
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Latido de mantenimiento del socket (proxies de capa 7 intermedios).
const KEEPALIVE_INTERVAL_SECONDS: u64 = 25;

/// Negociación de la transición HTTP -> WebSocket (RFC 6455).
pub async fn establish_metrics_uplink(
    websocket_upgrade: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    websocket_upgrade.on_upgrade(move |socket| pump_realtime_events(socket, state))
}

/**
 * Bombea el bus de eventos hacia un socket hasta su defunción.
 */
async fn pump_realtime_events(mut socket: WebSocket, state: AppState) {
    let session_identifier = Uuid::new_v4().to_string();
    let mut event_subscriber = state.event_bus.subscribe();
    let mut keepalive_timer = interval(Duration::from_secs(KEEPALIVE_INTERVAL_SECONDS));

    info!("⚡ [UPLINK_OPEN]: Dashboard link {} established.", session_identifier);

    loop {
        tokio::select! {
            // Brazo 1: señal del bus hacia el socket
            bus_event = event_subscriber.recv() => {
                match bus_event {
                    Ok(event_artifact) => {
                        let Ok(serialized) = serde_json::to_string(&event_artifact) else {
                            continue;
                        };
                        if socket.send(Message::Text(serialized)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(missed_count)) => {
                        warn!(
                            "⚡ [UPLINK_LAG]: Link {} dropped {} signals; resuming at present.",
                            session_identifier, missed_count
                        );
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            // Brazo 2: pulso de vida físico
            _ = keepalive_timer.tick() => {
                if socket.send(Message::Ping(Vec::new())).await.is_err() {
                    break;
                }
            }

            // Brazo 3: tráfico entrante (solo ciclo de vida)
            inbound = socket.recv() => {
                match inbound {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(message)) => {
                        debug!("⚡ [UPLINK_RX]: Ignored inbound frame on {}: {:?}", session_identifier, message);
                    }
                    Some(Err(_)) => break,
                }
            }
        }
    }

    info!("🔌 [UPLINK_CLOSED]: Dashboard link {} released.", session_identifier);
}

// [apps/orchestrator/src/services/event_bus.rs]
/*!
 * =================================================================
 * APARATO: NEURAL EVENT BUS SERVICE (V4.1 - PUSH-ONLY FANOUT)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: DIFUSIÓN DE MÉTRICAS, PROGRESO Y ALERTAS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. DECOUPLED PRODUCERS: Salud, métricas y puente SSE emiten sin
 *    conocer el conjunto de sockets; el fan-out vive en el handler WS.
 * 2. DISPATCH MONITORING: Cada ráfaga audita el conteo de suscriptores
 *    para detectar estados de 'ceguera de mando'.
 *
 * # Mathematical Proof (Signal Propagation):
 * El bus garantiza despacho O(1) independiente del número de
 * receptores; la pérdida de un suscriptor rezagado no bloquea al
 * productor (Lock-Free Emission).
 * =================================================================
 */

use mysti_domain_models::{AlertLevel, RealTimeEvent, SystemMetrics};
use tokio::sync::broadcast;
use tracing::{error, info, trace, warn};

/// Capacidad del canal de difusión. Absorbe ráfagas de frames de
/// progreso sin disparar errores de 'Lagging' en la UI.
const BROADCAST_CHANNEL_CAPACITY: usize = 512;

/**
 * Sistema nervioso del orquestador: multi-productor, multi-consumidor.
 */
#[derive(Debug, Clone)]
pub struct EventBus {
    internal_transmission_channel: broadcast::Sender<RealTimeEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BROADCAST_CHANNEL_CAPACITY);
        Self {
            internal_transmission_channel: sender,
        }
    }

    /// Nuevo receptor para un socket del Dashboard.
    pub fn subscribe(&self) -> broadcast::Receiver<RealTimeEvent> {
        self.internal_transmission_channel.subscribe()
    }

    // --- ESTRATO DE EMISIÓN ---

    /// Pulso de métricas globales (cada 2 s desde el bucle de telemetría).
    pub fn broadcast_metrics_pulse(&self, metrics_snapshot: SystemMetrics) {
        self.dispatch_event(RealTimeEvent::Metrics(metrics_snapshot));
    }

    /// Frame de progreso espejado del stream SSE del worker de difusión.
    pub fn emit_progress_frame(&self, progress_payload: serde_json::Value) {
        self.dispatch_event(RealTimeEvent::Progress {
            data: progress_payload,
        });
    }

    /// Alerta de transición de salud (crash, recuperación, modo seguro).
    pub fn emit_system_alert(&self, level: AlertLevel, message: impl Into<String>) {
        let message = message.into();
        match level {
            AlertLevel::Error => error!("📢 [SYSTEM_ALERT]: {}", message),
            AlertLevel::Warning => warn!("📢 [SYSTEM_ALERT]: {}", message),
            AlertLevel::Success => info!("📢 [SYSTEM_ALERT]: {}", message),
        }
        self.dispatch_event(RealTimeEvent::SystemAlert { level, message });
    }

    // --- ESTRATO DE DESPACHO INTERNO ---

    fn dispatch_event(&self, event_artifact: RealTimeEvent) {
        match self.internal_transmission_channel.send(event_artifact) {
            Ok(subscriber_count) => {
                trace!("📡 [EVENT_BUS]: Signal broadcasted to {} links.", subscriber_count);
            }
            Err(_) => {
                // Sin operadores conectados: silencio nominal.
                trace!("💤 [EVENT_BUS]: Signal discarded. No active links.");
            }
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

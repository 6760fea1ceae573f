// [libs/domain/models/src/telemetry.rs]
/*!
 * =================================================================
 * APARATO: REALTIME SIGNAL SHAPES (V3.2 - DASHBOARD PARITY)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: CONTRATO SERIALIZADO DEL CANAL WEBSOCKET
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TAGGED DISPATCH: El discriminador 'type' viaja en línea con los
 *    campos del evento; el Dashboard conmuta sobre él sin envoltorios.
 * 2. ZERO REGRESSIONS: Las formas 'metrics' / 'progress' /
 *    'system_alert' son contrato congelado con la UI.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Severidad de una alerta de sistema difundida a los operadores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Warning,
    Success,
    Error,
}

/// Huella de VRAM del worker de difusión dentro del pulso de métricas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdWorkerMetrics {
    pub vram_gb: f32,
}

/// Huella y estado de modelo del worker de lenguaje.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmWorkerMetrics {
    pub vram_gb: f32,
    pub model: String,
    pub loaded: bool,
}

/// Sub-objeto 'workers' del pulso de métricas.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerFleetMetrics {
    pub sd: SdWorkerMetrics,
    pub llm: LlmWorkerMetrics,
}

/**
 * Pulso global de métricas emitido cada 2 segundos al Dashboard.
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemMetrics {
    pub vram_total_gb: f32,
    pub vram_free_gb: f32,
    pub workers: WorkerFleetMetrics,
}

/**
 * Señal en tiempo real difundida por el bus de eventos del orquestador.
 * Serializa con el discriminador 'type' en línea (contrato de la UI).
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RealTimeEvent {
    /// Pulso periódico de VRAM y estado de la flota.
    Metrics(SystemMetrics),
    /// Frame de progreso espejado del stream SSE del worker de difusión.
    Progress { data: serde_json::Value },
    /// Transición de salud o de modo del sistema.
    SystemAlert { level: AlertLevel, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metrics_pulse_serializes_with_inline_type_tag() {
        let pulse = RealTimeEvent::Metrics(SystemMetrics {
            vram_total_gb: 24.0,
            vram_free_gb: 10.5,
            workers: WorkerFleetMetrics {
                sd: SdWorkerMetrics { vram_gb: 6.2 },
                llm: LlmWorkerMetrics {
                    vram_gb: 3.1,
                    model: "qwen.gguf".into(),
                    loaded: true,
                },
            },
        });

        let value = serde_json::to_value(&pulse).expect("serialization is infallible");
        assert_eq!(value["type"], "metrics");
        assert_eq!(value["vram_total_gb"], 24.0);
        assert_eq!(value["workers"]["llm"]["loaded"], true);
    }

    #[test]
    fn alert_levels_serialize_lowercase() {
        let alert = RealTimeEvent::SystemAlert {
            level: AlertLevel::Warning,
            message: "SD Worker crashed".into(),
        };
        let value = serde_json::to_value(&alert).expect("serialization is infallible");
        assert_eq!(value["type"], "system_alert");
        assert_eq!(value["level"], "warning");
    }
}

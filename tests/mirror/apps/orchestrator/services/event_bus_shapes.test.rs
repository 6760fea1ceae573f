/**
 * =================================================================
 * APARATO: EVENT BUS WIRE-SHAPE TEST (V1.1)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar las formas serializadas del canal WebSocket y el
 *           orden warning -> success de una resurrección.
 * =================================================================
 */

use mysti_domain_models::{
    AlertLevel, LlmWorkerMetrics, RealTimeEvent, SdWorkerMetrics, SystemMetrics, WorkerFleetMetrics,
};
use mysti_orchestrator::services::EventBus;

#[tokio::test]
async fn metrics_pulse_matches_dashboard_contract() {
    let bus = EventBus::new();
    let mut subscriber = bus.subscribe();

    bus.broadcast_metrics_pulse(SystemMetrics {
        vram_total_gb: 24.0,
        vram_free_gb: 9.5,
        workers: WorkerFleetMetrics {
            sd: SdWorkerMetrics { vram_gb: 6.0 },
            llm: LlmWorkerMetrics {
                vram_gb: 3.2,
                model: "llm/qwen.gguf".into(),
                loaded: true,
            },
        },
    });

    let event = subscriber.recv().await.expect("pulse delivered");
    let wire = serde_json::to_value(&event).expect("serializable");

    assert_eq!(wire["type"], "metrics");
    assert_eq!(wire["vram_total_gb"], 24.0);
    assert_eq!(wire["workers"]["sd"]["vram_gb"], 6.0);
    assert_eq!(wire["workers"]["llm"]["model"], "llm/qwen.gguf");
    assert_eq!(wire["workers"]["llm"]["loaded"], true);
}

#[tokio::test]
async fn crash_recovery_emits_warning_then_success() {
    let bus = EventBus::new();
    let mut subscriber = bus.subscribe();

    // Secuencia de una resurrección del worker SD.
    bus.emit_system_alert(AlertLevel::Warning, "SD Worker crashed! Restarting...");
    bus.emit_system_alert(AlertLevel::Success, "SD Worker recovered successfully.");

    let first = serde_json::to_value(subscriber.recv().await.expect("warning")).expect("json");
    assert_eq!(first["type"], "system_alert");
    assert_eq!(first["level"], "warning");

    let second = serde_json::to_value(subscriber.recv().await.expect("success")).expect("json");
    assert_eq!(second["type"], "system_alert");
    assert_eq!(second["level"], "success");
    assert!(second["message"].as_str().expect("message").contains("recovered"));
}

#[tokio::test]
async fn progress_frames_are_wrapped_under_data() {
    let bus = EventBus::new();
    let mut subscriber = bus.subscribe();

    bus.emit_progress_frame(serde_json::json!({ "step": 7, "steps": 20, "phase": "sample" }));

    let event = subscriber.recv().await.expect("frame delivered");
    assert!(matches!(event, RealTimeEvent::Progress { .. }));

    let wire = serde_json::to_value(&event).expect("serializable");
    assert_eq!(wire["type"], "progress");
    assert_eq!(wire["data"]["step"], 7);
    assert_eq!(wire["data"]["phase"], "sample");
}

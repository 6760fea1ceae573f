/**
 * =================================================================
 * APARATO: LOAD CAPTURE & ADMISSION SURFACE TEST (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar que el interceptor de cargas captura el cuerpo
 *           reenviado (con rutas compañeras fusionadas) y que el camino
 *           caliente responde 503 ante un rechazo del árbitro.
 * =================================================================
 */

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::post;
use axum::Router;
use clap::Parser;
use mysti_infra_db::StoreClient;
use mysti_infra_gpu::VramProbe;
use mysti_orchestrator::config::compose_worker_argv;
use mysti_orchestrator::prelude::*;
use mysti_orchestrator::routes::create_public_router;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

struct DryProbe;

#[async_trait]
impl VramProbe for DryProbe {
    async fn total_gb(&self) -> f32 {
        8.0
    }
    async fn free_gb(&self) -> f32 {
        0.0
    }
    async fn usage_by_pid(&self) -> HashMap<u32, f32> {
        HashMap::new()
    }
}

#[derive(Clone)]
struct FakeSdWorker {
    received_load_body: Arc<Mutex<String>>,
    generation_calls: Arc<AtomicU32>,
}

/// Worker SD simulado: acepta cargas y cuenta generaciones.
async fn spawn_fake_sd_worker(fake: FakeSdWorker) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind");
    let port = listener.local_addr().expect("addr").port();

    let router = Router::new()
        .route(
            "/v1/models/load",
            post(
                |axum::extract::State(worker): axum::extract::State<FakeSdWorker>,
                 body: String| async move {
                    *worker.received_load_body.lock().expect("lock") = body;
                    "{}"
                },
            ),
        )
        .route(
            "/v1/images/generations",
            post(|axum::extract::State(worker): axum::extract::State<FakeSdWorker>| async move {
                worker.generation_calls.fetch_add(1, Ordering::SeqCst);
                "{}"
            }),
        )
        .with_state(fake);

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    port
}

async fn build_state(sd_port: u16, scratch: &tempfile::TempDir) -> AppState {
    let store = StoreClient::open(scratch.path().join("mysti.db").to_str().expect("utf8"))
        .await
        .expect("store open");

    // El worker SD vive en listen_port + 1.
    let config = OrchestratorConfig::parse_from([
        "mysti-orchestrator",
        "--listen-port",
        &(sd_port - 1).to_string(),
        "--internal-token",
        "test-token",
    ]);
    AppState::new(config, store, Arc::new(DryProbe))
}

#[tokio::test]
async fn sd_load_capture_equals_forwarded_body_with_companions() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let fake_worker = FakeSdWorker {
        received_load_body: Arc::new(Mutex::new(String::new())),
        generation_calls: Arc::new(AtomicU32::new(0)),
    };
    let sd_port = spawn_fake_sd_worker(fake_worker.clone()).await;
    let state = build_state(sd_port, &scratch).await;

    // Metadatos con ruta compañera: el interceptor debe fusionarla.
    state
        .metadata
        .save("x.gguf", &serde_json::json!({ "vae": "vaes/fix.gguf" }))
        .await
        .expect("metadata save");

    let router = create_public_router(state.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/models/load")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"model_id":"x.gguf"}"#))
                .expect("request"),
        )
        .await
        .expect("round trip");

    assert_eq!(response.status(), StatusCode::OK);

    // El payload capturado ES el cuerpo reenviado, compañeras incluidas.
    let captured = state.sd_load_state.peek().expect("capture present");
    let forwarded = fake_worker.received_load_body.lock().expect("lock").clone();
    assert_eq!(captured, forwarded);
    assert!(captured.contains("vaes/fix.gguf"));
    assert_eq!(state.sd_load_state.peek_model_id().as_deref(), Some("x.gguf"));
}

#[tokio::test]
async fn admission_rejection_surfaces_as_503_without_touching_the_worker() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let fake_worker = FakeSdWorker {
        received_load_body: Arc::new(Mutex::new(String::new())),
        generation_calls: Arc::new(AtomicU32::new(0)),
    };
    let sd_port = spawn_fake_sd_worker(fake_worker.clone()).await;
    let state = build_state(sd_port, &scratch).await;

    let router = create_public_router(state.clone());
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/images/generations")
                .header("content-type", "application/json")
                .body(Body::from(
                    r#"{"prompt":"a cat","width":512,"height":512,"steps":20,"cfg_scale":7.0,"seed":42}"#,
                ))
                .expect("request"),
        )
        .await
        .expect("round trip");

    // Cero VRAM libre y sin modelo residente: el árbitro rechaza.
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let payload = axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("body");
    let parsed: serde_json::Value = serde_json::from_slice(&payload).expect("json error body");
    assert!(parsed["error"].as_str().expect("reason").contains("VRAM"));

    // El worker jamás vio la petición.
    assert_eq!(fake_worker.generation_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn malformed_generation_body_maps_to_400() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let fake_worker = FakeSdWorker {
        received_load_body: Arc::new(Mutex::new(String::new())),
        generation_calls: Arc::new(AtomicU32::new(0)),
    };
    let sd_port = spawn_fake_sd_worker(fake_worker).await;
    let state = build_state(sd_port, &scratch).await;

    let router = create_public_router(state);
    let response = router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/images/generations")
                .header("content-type", "application/json")
                .body(Body::from("not json at all"))
                .expect("request"),
        )
        .await
        .expect("round trip");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[test]
fn worker_argv_inherits_everything_but_listen_and_secret_flags() {
    let raw: Vec<String> = [
        "--mode",
        "orchestrator",
        "--listen-port",
        "1337",
        "--output-dir",
        "./outputs",
        "--internal-token",
        "sekret",
        "--diffusion-fa",
    ]
    .iter()
    .map(|argument| argument.to_string())
    .collect();

    let sd_argv = compose_worker_argv(&raw, "sd-worker", 1338, "sekret");

    assert!(!sd_argv.contains(&"orchestrator".to_string()));
    assert!(sd_argv.contains(&"--output-dir".to_string()));
    assert!(sd_argv.contains(&"--diffusion-fa".to_string()));
    assert_eq!(sd_argv.iter().filter(|a| a.as_str() == "--listen-port").count(), 1);
    assert!(sd_argv.windows(2).any(|w| w[0] == "--listen-port" && w[1] == "1338"));
    assert!(sd_argv.windows(2).any(|w| w[0] == "--mode" && w[1] == "sd-worker"));
    assert!(sd_argv.windows(2).any(|w| w[0] == "--internal-token" && w[1] == "sekret"));
}

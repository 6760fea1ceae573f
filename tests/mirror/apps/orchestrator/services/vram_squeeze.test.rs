/**
 * =================================================================
 * APARATO: VRAM SQUEEZE ESCALATION TEST (V1.1)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar la Fase 1 (swap del LLM a RAM) contra un worker
 *           LLM simulado y la admisión sin hints tras liberar memoria.
 * =================================================================
 */

use async_trait::async_trait;
use axum::routing::post;
use axum::Router;
use mysti_domain_models::ArbitrationRequest;
use mysti_infra_gpu::VramProbe;
use mysti_infra_worker_client::WorkerClient;
use mysti_orchestrator::services::ResourceManager;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

struct FakeProbe {
    total: f32,
    free: Arc<Mutex<f32>>,
}

#[async_trait]
impl VramProbe for FakeProbe {
    async fn total_gb(&self) -> f32 {
        self.total
    }
    async fn free_gb(&self) -> f32 {
        *self.free.lock().expect("probe lock")
    }
    async fn usage_by_pid(&self) -> HashMap<u32, f32> {
        HashMap::new()
    }
}

/// Contadores del worker LLM simulado.
#[derive(Clone)]
struct FakeLlmWorker {
    free_handle: Arc<Mutex<f32>>,
    offload_calls: Arc<AtomicU32>,
    unload_calls: Arc<AtomicU32>,
}

async fn spawn_fake_llm_worker(fake: FakeLlmWorker) -> u16 {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral bind");
    let port = listener.local_addr().expect("addr").port();

    let router = Router::new()
        .route(
            "/v1/llm/offload",
            post(|axum::extract::State(worker): axum::extract::State<FakeLlmWorker>| async move {
                worker.offload_calls.fetch_add(1, Ordering::SeqCst);
                // El swap a RAM libera la huella del LLM (3.0 -> +2.5 GB).
                *worker.free_handle.lock().expect("probe lock") += 2.5;
                "{}"
            }),
        )
        .route(
            "/v1/llm/unload",
            post(|axum::extract::State(worker): axum::extract::State<FakeLlmWorker>| async move {
                worker.unload_calls.fetch_add(1, Ordering::SeqCst);
                "{}"
            }),
        )
        .with_state(fake);

    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    port
}

#[tokio::test]
async fn phase_one_swap_frees_enough_vram_to_admit_without_hints() {
    // Escenario: 2.0 GB libres, LLM reteniendo 3.0 GB, modelo SD residente.
    let free_handle = Arc::new(Mutex::new(2.0f32));
    let fake_worker = FakeLlmWorker {
        free_handle: free_handle.clone(),
        offload_calls: Arc::new(AtomicU32::new(0)),
        unload_calls: Arc::new(AtomicU32::new(0)),
    };
    let llm_port = spawn_fake_llm_worker(fake_worker.clone()).await;

    let probe = Arc::new(FakeProbe {
        total: 8.0,
        free: free_handle,
    });
    let arbiter = ResourceManager::new(
        WorkerClient::new(59998, "test-token"),
        WorkerClient::new(llm_port, "test-token"),
        probe,
    );

    // El bucle de métricas ya observó ambos workers.
    arbiter.update_worker_usage(2.0, 3.0).await;

    let verdict = arbiter
        .prepare_for_image_generation(&ArbitrationRequest {
            estimated_total_needed_gb: 4.0,
            megapixels: 1.048_576, // 1024x1024
            model_id: "sdxl.gguf".into(),
            base_gb_override: 0.0,
            clip_size_gb: 0.0,
        })
        .await;

    // Fase 1 disparada exactamente una vez; la Fase 2 jamás fue necesaria.
    assert_eq!(fake_worker.offload_calls.load(Ordering::SeqCst), 1);
    assert_eq!(fake_worker.unload_calls.load(Ordering::SeqCst), 0);

    // Con el modelo residente solo se paga el overhead de resolución y,
    // tras el swap, la memoria alcanza sin sugerencias al worker.
    assert!(verdict.admit);
    assert!(!verdict.request_clip_offload);
    assert!(!verdict.request_vae_tiling);
    assert!((verdict.committed_gb - 1.5 * 1.15).abs() < 1e-3);
    assert!((arbiter.committed_gb() - verdict.committed_gb).abs() < 1e-6);

    arbiter.uncommit_vram(verdict.committed_gb);
}

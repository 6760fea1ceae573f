/**
 * =================================================================
 * APARATO: VRAM ARBITRATION CONTRACT TEST (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar presupuesto, admisión, rechazo y la simetría
 *           del acumulador de compromisos.
 * =================================================================
 */

use async_trait::async_trait;
use mysti_domain_models::ArbitrationRequest;
use mysti_infra_gpu::VramProbe;
use mysti_infra_worker_client::WorkerClient;
use mysti_orchestrator::services::ResourceManager;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Sonda determinista: los tests dictan la VRAM observada.
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

fn build_arbiter(free_gb: f32) -> (ResourceManager, Arc<Mutex<f32>>) {
    let free_handle = Arc::new(Mutex::new(free_gb));
    let probe = Arc::new(FakeProbe {
        total: 24.0,
        free: free_handle.clone(),
    });
    // Puertos muertos: los escenarios de este archivo jamás tocan HTTP
    // (el LLM nunca aparenta estar cargado).
    let arbiter = ResourceManager::new(
        WorkerClient::new(59998, "test-token"),
        WorkerClient::new(59999, "test-token"),
        probe,
    );
    (arbiter, free_handle)
}

fn generation_request(megapixels: f32) -> ArbitrationRequest {
    ArbitrationRequest {
        estimated_total_needed_gb: 4.0,
        megapixels,
        model_id: "sdxl.gguf".into(),
        base_gb_override: 0.0,
        clip_size_gb: 0.0,
    }
}

#[tokio::test]
async fn cold_generate_admits_without_hints_and_commits_budget() {
    let (arbiter, _free) = build_arbiter(10.0);

    let verdict = arbiter
        .prepare_for_image_generation(&generation_request(0.26))
        .await;

    assert!(verdict.admit);
    assert!(!verdict.request_clip_offload);
    assert!(!verdict.request_vae_tiling);

    // base 2.5 (sin historial) + overhead max(0.5, 4.0-2.5)*1.15.
    let expected_committed = 2.5 + 1.5 * 1.15;
    assert!((verdict.committed_gb - expected_committed).abs() < 1e-3);
    assert!((arbiter.committed_gb() - expected_committed).abs() < 1e-3);

    arbiter.uncommit_vram(verdict.committed_gb);
    assert!(arbiter.committed_gb().abs() < 1e-6);
}

#[tokio::test]
async fn zero_free_vram_rejects_without_committing() {
    let (arbiter, _free) = build_arbiter(0.0);

    let verdict = arbiter
        .prepare_for_image_generation(&generation_request(0.26))
        .await;

    assert!(!verdict.admit);
    assert!(!verdict.reason.is_empty());
    assert_eq!(verdict.committed_gb, 0.0);
    assert!(arbiter.committed_gb().abs() < 1e-6, "rejection must not commit");
}

#[tokio::test]
async fn resident_model_only_pays_resolution_overhead() {
    let (arbiter, _free) = build_arbiter(10.0);
    // El worker SD retiene más del 70% de la base: modelo residente.
    arbiter.update_worker_usage(2.4, 0.0).await;

    let verdict = arbiter
        .prepare_for_image_generation(&ArbitrationRequest {
            estimated_total_needed_gb: 2.5, // igual a la base: piso de overhead
            megapixels: 0.26,
            model_id: "sdxl.gguf".into(),
            base_gb_override: 0.0,
            clip_size_gb: 0.0,
        })
        .await;

    assert!(verdict.admit);
    // Solo el piso de overhead con margen de seguridad: 0.5 * 1.15.
    assert!((verdict.committed_gb - 0.575).abs() < 1e-3);

    arbiter.uncommit_vram(verdict.committed_gb);
}

#[tokio::test]
async fn high_megapixel_requests_carry_worker_hints() {
    let (arbiter, _free) = build_arbiter(20.0);

    let verdict = arbiter
        .prepare_for_image_generation(&generation_request(2.8))
        .await;

    // VRAM holgada, pero la resolución sola dispara ambas sugerencias.
    assert!(verdict.admit);
    assert!(verdict.request_clip_offload);
    assert!(verdict.request_vae_tiling);

    arbiter.uncommit_vram(verdict.committed_gb);
}

#[tokio::test]
async fn learned_footprint_overrides_default_base() {
    let (arbiter, _free) = build_arbiter(10.0);
    arbiter.update_model_footprint("heavy.gguf", 6.0).await;
    assert_eq!(arbiter.model_footprint("heavy.gguf").await, 6.0);

    let verdict = arbiter
        .prepare_for_image_generation(&ArbitrationRequest {
            estimated_total_needed_gb: 7.0,
            megapixels: 0.26,
            model_id: "heavy.gguf".into(),
            base_gb_override: 0.0,
            clip_size_gb: 0.0,
        })
        .await;

    // base aprendida 6.0 + max(0.5, 7.0-6.0)*1.15 = 7.15.
    assert!(verdict.admit);
    assert!((verdict.committed_gb - 7.15).abs() < 1e-3);

    arbiter.uncommit_vram(verdict.committed_gb);
}

#[tokio::test]
async fn uncommit_floors_at_zero_for_lost_pairs() {
    let (arbiter, _free) = build_arbiter(10.0);

    arbiter.commit_vram(1.5);
    arbiter.uncommit_vram(9.0);
    assert!(arbiter.committed_gb().abs() < 1e-6);

    // Un par perdido no corrompe compromisos futuros.
    arbiter.commit_vram(2.0);
    assert!((arbiter.committed_gb() - 2.0).abs() < 1e-6);
}

/**
 * =================================================================
 * APARATO: ORPHAN IMPORT ARCHAEOLOGY TEST (V1.1)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar la adopción de huérfanos con sidecar JSON,
 *           sidecar TXT legado y sin sidecar, más la idempotencia.
 * =================================================================
 */

use clap::Parser;
use mysti_infra_db::StoreClient;
use mysti_infra_gpu::VramProbe;
use mysti_orchestrator::prelude::*;
use mysti_orchestrator::services::import_service::{auto_import_outputs, parse_legacy_sidecar};
use std::collections::HashMap;
use std::sync::Arc;

struct SilentProbe;

#[async_trait::async_trait]
impl VramProbe for SilentProbe {
    async fn total_gb(&self) -> f32 {
        0.0
    }
    async fn free_gb(&self) -> f32 {
        0.0
    }
    async fn usage_by_pid(&self) -> HashMap<u32, f32> {
        HashMap::new()
    }
}

async fn state_with_outputs(scratch: &tempfile::TempDir) -> AppState {
    let output_dir = scratch.path().join("outputs");
    std::fs::create_dir_all(&output_dir).expect("outputs dir");

    let db_path = scratch.path().join("mysti.db");
    let store = StoreClient::open(db_path.to_str().expect("utf8"))
        .await
        .expect("store open");

    let config = OrchestratorConfig::parse_from([
        "mysti-orchestrator",
        "--listen-port",
        "1337",
        "--output-dir",
        output_dir.to_str().expect("utf8"),
    ]);

    AppState::new(config, store, Arc::new(SilentProbe))
}

#[test]
fn legacy_txt_sidecar_yields_prompt_and_time() {
    let (prompt, time) = parse_legacy_sidecar("a misty forest\nSteps: 20\nTime: 3.25s\n");
    assert_eq!(prompt, "a misty forest");
    assert!((time - 3.25).abs() < 1e-9);

    let (negative_first, time) = parse_legacy_sidecar("Negative prompt: blurry\nTime: 1.0");
    assert_eq!(negative_first, "");
    assert!((time - 1.0).abs() < 1e-9);

    let (bare, no_time) = parse_legacy_sidecar("just a prompt");
    assert_eq!(bare, "just a prompt");
    assert_eq!(no_time, 0.0);
}

#[tokio::test]
async fn orphan_scan_adopts_images_with_and_without_sidecars() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let state = state_with_outputs(&scratch).await;
    let outputs = std::path::Path::new(&state.config.output_dir);

    // a.png + sidecar JSON (fuente preferida)
    std::fs::write(outputs.join("a.png"), b"png-bytes").expect("a.png");
    std::fs::write(
        outputs.join("a.json"),
        serde_json::json!({
            "prompt": "a sunny beach",
            "negative_prompt": "rain",
            "seed": 99,
            "width": 768,
            "height": 512,
            "steps": 30,
            "cfg_scale": 5.5,
            "generation_time": 2.75
        })
        .to_string(),
    )
    .expect("a.json");

    // b.jpg + sidecar TXT legado
    std::fs::write(outputs.join("b.jpg"), b"jpg-bytes").expect("b.jpg");
    std::fs::write(outputs.join("b.txt"), "a snowy mountain\nTime: 4.5\n").expect("b.txt");

    // c.png huérfano absoluto + un archivo no importable
    std::fs::write(outputs.join("c.png"), b"png-bytes").expect("c.png");
    std::fs::write(outputs.join("notes.md"), b"ignored").expect("notes.md");

    auto_import_outputs(&state).await;

    let records = state
        .generations
        .list_filtered(50, 0, &[], "", 0)
        .await
        .expect("list");
    assert_eq!(records.len(), 3);

    let beach = records
        .iter()
        .find(|record| record.id == "legacy-a.png")
        .expect("a.png adopted");
    assert_eq!(beach.params["prompt"], "a sunny beach");
    assert_eq!(beach.params["seed"], 99);
    assert_eq!(beach.params["width"], 768);

    let mountain = records
        .iter()
        .find(|record| record.id == "legacy-b.jpg")
        .expect("b.jpg adopted");
    assert_eq!(mountain.params["prompt"], "a snowy mountain");

    let bare = records
        .iter()
        .find(|record| record.id == "legacy-c.png")
        .expect("c.png adopted");
    assert_eq!(bare.params["prompt"], "");

    // Idempotencia: un segundo escaneo no duplica filas.
    auto_import_outputs(&state).await;
    let records_again = state
        .generations
        .list_filtered(50, 0, &[], "", 0)
        .await
        .expect("list");
    assert_eq!(records_again.len(), 3);
}

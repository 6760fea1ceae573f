/**
 * =================================================================
 * APARATO: SCHEMA & PRESET CONTRACT TEST (V1.1)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar la idempotencia de migraciones, el contrato de
 *           cadenas vacías en presets y el orden de despacho de jobs.
 * =================================================================
 */

use mysti_domain_models::{ImagePreset, JobStatus, LlmPreset};
use mysti_infra_db::repositories::{JobRepository, PresetRepository};
use mysti_infra_db::{StoreClient, CURRENT_SCHEMA_VERSION};

async fn schema_version(store: &StoreClient) -> i64 {
    let reader = store.reader().expect("reader");
    let mut rows = reader.query("PRAGMA user_version", ()).await.expect("pragma");
    rows.next()
        .await
        .expect("row")
        .map(|row| row.get::<i64>(0).expect("version"))
        .unwrap_or(0)
}

#[tokio::test]
async fn reopening_the_store_is_idempotent() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let db_path = scratch.path().join("mysti.db");
    let db_path = db_path.to_str().expect("utf8 path");

    let first_open = StoreClient::open(db_path).await.expect("first open");
    assert_eq!(schema_version(&first_open).await, CURRENT_SCHEMA_VERSION);
    drop(first_open);

    // Segunda apertura: las migraciones ya selladas no se re-aplican y
    // el esquema queda intacto.
    let second_open = StoreClient::open(db_path).await.expect("second open");
    assert_eq!(schema_version(&second_open).await, CURRENT_SCHEMA_VERSION);

    let presets = PresetRepository::new(second_open);
    assert!(presets.list_image_presets().await.expect("list").is_empty());
}

#[tokio::test]
async fn image_preset_paths_round_trip_as_empty_strings() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let store = StoreClient::open(scratch.path().join("mysti.db").to_str().expect("utf8"))
        .await
        .expect("open");
    let presets = PresetRepository::new(store);

    presets
        .save_image_preset(&ImagePreset {
            name: "SDXL Base".into(),
            unet_path: "sdxl/unet.gguf".into(),
            vae_path: "sdxl/vae.gguf".into(),
            vram_weights_mb_estimate: 6144,
            default_params: serde_json::json!({ "cfg_scale": 4.5 }),
            ..Default::default()
        })
        .await
        .expect("save");

    let listed = presets.list_image_presets().await.expect("list");
    assert_eq!(listed.len(), 1);
    let stored = &listed[0];

    assert_eq!(stored.unet_path, "sdxl/unet.gguf");
    assert_eq!(stored.vae_path, "sdxl/vae.gguf");
    // Rutas omitidas: cadena vacía, jamás null.
    assert_eq!(stored.clip_l_path, "");
    assert_eq!(stored.clip_g_path, "");
    assert_eq!(stored.t5xxl_path, "");
    assert_eq!(stored.default_params["cfg_scale"], 4.5);

    presets.record_measured_vram(stored.id, 7000).await.expect("measured");
    let refreshed = presets.list_image_presets().await.expect("list");
    assert_eq!(refreshed[0].vram_weights_mb_measured, 7000);
}

#[tokio::test]
async fn llm_preset_round_trips_capabilities_and_defaults() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let store = StoreClient::open(scratch.path().join("mysti.db").to_str().expect("utf8"))
        .await
        .expect("open");
    let presets = PresetRepository::new(store);

    presets
        .save_llm_preset(&LlmPreset {
            name: "Vision Tagger".into(),
            model_path: "llm/qwen-vl.gguf".into(),
            mmproj_path: "llm/mmproj.gguf".into(),
            capabilities: vec!["vision".into(), "json".into()],
            ..Default::default()
        })
        .await
        .expect("save");

    let listed = presets.list_llm_presets().await.expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].n_ctx, 2048);
    assert_eq!(listed[0].role, "Assistant");
    assert_eq!(listed[0].capabilities, vec!["vision".to_string(), "json".to_string()]);
}

#[tokio::test]
async fn job_queue_dispatches_by_priority_then_age() {
    let scratch = tempfile::tempdir().expect("tempdir");
    let store = StoreClient::open(scratch.path().join("mysti.db").to_str().expect("utf8"))
        .await
        .expect("open");
    let jobs = JobRepository::new(store);

    let old_low = jobs
        .enqueue("style_preview", &serde_json::json!({ "name": "old-low" }), 0)
        .await
        .expect("enqueue");
    let young_low = jobs
        .enqueue("style_preview", &serde_json::json!({ "name": "young-low" }), 0)
        .await
        .expect("enqueue");
    let urgent = jobs
        .enqueue("style_preview", &serde_json::json!({ "name": "urgent" }), 5)
        .await
        .expect("enqueue");

    // Prioridad alta adelanta a toda la cola.
    let first = jobs.next_pending().await.expect("next").expect("job present");
    assert_eq!(first.id, urgent);
    jobs.update_status(first.id, JobStatus::Completed, "").await.expect("complete");

    // A igual prioridad gana el más antiguo (FIFO estable).
    let second = jobs.next_pending().await.expect("next").expect("job present");
    assert_eq!(second.id, old_low);
    jobs.update_status(second.id, JobStatus::Failed, "boom").await.expect("fail");

    let third = jobs.next_pending().await.expect("next").expect("job present");
    assert_eq!(third.id, young_low);
}

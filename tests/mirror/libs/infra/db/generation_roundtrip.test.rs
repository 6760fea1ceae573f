/**
 * =================================================================
 * APARATO: GENERATION LEDGER ROUNDTRIP TEST (V1.2)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar el ciclo de vida de generaciones, tags y rating.
 * =================================================================
 */

use mysti_domain_models::Generation;
use mysti_infra_db::repositories::{GenerationRepository, TagRepository};
use mysti_infra_db::StoreClient;

async fn open_scratch_store() -> (tempfile::TempDir, StoreClient) {
    let scratch = tempfile::tempdir().expect("tempdir");
    let db_path = scratch.path().join("mysti.db");
    let store = StoreClient::open(db_path.to_str().expect("utf8 path"))
        .await
        .expect("schema ignition must succeed");
    (scratch, store)
}

fn generation(uuid: &str, prompt: &str) -> Generation {
    Generation {
        uuid: uuid.into(),
        file_path: format!("/outputs/{}.png", uuid),
        prompt: prompt.into(),
        seed: 42,
        width: 512,
        height: 512,
        steps: 20,
        cfg_scale: 7.0,
        ..Default::default()
    }
}

#[tokio::test]
async fn insert_with_tags_returns_collapsed_tag_set() {
    let (_scratch, store) = open_scratch_store().await;
    let generations = GenerationRepository::new(store.clone());

    generations
        .insert_with_tags(
            &generation("img-1", "a neon cyberpunk cat"),
            &["neon".into(), "cat".into(), "neon".into()],
            "user",
        )
        .await
        .expect("insert with tags");

    let records = generations
        .list_filtered(10, 0, &[], "", 0)
        .await
        .expect("list");
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "img-1");

    let mut tags = records[0].tags.clone();
    tags.sort();
    assert_eq!(tags, vec!["cat".to_string(), "neon".to_string()]);
}

#[tokio::test]
async fn tag_filter_uses_and_semantics() {
    let (_scratch, store) = open_scratch_store().await;
    let generations = GenerationRepository::new(store.clone());

    generations
        .insert_with_tags(&generation("img-a", "first"), &["neon".into(), "cat".into()], "user")
        .await
        .expect("insert a");
    generations
        .insert_with_tags(&generation("img-b", "second"), &["neon".into()], "user")
        .await
        .expect("insert b");

    let both_tags = generations
        .list_filtered(10, 0, &["neon".into(), "cat".into()], "", 0)
        .await
        .expect("filtered list");
    assert_eq!(both_tags.len(), 1);
    assert_eq!(both_tags[0].id, "img-a");

    let single_tag = generations
        .list_filtered(10, 0, &["neon".into()], "", 0)
        .await
        .expect("filtered list");
    assert_eq!(single_tag.len(), 2);
}

#[tokio::test]
async fn rating_writes_are_clamped_to_valid_range() {
    let (_scratch, store) = open_scratch_store().await;
    let generations = GenerationRepository::new(store.clone());

    generations.insert(&generation("img-r", "rated")).await.expect("insert");

    generations.set_rating("img-r", 9).await.expect("rating high");
    let records = generations.list_filtered(10, 0, &[], "", 0).await.expect("list");
    assert_eq!(records[0].rating, 5);

    generations.set_rating("img-r", -3).await.expect("rating low");
    let records = generations.list_filtered(10, 0, &[], "", 0).await.expect("list");
    assert_eq!(records[0].rating, 0);

    // El filtro por rating mínimo respeta el valor sellado.
    let filtered = generations.list_filtered(10, 0, &[], "", 1).await.expect("list");
    assert!(filtered.is_empty());
}

#[tokio::test]
async fn deleting_a_generation_sweeps_orphan_tags() {
    let (_scratch, store) = open_scratch_store().await;
    let generations = GenerationRepository::new(store.clone());
    let tags = TagRepository::new(store.clone());

    generations
        .insert_with_tags(&generation("img-x", "doomed"), &["solitary".into()], "user")
        .await
        .expect("insert");
    assert_eq!(tags.summary().await.expect("summary").len(), 1);

    generations.remove("img-x").await.expect("remove");

    assert!(generations.list_filtered(10, 0, &[], "", 0).await.expect("list").is_empty());
    assert!(tags.summary().await.expect("summary").is_empty());
}

#[tokio::test]
async fn tag_edge_removal_triggers_orphan_collection() {
    let (_scratch, store) = open_scratch_store().await;
    let generations = GenerationRepository::new(store.clone());
    let tags = TagRepository::new(store.clone());

    generations.insert(&generation("img-t", "tagged later")).await.expect("insert");
    tags.add_to_generation("img-t", "ethereal", "user").await.expect("add tag");
    assert_eq!(tags.summary().await.expect("summary").len(), 1);

    tags.remove_from_generation("img-t", "ethereal").await.expect("remove tag");
    assert!(tags.summary().await.expect("summary").is_empty());
}

#[tokio::test]
async fn untagged_batch_shrinks_as_candidates_are_marked() {
    let (_scratch, store) = open_scratch_store().await;
    let generations = GenerationRepository::new(store.clone());

    generations.insert(&generation("img-u1", "first prompt")).await.expect("insert");
    generations.insert(&generation("img-u2", "second prompt")).await.expect("insert");

    let batch = generations.untagged_batch(5).await.expect("batch");
    assert_eq!(batch.len(), 2);
    assert!(batch.iter().all(|candidate| !candidate.file_path.is_empty()));

    generations.mark_as_tagged(batch[0].row_id).await.expect("mark");
    let remaining = generations.untagged_batch(5).await.expect("batch");
    assert_eq!(remaining.len(), 1);
}

#[tokio::test]
async fn free_text_search_finds_prompts_by_content() {
    let (_scratch, store) = open_scratch_store().await;
    let generations = GenerationRepository::new(store.clone());

    generations.insert(&generation("img-s1", "a sunny beach")).await.expect("insert");
    generations.insert(&generation("img-s2", "a snowy mountain")).await.expect("insert");

    let beach_only = generations.search("beach", 10).await.expect("search");
    assert_eq!(beach_only.len(), 1);
    assert_eq!(beach_only[0].id, "img-s1");

    // Con FTS5 el operador OR devuelve ambas filas; el fallback LIKE
    // solo respondería ante el substring literal (cero filas aquí).
    let either = generations.search("mountain OR beach", 10).await.expect("search");
    assert!(
        either.len() == 2 || either.is_empty(),
        "OR query must resolve via FTS (2 rows) or degrade to LIKE (0 rows), got {}",
        either.len()
    );
}

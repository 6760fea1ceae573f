/**
 * =================================================================
 * APARATO: TAGGING PARSER TOLERANCE TEST (V1.1)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar la extracción tolerante de JSON, las tres formas
 *           de lista de tags y la detección de MIME.
 * =================================================================
 */

use mysti_orchestrator::services::tagging_service::{
    extract_json_block, extract_message_content, mime_for_extension, parse_tag_list,
};

#[test]
fn json_block_extraction_handles_noise_and_both_shapes() {
    assert_eq!(
        extract_json_block("Sure!\n{\"tags\":[\"cat\"]}\nHope that helps."),
        "{\"tags\":[\"cat\"]}"
    );
    assert_eq!(extract_json_block("tags: [\"cat\", \"dog\"] done"), "[\"cat\", \"dog\"]");
    // El objeto gana cuando abre antes que el arreglo.
    assert_eq!(
        extract_json_block("{\"tags\": [\"a\"]}"),
        "{\"tags\": [\"a\"]}"
    );
    assert_eq!(extract_json_block("no structure at all"), "");
    assert_eq!(extract_json_block(""), "");
}

#[test]
fn tag_list_accepts_array_tags_field_and_first_array_field() {
    assert_eq!(
        parse_tag_list(r#"["neon","cyberpunk","cat"]"#),
        vec!["neon", "cyberpunk", "cat"]
    );
    assert_eq!(
        parse_tag_list(r#"{"tags":["neon","cyberpunk","cat","futuristic"]}"#),
        vec!["neon", "cyberpunk", "cat", "futuristic"]
    );
    // Sin campo 'tags': el primer campo-arreglo del objeto vale.
    assert_eq!(
        parse_tag_list(r#"{"labels":["forest","ethereal"]}"#),
        vec!["forest", "ethereal"]
    );
}

#[test]
fn tag_list_filters_short_and_non_string_entries() {
    assert_eq!(
        parse_tag_list(r#"{"tags":["ok","x","",42,"fine"]}"#),
        vec!["ok", "fine"]
    );
    assert!(parse_tag_list("").is_empty());
    assert!(parse_tag_list("not-json").is_empty());
    assert!(parse_tag_list(r#"{"note":"no arrays here"}"#).is_empty());
}

#[test]
fn message_content_prefers_content_then_reasoning() {
    let with_content = serde_json::json!({
        "choices": [{ "message": { "content": "{\"tags\":[\"cat\"]}" } }]
    });
    assert_eq!(extract_message_content(&with_content), "{\"tags\":[\"cat\"]}");

    let reasoning_only = serde_json::json!({
        "choices": [{ "message": { "content": "", "reasoning_content": "fallback" } }]
    });
    assert_eq!(extract_message_content(&reasoning_only), "fallback");

    let empty = serde_json::json!({ "choices": [] });
    assert_eq!(extract_message_content(&empty), "");
}

#[test]
fn mime_detection_follows_file_extension() {
    assert_eq!(mime_for_extension("/outputs/a.png"), "image/png");
    assert_eq!(mime_for_extension("/outputs/a.JPG"), "image/jpeg");
    assert_eq!(mime_for_extension("/outputs/a.jpeg"), "image/jpeg");
    assert_eq!(mime_for_extension("/outputs/a.webp"), "image/webp");
    assert_eq!(mime_for_extension("/outputs/mystery"), "image/png");
}

/**
 * =================================================================
 * APARATO: SSE FRAME DISCIPLINE TEST (V1.0)
 * CLASIFICACIÓN: TRINITY EVIDENCE
 * OBJETIVO: Certificar el corte de frames en '\n\n', la tolerancia a
 *           chunks parciales y el descarte de keepalives.
 * =================================================================
 */

use mysti_orchestrator::services::progress_bridge::drain_sse_frames;

#[test]
fn complete_frames_are_drained_and_residue_is_kept() {
    let mut buffer = String::from(
        "data: {\"step\":1,\"steps\":20}\n\ndata: {\"step\":2,\"steps\":20}\n\ndata: {\"ste",
    );

    let frames = drain_sse_frames(&mut buffer);
    assert_eq!(frames.len(), 2);
    assert_eq!(frames[0]["step"], 1);
    assert_eq!(frames[1]["step"], 2);

    // El residuo parcial espera al próximo chunk del socket.
    assert_eq!(buffer, "data: {\"ste");

    buffer.push_str("p\":3,\"steps\":20}\n\n");
    let frames = drain_sse_frames(&mut buffer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["step"], 3);
    assert!(buffer.is_empty());
}

#[test]
fn keepalive_comments_and_malformed_payloads_are_discarded() {
    let mut buffer = String::from(": ping\n\ndata: not-json\n\ndata: {\"phase\":\"decode\"}\n\n");

    let frames = drain_sse_frames(&mut buffer);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0]["phase"], "decode");
    assert!(buffer.is_empty());
}

#[test]
fn empty_buffer_yields_nothing() {
    let mut buffer = String::new();
    assert!(drain_sse_frames(&mut buffer).is_empty());
}

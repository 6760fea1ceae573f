// [apps/orchestrator/src/handlers/mod.rs]
/*!
 * =================================================================
 * APARATO: HANDLER REGISTRY (V4.0)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: ADAPTADORES DE ENTRADA HTTP Y WEBSOCKET
 * =================================================================
 */

pub mod generate;
pub mod history;
pub mod library;
pub mod metadata;
pub mod passthrough;
pub mod presets;
pub mod stream;
pub mod styles;
pub mod tools;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

/// Cuerpo estándar de éxito de los endpoints de mutación.
pub fn success_response() -> Response {
    Json(serde_json::json!({ "status": "success" })).into_response()
}

/// Error local estructurado {error: ...} con el estado dado.
pub fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({ "error": message.into() }))).into_response()
}

/// Decodifica pares clave/valor de un query string crudo.
/// Soporta claves repetidas ('tag' multivaluado) y '+' como espacio.
pub fn parse_query_pairs(raw_query: &str) -> Vec<(String, String)> {
    raw_query
        .split('&')
        .filter(|fragment| !fragment.is_empty())
        .map(|fragment| {
            let (key, value) = fragment.split_once('=').unwrap_or((fragment, ""));
            let decode = |text: &str| {
                urlencoding::decode(&text.replace('+', "%20"))
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or_else(|_| text.to_string())
            };
            (decode(key), decode(value))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_pairs_decode_repeated_and_encoded_keys() {
        let pairs = parse_query_pairs("limit=10&tag=neon+cat&tag%5B%5D=cyber%20punk&min_rating=3");
        assert_eq!(pairs[0], ("limit".into(), "10".into()));
        assert_eq!(pairs[1], ("tag".into(), "neon cat".into()));
        assert_eq!(pairs[2], ("tag[]".into(), "cyber punk".into()));
        assert_eq!(pairs[3], ("min_rating".into(), "3".into()));
    }
}

// [apps/orchestrator/src/proxy.rs]
/*!
 * =================================================================
 * APARATO: STREAMING REVERSE PROXY (V4.2 - CHUNK BRIDGE)
 * CLASIFICACIÓN: TRANSPORT LAYER (ESTRATO L3)
 * RESPONSABILIDAD: REENVÍO TRANSPARENTE HACIA LOS WORKERS LOOPBACK
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. REAL HEADERS: El estado y content-type provienen de la respuesta
 *    real del upstream (reqwest entrega las cabeceras antes del cuerpo),
 *    no de heurísticas sobre el body.
 * 2. BOUNDED BRIDGE: Los cuerpos en streaming cruzan un canal mpsc
 *    acotado productor->consumidor; el cierre del productor termina la
 *    conexión del cliente.
 * 3. HEADER GATE: 10 s de espera de cabeceras en rutas de streaming
 *    mapea a 504; el fallo de conexión mapea a 502 con cuerpo JSON.
 * 4. HOP-BY-HOP DISCIPLINE: Connection/Transfer-Encoding/Content-Length/
 *    Host se despojan en ambas direcciones; el token interno se inyecta
 *    en toda ráfaga saliente.
 * =================================================================
 */

use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, Uri};
use axum::response::Response;
use futures_util::StreamExt;
use mysti_infra_worker_client::INTERNAL_TOKEN_HEADER;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, warn};

/// Presupuesto de una ida y vuelta bufferizada.
const BUFFERED_TIMEOUT: Duration = Duration::from_secs(300);
/// Presupuesto total de un stream SSE (una generación larga no debe
/// derribar el tubo de progreso).
const STREAMING_TIMEOUT: Duration = Duration::from_secs(3600);
/// Espera máxima de cabeceras del upstream en rutas de streaming.
const HEADER_WAIT_TIMEOUT: Duration = Duration::from_secs(10);
/// Profundidad del puente de chunks productor -> consumidor.
const CHUNK_BRIDGE_CAPACITY: usize = 32;
/// Tope de cuerpo de petición entrante (imágenes base64 en edits).
pub const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Cabeceras hop-by-hop que jamás cruzan el proxy.
const HOP_BY_HOP_HEADERS: &[&str] = &["connection", "transfer-encoding", "content-length", "host"];

/// La ruta exige puente de chunks: SSE, completaciones largas o cargas
/// de modelo, o un cuerpo que pide 'stream: true' explícito.
pub fn is_streaming_route(path: &str, request_body: &[u8]) -> bool {
    if path.contains("/completions") || path.contains("/progress") || path.contains("/llm/load") {
        return true;
    }
    body_requests_stream(request_body)
}

fn body_requests_stream(request_body: &[u8]) -> bool {
    // Búsqueda byte a byte; el cuerpo puede no ser JSON válido.
    let needle_spaced = b"\"stream\": true";
    let needle_tight = b"\"stream\":true";
    contains_subslice(request_body, needle_spaced) || contains_subslice(request_body, needle_tight)
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/**
 * Reenviador hacia los workers. Una instancia por proceso; el pool de
 * conexiones de reqwest se reutiliza entre ráfagas.
 */
pub struct StreamingProxy {
    network_session_client: reqwest::Client,
    internal_token: String,
}

impl StreamingProxy {
    pub fn new(internal_token: &str) -> Self {
        Self {
            network_session_client: reqwest::Client::builder()
                .build()
                .expect("FATAL: Proxy client initialization failed."),
            internal_token: internal_token.to_string(),
        }
    }

    /**
     * Reenvía una petición axum completa al worker del puerto dado.
     * Decide solo el modo (streaming o bufferizado); el contenido viaja
     * intacto.
     */
    pub async fn forward(&self, worker_port: u16, request: axum::extract::Request) -> Response {
        let (parts, body) = request.into_parts();
        let body_bytes = match axum::body::to_bytes(body, MAX_REQUEST_BODY_BYTES).await {
            Ok(bytes) => bytes,
            Err(_) => {
                return json_error_response(StatusCode::BAD_REQUEST, "request body unreadable")
            }
        };
        self.forward_with_body(worker_port, parts.method, &parts.uri, &parts.headers, body_bytes, None)
            .await
    }

    /**
     * Variante con cuerpo ya materializado y ruta opcional sustituida
     * (interceptores y cargas de preset).
     */
    pub async fn forward_with_body(
        &self,
        worker_port: u16,
        method: Method,
        original_uri: &Uri,
        request_headers: &HeaderMap,
        body_bytes: Bytes,
        override_path: Option<&str>,
    ) -> Response {
        let path_and_query = match override_path {
            Some(path) => path.to_string(),
            None => original_uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| original_uri.path().to_string()),
        };

        if is_streaming_route(&path_and_query, &body_bytes) {
            self.forward_streaming(worker_port, method, &path_and_query, request_headers, body_bytes)
                .await
        } else {
            match self
                .round_trip_buffered(worker_port, method, &path_and_query, request_headers, body_bytes)
                .await
            {
                Ok((status, headers, payload)) => {
                    let mut response = Response::builder().status(status);
                    if let Some(response_headers) = response.headers_mut() {
                        *response_headers = headers;
                    }
                    response
                        .body(Body::from(payload))
                        .unwrap_or_else(|_| json_error_response(StatusCode::BAD_GATEWAY, "proxy response build failed"))
                }
                Err(fault) => {
                    warn!("🌉 [PROXY]: Buffered round-trip failed: {}", fault);
                    json_error_response(
                        StatusCode::BAD_GATEWAY,
                        "Proxy failed to connect to worker",
                    )
                }
            }
        }
    }

    /**
     * Ida y vuelta bufferizada que expone estado, cabeceras y cuerpo a
     * la llamante (los interceptores la reutilizan para capturar el
     * payload de recuperación).
     */
    pub async fn round_trip_buffered(
        &self,
        worker_port: u16,
        method: Method,
        path_and_query: &str,
        request_headers: &HeaderMap,
        body_bytes: Bytes,
    ) -> Result<(StatusCode, HeaderMap, Bytes), reqwest::Error> {
        let upstream_response = self
            .build_upstream_request(worker_port, &method, path_and_query, request_headers, body_bytes)
            .timeout(BUFFERED_TIMEOUT)
            .send()
            .await?;

        let status = StatusCode::from_u16(upstream_response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let response_headers = copy_response_headers(upstream_response.headers());
        let payload = upstream_response.bytes().await?;
        Ok((status, response_headers, payload))
    }

    /// Puente de chunks para SSE y completaciones largas.
    async fn forward_streaming(
        &self,
        worker_port: u16,
        method: Method,
        path_and_query: &str,
        request_headers: &HeaderMap,
        body_bytes: Bytes,
    ) -> Response {
        let pending_request = self
            .build_upstream_request(worker_port, &method, path_and_query, request_headers, body_bytes)
            .timeout(STREAMING_TIMEOUT)
            .send();

        // Compuerta de cabeceras: el upstream debe responder algo en 10 s.
        let upstream_response =
            match tokio::time::timeout(HEADER_WAIT_TIMEOUT, pending_request).await {
                Ok(Ok(response)) => response,
                Ok(Err(fault)) => {
                    warn!("🌉 [PROXY]: Streaming connect failed: {}", fault);
                    return json_error_response(
                        StatusCode::BAD_GATEWAY,
                        "Proxy failed to connect to worker",
                    );
                }
                Err(_) => {
                    warn!("🌉 [PROXY]: Upstream withheld headers beyond the gate.");
                    return json_error_response(
                        StatusCode::GATEWAY_TIMEOUT,
                        "Worker timeout during header wait",
                    );
                }
            };

        let status = StatusCode::from_u16(upstream_response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let response_headers = copy_response_headers(upstream_response.headers());

        // Puente acotado: el productor bombea chunks del socket upstream;
        // el cierre del canal termina el cuerpo del cliente.
        let (chunk_sender, chunk_receiver) =
            mpsc::channel::<Result<Bytes, std::io::Error>>(CHUNK_BRIDGE_CAPACITY);

        tokio::spawn(async move {
            let mut upstream_chunks = upstream_response.bytes_stream();
            while let Some(chunk_result) = upstream_chunks.next().await {
                let outbound = chunk_result.map_err(std::io::Error::other);
                if chunk_sender.send(outbound).await.is_err() {
                    // El cliente colgó: drenar sería trabajo muerto.
                    break;
                }
            }
            debug!("🌉 [PROXY]: Upstream stream drained, bridge closed.");
        });

        let streaming_body = Body::from_stream(ReceiverStream::new(chunk_receiver));
        let mut response = Response::builder().status(status);
        if let Some(headers_slot) = response.headers_mut() {
            *headers_slot = response_headers;
        }
        response
            .body(streaming_body)
            .unwrap_or_else(|_| json_error_response(StatusCode::BAD_GATEWAY, "proxy response build failed"))
    }

    /// Petición upstream: cabeceras depuradas + token interno.
    fn build_upstream_request(
        &self,
        worker_port: u16,
        method: &Method,
        path_and_query: &str,
        request_headers: &HeaderMap,
        body_bytes: Bytes,
    ) -> reqwest::RequestBuilder {
        let target_url = format!("http://127.0.0.1:{}{}", worker_port, path_and_query);
        let reqwest_method = reqwest::Method::from_bytes(method.as_str().as_bytes())
            .unwrap_or(reqwest::Method::GET);

        let mut outbound_headers = reqwest::header::HeaderMap::new();
        for (header_name, header_value) in request_headers {
            let lowered = header_name.as_str().to_ascii_lowercase();
            if HOP_BY_HOP_HEADERS.contains(&lowered.as_str())
                || lowered == INTERNAL_TOKEN_HEADER.to_ascii_lowercase()
            {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(header_name.as_str().as_bytes()),
                reqwest::header::HeaderValue::from_bytes(header_value.as_bytes()),
            ) {
                outbound_headers.insert(name, value);
            }
        }
        if !self.internal_token.is_empty() {
            if let Ok(token_value) = reqwest::header::HeaderValue::from_str(&self.internal_token) {
                outbound_headers.insert(INTERNAL_TOKEN_HEADER, token_value);
            }
        }

        self.network_session_client
            .request(reqwest_method, target_url)
            .headers(outbound_headers)
            .body(body_bytes.to_vec())
    }
}

/// Cabeceras upstream depuradas de hop-by-hop, convertidas al tipo axum.
fn copy_response_headers(upstream_headers: &reqwest::header::HeaderMap) -> HeaderMap {
    let mut response_headers = HeaderMap::new();
    for (header_name, header_value) in upstream_headers {
        let lowered = header_name.as_str().to_ascii_lowercase();
        if HOP_BY_HOP_HEADERS.contains(&lowered.as_str()) {
            continue;
        }
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(header_name.as_str().as_bytes()),
            HeaderValue::from_bytes(header_value.as_bytes()),
        ) {
            response_headers.insert(name, value);
        }
    }
    response_headers
}

/// Respuesta de error local con cuerpo JSON compacto.
pub fn json_error_response(status: StatusCode, message: &str) -> Response {
    let payload = serde_json::json!({ "error": message }).to_string();
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Body::from(payload))
        .expect("static error response must build")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_detection_covers_paths_and_body_flag() {
        assert!(is_streaming_route("/v1/chat/completions", b"{}"));
        assert!(is_streaming_route("/v1/stream/progress", b""));
        assert!(is_streaming_route("/v1/llm/load", b"{}"));
        assert!(is_streaming_route("/v1/anything", b"{\"stream\": true}"));
        assert!(is_streaming_route("/v1/anything", b"{\"stream\":true}"));
        assert!(!is_streaming_route("/v1/images/generations", b"{\"stream\":false}"));
        assert!(!is_streaming_route("/v1/models", b""));
    }
}

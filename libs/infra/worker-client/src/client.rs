// [libs/infra/worker-client/src/client.rs]
/*!
 * =================================================================
 * APARATO: SOVEREIGN WORKER UPLINK (V3.2 - CONTROL PLANE)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: TRÁFICO DE CONTROL ORQUESTADOR -> WORKER
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. TOKEN DISCIPLINE: Toda ráfaga interna viaja con 'X-Internal-Token';
 *    los workers rechazan cualquier llamada sin él.
 * 2. TIMEOUT STRATA: Sondeos de salud en 2s, control en 20s, cargas de
 *    modelo en 600s; cada operación declara su presupuesto.
 * 3. SINGLE SESSION: Un solo 'reqwest::Client' por worker reutiliza el
 *    pool de conexiones hacia 127.0.0.1.
 * =================================================================
 */

use crate::errors::WorkerClientError;
use mysti_domain_models::WorkerVitals;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};

/// Cabecera de autenticación del tráfico interno worker <-> orquestador.
pub const INTERNAL_TOKEN_HEADER: &str = "X-Internal-Token";

/// Presupuesto de un sondeo de salud (el bucle corre cada 2 s).
const HEALTH_PROBE_TIMEOUT: Duration = Duration::from_secs(2);
/// Presupuesto de operaciones de control (offload/unload).
const CONTROL_TIMEOUT: Duration = Duration::from_secs(20);
/// Presupuesto de una carga de modelo (los GGUF grandes tardan minutos).
const MODEL_LOAD_TIMEOUT: Duration = Duration::from_secs(600);
/// Presupuesto de una completación de chat para tagging/extracción.
const CHAT_COMPLETION_TIMEOUT: Duration = Duration::from_secs(180);

/**
 * Cliente de plano de control hacia un worker concreto (SD o LLM).
 */
#[derive(Clone)]
pub struct WorkerClient {
    network_session_client: Client,
    worker_base_endpoint: String,
}

impl WorkerClient {
    /**
     * Inicializa el túnel con el secreto compartido sellado en cabeceras.
     *
     * @param port Puerto loopback del worker.
     * @param internal_token Secreto compartido; vacío deshabilita la cabecera.
     */
    pub fn new(port: u16, internal_token: &str) -> Self {
        let mut header_map = reqwest::header::HeaderMap::new();
        if !internal_token.is_empty() {
            if let Ok(token_value) = reqwest::header::HeaderValue::from_str(internal_token) {
                header_map.insert(INTERNAL_TOKEN_HEADER, token_value);
            }
        }

        Self {
            network_session_client: Client::builder()
                .default_headers(header_map)
                .user_agent("Mysti-Orchestrator/V3")
                .build()
                .expect("FATAL: Worker client initialization failed."),
            worker_base_endpoint: format!("http://127.0.0.1:{}", port),
        }
    }

    pub fn base_endpoint(&self) -> &str {
        &self.worker_base_endpoint
    }

    // --- ESTRATO DE SALUD ---

    /**
     * Sondea '/internal/health' y decodifica los signos vitales.
     *
     * # Errors:
     * - `NetworkError` si el worker no escucha (proceso muerto o colgado).
     * - `ServerRejection` ante estados no-200.
     */
    #[instrument(skip(self), level = "debug")]
    pub async fn health(&self) -> Result<WorkerVitals, WorkerClientError> {
        let response = self
            .network_session_client
            .get(format!("{}/internal/health", self.worker_base_endpoint))
            .timeout(HEALTH_PROBE_TIMEOUT)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(WorkerClientError::ServerRejection(response.status().as_u16()));
        }

        response
            .json::<WorkerVitals>()
            .await
            .map_err(|fault| WorkerClientError::DecodeError(fault.to_string()))
    }

    /// Sondeo binario de salud: vivo y respondiendo 200.
    pub async fn is_healthy(&self) -> bool {
        self.health().await.is_ok()
    }

    /**
     * Espera hasta 'timeout' a que el worker responda 200 en salud,
     * sondeando cada segundo. Devuelve false al agotar el presupuesto.
     */
    pub async fn wait_for_health(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if self.is_healthy().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    // --- ESTRATO DE GESTIÓN DE MODELO ---

    /// POST de control sin cuerpo (offload/unload). Devuelve el estado.
    #[instrument(skip(self))]
    pub async fn post_control(&self, path: &str) -> Result<StatusCode, WorkerClientError> {
        let response = self
            .network_session_client
            .post(format!("{}{}", self.worker_base_endpoint, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;
        debug!("🎛️ [WORKER_CONTROL]: {} -> {}", path, response.status());
        Ok(response.status())
    }

    /**
     * Reproduce un cuerpo de carga de modelo capturado ('/v1/models/load'
     * o '/v1/llm/load'). Presupuesto extendido: los pesos tardan.
     */
    #[instrument(skip(self, load_request_body))]
    pub async fn replay_model_load(
        &self,
        path: &str,
        load_request_body: &str,
    ) -> Result<StatusCode, WorkerClientError> {
        let response = self
            .network_session_client
            .post(format!("{}{}", self.worker_base_endpoint, path))
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .timeout(MODEL_LOAD_TIMEOUT)
            .body(load_request_body.to_string())
            .send()
            .await?;
        Ok(response.status())
    }

    /// GET JSON de una ruta del worker (por ejemplo '/v1/config').
    #[instrument(skip(self), level = "debug")]
    pub async fn get_json(&self, path: &str) -> Result<Value, WorkerClientError> {
        let response = self
            .network_session_client
            .get(format!("{}{}", self.worker_base_endpoint, path))
            .timeout(CONTROL_TIMEOUT)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(WorkerClientError::ServerRejection(response.status().as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|fault| WorkerClientError::DecodeError(fault.to_string()))
    }

    // --- ESTRATO DE INFERENCIA ---

    /**
     * Completación de chat contra el worker LLM (tagging, extracción de
     * estilos). Devuelve el JSON completo de la respuesta.
     *
     * # Errors:
     * - `ServerRejection` si el LLM devuelve 4xx/5xx (sin modelo cargado).
     */
    #[instrument(skip(self, chat_request_body))]
    pub async fn chat_completions(
        &self,
        chat_request_body: &Value,
    ) -> Result<Value, WorkerClientError> {
        let response = self
            .network_session_client
            .post(format!("{}/v1/chat/completions", self.worker_base_endpoint))
            .timeout(CHAT_COMPLETION_TIMEOUT)
            .json(chat_request_body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(WorkerClientError::ServerRejection(response.status().as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|fault| WorkerClientError::DecodeError(fault.to_string()))
    }

    /**
     * Generación de imagen bufferizada (vistas previas de estilo).
     */
    #[instrument(skip(self, generation_request_body))]
    pub async fn image_generations(
        &self,
        generation_request_body: &Value,
    ) -> Result<Value, WorkerClientError> {
        let response = self
            .network_session_client
            .post(format!("{}/v1/images/generations", self.worker_base_endpoint))
            .timeout(MODEL_LOAD_TIMEOUT)
            .json(generation_request_body)
            .send()
            .await?;

        if response.status() != StatusCode::OK {
            return Err(WorkerClientError::ServerRejection(response.status().as_u16()));
        }

        response
            .json::<Value>()
            .await
            .map_err(|fault| WorkerClientError::DecodeError(fault.to_string()))
    }
}

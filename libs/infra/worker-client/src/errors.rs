// [libs/infra/worker-client/src/errors.rs]
/*!
 * =================================================================
 * APARATO: WORKER CLIENT ERROR CATALOG (V3.0)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DEL TÚNEL INTERNO
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerClientError {
    /// Fallo de red físico: conexión rechazada, timeout de sondeo.
    #[error("[L3_WORKER_NET_FAULT]: UPLINK_SEVERED -> {0}")]
    NetworkError(#[from] reqwest::Error),

    /// El worker respondió con un estado no exitoso.
    #[error("[L3_WORKER_REJECTION]: HTTP_{0}")]
    ServerRejection(u16),

    /// El cuerpo de respuesta no respeta el contrato JSON esperado.
    #[error("[L3_WORKER_DECODE_FAULT]: PAYLOAD_CONTRACT_VIOLATION -> {0}")]
    DecodeError(String),
}

// [libs/infra/worker-client/src/lib.rs]
/*!
 * =================================================================
 * APARATO: WORKER CLIENT LIBRARY ROOT (V3.0)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN DEL TÚNEL DE MANDO INTERNO
 * =================================================================
 */

mod client;
mod errors;

pub use client::{WorkerClient, INTERNAL_TOKEN_HEADER};
pub use errors::WorkerClientError;

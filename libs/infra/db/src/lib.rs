// [libs/infra/db/src/lib.rs]
/*!
 * =================================================================
 * APARATO: PERSISTENCE LIBRARY ROOT (V3.0 - IMAGE LEDGER)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: EXPOSICIÓN DEL CLIENTE Y LOS REPOSITORIOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE WRITER: Toda mutación cruza el cerrojo de escritura del
 *    cliente; los lectores corren concurrentes por conexión propia.
 * 2. REPOSITORY AUTHORITY: Cada entidad tiene un repositorio de
 *    autoridad única; ningún handler toca SQL directamente.
 * =================================================================
 */

mod client;
mod errors;
mod schema;

pub mod repositories;

pub use client::StoreClient;
pub use errors::StoreError;
pub use schema::CURRENT_SCHEMA_VERSION;

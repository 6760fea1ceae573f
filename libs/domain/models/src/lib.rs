// [libs/domain/models/src/lib.rs]
/*!
 * =================================================================
 * APARATO: DOMAIN MODELS LIBRARY ROOT (V3.0 - UNIFIED SURFACE)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: DEFINICIÓN CANÓNICA DE ENTIDADES Y SEÑALES
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SINGLE SOURCE OF TRUTH: Toda estructura que cruza una frontera
 *    (DB, HTTP, WebSocket) nace en esta crate.
 * 2. SERDE PARITY: Las formas serializadas son contrato binario con el
 *    Dashboard y los workers; no se renombran campos a la ligera.
 * 3. ZERO ABBREVIATIONS: Nomenclatura nominal absoluta.
 * =================================================================
 */

pub mod arbitration;
pub mod generation;
pub mod job;
pub mod preset;
pub mod style;
pub mod telemetry;
pub mod worker;

pub use arbitration::{ArbitrationRequest, ArbitrationVerdict};
pub use generation::{Generation, GenerationRecord, TagSource, TagSummary};
pub use job::{Job, JobStatus};
pub use preset::{ImagePreset, LlmPreset};
pub use style::{LibraryItem, Style, STYLE_PROMPT_PLACEHOLDER};
pub use telemetry::{
    AlertLevel, LlmWorkerMetrics, RealTimeEvent, SdWorkerMetrics, SystemMetrics,
    WorkerFleetMetrics,
};
pub use worker::{WorkerKind, WorkerVitals};

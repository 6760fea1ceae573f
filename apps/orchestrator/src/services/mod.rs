// [apps/orchestrator/src/services/mod.rs]
/*!
 * =================================================================
 * APARATO: BACKGROUND SERVICE REGISTRY (V4.0)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: DAEMONS DE FONDO DEL ORQUESTADOR
 * =================================================================
 */

pub mod event_bus;
pub mod health_service;
pub mod import_service;
pub mod job_service;
pub mod metrics_loop;
pub mod progress_bridge;
pub mod resource_manager;
pub mod style_preview;
pub mod tagging_service;

pub use event_bus::EventBus;
pub use health_service::{HealthService, WorkerRuntime};
pub use job_service::{JobHandler, JobService};
pub use resource_manager::ResourceManager;

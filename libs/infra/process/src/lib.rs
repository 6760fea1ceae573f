// [libs/infra/process/src/lib.rs]
/*!
 * =================================================================
 * APARATO: PROCESS SUPERVISOR LIBRARY ROOT (V2.0)
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTER (ESTRATO L3)
 * RESPONSABILIDAD: CONTRATO ABSTRACTO DE SUPERVISIÓN DE PROCESOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. WORKLOAD OBLIVION: El supervisor ignora la semántica del worker;
 *    solo conoce ejecutable, argv y bitácora.
 * 2. TRAIT SEAM: El orquestador depende de 'WorkerSupervisor'; los tests
 *    inyectan supervisores falsos sin tocar el sistema operativo.
 * =================================================================
 */

mod native;

pub use native::{NativeSupervisor, WorkerHandle};

use async_trait::async_trait;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    /// El sistema operativo rechazó la ignición del proceso.
    #[error("[L3_PROC_SPAWN_FAULT]: CHILD_IGNITION_REJECTED -> {0}")]
    SpawnError(String),

    /// La bitácora de stdio no pudo abrirse en modo append.
    #[error("[L3_PROC_SINK_FAULT]: LOG_SINK_UNAVAILABLE -> {0}")]
    LogSinkError(#[from] std::io::Error),
}

/**
 * Plano de ignición de un proceso hijo. El stdio se redirige a la
 * bitácora ANTES del exec para que el rastro del worker nunca se mezcle
 * con el del orquestador.
 */
#[derive(Debug, Clone)]
pub struct SpawnBlueprint {
    pub executable: PathBuf,
    pub argv: Vec<String>,
    pub log_sink: PathBuf,
}

/**
 * Contrato de supervisión. Todas las operaciones son idempotentes sobre
 * un handle ya terminado.
 */
#[async_trait]
pub trait WorkerSupervisor: Send + Sync {
    /// Enciende el proceso y devuelve su handle nativo.
    async fn spawn(&self, blueprint: &SpawnBlueprint) -> Result<WorkerHandle, SupervisorError>;

    /// El proceso sigue vivo (sondeo no bloqueante).
    async fn is_running(&self, handle: &WorkerHandle) -> bool;

    /// Señal cortés, ventana de gracia, luego kill forzado.
    async fn terminate(&self, handle: &WorkerHandle);

    /// Espera bloqueante a la defunción del proceso.
    async fn wait(&self, handle: &WorkerHandle);
}

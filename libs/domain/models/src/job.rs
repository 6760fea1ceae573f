// [libs/domain/models/src/job.rs]
/*!
 * =================================================================
 * APARATO: ASYNC JOB LEDGER MODEL (V3.0)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: UNIDADES DE TRABAJO DIFERIDO (Previews, Backfills)
 *
 * # Mathematical Proof (Dispatch Ordering):
 * El ledger se consume en orden 'priority DESC, created_at ASC': ante
 * prioridades iguales, el trabajo más antiguo gana (FIFO estable).
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Estados del ciclo de vida de una unidad de trabajo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }
}

/// Unidad de trabajo asíncrono extraída de la tabla 'jobs'.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: i64,
    /// Discriminador del handler registrado (por ejemplo 'style_preview').
    pub job_type: String,
    pub payload: serde_json::Value,
    pub status: String,
    #[serde(default)]
    pub error: String,
    #[serde(default)]
    pub priority: i64,
    pub created_at: String,
}

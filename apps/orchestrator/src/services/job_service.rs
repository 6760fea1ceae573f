// [apps/orchestrator/src/services/job_service.rs]
/*!
 * =================================================================
 * APARATO: DEFERRED JOB SERVICE (V4.1 - HANDLER REGISTRY)
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: CONSUMO DEL LEDGER DE TRABAJO DIFERIDO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. REGISTRY DISPATCH: Cada tipo de job resuelve a un handler
 *    registrado en la ignición; un tipo sin handler falla con rastro.
 * 2. STATUS DISCIPLINE: pending -> processing -> completed|failed, con
 *    el error capturado en la fila.
 * =================================================================
 */

use crate::state::AppState;
use futures::future::BoxFuture;
use mysti_domain_models::{Job, JobStatus};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Cadencia de sondeo cuando la cola está vacía.
const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Pausa defensiva tras un fallo del propio bucle.
const FAULT_BACKOFF: Duration = Duration::from_secs(5);

/// Handler asíncrono de un tipo de job.
pub type JobHandler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, Result<(), String>> + Send + Sync>;

/**
 * Worker de la cola 'jobs'. Los handlers se registran antes de la
 * ignición; el despacho respeta 'priority DESC, created_at ASC'.
 */
pub struct JobService {
    state: AppState,
    handlers: HashMap<String, JobHandler>,
}

impl JobService {
    pub fn new(state: AppState) -> Self {
        Self {
            state,
            handlers: HashMap::new(),
        }
    }

    pub fn register_handler(&mut self, job_type: &str, handler: JobHandler) {
        info!("🧵 [JOBS]: Handler registered for job type [{}].", job_type);
        self.handlers.insert(job_type.to_string(), handler);
    }

    /// Enciende el daemon consumidor.
    pub fn spawn_daemon(self) {
        tokio::spawn(async move {
            info!("🧵 [JOBS]: Deferred job daemon initiated.");
            self.run_consumer_loop().await;
            info!("🧵 [JOBS]: Deferred job daemon stopped.");
        });
    }

    async fn run_consumer_loop(&self) {
        loop {
            if self.state.is_shutting_down() {
                break;
            }

            match self.state.jobs.next_pending().await {
                Ok(Some(job)) => self.process_job(job).await,
                Ok(None) => tokio::time::sleep(IDLE_POLL_INTERVAL).await,
                Err(fault) => {
                    error!("🧵 [JOBS]: Queue read failed: {}", fault);
                    tokio::time::sleep(FAULT_BACKOFF).await;
                }
            }
        }
    }

    async fn process_job(&self, job: Job) {
        info!("🧵 [JOBS]: Processing job {} (type: {}).", job.id, job.job_type);
        self.transition(job.id, JobStatus::Processing, "").await;

        let Some(handler) = self.handlers.get(&job.job_type) else {
            warn!("🧵 [JOBS]: No handler for job type [{}].", job.job_type);
            self.transition(
                job.id,
                JobStatus::Failed,
                &format!("no handler for job type: {}", job.job_type),
            )
            .await;
            return;
        };

        match handler(job.payload.clone()).await {
            Ok(()) => {
                info!("🧵 [JOBS]: Job {} completed.", job.id);
                self.transition(job.id, JobStatus::Completed, "").await;
            }
            Err(handler_fault) => {
                warn!("🧵 [JOBS]: Job {} failed: {}", job.id, handler_fault);
                self.transition(job.id, JobStatus::Failed, &handler_fault).await;
            }
        }
    }

    async fn transition(&self, job_id: i64, status: JobStatus, error_detail: &str) {
        if let Err(fault) = self.state.jobs.update_status(job_id, status, error_detail).await {
            error!("🧵 [JOBS]: Status transition dropped for {}: {}", job_id, fault);
        }
    }
}

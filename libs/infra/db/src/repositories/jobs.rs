// [libs/infra/db/src/repositories/jobs.rs]
/*!
 * =================================================================
 * APARATO: JOB LEDGER REPOSITORY (V3.1 - PRIORITY DISPATCH)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: COLA DE TRABAJO DIFERIDO SOBRE LA TABLA 'jobs'
 *
 * # Mathematical Proof (Dispatch Ordering):
 * 'ORDER BY priority DESC, created_at ASC LIMIT 1' garantiza que ante
 * prioridades iguales el trabajo más antiguo gana (FIFO estable) y que
 * una prioridad mayor adelanta a toda la cola.
 * =================================================================
 */

use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::repositories::row_text;
use libsql::params;
use mysti_domain_models::{Job, JobStatus};
use tracing::instrument;

const SELECT_NEXT_PENDING: &str = r#"
    SELECT id, type, payload, status, error, priority, created_at
    FROM jobs
    WHERE status = 'pending'
    ORDER BY priority DESC, created_at ASC, id ASC
    LIMIT 1
"#;

#[derive(Clone)]
pub struct JobRepository {
    store: StoreClient,
}

impl JobRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Encola una unidad de trabajo y devuelve su id.
    #[instrument(skip(self, payload))]
    pub async fn enqueue(
        &self,
        job_type: &str,
        payload: &serde_json::Value,
        priority: i64,
    ) -> Result<i64, StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "INSERT INTO jobs (type, payload, priority) VALUES (?1, ?2, ?3)",
                params![job_type, payload.to_string(), priority],
            )
            .await?;
        Ok(writer.last_insert_rowid())
    }

    /// Siguiente unidad pendiente según el orden de despacho.
    pub async fn next_pending(&self) -> Result<Option<Job>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader.query(SELECT_NEXT_PENDING, ()).await?;
        match rows.next().await? {
            Some(row) => {
                let payload_raw = row_text(&row, 2);
                Ok(Some(Job {
                    id: row.get::<i64>(0)?,
                    job_type: row.get::<String>(1)?,
                    payload: serde_json::from_str(&payload_raw)
                        .unwrap_or(serde_json::Value::Null),
                    status: row.get::<String>(3)?,
                    error: row_text(&row, 4),
                    priority: row.get::<i64>(5)?,
                    created_at: row.get::<String>(6)?,
                }))
            }
            None => Ok(None),
        }
    }

    /// Transición de estado con sello temporal y error opcional.
    #[instrument(skip(self))]
    pub async fn update_status(
        &self,
        job_id: i64,
        status: JobStatus,
        error_detail: &str,
    ) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        let completion_stamp = if status == JobStatus::Completed {
            ", completed_at = CURRENT_TIMESTAMP"
        } else {
            ""
        };
        let sql = format!(
            "UPDATE jobs SET status = ?1, error = ?2, updated_at = CURRENT_TIMESTAMP{} WHERE id = ?3",
            completion_stamp
        );
        writer
            .execute(&sql, params![status.as_str(), error_detail, job_id])
            .await?;
        Ok(())
    }
}

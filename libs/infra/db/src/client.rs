// [libs/infra/db/src/client.rs]
/*!
 * =================================================================
 * APARATO: STORE CONNECTION CLIENT (V3.1 - WRITE GATE)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: APERTURA DEL LEDGER LOCAL Y SERIALIZACIÓN DE ESCRITURA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. WAL DISCIPLINE: journal WAL + synchronous NORMAL + foreign keys ON
 *    aplicados antes de cualquier migración.
 * 2. WRITE GATE: Una única conexión de escritura detrás de un Mutex
 *    asíncrono; las operaciones anidadas usan helpers sin cerrojo sobre
 *    la misma conexión, jamás re-adquieren la puerta.
 * 3. READER FREEDOM: Cada lectura obtiene conexión propia; WAL permite
 *    lectores concurrentes con el escritor.
 * =================================================================
 */

use crate::errors::StoreError;
use crate::schema;
use libsql::{Builder, Connection, Database};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{info, instrument};

/**
 * Cliente del ledger de imágenes. Clonable; todos los clones comparten
 * el mismo archivo y la misma puerta de escritura.
 */
#[derive(Clone)]
pub struct StoreClient {
    internal_database_driver: Arc<Database>,
    write_gate: Arc<Mutex<Connection>>,
}

impl StoreClient {
    /**
     * Abre (o crea) el ledger local, aplica pragmas y ejecuta las
     * migraciones pendientes.
     *
     * # Errors:
     * - `OpenError` si el archivo no puede abrirse.
     * - `SchemaError` si una migración colapsa: fatal para el arranque.
     */
    #[instrument(skip(database_file_path))]
    pub async fn open(database_file_path: &str) -> Result<Self, StoreError> {
        info!("🔌 [STORE]: Opening image ledger at [{}]", database_file_path);

        let database_driver = Builder::new_local(database_file_path)
            .build()
            .await
            .map_err(|fault| StoreError::OpenError(fault.to_string()))?;

        let writer_connection = database_driver
            .connect()
            .map_err(|fault| StoreError::OpenError(fault.to_string()))?;

        // Pragmas de disciplina antes de tocar el esquema. 'journal_mode'
        // responde una fila, por lo que viaja como query.
        writer_connection.query("PRAGMA journal_mode=WAL;", ()).await?;
        writer_connection.execute("PRAGMA synchronous=NORMAL;", ()).await?;
        writer_connection.execute("PRAGMA foreign_keys=ON;", ()).await?;

        schema::apply_pending_migrations(&writer_connection).await?;

        Ok(Self {
            internal_database_driver: Arc::new(database_driver),
            write_gate: Arc::new(Mutex::new(writer_connection)),
        })
    }

    /**
     * Adquiere la puerta de escritura. El guard ES la conexión: mientras
     * viva, ninguna otra mutación puede entrar.
     */
    pub async fn writer(&self) -> MutexGuard<'_, Connection> {
        self.write_gate.lock().await
    }

    /// Conexión de lectura independiente (concurrente bajo WAL).
    pub fn reader(&self) -> Result<Connection, StoreError> {
        self.internal_database_driver
            .connect()
            .map_err(|fault| StoreError::OpenError(fault.to_string()))
    }
}

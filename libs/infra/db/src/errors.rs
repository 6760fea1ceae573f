// [libs/infra/db/src/errors.rs]
/*!
 * =================================================================
 * APARATO: STORE ERROR CATALOG (V3.0 - SOBERANO)
 * CLASIFICACIÓN: INFRASTRUCTURE CORE (ESTRATO L3)
 * RESPONSABILIDAD: CATALOGACIÓN SEMÁNTICA DE FALLOS DE PERSISTENCIA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PANOPTICON COMPLIANCE: Mensajes con prefijo de estrato para su
 *    renderizado cromático en el Dashboard.
 * 2. FATAL VS DEGRADABLE: Solo 'SchemaError' es fatal en el arranque;
 *    el resto degrada a centinelas en el estrato de handlers.
 * =================================================================
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Error de apertura del archivo de base de datos local.
    #[error("[L3_DB_OPEN_FAULT]: DATABASE_FILE_UNAVAILABLE -> {0}")]
    OpenError(String),

    /// Fallo al aplicar una migración de esquema. Fatal en el arranque.
    #[error("[L3_DB_SCHEMA_FAULT]: MIGRATION_COLLAPSE -> {0}")]
    SchemaError(String),

    /// Error de sintaxis o ejecución devuelto por el motor libSQL.
    #[error("[L3_DB_QUERY_FAULT]: SQL_QUERY_REJECTED -> {0}")]
    QueryError(#[from] libsql::Error),

    /// Fallo en la transformación de tipos entre SQLite y el dominio.
    #[error("[L3_DB_MAPPING_FAULT]: DATA_MAPPING_VIOLATION -> {0}")]
    MappingError(String),

    /// Error al comprometer una secuencia multi-sentencia.
    #[error("[L3_DB_FAULT]: TRANSACTION_COLLAPSE")]
    TransactionError,

    /// La fila solicitada no existe en las tablas activas.
    #[error("[L3_DB_FAULT]: ROW_NOT_FOUND")]
    RowNotFound,
}

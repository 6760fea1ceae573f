// [libs/infra/db/src/repositories/mod.rs]
/*!
 * =================================================================
 * APARATO: REPOSITORY REGISTRY (V3.0)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: AUTORIDADES ÚNICAS DE PERSISTENCIA POR ENTIDAD
 * =================================================================
 */

mod generations;
mod jobs;
mod library;
mod metadata;
mod presets;
mod styles;
mod tags;

use libsql::{Row, Value};

/// Texto tolerante a NULL de una columna.
pub(crate) fn row_text(row: &Row, column_index: i32) -> String {
    match row.get_value(column_index) {
        Ok(Value::Text(text)) => text,
        _ => String::new(),
    }
}

/// Entero tolerante a NULL de una columna.
pub(crate) fn row_integer(row: &Row, column_index: i32, fallback: i64) -> i64 {
    match row.get_value(column_index) {
        Ok(Value::Integer(integer)) => integer,
        _ => fallback,
    }
}

/// Real tolerante a NULL (acepta afinidad entera de SQLite).
pub(crate) fn row_real(row: &Row, column_index: i32, fallback: f64) -> f64 {
    match row.get_value(column_index) {
        Ok(Value::Real(real)) => real,
        Ok(Value::Integer(integer)) => integer as f64,
        _ => fallback,
    }
}

pub use generations::{GenerationRepository, UntaggedGeneration};
pub use jobs::JobRepository;
pub use library::LibraryRepository;
pub use metadata::MetadataRepository;
pub use presets::PresetRepository;
pub use styles::StyleRepository;
pub use tags::TagRepository;

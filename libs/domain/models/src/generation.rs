// [libs/domain/models/src/generation.rs]
/*!
 * =================================================================
 * APARATO: GENERATION DOMAIN MODEL (V3.1 - PROVENANCE SEALED)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: REPRESENTACIÓN CANÓNICA DE UNA IMAGEN PRODUCIDA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. PROVENANCE: 'params_json' transporta la petición original verbatim,
 *    permitiendo la reproducción bit-perfecta de cualquier imagen.
 * 2. LINEAGE: 'parent_uuid' encadena derivaciones img2img.
 * 3. RATING GOVERNANCE: El rango [0,5] se sella en el estrato de
 *    persistencia; el dominio solo declara la intención.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Origen de una arista (generación, etiqueta) en el grafo de tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagSource {
    /// Etiqueta aplicada manualmente por el operador.
    User,
    /// Etiqueta producida por el LLM multimodal analizando los píxeles.
    LlmVision,
    /// Etiqueta producida por el LLM a partir del prompt (fallback textual).
    LlmAuto,
    /// Etiqueta heredada durante la importación de archivos huérfanos.
    Import,
}

impl TagSource {
    /// Etiqueta textual persistida en la columna 'source' de 'image_tags'.
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSource::User => "user",
            TagSource::LlmVision => "llm_vision",
            TagSource::LlmAuto => "llm_auto",
            TagSource::Import => "import",
        }
    }
}

/**
 * Registro de escritura de una generación (el orquestador es el único autor).
 * Nace cuando el worker de difusión devuelve 200 o durante la importación.
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Generation {
    /// Identificador externo estable; nunca se reutiliza.
    pub uuid: String,
    /// URL relativa a la raíz de salidas (por ejemplo '/outputs/img-1.png').
    pub file_path: String,
    pub prompt: String,
    #[serde(default)]
    pub negative_prompt: String,
    /// Semilla de 64 bits; -1 señala semilla delegada al worker.
    #[serde(default)]
    pub seed: i64,
    #[serde(default)]
    pub width: i64,
    #[serde(default)]
    pub height: i64,
    #[serde(default)]
    pub steps: i64,
    #[serde(default)]
    pub cfg_scale: f64,
    /// Segundos de cómputo reportados por el worker.
    #[serde(default)]
    pub generation_time: f64,
    #[serde(default)]
    pub model_hash: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub is_favorite: bool,
    /// Marca si el tagger ya procesó esta imagen (éxito o fracaso).
    #[serde(default)]
    pub auto_tagged: bool,
    #[serde(default)]
    pub rating: i64,
    /// Petición de generación verbatim (procedencia).
    #[serde(default)]
    pub params_json: String,
    /// Linaje img2img opcional.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_uuid: Option<String>,
}

/**
 * Vista de lectura ensamblada para el Dashboard: fila + arreglo de tags.
 * Es la forma exacta que emite 'GET /v1/history/images'.
 */
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRecord {
    /// El UUID externo (el Dashboard lo conoce como 'id').
    pub id: String,
    /// Nombre de archivo sin directorios, derivado de 'file_path'.
    pub name: String,
    pub file_path: String,
    pub timestamp: String,
    /// Parámetros de generación fusionados (params_json + columnas).
    pub params: serde_json::Value,
    pub is_favorite: bool,
    pub rating: i64,
    pub tags: Vec<String>,
}

/// Entrada del catálogo de etiquetas con su cardinalidad de uso.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TagSummary {
    pub name: String,
    pub category: String,
    pub count: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_source_labels_match_storage_contract() {
        assert_eq!(TagSource::User.as_str(), "user");
        assert_eq!(TagSource::LlmVision.as_str(), "llm_vision");
        assert_eq!(TagSource::LlmAuto.as_str(), "llm_auto");
        assert_eq!(TagSource::Import.as_str(), "import");
    }

    #[test]
    fn generation_deserializes_with_sparse_payload() {
        let sparse: Generation = serde_json::from_str(
            r#"{"uuid":"img-1","file_path":"/outputs/img-1.png","prompt":"a cat"}"#,
        )
        .expect("sparse payload must hydrate with defaults");

        assert_eq!(sparse.uuid, "img-1");
        assert_eq!(sparse.seed, 0);
        assert!(sparse.parent_uuid.is_none());
        assert!(!sparse.auto_tagged);
    }
}

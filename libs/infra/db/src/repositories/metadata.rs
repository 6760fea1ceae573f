// [libs/infra/db/src/repositories/metadata.rs]
/*!
 * =================================================================
 * APARATO: MODEL METADATA REPOSITORY (V3.1 - SUFFIX RESOLUTION)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: JSON LIBRE POR IDENTIFICADOR DE MODELO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SUFFIX RESOLUTION: Los workers reportan rutas absolutas con
 *    separadores mixtos; la búsqueda normaliza '\' -> '/' y acepta el
 *    match por sufijo contra los ids registrados.
 * 2. FREE-FORM: El valor es JSON opaco (resolución preferida, pasos de
 *    muestreo, CFG, rutas compañeras 'vae'/'llm').
 * =================================================================
 */

use crate::client::StoreClient;
use crate::errors::StoreError;
use libsql::params;
use tracing::instrument;

#[derive(Clone)]
pub struct MetadataRepository {
    store: StoreClient,
}

impl MetadataRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    pub async fn save(
        &self,
        model_id: &str,
        metadata: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "INSERT OR REPLACE INTO models (id, metadata, updated_at) VALUES (?1, ?2, CURRENT_TIMESTAMP)",
                params![model_id, metadata.to_string()],
            )
            .await?;
        Ok(())
    }

    /**
     * Metadatos por id exacto, con fallback de match por sufijo
     * normalizado. Devuelve objeto vacío si nada coincide.
     */
    #[instrument(skip(self))]
    pub async fn get(&self, model_id: &str) -> Result<serde_json::Value, StoreError> {
        let reader = self.store.reader()?;

        let mut exact_rows = reader
            .query("SELECT metadata FROM models WHERE id = ?1", params![model_id])
            .await?;
        if let Some(row) = exact_rows.next().await? {
            let raw = row.get::<String>(0)?;
            return Ok(serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({})));
        }

        // Fallback: el id consultado suele ser una ruta absoluta que
        // termina en el id registrado.
        let normalized_query = model_id.replace('\\', "/");
        let mut all_rows = reader.query("SELECT id, metadata FROM models", ()).await?;
        while let Some(row) = all_rows.next().await? {
            let stored_id = row.get::<String>(0)?.replace('\\', "/");
            if normalized_query.ends_with(&stored_id) {
                let raw = row.get::<String>(1)?;
                return Ok(serde_json::from_str(&raw).unwrap_or_else(|_| serde_json::json!({})));
            }
        }

        Ok(serde_json::json!({}))
    }

    /// Catálogo completo como pares {id, metadata}.
    pub async fn get_all(&self) -> Result<Vec<serde_json::Value>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader
            .query("SELECT id, metadata FROM models ORDER BY id ASC", ())
            .await?;
        let mut catalog = Vec::new();
        while let Some(row) = rows.next().await? {
            let raw = row.get::<String>(1)?;
            catalog.push(serde_json::json!({
                "id": row.get::<String>(0)?,
                "metadata": serde_json::from_str::<serde_json::Value>(&raw)
                    .unwrap_or_else(|_| serde_json::json!({})),
            }));
        }
        Ok(catalog)
    }
}

// [libs/infra/db/src/repositories/generations.rs]
/*!
 * =================================================================
 * APARATO: GENERATION REPOSITORY (V3.3 - LEDGER AUTHORITY)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: CICLO DE VIDA COMPLETO DE LA ENTIDAD 'GENERATION'
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. AND SEMANTICS: El filtro por tags exige que la generación posea
 *    TODAS las etiquetas pedidas (COUNT(DISTINCT) = |tags|).
 * 2. FTS FIRST, LIKE FALLBACK: La búsqueda intenta el índice de texto
 *    completo y degrada a LIKE sobre columnas crudas.
 * 3. RATING GOVERNANCE: El rango [0,5] se sella aquí, en la escritura.
 * 4. TAG HYGIENE: Todo borrado de generación dispara la recolección de
 *    etiquetas huérfanas en la misma secuencia.
 * =================================================================
 */

use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::repositories::tags::{collect_orphans_unlocked, link_tag_unlocked};
use crate::repositories::{row_integer, row_real, row_text};
use libsql::{params, Connection, Row, Value};
use mysti_domain_models::{Generation, GenerationRecord};
use tracing::{debug, info, instrument};

const INSERT_GENERATION: &str = r#"
    INSERT INTO generations (
        uuid, file_path, prompt, negative_prompt, seed, width, height,
        steps, cfg_scale, generation_time, model_hash, is_favorite,
        auto_tagged, rating, model_id, params_json, parent_uuid
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)
"#;

/// Proyección canónica de una fila de generación (orden fijado).
const GENERATION_COLUMNS: &str = r#"
    g.id, g.uuid, g.file_path, g.timestamp, g.prompt, g.negative_prompt,
    g.seed, g.width, g.height, g.steps, g.cfg_scale, g.model_id,
    g.is_favorite, g.rating, g.params_json
"#;

const SELECT_TAGS_FOR_GENERATION: &str = r#"
    SELECT t.name FROM tags t
    JOIN image_tags it ON t.id = it.tag_id
    WHERE it.generation_id = ?1
"#;

const SELECT_UNTAGGED_BATCH: &str = r#"
    SELECT id, uuid, prompt, file_path FROM generations
    WHERE auto_tagged = 0 AND prompt IS NOT NULL AND prompt != ''
    LIMIT ?1
"#;

/// Candidata pendiente de etiquetado automático.
#[derive(Debug, Clone)]
pub struct UntaggedGeneration {
    pub row_id: i64,
    pub uuid: String,
    pub prompt: String,
    pub file_path: String,
}

/**
 * Repositorio de autoridad única sobre la tabla 'generations'.
 */
#[derive(Clone)]
pub struct GenerationRepository {
    store: StoreClient,
}

impl GenerationRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    // --- ESTRATO DE ESCRITURA ---

    /**
     * Inserta una generación recién producida o importada.
     */
    #[instrument(skip(self, generation), fields(uuid = %generation.uuid))]
    pub async fn insert(&self, generation: &Generation) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        insert_unlocked(&writer, generation).await?;
        debug!("💾 [GENERATIONS]: Row [{}] sealed in ledger.", generation.uuid);
        Ok(())
    }

    /**
     * Inserta una generación con su paquete de etiquetas en una única
     * transacción (importación masiva).
     */
    #[instrument(skip(self, generation, tag_names), fields(uuid = %generation.uuid))]
    pub async fn insert_with_tags(
        &self,
        generation: &Generation,
        tag_names: &[String],
        tag_source: &str,
    ) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        let transaction = writer
            .transaction()
            .await
            .map_err(|_| StoreError::TransactionError)?;

        insert_unlocked(&transaction, generation).await?;
        let generation_row_id = transaction.last_insert_rowid();

        for tag_name in tag_names {
            link_tag_unlocked(&transaction, generation_row_id, tag_name, tag_source).await?;
        }

        transaction
            .commit()
            .await
            .map_err(|_| StoreError::TransactionError)
    }

    pub async fn set_favorite(&self, uuid: &str, favorite: bool) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "UPDATE generations SET is_favorite = ?1 WHERE uuid = ?2",
                params![favorite as i64, uuid],
            )
            .await?;
        Ok(())
    }

    /// Persiste la calificación sellada al rango [0,5].
    pub async fn set_rating(&self, uuid: &str, rating: i64) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "UPDATE generations SET rating = ?1 WHERE uuid = ?2",
                params![rating.clamp(0, 5), uuid],
            )
            .await?;
        Ok(())
    }

    /**
     * Elimina la generación; las aristas de tags caen en cascada y las
     * etiquetas huérfanas se recolectan en la misma secuencia.
     */
    #[instrument(skip(self))]
    pub async fn remove(&self, uuid: &str) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute("DELETE FROM generations WHERE uuid = ?1", params![uuid])
            .await?;
        collect_orphans_unlocked(&writer).await?;
        info!("🗑️ [GENERATIONS]: Row [{}] purged with orphan-tag sweep.", uuid);
        Ok(())
    }

    pub async fn mark_as_tagged(&self, generation_row_id: i64) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "UPDATE generations SET auto_tagged = 1 WHERE id = ?1",
                params![generation_row_id],
            )
            .await?;
        Ok(())
    }

    /// Registra un activo adjunto (miniatura, sidecar renderizado).
    pub async fn add_generation_file(
        &self,
        generation_row_id: i64,
        file_type: &str,
        file_path: &str,
    ) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "INSERT INTO generation_files (generation_id, file_type, file_path) VALUES (?1, ?2, ?3)",
                params![generation_row_id, file_type, file_path],
            )
            .await?;
        Ok(())
    }

    // --- ESTRATO DE LECTURA ---

    pub async fn exists_by_path(&self, file_path: &str) -> Result<bool, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader
            .query(
                "SELECT id FROM generations WHERE file_path = ?1",
                params![file_path],
            )
            .await?;
        Ok(rows.next().await?.is_some())
    }

    pub async fn filepath(&self, uuid: &str) -> Result<Option<String>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader
            .query(
                "SELECT file_path FROM generations WHERE uuid = ?1",
                params![uuid],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    pub async fn files(
        &self,
        generation_row_id: i64,
        file_type: &str,
    ) -> Result<Vec<String>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader
            .query(
                "SELECT file_path FROM generation_files WHERE generation_id = ?1 AND file_type = ?2 ORDER BY created_at ASC",
                params![generation_row_id, file_type],
            )
            .await?;
        let mut file_paths = Vec::new();
        while let Some(row) = rows.next().await? {
            file_paths.push(row.get::<String>(0)?);
        }
        Ok(file_paths)
    }

    /**
     * Consulta filtrada del historial: tags con semántica AND, modelo y
     * rating mínimo, ordenada por timestamp descendente.
     */
    #[instrument(skip(self, tag_filters))]
    pub async fn list_filtered(
        &self,
        limit: i64,
        offset: i64,
        tag_filters: &[String],
        model_id: &str,
        min_rating: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let mut sql = format!("SELECT {} FROM generations g WHERE 1=1 ", GENERATION_COLUMNS);
        let mut bound_values: Vec<Value> = Vec::new();

        if !tag_filters.is_empty() {
            let placeholders = vec!["?"; tag_filters.len()].join(", ");
            sql.push_str(&format!(
                "AND g.id IN (
                    SELECT it.generation_id FROM image_tags it
                    JOIN tags t ON it.tag_id = t.id
                    WHERE t.name IN ({})
                    GROUP BY it.generation_id
                    HAVING COUNT(DISTINCT t.id) = ?
                ) ",
                placeholders
            ));
            for tag_name in tag_filters {
                bound_values.push(Value::from(tag_name.clone()));
            }
            bound_values.push(Value::from(tag_filters.len() as i64));
        }
        if !model_id.is_empty() {
            sql.push_str("AND g.model_id = ? ");
            bound_values.push(Value::from(model_id.to_string()));
        }
        if min_rating > 0 {
            sql.push_str("AND g.rating >= ? ");
            bound_values.push(Value::from(min_rating));
        }
        sql.push_str("ORDER BY g.timestamp DESC LIMIT ? OFFSET ?");
        bound_values.push(Value::from(limit));
        bound_values.push(Value::from(offset));

        let reader = self.store.reader()?;
        let mut rows = reader
            .query(&sql, libsql::params_from_iter(bound_values))
            .await?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(assemble_record(&reader, &row).await?);
        }
        Ok(records)
    }

    /**
     * Búsqueda de texto libre. Intenta el índice FTS5; si el motor lo
     * rechaza (soporte ausente o sintaxis), degrada a LIKE.
     */
    #[instrument(skip(self))]
    pub async fn search(
        &self,
        free_text_query: &str,
        limit: i64,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let reader = self.store.reader()?;

        let full_text_sql = format!(
            "SELECT {} FROM generations g
             WHERE g.id IN (SELECT rowid FROM generations_fts WHERE generations_fts MATCH ?1)
             ORDER BY g.timestamp DESC LIMIT ?2",
            GENERATION_COLUMNS
        );

        match reader
            .query(&full_text_sql, params![free_text_query, limit])
            .await
        {
            Ok(mut rows) => {
                let mut records = Vec::new();
                while let Some(row) = rows.next().await? {
                    records.push(assemble_record(&reader, &row).await?);
                }
                Ok(records)
            }
            Err(fts_fault) => {
                debug!("🔎 [GENERATIONS]: FTS path rejected ({}), LIKE fallback.", fts_fault);
                let like_pattern = format!("%{}%", free_text_query);
                let like_sql = format!(
                    "SELECT {} FROM generations g
                     WHERE g.prompt LIKE ?1 OR g.negative_prompt LIKE ?2
                     ORDER BY g.timestamp DESC LIMIT ?3",
                    GENERATION_COLUMNS
                );
                let mut rows = reader
                    .query(&like_sql, params![like_pattern.clone(), like_pattern, limit])
                    .await?;
                let mut records = Vec::new();
                while let Some(row) = rows.next().await? {
                    records.push(assemble_record(&reader, &row).await?);
                }
                Ok(records)
            }
        }
    }

    /// Lote de candidatas para el tagger (máximo 'limit').
    pub async fn untagged_batch(&self, limit: i64) -> Result<Vec<UntaggedGeneration>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader.query(SELECT_UNTAGGED_BATCH, params![limit]).await?;
        let mut batch = Vec::new();
        while let Some(row) = rows.next().await? {
            batch.push(UntaggedGeneration {
                row_id: row.get::<i64>(0)?,
                uuid: row.get::<String>(1)?,
                prompt: row_text(&row, 2),
                file_path: row_text(&row, 3),
            });
        }
        Ok(batch)
    }
}

/// Inserción sin cerrojo: la llamante ya posee la puerta de escritura.
async fn insert_unlocked(
    connection: &Connection,
    generation: &Generation,
) -> Result<(), StoreError> {
    connection
        .execute(
            INSERT_GENERATION,
            params![
                generation.uuid.clone(),
                generation.file_path.clone(),
                generation.prompt.clone(),
                generation.negative_prompt.clone(),
                generation.seed,
                generation.width,
                generation.height,
                generation.steps,
                generation.cfg_scale,
                generation.generation_time,
                generation.model_hash.clone(),
                generation.is_favorite as i64,
                generation.auto_tagged as i64,
                generation.rating.clamp(0, 5),
                generation.model_id.clone(),
                generation.params_json.clone(),
                generation.parent_uuid.clone()
            ],
        )
        .await?;
    Ok(())
}

/**
 * Ensambla la vista de Dashboard: fila + fusión de params + tags.
 * Fusión: 'params_json' crudo como base, columnas canónicas encima.
 */
async fn assemble_record(
    reader: &Connection,
    row: &Row,
) -> Result<GenerationRecord, StoreError> {
    let generation_row_id = row.get::<i64>(0)?;
    let uuid = row.get::<String>(1)?;
    let file_path = row.get::<String>(2)?;

    let file_name = file_path
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_path.as_str())
        .to_string();

    let mut params_object = serde_json::from_str::<serde_json::Value>(&row_text(row, 14))
        .ok()
        .filter(serde_json::Value::is_object)
        .unwrap_or_else(|| serde_json::json!({}));

    params_object["prompt"] = serde_json::Value::from(row_text(row, 4));
    params_object["negative_prompt"] = serde_json::Value::from(row_text(row, 5));
    params_object["seed"] = serde_json::Value::from(row_integer(row, 6, 0));
    params_object["width"] = serde_json::Value::from(row_integer(row, 7, 0));
    params_object["height"] = serde_json::Value::from(row_integer(row, 8, 0));
    params_object["steps"] = serde_json::Value::from(row_integer(row, 9, 0));
    params_object["cfg_scale"] = serde_json::Value::from(row_real(row, 10, 0.0));
    params_object["model_id"] = serde_json::Value::from(row_text(row, 11));

    let mut tag_rows = reader
        .query(SELECT_TAGS_FOR_GENERATION, params![generation_row_id])
        .await?;
    let mut tag_names = Vec::new();
    while let Some(tag_row) = tag_rows.next().await? {
        tag_names.push(tag_row.get::<String>(0)?);
    }

    Ok(GenerationRecord {
        id: uuid,
        name: file_name,
        file_path,
        timestamp: row_text(row, 3),
        params: params_object,
        is_favorite: row_integer(row, 12, 0) != 0,
        rating: row_integer(row, 13, 0),
        tags: tag_names,
    })
}

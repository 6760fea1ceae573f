// [libs/infra/db/src/repositories/tags.rs]
/*!
 * =================================================================
 * APARATO: TAG GRAPH REPOSITORY (V3.1 - ORPHAN SWEEPER)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: ARISTAS (GENERACIÓN, TAG) Y RECOLECCIÓN DE HUÉRFANOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SET INVARIANT: El catálogo de tags es exactamente el conjunto de
 *    etiquetas referenciadas por al menos una arista; cada borrado de
 *    arista dispara la recolección.
 * 2. UNLOCKED HELPERS: Los helpers '_unlocked' asumen que la llamante
 *    posee la puerta de escritura; jamás re-adquieren el cerrojo.
 * =================================================================
 */

use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::repositories::row_text;
use libsql::{params, Connection};
use mysti_domain_models::TagSummary;
use tracing::{debug, instrument};

const SELECT_TAG_SUMMARY: &str = r#"
    SELECT t.name, t.category, COUNT(it.tag_id) as count
    FROM tags t
    LEFT JOIN image_tags it ON t.id = it.tag_id
    GROUP BY t.id
    ORDER BY count DESC
"#;

const DELETE_ORPHAN_TAGS: &str =
    "DELETE FROM tags WHERE id NOT IN (SELECT DISTINCT tag_id FROM image_tags)";

/**
 * Repositorio del grafo de etiquetas.
 */
#[derive(Clone)]
pub struct TagRepository {
    store: StoreClient,
}

impl TagRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Catálogo con cardinalidad de uso, descendente.
    pub async fn summary(&self) -> Result<Vec<TagSummary>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader.query(SELECT_TAG_SUMMARY, ()).await?;
        let mut summaries = Vec::new();
        while let Some(row) = rows.next().await? {
            summaries.push(TagSummary {
                name: row.get::<String>(0)?,
                category: row_text(&row, 1),
                count: row.get::<i64>(2)?,
            });
        }
        Ok(summaries)
    }

    /// Vincula una etiqueta a la generación identificada por UUID.
    #[instrument(skip(self))]
    pub async fn add_to_generation(
        &self,
        uuid: &str,
        tag_name: &str,
        tag_source: &str,
    ) -> Result<(), StoreError> {
        let writer = self.store.writer().await;

        let mut id_rows = writer
            .query("SELECT id FROM generations WHERE uuid = ?1", params![uuid])
            .await?;
        let Some(id_row) = id_rows.next().await? else {
            return Err(StoreError::RowNotFound);
        };
        let generation_row_id = id_row.get::<i64>(0)?;

        link_tag_unlocked(&writer, generation_row_id, tag_name, tag_source).await
    }

    /// Vincula una etiqueta por id interno de fila (ruta del tagger).
    pub async fn add_by_generation_id(
        &self,
        generation_row_id: i64,
        tag_name: &str,
        tag_source: &str,
    ) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        link_tag_unlocked(&writer, generation_row_id, tag_name, tag_source).await
    }

    /// Retira la arista y recolecta huérfanos en la misma secuencia.
    #[instrument(skip(self))]
    pub async fn remove_from_generation(
        &self,
        uuid: &str,
        tag_name: &str,
    ) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                r#"DELETE FROM image_tags
                   WHERE generation_id = (SELECT id FROM generations WHERE uuid = ?1)
                     AND tag_id = (SELECT id FROM tags WHERE name = ?2)"#,
                params![uuid, tag_name],
            )
            .await?;
        collect_orphans_unlocked(&writer).await
    }

    /// Barrido explícito de etiquetas sin aristas.
    pub async fn collect_orphans(&self) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        collect_orphans_unlocked(&writer).await
    }
}

/// Inserta tag + arista sin adquirir la puerta (la llamante la posee).
pub(crate) async fn link_tag_unlocked(
    connection: &Connection,
    generation_row_id: i64,
    tag_name: &str,
    tag_source: &str,
) -> Result<(), StoreError> {
    connection
        .execute(
            "INSERT OR IGNORE INTO tags (name) VALUES (?1)",
            params![tag_name],
        )
        .await?;

    let mut tag_rows = connection
        .query("SELECT id FROM tags WHERE name = ?1", params![tag_name])
        .await?;
    let Some(tag_row) = tag_rows.next().await? else {
        return Err(StoreError::RowNotFound);
    };
    let tag_id = tag_row.get::<i64>(0)?;

    connection
        .execute(
            "INSERT OR IGNORE INTO image_tags (generation_id, tag_id, source) VALUES (?1, ?2, ?3)",
            params![generation_row_id, tag_id, tag_source],
        )
        .await?;

    debug!("🏷️ [TAGS]: Edge ({}, {}) linked as '{}'.", generation_row_id, tag_name, tag_source);
    Ok(())
}

/// Barrido de huérfanos sin adquirir la puerta.
pub(crate) async fn collect_orphans_unlocked(connection: &Connection) -> Result<(), StoreError> {
    connection.execute(DELETE_ORPHAN_TAGS, ()).await?;
    Ok(())
}

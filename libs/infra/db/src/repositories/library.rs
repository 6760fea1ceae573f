// [libs/infra/db/src/repositories/library.rs]
/*!
 * =================================================================
 * APARATO: PROMPT LIBRARY REPOSITORY (V3.0)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: FRAGMENTOS DE PROMPT CATALOGADOS Y SU CONTADOR DE USO
 * =================================================================
 */

use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::repositories::row_text;
use libsql::params;
use mysti_domain_models::LibraryItem;

#[derive(Clone)]
pub struct LibraryRepository {
    store: StoreClient,
}

impl LibraryRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    pub async fn add(&self, item: &LibraryItem) -> Result<i64, StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "INSERT INTO prompt_library (label, content, category, preview_path) VALUES (?1, ?2, ?3, ?4)",
                params![
                    item.label.clone(),
                    item.content.clone(),
                    item.category.clone(),
                    item.preview_path.clone()
                ],
            )
            .await?;
        Ok(writer.last_insert_rowid())
    }

    /// Lista opcionalmente filtrada por categoría, ordenada por etiqueta.
    pub async fn list(&self, category: &str) -> Result<Vec<LibraryItem>, StoreError> {
        let reader = self.store.reader()?;

        let mut rows = if category.is_empty() {
            reader
                .query(
                    "SELECT id, label, content, category, preview_path, usage_count FROM prompt_library ORDER BY label ASC",
                    (),
                )
                .await?
        } else {
            reader
                .query(
                    "SELECT id, label, content, category, preview_path, usage_count FROM prompt_library WHERE category = ?1 ORDER BY label ASC",
                    params![category],
                )
                .await?
        };

        let mut items = Vec::new();
        while let Some(row) = rows.next().await? {
            items.push(LibraryItem {
                id: row.get::<i64>(0)?,
                label: row.get::<String>(1)?,
                content: row.get::<String>(2)?,
                category: row_text(&row, 3),
                preview_path: row_text(&row, 4),
                usage_count: row.get::<i64>(5)?,
            });
        }
        Ok(items)
    }

    pub async fn delete(&self, item_id: i64) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute("DELETE FROM prompt_library WHERE id = ?1", params![item_id])
            .await?;
        Ok(())
    }

    pub async fn increment_usage(&self, item_id: i64) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "UPDATE prompt_library SET usage_count = usage_count + 1 WHERE id = ?1",
                params![item_id],
            )
            .await?;
        Ok(())
    }
}

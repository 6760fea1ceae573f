// [libs/infra/db/src/repositories/styles.rs]
/*!
 * =================================================================
 * APARATO: STYLE REPOSITORY (V3.0)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: PERSISTENCIA DE MODIFICADORES DE PROMPT
 * =================================================================
 */

use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::repositories::row_text;
use libsql::params;
use mysti_domain_models::Style;

#[derive(Clone)]
pub struct StyleRepository {
    store: StoreClient,
}

impl StyleRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    /// Alta o actualización por nombre (upsert).
    pub async fn save(&self, style: &Style) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "INSERT OR REPLACE INTO styles (name, prompt, negative_prompt, preview_path) VALUES (?1, ?2, ?3, ?4)",
                params![
                    style.name.clone(),
                    style.prompt.clone(),
                    style.negative_prompt.clone(),
                    style.preview_path.clone()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn list(&self) -> Result<Vec<Style>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader
            .query(
                "SELECT name, prompt, negative_prompt, preview_path FROM styles ORDER BY name ASC",
                (),
            )
            .await?;
        let mut styles = Vec::new();
        while let Some(row) = rows.next().await? {
            styles.push(Style {
                name: row.get::<String>(0)?,
                prompt: row.get::<String>(1)?,
                negative_prompt: row_text(&row, 2),
                preview_path: row_text(&row, 3),
            });
        }
        Ok(styles)
    }

    pub async fn delete(&self, style_name: &str) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute("DELETE FROM styles WHERE name = ?1", params![style_name])
            .await?;
        Ok(())
    }
}

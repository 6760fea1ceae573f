// [libs/infra/db/src/repositories/presets.rs]
/*!
 * =================================================================
 * APARATO: PRESET REPOSITORY (V3.1 - COMPONENT BUNDLES)
 * CLASIFICACIÓN: INFRASTRUCTURE LAYER (ESTRATO L3)
 * RESPONSABILIDAD: PRESETS DE IMAGEN Y DE LENGUAJE
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. EMPTY-STRING PARITY: Las rutas omitidas persisten como '' y
 *    regresan como '', nunca como null.
 * 2. MEASURED LEDGER: La huella medida se sella tras la primera carga
 *    real del preset.
 * =================================================================
 */

use crate::client::StoreClient;
use crate::errors::StoreError;
use crate::repositories::{row_integer, row_text};
use libsql::params;
use mysti_domain_models::{ImagePreset, LlmPreset};

fn json_or_empty_object(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::json!({}))
}

#[derive(Clone)]
pub struct PresetRepository {
    store: StoreClient,
}

impl PresetRepository {
    pub fn new(store: StoreClient) -> Self {
        Self { store }
    }

    // --- ESTRATO DE IMAGEN ---

    /// Upsert de un preset de imagen; id 0 delega en el AUTOINCREMENT.
    pub async fn save_image_preset(&self, preset: &ImagePreset) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        let row_id: Option<i64> = (preset.id > 0).then_some(preset.id);
        writer
            .execute(
                r#"INSERT OR REPLACE INTO image_presets (
                    id, name, unet_path, vae_path, clip_l_path, clip_g_path, t5xxl_path,
                    vram_weights_mb_estimate, vram_weights_mb_measured, default_params, preferred_params
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)"#,
                params![
                    row_id,
                    preset.name.clone(),
                    preset.unet_path.clone(),
                    preset.vae_path.clone(),
                    preset.clip_l_path.clone(),
                    preset.clip_g_path.clone(),
                    preset.t5xxl_path.clone(),
                    preset.vram_weights_mb_estimate,
                    preset.vram_weights_mb_measured,
                    preset.default_params.to_string(),
                    preset.preferred_params.to_string()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn list_image_presets(&self) -> Result<Vec<ImagePreset>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader
            .query(
                r#"SELECT id, name, unet_path, vae_path, clip_l_path, clip_g_path, t5xxl_path,
                          vram_weights_mb_estimate, vram_weights_mb_measured, default_params, preferred_params
                   FROM image_presets ORDER BY name ASC"#,
                (),
            )
            .await?;
        let mut presets = Vec::new();
        while let Some(row) = rows.next().await? {
            presets.push(ImagePreset {
                id: row.get::<i64>(0)?,
                name: row.get::<String>(1)?,
                unet_path: row_text(&row, 2),
                vae_path: row_text(&row, 3),
                clip_l_path: row_text(&row, 4),
                clip_g_path: row_text(&row, 5),
                t5xxl_path: row_text(&row, 6),
                vram_weights_mb_estimate: row_integer(&row, 7, 0),
                vram_weights_mb_measured: row_integer(&row, 8, 0),
                default_params: json_or_empty_object(&row_text(&row, 9)),
                preferred_params: json_or_empty_object(&row_text(&row, 10)),
            });
        }
        Ok(presets)
    }

    pub async fn delete_image_preset(&self, preset_id: i64) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute("DELETE FROM image_presets WHERE id = ?1", params![preset_id])
            .await?;
        Ok(())
    }

    /// Sella la huella real observada tras una carga exitosa.
    pub async fn record_measured_vram(
        &self,
        preset_id: i64,
        measured_mb: i64,
    ) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute(
                "UPDATE image_presets SET vram_weights_mb_measured = ?1 WHERE id = ?2",
                params![measured_mb, preset_id],
            )
            .await?;
        Ok(())
    }

    // --- ESTRATO DE LENGUAJE ---

    pub async fn save_llm_preset(&self, preset: &LlmPreset) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        let row_id: Option<i64> = (preset.id > 0).then_some(preset.id);
        writer
            .execute(
                r#"INSERT OR REPLACE INTO llm_presets (
                    id, name, model_path, mmproj_path, n_ctx, capabilities, role
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"#,
                params![
                    row_id,
                    preset.name.clone(),
                    preset.model_path.clone(),
                    preset.mmproj_path.clone(),
                    preset.n_ctx,
                    serde_json::to_string(&preset.capabilities)
                        .map_err(|fault| StoreError::MappingError(fault.to_string()))?,
                    preset.role.clone()
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn list_llm_presets(&self) -> Result<Vec<LlmPreset>, StoreError> {
        let reader = self.store.reader()?;
        let mut rows = reader
            .query(
                "SELECT id, name, model_path, mmproj_path, n_ctx, capabilities, role FROM llm_presets ORDER BY name ASC",
                (),
            )
            .await?;
        let mut presets = Vec::new();
        while let Some(row) = rows.next().await? {
            let capabilities_raw = row_text(&row, 5);
            presets.push(LlmPreset {
                id: row.get::<i64>(0)?,
                name: row.get::<String>(1)?,
                model_path: row.get::<String>(2)?,
                mmproj_path: row_text(&row, 3),
                n_ctx: row_integer(&row, 4, 2048),
                capabilities: serde_json::from_str(&capabilities_raw).unwrap_or_default(),
                role: row_text(&row, 6),
            });
        }
        Ok(presets)
    }

    pub async fn delete_llm_preset(&self, preset_id: i64) -> Result<(), StoreError> {
        let writer = self.store.writer().await;
        writer
            .execute("DELETE FROM llm_presets WHERE id = ?1", params![preset_id])
            .await?;
        Ok(())
    }
}

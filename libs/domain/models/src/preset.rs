// [libs/domain/models/src/preset.rs]
/*!
 * =================================================================
 * APARATO: MODEL PRESET BUNDLES (V3.0 - COMPONENT PATHS)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: PAQUETES NOMINADOS DE RUTAS DE MODELO Y DEFAULTS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. EMPTY-STRING PARITY: Las rutas omitidas viajan y persisten como
 *    cadena vacía, nunca como null (contrato con el Dashboard).
 * 2. VRAM LEDGER: Cada preset transporta su huella estimada y la huella
 *    medida tras la primera carga real.
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/**
 * Paquete de componentes del worker de difusión: UNet + codificadores de
 * texto + VAE, más parámetros por defecto y preferidos.
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImagePreset {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub unet_path: String,
    #[serde(default)]
    pub vae_path: String,
    #[serde(default)]
    pub clip_l_path: String,
    #[serde(default)]
    pub clip_g_path: String,
    #[serde(default)]
    pub t5xxl_path: String,
    /// Estimación por suma de tamaños de archivo (MB, +5% de margen).
    #[serde(default)]
    pub vram_weights_mb_estimate: i64,
    /// Huella real observada por el probe tras una carga exitosa.
    #[serde(default)]
    pub vram_weights_mb_measured: i64,
    #[serde(default)]
    pub default_params: serde_json::Value,
    #[serde(default)]
    pub preferred_params: serde_json::Value,
}

impl ImagePreset {
    /// Rutas de componente no vacías, en orden de carga del worker.
    pub fn component_paths(&self) -> Vec<&str> {
        [
            self.unet_path.as_str(),
            self.vae_path.as_str(),
            self.clip_l_path.as_str(),
            self.clip_g_path.as_str(),
            self.t5xxl_path.as_str(),
        ]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect()
    }
}

/// Preset simétrico para el worker de lenguaje.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmPreset {
    #[serde(default)]
    pub id: i64,
    pub name: String,
    pub model_path: String,
    /// Proyector de visión opcional (habilita el tagging multimodal).
    #[serde(default)]
    pub mmproj_path: String,
    #[serde(default = "default_context_window")]
    pub n_ctx: i64,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default = "default_llm_role")]
    pub role: String,
}

fn default_context_window() -> i64 {
    2048
}

fn default_llm_role() -> String {
    "Assistant".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn omitted_paths_round_trip_as_empty_strings() {
        let preset: ImagePreset =
            serde_json::from_str(r#"{"name":"SDXL Base","unet_path":"sdxl/unet.gguf"}"#)
                .expect("sparse preset must hydrate");

        let serialized = serde_json::to_value(&preset).expect("serialization is infallible");
        assert_eq!(serialized["vae_path"], "");
        assert_eq!(serialized["t5xxl_path"], "");
        assert_eq!(preset.component_paths(), vec!["sdxl/unet.gguf"]);
    }

    #[test]
    fn llm_preset_defaults_are_applied() {
        let preset: LlmPreset =
            serde_json::from_str(r#"{"name":"Vision","model_path":"llm/qwen.gguf"}"#)
                .expect("sparse preset must hydrate");
        assert_eq!(preset.n_ctx, 2048);
        assert_eq!(preset.role, "Assistant");
        assert!(preset.capabilities.is_empty());
    }
}

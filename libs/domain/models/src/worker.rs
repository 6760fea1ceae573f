// [libs/domain/models/src/worker.rs]
/*!
 * =================================================================
 * APARATO: WORKER VITALS MODEL (V3.0 - HEALTH CONTRACT)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: FORMA CANÓNICA DE 'GET /internal/health'
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/// Identidad de cada proceso hijo supervisado.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    /// Worker de difusión (imágenes).
    Sd,
    /// Worker de lenguaje (chat, embeddings, tagging).
    Llm,
}

impl WorkerKind {
    pub fn label(&self) -> &'static str {
        match self {
            WorkerKind::Sd => "sd",
            WorkerKind::Llm => "llm",
        }
    }
}

/**
 * Signos vitales reportados por un worker en '/internal/health'.
 * Los campos opcionales solo aparecen cuando hay un modelo residente.
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerVitals {
    #[serde(default)]
    pub ok: bool,
    /// Hay pesos residentes en el dispositivo.
    #[serde(default)]
    pub loaded: bool,
    /// Huella de VRAM observada por el propio worker (GB).
    #[serde(default)]
    pub vram_gb: f32,
    #[serde(default)]
    pub model_path: String,
    /// Presencia de proyector multimodal: habilita el tagging por visión.
    #[serde(default)]
    pub mmproj_path: String,
}

impl WorkerVitals {
    /// El worker puede analizar píxeles (no solo texto).
    pub fn is_multimodal(&self) -> bool {
        self.loaded && !self.mmproj_path.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vitals_tolerate_minimal_health_payload() {
        let vitals: WorkerVitals =
            serde_json::from_str(r#"{"ok":true,"loaded":false,"vram_gb":0.0}"#)
                .expect("minimal payload must hydrate");
        assert!(vitals.ok);
        assert!(!vitals.is_multimodal());
    }

    #[test]
    fn multimodal_requires_loaded_weights() {
        let vitals = WorkerVitals {
            ok: true,
            loaded: false,
            mmproj_path: "mmproj.gguf".into(),
            ..Default::default()
        };
        assert!(!vitals.is_multimodal());
    }
}

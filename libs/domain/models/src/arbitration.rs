// [libs/domain/models/src/arbitration.rs]
/*!
 * =================================================================
 * APARATO: VRAM ARBITRATION CONTRACT (V3.1)
 * CLASIFICACIÓN: DOMAIN LAYER (ESTRATO L2)
 * RESPONSABILIDAD: ENTRADA/SALIDA DEL ÁRBITRO DE MEMORIA GPU
 * =================================================================
 */

use serde::{Deserialize, Serialize};

/**
 * Parámetros de admisión para una generación de imagen.
 */
#[derive(Debug, Clone, Default)]
pub struct ArbitrationRequest {
    /// Estimación total (base + overhead de resolución) en GB.
    pub estimated_total_needed_gb: f32,
    /// Superficie de la imagen solicitada en megapíxeles.
    pub megapixels: f32,
    /// Identificador del modelo activo (clave de la huella aprendida).
    pub model_id: String,
    /// Huella base conocida (preset medido); 0.0 delega en el ledger.
    pub base_gb_override: f32,
    /// Tamaño del codificador de texto, para descontar al recomendar
    /// CLIP-offload; 0.0 aplica el ahorro nominal.
    pub clip_size_gb: f32,
}

/**
 * Veredicto del árbitro. Un rechazo transporta cero compromiso.
 */
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArbitrationVerdict {
    /// La petición puede proceder bajo la VRAM actual.
    pub admit: bool,
    /// Sugerencia al worker: colocar el codificador de texto en CPU.
    pub request_clip_offload: bool,
    /// Sugerencia al worker: decodificar el VAE por teselas.
    pub request_vae_tiling: bool,
    /// GB comprometidos en el acumulador; deben liberarse al terminar.
    pub committed_gb: f32,
    /// Razón humana del rechazo (viaja en el 503).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
}

impl ArbitrationVerdict {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            admit: false,
            reason: reason.into(),
            ..Default::default()
        }
    }
}

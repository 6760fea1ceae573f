// [apps/orchestrator/src/state/load_state.rs]
/*!
 * =================================================================
 * APARATO: MODEL LOAD-STATE VAULT (V4.0 - RECOVERY CAPSULE)
 * CLASIFICACIÓN: APPLICATION STATE (ESTRATO L1-APP)
 * RESPONSABILIDAD: CAPTURA DEL ÚLTIMO CUERPO DE CARGA EXITOSO
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. REPLAY CONTRACT: El cuerpo capturado se reproduce tal cual tras un
 *    crash; capturar solo ocurre tras un 200 del worker.
 * 2. SAFE-MODE LATCH: 'clear' desarma la recuperación automática; una
 *    captura posterior (carga exitosa del cliente) la rearma.
 * =================================================================
 */

use std::sync::Mutex;
use std::time::Instant;

/// Cápsula de recuperación: cuerpo verbatim + instante de captura.
#[derive(Debug, Clone)]
pub struct LoadState {
    pub body: String,
    pub set_at: Instant,
}

/**
 * Bóveda del último cuerpo de carga de modelo por worker.
 * Operaciones explícitas: 'capture', 'clear', 'peek'.
 */
#[derive(Debug, Default)]
pub struct LoadStateVault {
    capsule: Mutex<Option<LoadState>>,
}

impl LoadStateVault {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sella un cuerpo de carga que el worker aceptó con 200.
    pub fn capture(&self, load_request_body: impl Into<String>) {
        let mut capsule_guard = self.capsule.lock().expect("load-state lock poisoned");
        *capsule_guard = Some(LoadState {
            body: load_request_body.into(),
            set_at: Instant::now(),
        });
    }

    /// Desarma la recuperación automática (modo seguro).
    pub fn clear(&self) {
        let mut capsule_guard = self.capsule.lock().expect("load-state lock poisoned");
        *capsule_guard = None;
    }

    /// Copia del cuerpo capturado, si existe.
    pub fn peek(&self) -> Option<String> {
        let capsule_guard = self.capsule.lock().expect("load-state lock poisoned");
        capsule_guard.as_ref().map(|capsule| capsule.body.clone())
    }

    /// Identificador de modelo dentro del cuerpo capturado, si parsea.
    pub fn peek_model_id(&self) -> Option<String> {
        let body = self.peek()?;
        let parsed = serde_json::from_str::<serde_json::Value>(&body).ok()?;
        parsed
            .get("model_id")
            .and_then(|value| value.as_str())
            .map(str::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capture_peek_clear_cycle() {
        let vault = LoadStateVault::new();
        assert!(vault.peek().is_none());

        vault.capture(r#"{"model_id":"sdxl.gguf"}"#);
        assert_eq!(vault.peek().as_deref(), Some(r#"{"model_id":"sdxl.gguf"}"#));
        assert_eq!(vault.peek_model_id().as_deref(), Some("sdxl.gguf"));

        vault.clear();
        assert!(vault.peek().is_none());
        assert!(vault.peek_model_id().is_none());
    }
}

// [apps/orchestrator/src/lib.rs]
/*!
 * =================================================================
 * APARATO: ORCHESTRATOR LIBRARY ROOT (V4.0 - UNIFIED SURFACE)
 * CLASIFICACIÓN: CRATE ROOT (ESTRATO L1-APP)
 * RESPONSABILIDAD: DEFINICIÓN SUPREMA DEL ÁRBOL DE MÓDULOS
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. MODULE HIERARCHY: Autoridad única de módulos para que 'crate::'
 *    resuelva determinista en la librería y el binario.
 * 2. PUBLIC INTERFACE: 'prelude' expone lo mínimo para la ignición del
 *    Kernel desde 'main.rs' y para los tests espejo.
 * =================================================================
 */

// --- ESTRATO DE ARRANQUE Y CONFIGURACIÓN ---
/// Banderas de línea de comandos y derivación de argv de workers.
pub mod config;
/// Núcleo de mando: ignición de workers, daemons y transporte HTTP.
pub mod kernel;

// --- ESTRATO DE DATOS Y ESTADO (L1-APP) ---
/// Placa base neural: repositorios, árbitro, bus y bóvedas de carga.
pub mod state;

// --- ESTRATO DE TRANSPORTE Y ACCIÓN ---
/// Adaptadores de entrada para ráfagas HTTP y WebSockets.
pub mod handlers;
/// Reenviador transparente con soporte de cuerpos en streaming.
pub mod proxy;
/// Topología de rutas públicas y escudo CORS.
pub mod routes;

// --- ESTRATO DE DAEMONS ---
/// Bucles de fondo: salud, tagging, jobs, métricas, importación.
pub mod services;

/**
 * PRELUDIO DEL ORQUESTADOR
 *
 * Re-exportación estratégica para la ignición mínima del sistema.
 */
pub mod prelude {
    pub use crate::config::OrchestratorConfig;
    pub use crate::kernel::OrchestratorKernel;
    pub use crate::state::AppState;
}

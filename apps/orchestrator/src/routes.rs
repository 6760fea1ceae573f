// [apps/orchestrator/src/routes.rs]
/*!
 * =================================================================
 * APARATO: PUBLIC ROUTING MATRIX (V4.3 - UNIFIED SURFACE)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: TOPOLOGÍA DE LA SUPERFICIE HTTP PÚBLICA
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. THREE STRATA: proxy fino (espejo del worker), proxy interceptor
 *    (captura de estado) y endpoints respaldados por el ledger.
 * 2. SPA DISCIPLINE: '/app' sirve los activos estáticos con fallback a
 *    'index.html' para rutas de cliente desconocidas.
 * 3. OPEN SHIELD: CORS permisivo (la UI local y las herramientas de
 *    operador golpean desde orígenes arbitrarios); el preflight se
 *    corto-circuita en la capa CORS.
 * =================================================================
 */

use crate::handlers::{
    generate, history, library, metadata, passthrough, presets, stream, styles, tools,
};
use crate::state::AppState;
use axum::extract::DefaultBodyLimit;
use axum::response::Redirect;
use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};

/// Tope de cuerpo entrante: las ediciones de imagen viajan en base64.
const REQUEST_BODY_LIMIT_BYTES: usize = 64 * 1024 * 1024;

/**
 * Construye el router público completo del orquestador.
 */
pub fn create_public_router(application_shared_state: AppState) -> Router {
    // Escudo de red: la UI y las herramientas de operador son locales.
    let permissive_cors_shield = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ESTRATO SPA: activos estáticos con fallback a index.html.
    let app_dir = application_shared_state.config.app_dir.clone();
    let spa_index = std::path::Path::new(&app_dir).join("index.html");
    let spa_service = ServeDir::new(&app_dir).not_found_service(ServeFile::new(spa_index));

    // ESTRATO DE PROXY FINO: espejo de las superficies de los workers.
    let thin_proxy_stratum = Router::new()
        .route("/v1/models", get(passthrough::proxy_sd))
        .route("/v1/config", get(passthrough::proxy_sd).post(passthrough::proxy_sd))
        .route("/v1/progress", get(passthrough::proxy_sd))
        .route("/v1/stream/progress", get(passthrough::proxy_sd))
        .route("/v1/models/unload", post(passthrough::proxy_sd))
        .route("/v1/models/offload", post(passthrough::proxy_sd))
        .route("/v1/upscale/load", post(passthrough::proxy_sd))
        .route("/v1/images/upscale", post(passthrough::proxy_sd))
        .route("/v1/images/edits", post(passthrough::proxy_sd))
        .route("/v1/llm/models", get(passthrough::proxy_llm))
        .route("/v1/chat/completions", post(passthrough::proxy_llm))
        .route("/v1/completions", post(passthrough::proxy_llm))
        .route("/v1/embeddings", post(passthrough::proxy_llm))
        .route("/v1/tokenize", post(passthrough::proxy_llm))
        .route("/v1/detokenize", post(passthrough::proxy_llm))
        .route("/v1/llm/unload", post(passthrough::proxy_llm))
        .route("/v1/llm/offload", post(passthrough::proxy_llm));

    // ESTRATO INTERCEPTOR: reenvío + captura de estado de recuperación.
    let intercepting_stratum = Router::new()
        .route("/v1/models/load", post(passthrough::intercept_sd_load))
        .route("/v1/llm/load", post(passthrough::intercept_llm_load))
        .route("/v1/images/generations", post(generate::handle_generate));

    // ESTRATO DE LEDGER: historial, estilos, presets, metadatos, tools.
    let library_stratum = Router::new()
        .route("/v1/history/images", get(history::list_images))
        .route("/v1/history/images/:uuid", delete(history::delete_image))
        .route(
            "/v1/history/tags",
            get(history::list_tags)
                .post(history::add_tag)
                .delete(history::remove_tag),
        )
        .route("/v1/history/tags/cleanup", post(history::cleanup_tags))
        .route("/v1/history/favorite", post(history::set_favorite))
        .route("/v1/history/rating", post(history::set_rating))
        .route(
            "/v1/styles",
            get(styles::list_styles)
                .post(styles::save_style)
                .delete(styles::delete_style),
        )
        .route("/v1/styles/extract", post(styles::extract_styles))
        .route("/v1/styles/previews/fix", post(styles::fix_previews))
        .route(
            "/v1/presets/image",
            get(presets::list_image_presets).post(presets::save_image_preset),
        )
        .route("/v1/presets/image/load", post(presets::load_image_preset))
        .route("/v1/presets/image/:id", delete(presets::delete_image_preset))
        .route(
            "/v1/presets/llm",
            get(presets::list_llm_presets).post(presets::save_llm_preset),
        )
        .route("/v1/presets/llm/:id", delete(presets::delete_llm_preset))
        .route(
            "/v1/models/metadata",
            get(metadata::list_metadata).post(metadata::save_metadata),
        )
        .route("/v1/models/metadata/*model_id", get(metadata::get_metadata))
        .route("/v1/library", get(library::list_items).post(library::add_item))
        .route("/v1/library/:id", delete(library::delete_item))
        .route("/v1/library/:id/use", post(library::mark_item_used))
        .route("/v1/tools/execute", post(tools::execute_tool));

    // COMPOSICIÓN GLOBAL (Root Topology)
    Router::new()
        .route("/", get(|| async { Redirect::permanent("/app/") }))
        .nest_service("/app", spa_service)
        .route("/health", get(passthrough::health_summary))
        .route("/outputs/*path", get(passthrough::serve_outputs))
        .merge(thin_proxy_stratum)
        .merge(intercepting_stratum)
        .merge(library_stratum)
        .layer(DefaultBodyLimit::max(REQUEST_BODY_LIMIT_BYTES))
        .layer(permissive_cors_shield)
        .with_state(application_shared_state)
}

/**
 * Router del canal WebSocket (puerto+3, loopback): push-only.
 */
pub fn create_websocket_router(application_shared_state: AppState) -> Router {
    Router::new()
        .route("/", get(stream::establish_metrics_uplink))
        .with_state(application_shared_state)
}

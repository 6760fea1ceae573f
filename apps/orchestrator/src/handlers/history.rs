// [apps/orchestrator/src/handlers/history.rs]
/*!
 * =================================================================
 * APARATO: HISTORY & TAG HANDLERS (V4.2 - LIBRARY FACADE)
 * CLASIFICACIÓN: API ADAPTER LAYER (ESTRATO L4)
 * RESPONSABILIDAD: HISTORIAL DE GENERACIONES, TAGS, FAVORITOS Y RATING
 *
 * VISION HIPER-HOLÍSTICA 2026:
 * 1. SENTINEL DEGRADATION: Un fallo de lectura degrada a arreglo vacío;
 *    un fallo de escritura no crítico se registra y se descarta.
 * 2. FILE HYGIENE: El borrado con 'delete_file=true' retira la imagen y
 *    sus sidecars '.json'/'.txt' antes de purgar la fila.
 * =================================================================
 */

use crate::handlers::{error_response, parse_query_pairs, success_response};
use crate::state::AppState;
use axum::extract::{Path, RawQuery, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
pub struct TagMutationBody {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub tag: String,
}

#[derive(Debug, Deserialize)]
pub struct FavoriteBody {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub favorite: bool,
}

#[derive(Debug, Deserialize)]
pub struct RatingBody {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub rating: i64,
}

/**
 * GET /v1/history/images — historial filtrado.
 * Parámetros: limit, offset, tag (multivaluado, semántica AND), model,
 * min_rating.
 */
pub async fn list_images(State(state): State<AppState>, RawQuery(raw_query): RawQuery) -> Response {
    let pairs = parse_query_pairs(raw_query.as_deref().unwrap_or(""));

    let mut limit: i64 = 50;
    let mut offset: i64 = 0;
    let mut min_rating: i64 = 0;
    let mut model_id = String::new();
    let mut tag_filters: Vec<String> = Vec::new();

    for (key, value) in pairs {
        match key.as_str() {
            "limit" => limit = value.parse().unwrap_or(50),
            "offset" => offset = value.parse().unwrap_or(0),
            "min_rating" => min_rating = value.parse().unwrap_or(0),
            "model" => model_id = value,
            "tag" | "tag[]" => {
                if !value.is_empty() {
                    tag_filters.push(value)
                }
            }
            _ => {}
        }
    }

    match state
        .generations
        .list_filtered(limit, offset, &tag_filters, &model_id, min_rating)
        .await
    {
        Ok(records) => Json(records).into_response(),
        Err(fault) => {
            warn!("🗂️ [HISTORY]: Listing degraded to empty: {}", fault);
            Json(Vec::<mysti_domain_models::GenerationRecord>::new()).into_response()
        }
    }
}

/**
 * DELETE /v1/history/images/:uuid — purga la fila (las aristas caen en
 * cascada) y, con 'delete_file=true', también la imagen y sus sidecars.
 */
pub async fn delete_image(
    State(state): State<AppState>,
    Path(uuid): Path<String>,
    RawQuery(raw_query): RawQuery,
) -> Response {
    let delete_file = parse_query_pairs(raw_query.as_deref().unwrap_or(""))
        .into_iter()
        .any(|(key, value)| key == "delete_file" && value == "true");

    if delete_file {
        if let Ok(Some(file_url)) = state.generations.filepath(&uuid).await {
            remove_output_artifacts(&state.config.output_dir, &file_url).await;
        }
    }

    if let Err(fault) = state.generations.remove(&uuid).await {
        warn!("🗂️ [HISTORY]: Delete dropped for [{}]: {}", uuid, fault);
    }
    success_response()
}

/// Retira la imagen y los sidecars '.json'/'.txt' del directorio de salidas.
async fn remove_output_artifacts(output_dir: &str, file_url: &str) {
    let Some(relative_name) = file_url.strip_prefix("/outputs/") else {
        return;
    };
    let image_path = std::path::Path::new(output_dir).join(relative_name);

    if tokio::fs::remove_file(&image_path).await.is_ok() {
        info!("🗂️ [HISTORY]: Output file [{}] removed.", image_path.display());
    }
    for sidecar_extension in ["json", "txt"] {
        let sidecar_path = image_path.with_extension(sidecar_extension);
        let _ = tokio::fs::remove_file(&sidecar_path).await;
    }
}

/// GET /v1/history/tags — catálogo con cardinalidad.
pub async fn list_tags(State(state): State<AppState>) -> Response {
    match state.tags.summary().await {
        Ok(summaries) => Json(summaries).into_response(),
        Err(fault) => {
            warn!("🏷️ [HISTORY]: Tag listing degraded to empty: {}", fault);
            Json(Vec::<mysti_domain_models::TagSummary>::new()).into_response()
        }
    }
}

/// POST /v1/history/tags — vincula una etiqueta manual.
pub async fn add_tag(
    State(state): State<AppState>,
    Json(body): Json<TagMutationBody>,
) -> Response {
    if body.uuid.is_empty() || body.tag.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "uuid and tag are required");
    }
    if let Err(fault) = state.tags.add_to_generation(&body.uuid, &body.tag, "user").await {
        warn!("🏷️ [HISTORY]: Tag add dropped for [{}]: {}", body.uuid, fault);
    }
    success_response()
}

/// DELETE /v1/history/tags — retira la arista y barre huérfanos.
pub async fn remove_tag(
    State(state): State<AppState>,
    Json(body): Json<TagMutationBody>,
) -> Response {
    if body.uuid.is_empty() || body.tag.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "uuid and tag are required");
    }
    if let Err(fault) = state.tags.remove_from_generation(&body.uuid, &body.tag).await {
        warn!("🏷️ [HISTORY]: Tag removal dropped for [{}]: {}", body.uuid, fault);
    }
    success_response()
}

/// POST /v1/history/tags/cleanup — barrido explícito de huérfanos.
pub async fn cleanup_tags(State(state): State<AppState>) -> Response {
    if let Err(fault) = state.tags.collect_orphans().await {
        warn!("🏷️ [HISTORY]: Orphan sweep dropped: {}", fault);
    }
    success_response()
}

/// POST /v1/history/favorite
pub async fn set_favorite(
    State(state): State<AppState>,
    Json(body): Json<FavoriteBody>,
) -> Response {
    if body.uuid.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "uuid is required");
    }
    if let Err(fault) = state.generations.set_favorite(&body.uuid, body.favorite).await {
        warn!("🗂️ [HISTORY]: Favorite write dropped for [{}]: {}", body.uuid, fault);
    }
    success_response()
}

/// POST /v1/history/rating — el rango [0,5] se sella en el repositorio.
pub async fn set_rating(State(state): State<AppState>, Json(body): Json<RatingBody>) -> Response {
    if body.uuid.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "uuid is required");
    }
    if let Err(fault) = state.generations.set_rating(&body.uuid, body.rating).await {
        warn!("🗂️ [HISTORY]: Rating write dropped for [{}]: {}", body.uuid, fault);
    }
    success_response()
}

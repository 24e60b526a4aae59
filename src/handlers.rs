use crate::config::Config;
use crate::db_storage::RegistroStore;
use crate::errors::AppError;
use crate::importer::{import_rows, load_suggestions, rows_from_body, GestorCache};
use crate::models::*;
use crate::registro::RegistroInput;
use crate::session::SessionUser;
use crate::sheet::read_csv;
use axum::{
    body::Bytes,
    extract::{DefaultBodyLimit, Path, Query, State},
    http::StatusCode,
    routing::{delete, get, patch, post},
    Json, Router,
};
use chrono::Utc;
use moka::future::Cache;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

const NOT_FOUND_FOR_EDIT: &str =
    "Registro não encontrado ou você não tem permissão para editá-lo.";
const NOT_FOUND_FOR_DELETE: &str =
    "Registro não encontrado ou você não tem permissão para excluí-lo.";

/// Shared application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    /// Registro persistence.
    pub store: Arc<dyn RegistroStore>,
    /// Application configuration.
    pub config: Config,
    /// Produto → gestor suggestions.
    /// Invalidated whenever registros are inserted, edited or deleted.
    pub gestor_cache: GestorCache,
}

impl AppState {
    pub fn new(store: Arc<dyn RegistroStore>, config: Config) -> Self {
        let gestor_cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.gestor_cache_ttl_secs))
            .max_capacity(1)
            .build();

        Self {
            store,
            config,
            gestor_cache,
        }
    }
}

/// Routes that require a session. Bodies are capped at `max_upload_bytes`.
pub fn api_routes(max_upload_bytes: usize) -> Router<Arc<AppState>> {
    Router::new()
        .route(
            "/api/registros/import",
            post(import_records).delete(reset_registros),
        )
        .route("/api/registros", post(create_registro))
        .route(
            "/api/registros/:id",
            patch(update_registro).delete(delete_registro),
        )
        .route("/api/registros/import/csv", post(import_csv))
        .route("/api/registros/clear-mine", delete(clear_mine))
        .route("/api/gestores/sugestoes", get(gestor_suggestions))
        .route("/api/gestores/sugestao", get(suggest_gestor))
        .layer(DefaultBodyLimit::max(max_upload_bytes))
}

/// Full application router without the outer middleware stack.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(api_routes(state.config.max_upload_bytes))
        .with_state(state)
}

/// Health check endpoint.
pub async fn health() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "controladoria-api",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

/// POST /api/registros/import
///
/// Body: `{ "records": [ { "<header>": <cell>, ... }, ... ] }` as produced by the
/// spreadsheet parser in the browser. Rows are normalized and inserted as one batch.
pub async fn import_records(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    body: Bytes,
) -> Result<Json<ImportResponse>, AppError> {
    let body: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| AppError::invalid_format())?;
    let rows = rows_from_body(body)?;

    tracing::info!("POST /registros/import - {} row(s) from {}", rows.len(), user.id);

    let summary = import_rows(
        state.store.as_ref(),
        &state.config,
        Some(&state.gestor_cache),
        &rows,
        user.id,
    )
    .await?;
    Ok(Json(ImportResponse {
        success: true,
        summary,
    }))
}

/// POST /api/registros/import/csv
///
/// Raw CSV body with a header row. Same pipeline and response as the JSON route.
pub async fn import_csv(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    body: Bytes,
) -> Result<Json<ImportResponse>, AppError> {
    let rows = read_csv(&body)?;

    tracing::info!(
        "POST /registros/import/csv - {} byte(s), {} row(s) from {}",
        body.len(),
        rows.len(),
        user.id
    );

    let summary = import_rows(
        state.store.as_ref(),
        &state.config,
        Some(&state.gestor_cache),
        &rows,
        user.id,
    )
    .await?;
    Ok(Json(ImportResponse {
        success: true,
        summary,
    }))
}

/// POST /api/registros
///
/// Creates one registro from the registro form, owned by the caller.
pub async fn create_registro(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    body: Bytes,
) -> Result<(StatusCode, Json<RegistroResponse>), AppError> {
    let input = parse_registro(&body)?;
    let record = input.into_record(user.id, Utc::now().date_naive())?;

    let id = state.store.insert_one(&record).await?;
    state.gestor_cache.invalidate_all();

    tracing::info!("POST /registros - {} created by {}", id, user.id);

    Ok((
        StatusCode::CREATED,
        Json(RegistroResponse { success: true, id }),
    ))
}

/// PATCH /api/registros/:id
///
/// Regular users can only edit their own registros; admins can edit any.
pub async fn update_registro(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> Result<Json<RegistroResponse>, AppError> {
    let patch = parse_registro(&body)?.into_patch()?;
    if patch.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let updated = state.store.update(id, &patch, owner_scope(&user)).await?;
    if updated == 0 {
        return Err(AppError::NotFound(NOT_FOUND_FOR_EDIT.to_string()));
    }
    state.gestor_cache.invalidate_all();

    tracing::info!("PATCH /registros/{} by {}", id, user.id);

    Ok(Json(RegistroResponse { success: true, id }))
}

/// DELETE /api/registros/:id
pub async fn delete_registro(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteResponse>, AppError> {
    let count = state.store.delete_by_id(id, owner_scope(&user)).await?;
    if count == 0 {
        return Err(AppError::NotFound(NOT_FOUND_FOR_DELETE.to_string()));
    }
    state.gestor_cache.invalidate_all();

    tracing::info!("DELETE /registros/{} by {}", id, user.id);

    Ok(Json(DeleteResponse {
        success: true,
        count,
        message: None,
    }))
}

fn parse_registro(body: &[u8]) -> Result<RegistroInput, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::BadRequest(format!("Invalid registro: {}", e)))
}

/// Admins act on any registro; everyone else only on their own.
fn owner_scope(user: &SessionUser) -> Option<Uuid> {
    if user.is_admin() {
        None
    } else {
        Some(user.id)
    }
}

/// DELETE /api/registros/import
///
/// Removes every registro. Admin only.
pub async fn reset_registros(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
) -> Result<Json<DeleteResponse>, AppError> {
    user.require_admin()?;

    let count = state.store.delete_all().await?;
    state.gestor_cache.invalidate_all();

    tracing::warn!("DELETE /registros/import - {} registro(s) removed by {}", count, user.id);

    Ok(Json(DeleteResponse {
        success: true,
        count,
        message: None,
    }))
}

/// DELETE /api/registros/clear-mine
pub async fn clear_mine(
    State(state): State<Arc<AppState>>,
    user: SessionUser,
) -> Result<Json<DeleteResponse>, AppError> {
    let count = state.store.delete_owned_by(user.id).await?;
    state.gestor_cache.invalidate_all();

    tracing::info!("DELETE /registros/clear-mine - {} registro(s) of {}", count, user.id);

    Ok(Json(DeleteResponse {
        success: true,
        count,
        message: Some(format!("{} registros deletados com sucesso", count)),
    }))
}

/// GET /api/gestores/sugestoes
pub async fn gestor_suggestions(
    State(state): State<Arc<AppState>>,
    _user: SessionUser,
) -> Result<Json<BTreeMap<String, String>>, AppError> {
    let suggestions = load_suggestions(state.store.as_ref(), Some(&state.gestor_cache)).await?;
    Ok(Json(suggestions.as_map().clone()))
}

/// GET /api/gestores/sugestao?produto=...
pub async fn suggest_gestor(
    State(state): State<Arc<AppState>>,
    _user: SessionUser,
    Query(params): Query<GestorQueryParams>,
) -> Result<Json<GestorSuggestionResponse>, AppError> {
    let produto = params
        .produto
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| AppError::BadRequest("Parameter 'produto' is required".to_string()))?;

    let suggestions = load_suggestions(state.store.as_ref(), Some(&state.gestor_cache)).await?;
    let gestor = suggestions.predict(&produto).map(str::to_string);

    tracing::debug!("GET /gestores/sugestao - {} -> {:?}", produto, gestor);

    Ok(Json(GestorSuggestionResponse { produto, gestor }))
}

/**
 * Module Routes
 */
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{required, ApiError, ApiResult, MODULE_NOT_FOUND};
use crate::state::AppState;
use crate::store::models::{Module, NewModule, Page};

/// Request body for POST /api/modules
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateModuleRequest {
    pub project_id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
}

/// GET /api/modules/{id}
pub async fn get_module(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Module>> {
    state
        .store()
        .get_module(&id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(MODULE_NOT_FOUND))
}

/// GET /api/modules/{id}/pages
pub async fn get_module_pages(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Vec<Page>> {
    Json(state.store().get_module_pages(&id).await)
}

/// POST /api/modules - Create a module
pub async fn create_module(
    State(state): State<AppState>,
    payload: Result<Json<CreateModuleRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Module>)> {
    let Json(body) = payload?;
    let input = NewModule {
        project_id: required(body.project_id)?,
        name: required(body.name)?,
        description: required(body.description)?,
    };

    let module = state.store().create_module(input).await?;
    tracing::info!(module_id = %module.id, project_id = %module.project_id, "module created");
    Ok((StatusCode::CREATED, Json(module)))
}

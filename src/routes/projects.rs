/**
 * Project Routes
 * Project listing, nested lookup and creation
 */
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{required, ApiError, ApiResult, PROJECT_NOT_FOUND};
use crate::state::AppState;
use crate::store::models::{Module, NewProject, Project, ProjectWithModules};

/// Request body for POST /api/projects
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProjectRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
    pub project_type: Option<String>,
}

/// GET /api/projects - All projects with their modules and pages
pub async fn list_projects(State(state): State<AppState>) -> Json<Vec<ProjectWithModules>> {
    Json(state.store().list_projects().await)
}

/// GET /api/projects/{id} - One project, nested
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectWithModules>> {
    state
        .store()
        .get_project_nested(&id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(PROJECT_NOT_FOUND))
}

/// GET /api/projects/{id}/modules - Modules of a project
pub async fn get_project_modules(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<Vec<Module>> {
    Json(state.store().get_project_modules(&id).await)
}

/// POST /api/projects - Create a project
pub async fn create_project(
    State(state): State<AppState>,
    payload: Result<Json<CreateProjectRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Project>)> {
    let Json(body) = payload?;
    let input = NewProject {
        name: required(body.name)?,
        description: required(body.description)?,
        thumbnail: body.thumbnail,
        project_type: body.project_type,
    };

    let project = state.store().create_project(input).await?;
    tracing::info!(project_id = %project.id, name = %project.name, "project created");
    Ok((StatusCode::CREATED, Json(project)))
}

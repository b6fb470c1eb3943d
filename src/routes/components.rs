/**
 * Component Routes
 * Stored component source: lookup with the project-id fallback, listing, upsert
 */
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{required, ApiError, ApiResult, COMPONENT_NOT_FOUND};
use crate::state::AppState;
use crate::store::models::{ComponentRecord, SaveComponent};

/// Request body for POST /api/components
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveComponentRequest {
    pub project_type: Option<String>,
    pub component_name: Option<String>,
    pub content: Option<String>,
}

/// GET /api/components/{project_type}/{name}
pub async fn get_component(
    State(state): State<AppState>,
    Path((project_type, name)): Path<(String, String)>,
) -> ApiResult<Json<ComponentRecord>> {
    match state.catalog.find_component(&project_type, &name).await {
        Some(component) => Ok(Json(component)),
        None => {
            tracing::debug!(project_type = %project_type, component = %name, "component not found");
            Err(ApiError::NotFound(COMPONENT_NOT_FOUND))
        }
    }
}

/// GET /api/components/{project_type}
pub async fn list_components(
    State(state): State<AppState>,
    Path(project_type): Path<String>,
) -> Json<Vec<ComponentRecord>> {
    Json(state.store().list_components_by_type(&project_type).await)
}

/// POST /api/components - Upsert by (projectType, componentName)
pub async fn save_component(
    State(state): State<AppState>,
    payload: Result<Json<SaveComponentRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ComponentRecord>)> {
    let Json(body) = payload?;
    let input = SaveComponent {
        project_type: required(body.project_type)?,
        component_name: required(body.component_name)?,
        content: required(body.content)?,
    };

    let component = state.store().save_component(input).await?;
    tracing::info!(
        project_type = %component.project_type,
        component = %component.component_name,
        bytes = component.content.len(),
        "component saved"
    );
    Ok((StatusCode::CREATED, Json(component)))
}

/**
 * Page Routes
 */
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;

use super::{required, ApiError, ApiResult, PAGE_NOT_FOUND};
use crate::state::AppState;
use crate::store::models::{NewPage, Page};

/// Request body for POST /api/pages. `title` is accepted for `name`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePageRequest {
    pub module_id: Option<String>,
    #[serde(alias = "title")]
    pub name: Option<String>,
    pub description: Option<String>,
    pub component_path: Option<String>,
    /// Explicit namespace; derived when omitted.
    pub project_type: Option<String>,
}

/// GET /api/pages/{id}
pub async fn get_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Page>> {
    state
        .store()
        .get_page(&id)
        .await
        .map(Json)
        .ok_or(ApiError::NotFound(PAGE_NOT_FOUND))
}

/// POST /api/pages - Create a page, recording its component namespace
pub async fn create_page(
    State(state): State<AppState>,
    payload: Result<Json<CreatePageRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Page>)> {
    let Json(body) = payload?;
    let input = NewPage {
        module_id: required(body.module_id)?,
        name: required(body.name)?,
        description: required(body.description)?,
        component_path: required(body.component_path)?,
        project_type: body.project_type,
    };

    let page = state.catalog.create_page(input).await?;
    tracing::info!(
        page_id = %page.id,
        component = %page.component_path,
        project_type = page.project_type.as_deref().unwrap_or(""),
        "page created"
    );
    Ok((StatusCode::CREATED, Json(page)))
}

/**
 * Debug Routes
 * Read-only views for inspecting the catalog
 */
use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{ApiError, ApiResult, COMPONENT_NOT_FOUND, PROJECT_NOT_FOUND};
use crate::state::AppState;
use crate::store::models::{ComponentRecord, ProjectWithModules};

const PREVIEW_CHARS: usize = 200;

/// Component metadata without its source
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    pub id: String,
    pub project_type: String,
    pub component_name: String,
    pub content_length: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct ComponentListing {
    pub total: usize,
    pub components: Vec<ComponentSummary>,
}

/// Lengths are in UTF-16 code units so they agree with browser-side tooling.
fn utf16_len(s: &str) -> usize {
    s.encode_utf16().count()
}

/// First 200 characters followed by the full length.
fn preview(content: &str) -> String {
    if content.is_empty() {
        return String::new();
    }
    let head: String = content.chars().take(PREVIEW_CHARS).collect();
    format!("{}... ({} 字符)", head, utf16_len(content))
}

/// GET /api/debug/components
pub async fn list_components(State(state): State<AppState>) -> Json<ComponentListing> {
    let components: Vec<ComponentSummary> = state
        .store()
        .list_components()
        .await
        .into_iter()
        .map(|c| ComponentSummary {
            content_length: utf16_len(&c.content),
            id: c.id,
            project_type: c.project_type,
            component_name: c.component_name,
            created_at: c.created_at,
            updated_at: c.updated_at,
        })
        .collect();

    Json(ComponentListing {
        total: components.len(),
        components,
    })
}

/// GET /api/debug/components/{project_type}/{name} - direct lookup, content truncated
pub async fn get_component(
    State(state): State<AppState>,
    Path((project_type, name)): Path<(String, String)>,
) -> ApiResult<Json<ComponentRecord>> {
    let mut component = state
        .store()
        .get_component(&project_type, &name)
        .await
        .ok_or(ApiError::NotFound(COMPONENT_NOT_FOUND))?;
    component.content = preview(&component.content);
    Ok(Json(component))
}

/// GET /api/debug/projects/{id}
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::test_support::{get_json, post_json, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    #[test]
    fn test_preview_truncates_long_content() {
        let long = "a".repeat(250);
        assert_eq!(preview(&long), format!("{}... (250 字符)", "a".repeat(200)));
        assert_eq!(preview("short"), "short... (5 字符)");
        assert_eq!(preview(""), "");
    }

    #[tokio::test]
    async fn test_listing_reports_lengths() {
        let (_dir, _state, app) = test_app().await;
        post_json(
            &app,
            "/api/components",
            json!({"projectType": "t", "componentName": "C", "content": "12345"}),
        )
        .await;

        let (status, body) = get_json(&app, "/api/debug/components").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 2);
        let added = body["components"]
            .as_array()
            .unwrap()
            .iter()
            .find(|c| c["componentName"] == "C")
            .unwrap();
        assert_eq!(added["contentLength"], 5);
        assert!(added.get("content").is_none());
    }

    #[tokio::test]
    async fn test_debug_component_skips_fallback() {
        let (_dir, state, app) = test_app().await;
        let (status, body) = get_json(&app, "/api/debug/components/example/ExamplePage").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["content"].as_str().unwrap().ends_with("字符)"));

        let project = state.store().list_projects().await.remove(0).project;
        let (status, _) =
            get_json(&app, &format!("/api/debug/components/{}/ExamplePage", project.id)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, nested) = get_json(&app, &format!("/api/debug/projects/{}", project.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(nested["modules"].as_array().unwrap().len(), 1);
    }
}

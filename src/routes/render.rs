/**
 * Render Routes
 * Materialize a component and return its HTML. Query parameters become props.
 */
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
};
use serde_json::{Map, Value};
use std::collections::HashMap;

use crate::materializer::{not_found_panel, RenderOutcome};
use crate::state::AppState;

type RenderResponse = (StatusCode, Html<String>);

fn props_from_query(query: HashMap<String, String>) -> Value {
    Value::Object(
        query
            .into_iter()
            .map(|(key, value)| (key, Value::String(value)))
            .collect::<Map<String, Value>>(),
    )
}

fn respond(outcome: RenderOutcome) -> RenderResponse {
    match outcome {
        RenderOutcome::Html(body) => (StatusCode::OK, Html(body)),
        RenderOutcome::NotFound(body) => (StatusCode::NOT_FOUND, Html(body)),
        RenderOutcome::Unavailable(body) => (StatusCode::BAD_GATEWAY, Html(body)),
        RenderOutcome::Failed(body) => (StatusCode::UNPROCESSABLE_ENTITY, Html(body)),
    }
}

/// GET /api/render/{name} - namespace comes from the resolver
pub async fn render_by_name(
    State(state): State<AppState>,
    Path(name): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> RenderResponse {
    let namespace = state.resolver().resolve(&name).to_string();
    tracing::debug!(component = %name, namespace = %namespace, "resolved namespace");
    let outcome = state
        .materializer
        .render(&namespace, &name, &props_from_query(query))
        .await;
    respond(outcome)
}

/// GET /api/render/{project_type}/{name}
pub async fn render_component(
    State(state): State<AppState>,
    Path((project_type, name)): Path<(String, String)>,
    Query(query): Query<HashMap<String, String>>,
) -> RenderResponse {
    let outcome = state
        .materializer
        .render(&project_type, &name, &props_from_query(query))
        .await;
    respond(outcome)
}

/// GET /api/pages/{id}/render - uses the namespace recorded on the page
pub async fn render_page(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> RenderResponse {
    let Some(page) = state.store().get_page(&id).await else {
        return (StatusCode::NOT_FOUND, Html(not_found_panel(&id)));
    };
    let namespace = state.catalog.namespace_for_page(&page).await;
    let outcome = state
        .materializer
        .render(&namespace, &page.component_path, &props_from_query(query))
        .await;
    respond(outcome)
}

#[cfg(test)]
mod tests {
    use crate::routes::test_support::{get, post_json, test_app};
    use axum::http::StatusCode;
    use serde_json::json;

    #[tokio::test]
    async fn test_render_seed_component() {
        let (_dir, _state, app) = test_app().await;

        let (status, html) = get(&app, "/api/render/example/ExamplePage").await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.contains("<h2 class=\"text-xl font-bold mb-4\">示例页面</h2>"));
        assert!(html.contains("当前计数: 0"));
    }

    #[tokio::test]
    async fn test_render_by_name_uses_resolver() {
        let (_dir, _state, app) = test_app().await;
        post_json(
            &app,
            "/api/components",
            json!({
                "projectType": "user-auth",
                "componentName": "LoginPage",
                "content": "export default <form><h1>{props.greeting}</h1></form>"
            }),
        )
        .await;

        let (status, html) = get(&app, "/api/render/LoginPage?greeting=Hi%20%3Cyou%3E").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(html, "<form><h1>Hi &lt;you&gt;</h1></form>");
    }

    #[tokio::test]
    async fn test_malformed_component_renders_diagnostic_panel() {
        let (_dir, _state, app) = test_app().await;
        post_json(
            &app,
            "/api/components",
            json!({
                "projectType": "demo",
                "componentName": "Broken",
                "content": "export default <div>{doesNotExist}</div>"
            }),
        )
        .await;

        let (status, html) = get(&app, "/api/render/demo/Broken").await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert!(html.contains("组件解析失败"));
        assert!(html.contains("`doesNotExist` is not defined"));

        // The rest of the app keeps serving.
        let (status, _) = get(&app, "/api/render/example/ExamplePage").await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unknown_component_is_not_found_panel() {
        let (_dir, _state, app) = test_app().await;
        let (status, html) = get(&app, "/api/render/demo/Missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(html.contains("demo/Missing"));
    }

    #[tokio::test]
    async fn test_unreachable_catalog_is_bad_gateway() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = crate::config::ShowcaseConfig {
            data_file: dir.path().join("data.json"),
            manifest_dir: dir.path().join("manifests"),
            component_source: crate::config::SourceKind::Http,
            catalog_url: "http://127.0.0.1:9".to_string(),
            ..crate::config::ShowcaseConfig::default()
        };
        let state = crate::build_state(config).await.unwrap();
        let app = crate::create_app(state);

        let (status, html) = get(&app, "/api/render/example/ExamplePage").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert!(html.contains("无法加载组件"));
    }

    #[tokio::test]
    async fn test_render_page_uses_recorded_namespace() {
        let (_dir, state, app) = test_app().await;
        let page = state.store().list_projects().await.remove(0).modules.remove(0).pages.remove(0);

        let (status, html) = get(&app, &format!("/api/pages/{}/render", page.id)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(html.starts_with("<div class=\"p-4\">"));

        let (status, _) = get(&app, "/api/pages/nope/render").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}

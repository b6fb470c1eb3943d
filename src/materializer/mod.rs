//! Component Materializer
//!
//! Turns stored component source into a renderable unit. Compiled units are
//! cached per `"<projectType>/<componentName>"` for the life of the process and
//! deduplicated by content hash, so two keys with identical source share one
//! artifact. Failures are never cached.

pub mod compiler;
pub mod component;
pub mod eval;
pub mod source;

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use compiler::CompileError;
pub use component::{compile, content_hash, CompiledComponent};
pub use eval::{escape_html, Capabilities, EvalError};
pub use source::{CatalogSource, ComponentSource, FsSource, HttpSource, SourceError};

#[derive(Debug, thiserror::Error)]
pub enum MaterializeError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Eval(#[from] EvalError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("compilation did not finish within {0:?}")]
    Timeout(Duration),

    #[error("compilation task failed: {0}")]
    Task(String),
}

/// Resource limits for compiling and rendering a component.
#[derive(Debug, Clone, Copy)]
pub struct EvalLimits {
    /// Evaluation steps allowed for module evaluation and for each render.
    pub fuel: u64,
    /// Wall-clock bound on compilation.
    pub timeout: Duration,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            fuel: 100_000,
            timeout: Duration::from_millis(2000),
        }
    }
}

pub fn cache_key(project_type: &str, component_name: &str) -> String {
    format!("{}/{}", project_type, component_name)
}

/// Result of materializing one component.
#[derive(Debug, Clone)]
pub enum LoadState {
    Ready(Arc<CompiledComponent>),
    NotFound { key: String },
    /// The source could not be read; says nothing about the component itself.
    Unavailable { key: String, error: String },
    Failed { key: String, error: String },
}

/// HTML produced for a render request.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderOutcome {
    Html(String),
    NotFound(String),
    Unavailable(String),
    Failed(String),
}

impl RenderOutcome {
    pub fn body(&self) -> &str {
        match self {
            RenderOutcome::Html(body)
            | RenderOutcome::NotFound(body)
            | RenderOutcome::Unavailable(body)
            | RenderOutcome::Failed(body) => body,
        }
    }
}

pub fn not_found_panel(key: &str) -> String {
    format!(
        concat!(
            r#"<div class="p-4 bg-red-50 border border-red-200 rounded-lg">"#,
            r#"<h3 class="text-lg font-medium text-red-600 mb-2">加载失败</h3>"#,
            r#"<p class="text-red-500">组件代码不存在</p>"#,
            r#"<p class="text-sm text-gray-500">{}</p>"#,
            "</div>"
        ),
        escape_html(key)
    )
}

pub fn unavailable_panel(error: &str) -> String {
    format!(
        concat!(
            r#"<div class="p-4 bg-red-50 border border-red-200 rounded-lg">"#,
            r#"<h3 class="text-lg font-medium text-red-600 mb-2">加载失败</h3>"#,
            r#"<p class="text-red-500">无法加载组件</p>"#,
            r#"<pre class="mt-2 p-2 bg-red-100 rounded text-xs overflow-auto">{}</pre>"#,
            "</div>"
        ),
        escape_html(error)
    )
}

pub fn error_panel(error: &str) -> String {
    format!(
        concat!(
            r#"<div class="p-4 bg-red-50 border border-red-200 rounded-lg">"#,
            r#"<h3 class="text-lg font-medium text-red-600 mb-2">组件解析失败</h3>"#,
            r#"<p class="text-red-500">无法解析组件代码</p>"#,
            r#"<details class="mt-2"><summary class="text-sm text-red-500 cursor-pointer">查看错误</summary>"#,
            r#"<pre class="mt-2 p-2 bg-red-100 rounded text-xs overflow-auto">{}</pre>"#,
            "</details></div>"
        ),
        escape_html(error)
    )
}

pub struct Materializer {
    source: Arc<dyn ComponentSource>,
    capabilities: Arc<Capabilities>,
    limits: EvalLimits,
    cache: RwLock<HashMap<String, Arc<CompiledComponent>>>,
    artifacts: RwLock<HashMap<String, Arc<CompiledComponent>>>,
}

impl Materializer {
    pub fn new(
        source: Arc<dyn ComponentSource>,
        capabilities: Capabilities,
        limits: EvalLimits,
    ) -> Self {
        Self {
            source,
            capabilities: Arc::new(capabilities),
            limits,
            cache: RwLock::new(HashMap::new()),
            artifacts: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &Arc<dyn ComponentSource> {
        &self.source
    }

    pub async fn cached_count(&self) -> usize {
        self.cache.read().await.len()
    }

    pub async fn artifact_count(&self) -> usize {
        self.artifacts.read().await.len()
    }

    /// Fetch, compile and cache. A cache hit skips the source entirely.
    pub async fn materialize(&self, project_type: &str, component_name: &str) -> LoadState {
        let key = cache_key(project_type, component_name);
        if let Some(hit) = self.cache.read().await.get(&key) {
            debug!(key = %key, "component cache hit");
            return LoadState::Ready(hit.clone());
        }

        match self.load(project_type, component_name).await {
            Ok(Some(component)) => {
                let mut cache = self.cache.write().await;
                // A concurrent load may have won; keep whichever landed first.
                let ready = cache.entry(key).or_insert(component).clone();
                LoadState::Ready(ready)
            }
            Ok(None) => {
                debug!(key = %key, "component not found");
                LoadState::NotFound { key }
            }
            Err(MaterializeError::Source(e)) => {
                warn!(key = %key, error = %e, "component source unavailable");
                LoadState::Unavailable {
                    key,
                    error: e.to_string(),
                }
            }
            Err(e) => {
                warn!(key = %key, error = %e, "component materialization failed");
                LoadState::Failed {
                    key,
                    error: e.to_string(),
                }
            }
        }
    }

    async fn load(
        &self,
        project_type: &str,
        component_name: &str,
    ) -> Result<Option<Arc<CompiledComponent>>, MaterializeError> {
        let Some(source) = self.source.fetch(project_type, component_name).await? else {
            return Ok(None);
        };

        let hash = content_hash(&source);
        if let Some(artifact) = self.artifacts.read().await.get(&hash) {
            debug!(hash = %hash, "reusing compiled artifact");
            return Ok(Some(artifact.clone()));
        }

        let capabilities = self.capabilities.clone();
        let fuel = self.limits.fuel;
        let task = tokio::task::spawn_blocking(move || compile(&source, &capabilities, fuel));
        let compiled = match tokio::time::timeout(self.limits.timeout, task).await {
            Err(_) => return Err(MaterializeError::Timeout(self.limits.timeout)),
            Ok(Err(join_error)) => return Err(MaterializeError::Task(join_error.to_string())),
            Ok(Ok(result)) => result?,
        };

        info!(
            project_type = %project_type,
            component = %component_name,
            hash = %hash,
            "component compiled"
        );
        let mut artifacts = self.artifacts.write().await;
        let artifact = artifacts
            .entry(hash)
            .or_insert_with(|| Arc::new(compiled))
            .clone();
        Ok(Some(artifact))
    }

    /// Materialize and render against `props`. Every failure becomes a panel.
    pub async fn render(
        &self,
        project_type: &str,
        component_name: &str,
        props: &Value,
    ) -> RenderOutcome {
        match self.materialize(project_type, component_name).await {
            LoadState::Ready(component) => match component.render(props) {
                Ok(html) => RenderOutcome::Html(html),
                Err(e) => {
                    warn!(
                        key = %cache_key(project_type, component_name),
                        error = %e,
                        "component render failed"
                    );
                    RenderOutcome::Failed(error_panel(&e.to_string()))
                }
            },
            LoadState::NotFound { key } => RenderOutcome::NotFound(not_found_panel(&key)),
            LoadState::Unavailable { error, .. } => {
                RenderOutcome::Unavailable(unavailable_panel(&error))
            }
            LoadState::Failed { error, .. } => RenderOutcome::Failed(error_panel(&error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// In-memory source that counts fetches.
    #[derive(Default)]
    struct MapSource {
        entries: Mutex<HashMap<String, String>>,
        fetches: AtomicUsize,
    }

    impl MapSource {
        fn with(entries: &[(&str, &str, &str)]) -> Arc<Self> {
            let source = Self::default();
            for (project_type, name, content) in entries {
                source.set(project_type, name, content);
            }
            Arc::new(source)
        }

        fn set(&self, project_type: &str, name: &str, content: &str) {
            self.entries
                .lock()
                .unwrap()
                .insert(cache_key(project_type, name), content.to_string());
        }

        fn fetches(&self) -> usize {
            self.fetches.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ComponentSource for MapSource {
        async fn fetch(
            &self,
            project_type: &str,
            component_name: &str,
        ) -> Result<Option<String>, SourceError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self
                .entries
                .lock()
                .unwrap()
                .get(&cache_key(project_type, component_name))
                .cloned())
        }

        fn describe(&self) -> String {
            "map".to_string()
        }
    }

    fn materializer(source: Arc<MapSource>) -> Materializer {
        Materializer::new(source, Capabilities::standard(), EvalLimits::default())
    }

    const GREETING: &str = "export default <p>{'hi ' + fallbackName}</p>";

    fn ready(state: LoadState) -> Arc<CompiledComponent> {
        match state {
            LoadState::Ready(component) => component,
            other => panic!("expected ready, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_cache_hit_returns_same_unit_without_fetching() {
        let source = MapSource::with(&[("user-auth", "LoginPage", "export default <p>v1</p>")]);
        let materializer = materializer(source.clone());

        let first = ready(materializer.materialize("user-auth", "LoginPage").await);
        let second = ready(materializer.materialize("user-auth", "LoginPage").await);

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(source.fetches(), 1);
        assert_eq!(materializer.cached_count().await, 1);
    }

    #[tokio::test]
    async fn test_cache_is_not_invalidated_by_source_changes() {
        let source = MapSource::with(&[("user-auth", "LoginPage", "export default <p>v1</p>")]);
        let materializer = materializer(source.clone());
        materializer.materialize("user-auth", "LoginPage").await;

        source.set("user-auth", "LoginPage", "export default <p>v2</p>");
        let outcome = materializer.render("user-auth", "LoginPage", &json!({})).await;
        assert_eq!(outcome, RenderOutcome::Html("<p>v1</p>".to_string()));
    }

    #[tokio::test]
    async fn test_identical_source_shares_artifact() {
        let body = "export default <p>same</p>";
        let source = MapSource::with(&[("a", "One", body), ("b", "Two", body)]);
        let materializer = materializer(source);

        let one = ready(materializer.materialize("a", "One").await);
        let two = ready(materializer.materialize("b", "Two").await);

        assert!(Arc::ptr_eq(&one, &two));
        assert_eq!(materializer.cached_count().await, 2);
        assert_eq!(materializer.artifact_count().await, 1);
        assert_eq!(one.hash(), content_hash(body));
    }

    #[tokio::test]
    async fn test_missing_component_is_not_found() {
        let materializer = materializer(MapSource::with(&[]));

        match materializer.materialize("user-auth", "Nope").await {
            LoadState::NotFound { key } => assert_eq!(key, "user-auth/Nope"),
            other => panic!("expected not found, got {other:?}"),
        }
        let outcome = materializer.render("user-auth", "Nope", &json!({})).await;
        assert!(matches!(outcome, RenderOutcome::NotFound(ref body) if body.contains("user-auth/Nope")));
    }

    #[tokio::test]
    async fn test_malformed_source_renders_diagnostic_and_is_not_cached() {
        let source = MapSource::with(&[("user-auth", "Broken", GREETING)]);
        let materializer = materializer(source.clone());

        match materializer.materialize("user-auth", "Broken").await {
            LoadState::Failed { key, error } => {
                assert_eq!(key, "user-auth/Broken");
                assert_eq!(error, "`fallbackName` is not defined");
            }
            other => panic!("expected failure, got {other:?}"),
        }

        let outcome = materializer.render("user-auth", "Broken", &json!({})).await;
        match outcome {
            RenderOutcome::Failed(body) => {
                assert!(body.contains("组件解析失败"));
                assert!(body.contains("`fallbackName` is not defined"));
            }
            other => panic!("expected failure panel, got {other:?}"),
        }
        assert_eq!(source.fetches(), 2);
        assert_eq!(materializer.cached_count().await, 0);

        source.set("user-auth", "Broken", "export default <p>fixed</p>");
        let fixed = materializer.render("user-auth", "Broken", &json!({})).await;
        assert_eq!(fixed, RenderOutcome::Html("<p>fixed</p>".to_string()));
    }

    #[tokio::test]
    async fn test_render_passes_props() {
        let source = MapSource::with(&[(
            "example",
            "Hello",
            "export default <h1 className=\"t\">Hello {props.name}</h1>",
        )]);
        let materializer = materializer(source);

        let outcome = materializer
            .render("example", "Hello", &json!({"name": "<Ada>"}))
            .await;
        assert_eq!(
            outcome.body(),
            "<h1 class=\"t\">Hello &lt;Ada&gt;</h1>"
        );
    }

    #[tokio::test]
    async fn test_render_budget_exhaustion_is_a_failure() {
        let source = MapSource::with(&[(
            "example",
            "Heavy",
            "const xs = [1, 2, 3, 4, 5, 6, 7, 8]; export default <p>{xs}{xs}{xs}{xs}{xs}{xs}{xs}</p>",
        )]);
        let limits = EvalLimits {
            fuel: 12,
            timeout: Duration::from_secs(2),
        };
        let materializer = Materializer::new(source, Capabilities::standard(), limits);

        let outcome = materializer.render("example", "Heavy", &json!({})).await;
        match outcome {
            RenderOutcome::Failed(body) => assert!(body.contains("budget of 12 steps")),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    struct DownSource;

    #[async_trait]
    impl ComponentSource for DownSource {
        async fn fetch(&self, _: &str, _: &str) -> Result<Option<String>, SourceError> {
            Err(SourceError::Status {
                status: 503,
                url: "http://catalog/api/components/a/B".to_string(),
            })
        }

        fn describe(&self) -> String {
            "down".to_string()
        }
    }

    #[tokio::test]
    async fn test_source_failure_is_not_a_parse_failure() {
        let materializer =
            Materializer::new(Arc::new(DownSource), Capabilities::standard(), EvalLimits::default());

        match materializer.render("a", "B", &json!({})).await {
            RenderOutcome::Unavailable(body) => {
                assert!(body.contains("无法加载组件"));
                assert!(body.contains("returned 503"));
                assert!(!body.contains("组件解析失败"));
            }
            other => panic!("expected unavailable, got {other:?}"),
        }
        assert_eq!(materializer.cached_count().await, 0);
    }

    #[test]
    fn test_panels_escape_their_input() {
        assert!(not_found_panel("<x>/y").contains("&lt;x&gt;/y"));
        assert!(error_panel("<script>").contains("&lt;script&gt;"));
        assert!(unavailable_panel("<b>").contains("&lt;b&gt;"));
    }
}

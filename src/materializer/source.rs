//! Where component sources come from: the in-process catalog, a remote
//! catalog over HTTP, or a prototypes directory on disk.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::catalog::CatalogService;
use crate::store::models::ComponentRecord;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("component request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("component service returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("invalid component service url: {0}")]
    InvalidUrl(String),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Fetches raw component source by (project type, component name).
/// `Ok(None)` means the component does not exist.
#[async_trait]
pub trait ComponentSource: Send + Sync {
    async fn fetch(
        &self,
        project_type: &str,
        component_name: &str,
    ) -> Result<Option<String>, SourceError>;

    /// Short label for logs and health output.
    fn describe(&self) -> String;
}

/// Reads straight from the catalog, including the project-id fallback chain.
pub struct CatalogSource {
    catalog: CatalogService,
}

impl CatalogSource {
    pub fn new(catalog: CatalogService) -> Self {
        Self { catalog }
    }
}

#[async_trait]
impl ComponentSource for CatalogSource {
    async fn fetch(
        &self,
        project_type: &str,
        component_name: &str,
    ) -> Result<Option<String>, SourceError> {
        Ok(self
            .catalog
            .find_component(project_type, component_name)
            .await
            .map(|record| record.content))
    }

    fn describe(&self) -> String {
        "store".to_string()
    }
}

/// Calls `GET {base}/api/components/{projectType}/{componentName}`.
pub struct HttpSource {
    base: Url,
    client: Client,
}

impl HttpSource {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, SourceError> {
        let base = Url::parse(base_url).map_err(|e| SourceError::InvalidUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(SourceError::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base, client })
    }

    fn component_url(&self, project_type: &str, component_name: &str) -> Result<Url, SourceError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SourceError::InvalidUrl(self.base.to_string()))?
            .pop_if_empty()
            .extend(["api", "components", project_type, component_name]);
        Ok(url)
    }
}

#[async_trait]
impl ComponentSource for HttpSource {
    async fn fetch(
        &self,
        project_type: &str,
        component_name: &str,
    ) -> Result<Option<String>, SourceError> {
        let url = self.component_url(project_type, component_name)?;
        debug!(url = %url, "fetching component source");

        let response = self.client.get(url.clone()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                let record: ComponentRecord = response.json().await?;
                Ok(Some(record.content))
            }
            status => Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            }),
        }
    }

    fn describe(&self) -> String {
        format!("http {}", self.base)
    }
}

const SOURCE_EXTENSIONS: &[&str] = &["jsx", "tsx"];

/// Reads `<root>/<projectType>/<componentName>.jsx` (or `.tsx`); files sit
/// directly under `<root>` when the project type is empty.
pub struct FsSource {
    root: PathBuf,
}

impl FsSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

fn is_plain_segment(segment: &str) -> bool {
    !segment.contains(['/', '\\']) && segment != "." && segment != ".."
}

#[async_trait]
impl ComponentSource for FsSource {
    async fn fetch(
        &self,
        project_type: &str,
        component_name: &str,
    ) -> Result<Option<String>, SourceError> {
        if component_name.is_empty()
            || !is_plain_segment(component_name)
            || !is_plain_segment(project_type)
        {
            return Ok(None);
        }

        let dir = if project_type.is_empty() {
            self.root.clone()
        } else {
            self.root.join(project_type)
        };

        for ext in SOURCE_EXTENSIONS {
            let path = dir.join(format!("{component_name}.{ext}"));
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => return Ok(Some(content)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(SourceError::Io { path, source }),
            }
        }
        Ok(None)
    }

    fn describe(&self) -> String {
        format!("fs {}", self.root.display())
    }
}

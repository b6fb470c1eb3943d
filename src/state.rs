use std::sync::Arc;
use std::time::Duration;

use crate::catalog::CatalogService;
use crate::config::{ShowcaseConfig, SourceKind};
use crate::materializer::{
    Capabilities, CatalogSource, ComponentSource, FsSource, HttpSource, Materializer, SourceError,
};
use crate::resolver::NamespaceResolver;
use crate::store::RecordStore;

/// Upper bound on one request to a remote catalog.
const HTTP_SOURCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything inside is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ShowcaseConfig>,
    /// Record store plus the namespace resolver.
    pub catalog: CatalogService,
    pub materializer: Arc<Materializer>,
}

impl AppState {
    pub fn new(
        config: ShowcaseConfig,
        store: Arc<RecordStore>,
        resolver: Arc<NamespaceResolver>,
    ) -> Result<Self, SourceError> {
        let catalog = CatalogService::new(store, resolver);

        let source: Arc<dyn ComponentSource> = match config.component_source {
            SourceKind::Store => Arc::new(CatalogSource::new(catalog.clone())),
            SourceKind::Http => Arc::new(HttpSource::new(&config.catalog_url, HTTP_SOURCE_TIMEOUT)?),
            SourceKind::Fs => Arc::new(FsSource::new(config.prototypes_dir.clone())),
        };
        tracing::info!(source = %source.describe(), "component source selected");

        let materializer = Materializer::new(source, Capabilities::standard(), config.limits);

        Ok(Self {
            config: Arc::new(config),
            catalog,
            materializer: Arc::new(materializer),
        })
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        self.catalog.store()
    }

    pub fn resolver(&self) -> &Arc<NamespaceResolver> {
        self.catalog.resolver()
    }
}

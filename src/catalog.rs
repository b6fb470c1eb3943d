//! Catalog Service
//!
//! Lookup logic shared by the HTTP handlers and the in-process component
//! source: the component fallback chain and write-time page namespaces.

use std::sync::Arc;

use crate::resolver::NamespaceResolver;
use crate::store::models::{ComponentRecord, NewPage, Page, Project};
use crate::store::{derive_project_type, RecordStore, StoreError};

/// Project types tried, in order, when `supplied` turned out to be a project id:
/// the project's first name token lower-cased, the first 8 characters of the
/// identifier, then the full identifier.
pub fn fallback_project_types(supplied: &str, project: &Project) -> Vec<String> {
    let mut candidates = Vec::with_capacity(3);
    if let Some(from_name) = derive_project_type(&project.name) {
        candidates.push(from_name);
    }
    candidates.push(supplied.chars().take(8).collect());
    candidates.push(supplied.to_string());
    candidates
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<RecordStore>,
    resolver: Arc<NamespaceResolver>,
}

impl CatalogService {
    pub fn new(store: Arc<RecordStore>, resolver: Arc<NamespaceResolver>) -> Self {
        Self { store, resolver }
    }

    pub fn store(&self) -> &Arc<RecordStore> {
        &self.store
    }

    pub fn resolver(&self) -> &Arc<NamespaceResolver> {
        &self.resolver
    }

    /// Direct (project type, name) lookup, then the fallback chain when
    /// `project_type` is the id of an existing project.
    pub async fn find_component(
        &self,
        project_type: &str,
        component_name: &str,
    ) -> Option<ComponentRecord> {
        if let Some(found) = self.store.get_component(project_type, component_name).await {
            return Some(found);
        }
        tracing::debug!(project_type = %project_type, component = %component_name, "direct component lookup missed");

        let project = self.store.get_project(project_type).await?;
        for candidate in fallback_project_types(project_type, &project) {
            tracing::debug!(candidate = %candidate, component = %component_name, "trying fallback project type");
            if let Some(found) = self.store.get_component(&candidate, component_name).await {
                return Some(found);
            }
        }

        None
    }

    /// Create a page, recording its namespace once so rendering never guesses.
    pub async fn create_page(&self, mut input: NewPage) -> Result<Page, StoreError> {
        if input.project_type.as_deref().map_or(true, str::is_empty) {
            input.project_type = self
                .page_namespace(&input.module_id, &input.component_path)
                .await;
        }
        self.store.create_page(input).await
    }

    /// Namespace a page's component lives under: the stored value, the
    /// resolver's registration, or the owning project's type.
    pub async fn namespace_for_page(&self, page: &Page) -> String {
        if let Some(project_type) = page.project_type.as_ref().filter(|t| !t.is_empty()) {
            return project_type.clone();
        }
        self.page_namespace(&page.module_id, &page.component_path)
            .await
            .unwrap_or_default()
    }

    async fn page_namespace(&self, module_id: &str, component_path: &str) -> Option<String> {
        match self.resolver.resolve(component_path) {
            "" => {}
            namespace => return Some(namespace.to_string()),
        }
        let module = self.store.get_module(module_id).await?;
        let project = self.store.get_project(&module.project_id).await?;
        project.project_type
    }
}

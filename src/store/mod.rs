pub mod models;

use chrono::Utc;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use uuid::Uuid;

use models::{
    CatalogDocument, ComponentRecord, Module, ModuleWithPages, NewModule, NewPage, NewProject,
    Page, Project, ProjectWithModules, SaveComponent, StoreStats,
};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store file error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Source of the component seeded on first run.
pub const SEED_COMPONENT: &str = r#"'use client';

import { useState } from 'react';

const [count, setCount] = useState(0);
const title = "示例页面";

export default (
  <div className="p-4">
    <h2 className="text-xl font-bold mb-4">{title}</h2>
    <p>当前计数: {count}</p>
    <button className="mt-4 bg-blue-500 text-white px-4 py-2 rounded" onClick={setCount(count + 1)}>
      增加计数
    </button>
  </div>
);
"#;

/// First whitespace token of a project name, lower-cased.
pub fn derive_project_type(name: &str) -> Option<String> {
    name.split_whitespace().next().map(|token| token.to_lowercase())
}

/// In-memory catalog mirrored to a single JSON document.
///
/// Every mutation holds the write lock across the whole read-modify-persist
/// cycle and only swaps the new document in after it reached disk, so a failed
/// write leaves memory and file unchanged.
pub struct RecordStore {
    path: PathBuf,
    doc: RwLock<CatalogDocument>,
}

impl RecordStore {
    /// Load the document at `path`, seeding an example catalog if the file does not exist.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();

        let doc = if tokio::fs::try_exists(&path).await? {
            let bytes = tokio::fs::read(&path).await?;
            let doc: CatalogDocument = serde_json::from_slice(&bytes)?;
            tracing::info!(
                path = %path.display(),
                projects = doc.projects.len(),
                components = doc.components.len(),
                "catalog document loaded"
            );
            doc
        } else {
            let doc = seed_document();
            write_document(&path, &doc).await?;
            tracing::info!(path = %path.display(), "catalog document seeded with example data");
            doc
        };

        Ok(Self {
            path,
            doc: RwLock::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn stats(&self) -> StoreStats {
        let doc = self.doc.read().await;
        StoreStats {
            projects: doc.projects.len(),
            modules: doc.modules.len(),
            pages: doc.pages.len(),
            components: doc.components.len(),
        }
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// All projects, each with nested modules and pages.
    pub async fn list_projects(&self) -> Vec<ProjectWithModules> {
        let doc = self.doc.read().await;
        doc.projects
            .iter()
            .map(|project| nest_project(&doc, project))
            .collect()
    }

    pub async fn get_project(&self, id: &str) -> Option<Project> {
        let doc = self.doc.read().await;
        doc.projects.iter().find(|p| p.id == id).cloned()
    }

    pub async fn get_project_nested(&self, id: &str) -> Option<ProjectWithModules> {
        let doc = self.doc.read().await;
        doc.projects
            .iter()
            .find(|p| p.id == id)
            .map(|project| nest_project(&doc, project))
    }

    pub async fn get_project_modules(&self, project_id: &str) -> Vec<Module> {
        let doc = self.doc.read().await;
        doc.modules
            .iter()
            .filter(|m| m.project_id == project_id)
            .cloned()
            .collect()
    }

    pub async fn get_module(&self, id: &str) -> Option<Module> {
        let doc = self.doc.read().await;
        doc.modules.iter().find(|m| m.id == id).cloned()
    }

    pub async fn get_module_pages(&self, module_id: &str) -> Vec<Page> {
        let doc = self.doc.read().await;
        doc.pages
            .iter()
            .filter(|p| p.module_id == module_id)
            .cloned()
            .collect()
    }

    pub async fn get_page(&self, id: &str) -> Option<Page> {
        let doc = self.doc.read().await;
        doc.pages.iter().find(|p| p.id == id).cloned()
    }

    pub async fn get_component(
        &self,
        project_type: &str,
        component_name: &str,
    ) -> Option<ComponentRecord> {
        let doc = self.doc.read().await;
        doc.components
            .iter()
            .find(|c| c.project_type == project_type && c.component_name == component_name)
            .cloned()
    }

    pub async fn list_components(&self) -> Vec<ComponentRecord> {
        self.doc.read().await.components.clone()
    }

    pub async fn list_components_by_type(&self, project_type: &str) -> Vec<ComponentRecord> {
        let doc = self.doc.read().await;
        doc.components
            .iter()
            .filter(|c| c.project_type == project_type)
            .cloned()
            .collect()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Upsert by (project type, component name). An existing record keeps its
    /// id and `created_at`; only content and `updated_at` change.
    pub async fn save_component(&self, input: SaveComponent) -> Result<ComponentRecord, StoreError> {
        let mut doc = self.doc.write().await;
        let mut next = doc.clone();
        let now = Utc::now();

        let existing = next.components.iter().position(|c| {
            c.project_type == input.project_type && c.component_name == input.component_name
        });

        let saved = match existing {
            Some(index) => {
                let record = &mut next.components[index];
                record.content = input.content;
                record.updated_at = now;
                tracing::debug!(
                    project_type = %record.project_type,
                    component = %record.component_name,
                    "component updated"
                );
                record.clone()
            }
            None => {
                let record = ComponentRecord {
                    id: new_id(),
                    project_type: input.project_type,
                    component_name: input.component_name,
                    content: input.content,
                    created_at: now,
                    updated_at: now,
                };
                tracing::debug!(
                    project_type = %record.project_type,
                    component = %record.component_name,
                    "component created"
                );
                next.components.push(record.clone());
                record
            }
        };

        write_document(&self.path, &next).await?;
        *doc = next;
        Ok(saved)
    }

    pub async fn create_project(&self, input: NewProject) -> Result<Project, StoreError> {
        let now = Utc::now();
        let project_type = input
            .project_type
            .filter(|t| !t.trim().is_empty())
            .or_else(|| derive_project_type(&input.name));

        let project = Project {
            id: new_id(),
            name: input.name,
            description: input.description,
            thumbnail: input.thumbnail,
            project_type,
            created_at: now,
            updated_at: now,
        };

        self.append(|doc| doc.projects.push(project.clone())).await?;
        tracing::debug!(id = %project.id, name = %project.name, "project created");
        Ok(project)
    }

    pub async fn create_module(&self, input: NewModule) -> Result<Module, StoreError> {
        let now = Utc::now();
        let module = Module {
            id: new_id(),
            project_id: input.project_id,
            name: input.name,
            description: input.description,
            created_at: now,
            updated_at: now,
        };

        self.append(|doc| doc.modules.push(module.clone())).await?;
        tracing::debug!(id = %module.id, project_id = %module.project_id, "module created");
        Ok(module)
    }

    pub async fn create_page(&self, input: NewPage) -> Result<Page, StoreError> {
        let now = Utc::now();
        let page = Page {
            id: new_id(),
            module_id: input.module_id,
            name: input.name,
            description: input.description,
            component_path: input.component_path,
            project_type: input.project_type.filter(|t| !t.is_empty()),
            created_at: now,
            updated_at: now,
        };

        self.append(|doc| doc.pages.push(page.clone())).await?;
        tracing::debug!(id = %page.id, component = %page.component_path, "page created");
        Ok(page)
    }

    async fn append(&self, mutate: impl FnOnce(&mut CatalogDocument)) -> Result<(), StoreError> {
        let mut doc = self.doc.write().await;
        let mut next = doc.clone();
        mutate(&mut next);
        write_document(&self.path, &next).await?;
        *doc = next;
        Ok(())
    }
}

fn new_id() -> String {
    Uuid::new_v4().to_string()
}

fn nest_project(doc: &CatalogDocument, project: &Project) -> ProjectWithModules {
    let modules = doc
        .modules
        .iter()
        .filter(|m| m.project_id == project.id)
        .map(|module| ModuleWithPages {
            module: module.clone(),
            pages: doc
                .pages
                .iter()
                .filter(|p| p.module_id == module.id)
                .cloned()
                .collect(),
        })
        .collect();

    ProjectWithModules {
        project: project.clone(),
        modules,
    }
}

/// Write to a sibling temp file and rename it over the target.
async fn write_document(path: &Path, doc: &CatalogDocument) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(doc)?;

    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, &bytes).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }
    Ok(())
}

fn seed_document() -> CatalogDocument {
    let now = Utc::now();
    let project_id = new_id();
    let module_id = new_id();

    CatalogDocument {
        projects: vec![Project {
            id: project_id.clone(),
            name: "示例项目".to_string(),
            description: "这是一个示例项目".to_string(),
            thumbnail: None,
            project_type: Some("example".to_string()),
            created_at: now,
            updated_at: now,
        }],
        modules: vec![Module {
            id: module_id.clone(),
            project_id,
            name: "示例模块".to_string(),
            description: "这是一个示例模块".to_string(),
            created_at: now,
            updated_at: now,
        }],
        pages: vec![Page {
            id: new_id(),
            module_id,
            name: "示例页面".to_string(),
            description: "这是一个示例页面".to_string(),
            component_path: "ExamplePage".to_string(),
            project_type: Some("example".to_string()),
            created_at: now,
            updated_at: now,
        }],
        components: vec![ComponentRecord {
            id: new_id(),
            project_type: "example".to_string(),
            component_name: "ExamplePage".to_string(),
            content: SEED_COMPONENT.to_string(),
            created_at: now,
            updated_at: now,
        }],
    }
}

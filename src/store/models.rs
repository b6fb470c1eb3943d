//! Store Models - records persisted in the catalog document (serde, camelCase on the wire).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Project record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    /// Namespace slug under which this project's components are filed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New project for creation
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProject {
    pub name: String,
    pub description: String,
    pub thumbnail: Option<String>,
    pub project_type: Option<String>,
}

/// Module record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Module {
    pub id: String,
    pub project_id: String,
    pub name: String,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New module for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewModule {
    pub project_id: String,
    pub name: String,
    pub description: String,
}

/// Page record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub id: String,
    pub module_id: String,
    #[serde(alias = "title")]
    pub name: String,
    pub description: String,
    /// Component name, resolved against the component table at render time.
    pub component_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New page for creation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPage {
    pub module_id: String,
    pub name: String,
    pub description: String,
    pub component_path: String,
    pub project_type: Option<String>,
}

/// Stored component source, keyed by (project type, component name)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub id: String,
    pub project_type: String,
    pub component_name: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Component upsert payload
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveComponent {
    pub project_type: String,
    pub component_name: String,
    pub content: String,
}

/// Module with its pages, as returned by the nested project endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleWithPages {
    #[serde(flatten)]
    pub module: Module,
    pub pages: Vec<Page>,
}

/// Project with its modules and their pages
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectWithModules {
    #[serde(flatten)]
    pub project: Project,
    pub modules: Vec<ModuleWithPages>,
}

/// The whole persisted document. Every collection defaults to empty so older
/// files with missing keys still load.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub modules: Vec<Module>,
    #[serde(default)]
    pub pages: Vec<Page>,
    #[serde(default)]
    pub components: Vec<ComponentRecord>,
}

/// Collection sizes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreStats {
    pub projects: usize,
    pub modules: usize,
    pub pages: usize,
    pub components: usize,
}

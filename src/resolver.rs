//! Namespace Resolver
//!
//! Maps a bare component name (`LoginPage`) to the project type it is filed
//! under (`user-auth`). The table is built once at startup from the built-in
//! name lists and any project manifests, then shared read-only.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const VIDEO_GENERATION_COMPONENTS: &[&str] = &[
    "ScriptGenerationPage",
    "ResourceListPage",
    "ResourceUploadPage",
    "VoiceoverMatchingPage",
    "MusicListPage",
    "MusicUploadPage",
    "TransitionEffectsPage",
    "VideoGenerationPage",
];

pub const USER_AUTH_COMPONENTS: &[&str] = &["LoginPage", "RegisterPage"];

pub const PRODUCT_COMPONENTS: &[&str] = &["ProductListPage"];

pub const CAMPUS_FOOD_DELIVERY_COMPONENTS: &[&str] = &[
    "HomePage",
    "RestaurantDetailPage",
    "OrderPage",
    "ProfilePage",
    "OrderHistoryPage",
    "FavoritesPage",
    "CartPage",
    "AddressManagePage",
    "RatingPage",
    "LoginRegisterPage",
];

/// Built-in (namespace, names) registrations.
pub const BUILTIN_NAMESPACES: &[(&str, &[&str])] = &[
    ("video-generation", VIDEO_GENERATION_COMPONENTS),
    ("user-auth", USER_AUTH_COMPONENTS),
    ("product", PRODUCT_COMPONENTS),
    ("campus-food-delivery", CAMPUS_FOOD_DELIVERY_COMPONENTS),
];

lazy_static::lazy_static! {
    /// Component names: a letter followed by letters, digits, `_` or `-`
    static ref COMPONENT_NAME_REGEX: Regex = Regex::new(r"^[A-Za-z][A-Za-z0-9_-]*$").unwrap();
}

pub fn is_valid_component_name(name: &str) -> bool {
    COMPONENT_NAME_REGEX.is_match(name)
}

#[derive(Debug, thiserror::Error)]
pub enum ResolverError {
    #[error("component `{name}` is registered under both `{existing}` and `{requested}`")]
    Conflict {
        name: String,
        existing: String,
        requested: String,
    },

    #[error("invalid component name `{0}`")]
    InvalidName(String),

    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid manifest {path}: {source}")]
    Manifest {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

// ============================================================================
// Manifests
// ============================================================================

/// Declarative description of one demo project.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectManifest {
    pub project_type: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub thumbnail: Option<String>,
    /// Names registered under `project_type` that no page references.
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub modules: Vec<ModuleManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleManifest {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub pages: Vec<PageManifest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageManifest {
    #[serde(alias = "name")]
    pub title: String,
    pub description: String,
    pub component_path: String,
}

impl ProjectManifest {
    /// Every component name this manifest claims, pages first.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.modules
            .iter()
            .flat_map(|m| m.pages.iter().map(|p| p.component_path.as_str()))
            .chain(self.components.iter().map(String::as_str))
    }
}

/// Read every `*.json` manifest in `dir`, ordered by file name.
/// A missing directory yields no manifests.
pub async fn load_manifests(dir: &Path) -> Result<Vec<ProjectManifest>, ResolverError> {
    let io_err = |source: std::io::Error| ResolverError::Io {
        path: dir.to_path_buf(),
        source,
    };

    if !tokio::fs::try_exists(dir).await.map_err(io_err)? {
        tracing::info!(dir = %dir.display(), "manifest directory not found, using built-in registrations only");
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            paths.push(path);
        }
    }
    paths.sort();

    let mut manifests = Vec::with_capacity(paths.len());
    for path in paths {
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|source| ResolverError::Io {
                path: path.clone(),
                source,
            })?;
        let manifest: ProjectManifest =
            serde_json::from_slice(&bytes).map_err(|source| ResolverError::Manifest {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), project_type = %manifest.project_type, "manifest loaded");
        manifests.push(manifest);
    }

    Ok(manifests)
}

// ============================================================================
// Resolver
// ============================================================================

/// Immutable component name → namespace table.
#[derive(Debug, Clone, Default)]
pub struct NamespaceResolver {
    table: HashMap<String, String>,
}

impl NamespaceResolver {
    pub fn builder() -> NamespaceResolverBuilder {
        NamespaceResolverBuilder::default()
    }

    /// Built-in registrations plus the given manifests.
    pub fn from_manifests(manifests: &[ProjectManifest]) -> Result<Self, ResolverError> {
        let mut builder = NamespaceResolverBuilder::with_builtin()?;
        for manifest in manifests {
            builder = builder.register_manifest(manifest)?;
        }
        Ok(builder.build())
    }

    /// Namespace for `name`, or the empty string when the name was never registered.
    pub fn resolve(&self, name: &str) -> &str {
        self.table.get(name).map(String::as_str).unwrap_or("")
    }

    /// Conventional relative location `<namespace>/<name>`, or `<name>` at the root.
    pub fn component_path(&self, name: &str) -> String {
        match self.resolve(name) {
            "" => name.to_string(),
            namespace => format!("{}/{}", namespace, name),
        }
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct NamespaceResolverBuilder {
    table: HashMap<String, String>,
}

impl NamespaceResolverBuilder {
    pub fn with_builtin() -> Result<Self, ResolverError> {
        BUILTIN_NAMESPACES
            .iter()
            .try_fold(Self::default(), |builder, (namespace, names)| {
                builder.register(namespace, names.iter().copied())
            })
    }

    /// Register `names` under `namespace`. Re-registering a name under the same
    /// namespace is a no-op; under a different one it is a conflict.
    pub fn register<'a>(
        mut self,
        namespace: &str,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ResolverError> {
        for name in names {
            if !is_valid_component_name(name) {
                return Err(ResolverError::InvalidName(name.to_string()));
            }
            match self.table.get(name) {
                Some(existing) if existing != namespace => {
                    return Err(ResolverError::Conflict {
                        name: name.to_string(),
                        existing: existing.clone(),
                        requested: namespace.to_string(),
                    });
                }
                Some(_) => {}
                None => {
                    self.table.insert(name.to_string(), namespace.to_string());
                }
            }
        }
        Ok(self)
    }

    pub fn register_manifest(self, manifest: &ProjectManifest) -> Result<Self, ResolverError> {
        self.register(&manifest.project_type, manifest.component_names())
    }

    pub fn build(self) -> NamespaceResolver {
        NamespaceResolver { table: self.table }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn manifest(project_type: &str, pages: &[&str], extra: &[&str]) -> ProjectManifest {
        ProjectManifest {
            project_type: project_type.to_string(),
            name: project_type.to_string(),
            description: String::new(),
            thumbnail: None,
            components: extra.iter().map(|s| s.to_string()).collect(),
            modules: vec![ModuleManifest {
                name: "m".to_string(),
                description: String::new(),
                pages: pages
                    .iter()
                    .map(|p| PageManifest {
                        title: p.to_string(),
                        description: String::new(),
                        component_path: p.to_string(),
                    })
                    .collect(),
            }],
        }
    }

    #[test]
    fn test_every_builtin_name_resolves_to_its_namespace() {
        let resolver = NamespaceResolver::from_manifests(&[]).unwrap();
        for (namespace, names) in BUILTIN_NAMESPACES {
            for name in *names {
                assert_eq!(resolver.resolve(name), *namespace, "{}", name);
            }
        }
    }

    #[test]
    fn test_unknown_name_resolves_to_empty_namespace() {
        let resolver = NamespaceResolver::from_manifests(&[]).unwrap();
        assert_eq!(resolver.resolve("NeverRegistered"), "");
        assert_eq!(resolver.component_path("NeverRegistered"), "NeverRegistered");
        assert_eq!(resolver.component_path("LoginPage"), "user-auth/LoginPage");
    }

    #[test]
    fn test_manifest_registers_pages_and_extra_components() {
        let resolver =
            NamespaceResolver::from_manifests(&[manifest("music", &["TrackPage"], &["Mixer"])])
                .unwrap();
        assert_eq!(resolver.resolve("TrackPage"), "music");
        assert_eq!(resolver.resolve("Mixer"), "music");
    }

    #[test]
    fn test_conflicting_namespace_is_rejected() {
        let err = NamespaceResolver::from_manifests(&[manifest("shop", &["HomePage"], &[])])
            .unwrap_err();
        match err {
            ResolverError::Conflict {
                name,
                existing,
                requested,
            } => {
                assert_eq!(name, "HomePage");
                assert_eq!(existing, "campus-food-delivery");
                assert_eq!(requested, "shop");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_same_namespace_registration_is_idempotent() {
        let resolver = NamespaceResolver::builder()
            .register("a", ["One", "Two"])
            .unwrap()
            .register("a", ["One"])
            .unwrap()
            .build();
        assert_eq!(resolver.len(), 2);
        assert_eq!(resolver.resolve("One"), "a");
    }

    #[test]
    fn test_invalid_component_name_is_rejected() {
        let result = NamespaceResolver::builder().register("a", ["../escape"]);
        assert!(matches!(result, Err(ResolverError::InvalidName(_))));
    }

    #[tokio::test]
    async fn test_load_manifests_reads_json_files_in_order() {
        let dir = TempDir::new().unwrap();
        std::fs::write(
            dir.path().join("b.json"),
            serde_json::to_vec(&manifest("beta", &["BetaPage"], &[])).unwrap(),
        )
        .unwrap();
        std::fs::write(
            dir.path().join("a.json"),
            serde_json::to_vec(&manifest("alpha", &["AlphaPage"], &[])).unwrap(),
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let manifests = load_manifests(dir.path()).await.unwrap();
        let types: Vec<_> = manifests.iter().map(|m| m.project_type.as_str()).collect();
        assert_eq!(types, vec!["alpha", "beta"]);
    }

    #[tokio::test]
    async fn test_load_manifests_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let manifests = load_manifests(&dir.path().join("absent")).await.unwrap();
        assert!(manifests.is_empty());
    }

    #[tokio::test]
    async fn test_load_manifests_reports_bad_json() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("broken.json"), "{").unwrap();
        let result = load_manifests(dir.path()).await;
        assert!(matches!(result, Err(ResolverError::Manifest { .. })));
    }
}

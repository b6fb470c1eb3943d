//! Import tool: seed the record store from project manifests and prototype
//! source files on disk.

use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::catalog::CatalogService;
use crate::materializer::{ComponentSource, FsSource, SourceError};
use crate::resolver::{is_valid_component_name, load_manifests, ProjectManifest, ResolverError};
use crate::store::models::{NewModule, NewPage, NewProject, SaveComponent};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error(transparent)]
    Manifest(#[from] ResolverError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// What an import run created, and what it passed over.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportReport {
    pub projects: usize,
    pub modules: usize,
    pub pages: usize,
    pub components: usize,
    pub skipped: Vec<String>,
}

impl ImportReport {
    pub fn merge(&mut self, other: ImportReport) {
        self.projects += other.projects;
        self.modules += other.modules;
        self.pages += other.pages;
        self.components += other.components;
        self.skipped.extend(other.skipped);
    }

    fn skip(&mut self, reason: String) {
        tracing::warn!(%reason, "import skipped entry");
        self.skipped.push(reason);
    }
}

/// Create the project tree for every manifest in `manifest_dir` and upsert the
/// prototype source each page names. A project whose type is already in the
/// store is skipped, so re-running the import does not duplicate the catalog.
pub async fn import_manifests(
    catalog: &CatalogService,
    manifest_dir: &Path,
    prototypes_dir: &Path,
) -> Result<ImportReport, ImportError> {
    let manifests = load_manifests(manifest_dir).await?;
    let files = FsSource::new(prototypes_dir);
    let mut report = ImportReport::default();

    let mut existing: HashSet<String> = catalog
        .store()
        .list_projects()
        .await
        .into_iter()
        .filter_map(|p| p.project.project_type)
        .collect();

    for manifest in &manifests {
        if !existing.insert(manifest.project_type.clone()) {
            report.skip(format!("project `{}` already imported", manifest.project_type));
            continue;
        }
        import_manifest(catalog, &files, manifest, &mut report).await?;
    }

    Ok(report)
}

async fn import_manifest(
    catalog: &CatalogService,
    files: &FsSource,
    manifest: &ProjectManifest,
    report: &mut ImportReport,
) -> Result<(), ImportError> {
    let store = catalog.store();
    let project = store
        .create_project(NewProject {
            name: manifest.name.clone(),
            description: manifest.description.clone(),
            thumbnail: manifest.thumbnail.clone(),
            project_type: Some(manifest.project_type.clone()),
        })
        .await?;
    report.projects += 1;
    tracing::info!(project = %project.name, project_type = %manifest.project_type, "project imported");

    for module_manifest in &manifest.modules {
        let module = store
            .create_module(NewModule {
                project_id: project.id.clone(),
                name: module_manifest.name.clone(),
                description: module_manifest.description.clone(),
            })
            .await?;
        report.modules += 1;

        for page in &module_manifest.pages {
            catalog
                .create_page(NewPage {
                    module_id: module.id.clone(),
                    name: page.title.clone(),
                    description: page.description.clone(),
                    component_path: page.component_path.clone(),
                    project_type: None,
                })
                .await?;
            report.pages += 1;
        }
    }

    let mut seen = HashSet::new();
    for name in manifest.component_names() {
        if !seen.insert(name) {
            continue;
        }
        match files.fetch(&manifest.project_type, name).await? {
            Some(content) => {
                store
                    .save_component(SaveComponent {
                        project_type: manifest.project_type.clone(),
                        component_name: name.to_string(),
                        content,
                    })
                    .await?;
                report.components += 1;
            }
            None => report.skip(format!(
                "no prototype file for {}/{}",
                manifest.project_type, name
            )),
        }
    }

    Ok(())
}

const SOURCE_EXTENSIONS: &[&str] = &["jsx", "tsx"];

/// Upsert every `<dir>/<projectType>/<Name>.jsx|tsx` as (`projectType`, `Name`).
pub async fn import_prototype_dir(
    store: &RecordStore,
    dir: &Path,
) -> Result<ImportReport, ImportError> {
    let mut report = ImportReport::default();

    for type_dir in sorted_entries(dir).await? {
        if !tokio::fs::metadata(&type_dir)
            .await
            .map_err(|source| ImportError::Io {
                path: type_dir.clone(),
                source,
            })?
            .is_dir()
        {
            continue;
        }
        let Some(project_type) = file_name(&type_dir) else {
            continue;
        };
        tracing::debug!(%project_type, "scanning prototype directory");

        for file in sorted_entries(&type_dir).await? {
            let is_source = file
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|ext| SOURCE_EXTENSIONS.contains(&ext));
            if !is_source {
                continue;
            }
            let Some(component_name) = file
                .file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
            else {
                continue;
            };
            if !is_valid_component_name(&component_name) {
                report.skip(format!("{} is not a component name", file.display()));
                continue;
            }

            let content = tokio::fs::read_to_string(&file)
                .await
                .map_err(|source| ImportError::Io {
                    path: file.clone(),
                    source,
                })?;
            store
                .save_component(SaveComponent {
                    project_type: project_type.clone(),
                    component_name: component_name.clone(),
                    content,
                })
                .await?;
            report.components += 1;
            tracing::info!(%project_type, component = %component_name, "component imported");
        }
    }

    Ok(report)
}

fn file_name(path: &Path) -> Option<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
}

async fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, ImportError> {
    let io_err = |source: std::io::Error| ImportError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut paths = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        paths.push(entry.path());
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::NamespaceResolver;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn write(path: PathBuf, content: &str) {
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(path, content).await.unwrap();
    }

    async fn fixture() -> (TempDir, CatalogService) {
        let dir = TempDir::new().unwrap();
        let manifest = json!({
            "projectType": "user-auth",
            "name": "User Auth",
            "description": "登录与注册",
            "components": ["ForgotPasswordPage"],
            "modules": [{
                "name": "账户",
                "description": "",
                "pages": [
                    { "title": "登录", "description": "", "componentPath": "LoginPage" },
                    { "title": "注册", "description": "", "componentPath": "RegisterPage" },
                    { "title": "再次登录", "description": "", "componentPath": "LoginPage" }
                ]
            }]
        });
        write(dir.path().join("manifests/user-auth.json"), &manifest.to_string()).await;
        write(
            dir.path().join("prototypes/user-auth/LoginPage.jsx"),
            "export default <form>login</form>",
        )
        .await;
        write(
            dir.path().join("prototypes/user-auth/RegisterPage.tsx"),
            "export default <form>register</form>",
        )
        .await;

        let store = Arc::new(RecordStore::open(dir.path().join("data.json")).await.unwrap());
        let manifests = load_manifests(&dir.path().join("manifests")).await.unwrap();
        let resolver = Arc::new(NamespaceResolver::from_manifests(&manifests).unwrap());
        (dir, CatalogService::new(store, resolver))
    }

    #[tokio::test]
    async fn test_import_manifests_builds_catalog() {
        let (dir, catalog) = fixture().await;

        let report = import_manifests(
            &catalog,
            &dir.path().join("manifests"),
            &dir.path().join("prototypes"),
        )
        .await
        .unwrap();

        assert_eq!(report.projects, 1);
        assert_eq!(report.modules, 1);
        assert_eq!(report.pages, 3);
        assert_eq!(report.components, 2);
        assert_eq!(
            report.skipped,
            vec!["no prototype file for user-auth/ForgotPasswordPage".to_string()]
        );

        let store = catalog.store();
        let project = store
            .list_projects()
            .await
            .into_iter()
            .find(|p| p.project.project_type.as_deref() == Some("user-auth"))
            .unwrap();
        assert_eq!(project.project.name, "User Auth");
        let pages = &project.modules[0].pages;
        assert_eq!(pages.len(), 3);
        assert!(pages
            .iter()
            .all(|p| p.project_type.as_deref() == Some("user-auth")));

        let login = store.get_component("user-auth", "LoginPage").await.unwrap();
        assert_eq!(login.content, "export default <form>login</form>");
        assert!(store.get_component("user-auth", "RegisterPage").await.is_some());
    }

    #[tokio::test]
    async fn test_import_manifests_twice_skips_existing_project() {
        let (dir, catalog) = fixture().await;
        let manifests = dir.path().join("manifests");
        let prototypes = dir.path().join("prototypes");

        import_manifests(&catalog, &manifests, &prototypes).await.unwrap();
        let again = import_manifests(&catalog, &manifests, &prototypes).await.unwrap();

        assert_eq!(again.projects, 0);
        assert_eq!(again.skipped, vec!["project `user-auth` already imported".to_string()]);
        // Seed project plus the imported one.
        assert_eq!(catalog.store().stats().await.projects, 2);
    }

    #[tokio::test]
    async fn test_missing_manifest_dir_imports_nothing() {
        let (dir, catalog) = fixture().await;
        let report = import_manifests(
            &catalog,
            &dir.path().join("nowhere"),
            &dir.path().join("prototypes"),
        )
        .await
        .unwrap();
        assert_eq!(report, ImportReport::default());
    }

    #[tokio::test]
    async fn test_import_prototype_dir_upserts_files() {
        let (dir, catalog) = fixture().await;
        let prototypes = dir.path().join("prototypes");
        write(prototypes.join("product/ProductListPage.jsx"), "export default <ul></ul>").await;
        write(prototypes.join("product/notes.md"), "# not a component").await;
        write(prototypes.join("product/bad name.jsx"), "export default <p/>").await;
        write(prototypes.join("README.jsx"), "export default <p/>").await;

        let report = import_prototype_dir(catalog.store(), &prototypes).await.unwrap();

        assert_eq!(report.components, 3);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].contains("bad name.jsx"));

        let store = catalog.store();
        assert!(store.get_component("product", "ProductListPage").await.is_some());
        assert!(store.get_component("user-auth", "LoginPage").await.is_some());
        assert!(store.get_component("", "README").await.is_none());

        // Re-import updates in place.
        write(prototypes.join("product/ProductListPage.jsx"), "export default <ol></ol>").await;
        import_prototype_dir(store, &prototypes).await.unwrap();
        let record = store.get_component("product", "ProductListPage").await.unwrap();
        assert_eq!(record.content, "export default <ol></ol>");
        assert_eq!(store.list_components_by_type("product").await.len(), 1);
    }

    #[tokio::test]
    async fn test_bundled_prototypes_import_and_render() {
        use crate::materializer::{compile, Capabilities};

        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let dir = TempDir::new().unwrap();
        let store = Arc::new(RecordStore::open(dir.path().join("data.json")).await.unwrap());
        let manifests = load_manifests(&root.join("manifests")).await.unwrap();
        let resolver = Arc::new(NamespaceResolver::from_manifests(&manifests).unwrap());
        let catalog = CatalogService::new(store.clone(), resolver);

        let report = import_manifests(&catalog, &root.join("manifests"), &root.join("prototypes"))
            .await
            .unwrap();
        assert!(report.skipped.is_empty(), "{:?}", report.skipped);
        import_prototype_dir(&store, &root.join("prototypes")).await.unwrap();

        let components = store.list_components().await;
        assert!(components.len() >= 5);
        for record in components {
            let compiled = compile(&record.content, &Capabilities::standard(), 100_000)
                .unwrap_or_else(|e| panic!("{}/{}: {}", record.project_type, record.component_name, e));
            compiled.render(&json!({})).unwrap();
        }

        let cart = store.get_component("campus-food-delivery", "CartPage").await.unwrap();
        let html = compile(&cart.content, &Capabilities::standard(), 100_000)
            .unwrap()
            .render(&json!({}))
            .unwrap();
        assert!(html.contains("合计: ¥39"));
    }

    #[tokio::test]
    async fn test_import_prototype_dir_requires_directory() {
        let (dir, catalog) = fixture().await;
        let err = import_prototype_dir(catalog.store(), &dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, ImportError::Io { .. }));
    }
}

//! Seed the record store from `MANIFEST_DIR` and `PROTOTYPES_DIR`.
//!
//! Usage: cargo run --bin import-prototypes [--files-only]

use std::process::ExitCode;
use std::sync::Arc;

use prototype_showcase::catalog::CatalogService;
use prototype_showcase::config::ShowcaseConfig;
use prototype_showcase::import::{import_manifests, import_prototype_dir, ImportReport};
use prototype_showcase::resolver::{load_manifests, NamespaceResolver};
use prototype_showcase::store::RecordStore;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("prototype_showcase=info,import_prototypes=info")),
        )
        .with_target(false)
        .init();

    let files_only = std::env::args().skip(1).any(|arg| arg == "--files-only");
    let config = ShowcaseConfig::from_env();

    match run(&config, files_only).await {
        Ok(report) => {
            println!("\nProjects   : {}", report.projects);
            println!("Modules    : {}", report.modules);
            println!("Pages      : {}", report.pages);
            println!("Components : {}", report.components);
            if !report.skipped.is_empty() {
                println!("Skipped    :");
                for entry in &report.skipped {
                    println!("  - {}", entry);
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Import failed: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(
    config: &ShowcaseConfig,
    files_only: bool,
) -> Result<ImportReport, Box<dyn std::error::Error>> {
    let store = Arc::new(RecordStore::open(&config.data_file).await?);
    tracing::info!(path = %config.data_file.display(), "record store opened");

    let mut report = ImportReport::default();
    if !files_only {
        let manifests = load_manifests(&config.manifest_dir).await?;
        let resolver = Arc::new(NamespaceResolver::from_manifests(&manifests)?);
        let catalog = CatalogService::new(store.clone(), resolver);
        report.merge(import_manifests(&catalog, &config.manifest_dir, &config.prototypes_dir).await?);
    }

    if tokio::fs::try_exists(&config.prototypes_dir).await? {
        report.merge(import_prototype_dir(&store, &config.prototypes_dir).await?);
    } else {
        tracing::warn!(dir = %config.prototypes_dir.display(), "prototype directory not found");
    }

    Ok(report)
}

//! Registry construction.
//!
//! Repositories are scanned in fixed-size batches: every repo in a batch runs
//! on its own task, the batch is joined in enumeration order, and only then
//! are results merged. This bounds in-flight requests to the batch size.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::{
    DescriptorParser, GithubClient, ModuleRoute, ProgressReporter, Registry, RegistryEntry,
    RegistryError, RegistryKey, RepoEnumerator, RepoRef,
};

/// What one repository contributed to the scan.
#[derive(Debug, Clone, Default)]
pub struct RepoScan {
    pub app_name: Option<String>,
    pub modules: Vec<ModuleRoute>,
}

/// Source of the repositories to scan and of per-repository scan results.
///
/// The GitHub-backed implementation is [`GithubScanner`]; the seam exists so
/// the build and cache logic can run against other hosts.
#[async_trait]
pub trait RepoScanner: Send + Sync + 'static {
    /// Repositories to scan, in registration-precedence order.
    async fn list_repositories(
        &self,
        progress: &ProgressReporter,
    ) -> Result<Vec<RepoRef>, RegistryError>;

    /// Scan a single repository. Failures yield an empty scan.
    async fn scan(&self, repo: &RepoRef) -> RepoScan;
}

/// Scanner over the GitHub REST API and raw file endpoints.
#[derive(Clone)]
pub struct GithubScanner {
    enumerator: Arc<RepoEnumerator>,
    parser: DescriptorParser,
}

impl GithubScanner {
    pub fn new(client: GithubClient) -> Self {
        Self {
            enumerator: Arc::new(RepoEnumerator::new(client.clone())),
            parser: DescriptorParser::new(client),
        }
    }

    /// Use a custom descriptor parser (e.g. with another path extractor).
    pub fn with_parser(mut self, parser: DescriptorParser) -> Self {
        self.parser = parser;
        self
    }
}

#[async_trait]
impl RepoScanner for GithubScanner {
    async fn list_repositories(
        &self,
        progress: &ProgressReporter,
    ) -> Result<Vec<RepoRef>, RegistryError> {
        Ok(self.enumerator.list_repositories(progress).await)
    }

    async fn scan(&self, repo: &RepoRef) -> RepoScan {
        let (app_name, modules) = tokio::join!(
            self.parser.fetch_app_name(repo),
            self.parser.fetch_modules_with_routes(repo)
        );
        RepoScan { app_name, modules }
    }
}

/// Builds a [`Registry`] from a scanner.
pub struct RegistryBuilder<S> {
    scanner: Arc<S>,
    batch_size: usize,
}

impl<S: RepoScanner> RegistryBuilder<S> {
    pub fn new(scanner: Arc<S>, batch_size: usize) -> Self {
        Self {
            scanner,
            batch_size: batch_size.max(1),
        }
    }

    /// Scan every repository and merge the results, first seen wins.
    ///
    /// Only an enumeration failure is propagated; per-repository failures
    /// count as "no data from this repo".
    pub async fn build(&self, progress: &ProgressReporter) -> Result<Registry, RegistryError> {
        progress.report("Fetching repo list...");
        let repos = self.scanner.list_repositories(progress).await?;
        let total = repos.len();
        info!(total, "scanning repositories");

        let mut registry = Registry::new();
        let mut scanned = 0;
        let mut found = 0;

        for batch in repos.chunks(self.batch_size) {
            let handles: Vec<_> = batch
                .iter()
                .cloned()
                .map(|repo| {
                    let scanner = Arc::clone(&self.scanner);
                    tokio::spawn(async move { scanner.scan(&repo).await })
                })
                .collect();

            let mut results = Vec::with_capacity(handles.len());
            for (repo, handle) in batch.iter().zip(handles) {
                match handle.await {
                    Ok(scan) => results.push((repo, scan)),
                    Err(e) => {
                        warn!(repo = %repo, error = %e, "scan task failed, skipping repo");
                    }
                }
            }

            for (repo, scan) in results {
                found += merge_scan(&mut registry, repo, scan);
            }

            scanned += batch.len();
            progress.report(&format!(
                "Scanning: {}/{} (found {} apps)",
                scanned, total, found
            ));
        }

        progress.report(&format!("Done! Found {} apps", found));
        info!(found, keys = registry.len(), "registry build complete");
        Ok(registry)
    }
}

/// Register one repository's results. Returns how many keys were new.
fn merge_scan(registry: &mut Registry, repo: &RepoRef, scan: RepoScan) -> usize {
    let github_repo = repo.full_name();
    let mut added = 0;

    if let Some(app_name) = scan.app_name {
        let key = RegistryKey::app_name(app_name.clone());
        if registry.register(key, RegistryEntry::new(app_name, github_repo.clone())) {
            added += 1;
        }
    }

    for module in scan.modules {
        for pathname in module.pathnames {
            let entry = RegistryEntry::new(module.module_id.clone(), github_repo.clone());
            if registry.register(RegistryKey::path(pathname), entry) {
                added += 1;
            }
        }
    }

    added
}

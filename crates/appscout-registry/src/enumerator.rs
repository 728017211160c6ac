//! Repository enumeration for the configured org.

use tracing::{debug, info, warn};

use crate::client::RepoListing;
use crate::{GithubClient, ProgressReporter, RepoRef};

/// Name fragments marking scaffolding repos whose manifests carry placeholder
/// app ids.
const PLACEHOLDER_MARKERS: [&str; 3] = ["starter", "template", "boilerplate"];

/// Whether a listed repository should be scanned.
pub fn is_scannable(listing: &RepoListing) -> bool {
    let Some(name) = listing.name.as_deref() else {
        return false;
    };
    if name.is_empty() || listing.archived {
        return false;
    }
    let lower = name.to_lowercase();
    !PLACEHOLDER_MARKERS.iter().any(|marker| lower.contains(marker))
}

/// Pages through the org listing and appends the configured extra repos.
pub struct RepoEnumerator {
    client: GithubClient,
}

impl RepoEnumerator {
    pub fn new(client: GithubClient) -> Self {
        Self { client }
    }

    /// List scannable repositories in listing order, then the extra repos.
    ///
    /// Never fails: on any request error the repos gathered so far are kept.
    pub async fn list_repositories(&self, progress: &ProgressReporter) -> Vec<RepoRef> {
        let config = self.client.config();
        let mut repos = Vec::new();
        let mut page = 1;

        loop {
            let listing = match self.client.list_repos_page(page).await {
                Ok(listing) => listing,
                Err(e) if e.is_rate_limited() => {
                    warn!(page, error = %e, "GitHub API rate limit reached");
                    progress.report("Rate limited - using partial results");
                    break;
                }
                Err(e) => {
                    warn!(page, error = %e, "error fetching repo list");
                    break;
                }
            };

            if listing.is_empty() {
                break;
            }

            let page_len = listing.len();
            repos.extend(listing.iter().filter(|l| is_scannable(l)).filter_map(|l| {
                l.name
                    .as_ref()
                    .map(|name| RepoRef::new(config.org.clone(), name.clone()))
            }));
            debug!(page, page_len, total = repos.len(), "listed repos");

            if page_len < config.per_page {
                break;
            }
            page += 1;
        }

        repos.extend(config.extra_repos.iter().cloned());
        info!(org = %config.org, count = repos.len(), "enumerated repositories");
        repos
    }
}

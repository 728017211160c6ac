//! Registry configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::RepoRef;

/// Default GitHub REST API base URL.
pub const DEFAULT_API_BASE_URL: &str = "https://api.github.com";

/// Default raw file content base URL.
pub const DEFAULT_RAW_BASE_URL: &str = "https://raw.githubusercontent.com";

/// Default organization to scan.
pub const DEFAULT_ORG: &str = "RedHatInsights";

/// Durable store key holding the registry snapshot.
pub const DEFAULT_CACHE_KEY: &str = "hcc-debugger-app-registry-v2";

/// Cache time-to-live (7 days).
pub const DEFAULT_TTL: Duration = Duration::from_secs(60 * 60 * 24 * 7);

/// Repositories listed per page of the org listing.
pub const DEFAULT_PER_PAGE: usize = 100;

/// Repositories scanned concurrently per batch.
pub const DEFAULT_BATCH_SIZE: usize = 20;

/// Configuration for scanning and caching.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the REST API used for the org listing.
    pub api_base_url: String,

    /// Base URL for raw file fetches (`{raw}/{org}/{repo}/{branch}/{path}`).
    pub raw_base_url: String,

    /// Organization whose repositories are scanned.
    pub org: String,

    /// Repositories outside the org that are always scanned, after the org's.
    pub extra_repos: Vec<RepoRef>,

    /// Branches tried in order; the first one that yields data wins.
    pub branches: Vec<String>,

    /// Page size for the org listing.
    pub per_page: usize,

    /// Number of repositories scanned concurrently.
    pub batch_size: usize,

    /// How long a built registry stays fresh.
    #[serde(with = "duration_secs")]
    pub ttl: Duration,

    /// Durable store key for the registry snapshot.
    pub cache_key: String,

    /// User-Agent header; GitHub rejects API requests without one.
    pub user_agent: String,

    /// Optional API token, only used to raise the rate limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            raw_base_url: DEFAULT_RAW_BASE_URL.to_string(),
            org: DEFAULT_ORG.to_string(),
            extra_repos: vec![RepoRef::new("osbuild", "image-builder-frontend")],
            branches: vec!["master".to_string(), "main".to_string()],
            per_page: DEFAULT_PER_PAGE,
            batch_size: DEFAULT_BATCH_SIZE,
            ttl: DEFAULT_TTL,
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            user_agent: concat!("appscout/", env!("CARGO_PKG_VERSION")).to_string(),
            token: None,
        }
    }
}

impl RegistryConfig {
    /// Point both API and raw fetches at one base URL (used with mock servers).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        let url = url.into();
        self.api_base_url = url.clone();
        self.raw_base_url = url;
        self
    }

    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn with_raw_base_url(mut self, url: impl Into<String>) -> Self {
        self.raw_base_url = url.into();
        self
    }

    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.org = org.into();
        self
    }

    pub fn with_extra_repos(mut self, repos: Vec<RepoRef>) -> Self {
        self.extra_repos = repos;
        self
    }

    pub fn with_branches(mut self, branches: Vec<String>) -> Self {
        self.branches = branches;
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_cache_key(mut self, key: impl Into<String>) -> Self {
        self.cache_key = key.into();
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token.filter(|t| !t.is_empty());
        self
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

//! Manifest, build-config and deployment-descriptor parsing.
//!
//! Each repository is probed for:
//! - `package.json` declaring `insights.appname`
//! - `fec.config.js` pointing at a non-default descriptor via `frontendCRDPath`
//! - a deployment descriptor (`deploy/frontend.yaml` by default) declaring
//!   modules and the pathnames they serve
//!
//! Every fetch or parse failure falls through to the next branch or path.
//! Nothing here returns an error to the builder.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::{GithubClient, ModuleRoute, RegistryError, RepoRef};

/// Manifest file carrying the declared app name.
pub const MANIFEST_PATH: &str = "package.json";

/// Build-config file that may point at a non-default descriptor.
pub const BUILD_CONFIG_PATH: &str = "fec.config.js";

/// Descriptor locations tried when the build config names none.
pub const DEFAULT_DESCRIPTOR_PATHS: [&str; 2] = ["deploy/frontend.yaml", "deploy/frontend.yml"];

static FRONTEND_CRD_PATH_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"frontendCRDPath[^'"]*['"]([^'"]+)['"]"#).unwrap());

// =============================================================================
// File models
// =============================================================================

#[derive(Debug, Default, Deserialize)]
struct PackageJson {
    #[serde(default)]
    insights: Option<InsightsSection>,
}

#[derive(Debug, Default, Deserialize)]
struct InsightsSection {
    #[serde(default)]
    appname: Option<String>,
}

/// A descriptor list whose ill-shaped items are dropped instead of failing
/// the whole document. Anything other than a sequence reads as empty.
#[derive(Debug)]
pub struct LenientList<T>(pub Vec<T>);

impl<T> Default for LenientList<T> {
    fn default() -> Self {
        Self(Vec::new())
    }
}

impl<T> LenientList<T> {
    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.0.iter()
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for LenientList<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let serde_yaml::Value::Sequence(items) = serde_yaml::Value::deserialize(deserializer)?
        else {
            return Ok(Self::default());
        };
        let mut kept = Vec::with_capacity(items.len());
        for item in items {
            match serde_yaml::from_value(item) {
                Ok(parsed) => kept.push(parsed),
                Err(e) => debug!(error = %e, "skipping malformed descriptor entry"),
            }
        }
        Ok(Self(kept))
    }
}

/// Deployment descriptor: `objects[].spec.module.modules[]`.
#[derive(Debug, Default, Deserialize)]
pub struct DeploymentDescriptor {
    #[serde(default)]
    pub objects: LenientList<DescriptorObject>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DescriptorObject {
    #[serde(default)]
    pub spec: Option<DescriptorSpec>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptorSpec {
    /// Parsed for completeness; lookup does not use it.
    #[serde(default)]
    pub deployment_repo: Option<String>,
    #[serde(default)]
    pub module: Option<DescriptorModuleSection>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DescriptorModuleSection {
    #[serde(default)]
    pub modules: LenientList<DescriptorModule>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DescriptorModule {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub routes: LenientList<DescriptorRoute>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DescriptorRoute {
    #[serde(default)]
    pub pathname: Option<String>,
}

impl DeploymentDescriptor {
    /// Modules with an id and at least one non-empty route pathname.
    pub fn module_routes(&self) -> Vec<ModuleRoute> {
        self.objects
            .iter()
            .filter_map(|obj| obj.spec.as_ref()?.module.as_ref())
            .flat_map(|section| section.modules.iter())
            .filter_map(|module| {
                let id = module.id.as_deref().filter(|id| !id.is_empty())?;
                let pathnames: Vec<String> = module
                    .routes
                    .iter()
                    .filter_map(|r| r.pathname.as_deref())
                    .filter(|p| !p.is_empty())
                    .map(String::from)
                    .collect();
                (!pathnames.is_empty()).then(|| ModuleRoute {
                    module_id: id.to_string(),
                    pathnames,
                })
            })
            .collect()
    }

    /// The first declared deployment repository, if any.
    pub fn deployment_repo(&self) -> Option<&str> {
        self.objects
            .iter()
            .filter_map(|obj| obj.spec.as_ref()?.deployment_repo.as_deref())
            .next()
    }
}

// =============================================================================
// Pure parsers
// =============================================================================

/// Extract a non-empty `insights.appname` from manifest JSON.
pub fn parse_app_name(manifest: &str) -> Result<Option<String>, RegistryError> {
    let pkg: PackageJson = serde_json::from_str(manifest)?;
    Ok(pkg
        .insights
        .and_then(|i| i.appname)
        .filter(|name| !name.is_empty()))
}

/// Parse a deployment descriptor into its module routes.
pub fn parse_module_routes(descriptor: &str) -> Result<Vec<ModuleRoute>, RegistryError> {
    if descriptor.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: Option<DeploymentDescriptor> = serde_yaml::from_str(descriptor)?;
    Ok(parsed.map(|d| d.module_routes()).unwrap_or_default())
}

/// Best-effort extraction of a descriptor path from build-config source text.
///
/// Kept behind a trait so the textual heuristic can be swapped for a real
/// parser without touching the builder.
pub trait DescriptorPathExtractor: Send + Sync {
    /// Return the repo-relative descriptor path declared in `source`, if any.
    fn extract(&self, source: &str) -> Option<String>;
}

/// Matches `frontendCRDPath` followed by a quoted path, e.g.
/// `frontendCRDPath: path.resolve(__dirname, './deploy/frontend.yaml')`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrontendCrdPathExtractor;

impl DescriptorPathExtractor for FrontendCrdPathExtractor {
    fn extract(&self, source: &str) -> Option<String> {
        let captured = FRONTEND_CRD_PATH_RE.captures(source)?.get(1)?.as_str();
        let path = captured.strip_prefix("./").unwrap_or(captured);
        (!path.is_empty()).then(|| path.to_string())
    }
}

// =============================================================================
// Fetching parser
// =============================================================================

/// Fetches and parses per-repository descriptor files.
#[derive(Clone)]
pub struct DescriptorParser {
    client: GithubClient,
    extractor: Arc<dyn DescriptorPathExtractor>,
}

impl DescriptorParser {
    pub fn new(client: GithubClient) -> Self {
        Self {
            client,
            extractor: Arc::new(FrontendCrdPathExtractor),
        }
    }

    /// Replace the build-config path extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn DescriptorPathExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    fn branches(&self) -> &[String] {
        &self.client.config().branches
    }

    /// The app name declared in the repository manifest, first branch wins.
    pub async fn fetch_app_name(&self, repo: &RepoRef) -> Option<String> {
        for branch in self.branches() {
            match self.try_app_name(repo, branch).await {
                Ok(Some(name)) => return Some(name),
                Ok(None) => {}
                Err(e) => {
                    debug!(repo = %repo, branch = %branch, error = %e, "manifest unreadable");
                }
            }
        }
        None
    }

    async fn try_app_name(
        &self,
        repo: &RepoRef,
        branch: &str,
    ) -> Result<Option<String>, RegistryError> {
        match self.client.fetch_raw(repo, branch, MANIFEST_PATH).await? {
            Some(body) => parse_app_name(&body),
            None => Ok(None),
        }
    }

    /// The descriptor path declared in the build config, first branch wins.
    pub async fn fetch_descriptor_path(&self, repo: &RepoRef) -> Option<String> {
        for branch in self.branches() {
            match self.client.fetch_raw(repo, branch, BUILD_CONFIG_PATH).await {
                Ok(Some(source)) => {
                    if let Some(path) = self.extractor.extract(&source) {
                        return Some(path);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    debug!(repo = %repo, branch = %branch, error = %e, "build config unreadable");
                }
            }
        }
        None
    }

    /// Modules and their routes from the first branch/path combination that
    /// declares any. Empty when nothing is found.
    pub async fn fetch_modules_with_routes(&self, repo: &RepoRef) -> Vec<ModuleRoute> {
        let candidates: Vec<String> = match self.fetch_descriptor_path(repo).await {
            Some(path) => vec![path],
            None => DEFAULT_DESCRIPTOR_PATHS.iter().map(|p| p.to_string()).collect(),
        };

        for branch in self.branches() {
            for path in &candidates {
                match self.try_modules(repo, branch, path).await {
                    Ok(modules) if !modules.is_empty() => return modules,
                    Ok(_) => {}
                    Err(e) => {
                        debug!(
                            repo = %repo,
                            branch = %branch,
                            path = %path,
                            error = %e,
                            "descriptor unreadable"
                        );
                    }
                }
            }
        }

        Vec::new()
    }

    async fn try_modules(
        &self,
        repo: &RepoRef,
        branch: &str,
        path: &str,
    ) -> Result<Vec<ModuleRoute>, RegistryError> {
        match self.client.fetch_raw(repo, branch, path).await? {
            Some(body) => parse_module_routes(&body),
            None => Ok(Vec::new()),
        }
    }
}

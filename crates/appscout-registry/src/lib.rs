//! App registry for a GitHub organization's frontend repositories.
//!
//! Scans every repository in an org, reads each one's `package.json`,
//! build config and deployment descriptor, and builds a registry mapping app
//! names and URL pathnames to the repository that serves them.
//!
//! ## Features
//!
//! - **Discovery**: paginated org listing with filtering and rate-limit tolerance
//! - **Build**: batched concurrent scanning, first-seen-wins merge
//! - **Cache**: in-memory snapshot over a durable store, 7 day TTL, stale fallback
//! - **Lookup**: exact path, longest segment-boundary prefix, then app name

pub mod builder;
pub mod cache;
mod client;
pub mod config;
pub mod descriptor;
pub mod enumerator;
mod error;
mod lookup;
mod progress;
pub mod store;
mod types;

pub use builder::{GithubScanner, RegistryBuilder, RepoScan, RepoScanner};
pub use cache::{CacheRecord, CacheState, RegistryCache};
pub use client::{GithubClient, RepoListing};
pub use config::RegistryConfig;
pub use descriptor::{DescriptorParser, DescriptorPathExtractor, FrontendCrdPathExtractor};
pub use enumerator::RepoEnumerator;
pub use error::RegistryError;
pub use lookup::is_boundary_prefix;
pub use progress::{ProgressCallback, ProgressReporter};
pub use store::{DurableStore, FileStore, MemoryStore};
pub use types::*;

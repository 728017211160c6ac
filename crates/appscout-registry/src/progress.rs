//! Progress reporting for registry builds.

use std::fmt;
use std::sync::Arc;

/// Callback receiving human-readable status lines.
pub type ProgressCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Observer handed to a build. Reporting through a silent reporter is a no-op.
#[derive(Clone, Default)]
pub struct ProgressReporter {
    callback: Option<ProgressCallback>,
}

impl ProgressReporter {
    pub fn new(callback: ProgressCallback) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    /// A reporter that drops every message.
    pub fn silent() -> Self {
        Self::default()
    }

    pub fn report(&self, status: &str) {
        if let Some(callback) = &self.callback {
            callback(status);
        }
    }
}

impl From<Option<ProgressCallback>> for ProgressReporter {
    fn from(callback: Option<ProgressCallback>) -> Self {
        Self { callback }
    }
}

impl fmt::Debug for ProgressReporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressReporter")
            .field("attached", &self.callback.is_some())
            .finish()
    }
}

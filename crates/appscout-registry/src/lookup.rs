//! Pathname and app-id resolution against a built registry.

use crate::{Registry, RegistryEntry, RegistryKey};

/// Whether `prefix` matches `pathname` on a path-segment boundary.
///
/// `/insights/advisor` matches `/insights/advisor`, `/insights/advisor/x` and
/// `/insights/advisor?tab=1`, but not `/insights/advisorXYZ`.
pub fn is_boundary_prefix(pathname: &str, prefix: &str) -> bool {
    if !pathname.starts_with(prefix) {
        return false;
    }
    matches!(pathname.as_bytes().get(prefix.len()), None | Some(b'/') | Some(b'?'))
}

impl Registry {
    /// Resolve an app id and optional pathname to an entry.
    ///
    /// In order: exact path key, longest boundary-respecting path prefix,
    /// then the `appname:` key. Equal-length candidates resolve to the one
    /// registered first.
    pub fn resolve(&self, app_id: &str, pathname: Option<&str>) -> Option<&RegistryEntry> {
        if let Some(pathname) = pathname.filter(|p| !p.is_empty()) {
            if let Some(entry) = self.get(&RegistryKey::path(pathname)) {
                return Some(entry);
            }
            if let Some(entry) = self.longest_prefix_match(pathname) {
                return Some(entry);
            }
        }

        self.get(&RegistryKey::app_name(app_id))
    }

    /// The entry whose registered path is the longest boundary prefix of
    /// `pathname`.
    pub fn longest_prefix_match(&self, pathname: &str) -> Option<&RegistryEntry> {
        let mut best: Option<(usize, &RegistryEntry)> = None;
        for (path, entry) in self.paths() {
            if !is_boundary_prefix(pathname, path) {
                continue;
            }
            if best.is_none_or(|(len, _)| path.len() > len) {
                best = Some((path.len(), entry));
            }
        }
        best.map(|(_, entry)| entry)
    }
}

/*!
Path preservation policy for archive entry names.

Every entry archived from a backup target keeps a bounded number of trailing
segments of the target's own path as a prefix, so two targets that share a
leaf name (say, two different `config/` trees) cannot collide at the archive
root while entry names stay short.
*/

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::warnlog::WarningLog;

/// Trailing root segments kept when the configuration does not say otherwise.
pub const DEFAULT_PRESERVE_LEVELS: usize = 2;

/// Maps absolute paths under a backup target to archive-relative paths.
pub struct PathPreserver {
    preserve_levels: usize,
    warnings: Arc<WarningLog>,
}

impl PathPreserver {
    pub fn new(preserve_levels: usize, warnings: Arc<WarningLog>) -> Self {
        Self {
            preserve_levels,
            warnings,
        }
    }

    /// Resolve `path` to its archive-relative name beneath `root`.
    ///
    /// The result is the last `min(preserve_levels, component_count(root))`
    /// segments of `root` followed by `path` relative to `root`. The
    /// filesystem root marker counts as a component but contributes no
    /// segment text, so the produced name is never absolute.
    ///
    /// A `path` outside `root` is a configuration error, not a crash: it is
    /// warned about and degraded to the final path segment alone.
    pub fn resolve(&self, path: &Path, root: &Path) -> PathBuf {
        let relative = match path.strip_prefix(root) {
            Ok(relative) => relative,
            Err(_) => {
                self.warnings.warn(&format!(
                    "Path {} is not under backup root {}",
                    path.display(),
                    root.display()
                ));
                return path.file_name().map(PathBuf::from).unwrap_or_default();
            }
        };

        let components: Vec<Component<'_>> = root.components().collect();
        let keep = self.preserve_levels.min(components.len());

        let mut preserved = PathBuf::new();
        for component in &components[components.len() - keep..] {
            if let Component::Normal(segment) = component {
                preserved.push(segment);
            }
        }
        preserved.push(relative);
        preserved
    }
}

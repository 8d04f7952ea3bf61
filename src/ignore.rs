use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::SyncError;

/// Names that are always skipped during tree traversal, in both directions,
/// regardless of what the user put in scb.options.
pub const ALWAYS_IGNORED: [&str; 3] = ["scb.log", "scb.config", "scb.options"];

/// Compiled ignore patterns. Matches basenames only; `.`/`..` components
/// are filtered by the reconciler before names reach the matcher.
#[derive(Debug)]
pub struct IgnoreSet {
    set: GlobSet,
}

impl IgnoreSet {
    /// Compile the user patterns plus the always-ignored triple. A pattern
    /// that does not parse makes the options file structurally invalid.
    pub fn build(patterns: &[String]) -> Result<IgnoreSet, SyncError> {
        let mut builder = GlobSetBuilder::new();
        for name in ALWAYS_IGNORED {
            builder.add(Glob::new(name).map_err(|e| {
                SyncError::ConfigInvalid(name.to_string(), e.to_string())
            })?);
        }
        for pat in patterns {
            let glob = Glob::new(pat)
                .map_err(|e| SyncError::ConfigInvalid(pat.clone(), e.to_string()))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| SyncError::ConfigInvalid("ignore_list".to_string(), e.to_string()))?;
        Ok(IgnoreSet { set })
    }

    pub fn is_ignored(&self, basename: &str) -> bool {
        self.set.is_match(basename)
    }
}

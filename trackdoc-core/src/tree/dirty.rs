//! Dirty-path accumulation
//!
//! The set never holds two paths in a prefix relation: recording a path
//! drops its recorded descendants, and a path already covered by a recorded
//! ancestor is not stored again.

use std::collections::BTreeSet;
use std::fmt;
use trackdoc_types::DotPath;

/// Counter bumped by every append
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Revision(pub u64);

impl Revision {
    pub const ZERO: Revision = Revision(0);

    pub fn next(self) -> Revision {
        Revision(self.0 + 1)
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Paths touched since the last successful save
#[derive(Debug, Clone, Default)]
pub struct DirtyPathSet {
    paths: BTreeSet<DotPath>,
    revision: Revision,
}

/// Paths plus the revision they were read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirtySnapshot {
    pub paths: Vec<DotPath>,
    pub revision: Revision,
}

impl DirtySnapshot {
    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl DirtyPathSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path`; returns true if the set changed
    ///
    /// The revision advances even when the path is already covered, so a
    /// snapshot taken earlier can tell that the subtree was touched again.
    pub fn append(&mut self, path: DotPath) -> bool {
        self.revision = self.revision.next();

        let mut ancestor = Some(path.clone());
        while let Some(candidate) = ancestor {
            if self.paths.contains(&candidate) {
                return false;
            }
            ancestor = candidate.parent();
        }

        // Descendants of `p` sort within ["p.", "p/") since '/' follows '.'.
        let low = DotPath::new(format!("{}.", path));
        let high = DotPath::new(format!("{}/", path));
        let covered: Vec<DotPath> = self.paths.range(low..high).cloned().collect();
        for sub in &covered {
            self.paths.remove(sub);
        }
        if !covered.is_empty() {
            tracing::debug!(path = %path, dropped = covered.len(), "subsumed recorded sub-paths");
        }

        self.paths.insert(path);
        true
    }

    pub fn contains(&self, path: &DotPath) -> bool {
        self.paths.contains(path)
    }

    /// Recorded paths in lexical order
    pub fn paths(&self) -> Vec<DotPath> {
        self.paths.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn snapshot(&self) -> DirtySnapshot {
        DirtySnapshot {
            paths: self.paths(),
            revision: self.revision,
        }
    }

    pub fn clear(&mut self) {
        self.paths.clear();
    }

    /// Clear everything if nothing was appended since `revision`
    ///
    /// Returns false and keeps every path otherwise; the set is never
    /// cleared partially.
    pub fn clear_if_revision(&mut self, revision: Revision) -> bool {
        if self.revision != revision {
            return false;
        }
        self.paths.clear();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(set: &DirtyPathSet) -> Vec<String> {
        set.paths().iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_ancestor_subsumes_descendants() {
        let mut set = DirtyPathSet::new();
        assert!(set.append("map.k.level".into()));
        assert!(set.append("map.j".into()));
        assert!(set.append("mapping".into()));
        assert!(set.append("map".into()));

        assert_eq!(paths(&set), vec!["map", "mapping"]);
    }

    #[test]
    fn test_covered_path_is_skipped() {
        let mut set = DirtyPathSet::new();
        set.append("items".into());
        assert!(!set.append("items.3".into()));
        assert!(!set.append("items".into()));
        assert_eq!(paths(&set), vec!["items"]);
        assert_eq!(set.revision(), Revision(3));
    }

    #[test]
    fn test_segment_boundaries() {
        let mut set = DirtyPathSet::new();
        set.append("a.b".into());
        set.append("a.bc".into());
        set.append("a.b0.x".into());
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_clear_if_revision_is_all_or_nothing() {
        let mut set = DirtyPathSet::new();
        set.append("a".into());
        let snapshot = set.snapshot();

        set.append("a".into());
        assert!(!set.clear_if_revision(snapshot.revision));
        assert_eq!(set.len(), 1);

        let snapshot = set.snapshot();
        assert!(set.clear_if_revision(snapshot.revision));
        assert!(set.is_empty());
    }
}

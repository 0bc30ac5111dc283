//! Package groups: named collections of package listfiles.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use compact_str::CompactString;
use indexmap::IndexMap;

/// A named collection of packages sharing one browsable namespace.
///
/// Each package contributes an ordered listfile of internal paths.
/// Packages keep their registration order; later packages take display
/// precedence when several packages claim the same path. A group is
/// immutable once it has been shared with the builder.
#[derive(Debug, Clone)]
pub struct PackageGroup {
    name: CompactString,
    source: PathBuf,
    separator: char,
    packages: IndexMap<CompactString, Arc<[CompactString]>>,
}

impl PackageGroup {
    /// Create an empty group loaded from `source`.
    ///
    /// The group is named after the source path.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        let source = source.into();
        Self {
            name: CompactString::new(source.to_string_lossy()),
            source,
            separator: '\\',
            packages: IndexMap::new(),
        }
    }

    /// Override the group name.
    pub fn with_name(mut self, name: impl Into<CompactString>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the path separator used inside this group's listfiles.
    pub fn with_separator(mut self, separator: char) -> Self {
        self.separator = separator;
        self
    }

    /// Register a package and its listfile.
    ///
    /// Registering the same package twice replaces its listfile but keeps
    /// its original position.
    pub fn with_package<I, S>(mut self, package: impl Into<CompactString>, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        self.add_package(package, paths);
        self
    }

    /// Register a package and its listfile in place.
    pub fn add_package<I, S>(&mut self, package: impl Into<CompactString>, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<CompactString>,
    {
        let paths: Arc<[CompactString]> = paths.into_iter().map(Into::into).collect();
        self.packages.insert(package.into(), paths);
    }

    /// Group name, used as the group component of reference identities.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path the group was loaded from.
    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Separator between path segments.
    pub fn separator(&self) -> char {
        self.separator
    }

    /// Get the listfile for a package, if one was loaded.
    pub fn listfile(&self, package: &str) -> Option<&[CompactString]> {
        self.packages.get(package).map(|paths| &paths[..])
    }

    /// Package names in registration order.
    pub fn package_names(&self) -> impl Iterator<Item = &str> {
        self.packages.keys().map(CompactString::as_str)
    }

    /// Number of packages in the group.
    pub fn package_count(&self) -> usize {
        self.packages.len()
    }

    /// Total number of listfile entries across all packages.
    pub fn total_entries(&self) -> usize {
        self.packages.values().map(|paths| paths.len()).sum()
    }

    /// Check if the group has no packages.
    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

//! Plain-text listfile loading.

use std::fs;
use std::path::{Path, PathBuf};

use compact_str::CompactString;
use pkgtree_core::{ListfileError, PackageGroup};
use tracing::debug;

/// File extensions recognised as listfiles.
pub const LISTFILE_EXTENSIONS: &[&str] = &["txt", "lst"];

/// Loads a package group from a source path.
pub trait PackageGroupLoader: Send + Sync {
    /// Load every package listfile found at `source`.
    fn load(&self, source: &Path) -> Result<PackageGroup, ListfileError>;
}

/// Loads a group from a directory of listfiles, one per package.
///
/// `common.MPQ.txt` becomes package `common.MPQ`. Packages are registered
/// in file-name order so later files take display precedence.
#[derive(Debug, Clone)]
pub struct ListfileDirectoryLoader {
    separator: char,
}

impl ListfileDirectoryLoader {
    /// Create a loader for listfiles using `separator` between segments.
    pub fn new(separator: char) -> Self {
        Self { separator }
    }

    fn listfiles(source: &Path) -> Result<Vec<PathBuf>, ListfileError> {
        let entries = fs::read_dir(source).map_err(|e| ListfileError::io(source, e))?;
        let mut listfiles = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ListfileError::io(source, e))?;
            let path = entry.path();
            let is_listfile = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| {
                    LISTFILE_EXTENSIONS
                        .iter()
                        .any(|known| ext.eq_ignore_ascii_case(known))
                });
            if is_listfile && path.is_file() {
                listfiles.push(path);
            }
        }
        listfiles.sort();
        Ok(listfiles)
    }
}

impl Default for ListfileDirectoryLoader {
    fn default() -> Self {
        Self::new('\\')
    }
}

impl PackageGroupLoader for ListfileDirectoryLoader {
    fn load(&self, source: &Path) -> Result<PackageGroup, ListfileError> {
        let metadata = fs::metadata(source).map_err(|e| ListfileError::io(source, e))?;
        if !metadata.is_dir() {
            return Err(ListfileError::NotADirectory {
                path: source.to_path_buf(),
            });
        }

        let listfiles = Self::listfiles(source)?;
        if listfiles.is_empty() {
            return Err(ListfileError::Empty {
                path: source.to_path_buf(),
            });
        }

        let mut group = PackageGroup::new(source).with_separator(self.separator);
        for listfile in listfiles {
            let Some(package) = listfile.file_stem() else {
                continue;
            };
            let package = CompactString::new(package.to_string_lossy());
            let paths = read_listfile(&listfile)?;
            debug!(%package, entries = paths.len(), "Loaded listfile");
            group.add_package(package, paths);
        }
        Ok(group)
    }
}

/// Read one listfile, keeping entry order.
///
/// Blank lines and `#` comments are skipped.
pub fn read_listfile(path: &Path) -> Result<Vec<CompactString>, ListfileError> {
    let contents = fs::read_to_string(path).map_err(|e| ListfileError::io(path, e))?;
    Ok(contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(CompactString::new)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_directory() {
        let temp = TempDir::new().unwrap();
        fs::write(temp.path().join("patch.MPQ.txt"), "World\\\nWorld\\b.wmo\n").unwrap();
        fs::write(temp.path().join("common.MPQ.txt"), "# header\n\nWorld\\\r\nWorld\\a.wmo\n").unwrap();
        fs::write(temp.path().join("readme.md"), "not a listfile").unwrap();

        let group = ListfileDirectoryLoader::default().load(temp.path()).unwrap();

        let packages: Vec<_> = group.package_names().collect();
        assert_eq!(packages, vec!["common.MPQ", "patch.MPQ"]);
        let common = group.listfile("common.MPQ").unwrap();
        assert_eq!(common.len(), 2);
        assert_eq!(common[1], "World\\a.wmo");
    }

    #[test]
    fn test_empty_directory_is_an_error() {
        let temp = TempDir::new().unwrap();
        let result = ListfileDirectoryLoader::default().load(temp.path());
        assert!(matches!(result, Err(ListfileError::Empty { .. })));
    }

    #[test]
    fn test_source_must_be_directory() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("common.MPQ.txt");
        fs::write(&file, "a.txt\n").unwrap();

        let result = ListfileDirectoryLoader::default().load(&file);
        assert!(matches!(result, Err(ListfileError::NotADirectory { .. })));

        let result = ListfileDirectoryLoader::default().load(&temp.path().join("missing"));
        assert!(matches!(result, Err(ListfileError::NotFound { .. })));
    }
}

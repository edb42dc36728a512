// src/index/walk.rs - Depth-first enumeration of Lua sources under a root

use super::IndexError;
use super::config::ProjectConfig;
use ignore::WalkBuilder;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use log::{debug, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct WalkResult {
    /// `.lua` files in depth-first order.
    pub files: Vec<PathBuf>,
    /// Files seen, Lua or not.
    pub seen: usize,
    /// The ceiling was passed and some directories were not entered.
    pub truncated: bool,
}

/// Build a matcher for the configured globs, relative to `root`.
pub fn ignore_matcher(root: &Path, config: &ProjectConfig) -> Result<Gitignore, IndexError> {
    let mut builder = GitignoreBuilder::new(root);
    for glob in &config.ignore {
        builder
            .add_line(None, glob)
            .map_err(|e| IndexError::Ignore(format!("{}: {}", glob, e)))?;
    }
    builder
        .build()
        .map_err(|e| IndexError::Ignore(e.to_string()))
}

/// Enumerate `.lua` files under `root`.
///
/// Only the configured globs apply; `.gitignore` files and hidden-file rules do not.
/// Each directory lists its files before its subdirectories, so a directory's files
/// are always finished; once more than `max_scan` files have been seen no further
/// directory is entered.
pub fn lua_files(root: &Path, config: &ProjectConfig) -> Result<WalkResult, IndexError> {
    let matcher = ignore_matcher(root, config)?;
    let max_scan = config.max_scan;
    let seen = Arc::new(AtomicUsize::new(0));
    let truncated = Arc::new(AtomicBool::new(false));

    let mut builder = WalkBuilder::new(root);
    builder
        .standard_filters(false)
        .sort_by_file_path(|a, b| (a.is_dir(), a).cmp(&(b.is_dir(), b)));
    {
        let seen = Arc::clone(&seen);
        let truncated = Arc::clone(&truncated);
        builder.filter_entry(move |entry| {
            if entry.depth() == 0 {
                return true;
            }
            let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
            if matcher.matched(entry.path(), is_dir).is_ignore() {
                debug!("Ignoring {}", entry.path().display());
                return false;
            }
            if !is_dir {
                seen.fetch_add(1, Ordering::Relaxed);
                return true;
            }
            if seen.load(Ordering::Relaxed) > max_scan {
                if !truncated.swap(true, Ordering::Relaxed) {
                    warn!(
                        "More than {} files under the project root; not descending into {}",
                        max_scan,
                        entry.path().display()
                    );
                }
                return false;
            }
            true
        });
    }

    let mut files = Vec::new();
    for entry in builder.build() {
        match entry {
            Ok(entry) => {
                let is_file = entry.file_type().is_some_and(|t| t.is_file());
                if is_file && entry.path().extension().is_some_and(|ext| ext == "lua") {
                    files.push(entry.into_path());
                }
            }
            Err(e) => warn!("Skipping unreadable entry: {}", e),
        }
    }

    Ok(WalkResult {
        files,
        seen: seen.load(Ordering::Relaxed),
        truncated: truncated.load(Ordering::Relaxed),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, "").unwrap();
    }

    fn relative(root: &Path, result: &WalkResult) -> Vec<String> {
        result
            .files
            .iter()
            .map(|p| p.strip_prefix(root).unwrap().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_default_ignores() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.lua");
        touch(dir.path(), "readme.md");
        touch(dir.path(), "lib/b.lua");
        touch(dir.path(), ".git/hooks/c.lua");
        touch(dir.path(), "node_modules/d.lua");
        let result = lua_files(dir.path(), &ProjectConfig::default()).unwrap();
        assert_eq!(relative(dir.path(), &result), vec!["a.lua", "lib/b.lua"]);
        assert!(!result.truncated);
    }

    #[test]
    fn test_globs_are_root_relative() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "build/out.lua");
        touch(dir.path(), "src/build/keep.lua");
        let config = ProjectConfig {
            ignore: vec!["/build".to_string()],
            ..ProjectConfig::default()
        };
        let result = lua_files(dir.path(), &config).unwrap();
        assert_eq!(relative(dir.path(), &result), vec!["src/build/keep.lua"]);
    }

    #[test]
    fn test_ceiling_finishes_current_directory() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a.lua");
        touch(dir.path(), "b.lua");
        touch(dir.path(), "c.lua");
        touch(dir.path(), "sub/d.lua");
        let config = ProjectConfig {
            max_scan: 2,
            ..ProjectConfig::default()
        };
        let result = lua_files(dir.path(), &config).unwrap();
        assert_eq!(relative(dir.path(), &result), vec!["a.lua", "b.lua", "c.lua"]);
        assert!(result.truncated);
        assert_eq!(result.seen, 3);
    }

    #[test]
    fn test_files_before_subdirectories() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "a/z.lua");
        touch(dir.path(), "b.lua");
        touch(dir.path(), "a/b/y.lua");
        touch(dir.path(), "c/x.lua");
        let result = lua_files(dir.path(), &ProjectConfig::default()).unwrap();
        assert_eq!(
            relative(dir.path(), &result),
            vec!["b.lua", "a/z.lua", "a/b/y.lua", "c/x.lua"]
        );
    }

    #[test]
    fn test_gitignore_files_do_not_apply() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "gen/out.lua");
        fs::write(dir.path().join(".gitignore"), "gen/\n").unwrap();
        let result = lua_files(dir.path(), &ProjectConfig::default()).unwrap();
        assert_eq!(relative(dir.path(), &result), vec!["gen/out.lua"]);
    }
}

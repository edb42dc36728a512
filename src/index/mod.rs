// src/index/mod.rs - Project symbol index backed by tag/API corpus files

pub mod config;
pub mod corpus;
pub mod extract;
pub mod walk;

pub use config::ProjectConfig;
pub use corpus::{ApiEntry, Corpus, TagEntry};
pub use extract::{Symbol, SymbolKind, extract_symbols, module_name_for};

use corpus::{STDLIB_PLACEHOLDER, file_label, resolve_label};
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

pub const STDLIB_SOURCE: &str = include_str!("stdlib.lua");
pub const STDLIB_FILE: &str = "stdlib.lua";

#[derive(thiserror::Error, Debug)]
pub enum IndexError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid project config {path}: {source}")]
    Config {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Invalid ignore pattern {0}")]
    Ignore(String),
    #[error("Corrupt corpus: {0}")]
    Corpus(String),
    #[error("No project root has been scanned")]
    NoRoot,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanSummary {
    pub files: usize,
    pub symbols: usize,
    pub truncated: bool,
}

struct Rescan {
    id: Uuid,
    corpus: Corpus,
}

/// Symbols of one project root plus the built-in declarations.
///
/// Full scans write `tags`/`api` into a private cache directory; a document rescan
/// writes `<uuid>.tags`/`<uuid>.api` and supersedes that file's entries. The cache is
/// removed when the index is dropped.
pub struct Index {
    cache: TempDir,
    root: Option<PathBuf>,
    config: ProjectConfig,
    project: Corpus,
    overrides: BTreeMap<String, Rescan>,
    stdlib: Corpus,
}

impl Index {
    pub fn new() -> Result<Self, IndexError> {
        let cache = tempfile::Builder::new()
            .prefix("quill-index-")
            .tempdir()
            .map_err(|source| IndexError::Io {
                path: std::env::temp_dir(),
                source,
            })?;

        let stdlib_dir = cache.path().join("stdlib");
        let stdlib_path = stdlib_dir.join(STDLIB_FILE);
        fs::create_dir_all(&stdlib_dir)
            .and_then(|_| fs::write(&stdlib_path, STDLIB_SOURCE))
            .map_err(|source| IndexError::Io {
                path: stdlib_path.clone(),
                source,
            })?;
        let symbols = extract_symbols(STDLIB_SOURCE, "stdlib");
        let stdlib = Corpus::from_symbols(&format!("{}/{}", STDLIB_PLACEHOLDER, STDLIB_FILE), &symbols);

        Ok(Self {
            cache,
            root: None,
            config: ProjectConfig::default(),
            project: Corpus::new(),
            overrides: BTreeMap::new(),
            stdlib,
        })
    }

    pub fn cache_dir(&self) -> &Path {
        self.cache.path()
    }

    /// Where `$STDLIB` points.
    pub fn stdlib_dir(&self) -> PathBuf {
        self.cache.path().join("stdlib")
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    pub fn config(&self) -> &ProjectConfig {
        &self.config
    }

    /// Index everything under `root` (or just `root` when it is a file), replacing
    /// whatever an earlier scan produced.
    pub fn scan(&mut self, root: &Path) -> Result<ScanSummary, IndexError> {
        let root = canonical(root);
        let root = root.as_path();
        let (root, files, truncated) = if root.is_file() {
            let dir = root.parent().unwrap_or(Path::new(".")).to_path_buf();
            self.config = load_config(&dir);
            (dir, vec![root.to_path_buf()], false)
        } else {
            self.config = load_config(root);
            let walk = walk::lua_files(root, &self.config)?;
            (root.to_path_buf(), walk.files, walk.truncated)
        };

        self.clear_cache();
        let mut project = Corpus::new();
        for (label, symbols) in extract_files(&root, &files) {
            project.extend(&label, &symbols);
        }

        let tags_path = self.cache.path().join("tags");
        let api_path = self.cache.path().join("api");
        project.write_files(&tags_path, &api_path)?;
        self.project = Corpus::load(&tags_path, &api_path)?;
        self.root = Some(root);

        let summary = ScanSummary {
            files: files.len(),
            symbols: self.project.len(),
            truncated,
        };
        info!(
            "Indexed {} symbols from {} files{}",
            summary.symbols,
            summary.files,
            if truncated { " (scan ceiling reached)" } else { "" }
        );
        Ok(summary)
    }

    /// Re-index one document from `text`, superseding its entries.
    ///
    /// The text is copied under a fresh uuid-named directory inside the cache and
    /// scanned there. The entries are stored under the real file's label.
    pub fn rescan_file(&mut self, path: &Path, text: &str) -> Result<usize, IndexError> {
        let root = self.root.clone().ok_or(IndexError::NoRoot)?;
        let path = canonical(path);
        // Files outside the root keep their absolute label; only the scratch copy is
        // named after the bare file name.
        let label = file_label(&path, &root);
        let relative = match path.strip_prefix(&root) {
            Ok(relative) => relative.to_path_buf(),
            Err(_) => PathBuf::from(path.file_name().unwrap_or(path.as_os_str())),
        };

        let id = Uuid::new_v4();
        let temp_root = self.cache.path().join(id.to_string());
        let copy = temp_root.join(&relative);
        if let Some(parent) = copy.parent() {
            fs::create_dir_all(parent).map_err(|source| IndexError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        fs::write(&copy, text).map_err(|source| IndexError::Io {
            path: copy.clone(),
            source,
        })?;

        let mut corpus = Corpus::new();
        for (_, symbols) in extract_files(&temp_root, &[copy]) {
            corpus.extend(&label, &symbols);
        }
        if let Err(e) = fs::remove_dir_all(&temp_root) {
            warn!("Cannot remove {}: {}", temp_root.display(), e);
        }

        let (tags_path, api_path) = corpus.write(self.cache.path(), &id.to_string())?;
        let corpus = Corpus::load(&tags_path, &api_path)?;
        let count = corpus.len();
        debug!("Rescanned {} as {}: {} symbols", label, id, count);
        if let Some(previous) = self.overrides.insert(label, Rescan { id, corpus }) {
            self.remove_rescan_files(previous.id);
        }
        Ok(count)
    }

    /// Drop a document's rescan so the full scan's entries apply again.
    pub fn forget_file(&mut self, path: &Path) {
        let label = self.label_for(path);
        if let Some(previous) = self.overrides.remove(&label) {
            self.remove_rescan_files(previous.id);
        }
    }

    pub fn label_for(&self, path: &Path) -> String {
        match &self.root {
            Some(root) => file_label(&canonical(path), root),
            None => path.to_string_lossy().to_string(),
        }
    }

    pub fn resolve(&self, tag: &TagEntry) -> PathBuf {
        let root = self.root.clone().unwrap_or_default();
        resolve_label(&tag.file, &root, &self.stdlib_dir())
    }

    /// Project entries by file path, then source order.
    pub fn project_entries(&self) -> Vec<(&TagEntry, &ApiEntry)> {
        let mut entries: Vec<(&TagEntry, &ApiEntry)> = self
            .project
            .entries()
            .filter(|(tag, _)| !self.overrides.contains_key(&tag.file))
            .collect();
        for rescan in self.overrides.values() {
            entries.extend(rescan.corpus.entries());
        }
        entries.sort_by(|a, b| a.0.file.cmp(&b.0.file));
        entries
    }

    /// Project entries followed by the built-in ones.
    pub fn entries(&self) -> Vec<(&TagEntry, &ApiEntry)> {
        let mut entries = self.project_entries();
        entries.extend(self.stdlib.entries());
        entries
    }

    /// The corpus files currently in the cache.
    pub fn corpus_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = fs::read_dir(self.cache.path())
            .map(|entries| {
                entries
                    .flatten()
                    .map(|e| e.path())
                    .filter(|p| p.is_file())
                    .collect()
            })
            .unwrap_or_default();
        files.sort();
        files
    }

    /// A new scan discards every earlier corpus file before writing its own.
    fn clear_cache(&mut self) {
        for path in self.corpus_files() {
            if let Err(e) = fs::remove_file(&path) {
                warn!("Cannot remove {}: {}", path.display(), e);
            }
        }
        self.overrides.clear();
        self.project = Corpus::new();
    }

    fn remove_rescan_files(&self, id: Uuid) {
        for ext in ["tags", "api"] {
            let path = self.cache.path().join(format!("{}.{}", id, ext));
            if let Err(e) = fs::remove_file(&path) {
                debug!("Cannot remove {}: {}", path.display(), e);
            }
        }
    }
}

/// Resolve symlinks where the path exists, so labels agree however a file was named.
pub fn canonical(path: &Path) -> PathBuf {
    path.canonicalize().unwrap_or_else(|_| path.to_path_buf())
}

fn load_config(root: &Path) -> ProjectConfig {
    ProjectConfig::load(root).unwrap_or_else(|e| {
        warn!("{}; using default project settings", e);
        ProjectConfig::default()
    })
}

/// Extract every file in parallel; results come back sorted by label. Unreadable
/// files are logged and left out.
fn extract_files(root: &Path, files: &[PathBuf]) -> Vec<(String, Vec<Symbol>)> {
    let mut results: Vec<(String, Vec<Symbol>)> = files
        .par_iter()
        .filter_map(|path| match fs::read_to_string(path) {
            Ok(text) => Some((
                file_label(path, root),
                extract_symbols(&text, &module_name_for(path)),
            )),
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                None
            }
        })
        .collect();
    results.sort_by(|a, b| a.0.cmp(&b.0));
    results
}

use super::IndexError;
use serde::Deserialize;
use std::path::Path;

pub const PROJECT_CONFIG_FILE: &str = ".lua-lsp.toml";

pub const DEFAULT_IGNORE: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    ".bzr",
    "node_modules",
    ".luarocks",
    "lua_modules",
];

pub const DEFAULT_MAX_SCAN: usize = 10_000;

/// `<root>/.lua-lsp.toml`. A present `ignore` list replaces the defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub ignore: Vec<String>,
    pub max_scan: usize,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            max_scan: DEFAULT_MAX_SCAN,
        }
    }
}

impl ProjectConfig {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The root's config file, or defaults when there is none.
    pub fn load(root: &Path) -> Result<Self, IndexError> {
        let path = root.join(PROJECT_CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&path).map_err(|source| IndexError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(&content).map_err(|source| IndexError::Config { path, source })
    }
}

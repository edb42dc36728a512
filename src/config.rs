use crate::lsp::client::ServerCommand;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const BUNDLED_SERVER: &str = "quill-lua-server";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config format in {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// `~/.config/quill/config.toml`
#[derive(Debug, Default, Deserialize)]
pub struct QuillConfig {
    #[serde(default)]
    pub servers: HashMap<String, ServerEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    pub init_options: Option<toml::Value>,
}

impl QuillConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// The user's config if there is a readable one, otherwise defaults.
    pub fn load() -> Self {
        match find_config_file() {
            Some(path) => Self::from_file(&path).unwrap_or_else(|e| {
                log::warn!("{}; using defaults", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Launch command for a language: user entry first, then the built-in defaults.
    pub fn server_command(&self, language_id: &str) -> Option<ServerCommand> {
        if let Some(entry) = self.servers.get(language_id) {
            return Some(ServerCommand {
                command: entry.command.clone(),
                args: entry.args.clone(),
                init_options: entry
                    .init_options
                    .as_ref()
                    .and_then(|value| serde_json::to_value(value).ok()),
            });
        }
        default_server_command(language_id)
    }
}

pub fn default_server_command(language_id: &str) -> Option<ServerCommand> {
    let (command, args) = match language_id {
        "lua" => (bundled_server_path(), vec![]),
        "rust" => ("rust-analyzer".to_string(), vec![]),
        "python" => ("pyright-langserver".to_string(), vec!["--stdio"]),
        "javascript" | "typescript" => {
            ("typescript-language-server".to_string(), vec!["--stdio"])
        }
        _ => return None,
    };
    Some(ServerCommand {
        command,
        args: args.iter().map(|s| s.to_string()).collect(),
        init_options: None,
    })
}

/// The bundled server next to the running binary, else whatever is on `PATH`.
fn bundled_server_path() -> String {
    std::env::current_exe()
        .ok()
        .map(|exe| exe.with_file_name(BUNDLED_SERVER))
        .filter(|path| path.exists())
        .map(|path| path.to_string_lossy().to_string())
        .unwrap_or_else(|| BUNDLED_SERVER.to_string())
}

pub fn get_config_dir() -> PathBuf {
    let config_home = dirs::config_dir().unwrap_or_else(|| {
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(".config")
    });
    config_home.join("quill")
}

pub fn find_config_file() -> Option<PathBuf> {
    let config_dir = get_config_dir();
    let paths = vec![
        config_dir.join("config.toml"),
        dirs::home_dir()?.join(".quill").join("config.toml"),
    ];

    paths.into_iter().find(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = QuillConfig::default();
        let python = config.server_command("python").unwrap();
        assert_eq!(python.command, "pyright-langserver");
        assert_eq!(python.args, vec!["--stdio"]);
        assert!(config.server_command("rust").unwrap().args.is_empty());
        assert!(config.server_command("lua").unwrap().command.ends_with(BUNDLED_SERVER));
        assert!(config.server_command("cobol").is_none());
    }

    #[test]
    fn test_user_entry_overrides_default() {
        let config = QuillConfig::parse(
            r#"
            [servers.lua]
            command = "lua-language-server"
            args = ["--stdio"]
            init_options = { diagnostics = false }
            "#,
        )
        .unwrap();
        let lua = config.server_command("lua").unwrap();
        assert_eq!(lua.command, "lua-language-server");
        assert_eq!(lua.init_options, Some(serde_json::json!({ "diagnostics": false })));
    }

    #[test]
    fn test_bad_file_reports_path() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "servers = 3").unwrap();
        let err = QuillConfig::from_file(&path).unwrap_err();
        assert!(err.to_string().contains("config.toml"));
    }
}

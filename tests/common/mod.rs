// Common test utilities: on-disk Lua projects and clients for the bundled server

use quill::lsp::client::{LspClient, ServerCommand};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Utilities for laying out Lua projects on disk
pub mod project {
    use super::*;

    /// Write `files` (relative path, contents) under a fresh temporary directory
    #[allow(dead_code)]
    pub fn lua_project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (relative, text) in files {
            let path = dir.path().join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(path, text).unwrap();
        }
        dir
    }

    pub const UTIL: &str = "\
--- Adds two numbers.
-- @param a first
-- @param b second
-- @return the sum
function util.add(a, b)
  return a + b
end
";

    pub const MAIN: &str = "\
local total = util.add(1, 2)
local s = \"text\"
print(s:upper())
";

    /// A project with a documented `util.add` and a caller
    #[allow(dead_code)]
    pub fn util_project() -> TempDir {
        lua_project(&[("util.lua", UTIL), ("main.lua", MAIN)])
    }

    #[allow(dead_code)]
    pub fn canonical(dir: &TempDir, relative: &str) -> PathBuf {
        dir.path().canonicalize().unwrap().join(relative)
    }
}

/// Utilities for talking to the compiled `quill-lua-server`
pub mod server {
    use super::*;

    #[allow(dead_code)]
    pub fn bundled_command() -> ServerCommand {
        ServerCommand {
            command: env!("CARGO_BIN_EXE_quill-lua-server").to_string(),
            args: Vec::new(),
            init_options: None,
        }
    }

    /// A client that has completed the handshake with the bundled server for `root`
    #[allow(dead_code)]
    pub async fn start_client(root: &Path) -> LspClient {
        LspClient::start("lua", root, &bundled_command())
            .await
            .expect("bundled server starts")
    }

    /// Client config that points `lua` at the compiled server
    #[allow(dead_code)]
    pub fn config_toml() -> String {
        format!(
            "[servers.lua]\ncommand = \"{}\"\n",
            env!("CARGO_BIN_EXE_quill-lua-server").replace('\\', "\\\\")
        )
    }
}

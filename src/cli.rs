use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "quill")]
#[command(version = "0.1.0")]
#[command(about = "Ask a language server about a source file")]
pub struct CliArgs {
    /// Client config to use instead of ~/.config/quill/config.toml
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Index a Lua project in-process and print the tag corpus
    Index {
        /// Project directory or single file
        root: PathBuf,
        /// Print the API-doc corpus instead of the tags
        #[arg(long)]
        api: bool,
    },
    /// Completion candidates at a position
    Complete(At),
    /// Documentation for the symbol at a position
    Hover(At),
    /// Signature of the call around a position
    Signature(At),
    /// Where the symbol at a position is declared
    Definition(At),
    /// Declarations in a file
    Symbols {
        file: PathBuf,
    },
    /// Declarations across the file's project whose name contains QUERY
    WorkspaceSymbol {
        file: PathBuf,
        query: String,
    },
}

/// A file and a 1-based line and column.
#[derive(Debug, Clone, Args)]
pub struct At {
    pub file: PathBuf,
    pub line: usize,
    pub column: usize,
}

impl At {
    /// Zero-based (line, column) for the editor cursor.
    pub fn cursor(&self) -> (usize, usize) {
        (self.line.saturating_sub(1), self.column.saturating_sub(1))
    }
}

impl Command {
    /// The file the command opens in the editor, if it goes through a server.
    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            Command::Index { .. } => None,
            Command::Complete(at)
            | Command::Hover(at)
            | Command::Signature(at)
            | Command::Definition(at) => Some(&at.file),
            Command::Symbols { file } | Command::WorkspaceSymbol { file, .. } => Some(file),
        }
    }
}

pub fn parse_args() -> CliArgs {
    CliArgs::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_position_command() {
        let args = CliArgs::parse_from(["quill", "hover", "src/a.lua", "3", "7"]);
        match &args.command {
            Command::Hover(at) => {
                assert_eq!(at.file, PathBuf::from("src/a.lua"));
                assert_eq!(at.cursor(), (2, 6));
            }
            other => panic!("unexpected command {:?}", other),
        }
        assert_eq!(args.command.file(), Some(&PathBuf::from("src/a.lua")));
        assert!(args.config.is_none());
    }

    #[test]
    fn test_parse_index_with_config() {
        let args = CliArgs::parse_from(["quill", "index", "proj", "--api", "-c", "my.toml"]);
        assert_eq!(args.config, Some(PathBuf::from("my.toml")));
        match args.command {
            Command::Index { root, api } => {
                assert_eq!(root, PathBuf::from("proj"));
                assert!(api);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_workspace_symbol_takes_query() {
        let args = CliArgs::parse_from(["quill", "workspace-symbol", "a.lua", "add"]);
        assert!(matches!(
            args.command,
            Command::WorkspaceSymbol { ref query, .. } if query == "add"
        ));
    }

    #[test]
    fn test_missing_subcommand_is_an_error() {
        assert!(CliArgs::try_parse_from(["quill"]).is_err());
    }

    #[test]
    fn test_position_is_clamped_at_one() {
        let at = At {
            file: PathBuf::from("a.lua"),
            line: 0,
            column: 0,
        };
        assert_eq!(at.cursor(), (0, 0));
    }
}

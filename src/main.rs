use anyhow::{Context, bail};
use lsp_types::{Location, SignatureHelp, SymbolInformation};
use quill::cli::{self, At, Command};
use quill::config::QuillConfig;
use quill::editor::Editor;
use quill::index::{Index, corpus};
use std::path::Path;

/// Open the file named on the command line, ask its language server one question,
/// print the answer, and shut the server down.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::parse_args();

    // Initialize logger (set RUST_LOG env var to control verbosity)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    if let Command::Index { root, api } = &args.command {
        return print_index(root, *api);
    }

    let config = match &args.config {
        Some(path) => QuillConfig::from_file(path)?,
        None => QuillConfig::load(),
    };
    let mut editor = Editor::new(config);
    let Some(file) = args.command.file() else {
        bail!("nothing to open");
    };
    editor
        .open_file(file)
        .await
        .with_context(|| format!("Cannot open {}", file.display()))?;

    match &args.command {
        Command::Index { .. } => {}
        Command::Complete(at) => {
            place_cursor(&mut editor, at);
            editor.completion().await;
            for line in editor.completion_manager.display_lines() {
                println!("{}", line);
            }
        }
        Command::Hover(at) => {
            place_cursor(&mut editor, at);
            if let Some(text) = editor.hover().await {
                println!("{}", text);
            }
        }
        Command::Signature(at) => {
            place_cursor(&mut editor, at);
            if let Some(help) = editor.signature_help().await {
                print_signatures(&help);
            }
        }
        Command::Definition(at) => {
            place_cursor(&mut editor, at);
            for location in editor.goto_definition().await {
                println!("{}", location_text(&location));
            }
        }
        Command::Symbols { .. } => print_symbols(&editor.document_symbols().await),
        Command::WorkspaceSymbol { query, .. } => {
            print_symbols(&editor.workspace_symbols(query).await)
        }
    }

    if let Some(status) = editor.status_message.take() {
        eprintln!("{}", status);
    }
    editor.shutdown().await;
    Ok(())
}

fn place_cursor(editor: &mut Editor, at: &At) {
    let (line, col) = at.cursor();
    editor.cursor.move_to(&editor.buffer, line, col);
}

fn print_index(root: &Path, api: bool) -> anyhow::Result<()> {
    let mut index = Index::new()?;
    let summary = index
        .scan(root)
        .with_context(|| format!("Cannot index {}", root.display()))?;
    for (tag, doc) in index.project_entries() {
        if api {
            println!("{}", doc.to_line());
        } else {
            println!("{}", tag.to_line());
        }
    }
    eprintln!(
        "{} symbols in {} files{}",
        summary.symbols,
        summary.files,
        if summary.truncated {
            format!(" (stopped after {} files)", index.config().max_scan)
        } else {
            String::new()
        }
    );
    if let Some(root) = index.root() {
        eprintln!("{} = {}", corpus::ROOT_PLACEHOLDER, root.display());
    }
    Ok(())
}

fn print_signatures(help: &SignatureHelp) {
    let active = help.active_signature.unwrap_or(0) as usize;
    for (i, signature) in help.signatures.iter().enumerate() {
        let marker = if i == active { ">" } else { " " };
        let parameter = signature
            .active_parameter
            .or(help.active_parameter)
            .map(|p| format!("  [argument {}]", p + 1))
            .unwrap_or_default();
        println!("{} {}{}", marker, signature.label, parameter);
    }
}

fn location_text(location: &Location) -> String {
    let path = location
        .uri
        .to_file_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| location.uri.to_string());
    format!(
        "{}:{}:{}",
        path,
        location.range.start.line + 1,
        location.range.start.character + 1
    )
}

fn print_symbols(symbols: &[SymbolInformation]) {
    for symbol in symbols {
        let name = match &symbol.container_name {
            Some(container) => format!("{}.{}", container, symbol.name),
            None => symbol.name.clone(),
        };
        println!(
            "{:<32} {:<10} {}",
            name,
            format!("{:?}", symbol.kind),
            location_text(&symbol.location)
        );
    }
}

// src/lsp/completion.rs - Completion list state on the client side

use lsp_types::{CompletionItem, CompletionItemKind, CompletionResponse, InsertTextFormat};
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug)]
pub struct CompletionManager {
    pub items: Vec<CompletionItem>,
    pub current_index: usize,
}

impl Default for CompletionManager {
    fn default() -> Self {
        Self::new()
    }
}

impl CompletionManager {
    pub fn new() -> Self {
        Self {
            items: vec![],
            current_index: 0,
        }
    }

    /// Replace the list with a server response; `None` clears it.
    pub fn set_response(&mut self, response: Option<CompletionResponse>) {
        self.items = match response {
            Some(CompletionResponse::Array(items)) => items,
            Some(CompletionResponse::List(list)) => list.items,
            None => vec![],
        };
        self.current_index = 0;
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn next_item(&mut self) {
        if !self.items.is_empty() {
            self.current_index = (self.current_index + 1) % self.items.len();
        }
    }

    pub fn prev_item(&mut self) {
        if !self.items.is_empty() {
            self.current_index = if self.current_index == 0 {
                self.items.len() - 1
            } else {
                self.current_index - 1
            };
        }
    }

    pub fn current_item(&self) -> Option<&CompletionItem> {
        self.items.get(self.current_index)
    }

    /// Text to insert for the selected item, with snippet placeholders flattened to
    /// their default text.
    pub fn accept_completion(&self) -> Option<String> {
        self.current_item().map(insertion_text)
    }

    /// Labels prefixed with a short kind tag, as the host's list shows them.
    pub fn display_lines(&self) -> Vec<String> {
        self.items
            .iter()
            .map(|item| format!("{:<8} {}", kind_tag(item.kind), item.label))
            .collect()
    }
}

pub fn insertion_text(item: &CompletionItem) -> String {
    let text = item
        .text_edit
        .as_ref()
        .map(|edit| match edit {
            lsp_types::CompletionTextEdit::Edit(edit) => edit.new_text.clone(),
            lsp_types::CompletionTextEdit::InsertAndReplace(edit) => edit.new_text.clone(),
        })
        .or_else(|| item.insert_text.clone())
        .unwrap_or_else(|| item.label.clone());
    if item.insert_text_format == Some(InsertTextFormat::SNIPPET) {
        strip_snippet(&text)
    } else {
        text
    }
}

/// `${1:name}` becomes `name`; bare tabstops (`$1`, `${2}`, `$0`) disappear.
pub fn strip_snippet(text: &str) -> String {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    static TABSTOP: OnceLock<Regex> = OnceLock::new();
    let placeholder =
        PLACEHOLDER.get_or_init(|| Regex::new(r"\$\{\d+:([^}]*)\}").expect("valid regex"));
    let tabstop = TABSTOP.get_or_init(|| Regex::new(r"\$\{\d+\}|\$\d+").expect("valid regex"));
    let text = placeholder.replace_all(text, "$1");
    tabstop.replace_all(&text, "").into_owned()
}

fn kind_tag(kind: Option<CompletionItemKind>) -> &'static str {
    match kind {
        Some(CompletionItemKind::MODULE) => "module",
        Some(CompletionItemKind::FUNCTION) => "function",
        Some(CompletionItemKind::METHOD) => "method",
        Some(CompletionItemKind::CLASS) => "table",
        Some(CompletionItemKind::FIELD) => "field",
        Some(CompletionItemKind::VARIABLE) => "local",
        _ => "",
    }
}

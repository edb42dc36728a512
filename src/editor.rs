// src/editor.rs - Host side: one active buffer wired to its language server

use crate::buffer::{Buffer, BufferError};
use crate::config::QuillConfig;
use crate::cursor::Cursor;
use crate::lsp::completion::CompletionManager;
use crate::lsp::diagnostics::DiagnosticManager;
use crate::lsp::events::ServerEvent;
use crate::lsp::manager::LspManager;
use crate::lsp::progress::ProgressManager;
use crate::viewport::Viewport;
use log::{debug, info};
use lsp_types::{
    CompletionContext, CompletionTriggerKind, DocumentSymbol, DocumentSymbolResponse,
    GotoDefinitionResponse, Hover, HoverContents, Location, MarkedString, SelectionRange,
    SignatureHelp, SymbolInformation, Url, WorkspaceSymbolResponse,
};
use std::path::Path;

pub struct Editor {
    pub buffer: Buffer,
    pub cursor: Cursor,
    pub viewport: Viewport,
    pub lsp_manager: LspManager,
    pub completion_manager: CompletionManager,
    pub diagnostic_manager: DiagnosticManager,
    pub progress_manager: ProgressManager,
    pub hover_content: Option<Vec<String>>,
    pub signature: Option<SignatureHelp>,
    pub status_message: Option<String>,
    /// showMessage / logMessage text, oldest first.
    pub messages: Vec<String>,
}

impl Default for Editor {
    fn default() -> Self {
        Self::new(QuillConfig::default())
    }
}

impl Editor {
    pub fn new(config: QuillConfig) -> Self {
        Self {
            buffer: Buffer::new(),
            cursor: Cursor::new(),
            viewport: Viewport::new(20, 80),
            lsp_manager: LspManager::new(config),
            completion_manager: CompletionManager::new(),
            diagnostic_manager: DiagnosticManager::new(),
            progress_manager: ProgressManager::new(),
            hover_content: None,
            signature: None,
            status_message: None,
            messages: Vec::new(),
        }
    }

    pub fn handle_resize(&mut self, rows: u16, cols: u16) {
        self.viewport.rows = rows as usize;
        self.viewport.cols = cols as usize;
    }

    pub fn get_buffer_uri(&self) -> Option<Url> {
        self.buffer.uri()
    }

    /// Make `path` the active buffer and announce it to its language server.
    pub async fn open_file(&mut self, path: &Path) -> Result<(), BufferError> {
        self.close_buffer().await;
        let mut buffer = Buffer::new();
        buffer.load_from_file(path)?;
        self.buffer = buffer;
        self.cursor = Cursor::new();
        self.viewport.reset();
        self.diagnostic_manager.set_active(self.buffer.uri());
        self.diagnostic_manager.project(&self.buffer, &mut self.viewport);
        self.notify_text_change().await;
        Ok(())
    }

    /// Push the buffer's current text to its server (didOpen or didChange).
    pub async fn notify_text_change(&mut self) {
        let result = match self.lsp_manager.client_for(&self.buffer).await {
            Some(client) => client.sync_buffer(&self.buffer).await.map(|_| ()),
            None => return self.take_manager_status(),
        };
        self.finish("didChange", result);
    }

    pub async fn save(&mut self) -> Result<(), BufferError> {
        let path = match self.buffer.file_path.clone() {
            Some(path) => path,
            None => return Err(BufferError::Io(std::io::Error::other("buffer has no file path"))),
        };
        self.buffer.save_to_file(&path)?;
        if let Some(client) = self.lsp_manager.existing_client(&self.buffer) {
            let result = match client.sync_buffer(&self.buffer).await {
                Ok(uri) => client.text_document_did_save(&uri, None).await,
                Err(e) => Err(e),
            };
            self.finish("didSave", result);
        }
        Ok(())
    }

    pub async fn close_buffer(&mut self) {
        let Some(uri) = self.buffer.uri() else {
            return;
        };
        if let Some(client) = self.lsp_manager.existing_client(&self.buffer) {
            let result = client.text_document_did_close(&uri).await;
            self.finish("didClose", result);
        }
        self.diagnostic_manager.set_active(None);
    }

    /// Insert at the cursor and move past the text.
    pub fn insert_text(&mut self, text: &str) -> Result<(), BufferError> {
        self.buffer
            .insert_text(text, self.cursor.line, self.cursor.col)?;
        let mut lines = text.split('\n');
        let first = lines.next().unwrap_or_default();
        let rest: Vec<&str> = lines.collect();
        match rest.last() {
            Some(last) => {
                self.cursor.line += rest.len();
                self.cursor.col = last.chars().count();
            }
            None => self.cursor.col += first.chars().count(),
        }
        Ok(())
    }

    /// Type one character; trigger characters the server declared open completion or
    /// signature help.
    pub async fn type_char(&mut self, c: char) -> Result<(), BufferError> {
        self.insert_text(&c.to_string())?;
        self.notify_text_change().await;
        let (completion, signature) = match self.lsp_manager.existing_client(&self.buffer) {
            Some(client) => (
                client.capabilities().is_completion_trigger(c),
                client.capabilities().is_signature_trigger(c),
            ),
            None => (false, false),
        };
        if completion {
            let context = CompletionContext {
                trigger_kind: CompletionTriggerKind::TRIGGER_CHARACTER,
                trigger_character: Some(c.to_string()),
            };
            self.request_completion(Some(context)).await;
        }
        if signature {
            self.signature_help().await;
        }
        Ok(())
    }

    pub async fn completion(&mut self) -> usize {
        let context = CompletionContext {
            trigger_kind: CompletionTriggerKind::INVOKED,
            trigger_character: None,
        };
        self.request_completion(Some(context)).await
    }

    async fn request_completion(&mut self, context: Option<CompletionContext>) -> usize {
        let position = self.buffer.lsp_position(self.cursor.line, self.cursor.col);
        let result = match self.lsp_manager.client_for(&self.buffer).await {
            Some(client) => match client.sync_buffer(&self.buffer).await {
                Ok(uri) => client.completion(&uri, position, context).await,
                Err(e) => Err(e),
            },
            None => {
                self.take_manager_status();
                return 0;
            }
        };
        let response = self.finish("completion", result).flatten();
        self.completion_manager.set_response(response);
        self.completion_manager.items.len()
    }

    /// Replace the word left of the cursor with the selected completion.
    pub fn accept_completion(&mut self) -> Result<bool, BufferError> {
        let Some(text) = self.completion_manager.accept_completion() else {
            return Ok(false);
        };
        let line = self.buffer.line(self.cursor.line).unwrap_or_default();
        let before: Vec<char> = line.chars().take(self.cursor.col).collect();
        let word_len = before
            .iter()
            .rev()
            .take_while(|c| c.is_alphanumeric() || **c == '_')
            .count();
        let line_start = self.buffer.rope.try_line_to_char(self.cursor.line)?;
        let end = line_start + self.cursor.col;
        self.buffer.delete_range(end - word_len, end)?;
        self.cursor.col -= word_len;
        self.insert_text(&text)?;
        self.completion_manager.set_response(None);
        Ok(true)
    }

    pub async fn hover(&mut self) -> Option<String> {
        let position = self.buffer.lsp_position(self.cursor.line, self.cursor.col);
        let result = match self.lsp_manager.client_for(&self.buffer).await {
            Some(client) => match client.sync_buffer(&self.buffer).await {
                Ok(uri) => client.hover(&uri, position).await,
                Err(e) => Err(e),
            },
            None => {
                self.take_manager_status();
                return None;
            }
        };
        let text = self.finish("hover", result).flatten().map(hover_text);
        self.hover_content = text.as_ref().map(|t| t.lines().map(str::to_string).collect());
        text
    }

    pub fn hide_hover(&mut self) {
        self.hover_content = None;
    }

    pub async fn signature_help(&mut self) -> Option<SignatureHelp> {
        let position = self.buffer.lsp_position(self.cursor.line, self.cursor.col);
        let result = match self.lsp_manager.client_for(&self.buffer).await {
            Some(client) => match client.sync_buffer(&self.buffer).await {
                Ok(uri) => client.signature_help(&uri, position).await,
                Err(e) => Err(e),
            },
            None => {
                self.take_manager_status();
                return None;
            }
        };
        self.signature = self.finish("signatureHelp", result).flatten();
        self.signature.clone()
    }

    /// Definition locations for the word at the cursor. A single hit is jumped to;
    /// several are returned for the host to pick from.
    pub async fn goto_definition(&mut self) -> Vec<Location> {
        let locations = self.locations(LocationKind::Definition).await;
        match locations.as_slice() {
            [] => self.status_message = Some("No definition found".to_string()),
            [only] => {
                let target = only.clone();
                self.jump_to(&target).await;
            }
            _ => {}
        }
        locations
    }

    pub async fn goto_declaration(&mut self) -> Vec<Location> {
        self.locations(LocationKind::Declaration).await
    }

    pub async fn goto_type_definition(&mut self) -> Vec<Location> {
        self.locations(LocationKind::TypeDefinition).await
    }

    pub async fn goto_implementation(&mut self) -> Vec<Location> {
        self.locations(LocationKind::Implementation).await
    }

    pub async fn find_references(&mut self) -> Vec<Location> {
        self.locations(LocationKind::References).await
    }

    async fn locations(&mut self, kind: LocationKind) -> Vec<Location> {
        let position = self.buffer.lsp_position(self.cursor.line, self.cursor.col);
        let result = match self.lsp_manager.client_for(&self.buffer).await {
            Some(client) => match client.sync_buffer(&self.buffer).await {
                Ok(uri) => match kind {
                    LocationKind::Definition => client.goto_definition(&uri, position).await,
                    LocationKind::Declaration => client.goto_declaration(&uri, position).await,
                    LocationKind::TypeDefinition => {
                        client.goto_type_definition(&uri, position).await
                    }
                    LocationKind::Implementation => {
                        client.goto_implementation(&uri, position).await
                    }
                    LocationKind::References => client
                        .find_references(&uri, position, true)
                        .await
                        .map(|found| found.map(GotoDefinitionResponse::Array)),
                },
                Err(e) => Err(e),
            },
            None => {
                self.take_manager_status();
                return vec![];
            }
        };
        self.finish(kind.feature(), result)
            .flatten()
            .map(flatten_locations)
            .unwrap_or_default()
    }

    /// Move the cursor to a location, opening its file first when it is not the
    /// active buffer.
    pub async fn jump_to(&mut self, location: &Location) {
        if self.buffer.uri().as_ref() != Some(&location.uri) {
            let Ok(path) = location.uri.to_file_path() else {
                return;
            };
            if let Err(e) = self.open_file(&path).await {
                self.status_message = Some(format!("Cannot open {}: {}", path.display(), e));
                return;
            }
        }
        let (line, col) = self.buffer.caret(location.range.start);
        self.cursor.move_to(&self.buffer, line, col);
        self.viewport.reveal(self.cursor.line, self.cursor.col);
    }

    /// Symbols of the active file, flattened in document order.
    pub async fn document_symbols(&mut self) -> Vec<SymbolInformation> {
        let result = match self.lsp_manager.client_for(&self.buffer).await {
            Some(client) => match client.sync_buffer(&self.buffer).await {
                Ok(uri) => client
                    .document_symbols(&uri)
                    .await
                    .map(|found| found.map(|response| (uri, response))),
                Err(e) => Err(e),
            },
            None => {
                self.take_manager_status();
                return vec![];
            }
        };
        match self.finish("documentSymbol", result).flatten() {
            Some((_, DocumentSymbolResponse::Flat(symbols))) => symbols,
            Some((uri, DocumentSymbolResponse::Nested(symbols))) => {
                let mut flat = Vec::new();
                flatten_symbols(&uri, &symbols, None, &mut flat);
                flat
            }
            None => vec![],
        }
    }

    pub async fn workspace_symbols(&mut self, query: &str) -> Vec<SymbolInformation> {
        let result = match self.lsp_manager.client_for(&self.buffer).await {
            Some(client) => client.workspace_symbols(query.to_string()).await,
            None => {
                self.take_manager_status();
                return vec![];
            }
        };
        match self.finish("workspaceSymbol", result).flatten() {
            Some(WorkspaceSymbolResponse::Flat(symbols)) => symbols,
            Some(WorkspaceSymbolResponse::Nested(symbols)) => symbols
                .into_iter()
                .filter_map(|symbol| match symbol.location {
                    lsp_types::OneOf::Left(location) => {
                        #[allow(deprecated)]
                        Some(SymbolInformation {
                            name: symbol.name,
                            kind: symbol.kind,
                            tags: symbol.tags,
                            deprecated: None,
                            location,
                            container_name: symbol.container_name,
                        })
                    }
                    lsp_types::OneOf::Right(_) => None,
                })
                .collect(),
            None => vec![],
        }
    }

    /// Nested ranges around the cursor, innermost first.
    pub async fn selection_range(&mut self) -> Vec<lsp_types::Range> {
        let position = self.buffer.lsp_position(self.cursor.line, self.cursor.col);
        let result = match self.lsp_manager.client_for(&self.buffer).await {
            Some(client) => match client.sync_buffer(&self.buffer).await {
                Ok(uri) => client.selection_ranges(&uri, vec![position]).await,
                Err(e) => Err(e),
            },
            None => {
                self.take_manager_status();
                return vec![];
            }
        };
        let mut ranges = Vec::new();
        let mut current: Option<SelectionRange> = self
            .finish("selectionRange", result)
            .flatten()
            .and_then(|found| found.into_iter().next());
        while let Some(range) = current {
            ranges.push(range.range);
            current = range.parent.map(|parent| *parent);
        }
        ranges
    }

    /// Handle whatever the servers sent while the host was idle.
    pub async fn process_events(&mut self) {
        for key in self.lsp_manager.reap() {
            self.status_message = Some(format!("{} language server stopped", key.0));
        }
        let events = self.lsp_manager.poll_all().await;
        self.replay(events.into_iter().map(|(_, event)| event).collect());
    }

    pub async fn shutdown(&mut self) {
        self.close_buffer().await;
        if let Err(e) = self.lsp_manager.shutdown_all().await {
            info!("Language servers did not shut down cleanly: {}", e);
        }
    }

    /// Replay the connection's buffered events, then reduce the outcome to a value or
    /// nothing.
    fn finish<T>(&mut self, feature: &str, result: Result<T, crate::lsp::client::LspError>) -> Option<T> {
        let events = self.lsp_manager.drain_events(&self.buffer);
        self.replay(events);
        let value = self.lsp_manager.degrade(feature, result);
        self.take_manager_status();
        value
    }

    fn take_manager_status(&mut self) {
        if let Some(status) = self.lsp_manager.take_status() {
            self.status_message = Some(status);
        }
    }

    fn replay(&mut self, events: Vec<ServerEvent>) {
        for event in events {
            match event {
                ServerEvent::Diagnostics(params) => {
                    self.diagnostic_manager
                        .publish(params, &self.buffer, &mut self.viewport);
                }
                ServerEvent::ShowMessage(params) => {
                    self.status_message = Some(params.message.clone());
                    self.messages.push(params.message);
                }
                ServerEvent::LogMessage(params) => {
                    debug!("server: {}", params.message);
                    self.messages.push(params.message);
                }
                ServerEvent::Progress(params) => self.progress_manager.apply(params),
                ServerEvent::Request { method, .. } => debug!("Answered server request {}", method),
                ServerEvent::Unknown { method, .. } => debug!("Ignoring {}", method),
            }
        }
    }
}

#[derive(Clone, Copy)]
enum LocationKind {
    Definition,
    Declaration,
    TypeDefinition,
    Implementation,
    References,
}

impl LocationKind {
    fn feature(self) -> &'static str {
        match self {
            LocationKind::Definition => "definition",
            LocationKind::Declaration => "declaration",
            LocationKind::TypeDefinition => "typeDefinition",
            LocationKind::Implementation => "implementation",
            LocationKind::References => "references",
        }
    }
}

pub fn hover_text(hover: Hover) -> String {
    fn marked(s: MarkedString) -> String {
        match s {
            MarkedString::String(s) => s,
            MarkedString::LanguageString(ls) => ls.value,
        }
    }
    match hover.contents {
        HoverContents::Scalar(s) => marked(s),
        HoverContents::Array(items) => items.into_iter().map(marked).collect::<Vec<_>>().join("\n"),
        HoverContents::Markup(markup) => markup.value,
    }
}

pub fn flatten_locations(response: GotoDefinitionResponse) -> Vec<Location> {
    match response {
        GotoDefinitionResponse::Scalar(location) => vec![location],
        GotoDefinitionResponse::Array(locations) => locations,
        GotoDefinitionResponse::Link(links) => links
            .into_iter()
            .map(|link| Location {
                uri: link.target_uri,
                range: link.target_selection_range,
            })
            .collect(),
    }
}

fn flatten_symbols(
    uri: &Url,
    symbols: &[DocumentSymbol],
    container: Option<&str>,
    out: &mut Vec<SymbolInformation>,
) {
    for symbol in symbols {
        #[allow(deprecated)]
        out.push(SymbolInformation {
            name: symbol.name.clone(),
            kind: symbol.kind,
            tags: symbol.tags.clone(),
            deprecated: None,
            location: Location {
                uri: uri.clone(),
                range: symbol.selection_range,
            },
            container_name: container.map(str::to_string),
        });
        if let Some(children) = &symbol.children {
            flatten_symbols(uri, children, Some(&symbol.name), out);
        }
    }
}

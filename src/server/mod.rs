// src/server/mod.rs - The bundled Lua language server

pub mod message;

pub use message::{ClientNotification, ClientRequest};

use crate::index::{Index, IndexError, module_name_for};
use crate::lsp::codec::{FrameError, FrameReader, FrameWriter};
use crate::lsp::transport::{decode_message, encode_message};
use crate::query::{self, Documents};
use log::{debug, error, info, warn};
use lsp_server::{ErrorCode, Message, Notification, Request, RequestId, Response};
use lsp_types::{
    CompletionOptions, CompletionResponse, DeclarationCapability, DocumentSymbolResponse,
    GotoDefinitionResponse, HoverProviderCapability, InitializeParams, InitializeResult, OneOf,
    Position, SaveOptions, SelectionRangeProviderCapability, ServerCapabilities, ServerInfo,
    SignatureHelpOptions, TextDocumentSyncCapability, TextDocumentSyncKind,
    TextDocumentSyncOptions, TextDocumentSyncSaveOptions, Url, WorkspaceSymbolResponse,
};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;
use tokio::io::{AsyncRead, AsyncWrite};

pub const SERVER_NAME: &str = "quill-lua-server";

#[derive(thiserror::Error, Debug)]
pub enum ServerError {
    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Index error: {0}")]
    Index(#[from] IndexError),
}

/// Whether the message loop keeps going.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit,
}

pub fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(TextDocumentSyncOptions {
            open_close: Some(true),
            change: Some(TextDocumentSyncKind::FULL),
            save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                include_text: Some(false),
            })),
            ..Default::default()
        })),
        completion_provider: Some(CompletionOptions {
            trigger_characters: Some(vec![".".to_string(), ":".to_string()]),
            resolve_provider: Some(false),
            ..Default::default()
        }),
        signature_help_provider: Some(SignatureHelpOptions {
            trigger_characters: Some(vec!["(".to_string(), "{".to_string(), ",".to_string()]),
            retrigger_characters: None,
            work_done_progress_options: Default::default(),
        }),
        hover_provider: Some(HoverProviderCapability::Simple(true)),
        definition_provider: Some(OneOf::Left(true)),
        declaration_provider: Some(DeclarationCapability::Simple(true)),
        document_symbol_provider: Some(OneOf::Left(true)),
        workspace_symbol_provider: Some(OneOf::Left(true)),
        selection_range_provider: Some(SelectionRangeProviderCapability::Simple(true)),
        ..Default::default()
    }
}

/// Index and open-document state behind one client connection.
pub struct LuaServer {
    index: Index,
    documents: Documents,
    initialized: bool,
    shutdown_requested: bool,
}

impl LuaServer {
    pub fn new() -> Result<Self, IndexError> {
        Ok(Self {
            index: Index::new()?,
            documents: Documents::new(),
            initialized: false,
            shutdown_requested: false,
        })
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn handle_request(&mut self, request: Request) -> Response {
        let Request { id, method, params } = request;
        if self.shutdown_requested {
            return error_response(id, ErrorCode::InvalidRequest, "server is shutting down");
        }
        let parsed = match ClientRequest::parse(&method, params) {
            Ok(parsed) => parsed,
            Err(e) => {
                return error_response(id, ErrorCode::InvalidParams, &format!("{}: {}", method, e));
            }
        };
        if !self.initialized && !matches!(parsed, ClientRequest::Initialize(_)) {
            return error_response(id, ErrorCode::ServerNotInitialized, "initialize first");
        }
        debug!("Handling {}", method);

        match parsed {
            ClientRequest::Initialize(params) => ok(id, self.initialize(*params)),
            ClientRequest::Shutdown => {
                self.shutdown_requested = true;
                Response::new_ok(id, ())
            }
            ClientRequest::Completion(params) => {
                let at = params.text_document_position;
                let items = self
                    .with_document(&at.text_document.uri, |index, label, text| {
                        query::complete(index, label, text, at.position)
                    })
                    .unwrap_or_default();
                ok(id, CompletionResponse::Array(items))
            }
            ClientRequest::Hover(params) => {
                let at = params.text_document_position_params;
                let hover = self
                    .with_document(&at.text_document.uri, |index, label, text| {
                        query::hover(index, label, text, at.position)
                    })
                    .flatten();
                ok(id, hover)
            }
            ClientRequest::SignatureHelp(params) => {
                let at = params.text_document_position_params;
                let help = self
                    .with_document(&at.text_document.uri, |index, label, text| {
                        query::signature_help(index, label, text, at.position)
                    })
                    .flatten();
                ok(id, help)
            }
            ClientRequest::Definition(params) | ClientRequest::Declaration(params) => {
                let at = params.text_document_position_params;
                ok(id, self.definition(&at.text_document.uri, at.position))
            }
            ClientRequest::DocumentSymbol(params) => {
                let uri = params.text_document.uri;
                let symbols = self.with_document(&uri, |_, _, text| {
                    let module = uri
                        .to_file_path()
                        .map(|path| module_name_for(&path))
                        .unwrap_or_default();
                    query::document_symbols(&uri, text, &module)
                });
                ok(id, symbols.map(DocumentSymbolResponse::Flat))
            }
            ClientRequest::WorkspaceSymbol(params) => {
                let symbols =
                    query::workspace_symbols(&self.index, &self.documents, &params.query);
                ok(id, Some(WorkspaceSymbolResponse::Flat(symbols)))
            }
            ClientRequest::SelectionRange(params) => {
                let ranges = self.with_document(&params.text_document.uri, |_, _, text| {
                    query::selection_ranges(text, &params.positions)
                });
                ok(id, ranges)
            }
            ClientRequest::NoResult(_) => Response::new_ok(id, ()),
            ClientRequest::Unknown(method) => error_response(
                id,
                ErrorCode::MethodNotFound,
                &format!("unsupported request: {}", method),
            ),
        }
    }

    pub fn handle_notification(&mut self, notification: Notification) -> Flow {
        let Notification { method, params } = notification;
        let parsed = match ClientNotification::parse(&method, params) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!("Ignoring {} with bad params: {}", method, e);
                return Flow::Continue;
            }
        };

        match parsed {
            ClientNotification::Exit => return Flow::Exit,
            ClientNotification::Initialized => debug!("Client finished initializing"),
            ClientNotification::DidOpen(params) => {
                let document = params.text_document;
                self.update_document(&document.uri, document.text);
            }
            ClientNotification::DidChange(params) => {
                // Full sync: the last change carries the whole text.
                if let Some(change) = params.content_changes.into_iter().last() {
                    self.update_document(&params.text_document.uri, change.text);
                }
            }
            ClientNotification::DidSave(params) => {
                let uri = params.text_document.uri;
                let text = match params.text {
                    Some(text) => Some(text),
                    None => uri.to_file_path().ok().and_then(|p| self.documents.source(&p)),
                };
                if let Some(text) = text {
                    self.update_document(&uri, text);
                }
            }
            ClientNotification::DidClose(params) => {
                self.close_document(&params.text_document.uri);
            }
            ClientNotification::Unknown(method) => debug!("Ignoring notification {}", method),
        }
        Flow::Continue
    }

    fn initialize(&mut self, params: InitializeParams) -> InitializeResult {
        match root_of(&params) {
            Some(root) => match self.index.scan(&root) {
                Ok(summary) => info!(
                    "Scanned {}: {} files, {} symbols",
                    root.display(),
                    summary.files,
                    summary.symbols
                ),
                Err(e) => error!("Cannot index {}: {}", root.display(), e),
            },
            None => warn!("No root given; only built-in symbols are available"),
        }
        self.initialized = true;
        InitializeResult {
            capabilities: server_capabilities(),
            server_info: Some(ServerInfo {
                name: SERVER_NAME.to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        }
    }

    fn with_document<T>(&self, uri: &Url, f: impl FnOnce(&Index, &str, &str) -> T) -> Option<T> {
        let path = uri.to_file_path().ok()?;
        let text = self.documents.source(&path)?;
        let label = self.index.label_for(&path);
        Some(f(&self.index, &label, &text))
    }

    fn definition(&self, uri: &Url, position: Position) -> Option<GotoDefinitionResponse> {
        let locations = self.with_document(uri, |index, label, text| {
            query::definition(index, &self.documents, label, text, position)
        })?;
        if locations.is_empty() {
            None
        } else {
            Some(GotoDefinitionResponse::Array(locations))
        }
    }

    fn update_document(&mut self, uri: &Url, text: String) {
        let Ok(path) = uri.to_file_path() else {
            warn!("Ignoring non-file document {}", uri);
            return;
        };
        if self.index.root().is_some() {
            if let Err(e) = self.index.rescan_file(&path, &text) {
                warn!("Cannot rescan {}: {}", path.display(), e);
            }
        }
        self.documents.update(&path, text);
    }

    fn close_document(&mut self, uri: &Url) {
        let Ok(path) = uri.to_file_path() else {
            return;
        };
        self.documents.close(&path);
        if self.index.root().is_none() {
            return;
        }
        match fs::read_to_string(&path) {
            Ok(text) => {
                if let Err(e) = self.index.rescan_file(&path, &text) {
                    warn!("Cannot rescan {}: {}", path.display(), e);
                }
            }
            Err(_) => self.index.forget_file(&path),
        }
    }
}

#[allow(deprecated)]
fn root_of(params: &InitializeParams) -> Option<PathBuf> {
    params
        .root_uri
        .as_ref()
        .and_then(|uri| uri.to_file_path().ok())
        .or_else(|| params.root_path.as_ref().map(PathBuf::from))
        .or_else(|| {
            params
                .workspace_folders
                .as_ref()
                .and_then(|folders| folders.first())
                .and_then(|folder| folder.uri.to_file_path().ok())
        })
}

fn ok<T: Serialize>(id: RequestId, result: T) -> Response {
    Response::new_ok(id, result)
}

fn error_response(id: RequestId, code: ErrorCode, message: &str) -> Response {
    Response::new_err(id, code as i32, message.to_string())
}

/// Run the server over a pair of byte streams until `exit` or end of input.
pub async fn serve<R, W>(reader: R, writer: W) -> Result<(), ServerError>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut reader = FrameReader::new(reader);
    let mut writer = FrameWriter::new(writer);
    let mut server = LuaServer::new()?;

    while let Some(payload) = reader.read_frame().await? {
        let message = match decode_message(&payload) {
            Ok(message) => message,
            Err(e) => {
                warn!("Skipping undecodable message: {}", e);
                continue;
            }
        };
        match message {
            Message::Request(request) => {
                let response = server.handle_request(request);
                let value = encode_message(Message::Response(response))?;
                writer.write_json(&value).await?;
            }
            Message::Notification(notification) => {
                if server.handle_notification(notification) == Flow::Exit {
                    info!("Exit received");
                    break;
                }
            }
            Message::Response(response) => debug!("Ignoring response {}", response.id),
        }
    }
    Ok(())
}

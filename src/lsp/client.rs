// src/lsp/client.rs - One language server connection: process, handshake, document sync

use super::capabilities::{NegotiatedCapabilities, client_capabilities};
use super::events::ServerEvent;
use super::transport::{Transport, TransportError};
use crate::buffer::Buffer;
use log::{debug, info, warn};
use lsp_types::notification::{
    DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument, DidSaveTextDocument, Exit,
    Initialized, Notification,
};
use lsp_types::request::{
    Completion, DocumentSymbolRequest, GotoDeclaration, GotoDefinition, GotoImplementation,
    GotoTypeDefinition, HoverRequest, Initialize, LinkedEditingRange, References, Request,
    SelectionRangeRequest, Shutdown, SignatureHelpRequest, WorkspaceSymbolRequest,
};
use lsp_types::{
    ClientInfo, CompletionContext, CompletionParams, CompletionResponse,
    DidChangeTextDocumentParams, DidCloseTextDocumentParams, DidOpenTextDocumentParams,
    DidSaveTextDocumentParams, DocumentSymbolParams, DocumentSymbolResponse,
    GotoDefinitionParams, GotoDefinitionResponse, Hover, HoverParams, InitializeParams,
    InitializeResult, InitializedParams, LinkedEditingRangeParams, LinkedEditingRanges,
    Location, Position, ReferenceContext, ReferenceParams, SelectionRange,
    SelectionRangeParams, SignatureHelp, SignatureHelpParams, TextDocumentContentChangeEvent,
    TextDocumentIdentifier, TextDocumentItem, TextDocumentPositionParams, TraceValue, Url,
    VersionedTextDocumentIdentifier, WorkspaceFolder, WorkspaceSymbolParams,
    WorkspaceSymbolResponse,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};

#[derive(thiserror::Error, Debug)]
pub enum LspError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Failed to start {command}: {reason}")]
    Startup { command: String, reason: String },
    #[error("LSP protocol error: {0}")]
    Protocol(String),
    #[error("Server not initialized")]
    NotInitialized,
    #[error("Buffer has no file path")]
    Unsaved,
}

impl LspError {
    /// The server answered with an error object; callers degrade these to "no result".
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            LspError::Transport(TransportError::ServerError { .. })
        )
    }
}

/// How to launch a server.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerCommand {
    pub command: String,
    pub args: Vec<String>,
    pub init_options: Option<serde_json::Value>,
}

/// A running language server for one (language, root) pair.
pub struct LspClient {
    language_id: String,
    root: PathBuf,
    transport: Transport,
    child: Option<Child>,
    capabilities: NegotiatedCapabilities,
    initialized: bool,
    /// Files announced with didOpen, with the buffer version last sent.
    opened: HashMap<Url, i32>,
}

impl LspClient {
    /// Spawn the server process and complete the initialize handshake.
    pub async fn start(
        language_id: &str,
        root: &Path,
        command: &ServerCommand,
    ) -> Result<Self, LspError> {
        let mut child = Command::new(&command.command)
            .args(&command.args)
            .current_dir(root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null()) // Keep server chatter off the host's terminal
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| LspError::Startup {
                command: command.command.clone(),
                reason: e.to_string(),
            })?;

        let stdout = child.stdout.take().ok_or_else(|| LspError::Startup {
            command: command.command.clone(),
            reason: "no stdout pipe".to_string(),
        })?;
        let stdin = child.stdin.take().ok_or_else(|| LspError::Startup {
            command: command.command.clone(),
            reason: "no stdin pipe".to_string(),
        })?;

        let mut client = Self::with_transport(language_id, root, Transport::new(stdout, stdin));
        client.child = Some(child);
        client
            .initialize(command.init_options.clone())
            .await
            .map_err(|e| LspError::Startup {
                command: command.command.clone(),
                reason: e.to_string(),
            })?;
        info!(
            "Started {} for {} in {}",
            command.command,
            language_id,
            root.display()
        );
        Ok(client)
    }

    /// Build a client over an existing transport. The handshake has not happened yet.
    pub fn with_transport(language_id: &str, root: &Path, transport: Transport) -> Self {
        Self {
            language_id: language_id.to_string(),
            root: root.to_path_buf(),
            transport,
            child: None,
            capabilities: NegotiatedCapabilities::default(),
            initialized: false,
            opened: HashMap::new(),
        }
    }

    pub async fn initialize(
        &mut self,
        init_options: Option<serde_json::Value>,
    ) -> Result<InitializeResult, LspError> {
        let root_uri = Url::from_directory_path(&self.root).ok();
        let workspace_folders = root_uri.clone().map(|uri| {
            vec![WorkspaceFolder {
                uri,
                name: self
                    .root
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            }]
        });

        #[allow(deprecated)]
        let params = InitializeParams {
            process_id: Some(std::process::id()),
            root_path: self.root.to_str().map(|s| s.to_string()),
            root_uri,
            initialization_options: init_options,
            capabilities: client_capabilities(),
            trace: Some(TraceValue::Off),
            workspace_folders,
            client_info: Some(ClientInfo {
                name: "quill".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
            locale: None,
            work_done_progress_params: Default::default(),
        };

        let value = self
            .transport
            .request(Initialize::METHOD, serde_json::to_value(params)?)
            .await?
            .ok_or_else(|| LspError::Protocol("initialize returned null".to_string()))?;
        let result: InitializeResult = serde_json::from_value(value)?;
        self.capabilities = NegotiatedCapabilities::new(result.capabilities.clone());

        self.transport
            .notify(Initialized::METHOD, serde_json::to_value(InitializedParams {})?)
            .await?;
        self.initialized = true;
        Ok(result)
    }

    pub fn language_id(&self) -> &str {
        &self.language_id
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn capabilities(&self) -> &NegotiatedCapabilities {
        &self.capabilities
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// False once the server process exited or its output stream closed.
    pub fn is_running(&mut self) -> bool {
        if self.transport.is_closed() {
            return false;
        }
        match self.child.as_mut().map(|child| child.try_wait()) {
            Some(Ok(Some(status))) => {
                debug!("{} server exited with {}", self.language_id, status);
                false
            }
            _ => true,
        }
    }

    pub fn is_open(&self, uri: &Url) -> bool {
        self.opened.contains_key(uri)
    }

    /// Send a typed request. Most LSP results are `Option`s, so a `null` answer
    /// deserializes straight into `None`.
    pub async fn send_request<R: Request>(
        &mut self,
        params: R::Params,
    ) -> Result<R::Result, LspError>
    where
        R::Params: Serialize,
        R::Result: DeserializeOwned,
    {
        if !self.initialized {
            return Err(LspError::NotInitialized);
        }
        let value = self
            .transport
            .request(R::METHOD, serde_json::to_value(params)?)
            .await?
            .unwrap_or(serde_json::Value::Null);
        Ok(serde_json::from_value(value)?)
    }

    pub async fn send_notification<N: Notification>(
        &mut self,
        params: N::Params,
    ) -> Result<(), LspError>
    where
        N::Params: Serialize,
    {
        if !self.initialized {
            return Err(LspError::NotInitialized);
        }
        self.transport
            .notify(N::METHOD, serde_json::to_value(params)?)
            .await?;
        Ok(())
    }

    /// Answer a server request the default handler left for the host.
    pub async fn respond(
        &mut self,
        id: lsp_server::RequestId,
        result: serde_json::Value,
    ) -> Result<(), LspError> {
        self.transport.respond(id, result).await?;
        Ok(())
    }

    /// Pull in whatever the server sent since the last request, without waiting.
    pub async fn poll(&mut self) -> Result<usize, LspError> {
        Ok(self.transport.poll().await?)
    }

    pub fn drain_events(&mut self) -> Vec<ServerEvent> {
        self.transport.drain_events()
    }

    /// Announce the buffer to the server: didOpen the first time, then a full-text
    /// didChange whenever the buffer version moved.
    pub async fn sync_buffer(&mut self, buffer: &Buffer) -> Result<Url, LspError> {
        let uri = buffer.uri().ok_or(LspError::Unsaved)?;
        match self.opened.get(&uri).copied() {
            None => {
                let language_id = buffer
                    .language_id
                    .clone()
                    .unwrap_or_else(|| self.language_id.clone());
                self.text_document_did_open(&uri, &language_id, buffer.version, &buffer.text())
                    .await?;
            }
            Some(version) if version != buffer.version => {
                let changes = vec![TextDocumentContentChangeEvent {
                    range: None,
                    range_length: None,
                    text: buffer.text(),
                }];
                self.text_document_did_change(&uri, buffer.version, changes)
                    .await?;
            }
            Some(_) => {}
        }
        Ok(uri)
    }

    pub async fn text_document_did_open(
        &mut self,
        uri: &Url,
        language_id: &str,
        version: i32,
        text: &str,
    ) -> Result<(), LspError> {
        let params = DidOpenTextDocumentParams {
            text_document: TextDocumentItem {
                uri: uri.clone(),
                language_id: language_id.to_string(),
                version,
                text: text.to_string(),
            },
        };
        self.send_notification::<DidOpenTextDocument>(params).await?;
        self.opened.insert(uri.clone(), version);
        Ok(())
    }

    pub async fn text_document_did_change(
        &mut self,
        uri: &Url,
        version: i32,
        changes: Vec<TextDocumentContentChangeEvent>,
    ) -> Result<(), LspError> {
        let params = DidChangeTextDocumentParams {
            text_document: VersionedTextDocumentIdentifier {
                uri: uri.clone(),
                version,
            },
            content_changes: changes,
        };
        self.send_notification::<DidChangeTextDocument>(params)
            .await?;
        self.opened.insert(uri.clone(), version);
        Ok(())
    }

    pub async fn text_document_did_save(
        &mut self,
        uri: &Url,
        text: Option<&str>,
    ) -> Result<(), LspError> {
        let params = DidSaveTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            text: text.map(|s| s.to_string()),
        };
        self.send_notification::<DidSaveTextDocument>(params).await
    }

    pub async fn text_document_did_close(&mut self, uri: &Url) -> Result<(), LspError> {
        if self.opened.remove(uri).is_none() {
            return Ok(());
        }
        let params = DidCloseTextDocumentParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
        };
        self.send_notification::<DidCloseTextDocument>(params).await
    }

    pub async fn completion(
        &mut self,
        uri: &Url,
        position: Position,
        context: Option<CompletionContext>,
    ) -> Result<Option<CompletionResponse>, LspError> {
        let params = CompletionParams {
            text_document_position: position_params(uri, position),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context,
        };
        self.send_request::<Completion>(params).await
    }

    pub async fn hover(&mut self, uri: &Url, position: Position) -> Result<Option<Hover>, LspError> {
        let params = HoverParams {
            text_document_position_params: position_params(uri, position),
            work_done_progress_params: Default::default(),
        };
        self.send_request::<HoverRequest>(params).await
    }

    pub async fn signature_help(
        &mut self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<SignatureHelp>, LspError> {
        let params = SignatureHelpParams {
            context: None,
            text_document_position_params: position_params(uri, position),
            work_done_progress_params: Default::default(),
        };
        self.send_request::<SignatureHelpRequest>(params).await
    }

    pub async fn goto_definition(
        &mut self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<GotoDefinitionResponse>, LspError> {
        self.send_request::<GotoDefinition>(goto_params(uri, position))
            .await
    }

    pub async fn goto_declaration(
        &mut self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<GotoDefinitionResponse>, LspError> {
        self.send_request::<GotoDeclaration>(goto_params(uri, position))
            .await
    }

    pub async fn goto_type_definition(
        &mut self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<GotoDefinitionResponse>, LspError> {
        self.send_request::<GotoTypeDefinition>(goto_params(uri, position))
            .await
    }

    pub async fn goto_implementation(
        &mut self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<GotoDefinitionResponse>, LspError> {
        self.send_request::<GotoImplementation>(goto_params(uri, position))
            .await
    }

    pub async fn find_references(
        &mut self,
        uri: &Url,
        position: Position,
        include_declaration: bool,
    ) -> Result<Option<Vec<Location>>, LspError> {
        let params = ReferenceParams {
            text_document_position: position_params(uri, position),
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
            context: ReferenceContext {
                include_declaration,
            },
        };
        self.send_request::<References>(params).await
    }

    pub async fn document_symbols(
        &mut self,
        uri: &Url,
    ) -> Result<Option<DocumentSymbolResponse>, LspError> {
        let params = DocumentSymbolParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        self.send_request::<DocumentSymbolRequest>(params).await
    }

    pub async fn workspace_symbols(
        &mut self,
        query: String,
    ) -> Result<Option<WorkspaceSymbolResponse>, LspError> {
        let params = WorkspaceSymbolParams {
            query,
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        self.send_request::<WorkspaceSymbolRequest>(params).await
    }

    pub async fn selection_ranges(
        &mut self,
        uri: &Url,
        positions: Vec<Position>,
    ) -> Result<Option<Vec<SelectionRange>>, LspError> {
        let params = SelectionRangeParams {
            text_document: TextDocumentIdentifier { uri: uri.clone() },
            positions,
            work_done_progress_params: Default::default(),
            partial_result_params: Default::default(),
        };
        self.send_request::<SelectionRangeRequest>(params).await
    }

    pub async fn linked_editing_range(
        &mut self,
        uri: &Url,
        position: Position,
    ) -> Result<Option<LinkedEditingRanges>, LspError> {
        let params = LinkedEditingRangeParams {
            text_document_position_params: position_params(uri, position),
            work_done_progress_params: Default::default(),
        };
        self.send_request::<LinkedEditingRange>(params).await
    }

    /// `shutdown` then `exit`. The shutdown answer is not waited on for correctness:
    /// whatever happens the connection is finished afterwards.
    pub async fn shutdown(&mut self) -> Result<(), LspError> {
        if !self.initialized {
            return Ok(());
        }
        if let Err(e) = self.send_request::<Shutdown>(()).await {
            warn!("{} server shutdown request failed: {}", self.language_id, e);
        }
        let exit = self.send_notification::<Exit>(()).await;
        self.initialized = false;
        self.opened.clear();
        exit
    }
}

fn position_params(uri: &Url, position: Position) -> TextDocumentPositionParams {
    TextDocumentPositionParams {
        text_document: TextDocumentIdentifier { uri: uri.clone() },
        position,
    }
}

fn goto_params(uri: &Url, position: Position) -> GotoDefinitionParams {
    GotoDefinitionParams {
        text_document_position_params: position_params(uri, position),
        work_done_progress_params: Default::default(),
        partial_result_params: Default::default(),
    }
}

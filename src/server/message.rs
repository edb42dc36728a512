// src/server/message.rs - Typed view of what a client sends the bundled server

use lsp_types::notification::{
    DidChangeTextDocument, DidCloseTextDocument, DidOpenTextDocument, DidSaveTextDocument, Exit,
    Initialized, Notification as _,
};
use lsp_types::request::{
    Completion, DocumentSymbolRequest, GotoDeclaration, GotoDefinition, GotoImplementation,
    GotoTypeDefinition, HoverRequest, Initialize, LinkedEditingRange, References, Request as _,
    SelectionRangeRequest, Shutdown, SignatureHelpRequest, WorkspaceSymbolRequest,
};
use lsp_types::{
    CompletionParams, DidChangeTextDocumentParams, DidCloseTextDocumentParams,
    DidOpenTextDocumentParams, DidSaveTextDocumentParams, DocumentSymbolParams,
    GotoDefinitionParams, HoverParams, InitializeParams, SelectionRangeParams,
    SignatureHelpParams, WorkspaceSymbolParams,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

#[derive(Debug, Clone)]
pub enum ClientRequest {
    Initialize(Box<InitializeParams>),
    Shutdown,
    Completion(CompletionParams),
    Hover(HoverParams),
    SignatureHelp(SignatureHelpParams),
    Definition(GotoDefinitionParams),
    Declaration(GotoDefinitionParams),
    DocumentSymbol(DocumentSymbolParams),
    WorkspaceSymbol(WorkspaceSymbolParams),
    SelectionRange(SelectionRangeParams),
    /// Understood, but always answered with `null`.
    NoResult(String),
    Unknown(String),
}

impl ClientRequest {
    pub fn parse(method: &str, params: Value) -> Result<Self, serde_json::Error> {
        Ok(match method {
            Initialize::METHOD => ClientRequest::Initialize(Box::new(from_params(params)?)),
            Shutdown::METHOD => ClientRequest::Shutdown,
            Completion::METHOD => ClientRequest::Completion(from_params(params)?),
            HoverRequest::METHOD => ClientRequest::Hover(from_params(params)?),
            SignatureHelpRequest::METHOD => ClientRequest::SignatureHelp(from_params(params)?),
            GotoDefinition::METHOD => ClientRequest::Definition(from_params(params)?),
            GotoDeclaration::METHOD => ClientRequest::Declaration(from_params(params)?),
            DocumentSymbolRequest::METHOD => ClientRequest::DocumentSymbol(from_params(params)?),
            WorkspaceSymbolRequest::METHOD => ClientRequest::WorkspaceSymbol(from_params(params)?),
            SelectionRangeRequest::METHOD => ClientRequest::SelectionRange(from_params(params)?),
            GotoTypeDefinition::METHOD
            | GotoImplementation::METHOD
            | References::METHOD
            | LinkedEditingRange::METHOD => ClientRequest::NoResult(method.to_string()),
            other => ClientRequest::Unknown(other.to_string()),
        })
    }
}

#[derive(Debug, Clone)]
pub enum ClientNotification {
    Initialized,
    Exit,
    DidOpen(DidOpenTextDocumentParams),
    DidChange(DidChangeTextDocumentParams),
    DidSave(DidSaveTextDocumentParams),
    DidClose(DidCloseTextDocumentParams),
    Unknown(String),
}

impl ClientNotification {
    pub fn parse(method: &str, params: Value) -> Result<Self, serde_json::Error> {
        Ok(match method {
            Initialized::METHOD => ClientNotification::Initialized,
            Exit::METHOD => ClientNotification::Exit,
            DidOpenTextDocument::METHOD => ClientNotification::DidOpen(from_params(params)?),
            DidChangeTextDocument::METHOD => ClientNotification::DidChange(from_params(params)?),
            DidSaveTextDocument::METHOD => ClientNotification::DidSave(from_params(params)?),
            DidCloseTextDocument::METHOD => ClientNotification::DidClose(from_params(params)?),
            other => ClientNotification::Unknown(other.to_string()),
        })
    }
}

fn from_params<T: DeserializeOwned>(params: Value) -> Result<T, serde_json::Error> {
    serde_json::from_value(params)
}

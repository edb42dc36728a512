// src/lsp/events.rs - Typed view of unsolicited server messages

use lsp_server::{ErrorCode, Notification, Request, RequestId, Response};
use lsp_types::notification::{
    LogMessage, Notification as _, Progress, PublishDiagnostics, ShowMessage,
};
use lsp_types::request::{
    ApplyWorkspaceEdit, RegisterCapability, Request as _, ShowMessageRequest,
    UnregisterCapability, WorkDoneProgressCreate, WorkspaceConfiguration,
};
use lsp_types::{
    ConfigurationParams, LogMessageParams, ProgressParams, PublishDiagnosticsParams,
    ShowMessageParams,
};
use serde_json::Value;

/// A buffered message replayed to the host in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    Diagnostics(PublishDiagnosticsParams),
    ShowMessage(ShowMessageParams),
    LogMessage(LogMessageParams),
    Progress(ProgressParams),
    /// A server-to-client request that was already answered while a response was awaited.
    Request { id: RequestId, method: String },
    Unknown { method: String, params: Value },
}

impl ServerEvent {
    pub fn from_notification(notification: Notification) -> Self {
        let Notification { method, params } = notification;
        let parsed = match method.as_str() {
            PublishDiagnostics::METHOD => serde_json::from_value(params.clone())
                .map(ServerEvent::Diagnostics)
                .ok(),
            ShowMessage::METHOD => serde_json::from_value(params.clone())
                .map(ServerEvent::ShowMessage)
                .ok(),
            LogMessage::METHOD => serde_json::from_value(params.clone())
                .map(ServerEvent::LogMessage)
                .ok(),
            Progress::METHOD => serde_json::from_value(params.clone())
                .map(ServerEvent::Progress)
                .ok(),
            _ => None,
        };
        parsed.unwrap_or(ServerEvent::Unknown { method, params })
    }

    pub fn method(&self) -> &str {
        match self {
            ServerEvent::Diagnostics(_) => PublishDiagnostics::METHOD,
            ServerEvent::ShowMessage(_) => ShowMessage::METHOD,
            ServerEvent::LogMessage(_) => LogMessage::METHOD,
            ServerEvent::Progress(_) => Progress::METHOD,
            ServerEvent::Request { method, .. } | ServerEvent::Unknown { method, .. } => method,
        }
    }
}

/// Requests a server may send to the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerRequest {
    Configuration(ConfigurationParams),
    WorkDoneProgressCreate,
    RegisterCapability,
    UnregisterCapability,
    ShowMessageRequest,
    ApplyEdit,
    Unknown(String),
}

impl ServerRequest {
    pub fn parse(request: &Request) -> Self {
        match request.method.as_str() {
            WorkspaceConfiguration::METHOD => serde_json::from_value(request.params.clone())
                .map(ServerRequest::Configuration)
                .unwrap_or_else(|_| ServerRequest::Unknown(request.method.clone())),
            WorkDoneProgressCreate::METHOD => ServerRequest::WorkDoneProgressCreate,
            RegisterCapability::METHOD => ServerRequest::RegisterCapability,
            UnregisterCapability::METHOD => ServerRequest::UnregisterCapability,
            ShowMessageRequest::METHOD => ServerRequest::ShowMessageRequest,
            ApplyWorkspaceEdit::METHOD => ServerRequest::ApplyEdit,
            other => ServerRequest::Unknown(other.to_string()),
        }
    }
}

/// Answers server-initiated requests while the client is blocked on its own request.
pub trait RequestHandler: Send {
    fn handle(&mut self, id: RequestId, request: ServerRequest) -> Response;
}

/// Answers with the minimal "nothing configured, nothing applied" responses.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRequestHandler;

impl RequestHandler for DefaultRequestHandler {
    fn handle(&mut self, id: RequestId, request: ServerRequest) -> Response {
        match request {
            ServerRequest::Configuration(params) => {
                let nulls = vec![Value::Null; params.items.len()];
                Response::new_ok(id, nulls)
            }
            ServerRequest::WorkDoneProgressCreate
            | ServerRequest::RegisterCapability
            | ServerRequest::UnregisterCapability
            | ServerRequest::ShowMessageRequest => Response::new_ok(id, Value::Null),
            ServerRequest::ApplyEdit => {
                Response::new_ok(id, serde_json::json!({ "applied": false }))
            }
            ServerRequest::Unknown(method) => Response::new_err(
                id,
                ErrorCode::MethodNotFound as i32,
                format!("unsupported request: {}", method),
            ),
        }
    }
}

// src/lsp/capabilities.rs - Client capability declaration and server capability queries

use lsp_types::{
    ClientCapabilities, CompletionClientCapabilities, CompletionItemCapability,
    DocumentSymbolClientCapabilities, HoverClientCapabilities,
    LinkedEditingRangeClientCapabilities, MarkupKind, ParameterInformationSettings,
    PublishDiagnosticsClientCapabilities, SelectionRangeClientCapabilities, ServerCapabilities,
    SignatureHelpClientCapabilities, SignatureInformationSettings,
    TextDocumentClientCapabilities, TextDocumentSyncClientCapabilities,
    WorkspaceClientCapabilities, WorkspaceSymbolClientCapabilities,
};

/// The feature set this client actually implements. Anything not listed stays `None`
/// so servers don't send us things we would drop on the floor.
pub fn client_capabilities() -> ClientCapabilities {
    let text_document = TextDocumentClientCapabilities {
        synchronization: Some(TextDocumentSyncClientCapabilities {
            did_save: Some(true),
            ..Default::default()
        }),
        completion: Some(CompletionClientCapabilities {
            completion_item: Some(CompletionItemCapability {
                snippet_support: Some(true),
                documentation_format: Some(vec![MarkupKind::PlainText, MarkupKind::Markdown]),
                ..Default::default()
            }),
            ..Default::default()
        }),
        hover: Some(HoverClientCapabilities {
            content_format: Some(vec![MarkupKind::PlainText]),
            ..Default::default()
        }),
        signature_help: Some(SignatureHelpClientCapabilities {
            signature_information: Some(SignatureInformationSettings {
                documentation_format: Some(vec![MarkupKind::PlainText]),
                parameter_information: Some(ParameterInformationSettings {
                    label_offset_support: Some(true),
                }),
                active_parameter_support: Some(true),
            }),
            ..Default::default()
        }),
        document_symbol: Some(DocumentSymbolClientCapabilities::default()),
        selection_range: Some(SelectionRangeClientCapabilities::default()),
        linked_editing_range: Some(LinkedEditingRangeClientCapabilities::default()),
        publish_diagnostics: Some(PublishDiagnosticsClientCapabilities::default()),
        ..Default::default()
    };

    ClientCapabilities {
        text_document: Some(text_document),
        workspace: Some(WorkspaceClientCapabilities {
            symbol: Some(WorkspaceSymbolClientCapabilities::default()),
            configuration: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Negotiated server capabilities plus the trigger sets derived from them.
#[derive(Debug, Clone, Default)]
pub struct NegotiatedCapabilities {
    pub server: ServerCapabilities,
}

impl NegotiatedCapabilities {
    pub fn new(server: ServerCapabilities) -> Self {
        Self { server }
    }

    /// Completion trigger characters. A space is dropped: the host handles whitespace
    /// itself and auto-popping completions after every space is noise.
    pub fn completion_triggers(&self) -> Vec<String> {
        self.server
            .completion_provider
            .as_ref()
            .and_then(|options| options.trigger_characters.clone())
            .unwrap_or_default()
            .into_iter()
            .filter(|c| c != " ")
            .collect()
    }

    /// Characters that accept the selected completion and are then typed.
    pub fn completion_commit_characters(&self) -> Vec<String> {
        self.server
            .completion_provider
            .as_ref()
            .and_then(|options| options.all_commit_characters.clone())
            .unwrap_or_default()
    }

    pub fn signature_triggers(&self) -> Vec<String> {
        self.server
            .signature_help_provider
            .as_ref()
            .and_then(|options| options.trigger_characters.clone())
            .unwrap_or_default()
    }

    pub fn signature_retriggers(&self) -> Vec<String> {
        self.server
            .signature_help_provider
            .as_ref()
            .and_then(|options| options.retrigger_characters.clone())
            .unwrap_or_default()
    }

    pub fn is_completion_trigger(&self, c: char) -> bool {
        let mut buf = [0u8; 4];
        let c = &*c.encode_utf8(&mut buf);
        self.completion_triggers().iter().any(|t| t == c)
    }

    pub fn is_signature_trigger(&self, c: char) -> bool {
        let mut buf = [0u8; 4];
        let c = &*c.encode_utf8(&mut buf);
        self.signature_triggers().iter().any(|t| t == c)
            || self.signature_retriggers().iter().any(|t| t == c)
    }

    pub fn supports_completion(&self) -> bool {
        self.server.completion_provider.is_some()
    }

    pub fn supports_signature_help(&self) -> bool {
        self.server.signature_help_provider.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lsp_types::{CompletionOptions, SignatureHelpOptions};

    fn capabilities() -> NegotiatedCapabilities {
        NegotiatedCapabilities::new(ServerCapabilities {
            completion_provider: Some(CompletionOptions {
                trigger_characters: Some(vec![".".into(), ":".into(), " ".into()]),
                all_commit_characters: Some(vec!["(".into()]),
                ..Default::default()
            }),
            signature_help_provider: Some(SignatureHelpOptions {
                trigger_characters: Some(vec!["(".into(), "{".into()]),
                retrigger_characters: Some(vec![",".into()]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    #[test]
    fn test_completion_triggers_exclude_space() {
        let caps = capabilities();
        assert_eq!(caps.completion_triggers(), vec![".", ":"]);
        assert!(caps.is_completion_trigger(':'));
        assert!(!caps.is_completion_trigger(' '));
    }

    #[test]
    fn test_commit_and_signature_characters() {
        let caps = capabilities();
        assert_eq!(caps.completion_commit_characters(), vec!["("]);
        assert!(caps.is_signature_trigger('{'));
        assert!(caps.is_signature_trigger(','));
        assert!(!caps.is_signature_trigger(')'));
    }

    #[test]
    fn test_declared_features() {
        let caps = client_capabilities();
        let text = caps.text_document.unwrap();
        assert!(text.completion.is_some());
        assert!(text.selection_range.is_some());
        assert!(text.linked_editing_range.is_some());
        assert!(text.formatting.is_none());
        assert!(text.code_action.is_none());
        assert_eq!(text.synchronization.unwrap().did_save, Some(true));
    }

    #[test]
    fn test_missing_providers_yield_empty_sets() {
        let caps = NegotiatedCapabilities::default();
        assert!(caps.completion_triggers().is_empty());
        assert!(!caps.supports_signature_help());
    }
}

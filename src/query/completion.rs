use super::context::{CompletionQuery, completion_query, infer_type, line_prefix};
use crate::index::{ApiEntry, Index, SymbolKind, TagEntry};
use lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, MarkupContent, MarkupKind, Position,
};
use std::collections::HashSet;

/// Index entries that complete `query`, typed against `receiver_type`.
pub fn candidates<'a>(
    entries: &[(&'a TagEntry, &'a ApiEntry)],
    file_label: &str,
    query: &CompletionQuery,
    receiver_type: &str,
) -> Vec<(&'a TagEntry, &'a ApiEntry)> {
    let mut seen = HashSet::new();
    entries
        .iter()
        .filter(|(tag, _)| tag.name.starts_with(&query.partial))
        .filter(|(tag, _)| receiver_type.is_empty() || tag.class == receiver_type)
        .filter(|(tag, _)| query.operator != Some(':') || tag.kind.is_callable())
        .filter(|(tag, _)| !tag.kind.is_local() || tag.file == file_label)
        .filter(|(tag, _)| seen.insert(tag.name.clone()))
        .copied()
        .collect()
}

pub fn completion_kind(kind: SymbolKind, method_call: bool) -> CompletionItemKind {
    match kind {
        SymbolKind::Module => CompletionItemKind::MODULE,
        SymbolKind::Function | SymbolKind::LocalFunction if method_call => {
            CompletionItemKind::METHOD
        }
        SymbolKind::Function | SymbolKind::LocalFunction => CompletionItemKind::FUNCTION,
        SymbolKind::Table => CompletionItemKind::CLASS,
        SymbolKind::LocalTable => CompletionItemKind::VARIABLE,
        SymbolKind::Field => CompletionItemKind::FIELD,
    }
}

fn item(tag: &TagEntry, api: &ApiEntry, method_call: bool) -> CompletionItem {
    let body = api
        .doc
        .split_once('\n')
        .map(|(_, rest)| rest.trim())
        .unwrap_or_default();
    CompletionItem {
        label: tag.name.clone(),
        kind: Some(completion_kind(tag.kind, method_call)),
        detail: Some(api.header().to_string()).filter(|h| !h.is_empty()),
        documentation: (!body.is_empty()).then(|| {
            Documentation::MarkupContent(MarkupContent {
                kind: MarkupKind::PlainText,
                value: body.to_string(),
            })
        }),
        ..Default::default()
    }
}

pub fn complete(
    index: &Index,
    file_label: &str,
    text: &str,
    position: Position,
) -> Vec<CompletionItem> {
    let query = completion_query(line_prefix(text, position));
    if query.is_empty() {
        return Vec::new();
    }
    let receiver_type = if query.receiver.contains('.') {
        query.receiver.clone()
    } else {
        infer_type(text, position.line, &query.receiver).unwrap_or_else(|| query.receiver.clone())
    };

    let entries = index.entries();
    let method_call = query.operator == Some(':');
    candidates(&entries, file_label, &query, &receiver_type)
        .into_iter()
        .map(|(tag, api)| item(tag, api, method_call))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, file: &str, kind: SymbolKind, class: &str) -> (TagEntry, ApiEntry) {
        (
            TagEntry {
                name: name.to_string(),
                file: file.to_string(),
                locator: String::new(),
                kind,
                class: class.to_string(),
            },
            ApiEntry {
                name: name.to_string(),
                doc: name.to_string(),
            },
        )
    }

    fn names(found: &[(&TagEntry, &ApiEntry)]) -> Vec<String> {
        found.iter().map(|(tag, _)| tag.name.clone()).collect()
    }

    #[test]
    fn test_scope_filter() {
        let owned = vec![
            entry("pad", "$ROOT/a.lua", SymbolKind::LocalFunction, ""),
            entry("parse", "$ROOT/b.lua", SymbolKind::LocalFunction, ""),
            entry("pairs", "$STDLIB/stdlib.lua", SymbolKind::Function, ""),
        ];
        let entries: Vec<_> = owned.iter().map(|(t, a)| (t, a)).collect();
        let found = candidates(&entries, "$ROOT/a.lua", &completion_query("pa"), "");
        assert_eq!(names(&found), vec!["pad", "pairs"]);
    }

    #[test]
    fn test_method_operator_only_offers_callables() {
        let owned = vec![
            entry("read", "$STDLIB/stdlib.lua", SymbolKind::Function, "file"),
            entry("mode", "$ROOT/a.lua", SymbolKind::Field, "file"),
            entry("remove", "$STDLIB/stdlib.lua", SymbolKind::Function, "os"),
        ];
        let entries: Vec<_> = owned.iter().map(|(t, a)| (t, a)).collect();
        let found = candidates(&entries, "$ROOT/a.lua", &completion_query("f:"), "file");
        assert_eq!(names(&found), vec!["read"]);
        let found = candidates(&entries, "$ROOT/a.lua", &completion_query("f."), "file");
        assert_eq!(names(&found), vec!["read", "mode"]);
    }

    #[test]
    fn test_duplicates_keep_first() {
        let owned = vec![
            entry("add", "$ROOT/a.lua", SymbolKind::Function, "util"),
            entry("add", "$ROOT/b.lua", SymbolKind::Function, "util"),
        ];
        let entries: Vec<_> = owned.iter().map(|(t, a)| (t, a)).collect();
        let found = candidates(&entries, "$ROOT/c.lua", &completion_query("util.a"), "util");
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].0.file, "$ROOT/a.lua");
    }

    #[test]
    fn test_string_receiver_completes_string_methods() {
        let index = Index::new().unwrap();
        let text = "local s = \"x\"\ns:up";
        let items = complete(&index, "$ROOT/a.lua", text, Position::new(1, 4));
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].label, "upper");
        assert_eq!(items[0].kind, Some(CompletionItemKind::METHOD));
        assert_eq!(items[0].detail.as_deref(), Some("string.upper(s)"));
    }

    #[test]
    fn test_empty_query_returns_nothing() {
        let index = Index::new().unwrap();
        assert!(complete(&index, "$ROOT/a.lua", "x = ", Position::new(0, 4)).is_empty());
    }

    #[test]
    fn test_kinds() {
        assert_eq!(completion_kind(SymbolKind::Table, false), CompletionItemKind::CLASS);
        assert_eq!(
            completion_kind(SymbolKind::LocalFunction, false),
            CompletionItemKind::FUNCTION
        );
        assert_eq!(completion_kind(SymbolKind::LocalTable, true), CompletionItemKind::VARIABLE);
    }
}

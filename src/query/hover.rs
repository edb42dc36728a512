use super::context::symbol_at;
use crate::index::{ApiEntry, Index, TagEntry};
use lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position};

/// An index entry whose name matches the looked-up identifier.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub tag: &'a TagEntry,
    pub api: &'a ApiEntry,
    /// The entry's qualified name equals the identifier, not just its last segment.
    pub confirmed: bool,
}

/// Entries named like the last segment of `ident`, confirmed ones first.
///
/// Locals only match inside the file that declares them.
pub fn lookup<'a>(
    entries: &[(&'a TagEntry, &'a ApiEntry)],
    file_label: &str,
    ident: &str,
) -> Vec<Match<'a>> {
    let last = ident.rsplit(['.', ':']).next().unwrap_or(ident);
    let wanted = ident.replace(':', ".");
    let mut matches: Vec<Match<'a>> = entries
        .iter()
        .filter(|(tag, api)| api.name == last && (!api.is_local() || tag.file == file_label))
        .map(|&(tag, api)| Match {
            tag,
            api,
            confirmed: api.qualified_name().replace(':', ".") == wanted,
        })
        .collect();
    matches.sort_by_key(|m| !m.confirmed);
    matches
}

/// Confirmed matches when there are any, otherwise every name match.
pub fn best_matches<'a>(matches: Vec<Match<'a>>) -> Vec<Match<'a>> {
    if matches.iter().any(|m| m.confirmed) {
        matches.into_iter().filter(|m| m.confirmed).collect()
    } else {
        matches
    }
}

pub fn hover(index: &Index, file_label: &str, text: &str, position: Position) -> Option<Hover> {
    let ident = symbol_at(text, position)?;
    let entries = index.entries();
    let found = lookup(&entries, file_label, &ident).into_iter().next()?;
    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::PlainText,
            value: found.api.doc.clone(),
        }),
        range: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::SymbolKind;

    fn entry(name: &str, file: &str, class: &str, header: &str) -> (TagEntry, ApiEntry) {
        (
            TagEntry {
                name: name.to_string(),
                file: file.to_string(),
                locator: String::new(),
                kind: SymbolKind::Function,
                class: class.to_string(),
            },
            ApiEntry {
                name: name.to_string(),
                doc: header.to_string(),
            },
        )
    }

    #[test]
    fn test_confirmed_match_comes_first() {
        let owned = vec![
            entry("add", "$ROOT/a.lua", "vec", "vec.add(a, b)"),
            entry("add", "$ROOT/b.lua", "util", "util.add(a, b)"),
        ];
        let entries: Vec<_> = owned.iter().map(|(t, a)| (t, a)).collect();
        let matches = lookup(&entries, "$ROOT/c.lua", "util.add");
        assert_eq!(matches.len(), 2);
        assert!(matches[0].confirmed);
        assert_eq!(matches[0].tag.class, "util");
        assert_eq!(best_matches(matches).len(), 1);
    }

    #[test]
    fn test_unknown_receiver_falls_back_to_name() {
        let owned = vec![entry("add", "$ROOT/a.lua", "vec", "vec.add(a, b)")];
        let entries: Vec<_> = owned.iter().map(|(t, a)| (t, a)).collect();
        let matches = best_matches(lookup(&entries, "$ROOT/c.lua", "obj.add"));
        assert_eq!(matches.len(), 1);
        assert!(!matches[0].confirmed);
    }

    #[test]
    fn test_method_call_matches_dotted_header() {
        let owned = vec![entry("upper", "$STDLIB/stdlib.lua", "string", "string.upper(s)")];
        let entries: Vec<_> = owned.iter().map(|(t, a)| (t, a)).collect();
        assert!(lookup(&entries, "$ROOT/c.lua", "string:upper")[0].confirmed);
    }

    #[test]
    fn test_locals_stay_in_their_file() {
        let owned = vec![entry("helper", "$ROOT/a.lua", "", "local helper(x)")];
        let entries: Vec<_> = owned.iter().map(|(t, a)| (t, a)).collect();
        assert!(lookup(&entries, "$ROOT/b.lua", "helper").is_empty());
        assert!(lookup(&entries, "$ROOT/a.lua", "helper")[0].confirmed);
    }

    #[test]
    fn test_hover_on_stdlib_function() {
        let index = Index::new().unwrap();
        let hover = hover(&index, "$ROOT/a.lua", "print(1)", Position::new(0, 2)).unwrap();
        match hover.contents {
            HoverContents::Markup(markup) => assert!(markup.value.starts_with("print(...)")),
            other => panic!("unexpected hover contents {:?}", other),
        }
    }
}

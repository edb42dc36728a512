use super::definition::{find_locator, locate};
use super::documents::Documents;
use crate::buffer::byte_to_utf16;
use crate::index::{self, Index};
use lsp_types::{Location, Position, Range, SelectionRange, SymbolInformation, SymbolKind, Url};

pub fn lsp_symbol_kind(kind: index::SymbolKind) -> SymbolKind {
    match kind {
        index::SymbolKind::Module => SymbolKind::MODULE,
        index::SymbolKind::Function | index::SymbolKind::LocalFunction => SymbolKind::FUNCTION,
        index::SymbolKind::Table => SymbolKind::CLASS,
        index::SymbolKind::LocalTable => SymbolKind::VARIABLE,
        index::SymbolKind::Field => SymbolKind::FIELD,
    }
}

#[allow(deprecated)]
fn information(name: String, kind: index::SymbolKind, class: &str, location: Location) -> SymbolInformation {
    SymbolInformation {
        name,
        kind: lsp_symbol_kind(kind),
        tags: None,
        deprecated: None,
        location,
        container_name: Some(class.to_string()).filter(|c| !c.is_empty()),
    }
}

/// Declarations in one document, in source order.
pub fn document_symbols(uri: &Url, text: &str, module: &str) -> Vec<SymbolInformation> {
    let lines: Vec<&str> = text.lines().collect();
    index::extract_symbols(text, module)
        .into_iter()
        .map(|symbol| {
            let line = lines.get(symbol.line).copied().unwrap_or_default();
            let range = match line.find(&symbol.locator) {
                Some(start) if !symbol.locator.is_empty() => {
                    let from = byte_to_utf16(line, start);
                    let to = from + symbol.locator.encode_utf16().count() as u32;
                    Range::new(Position::new(symbol.line as u32, from), Position::new(symbol.line as u32, to))
                }
                _ => find_locator(text, &symbol.locator).unwrap_or_default(),
            };
            let location = Location {
                uri: uri.clone(),
                range,
            };
            information(symbol.name, symbol.kind, &symbol.class, location)
        })
        .collect()
}

/// Project declarations whose name contains `query`, ignoring case.
pub fn workspace_symbols(index: &Index, documents: &Documents, query: &str) -> Vec<SymbolInformation> {
    let query = query.to_lowercase();
    index
        .project_entries()
        .into_iter()
        .filter(|(tag, _)| tag.name.to_lowercase().contains(&query))
        .filter_map(|(tag, _)| {
            let location = locate(index, documents, tag)?;
            Some(information(tag.name.clone(), tag.kind, &tag.class, location))
        })
        .collect()
}

/// Word, then line, then the whole document around each position.
pub fn selection_ranges(text: &str, positions: &[Position]) -> Vec<SelectionRange> {
    let lines: Vec<&str> = text.lines().collect();
    let last_line = lines.len().saturating_sub(1);
    let document = SelectionRange {
        range: Range::new(
            Position::new(0, 0),
            Position::new(
                last_line as u32,
                lines.last().map(|l| l.encode_utf16().count() as u32).unwrap_or(0),
            ),
        ),
        parent: None,
    };

    positions
        .iter()
        .map(|position| {
            let Some(line) = lines.get(position.line as usize) else {
                return document.clone();
            };
            let line_range = SelectionRange {
                range: Range::new(
                    Position::new(position.line, 0),
                    Position::new(position.line, line.encode_utf16().count() as u32),
                ),
                parent: Some(Box::new(document.clone())),
            };
            match word_range(line, position.character) {
                Some((from, to)) if (from, to) != (0, line.encode_utf16().count() as u32) => {
                    SelectionRange {
                        range: Range::new(
                            Position::new(position.line, from),
                            Position::new(position.line, to),
                        ),
                        parent: Some(Box::new(line_range)),
                    }
                }
                _ => line_range,
            }
        })
        .collect()
}

fn word_range(line: &str, character: u32) -> Option<(u32, u32)> {
    let is_word = |c: char| c.is_alphanumeric() || c == '_';
    let byte = crate::buffer::utf16_to_byte(line, character);
    let start = line[..byte]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(byte);
    let end = line[byte..]
        .char_indices()
        .find(|(_, c)| !is_word(*c))
        .map(|(i, _)| byte + i)
        .unwrap_or(line.len());
    (start < end).then(|| (byte_to_utf16(line, start), byte_to_utf16(line, end)))
}

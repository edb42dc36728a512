use super::context::symbol_at;
use super::documents::Documents;
use super::hover::{best_matches, lookup};
use crate::buffer::byte_to_utf16;
use crate::index::{Index, TagEntry};
use log::debug;
use lsp_types::{Location, Position, Range, Url};

/// Where `locator` first occurs in `text`, as an LSP range.
pub fn find_locator(text: &str, locator: &str) -> Option<Range> {
    if locator.is_empty() {
        return None;
    }
    let offset = text.find(locator)?;
    let line_start = text[..offset].rfind('\n').map(|i| i + 1).unwrap_or(0);
    let line = text[..offset].matches('\n').count() as u32;
    let line_text = &text[line_start..];
    let start = byte_to_utf16(line_text, offset - line_start);
    let end = start + locator.encode_utf16().count() as u32;
    Some(Range::new(Position::new(line, start), Position::new(line, end)))
}

/// Re-find `tag` in its file, which may have moved since the index was built.
pub fn locate(index: &Index, documents: &Documents, tag: &TagEntry) -> Option<Location> {
    let path = index.resolve(tag);
    let text = documents.source(&path)?;
    let Some(range) = find_locator(&text, &tag.locator) else {
        debug!("Locator for {} no longer in {}", tag.name, path.display());
        return None;
    };
    let uri = Url::from_file_path(&path).ok()?;
    Some(Location { uri, range })
}

pub fn definition(
    index: &Index,
    documents: &Documents,
    file_label: &str,
    text: &str,
    position: Position,
) -> Vec<Location> {
    let Some(ident) = symbol_at(text, position) else {
        return Vec::new();
    };
    let entries = index.entries();
    let mut locations: Vec<Location> = Vec::new();
    for found in best_matches(lookup(&entries, file_label, &ident)) {
        if let Some(location) = locate(index, documents, found.tag) {
            if !locations.contains(&location) {
                locations.push(location);
            }
        }
    }
    locations
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_find_locator() {
        let text = "local x = 1\n  function util.add(a, b)\n";
        let range = find_locator(text, "function util.add(a, b)").unwrap();
        assert_eq!(range.start, Position::new(1, 2));
        assert_eq!(range.end, Position::new(1, 25));
        assert!(find_locator(text, "function util.sub(a, b)").is_none());
        assert!(find_locator(text, "").is_none());
    }

    #[test]
    fn test_locator_refound_after_edit() {
        let dir = TempDir::new().unwrap();
        let util = dir.path().join("util.lua");
        fs::write(&util, "function util.add(a, b) return a + b end\n").unwrap();
        let mut index = Index::new().unwrap();
        index.scan(dir.path()).unwrap();

        let mut documents = Documents::new();
        documents.update(&util, "\n\n\n\n\nfunction util.add(a, b) return a + b end\n".to_string());
        let main = dir.path().join("main.lua");
        let label = index.label_for(&main);
        let found = definition(&index, &documents, &label, "util.add(1, 2)", Position::new(0, 6));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].range.start.line, 5);
    }

    #[test]
    fn test_stale_locator_is_skipped() {
        let dir = TempDir::new().unwrap();
        let util = dir.path().join("util.lua");
        fs::write(&util, "function util.add(a, b) end\n").unwrap();
        let mut index = Index::new().unwrap();
        index.scan(dir.path()).unwrap();
        fs::write(&util, "function util.plus(a, b) end\n").unwrap();

        let documents = Documents::new();
        let label = index.label_for(&util);
        assert!(definition(&index, &documents, &label, "util.add()", Position::new(0, 6)).is_empty());
    }
}

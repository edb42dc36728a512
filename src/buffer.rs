use lsp_types::{Position, Url};
use ropey::Rope;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub enum BufferError {
    Io(std::io::Error),
    Rope(ropey::Error),
}

impl From<std::io::Error> for BufferError {
    fn from(err: std::io::Error) -> Self {
        BufferError::Io(err)
    }
}

impl From<ropey::Error> for BufferError {
    fn from(err: ropey::Error) -> Self {
        BufferError::Rope(err)
    }
}

impl std::fmt::Display for BufferError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BufferError::Io(err) => write!(f, "IO error: {}", err),
            BufferError::Rope(err) => write!(f, "Rope error: {}", err),
        }
    }
}

impl std::error::Error for BufferError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BufferError::Io(err) => Some(err),
            BufferError::Rope(err) => Some(err),
        }
    }
}

/// The slice of the host editor's document model the LSP layer needs:
/// text, path, language and a version that bumps on every edit.
pub struct Buffer {
    pub rope: Rope,
    pub file_path: Option<PathBuf>,
    pub language_id: Option<String>,
    pub modified: bool,
    pub version: i32,
}

impl Buffer {
    pub fn new() -> Self {
        Self {
            rope: Rope::from(""),
            file_path: None,
            language_id: None,
            modified: false,
            version: 0,
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            rope: Rope::from_str(text),
            ..Self::new()
        }
    }
}

impl Default for Buffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Buffer {
    pub fn insert_text(&mut self, text: &str, line: usize, col: usize) -> Result<(), BufferError> {
        let char_idx = self.rope.try_line_to_char(line)? + col;
        self.rope.try_insert(char_idx, text)?;
        self.touch();
        Ok(())
    }

    pub fn delete_range(&mut self, start: usize, end: usize) -> Result<(), BufferError> {
        self.rope.try_remove(start..end)?;
        self.touch();
        Ok(())
    }

    /// Replace the whole document, as a reload or external formatter would.
    pub fn set_text(&mut self, text: &str) {
        self.rope = Rope::from_str(text);
        self.touch();
    }

    fn touch(&mut self) {
        self.modified = true;
        self.version += 1;
    }

    pub fn text(&self) -> String {
        self.rope.to_string()
    }

    pub fn line_count(&self) -> usize {
        self.rope.len_lines()
    }

    pub fn line(&self, line_idx: usize) -> Option<String> {
        if line_idx < self.rope.len_lines() {
            let line = self.rope.line(line_idx).to_string();
            Some(line.trim_end_matches(['\n', '\r']).to_string())
        } else {
            None
        }
    }

    pub fn line_len(&self, line_idx: usize) -> usize {
        self.line(line_idx).map(|l| l.chars().count()).unwrap_or(0)
    }

    /// Convert a (line, char column) caret into an LSP position (UTF-16 columns).
    pub fn lsp_position(&self, line: usize, col: usize) -> Position {
        let line = line.min(self.line_count().saturating_sub(1));
        let text = self.line(line).unwrap_or_default();
        let prefix: String = text.chars().take(col).collect();
        Position {
            line: line as u32,
            character: prefix.encode_utf16().count() as u32,
        }
    }

    /// Convert an LSP position back into a (line, char column) caret.
    pub fn caret(&self, position: Position) -> (usize, usize) {
        let line = position.line as usize;
        let text = self.line(line).unwrap_or_default();
        (line, utf16_to_char_col(&text, position.character))
    }

    pub fn uri(&self) -> Option<Url> {
        self.file_path
            .as_ref()
            .and_then(|path| path.canonicalize().ok().or_else(|| Some(path.clone())))
            .and_then(|path| Url::from_file_path(path).ok())
    }

    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), BufferError> {
        let content = fs::read_to_string(path.as_ref())?;
        self.rope = Rope::from_str(&content);
        self.file_path = Some(path.as_ref().to_path_buf());
        self.language_id = path
            .as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(language_for_extension)
            .map(str::to_string);
        self.modified = false;
        self.version = 0;
        Ok(())
    }

    pub fn save_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), BufferError> {
        fs::write(path.as_ref(), self.rope.to_string())?;
        self.file_path = Some(path.as_ref().to_path_buf());
        self.modified = false;
        Ok(())
    }
}

/// LSP language identifiers for the file types we know servers for.
pub fn language_for_extension(ext: &str) -> Option<&'static str> {
    match ext {
        "lua" => Some("lua"),
        "rs" => Some("rust"),
        "py" => Some("python"),
        "js" => Some("javascript"),
        "ts" => Some("typescript"),
        _ => None,
    }
}

/// Char column of a UTF-16 offset into `line`, clamped to the line end.
pub fn utf16_to_char_col(line: &str, utf16: u32) -> usize {
    let mut units = 0u32;
    for (i, c) in line.chars().enumerate() {
        if units >= utf16 {
            return i;
        }
        units += c.len_utf16() as u32;
    }
    line.chars().count()
}

/// Byte offset of a UTF-16 offset into `line`, clamped to the line end.
pub fn utf16_to_byte(line: &str, utf16: u32) -> usize {
    let mut units = 0u32;
    for (i, c) in line.char_indices() {
        if units >= utf16 {
            return i;
        }
        units += c.len_utf16() as u32;
    }
    line.len()
}

/// UTF-16 length of the first `byte` bytes of `line`.
pub fn byte_to_utf16(line: &str, byte: usize) -> u32 {
    let end = byte.min(line.len());
    line.get(..end)
        .map(|prefix| prefix.encode_utf16().count() as u32)
        .unwrap_or(0)
}

#[test]
fn test_insert_text_bumps_version() {
    let mut buffer = Buffer::new();
    buffer.insert_text("hello", 0, 0).unwrap();
    assert_eq!(buffer.line(0).unwrap(), "hello");
    assert!(buffer.modified);
    assert_eq!(buffer.version, 1);
}

#[test]
fn test_load_and_save() {
    use tempfile::TempDir;
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("init.lua");
    fs::write(&path, "local a = 1\nreturn a").unwrap();

    let mut buffer = Buffer::new();
    buffer.load_from_file(&path).unwrap();
    assert_eq!(buffer.line_count(), 2);
    assert_eq!(buffer.line(1).unwrap(), "return a");
    assert_eq!(buffer.language_id.as_deref(), Some("lua"));

    let copy = dir.path().join("copy.lua");
    buffer.save_to_file(&copy).unwrap();
    assert_eq!(fs::read_to_string(copy).unwrap(), "local a = 1\nreturn a");
}

#[test]
fn test_lsp_position_counts_utf16_units() {
    let buffer = Buffer::from_text("s = '😀' .. x\n");
    let position = buffer.lsp_position(0, 7);
    // The emoji is one char but two UTF-16 units.
    assert_eq!(position.character, 8);
    assert_eq!(buffer.caret(position), (0, 7));
}

#[test]
fn test_utf16_byte_conversions() {
    let line = "é = 1";
    assert_eq!(utf16_to_byte(line, 1), 2);
    assert_eq!(byte_to_utf16(line, 2), 1);
    assert_eq!(utf16_to_byte(line, 100), line.len());
}

use crate::buffer::Buffer;

pub struct Cursor {
    pub line: usize,
    pub col: usize,
}

impl Cursor {
    pub fn new() -> Self {
        Self { line: 0, col: 0 }
    }

    /// Move to (line, col), clamped to the buffer's text.
    pub fn move_to(&mut self, buffer: &Buffer, line: usize, col: usize) {
        self.line = line.min(buffer.line_count().saturating_sub(1));
        self.col = col.min(buffer.line_len(self.line));
    }
}

impl Default for Cursor {
    fn default() -> Self {
        Self::new()
    }
}

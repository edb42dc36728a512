// src/viewport.rs - Scroll state over document lines interleaved with annotation rows

use std::collections::BTreeMap;

/// Scroll state of the view showing the active buffer.
///
/// Diagnostic annotations are drawn as extra rows under their document line, so the
/// view scrolls in visual rows. `offset_line` is a visual row, not a document line.
#[derive(Debug, Clone, Default)]
pub struct Viewport {
    pub offset_line: usize,
    pub offset_col: usize,
    pub rows: usize,
    pub cols: usize,
    /// Annotation rows under each annotated document line.
    annotations: BTreeMap<usize, usize>,
}

impl Viewport {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            ..Self::default()
        }
    }

    /// Back to the top-left of an unannotated document.
    pub fn reset(&mut self) {
        self.offset_line = 0;
        self.offset_col = 0;
        self.annotations.clear();
    }

    pub fn annotation_rows(&self, line: usize) -> usize {
        self.annotations.get(&line).copied().unwrap_or(0)
    }

    /// First visual row of a document line.
    pub fn visual_line(&self, line: usize) -> usize {
        line + self.annotations.range(..line).map(|(_, rows)| rows).sum::<usize>()
    }

    /// Document line shown at a visual row, plus the row's offset into that line's
    /// annotation (0 for the code line itself).
    pub fn document_line_at(&self, visual: usize) -> (usize, usize) {
        let mut consumed = 0;
        for (&line, &rows) in &self.annotations {
            let start = line + consumed;
            if visual < start {
                break;
            }
            if visual <= start + rows {
                return (line, visual - start);
            }
            consumed += rows;
        }
        (visual - consumed, 0)
    }

    /// Swap in a new annotation layout. The document line at the top of the view stays
    /// there, as does the position inside its annotation where that still exists.
    pub fn set_annotations(&mut self, annotations: BTreeMap<usize, usize>) {
        let (top_line, top_offset) = self.document_line_at(self.offset_line);
        self.annotations = annotations;
        let offset = top_offset.min(self.annotation_rows(top_line));
        self.offset_line = self.visual_line(top_line) + offset;
    }

    /// Center the view on a document position.
    pub fn reveal(&mut self, line: usize, col: usize) {
        self.offset_line = self.visual_line(line).saturating_sub(self.rows / 2);
        self.offset_col = col.saturating_sub(self.cols / 2);
    }
}

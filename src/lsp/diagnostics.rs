// src/lsp/diagnostics.rs - Projection of LSP diagnostics onto editor markers

use crate::buffer::{Buffer, utf16_to_char_col};
use crate::viewport::Viewport;
use lsp_types::{Diagnostic, DiagnosticSeverity, PublishDiagnosticsParams, Url};
use std::collections::{BTreeMap, HashMap};

/// A diagnostic as the editor shows it: an underline on one line plus an annotation
/// rendered below that line.
#[derive(Debug, Clone, PartialEq)]
pub struct Marker {
    pub line: usize,
    pub start_col: usize,
    pub end_col: usize,
    pub severity: DiagnosticSeverity,
    pub message: String,
}

impl Marker {
    pub fn annotation_rows(&self) -> usize {
        self.message.lines().count().max(1)
    }
}

#[derive(Debug, Default)]
pub struct DiagnosticManager {
    diagnostics: HashMap<Url, Vec<Diagnostic>>,
    active: Option<Url>,
    markers: Vec<Marker>,
}

impl DiagnosticManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored set for a file. Sets are never merged across notifications.
    pub fn update_diagnostics(&mut self, uri: Url, diagnostics: Vec<Diagnostic>) {
        self.diagnostics.insert(uri, diagnostics);
    }

    pub fn get_diagnostics(&self, uri: &Url) -> &[Diagnostic] {
        self.diagnostics.get(uri).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn clear_diagnostics(&mut self, uri: &Url) {
        self.diagnostics.remove(uri);
    }

    pub fn clear_all_diagnostics(&mut self) {
        self.diagnostics.clear();
        self.markers.clear();
    }

    pub fn set_active(&mut self, uri: Option<Url>) {
        self.active = uri;
    }

    pub fn markers(&self) -> &[Marker] {
        &self.markers
    }

    /// Handle a `publishDiagnostics` notification. Returns true when the active file's
    /// markers were redrawn.
    pub fn publish(
        &mut self,
        params: PublishDiagnosticsParams,
        buffer: &Buffer,
        viewport: &mut Viewport,
    ) -> bool {
        let is_active = self.active.as_ref() == Some(&params.uri);
        self.update_diagnostics(params.uri, params.diagnostics);
        if is_active {
            self.project(buffer, viewport);
        }
        is_active
    }

    /// Rebuild the markers of the active file and hand their annotation layout to the
    /// view, which keeps its top document line in place.
    pub fn project(&mut self, buffer: &Buffer, viewport: &mut Viewport) {
        self.markers = self
            .active
            .as_ref()
            .map(|uri| self.get_diagnostics(uri))
            .unwrap_or(&[])
            .iter()
            .map(|diagnostic| to_marker(diagnostic, buffer))
            .collect();
        self.markers.sort_by_key(|m| (m.line, m.start_col));

        let mut rows = BTreeMap::new();
        for marker in &self.markers {
            *rows.entry(marker.line).or_insert(0) += marker.annotation_rows();
        }
        viewport.set_annotations(rows);
    }

    pub fn get_diagnostics_at_line(&self, line: usize) -> Vec<&Marker> {
        self.markers.iter().filter(|m| m.line == line).collect()
    }

    pub fn severity_label(severity: DiagnosticSeverity) -> &'static str {
        match severity {
            DiagnosticSeverity::ERROR => "error",
            DiagnosticSeverity::WARNING => "warning",
            DiagnosticSeverity::INFORMATION => "info",
            DiagnosticSeverity::HINT => "hint",
            _ => "note",
        }
    }
}

fn to_marker(diagnostic: &Diagnostic, buffer: &Buffer) -> Marker {
    let start = diagnostic.range.start;
    let end = diagnostic.range.end;
    let line = start.line as usize;
    let text = buffer.line(line).unwrap_or_default();
    let start_col = utf16_to_char_col(&text, start.character);
    let end_col = if end.line > start.line {
        text.chars().count()
    } else {
        utf16_to_char_col(&text, end.character)
    };
    Marker {
        line,
        start_col,
        end_col: end_col.max(start_col),
        severity: diagnostic.severity.unwrap_or(DiagnosticSeverity::ERROR),
        message: diagnostic.message.clone(),
    }
}

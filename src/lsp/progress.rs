// src/lsp/progress.rs - LSP progress reporting

use lsp_types::{
    NumberOrString, ProgressParams, ProgressParamsValue, WorkDoneProgress,
};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ProgressItem {
    pub token: String,
    pub title: String,
    pub message: Option<String>,
    pub percentage: Option<u32>,
    pub cancellable: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressManager {
    items: HashMap<String, ProgressItem>,
}

impl ProgressManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one `$/progress` notification into the tracked set.
    pub fn apply(&mut self, params: ProgressParams) {
        let token = match params.token {
            NumberOrString::Number(n) => n.to_string(),
            NumberOrString::String(s) => s,
        };
        #[allow(unreachable_patterns)]
        let progress = match params.value {
            ProgressParamsValue::WorkDone(progress) => progress,
            _ => return,
        };
        match progress {
            WorkDoneProgress::Begin(begin) => {
                self.start_progress(token.clone(), begin.title, begin.cancellable.unwrap_or(false));
                self.update_progress(&token, begin.message, begin.percentage);
            }
            WorkDoneProgress::Report(report) => {
                self.update_progress(&token, report.message, report.percentage);
            }
            WorkDoneProgress::End(_) => self.end_progress(&token),
        }
    }

    pub fn start_progress(&mut self, token: String, title: String, cancellable: bool) {
        self.items.insert(
            token.clone(),
            ProgressItem {
                token,
                title,
                message: None,
                percentage: None,
                cancellable,
            },
        );
    }

    pub fn update_progress(&mut self, token: &str, message: Option<String>, percentage: Option<u32>) {
        if let Some(item) = self.items.get_mut(token) {
            item.message = message;
            item.percentage = percentage;
        }
    }

    pub fn end_progress(&mut self, token: &str) {
        self.items.remove(token);
    }

    pub fn get_all_progress(&self) -> Vec<ProgressItem> {
        let mut items: Vec<_> = self.items.values().cloned().collect();
        items.sort_by(|a, b| a.token.cmp(&b.token));
        items
    }

    pub fn has_active_progress(&self) -> bool {
        !self.items.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(value: serde_json::Value) -> ProgressParams {
        serde_json::from_value(serde_json::json!({ "token": "scan", "value": value })).unwrap()
    }

    #[test]
    fn test_begin_report_end() {
        let mut manager = ProgressManager::new();
        manager.apply(params(serde_json::json!({ "kind": "begin", "title": "Indexing" })));
        assert!(manager.has_active_progress());

        manager.apply(params(
            serde_json::json!({ "kind": "report", "message": "util.lua", "percentage": 40 }),
        ));
        let items = manager.get_all_progress();
        assert_eq!(items[0].title, "Indexing");
        assert_eq!(items[0].percentage, Some(40));
        assert_eq!(items[0].message.as_deref(), Some("util.lua"));

        manager.apply(params(serde_json::json!({ "kind": "end" })));
        assert!(!manager.has_active_progress());
    }

    #[test]
    fn test_report_for_unknown_token_is_ignored() {
        let mut manager = ProgressManager::new();
        manager.update_progress("missing", Some("x".into()), None);
        assert!(manager.get_all_progress().is_empty());
    }
}

use crate::index::canonical;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Text of the files the client has open. Everything else is read from disk.
#[derive(Debug, Default)]
pub struct Documents {
    open: HashMap<PathBuf, String>,
}

impl Documents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, path: &Path, text: String) {
        self.open.insert(canonical(path), text);
    }

    pub fn close(&mut self, path: &Path) -> Option<String> {
        self.open.remove(&canonical(path))
    }

    pub fn get(&self, path: &Path) -> Option<&str> {
        self.open.get(&canonical(path)).map(String::as_str)
    }

    pub fn is_open(&self, path: &Path) -> bool {
        self.open.contains_key(&canonical(path))
    }

    /// The open buffer's text if there is one, else the file on disk.
    pub fn source(&self, path: &Path) -> Option<String> {
        match self.get(path) {
            Some(text) => Some(text.to_string()),
            None => fs::read_to_string(path).ok(),
        }
    }
}

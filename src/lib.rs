// lib.rs - Library root for quill

pub mod buffer;
pub mod cli;
pub mod config;
pub mod cursor;
pub mod editor;
pub mod index;
pub mod lsp;
pub mod query;
pub mod server;
pub mod viewport;

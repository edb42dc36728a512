// src/lsp/mod.rs - Language Server Protocol support

pub mod capabilities;
pub mod client;
pub mod codec;
pub mod completion;
pub mod diagnostics;
pub mod events;
pub mod manager;
pub mod progress;
pub mod transport;

pub use client::{LspClient, LspError};
pub use events::ServerEvent;
pub use manager::LspManager;

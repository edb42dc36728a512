//! Answers to positional questions about Lua source, served from an [`Index`].
//!
//! [`Index`]: crate::index::Index

pub mod completion;
pub mod context;
pub mod definition;
pub mod documents;
pub mod hover;
pub mod signature;
pub mod symbols;

pub use completion::complete;
pub use definition::definition;
pub use documents::Documents;
pub use hover::hover;
pub use signature::signature_help;
pub use symbols::{document_symbols, selection_ranges, workspace_symbols};

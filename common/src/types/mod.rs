pub mod document;
pub mod message;

pub use document::{DatasetCategory, Document, DocumentMetadata};
pub use message::{format_history, ChatMessage, ChatRole};

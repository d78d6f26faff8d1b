//! バッファ管理モジュール
//!
//! ノートの識別情報と、編集中テキストの正本を扱う

pub mod document;
pub mod note;

pub use document::{BufferSnapshot, DocumentBuffer, MutationEvent, MutationKind};
pub use note::Note;

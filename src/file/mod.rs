//! ファイル処理
//!
//! ノートファイルの読み込み、アトミック保存、エクスポート補助

pub mod export;
pub mod operations;

pub use export::{sanitize_file_name, suggested_file_name, wrap_html_document, ExportFormat};
pub use operations::{FileReader, FileSaveSink, FileSaver};

//! エクスポート補助
//!
//! 実際の変換（PDF・Word）は外部のエクスポートサービスが行う。
//! ここではファイル名の整形と、プレビュー HTML の単体ドキュメント化だけを扱う。

use crate::buffer::Note;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// ファイル名の最大文字数
pub const MAX_FILE_NAME_CHARS: usize = 100;

/// エクスポート形式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Html,
    Pdf,
    Word,
    Markdown,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Html => "html",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Word => "docx",
            ExportFormat::Markdown => "md",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ExportFormat::Html => "HTML",
            ExportFormat::Pdf => "PDF",
            ExportFormat::Word => "Word",
            ExportFormat::Markdown => "Markdown",
        }
    }

    /// 拡張子から形式を推定
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "html" | "htm" => Some(ExportFormat::Html),
            "pdf" => Some(ExportFormat::Pdf),
            "docx" => Some(ExportFormat::Word),
            "md" | "markdown" => Some(ExportFormat::Markdown),
            _ => None,
        }
    }
}

const INVALID_CHARS: &str = r#"/\:*?"<>|"#;

fn invalid_chars() -> Option<&'static Regex> {
    static INVALID: OnceLock<Option<Regex>> = OnceLock::new();
    INVALID
        .get_or_init(|| Regex::new(&format!("[{}]", regex::escape(INVALID_CHARS))).ok())
        .as_ref()
}

/// ファイル名として使えない文字を整形する
///
/// `/ \ : * ? " < > |` は `_` に置き換え、制御文字は取り除き、前後の空白を落として
/// 100 文字に切り詰める。
pub fn sanitize_file_name(name: &str) -> String {
    let replaced = match invalid_chars() {
        Some(pattern) => pattern.replace_all(name, "_").into_owned(),
        None => name
            .chars()
            .map(|c| if INVALID_CHARS.contains(c) { '_' } else { c })
            .collect(),
    };
    let without_control: String = replaced.chars().filter(|c| !c.is_control()).collect();
    without_control
        .trim()
        .chars()
        .take(MAX_FILE_NAME_CHARS)
        .collect()
}

/// エクスポート先の既定ファイル名
pub fn suggested_file_name(note: &Note, format: ExportFormat) -> String {
    let stem = sanitize_file_name(note.title.trim());
    let stem = if stem.is_empty() { "untitled" } else { stem.as_str() };
    format!("{}.{}", stem, format.extension())
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// 描画済み本文を単体の HTML ドキュメントに包む
pub fn wrap_html_document(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n<title>{}</title>\n</head>\n<body>\n{}</body>\n</html>\n",
        escape_html(title),
        body
    )
}

//! ノートの識別情報

use crate::file::export::sanitize_file_name;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

/// ノート
///
/// バッファの外では不変。変更は [`super::DocumentBuffer`] を通して行う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_encrypted: bool,
    #[serde(default)]
    pub encryption_type: Option<String>,
    #[serde(default)]
    pub file_path: Option<PathBuf>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Note {
    /// 新しい ID を採番してノートを作成
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), title, content)
    }

    /// ID を指定してノートを作成
    pub fn with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            title: title.into(),
            content: content.into(),
            is_encrypted: false,
            encryption_type: None,
            file_path: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_encryption(mut self, encryption_type: impl Into<String>) -> Self {
        self.is_encrypted = true;
        self.encryption_type = Some(encryption_type.into());
        self
    }

    /// 表示・保存用のファイル名
    pub fn file_name(&self) -> String {
        if let Some(name) = self
            .file_path
            .as_ref()
            .and_then(|path| path.file_name())
            .and_then(|name| name.to_str())
        {
            return name.to_string();
        }

        let stem = sanitize_file_name(self.title.trim());
        if stem.is_empty() {
            "untitled.md".to_string()
        } else {
            format!("{}.md", stem)
        }
    }
}

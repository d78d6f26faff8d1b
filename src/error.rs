//! エラーハンドリングシステム
//!
//! エンジン全体で使用される統一されたエラー型とユーティリティを定義
//! 公開APIから返るエラーは、状態機械の終端状態やイベントとしても観測できる

use std::time::Duration;
use thiserror::Error;

use crate::notification::NotificationKind;

/// エンジン全体のエラー型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// 現在の状態では許可されない操作
    #[error("Invalid state: {0}")]
    InvalidState(#[from] StateError),

    /// ノートが読み込まれていない
    #[error("No note is loaded")]
    NotLoaded,

    /// パスワード検証に失敗
    #[error("Password verification failed ({attempts_remaining} attempts remaining)")]
    VerificationFailed { attempts_remaining: u32 },

    /// 必要な機能が利用できない
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// ユーザーによる中断
    #[error("Operation cancelled")]
    Cancelled,

    /// 不正な入力値
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 外部コラボレータの失敗（メッセージはそのまま）
    #[error("{0}")]
    Internal(String),

    /// 設定エラー
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

/// 状態遷移固有のエラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StateError {
    #[error("revision {requested} is ahead of buffer revision {current}")]
    RevisionMismatch { requested: u64, current: u64 },

    #[error("note {note_id} is already saving")]
    AlreadySaving { note_id: String },

    #[error("note {note_id} is not saving")]
    NotSaving { note_id: String },

    #[error("unknown note: {note_id}")]
    UnknownNote { note_id: String },

    #[error("authentication flow already started")]
    FlowAlreadyStarted,

    #[error("authentication flow already finished")]
    FlowFinished,

    #[error("authentication flow is not waiting for this input")]
    WrongSubFlow,
}

/// 設定固有のエラー
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid configuration file {path}: {message}")]
    InvalidFile { path: String, message: String },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("IO error: {message}")]
    Io { message: String },
}

/// エラーレベル分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Info,
    Warning,
    Error,
}

impl ErrorLevel {
    /// 通知種別へ変換
    pub fn notification_kind(self) -> NotificationKind {
        match self {
            ErrorLevel::Info => NotificationKind::Info,
            ErrorLevel::Warning => NotificationKind::Warning,
            ErrorLevel::Error => NotificationKind::Error,
        }
    }
}

/// エラー表示情報
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorDisplay {
    /// 通知タイトル
    pub title: String,
    /// エラーメッセージ
    pub message: String,
    /// エラーレベル
    pub level: ErrorLevel,
    /// 表示持続時間
    pub duration: Duration,
}

impl ErrorDisplay {
    pub fn new(error: &EngineError) -> Self {
        let (title, message, level) = Self::format_error(error);
        Self {
            title: title.to_string(),
            message,
            level,
            duration: Duration::from_secs(5),
        }
    }

    fn format_error(error: &EngineError) -> (&'static str, String, ErrorLevel) {
        match error {
            EngineError::NotLoaded => (
                "No note open",
                "No note is open".to_string(),
                ErrorLevel::Error,
            ),
            EngineError::InvalidState(StateError::AlreadySaving { .. }) => (
                "Save in progress",
                "The note is already being saved".to_string(),
                ErrorLevel::Error,
            ),
            EngineError::VerificationFailed { attempts_remaining } => (
                "Authentication failed",
                format!("Wrong password, {} attempts remaining", attempts_remaining),
                ErrorLevel::Warning,
            ),
            EngineError::Unavailable(reason) => {
                ("Authentication unavailable", reason.clone(), ErrorLevel::Error)
            }
            EngineError::Cancelled => ("Cancelled", error.to_string(), ErrorLevel::Info),
            EngineError::Internal(message) => ("Error", message.clone(), ErrorLevel::Error),
            _ => ("Error", error.to_string(), ErrorLevel::Error),
        }
    }
}

/// パニックハンドラの設定
pub fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|loc| format!("{}:{}", loc.file(), loc.line()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s
        } else {
            "Unknown panic payload"
        };

        log::error!("PANIC at {}: {}", location, message);
        eprintln!("PANIC at {}: {}", location, message);
        eprintln!("Stack trace: {}", std::backtrace::Backtrace::capture());
    }));
}

/// プロジェクト標準のResult型
pub type Result<T> = std::result::Result<T, EngineError>;

// std::io::Error から ConfigError への変換
impl From<std::io::Error> for ConfigError {
    fn from(error: std::io::Error) -> Self {
        ConfigError::Io {
            message: error.to_string(),
        }
    }
}

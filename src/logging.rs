//! ロギングシステム
//!
//! `log` ファサードのバックエンド。stderr とファイルへの出力を提供

use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

/// ログレベル
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

impl LogLevel {
    /// `log` クレートのフィルタへ変換
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Warning => log::LevelFilter::Warn,
            LogLevel::Error => log::LevelFilter::Error,
        }
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        LogLevel::Info
    }
}

fn tag(level: log::Level) -> &'static str {
    match level {
        log::Level::Trace => "TRACE",
        log::Level::Debug => "DEBUG",
        log::Level::Info => "INFO",
        log::Level::Warn => "WARNING",
        log::Level::Error => "ERROR",
    }
}

/// ロガー
///
/// * 開発者向けの詳細ログを stderr へ出力
/// * `output_file` が設定されていれば追記モードで書き出す
#[derive(Debug)]
pub struct Logger {
    level: log::LevelFilter,
    output_stderr: bool,
    output_file: Option<PathBuf>,
    file_lock: Mutex<()>,
}

impl Logger {
    /// デフォルト構築
    pub fn new(level: LogLevel) -> Self {
        Self {
            level: level.to_filter(),
            output_stderr: true,
            output_file: None,
            file_lock: Mutex::new(()),
        }
    }

    /// 開発者向けロガー
    pub fn for_development() -> Self {
        Self::new(LogLevel::Debug)
    }

    /// ログレベルを変更
    pub fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level.to_filter();
        self
    }

    /// ファイル出力を設定
    pub fn with_file_output<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output_file = Some(path.into());
        self
    }

    /// 標準エラー出力を無効化（テスト向け）
    pub fn without_stderr(mut self) -> Self {
        self.output_stderr = false;
        self
    }

    /// ログレベルを取得
    pub fn level(&self) -> log::LevelFilter {
        self.level
    }

    fn should_log(&self, level: log::Level) -> bool {
        level <= self.level
    }

    fn format_record(record: &log::Record<'_>) -> String {
        format!("{}: {}: {}", tag(record.level()), record.target(), record.args())
    }

    fn write_line(&self, message: &str) {
        if self.output_stderr {
            eprintln!("{}", message);
        }

        if let Some(path) = &self.output_file {
            let _guard = self.file_lock.lock();
            if let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) {
                let _ = writeln!(file, "{}", message);
            }
        }
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        self.should_log(metadata.level())
    }

    fn log(&self, record: &log::Record<'_>) {
        if self.enabled(record.metadata()) {
            self.write_line(&Self::format_record(record));
        }
    }

    fn flush(&self) {}
}

/// グローバルロガーを設定する（プロセスにつき一度だけ）
pub fn init(level: LogLevel, log_file: Option<PathBuf>) -> Result<()> {
    let mut logger = Logger::new(level);
    if let Some(path) = log_file {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| EngineError::Internal(format!("cannot create log directory: {}", e)))?;
        }
        logger = logger.with_file_output(path);
    }

    log::set_boxed_logger(Box::new(logger))
        .map(|()| log::set_max_level(level.to_filter()))
        .map_err(|e| EngineError::Internal(format!("logger already installed: {}", e)))
}

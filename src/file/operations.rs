//! ファイル操作コア機能
//!
//! Markdown ファイルの読み込みと、一時ファイル経由のアトミック保存

use crate::buffer::Note;
use crate::error::{EngineError, Result};
use crate::save::{SaveReporter, SaveRequest, SaveSink};
use std::path::{Path, PathBuf};

fn io_error(path: &Path, error: std::io::Error) -> EngineError {
    EngineError::Internal(format!("{}: {}", path.display(), error))
}

/// ファイル読み込み処理
#[derive(Debug, Default)]
pub struct FileReader;

impl FileReader {
    pub fn new() -> Self {
        Self
    }

    /// ファイル内容を読み込み（BOM 除去、改行は LF に統一）
    pub fn read_file(&self, path: &Path) -> Result<String> {
        if !path.is_file() {
            return Err(EngineError::InvalidInput(format!(
                "not a regular file: {}",
                path.display()
            )));
        }

        let content = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        let without_bom = content.strip_prefix('\u{feff}').unwrap_or(&content);
        Ok(without_bom.replace("\r\n", "\n").replace('\r', "\n"))
    }

    /// ファイルからノートを作る（タイトルはファイル名の拡張子を除いた部分）
    pub fn read_note(&self, path: &Path) -> Result<Note> {
        let content = self.read_file(path)?;
        let title = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Note::new(title, content).with_file_path(path))
    }
}

/// ファイル保存処理
#[derive(Debug)]
pub struct FileSaver {
    atomic_save: bool,
}

impl FileSaver {
    pub fn new() -> Self {
        Self { atomic_save: true }
    }

    /// 直接書き込みの保存処理
    pub fn direct() -> Self {
        Self { atomic_save: false }
    }

    /// ファイルを保存
    pub fn save_file(&self, path: &Path, content: &str) -> Result<()> {
        self.save_with_progress(path, content, |_| {})
    }

    /// 進捗付きで保存（一時ファイル書き込み後に 0.5 を報告）
    pub fn save_with_progress<F>(&self, path: &Path, content: &str, progress: F) -> Result<()>
    where
        F: Fn(f64),
    {
        log::debug!("file: save {} ({} bytes)", path.display(), content.len());

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }

        if !self.atomic_save {
            std::fs::write(path, content.as_bytes()).map_err(|e| io_error(path, e))?;
            progress(1.0);
            return Ok(());
        }

        let temp_path = Self::temp_path(path)?;
        std::fs::write(&temp_path, content.as_bytes()).map_err(|e| io_error(&temp_path, e))?;
        progress(0.5);

        std::fs::rename(&temp_path, path).map_err(|e| {
            // 一時ファイル削除を試行
            let _ = std::fs::remove_file(&temp_path);
            io_error(path, e)
        })?;
        progress(1.0);
        Ok(())
    }

    fn temp_path(original: &Path) -> Result<PathBuf> {
        let filename = original.file_name().ok_or_else(|| {
            EngineError::InvalidInput(format!("invalid path: {}", original.display()))
        })?;
        let parent = original.parent().unwrap_or_else(|| Path::new(""));

        // 一意な一時ファイル名生成
        let temp_name = format!(".{}_{}", filename.to_string_lossy(), std::process::id());
        Ok(parent.join(temp_name))
    }
}

impl Default for FileSaver {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone)]
enum SaveTarget {
    Path(PathBuf),
    Directory(PathBuf),
}

/// ファイルへ保存する [`SaveSink`]
///
/// UI スレッド上で同期的に書き込み、その場で結果を報告する。
#[derive(Debug)]
pub struct FileSaveSink {
    target: SaveTarget,
    saver: FileSaver,
}

impl FileSaveSink {
    /// 常に `path` へ保存する
    pub fn to_path(path: impl Into<PathBuf>) -> Self {
        Self {
            target: SaveTarget::Path(path.into()),
            saver: FileSaver::new(),
        }
    }

    /// ノートのファイルパス、なければ `dir` 以下のファイル名へ保存する
    pub fn in_directory(dir: impl Into<PathBuf>) -> Self {
        Self {
            target: SaveTarget::Directory(dir.into()),
            saver: FileSaver::new(),
        }
    }

    pub fn resolve(&self, note: &Note) -> PathBuf {
        match &self.target {
            SaveTarget::Path(path) => path.clone(),
            SaveTarget::Directory(dir) => note
                .file_path
                .clone()
                .unwrap_or_else(|| dir.join(note.file_name())),
        }
    }
}

impl SaveSink for FileSaveSink {
    fn save(&mut self, request: SaveRequest, reporter: SaveReporter) {
        let path = self.resolve(&request.note);
        let result = self
            .saver
            .save_with_progress(&path, &request.note.content, |p| {
                if p < 1.0 {
                    reporter.report_progress(p);
                }
            });

        match result {
            Ok(()) => {
                log::debug!("file: saved revision {} to {}", request.revision, path.display());
                reporter.complete(Ok(()));
            }
            Err(error) => {
                reporter.complete(Err(error.to_string()));
            }
        }
    }
}

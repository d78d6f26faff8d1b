//! エンジン設定
//!
//! JSON 形式の設定ファイル。欠けた項目は既定値で補う。

use crate::auth::{AuthConfig, AuthMethod, DEFAULT_MAX_PASSWORD_ATTEMPTS};
use crate::error::{ConfigError, EngineError, Result};
use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// エンジン設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub preferred_auth_method: AuthMethod,
    pub allow_fallback: bool,
    pub max_password_attempts: u32,
    /// 0 なら自動で消えない
    pub notification_default_duration_ms: u32,
    pub preview_auto_refresh_default: bool,
    pub preview_visible_default: bool,
    pub log_level: LogLevel,
    /// `~` と環境変数を展開する
    pub log_file: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            preferred_auth_method: AuthMethod::Both,
            allow_fallback: true,
            max_password_attempts: DEFAULT_MAX_PASSWORD_ATTEMPTS,
            notification_default_duration_ms: 3000,
            preview_auto_refresh_default: true,
            preview_visible_default: true,
            log_level: LogLevel::Info,
            log_file: None,
        }
    }
}

impl EngineConfig {
    /// 既定の設定ファイルパス（`<config_dir>/mdnote/config.json`）
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("mdnote").join("config.json"))
    }

    /// ファイルから読み込む
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(ConfigError::from)?;
        let config: EngineConfig =
            serde_json::from_str(&text).map_err(|e| ConfigError::InvalidFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
        Ok(config.validated())
    }

    /// ファイルがなければ既定値を返す
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            log::debug!("config: {} not found, using defaults", path.display());
            Ok(Self::default())
        }
    }

    /// 整形済み JSON で保存する
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(ConfigError::from)?;
        }
        let text = serde_json::to_string_pretty(self).map_err(|e| ConfigError::InvalidFile {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        std::fs::write(path, text).map_err(ConfigError::from)?;
        Ok(())
    }

    /// 範囲外の値を補正する
    pub fn validated(mut self) -> Self {
        if self.max_password_attempts == 0 {
            log::warn!(
                "config: max_password_attempts 0 coerced to {}",
                DEFAULT_MAX_PASSWORD_ATTEMPTS
            );
            self.max_password_attempts = DEFAULT_MAX_PASSWORD_ATTEMPTS;
        }
        self
    }

    pub fn notification_default_duration(&self) -> Duration {
        Duration::from_millis(u64::from(self.notification_default_duration_ms))
    }

    /// ログファイルのパス（`~` と環境変数を展開）
    pub fn log_file_path(&self) -> Result<Option<PathBuf>> {
        match &self.log_file {
            None => Ok(None),
            Some(raw) => shellexpand::full(raw)
                .map(|expanded| Some(PathBuf::from(expanded.as_ref())))
                .map_err(|e| {
                    EngineError::Config(ConfigError::InvalidValue {
                        key: "log_file".to_string(),
                        value: e.to_string(),
                    })
                }),
        }
    }

    /// 認証フロー用の設定
    pub fn auth_config(&self, biometric_available: bool) -> AuthConfig {
        AuthConfig::new(
            self.preferred_auth_method,
            biometric_available,
            self.allow_fallback,
            self.max_password_attempts,
        )
    }
}

//! 認証フロー
//!
//! パスワード・生体認証の選択、フォールバック、試行回数、取り消しを扱う状態機械。
//! UI は [`AuthEvent`] を受け取って表示するだけの受け身の描画役になる。

pub mod coordinator;
pub mod password;

pub use coordinator::{AuthFlowCoordinator, BiometricResponder, RemoteBiometricResponder};
pub use password::{validate_new_password, PasswordStrength};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 既定の最大パスワード試行回数
pub const DEFAULT_MAX_PASSWORD_ATTEMPTS: u32 = 3;

/// 生体認証待ちアニメーションの間隔
pub const WAITING_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// 認証方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    Password,
    Biometric,
    Both,
}

impl Default for AuthMethod {
    fn default() -> Self {
        AuthMethod::Both
    }
}

/// 認証設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthConfig {
    pub preferred_method: AuthMethod,
    pub biometric_available: bool,
    pub allow_fallback: bool,
    pub max_password_attempts: u32,
}

impl AuthConfig {
    pub fn new(
        preferred_method: AuthMethod,
        biometric_available: bool,
        allow_fallback: bool,
        max_password_attempts: u32,
    ) -> Self {
        Self {
            preferred_method,
            biometric_available,
            allow_fallback,
            max_password_attempts,
        }
    }

    /// 生体認証の有無をプローブに問い合わせて設定を作る
    pub fn detect(
        probe: &dyn BiometricProbe,
        preferred_method: AuthMethod,
        allow_fallback: bool,
        max_password_attempts: u32,
    ) -> Self {
        Self::new(
            preferred_method,
            probe.is_available(),
            allow_fallback,
            max_password_attempts,
        )
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new(
            AuthMethod::Both,
            false,
            true,
            DEFAULT_MAX_PASSWORD_ATTEMPTS,
        )
    }
}

/// 認証フローのフェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPhase {
    Idle,
    Waiting,
    Success,
    Failed,
    Unavailable,
    Cancelled,
}

impl AuthPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, AuthPhase::Idle | AuthPhase::Waiting)
    }
}

/// 試行状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthAttemptState {
    /// 設定された認証方式
    pub method: AuthMethod,
    /// 現在入力待ちの方式（`Password` か `Biometric`）
    pub active_method: Option<AuthMethod>,
    pub attempts_used: u32,
    pub max_attempts: u32,
    pub fallback_allowed: bool,
    pub biometric_available: bool,
    pub phase: AuthPhase,
}

impl AuthAttemptState {
    pub fn attempts_remaining(&self) -> u32 {
        self.max_attempts.saturating_sub(self.attempts_used)
    }
}

/// UI 向けの認証イベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthEvent {
    pub phase: AuthPhase,
    pub method: Option<AuthMethod>,
    pub attempts_remaining: u32,
    pub message: String,
}

/// 認証結果（フローにつき1回だけ）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthResult {
    pub success: bool,
    pub method_used: Option<AuthMethod>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub error: Option<String>,
    pub cancelled: bool,
}

impl AuthResult {
    pub fn succeeded(method: AuthMethod, password: Option<String>) -> Self {
        Self {
            success: true,
            method_used: Some(method),
            password,
            error: None,
            cancelled: false,
        }
    }

    pub fn failed(method: Option<AuthMethod>, error: impl Into<String>) -> Self {
        Self {
            success: false,
            method_used: method,
            password: None,
            error: Some(error.into()),
            cancelled: false,
        }
    }

    pub fn cancelled(method: Option<AuthMethod>) -> Self {
        Self {
            success: false,
            method_used: method,
            password: None,
            error: None,
            cancelled: true,
        }
    }
}

/// 生体認証の結果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BiometricOutcome {
    Success,
    Failed(String),
    UserCancelled,
    FallbackRequested,
    Unavailable(String),
}

/// 生体認証プロンプトの要求
#[derive(Debug)]
pub struct BiometricRequest {
    pub message: String,
    /// 後で結果を返すための応答口
    pub responder: BiometricResponder,
}

/// OS の生体認証
pub trait BiometricProbe {
    fn is_available(&self) -> bool;

    /// プロンプトを開始する
    ///
    /// 結果がすぐに分かる場合は `Some` を返す。非同期の場合は `None` を返し、
    /// 後で `request.responder` から結果を渡す。
    fn prompt(&mut self, request: BiometricRequest) -> Option<BiometricOutcome>;
}

/// パスワード検証
pub trait PasswordVerifier {
    fn verify(&self, password: &str) -> std::result::Result<(), String>;
}

impl<F> PasswordVerifier for F
where
    F: Fn(&str) -> std::result::Result<(), String>,
{
    fn verify(&self, password: &str) -> std::result::Result<(), String> {
        self(password)
    }
}

/// 生体認証待ちの進捗表示
///
/// 0.0 から 1.0 まで 0.1 刻みで進み、また 0.0 まで戻る往復を繰り返す。
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct WaitingProgress {
    pub tick: u64,
    pub value: f64,
}

impl WaitingProgress {
    const STEPS: u64 = 10;

    pub fn from_tick(tick: u64) -> Self {
        let phase = tick % (Self::STEPS * 2);
        let step = if phase <= Self::STEPS {
            phase
        } else {
            Self::STEPS * 2 - phase
        };
        Self {
            tick,
            value: step as f64 / Self::STEPS as f64,
        }
    }
}

//! パスワード設定の補助

use crate::error::{EngineError, Result};
use serde::Serialize;

/// パスワード強度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PasswordStrength {
    Weak,
    Medium,
    Strong,
}

impl PasswordStrength {
    /// 長さと文字種からスコアを計算する
    ///
    /// 6 文字未満は常に弱い。8 文字以上・12 文字以上・大文字・小文字・数字・記号で各 1 点、
    /// 5 点以上で強、3 点以上で中。
    pub fn evaluate(password: &str) -> Self {
        let length = password.chars().count();
        if length < 6 {
            return PasswordStrength::Weak;
        }

        let mut score = 0;
        if length >= 8 {
            score += 1;
        }
        if length >= 12 {
            score += 1;
        }
        if password.chars().any(char::is_uppercase) {
            score += 1;
        }
        if password.chars().any(char::is_lowercase) {
            score += 1;
        }
        if password.chars().any(|c| c.is_ascii_digit()) {
            score += 1;
        }
        if password
            .chars()
            .any(|c| !c.is_alphanumeric() && !c.is_whitespace() && !c.is_control())
        {
            score += 1;
        }

        match score {
            s if s >= 5 => PasswordStrength::Strong,
            s if s >= 3 => PasswordStrength::Medium,
            _ => PasswordStrength::Weak,
        }
    }

    /// 強度バーの値
    pub fn progress(self) -> f64 {
        match self {
            PasswordStrength::Weak => 0.33,
            PasswordStrength::Medium => 0.66,
            PasswordStrength::Strong => 1.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PasswordStrength::Weak => "Password strength: weak",
            PasswordStrength::Medium => "Password strength: medium",
            PasswordStrength::Strong => "Password strength: strong",
        }
    }
}

/// 新しいパスワードの入力を検証する
pub fn validate_new_password(password: &str, confirmation: &str) -> Result<PasswordStrength> {
    if password.is_empty() {
        return Err(EngineError::InvalidInput(
            "password cannot be empty".to_string(),
        ));
    }
    if password != confirmation {
        return Err(EngineError::InvalidInput(
            "passwords do not match".to_string(),
        ));
    }

    let strength = PasswordStrength::evaluate(password);
    if strength == PasswordStrength::Weak {
        return Err(EngineError::InvalidInput(
            "password is too weak".to_string(),
        ));
    }
    Ok(strength)
}

//! UIモジュール
//!
//! UI がバインドするビュー契約

pub mod views;

// 公開API
pub use views::{
    format_time_ago, EncryptionStatusView, NotificationItem, NotificationView, PreviewView,
    SaveStatusView, WordCountView,
};

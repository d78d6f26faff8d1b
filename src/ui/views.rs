//! ビュー契約
//!
//! UI がバインドする純粋なデータ構造。ウィジェットの構築・フォーカス・レイアウトは扱わない。

use crate::buffer::Note;
use crate::notification::{Notification, NotificationCenter, NotificationKind};
use crate::preview::PreviewState;
use crate::save::{SavePhase, SaveStatusInfo};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 保存状態の表示
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveStatusView {
    pub text: String,
    pub show_progress: bool,
    pub progress: f64,
}

impl SaveStatusView {
    pub fn from_status(status: Option<&SaveStatusInfo>, now: DateTime<Utc>) -> Self {
        let Some(status) = status else {
            return Self::idle("Ready");
        };

        match status.phase {
            SavePhase::Saving => Self {
                text: format!("Saving {}...", status.file_name),
                show_progress: true,
                progress: status.progress,
            },
            SavePhase::Dirty => Self::idle(format!("{} (unsaved changes)", status.file_name)),
            SavePhase::Failed => Self::idle(format!(
                "Save failed: {}",
                status.error.as_deref().unwrap_or("unknown error")
            )),
            SavePhase::Clean => match status.last_saved {
                Some(saved) => Self::idle(format!("Saved ({})", format_time_ago(saved, now))),
                None => Self::idle("Saved"),
            },
        }
    }

    fn idle(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            show_progress: false,
            progress: 0.0,
        }
    }
}

/// 「N 分前」形式の表示
pub fn format_time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let elapsed = now.signed_duration_since(then);
    let (amount, unit) = if elapsed.num_minutes() < 1 {
        return "just now".to_string();
    } else if elapsed.num_hours() < 1 {
        (elapsed.num_minutes(), "minute")
    } else if elapsed.num_days() < 1 {
        (elapsed.num_hours(), "hour")
    } else {
        (elapsed.num_days(), "day")
    };

    if amount == 1 {
        format!("1 {} ago", unit)
    } else {
        format!("{} {}s ago", amount, unit)
    }
}

/// 通知一覧の1件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationItem {
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub color: &'static str,
}

/// 通知一覧（新しい順）
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct NotificationView {
    pub items: Vec<NotificationItem>,
}

impl NotificationView {
    pub fn from_center(center: &NotificationCenter) -> Self {
        Self::from_notifications(&center.active())
    }

    pub fn from_notifications(notifications: &[Notification]) -> Self {
        Self {
            items: notifications
                .iter()
                .map(|n| NotificationItem {
                    id: n.id.to_string(),
                    kind: n.kind,
                    title: n.title.clone(),
                    message: n.message.clone(),
                    color: n.kind.color(),
                })
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// 暗号化状態の表示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptionStatusView {
    pub text: String,
}

impl EncryptionStatusView {
    pub fn new(is_encrypted: bool, encryption_type: Option<&str>) -> Self {
        let text = match (is_encrypted, encryption_type) {
            (true, Some(kind)) if !kind.is_empty() => format!("Encrypted ({})", kind),
            (true, _) => "Encrypted".to_string(),
            (false, _) => "Not encrypted".to_string(),
        };
        Self { text }
    }

    pub fn from_note(note: Option<&Note>) -> Self {
        match note {
            Some(note) => Self::new(note.is_encrypted, note.encryption_type.as_deref()),
            None => Self::new(false, None),
        }
    }
}

/// 語数の表示
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WordCountView {
    pub count: usize,
}

impl WordCountView {
    pub fn text(&self) -> String {
        format!("Words: {}", self.count)
    }
}

/// プレビューの表示
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewView {
    pub visible: bool,
    pub html: String,
    pub revision: u64,
}

impl PreviewView {
    pub fn from_state(state: &PreviewState) -> Self {
        Self {
            visible: state.visible,
            html: state
                .rendered_view
                .as_ref()
                .map(|view| view.html.clone())
                .unwrap_or_default(),
            revision: state.last_rendered_revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::RenderedView;
    use chrono::Duration;

    fn status(phase: SavePhase) -> SaveStatusInfo {
        let mut info = SaveStatusInfo::clean("n", "note.md");
        info.phase = phase;
        info
    }

    #[test]
    fn test_save_status_texts() {
        let now = Utc::now();
        assert_eq!(SaveStatusView::from_status(None, now).text, "Ready");

        let mut saving = status(SavePhase::Saving);
        saving.progress = 0.4;
        let view = SaveStatusView::from_status(Some(&saving), now);
        assert_eq!(view.text, "Saving note.md...");
        assert!(view.show_progress);
        assert_eq!(view.progress, 0.4);

        let dirty = SaveStatusView::from_status(Some(&status(SavePhase::Dirty)), now);
        assert_eq!(dirty.text, "note.md (unsaved changes)");
        assert!(!dirty.show_progress);

        let mut failed = status(SavePhase::Failed);
        failed.error = Some("disk full".to_string());
        assert_eq!(
            SaveStatusView::from_status(Some(&failed), now).text,
            "Save failed: disk full"
        );

        let mut clean = status(SavePhase::Clean);
        assert_eq!(SaveStatusView::from_status(Some(&clean), now).text, "Saved");
        clean.last_saved = Some(now - Duration::minutes(5));
        assert_eq!(
            SaveStatusView::from_status(Some(&clean), now).text,
            "Saved (5 minutes ago)"
        );
    }

    #[test]
    fn test_format_time_ago() {
        let now = Utc::now();
        assert_eq!(format_time_ago(now - Duration::seconds(30), now), "just now");
        assert_eq!(format_time_ago(now - Duration::minutes(1), now), "1 minute ago");
        assert_eq!(format_time_ago(now - Duration::hours(3), now), "3 hours ago");
        assert_eq!(format_time_ago(now - Duration::days(2), now), "2 days ago");
    }

    #[test]
    fn test_encryption_status() {
        assert_eq!(
            EncryptionStatusView::new(true, Some("AES-256")).text,
            "Encrypted (AES-256)"
        );
        assert_eq!(EncryptionStatusView::new(true, None).text, "Encrypted");
        assert_eq!(EncryptionStatusView::from_note(None).text, "Not encrypted");
    }

    #[test]
    fn test_word_count_text() {
        assert_eq!(WordCountView { count: 42 }.text(), "Words: 42");
    }

    #[test]
    fn test_preview_view() {
        let state = PreviewState {
            visible: true,
            auto_refresh: true,
            last_rendered_revision: 3,
            rendered_view: Some(RenderedView::new("<p>x</p>")),
        };
        let view = PreviewView::from_state(&state);
        assert_eq!(view.html, "<p>x</p>");
        assert_eq!(view.revision, 3);
    }
}

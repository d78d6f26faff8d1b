//! 保存状態管理
//!
//! ノートごとの保存状態機械。I/O は行わず、呼び出し側が
//! `begin_save` / `report_progress` / `complete_save` で保存処理を挟む。
//!
//! ```text
//! Clean --変更--> Dirty --begin_save--> Saving(p) --成功--> Clean
//!                   ^                      |
//!                   +------変更------ Failed <--失敗
//! ```

pub mod sink;

pub use sink::{SaveReporter, SaveRequest, SaveSignal, SaveSink, SaveTicket};

use crate::editor::change_notifier::{EventBus, SubscriberId};
use crate::error::{Result, StateError};
use crate::scheduler::Clock;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::rc::Rc;

/// 保存フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SavePhase {
    Clean,
    Dirty,
    Saving,
    Failed,
}

/// ノートの保存状態
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveStatusInfo {
    pub note_id: String,
    pub file_name: String,
    pub phase: SavePhase,
    /// 0.0〜1.0。`Saving` 以外では 0
    pub progress: f64,
    pub last_saved: Option<DateTime<Utc>>,
    /// `Failed` のときだけ設定される
    pub error: Option<String>,
}

impl SaveStatusInfo {
    pub fn clean(note_id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            note_id: note_id.into(),
            file_name: file_name.into(),
            phase: SavePhase::Clean,
            progress: 0.0,
            last_saved: None,
            error: None,
        }
    }

    pub fn is_saving(&self) -> bool {
        self.phase == SavePhase::Saving
    }

    pub fn has_changes(&self) -> bool {
        matches!(self.phase, SavePhase::Dirty | SavePhase::Failed)
    }
}

/// 保存状態の遷移イベント
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SaveStatusEvent {
    pub note_id: String,
    pub info: SaveStatusInfo,
}

/// 保存状態のオブザーバ
pub trait SaveStatusObserver {
    fn on_save_status_changed(&self, event: &SaveStatusEvent);
}

const UNKNOWN_ERROR: &str = "unknown error";

/// 保存状態トラッカ
pub struct SaveStatusTracker {
    entries: HashMap<String, SaveStatusInfo>,
    clock: Rc<dyn Clock>,
    notifier: EventBus<SaveStatusEvent>,
}

impl SaveStatusTracker {
    pub fn new(clock: Rc<dyn Clock>) -> Self {
        Self {
            entries: HashMap::new(),
            clock,
            notifier: EventBus::new(),
        }
    }

    /// ノートを Clean で登録する（イベントなし）。登録済みならファイル名だけ更新
    pub fn register(&mut self, note_id: &str, file_name: &str) {
        self.entries
            .entry(note_id.to_string())
            .and_modify(|info| info.file_name = file_name.to_string())
            .or_insert_with(|| SaveStatusInfo::clean(note_id, file_name));
    }

    /// 登録を削除する
    pub fn forget(&mut self, note_id: &str) -> bool {
        self.entries.remove(note_id).is_some()
    }

    pub fn status(&self, note_id: &str) -> Option<&SaveStatusInfo> {
        self.entries.get(note_id)
    }

    pub fn phase(&self, note_id: &str) -> Option<SavePhase> {
        self.status(note_id).map(|info| info.phase)
    }

    fn entry_mut(&mut self, note_id: &str) -> Result<&mut SaveStatusInfo> {
        self.entries.get_mut(note_id).ok_or_else(|| {
            StateError::UnknownNote {
                note_id: note_id.to_string(),
            }
            .into()
        })
    }

    /// バッファ変更を反映する
    ///
    /// 保存中の変更は遷移を起こさない（保存完了後にバッファ側の状態で判断する）。
    pub fn mark_dirty(&mut self, note_id: &str) -> Result<Option<SaveStatusEvent>> {
        let info = self.entry_mut(note_id)?;
        match info.phase {
            SavePhase::Clean | SavePhase::Failed => {
                info.phase = SavePhase::Dirty;
                info.error = None;
                Ok(Some(self.emit(note_id)))
            }
            SavePhase::Dirty => Ok(None),
            SavePhase::Saving => {
                log::debug!("save: {} changed while saving", note_id);
                Ok(None)
            }
        }
    }

    /// 保存を開始する（Clean/Dirty/Failed から）
    pub fn begin_save(&mut self, note_id: &str) -> Result<SaveStatusEvent> {
        let info = self.entry_mut(note_id)?;
        if info.phase == SavePhase::Saving {
            return Err(StateError::AlreadySaving {
                note_id: note_id.to_string(),
            }
            .into());
        }

        info.phase = SavePhase::Saving;
        info.progress = 0.0;
        info.error = None;
        log::debug!("save: {} saving", note_id);
        Ok(self.emit(note_id))
    }

    /// 進捗を報告する。後退は現在値に丸め、値が変わらなければイベントなし
    pub fn report_progress(
        &mut self,
        note_id: &str,
        progress: f64,
    ) -> Result<Option<SaveStatusEvent>> {
        let info = self.entry_mut(note_id)?;
        if info.phase != SavePhase::Saving {
            return Err(StateError::NotSaving {
                note_id: note_id.to_string(),
            }
            .into());
        }

        let requested = if progress.is_nan() { info.progress } else { progress };
        if requested < info.progress {
            log::warn!(
                "save: progress {} for {} clamped to {}",
                requested,
                note_id,
                info.progress
            );
        }
        let clamped = requested.clamp(info.progress, 1.0);
        if clamped == info.progress {
            return Ok(None);
        }

        info.progress = clamped;
        Ok(Some(self.emit(note_id)))
    }

    /// 保存を完了する
    pub fn complete_save(
        &mut self,
        note_id: &str,
        outcome: std::result::Result<(), String>,
    ) -> Result<SaveStatusEvent> {
        let now = self.clock.now();
        let info = self.entry_mut(note_id)?;
        if info.phase != SavePhase::Saving {
            return Err(StateError::NotSaving {
                note_id: note_id.to_string(),
            }
            .into());
        }

        info.progress = 0.0;
        match outcome {
            Ok(()) => {
                info.phase = SavePhase::Clean;
                info.last_saved = Some(now);
                info.error = None;
                log::debug!("save: {} clean", note_id);
            }
            Err(message) => {
                let message = if message.trim().is_empty() {
                    UNKNOWN_ERROR.to_string()
                } else {
                    message
                };
                log::error!("save: {} failed: {}", note_id, message);
                info.phase = SavePhase::Failed;
                info.error = Some(message);
            }
        }
        Ok(self.emit(note_id))
    }

    /// どの状態からでも Clean に戻す
    pub fn clear_status(&mut self, note_id: &str) -> Option<SaveStatusEvent> {
        let info = self.entries.get_mut(note_id)?;
        info.phase = SavePhase::Clean;
        info.progress = 0.0;
        info.error = None;
        Some(self.emit(note_id))
    }

    fn emit(&self, note_id: &str) -> SaveStatusEvent {
        let info = self
            .entries
            .get(note_id)
            .cloned()
            .unwrap_or_else(|| SaveStatusInfo::clean(note_id, ""));
        let event = SaveStatusEvent {
            note_id: note_id.to_string(),
            info,
        };
        self.notifier.publish(event.clone());
        event
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&SaveStatusEvent) + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn add_observer(&self, observer: Rc<dyn SaveStatusObserver>) -> SubscriberId {
        self.notifier
            .subscribe(move |event| observer.on_save_status_changed(event))
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

impl std::fmt::Debug for SaveStatusTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SaveStatusTracker")
            .field("entries", &self.entries)
            .finish()
    }
}

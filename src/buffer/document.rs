//! ドキュメントバッファ
//!
//! 編集中ノートの正本。内容・タイトル・リビジョン・保存済みリビジョンを保持し、
//! 変更ごとに [`MutationEvent`] を発行する。

use super::note::Note;
use crate::editor::change_notifier::{EventBus, SubscriberId};
use crate::error::{EngineError, Result, StateError};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// 変更の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Content,
    Title,
    Clear,
}

/// バッファ変更イベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationEvent {
    pub revision: u64,
    pub kind: MutationKind,
}

/// ある時点のバッファ内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferSnapshot {
    pub note_id: Option<String>,
    pub title: String,
    pub content: String,
    pub revision: u64,
    pub is_modified: bool,
}

/// ドキュメントバッファ
#[derive(Debug, Default)]
pub struct DocumentBuffer {
    current_note: Option<Note>,
    content: String,
    title: String,
    revision: u64,
    saved_revision: u64,
    notifier: EventBus<MutationEvent>,
}

impl DocumentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// ノートを読み込む（リビジョンは 0 から）
    pub fn load(&mut self, note: Note) {
        log::debug!("buffer: load note {}", note.id);
        self.content = note.content.clone();
        self.title = note.title.clone();
        self.current_note = Some(note);
        self.revision = 0;
        self.saved_revision = 0;
    }

    /// 内容を置き換える
    ///
    /// 同じ内容なら何もしない。未読み込みで空文字列の場合も何もしない。
    pub fn set_content(&mut self, content: &str) -> Result<Option<MutationEvent>> {
        if self.current_note.is_none() {
            return if content.is_empty() {
                Ok(None)
            } else {
                Err(EngineError::NotLoaded)
            };
        }
        if self.content == content {
            return Ok(None);
        }

        self.content = content.to_string();
        Ok(Some(self.bump(MutationKind::Content)))
    }

    /// タイトルを置き換える
    pub fn set_title(&mut self, title: &str) -> Result<Option<MutationEvent>> {
        if self.current_note.is_none() {
            return if title.is_empty() {
                Ok(None)
            } else {
                Err(EngineError::NotLoaded)
            };
        }
        if self.title == title {
            return Ok(None);
        }

        self.title = title.to_string();
        Ok(Some(self.bump(MutationKind::Title)))
    }

    /// 保存完了を記録する
    ///
    /// 古いリビジョンの保存完了は無視する（その後に変更がある）。
    pub fn mark_saved(&mut self, revision: u64) -> Result<()> {
        if revision > self.revision {
            return Err(StateError::RevisionMismatch {
                requested: revision,
                current: self.revision,
            }
            .into());
        }

        if revision < self.revision {
            log::debug!(
                "buffer: saved revision {} is older than {}, still modified",
                revision,
                self.revision
            );
        }
        self.saved_revision = self.saved_revision.max(revision);
        Ok(())
    }

    /// 保存したノートを正本として取り込む
    ///
    /// 保存したリビジョンが現在のものと一致した場合だけノートを置き換え、`true` を返す。
    pub fn record_saved(&mut self, saved: Note, revision: u64) -> Result<bool> {
        self.mark_saved(revision)?;
        if revision != self.revision {
            return Ok(false);
        }
        match &self.current_note {
            Some(current) if current.id == saved.id => {
                self.current_note = Some(saved);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// ノートを閉じる
    pub fn clear(&mut self) -> Option<MutationEvent> {
        let note = self.current_note.take()?;
        log::debug!("buffer: clear note {}", note.id);
        self.content.clear();
        self.title.clear();
        self.revision = 0;
        self.saved_revision = 0;

        let event = MutationEvent {
            revision: 0,
            kind: MutationKind::Clear,
        };
        self.notifier.publish(event.clone());
        Some(event)
    }

    fn bump(&mut self, kind: MutationKind) -> MutationEvent {
        self.revision += 1;
        let event = MutationEvent {
            revision: self.revision,
            kind,
        };
        self.notifier.publish(event.clone());
        event
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn saved_revision(&self) -> u64 {
        self.saved_revision
    }

    pub fn is_modified(&self) -> bool {
        self.revision > self.saved_revision
    }

    pub fn is_loaded(&self) -> bool {
        self.current_note.is_some()
    }

    /// 読み込み時点（または最後の保存時点）のノート
    pub fn current_note(&self) -> Option<&Note> {
        self.current_note.as_ref()
    }

    pub fn note_id(&self) -> Option<&str> {
        self.current_note.as_ref().map(|note| note.id.as_str())
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        BufferSnapshot {
            note_id: self.note_id().map(str::to_string),
            title: self.title.clone(),
            content: self.content.clone(),
            revision: self.revision,
            is_modified: self.is_modified(),
        }
    }

    /// 現在のタイトル・内容を反映したノートを作る
    pub fn snapshot_note(&self, now: DateTime<Utc>) -> Option<Note> {
        let mut note = self.current_note.clone()?;
        note.title = self.title.clone();
        note.content = self.content.clone();
        note.updated_at = now;
        Some(note)
    }

    /// 変更リスナーを登録
    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&MutationEvent) + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

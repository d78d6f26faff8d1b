//! 通知センター
//!
//! 一時的なユーザー向けメッセージの保管と配信。自動消去・明示的な消去・一括消去を扱い、
//! ノートごとの保存状態チャネルも同じセンターで多重化する。
//!
//! センターは UI スレッド専用のハンドルで、`clone` しても同じ状態を共有する。

use crate::editor::change_notifier::{EventBus, SubscriberId};
use crate::save::{SaveStatusEvent, SaveStatusInfo};
use crate::scheduler::{Clock, TimerId};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// 通知の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

impl NotificationKind {
    pub fn label(self) -> &'static str {
        match self {
            NotificationKind::Info => "Info",
            NotificationKind::Success => "Success",
            NotificationKind::Warning => "Warning",
            NotificationKind::Error => "Error",
        }
    }

    /// 表示色
    pub fn color(self) -> &'static str {
        match self {
            NotificationKind::Info => "#2196F3",
            NotificationKind::Success => "#4CAF50",
            NotificationKind::Warning => "#FF9800",
            NotificationKind::Error => "#F44336",
        }
    }

    /// 種類ごとの既定表示時間
    pub fn default_duration(self) -> Duration {
        match self {
            NotificationKind::Info | NotificationKind::Success => Duration::from_secs(3),
            NotificationKind::Warning => Duration::from_secs(4),
            NotificationKind::Error => Duration::from_secs(5),
        }
    }
}

/// 通知 ID（発行順に単調増加）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct NotificationId(u64);

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "notification_{}", self.0)
    }
}

/// 通知
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: NotificationId,
    pub kind: NotificationKind,
    pub title: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
    /// `None` なら手動で消すまで残る
    pub expires_at: Option<DateTime<Utc>>,
    pub is_read: bool,
}

/// 通知イベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "notification", rename_all = "lowercase")]
pub enum NotificationEvent {
    Added(Notification),
    Removed(Notification),
}

impl NotificationEvent {
    pub fn notification(&self) -> &Notification {
        match self {
            NotificationEvent::Added(n) | NotificationEvent::Removed(n) => n,
        }
    }
}

struct Entry {
    notification: Notification,
    timer: Option<TimerId>,
}

#[derive(Default)]
struct CenterState {
    active: BTreeMap<NotificationId, Entry>,
    next_id: u64,
    save_statuses: HashMap<String, SaveStatusInfo>,
}

struct CenterInner {
    state: RefCell<CenterState>,
    events: EventBus<NotificationEvent>,
    save_events: EventBus<SaveStatusEvent>,
    clock: Rc<dyn Clock>,
    default_duration: Duration,
}

/// 通知センター
#[derive(Clone)]
pub struct NotificationCenter {
    inner: Rc<CenterInner>,
}

impl NotificationCenter {
    /// `default_duration` は `show` で表示時間を省略したときに使う（0 なら消えない）
    pub fn new(clock: Rc<dyn Clock>, default_duration: Duration) -> Self {
        Self {
            inner: Rc::new(CenterInner {
                state: RefCell::new(CenterState::default()),
                events: EventBus::new(),
                save_events: EventBus::new(),
                clock,
                default_duration,
            }),
        }
    }

    /// 通知を表示して ID を返す
    ///
    /// `duration` が 0 なら自動消去しない。
    pub fn show(
        &self,
        kind: NotificationKind,
        title: &str,
        message: &str,
        duration: Option<Duration>,
    ) -> NotificationId {
        let duration = duration.unwrap_or(self.inner.default_duration);
        let now = self.inner.clock.now();
        let expires_at = if duration.is_zero() {
            None
        } else {
            chrono::Duration::from_std(duration)
                .ok()
                .and_then(|d| now.checked_add_signed(d))
        };

        let notification = {
            let mut state = self.inner.state.borrow_mut();
            state.next_id += 1;
            let id = NotificationId(state.next_id);
            let notification = Notification {
                id,
                kind,
                title: title.to_string(),
                message: message.to_string(),
                created_at: now,
                expires_at,
                is_read: false,
            };
            state.active.insert(
                id,
                Entry {
                    notification: notification.clone(),
                    timer: None,
                },
            );
            notification
        };
        let id = notification.id;

        if expires_at.is_some() {
            let weak: Weak<CenterInner> = Rc::downgrade(&self.inner);
            let timer = self.inner.clock.after(
                duration,
                Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        NotificationCenter { inner }.remove(id, false);
                    }
                }),
            );
            if let Some(entry) = self.inner.state.borrow_mut().active.get_mut(&id) {
                entry.timer = Some(timer);
            }
        }

        log::debug!("notification: {} added ({})", id, kind.label());
        self.inner.events.publish(NotificationEvent::Added(notification));
        id
    }

    pub fn info(&self, title: &str, message: &str) -> NotificationId {
        self.show_kind(NotificationKind::Info, title, message)
    }

    pub fn success(&self, title: &str, message: &str) -> NotificationId {
        self.show_kind(NotificationKind::Success, title, message)
    }

    pub fn warning(&self, title: &str, message: &str) -> NotificationId {
        self.show_kind(NotificationKind::Warning, title, message)
    }

    pub fn error(&self, title: &str, message: &str) -> NotificationId {
        self.show_kind(NotificationKind::Error, title, message)
    }

    fn show_kind(&self, kind: NotificationKind, title: &str, message: &str) -> NotificationId {
        self.show(kind, title, message, Some(kind.default_duration()))
    }

    /// 通知を消す。既に消えていれば何もしない
    pub fn dismiss(&self, id: NotificationId) -> bool {
        self.remove(id, true)
    }

    /// すべての通知を消す
    pub fn dismiss_all(&self) -> usize {
        let removed: Vec<Entry> = {
            let mut state = self.inner.state.borrow_mut();
            std::mem::take(&mut state.active).into_values().rev().collect()
        };

        let count = removed.len();
        for entry in removed {
            self.finish_removal(entry, true);
        }
        count
    }

    fn remove(&self, id: NotificationId, cancel_timer: bool) -> bool {
        // 配信前に取り除く
        let entry = self.inner.state.borrow_mut().active.remove(&id);
        match entry {
            Some(entry) => {
                self.finish_removal(entry, cancel_timer);
                true
            }
            None => false,
        }
    }

    fn finish_removal(&self, entry: Entry, cancel_timer: bool) {
        if cancel_timer {
            if let Some(timer) = entry.timer {
                self.inner.clock.cancel(timer);
            }
        }
        let mut notification = entry.notification;
        notification.is_read = true;
        log::debug!("notification: {} removed", notification.id);
        self.inner
            .events
            .publish(NotificationEvent::Removed(notification));
    }

    /// 表示中の通知数
    pub fn count(&self) -> usize {
        self.inner.state.borrow().active.len()
    }

    /// 表示中の通知（新しい順）
    pub fn active(&self) -> Vec<Notification> {
        self.inner
            .state
            .borrow()
            .active
            .values()
            .rev()
            .map(|entry| entry.notification.clone())
            .collect()
    }

    pub fn get(&self, id: NotificationId) -> Option<Notification> {
        self.inner
            .state
            .borrow()
            .active
            .get(&id)
            .map(|entry| entry.notification.clone())
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&NotificationEvent) + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    /// 保存状態を更新する（最後に書かれた値が現在の状態）
    pub fn update_save_status(&self, note_id: &str, file_name: &str, info: SaveStatusInfo) {
        let mut info = info;
        info.note_id = note_id.to_string();
        info.file_name = file_name.to_string();
        self.inner
            .state
            .borrow_mut()
            .save_statuses
            .insert(note_id.to_string(), info.clone());
        self.inner.save_events.publish(SaveStatusEvent {
            note_id: note_id.to_string(),
            info,
        });
    }

    /// 保存状態を消す。記録があれば Clean の状態を配信する
    pub fn clear_save_status(&self, note_id: &str) -> bool {
        let previous = self.inner.state.borrow_mut().save_statuses.remove(note_id);
        match previous {
            Some(previous) => {
                let mut info = SaveStatusInfo::clean(note_id, previous.file_name);
                info.last_saved = previous.last_saved;
                self.inner.save_events.publish(SaveStatusEvent {
                    note_id: note_id.to_string(),
                    info,
                });
                true
            }
            None => false,
        }
    }

    pub fn save_status(&self, note_id: &str) -> Option<SaveStatusInfo> {
        self.inner.state.borrow().save_statuses.get(note_id).cloned()
    }

    pub fn subscribe_save_status<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&SaveStatusEvent) + 'static,
    {
        self.inner.save_events.subscribe(listener)
    }

    pub fn unsubscribe_save_status(&self, id: SubscriberId) -> bool {
        self.inner.save_events.unsubscribe(id)
    }
}

impl fmt::Debug for NotificationCenter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotificationCenter")
            .field("count", &self.count())
            .field("default_duration", &self.inner.default_duration)
            .finish()
    }
}

thread_local! {
    static GLOBAL_CENTER: RefCell<Option<NotificationCenter>> = RefCell::new(None);
}

/// プロセス全体の通知センターを設定する（UI スレッドで起動時に呼ぶ）
pub fn install_global(center: NotificationCenter) -> Option<NotificationCenter> {
    GLOBAL_CENTER.with(|slot| slot.borrow_mut().replace(center))
}

/// プロセス全体の通知センター
pub fn global() -> Option<NotificationCenter> {
    GLOBAL_CENTER.with(|slot| slot.borrow().clone())
}

/// 終了時の後始末。表示中の通知をすべて消してから外す
pub fn teardown_global() -> bool {
    let center = GLOBAL_CENTER.with(|slot| slot.borrow_mut().take());
    match center {
        Some(center) => {
            center.dismiss_all();
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::save::SavePhase;
    use crate::scheduler::ManualClock;
    use std::cell::Cell;

    fn center() -> (NotificationCenter, Rc<ManualClock>) {
        let clock = Rc::new(ManualClock::default());
        let center = NotificationCenter::new(clock.clone(), Duration::from_millis(3000));
        (center, clock)
    }

    #[test]
    fn test_show_and_expire() {
        let (center, clock) = center();
        let id = center.show(NotificationKind::Info, "t", "m", Some(Duration::from_millis(100)));
        assert_eq!(id.to_string(), "notification_1");
        assert_eq!(center.count(), 1);

        clock.advance(Duration::from_millis(50));
        assert_eq!(center.count(), 1);
        clock.advance(Duration::from_millis(100));
        assert_eq!(center.count(), 0);
        assert!(center.get(id).is_none());
    }

    #[test]
    fn test_zero_duration_is_sticky() {
        let (center, clock) = center();
        let id = center.show(NotificationKind::Warning, "t", "m", Some(Duration::ZERO));
        assert_eq!(center.get(id).unwrap().expires_at, None);

        clock.advance(Duration::from_secs(3600));
        assert_eq!(center.count(), 1);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_missing_duration_uses_default() {
        let (center, clock) = center();
        center.show(NotificationKind::Info, "t", "m", None);
        clock.advance(Duration::from_millis(2999));
        assert_eq!(center.count(), 1);
        clock.advance(Duration::from_millis(1));
        assert_eq!(center.count(), 0);
    }

    #[test]
    fn test_kind_helpers_use_kind_durations() {
        let (center, clock) = center();
        center.success("ok", "");
        center.warning("careful", "");
        center.error("bad", "");

        clock.advance(Duration::from_secs(3));
        assert_eq!(center.count(), 2);
        clock.advance(Duration::from_secs(1));
        assert_eq!(center.count(), 1);
        clock.advance(Duration::from_secs(1));
        assert_eq!(center.count(), 0);
    }

    #[test]
    fn test_second_dismiss_is_noop() {
        let (center, clock) = center();
        let removed = Rc::new(Cell::new(0));
        let counter = removed.clone();
        center.subscribe(move |event| {
            if let NotificationEvent::Removed(n) = event {
                assert!(n.is_read);
                counter.set(counter.get() + 1);
            }
        });

        let id = center.info("t", "m");
        assert!(center.dismiss(id));
        assert!(!center.dismiss(id));
        assert_eq!(removed.get(), 1);
        // 取り消したタイマーは発火しない
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_active_is_newest_first() {
        let (center, _) = center();
        let first = center.info("first", "");
        let second = center.info("second", "");

        let ids: Vec<NotificationId> = center.active().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![second, first]);
    }

    #[test]
    fn test_removed_before_listener_runs() {
        let (center, _) = center();
        let observed_count = Rc::new(Cell::new(usize::MAX));
        let handle = center.clone();
        let observed = observed_count.clone();
        center.subscribe(move |event| {
            if matches!(event, NotificationEvent::Removed(_)) {
                observed.set(handle.count());
            }
        });

        let id = center.info("t", "m");
        center.dismiss(id);
        assert_eq!(observed_count.get(), 0);
    }

    #[test]
    fn test_listener_may_dismiss_reentrantly() {
        let (center, _) = center();
        let handle = center.clone();
        let removals = Rc::new(Cell::new(0));
        let counter = removals.clone();
        center.subscribe(move |event| match event {
            NotificationEvent::Added(n) => {
                handle.dismiss(n.id);
                handle.dismiss(n.id);
            }
            NotificationEvent::Removed(_) => counter.set(counter.get() + 1),
        });

        center.info("t", "m");
        assert_eq!(center.count(), 0);
        assert_eq!(removals.get(), 1);
    }

    #[test]
    fn test_dismiss_all() {
        let (center, clock) = center();
        center.info("a", "");
        center.error("b", "");
        assert_eq!(center.dismiss_all(), 2);
        assert_eq!(center.count(), 0);
        assert_eq!(clock.pending_timers(), 0);
        assert_eq!(center.dismiss_all(), 0);
    }

    #[test]
    fn test_save_status_channel() {
        let (center, _) = center();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        center.subscribe_save_status(move |event| sink.borrow_mut().push(event.info.phase));

        let mut info = SaveStatusInfo::clean("n", "ignored.md");
        info.phase = SavePhase::Dirty;
        center.update_save_status("n", "note.md", info);

        let stored = center.save_status("n").unwrap();
        assert_eq!(stored.file_name, "note.md");
        assert_eq!(stored.phase, SavePhase::Dirty);

        assert!(center.clear_save_status("n"));
        assert!(!center.clear_save_status("n"));
        assert!(center.save_status("n").is_none());
        assert_eq!(*seen.borrow(), vec![SavePhase::Dirty, SavePhase::Clean]);
    }

    #[test]
    fn test_global_install_and_teardown() {
        let (center, _) = center();
        assert!(install_global(center.clone()).is_none());
        global().unwrap().info("hello", "");
        assert_eq!(center.count(), 1);

        assert!(teardown_global());
        assert!(global().is_none());
        assert_eq!(center.count(), 0);
    }
}

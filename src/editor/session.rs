//! エディタセッション
//!
//! バッファ・プレビュー・統計・保存状態を束ねる合成ルート。GUI に対する単一の窓口で、
//! それぞれの操作は所有するコンポーネントへ振り分けるだけにとどめる。
//!
//! 変更の連鎖（バッファ → 統計 → プレビュー → 保存状態）は1回の呼び出しの中で完結する。
//! プレビューの描画だけは次の UI ターンへ送り、同じターン内の変更を最新の1回にまとめる。
//!
//! 各コンポーネントが自分のバスへ発行したイベントはセッションが受け取って溜めておき、
//! 状態の借用を解いてから [`SessionEvent`] として配信する。

use crate::buffer::{BufferSnapshot, DocumentBuffer, MutationEvent, Note};
use crate::config::EngineConfig;
use crate::editor::change_notifier::{EventBus, SubscriberId};
use crate::editor::stats::{StatsCollector, StatsEvent, TextStats};
use crate::error::{EngineError, ErrorDisplay, Result};
use crate::notification::{NotificationCenter, NotificationKind};
use crate::preview::{
    ComrakRenderer, MarkdownRenderer, PreviewEvent, PreviewRenderer, PreviewState,
    PreviewVisibilityEvent,
};
use crate::save::{
    SavePhase, SaveReporter, SaveRequest, SaveSignal, SaveSink, SaveStatusEvent, SaveStatusInfo,
    SaveStatusTracker, SaveTicket,
};
use crate::scheduler::{CancelToken, Clock, Poster, Waker};
use crate::ui::views::{
    EncryptionStatusView, NotificationView, PreviewView, SaveStatusView, WordCountView,
};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::time::Duration;

const SAVE_CANCELLED: &str = "save cancelled";

/// UI がバインドするセッションイベント
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Mutation(MutationEvent),
    Stats(StatsEvent),
    Preview(PreviewEvent),
    PreviewVisibility(PreviewVisibilityEvent),
    SaveStatus(SaveStatusEvent),
}

/// プレビューの初期状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub preview_visible: bool,
    pub auto_refresh: bool,
}

impl SessionOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            preview_visible: config.preview_visible_default,
            auto_refresh: config.preview_auto_refresh_default,
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            preview_visible: true,
            auto_refresh: true,
        }
    }
}

/// セッションが使う外部の能力
pub struct SessionParts {
    pub renderer: Box<dyn MarkdownRenderer>,
    pub poster: Rc<dyn Poster>,
    pub clock: Rc<dyn Clock>,
    pub notifications: NotificationCenter,
}

impl SessionParts {
    /// 既定の comrak レンダラを使う
    pub fn new(
        poster: Rc<dyn Poster>,
        clock: Rc<dyn Clock>,
        notifications: NotificationCenter,
    ) -> Self {
        Self {
            renderer: Box::new(ComrakRenderer::new()),
            poster,
            clock,
            notifications,
        }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn MarkdownRenderer>) -> Self {
        self.renderer = renderer;
        self
    }
}

struct ActiveSave {
    ticket: SaveTicket,
    cancel: CancelToken,
    note: Note,
}

struct SessionCore {
    buffer: DocumentBuffer,
    preview: PreviewRenderer,
    stats: StatsCollector,
    tracker: SaveStatusTracker,
    active_save: Option<ActiveSave>,
    next_serial: u64,
    save_sender: Sender<SaveSignal>,
    save_receiver: Receiver<SaveSignal>,
    save_waker: Waker,
}

/// 通知センターへ渡す副作用
enum Notice {
    SaveStatus {
        file_name: String,
        info: SaveStatusInfo,
    },
    ClearSaveStatus(String),
    Show {
        kind: NotificationKind,
        title: String,
        message: String,
        duration: Duration,
    },
}

/// 借用を解いてから適用する副作用
#[derive(Default)]
struct Outbox {
    notices: Vec<Notice>,
    schedule_flush: bool,
}

impl Outbox {
    fn error(&mut self, error: &EngineError) {
        let display = ErrorDisplay::new(error);
        self.notices.push(Notice::Show {
            kind: display.level.notification_kind(),
            title: display.title,
            message: display.message,
            duration: display.duration,
        });
    }

    fn show(&mut self, kind: NotificationKind, title: &str, message: &str) {
        self.notices.push(Notice::Show {
            kind,
            title: title.to_string(),
            message: message.to_string(),
            duration: kind.default_duration(),
        });
    }
}

type Staged = Rc<RefCell<Vec<SessionEvent>>>;

/// コンポーネントのイベントを `wrap` で包んで溜めるリスナー
fn stage<E: Clone + 'static>(
    staged: &Staged,
    wrap: fn(E) -> SessionEvent,
) -> impl Fn(&E) + 'static {
    let staged = staged.clone();
    move |event: &E| staged.borrow_mut().push(wrap(event.clone()))
}

struct SessionShared {
    core: RefCell<SessionCore>,
    staged: Staged,
    bus: EventBus<SessionEvent>,
    notifications: NotificationCenter,
    poster: Rc<dyn Poster>,
    clock: Rc<dyn Clock>,
}

/// エディタセッション
///
/// 単一の UI スレッドから使う。複数スレッドからの同時変更はサポートしない。
pub struct EditorSession {
    shared: Rc<SessionShared>,
}

impl EditorSession {
    pub fn new(parts: SessionParts, options: SessionOptions) -> Self {
        let shared = Rc::new_cyclic(|weak: &Weak<SessionShared>| {
            let staged: Staged = Rc::default();
            let buffer = DocumentBuffer::new();
            buffer.subscribe(stage(&staged, SessionEvent::Mutation));
            let preview = PreviewRenderer::new(
                parts.renderer,
                options.preview_visible,
                options.auto_refresh,
            );
            preview.subscribe(stage(&staged, SessionEvent::Preview));
            preview.subscribe_visibility(stage(&staged, SessionEvent::PreviewVisibility));
            let stats = StatsCollector::new();
            stats.subscribe(stage(&staged, SessionEvent::Stats));
            let tracker = SaveStatusTracker::new(parts.clock.clone());
            tracker.subscribe(stage(&staged, SessionEvent::SaveStatus));

            // ワーカーからの報告で起こされたら取り込む
            let waking = weak.clone();
            let save_waker = parts.poster.waker(Rc::new(move || {
                if let Some(shared) = waking.upgrade() {
                    shared.pump();
                }
            }));
            let (save_sender, save_receiver) = channel();

            SessionShared {
                core: RefCell::new(SessionCore {
                    buffer,
                    preview,
                    stats,
                    tracker,
                    active_save: None,
                    next_serial: 0,
                    save_sender,
                    save_receiver,
                    save_waker,
                }),
                staged,
                bus: EventBus::new(),
                notifications: parts.notifications,
                poster: parts.poster,
                clock: parts.clock,
            }
        });

        Self { shared }
    }

    /// セッションイベントのリスナーを登録
    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&SessionEvent) + 'static,
    {
        self.shared.bus.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.shared.bus.unsubscribe(id)
    }

    /// ノートを読み込む
    pub fn load_note(&mut self, note: Note) {
        let mut outbox = Outbox::default();
        {
            let mut core = self.shared.core.borrow_mut();
            log::debug!("session: load note {}", note.id);
            SessionShared::abandon_save(&mut core);
            core.tracker.register(&note.id, &note.file_name());
            let content = note.content.clone();
            core.buffer.load(note);

            core.stats.update(&content);
            // 前のノートの描画を残さない
            core.preview.clear();
            if core.preview.update(&content, 0) {
                outbox.schedule_flush = true;
            }
        }
        self.shared.dispatch(outbox);
    }

    /// 空のノートを作って読み込み、その ID を返す
    pub fn create_new_note(&mut self, title: &str) -> String {
        let note = Note::new(title, "");
        let id = note.id.clone();
        {
            let mut core = self.shared.core.borrow_mut();
            SessionShared::abandon_save(&mut core);
            core.tracker.register(&note.id, &note.file_name());
            core.buffer.load(note);
            core.preview.clear();
            core.stats.reset();
        }
        self.shared.dispatch(Outbox::default());
        id
    }

    /// 内容を置き換える
    pub fn set_content(&mut self, content: &str) -> Result<()> {
        let mut outbox = Outbox::default();
        let outcome = {
            let mut core = self.shared.core.borrow_mut();
            match core.buffer.set_content(content) {
                Ok(Some(event)) => {
                    core.stats.update(content);
                    if core.preview.update(content, event.revision) {
                        outbox.schedule_flush = true;
                    }
                    SessionShared::mark_dirty(&mut core);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(error) => {
                    outbox.error(&error);
                    Err(error)
                }
            }
        };
        self.shared.dispatch(outbox);
        outcome
    }

    /// タイトルを置き換える
    pub fn set_title(&mut self, title: &str) -> Result<()> {
        let mut outbox = Outbox::default();
        let outcome = {
            let mut core = self.shared.core.borrow_mut();
            match core.buffer.set_title(title) {
                Ok(Some(_)) => {
                    if let Some(mut note) = core.buffer.current_note().cloned() {
                        note.title = title.to_string();
                        core.tracker.register(&note.id, &note.file_name());
                    }
                    SessionShared::mark_dirty(&mut core);
                    Ok(())
                }
                Ok(None) => Ok(()),
                Err(error) => {
                    outbox.error(&error);
                    Err(error)
                }
            }
        };
        self.shared.dispatch(outbox);
        outcome
    }

    /// 保存を開始する
    ///
    /// 保存状態を Saving にしてから `sink` を呼ぶ。同期的な保存先ならこの呼び出しの中で完了し、
    /// 非同期の保存先なら後で [`EditorSession::pump`] が結果を反映する。
    pub fn save_note(&mut self, sink: &mut dyn SaveSink) -> Result<SaveTicket> {
        let mut outbox = Outbox::default();
        let prepared = {
            let mut core = self.shared.core.borrow_mut();
            self.shared.prepare_save(&mut core, &mut outbox)
        };
        self.shared.dispatch(outbox);

        let (request, reporter) = prepared?;
        let ticket = reporter.ticket().clone();
        sink.save(request, reporter);
        self.pump();
        Ok(ticket)
    }

    /// 保存先から届いた進捗と結果を反映し、反映した件数を返す
    pub fn pump(&self) -> usize {
        self.shared.pump()
    }

    /// 実行中の保存を取り消す。Failed への遷移は次の UI ターンで行われる
    pub fn cancel_save(&mut self) -> bool {
        let ticket = {
            let core = self.shared.core.borrow();
            match &core.active_save {
                Some(active) if !active.cancel.is_cancelled() => {
                    active.cancel.cancel();
                    active.ticket.clone()
                }
                _ => return false,
            }
        };

        log::debug!("session: cancel save {}", ticket.serial);
        let weak: Weak<SessionShared> = Rc::downgrade(&self.shared);
        self.shared.poster.post(Box::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.finish_cancelled_save(&ticket);
            }
        }));
        true
    }

    /// 保存できる状態か（ノートが読み込まれていて保存中でない）
    pub fn can_save(&self) -> bool {
        let core = self.shared.core.borrow();
        match core.buffer.note_id() {
            Some(id) => core.tracker.phase(id) != Some(SavePhase::Saving),
            None => false,
        }
    }

    /// プレビューの表示を切り替え、切り替え後の表示状態を返す
    pub fn toggle_preview(&mut self) -> bool {
        let visible = !self.shared.core.borrow().preview.is_visible();
        self.set_preview_visible(visible);
        visible
    }

    pub fn set_preview_visible(&mut self, visible: bool) {
        self.shared.core.borrow_mut().preview.set_visible(visible);
        self.shared.dispatch(Outbox::default());
    }

    pub fn set_auto_refresh(&mut self, auto_refresh: bool) {
        self.shared
            .core
            .borrow_mut()
            .preview
            .set_auto_refresh(auto_refresh);
        self.shared.dispatch(Outbox::default());
    }

    /// 表示状態に関係なくプレビューを描画し直す
    pub fn refresh_preview(&mut self) {
        self.shared.core.borrow_mut().preview.refresh_now();
        self.shared.dispatch(Outbox::default());
    }

    /// ノートを閉じる
    pub fn clear(&mut self) {
        let mut outbox = Outbox::default();
        {
            let mut core = self.shared.core.borrow_mut();
            let note_id = core.buffer.note_id().map(str::to_string);

            if let Some(active) = core.active_save.take() {
                active.cancel.cancel();
            }
            core.buffer.clear();
            core.preview.clear();
            core.stats.reset();
            if let Some(id) = note_id {
                core.tracker.clear_status(&id);
                core.tracker.forget(&id);
                outbox.notices.push(Notice::ClearSaveStatus(id));
            }
        }
        self.shared.dispatch(outbox);
    }

    pub fn content(&self) -> String {
        self.shared.core.borrow().buffer.content().to_string()
    }

    pub fn title(&self) -> String {
        self.shared.core.borrow().buffer.title().to_string()
    }

    pub fn revision(&self) -> u64 {
        self.shared.core.borrow().buffer.revision()
    }

    pub fn is_modified(&self) -> bool {
        self.shared.core.borrow().buffer.is_modified()
    }

    pub fn is_loaded(&self) -> bool {
        self.shared.core.borrow().buffer.is_loaded()
    }

    pub fn current_note(&self) -> Option<Note> {
        self.shared.core.borrow().buffer.current_note().cloned()
    }

    pub fn snapshot(&self) -> BufferSnapshot {
        self.shared.core.borrow().buffer.snapshot()
    }

    pub fn word_count(&self) -> usize {
        self.shared.core.borrow().stats.word_count()
    }

    pub fn text_stats(&self) -> TextStats {
        self.shared.core.borrow().stats.stats()
    }

    pub fn preview_state(&self) -> PreviewState {
        self.shared.core.borrow().preview.state().clone()
    }

    /// これまでのプレビュー描画回数
    pub fn render_count(&self) -> usize {
        self.shared.core.borrow().preview.render_count()
    }

    pub fn save_status(&self) -> Option<SaveStatusInfo> {
        let core = self.shared.core.borrow();
        let id = core.buffer.note_id()?;
        core.tracker.status(id).cloned()
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.shared.notifications
    }

    pub fn save_status_view(&self) -> SaveStatusView {
        SaveStatusView::from_status(self.save_status().as_ref(), self.shared.clock.now())
    }

    pub fn word_count_view(&self) -> WordCountView {
        WordCountView {
            count: self.word_count(),
        }
    }

    pub fn preview_view(&self) -> PreviewView {
        PreviewView::from_state(self.shared.core.borrow().preview.state())
    }

    pub fn encryption_status_view(&self) -> EncryptionStatusView {
        EncryptionStatusView::from_note(self.shared.core.borrow().buffer.current_note())
    }

    pub fn notification_view(&self) -> NotificationView {
        NotificationView::from_center(&self.shared.notifications)
    }
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.core.borrow();
        f.debug_struct("EditorSession")
            .field("note_id", &core.buffer.note_id())
            .field("revision", &core.buffer.revision())
            .field("is_modified", &core.buffer.is_modified())
            .field("preview", &core.preview)
            .finish()
    }
}

impl SessionShared {
    fn dispatch(self: &Rc<Self>, outbox: Outbox) {
        let events = std::mem::take(&mut *self.staged.borrow_mut());
        let mut notices: Vec<Notice> = events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::SaveStatus(event) => Some(Notice::SaveStatus {
                    file_name: event.info.file_name.clone(),
                    info: event.info.clone(),
                }),
                _ => None,
            })
            .collect();
        notices.extend(outbox.notices);

        for event in events {
            self.bus.publish(event);
        }

        for notice in notices {
            match notice {
                Notice::SaveStatus { file_name, info } => {
                    let note_id = info.note_id.clone();
                    self.notifications
                        .update_save_status(&note_id, &file_name, info);
                }
                Notice::ClearSaveStatus(note_id) => {
                    self.notifications.clear_save_status(&note_id);
                }
                Notice::Show {
                    kind,
                    title,
                    message,
                    duration,
                } => {
                    self.notifications
                        .show(kind, &title, &message, Some(duration));
                }
            }
        }

        if outbox.schedule_flush {
            let weak = Rc::downgrade(self);
            self.poster.post(Box::new(move || {
                if let Some(shared) = weak.upgrade() {
                    shared.flush_preview();
                }
            }));
        }
    }

    fn mark_dirty(core: &mut SessionCore) {
        let Some(id) = core.buffer.note_id().map(str::to_string) else {
            return;
        };
        if let Err(error) = core.tracker.mark_dirty(&id) {
            log::warn!("session: cannot mark {} dirty: {}", id, error);
        }
    }

    /// 実行中の保存を打ち切り、そのノートの保存状態を Failed にする（通知なし）
    fn abandon_save(core: &mut SessionCore) {
        let Some(active) = core.active_save.take() else {
            return;
        };
        active.cancel.cancel();
        log::debug!(
            "session: abandon save {} of {}",
            active.ticket.serial,
            active.ticket.note_id
        );
        if let Err(error) = core
            .tracker
            .complete_save(&active.ticket.note_id, Err(SAVE_CANCELLED.to_string()))
        {
            log::warn!("session: abandon ignored: {}", error);
        }
    }

    fn flush_preview(self: &Rc<Self>) {
        self.core.borrow_mut().preview.flush_pending();
        self.dispatch(Outbox::default());
    }

    fn prepare_save(
        &self,
        core: &mut SessionCore,
        outbox: &mut Outbox,
    ) -> Result<(SaveRequest, SaveReporter)> {
        let note = match core.buffer.snapshot_note(self.clock.now()) {
            Some(note) => note,
            None => {
                outbox.error(&EngineError::NotLoaded);
                return Err(EngineError::NotLoaded);
            }
        };
        let revision = core.buffer.revision();

        if let Err(error) = core.tracker.begin_save(&note.id) {
            outbox.error(&error);
            return Err(error);
        }

        core.next_serial += 1;
        let ticket = SaveTicket {
            note_id: note.id.clone(),
            revision,
            serial: core.next_serial,
        };
        let cancel = CancelToken::new();
        log::debug!("session: save {} revision {}", note.id, revision);

        core.active_save = Some(ActiveSave {
            ticket: ticket.clone(),
            cancel: cancel.clone(),
            note: note.clone(),
        });
        let reporter = SaveReporter::new(ticket, core.save_sender.clone(), cancel)
            .with_waker(core.save_waker.clone());
        Ok((SaveRequest { note, revision }, reporter))
    }

    fn pump(self: &Rc<Self>) -> usize {
        let signals: Vec<SaveSignal> = self.core.borrow().save_receiver.try_iter().collect();
        let mut applied = 0;

        for signal in signals {
            let mut outbox = Outbox::default();
            {
                let mut core = self.core.borrow_mut();
                let current = match &core.active_save {
                    Some(active) => {
                        &active.ticket == signal.ticket() && !active.cancel.is_cancelled()
                    }
                    None => false,
                };
                if !current {
                    log::debug!("session: dropping stale save signal {}", signal.ticket().serial);
                    continue;
                }

                applied += 1;
                match signal {
                    SaveSignal::Progress { ticket, progress } => {
                        if let Err(error) = core.tracker.report_progress(&ticket.note_id, progress)
                        {
                            log::warn!("session: progress ignored: {}", error);
                        }
                    }
                    SaveSignal::Completed { result, .. } => {
                        Self::finish_save(&mut core, result, &mut outbox);
                    }
                }
            }
            self.dispatch(outbox);
        }
        applied
    }

    fn finish_save(
        core: &mut SessionCore,
        result: std::result::Result<(), String>,
        outbox: &mut Outbox,
    ) {
        let Some(active) = core.active_save.take() else {
            return;
        };
        let ticket = active.ticket;

        let event = match core.tracker.complete_save(&ticket.note_id, result.clone()) {
            Ok(event) => event,
            Err(error) => {
                log::warn!("session: completion ignored: {}", error);
                return;
            }
        };
        let file_name = event.info.file_name.clone();
        let failure = event.info.error.clone();

        match (result, failure) {
            (Ok(()), _) => {
                if core.buffer.note_id() == Some(ticket.note_id.as_str()) {
                    if let Err(error) = core.buffer.record_saved(active.note, ticket.revision) {
                        log::warn!("session: saved revision rejected: {}", error);
                    }
                    if core.buffer.is_modified() {
                        Self::mark_dirty(core);
                    }
                }
                outbox.show(NotificationKind::Success, "Saved", &file_name);
            }
            (Err(_), failure) => {
                let message = failure.unwrap_or_else(|| "unknown error".to_string());
                outbox.show(NotificationKind::Error, "Save failed", &message);
            }
        }
    }

    fn finish_cancelled_save(self: &Rc<Self>, ticket: &SaveTicket) {
        {
            let mut core = self.core.borrow_mut();
            let matches = matches!(&core.active_save, Some(active) if &active.ticket == ticket);
            if !matches {
                return;
            }
            core.active_save = None;
            if let Err(error) = core
                .tracker
                .complete_save(&ticket.note_id, Err(SAVE_CANCELLED.to_string()))
            {
                log::warn!("session: cancel ignored: {}", error);
            }
        }
        self.dispatch(Outbox::default());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preview::RenderedView;
    use crate::scheduler::{ManualClock, TurnQueue};

    struct Harness {
        session: EditorSession,
        queue: TurnQueue,
        events: Rc<RefCell<Vec<SessionEvent>>>,
    }

    fn harness() -> Harness {
        let queue = TurnQueue::new();
        let clock = Rc::new(ManualClock::default());
        let center = NotificationCenter::new(clock.clone(), Duration::from_secs(3));
        let parts = SessionParts::new(Rc::new(queue.clone()), clock, center).with_renderer(
            Box::new(|text: &str| RenderedView::new(format!("<p>{}</p>", text))),
        );
        let session = EditorSession::new(parts, SessionOptions::default());
        let events = Rc::new(RefCell::new(Vec::new()));
        let sink = events.clone();
        session.subscribe(move |event| sink.borrow_mut().push(event.clone()));
        Harness {
            session,
            queue,
            events,
        }
    }

    #[test]
    fn test_load_note_sets_content_and_clean_state() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "T", "one two three"));

        assert_eq!(h.session.content(), "one two three");
        assert!(!h.session.is_modified());
        assert_eq!(h.session.word_count(), 3);
        assert_eq!(h.session.save_status().unwrap().phase, SavePhase::Clean);

        h.queue.run_turn();
        assert_eq!(h.session.preview_state().last_rendered_revision, 0);
        assert_eq!(h.session.preview_view().html, "<p>one two three</p>");
    }

    #[test]
    fn test_set_content_cascade_order() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "T", ""));
        h.events.borrow_mut().clear();

        h.session.set_content("hello").unwrap();
        let kinds: Vec<&'static str> = h
            .events
            .borrow()
            .iter()
            .map(|event| match event {
                SessionEvent::Mutation(_) => "mutation",
                SessionEvent::Stats(_) => "stats",
                SessionEvent::Preview(_) => "preview",
                SessionEvent::PreviewVisibility(_) => "visibility",
                SessionEvent::SaveStatus(_) => "save",
            })
            .collect();
        assert_eq!(kinds, vec!["mutation", "stats", "save"]);

        h.queue.run_turn();
        assert!(matches!(
            h.events.borrow().last(),
            Some(SessionEvent::Preview(event)) if event.revision == 1
        ));
    }

    #[test]
    fn test_set_content_unloaded() {
        let mut h = harness();
        assert_eq!(h.session.set_content(""), Ok(()));
        assert!(h.session.notifications().active().is_empty());

        assert_eq!(h.session.set_content("x"), Err(EngineError::NotLoaded));
        assert_eq!(h.session.set_title("x"), Err(EngineError::NotLoaded));
        assert!(h.events.borrow().is_empty());

        let notifications = h.session.notifications().active();
        assert_eq!(notifications.len(), 2);
        assert!(notifications.iter().all(|n| n.kind == NotificationKind::Error));
    }

    #[test]
    fn test_save_without_note_is_an_error() {
        let mut h = harness();
        let mut sink = |_request: SaveRequest, _reporter: SaveReporter| {};
        assert_eq!(h.session.save_note(&mut sink), Err(EngineError::NotLoaded));
        let notifications = h.session.notifications().active();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].kind, NotificationKind::Error);
    }

    #[test]
    fn test_async_save_completes_on_pump() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "T", ""));
        h.session.set_content("draft").unwrap();

        let pending: Rc<RefCell<Option<SaveReporter>>> = Rc::new(RefCell::new(None));
        let slot = pending.clone();
        let mut sink = move |_request: SaveRequest, reporter: SaveReporter| {
            *slot.borrow_mut() = Some(reporter);
        };
        h.session.save_note(&mut sink).unwrap();
        assert!(!h.session.can_save());

        // 保存中の二重保存は拒否
        let mut other = |_request: SaveRequest, _reporter: SaveReporter| {};
        assert!(matches!(
            h.session.save_note(&mut other),
            Err(EngineError::InvalidState(_))
        ));
        let errors = h
            .session
            .notifications()
            .active()
            .iter()
            .filter(|n| n.kind == NotificationKind::Error)
            .count();
        assert_eq!(errors, 1);

        let reporter = pending.borrow_mut().take().unwrap();
        reporter.complete(Ok(()));
        assert_eq!(h.session.pump(), 1);
        assert!(!h.session.is_modified());
        assert!(h.session.can_save());
    }

    #[test]
    fn test_edit_during_save_stays_dirty() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "T", ""));
        h.session.set_content("v1").unwrap();

        let pending: Rc<RefCell<Option<SaveReporter>>> = Rc::new(RefCell::new(None));
        let slot = pending.clone();
        let mut sink = move |_request: SaveRequest, reporter: SaveReporter| {
            *slot.borrow_mut() = Some(reporter);
        };
        h.session.save_note(&mut sink).unwrap();
        h.session.set_content("v2").unwrap();

        pending.borrow_mut().take().unwrap().complete(Ok(()));
        h.session.pump();

        assert!(h.session.is_modified());
        assert_eq!(h.session.save_status().unwrap().phase, SavePhase::Dirty);
    }

    #[test]
    fn test_cancel_save_fails_on_next_turn_and_drops_result() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "T", ""));
        h.session.set_content("x").unwrap();

        let pending: Rc<RefCell<Option<SaveReporter>>> = Rc::new(RefCell::new(None));
        let slot = pending.clone();
        let mut sink = move |_request: SaveRequest, reporter: SaveReporter| {
            *slot.borrow_mut() = Some(reporter);
        };
        h.session.save_note(&mut sink).unwrap();

        assert!(h.session.cancel_save());
        assert!(!h.session.cancel_save());
        assert_eq!(h.session.save_status().unwrap().phase, SavePhase::Saving);

        let reporter = pending.borrow_mut().take().unwrap();
        assert!(!reporter.complete(Ok(())));
        h.queue.run_until_idle(4);

        let status = h.session.save_status().unwrap();
        assert_eq!(status.phase, SavePhase::Failed);
        assert_eq!(status.error.as_deref(), Some("save cancelled"));
        assert!(h.session.is_modified());
        assert!(h
            .session
            .notifications()
            .active()
            .iter()
            .all(|n| n.kind != NotificationKind::Error));
    }

    #[test]
    fn test_toggle_preview_twice() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "T", "x"));
        h.session.set_content("xy").unwrap();

        assert!(!h.session.toggle_preview());
        assert!(h.session.toggle_preview());
        h.queue.run_until_idle(4);

        let state = h.session.preview_state();
        assert!(state.visible);
        assert_eq!(state.last_rendered_revision, h.session.revision());
        assert_eq!(h.session.render_count(), 1);
    }

    #[test]
    fn test_create_new_note_and_clear() {
        let mut h = harness();
        let id = h.session.create_new_note("Fresh");
        assert_eq!(h.session.current_note().unwrap().id, id);
        assert_eq!(h.session.title(), "Fresh");
        assert_eq!(h.session.content(), "");

        h.session.set_content("body").unwrap();
        h.session.clear();
        assert!(!h.session.is_loaded());
        assert_eq!(h.session.word_count(), 0);
        assert!(h.session.save_status().is_none());
        assert!(h.session.notifications().save_status(&id).is_none());
        assert_eq!(h.session.save_status_view().text, "Ready");
    }

    #[test]
    fn test_set_title_marks_dirty_and_renames() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "Old", ""));
        h.session.set_title("New: name").unwrap();

        let status = h.session.save_status().unwrap();
        assert_eq!(status.phase, SavePhase::Dirty);
        assert_eq!(status.file_name, "New_ name.md");
        assert_eq!(h.session.save_status_view().text, "New_ name.md (unsaved changes)");
    }

    #[test]
    fn test_reload_during_save_settles_previous_note() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "T", ""));
        h.session.set_content("draft").unwrap();

        let pending: Rc<RefCell<Option<SaveReporter>>> = Rc::new(RefCell::new(None));
        let slot = pending.clone();
        let mut sink = move |_request: SaveRequest, reporter: SaveReporter| {
            *slot.borrow_mut() = Some(reporter);
        };
        h.session.save_note(&mut sink).unwrap();
        h.events.borrow_mut().clear();

        h.session.load_note(Note::with_id("a", "T", "draft"));
        let settled: Vec<SavePhase> = h
            .events
            .borrow()
            .iter()
            .filter_map(|event| match event {
                SessionEvent::SaveStatus(event) => Some(event.info.phase),
                _ => None,
            })
            .collect();
        assert_eq!(settled, vec![SavePhase::Failed]);
        assert!(h.session.can_save());
        assert!(pending.borrow_mut().take().unwrap().is_cancelled());
    }

    #[test]
    fn test_component_events_arrive_once_in_emit_order() {
        let mut h = harness();
        h.session.load_note(Note::with_id("a", "T", "x"));
        h.queue.run_until_idle(4);
        h.events.borrow_mut().clear();

        h.session.set_content("xy").unwrap();
        h.session.set_preview_visible(false);
        h.session.set_preview_visible(true);

        let events = h.events.borrow();
        let visibility: Vec<bool> = events
            .iter()
            .filter_map(|event| match event {
                SessionEvent::PreviewVisibility(event) => Some(event.visible),
                _ => None,
            })
            .collect();
        assert_eq!(visibility, vec![false, true]);
        let mutations = events
            .iter()
            .filter(|event| matches!(event, SessionEvent::Mutation(_)))
            .count();
        assert_eq!(mutations, 1);
        assert!(matches!(
            events.last(),
            Some(SessionEvent::Preview(event)) if event.revision == 1
        ));
    }
}

//! プレビュー
//!
//! バッファのスナップショットから表示用のビューモデルを作る。
//! 描画そのものは [`MarkdownRenderer`] に委譲し、ここでは「いつ描画するか」だけを管理する。

pub mod markdown;

pub use markdown::ComrakRenderer;

use crate::editor::change_notifier::{EventBus, SubscriberId};
use serde::Serialize;

/// Markdown 描画の能力（純粋関数）
pub trait MarkdownRenderer {
    fn render(&self, text: &str) -> RenderedView;
}

impl<F> MarkdownRenderer for F
where
    F: Fn(&str) -> RenderedView,
{
    fn render(&self, text: &str) -> RenderedView {
        self(text)
    }
}

/// 描画結果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RenderedView {
    pub html: String,
}

impl RenderedView {
    pub fn new(html: impl Into<String>) -> Self {
        Self { html: html.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.html.is_empty()
    }
}

/// 描画済みプレビューのイベント
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewEvent {
    pub revision: u64,
    pub rendered_view: RenderedView,
}

/// 表示切り替えイベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PreviewVisibilityEvent {
    pub visible: bool,
}

/// プレビューの状態
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewState {
    pub visible: bool,
    pub auto_refresh: bool,
    pub last_rendered_revision: u64,
    pub rendered_view: Option<RenderedView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PreviewSource {
    text: String,
    revision: u64,
}

/// プレビューレンダラ
pub struct PreviewRenderer {
    renderer: Box<dyn MarkdownRenderer>,
    state: PreviewState,
    cached: Option<PreviewSource>,
    rendered: Option<PreviewSource>,
    render_pending: bool,
    render_count: usize,
    notifier: EventBus<PreviewEvent>,
    visibility_notifier: EventBus<PreviewVisibilityEvent>,
}

impl PreviewRenderer {
    pub fn new(renderer: Box<dyn MarkdownRenderer>, visible: bool, auto_refresh: bool) -> Self {
        Self {
            renderer,
            state: PreviewState {
                visible,
                auto_refresh,
                last_rendered_revision: 0,
                rendered_view: None,
            },
            cached: None,
            rendered: None,
            render_pending: false,
            render_count: 0,
            notifier: EventBus::new(),
            visibility_notifier: EventBus::new(),
        }
    }

    /// 既定の comrak レンダラで作成
    pub fn with_default_renderer(visible: bool, auto_refresh: bool) -> Self {
        Self::new(Box::new(ComrakRenderer::new()), visible, auto_refresh)
    }

    fn gates_open(&self) -> bool {
        self.state.visible && self.state.auto_refresh
    }

    fn is_stale(&self) -> bool {
        self.cached.is_some() && self.cached != self.rendered
    }

    /// スナップショットを受け取る
    ///
    /// 表示中かつ自動更新が有効なら描画を予約して `true` を返す。
    /// 予約した描画は [`PreviewRenderer::flush_pending`] で行われ、
    /// それまでに届いた更新は最新の1件にまとめられる。
    pub fn update(&mut self, text: &str, revision: u64) -> bool {
        self.cached = Some(PreviewSource {
            text: text.to_string(),
            revision,
        });
        if !self.gates_open() {
            return false;
        }
        let newly_scheduled = !self.render_pending;
        self.render_pending = true;
        newly_scheduled
    }

    /// 予約された描画を実行する
    pub fn flush_pending(&mut self) -> Option<PreviewEvent> {
        if !std::mem::take(&mut self.render_pending) {
            return None;
        }
        if !self.gates_open() || !self.is_stale() {
            return None;
        }
        self.render_cached()
    }

    /// 描画予約があるか
    pub fn has_pending_render(&self) -> bool {
        self.render_pending
    }

    /// ゲートを無視して即座に描画する
    pub fn refresh_now(&mut self) -> Option<PreviewEvent> {
        self.render_pending = false;
        self.render_cached()
    }

    /// 表示状態を変更する。表示時に古い描画なら描画し直す
    pub fn set_visible(&mut self, visible: bool) -> Option<PreviewEvent> {
        if self.state.visible != visible {
            self.state.visible = visible;
            log::debug!("preview: visible = {}", visible);
            self.visibility_notifier
                .publish(PreviewVisibilityEvent { visible });
        }
        if visible && self.is_stale() {
            self.render_cached()
        } else {
            None
        }
    }

    pub fn toggle(&mut self) -> Option<PreviewEvent> {
        self.set_visible(!self.state.visible)
    }

    /// 自動更新を切り替える。有効化したとき表示中で古ければ描画する
    pub fn set_auto_refresh(&mut self, auto_refresh: bool) -> Option<PreviewEvent> {
        self.state.auto_refresh = auto_refresh;
        if auto_refresh && self.state.visible && self.is_stale() {
            self.render_cached()
        } else {
            None
        }
    }

    /// キャッシュと描画結果を破棄する
    pub fn clear(&mut self) {
        self.cached = None;
        self.rendered = None;
        self.render_pending = false;
        self.state.last_rendered_revision = 0;
        self.state.rendered_view = None;
    }

    fn render_cached(&mut self) -> Option<PreviewEvent> {
        let source = self.cached.clone()?;
        let view = self.renderer.render(&source.text);
        log::debug!("preview: rendered revision {}", source.revision);

        self.state.last_rendered_revision = source.revision;
        self.state.rendered_view = Some(view.clone());
        self.rendered = Some(source.clone());
        self.render_count += 1;

        let event = PreviewEvent {
            revision: source.revision,
            rendered_view: view,
        };
        self.notifier.publish(event.clone());
        Some(event)
    }

    pub fn state(&self) -> &PreviewState {
        &self.state
    }

    pub fn is_visible(&self) -> bool {
        self.state.visible
    }

    pub fn auto_refresh(&self) -> bool {
        self.state.auto_refresh
    }

    pub fn last_rendered_revision(&self) -> u64 {
        self.state.last_rendered_revision
    }

    pub fn rendered_view(&self) -> Option<&RenderedView> {
        self.state.rendered_view.as_ref()
    }

    /// これまでの描画回数
    pub fn render_count(&self) -> usize {
        self.render_count
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&PreviewEvent) + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn subscribe_visibility<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&PreviewVisibilityEvent) + 'static,
    {
        self.visibility_notifier.subscribe(listener)
    }
}

impl std::fmt::Debug for PreviewRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreviewRenderer")
            .field("state", &self.state)
            .field("render_pending", &self.render_pending)
            .field("render_count", &self.render_count)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_renderer() -> PreviewRenderer {
        PreviewRenderer::new(
            Box::new(|text: &str| RenderedView::new(format!("<p>{}</p>", text))),
            true,
            true,
        )
    }

    #[test]
    fn test_updates_coalesce_into_one_render() {
        let mut preview = echo_renderer();
        assert!(preview.update("a", 1));
        assert!(!preview.update("ab", 2));
        assert!(!preview.update("abc", 3));

        let event = preview.flush_pending().unwrap();
        assert_eq!(event.revision, 3);
        assert_eq!(event.rendered_view.html, "<p>abc</p>");
        assert_eq!(preview.render_count(), 1);
        assert_eq!(preview.flush_pending(), None);
    }

    #[test]
    fn test_hidden_preview_caches_then_renders_on_show() {
        let mut preview = echo_renderer();
        preview.set_visible(false);

        assert!(!preview.update("draft", 4));
        assert_eq!(preview.flush_pending(), None);
        assert_eq!(preview.render_count(), 0);

        let event = preview.set_visible(true).unwrap();
        assert_eq!(event.revision, 4);
        assert_eq!(preview.last_rendered_revision(), 4);

        // 変化がなければ再描画しない
        preview.set_visible(false);
        assert_eq!(preview.set_visible(true), None);
        assert_eq!(preview.render_count(), 1);
    }

    #[test]
    fn test_hiding_before_flush_skips_render() {
        let mut preview = echo_renderer();
        preview.update("x", 1);
        preview.set_visible(false);
        assert_eq!(preview.flush_pending(), None);
        assert_eq!(preview.render_count(), 0);
    }

    #[test]
    fn test_enabling_auto_refresh_renders_stale_snapshot() {
        let mut preview = echo_renderer();
        preview.set_auto_refresh(false);
        assert!(!preview.update("text", 2));

        let event = preview.set_auto_refresh(true).unwrap();
        assert_eq!(event.revision, 2);
    }

    #[test]
    fn test_refresh_now_ignores_gates() {
        let mut preview = echo_renderer();
        preview.set_visible(false);
        preview.set_auto_refresh(false);
        preview.update("forced", 9);

        let event = preview.refresh_now().unwrap();
        assert_eq!(event.rendered_view.html, "<p>forced</p>");
        assert_eq!(preview.state().last_rendered_revision, 9);
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut preview = echo_renderer();
        preview.update("x", 1);
        preview.flush_pending();
        preview.clear();

        assert_eq!(preview.rendered_view(), None);
        assert_eq!(preview.last_rendered_revision(), 0);
        assert_eq!(preview.refresh_now(), None);
    }

    #[test]
    fn test_visibility_events() {
        let preview = std::cell::RefCell::new(echo_renderer());
        let seen = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let sink = seen.clone();
        preview
            .borrow()
            .subscribe_visibility(move |event| sink.borrow_mut().push(event.visible));

        preview.borrow_mut().toggle();
        preview.borrow_mut().toggle();
        preview.borrow_mut().set_visible(true);

        assert_eq!(*seen.borrow(), vec![false, true]);
    }
}

//! テキスト統計

use crate::editor::change_notifier::{EventBus, SubscriberId};
use serde::Serialize;

/// テキストのスカラー統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TextStats {
    /// 空白で区切られた語の数
    pub word_count: usize,
    /// Unicode スカラー値の数
    pub char_count: usize,
    pub line_count: usize,
}

impl TextStats {
    pub fn from_text(text: &str) -> Self {
        Self {
            word_count: text.split_whitespace().count(),
            char_count: text.chars().count(),
            line_count: text.lines().count(),
        }
    }
}

/// 空白以外の文字を含むか
pub fn has_content(text: &str) -> bool {
    text.chars().any(|ch| !ch.is_whitespace())
}

/// 語数変更イベント
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsEvent {
    pub word_count: usize,
}

/// 統計コレクタ
#[derive(Debug, Default)]
pub struct StatsCollector {
    stats: TextStats,
    notifier: EventBus<StatsEvent>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// 内容から再計算する。語数が変わったときだけイベントを返す
    pub fn update(&mut self, content: &str) -> Option<StatsEvent> {
        self.apply(TextStats::from_text(content))
    }

    /// 0 に戻す
    pub fn reset(&mut self) -> Option<StatsEvent> {
        self.apply(TextStats::default())
    }

    fn apply(&mut self, stats: TextStats) -> Option<StatsEvent> {
        let changed = stats.word_count != self.stats.word_count;
        self.stats = stats;
        if !changed {
            return None;
        }

        let event = StatsEvent {
            word_count: stats.word_count,
        };
        self.notifier.publish(event);
        Some(event)
    }

    pub fn stats(&self) -> TextStats {
        self.stats
    }

    pub fn word_count(&self) -> usize {
        self.stats.word_count
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&StatsEvent) + 'static,
    {
        self.notifier.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.notifier.unsubscribe(id)
    }
}

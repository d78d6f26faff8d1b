//! comrak による既定の Markdown レンダラ

use super::{MarkdownRenderer, RenderedView};
use comrak::{markdown_to_html, Options};

/// CommonMark + GFM 拡張（表・取り消し線・自動リンク・タスクリスト）
#[derive(Debug, Clone, Copy)]
pub struct ComrakRenderer {
    gfm_extensions: bool,
}

impl ComrakRenderer {
    pub fn new() -> Self {
        Self {
            gfm_extensions: true,
        }
    }

    /// 拡張なしの素の CommonMark
    pub fn commonmark_only() -> Self {
        Self {
            gfm_extensions: false,
        }
    }
}

impl Default for ComrakRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl MarkdownRenderer for ComrakRenderer {
    fn render(&self, text: &str) -> RenderedView {
        let mut options = Options::default();
        if self.gfm_extensions {
            options.extension.table = true;
            options.extension.strikethrough = true;
            options.extension.autolink = true;
            options.extension.tasklist = true;
        }
        RenderedView::new(markdown_to_html(text, &options))
    }
}

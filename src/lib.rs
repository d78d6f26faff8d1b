//! mdnote - Incremental Markdown editing and live preview engine
//!
//! ノートの編集・プレビュー・保存状態・通知・認証フローを UI から切り離して扱う

// 基盤
pub mod config;
pub mod error;
pub mod logging;
pub mod scheduler;

// データ層
pub mod buffer;
pub mod file;

// 編集層
pub mod editor;
pub mod preview;
pub mod save;

// 横断機能
pub mod auth;
pub mod notification;

// 表示層
pub mod ui;

// 公開API
pub use auth::{AuthConfig, AuthFlowCoordinator, AuthMethod, AuthPhase, AuthResult};
pub use buffer::{DocumentBuffer, MutationEvent, Note};
pub use config::EngineConfig;
pub use editor::{EditorSession, SessionEvent, SessionOptions, SessionParts};
pub use error::{EngineError, Result};
pub use notification::{NotificationCenter, NotificationKind};
pub use preview::{ComrakRenderer, MarkdownRenderer, PreviewRenderer, RenderedView};
pub use save::{SavePhase, SaveSink, SaveStatusInfo, SaveStatusTracker};
pub use scheduler::{Clock, ManualClock, Poster, SystemClock, TurnQueue};

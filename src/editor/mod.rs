//! エディタモジュール
//!
//! 変更通知・統計・セッションの統合モジュール

pub mod change_notifier;
pub mod session;
pub mod stats;

// 公開API
pub use change_notifier::{ChangeNotifierStats, EventBus, EventListener, SubscriberId};
pub use session::{EditorSession, SessionEvent, SessionOptions, SessionParts};
pub use stats::{has_content, StatsCollector, StatsEvent, TextStats};

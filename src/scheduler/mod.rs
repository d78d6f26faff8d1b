//! UIスレッドのスケジューリング
//!
//! エンジンの状態変更はすべて単一の UI スレッドで行う。
//! ホストが提供する唯一のフックが [`Poster`] で、遅延処理はここへ投入される。
//! ワーカースレッドは [`Waker`] で UI スレッド側の処理を起こす。

pub mod clock;
pub mod ticker;

pub use clock::{Clock, ManualClock, SystemClock, TimerId};
pub use ticker::Ticker;

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

/// UIスレッドで実行されるタスク
pub type Task = Box<dyn FnOnce()>;

/// 起こされたときに UI スレッドで実行するハンドラ
pub type WakeHandler = Rc<dyn Fn()>;

/// タスクを次の UI ターンへ投入する能力
pub trait Poster {
    fn post(&self, task: Task);

    /// `handler` を登録し、他スレッドから起こせる [`Waker`] を返す
    fn waker(&self, handler: WakeHandler) -> Waker;
}

/// ワーカースレッドへ渡せる起床口（`Send`）
///
/// [`Waker::wake`] を呼ぶと、登録したハンドラが次の UI ターンで1回実行される。
#[derive(Clone)]
pub struct Waker {
    key: u64,
    sender: Sender<u64>,
    hook: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Waker {
    /// UI スレッド側が既に止まっていれば `false`
    pub fn wake(&self) -> bool {
        if self.sender.send(self.key).is_err() {
            return false;
        }
        if let Some(hook) = &self.hook {
            hook();
        }
        true
    }
}

impl std::fmt::Debug for Waker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Waker").field("key", &self.key).finish()
    }
}

/// 単純なターン単位のタスクキュー
///
/// ターン中に投入されたタスクは次のターンで実行される。
/// ターン開始までに届いた起床は、そのターンの先頭でハンドラごとに1回ずつ処理する。
#[derive(Clone)]
pub struct TurnQueue {
    tasks: Rc<RefCell<VecDeque<Task>>>,
    handlers: Rc<RefCell<HashMap<u64, WakeHandler>>>,
    next_key: Rc<Cell<u64>>,
    woken: Rc<RefCell<VecDeque<u64>>>,
    wake_sender: Sender<u64>,
    wake_receiver: Rc<Receiver<u64>>,
    wake_hook: Option<Arc<dyn Fn() + Send + Sync>>,
}

impl Default for TurnQueue {
    fn default() -> Self {
        let (wake_sender, wake_receiver) = channel();
        Self {
            tasks: Rc::default(),
            handlers: Rc::default(),
            next_key: Rc::default(),
            woken: Rc::default(),
            wake_sender,
            wake_receiver: Rc::new(wake_receiver),
            wake_hook: None,
        }
    }
}

impl TurnQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 他スレッドから起こされたときにホストへ知らせるフックを付ける
    ///
    /// フックはワーカースレッドで呼ばれる。ホストはここでイベントループを起こす。
    pub fn with_wake_hook<F>(mut self, hook: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.wake_hook = Some(Arc::new(hook));
        self
    }

    /// 待機中のタスク数（届いた起床を含む）
    pub fn pending(&self) -> usize {
        self.collect_wakes();
        self.tasks.borrow().len() + self.woken.borrow().len()
    }

    /// 1ターン分のタスクを実行し、実行数を返す
    pub fn run_turn(&self) -> usize {
        self.collect_wakes();
        let mut keys: Vec<u64> = Vec::new();
        for key in self.woken.borrow_mut().drain(..) {
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        let batch: Vec<Task> = self.tasks.borrow_mut().drain(..).collect();
        let executed = keys.len() + batch.len();

        for key in keys {
            let handler = self.handlers.borrow().get(&key).cloned();
            if let Some(handler) = handler {
                handler();
            }
        }
        for task in batch {
            task();
        }
        executed
    }

    /// キューが空になるまでターンを回す（`max_turns` で打ち切り）
    pub fn run_until_idle(&self, max_turns: usize) -> usize {
        let mut turns = 0;
        while turns < max_turns && self.pending() > 0 {
            self.run_turn();
            turns += 1;
        }
        turns
    }

    fn collect_wakes(&self) {
        let mut woken = self.woken.borrow_mut();
        woken.extend(self.wake_receiver.try_iter());
    }
}

impl Poster for TurnQueue {
    fn post(&self, task: Task) {
        self.tasks.borrow_mut().push_back(task);
    }

    fn waker(&self, handler: WakeHandler) -> Waker {
        let key = self.next_key.get();
        self.next_key.set(key + 1);
        self.handlers.borrow_mut().insert(key, handler);
        Waker {
            key,
            sender: self.wake_sender.clone(),
            hook: self.wake_hook.clone(),
        }
    }
}

/// ワーカーと共有するキャンセルフラグ
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

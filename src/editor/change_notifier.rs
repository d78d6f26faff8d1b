//! 変更通知システム
//!
//! 型付きイベントを登録順にリスナーへ配信するイベントバス。
//! 配信中に発行されたイベントはキューへ積まれ、現在の配信が終わってから順に配信される。

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;

/// リスナーの一意識別子
pub type SubscriberId = usize;

/// 型付きイベントのリスナー
pub trait EventListener<E> {
    /// イベントを処理
    fn on_event(&self, event: &E);
}

struct Subscriber<E> {
    id: SubscriberId,
    active: Cell<bool>,
    callback: Box<dyn Fn(&E)>,
}

/// 変更通知システムの統計情報
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChangeNotifierStats {
    /// 登録中のリスナー数
    pub active_listeners: usize,
    /// 配信したイベント数
    pub events_dispatched: usize,
}

/// イベントバス
///
/// * リスナーは登録順に同期的に呼ばれる
/// * 配信中に登録されたリスナーは次のイベントから受け取る
/// * 配信中に解除されたリスナーはそれ以降呼ばれない
pub struct EventBus<E> {
    subscribers: RefCell<Vec<Rc<Subscriber<E>>>>,
    next_id: Cell<SubscriberId>,
    pending: RefCell<VecDeque<E>>,
    dispatching: Cell<bool>,
    events_dispatched: Cell<usize>,
}

/// 配信フラグを戻すガード（リスナーがパニックしてもバスを使える状態に保つ）
struct DispatchGuard<'a>(&'a Cell<bool>);

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl<E> EventBus<E> {
    /// 新しいイベントバスを作成
    pub fn new() -> Self {
        Self {
            subscribers: RefCell::new(Vec::new()),
            next_id: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            dispatching: Cell::new(false),
            events_dispatched: Cell::new(0),
        }
    }

    /// クロージャをリスナーとして登録
    pub fn subscribe<F>(&self, callback: F) -> SubscriberId
    where
        F: Fn(&E) + 'static,
    {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.subscribers.borrow_mut().push(Rc::new(Subscriber {
            id,
            active: Cell::new(true),
            callback: Box::new(callback),
        }));
        id
    }

    /// トレイト実装のリスナーを登録
    pub fn add_listener(&self, listener: Rc<dyn EventListener<E>>) -> SubscriberId
    where
        E: 'static,
    {
        self.subscribe(move |event| listener.on_event(event))
    }

    /// リスナーを削除
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut subscribers = self.subscribers.borrow_mut();
        match subscribers.iter().position(|s| s.id == id) {
            Some(index) => {
                let removed = subscribers.remove(index);
                removed.active.set(false);
                true
            }
            None => false,
        }
    }

    /// イベントを発行
    pub fn publish(&self, event: E) {
        self.pending.borrow_mut().push_back(event);
        if self.dispatching.get() {
            return;
        }

        self.dispatching.set(true);
        let _guard = DispatchGuard(&self.dispatching);

        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(event) = next else {
                break;
            };
            let snapshot: Vec<Rc<Subscriber<E>>> = self.subscribers.borrow().clone();
            for subscriber in snapshot {
                if subscriber.active.get() {
                    (subscriber.callback)(&event);
                }
            }
            self.events_dispatched.set(self.events_dispatched.get() + 1);
        }
    }

    /// 登録中のリスナー数
    pub fn listener_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// 統計情報を取得
    pub fn stats(&self) -> ChangeNotifierStats {
        ChangeNotifierStats {
            active_listeners: self.listener_count(),
            events_dispatched: self.events_dispatched.get(),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .field("events_dispatched", &self.events_dispatched.get())
            .finish()
    }
}

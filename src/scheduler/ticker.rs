//! 周期タイマー
//!
//! [`Clock::after`] を発火のたびに掛け直して一定間隔のコールバックを作る。
//! スレッドは使わず、コールバックは UI スレッドでクロックが発火させる。

use super::{Clock, TimerId};
use std::cell::Cell;
use std::rc::{Rc, Weak};
use std::time::Duration;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

struct TickerInner {
    clock: Rc<dyn Clock>,
    interval: Duration,
    callback: Box<dyn Fn(u64)>,
    timer: Cell<Option<TimerId>>,
    ticks: Cell<u64>,
    running: Cell<bool>,
}

/// 周期タイマー。ドロップすると止まる
pub struct Ticker {
    inner: Rc<TickerInner>,
}

impl Ticker {
    /// `interval` ごとに `callback(通算回数)` を呼ぶ
    pub fn start<F>(clock: Rc<dyn Clock>, interval: Duration, callback: F) -> Self
    where
        F: Fn(u64) + 'static,
    {
        let inner = Rc::new(TickerInner {
            clock,
            interval: interval.max(MIN_INTERVAL),
            callback: Box::new(callback),
            timer: Cell::new(None),
            ticks: Cell::new(0),
            running: Cell::new(true),
        });
        schedule(&inner);
        Self { inner }
    }

    /// 止める。既に止まっていれば `false`
    pub fn stop(&self) -> bool {
        if !self.inner.running.replace(false) {
            return false;
        }
        if let Some(timer) = self.inner.timer.take() {
            self.inner.clock.cancel(timer);
        }
        true
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    pub fn ticks(&self) -> u64 {
        self.inner.ticks.get()
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ticker")
            .field("interval", &self.inner.interval)
            .field("ticks", &self.inner.ticks.get())
            .field("running", &self.inner.running.get())
            .finish()
    }
}

fn schedule(inner: &Rc<TickerInner>) {
    let weak: Weak<TickerInner> = Rc::downgrade(inner);
    let timer = inner.clock.after(
        inner.interval,
        Box::new(move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            inner.timer.set(None);
            if !inner.running.get() {
                return;
            }
            let tick = inner.ticks.get() + 1;
            inner.ticks.set(tick);
            (inner.callback)(tick);
            // コールバック内で止められていれば掛け直さない
            if inner.running.get() {
                schedule(&inner);
            }
        }),
    );
    inner.timer.set(Some(timer));
}

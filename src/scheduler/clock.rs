//! 時刻とタイマー
//!
//! 通知の自動消去など、組み込みのタイムアウトは [`Clock::after`] を通して行う。
//! テストでは [`ManualClock`] で時間を決定的に進める。

use super::Task;
use chrono::{DateTime, TimeDelta, Utc};
use std::cell::{Cell, RefCell};
use std::time::Duration;

/// タイマーの識別子
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimerId(u64);

/// 時刻取得とタイマー登録の能力
pub trait Clock {
    /// 現在時刻
    fn now(&self) -> DateTime<Utc>;

    /// `delay` 経過後に UI スレッドで `task` を実行する
    fn after(&self, delay: Duration, task: Task) -> TimerId;

    /// 未発火のタイマーを取り消す
    fn cancel(&self, id: TimerId) -> bool;
}

struct Timer {
    id: TimerId,
    deadline: DateTime<Utc>,
    task: Task,
}

/// 締め切り順のタイマー集合
#[derive(Default)]
struct TimerQueue {
    timers: Vec<Timer>,
    next_id: u64,
}

impl TimerQueue {
    fn schedule(&mut self, deadline: DateTime<Utc>, task: Task) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        // 同じ締め切りは登録順
        let index = self
            .timers
            .iter()
            .position(|timer| timer.deadline > deadline)
            .unwrap_or(self.timers.len());
        self.timers.insert(index, Timer { id, deadline, task });
        id
    }

    fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.timers.len();
        self.timers.retain(|timer| timer.id != id);
        self.timers.len() != before
    }

    fn pop_due(&mut self, now: DateTime<Utc>) -> Option<Timer> {
        match self.timers.first() {
            Some(timer) if timer.deadline <= now => Some(self.timers.remove(0)),
            _ => None,
        }
    }

    fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.first().map(|timer| timer.deadline)
    }

    fn len(&self) -> usize {
        self.timers.len()
    }
}

fn to_chrono(delay: Duration) -> TimeDelta {
    TimeDelta::from_std(delay).unwrap_or(TimeDelta::MAX)
}

fn deadline_after(now: DateTime<Utc>, delay: Duration) -> DateTime<Utc> {
    now.checked_add_signed(to_chrono(delay))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// テスト用の手動クロック
pub struct ManualClock {
    now: Cell<DateTime<Utc>>,
    timers: RefCell<TimerQueue>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Cell::new(start),
            timers: RefCell::new(TimerQueue::default()),
        }
    }

    /// 時間を進め、期限を迎えたタイマーを締め切り順に発火する
    pub fn advance(&self, delta: Duration) {
        let target = deadline_after(self.now.get(), delta);
        loop {
            let due = self.timers.borrow_mut().pop_due(target);
            let Some(timer) = due else {
                break;
            };
            if timer.deadline > self.now.get() {
                self.now.set(timer.deadline);
            }
            (timer.task)();
        }
        self.now.set(target);
    }

    /// 未発火タイマー数
    pub fn pending_timers(&self) -> usize {
        self.timers.borrow().len()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    fn after(&self, delay: Duration, task: Task) -> TimerId {
        let deadline = deadline_after(self.now.get(), delay);
        self.timers.borrow_mut().schedule(deadline, task)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.timers.borrow_mut().cancel(id)
    }
}

/// 壁時計ベースのクロック
///
/// ホストは UI ターンごとに [`SystemClock::poll`] を呼ぶ。
#[derive(Default)]
pub struct SystemClock {
    timers: RefCell<TimerQueue>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// 期限を迎えたタイマーを発火し、発火数を返す
    pub fn poll(&self) -> usize {
        let now = Utc::now();
        let mut fired = 0;
        loop {
            let due = self.timers.borrow_mut().pop_due(now);
            let Some(timer) = due else {
                break;
            };
            (timer.task)();
            fired += 1;
        }
        fired
    }

    /// 次のタイマーまでの待ち時間
    pub fn time_until_next(&self) -> Option<Duration> {
        let deadline = self.timers.borrow().next_deadline()?;
        Some((deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO))
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn after(&self, delay: Duration, task: Task) -> TimerId {
        let deadline = deadline_after(Utc::now(), delay);
        self.timers.borrow_mut().schedule(deadline, task)
    }

    fn cancel(&self, id: TimerId) -> bool {
        self.timers.borrow_mut().cancel(id)
    }
}

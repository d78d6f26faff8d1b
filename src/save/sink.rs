//! 外部の保存先とのやり取り
//!
//! 保存処理そのものは [`SaveSink`] に委譲する。保存先はワーカースレッドから
//! [`SaveReporter`] を通して進捗と結果を返す。報告のたびに [`Waker`] で UI スレッドを起こし、
//! 起きた側が [`SaveSignal`] を取り出して反映する。

use crate::buffer::Note;
use crate::scheduler::{CancelToken, Waker};
use std::sync::mpsc::Sender;

/// 1回の保存要求の識別子
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SaveTicket {
    pub note_id: String,
    pub revision: u64,
    pub serial: u64,
}

/// 保存要求
#[derive(Debug, Clone)]
pub struct SaveRequest {
    /// 保存時点のタイトル・内容を反映したノート
    pub note: Note,
    pub revision: u64,
}

/// 保存先からの通知
#[derive(Debug, Clone, PartialEq)]
pub enum SaveSignal {
    Progress {
        ticket: SaveTicket,
        progress: f64,
    },
    Completed {
        ticket: SaveTicket,
        result: std::result::Result<(), String>,
    },
}

impl SaveSignal {
    pub fn ticket(&self) -> &SaveTicket {
        match self {
            SaveSignal::Progress { ticket, .. } | SaveSignal::Completed { ticket, .. } => ticket,
        }
    }
}

/// 保存先へ渡す報告口（`Send`、ワーカースレッドへ移動できる）
#[derive(Debug)]
pub struct SaveReporter {
    ticket: SaveTicket,
    sender: Sender<SaveSignal>,
    cancel: CancelToken,
    waker: Option<Waker>,
}

impl SaveReporter {
    pub fn new(ticket: SaveTicket, sender: Sender<SaveSignal>, cancel: CancelToken) -> Self {
        Self {
            ticket,
            sender,
            cancel,
            waker: None,
        }
    }

    /// 報告を送るたびに `waker` を起こす
    pub fn with_waker(mut self, waker: Waker) -> Self {
        self.waker = Some(waker);
        self
    }

    pub fn ticket(&self) -> &SaveTicket {
        &self.ticket
    }

    /// 保存が取り消されたか
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// 進捗を報告する。取り消し済みなら捨てて `false`
    pub fn report_progress(&self, progress: f64) -> bool {
        if self.is_cancelled() {
            return false;
        }
        self.send(SaveSignal::Progress {
            ticket: self.ticket.clone(),
            progress,
        })
    }

    /// 結果を報告する。取り消し済みなら捨てて `false`
    pub fn complete(self, result: std::result::Result<(), String>) -> bool {
        if self.is_cancelled() {
            log::debug!("save: dropping result of cancelled save {}", self.ticket.serial);
            return false;
        }
        let signal = SaveSignal::Completed {
            ticket: self.ticket.clone(),
            result,
        };
        self.send(signal)
    }

    fn send(&self, signal: SaveSignal) -> bool {
        if self.sender.send(signal).is_err() {
            return false;
        }
        if let Some(waker) = &self.waker {
            waker.wake();
        }
        true
    }
}

/// 外部の保存先
pub trait SaveSink {
    /// 保存を開始する
    ///
    /// 同期的に完了してもよいし、`reporter` をワーカーへ渡して後で完了してもよい。
    fn save(&mut self, request: SaveRequest, reporter: SaveReporter);
}

impl<F> SaveSink for F
where
    F: FnMut(SaveRequest, SaveReporter),
{
    fn save(&mut self, request: SaveRequest, reporter: SaveReporter) {
        self(request, reporter)
    }
}

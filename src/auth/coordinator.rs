//! 認証フローコーディネータ
//!
//! フローの開始時に方式を選び（生体認証 / パスワード）、入力待ちの間に届いた結果で遷移する。
//! 終端フェーズに入った時点で [`AuthResult`] を1回だけ発行する。

use super::{
    AuthAttemptState, AuthConfig, AuthEvent, AuthMethod, AuthPhase, AuthResult,
    BiometricOutcome, BiometricProbe, BiometricRequest, PasswordVerifier, WaitingProgress,
    DEFAULT_MAX_PASSWORD_ATTEMPTS, WAITING_TICK_INTERVAL,
};
use crate::editor::change_notifier::{EventBus, SubscriberId};
use crate::error::{EngineError, Result, StateError};
use crate::notification::{self, NotificationCenter, NotificationKind};
use crate::scheduler::{CancelToken, Clock, Poster, Ticker, Waker};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use std::sync::mpsc::{channel, Receiver, Sender};

const UNAVAILABLE_NO_FALLBACK: &str = "biometric unavailable and fallback disabled";
const MAX_ATTEMPTS: &str = "max attempts";
const FALLBACK_DISABLED: &str = "fallback disabled";
const PASSWORD_PROMPT: &str = "Enter your password";

type ResultCallback = Box<dyn FnOnce(&AuthResult)>;

/// ワーカーから届く (世代, 結果)
type RemoteOutcome = (u64, BiometricOutcome);

struct FlowState {
    attempt: AuthAttemptState,
    generation: u64,
    cancel: CancelToken,
    cancel_requested: bool,
    result: Option<AuthResult>,
}

struct FlowInner {
    state: RefCell<FlowState>,
    verifier: Box<dyn PasswordVerifier>,
    poster: Rc<dyn Poster>,
    events: EventBus<AuthEvent>,
    notifications: RefCell<Option<NotificationCenter>>,
    on_result: RefCell<Option<ResultCallback>>,
    waiting_clock: RefCell<Option<Rc<dyn Clock>>>,
    waiting_ticker: RefCell<Option<Ticker>>,
    waiting_events: EventBus<WaitingProgress>,
    remote_sender: Sender<RemoteOutcome>,
    remote_receiver: Receiver<RemoteOutcome>,
    remote_waker: Waker,
}

/// 状態の借用を解いた後に適用する副作用
#[derive(Default)]
struct Effects {
    events: Vec<AuthEvent>,
    result: Option<AuthResult>,
    error_notice: Option<String>,
}

/// 認証フローコーディネータ
///
/// UI スレッド専用のハンドル。フローごとに作成し、フロー間で状態を持ち越さない。
#[derive(Clone)]
pub struct AuthFlowCoordinator {
    inner: Rc<FlowInner>,
}

/// 生体認証の結果を後から返すための応答口
pub struct BiometricResponder {
    flow: Weak<FlowInner>,
    generation: u64,
    cancel: CancelToken,
    sender: Sender<RemoteOutcome>,
    waker: Waker,
}

impl BiometricResponder {
    /// 結果を返す。フローが取り消し済み・終了済みなら捨てて `false`
    pub fn respond(self, outcome: BiometricOutcome) -> bool {
        if self.cancel.is_cancelled() {
            log::debug!("auth: dropping biometric result after cancel");
            return false;
        }
        match self.flow.upgrade() {
            Some(inner) => AuthFlowCoordinator { inner }.handle_biometric(self.generation, outcome),
            None => false,
        }
    }

    /// フローが取り消されたか（ワーカーが結果を返す前に確認する）
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// ワーカースレッドへ渡せる応答口に変える
    pub fn into_remote(self) -> RemoteBiometricResponder {
        RemoteBiometricResponder {
            generation: self.generation,
            cancel: self.cancel,
            sender: self.sender,
            waker: self.waker,
        }
    }
}

/// ワーカースレッドから生体認証の結果を返す応答口（`Send`）
///
/// 結果は次の UI ターンでフローに反映される。
pub struct RemoteBiometricResponder {
    generation: u64,
    cancel: CancelToken,
    sender: Sender<RemoteOutcome>,
    waker: Waker,
}

impl RemoteBiometricResponder {
    /// 結果を UI スレッドへ送る。取り消し済みかフローが無くなっていれば `false`
    pub fn respond(self, outcome: BiometricOutcome) -> bool {
        if self.cancel.is_cancelled() {
            log::debug!("auth: dropping remote biometric result after cancel");
            return false;
        }
        if self.sender.send((self.generation, outcome)).is_err() {
            return false;
        }
        self.waker.wake()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl std::fmt::Debug for RemoteBiometricResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteBiometricResponder")
            .field("generation", &self.generation)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl std::fmt::Debug for BiometricResponder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BiometricResponder")
            .field("generation", &self.generation)
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl AuthFlowCoordinator {
    /// 最大試行回数が 0 の場合は既定値に補正する
    pub fn new(
        config: AuthConfig,
        verifier: Box<dyn PasswordVerifier>,
        poster: Rc<dyn Poster>,
    ) -> Self {
        let max_attempts = if config.max_password_attempts == 0 {
            log::warn!(
                "auth: max_password_attempts 0 coerced to {}",
                DEFAULT_MAX_PASSWORD_ATTEMPTS
            );
            DEFAULT_MAX_PASSWORD_ATTEMPTS
        } else {
            config.max_password_attempts
        };

        let attempt = AuthAttemptState {
            method: config.preferred_method,
            active_method: None,
            attempts_used: 0,
            max_attempts,
            fallback_allowed: config.allow_fallback,
            biometric_available: config.biometric_available,
            phase: AuthPhase::Idle,
        };

        let inner = Rc::new_cyclic(|weak: &Weak<FlowInner>| {
            let waking = weak.clone();
            let remote_waker = poster.waker(Rc::new(move || {
                if let Some(inner) = waking.upgrade() {
                    AuthFlowCoordinator { inner }.drain_remote();
                }
            }));
            let (remote_sender, remote_receiver) = channel();

            FlowInner {
                state: RefCell::new(FlowState {
                    attempt,
                    generation: 0,
                    cancel: CancelToken::new(),
                    cancel_requested: false,
                    result: None,
                }),
                verifier,
                poster,
                events: EventBus::new(),
                notifications: RefCell::new(None),
                on_result: RefCell::new(None),
                waiting_clock: RefCell::new(None),
                waiting_ticker: RefCell::new(None),
                waiting_events: EventBus::new(),
                remote_sender,
                remote_receiver,
                remote_waker,
            }
        });

        Self { inner }
    }

    fn drain_remote(&self) {
        let outcomes: Vec<RemoteOutcome> = self.inner.remote_receiver.try_iter().collect();
        for (generation, outcome) in outcomes {
            self.handle_biometric(generation, outcome);
        }
    }

    /// エラー通知先を指定する（未指定ならプロセス全体のセンター）
    pub fn with_notifications(self, center: NotificationCenter) -> Self {
        *self.inner.notifications.borrow_mut() = Some(center);
        self
    }

    /// 生体認証待ちの間、`clock` で進捗表示を配信する
    pub fn with_waiting_animation(self, clock: Rc<dyn Clock>) -> Self {
        *self.inner.waiting_clock.borrow_mut() = Some(clock);
        self
    }

    pub fn subscribe_waiting<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&WaitingProgress) + 'static,
    {
        self.inner.waiting_events.subscribe(listener)
    }

    /// 結果の受け取り先を設定する。既に終了していればすぐに呼ぶ
    pub fn on_result<F>(&self, callback: F)
    where
        F: FnOnce(&AuthResult) + 'static,
    {
        let finished = self.inner.state.borrow().result.clone();
        match finished {
            Some(result) => callback(&result),
            None => *self.inner.on_result.borrow_mut() = Some(Box::new(callback)),
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> SubscriberId
    where
        F: Fn(&AuthEvent) + 'static,
    {
        self.inner.events.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        self.inner.events.unsubscribe(id)
    }

    pub fn state(&self) -> AuthAttemptState {
        self.inner.state.borrow().attempt.clone()
    }

    pub fn phase(&self) -> AuthPhase {
        self.inner.state.borrow().attempt.phase
    }

    pub fn result(&self) -> Option<AuthResult> {
        self.inner.state.borrow().result.clone()
    }

    /// フローを開始する
    pub fn start(&self, message: &str, probe: &mut dyn BiometricProbe) -> Result<()> {
        let mut effects = Effects::default();
        let prompt = {
            let mut state = self.inner.state.borrow_mut();
            if state.cancel_requested {
                return Err(EngineError::Cancelled);
            }
            if state.attempt.phase != AuthPhase::Idle {
                return Err(StateError::FlowAlreadyStarted.into());
            }

            let biometric = state.attempt.biometric_available;
            let method = match state.attempt.method {
                AuthMethod::Biometric if biometric => Some(AuthMethod::Biometric),
                AuthMethod::Biometric if state.attempt.fallback_allowed => {
                    Some(AuthMethod::Password)
                }
                AuthMethod::Biometric => None,
                AuthMethod::Password => Some(AuthMethod::Password),
                AuthMethod::Both if biometric => Some(AuthMethod::Biometric),
                AuthMethod::Both => Some(AuthMethod::Password),
            };

            match method {
                Some(AuthMethod::Biometric) => {
                    Self::enter_waiting(&mut state, AuthMethod::Biometric, message, &mut effects);
                    Some(BiometricRequest {
                        message: message.to_string(),
                        responder: BiometricResponder {
                            flow: Rc::downgrade(&self.inner),
                            generation: state.generation,
                            cancel: state.cancel.clone(),
                            sender: self.inner.remote_sender.clone(),
                            waker: self.inner.remote_waker.clone(),
                        },
                    })
                }
                Some(_) => {
                    let text = if message.is_empty() { PASSWORD_PROMPT } else { message };
                    Self::enter_waiting(&mut state, AuthMethod::Password, text, &mut effects);
                    None
                }
                None => {
                    Self::finish(
                        &mut state,
                        AuthPhase::Unavailable,
                        AuthResult::failed(None, UNAVAILABLE_NO_FALLBACK),
                        &mut effects,
                    );
                    effects.error_notice = Some(UNAVAILABLE_NO_FALLBACK.to_string());
                    None
                }
            }
        };
        self.apply(effects);

        if let Some(request) = prompt {
            let generation = request.responder.generation;
            if let Some(outcome) = probe.prompt(request) {
                self.handle_biometric(generation, outcome);
            }
        }
        Ok(())
    }

    /// パスワードを送信する
    pub fn submit_password(&self, password: &str) -> Result<()> {
        {
            let state = self.inner.state.borrow();
            if state.cancel_requested {
                return Err(EngineError::Cancelled);
            }
            if state.attempt.phase.is_terminal() {
                return Err(StateError::FlowFinished.into());
            }
            if state.attempt.phase != AuthPhase::Waiting
                || state.attempt.active_method != Some(AuthMethod::Password)
            {
                return Err(StateError::WrongSubFlow.into());
            }
        }

        if password.is_empty() {
            let remaining = self.state().attempts_remaining();
            self.apply(Effects {
                events: vec![AuthEvent {
                    phase: AuthPhase::Waiting,
                    method: Some(AuthMethod::Password),
                    attempts_remaining: remaining,
                    message: "Please enter a password".to_string(),
                }],
                ..Effects::default()
            });
            return Err(EngineError::InvalidInput("password is empty".to_string()));
        }

        self.inner.state.borrow_mut().attempt.attempts_used += 1;
        let verdict = self.inner.verifier.verify(password);

        let mut effects = Effects::default();
        let outcome = {
            let mut state = self.inner.state.borrow_mut();
            // 検証中に取り消されていれば結果を捨てる
            if state.cancel_requested || state.attempt.phase.is_terminal() {
                return Err(EngineError::Cancelled);
            }
            match verdict {
                Ok(()) => {
                    Self::finish(
                        &mut state,
                        AuthPhase::Success,
                        AuthResult::succeeded(AuthMethod::Password, Some(password.to_string())),
                        &mut effects,
                    );
                    Ok(())
                }
                Err(reason) => {
                    let remaining = state.attempt.attempts_remaining();
                    log::debug!("auth: password rejected ({}), {} left", reason, remaining);
                    if remaining > 0 {
                        effects.events.push(AuthEvent {
                            phase: AuthPhase::Waiting,
                            method: Some(AuthMethod::Password),
                            attempts_remaining: remaining,
                            message: format!(
                                "Incorrect password. {} attempts remaining",
                                remaining
                            ),
                        });
                    } else {
                        Self::finish(
                            &mut state,
                            AuthPhase::Failed,
                            AuthResult::failed(Some(AuthMethod::Password), MAX_ATTEMPTS),
                            &mut effects,
                        );
                    }
                    Err(EngineError::VerificationFailed {
                        attempts_remaining: remaining,
                    })
                }
            }
        };
        self.apply(effects);
        outcome
    }

    /// フローを取り消す。遷移は次の UI ターンで行われる
    pub fn cancel(&self) -> bool {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.attempt.phase.is_terminal() || state.cancel_requested {
                return false;
            }
            state.cancel_requested = true;
            state.cancel.cancel();
        }

        let weak = Rc::downgrade(&self.inner);
        self.inner.poster.post(Box::new(move || {
            if let Some(inner) = weak.upgrade() {
                AuthFlowCoordinator { inner }.finish_cancel();
            }
        }));
        true
    }

    fn finish_cancel(&self) {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.borrow_mut();
            if state.attempt.phase.is_terminal() {
                return;
            }
            let method = state.attempt.active_method;
            Self::finish(
                &mut state,
                AuthPhase::Cancelled,
                AuthResult::cancelled(method),
                &mut effects,
            );
        }
        self.apply(effects);
    }

    fn handle_biometric(&self, generation: u64, outcome: BiometricOutcome) -> bool {
        let mut effects = Effects::default();
        {
            let mut state = self.inner.state.borrow_mut();
            if generation != state.generation
                || state.cancel_requested
                || state.attempt.phase != AuthPhase::Waiting
                || state.attempt.active_method != Some(AuthMethod::Biometric)
            {
                log::debug!("auth: ignoring stale biometric result");
                return false;
            }

            let fallback = state.attempt.fallback_allowed;
            match outcome {
                BiometricOutcome::Success => Self::finish(
                    &mut state,
                    AuthPhase::Success,
                    AuthResult::succeeded(AuthMethod::Biometric, None),
                    &mut effects,
                ),
                BiometricOutcome::UserCancelled => Self::finish(
                    &mut state,
                    AuthPhase::Cancelled,
                    AuthResult::cancelled(Some(AuthMethod::Biometric)),
                    &mut effects,
                ),
                BiometricOutcome::Failed(reason) => {
                    let reason = if reason.is_empty() {
                        "biometric authentication failed".to_string()
                    } else {
                        reason
                    };
                    Self::finish(
                        &mut state,
                        AuthPhase::Failed,
                        AuthResult::failed(Some(AuthMethod::Biometric), reason),
                        &mut effects,
                    );
                }
                BiometricOutcome::FallbackRequested if fallback => {
                    Self::enter_waiting(&mut state, AuthMethod::Password, PASSWORD_PROMPT, &mut effects);
                }
                BiometricOutcome::FallbackRequested => Self::finish(
                    &mut state,
                    AuthPhase::Failed,
                    AuthResult::failed(Some(AuthMethod::Biometric), FALLBACK_DISABLED),
                    &mut effects,
                ),
                BiometricOutcome::Unavailable(reason) if fallback => {
                    let message = if reason.is_empty() {
                        "Biometric authentication is unavailable. Enter your password".to_string()
                    } else {
                        format!(
                            "Biometric authentication is unavailable ({}). Enter your password",
                            reason
                        )
                    };
                    state.attempt.biometric_available = false;
                    Self::enter_waiting(&mut state, AuthMethod::Password, &message, &mut effects);
                }
                BiometricOutcome::Unavailable(reason) => {
                    let reason = if reason.is_empty() {
                        "biometric unavailable".to_string()
                    } else {
                        reason
                    };
                    Self::finish(
                        &mut state,
                        AuthPhase::Unavailable,
                        AuthResult::failed(Some(AuthMethod::Biometric), reason.clone()),
                        &mut effects,
                    );
                    effects.error_notice = Some(reason);
                }
            }
        }
        self.apply(effects);
        true
    }

    fn enter_waiting(
        state: &mut FlowState,
        method: AuthMethod,
        message: &str,
        effects: &mut Effects,
    ) {
        state.generation += 1;
        state.attempt.phase = AuthPhase::Waiting;
        state.attempt.active_method = Some(method);
        log::debug!("auth: waiting for {:?}", method);
        effects.events.push(AuthEvent {
            phase: AuthPhase::Waiting,
            method: Some(method),
            attempts_remaining: state.attempt.attempts_remaining(),
            message: message.to_string(),
        });
    }

    fn finish(state: &mut FlowState, phase: AuthPhase, result: AuthResult, effects: &mut Effects) {
        if state.result.is_some() {
            return;
        }
        state.attempt.phase = phase;
        state.result = Some(result.clone());
        log::debug!("auth: finished with {:?}", phase);

        let message = result
            .error
            .clone()
            .unwrap_or_else(|| match phase {
                AuthPhase::Success => "Authenticated".to_string(),
                AuthPhase::Cancelled => "Authentication cancelled".to_string(),
                _ => String::new(),
            });
        effects.events.push(AuthEvent {
            phase,
            method: result.method_used,
            attempts_remaining: state.attempt.attempts_remaining(),
            message,
        });
        effects.result = Some(result);
    }

    fn apply(&self, effects: Effects) {
        self.sync_waiting_animation();
        for event in effects.events {
            self.inner.events.publish(event);
        }

        if let Some(message) = effects.error_notice {
            let center = self
                .inner
                .notifications
                .borrow()
                .clone()
                .or_else(notification::global);
            match center {
                Some(center) => {
                    center.show(
                        NotificationKind::Error,
                        "Authentication unavailable",
                        &message,
                        Some(NotificationKind::Error.default_duration()),
                    );
                }
                None => log::warn!("auth: no notification center for: {}", message),
            }
        }

        if let Some(result) = effects.result {
            let callback = self.inner.on_result.borrow_mut().take();
            if let Some(callback) = callback {
                callback(&result);
            }
        }
    }
}

impl AuthFlowCoordinator {
    fn sync_waiting_animation(&self) {
        let waiting = {
            let state = self.inner.state.borrow();
            state.attempt.phase == AuthPhase::Waiting
                && state.attempt.active_method == Some(AuthMethod::Biometric)
        };

        if !waiting {
            // 借用を解いてから止める
            let ticker = self.inner.waiting_ticker.borrow_mut().take();
            drop(ticker);
            return;
        }
        if self.inner.waiting_ticker.borrow().is_some() {
            return;
        }
        let Some(clock) = self.inner.waiting_clock.borrow().clone() else {
            return;
        };

        let weak = Rc::downgrade(&self.inner);
        let ticker = Ticker::start(clock, WAITING_TICK_INTERVAL, move |tick| {
            if let Some(inner) = weak.upgrade() {
                inner.waiting_events.publish(WaitingProgress::from_tick(tick));
            }
        });
        *self.inner.waiting_ticker.borrow_mut() = Some(ticker);
    }
}

impl std::fmt::Debug for AuthFlowCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthFlowCoordinator")
            .field("state", &self.state())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::{ManualClock, TurnQueue};
    use std::cell::Cell;
    use std::time::Duration;

    struct ScriptedProbe {
        available: bool,
        outcome: Option<BiometricOutcome>,
        pending: Option<BiometricResponder>,
    }

    impl ScriptedProbe {
        fn immediate(outcome: BiometricOutcome) -> Self {
            Self {
                available: true,
                outcome: Some(outcome),
                pending: None,
            }
        }

        fn deferred() -> Self {
            Self {
                available: true,
                outcome: None,
                pending: None,
            }
        }
    }

    impl BiometricProbe for ScriptedProbe {
        fn is_available(&self) -> bool {
            self.available
        }

        fn prompt(&mut self, request: BiometricRequest) -> Option<BiometricOutcome> {
            match self.outcome.take() {
                Some(outcome) => Some(outcome),
                None => {
                    self.pending = Some(request.responder);
                    None
                }
            }
        }
    }

    fn coordinator(config: AuthConfig, queue: &TurnQueue) -> AuthFlowCoordinator {
        let verifier = |password: &str| {
            if password == "correct" {
                Ok(())
            } else {
                Err("wrong password".to_string())
            }
        };
        AuthFlowCoordinator::new(config, Box::new(verifier), Rc::new(queue.clone()))
    }

    fn count_results(flow: &AuthFlowCoordinator) -> Rc<Cell<u32>> {
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        flow.on_result(move |_| counter.set(counter.get() + 1));
        count
    }

    #[test]
    fn test_zero_max_attempts_is_coerced() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Password, false, true, 0), &queue);
        assert_eq!(flow.state().max_attempts, 3);
    }

    #[test]
    fn test_biometric_success() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, true, true, 3), &queue);
        let results = count_results(&flow);

        flow.start("Unlock", &mut ScriptedProbe::immediate(BiometricOutcome::Success))
            .unwrap();

        let result = flow.result().unwrap();
        assert!(result.success);
        assert_eq!(result.method_used, Some(AuthMethod::Biometric));
        assert_eq!(results.get(), 1);
    }

    #[test]
    fn test_both_without_biometric_uses_password() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Both, false, false, 3), &queue);
        flow.start("", &mut ScriptedProbe::deferred()).unwrap();

        let state = flow.state();
        assert_eq!(state.phase, AuthPhase::Waiting);
        assert_eq!(state.active_method, Some(AuthMethod::Password));
    }

    #[test]
    fn test_biometric_unavailable_falls_back() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, false, true, 3), &queue);
        flow.start("", &mut ScriptedProbe::deferred()).unwrap();
        assert_eq!(flow.state().active_method, Some(AuthMethod::Password));
    }

    #[test]
    fn test_prompt_unavailable_rewrites_message() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, true, true, 3), &queue);
        let messages = Rc::new(RefCell::new(Vec::new()));
        let sink = messages.clone();
        flow.subscribe(move |event| sink.borrow_mut().push(event.message.clone()));

        let mut probe =
            ScriptedProbe::immediate(BiometricOutcome::Unavailable("no sensor".to_string()));
        flow.start("Touch the sensor", &mut probe).unwrap();

        assert_eq!(flow.state().active_method, Some(AuthMethod::Password));
        let messages = messages.borrow();
        assert_eq!(messages[0], "Touch the sensor");
        assert!(messages[1].contains("no sensor"));
    }

    #[test]
    fn test_fallback_requested_without_permission_fails() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, true, false, 3), &queue);
        flow.start("", &mut ScriptedProbe::immediate(BiometricOutcome::FallbackRequested))
            .unwrap();

        let result = flow.result().unwrap();
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("fallback disabled"));
    }

    #[test]
    fn test_user_cancelled_biometric() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, true, true, 3), &queue);
        flow.start("", &mut ScriptedProbe::immediate(BiometricOutcome::UserCancelled))
            .unwrap();

        let result = flow.result().unwrap();
        assert!(result.cancelled);
        assert_eq!(flow.phase(), AuthPhase::Cancelled);
    }

    #[test]
    fn test_deferred_biometric_result() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, true, true, 3), &queue);
        let mut probe = ScriptedProbe::deferred();
        flow.start("", &mut probe).unwrap();
        assert_eq!(flow.phase(), AuthPhase::Waiting);

        let responder = probe.pending.take().unwrap();
        assert!(responder.respond(BiometricOutcome::Failed(String::new())));
        assert_eq!(flow.phase(), AuthPhase::Failed);
        assert_eq!(
            flow.result().unwrap().error.as_deref(),
            Some("biometric authentication failed")
        );
    }

    #[test]
    fn test_single_attempt_limit() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Password, false, true, 1), &queue);
        let results = count_results(&flow);
        flow.start("", &mut ScriptedProbe::deferred()).unwrap();

        assert_eq!(
            flow.submit_password("nope"),
            Err(EngineError::VerificationFailed {
                attempts_remaining: 0
            })
        );
        let result = flow.result().unwrap();
        assert_eq!(result.error.as_deref(), Some("max attempts"));
        assert_eq!(flow.state().attempts_used, 1);
        assert_eq!(
            flow.submit_password("correct"),
            Err(EngineError::InvalidState(StateError::FlowFinished))
        );
        assert_eq!(results.get(), 1);
    }

    #[test]
    fn test_empty_password_does_not_use_attempt() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Password, false, true, 3), &queue);
        flow.start("", &mut ScriptedProbe::deferred()).unwrap();

        assert!(matches!(
            flow.submit_password(""),
            Err(EngineError::InvalidInput(_))
        ));
        assert_eq!(flow.state().attempts_used, 0);
    }

    #[test]
    fn test_password_before_start_is_rejected() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::default(), &queue);
        assert_eq!(
            flow.submit_password("correct"),
            Err(EngineError::InvalidState(StateError::WrongSubFlow))
        );
    }

    #[test]
    fn test_cancel_applies_on_next_turn_and_drops_late_result() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, true, true, 3), &queue);
        let results = count_results(&flow);
        let mut probe = ScriptedProbe::deferred();
        flow.start("", &mut probe).unwrap();

        assert!(flow.cancel());
        assert!(!flow.cancel());
        assert_eq!(flow.phase(), AuthPhase::Waiting);

        let responder = probe.pending.take().unwrap();
        assert!(responder.is_cancelled());
        assert!(!responder.respond(BiometricOutcome::Success));

        queue.run_turn();
        assert_eq!(flow.phase(), AuthPhase::Cancelled);
        assert!(flow.result().unwrap().cancelled);
        assert_eq!(results.get(), 1);
    }

    #[test]
    fn test_start_twice_is_rejected() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Password, false, true, 3), &queue);
        flow.start("", &mut ScriptedProbe::deferred()).unwrap();
        assert_eq!(
            flow.start("", &mut ScriptedProbe::deferred()),
            Err(EngineError::InvalidState(StateError::FlowAlreadyStarted))
        );
    }

    #[test]
    fn test_on_result_after_finish_runs_immediately() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Password, false, true, 3), &queue);
        flow.start("", &mut ScriptedProbe::deferred()).unwrap();
        flow.submit_password("correct").unwrap();

        let seen = Rc::new(Cell::new(false));
        let flag = seen.clone();
        flow.on_result(move |result| flag.set(result.success));
        assert!(seen.get());
        assert_eq!(flow.result().unwrap().password.as_deref(), Some("correct"));
    }

    #[test]
    fn test_waiting_animation_runs_only_while_biometric_waits() {
        let queue = TurnQueue::new();
        let clock = Rc::new(ManualClock::default());
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, true, true, 3), &queue)
            .with_waiting_animation(clock.clone());
        let values = Rc::new(RefCell::new(Vec::new()));
        let sink = values.clone();
        flow.subscribe_waiting(move |progress| sink.borrow_mut().push(progress.value));

        let mut probe = ScriptedProbe::deferred();
        flow.start("Touch the sensor", &mut probe).unwrap();
        clock.advance(Duration::from_millis(300));
        assert_eq!(*values.borrow(), vec![0.1, 0.2, 0.3]);

        let responder = probe.pending.take().unwrap();
        assert!(responder.respond(BiometricOutcome::FallbackRequested));
        clock.advance(Duration::from_secs(1));
        assert_eq!(values.borrow().len(), 3);
        assert_eq!(clock.pending_timers(), 0);
    }

    #[test]
    fn test_remote_result_after_cancel_is_dropped() {
        let queue = TurnQueue::new();
        let flow = coordinator(AuthConfig::new(AuthMethod::Biometric, true, true, 3), &queue);
        let results = count_results(&flow);
        let mut probe = ScriptedProbe::deferred();
        flow.start("", &mut probe).unwrap();

        let remote = probe.pending.take().unwrap().into_remote();
        assert!(flow.cancel());
        assert!(remote.is_cancelled());
        assert!(!remote.respond(BiometricOutcome::Success));

        queue.run_until_idle(4);
        assert_eq!(flow.phase(), AuthPhase::Cancelled);
        assert_eq!(results.get(), 1);
    }
}

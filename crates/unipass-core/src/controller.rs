//! Popup handshake controller
//!
//! Every operation opens a popup and walks it through
//! `AwaitingReady -> AwaitingResult -> Resolved`:
//!
//! 1. the popup posts `UP-READY` once loaded
//! 2. the controller answers with the request (`UP-LOGIN` or `UP-SIGN`)
//! 3. the popup posts the result under the same tag
//!
//! Operations are tracked as separate request records keyed by operation id,
//! and inbound messages are routed by the popup that sent them, so several
//! operations can be in flight at once. One message listener is attached while
//! anything is pending.

use crate::{
    decode_inbound, Action, ConfigError, Decoded, HandshakeError, IdentityEncoder, IgnoreReason,
    Inbound, InboundEvent, PopupHost, PopupId, ProviderConfig, Request, Session,
    UnipassAccount, UnipassIdentityEncoder, POPUP_FEATURES,
};
use async_trait::async_trait;
use futures::{
    channel::oneshot,
    future::{select, Either},
};
use log::{debug, info, trace, warn};
use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::{Rc, Weak},
    time::Duration,
};

/// Narrow capability consumed by account abstractions
#[async_trait(?Send)]
pub trait Provider {
    async fn authenticate(&self) -> Result<Session, HandshakeError>;

    /// Resolves with the `0x`-prefixed signature
    async fn sign(&self, message: Option<&str>) -> Result<String, HandshakeError>;

    fn close(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    AwaitingReady,
    AwaitingResult,
}

enum Resolution {
    Session(Session),
    Signature(String),
}

type Outcome = Result<Resolution, HandshakeError>;

struct PendingRequest {
    popup: PopupId,
    request: Request,
    phase: Phase,
    responder: oneshot::Sender<Outcome>,
}

#[derive(Default)]
struct State {
    session: Session,
    pending: HashMap<OperationId, PendingRequest>,
    listening: bool,
    next_id: u64,
}

struct Inner<H> {
    config: ProviderConfig,
    expected_origin: Option<String>,
    host: Rc<H>,
    encoder: Box<dyn IdentityEncoder>,
    state: RefCell<State>,
}

pub struct HandshakeController<H: PopupHost> {
    inner: Rc<Inner<H>>,
}

impl<H: PopupHost> Clone for HandshakeController<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

/// Non-owning handle, for listener callbacks that must not keep the controller alive
pub struct WeakHandshakeController<H: PopupHost> {
    inner: Weak<Inner<H>>,
}

impl<H: PopupHost> WeakHandshakeController<H> {
    pub fn upgrade(&self) -> Option<HandshakeController<H>> {
        self.inner
            .upgrade()
            .map(|inner| HandshakeController { inner })
    }
}

impl<H: PopupHost + 'static> HandshakeController<H> {
    pub fn new(config: ProviderConfig, host: Rc<H>) -> Result<Self, ConfigError> {
        let encoder = UnipassIdentityEncoder::new(config.network, config.args_hash);
        Self::with_encoder(config, host, encoder)
    }

    pub fn with_encoder(
        config: ProviderConfig,
        host: Rc<H>,
        encoder: impl IdentityEncoder + 'static,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let expected_origin = if config.check_origin {
            Some(config.origin()?)
        } else {
            None
        };

        Ok(Self {
            inner: Rc::new(Inner {
                config,
                expected_origin,
                host,
                encoder: Box::new(encoder),
                state: RefCell::new(State::default()),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakHandshakeController<H> {
        WeakHandshakeController {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.inner.config
    }

    pub fn session(&self) -> Session {
        self.inner.state.borrow().session.clone()
    }

    pub fn address(&self) -> Option<String> {
        self.inner
            .state
            .borrow()
            .session
            .address
            .as_ref()
            .map(|a| a.to_string())
    }

    pub fn email(&self) -> Option<String> {
        self.inner.state.borrow().session.email.clone()
    }

    pub fn is_listening(&self) -> bool {
        self.inner.state.borrow().listening
    }

    pub fn pending_operations(&self) -> usize {
        self.inner.state.borrow().pending.len()
    }

    pub fn phase_of(&self, popup: PopupId) -> Option<Phase> {
        self.inner
            .state
            .borrow()
            .pending
            .values()
            .find(|r| r.popup == popup)
            .map(|r| r.phase)
    }

    pub async fn authenticate(&self) -> Result<Session, HandshakeError> {
        let url = self.inner.config.login_url();
        match self.run(Request::Login, &url).await? {
            Resolution::Session(session) => Ok(session),
            Resolution::Signature(_) => Err(HandshakeError::ProtocolViolation(
                "login resolved with a signature".into(),
            )),
        }
    }

    pub async fn sign(&self, message: Option<&str>) -> Result<String, HandshakeError> {
        debug!("message to sign: {:?}", message);
        let url = self.inner.config.sign_url();
        match self.run(Request::sign(message), &url).await? {
            Resolution::Signature(signature) => Ok(signature),
            Resolution::Session(_) => Err(HandshakeError::ProtocolViolation(
                "sign resolved with a session".into(),
            )),
        }
    }

    /// Detach the listener; pending operations fail with `ListenerClosed`.
    /// Open popups are left alone.
    pub fn close(&self) {
        let (was_listening, drained) = {
            let mut state = self.inner.state.borrow_mut();
            let was_listening = std::mem::replace(&mut state.listening, false);
            let drained: Vec<_> = state.pending.drain().map(|(_, r)| r).collect();
            (was_listening, drained)
        };

        if was_listening {
            self.inner.host.detach_listener();
            debug!("message listener detached");
        }
        for record in drained {
            let _ = record.responder.send(Err(HandshakeError::ListenerClosed));
        }
    }

    /// Entry point for the host's `message` listener
    pub fn handle_message(&self, event: InboundEvent) {
        let inbound = match decode_inbound(&event.data) {
            Decoded::Ignored(IgnoreReason::NotAnEnvelope) => {
                trace!("ignoring non protocol message from {}", event.origin);
                return;
            }
            Decoded::Ignored(IgnoreReason::UnknownAction(tag)) => {
                debug!("ignoring unknown action {} from {}", tag, event.origin);
                return;
            }
            Decoded::Violation(reason) => Err(reason),
            Decoded::Message(message) => Ok(message),
        };

        if let Some(expected) = &self.inner.expected_origin {
            if &event.origin != expected {
                warn!(
                    "ignoring message from unexpected origin {} (expected {})",
                    event.origin, expected
                );
                return;
            }
        }

        let Some(popup) = event.source else {
            trace!("ignoring message without a popup source");
            return;
        };
        let Some(id) = self.operation_for(popup) else {
            debug!("ignoring message from {} with no pending operation", popup);
            return;
        };

        match inbound {
            Err(reason) => {
                warn!("{}: {}", id, reason);
                self.settle(id, Err(HandshakeError::ProtocolViolation(reason)), true);
            }
            Ok(Inbound::Ready) => self.send_request(id, popup, &event.origin),
            Ok(Inbound::Close) => {
                info!("{}: popup reported it was closed", id);
                self.settle(id, Err(HandshakeError::PopupClosedByUser), false);
            }
            Ok(Inbound::Login(account)) => {
                if self.expects(id, Action::Login) {
                    self.complete_login(id, account);
                }
            }
            Ok(Inbound::Sign(signature)) => {
                if self.expects(id, Action::Sign) {
                    info!("{}: signature received", id);
                    let signature = format!("0x{}", signature);
                    self.settle(id, Ok(Resolution::Signature(signature)), true);
                }
            }
        }
    }

    async fn run(&self, request: Request, url: &str) -> Outcome {
        let (id, popup, receiver) = self.start(request, url)?;
        let deadline = self
            .inner
            .config
            .timeout_ms
            .map(|timeout_ms| self.inner.host.now_ms() + timeout_ms as f64);
        let watchdog = Box::pin(self.watch(popup, deadline));

        match select(receiver, watchdog).await {
            Either::Left((outcome, _)) => {
                outcome.unwrap_or_else(|_| Err(HandshakeError::ListenerClosed))
            }
            Either::Right((failure, _)) => {
                warn!("{}: {}", id, failure);
                let close_popup = !matches!(failure, HandshakeError::PopupClosedByUser);
                self.discard(id, close_popup);
                Err(failure)
            }
        }
    }

    fn start(
        &self,
        request: Request,
        url: &str,
    ) -> Result<(OperationId, PopupId, oneshot::Receiver<Outcome>), HandshakeError> {
        self.ensure_listening()?;

        let popup = match self.inner.host.open(url, POPUP_FEATURES) {
            Ok(popup) => popup,
            Err(e) => {
                self.detach_if_idle();
                return Err(e.into());
            }
        };

        let (responder, receiver) = oneshot::channel();
        let mut state = self.inner.state.borrow_mut();
        let id = OperationId(state.next_id);
        state.next_id += 1;
        state.pending.insert(
            id,
            PendingRequest {
                popup,
                request,
                phase: Phase::AwaitingReady,
                responder,
            },
        );
        info!("{}: opened {} at {}", id, popup, url);

        Ok((id, popup, receiver))
    }

    /// Resolves with the failure that ends the operation: popup gone or timeout.
    /// The deadline is checked against the host clock, since timers may fire late.
    async fn watch(&self, popup: PopupId, deadline: Option<f64>) -> HandshakeError {
        let interval = self.inner.config.poll_interval_duration();
        loop {
            let pause = match deadline {
                Some(deadline) => {
                    let remaining = (deadline - self.inner.host.now_ms()).max(0.0).ceil();
                    interval.min(Duration::from_millis(remaining as u64))
                }
                None => interval,
            };
            self.inner.host.sleep(pause).await;

            if self.inner.host.is_closed(popup) {
                return HandshakeError::PopupClosedByUser;
            }
            if let (Some(deadline), Some(timeout_ms)) = (deadline, self.inner.config.timeout_ms) {
                if self.inner.host.now_ms() >= deadline {
                    return HandshakeError::Timeout(timeout_ms);
                }
            }
        }
    }

    fn ensure_listening(&self) -> Result<(), HandshakeError> {
        if self.inner.state.borrow().listening {
            return Ok(());
        }
        self.inner.host.attach_listener()?;
        self.inner.state.borrow_mut().listening = true;
        debug!("message listener attached");
        Ok(())
    }

    fn detach_if_idle(&self) {
        let detach = {
            let mut state = self.inner.state.borrow_mut();
            if state.listening && state.pending.is_empty() {
                state.listening = false;
                true
            } else {
                false
            }
        };
        if detach {
            self.inner.host.detach_listener();
            debug!("message listener detached");
        }
    }

    fn operation_for(&self, popup: PopupId) -> Option<OperationId> {
        self.inner
            .state
            .borrow()
            .pending
            .iter()
            .find(|(_, r)| r.popup == popup)
            .map(|(id, _)| *id)
    }

    /// Fails the operation when the popup answers with the other result tag
    fn expects(&self, id: OperationId, action: Action) -> bool {
        let expected = match self.inner.state.borrow().pending.get(&id) {
            Some(record) => record.request.response_action(),
            None => return false,
        };
        if expected == action {
            return true;
        }
        let reason = format!(
            "expected {} response, got {}",
            expected.as_str(),
            action.as_str()
        );
        warn!("{}: {}", id, reason);
        self.settle(id, Err(HandshakeError::ProtocolViolation(reason)), true);
        false
    }

    fn send_request(&self, id: OperationId, popup: PopupId, origin: &str) {
        let request = {
            let mut state = self.inner.state.borrow_mut();
            let Some(record) = state.pending.get_mut(&id) else {
                return;
            };
            record.phase = Phase::AwaitingResult;
            record.request.clone()
        };

        let message = match request.to_value() {
            Ok(message) => message,
            Err(e) => {
                self.settle(id, Err(e.into()), true);
                return;
            }
        };
        let target_origin = if origin.is_empty() || origin == "null" {
            "*"
        } else {
            origin
        };

        debug!(
            "{}: popup ready, sending {}",
            id,
            request.to_message().upact.as_str()
        );
        if let Err(e) = self.inner.host.post_message(popup, &message, target_origin) {
            self.settle(id, Err(e.into()), true);
        }
    }

    fn complete_login(&self, id: OperationId, account: UnipassAccount) {
        let address = match self.inner.encoder.encode(&account.pubkey) {
            Ok(address) => address,
            Err(e) => {
                warn!("{}: could not derive address: {}", id, e);
                self.settle(id, Err(e.into()), true);
                return;
            }
        };

        let session = {
            let mut state = self.inner.state.borrow_mut();
            state.session = Session {
                address: Some(address),
                email: Some(account.email),
            };
            state.session.clone()
        };
        info!("{}: logged in as {:?}", id, session.email);
        self.settle(id, Ok(Resolution::Session(session)), true);
    }

    /// Remove the record, release the listener if idle, close the popup, then resolve
    fn settle(&self, id: OperationId, outcome: Outcome, close_popup: bool) {
        let record = self.inner.state.borrow_mut().pending.remove(&id);
        let Some(record) = record else {
            return;
        };

        self.detach_if_idle();
        if close_popup {
            self.inner.host.close(record.popup);
        }
        let _ = record.responder.send(outcome);
    }

    /// Drop a record whose operation already gave up waiting
    fn discard(&self, id: OperationId, close_popup: bool) {
        let record = self.inner.state.borrow_mut().pending.remove(&id);
        if let Some(record) = record {
            self.detach_if_idle();
            if close_popup {
                self.inner.host.close(record.popup);
            }
        }
    }
}

#[async_trait(?Send)]
impl<H: PopupHost + 'static> Provider for HandshakeController<H> {
    async fn authenticate(&self) -> Result<Session, HandshakeError> {
        HandshakeController::authenticate(self).await
    }

    async fn sign(&self, message: Option<&str>) -> Result<String, HandshakeError> {
        HandshakeController::sign(self, message).await
    }

    fn close(&self) {
        HandshakeController::close(self)
    }
}

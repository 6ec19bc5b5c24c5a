//! In-memory popup host for controller tests

use crate::{HostError, InboundEvent, PopupHost, PopupId};
use async_trait::async_trait;
use serde_json::Value;
use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
    time::Duration,
};
use tokio::time::Instant;

pub const ORIGIN: &str = "https://unipass.test";

#[derive(Default)]
pub struct MockHost {
    block_popups: bool,
    next_popup: Cell<u64>,
    opened: RefCell<Vec<(PopupId, String)>>,
    posted: RefCell<Vec<(PopupId, Value, String)>>,
    closed: RefCell<HashSet<PopupId>>,
    closed_by_user: RefCell<HashSet<PopupId>>,
    listening: Cell<bool>,
    attach_count: Cell<usize>,
    epoch: Cell<Option<Instant>>,
    /// Timers fire this many times later than asked, like a background tab
    throttle: Option<u32>,
}

impl MockHost {
    /// A host whose popups are always blocked
    pub fn blocking() -> Self {
        Self {
            block_popups: true,
            ..Default::default()
        }
    }

    /// A host whose timers fire `factor` times later than requested
    pub fn throttled(factor: u32) -> Self {
        Self {
            throttle: Some(factor),
            ..Default::default()
        }
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.borrow().iter().map(|(_, url)| url.clone()).collect()
    }

    pub fn popup_at(&self, url_suffix: &str) -> Option<PopupId> {
        self.opened
            .borrow()
            .iter()
            .find(|(_, url)| url.ends_with(url_suffix))
            .map(|(popup, _)| *popup)
    }

    pub fn posted_to(&self, popup: PopupId) -> Vec<(Value, String)> {
        self.posted
            .borrow()
            .iter()
            .filter(|(p, _, _)| *p == popup)
            .map(|(_, message, origin)| (message.clone(), origin.clone()))
            .collect()
    }

    pub fn was_closed(&self, popup: PopupId) -> bool {
        self.closed.borrow().contains(&popup)
    }

    pub fn close_by_user(&self, popup: PopupId) {
        self.closed_by_user.borrow_mut().insert(popup);
    }

    pub fn is_listening(&self) -> bool {
        self.listening.get()
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.get()
    }
}

#[async_trait(?Send)]
impl PopupHost for MockHost {
    fn open(&self, url: &str, _features: &str) -> Result<PopupId, HostError> {
        if self.block_popups {
            return Err(HostError::PopupBlocked(url.to_string()));
        }
        let popup = PopupId(self.next_popup.get() + 1);
        self.next_popup.set(popup.0);
        self.opened.borrow_mut().push((popup, url.to_string()));
        Ok(popup)
    }

    fn post_message(
        &self,
        popup: PopupId,
        message: &Value,
        target_origin: &str,
    ) -> Result<(), HostError> {
        if self.is_closed(popup) {
            return Err(HostError::PostMessage(format!("{} is closed", popup)));
        }
        self.posted
            .borrow_mut()
            .push((popup, message.clone(), target_origin.to_string()));
        Ok(())
    }

    fn close(&self, popup: PopupId) {
        self.closed.borrow_mut().insert(popup);
    }

    fn is_closed(&self, popup: PopupId) -> bool {
        self.closed.borrow().contains(&popup) || self.closed_by_user.borrow().contains(&popup)
    }

    fn attach_listener(&self) -> Result<(), HostError> {
        if self.listening.get() {
            return Err(HostError::Listener("listener already attached".into()));
        }
        self.listening.set(true);
        self.attach_count.set(self.attach_count.get() + 1);
        Ok(())
    }

    fn detach_listener(&self) {
        self.listening.set(false);
    }

    fn now_ms(&self) -> f64 {
        let epoch = self.epoch.get().unwrap_or_else(|| {
            let now = Instant::now();
            self.epoch.set(Some(now));
            now
        });
        epoch.elapsed().as_micros() as f64 / 1000.0
    }

    async fn sleep(&self, duration: Duration) {
        let duration = match self.throttle {
            Some(factor) => duration * factor,
            None => duration,
        };
        tokio::time::sleep(duration).await;
    }
}

pub fn event(popup: PopupId, data: Value) -> InboundEvent {
    InboundEvent {
        source: Some(popup),
        origin: ORIGIN.to_string(),
        data,
    }
}

/// Wait until `count` popups were opened and return the last one
pub async fn until_opened(host: &MockHost, count: usize) -> PopupId {
    loop {
        if let Some((popup, _)) = host.opened.borrow().get(count - 1) {
            return *popup;
        }
        tokio::task::yield_now().await;
    }
}

//! [`PopupHost`] backed by the browser window

use async_trait::async_trait;
use js_sys::Object;
use log::{debug, error};
use serde::Serialize;
use serde_json::Value;
use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    time::Duration,
};
use unipass_core::{HostError, InboundEvent, PopupHost, PopupId, POPUP_TARGET};
use wasm_bindgen::prelude::*;
use web_sys::{MessageEvent, Window};

pub type MessageListener = Closure<dyn FnMut(MessageEvent)>;

pub struct WindowHost {
    window: Window,
    popups: RefCell<HashMap<PopupId, Window>>,
    next_popup: Cell<u64>,
    listener: RefCell<Option<MessageListener>>,
    attached: Cell<bool>,
}

impl WindowHost {
    pub fn new(window: Window) -> Self {
        Self {
            window,
            popups: RefCell::new(HashMap::new()),
            next_popup: Cell::new(0),
            listener: RefCell::new(None),
            attached: Cell::new(false),
        }
    }

    /// The callback registered on `attach_listener`; kept for the host's lifetime
    pub fn install_listener(&self, listener: MessageListener) {
        *self.listener.borrow_mut() = Some(listener);
    }

    /// Translate a DOM message event, resolving its source to one of our popups
    pub fn inbound_event(&self, event: &MessageEvent) -> Option<InboundEvent> {
        let data: Value = match serde_wasm_bindgen::from_value(event.data()) {
            Ok(data) => data,
            Err(e) => {
                debug!("ignoring message with non JSON data: {}", e);
                return None;
            }
        };

        let source = event.source().and_then(|source| self.popup_for(&source));

        Some(InboundEvent {
            source,
            origin: event.origin(),
            data,
        })
    }

    fn popup_for(&self, source: &Object) -> Option<PopupId> {
        self.popups
            .borrow()
            .iter()
            .find(|(_, window)| Object::is(source.as_ref(), window.as_ref()))
            .map(|(popup, _)| *popup)
    }
}

#[async_trait(?Send)]
impl PopupHost for WindowHost {
    fn open(&self, url: &str, features: &str) -> Result<PopupId, HostError> {
        let popup_window = self
            .window
            .open_with_url_and_target_and_features(url, POPUP_TARGET, features)
            .map_err(|e| HostError::PopupBlocked(format!("{:?}", e)))?
            .ok_or_else(|| HostError::PopupBlocked(url.to_string()))?;

        let popup = PopupId(self.next_popup.get() + 1);
        self.next_popup.set(popup.0);
        self.popups.borrow_mut().insert(popup, popup_window);
        Ok(popup)
    }

    fn post_message(
        &self,
        popup: PopupId,
        message: &Value,
        target_origin: &str,
    ) -> Result<(), HostError> {
        let popups = self.popups.borrow();
        let popup_window = popups
            .get(&popup)
            .ok_or_else(|| HostError::PostMessage(format!("{} is not open", popup)))?;

        let message = message
            .serialize(&serde_wasm_bindgen::Serializer::json_compatible())
            .map_err(|e| HostError::PostMessage(e.to_string()))?;

        popup_window
            .post_message(&message, target_origin)
            .map_err(|e| HostError::PostMessage(format!("{:?}", e)))
    }

    fn close(&self, popup: PopupId) {
        let popup_window = self.popups.borrow_mut().remove(&popup);
        if let Some(popup_window) = popup_window {
            if let Err(e) = popup_window.close() {
                error!("failed to close {}: {:?}", popup, e);
            }
        }
    }

    fn is_closed(&self, popup: PopupId) -> bool {
        let closed = match self.popups.borrow().get(&popup) {
            Some(popup_window) => popup_window.closed().unwrap_or(true),
            None => return true,
        };
        if closed {
            self.popups.borrow_mut().remove(&popup);
        }
        closed
    }

    fn attach_listener(&self) -> Result<(), HostError> {
        if self.attached.get() {
            return Ok(());
        }
        let listener = self.listener.borrow();
        let listener = listener
            .as_ref()
            .ok_or_else(|| HostError::Listener("no message listener installed".into()))?;

        self.window
            .add_event_listener_with_callback("message", listener.as_ref().unchecked_ref())
            .map_err(|e| HostError::Listener(format!("{:?}", e)))?;
        self.attached.set(true);
        Ok(())
    }

    fn detach_listener(&self) {
        if !self.attached.replace(false) {
            return;
        }
        if let Some(listener) = self.listener.borrow().as_ref() {
            if let Err(e) = self
                .window
                .remove_event_listener_with_callback("message", listener.as_ref().unchecked_ref())
            {
                error!("failed to remove message listener: {:?}", e);
            }
        }
    }

    fn now_ms(&self) -> f64 {
        js_sys::Date::now()
    }

    async fn sleep(&self, duration: Duration) {
        gloo_timers::future::sleep(duration).await;
    }
}

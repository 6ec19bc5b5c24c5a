//! Window-system seam: the controller drives popups only through [`PopupHost`]

use crate::HostError;
use async_trait::async_trait;
use serde_json::Value;
use std::{fmt, time::Duration};

pub const POPUP_TARGET: &str = "_blank";
pub const POPUP_FEATURES: &str = "width=360,height=640,toolbar=no,menubar=no,location=no,status=no";

/// Handle to a popup opened by a host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PopupId(pub u64);

impl fmt::Display for PopupId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "popup-{}", self.0)
    }
}

/// A message event delivered by the host's listener
#[derive(Debug, Clone)]
pub struct InboundEvent {
    /// Popup the message came from, `None` for any other window
    pub source: Option<PopupId>,
    pub origin: String,
    pub data: Value,
}

#[async_trait(?Send)]
pub trait PopupHost {
    fn open(&self, url: &str, features: &str) -> Result<PopupId, HostError>;

    fn post_message(
        &self,
        popup: PopupId,
        message: &Value,
        target_origin: &str,
    ) -> Result<(), HostError>;

    fn close(&self, popup: PopupId);

    /// Unknown popups count as closed
    fn is_closed(&self, popup: PopupId) -> bool;

    /// Start delivering `message` events to the controller
    fn attach_listener(&self) -> Result<(), HostError>;

    fn detach_listener(&self);

    /// Wall clock in milliseconds; only differences between readings matter
    fn now_ms(&self) -> f64;

    async fn sleep(&self, duration: Duration);
}

//! Wire envelope exchanged with the popup over the window message channel
//!
//! ```json
//! { "upact": "UP-READY" | "UP-LOGIN" | "UP-SIGN" | "UP-CLOSE",
//!   "payload": "..." | { "pubkey": "...", "email": "..." } }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Sent in place of an empty message so the popup always has something to show
pub const SIGN_PLACEHOLDER: &str = "N/A";

/// Action tag carried in the `upact` field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    #[serde(rename = "UP-READY")]
    Ready,
    #[serde(rename = "UP-LOGIN")]
    Login,
    #[serde(rename = "UP-SIGN")]
    Sign,
    #[serde(rename = "UP-CLOSE")]
    Close,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Ready => "UP-READY",
            Action::Login => "UP-LOGIN",
            Action::Sign => "UP-SIGN",
            Action::Close => "UP-CLOSE",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "UP-READY" => Some(Action::Ready),
            "UP-LOGIN" => Some(Action::Login),
            "UP-SIGN" => Some(Action::Sign),
            "UP-CLOSE" => Some(Action::Close),
            _ => None,
        }
    }
}

/// Account record returned by the popup after login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnipassAccount {
    pub pubkey: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Account(UnipassAccount),
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnipassMessage {
    pub upact: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Payload>,
}

/// Request posted by the parent once the popup reports ready
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Login,
    Sign(String),
}

impl Request {
    /// Empty or missing messages become [`SIGN_PLACEHOLDER`]
    pub fn sign(message: Option<&str>) -> Self {
        let message = message
            .filter(|m| !m.is_empty())
            .unwrap_or(SIGN_PLACEHOLDER);
        Request::Sign(message.to_string())
    }

    /// Tag the popup answers with
    pub fn response_action(&self) -> Action {
        match self {
            Request::Login => Action::Login,
            Request::Sign(_) => Action::Sign,
        }
    }

    pub fn to_message(&self) -> UnipassMessage {
        match self {
            Request::Login => UnipassMessage {
                upact: Action::Login,
                payload: None,
            },
            Request::Sign(message) => UnipassMessage {
                upact: Action::Sign,
                payload: Some(Payload::Text(message.clone())),
            },
        }
    }

    pub fn to_value(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self.to_message())
    }
}

/// Validated message received from the popup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    Ready,
    Login(UnipassAccount),
    Sign(String),
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not an object or no string `upact` field; other traffic on the channel
    NotAnEnvelope,
    UnknownAction(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoded {
    Message(Inbound),
    Ignored(IgnoreReason),
    /// Known action with a payload of the wrong shape
    Violation(String),
}

/// Classify raw message data received on the channel
pub fn decode_inbound(data: &Value) -> Decoded {
    let Some(object) = data.as_object() else {
        return Decoded::Ignored(IgnoreReason::NotAnEnvelope);
    };
    let Some(tag) = object.get("upact").and_then(Value::as_str) else {
        return Decoded::Ignored(IgnoreReason::NotAnEnvelope);
    };
    let Some(action) = Action::from_tag(tag) else {
        return Decoded::Ignored(IgnoreReason::UnknownAction(tag.to_string()));
    };
    let payload = object.get("payload").filter(|p| !p.is_null());

    match action {
        Action::Ready => Decoded::Message(Inbound::Ready),
        Action::Close => Decoded::Message(Inbound::Close),
        Action::Login => match payload {
            Some(value) => match serde_json::from_value::<UnipassAccount>(value.clone()) {
                Ok(account) => Decoded::Message(Inbound::Login(account)),
                Err(e) => Decoded::Violation(format!("invalid {} payload: {}", tag, e)),
            },
            None => Decoded::Violation(format!("{} response without account", tag)),
        },
        Action::Sign => match payload.and_then(Value::as_str) {
            Some(signature) => Decoded::Message(Inbound::Sign(signature.to_string())),
            None => Decoded::Violation(format!("{} response without signature string", tag)),
        },
    }
}

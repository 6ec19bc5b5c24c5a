//! unipass-core: popup handshake for the UniPass wallet provider
//!
//! Host-agnostic pieces shared by the browser bindings and the tests:
//! the wire envelope, public key -> CKB address derivation, and the
//! controller that walks a popup through login or signing.

pub mod address;
pub mod config;
pub mod controller;
pub mod errors;
pub mod host;
pub mod message;
pub mod session;

#[cfg(test)]
mod testing;

pub use address::*;
pub use config::*;
pub use controller::*;
pub use errors::*;
pub use host::*;
pub use message::*;
pub use session::*;

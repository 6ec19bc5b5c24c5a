//! unipass-wasm: browser bindings for the UniPass popup provider
//!
//! Exposes `UnipassProvider` to JavaScript. Login and signing happen in a
//! popup running the hosted wallet; this crate wires the popup window and the
//! `message` listener into the handshake controller from `unipass-core`.

use wasm_bindgen::prelude::*;

pub mod provider;
pub mod window_host;

pub use provider::UnipassProvider;
pub use window_host::WindowHost;

// Re-export unipass-core types
pub use unipass_core::*;

#[wasm_bindgen(start)]
pub fn start() {
    wasm_logger::init(wasm_logger::Config::default());
    log::info!("unipass-wasm initialized");
}

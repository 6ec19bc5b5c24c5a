use crate::WindowHost;
use log::debug;
use std::rc::Rc;
use unipass_core::{HandshakeController, HostError, ProviderConfig};
use wasm_bindgen::prelude::*;
use web_sys::MessageEvent;

/// Login / sign provider backed by the UniPass popup
#[wasm_bindgen]
pub struct UnipassProvider {
    controller: HandshakeController<WindowHost>,
}

/// Accepts nothing, a base url string, or a config object
fn config_from_js(config: JsValue) -> Result<ProviderConfig, JsValue> {
    if config.is_null() || config.is_undefined() {
        return Ok(ProviderConfig::default());
    }
    if let Some(base_url) = config.as_string() {
        return Ok(ProviderConfig::new().base_url(base_url));
    }
    serde_wasm_bindgen::from_value(config)
        .map_err(|e| JsValue::from_str(&format!("Invalid provider config: {}", e)))
}

#[wasm_bindgen]
impl UnipassProvider {
    #[wasm_bindgen(constructor)]
    pub fn new(config: JsValue) -> Result<UnipassProvider, JsValue> {
        let config = config_from_js(config)?;
        let window = web_sys::window().ok_or_else(|| {
            JsValue::from_str(&HostError::Unavailable("no global window".into()).to_string())
        })?;

        let host = Rc::new(WindowHost::new(window));
        let controller = HandshakeController::new(config, Rc::clone(&host))
            .map_err(|e| JsValue::from_str(&e.to_string()))?;

        let weak_controller = controller.downgrade();
        let weak_host = Rc::downgrade(&host);
        let listener = Closure::<dyn FnMut(MessageEvent)>::new(move |event: MessageEvent| {
            let (Some(controller), Some(host)) = (weak_controller.upgrade(), weak_host.upgrade())
            else {
                return;
            };
            if let Some(inbound) = host.inbound_event(&event) {
                controller.handle_message(inbound);
            }
        });
        host.install_listener(listener);

        debug!("provider created for {}", controller.config().base_url);
        Ok(Self { controller })
    }

    /// Log in through the popup; resolves with `{ address, email }`
    #[wasm_bindgen]
    pub async fn init(&self) -> Result<JsValue, JsValue> {
        self.authenticate().await
    }

    #[wasm_bindgen]
    pub async fn authenticate(&self) -> Result<JsValue, JsValue> {
        let controller = self.controller.clone();
        let session = controller
            .authenticate()
            .await
            .map_err(|e| JsValue::from_str(&e.to_string()))?;

        serde_wasm_bindgen::to_value(&session)
            .map_err(|e| JsValue::from_str(&format!("Serialization error: {}", e)))
    }

    /// Resolves with the `0x`-prefixed signature
    #[wasm_bindgen]
    pub async fn sign(&self, message: Option<String>) -> Result<String, JsValue> {
        let controller = self.controller.clone();
        controller
            .sign(message.as_deref())
            .await
            .map_err(|e| JsValue::from_str(&e.to_string()))
    }

    #[wasm_bindgen]
    pub fn close(&self) {
        self.controller.close();
    }

    #[wasm_bindgen(getter)]
    pub fn address(&self) -> Option<String> {
        self.controller.address()
    }

    #[wasm_bindgen(getter)]
    pub fn email(&self) -> Option<String> {
        self.controller.email()
    }
}

impl Drop for UnipassProvider {
    fn drop(&mut self) {
        self.controller.close();
    }
}

//! WebAssembly bindings for NavGuard
//!
//! The background script owns the browser APIs (`fetch`, `chrome.action`,
//! `chrome.tabs.sendMessage`) and drives a [`session::GuardSession`]
//! through the functions below. The content script calls
//! [`handle_page_message`] for every message it receives.

pub mod logger;
pub mod overlay;
pub mod session;

use std::sync::OnceLock;

use ng_core::types::{BadgeState, Generation};
use ng_core::{GuardConfig, PageCommand};
use wasm_bindgen::prelude::*;

use session::{BeginResult, GuardSession, ReconcileResult};

static SESSION: OnceLock<GuardSession> = OnceLock::new();

fn session() -> Result<&'static GuardSession, JsValue> {
    SESSION
        .get()
        .ok_or_else(|| JsValue::from_str("Not initialized. Call init() first."))
}

fn set(target: &js_sys::Object, key: &str, value: &JsValue) {
    let _ = js_sys::Reflect::set(target, &key.into(), value);
}

fn badge_object(badge: &BadgeState) -> JsValue {
    let obj = js_sys::Object::new();
    set(&obj, "tabId", &JsValue::from(badge.tab_id));
    set(&obj, "text", &JsValue::from_str(&badge.text));
    set(&obj, "color", &JsValue::from_str(badge.color.as_str()));
    obj.into()
}

fn command_value(command: &PageCommand) -> Result<JsValue, JsValue> {
    let json = command
        .to_json()
        .map_err(|e| JsValue::from_str(&format!("Failed to encode page command: {}", e)))?;
    js_sys::JSON::parse(&json)
}

fn optional_string(value: Option<&str>) -> JsValue {
    value.map(JsValue::from_str).unwrap_or(JsValue::NULL)
}

// =============================================================================
// Background
// =============================================================================

/// Initialise the background session. `config_json` is a `GuardConfig`
/// document; missing fields take their defaults.
#[wasm_bindgen]
pub fn init(config_json: Option<String>, log_level: Option<String>) -> Result<(), JsValue> {
    logger::init(log_level.as_deref().unwrap_or("info"));

    if SESSION.get().is_some() {
        return Err(JsValue::from_str("Already initialized. Reload the extension to reinitialize."));
    }

    let config = match config_json {
        Some(text) => GuardConfig::from_json(&text)
            .map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?,
        None => GuardConfig::default(),
    };

    let session = GuardSession::new(config).map_err(|e| JsValue::from_str(&format!("Invalid config: {}", e)))?;
    SESSION
        .set(session)
        .map_err(|_| JsValue::from_str("Failed to set session state"))?;

    log::info!("NavGuard session ready");
    Ok(())
}

#[wasm_bindgen]
pub fn is_initialized() -> bool {
    SESSION.get().is_some()
}

/// Admit a `tabs.onUpdated` event.
///
/// Returns `{ action, ... }` where `action` is one of `ignore`, `drop`,
/// `safe` (apply `badge`) or `check` (fetch `queryUrl`, then call
/// [`reconcile`] or [`reputation_failed`]). `recordUrl`, when not null,
/// must be fetched and then released with [`release_record`] whether the
/// fetch succeeds or fails. An unreleased claim blocks recording that
/// hostname until it expires after the request timeout.
#[wasm_bindgen]
pub fn begin_navigation(tab_id: i32, url: &str, status: &str) -> Result<JsValue, JsValue> {
    let result = session()?.begin(tab_id, url, status, js_sys::Date::now());
    let obj = js_sys::Object::new();

    match result {
        BeginResult::Ignored => set(&obj, "action", &"ignore".into()),
        BeginResult::Dropped { reason } => {
            set(&obj, "action", &"drop".into());
            set(&obj, "reason", &JsValue::from_str(&reason));
        }
        BeginResult::Safe {
            hostname,
            generation,
            badge,
            record_url,
        } => {
            set(&obj, "action", &"safe".into());
            set(&obj, "hostname", &JsValue::from_str(&hostname));
            set(&obj, "generation", &JsValue::from(generation as f64));
            set(&obj, "badge", &badge_object(&badge));
            set(&obj, "recordUrl", &optional_string(record_url.as_deref()));
        }
        BeginResult::NeedsReputation {
            hostname,
            generation,
            flags,
            query_url,
            record_url,
        } => {
            set(&obj, "action", &"check".into());
            set(&obj, "hostname", &JsValue::from_str(&hostname));
            set(&obj, "generation", &JsValue::from(generation as f64));
            let flag_array = js_sys::Array::new();
            for flag in flags {
                flag_array.push(&JsValue::from_str(flag));
            }
            set(&obj, "flags", &flag_array);
            set(&obj, "queryUrl", &JsValue::from_str(&query_url));
            set(&obj, "recordUrl", &optional_string(record_url.as_deref()));
        }
    }

    Ok(obj.into())
}

fn reconcile_object(result: ReconcileResult) -> Result<JsValue, JsValue> {
    let obj = js_sys::Object::new();
    match result {
        ReconcileResult::Resolved { verdict, badge, command } => {
            set(&obj, "action", &"resolved".into());
            set(&obj, "safe", &JsValue::from(verdict.is_safe()));
            set(&obj, "badge", &badge_object(&badge));
            let command = match command {
                Some(command) => command_value(&command)?,
                None => JsValue::NULL,
            };
            set(&obj, "message", &command);
        }
        ReconcileResult::Unresolved { error } => {
            set(&obj, "action", &"unresolved".into());
            set(&obj, "error", &JsValue::from_str(&error));
        }
        ReconcileResult::Superseded => set(&obj, "action", &"superseded".into()),
    }
    Ok(obj.into())
}

/// Reconcile a `/query` response body for a navigation returned by
/// [`begin_navigation`]. On `resolved`, apply `badge` and, when present,
/// send `message` to the tab.
#[wasm_bindgen]
pub fn reconcile(tab_id: i32, generation: f64, hostname: &str, body: &str) -> Result<JsValue, JsValue> {
    let result = session()?.reconcile(tab_id, generation as Generation, hostname, body);
    reconcile_object(result)
}

/// Report a failed `/query` fetch (network error, timeout, non-2xx).
#[wasm_bindgen]
pub fn reputation_failed(hostname: &str, error: &str) -> Result<JsValue, JsValue> {
    reconcile_object(session()?.reputation_failed(hostname, error))
}

/// Release the insert-history claim once its fetch settles.
#[wasm_bindgen]
pub fn release_record(hostname: &str) -> Result<(), JsValue> {
    session()?.release_record(hostname);
    Ok(())
}

/// Drop state for a closed tab (`tabs.onRemoved`).
#[wasm_bindgen]
pub fn forget_tab(tab_id: i32) -> Result<(), JsValue> {
    session()?.forget_tab(tab_id);
    Ok(())
}

/// Classify a URL offline. Does not touch tab state.
#[wasm_bindgen]
pub fn classify_url(url: &str) -> Result<JsValue, JsValue> {
    let session = session()?;
    let obj = js_sys::Object::new();

    match session.classify(url) {
        Ok((parsed, evaluation)) => {
            set(&obj, "hostname", &JsValue::from_str(&parsed.hostname));
            set(&obj, "tld", &JsValue::from_str(evaluation.tld.as_str()));
            let flag_array = js_sys::Array::new();
            for flag in evaluation.describe() {
                flag_array.push(&JsValue::from_str(flag));
            }
            set(&obj, "flags", &flag_array);
            set(&obj, "requiresConfirmation", &JsValue::from(evaluation.requires_confirmation()));
        }
        Err(failure) => {
            set(&obj, "error", &JsValue::from_str(&failure.to_string()));
        }
    }

    Ok(obj.into())
}

// =============================================================================
// Content
// =============================================================================

/// Install console logging without a session, for the content script.
#[wasm_bindgen]
pub fn init_logging(log_level: Option<String>) {
    logger::init(log_level.as_deref().unwrap_or("info"));
}

/// Apply a runtime message in the content script. `message` is the object
/// received from the background; `image_src` is the resolved banner image
/// URL. Returns `true` if the page was locked by this call.
#[wasm_bindgen]
pub fn handle_page_message(message: JsValue, image_src: &str) -> Result<bool, JsValue> {
    let json = js_sys::JSON::stringify(&message)?
        .as_string()
        .ok_or_else(|| JsValue::from_str("Message is not serialisable"))?;

    let command = match PageCommand::from_json(&json) {
        Ok(command) => command,
        // Not ours
        Err(_) => return Ok(false),
    };

    overlay::apply(&command, image_src)
}

#[wasm_bindgen]
pub fn is_page_locked() -> bool {
    overlay::is_locked()
}

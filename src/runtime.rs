//! Preview runtime - a sandboxed V8 isolate per preview session.
//!
//! Provides only what demo page code needs:
//! - a minimal DOM built from the compiled document (see bootstrap.js)
//! - console.log/info/warn/error (relayed to the host, never printed)
//! - setTimeout/setInterval/requestAnimationFrame
//! - alert/confirm/prompt and window.open, gated by capabilities
//! - atob, btoa, crypto.randomUUID, crypto.getRandomValues, crypto.subtle.digest
//! - No fs, net, env, module loading, or reference to the host

use crate::css::{self, ComplexSelector, Declaration, StyleRule};
use crate::markup::{self, MarkupNode, ParsedDocument};
use crate::relay::{ConsoleLevel, ConsoleRelay};
use anyhow::{anyhow, Error};
use deno_core::{op2, JsRuntime, OpState, RuntimeOptions};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Configuration
// ============================================================================

/// What the sandboxed document is allowed to do. Nothing here ever grants
/// access to the host: `window.parent` and `window.top` always point back at
/// the sandbox itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxCapabilities {
    /// Execute inline scripts
    pub scripts: bool,
    /// `window.open` requests are recorded instead of ignored
    pub popups: bool,
    /// `alert`/`confirm`/`prompt` are recorded instead of ignored
    pub modals: bool,
    /// The document keeps an origin of its own (web storage available)
    /// instead of an opaque one
    pub own_origin: bool,
}

impl Default for SandboxCapabilities {
    fn default() -> Self {
        Self {
            scripts: true,
            popups: true,
            modals: true,
            own_origin: true,
        }
    }
}

impl SandboxCapabilities {
    /// The capability set as an iframe `sandbox` token list, for hosts that
    /// embed the compiled document in a real browser frame.
    pub fn sandbox_attribute(&self) -> String {
        let tokens = [
            (self.scripts, "allow-scripts"),
            (self.popups, "allow-popups"),
            (self.modals, "allow-modals"),
            (self.own_origin, "allow-same-origin"),
        ];
        tokens
            .iter()
            .filter(|(enabled, _)| *enabled)
            .map(|(_, token)| *token)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Configuration for the preview sandbox
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Maximum heap size in bytes (default: 64MB, None = unlimited)
    pub max_heap_size: Option<usize>,
    /// Maximum time for one uninterrupted stretch of sandbox code in
    /// milliseconds (default: 5000ms, None = unlimited)
    pub timeout_ms: Option<u64>,
    /// How long the event loop is driven after loading or a user event so
    /// timers and promise callbacks can run (default: 100ms)
    pub settle_ms: u64,
    pub capabilities: SandboxCapabilities,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            max_heap_size: Some(64 * 1024 * 1024), // 64MB default
            timeout_ms: Some(5_000),
            settle_ms: 100,
            capabilities: SandboxCapabilities::default(),
        }
    }
}

// ============================================================================
// Sandbox activity
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DialogKind {
    Alert,
    Confirm,
    Prompt,
}

/// A modal the sandboxed page opened. The headless preview never blocks on
/// it: `confirm` answers false and `prompt` answers null.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub kind: DialogKind,
    pub message: String,
}

/// Modals and popups requested by the sandboxed page
#[derive(Debug, Default, Clone)]
pub struct SandboxActivity {
    pub dialogs: Vec<Dialog>,
    pub popups: Vec<String>,
}

// ============================================================================
// Console Ops
// ============================================================================

fn forward(state: &mut OpState, level: ConsoleLevel, msg: &str) {
    if let Some(relay) = state.try_borrow_mut::<ConsoleRelay>() {
        relay.forward(level, msg);
    }
}

#[op2(fast)]
fn op_console_log(state: &mut OpState, #[string] msg: &str) {
    forward(state, ConsoleLevel::Log, msg);
}

#[op2(fast)]
fn op_console_info(state: &mut OpState, #[string] msg: &str) {
    forward(state, ConsoleLevel::Info, msg);
}

#[op2(fast)]
fn op_console_warn(state: &mut OpState, #[string] msg: &str) {
    forward(state, ConsoleLevel::Warn, msg);
}

#[op2(fast)]
fn op_console_error(state: &mut OpState, #[string] msg: &str) {
    forward(state, ConsoleLevel::Error, msg);
}

// ============================================================================
// Window Ops
// ============================================================================

#[op2]
#[serde]
fn op_sandbox_capabilities(state: &mut OpState) -> SandboxCapabilities {
    state
        .try_borrow::<SandboxCapabilities>()
        .cloned()
        .unwrap_or_default()
}

#[op2(fast)]
fn op_record_dialog(
    state: &mut OpState,
    #[string] kind: &str,
    #[string] message: String,
) -> Result<(), Error> {
    let kind = match kind {
        "alert" => DialogKind::Alert,
        "confirm" => DialogKind::Confirm,
        "prompt" => DialogKind::Prompt,
        other => return Err(anyhow!("Unknown dialog kind: {}", other)),
    };
    tracing::debug!(target: "playground::preview", ?kind, %message, "sandbox dialog");
    if let Some(activity) = state.try_borrow_mut::<SandboxActivity>() {
        activity.dialogs.push(Dialog { kind, message });
    }
    Ok(())
}

#[op2(fast)]
fn op_record_popup(state: &mut OpState, #[string] url: String) {
    tracing::debug!(target: "playground::preview", %url, "sandbox popup request");
    if let Some(activity) = state.try_borrow_mut::<SandboxActivity>() {
        activity.popups.push(url);
    }
}

#[op2(async)]
async fn op_timer_sleep(delay_ms: u32) {
    tokio::time::sleep(Duration::from_millis(u64::from(delay_ms))).await;
}

// ============================================================================
// Document Ops
// ============================================================================

#[op2]
#[serde]
fn op_parse_document(#[string] source: &str) -> ParsedDocument {
    markup::parse_document(source)
}

#[op2]
#[serde]
fn op_parse_fragment(#[string] source: &str) -> Vec<MarkupNode> {
    markup::parse_fragment(source)
}

#[op2]
#[serde]
fn op_parse_stylesheet(#[string] source: &str) -> Vec<StyleRule> {
    css::parse_stylesheet(source)
}

#[op2]
#[serde]
fn op_parse_declarations(#[string] source: &str) -> Vec<Declaration> {
    css::parse_declarations(source)
}

#[op2]
#[serde]
fn op_parse_selector(#[string] source: &str) -> Result<Vec<ComplexSelector>, Error> {
    Ok(css::parse_selector_list(source)?)
}

// ============================================================================
// Crypto Ops
// ============================================================================

#[op2]
#[string]
fn op_crypto_random_uuid() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[op2(fast)]
fn op_crypto_get_random_values(#[buffer] buf: &mut [u8]) {
    use rand::RngCore;
    rand::thread_rng().fill_bytes(buf);
}

#[op2]
#[buffer]
fn op_crypto_subtle_digest(#[string] algorithm: &str, #[buffer] data: &[u8]) -> Result<Vec<u8>, Error> {
    use sha2::{Digest, Sha256, Sha384, Sha512};

    let result = match algorithm.to_uppercase().replace('-', "").as_str() {
        "SHA256" => Sha256::digest(data).to_vec(),
        "SHA384" => Sha384::digest(data).to_vec(),
        "SHA512" => Sha512::digest(data).to_vec(),
        _ => {
            return Err(anyhow!(
                "Unsupported algorithm: {}. Supported: SHA-256, SHA-384, SHA-512",
                algorithm
            ))
        }
    };

    Ok(result)
}

// ============================================================================
// Encoding Ops
// ============================================================================

#[op2]
#[string]
fn op_btoa(#[string] data: &str) -> String {
    use base64::Engine;
    // btoa expects Latin-1, but we'll be lenient and accept UTF-8
    base64::engine::general_purpose::STANDARD.encode(data.as_bytes())
}

#[op2]
#[string]
fn op_atob(#[string] data: &str) -> Result<String, Error> {
    use base64::Engine;
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| anyhow!("Invalid base64: {}", e))?;
    String::from_utf8(bytes).map_err(|e| anyhow!("Invalid UTF-8 in decoded data: {}", e))
}

deno_core::extension!(
    preview_sandbox,
    ops = [
        op_console_log,
        op_console_info,
        op_console_warn,
        op_console_error,
        op_sandbox_capabilities,
        op_record_dialog,
        op_record_popup,
        op_timer_sleep,
        op_parse_document,
        op_parse_fragment,
        op_parse_stylesheet,
        op_parse_declarations,
        op_parse_selector,
        op_crypto_random_uuid,
        op_crypto_get_random_values,
        op_crypto_subtle_digest,
        op_btoa,
        op_atob,
    ],
    esm_entry_point = "ext:preview_sandbox/bootstrap.js",
    esm = ["ext:preview_sandbox/bootstrap.js" = "src/bootstrap.js"],
);

/// Create a fresh sandboxed isolate. Every preview session gets its own;
/// nothing survives from one to the next.
pub fn create_runtime(config: &SandboxConfig) -> Result<JsRuntime, Error> {
    // Configure V8 heap limits if specified
    let create_params = config
        .max_heap_size
        .map(|max_bytes| deno_core::v8::Isolate::create_params().heap_limits(0, max_bytes));

    let mut runtime = JsRuntime::new(RuntimeOptions {
        extensions: vec![preview_sandbox::init_ops_and_esm()],
        create_params,
        ..Default::default()
    });

    if config.max_heap_size.is_some() {
        let handle = runtime.v8_isolate().thread_safe_handle();
        runtime.add_near_heap_limit_callback(move |current, initial| {
            // Stop the page's code and grant just enough headroom to unwind
            tracing::warn!(
                current_mb = current / (1024 * 1024),
                initial_mb = initial / (1024 * 1024),
                "preview sandbox near heap limit, terminating script"
            );
            handle.terminate_execution();
            current * 2
        });
    }

    {
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        state.put(config.capabilities.clone());
        state.put(SandboxActivity::default());
    }

    Ok(runtime)
}

/// Terminates sandbox execution if it runs past its budget.
///
/// Runs on its own thread: while V8 is busy the current thread (and any
/// task scheduled on it) cannot make progress.
pub(crate) struct Watchdog {
    cancel: Option<mpsc::Sender<()>>,
    fired: Arc<AtomicBool>,
}

impl Watchdog {
    pub(crate) fn arm(runtime: &mut JsRuntime, budget: Option<Duration>) -> Self {
        let fired = Arc::new(AtomicBool::new(false));
        let Some(budget) = budget else {
            return Self {
                cancel: None,
                fired,
            };
        };

        let handle = runtime.v8_isolate().thread_safe_handle();
        let (tx, rx) = mpsc::channel::<()>();
        let flag = Arc::clone(&fired);
        std::thread::spawn(move || {
            if let Err(RecvTimeoutError::Timeout) = rx.recv_timeout(budget) {
                flag.store(true, Ordering::SeqCst);
                handle.terminate_execution();
            }
        });

        Self {
            cancel: Some(tx),
            fired,
        }
    }

    /// Stop the watchdog. If sandbox code was cut short, by this watchdog or
    /// by the heap limit callback, the isolate is made usable again and the
    /// cause is returned.
    pub(crate) fn disarm(mut self, runtime: &mut JsRuntime) -> Option<Interruption> {
        drop(self.cancel.take());
        let isolate = runtime.v8_isolate();
        let interruption = if self.fired.load(Ordering::SeqCst) {
            Some(Interruption::Timeout)
        } else if isolate.is_execution_terminating() {
            Some(Interruption::HeapLimit)
        } else {
            None
        };
        if interruption.is_some() {
            isolate.cancel_terminate_execution();
        }
        interruption
    }
}

/// Why sandbox execution was terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    Timeout,
    HeapLimit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_attribute() {
        let all = SandboxCapabilities::default();
        assert_eq!(
            all.sandbox_attribute(),
            "allow-scripts allow-popups allow-modals allow-same-origin"
        );

        let scripts_only = SandboxCapabilities {
            popups: false,
            modals: false,
            own_origin: false,
            ..Default::default()
        };
        assert_eq!(scripts_only.sandbox_attribute(), "allow-scripts");
    }

    #[test]
    fn test_config_defaults_fill_missing_fields() {
        let config: SandboxConfig =
            serde_json::from_str(r#"{"settle_ms": 5, "capabilities": {"modals": false}}"#).unwrap();
        assert_eq!(config.settle_ms, 5);
        assert_eq!(config.max_heap_size, Some(64 * 1024 * 1024));
        assert!(config.capabilities.scripts);
        assert!(!config.capabilities.modals);
    }

    #[tokio::test]
    async fn test_host_bindings_are_not_reachable() {
        let mut runtime = create_runtime(&SandboxConfig::default()).unwrap();
        runtime
            .execute_script("<test>", "globalThis.__preview__.load('<p>x</p>')".to_string())
            .unwrap();
        let value = runtime
            .execute_script("<test>", "typeof Deno + ',' + (window.parent === window)".to_string())
            .unwrap();
        let scope = &mut runtime.handle_scope();
        let local = deno_core::v8::Local::new(scope, value);
        assert_eq!(local.to_rust_string_lossy(scope), "undefined,true");
    }

    #[tokio::test]
    async fn test_watchdog_terminates_runaway_script() {
        let mut runtime = create_runtime(&SandboxConfig::default()).unwrap();
        let watchdog = Watchdog::arm(&mut runtime, Some(Duration::from_millis(50)));
        let result = runtime.execute_script("<test>", "while (true) {}".to_string());
        assert!(result.is_err());
        assert_eq!(watchdog.disarm(&mut runtime), Some(Interruption::Timeout));

        // The isolate is usable again afterwards
        assert!(runtime.execute_script("<test>", "1 + 1".to_string()).is_ok());
    }
}

//! Console relay - forwards sandboxed console output to the host.
//!
//! The relay lives in the session's op state, so its lifetime is the
//! session's: it is installed once when the isolate is created and closed
//! when the session is torn down. The sandbox only ever calls into it through
//! the console ops; it has no handle on the host's own logging.

use anyhow::{bail, Result};
use deno_core::OpState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one preview session in host-side diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "preview-{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsoleLevel {
    Log,
    Info,
    Warn,
    Error,
}

impl ConsoleLevel {
    /// Prefix that marks a host diagnostic as coming from the preview
    pub fn tag(self) -> &'static str {
        match self {
            ConsoleLevel::Log => "Output:",
            ConsoleLevel::Info => "Output Info:",
            ConsoleLevel::Warn => "Output Warning:",
            ConsoleLevel::Error => "Output Error:",
        }
    }
}

/// One console call made inside the sandbox
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleMessage {
    pub level: ConsoleLevel,
    pub text: String,
}

impl fmt::Display for ConsoleMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.level.tag(), self.text)
    }
}

#[derive(Debug)]
pub struct ConsoleRelay {
    session: SessionId,
    messages: Vec<ConsoleMessage>,
    open: bool,
}

impl ConsoleRelay {
    /// Install the relay for `session`. A session gets exactly one relay;
    /// installing a second is an error rather than a silent stack of shims.
    pub fn install(state: &mut OpState, session: SessionId) -> Result<()> {
        if let Some(existing) = state.try_borrow::<ConsoleRelay>() {
            bail!(
                "console relay already installed for {} (requested for {})",
                existing.session,
                session
            );
        }
        state.put(ConsoleRelay {
            session,
            messages: Vec::new(),
            open: true,
        });
        tracing::debug!(%session, "console relay installed");
        Ok(())
    }

    /// Remove the relay from `state` and close it. Messages sent afterwards
    /// have nowhere to go and are dropped.
    pub fn uninstall(state: &mut OpState) -> Option<ConsoleRelay> {
        let mut relay = state.try_take::<ConsoleRelay>()?;
        relay.close();
        Some(relay)
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Mirror one console call into the host's diagnostic stream.
    pub fn forward(&mut self, level: ConsoleLevel, text: &str) {
        if !self.open {
            tracing::trace!(session = %self.session, "console message after relay closed");
            return;
        }
        let tag = level.tag();
        let session = self.session;
        match level {
            ConsoleLevel::Log | ConsoleLevel::Info => {
                tracing::info!(target: "playground::preview", %session, tag, "{} {}", tag, text)
            }
            ConsoleLevel::Warn => {
                tracing::warn!(target: "playground::preview", %session, tag, "{} {}", tag, text)
            }
            ConsoleLevel::Error => {
                tracing::error!(target: "playground::preview", %session, tag, "{} {}", tag, text)
            }
        }
        self.messages.push(ConsoleMessage {
            level,
            text: text.to_string(),
        });
    }

    pub fn close(&mut self) {
        if self.open {
            self.open = false;
            tracing::debug!(
                session = %self.session,
                messages = self.messages.len(),
                "console relay closed"
            );
        }
    }

    /// Everything relayed so far, in invocation order
    pub fn messages(&self) -> &[ConsoleMessage] {
        &self.messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use deno_core::{JsRuntime, RuntimeOptions};

    fn runtime() -> JsRuntime {
        JsRuntime::new(RuntimeOptions::default())
    }

    #[test]
    fn test_installs_exactly_once() {
        let mut runtime = runtime();
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        ConsoleRelay::install(&mut state, SessionId(1)).unwrap();

        let err = ConsoleRelay::install(&mut state, SessionId(1)).unwrap_err();
        assert!(err.to_string().contains("already installed"));
    }

    #[test]
    fn test_forwards_in_order() {
        let mut runtime = runtime();
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        ConsoleRelay::install(&mut state, SessionId(7)).unwrap();
        let relay = state.borrow_mut::<ConsoleRelay>();
        relay.forward(ConsoleLevel::Warn, "first");
        relay.forward(ConsoleLevel::Log, "second");

        let rendered: Vec<String> = relay.messages().iter().map(|m| m.to_string()).collect();
        assert_eq!(rendered, ["Output Warning: first", "Output: second"]);
    }

    #[test]
    fn test_uninstall_closes_and_allows_reinstall() {
        let mut runtime = runtime();
        let op_state = runtime.op_state();
        let mut state = op_state.borrow_mut();
        ConsoleRelay::install(&mut state, SessionId(1)).unwrap();
        state
            .borrow_mut::<ConsoleRelay>()
            .forward(ConsoleLevel::Info, "kept");

        let mut relay = ConsoleRelay::uninstall(&mut state).unwrap();
        assert!(!relay.is_open());
        relay.forward(ConsoleLevel::Error, "dropped");
        assert_eq!(relay.messages().len(), 1);

        assert!(ConsoleRelay::uninstall(&mut state).is_none());
        ConsoleRelay::install(&mut state, SessionId(2)).unwrap();
    }

    #[test]
    fn test_tags() {
        assert_eq!(ConsoleLevel::Log.tag(), "Output:");
        assert_eq!(ConsoleLevel::Info.tag(), "Output Info:");
        assert_eq!(ConsoleLevel::Warn.tag(), "Output Warning:");
        assert_eq!(ConsoleLevel::Error.tag(), "Output Error:");
    }
}

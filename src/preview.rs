//! Isolated preview host.
//!
//! A `PreviewHost` owns at most one `PreviewSession`: the live rendering of
//! one compiled document inside its own isolate. Every render tears the old
//! session down completely (isolate, timers, listeners, console relay) before
//! the next one is created. If the new one cannot be set up, the last document
//! that did render is brought back in a fresh session.

use crate::compiler::CompiledDocument;
use crate::relay::{ConsoleLevel, ConsoleMessage, ConsoleRelay, SessionId};
use crate::runtime::{self, Dialog, Interruption, SandboxActivity, SandboxConfig, Watchdog};
use anyhow::{anyhow, Context, Result};
use deno_core::{v8, JsRuntime, OpState, PollEventLoopOptions};
use serde::de::DeserializeOwned;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// Upper bound on event-loop restarts within one settle window. Each restart
/// follows an error surfaced by the loop.
const MAX_SETTLE_ROUNDS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewState {
    /// Nothing delivered yet
    Empty,
    /// A document is being loaded into a fresh session
    Loading,
    /// A session is live
    Rendered,
}

pub struct PreviewHost {
    config: SandboxConfig,
    state: PreviewState,
    session: Option<PreviewSession>,
    /// Document behind the current session
    shown: Option<CompiledDocument>,
    next_session: u64,
}

impl PreviewHost {
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            state: PreviewState::Empty,
            session: None,
            shown: None,
            next_session: 1,
        }
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    pub fn state(&self) -> PreviewState {
        self.state
    }

    pub fn session(&self) -> Option<&PreviewSession> {
        self.session.as_ref()
    }

    pub fn session_mut(&mut self) -> Option<&mut PreviewSession> {
        self.session.as_mut()
    }

    /// Replace whatever is displayed with `doc`.
    ///
    /// Faults in the document's own scripts never fail this call; they are
    /// contained in the sandbox and show up in the session's console and
    /// diagnostics. An error here means the sandbox itself could not be set
    /// up. The previously rendered document is then reloaded, and the host
    /// only ends up `Empty` when that fails too.
    pub async fn render(&mut self, doc: &CompiledDocument) -> Result<&mut PreviewSession> {
        // Isolates sharing a thread must be dropped in reverse order of
        // creation, so the old one cannot outlive the next.
        if let Some(previous) = self.session.take() {
            tracing::debug!(session = %previous.id(), "tearing down preview session");
            drop(previous);
        }
        self.state = PreviewState::Loading;

        let opened = self.open(doc).await;
        self.commit(doc, opened).await
    }

    async fn open(&mut self, doc: &CompiledDocument) -> Result<PreviewSession> {
        let id = SessionId(self.next_session);
        self.next_session += 1;

        let mut session = PreviewSession::open(id, &self.config)?;
        session.load(doc).await?;
        Ok(session)
    }

    async fn commit(
        &mut self,
        doc: &CompiledDocument,
        opened: Result<PreviewSession>,
    ) -> Result<&mut PreviewSession> {
        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "preview render failed");
                self.restore().await;
                return Err(e);
            }
        };
        self.shown = Some(doc.clone());
        self.state = PreviewState::Rendered;
        let session = self.session.insert(session);

        tracing::info!(
            session = %session.id(),
            bytes = doc.len(),
            console = session.console().len(),
            "preview rendered"
        );
        Ok(session)
    }

    /// Bring back the last document that rendered, if there is one.
    async fn restore(&mut self) {
        let Some(previous) = self.shown.take() else {
            self.state = PreviewState::Empty;
            return;
        };
        match self.open(&previous).await {
            Ok(session) => {
                tracing::warn!(session = %session.id(), "previous preview restored");
                self.session = Some(session);
                self.shown = Some(previous);
                self.state = PreviewState::Rendered;
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "previous preview could not be restored");
                self.state = PreviewState::Empty;
            }
        }
    }

    /// Tear down the current session, if any.
    pub fn clear(&mut self) {
        self.session = None;
        self.shown = None;
        self.state = PreviewState::Empty;
    }
}

/// One compiled document running in its own isolate
pub struct PreviewSession {
    id: SessionId,
    runtime: JsRuntime,
    op_state: Rc<RefCell<OpState>>,
    timeout: Option<Duration>,
    settle: Duration,
    diagnostics: Vec<String>,
}

impl PreviewSession {
    fn open(id: SessionId, config: &SandboxConfig) -> Result<Self> {
        let mut runtime = runtime::create_runtime(config)?;
        let op_state = runtime.op_state();
        {
            let mut state = op_state.borrow_mut();
            ConsoleRelay::install(&mut state, id)?;
        }
        tracing::debug!(session = %id, "preview session opened");

        Ok(Self {
            id,
            runtime,
            op_state,
            timeout: config.timeout_ms.map(Duration::from_millis),
            settle: Duration::from_millis(config.settle_ms),
            diagnostics: Vec::new(),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    async fn load(&mut self, doc: &CompiledDocument) -> Result<()> {
        let source = serde_json::to_string(doc.as_str())?;
        let script = format!("globalThis.__preview__.load({})", source);
        // A runaway script leaves the document half built, which is still
        // what the page would show
        if let Some(reply) = self.run_guarded(script)? {
            let _: bool = serde_json::from_str(&reply).context("malformed load reply")?;
        }
        self.settle().await;
        Ok(())
    }

    /// Run `code` under the script timeout. Returns `None` when execution was
    /// terminated, after recording why.
    fn run_guarded(&mut self, code: String) -> Result<Option<String>> {
        let watchdog = Watchdog::arm(&mut self.runtime, self.timeout);
        let result = self.runtime.execute_script("<preview>", code);
        if let Some(interruption) = watchdog.disarm(&mut self.runtime) {
            self.record_interruption(interruption);
            return Ok(None);
        }
        let value = result?;

        let scope = &mut self.runtime.handle_scope();
        let local = v8::Local::new(scope, value);
        Ok(Some(local.to_rust_string_lossy(scope)))
    }

    /// Call one of the sandbox's host hooks and decode its JSON reply.
    fn hook<T: DeserializeOwned>(&mut self, name: &str, args: &[&str]) -> Result<T> {
        let args = args
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<_>, _>>()?;
        let script = format!("globalThis.__preview__.{}({})", name, args.join(", "));
        let reply = self
            .run_guarded(script)?
            .ok_or_else(|| anyhow!("preview script terminated during {}", name))?;
        serde_json::from_str(&reply).with_context(|| format!("malformed {} reply", name))
    }

    /// Drive the event loop for the settle window so timers and promise
    /// callbacks can run.
    async fn settle(&mut self) {
        let deadline = tokio::time::Instant::now() + self.settle;
        let watchdog = Watchdog::arm(&mut self.runtime, self.timeout);

        let mut failures = Vec::new();
        for _ in 0..MAX_SETTLE_ROUNDS {
            let turn = tokio::time::timeout_at(
                deadline,
                self.runtime
                    .run_event_loop(PollEventLoopOptions::default()),
            )
            .await;
            match turn {
                // Window elapsed with work still pending, or nothing left to do
                Err(_) | Ok(Ok(())) => break,
                Ok(Err(e)) => {
                    if self.runtime.v8_isolate().is_execution_terminating() {
                        break;
                    }
                    failures.push(e);
                }
            }
        }

        if let Some(interruption) = watchdog.disarm(&mut self.runtime) {
            self.record_interruption(interruption);
        }
        for error in failures {
            self.relay_uncaught(&error);
        }
    }

    fn relay_uncaught(&mut self, error: &anyhow::Error) {
        let message = error.to_string();
        let first = message.lines().next().unwrap_or_default();
        let text = if first.starts_with("Uncaught") {
            first.to_string()
        } else {
            format!("Uncaught (in promise) {}", first)
        };
        let op_state = self.runtime.op_state();
        let mut state = op_state.borrow_mut();
        if let Some(relay) = state.try_borrow_mut::<ConsoleRelay>() {
            relay.forward(ConsoleLevel::Error, &text);
        }
    }

    fn record_interruption(&mut self, interruption: Interruption) {
        let message = match (interruption, self.timeout) {
            (Interruption::Timeout, Some(budget)) => {
                format!("script terminated after exceeding {}ms", budget.as_millis())
            }
            (Interruption::Timeout, None) => "script terminated".to_string(),
            (Interruption::HeapLimit, _) => "script terminated near the heap limit".to_string(),
        };
        tracing::warn!(session = %self.id, "{}", message);
        self.diagnostics.push(message);
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// Rendered text of the body, whitespace collapsed
    pub fn visible_text(&mut self) -> Result<String> {
        self.hook("visibleText", &[])
    }

    /// `textContent` of the first element matching `selector`
    pub fn text_of(&mut self, selector: &str) -> Result<Option<String>> {
        self.hook("textOf", &[selector])
    }

    /// The live document serialized back to markup
    pub fn outer_html(&mut self) -> Result<String> {
        self.hook("outerHtml", &[])
    }

    pub fn computed_style(&mut self, selector: &str, property: &str) -> Result<Option<String>> {
        self.hook("computedStyle", &[selector, property])
    }

    pub fn element_count(&mut self, selector: &str) -> Result<usize> {
        self.hook("count", &[selector])
    }

    /// Dispatch a user click on the first element matching `selector`, then
    /// let the page react. Returns false if nothing matched.
    pub async fn click(&mut self, selector: &str) -> Result<bool> {
        let clicked = self.hook("click", &[selector])?;
        self.settle().await;
        Ok(clicked)
    }

    /// Evaluate `expression` in the page's global scope and return its JSON
    /// value (`null` for values JSON cannot represent).
    pub async fn evaluate(&mut self, expression: &str) -> Result<serde_json::Value> {
        let value = self.hook("evaluate", &[expression])?;
        self.settle().await;
        Ok(value)
    }

    /// Console output relayed so far, in invocation order
    pub fn console(&self) -> Vec<ConsoleMessage> {
        let op_state = &self.op_state;
        let state = op_state.borrow();
        state
            .try_borrow::<ConsoleRelay>()
            .map(|relay| relay.messages().to_vec())
            .unwrap_or_default()
    }

    pub fn dialogs(&self) -> Vec<Dialog> {
        let op_state = &self.op_state;
        let state = op_state.borrow();
        state
            .try_borrow::<SandboxActivity>()
            .map(|activity| activity.dialogs.clone())
            .unwrap_or_default()
    }

    pub fn popups(&self) -> Vec<String> {
        let op_state = &self.op_state;
        let state = op_state.borrow();
        state
            .try_borrow::<SandboxActivity>()
            .map(|activity| activity.popups.clone())
            .unwrap_or_default()
    }

    /// Host-side notes about the session (terminated scripts)
    pub fn diagnostics(&self) -> &[String] {
        &self.diagnostics
    }
}

impl PreviewSession {
    /// Detach and close the console relay; later output goes nowhere.
    fn close_relay(&mut self) -> Option<ConsoleRelay> {
        let op_state = self.runtime.op_state();
        let mut state = op_state.borrow_mut();
        ConsoleRelay::uninstall(&mut state)
    }
}

impl Drop for PreviewSession {
    fn drop(&mut self) {
        if let Some(relay) = self.close_relay() {
            tracing::debug!(
                session = %self.id,
                messages = relay.messages().len(),
                "preview session closed"
            );
        }
    }
}

//! # Live Playground
//!
//! The engine behind an HTML/CSS/JS playground: three editable fragments are
//! compiled into one self-contained document, and that document is previewed
//! in a sandboxed isolate with its own minimal DOM.
//!
//! ## Guarantees
//!
//! - **Deterministic compile**: the same fragments always produce the same
//!   document, byte for byte
//! - **Contained faults**: an exception in the page's script becomes a red
//!   banner inside the preview, never a host error
//! - **No host access**: the preview has no filesystem, network, environment
//!   or host bindings; `window.parent` is the sandbox itself
//! - **Full reset**: every render starts from a fresh isolate
//! - **Console relay**: the page's console output is forwarded to the host's
//!   `tracing` stream, tagged and in order
//!
//! ## Usage
//!
//! ```rust,ignore
//! use live_playground::{compile, PreviewHost, SandboxConfig, SourceSet};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let sources = SourceSet::new("<p>hi</p>", "p { color: red }", "");
//!     let mut host = PreviewHost::new(SandboxConfig::default());
//!     let session = host.render(&compile(&sources)).await?;
//!
//!     println!("{}", session.visible_text()?);
//!     Ok(())
//! }
//! ```

mod compiler;
mod config;
mod css;
mod editor;
pub mod export;
mod markup;
mod playground;
mod preview;
mod relay;
mod runtime;
mod source;
mod theme;

pub use compiler::{compile, CompiledDocument};
pub use config::{ConfigError, PlaygroundConfig};
pub use css::SelectorError;
pub use editor::{
    ChangeCallback, EditorDeck, EditorError, EditorSlot, EditorWidget, FragmentChange, SlotStatus,
    WidgetOptions, WidgetProvider,
};
pub use export::{export_archive, standalone_html, write_archive, ExportError, ARCHIVE_NAME};
pub use playground::{Notification, Playground};
pub use preview::{PreviewHost, PreviewSession, PreviewState};
pub use relay::{ConsoleLevel, ConsoleMessage, SessionId};
pub use runtime::{Dialog, DialogKind, SandboxCapabilities, SandboxConfig};
pub use source::{Fragment, SourceSet, DEFAULT_CSS, DEFAULT_HTML, DEFAULT_JS};
pub use theme::{Theme, ThemeStore};

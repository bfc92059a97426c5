//! Playground orchestrator - ties the fragments, the compiler, the preview
//! host and export together behind the three user actions (Run, Clear,
//! Download).

use crate::compiler::{compile, CompiledDocument};
use crate::config::PlaygroundConfig;
use crate::editor::FragmentChange;
use crate::export::{self, ARCHIVE_NAME};
use crate::preview::PreviewHost;
use crate::source::{Fragment, SourceSet};
use crate::theme::ThemeStore;
use anyhow::Result;
use std::fmt;
use std::path::Path;
use tokio::sync::watch;

/// Outcome of a user action, shaped for a toast
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Success { title: String, description: String },
    Failure { title: String, description: String },
}

impl Notification {
    fn success(title: &str, description: &str) -> Self {
        Notification::Success {
            title: title.to_string(),
            description: description.to_string(),
        }
    }

    fn failure(title: &str, description: String) -> Self {
        Notification::Failure {
            title: title.to_string(),
            description,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Notification::Success { title, .. } | Notification::Failure { title, .. } => title,
        }
    }

    pub fn description(&self) -> &str {
        match self {
            Notification::Success { description, .. }
            | Notification::Failure { description, .. } => description,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Notification::Failure { .. })
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.title(), self.description())
    }
}

/// Holds the busy flag up until dropped
struct BusyGuard<'a>(&'a watch::Sender<bool>);

impl<'a> BusyGuard<'a> {
    fn raise(flag: &'a watch::Sender<bool>) -> Self {
        flag.send_replace(true);
        Self(flag)
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

pub struct Playground {
    config: PlaygroundConfig,
    sources: SourceSet,
    compiled: CompiledDocument,
    preview: PreviewHost,
    theme: ThemeStore,
    busy: watch::Sender<bool>,
}

impl Playground {
    /// Start with the built-in samples compiled and rendered.
    pub async fn new(config: PlaygroundConfig) -> Result<Self> {
        let sources = SourceSet::defaults();
        let compiled = compile(&sources);
        let mut preview = PreviewHost::new(config.sandbox.clone());
        preview.render(&compiled).await?;

        let (busy, _) = watch::channel(false);
        Ok(Self {
            theme: ThemeStore::new(config.theme),
            config,
            sources,
            compiled,
            preview,
            busy,
        })
    }

    pub fn config(&self) -> &PlaygroundConfig {
        &self.config
    }

    pub fn sources(&self) -> &SourceSet {
        &self.sources
    }

    pub fn set_fragment(&mut self, fragment: Fragment, text: impl Into<String>) {
        self.sources.set(fragment, text);
    }

    /// Apply an edit reported by an editor widget.
    pub fn apply_change(&mut self, change: FragmentChange) {
        self.sources.set(change.fragment, change.text);
    }

    /// The document currently shown in the preview
    pub fn compiled(&self) -> &CompiledDocument {
        &self.compiled
    }

    pub fn preview(&self) -> &PreviewHost {
        &self.preview
    }

    pub fn preview_mut(&mut self) -> &mut PreviewHost {
        &mut self.preview
    }

    pub fn theme(&self) -> &ThemeStore {
        &self.theme
    }

    pub fn is_busy(&self) -> bool {
        *self.busy.borrow()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    /// Compile the current fragments and show the result.
    pub async fn run(&mut self) -> Notification {
        let _busy = BusyGuard::raise(&self.busy);
        tokio::time::sleep(self.config.run_delay()).await;

        let compiled = compile(&self.sources);
        match self.preview.render(&compiled).await {
            Ok(_) => {
                self.compiled = compiled;
                Notification::success(
                    "Code executed successfully",
                    "Your code has been compiled and is running in the output panel.",
                )
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "run failed");
                Notification::failure("Compilation error", format!("{:#}", e))
            }
        }
    }

    /// Reset every fragment to its sample and show the result.
    pub async fn clear(&mut self) -> Notification {
        self.sources = SourceSet::defaults();
        let compiled = compile(&self.sources);
        let rendered = self.preview.render(&compiled).await.map(|_| ());
        self.cleared(compiled, rendered)
    }

    fn cleared(&mut self, compiled: CompiledDocument, rendered: Result<()>) -> Notification {
        match rendered {
            Ok(()) => {
                self.compiled = compiled;
                Notification::success(
                    "Editor cleared",
                    "All code has been reset to default examples.",
                )
            }
            Err(e) => {
                tracing::error!(error = %format!("{:#}", e), "clear failed");
                Notification::failure("Clear failed", format!("{:#}", e))
            }
        }
    }

    /// Write the current fragments as a zip archive into `dir`. Failures are
    /// reported, never raised.
    pub fn download(&self, dir: &Path) -> Notification {
        let path = dir.join(ARCHIVE_NAME);
        match export::write_archive(&self.sources, &path) {
            Ok(()) => Notification::success(
                "Download started",
                "Your code is being downloaded as a zip file.",
            ),
            Err(e) => {
                tracing::error!(error = %e, "error creating zip file");
                Notification::failure("Download failed", e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::preview::PreviewState;
    use crate::runtime::SandboxConfig;

    fn quick_config() -> PlaygroundConfig {
        PlaygroundConfig {
            run_delay_ms: 0,
            sandbox: SandboxConfig {
                settle_ms: 20,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_starts_with_samples_rendered() {
        let playground = Playground::new(quick_config()).await.unwrap();
        assert_eq!(playground.sources(), &SourceSet::defaults());
        assert_eq!(playground.compiled(), &compile(&SourceSet::defaults()));
        assert_eq!(playground.preview().state(), PreviewState::Rendered);
        assert!(!playground.is_busy());
    }

    #[tokio::test]
    async fn test_run_shows_edited_fragments() {
        let mut playground = Playground::new(quick_config()).await.unwrap();
        playground.set_fragment(Fragment::Markup, "<p>hi</p>");
        playground.set_fragment(Fragment::Style, "p{color:red}");
        playground.apply_change(FragmentChange {
            fragment: Fragment::Script,
            text: "document.querySelector('p').textContent='bye'".to_string(),
        });

        let mut busy = playground.subscribe_busy();
        let notification = playground.run().await;
        assert_eq!(notification.title(), "Code executed successfully");
        assert!(!notification.is_failure());

        // The flag went up and came back down
        assert!(busy.has_changed().unwrap());
        assert!(!*busy.borrow_and_update());
        assert!(!playground.is_busy());

        let session = playground.preview_mut().session_mut().unwrap();
        assert_eq!(session.visible_text().unwrap(), "bye");
        assert_eq!(session.computed_style("p", "color").unwrap().as_deref(), Some("red"));
    }

    #[tokio::test]
    async fn test_clear_restores_samples() {
        let mut playground = Playground::new(quick_config()).await.unwrap();
        playground.set_fragment(Fragment::Script, "console.log('edited')");
        playground.run().await;

        let notification = playground.clear().await;
        assert_eq!(notification.title(), "Editor cleared");
        assert_eq!(playground.sources(), &SourceSet::defaults());
        assert_eq!(playground.compiled(), &compile(&SourceSet::defaults()));
    }

    #[tokio::test]
    async fn test_clear_failure_is_reported() {
        let mut playground = Playground::new(quick_config()).await.unwrap();
        playground.set_fragment(Fragment::Markup, "<p>edited</p>");
        playground.run().await;
        let shown = playground.compiled().clone();

        let notification = playground.cleared(
            compile(&SourceSet::defaults()),
            Err(anyhow::anyhow!("sandbox unavailable")),
        );
        assert!(notification.is_failure());
        assert_eq!(notification.title(), "Clear failed");
        assert_eq!(notification.description(), "sandbox unavailable");
        assert_eq!(playground.compiled(), &shown);
    }

    #[tokio::test]
    async fn test_download_writes_archive() {
        let dir = tempfile::tempdir().unwrap();
        let playground = Playground::new(quick_config()).await.unwrap();

        let notification = playground.download(dir.path());
        assert_eq!(notification.title(), "Download started");
        assert!(dir.path().join(ARCHIVE_NAME).is_file());
    }

    #[tokio::test]
    async fn test_download_failure_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let playground = Playground::new(quick_config()).await.unwrap();
        let compiled = playground.compiled().clone();

        let notification = playground.download(&dir.path().join("missing"));
        assert!(notification.is_failure());
        assert_eq!(playground.compiled(), &compiled);
        assert_eq!(playground.sources(), &SourceSet::defaults());
    }

    #[tokio::test]
    async fn test_theme_follows_config() {
        let config = PlaygroundConfig {
            theme: crate::theme::Theme::Dark,
            ..quick_config()
        };
        let playground = Playground::new(config).await.unwrap();
        assert_eq!(playground.theme().current().editor_theme(), "darkTheme");
    }
}

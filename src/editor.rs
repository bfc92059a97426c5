//! Editor slots - lazy, exactly-once acquisition of one editing widget per
//! fragment.
//!
//! The widget itself (a code editor component) lives outside this crate and
//! is reached through [`WidgetProvider`] and [`EditorWidget`]. A slot moves
//! `Unloaded -> Loading -> Ready`; teardown returns it to `Unloaded` and
//! releases the widget, including one that was still being created.

use crate::source::{Fragment, SourceSet};
use crate::theme::{Theme, ThemeStore};
use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

#[derive(Debug, Error)]
pub enum EditorError {
    #[error("failed to load {fragment} editor: {reason}")]
    Load { fragment: Fragment, reason: String },

    #[error("{0} editor was torn down")]
    TornDown(Fragment),
}

/// Invoked by a widget with its full text after every edit
pub type ChangeCallback = Box<dyn Fn(String) + Send + Sync + 'static>;

/// How a widget should be created
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WidgetOptions {
    pub fragment: Fragment,
    pub language: &'static str,
    pub value: String,
    pub theme: &'static str,
}

pub trait EditorWidget: Send {
    fn value(&self) -> String;
    fn set_value(&mut self, text: &str);
    fn set_theme(&mut self, theme: &str);
    fn on_change(&mut self, callback: ChangeCallback);
    /// Release the widget's resources. Called exactly once.
    fn dispose(&mut self);
}

#[async_trait]
pub trait WidgetProvider: Send + Sync {
    type Widget: EditorWidget;

    async fn create(&self, options: WidgetOptions) -> anyhow::Result<Self::Widget>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Unloaded,
    Loading,
    Ready,
}

/// New text for one fragment, sent by a ready widget
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentChange {
    pub fragment: Fragment,
    pub text: String,
}

struct SlotInner<W> {
    widget: Option<W>,
    /// Bumped by every teardown so an in-flight load can tell it is stale
    epoch: u64,
}

pub struct EditorSlot<W: EditorWidget> {
    fragment: Fragment,
    status: watch::Sender<SlotStatus>,
    /// Counts teardowns so waiters can give up
    teardowns: watch::Sender<u64>,
    inner: Mutex<SlotInner<W>>,
    changes: mpsc::UnboundedSender<FragmentChange>,
}

/// Puts a slot back to `Unloaded` if a load is abandoned midway.
struct LoadGuard<'a> {
    status: &'a watch::Sender<SlotStatus>,
    armed: bool,
}

impl Drop for LoadGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.status.send_if_modified(|status| {
                if *status != SlotStatus::Loading {
                    return false;
                }
                *status = SlotStatus::Unloaded;
                true
            });
        }
    }
}

impl<W: EditorWidget> EditorSlot<W> {
    pub fn new(fragment: Fragment, changes: mpsc::UnboundedSender<FragmentChange>) -> Self {
        let (status, _) = watch::channel(SlotStatus::Unloaded);
        let (teardowns, _) = watch::channel(0);
        Self {
            fragment,
            status,
            teardowns,
            inner: Mutex::new(SlotInner {
                widget: None,
                epoch: 0,
            }),
            changes,
        }
    }

    pub fn fragment(&self) -> Fragment {
        self.fragment
    }

    pub fn status(&self) -> SlotStatus {
        *self.status.borrow()
    }

    fn lock(&self) -> MutexGuard<'_, SlotInner<W>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Create the widget if the slot is `Unloaded`. While a load is in
    /// flight or once the slot is ready this does nothing and returns the
    /// current status.
    pub async fn load<P>(&self, provider: &P, value: &str, theme: Theme) -> Result<SlotStatus, EditorError>
    where
        P: WidgetProvider<Widget = W>,
    {
        let mut observed = SlotStatus::Unloaded;
        let claimed = self.status.send_if_modified(|status| {
            observed = *status;
            if *status != SlotStatus::Unloaded {
                return false;
            }
            *status = SlotStatus::Loading;
            true
        });
        if !claimed {
            return Ok(observed);
        }

        let mut guard = LoadGuard {
            status: &self.status,
            armed: true,
        };
        let epoch = self.lock().epoch;
        let options = WidgetOptions {
            fragment: self.fragment,
            language: self.fragment.language(),
            value: value.to_string(),
            theme: theme.editor_theme(),
        };
        tracing::debug!(fragment = %self.fragment, "loading editor widget");

        let mut widget = provider.create(options).await.map_err(|e| EditorError::Load {
            fragment: self.fragment,
            reason: format!("{:#}", e),
        })?;

        let mut inner = self.lock();
        if inner.epoch != epoch {
            guard.armed = false;
            drop(inner);
            widget.dispose();
            tracing::debug!(fragment = %self.fragment, "released widget that finished after teardown");
            return Ok(SlotStatus::Unloaded);
        }

        let changes = self.changes.clone();
        let fragment = self.fragment;
        widget.on_change(Box::new(move |text| {
            // The receiver going away just means nobody is listening
            let _ = changes.send(FragmentChange { fragment, text });
        }));
        inner.widget = Some(widget);
        drop(inner);

        guard.armed = false;
        self.status.send_replace(SlotStatus::Ready);
        tracing::debug!(fragment = %self.fragment, "editor widget ready");
        Ok(SlotStatus::Ready)
    }

    /// Wait until the slot is `Ready`. A teardown while waiting ends the
    /// wait with [`EditorError::TornDown`].
    pub async fn ready(&self) -> Result<(), EditorError> {
        let mut status = self.status.subscribe();
        let mut teardowns = self.teardowns.subscribe();
        tokio::select! {
            biased;
            _ = teardowns.changed() => Err(EditorError::TornDown(self.fragment)),
            ready = status.wait_for(|status| *status == SlotStatus::Ready) => ready
                .map(|_| ())
                .map_err(|_| EditorError::TornDown(self.fragment)),
        }
    }

    /// Current widget text, if the widget is ready
    pub fn value(&self) -> Option<String> {
        self.lock().widget.as_ref().map(|w| w.value())
    }

    /// Replace the widget's text. Returns false if there is no widget yet.
    pub fn set_value(&self, text: &str) -> bool {
        match self.lock().widget.as_mut() {
            Some(widget) => {
                widget.set_value(text);
                true
            }
            None => false,
        }
    }

    pub fn apply_theme(&self, theme: Theme) {
        if let Some(widget) = self.lock().widget.as_mut() {
            widget.set_theme(theme.editor_theme());
        }
    }

    /// Release the widget and return to `Unloaded`. A load still in flight
    /// releases its widget as soon as it arrives.
    pub fn teardown(&self) {
        let widget = {
            let mut inner = self.lock();
            inner.epoch += 1;
            inner.widget.take()
        };
        if let Some(mut widget) = widget {
            widget.dispose();
            tracing::debug!(fragment = %self.fragment, "editor widget released");
        }
        self.status.send_replace(SlotStatus::Unloaded);
        self.teardowns.send_modify(|count| *count += 1);
    }
}

/// The three editors of a playground. Widgets are torn down when the deck is
/// dropped.
pub struct EditorDeck<P: WidgetProvider> {
    provider: P,
    theme: ThemeStore,
    slots: [EditorSlot<P::Widget>; 3],
}

impl<P: WidgetProvider> EditorDeck<P> {
    pub fn new(provider: P, theme: ThemeStore) -> (Self, mpsc::UnboundedReceiver<FragmentChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let slots = Fragment::ALL.map(|fragment| EditorSlot::new(fragment, tx.clone()));
        (
            Self {
                provider,
                theme,
                slots,
            },
            rx,
        )
    }

    pub fn slot(&self, fragment: Fragment) -> &EditorSlot<P::Widget> {
        let index = Fragment::ALL
            .iter()
            .position(|f| *f == fragment)
            .unwrap_or_default();
        &self.slots[index]
    }

    /// Load every editor with its fragment's text.
    pub async fn load(&self, sources: &SourceSet) -> Result<(), EditorError> {
        let theme = self.theme.current();
        for slot in &self.slots {
            slot.load(&self.provider, sources.get(slot.fragment()), theme)
                .await?;
        }
        Ok(())
    }

    /// Push `sources` into every ready widget.
    pub fn set_sources(&self, sources: &SourceSet) {
        for slot in &self.slots {
            slot.set_value(sources.get(slot.fragment()));
        }
    }

    /// Re-apply the store's current theme to every widget.
    pub fn sync_theme(&self) {
        let theme = self.theme.current();
        for slot in &self.slots {
            slot.apply_theme(theme);
        }
    }

    pub fn teardown(&self) {
        for slot in &self.slots {
            slot.teardown();
        }
    }
}

impl<P: WidgetProvider> Drop for EditorDeck<P> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::Notify;

    #[derive(Default)]
    struct Shared {
        text: String,
        theme: String,
        disposed: usize,
        callback: Option<ChangeCallback>,
    }

    struct FakeWidget(Arc<Mutex<Shared>>);

    impl FakeWidget {
        fn shared(&self) -> MutexGuard<'_, Shared> {
            self.0.lock().unwrap()
        }
    }

    impl EditorWidget for FakeWidget {
        fn value(&self) -> String {
            self.shared().text.clone()
        }

        fn set_value(&mut self, text: &str) {
            self.shared().text = text.to_string();
        }

        fn set_theme(&mut self, theme: &str) {
            self.shared().theme = theme.to_string();
        }

        fn on_change(&mut self, callback: ChangeCallback) {
            self.shared().callback = Some(callback);
        }

        fn dispose(&mut self) {
            self.shared().disposed += 1;
        }
    }

    #[derive(Default)]
    struct FakeProvider {
        created: AtomicUsize,
        widgets: Mutex<Vec<Arc<Mutex<Shared>>>>,
        gate: Option<Arc<Notify>>,
        fail: bool,
    }

    impl FakeProvider {
        /// Simulate the user typing into the `index`-th created widget
        fn edit(&self, index: usize, text: &str) {
            let widgets = self.widgets.lock().unwrap();
            let mut shared = widgets[index].lock().unwrap();
            shared.text = text.to_string();
            if let Some(callback) = &shared.callback {
                callback(text.to_string());
            }
        }

        fn shared(&self, index: usize) -> Arc<Mutex<Shared>> {
            Arc::clone(&self.widgets.lock().unwrap()[index])
        }
    }

    #[async_trait]
    impl WidgetProvider for FakeProvider {
        type Widget = FakeWidget;

        async fn create(&self, options: WidgetOptions) -> anyhow::Result<FakeWidget> {
            self.created.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                anyhow::bail!("widget bundle unavailable");
            }
            let shared = Arc::new(Mutex::new(Shared {
                text: options.value,
                theme: options.theme.to_string(),
                ..Default::default()
            }));
            self.widgets.lock().unwrap().push(Arc::clone(&shared));
            Ok(FakeWidget(shared))
        }
    }

    #[tokio::test]
    async fn test_load_is_idempotent() {
        let provider = FakeProvider::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let slot = EditorSlot::new(Fragment::Markup, tx);

        assert_eq!(slot.status(), SlotStatus::Unloaded);
        assert_eq!(slot.load(&provider, "<p>", Theme::Light).await.unwrap(), SlotStatus::Ready);
        assert_eq!(slot.load(&provider, "<p>", Theme::Light).await.unwrap(), SlotStatus::Ready);
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);
        assert_eq!(slot.value().as_deref(), Some("<p>"));
        slot.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_changes_flow_once_ready() {
        let provider = FakeProvider::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let slot = EditorSlot::new(Fragment::Style, tx);
        slot.load(&provider, "", Theme::Dark).await.unwrap();

        provider.edit(0, "p { color: red }");
        assert_eq!(
            rx.recv().await.unwrap(),
            FragmentChange {
                fragment: Fragment::Style,
                text: "p { color: red }".to_string(),
            }
        );
        assert_eq!(provider.shared(0).lock().unwrap().theme, "darkTheme");
    }

    #[tokio::test]
    async fn test_teardown_during_load_releases_late_widget() {
        let gate = Arc::new(Notify::new());
        let provider = FakeProvider {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let slot = EditorSlot::new(Fragment::Script, tx);

        let interfere = async {
            tokio::task::yield_now().await;
            assert_eq!(slot.status(), SlotStatus::Loading);
            assert_eq!(slot.load(&provider, "", Theme::Light).await.unwrap(), SlotStatus::Loading);
            slot.teardown();
            gate.notify_one();
        };
        let (loaded, ()) = tokio::join!(slot.load(&provider, "js", Theme::Light), interfere);

        assert_eq!(loaded.unwrap(), SlotStatus::Unloaded);
        assert_eq!(slot.status(), SlotStatus::Unloaded);
        assert_eq!(provider.created.load(Ordering::SeqCst), 1);
        assert_eq!(provider.shared(0).lock().unwrap().disposed, 1);
        assert!(slot.value().is_none());
    }

    #[tokio::test]
    async fn test_teardown_ends_ready_wait() {
        let provider = FakeProvider::default();
        let (tx, _rx) = mpsc::unbounded_channel();
        let slot = EditorSlot::new(Fragment::Style, tx);

        let teardown = async {
            tokio::task::yield_now().await;
            slot.teardown();
        };
        let (waited, ()) = tokio::join!(slot.ready(), teardown);
        assert!(matches!(waited, Err(EditorError::TornDown(Fragment::Style))));

        // A later load satisfies a fresh wait as usual
        slot.load(&provider, "", Theme::Light).await.unwrap();
        slot.ready().await.unwrap();
    }

    #[tokio::test]
    async fn test_teardown_during_load_ends_ready_wait() {
        let gate = Arc::new(Notify::new());
        let provider = FakeProvider {
            gate: Some(Arc::clone(&gate)),
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let slot = EditorSlot::new(Fragment::Markup, tx);

        let interfere = async {
            tokio::task::yield_now().await;
            slot.teardown();
            gate.notify_one();
        };
        let (loaded, waited, ()) = tokio::join!(
            slot.load(&provider, "<p>", Theme::Light),
            slot.ready(),
            interfere
        );
        assert_eq!(loaded.unwrap(), SlotStatus::Unloaded);
        assert!(matches!(waited, Err(EditorError::TornDown(Fragment::Markup))));
    }

    #[tokio::test]
    async fn test_failed_load_can_retry() {
        let provider = FakeProvider {
            fail: true,
            ..Default::default()
        };
        let (tx, _rx) = mpsc::unbounded_channel();
        let slot = EditorSlot::new(Fragment::Markup, tx);

        let err = slot.load(&provider, "", Theme::Light).await.unwrap_err();
        assert!(matches!(err, EditorError::Load { fragment: Fragment::Markup, .. }));
        assert_eq!(slot.status(), SlotStatus::Unloaded);
    }

    #[tokio::test]
    async fn test_deck_applies_theme_and_releases_on_drop() {
        let provider = FakeProvider::default();
        let theme = ThemeStore::default();
        let (deck, _rx) = EditorDeck::new(provider, theme.clone());
        deck.load(&SourceSet::defaults()).await.unwrap();

        let script = deck.slot(Fragment::Script);
        assert_eq!(script.value().as_deref(), Some(SourceSet::defaults().script.as_str()));

        theme.toggle();
        deck.sync_theme();
        let widgets: Vec<_> = (0..3).map(|i| deck.provider.shared(i)).collect();
        assert!(widgets.iter().all(|w| w.lock().unwrap().theme == "darkTheme"));

        deck.set_sources(&SourceSet::new("", "", ""));
        assert_eq!(deck.slot(Fragment::Markup).value().as_deref(), Some(""));

        drop(deck);
        assert!(widgets.iter().all(|w| w.lock().unwrap().disposed == 1));
    }
}

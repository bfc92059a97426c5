//! Light/dark theme shared by the editors and the host UI.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }

    /// Theme id registered with the editor widgets
    pub fn editor_theme(self) -> &'static str {
        match self {
            Theme::Light => "lightTheme",
            Theme::Dark => "darkTheme",
        }
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Theme::Light => "light",
            Theme::Dark => "dark",
        })
    }
}

/// Current theme plus change notification. Clones share the same value.
#[derive(Debug, Clone)]
pub struct ThemeStore {
    tx: watch::Sender<Theme>,
}

impl ThemeStore {
    pub fn new(initial: Theme) -> Self {
        let (tx, _) = watch::channel(initial);
        Self { tx }
    }

    pub fn current(&self) -> Theme {
        *self.tx.borrow()
    }

    pub fn set(&self, theme: Theme) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == theme {
                return false;
            }
            *current = theme;
            true
        });
        if changed {
            tracing::debug!(%theme, "theme changed");
        }
    }

    /// Flip between light and dark, returning the new theme.
    pub fn toggle(&self) -> Theme {
        let next = self.current().toggled();
        self.set(next);
        next
    }

    pub fn subscribe(&self) -> watch::Receiver<Theme> {
        self.tx.subscribe()
    }
}

impl Default for ThemeStore {
    fn default() -> Self {
        Self::new(Theme::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_round_trips() {
        let store = ThemeStore::default();
        assert_eq!(store.current(), Theme::Light);
        assert_eq!(store.toggle(), Theme::Dark);
        assert_eq!(store.current().editor_theme(), "darkTheme");
        assert_eq!(store.toggle(), Theme::Light);
    }

    #[test]
    fn test_clones_share_value() {
        let store = ThemeStore::new(Theme::Dark);
        let other = store.clone();
        other.set(Theme::Light);
        assert_eq!(store.current(), Theme::Light);
    }

    #[tokio::test]
    async fn test_subscribers_see_changes_only() {
        let store = ThemeStore::default();
        let mut rx = store.subscribe();

        store.set(Theme::Light);
        assert!(!rx.has_changed().unwrap());

        store.set(Theme::Dark);
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), Theme::Dark);
    }
}

use crate::config::ViewerConfig;
use crate::features::viewer::ViewerSession;
use crate::i18n::DEFAULT_LOCALE;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Screen {
    Viewer,
    DocumentProperties,
    JumpToPage,
}

pub struct AppState {
    pub locale: String,
    pub session: ViewerSession,
    pub nav_stack: Vec<Screen>,
    pub last_error: Option<String>,
    /// Major release of the host WebView, once reported.
    pub webview_release: Option<u32>,
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

impl AppState {
    pub fn new() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            session: ViewerSession::new(ViewerConfig::default()),
            nav_stack: Vec::new(),
            last_error: None,
            webview_release: None,
        }
    }

    pub fn config(&self) -> &ViewerConfig {
        self.session.config()
    }

    pub fn ensure_navigation(&mut self) {
        if self.nav_stack.is_empty() {
            self.nav_stack.push(Screen::Viewer);
        }
    }

    pub fn current_screen(&self) -> Screen {
        self.nav_stack.last().copied().unwrap_or(Screen::Viewer)
    }

    pub fn nav_depth(&self) -> usize {
        self.nav_stack.len().max(1)
    }

    /// Dialogs stack over the viewer; opening one replaces any other dialog.
    pub fn push_screen(&mut self, screen: Screen) {
        self.ensure_navigation();
        if self.current_screen() == screen {
            return;
        }
        if self.current_screen() != Screen::Viewer {
            self.nav_stack.pop();
        }
        self.nav_stack.push(screen);
    }

    pub fn pop_screen(&mut self) {
        self.ensure_navigation();
        if self.nav_stack.len() > 1 {
            self.nav_stack.pop();
        }
    }

    pub fn reset_navigation(&mut self) {
        self.nav_stack.clear();
        self.nav_stack.push(Screen::Viewer);
    }

    pub fn reset_runtime(&mut self) {
        self.session.reset();
        self.last_error = None;
        self.webview_release = None;
    }

    /// Release to report when the WebView is too old to host the viewer.
    pub fn outdated_webview_release(&self) -> Option<u32> {
        self.webview_release.filter(|_| !self.webview_supported())
    }

    pub fn webview_supported(&self) -> bool {
        self.webview_release.map_or(true, |release| {
            crate::features::webview::is_supported(release, self.config().min_webview_release)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dialogs_replace_each_other_and_back_never_empties_stack() {
        let mut state = AppState::new();
        state.pop_screen();
        assert_eq!(state.nav_depth(), 1);
        assert_eq!(state.current_screen(), Screen::Viewer);

        state.push_screen(Screen::JumpToPage);
        state.push_screen(Screen::DocumentProperties);
        state.push_screen(Screen::DocumentProperties);
        assert_eq!(state.nav_stack, vec![Screen::Viewer, Screen::DocumentProperties]);

        state.pop_screen();
        state.pop_screen();
        assert_eq!(state.current_screen(), Screen::Viewer);
    }

    #[test]
    fn unknown_webview_release_counts_as_supported() {
        let mut state = AppState::new();
        assert!(state.webview_supported());
        state.webview_release = Some(88);
        assert!(!state.webview_supported());
        assert_eq!(state.outdated_webview_release(), Some(88));
        state.webview_release = Some(120);
        assert!(state.webview_supported());
    }

    #[test]
    fn reset_keeps_stale_extraction_out_of_next_document() {
        let mut state = AppState::new();
        state.session.load_document("old.pdf", 1);
        let stale = state.session.accept_properties("{}").unwrap();

        state.reset_runtime();
        state.session.load_document("new.pdf", 2);
        assert!(state.session.generation() > stale.generation);
        assert!(!state.session.apply_properties(stale.generation, Vec::new()));
        assert!(state.session.properties().is_none());
    }
}

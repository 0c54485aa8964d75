use rust_i18n::t;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;

use crate::config::ViewerConfig;
use crate::features::password::{
    DismissRequest, DocumentLoader, PasswordPromptState, PasswordStatus, PasswordUnlockController,
    StatusChannel, SubmitTrigger, Subscription, UnlockPhase,
};
use crate::features::properties::DisplayEntry;
use crate::features::webview::VIEWER_URL;
use crate::ui::{
    to_value, Button as UiButton, Column as UiColumn, Dialog as UiDialog,
    NumberPicker as UiNumberPicker, Text as UiText,
};

/// Work the host has to carry out after a dispatch, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum HostEffect {
    LoadUrl { url: String },
    EvaluateJavascript { script: String },
    ShowPageNumber { text: String, padding: u32 },
    InvalidateOptionsMenu,
    DismissPasswordPrompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Unloaded,
    Loaded,
    MenuShown,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ViewerError {
    #[error("document properties were already delivered")]
    PropertiesAlreadySet,
    #[error("no document loaded")]
    NoDocument,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MenuState {
    pub navigation_visible: bool,
    pub next_enabled: bool,
    pub previous_enabled: bool,
}

/// Everything the background extraction needs, detached from the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertiesRequest {
    pub generation: u64,
    pub raw: String,
    pub file_name: String,
    pub file_size: u64,
    pub page_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PropertiesSlot {
    Empty,
    Pending,
    Ready(Vec<DisplayEntry>),
}

pub struct ViewerSession {
    pub page: u32,
    pub num_pages: u32,
    pub zoom_ratio: f32,
    pub orientation_degrees: i32,
    pub document_state: DocumentState,
    pub file_name: Option<String>,
    pub file_size: u64,
    generation: u64,
    password: Option<String>,
    properties: PropertiesSlot,
    status: StatusChannel,
    controller: Arc<Mutex<PasswordUnlockController>>,
    prompt_subscription: Option<Subscription>,
    effects: Vec<HostEffect>,
    config: ViewerConfig,
}

impl ViewerSession {
    pub fn new(config: ViewerConfig) -> Self {
        Self {
            page: 1,
            num_pages: 0,
            zoom_ratio: 1.0,
            orientation_degrees: 0,
            document_state: DocumentState::Unloaded,
            file_name: None,
            file_size: 0,
            generation: 0,
            password: None,
            properties: PropertiesSlot::Empty,
            status: StatusChannel::new(),
            controller: Arc::new(Mutex::new(PasswordUnlockController::new())),
            prompt_subscription: None,
            effects: Vec::new(),
            config,
        }
    }

    pub fn set_config(&mut self, config: ViewerConfig) {
        self.zoom_ratio = self
            .zoom_ratio
            .clamp(config.min_zoom_ratio, config.max_zoom_ratio);
        self.config = config;
    }

    /// Fresh session with the same config. The generation keeps counting so
    /// extractions started before the reset stay stale.
    pub fn reset(&mut self) {
        let generation = self.generation;
        *self = Self::new(self.config.clone());
        self.generation = generation;
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn take_effects(&mut self) -> Vec<HostEffect> {
        std::mem::take(&mut self.effects)
    }

    fn controller(&self) -> MutexGuard<'_, PasswordUnlockController> {
        self.controller.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn load_document(&mut self, file_name: &str, file_size: u64) {
        self.close_password_prompt();
        self.controller().reset();
        self.page = 1;
        self.num_pages = 0;
        self.document_state = DocumentState::Unloaded;
        self.password = None;
        self.properties = PropertiesSlot::Empty;
        self.file_name = Some(file_name.to_string());
        self.file_size = file_size;
        self.generation += 1;
        log::info!("loading {file_name} ({file_size} bytes), generation {}", self.generation);
        self.effects.push(HostEffect::InvalidateOptionsMenu);
        self.effects.push(HostEffect::LoadUrl {
            url: VIEWER_URL.to_string(),
        });
    }

    pub fn on_page_finished(&mut self) {
        self.document_state = DocumentState::Loaded;
        self.effects.push(HostEffect::InvalidateOptionsMenu);
        self.request_document_load();
    }

    fn request_document_load(&mut self) {
        self.effects.push(HostEffect::EvaluateJavascript {
            script: "loadDocument()".to_string(),
        });
    }

    pub fn set_num_pages(&mut self, num_pages: u32) {
        self.num_pages = num_pages;
        self.effects.push(HostEffect::InvalidateOptionsMenu);
    }

    /// Password handed to the engine when it asks; empty when none was entered.
    pub fn password(&self) -> &str {
        self.password.as_deref().unwrap_or("")
    }

    /// Accept the engine's property blob once per document.
    pub fn accept_properties(&mut self, raw: &str) -> Result<PropertiesRequest, ViewerError> {
        if self.properties != PropertiesSlot::Empty {
            return Err(ViewerError::PropertiesAlreadySet);
        }
        let file_name = self.file_name.clone().ok_or(ViewerError::NoDocument)?;
        self.properties = PropertiesSlot::Pending;
        Ok(PropertiesRequest {
            generation: self.generation,
            raw: raw.to_string(),
            file_name,
            file_size: self.file_size,
            page_count: self.num_pages,
        })
    }

    /// Store extraction output unless the document changed meanwhile.
    pub fn apply_properties(&mut self, generation: u64, entries: Vec<DisplayEntry>) -> bool {
        if generation != self.generation {
            log::debug!(
                "discarding properties of generation {generation}, current is {}",
                self.generation
            );
            return false;
        }
        self.properties = PropertiesSlot::Ready(entries);
        true
    }

    pub fn properties_pending(&self) -> bool {
        self.properties == PropertiesSlot::Pending
    }

    /// `None` while extraction has not completed.
    pub fn properties(&self) -> Option<&[DisplayEntry]> {
        match &self.properties {
            PropertiesSlot::Ready(entries) => Some(entries),
            _ => None,
        }
    }

    fn render_page(&mut self, zoom: u8) {
        self.effects.push(HostEffect::EvaluateJavascript {
            script: format!("onRenderPage({zoom})"),
        });
    }

    pub fn jump_to_page(&mut self, page: u32) -> bool {
        if page < 1 || page > self.num_pages || page == self.page {
            return false;
        }
        self.page = page;
        self.render_page(0);
        self.effects.push(HostEffect::ShowPageNumber {
            text: t!("viewer.page_number", page = self.page, total = self.num_pages).into_owned(),
            padding: self.config.toast_padding,
        });
        self.effects.push(HostEffect::InvalidateOptionsMenu);
        true
    }

    pub fn next_page(&mut self) -> bool {
        self.jump_to_page(self.page.saturating_add(1))
    }

    pub fn previous_page(&mut self) -> bool {
        self.jump_to_page(self.page.saturating_sub(1))
    }

    pub fn first_page(&mut self) -> bool {
        self.jump_to_page(1)
    }

    pub fn last_page(&mut self) -> bool {
        self.jump_to_page(self.num_pages)
    }

    pub fn rotate(&mut self, degrees: i32) {
        self.orientation_degrees = (self.orientation_degrees + degrees).rem_euclid(360);
        self.render_page(0);
    }

    pub fn zoom_in(&mut self, delta: f32, end: bool) {
        if self.zoom_ratio < self.config.max_zoom_ratio {
            self.zoom_ratio = (self.zoom_ratio + delta).min(self.config.max_zoom_ratio);
            self.render_page(if end { 1 } else { 2 });
            self.effects.push(HostEffect::InvalidateOptionsMenu);
        }
    }

    pub fn zoom_out(&mut self, delta: f32, end: bool) {
        if self.zoom_ratio > self.config.min_zoom_ratio {
            self.zoom_ratio = (self.zoom_ratio - delta).max(self.config.min_zoom_ratio);
            self.render_page(if end { 1 } else { 2 });
            self.effects.push(HostEffect::InvalidateOptionsMenu);
        }
    }

    pub fn zoom_end(&mut self) {
        self.render_page(1);
    }

    /// Menu visibility follows the document state; the first call after a load reveals it.
    pub fn prepare_menu(&mut self) -> MenuState {
        if self.document_state == DocumentState::Loaded {
            self.document_state = DocumentState::MenuShown;
        }
        MenuState {
            navigation_visible: self.document_state != DocumentState::Unloaded,
            next_enabled: self.page < self.num_pages,
            previous_enabled: self.page > 1,
        }
    }

    // Engine channel.

    pub fn show_password_prompt(&mut self) {
        if self.prompt_subscription.is_none() {
            let controller = Arc::clone(&self.controller);
            self.prompt_subscription = Some(self.status.subscribe(move |status| {
                controller
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .on_status_changed(status);
            }));
        }
        self.status.password_missing();
    }

    pub fn invalid_password(&mut self) {
        self.status.invalid();
    }

    pub fn on_loaded(&mut self) {
        self.status.validated();
        if self.close_password_prompt() {
            self.effects.push(HostEffect::DismissPasswordPrompt);
        }
    }

    pub fn publish_status(&mut self, status: PasswordStatus) {
        match status {
            PasswordStatus::MissingPassword => self.show_password_prompt(),
            PasswordStatus::InvalidPassword => self.invalid_password(),
            PasswordStatus::Validated => self.on_loaded(),
        }
    }

    fn close_password_prompt(&mut self) -> bool {
        let was_shown = self.prompt_subscription.take().is_some();
        if was_shown {
            self.controller().dismiss();
        }
        was_shown
    }

    // Prompt input.

    pub fn password_text_changed(&mut self, text: &str) {
        self.controller().on_text_changed(text);
    }

    pub fn submit_password(&mut self, trigger: SubmitTrigger) -> bool {
        let controller = Arc::clone(&self.controller);
        let mut guard = controller.lock().unwrap_or_else(PoisonError::into_inner);
        guard.on_submit(self, trigger)
    }

    pub fn request_prompt_dismiss(&mut self, request: DismissRequest) -> bool {
        let dismissed = self.controller().request_dismiss(request);
        if dismissed {
            self.prompt_subscription = None;
        }
        dismissed
    }

    pub fn prompt_state(&self) -> Option<(PasswordPromptState, bool)> {
        if self.prompt_subscription.is_none() {
            return None;
        }
        let controller = self.controller();
        let state = controller
            .prompt()
            .map(|prompt| (prompt.clone(), controller.is_cancelable()));
        state
    }

    pub fn unlock_phase(&self) -> UnlockPhase {
        self.controller().phase()
    }
}

impl DocumentLoader for ViewerSession {
    fn load_with_password(&mut self, password: &str) {
        self.password = Some(password.to_string());
        self.request_document_load();
    }
}

pub fn render_viewer_screen(
    session: &ViewerSession,
    menu: &MenuState,
    outdated_webview_release: Option<u32>,
) -> Value {
    let mut children = Vec::new();

    if let Some(release) = outdated_webview_release {
        let message = t!(
            "viewer.webview_out_of_date",
            current = release,
            minimum = session.config.min_webview_release
        );
        children.push(to_value(UiText::new(&message).size(16.0).content_description("webview_out_of_date")));
        return to_value(UiColumn::new(children).padding(24));
    }

    let Some(file_name) = session.file_name.as_deref() else {
        let hint = t!("viewer.open_document");
        children.push(to_value(UiText::new(&hint).size(16.0)));
        return to_value(UiColumn::new(children).padding(24));
    };

    children.push(to_value(UiText::new(file_name).size(18.0).content_description("file_name")));

    if menu.navigation_visible {
        let position = t!("viewer.page_number", page = session.page, total = session.num_pages);
        let jump = t!("viewer.jump_to_page");
        let properties = t!("viewer.properties");
        children.push(to_value(UiText::new(&position).size(14.0).content_description("page_position")));
        children.push(to_value(UiButton::new("◀", "previous_page").enabled(menu.previous_enabled)));
        children.push(to_value(UiButton::new("▶", "next_page").enabled(menu.next_enabled)));
        children.push(to_value(UiButton::new("⏮", "first_page")));
        children.push(to_value(UiButton::new("⏭", "last_page")));
        children.push(to_value(UiButton::new("⟳", "rotate_clockwise")));
        children.push(to_value(UiButton::new("⟲", "rotate_counterclockwise")));
        children.push(to_value(UiButton::new(&jump, "jump_to_page_screen")));
        children.push(to_value(UiButton::new(&properties, "document_properties_screen")));
    }

    to_value(UiColumn::new(children).padding(0))
}

pub fn render_jump_dialog(session: &ViewerSession) -> Value {
    let title = t!("jump.title");
    let ok = t!("jump.ok");
    let cancel = t!("jump.cancel");
    let picker = UiNumberPicker::new("page", 1, session.num_pages.max(1)).value(session.page);
    to_value(
        UiDialog::new(vec![to_value(picker)])
            .id("jump_to_page")
            .title(&title)
            .positive(UiButton::new(&ok, "jump_to_page"))
            .negative(UiButton::new(&cancel, "back")),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(pages: u32) -> ViewerSession {
        let mut session = ViewerSession::new(ViewerConfig::default());
        session.load_document("book.pdf", 1234);
        session.on_page_finished();
        session.set_num_pages(pages);
        session.take_effects();
        session
    }

    fn scripts(effects: &[HostEffect]) -> Vec<&str> {
        effects
            .iter()
            .filter_map(|e| match e {
                HostEffect::EvaluateJavascript { script } => Some(script.as_str()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn load_resets_page_and_points_webview_at_viewer() {
        let mut session = loaded(10);
        session.jump_to_page(4);
        session.load_document("other.pdf", 99);
        assert_eq!(session.page, 1);
        assert_eq!(session.generation(), 2);
        assert!(session
            .take_effects()
            .contains(&HostEffect::LoadUrl { url: VIEWER_URL.into() }));
    }

    #[test]
    fn jump_is_bounded_and_announces_position() {
        let mut session = loaded(5);
        assert!(!session.jump_to_page(0));
        assert!(!session.jump_to_page(6));
        assert!(!session.jump_to_page(1));
        assert!(session.jump_to_page(3));
        let effects = session.take_effects();
        assert_eq!(scripts(&effects), vec!["onRenderPage(0)"]);
        assert!(effects.contains(&HostEffect::ShowPageNumber {
            text: "3/5".into(),
            padding: 10
        }));
    }

    #[test]
    fn relative_navigation_stops_at_edges() {
        let mut session = loaded(3);
        assert!(!session.previous_page());
        assert!(session.last_page());
        assert_eq!(session.page, 3);
        assert!(!session.next_page());
        assert!(session.previous_page());
        assert!(session.first_page());
        assert_eq!(session.page, 1);
    }

    #[test]
    fn rotation_wraps_to_non_negative_degrees() {
        let mut session = loaded(1);
        session.rotate(-90);
        assert_eq!(session.orientation_degrees, 270);
        session.rotate(90);
        session.rotate(90);
        assert_eq!(session.orientation_degrees, 90);
    }

    #[test]
    fn zoom_is_clamped_and_renders_by_phase() {
        let mut session = loaded(1);
        session.zoom_in(0.4, false);
        session.zoom_in(0.4, true);
        assert_eq!(session.zoom_ratio, 1.5);
        session.zoom_in(0.1, false);
        assert_eq!(
            scripts(&session.take_effects()),
            vec!["onRenderPage(2)", "onRenderPage(1)"]
        );
        session.zoom_out(5.0, false);
        assert_eq!(session.zoom_ratio, 0.5);
        session.zoom_end();
        assert_eq!(
            scripts(&session.take_effects()),
            vec!["onRenderPage(2)", "onRenderPage(1)"]
        );
    }

    #[test]
    fn menu_hidden_until_page_finished() {
        let mut session = ViewerSession::new(ViewerConfig::default());
        session.load_document("a.pdf", 1);
        assert!(!session.prepare_menu().navigation_visible);
        session.on_page_finished();
        session.set_num_pages(2);
        let menu = session.prepare_menu();
        assert!(menu.navigation_visible);
        assert!(menu.next_enabled);
        assert!(!menu.previous_enabled);
        assert_eq!(session.document_state, DocumentState::MenuShown);
    }

    #[test]
    fn properties_accepted_once_per_generation() {
        let mut session = loaded(2);
        let request = session.accept_properties("{}").unwrap();
        assert_eq!(request.page_count, 2);
        assert_eq!(request.file_name, "book.pdf");
        assert_eq!(
            session.accept_properties("{}"),
            Err(ViewerError::PropertiesAlreadySet)
        );
        assert!(session.properties().is_none());

        session.load_document("next.pdf", 1);
        assert!(!session.apply_properties(request.generation, Vec::new()));
        assert!(session.properties().is_none());
    }

    #[test]
    fn password_round_trip_through_channel() {
        let mut session = loaded(1);
        session.show_password_prompt();
        assert_eq!(session.unlock_phase(), UnlockPhase::AwaitingInput);
        assert!(session.prompt_state().is_some());

        session.password_text_changed("pw");
        assert!(session.submit_password(SubmitTrigger::ImeDone));
        assert_eq!(session.password(), "pw");
        assert_eq!(scripts(&session.take_effects()), vec!["loadDocument()"]);

        session.invalid_password();
        let (prompt, cancelable) = session.prompt_state().unwrap();
        assert_eq!(prompt.error.as_deref(), Some("invalid password"));
        assert!(!cancelable);

        session.on_loaded();
        assert_eq!(session.unlock_phase(), UnlockPhase::Unlocked);
        assert!(session.prompt_state().is_none());
        assert!(session
            .take_effects()
            .contains(&HostEffect::DismissPasswordPrompt));
    }

    #[test]
    fn cancel_unsubscribes_the_prompt() {
        let mut session = loaded(1);
        session.show_password_prompt();
        assert!(!session.request_prompt_dismiss(DismissRequest::BackGesture));
        assert!(session.prompt_state().is_some());
        assert!(session.request_prompt_dismiss(DismissRequest::CancelButton));
        assert!(session.prompt_state().is_none());
        session.invalid_password();
        assert_eq!(session.unlock_phase(), UnlockPhase::Idle);
    }
}

//! Password prompt for encrypted documents.
//!
//! The engine reports validation outcomes on a [`StatusChannel`]; the prompt
//! subscribes while it is shown and routes every status through
//! [`PasswordUnlockController::on_status_changed`]. Dropping the returned
//! [`Subscription`] unregisters the callback.

use rust_i18n::t;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError, Weak};
use thiserror::Error;

use crate::ui::{
    to_value, Button as UiButton, Dialog as UiDialog, Text as UiText, TextInput as UiTextInput,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PasswordStatus {
    MissingPassword,
    InvalidPassword,
    Validated,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown password status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PasswordStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "missing_password" => Ok(Self::MissingPassword),
            "invalid_password" => Ok(Self::InvalidPassword),
            "validated" => Ok(Self::Validated),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

type StatusCallback = Box<dyn FnMut(PasswordStatus) + Send>;

#[derive(Default)]
struct Observers {
    next_id: u64,
    callbacks: Vec<(u64, StatusCallback)>,
    current: Option<PasswordStatus>,
}

/// Observable password status, owned by the viewer session.
#[derive(Clone, Default)]
pub struct StatusChannel {
    inner: Arc<Mutex<Observers>>,
}

impl StatusChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn observers(&self) -> std::sync::MutexGuard<'_, Observers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe(&self, callback: impl FnMut(PasswordStatus) + Send + 'static) -> Subscription {
        let mut observers = self.observers();
        let id = observers.next_id;
        observers.next_id += 1;
        observers.callbacks.push((id, Box::new(callback)));
        Subscription {
            id,
            channel: Arc::downgrade(&self.inner),
        }
    }

    /// Store `status` and deliver it to every subscriber in registration order.
    /// Callbacks run under the channel lock and must not publish or subscribe.
    pub fn publish(&self, status: PasswordStatus) {
        let mut observers = self.observers();
        observers.current = Some(status);
        for (_, callback) in observers.callbacks.iter_mut() {
            callback(status);
        }
    }

    pub fn password_missing(&self) {
        self.publish(PasswordStatus::MissingPassword);
    }

    pub fn invalid(&self) {
        self.publish(PasswordStatus::InvalidPassword);
    }

    pub fn validated(&self) {
        self.publish(PasswordStatus::Validated);
    }

    pub fn current(&self) -> Option<PasswordStatus> {
        self.observers().current
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers().callbacks.len()
    }
}

/// Registration handle; the callback stays registered for as long as this lives.
pub struct Subscription {
    id: u64,
    channel: Weak<Mutex<Observers>>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.channel.upgrade() {
            let mut observers = inner.lock().unwrap_or_else(PoisonError::into_inner);
            observers.callbacks.retain(|(id, _)| *id != self.id);
        }
    }
}

/// Receives the candidate password. Results come back later on the status channel.
pub trait DocumentLoader {
    fn load_with_password(&mut self, password: &str);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnlockPhase {
    Idle,
    AwaitingInput,
    Submitting,
    Unlocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    ConfirmButton,
    ImeDone,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissRequest {
    CancelButton,
    BackGesture,
    OutsideTouch,
}

impl FromStr for DismissRequest {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cancel" => Ok(Self::CancelButton),
            "back" => Ok(Self::BackGesture),
            "outside_touch" => Ok(Self::OutsideTouch),
            other => Err(format!("unknown_dismiss_reason:{other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PasswordPromptState {
    pub candidate: String,
    pub confirm_enabled: bool,
    pub error: Option<String>,
    pub description: String,
    pub focus_requested: bool,
}

impl PasswordPromptState {
    fn new() -> Self {
        Self {
            candidate: String::new(),
            confirm_enabled: false,
            error: None,
            description: t!("password.description").into_owned(),
            focus_requested: true,
        }
    }

    fn clear_candidate(&mut self) {
        self.candidate.clear();
        self.confirm_enabled = false;
        self.focus_requested = true;
    }
}

#[derive(Debug, Clone)]
pub struct PasswordUnlockController {
    phase: UnlockPhase,
    prompt: Option<PasswordPromptState>,
    in_flight: Option<String>,
}

impl Default for PasswordUnlockController {
    fn default() -> Self {
        Self::new()
    }
}

impl PasswordUnlockController {
    pub const fn new() -> Self {
        Self {
            phase: UnlockPhase::Idle,
            prompt: None,
            in_flight: None,
        }
    }

    pub fn phase(&self) -> UnlockPhase {
        self.phase
    }

    pub fn prompt(&self) -> Option<&PasswordPromptState> {
        self.prompt.as_ref()
    }

    /// The prompt ignores back gestures and outside touches.
    pub const fn is_cancelable(&self) -> bool {
        false
    }

    pub fn on_status_changed(&mut self, status: PasswordStatus) {
        match status {
            PasswordStatus::MissingPassword => {
                let prompt = self.prompt.get_or_insert_with(PasswordPromptState::new);
                prompt.clear_candidate();
                prompt.description = t!("password.description").into_owned();
                prompt.error = None;
                self.in_flight = None;
                self.phase = UnlockPhase::AwaitingInput;
            }
            PasswordStatus::InvalidPassword => {
                let prompt = self.prompt.get_or_insert_with(PasswordPromptState::new);
                prompt.clear_candidate();
                prompt.error = Some(t!("password.invalid").into_owned());
                self.in_flight = None;
                self.phase = UnlockPhase::AwaitingInput;
            }
            PasswordStatus::Validated => {
                // The session dismisses the prompt.
                self.in_flight = None;
                self.phase = UnlockPhase::Unlocked;
            }
        }
    }

    pub fn on_text_changed(&mut self, candidate: &str) {
        if self.phase == UnlockPhase::Unlocked {
            return;
        }
        let Some(prompt) = self.prompt.as_mut() else {
            log::debug!("text change without a password prompt");
            return;
        };
        prompt.error = None;
        prompt.candidate = candidate.to_string();
        prompt.confirm_enabled = !prompt.candidate.is_empty();
        prompt.focus_requested = false;
    }

    /// Forward the candidate to `loader`. Returns whether a request was sent.
    pub fn on_submit(&mut self, loader: &mut dyn DocumentLoader, trigger: SubmitTrigger) -> bool {
        if self.phase == UnlockPhase::Unlocked {
            return false;
        }
        let Some(prompt) = self.prompt.as_ref() else {
            return false;
        };
        if prompt.candidate.is_empty() {
            return false;
        }
        if self.phase == UnlockPhase::Submitting
            && self.in_flight.as_deref() == Some(prompt.candidate.as_str())
        {
            log::debug!("{trigger:?} ignored, same password already submitted");
            return false;
        }
        let candidate = prompt.candidate.clone();
        loader.load_with_password(&candidate);
        self.in_flight = Some(candidate);
        self.phase = UnlockPhase::Submitting;
        true
    }

    /// Apply the dismissal policy. Only the cancel button closes the prompt.
    pub fn request_dismiss(&mut self, request: DismissRequest) -> bool {
        match request {
            DismissRequest::CancelButton => self.cancel(),
            DismissRequest::BackGesture | DismissRequest::OutsideTouch => {
                log::debug!("password prompt kept open on {request:?}");
                false
            }
        }
    }

    pub fn cancel(&mut self) -> bool {
        let was_shown = self.prompt.take().is_some();
        self.in_flight = None;
        if self.phase != UnlockPhase::Unlocked {
            self.phase = UnlockPhase::Idle;
        }
        was_shown
    }

    /// Called by the session once the document opened.
    pub fn dismiss(&mut self) {
        self.prompt = None;
        self.in_flight = None;
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

pub fn render_password_prompt(prompt: &PasswordPromptState, cancelable: bool) -> Value {
    let hint = t!("password.hint");
    let open = t!("password.open");
    let cancel = t!("password.cancel");

    let mut input = UiTextInput::new("password")
        .text(&prompt.candidate)
        .hint(&hint)
        .password(true)
        .single_line(true)
        .ime_action("done")
        .action("password_text_changed")
        .request_focus(prompt.focus_requested);
    if let Some(err) = &prompt.error {
        input = input.error(err);
    }

    let children = vec![
        to_value(UiText::new(&prompt.description).size(14.0)),
        to_value(input),
    ];

    let dialog = UiDialog::new(children)
        .id("password_prompt")
        .cancelable(cancelable)
        .positive(UiButton::new(&open, "password_submit").enabled(prompt.confirm_enabled))
        .negative(UiButton::new(&cancel, "password_cancel"));
    to_value(dialog)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct RecordingLoader {
        sent: Vec<String>,
    }

    impl DocumentLoader for RecordingLoader {
        fn load_with_password(&mut self, password: &str) {
            self.sent.push(password.to_string());
        }
    }

    fn armed() -> PasswordUnlockController {
        let mut controller = PasswordUnlockController::new();
        controller.on_status_changed(PasswordStatus::MissingPassword);
        controller
    }

    #[test]
    fn missing_password_arms_prompt_with_default_description() {
        let controller = armed();
        let prompt = controller.prompt().expect("prompt shown");
        assert_eq!(controller.phase(), UnlockPhase::AwaitingInput);
        assert!(prompt.candidate.is_empty());
        assert!(!prompt.confirm_enabled);
        assert!(prompt.error.is_none());
        assert_eq!(prompt.description, t!("password.description"));
    }

    #[test]
    fn statuses_other_than_validated_clear_the_candidate() {
        for status in [PasswordStatus::MissingPassword, PasswordStatus::InvalidPassword] {
            let mut controller = armed();
            controller.on_text_changed("hunter2");
            controller.on_status_changed(status);
            assert_eq!(controller.prompt().unwrap().candidate, "");
            assert!(!controller.prompt().unwrap().confirm_enabled);
        }
    }

    #[test]
    fn invalid_sets_error_and_missing_clears_it() {
        let mut controller = armed();
        let mut loader = RecordingLoader::default();
        controller.on_text_changed("wrong");
        assert!(controller.on_submit(&mut loader, SubmitTrigger::ConfirmButton));
        assert_eq!(controller.phase(), UnlockPhase::Submitting);

        controller.on_status_changed(PasswordStatus::InvalidPassword);
        let prompt = controller.prompt().unwrap();
        assert_eq!(prompt.error.as_deref(), Some("invalid password"));
        assert!(prompt.focus_requested);
        assert_eq!(controller.phase(), UnlockPhase::AwaitingInput);

        controller.on_status_changed(PasswordStatus::MissingPassword);
        let prompt = controller.prompt().unwrap();
        assert!(prompt.error.is_none());
        assert_eq!(prompt.description, t!("password.description"));
    }

    #[test]
    fn editing_clears_error_and_tracks_confirm_enabled() {
        let mut controller = armed();
        controller.on_status_changed(PasswordStatus::InvalidPassword);
        for (text, enabled) in [("a", true), ("", false), ("abc", true), ("ab", true), ("", false)] {
            controller.on_text_changed(text);
            let prompt = controller.prompt().unwrap();
            assert_eq!(prompt.confirm_enabled, enabled, "after {text:?}");
            assert!(prompt.error.is_none());
        }
    }

    #[test]
    fn empty_candidate_is_never_submitted() {
        let mut controller = armed();
        let mut loader = RecordingLoader::default();
        assert!(!controller.on_submit(&mut loader, SubmitTrigger::ConfirmButton));
        assert!(!controller.on_submit(&mut loader, SubmitTrigger::ImeDone));
        assert!(loader.sent.is_empty());
        assert_eq!(controller.phase(), UnlockPhase::AwaitingInput);
    }

    #[test]
    fn duplicate_submit_while_waiting_is_suppressed() {
        let mut controller = armed();
        let mut loader = RecordingLoader::default();
        controller.on_text_changed("secret");
        assert!(controller.on_submit(&mut loader, SubmitTrigger::ImeDone));
        assert!(!controller.on_submit(&mut loader, SubmitTrigger::ConfirmButton));
        controller.on_text_changed("secret2");
        assert!(controller.on_submit(&mut loader, SubmitTrigger::ConfirmButton));
        assert_eq!(loader.sent, vec!["secret".to_string(), "secret2".to_string()]);
    }

    #[test]
    fn missing_while_submitting_rearms_for_the_same_password() {
        let mut controller = armed();
        let mut loader = RecordingLoader::default();
        controller.on_text_changed("pw");
        assert!(controller.on_submit(&mut loader, SubmitTrigger::ConfirmButton));
        assert_eq!(controller.phase(), UnlockPhase::Submitting);

        controller.on_status_changed(PasswordStatus::MissingPassword);
        assert_eq!(controller.phase(), UnlockPhase::AwaitingInput);
        assert_eq!(controller.prompt().unwrap().candidate, "");

        controller.on_text_changed("pw");
        assert!(controller.on_submit(&mut loader, SubmitTrigger::ImeDone));
        assert_eq!(loader.sent, vec!["pw".to_string(), "pw".to_string()]);
    }

    #[test]
    fn validated_locks_the_prompt_without_touching_it() {
        let mut controller = armed();
        let mut loader = RecordingLoader::default();
        controller.on_text_changed("right");
        controller.on_submit(&mut loader, SubmitTrigger::ConfirmButton);
        controller.on_status_changed(PasswordStatus::Validated);

        assert_eq!(controller.phase(), UnlockPhase::Unlocked);
        assert_eq!(controller.prompt().unwrap().candidate, "right");
        controller.on_text_changed("other");
        assert!(!controller.on_submit(&mut loader, SubmitTrigger::ImeDone));
        assert_eq!(loader.sent.len(), 1);
    }

    #[test]
    fn only_cancel_button_dismisses() {
        let mut controller = armed();
        assert!(!controller.is_cancelable());
        assert!(!controller.request_dismiss(DismissRequest::BackGesture));
        assert!(!controller.request_dismiss(DismissRequest::OutsideTouch));
        assert!(controller.prompt().is_some());
        assert!(controller.request_dismiss(DismissRequest::CancelButton));
        assert!(controller.prompt().is_none());
        assert_eq!(controller.phase(), UnlockPhase::Idle);
    }

    #[test]
    fn subscription_routes_statuses_until_dropped() {
        let channel = StatusChannel::new();
        let controller = Arc::new(Mutex::new(PasswordUnlockController::new()));
        let seen = Arc::new(AtomicUsize::new(0));

        let subscription = {
            let controller = Arc::clone(&controller);
            let seen = Arc::clone(&seen);
            channel.subscribe(move |status| {
                seen.fetch_add(1, Ordering::SeqCst);
                controller.lock().unwrap().on_status_changed(status);
            })
        };
        channel.password_missing();
        assert_eq!(controller.lock().unwrap().phase(), UnlockPhase::AwaitingInput);
        assert_eq!(channel.subscriber_count(), 1);

        drop(subscription);
        channel.validated();
        assert_eq!(channel.subscriber_count(), 0);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(controller.lock().unwrap().phase(), UnlockPhase::AwaitingInput);
        assert_eq!(channel.current(), Some(PasswordStatus::Validated));
    }

    #[test]
    fn status_names_parse_and_reject_unknown() {
        assert_eq!("validated".parse::<PasswordStatus>(), Ok(PasswordStatus::Validated));
        assert_eq!(
            "".parse::<PasswordStatus>(),
            Err(UnknownStatus(String::new()))
        );
    }

    #[test]
    fn prompt_renders_disabled_confirm_for_empty_input() {
        let controller = armed();
        let ui = render_password_prompt(controller.prompt().unwrap(), controller.is_cancelable());
        assert_eq!(ui.get("type").and_then(Value::as_str), Some("Dialog"));
        assert_eq!(ui.get("cancelable").and_then(Value::as_bool), Some(false));
        assert_eq!(
            ui.pointer("/positive/enabled").and_then(Value::as_bool),
            Some(false)
        );
        assert_eq!(
            ui.pointer("/children/1/ime_action").and_then(Value::as_str),
            Some("done")
        );
    }
}

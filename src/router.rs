use crate::config::ViewerConfig;
use crate::features::password::{render_password_prompt, DismissRequest, PasswordStatus, SubmitTrigger};
use crate::features::properties::{render_properties_dialog, DisplayEntry, DocumentPropertyExtractor};
use crate::features::viewer::{render_jump_dialog, render_viewer_screen, PropertiesRequest, ViewerError};
use crate::features::webview::{route_request, webview_release};
use crate::i18n;
use crate::logging;
use crate::state::{AppState, Screen};
use jni::objects::{JClass, JString};
use jni::sys::jstring;
use jni::JNIEnv;
use serde::Deserialize;
use serde_json::{json, Value};
use std::{
    collections::HashMap,
    ptr,
    sync::{mpsc, Mutex, MutexGuard, OnceLock, PoisonError},
    thread,
};
use thiserror::Error;

struct GlobalState {
    ui: OnceLock<Mutex<AppState>>,
    worker: OnceLock<WorkerRuntime>,
    notifications: Mutex<Vec<WorkerResult>>,
}

impl GlobalState {
    const fn new() -> Self {
        Self {
            ui: OnceLock::new(),
            worker: OnceLock::new(),
            notifications: Mutex::new(Vec::new()),
        }
    }

    fn ui_lock(&self) -> MutexGuard<'_, AppState> {
        self.ui
            .get_or_init(|| Mutex::new(AppState::new()))
            .lock()
            .unwrap_or_else(|poisoned| {
                log::warn!("ui mutex poisoned, recovering state");
                poisoned.into_inner()
            })
    }

    fn worker(&self) -> Result<&WorkerRuntime, DispatchError> {
        if let Some(worker) = self.worker.get() {
            return Ok(worker);
        }
        let runtime = WorkerRuntime::new()?;
        Ok(self.worker.get_or_init(|| runtime))
    }

    fn push_worker_result(&self, result: WorkerResult) {
        self.notifications
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(result);
    }

    fn drain_worker_results(&self) -> Vec<WorkerResult> {
        self.notifications
            .lock()
            .map(|mut q| q.drain(..).collect())
            .unwrap_or_default()
    }
}

struct WorkerRuntime {
    #[cfg_attr(test, allow(dead_code))]
    sender: mpsc::Sender<WorkerJob>,
}

impl WorkerRuntime {
    fn new() -> Result<Self, DispatchError> {
        let (tx, rx) = mpsc::channel::<WorkerJob>();
        thread::Builder::new()
            .name("pdfviewer-worker".into())
            .spawn(move || {
                while let Ok(job) = rx.recv() {
                    let result = run_worker_job(job);
                    STATE.push_worker_result(result);
                }
            })
            .map_err(|e| DispatchError::Worker(format!("spawn_failed:{e}")))?;

        Ok(Self { sender: tx })
    }

    #[cfg(not(test))]
    fn enqueue(&self, job: WorkerJob) -> Result<(), DispatchError> {
        self.sender
            .send(job)
            .map_err(|e| DispatchError::Worker(format!("send_failed:{e}")))
    }

    // Inline so tests observe results without waiting on the thread.
    #[cfg(test)]
    fn enqueue(&self, job: WorkerJob) -> Result<(), DispatchError> {
        let result = run_worker_job(job);
        STATE.push_worker_result(result);
        Ok(())
    }
}

enum WorkerJob {
    ExtractProperties {
        request: PropertiesRequest,
        locale: String,
    },
}

enum WorkerResult {
    Properties {
        generation: u64,
        entries: Vec<DisplayEntry>,
    },
}

fn run_worker_job(job: WorkerJob) -> WorkerResult {
    match job {
        WorkerJob::ExtractProperties { request, locale } => {
            let extractor = DocumentPropertyExtractor::for_locale(&locale);
            let extraction = extractor.extract(
                &request.raw,
                &request.file_name,
                request.file_size,
                request.page_count,
            );
            if !extraction.warnings.is_empty() {
                log::debug!(
                    "extracted {} properties with {} warnings",
                    extraction.entries.len(),
                    extraction.warnings.len()
                );
            }
            WorkerResult::Properties {
                generation: request.generation,
                entries: extractor.display(&extraction.entries),
            }
        }
    }
}

static STATE: GlobalState = GlobalState::new();

#[derive(Debug, Error)]
enum DispatchError {
    /// The engine broke the password status contract; not recoverable.
    #[error("password status contract violated: {0}")]
    ContractViolation(String),
    #[error("unknown_action:{0}")]
    UnknownAction(String),
    #[error("missing_field:{0}")]
    MissingField(&'static str),
    #[error("invalid_field:{field}:{reason}")]
    InvalidField { field: &'static str, reason: String },
    #[error("worker_{0}")]
    Worker(String),
    #[error(transparent)]
    Viewer(#[from] ViewerError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Command {
    action: String,
    locale: Option<String>,
    config: Option<Value>,
    file_name: Option<String>,
    file_size: Option<u64>,
    num_pages: Option<u32>,
    properties: Option<String>,
    status: Option<Value>,
    text: Option<String>,
    ime_action: Option<String>,
    reason: Option<String>,
    page: Option<u32>,
    delta: Option<f32>,
    end: Option<bool>,
    webview_version: Option<String>,
    bindings: Option<HashMap<String, String>>,
    error: Option<String>,
}

#[derive(Debug)]
enum Action {
    Init {
        locale: Option<String>,
        config: Option<Value>,
    },
    Reset,
    Back,
    Error(String),
    OpenDocument {
        file_name: String,
        file_size: u64,
    },
    PageFinished,
    Refresh,
    SetNumPages(u32),
    DocumentProperties(String),
    WebViewVersion(String),
    PasswordStatus(PasswordStatus),
    GetPassword,
    PasswordTextChanged(String),
    PasswordSubmit(SubmitTrigger),
    PasswordDismiss(DismissRequest),
    NextPage,
    PreviousPage,
    FirstPage,
    LastPage,
    JumpToPageScreen,
    JumpToPage(u32),
    Rotate(i32),
    ZoomIn { delta: f32, end: bool },
    ZoomOut { delta: f32, end: bool },
    ZoomEnd,
    DocumentPropertiesScreen,
}

const DEFAULT_ZOOM_STEP: f32 = 0.25;

fn parse_action(command: Command) -> Result<Action, DispatchError> {
    let Command {
        action,
        locale,
        config,
        file_name,
        file_size,
        num_pages,
        properties,
        status,
        text,
        ime_action,
        reason,
        page,
        delta,
        end,
        webview_version,
        bindings,
        error,
    } = command;

    let bindings = bindings.unwrap_or_default();
    let delta = delta.unwrap_or(DEFAULT_ZOOM_STEP);
    let end = end.unwrap_or(true);

    match action.as_str() {
        "init" => Ok(Action::Init { locale, config }),
        "reset" => Ok(Action::Reset),
        "back" => Ok(Action::Back),
        "error" => Ok(Action::Error(error.unwrap_or_else(|| "unknown_error".into()))),
        "open_document" => Ok(Action::OpenDocument {
            file_name: file_name.ok_or(DispatchError::MissingField("file_name"))?,
            file_size: file_size.unwrap_or(0),
        }),
        "page_finished" => Ok(Action::PageFinished),
        "refresh" => Ok(Action::Refresh),
        "set_num_pages" => num_pages
            .map(Action::SetNumPages)
            .ok_or(DispatchError::MissingField("num_pages")),
        "document_properties" => properties
            .map(Action::DocumentProperties)
            .ok_or(DispatchError::MissingField("properties")),
        "webview_version" => webview_version
            .map(Action::WebViewVersion)
            .ok_or(DispatchError::MissingField("webview_version")),
        "password_status" => {
            let raw = match status {
                Some(Value::String(raw)) => raw,
                Some(other) => {
                    return Err(DispatchError::ContractViolation(format!(
                        "status is not a string: {other}"
                    )))
                }
                None => return Err(DispatchError::ContractViolation("status absent".into())),
            };
            raw.parse()
                .map(Action::PasswordStatus)
                .map_err(|e| DispatchError::ContractViolation(e.to_string()))
        }
        "show_password_prompt" => Ok(Action::PasswordStatus(PasswordStatus::MissingPassword)),
        "invalid_password" => Ok(Action::PasswordStatus(PasswordStatus::InvalidPassword)),
        "document_loaded" => Ok(Action::PasswordStatus(PasswordStatus::Validated)),
        "get_password" => Ok(Action::GetPassword),
        "password_text_changed" => text
            .or_else(|| bindings.get("password").cloned())
            .map(Action::PasswordTextChanged)
            .ok_or(DispatchError::MissingField("text")),
        "password_submit" => Ok(Action::PasswordSubmit(match ime_action.as_deref() {
            Some("done") => SubmitTrigger::ImeDone,
            _ => SubmitTrigger::ConfirmButton,
        })),
        "password_cancel" => Ok(Action::PasswordDismiss(DismissRequest::CancelButton)),
        "password_dismiss" => {
            let reason = reason.ok_or(DispatchError::MissingField("reason"))?;
            reason
                .parse()
                .map(Action::PasswordDismiss)
                .map_err(|reason| DispatchError::InvalidField {
                    field: "reason",
                    reason,
                })
        }
        "next_page" => Ok(Action::NextPage),
        "previous_page" => Ok(Action::PreviousPage),
        "first_page" => Ok(Action::FirstPage),
        "last_page" => Ok(Action::LastPage),
        "jump_to_page_screen" => Ok(Action::JumpToPageScreen),
        "jump_to_page" => page
            .or_else(|| parse_u32_binding(&bindings, "page"))
            .map(Action::JumpToPage)
            .ok_or(DispatchError::MissingField("page")),
        "rotate_clockwise" => Ok(Action::Rotate(90)),
        "rotate_counterclockwise" => Ok(Action::Rotate(-90)),
        "zoom_in" => Ok(Action::ZoomIn { delta, end }),
        "zoom_out" => Ok(Action::ZoomOut { delta, end }),
        "zoom_end" => Ok(Action::ZoomEnd),
        "document_properties_screen" => Ok(Action::DocumentPropertiesScreen),
        other => Err(DispatchError::UnknownAction(other.to_string())),
    }
}

fn parse_u32_binding(bindings: &HashMap<String, String>, key: &str) -> Option<u32> {
    bindings.get(key).and_then(|v| v.trim().parse().ok())
}

#[no_mangle]
pub extern "system" fn Java_app_grapheneos_pdfviewer_PdfViewer_dispatch(
    mut env: JNIEnv,
    _class: JClass,
    input: JString,
) -> jstring {
    let response = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let input_str: String = env
            .get_string(&input)
            .map(|s| s.into())
            .unwrap_or_else(|_| "{}".to_string());

        let command: Command = serde_json::from_str(&input_str).unwrap_or_else(|e| Command {
            action: "error".into(),
            error: Some(format!("invalid_json:{e}")),
            ..Command::default()
        });

        handle_command(command)
    }));

    let json_value = match response {
        Ok(Ok(value)) => value,
        Ok(Err(DispatchError::ContractViolation(msg))) => {
            log::error!("password status contract violated: {msg}");
            std::process::abort();
        }
        Ok(Err(err)) => error_ui(&err.to_string()),
        Err(_) => error_ui("panic"),
    };

    let output_string = json_value.to_string();
    match env.new_string(output_string) {
        Ok(java_str) => java_str.into_raw(),
        Err(_) => {
            let fallback = error_ui("jni_new_string_failed").to_string();
            env.new_string(fallback)
                .map(|s| s.into_raw())
                .unwrap_or(ptr::null_mut())
        }
    }
}

/// Routes a WebView request; returns null when the WebView should handle it itself.
#[no_mangle]
pub extern "system" fn Java_app_grapheneos_pdfviewer_PdfViewer_interceptRequest(
    mut env: JNIEnv,
    _class: JClass,
    method: JString,
    host: JString,
    path: JString,
) -> jstring {
    let response = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        let method: String = env.get_string(&method).ok()?.into();
        let host: String = env.get_string(&host).ok()?.into();
        let path: String = env.get_string(&path).ok()?.into();
        let routed = route_request(&method, &host, &path)?;
        let body = serde_json::to_string(&routed).ok()?;
        env.new_string(body).ok().map(|s| s.into_raw())
    }));

    match response {
        Ok(Some(res)) => res,
        Ok(None) | Err(_) => ptr::null_mut(),
    }
}

fn handle_command(command: Command) -> Result<Value, DispatchError> {
    let mut state = STATE.ui_lock();

    apply_worker_results(&mut state);
    state.ensure_navigation();

    let action = match parse_action(command) {
        Ok(action) => action,
        Err(err @ DispatchError::ContractViolation(_)) => return Err(err),
        Err(err) => {
            log::warn!("rejected command: {err}");
            state.last_error = Some(err.to_string());
            return Ok(render_ui(&mut state));
        }
    };

    if let Action::GetPassword = action {
        return Ok(json!({
            "type": "Password",
            "password": state.session.password(),
        }));
    }

    state.last_error = None;
    if let Err(err) = apply_action(&mut state, action) {
        log::warn!("command failed: {err}");
        state.last_error = Some(err.to_string());
    }

    // Inline workers (tests) finish before rendering.
    apply_worker_results(&mut state);
    Ok(render_ui(&mut state))
}

fn apply_action(state: &mut AppState, action: Action) -> Result<(), DispatchError> {
    match action {
        Action::Init { locale, config } => {
            logging::init();
            if let Some(locale) = locale.as_deref() {
                i18n::update_locale(state, locale);
            }
            if config.is_some() {
                state.session.set_config(ViewerConfig::from_host(config.as_ref()));
            }
            state.ensure_navigation();
        }
        Action::Reset => {
            state.reset_runtime();
            state.reset_navigation();
        }
        Action::Back => {
            if state.session.prompt_state().is_some() {
                state.session.request_prompt_dismiss(DismissRequest::BackGesture);
            } else {
                state.pop_screen();
            }
        }
        Action::Error(message) => {
            state.last_error = Some(message);
        }
        Action::OpenDocument {
            file_name,
            file_size,
        } => {
            state.last_error = None;
            state.reset_navigation();
            state.session.load_document(&file_name, file_size);
        }
        Action::PageFinished => state.session.on_page_finished(),
        // Worker results were drained before the action ran.
        Action::Refresh => {}
        Action::SetNumPages(n) => state.session.set_num_pages(n),
        Action::DocumentProperties(raw) => match state.session.accept_properties(&raw) {
            Ok(request) => {
                let locale = state.locale.clone();
                STATE
                    .worker()?
                    .enqueue(WorkerJob::ExtractProperties { request, locale })?;
            }
            Err(ViewerError::PropertiesAlreadySet) => {
                log::warn!("ignoring repeated document properties");
            }
            Err(err) => return Err(err.into()),
        },
        Action::WebViewVersion(version) => match webview_release(&version) {
            Ok(release) => {
                state.webview_release = Some(release);
                if !state.webview_supported() {
                    log::warn!("WebView release {release} is below the supported minimum");
                }
            }
            Err(e) => {
                log::warn!("{e}, assuming supported");
                state.webview_release = None;
            }
        },
        Action::PasswordStatus(status) => state.session.publish_status(status),
        Action::GetPassword => {
            // Answered before any state change in `handle_command`.
        }
        Action::PasswordTextChanged(text) => state.session.password_text_changed(&text),
        Action::PasswordSubmit(trigger) => {
            state.session.submit_password(trigger);
        }
        Action::PasswordDismiss(request) => {
            state.session.request_prompt_dismiss(request);
        }
        Action::NextPage => {
            state.session.next_page();
        }
        Action::PreviousPage => {
            state.session.previous_page();
        }
        Action::FirstPage => {
            state.session.first_page();
        }
        Action::LastPage => {
            state.session.last_page();
        }
        Action::JumpToPageScreen => {
            if state.session.num_pages == 0 {
                return Err(ViewerError::NoDocument.into());
            }
            state.push_screen(Screen::JumpToPage);
        }
        Action::JumpToPage(page) => {
            state.session.jump_to_page(page);
            if state.current_screen() == Screen::JumpToPage {
                state.pop_screen();
            }
        }
        Action::Rotate(degrees) => state.session.rotate(degrees),
        Action::ZoomIn { delta, end } => state.session.zoom_in(delta, end),
        Action::ZoomOut { delta, end } => state.session.zoom_out(delta, end),
        Action::ZoomEnd => state.session.zoom_end(),
        Action::DocumentPropertiesScreen => {
            if state.session.file_name.is_none() {
                return Err(ViewerError::NoDocument.into());
            }
            state.push_screen(Screen::DocumentProperties);
        }
    }
    Ok(())
}

fn apply_worker_results(state: &mut AppState) {
    for result in STATE.drain_worker_results() {
        match result {
            WorkerResult::Properties {
                generation,
                entries,
            } => {
                state.session.apply_properties(generation, entries);
            }
        }
    }
}

fn error_ui(message: &str) -> Value {
    json!({
        "type": "Column",
        "padding": 24,
        "children": [
            { "type": "Text", "text": rust_i18n::t!("viewer.error"), "size": 18.0 },
            { "type": "Text", "text": message }
        ]
    })
}

/// Viewer root, at most one dialog, then the effects queued since the last dispatch.
fn render_ui(state: &mut AppState) -> Value {
    let menu = state.session.prepare_menu();
    let root = render_viewer_screen(&state.session, &menu, state.outdated_webview_release());
    let poll = state.current_screen() == Screen::DocumentProperties
        && state.session.properties_pending();

    let dialog = match state.session.prompt_state() {
        Some((prompt, cancelable)) => Some(render_password_prompt(&prompt, cancelable)),
        None => match state.current_screen() {
            Screen::Viewer => None,
            Screen::DocumentProperties => Some(render_properties_dialog(state.session.properties())),
            Screen::JumpToPage => Some(render_jump_dialog(&state.session)),
        },
    };

    let mut ui = json!({
        "type": "Viewer",
        "root": root,
        "menu": menu,
        "effects": state.session.take_effects(),
    });
    if let Some(dialog) = dialog {
        ui["dialog"] = dialog;
    }
    // Extraction still running on the worker; the host dispatches `refresh` until it lands.
    if poll {
        ui["poll"] = Value::Bool(true);
    }
    if let Some(err) = &state.last_error {
        ui["error"] = Value::String(err.clone());
    }
    ui
}

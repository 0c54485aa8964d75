use serde::Serialize;
use serde_json::Value;

#[derive(Serialize)]
pub struct Text<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<f64>,
    /// Characters `[0, bold_until)` are rendered bold (UTF-16 units).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bold_until: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_description: Option<&'a str>,
}

impl<'a> Text<'a> {
    pub fn new(text: &'a str) -> Self {
        Self {
            kind: "Text",
            text,
            size: None,
            bold_until: None,
            content_description: None,
        }
    }

    pub fn size(mut self, size: f64) -> Self {
        self.size = Some(size);
        self
    }

    pub fn bold_until(mut self, end: usize) -> Self {
        self.bold_until = Some(end);
        self
    }

    pub fn content_description(mut self, cd: &'a str) -> Self {
        self.content_description = Some(cd);
        self
    }
}

#[derive(Serialize)]
pub struct Button<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: &'a str,
    pub action: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_description: Option<&'a str>,
}

impl<'a> Button<'a> {
    pub fn new(text: &'a str, action: &'a str) -> Self {
        Self {
            kind: "Button",
            text,
            action,
            id: None,
            enabled: None,
            content_description: None,
        }
    }

    pub fn id(mut self, id: &'a str) -> Self {
        self.id = Some(id);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn content_description(mut self, cd: &'a str) -> Self {
        self.content_description = Some(cd);
        self
    }
}

#[derive(Serialize)]
pub struct Column<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub padding: Option<u32>,
    pub children: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_description: Option<&'a str>,
}

impl<'a> Column<'a> {
    pub fn new(children: Vec<Value>) -> Self {
        Self {
            kind: "Column",
            padding: None,
            children,
            content_description: None,
        }
    }

    pub fn padding(mut self, padding: u32) -> Self {
        self.padding = Some(padding);
        self
    }

    pub fn content_description(mut self, cd: &'a str) -> Self {
        self.content_description = Some(cd);
        self
    }
}

#[derive(Serialize)]
pub struct TextInput<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub bind_key: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ime_action: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_line: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_focus: Option<bool>,
}

impl<'a> TextInput<'a> {
    pub fn new(bind_key: &'a str) -> Self {
        Self {
            kind: "TextInput",
            bind_key,
            text: None,
            hint: None,
            error: None,
            action: None,
            ime_action: None,
            password: None,
            single_line: None,
            request_focus: None,
        }
    }

    pub fn text(mut self, text: &'a str) -> Self {
        self.text = Some(text);
        self
    }

    pub fn hint(mut self, hint: &'a str) -> Self {
        self.hint = Some(hint);
        self
    }

    pub fn error(mut self, error: &'a str) -> Self {
        self.error = Some(error);
        self
    }

    /// Action dispatched on every edit.
    pub fn action(mut self, action: &'a str) -> Self {
        self.action = Some(action);
        self
    }

    pub fn ime_action(mut self, ime_action: &'a str) -> Self {
        self.ime_action = Some(ime_action);
        self
    }

    pub fn password(mut self, password: bool) -> Self {
        self.password = Some(password);
        self
    }

    pub fn single_line(mut self, single: bool) -> Self {
        self.single_line = Some(single);
        self
    }

    pub fn request_focus(mut self, focus: bool) -> Self {
        self.request_focus = Some(focus);
        self
    }
}

#[derive(Serialize)]
pub struct NumberPicker<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub bind_key: &'a str,
    pub min: u32,
    pub max: u32,
    pub value: u32,
}

impl<'a> NumberPicker<'a> {
    pub fn new(bind_key: &'a str, min: u32, max: u32) -> Self {
        Self {
            kind: "NumberPicker",
            bind_key,
            min,
            max,
            value: min,
        }
    }

    pub fn value(mut self, value: u32) -> Self {
        self.value = value.clamp(self.min, self.max.max(self.min));
        self
    }
}

#[derive(Serialize)]
pub struct Dialog<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<&'a str>,
    pub cancelable: bool,
    pub children: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub positive: Option<Button<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negative: Option<Button<'a>>,
}

impl<'a> Dialog<'a> {
    pub fn new(children: Vec<Value>) -> Self {
        Self {
            kind: "Dialog",
            id: None,
            title: None,
            cancelable: true,
            children,
            positive: None,
            negative: None,
        }
    }

    pub fn id(mut self, id: &'a str) -> Self {
        self.id = Some(id);
        self
    }

    pub fn title(mut self, title: &'a str) -> Self {
        self.title = Some(title);
        self
    }

    pub fn cancelable(mut self, cancelable: bool) -> Self {
        self.cancelable = cancelable;
        self
    }

    pub fn positive(mut self, button: Button<'a>) -> Self {
        self.positive = Some(button);
        self
    }

    pub fn negative(mut self, button: Button<'a>) -> Self {
        self.negative = Some(button);
        self
    }
}

pub fn to_value<T: Serialize>(node: T) -> Value {
    serde_json::to_value(node).unwrap_or_else(|e| {
        serde_json::json!({
            "type": "Text",
            "text": format!("ui_serialize_error:{e}")
        })
    })
}

use indexmap::IndexMap;
use rust_i18n::t;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

use crate::features::pdf_date::{format_pdf_date, DateParseError};
use crate::ui::{to_value, Button as UiButton, Dialog as UiDialog, Text as UiText};

/// Shown for absent values and passed through untouched when the engine already used it.
pub const MISSING_VALUE: &str = "-";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DocumentProperty {
    FileName,
    FileSize,
    Pages,
    Title,
    Author,
    Subject,
    Keywords,
    CreationDate,
    ModDate,
    Creator,
    Producer,
    PdfFormatVersion,
}

impl DocumentProperty {
    pub const ALL: [DocumentProperty; 12] = [
        DocumentProperty::FileName,
        DocumentProperty::FileSize,
        DocumentProperty::Pages,
        DocumentProperty::Title,
        DocumentProperty::Author,
        DocumentProperty::Subject,
        DocumentProperty::Keywords,
        DocumentProperty::CreationDate,
        DocumentProperty::ModDate,
        DocumentProperty::Creator,
        DocumentProperty::Producer,
        DocumentProperty::PdfFormatVersion,
    ];

    /// Maps a key of the engine's metadata blob to its property kind.
    pub fn from_decoder_key(key: &str) -> Option<Self> {
        match key {
            "Title" => Some(Self::Title),
            "Author" => Some(Self::Author),
            "Subject" => Some(Self::Subject),
            "Keywords" => Some(Self::Keywords),
            "CreationDate" => Some(Self::CreationDate),
            "ModDate" => Some(Self::ModDate),
            "Creator" => Some(Self::Creator),
            "Producer" => Some(Self::Producer),
            "PDFFormatVersion" => Some(Self::PdfFormatVersion),
            _ => None,
        }
    }

    pub fn is_date(self) -> bool {
        matches!(self, Self::CreationDate | Self::ModDate)
    }

    fn label_key(self) -> &'static str {
        match self {
            Self::FileName => "property.file_name",
            Self::FileSize => "property.file_size",
            Self::Pages => "property.pages",
            Self::Title => "property.title",
            Self::Author => "property.author",
            Self::Subject => "property.subject",
            Self::Keywords => "property.keywords",
            Self::CreationDate => "property.creation_date",
            Self::ModDate => "property.mod_date",
            Self::Creator => "property.creator",
            Self::Producer => "property.producer",
            Self::PdfFormatVersion => "property.pdf_format_version",
        }
    }
}

/// Localized strings the extractor needs from the host catalog.
#[derive(Debug, Clone)]
pub struct PropertyLabels {
    names: HashMap<DocumentProperty, String>,
    pub invalid_date: String,
    pub date_pattern: String,
}

impl PropertyLabels {
    pub fn for_locale(locale: &str) -> Self {
        let names = DocumentProperty::ALL
            .iter()
            .map(|p| (*p, t!(p.label_key(), locale = locale).into_owned()))
            .collect();
        Self {
            names,
            invalid_date: t!("properties.invalid_date", locale = locale).into_owned(),
            date_pattern: t!("properties.date_format", locale = locale).into_owned(),
        }
    }

    pub fn label(&self, property: DocumentProperty) -> &str {
        self.names
            .get(&property)
            .map(String::as_str)
            .unwrap_or(property.label_key())
    }
}

/// Byte-size humanizer, binary multiples with at most one decimal.
#[derive(Debug, Clone)]
pub struct SizeFormatter {
    units: [String; 5],
    decimal_separator: String,
}

impl SizeFormatter {
    pub fn for_locale(locale: &str) -> Self {
        Self {
            units: [
                t!("size.bytes", locale = locale).into_owned(),
                t!("size.kilobytes", locale = locale).into_owned(),
                t!("size.megabytes", locale = locale).into_owned(),
                t!("size.gigabytes", locale = locale).into_owned(),
                t!("size.terabytes", locale = locale).into_owned(),
            ],
            decimal_separator: t!("size.decimal_separator", locale = locale).into_owned(),
        }
    }

    pub fn format(&self, bytes: u64) -> String {
        const STEP: f64 = 1024.0;
        let mut value = bytes as f64;
        let mut unit = 0;
        while value >= STEP && unit + 1 < self.units.len() {
            value /= STEP;
            unit += 1;
        }
        if unit == 0 {
            return format!("{bytes} {}", self.units[0]);
        }
        let rounded = (value * 10.0).round() / 10.0;
        let number = if rounded.fract() == 0.0 {
            format!("{rounded:.0}")
        } else {
            format!("{rounded:.1}").replace('.', &self.decimal_separator)
        };
        format!("{number} {}", self.units[unit])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionWarning {
    #[error("invalid properties: {0}")]
    MalformedBlob(String),
    #[error("{error} for {raw} at offset: {}", .error.offset)]
    MalformedDate {
        property: DocumentProperty,
        raw: String,
        error: DateParseError,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PropertyEntry {
    pub property: DocumentProperty,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub entries: Vec<PropertyEntry>,
    pub warnings: Vec<ExtractionWarning>,
}

/// One dialog line: `label + ":\n" + value`, label in bold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayEntry {
    pub label: String,
    pub value: String,
    pub text: String,
    /// End of the bold span, in UTF-16 code units as the host text APIs count them.
    pub bold_until: usize,
}

impl DisplayEntry {
    fn new(label: &str, value: &str) -> Self {
        Self {
            label: label.to_string(),
            value: value.to_string(),
            text: format!("{label}:\n{value}"),
            bold_until: label.encode_utf16().count(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DocumentPropertyExtractor {
    labels: PropertyLabels,
    sizes: SizeFormatter,
}

impl DocumentPropertyExtractor {
    pub fn new(labels: PropertyLabels, sizes: SizeFormatter) -> Self {
        Self { labels, sizes }
    }

    pub fn for_locale(locale: &str) -> Self {
        Self::new(PropertyLabels::for_locale(locale), SizeFormatter::for_locale(locale))
    }

    pub fn labels(&self) -> &PropertyLabels {
        &self.labels
    }

    /// Build the ordered property list: file facts, page count, then the engine's metadata.
    /// Never fails; problems end up in `warnings`.
    pub fn extract(
        &self,
        raw_properties: &str,
        file_name: &str,
        file_size: u64,
        page_count: u32,
    ) -> Extraction {
        let mut collected: IndexMap<DocumentProperty, String> = IndexMap::new();
        let mut warnings = Vec::new();

        collected.insert(DocumentProperty::FileName, file_name.to_string());
        collected.insert(DocumentProperty::FileSize, self.sizes.format(file_size));
        collected.insert(DocumentProperty::Pages, page_count.to_string());

        match decoder_fields(raw_properties) {
            Ok(fields) => {
                for (key, value) in fields {
                    let Some(property) = DocumentProperty::from_decoder_key(&key) else {
                        log::debug!("ignoring unknown property {key}");
                        continue;
                    };
                    let display = self.convert(property, &value, &mut warnings);
                    collected.insert(property, display);
                }
            }
            Err(reason) => {
                let warning = ExtractionWarning::MalformedBlob(reason);
                log::warn!("{warning}");
                warnings.push(warning);
            }
        }

        Extraction {
            entries: collected
                .into_iter()
                .map(|(property, value)| PropertyEntry { property, value })
                .collect(),
            warnings,
        }
    }

    fn convert(
        &self,
        property: DocumentProperty,
        value: &Value,
        warnings: &mut Vec<ExtractionWarning>,
    ) -> String {
        let text = match value {
            Value::Null => return MISSING_VALUE.to_string(),
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        if !property.is_date() || text == MISSING_VALUE {
            return text;
        }
        match format_pdf_date(&text, &self.labels.date_pattern) {
            Ok(date) => date,
            Err(error) => {
                let warning = ExtractionWarning::MalformedDate {
                    property,
                    raw: text,
                    error,
                };
                log::warn!("{warning}");
                warnings.push(warning);
                self.labels.invalid_date.clone()
            }
        }
    }

    /// Render entries for the properties dialog.
    pub fn display(&self, entries: &[PropertyEntry]) -> Vec<DisplayEntry> {
        entries
            .iter()
            .map(|entry| DisplayEntry::new(self.labels.label(entry.property), &entry.value))
            .collect()
    }
}

fn decoder_fields(raw: &str) -> Result<serde_json::Map<String, Value>, String> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(format!("expected an object, got {}", json_kind(&other))),
        Err(e) => Err(e.to_string()),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Properties dialog; `None` while extraction is still running.
pub fn render_properties_dialog(entries: Option<&[DisplayEntry]>) -> Value {
    let title = t!("properties.title");
    let close = t!("viewer.close");
    let loading = t!("properties.loading");

    let children = match entries {
        Some(entries) => entries
            .iter()
            .map(|entry| to_value(UiText::new(&entry.text).bold_until(entry.bold_until)))
            .collect(),
        None => vec![to_value(UiText::new(&loading).size(14.0))],
    };

    to_value(
        UiDialog::new(children)
            .id("document_properties")
            .title(&title)
            .positive(UiButton::new(&close, "back")),
    )
}

//! Request routing for the sandboxed WebView that hosts the rendering engine.
//!
//! Only same-origin `GET`s to `https://localhost/` are served; everything else
//! is left to the WebView, which has network and file access disabled.

use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

pub const VIEWER_URL: &str = "https://localhost/viewer.html";
pub const DOCUMENT_PATH: &str = "/placeholder.pdf";

pub const CONTENT_SECURITY_POLICY: &str = concat!(
    "default-src 'none'; ",
    "form-action 'none'; ",
    "connect-src https://localhost/placeholder.pdf; ",
    "img-src blob: 'self'; ",
    "script-src 'self'; ",
    "style-src 'self'; ",
    "frame-ancestors 'none'; ",
    "base-uri 'none'",
);

pub const PERMISSIONS_POLICY: &str = concat!(
    "accelerometer=(), ",
    "ambient-light-sensor=(), ",
    "autoplay=(), ",
    "battery=(), ",
    "camera=(), ",
    "clipboard-read=(), ",
    "clipboard-write=(), ",
    "display-capture=(), ",
    "document-domain=(), ",
    "encrypted-media=(), ",
    "fullscreen=(), ",
    "gamepad=(), ",
    "geolocation=(), ",
    "gyroscope=(), ",
    "hid=(), ",
    "idle-detection=(), ",
    "interest-cohort=(), ",
    "magnetometer=(), ",
    "microphone=(), ",
    "midi=(), ",
    "payment=(), ",
    "picture-in-picture=(), ",
    "publickey-credentials-get=(), ",
    "screen-wake-lock=(), ",
    "serial=(), ",
    "speaker-selection=(), ",
    "sync-xhr=(), ",
    "usb=(), ",
    "xr-spatial-tracking=()",
);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ResourceSource {
    /// The document bytes held by the host, rewound before each read.
    Document,
    Asset { path: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceResponse {
    pub mime: &'static str,
    #[serde(flatten)]
    pub source: ResourceSource,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<&'static str, &'static str>,
}

impl ResourceResponse {
    fn asset(mime: &'static str, path: &str) -> Self {
        Self {
            mime,
            source: ResourceSource::Asset {
                path: path.trim_start_matches('/').to_string(),
            },
            headers: BTreeMap::new(),
        }
    }
}

pub fn route_request(method: &str, host: &str, path: &str) -> Option<ResourceResponse> {
    if method != "GET" || host != "localhost" {
        return None;
    }
    log::debug!("path {path}");

    match path {
        DOCUMENT_PATH => Some(ResourceResponse {
            mime: "application/pdf",
            source: ResourceSource::Document,
            headers: BTreeMap::new(),
        }),
        "/viewer.html" => {
            let mut response = ResourceResponse::asset("text/html", path);
            response
                .headers
                .insert("Content-Security-Policy", CONTENT_SECURITY_POLICY);
            response
                .headers
                .insert("Permissions-Policy", PERMISSIONS_POLICY);
            response.headers.insert("X-Content-Type-Options", "nosniff");
            Some(response)
        }
        "/viewer.css" => Some(ResourceResponse::asset("text/css", path)),
        "/viewer.js" | "/pdf.js" | "/pdf.worker.js" => {
            Some(ResourceResponse::asset("application/javascript", path))
        }
        _ => None,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unparsable WebView version: {0:?}")]
pub struct WebViewVersionError(pub String);

/// Major release of a WebView version name such as `"120.0.6099.43"`.
pub fn webview_release(version_name: &str) -> Result<u32, WebViewVersionError> {
    let major = version_name
        .split('.')
        .next()
        .unwrap_or(version_name)
        .trim();
    major
        .parse()
        .map_err(|_| WebViewVersionError(version_name.to_string()))
}

pub fn is_supported(release: u32, minimum: u32) -> bool {
    release >= minimum
}

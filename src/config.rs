use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Host-tunable viewer parameters.
/// Delivered as the `config` object of the `init` command; missing fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Smallest zoom ratio reachable by pinch or menu.
    pub min_zoom_ratio: f32,
    /// Largest zoom ratio reachable by pinch or menu.
    pub max_zoom_ratio: f32,
    /// Oldest WebView major release able to run the bundled rendering engine.
    pub min_webview_release: u32,
    /// Padding (px) of the page-number toast.
    pub toast_padding: u32,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            min_zoom_ratio: 0.5,
            max_zoom_ratio: 1.5,
            min_webview_release: 89,
            toast_padding: 10,
        }
    }
}

impl ViewerConfig {
    /// Build a config from the host payload, falling back to defaults when it does not parse.
    pub fn from_host(payload: Option<&Value>) -> Self {
        let Some(payload) = payload else {
            return Self::default();
        };
        match serde_json::from_value::<ViewerConfig>(payload.clone()) {
            Ok(config) if config.min_zoom_ratio <= config.max_zoom_ratio => {
                log::info!("loaded viewer config: {config:?}");
                config
            }
            Ok(config) => {
                log::warn!(
                    "zoom bounds inverted ({} > {}), using defaults",
                    config.min_zoom_ratio,
                    config.max_zoom_ratio
                );
                Self::default()
            }
            Err(e) => {
                log::warn!("failed to parse viewer config: {e}, using defaults");
                Self::default()
            }
        }
    }
}

use crate::state::AppState;

pub const DEFAULT_LOCALE: &str = "en";

pub fn update_locale(state: &mut AppState, locale_str: &str) {
    let normalized = normalize_locale(locale_str);
    if state.locale != normalized {
        log::info!("switching locale from {} to {normalized}", state.locale);
    }
    state.locale = normalized.to_string();
    rust_i18n::set_locale(normalized);
}

pub fn normalize_locale(locale_str: &str) -> &'static str {
    let trimmed = locale_str.trim();
    if trimmed.is_empty() {
        return DEFAULT_LOCALE;
    }

    // Catalogs are keyed by bare language ("en", "fr"), so "fr-CA" / "en_US"
    // collapse to the language part.
    let lower = trimmed.to_ascii_lowercase().replace('_', "-");
    let lang = lower.split('-').next().unwrap_or(DEFAULT_LOCALE);

    match lang {
        "fr" => "fr",
        _ => DEFAULT_LOCALE,
    }
}

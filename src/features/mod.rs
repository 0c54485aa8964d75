pub mod password;
pub mod pdf_date;
pub mod properties;
pub mod viewer;
pub mod webview;

//! Minimal HTML page responses.

use axum::http::StatusCode;
use axum::response::{Html, IntoResponse};

/// A tiny HTML document: a heading followed by pre-rendered body markup.
/// The heading is escaped; the body is trusted and must be escaped by the
/// caller with [`escape_html`].
pub struct Page {
    title: String,
    body: String,
}

impl Page {
    pub fn new(title: &str, body: String) -> Self {
        Self { title: title.to_string(), body }
    }

    pub fn render(&self) -> String {
        format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n<body>\n<h1>{title}</h1>\n{body}\n</body>\n</html>",
            title = escape_html(&self.title),
            body = self.body,
        )
    }
}

impl IntoResponse for Page {
    fn into_response(self) -> axum::response::Response {
        (StatusCode::OK, Html(self.render())).into_response()
    }
}

/// Escape HTML special characters.
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#x27;")
}

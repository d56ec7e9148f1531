use http::{HeaderName, HeaderValue, StatusCode};
use tracing::warn;

use crate::internal::server::ServerResponse;

/// Outcome of handling one request, before it is written to the wire.
///
/// A successful response (status below 400) carries its headers and body
/// through unchanged. An error response ignores `headers`; its `body` is a
/// human-readable explanation rendered onto a plain error page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    pub fn new(status: u16, headers: Vec<(String, String)>, body: String) -> Self {
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn error(status: u16, explanation: impl Into<String>) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: explanation.into(),
        }
    }

    pub fn successful(&self) -> bool {
        self.status < 400
    }
}

fn reason(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or("Unknown")
}

fn error_page(status: u16, explanation: &str) -> String {
    if explanation.is_empty() {
        format!("{} {}\n", status, reason(status))
    } else {
        format!("{} {}\n{}\n", status, reason(status), explanation)
    }
}

impl From<Response> for ServerResponse {
    fn from(value: Response) -> Self {
        let mut server_response = ServerResponse {
            headers: Default::default(),
            status_code: value.status,
            body: Vec::new(),
        };

        if value.successful() {
            for (name, val) in &value.headers {
                match (
                    HeaderName::from_bytes(name.as_bytes()),
                    HeaderValue::from_str(val),
                ) {
                    (Ok(name), Ok(val)) => {
                        server_response.headers.append(name, val);
                    }
                    _ => warn!("dropping unrepresentable header {name:?}"),
                }
            }
            server_response.body = value.body.into_bytes();
        } else {
            server_response.headers.insert(
                http::header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            );
            server_response.body = error_page(value.status, &value.body).into_bytes();
        }

        server_response
    }
}

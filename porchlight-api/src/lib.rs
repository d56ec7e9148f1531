//! Contract between the porchlight server and its handler units.
//!
//! A handler unit is a `cdylib` built with the same toolchain as the server,
//! installed under the scripts directory and loaded freshly for every POST
//! request it serves. It exports a single entry point:
//!
//! ```ignore
//! #[no_mangle]
//! pub fn handle(context: &HandlerContext) -> HandlerOutcome {
//!     HandlerOutcome::Success {
//!         status: 200,
//!         headers: vec![("Content-Type".into(), "text/plain".into())],
//!         body: "hello".into(),
//!     }
//! }
//! ```
//!
//! The context is a read-only view of the request. Handlers return data; they
//! never write to the connection, the log, or the rate-limit state.

use std::net::SocketAddr;

/// Symbol name the server looks up after loading a handler unit.
pub const ENTRY_SYMBOL: &[u8] = b"handle";

/// Signature of the exported entry point.
pub type HandlerFn = fn(&HandlerContext) -> HandlerOutcome;

/// Read-only view of one POST request, owned by the invocation it was built for.
#[derive(Debug, Clone)]
pub struct HandlerContext {
    /// Address and port of the requesting client.
    pub client_addr: SocketAddr,
    /// The raw request line, e.g. `POST /scripts/guestbook.so HTTP/1.1`.
    pub request_line: String,
    /// Request headers in arrival order, names lowercased by the server.
    pub headers: Vec<(String, String)>,
    /// Query-string pairs from the request target, in order.
    pub query: Vec<(String, String)>,
    /// Body parameters: one entry per field in order of first appearance,
    /// values in order of appearance. A field sent blank is present with an
    /// empty-string value.
    pub parameters: Vec<(String, Vec<String>)>,
    /// Unix timestamp recorded by the rate limiter for this request.
    pub last_post_time: i64,
}

impl HandlerContext {
    /// First value of the named header, matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All values submitted for the named body parameter.
    pub fn parameter(&self, name: &str) -> Option<&[String]> {
        self.parameters
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_slice())
    }

    /// First value submitted for the named body parameter.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.parameter(name)?.first().map(String::as_str)
    }
}

/// What a handler invocation produces.
///
/// Anything else coming back across the boundary (a panic, or a variant
/// whose status is on the wrong side of 400) is treated as a handler fault
/// and reported to the client as a generic 500.
#[derive(Debug, Clone)]
pub enum HandlerOutcome {
    /// A response to relay to the client. `status` must be below 400.
    Success {
        status: u16,
        headers: Vec<(String, String)>,
        body: String,
    },
    /// An error the handler chose to report. `status` must be 400..=599;
    /// the explanation becomes the client-visible error body.
    Failure {
        status: u16,
        reason: String,
        explanation: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> HandlerContext {
        HandlerContext {
            client_addr: "127.0.0.1:9000".parse().unwrap(),
            request_line: "POST /scripts/echo.so HTTP/1.1".to_string(),
            headers: vec![("content-type".into(), "application/x-www-form-urlencoded".into())],
            query: vec![],
            parameters: vec![
                ("a".into(), vec!["1".into(), "2".into()]),
                ("b".into(), vec![String::new()]),
            ],
            last_post_time: 1_700_000_000,
        }
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let ctx = context();
        assert_eq!(
            ctx.header("Content-Type"),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(ctx.header("referer"), None);
    }

    #[test]
    fn parameter_lookup_preserves_values() {
        let ctx = context();
        assert_eq!(ctx.parameter("a").unwrap(), ["1", "2"]);
        assert_eq!(ctx.first("a"), Some("1"));
        assert_eq!(ctx.first("b"), Some(""));
        assert_eq!(ctx.parameter("c"), None);
    }
}

//! Minimal handler unit: echoes the submitted parameters back as plain text.
//!
//! Install by copying the built library into the scripts directory, e.g.
//! `cp target/release/libecho.so live/scripts/echo.so`.

use porchlight_api::{HandlerContext, HandlerOutcome};

#[no_mangle]
pub fn handle(context: &HandlerContext) -> HandlerOutcome {
    let mut body = String::new();
    for (name, values) in &context.parameters {
        for value in values {
            body.push_str(name);
            body.push('=');
            body.push_str(value);
            body.push('\n');
        }
    }

    HandlerOutcome::Success {
        status: 200,
        headers: vec![(
            "Content-Type".to_string(),
            "text/plain; charset=utf-8".to_string(),
        )],
        body,
    }
}

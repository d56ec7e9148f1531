//! POST dispatch: path validation, handler resolution, rate limiting, body
//! parsing, and the load/invoke/normalize cycle for handler units.
//!
//! A handler unit is loaded freshly from disk for every request it serves,
//! so replacing the library on disk takes effect without a restart. Whatever
//! goes wrong on the handler side of the boundary (a panic, a load failure,
//! a malformed result), the client sees a fixed generic 500 and the detail
//! lands in the access log only.

use std::env::consts::DLL_EXTENSION;
use std::fs;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use chrono::Utc;
use libloading::{Library, Symbol};
use porchlight_api::{HandlerContext, HandlerFn, HandlerOutcome, ENTRY_SYMBOL};
use querystring::querify;
use regex::Regex;
use tracing::debug;

use crate::app::model::Response;
use crate::internal::server::ServerRequest;
use crate::logger::{Parameters, RequestLogger};
use crate::ratelimit::RateLimiter;

const GENERIC_FAULT_BODY: &str = "The handler for this request failed";

pub struct Dispatcher {
    live_root: PathBuf,
    scripts_root: PathBuf,
    allowed: Regex,
    rate_limiter: RateLimiter,
    min_interval: i64,
}

impl Dispatcher {
    /// `live_root` and `scripts_root` must already be canonical;
    /// `scripts_prefix` is the URL prefix of the handler subtree.
    pub fn new(
        live_root: PathBuf,
        scripts_root: PathBuf,
        scripts_prefix: &str,
        rate_limiter: RateLimiter,
        min_interval: i64,
    ) -> Result<Self, regex::Error> {
        let allowed = Regex::new(&format!(
            "^/{}/[A-Za-z0-9_/-]+\\.{}$",
            regex::escape(scripts_prefix.trim_matches('/')),
            regex::escape(DLL_EXTENSION),
        ))?;
        Ok(Self {
            live_root,
            scripts_root,
            allowed,
            rate_limiter,
            min_interval,
        })
    }

    /// Run one POST request to completion. Returns the response plus the
    /// parsed parameters when the request got far enough to have them, for
    /// the caller's log record.
    pub async fn dispatch(
        &self,
        request: &ServerRequest,
        logger: &RequestLogger,
    ) -> (Response, Option<Parameters>) {
        let path = request.uri.path();

        // The allow-list is the security boundary: nothing outside
        // letters, digits, underscore, hyphen, and separators ever
        // reaches the filesystem or the loader.
        if !self.allowed.is_match(path) {
            return (
                Response::error(405, "POST targets must name a handler script"),
                None,
            );
        }

        let lexical = self.live_root.join(path.trim_start_matches('/'));
        let real = match fs::canonicalize(&lexical) {
            Ok(real) => real,
            Err(_) => return (Response::error(404, "No such handler"), None),
        };
        if !real.starts_with(&self.scripts_root) {
            return (
                Response::error(405, "POST targets must name a handler script"),
                None,
            );
        }
        if real.is_dir() {
            return (
                Response::error(403, "This server does not give directory listings"),
                None,
            );
        }
        if !real.is_file() {
            return (Response::error(404, "No such handler"), None);
        }

        if request.headers.get(http::header::CONTENT_LENGTH).is_none() {
            return (
                Response::error(411, "POST requests must carry a Content-Length"),
                None,
            );
        }

        let now = Utc::now().timestamp();
        if !self
            .rate_limiter
            .check_and_record(now, self.min_interval)
            .await
        {
            return (
                Response::error(
                    429,
                    format!(
                        "You must wait a minimum of {} seconds between POST requests. \
                         Use your browser's back button and try again after waiting",
                        self.min_interval
                    ),
                ),
                None,
            );
        }

        let parameters = parse_parameters(&request.body);
        let context = HandlerContext {
            client_addr: request.peer,
            request_line: request.request_line(),
            headers: request
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            query: querify(request.uri.query().unwrap_or_default())
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
            parameters: parameters.clone(),
            last_post_time: now,
        };

        debug!("invoking handler {}", real.display());
        let handler_path = real.clone();
        let invoked =
            tokio::task::spawn_blocking(move || invoke(&handler_path, &context)).await;

        let response = match invoked {
            Ok(Ok(outcome)) => self.normalize(&real, outcome, logger).await,
            Ok(Err(fault)) => {
                logger.log_message(&fault).await;
                Response::error(500, GENERIC_FAULT_BODY)
            }
            Err(join_error) => {
                logger
                    .log_message(&format!(
                        "handler task for {} aborted: {join_error}",
                        real.display()
                    ))
                    .await;
                Response::error(500, GENERIC_FAULT_BODY)
            }
        };

        (response, Some(parameters))
    }

    /// A conforming outcome becomes the wire response; anything else is a
    /// handler fault.
    async fn normalize(
        &self,
        handler: &Path,
        outcome: HandlerOutcome,
        logger: &RequestLogger,
    ) -> Response {
        match outcome {
            HandlerOutcome::Success {
                status,
                headers,
                body,
            } if (100..400).contains(&status) => Response::new(status, headers, body),
            HandlerOutcome::Failure {
                status,
                reason,
                explanation,
            } if (400..600).contains(&status) => {
                let explanation = if reason.is_empty() {
                    explanation
                } else if explanation.is_empty() {
                    reason
                } else {
                    format!("{reason}: {explanation}")
                };
                Response::error(status, explanation)
            }
            malformed => {
                logger
                    .log_message(&format!(
                        "handler {} returned a malformed result: {malformed:?}",
                        handler.display()
                    ))
                    .await;
                Response::error(500, GENERIC_FAULT_BODY)
            }
        }
    }
}

/// Load the handler unit at `path` and run its entry point. The library is
/// dropped on return, so the next request re-reads the file from disk.
fn invoke(path: &Path, context: &HandlerContext) -> Result<HandlerOutcome, String> {
    // SAFETY: loading a library runs its initializers and the entry point is
    // trusted to match `HandlerFn`. Handler units are server-operator code
    // installed under the scripts directory, the same trust as the binary
    // itself; the allow-list and canonical-path checks keep anything else
    // from reaching this point.
    let library = unsafe { Library::new(path) }
        .map_err(|err| format!("failed to load handler {}: {err}", path.display()))?;
    let entry: Symbol<HandlerFn> = unsafe { library.get(ENTRY_SYMBOL) }.map_err(|err| {
        format!(
            "handler {} has no usable entry point: {err}",
            path.display()
        )
    })?;

    std::panic::catch_unwind(AssertUnwindSafe(|| (*entry)(context)))
        .map_err(|panic| format!("handler {} panicked: {panic:?}", path.display()))
}

/// Parse a URL-encoded body into the ordered parameter mapping. Total:
/// blank values survive, repeated names accumulate in order, malformed
/// escapes degrade to replacement characters.
pub fn parse_parameters(body: &[u8]) -> Parameters {
    let mut parameters: Parameters = Vec::new();
    for (name, value) in form_urlencoded::parse(body) {
        match parameters.iter_mut().find(|(n, _)| n.as_str() == name) {
            Some((_, values)) => values.push(value.into_owned()),
            None => parameters.push((name.into_owned(), vec![value.into_owned()])),
        }
    }
    parameters
}

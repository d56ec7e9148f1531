//! The server front-end: routes each request pulled off the connection
//! primitive, composes the resolver, rate limiter, dispatcher, and static
//! file serving, and guarantees every request is answered and then logged
//! exactly once.

pub mod model;

use std::fs;

use anyhow::Context;
use chrono::Utc;
use http::Method;
use matchit::Router;
use tracing::error;

use crate::config::Config;
use crate::dispatch::Dispatcher;
use crate::internal::server::{ServerRequest, ServerResponse};
use crate::logger::{Parameters, RequestLogger};
use crate::ratelimit::RateLimiter;
use crate::resolve::{GetDecision, PathResolver};
use crate::static_files;
use model::Response;

pub struct App {
    resolver: PathResolver,
    dispatcher: Dispatcher,
    logger: RequestLogger,
    get_exceptions: Router<Response>,
    post_exceptions: Router<Response>,
}

impl App {
    /// Canonicalize the roots, create the pieces of persistent state that
    /// may be absent on first start, and wire the components together.
    pub fn new(config: &Config) -> anyhow::Result<Self> {
        let live_root = fs::canonicalize(&config.live_path).with_context(|| {
            format!(
                "live directory {} must exist",
                config.live_path.display()
            )
        })?;

        let scripts_dir = live_root.join(config.scripts_path.trim_matches('/'));
        fs::create_dir_all(&scripts_dir).with_context(|| {
            format!("unable to create scripts directory {}", scripts_dir.display())
        })?;
        let scripts_root = fs::canonicalize(&scripts_dir)?;

        let rate_limiter = RateLimiter::new(config.last_post_time_path.clone());
        rate_limiter.bootstrap().with_context(|| {
            format!(
                "unable to initialize rate-limit state {}",
                config.last_post_time_path.display()
            )
        })?;

        let dispatcher = Dispatcher::new(
            live_root.clone(),
            scripts_root.clone(),
            config.scripts_path.trim_matches('/'),
            rate_limiter,
            config.min_post_interval,
        )
        .context("invalid scripts path")?;

        let logger = RequestLogger::new(
            config.log_path.clone(),
            config.log_headers.clone(),
            config.log_request_len,
        );

        let mut app = Self {
            resolver: PathResolver::new(live_root, scripts_root),
            dispatcher,
            logger,
            get_exceptions: Router::new(),
            post_exceptions: Router::new(),
        };
        app.add_exception(Method::GET, "/favicon.ico", Response::error(410, ""));
        Ok(app)
    }

    /// Register a fixed response for an exact path, checked before any
    /// resolution or dispatch.
    pub fn add_exception(&mut self, method: Method, path: &str, response: Response) {
        let router = match method {
            Method::GET => &mut self.get_exceptions,
            Method::POST => &mut self.post_exceptions,
            _ => {
                error!("no exception table for {method} requests");
                return;
            }
        };
        if let Err(err) = router.insert(path, response) {
            error!("{err}");
        }
    }

    /// Take one request through response and logging. This is the whole
    /// lifecycle: whatever branch routing takes, the record is written
    /// before the response is returned to the connection.
    pub async fn handle(&self, request: &ServerRequest) -> ServerResponse {
        let timestamp = Utc::now();
        let (response, parameters) = self.route(request).await;

        let record = self.logger.format_record(
            timestamp,
            request.peer,
            &request.request_line(),
            response.status_code,
            &request.headers,
            parameters.as_ref(),
        );
        self.logger.log_record(&record).await;

        response
    }

    async fn route(&self, request: &ServerRequest) -> (ServerResponse, Option<Parameters>) {
        match request.method {
            Method::GET => (self.handle_get(request).await, None),
            Method::POST => self.handle_post(request).await,
            _ => (
                Response::error(501, "Unsupported method").into(),
                None,
            ),
        }
    }

    async fn handle_get(&self, request: &ServerRequest) -> ServerResponse {
        let path = request.uri.path();
        if let Ok(matched) = self.get_exceptions.at(path) {
            return matched.value.clone().into();
        }

        match self.resolver.resolve(path) {
            GetDecision::HandlerSource => {
                Response::error(405, "Handler scripts are not served").into()
            }
            GetDecision::NoIndex => {
                Response::error(403, "This server does not give directory listings").into()
            }
            GetDecision::Redirect(target) => Response::new(
                301,
                vec![("Location".to_string(), target)],
                String::new(),
            )
            .into(),
            GetDecision::File(path) => match static_files::serve(&path).await {
                Ok(response) => response,
                Err(_) => Response::error(404, "File not found").into(),
            },
            GetDecision::Missing => Response::error(404, "File not found").into(),
        }
    }

    async fn handle_post(&self, request: &ServerRequest) -> (ServerResponse, Option<Parameters>) {
        if let Ok(matched) = self.post_exceptions.at(request.uri.path()) {
            return (matched.value.clone().into(), None);
        }

        let (response, parameters) = self.dispatcher.dispatch(request, &self.logger).await;
        (response.into(), parameters)
    }
}

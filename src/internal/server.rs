//! The HTTP connection primitive: accepts connections, parses requests, and
//! ferries each one to the application with a one-shot reply channel. All
//! routing decisions happen on the other side of the channel.

mod model;

use std::convert::Infallible;
use std::fmt::Debug;
use std::io;
use std::net::SocketAddr;

use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Full};
use hyper::body::{Body, Bytes};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::error;

pub use model::{RequestResponse, ServerRequest, ServerResponse};

pub struct Server {
    pending_requests: mpsc::UnboundedReceiver<RequestResponse>,
    shutdown_signal: oneshot::Sender<()>,
}

impl Server {
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let (request_sender, request_receiver) = mpsc::unbounded_channel();
        let (shutdown_sender, shutdown_receiver) = oneshot::channel();

        tokio::task::spawn(accept_loop(listener, request_sender, shutdown_receiver));

        Ok(Server {
            pending_requests: request_receiver,
            shutdown_signal: shutdown_sender,
        })
    }

    /// The next parsed request, or `None` once the accept loop has stopped.
    pub async fn next_request(&mut self) -> Option<RequestResponse> {
        self.pending_requests.recv().await
    }

    pub fn shutdown(self) {
        // NOTE: Don't care if this fails.
        let _ = self.shutdown_signal.send(());
    }
}

async fn accept_loop(
    listener: TcpListener,
    request_sender: mpsc::UnboundedSender<RequestResponse>,
    shutdown_receiver: oneshot::Receiver<()>,
) {
    tokio::pin!(shutdown_receiver);

    loop {
        tokio::select! {
            _ = &mut shutdown_receiver => break,
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(accepted) => accepted,
                    Err(err) => {
                        error!("failed to accept connection: {err}");
                        continue;
                    }
                };
                let stream = TokioIo::new(stream);
                let request_sender = request_sender.clone();

                tokio::task::spawn(async move {
                    let result = http1::Builder::new()
                        .serve_connection(
                            stream,
                            service_fn(|request| handle(peer, request_sender.clone(), request)),
                        )
                        .await;

                    if let Err(err) = result {
                        error!("error serving connection from {peer}: {err:?}");
                    }
                });
            }
        }
    }
}

async fn handle<B>(
    peer: SocketAddr,
    sender: mpsc::UnboundedSender<RequestResponse>,
    request: Request<B>,
) -> Result<Response<Full<Bytes>>, Infallible>
where
    B: Body,
    B::Error: Debug,
{
    let (tx, rx) = oneshot::channel();

    let (parts, body) = request.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            error!("unable to read body from {peer}: {err:?}");
            return Ok(render(ServerResponse::bad_request()));
        }
    };

    let request = ServerRequest {
        peer,
        headers: parts.headers,
        method: parts.method,
        uri: parts.uri,
        version: parts.version,
        body: body.into(),
    };

    if sender.send(RequestResponse(request, tx)).is_err() {
        // The application side has shut down.
        return Ok(render(ServerResponse::unavailable()));
    }

    let server_response = match rx.await {
        Ok(response) => response,
        Err(_) => ServerResponse::unavailable(),
    };

    Ok(render(server_response))
}

fn render(server_response: ServerResponse) -> Response<Full<Bytes>> {
    let mut response = Response::builder().status(server_response.status_code);

    if let Some(headers) = response.headers_mut() {
        headers.extend(server_response.headers);
    }

    match response.body(Full::new(Bytes::from(server_response.body))) {
        Ok(response) => response,
        Err(err) => {
            error!("unable to construct response: {err}");
            let mut fallback = Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        }
    }
}

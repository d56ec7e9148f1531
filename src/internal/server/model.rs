use std::net::SocketAddr;

use http::{HeaderMap, Method, Uri, Version};
use tokio::sync::oneshot;

pub struct ServerRequest {
    pub peer: SocketAddr,
    pub headers: HeaderMap,
    pub method: Method,
    pub uri: Uri,
    pub version: Version,
    pub body: Vec<u8>,
}

impl ServerRequest {
    /// The request line as the client sent it, reconstructed for logging.
    pub fn request_line(&self) -> String {
        format!("{} {} {:?}", self.method, self.uri, self.version)
    }
}

pub struct ServerResponse {
    pub headers: HeaderMap,
    pub status_code: u16,
    pub body: Vec<u8>,
}

impl ServerResponse {
    pub fn bad_request() -> Self {
        Self {
            headers: Default::default(),
            status_code: 400,
            body: "Bad Request".as_bytes().to_vec(),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            headers: Default::default(),
            status_code: 503,
            body: "Service Unavailable".as_bytes().to_vec(),
        }
    }
}

pub struct RequestResponse(pub ServerRequest, pub oneshot::Sender<ServerResponse>);

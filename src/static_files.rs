//! Reads a resolved file and pairs it with a content type. Path safety is
//! the resolver's job; by the time a path reaches here it is canonical and
//! inside the live tree.

use std::ffi::OsStr;
use std::io;
use std::path::Path;

use http::HeaderValue;

use crate::internal::server::ServerResponse;

pub fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

pub async fn serve(path: &Path) -> io::Result<ServerResponse> {
    let body = tokio::fs::read(path).await?;

    let mut headers = http::HeaderMap::new();
    headers.insert(
        http::header::CONTENT_TYPE,
        HeaderValue::from_static(content_type(path)),
    );

    Ok(ServerResponse {
        headers,
        status_code: 200,
        body,
    })
}

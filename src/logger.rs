//! The access log: one record per request, plus out-of-band diagnostics for
//! handler faults. Append is the only mutation; each record goes out as a
//! single guarded write so concurrent requests never interleave. A failing
//! log sink is reported once and the request completes regardless.

use std::fs::OpenOptions;
use std::io::Write;
use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use http::HeaderMap;
use tokio::sync::Mutex;
use tracing::warn;

const FIELD_SEPARATOR: &str = " | ";
const RECORD_SEPARATOR: &str = "####################";

pub type Parameters = Vec<(String, Vec<String>)>;

pub struct RequestLogger {
    log_path: PathBuf,
    log_headers: Vec<String>,
    truncate_len: usize,
    lock: Mutex<()>,
}

impl RequestLogger {
    pub fn new(log_path: PathBuf, log_headers: Vec<String>, truncate_len: usize) -> Self {
        let log_headers = log_headers
            .into_iter()
            .map(|name| name.to_ascii_lowercase())
            .collect();
        Self {
            log_path,
            log_headers,
            truncate_len,
            lock: Mutex::new(()),
        }
    }

    /// One record: timestamp | address:port | request line | status, then the
    /// allow-listed headers, then (POST only) the parameters, each value
    /// truncated to the configured length.
    pub fn format_record(
        &self,
        timestamp: DateTime<Utc>,
        peer: SocketAddr,
        request_line: &str,
        status: u16,
        headers: &HeaderMap,
        parameters: Option<&Parameters>,
    ) -> String {
        let mut record = [
            timestamp.format("%Y-%m-%dT%H:%M:%S").to_string(),
            peer.to_string(),
            request_line.to_string(),
            status.to_string(),
        ]
        .join(FIELD_SEPARATOR);

        let header_line = headers
            .iter()
            .filter(|(name, _)| self.log_headers.iter().any(|h| h == name.as_str()))
            .map(|(name, value)| format!("{}: {}", name, String::from_utf8_lossy(value.as_bytes())))
            .collect::<Vec<_>>()
            .join(FIELD_SEPARATOR);
        if !header_line.is_empty() {
            record.push('\n');
            record.push_str(&header_line);
        }

        if let Some(parameters) = parameters {
            let parameter_line = parameters
                .iter()
                .flat_map(|(name, values)| {
                    values.iter().map(move |value| {
                        format!("{}: {}", name, truncate(value, self.truncate_len))
                    })
                })
                .collect::<Vec<_>>()
                .join(FIELD_SEPARATOR);
            if !parameter_line.is_empty() {
                record.push('\n');
                record.push_str(&parameter_line);
            }
        }

        record
    }

    /// Append one formatted request record.
    pub async fn log_record(&self, record: &str) {
        self.append(record).await;
    }

    /// Append an arbitrary diagnostic message (handler fault detail) in the
    /// same record framing.
    pub async fn log_message(&self, message: &str) {
        self.append(message).await;
    }

    async fn append(&self, message: &str) {
        let _guard = self.lock.lock().await;
        let framed = format!("{message}\n{RECORD_SEPARATOR}\n");
        let result = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&self.log_path)
            .and_then(|mut file| file.write_all(framed.as_bytes()));
        if let Err(err) = result {
            // No retry; the record is lost but the request is not.
            warn!("unable to append to {}: {err}", self.log_path.display());
        }
    }
}

fn truncate(value: &str, len: usize) -> String {
    value.chars().take(len).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn logger(dir: &tempfile::TempDir) -> RequestLogger {
        RequestLogger::new(
            dir.path().join("test.log"),
            vec!["User-Agent".to_string(), "referer".to_string()],
            8,
        )
    }

    fn timestamp() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 13, 14, 15).unwrap()
    }

    fn peer() -> SocketAddr {
        "10.0.0.7:4242".parse().unwrap()
    }

    #[test]
    fn get_record_has_no_parameter_section() {
        let dir = tempfile::tempdir().unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("user-agent", "curl/8.0".parse().unwrap());
        headers.insert("x-secret", "hidden".parse().unwrap());

        let record = logger(&dir).format_record(
            timestamp(),
            peer(),
            "GET /page.html HTTP/1.1",
            200,
            &headers,
            None,
        );

        assert_eq!(
            record,
            "2024-05-02T13:14:15 | 10.0.0.7:4242 | GET /page.html HTTP/1.1 | 200\n\
             user-agent: curl/8.0"
        );
        assert!(!record.contains("x-secret"));
        assert!(!record.contains("hidden"));
    }

    #[test]
    fn post_record_lists_every_field_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let parameters: Parameters = vec![
            ("a".to_string(), vec!["1".to_string(), "2".to_string()]),
            ("msg".to_string(), vec!["0123456789abcdef".to_string()]),
            ("blank".to_string(), vec![String::new()]),
        ];

        let record = logger(&dir).format_record(
            timestamp(),
            peer(),
            "POST /scripts/echo.so HTTP/1.1",
            200,
            &HeaderMap::new(),
            Some(&parameters),
        );

        let parameter_line = record.lines().last().unwrap();
        assert_eq!(parameter_line, "a: 1 | a: 2 | msg: 01234567 | blank: ");
    }

    #[tokio::test]
    async fn records_are_framed_and_appended() {
        let dir = tempfile::tempdir().unwrap();
        let logger = logger(&dir);
        logger.log_record("first").await;
        logger.log_message("second").await;

        let contents = std::fs::read_to_string(dir.path().join("test.log")).unwrap();
        assert_eq!(
            contents,
            "first\n####################\nsecond\n####################\n"
        );
    }

    #[tokio::test]
    async fn unwritable_sink_does_not_panic() {
        let dir = tempfile::tempdir().unwrap();
        // The "log file" is a directory; every append fails.
        let logger = RequestLogger::new(dir.path().to_path_buf(), vec![], 8);
        logger.log_record("lost").await;
    }
}

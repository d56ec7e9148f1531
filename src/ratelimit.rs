//! Global POST cooldown backed by a single timestamp file.
//!
//! The file is the sole source of truth so the cooldown survives restarts.
//! `check_and_record` holds the mutex across read, check, and write: two
//! concurrent POSTs can never both observe the old timestamp.

use std::fs;
use std::io;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::warn;

pub struct RateLimiter {
    state_path: PathBuf,
    lock: Mutex<()>,
}

impl RateLimiter {
    pub fn new(state_path: PathBuf) -> Self {
        Self {
            state_path,
            lock: Mutex::new(()),
        }
    }

    /// Create the state file with value `0` if it does not exist yet.
    pub fn bootstrap(&self) -> io::Result<()> {
        if !self.state_path.exists() {
            self.write_last(0)?;
        }
        Ok(())
    }

    /// Accept or reject a POST arriving at `now`. On acceptance the state
    /// file already holds `now` by the time this returns, so the cooldown
    /// applies no matter how long the handler runs afterwards.
    pub async fn check_and_record(&self, now: i64, min_interval: i64) -> bool {
        let _guard = self.lock.lock().await;

        if now - self.read_last() < min_interval {
            return false;
        }

        if let Err(err) = self.write_last(now) {
            // An unwritable state file must not fail the request.
            warn!(
                "unable to record POST time in {}: {err}",
                self.state_path.display()
            );
        }
        true
    }

    /// A missing or corrupt state file reads as 0 and is rewritten valid.
    fn read_last(&self) -> i64 {
        let parsed = fs::read_to_string(&self.state_path)
            .ok()
            .and_then(|text| text.trim().parse().ok());
        match parsed {
            Some(last) => last,
            None => {
                if let Err(err) = self.write_last(0) {
                    warn!(
                        "unable to reset state file {}: {err}",
                        self.state_path.display()
                    );
                }
                0
            }
        }
    }

    fn write_last(&self, value: i64) -> io::Result<()> {
        fs::write(&self.state_path, format!("{value}\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_file(contents: Option<&str>) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("last_post_time.int");
        if let Some(contents) = contents {
            fs::write(&path, contents).unwrap();
        }
        (dir, path)
    }

    #[tokio::test]
    async fn enforces_the_minimum_interval() {
        let (_dir, path) = state_file(Some("0\n"));
        let limiter = RateLimiter::new(path.clone());

        assert!(limiter.check_and_record(1000, 10).await);
        assert_eq!(fs::read_to_string(&path).unwrap(), "1000\n");

        assert!(!limiter.check_and_record(1005, 10).await);
        // A rejected request must not touch the state.
        assert_eq!(fs::read_to_string(&path).unwrap(), "1000\n");

        assert!(limiter.check_and_record(1011, 10).await);
        assert_eq!(fs::read_to_string(&path).unwrap(), "1011\n");
    }

    #[tokio::test]
    async fn state_survives_a_restart() {
        let (_dir, path) = state_file(Some("0\n"));

        let limiter = RateLimiter::new(path.clone());
        assert!(limiter.check_and_record(1000, 10).await);
        drop(limiter);

        let restarted = RateLimiter::new(path.clone());
        assert!(!restarted.check_and_record(1005, 10).await);
        assert!(restarted.check_and_record(1011, 10).await);
    }

    #[tokio::test]
    async fn missing_state_file_allows_and_is_created() {
        let (_dir, path) = state_file(None);
        let limiter = RateLimiter::new(path.clone());

        assert!(limiter.check_and_record(50, 10).await);
        assert_eq!(fs::read_to_string(&path).unwrap(), "50\n");
    }

    #[tokio::test]
    async fn corrupt_state_file_reads_as_zero() {
        let (_dir, path) = state_file(Some("not a number"));
        let limiter = RateLimiter::new(path.clone());

        assert!(limiter.check_and_record(100, 10).await);
        assert_eq!(fs::read_to_string(&path).unwrap(), "100\n");
    }

    #[tokio::test]
    async fn bootstrap_zeroes_an_absent_file_only() {
        let (_dir, path) = state_file(None);
        let limiter = RateLimiter::new(path.clone());
        limiter.bootstrap().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "0\n");

        fs::write(&path, "123\n").unwrap();
        limiter.bootstrap().unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "123\n");
    }
}

//! GET target resolution against the live directory tree.
//!
//! Resolution is total: every requested path maps to exactly one decision.
//! The handler subtree is checked both lexically (after dot-dot collapsing)
//! and on the canonicalized path, so neither `..` traversal nor a symlink
//! can expose handler sources as static files.

use std::ffi::OsStr;
use std::fs;
use std::path::{Component, Path, PathBuf};

const INDEX_FILE: &str = "index.html";

#[derive(Debug, PartialEq, Eq)]
pub enum GetDecision {
    /// The target lies inside the handler subtree.
    HandlerSource,
    /// The target is a directory without an index file.
    NoIndex,
    /// The target is missing but an `.html` sibling exists; redirect there.
    Redirect(String),
    /// A regular file to serve.
    File(PathBuf),
    /// Nothing matches.
    Missing,
}

pub struct PathResolver {
    live_root: PathBuf,
    scripts_root: PathBuf,
}

impl PathResolver {
    /// Both roots must already be canonical; `App::new` canonicalizes them
    /// once at startup.
    pub fn new(live_root: PathBuf, scripts_root: PathBuf) -> Self {
        Self {
            live_root,
            scripts_root,
        }
    }

    pub fn resolve(&self, url_path: &str) -> GetDecision {
        let Ok(decoded) = urlencoding::decode(url_path) else {
            return GetDecision::Missing;
        };

        let lexical = self.live_root.join(collapse(&decoded));
        if lexical.starts_with(&self.scripts_root) {
            return GetDecision::HandlerSource;
        }

        match fs::canonicalize(&lexical) {
            Ok(real) => {
                if real.starts_with(&self.scripts_root) {
                    // A symlink pointed into the handler subtree.
                    return GetDecision::HandlerSource;
                }
                if !real.starts_with(&self.live_root) {
                    // A symlink escaped the live tree entirely.
                    return GetDecision::Missing;
                }
                if real.is_dir() {
                    let index = real.join(INDEX_FILE);
                    if index.is_file() {
                        GetDecision::File(index)
                    } else {
                        GetDecision::NoIndex
                    }
                } else if real.is_file() {
                    GetDecision::File(real)
                } else {
                    GetDecision::Missing
                }
            }
            Err(_) => self.resolve_missing(&lexical, url_path),
        }
    }

    /// The `.html` normalization step: only an exact sibling triggers it.
    fn resolve_missing(&self, lexical: &Path, url_path: &str) -> GetDecision {
        let extensionless = lexical
            .file_name()
            .map(|name| !name.to_string_lossy().contains('.'))
            .unwrap_or(false);
        if !extensionless {
            return GetDecision::Missing;
        }

        let mut sibling = lexical.as_os_str().to_owned();
        sibling.push(".html");
        if Path::new(&sibling).is_file() {
            GetDecision::Redirect(format!("{url_path}.html"))
        } else {
            GetDecision::Missing
        }
    }
}

/// Collapse a URL path into a relative filesystem path, resolving `.` and
/// `..` lexically and never climbing above the root.
fn collapse(decoded: &str) -> PathBuf {
    let mut parts: Vec<&OsStr> = Vec::new();
    for component in Path::new(decoded.trim_start_matches('/')).components() {
        match component {
            Component::Normal(segment) => parts.push(segment),
            Component::ParentDir => {
                parts.pop();
            }
            _ => {}
        }
    }
    parts.iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn fixture() -> (tempfile::TempDir, PathResolver) {
        let dir = tempfile::tempdir().unwrap();
        let live = dir.path().join("live");
        fs::create_dir_all(live.join("scripts")).unwrap();
        fs::create_dir_all(live.join("notes")).unwrap();
        fs::create_dir_all(live.join("docs")).unwrap();
        fs::write(live.join("index.html"), "home").unwrap();
        fs::write(live.join("page.html"), "<p>page</p>").unwrap();
        fs::write(live.join("notes").join("secret_file.txt"), "x").unwrap();
        fs::write(live.join("docs").join("index.html"), "docs").unwrap();
        fs::write(live.join("scripts").join("guest.so"), "not a library").unwrap();

        let live_root = fs::canonicalize(&live).unwrap();
        let scripts_root = fs::canonicalize(live.join("scripts")).unwrap();
        (dir, PathResolver::new(live_root, scripts_root))
    }

    #[test]
    fn handler_subtree_is_never_served() {
        let (_dir, resolver) = fixture();
        assert_eq!(resolver.resolve("/scripts/guest.so"), GetDecision::HandlerSource);
        assert_eq!(resolver.resolve("/scripts"), GetDecision::HandlerSource);
        assert_eq!(resolver.resolve("/scripts/"), GetDecision::HandlerSource);
    }

    #[test]
    fn traversal_into_handler_subtree_is_caught() {
        let (_dir, resolver) = fixture();
        assert_eq!(
            resolver.resolve("/notes/../scripts/guest.so"),
            GetDecision::HandlerSource
        );
        assert_eq!(
            resolver.resolve("/../scripts/guest.so"),
            GetDecision::HandlerSource
        );
        assert_eq!(
            resolver.resolve("/%2e%2e/scripts/guest.so"),
            GetDecision::HandlerSource
        );
        assert_eq!(
            resolver.resolve("/notes/%2e%2e/scripts/guest.so"),
            GetDecision::HandlerSource
        );
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_cannot_escape() {
        let (dir, resolver) = fixture();
        let live = dir.path().join("live");
        std::os::unix::fs::symlink(live.join("scripts"), live.join("side")).unwrap();
        fs::write(dir.path().join("outside.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(dir.path().join("outside.txt"), live.join("leak")).unwrap();

        assert_eq!(
            resolver.resolve("/side/guest.so"),
            GetDecision::HandlerSource
        );
        assert_eq!(resolver.resolve("/leak"), GetDecision::Missing);
    }

    #[test]
    fn directories_require_an_index() {
        let (_dir, resolver) = fixture();
        assert_eq!(resolver.resolve("/notes"), GetDecision::NoIndex);
        assert_eq!(resolver.resolve("/notes/"), GetDecision::NoIndex);
        match resolver.resolve("/docs") {
            GetDecision::File(path) => assert!(path.ends_with("docs/index.html")),
            other => panic!("expected index file, got {other:?}"),
        }
        match resolver.resolve("/") {
            GetDecision::File(path) => assert!(path.ends_with("index.html")),
            other => panic!("expected index file, got {other:?}"),
        }
    }

    #[test]
    fn html_sibling_triggers_redirect() {
        let (_dir, resolver) = fixture();
        assert_eq!(
            resolver.resolve("/page"),
            GetDecision::Redirect("/page.html".to_string())
        );
        match resolver.resolve("/page.html") {
            GetDecision::File(path) => assert!(path.ends_with("page.html")),
            other => panic!("expected file, got {other:?}"),
        }
    }

    #[test]
    fn everything_else_is_missing() {
        let (_dir, resolver) = fixture();
        assert_eq!(resolver.resolve("/absent"), GetDecision::Missing);
        assert_eq!(resolver.resolve("/absent.txt"), GetDecision::Missing);
        // A dotted name never triggers the redirect probe.
        assert_eq!(resolver.resolve("/page.bak"), GetDecision::Missing);
    }
}

//! Document root backend.
//!
//! Everything the HTTP handler needs from the filesystem: request-path
//! decoding and sanitizing, root-confined resolution, hidden-file checks,
//! directory iteration, and file reading. Path sanitizing rejects rather
//! than repairs: anything with dot segments or markup-significant
//! characters resolves to "not found".

use once_cell::sync::Lazy;
use regex::Regex;
use std::io;
use std::path::{Path, PathBuf};

static INSECURE_PATH: Lazy<Regex> = Lazy::new(|| Regex::new("[<>&\"]").unwrap());

static ALLOWED_FILENAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][-_A-Za-z0-9.]*$").unwrap());

/// Decode and sanitize a request path into a root-relative path.
///
/// Returns `None` for anything that must not touch the filesystem: targets
/// not rooted at `/`, invalid percent escapes, dot segments or dot-edged
/// names, and paths containing `<>&"`. The empty string means the document
/// root itself.
pub fn sanitize_request_path(raw: &str) -> Option<String> {
    let decoded = percent_decode(raw)?;

    if !decoded.starts_with('/') {
        return None;
    }
    let rel = &decoded[1..];

    if rel.starts_with('.')
        || rel.ends_with('.')
        || rel.contains("/.")
        || rel.contains("./")
        || INSECURE_PATH.is_match(rel)
    {
        return None;
    }

    Some(rel.to_string())
}

/// Whether a name may appear in a directory listing.
pub fn is_allowed_filename(name: &str) -> bool {
    ALLOWED_FILENAME.is_match(name)
}

fn percent_decode(raw: &str) -> Option<String> {
    let bytes = raw.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hi = hex_digit(*bytes.get(i + 1)?)?;
            let lo = hex_digit(*bytes.get(i + 2)?)?;
            out.push(hi * 16 + lo);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(out).ok()
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

/// The directory static content is served from.
///
/// The root is canonicalized at configuration time; every resolved path is
/// canonicalized again and required to stay inside it, so symlinks cannot
/// lead a request out of the tree.
pub struct DocRoot {
    root: PathBuf,
}

impl DocRoot {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a sanitized root-relative path to a real filesystem path.
    ///
    /// `None` when the path does not exist or escapes the root.
    pub fn resolve(&self, rel: &str) -> Option<PathBuf> {
        let real = self.root.join(rel).canonicalize().ok()?;
        real.starts_with(&self.root).then_some(real)
    }

    /// Dot-prefixed names are never served.
    pub fn is_hidden(path: &Path) -> bool {
        path.file_name()
            .map(|name| name.to_string_lossy().starts_with('.'))
            .unwrap_or(false)
    }

    /// Names of the visible, readable entries of `dir` with allowed
    /// filenames, sorted.
    pub fn list(&self, dir: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('.') || !is_allowed_filename(&name) {
                continue;
            }
            if entry.metadata().is_err() {
                continue;
            }
            names.push(name);
        }
        names.sort();
        Ok(names)
    }

    /// Whole-file read for transfer.
    pub fn read(&self, file: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_docroot(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "serve-a-file-content-{}-{}",
            tag,
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir.canonicalize().unwrap()
    }

    #[test]
    fn sanitize_accepts_plain_paths() {
        assert_eq!(
            sanitize_request_path("/index.html"),
            Some("index.html".to_string())
        );
        assert_eq!(
            sanitize_request_path("/sub/dir/page.html"),
            Some("sub/dir/page.html".to_string())
        );
        assert_eq!(sanitize_request_path("/"), Some(String::new()));
    }

    #[test]
    fn sanitize_decodes_percent_escapes() {
        assert_eq!(
            sanitize_request_path("/a%20b.txt"),
            Some("a b.txt".to_string())
        );
        assert_eq!(sanitize_request_path("/bad%zz"), None);
        assert_eq!(sanitize_request_path("/truncated%2"), None);
    }

    #[test]
    fn sanitize_rejects_traversal_and_hidden() {
        assert_eq!(sanitize_request_path("/../etc/passwd"), None);
        assert_eq!(sanitize_request_path("/a/../b"), None);
        assert_eq!(sanitize_request_path("/%2e%2e/secret"), None);
        assert_eq!(sanitize_request_path("/.hidden"), None);
        assert_eq!(sanitize_request_path("/dir/.git/config"), None);
        assert_eq!(sanitize_request_path("/name."), None);
    }

    #[test]
    fn sanitize_rejects_unrooted_and_insecure() {
        assert_eq!(sanitize_request_path("no-slash"), None);
        assert_eq!(sanitize_request_path("/a<b>"), None);
        assert_eq!(sanitize_request_path("/a&b"), None);
        assert_eq!(sanitize_request_path("/a\"b"), None);
    }

    #[test]
    fn allowed_filenames() {
        assert!(is_allowed_filename("index.html"));
        assert!(is_allowed_filename("a_b-c.d"));
        assert!(!is_allowed_filename(".hidden"));
        assert!(!is_allowed_filename("-leading-dash"));
        assert!(!is_allowed_filename("with space"));
        assert!(!is_allowed_filename(""));
    }

    #[test]
    fn resolve_confines_to_root() {
        let root = temp_docroot("resolve");
        std::fs::write(root.join("a.txt"), b"hello").unwrap();
        let docroot = DocRoot::new(root.clone());

        assert_eq!(docroot.resolve("a.txt"), Some(root.join("a.txt")));
        assert_eq!(docroot.resolve(""), Some(root.clone()));
        assert_eq!(docroot.resolve("missing.txt"), None);
        // Even an unsanitized relative path cannot escape.
        assert_eq!(docroot.resolve(".."), None);
    }

    #[test]
    fn hidden_paths_are_detected() {
        assert!(DocRoot::is_hidden(Path::new("/tmp/.secret")));
        assert!(!DocRoot::is_hidden(Path::new("/tmp/visible.txt")));
    }

    #[test]
    fn list_filters_and_sorts() {
        let root = temp_docroot("list");
        std::fs::write(root.join("b.txt"), b"b").unwrap();
        std::fs::write(root.join("a.txt"), b"a").unwrap();
        std::fs::write(root.join(".dotfile"), b"x").unwrap();
        std::fs::write(root.join("bad name"), b"x").unwrap();
        std::fs::create_dir(root.join("sub")).unwrap();

        let docroot = DocRoot::new(root.clone());
        let names = docroot.list(&root).unwrap();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
    }
}

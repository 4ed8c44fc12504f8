//! Public-asset directory served for GET requests that match no route.

use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::error::ConfigError;

#[derive(Debug, Clone)]
pub struct StaticFiles {
    base_dir: PathBuf,
}

impl StaticFiles {
    /// # Errors
    ///
    /// [`ConfigError::MissingDirectory`] when `base` is not an existing directory.
    pub fn new<P: Into<PathBuf>>(base: P) -> Result<Self, ConfigError> {
        let base_dir = base.into();
        if !base_dir.is_dir() {
            return Err(ConfigError::MissingDirectory { path: base_dir });
        }
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Only plain components are accepted; `..`, roots and prefixes reject the path.
    fn map_path(&self, url_path: &str) -> Option<PathBuf> {
        let mut pb = self.base_dir.clone();
        for comp in Path::new(url_path.trim_start_matches('/')).components() {
            match comp {
                Component::Normal(s) => pb.push(s),
                Component::CurDir => {}
                _ => return None,
            }
        }
        Some(pb)
    }

    fn content_type(path: &Path) -> &'static str {
        match path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or("")
            .to_lowercase()
            .as_str()
        {
            "html" | "htm" => "text/html",
            "css" => "text/css",
            "js" | "mjs" => "application/javascript",
            "json" => "application/json",
            "txt" => "text/plain",
            "svg" => "image/svg+xml",
            "png" => "image/png",
            "jpg" | "jpeg" => "image/jpeg",
            "ico" => "image/x-icon",
            _ => "application/octet-stream",
        }
    }

    /// File bytes and content type, `Ok(None)` when nothing is served at `url_path`.
    ///
    /// # Errors
    ///
    /// I/O failures other than a missing file.
    pub fn load(&self, url_path: &str) -> io::Result<Option<(Vec<u8>, &'static str)>> {
        let Some(path) = self.map_path(url_path) else {
            debug!(path = %url_path, "Rejected static path");
            return Ok(None);
        };
        let path = if path.is_dir() { path.join("index.html") } else { path };
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some((bytes, Self::content_type(&path))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn public_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("hello.txt"), "Hello\n").unwrap();
        fs::create_dir(dir.path().join("docs")).unwrap();
        fs::write(dir.path().join("docs/index.html"), "<h1>Docs</h1>").unwrap();
        dir
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let err = StaticFiles::new("/definitely/not/here").unwrap_err();
        assert!(matches!(err, ConfigError::MissingDirectory { .. }));
    }

    #[test]
    fn test_map_path_prevents_traversal() {
        let dir = public_dir();
        let sf = StaticFiles::new(dir.path()).unwrap();
        assert!(sf.map_path("../Cargo.toml").is_none());
        assert!(sf.map_path("/a/../../etc/passwd").is_none());
        assert!(sf.load("/../hello.txt").unwrap().is_none());
    }

    #[test]
    fn test_load_plain_file_and_index() {
        let dir = public_dir();
        let sf = StaticFiles::new(dir.path()).unwrap();
        let (bytes, ct) = sf.load("/hello.txt").unwrap().unwrap();
        assert_eq!(ct, "text/plain");
        assert_eq!(bytes, b"Hello\n");

        let (bytes, ct) = sf.load("/docs").unwrap().unwrap();
        assert_eq!(ct, "text/html");
        assert_eq!(bytes, b"<h1>Docs</h1>");

        assert!(sf.load("/nope.css").unwrap().is_none());
    }
}

//! Code-resolution roots.
//!
//! A [`Repository`] is the directory tree module ids are resolved against.
//! [`WebappRepository`] resolves inside the deployed web application;
//! [`FileRepository`] is a plain filesystem directory.

use crate::config::ServletContext;
use crate::error::{JsgiError, Result};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// A root that module sources are loaded from.
pub trait Repository: fmt::Debug + Send + Sync {
    /// Whether the root exists.
    fn exists(&self) -> bool;

    /// Absolute (or as given) filesystem location of the root.
    fn root(&self) -> &Path;

    /// Resolve a path relative to the root. Absolute paths pass through.
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root().join(path)
        }
    }

    /// Read a resource below the root.
    fn read(&self, path: &Path) -> Result<String> {
        let full = self.resolve(path);
        fs::read_to_string(&full).map_err(|e| JsgiError::CodeRoot {
            path: full,
            message: e.to_string(),
        })
    }

    /// Last modification time of a resource, if it can be determined.
    fn modified(&self, path: &Path) -> Option<SystemTime> {
        fs::metadata(self.resolve(path)).ok()?.modified().ok()
    }
}

/// Repository backed by a plain directory.
#[derive(Debug, Clone)]
pub struct FileRepository {
    root: PathBuf,
}

impl FileRepository {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl Repository for FileRepository {
    fn exists(&self) -> bool {
        self.root.is_dir()
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

/// Repository rooted inside the hosting web application.
#[derive(Debug, Clone)]
pub struct WebappRepository {
    root: Option<PathBuf>,
    hint: String,
}

impl WebappRepository {
    pub fn new(context: &ServletContext, hint: impl Into<String>) -> Self {
        let hint = hint.into();
        Self {
            root: context.real_path(&hint),
            hint,
        }
    }

    /// The location hint this repository was created with.
    pub fn hint(&self) -> &str {
        &self.hint
    }
}

impl Repository for WebappRepository {
    fn exists(&self) -> bool {
        self.root.as_deref().is_some_and(Path::is_dir)
    }

    fn root(&self) -> &Path {
        self.root.as_deref().unwrap_or_else(|| Path::new(&self.hint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_file_repository_resolve() {
        let repo = FileRepository::new("/srv/app");
        assert_eq!(repo.resolve(Path::new("lib")), PathBuf::from("/srv/app/lib"));
        assert_eq!(repo.resolve(Path::new("/opt/x")), PathBuf::from("/opt/x"));
    }

    #[test]
    fn test_webapp_repository_exists() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("WEB-INF")).unwrap();

        let ctx = ServletContext::new("", temp.path());
        assert!(WebappRepository::new(&ctx, "WEB-INF").exists());
        assert!(!WebappRepository::new(&ctx, "missing").exists());
        assert!(!WebappRepository::new(&ServletContext::detached(""), "WEB-INF").exists());
    }

    #[test]
    fn test_read_missing_resource() {
        let temp = TempDir::new().unwrap();
        let repo = FileRepository::new(temp.path());
        let err = repo.read(Path::new("nope.rhai")).unwrap_err();
        assert!(matches!(err, JsgiError::CodeRoot { .. }));
    }
}

use crate::error::ServiceError;
use crate::result::{ServiceFuture, ServiceResult};
use futures::future::{self, FutureExt};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::rc::Rc;
use tracing::debug;

/// How a fetch may use previously loaded text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheOptions {
    /// Skip any cached copy and fetch again
    pub reload: bool,
}

impl CacheOptions {
    pub fn reload() -> Self {
        Self { reload: true }
    }
}

/// Resource fetching abstraction for templates and package sources
pub trait ResourceLoader {
    fn fetch_text(&self, url: &str, options: CacheOptions) -> ServiceFuture<String>;
}

/// Loader reading from a directory on disk; URLs are paths relative to it
pub struct FsLoader {
    root: PathBuf,
    cache: RefCell<HashMap<String, String>>,
}

impl FsLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RefCell::new(HashMap::new()),
        }
    }

    /// Resolve `url` below the root, refusing to leave it
    pub fn resolve(&self, url: &str) -> ServiceResult<PathBuf> {
        let relative = Path::new(url.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| matches!(c, Component::ParentDir | Component::Prefix(_)))
        {
            return Err(ServiceError::not_found(url));
        }
        Ok(self.root.join(relative))
    }

    fn read(&self, url: &str, options: CacheOptions) -> ServiceResult<String> {
        if !options.reload {
            if let Some(text) = self.cache.borrow().get(url) {
                return Ok(text.clone());
            }
        }

        let path = self.resolve(url)?;
        if !path.exists() {
            return Err(ServiceError::not_found(url));
        }
        debug!(url, path = %path.display(), "reading resource");
        let text = std::fs::read_to_string(&path)
            .map_err(|err| ServiceError::io(path.display().to_string(), &err))?;
        self.cache
            .borrow_mut()
            .insert(url.to_string(), text.clone());
        Ok(text)
    }
}

impl ResourceLoader for FsLoader {
    fn fetch_text(&self, url: &str, options: CacheOptions) -> ServiceFuture<String> {
        future::ready(self.read(url, options)).boxed_local()
    }
}

/// In-memory loader for tests and embedding
#[derive(Default)]
pub struct MemoryLoader {
    files: RefCell<HashMap<String, String>>,
    fetches: RefCell<HashMap<String, usize>>,
}

impl MemoryLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_file(self, url: impl Into<String>, text: impl Into<String>) -> Self {
        self.add_file(url, text);
        self
    }

    pub fn add_file(&self, url: impl Into<String>, text: impl Into<String>) {
        self.files.borrow_mut().insert(url.into(), text.into());
    }

    /// How many times `url` was fetched
    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.borrow().get(url).copied().unwrap_or(0)
    }
}

impl ResourceLoader for MemoryLoader {
    fn fetch_text(&self, url: &str, _options: CacheOptions) -> ServiceFuture<String> {
        *self.fetches.borrow_mut().entry(url.to_string()).or_insert(0) += 1;
        let result = self
            .files
            .borrow()
            .get(url)
            .cloned()
            .ok_or_else(|| ServiceError::not_found(url));
        future::ready(result).boxed_local()
    }
}

impl<T: ResourceLoader + ?Sized> ResourceLoader for Rc<T> {
    fn fetch_text(&self, url: &str, options: CacheOptions) -> ServiceFuture<String> {
        (**self).fetch_text(url, options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn test_memory_loader_counts_fetches() {
        let loader = MemoryLoader::new().with_file("/views/home.html", "<p>home</p>");

        let text = block_on(loader.fetch_text("/views/home.html", CacheOptions::default())).unwrap();
        assert_eq!(text, "<p>home</p>");
        assert_eq!(loader.fetch_count("/views/home.html"), 1);

        let missing = block_on(loader.fetch_text("/nope.html", CacheOptions::default()));
        assert_eq!(missing, Err(ServiceError::not_found("/nope.html")));
    }

    #[test]
    fn test_fs_loader_rejects_parent_components() {
        let loader = FsLoader::new("/srv/templates");
        assert!(loader.resolve("../etc/passwd").is_err());
        assert_eq!(
            loader.resolve("/a/b.html").unwrap(),
            PathBuf::from("/srv/templates/a/b.html")
        );
    }

    #[test]
    fn test_fs_loader_reads_and_caches() {
        let dir = std::env::temp_dir().join(format!("sprig-loader-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("page.html"), "v1").unwrap();

        let loader = FsLoader::new(&dir);
        assert_eq!(block_on(loader.fetch_text("page.html", CacheOptions::default())).unwrap(), "v1");

        std::fs::write(dir.join("page.html"), "v2").unwrap();
        assert_eq!(block_on(loader.fetch_text("page.html", CacheOptions::default())).unwrap(), "v1");
        assert_eq!(block_on(loader.fetch_text("page.html", CacheOptions::reload())).unwrap(), "v2");

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

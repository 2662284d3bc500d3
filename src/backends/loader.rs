//! Dynamic library loading
//!
//! [`DylibLoader`] opens real shared objects through `libloading`;
//! [`MemoryLoader`] serves in-process libraries made of Rust closures, which
//! is what embedders and tests use when no shared object is at hand.

use std::collections::HashMap;
use std::ffi::c_void;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use super::native::NativeFunction;

/// Handle of an open library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LibraryHandle(pub u32);

/// Cleanup routine a library wants run when it is closed
pub type Destructor = Arc<dyn Fn() + Send + Sync>;

/// Library loading errors
#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("library `{0}` not found")]
    NotFound(String),
    #[error("failed to open `{name}`: {reason}")]
    Open { name: String, reason: String },
}

/// Dynamic library loader collaborator
pub trait LibraryLoader {
    /// Canonical name of the library `name` refers to, if it exists
    fn locate(
        &self,
        name: &str,
        search_paths: &[PathBuf],
    ) -> Option<String>;

    /// Open a located library
    fn open(
        &mut self,
        canonical: &str,
    ) -> Result<LibraryHandle, LoaderError>;

    /// Look up a symbol of an open library
    fn symbol(
        &self,
        handle: LibraryHandle,
        name: &str,
    ) -> Option<NativeFunction>;

    /// Cleanup routines to run, in order, before the library is closed
    fn destructors(
        &self,
        _handle: LibraryHandle,
    ) -> Vec<Destructor> {
        Vec::new()
    }

    /// Close an open library
    fn close(
        &mut self,
        handle: LibraryHandle,
    );
}

/// Loader for shared objects on disk
#[derive(Default)]
pub struct DylibLoader {
    libraries: HashMap<u32, (String, libloading::Library)>,
    next_id: u32,
}

impl DylibLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whether a file name has a shared-object extension
pub fn looks_like_shared_object(name: &str) -> bool {
    name.ends_with(".so")
        || name.contains(".so.")
        || name.ends_with(".dylib")
        || name.ends_with(".dll")
}

impl fmt::Debug for DylibLoader {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("DylibLoader")
            .field("open", &self.libraries.len())
            .finish()
    }
}

impl LibraryLoader for DylibLoader {
    fn locate(
        &self,
        name: &str,
        search_paths: &[PathBuf],
    ) -> Option<String> {
        let direct = Path::new(name);
        if direct.is_file() {
            return direct
                .canonicalize()
                .ok()
                .map(|p| p.to_string_lossy().into_owned());
        }
        if direct.components().count() == 1 {
            let candidates = [name.to_string(), format!("lib{}.so", name)];
            for dir in search_paths {
                for candidate in &candidates {
                    let path = dir.join(candidate);
                    if path.is_file() {
                        return path
                            .canonicalize()
                            .ok()
                            .map(|p| p.to_string_lossy().into_owned());
                    }
                }
            }
            // Left to the system loader's own search
            if looks_like_shared_object(name) {
                return Some(name.to_string());
            }
        }
        None
    }

    #[allow(unsafe_code)]
    fn open(
        &mut self,
        canonical: &str,
    ) -> Result<LibraryHandle, LoaderError> {
        // SAFETY: running a library's initialization routines is the point of
        // loading it; the caller chose the library.
        let library = unsafe { libloading::Library::new(canonical) }.map_err(|e| {
            LoaderError::Open {
                name: canonical.to_string(),
                reason: e.to_string(),
            }
        })?;
        let id = self.next_id;
        self.next_id += 1;
        self.libraries.insert(id, (canonical.to_string(), library));
        debug!("opened shared object `{}` as {}", canonical, id);
        Ok(LibraryHandle(id))
    }

    #[allow(unsafe_code)]
    fn symbol(
        &self,
        handle: LibraryHandle,
        name: &str,
    ) -> Option<NativeFunction> {
        let (_, library) = self.libraries.get(&handle.0)?;
        // SAFETY: the pointer is only called through `NativeFunction::call`,
        // which fixes the integer-only C signature.
        let address = unsafe {
            library
                .get::<*const c_void>(name.as_bytes())
                .map(|sym| *sym as usize)
                .ok()?
        };
        Some(NativeFunction::Raw {
            name: name.to_string(),
            address,
        })
    }

    fn close(
        &mut self,
        handle: LibraryHandle,
    ) {
        if let Some((name, library)) = self.libraries.remove(&handle.0) {
            drop(library);
            debug!("closed shared object `{}`", name);
        }
    }
}

/// An in-process library
#[derive(Clone, Default)]
pub struct MemoryLibrary {
    functions: IndexMap<String, NativeFunction>,
    destructors: Vec<Destructor>,
}

impl MemoryLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Export a function
    pub fn with_function(
        mut self,
        name: &str,
        f: impl Fn(&[i64]) -> i64 + Send + Sync + 'static,
    ) -> Self {
        self.functions
            .insert(name.to_string(), NativeFunction::host(f));
        self
    }

    /// Register a cleanup routine run when the library goes away
    pub fn with_destructor(
        mut self,
        f: impl Fn() + Send + Sync + 'static,
    ) -> Self {
        self.destructors.push(Arc::new(f));
        self
    }
}

impl fmt::Debug for MemoryLibrary {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("MemoryLibrary")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("destructors", &self.destructors.len())
            .finish()
    }
}

/// Libraries a [`MemoryLoader`] can open; shared between clones
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    libraries: Arc<Mutex<IndexMap<String, MemoryLibrary>>>,
}

impl MemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make a library available under `name`
    pub fn provide(
        &self,
        name: &str,
        library: MemoryLibrary,
    ) {
        self.libraries.lock().insert(name.to_string(), library);
    }

    fn get(
        &self,
        name: &str,
    ) -> Option<MemoryLibrary> {
        self.libraries.lock().get(name).cloned()
    }
}

/// Loader serving libraries from a [`MemoryCatalog`]
#[derive(Debug, Default)]
pub struct MemoryLoader {
    catalog: MemoryCatalog,
    open: HashMap<u32, (String, MemoryLibrary)>,
    next_id: u32,
}

impl MemoryLoader {
    pub fn new(catalog: MemoryCatalog) -> Self {
        Self {
            catalog,
            open: HashMap::new(),
            next_id: 0,
        }
    }

    /// Number of libraries currently open
    pub fn open_count(&self) -> usize {
        self.open.len()
    }
}

impl LibraryLoader for MemoryLoader {
    fn locate(
        &self,
        name: &str,
        _search_paths: &[PathBuf],
    ) -> Option<String> {
        self.catalog.get(name).map(|_| name.to_string())
    }

    fn open(
        &mut self,
        canonical: &str,
    ) -> Result<LibraryHandle, LoaderError> {
        let library = self
            .catalog
            .get(canonical)
            .ok_or_else(|| LoaderError::NotFound(canonical.to_string()))?;
        let id = self.next_id;
        self.next_id += 1;
        self.open.insert(id, (canonical.to_string(), library));
        Ok(LibraryHandle(id))
    }

    fn symbol(
        &self,
        handle: LibraryHandle,
        name: &str,
    ) -> Option<NativeFunction> {
        self.open
            .get(&handle.0)
            .and_then(|(_, library)| library.functions.get(name).cloned())
    }

    fn destructors(
        &self,
        handle: LibraryHandle,
    ) -> Vec<Destructor> {
        self.open
            .get(&handle.0)
            .map(|(_, library)| library.destructors.clone())
            .unwrap_or_default()
    }

    fn close(
        &mut self,
        handle: LibraryHandle,
    ) {
        self.open.remove(&handle.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_loader_serves_catalog() {
        let catalog = MemoryCatalog::new();
        catalog.provide("libmath", MemoryLibrary::new().with_function("twice", |a| a[0] * 2));
        let mut loader = MemoryLoader::new(catalog.clone());

        assert_eq!(loader.locate("libmath", &[]), Some("libmath".to_string()));
        assert_eq!(loader.locate("libother", &[]), None);

        let handle = loader.open("libmath").unwrap();
        let twice = loader.symbol(handle, "twice").unwrap();
        assert_eq!(twice.call(&[21]).unwrap(), 42);
        assert!(loader.symbol(handle, "thrice").is_none());

        loader.close(handle);
        assert!(loader.symbol(handle, "twice").is_none());
        assert_eq!(loader.open_count(), 0);
    }

    #[test]
    fn test_memory_loader_reports_destructors() {
        let catalog = MemoryCatalog::new();
        catalog.provide("libd", MemoryLibrary::new().with_destructor(|| {}));
        let mut loader = MemoryLoader::new(catalog);
        let handle = loader.open("libd").unwrap();
        assert_eq!(loader.destructors(handle).len(), 1);
    }

    #[test]
    fn test_dylib_missing_library() {
        let loader = DylibLoader::new();
        assert!(loader.locate("/nonexistent/libnothing.txt", &[]).is_none());
        assert!(loader.locate("nothing_here", &[]).is_none());
    }

    #[test]
    fn test_dylib_search_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("libfake.so");
        std::fs::write(&path, b"not really a library").unwrap();

        let mut loader = DylibLoader::new();
        let located = loader
            .locate("fake", &[dir.path().to_path_buf()])
            .unwrap();
        assert!(located.ends_with("libfake.so"));
        assert!(matches!(
            loader.open(&located),
            Err(LoaderError::Open { .. })
        ));
    }
}

//! Process symbol resolution
//!
//! Symbols the JIT does not define are looked up in this order: symbols
//! added explicitly, open libraries in load order, then the lazy function
//! creator. Whatever the lazy creator hands out is cached.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use indexmap::IndexMap;
use tracing::{debug, trace};

use super::atexit::{AtExitAction, AtExitCallback, AtExitOwner, AtExitRegistry};
use crate::backends::loader::{Destructor, LibraryHandle, LibraryLoader, LoaderError};
use crate::backends::{NativeFunction, RuntimeHost, SymbolAddress, Value};
use crate::kernel::transaction::DeclId;

/// Last-resort provider of native symbols
pub type LazyFunctionCreator = Box<dyn FnMut(&str) -> Option<NativeFunction>>;

#[derive(Debug, Clone)]
pub struct OpenLibrary {
    /// Name the library was requested under
    pub requested: String,
    pub handle: LibraryHandle,
    pub permanent: bool,
}

pub struct SymbolResolver {
    explicit: IndexMap<String, NativeFunction>,
    /// Keyed by canonical name, in load order
    libraries: IndexMap<String, OpenLibrary>,
    loader: Box<dyn LibraryLoader>,
    lazy: Option<LazyFunctionCreator>,
    lazy_cache: HashMap<String, NativeFunction>,
}

impl fmt::Debug for SymbolResolver {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        f.debug_struct("SymbolResolver")
            .field("explicit", &self.explicit.keys().collect::<Vec<_>>())
            .field("libraries", &self.libraries)
            .field("lazy", &self.lazy.is_some())
            .finish()
    }
}

impl SymbolResolver {
    pub fn new(loader: Box<dyn LibraryLoader>) -> Self {
        Self {
            explicit: IndexMap::new(),
            libraries: IndexMap::new(),
            loader,
            lazy: None,
            lazy_cache: HashMap::new(),
        }
    }

    /// Register a process symbol; replaces an earlier one of the same name
    pub fn add_symbol(
        &mut self,
        name: &str,
        function: NativeFunction,
    ) {
        self.explicit.insert(name.to_string(), function);
    }

    pub fn set_lazy_creator(
        &mut self,
        creator: LazyFunctionCreator,
    ) {
        self.lazy = Some(creator);
    }

    pub fn resolve(
        &mut self,
        name: &str,
    ) -> Option<NativeFunction> {
        if let Some(function) = self.explicit.get(name) {
            return Some(function.clone());
        }
        for library in self.libraries.values() {
            if let Some(function) = self.loader.symbol(library.handle, name) {
                return Some(function);
            }
        }
        if let Some(function) = self.lazy_cache.get(name) {
            return Some(function.clone());
        }
        let function = self.lazy.as_mut().and_then(|create| create(name))?;
        trace!("lazy function creator provided `{}`", name);
        self.lazy_cache.insert(name.to_string(), function.clone());
        Some(function)
    }

    pub fn locate_library(
        &self,
        name: &str,
        search_paths: &[PathBuf],
    ) -> Option<String> {
        self.loader.locate(name, search_paths)
    }

    /// Open library registered under a canonical or requested name
    pub fn find_library(
        &self,
        name: &str,
    ) -> Option<(&str, &OpenLibrary)> {
        self.libraries
            .iter()
            .find(|(canonical, library)| canonical.as_str() == name || library.requested == name)
            .map(|(canonical, library)| (canonical.as_str(), library))
    }

    pub fn open_library(
        &mut self,
        requested: &str,
        canonical: &str,
        permanent: bool,
    ) -> Result<LibraryHandle, LoaderError> {
        let handle = self.loader.open(canonical)?;
        self.libraries.insert(
            canonical.to_string(),
            OpenLibrary {
                requested: requested.to_string(),
                handle,
                permanent,
            },
        );
        debug!("library `{}` is open", canonical);
        Ok(handle)
    }

    pub fn library_destructors(
        &self,
        handle: LibraryHandle,
    ) -> Vec<Destructor> {
        self.loader.destructors(handle)
    }

    /// Close an open library; its symbols stop resolving
    pub fn close_library(
        &mut self,
        canonical: &str,
    ) -> Option<OpenLibrary> {
        let library = self.libraries.shift_remove(canonical)?;
        self.loader.close(library.handle);
        debug!("library `{}` is closed", canonical);
        Some(library)
    }
}

/// [`RuntimeHost`] seen by code running on behalf of one owner
pub struct ExecutionHost<'a> {
    pub symbols: &'a mut SymbolResolver,
    pub at_exit: &'a mut AtExitRegistry,
    pub owner: AtExitOwner,
    pub from_decl: Option<DeclId>,
}

impl RuntimeHost for ExecutionHost<'_> {
    fn resolve_native(
        &mut self,
        name: &str,
    ) -> Option<NativeFunction> {
        self.symbols.resolve(name)
    }

    fn register_at_exit(
        &mut self,
        function: &str,
        address: SymbolAddress,
        arg: Value,
    ) {
        trace!("{} registers at-exit `{}` at {}", self.owner, function, address);
        self.at_exit.register(AtExitAction {
            callback: AtExitCallback::Jit {
                function: function.to_string(),
                address,
                arg,
            },
            owner: self.owner.clone(),
            from_decl: self.from_decl,
        });
    }
}

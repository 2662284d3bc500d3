//! Program state shared by the pipeline stages
//!
//! One explicit object instead of process-wide singletons; the interpreter
//! owns it and lends it to the compiler and the engine per call.

use crate::backends::loader::LibraryHandle;

use super::engine::atexit::AtExitRegistry;
use super::transaction::TransactionLog;

/// Kind of a loaded file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Source,
    DynamicLibrary,
    /// Precompiled code
    Binary,
}

/// Entry of the append-only loaded-file log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedFileRecord {
    /// Canonical name
    pub name: String,
    pub kind: FileKind,
    /// Handle of the loaded module, for libraries
    pub library: Option<LibraryHandle>,
}

/// Growing program state
#[derive(Debug, Default)]
pub struct InterpreterContext {
    /// Committed transactions in commit order
    pub log: TransactionLog,
    pub loaded_files: Vec<LoadedFileRecord>,
    /// Outstanding at-exit actions
    pub at_exit: AtExitRegistry,
}

impl InterpreterContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Latest record for `name` of the given kind
    pub fn find_loaded(
        &self,
        name: &str,
        kind: FileKind,
    ) -> Option<&LoadedFileRecord> {
        self.loaded_files
            .iter()
            .rev()
            .find(|record| record.name == name && record.kind == kind)
    }

    pub fn record_loaded(
        &mut self,
        record: LoadedFileRecord,
    ) {
        self.loaded_files.push(record);
    }
}

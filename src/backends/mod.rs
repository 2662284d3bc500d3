//! Code generation and execution collaborators
//!
//! The execution engine never looks inside generated code. It talks to a
//! [`JitBackend`] that turns a lowered unit into a module, resolves symbols and
//! runs functions, and hands the backend a [`RuntimeHost`] for everything the
//! backend cannot resolve on its own.
//!
//! # Architecture
//!
//! ```text
//! CodeUnit (from a front end)
//!         |
//!         v
//!    JitBackend::emit ──► ModuleHandle
//!         |
//!         v
//!    JitBackend::run ──► Value
//!         |
//!         v
//!    RuntimeHost (natives, at-exit registration)
//! ```

pub mod ir;
pub mod jit;
pub mod loader;
pub mod native;
pub mod value;

use std::fmt;

use thiserror::Error;

pub use native::NativeFunction;
pub use value::Value;

use crate::kernel::transaction::DeclId;

/// Handle of an emitted module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleHandle(pub u32);

/// What a symbol address points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolKind {
    Function,
    Global,
    Initializer,
}

/// Address of a generated entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymbolAddress {
    pub module: ModuleHandle,
    pub kind: SymbolKind,
    pub index: u32,
}

impl fmt::Display for SymbolAddress {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        let kind = match self.kind {
            SymbolKind::Function => "fn",
            SymbolKind::Global => "global",
            SymbolKind::Initializer => "init",
        };
        write!(f, "{}:{}#{}", self.module.0, kind, self.index)
    }
}

/// Static initializer of a module, in declaration order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StaticInitializer {
    pub address: SymbolAddress,
    /// Declaration the initializer belongs to
    pub decl: DeclId,
}

/// Failure to generate code for a well-formed unit
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodegenError {
    #[error("symbol `{0}` is already defined by a live module")]
    DuplicateSymbol(String),
    #[error("function `{name}` needs {slots} frame slots, limit is {limit}")]
    FrameTooLarge {
        name: String,
        slots: usize,
        limit: usize,
    },
}

/// Fault raised by running code
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecFault {
    #[error("unresolved symbol `{0}`")]
    Unresolved(String),
    #[error("native function `{name}` cannot take {arity} arguments")]
    NativeArity { name: String, arity: usize },
    #[error("division by zero")]
    DivisionByZero,
    #[error("call depth {depth} exceeded")]
    StackOverflow { depth: usize },
}

/// Services the engine offers to running code
pub trait RuntimeHost {
    /// Resolve a symbol the backend does not define itself
    fn resolve_native(
        &mut self,
        name: &str,
    ) -> Option<NativeFunction>;

    /// Record `function(arg)` to run when the current owner goes away.
    ///
    /// `address` is the code `function` resolved to at registration.
    fn register_at_exit(
        &mut self,
        function: &str,
        address: SymbolAddress,
        arg: Value,
    );
}

/// JIT/codegen collaborator
pub trait JitBackend {
    /// Unit of lowered code accepted by [`JitBackend::emit`]
    type Unit;

    /// Generate and install code for a unit
    fn emit(
        &mut self,
        unit: &Self::Unit,
    ) -> Result<ModuleHandle, CodegenError>;

    /// Symbols defined by a live module
    fn module_symbols(
        &self,
        module: ModuleHandle,
    ) -> Vec<String>;

    /// Symbols referenced but not defined by a live module
    fn module_references(
        &self,
        module: ModuleHandle,
    ) -> Vec<String>;

    /// Symbols referenced directly by the code at `address`
    fn references(
        &self,
        address: SymbolAddress,
    ) -> Vec<String>;

    /// Static initializers of a module, in declaration order
    fn static_initializers(
        &self,
        module: ModuleHandle,
    ) -> Vec<StaticInitializer>;

    /// Find a live symbol
    fn resolve_symbol(
        &self,
        name: &str,
    ) -> Option<SymbolAddress>;

    /// Run the code at `address`
    fn run(
        &mut self,
        address: SymbolAddress,
        args: &[Value],
        host: &mut dyn RuntimeHost,
    ) -> Result<Value, ExecFault>;

    /// Check whether a module is still installed
    fn is_live(
        &self,
        module: ModuleHandle,
    ) -> bool;

    /// Make a module's symbols unreachable and release its storage
    fn unload_module(
        &mut self,
        module: ModuleHandle,
    );
}

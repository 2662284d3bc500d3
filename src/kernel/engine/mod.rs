//! Execution engine
//!
//! Generates code for committed transactions, runs their static
//! initializers exactly once, resolves symbols and runs entry functions.
//! At-exit actions registered while running are keyed to the transaction
//! (or library) on whose behalf the code ran, so unloading can reverse them.
//!
//! # Code state of a transaction
//!
//! ```text
//! Pending ──emit──► Emitted { initialized: false } ──init──► Emitted { initialized: true }
//!    │
//!    └────────────► Failed (codegen error)
//! NoCodeGen (code generation disabled)
//! ```

pub mod atexit;
pub mod symbols;

use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::backends::loader::LibraryHandle;
use crate::backends::{
    CodegenError, ExecFault, JitBackend, ModuleHandle, NativeFunction, SymbolAddress, Value,
};
use crate::kernel::context::{FileKind, InterpreterContext, LoadedFileRecord};
use crate::kernel::transaction::{Transaction, TransactionId, TransactionState};
use atexit::{AtExitAction, AtExitCallback, AtExitOwner};
use symbols::{ExecutionHost, LazyFunctionCreator, SymbolResolver};

pub use crate::backends::loader::LibraryLoader;

/// Outcome of an execution request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionResult {
    Success,
    /// Code generation is disabled for the transaction
    NoCodeGen,
    /// The function exists but has no generated code
    FunctionNotCompiled,
    /// Missing definitions; retry once they are available
    UnresolvedSymbols,
    /// The backend rejected the transaction's code
    CompilationError,
    UnknownFunction,
    /// The running code faulted
    Faulted,
}

/// Detailed result of [`ExecutionEngine::emit_and_run`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub result: ExecutionResult,
    /// Value of the entry function, if one ran
    pub value: Option<Value>,
    /// Names that could not be resolved, sorted
    pub unresolved: Vec<String>,
    pub fault: Option<ExecFault>,
    pub codegen_error: Option<CodegenError>,
}

impl Execution {
    pub fn new(result: ExecutionResult) -> Self {
        Self {
            result,
            value: None,
            unresolved: Vec::new(),
            fault: None,
            codegen_error: None,
        }
    }

    fn unresolved(names: Vec<String>) -> Self {
        Self {
            unresolved: names,
            ..Self::new(ExecutionResult::UnresolvedSymbols)
        }
    }

    fn faulted(fault: ExecFault) -> Self {
        Self {
            fault: Some(fault),
            ..Self::new(ExecutionResult::Faulted)
        }
    }

    pub fn is_success(&self) -> bool {
        self.result == ExecutionResult::Success
    }
}

/// Outcome of a library load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadLibResult {
    Success,
    AlreadyLoaded,
    Error,
}

/// Outcome of an unload request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnloadResult {
    Unloaded,
    /// Refused: these live transactions reference the target's symbols
    HasDependents(Vec<TransactionId>),
    NotFound,
    /// Refused: the library was loaded permanently
    Permanent,
}

/// Where a symbol lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolLocation {
    Jit(SymbolAddress),
    Native,
}

/// Public view of a transaction's code state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeStatus {
    Pending,
    NoCodeGen,
    Emitted { initialized: bool },
    Failed,
}

enum CodeState<U> {
    Pending(U),
    NoCodeGen,
    Emitted {
        module: ModuleHandle,
        initialized: bool,
        symbols: Vec<String>,
        references: Vec<String>,
    },
    Failed(CodegenError),
}

impl<U> CodeState<U> {
    fn status(&self) -> CodeStatus {
        match self {
            CodeState::Pending(_) => CodeStatus::Pending,
            CodeState::NoCodeGen => CodeStatus::NoCodeGen,
            CodeState::Emitted { initialized, .. } => CodeStatus::Emitted {
                initialized: *initialized,
            },
            CodeState::Failed(_) => CodeStatus::Failed,
        }
    }
}

/// Drives a [`JitBackend`] on behalf of committed transactions
pub struct ExecutionEngine<B: JitBackend> {
    backend: B,
    states: BTreeMap<TransactionId, CodeState<B::Unit>>,
    resolver: SymbolResolver,
}

impl<B: JitBackend> ExecutionEngine<B> {
    pub fn new(
        backend: B,
        loader: Box<dyn LibraryLoader>,
    ) -> Self {
        Self {
            backend,
            states: BTreeMap::new(),
            resolver: SymbolResolver::new(loader),
        }
    }

    /// Start tracking a committed transaction and its lowered code
    pub fn track(
        &mut self,
        transaction: &Transaction,
        unit: B::Unit,
    ) {
        let state = if transaction.options().code_generation {
            CodeState::Pending(unit)
        } else {
            CodeState::NoCodeGen
        };
        self.states.insert(transaction.id(), state);
    }

    pub fn status(
        &self,
        id: TransactionId,
    ) -> Option<CodeStatus> {
        self.states.get(&id).map(CodeState::status)
    }

    pub fn add_symbol(
        &mut self,
        name: &str,
        function: NativeFunction,
    ) {
        self.resolver.add_symbol(name, function);
    }

    pub fn install_lazy_function_creator(
        &mut self,
        creator: LazyFunctionCreator,
    ) {
        self.resolver.set_lazy_creator(creator);
    }

    /// Emit every pending transaction, in commit order
    fn emit_pending(&mut self) {
        let pending: Vec<TransactionId> = self
            .states
            .iter()
            .filter(|(_, state)| matches!(state, CodeState::Pending(_)))
            .map(|(id, _)| *id)
            .collect();
        for id in pending {
            let Some(CodeState::Pending(unit)) = self.states.remove(&id) else {
                continue;
            };
            let state = match self.backend.emit(&unit) {
                Ok(module) => {
                    debug!("transaction {} emitted as module {}", id, module.0);
                    CodeState::Emitted {
                        module,
                        initialized: false,
                        symbols: self.backend.module_symbols(module),
                        references: self.backend.module_references(module),
                    }
                }
                Err(err) => {
                    warn!("code generation for transaction {} failed: {}", id, err);
                    CodeState::Failed(err)
                }
            };
            self.states.insert(id, state);
        }
    }

    /// Generate code, run pending static initializers and the entry.
    ///
    /// An id that is not in `ctx`'s log, for instance one already unloaded,
    /// reports [`ExecutionResult::UnknownFunction`].
    ///
    /// # Panics
    ///
    /// If the logged transaction is not committed.
    pub fn emit_and_run(
        &mut self,
        ctx: &mut InterpreterContext,
        id: TransactionId,
        entry: Option<&str>,
    ) -> Execution {
        let Some(transaction) = ctx.log.get(id) else {
            debug!("transaction {} is not in the log", id);
            return Execution::new(ExecutionResult::UnknownFunction);
        };
        assert_eq!(
            transaction.state(),
            TransactionState::Committed,
            "transaction {} is not committed",
            id
        );
        let entry_decl = transaction.decls().last().copied();

        match self.states.get(&id) {
            Some(CodeState::NoCodeGen) => return Execution::new(ExecutionResult::NoCodeGen),
            None => return Execution::new(ExecutionResult::FunctionNotCompiled),
            Some(_) => {}
        }

        self.emit_pending();
        match self.states.get(&id) {
            Some(CodeState::Failed(err)) => {
                return Execution {
                    codegen_error: Some(err.clone()),
                    ..Execution::new(ExecutionResult::CompilationError)
                };
            }
            Some(CodeState::Emitted { symbols, .. }) => {
                if let Some(entry) = entry {
                    if !symbols.iter().any(|s| s == entry) {
                        return Execution::new(ExecutionResult::UnknownFunction);
                    }
                }
            }
            _ => return Execution::new(ExecutionResult::FunctionNotCompiled),
        }

        if let Some(stop) = self.run_static_initializers(ctx, id) {
            return stop;
        }

        let Some(entry) = entry else {
            return Execution::new(ExecutionResult::Success);
        };
        let Some(address) = self.backend.resolve_symbol(entry) else {
            return Execution::new(ExecutionResult::UnknownFunction);
        };
        let missing = self.missing_symbols(vec![address]);
        if !missing.is_empty() {
            debug!("`{}` cannot run, missing {:?}", entry, missing);
            return Execution::unresolved(missing);
        }

        let mut host = ExecutionHost {
            symbols: &mut self.resolver,
            at_exit: &mut ctx.at_exit,
            owner: AtExitOwner::Transaction(id),
            from_decl: entry_decl,
        };
        match self.backend.run(address, &[], &mut host) {
            Ok(value) => {
                debug!("`{}` returned {}", entry, value);
                Execution {
                    value: Some(value),
                    ..Execution::new(ExecutionResult::Success)
                }
            }
            Err(fault) => {
                warn!("`{}` faulted: {}", entry, fault);
                Execution::faulted(fault)
            }
        }
    }

    /// Run the initializers of emitted, uninitialized transactions in
    /// commit order; returns the execution to report when `target` cannot
    /// run.
    ///
    /// A transaction whose initializers reach a missing symbol stays
    /// uninitialized, and so does every later transaction that references
    /// one of its symbols. Unrelated transactions are initialized anyway.
    fn run_static_initializers(
        &mut self,
        ctx: &mut InterpreterContext,
        target: TransactionId,
    ) -> Option<Execution> {
        let waiting: Vec<(TransactionId, ModuleHandle, Vec<String>, Vec<String>)> = self
            .states
            .iter()
            .filter_map(|(id, state)| match state {
                CodeState::Emitted {
                    module,
                    initialized: false,
                    symbols,
                    references,
                } => Some((*id, *module, symbols.clone(), references.clone())),
                _ => None,
            })
            .collect();

        let mut blocked_symbols = HashSet::new();
        let mut missing_all = BTreeSet::new();
        let mut target_blocked = false;
        for (id, module, symbols, references) in waiting {
            let initializers = self.backend.static_initializers(module);
            let missing =
                self.missing_symbols(initializers.iter().map(|init| init.address).collect());
            let behind_blocked = references.iter().any(|r| blocked_symbols.contains(r));
            if !missing.is_empty() || behind_blocked {
                debug!(
                    "static initialization of transaction {} waits for {:?}",
                    id, missing
                );
                missing_all.extend(missing);
                blocked_symbols.extend(symbols);
                target_blocked |= id == target;
                continue;
            }

            if let Some(CodeState::Emitted { initialized, .. }) = self.states.get_mut(&id) {
                *initialized = true;
            }
            for init in initializers {
                let mut host = ExecutionHost {
                    symbols: &mut self.resolver,
                    at_exit: &mut ctx.at_exit,
                    owner: AtExitOwner::Transaction(id),
                    from_decl: Some(init.decl),
                };
                if let Err(fault) = self.backend.run(init.address, &[], &mut host) {
                    warn!("static initializer of transaction {} faulted: {}", id, fault);
                    if id == target {
                        return Some(Execution::faulted(fault));
                    }
                    break;
                }
            }
            debug!("transaction {} initialized", id);
        }

        if target_blocked {
            return Some(Execution::unresolved(missing_all.into_iter().collect()));
        }
        None
    }

    /// Names transitively reachable from `roots` that nothing defines
    fn missing_symbols(
        &mut self,
        roots: Vec<SymbolAddress>,
    ) -> Vec<String> {
        let mut queue: VecDeque<SymbolAddress> = roots.into();
        let mut visited = HashSet::new();
        let mut seen_names = BTreeSet::new();
        let mut missing = BTreeSet::new();

        while let Some(address) = queue.pop_front() {
            if !visited.insert(address) {
                continue;
            }
            for name in self.backend.references(address) {
                if !seen_names.insert(name.clone()) {
                    continue;
                }
                if let Some(target) = self.backend.resolve_symbol(&name) {
                    queue.push_back(target);
                } else if self.resolver.resolve(&name).is_none() {
                    missing.insert(name);
                }
            }
        }
        missing.into_iter().collect()
    }

    /// Live transactions that reference symbols of `id`
    pub fn dependents(
        &mut self,
        id: TransactionId,
    ) -> Vec<TransactionId> {
        self.emit_pending();
        let Some(CodeState::Emitted { symbols, .. }) = self.states.get(&id) else {
            return Vec::new();
        };
        self.states
            .iter()
            .filter(|(other, _)| **other != id)
            .filter_map(|(other, state)| match state {
                CodeState::Emitted { references, .. }
                    if references.iter().any(|r| symbols.contains(r)) =>
                {
                    Some(*other)
                }
                _ => None,
            })
            .collect()
    }

    /// Run the transaction's at-exit actions and drop its code.
    ///
    /// Returns the number of actions run.
    pub fn unload(
        &mut self,
        ctx: &mut InterpreterContext,
        id: TransactionId,
    ) -> usize {
        let actions = ctx.at_exit.take_owned(&AtExitOwner::Transaction(id));
        let count = actions.len();
        self.run_at_exit(ctx, actions);
        if let Some(CodeState::Emitted { module, .. }) = self.states.remove(&id) {
            self.backend.unload_module(module);
        }
        info!("transaction {} unloaded ({} at-exit action(s))", id, count);
        count
    }

    /// Run every outstanding at-exit action, newest first
    pub fn run_static_destructors_once(
        &mut self,
        ctx: &mut InterpreterContext,
    ) -> usize {
        let actions = ctx.at_exit.drain_all();
        let count = actions.len();
        self.run_at_exit(ctx, actions);
        count
    }

    fn run_at_exit(
        &mut self,
        ctx: &mut InterpreterContext,
        actions: Vec<AtExitAction>,
    ) {
        for action in actions {
            match action.callback {
                AtExitCallback::Native(destructor) => destructor(),
                AtExitCallback::Jit {
                    function,
                    address,
                    arg,
                } => {
                    if !self.backend.is_live(address.module) {
                        warn!("at-exit function `{}` was unloaded, skipping", function);
                        continue;
                    }
                    let mut host = ExecutionHost {
                        symbols: &mut self.resolver,
                        at_exit: &mut ctx.at_exit,
                        owner: action.owner.clone(),
                        from_decl: action.from_decl,
                    };
                    if let Err(fault) = self.backend.run(address, &[arg], &mut host) {
                        warn!("at-exit function `{}` faulted: {}", function, fault);
                    }
                }
            }
        }
    }

    /// Where `name` currently resolves to
    pub fn locate_symbol(
        &mut self,
        name: &str,
    ) -> Option<SymbolLocation> {
        self.emit_pending();
        if let Some(address) = self.backend.resolve_symbol(name) {
            return Some(SymbolLocation::Jit(address));
        }
        self.resolver.resolve(name).map(|_| SymbolLocation::Native)
    }

    /// Open a library and register its destructors as at-exit actions
    pub fn load_library(
        &mut self,
        ctx: &mut InterpreterContext,
        name: &str,
        permanent: bool,
        search_paths: &[PathBuf],
    ) -> LoadLibResult {
        let Some(canonical) = self.resolver.locate_library(name, search_paths) else {
            warn!("library `{}` not found", name);
            return LoadLibResult::Error;
        };
        if self.resolver.find_library(&canonical).is_some() {
            return LoadLibResult::AlreadyLoaded;
        }
        let handle = match self.resolver.open_library(name, &canonical, permanent) {
            Ok(handle) => handle,
            Err(err) => {
                warn!("{}", err);
                return LoadLibResult::Error;
            }
        };
        self.register_library_destructors(ctx, &canonical, handle);
        ctx.record_loaded(LoadedFileRecord {
            name: canonical.clone(),
            kind: FileKind::DynamicLibrary,
            library: Some(handle),
        });
        info!("loaded library `{}`", canonical);
        LoadLibResult::Success
    }

    fn register_library_destructors(
        &mut self,
        ctx: &mut InterpreterContext,
        canonical: &str,
        handle: LibraryHandle,
    ) {
        for destructor in self.resolver.library_destructors(handle) {
            ctx.at_exit.register(AtExitAction {
                callback: AtExitCallback::Native(destructor),
                owner: AtExitOwner::Library(canonical.to_string()),
                from_decl: None,
            });
        }
    }

    /// Canonical name of an open library
    pub fn library_name(
        &self,
        name: &str,
    ) -> Option<String> {
        self.resolver
            .find_library(name)
            .map(|(canonical, _)| canonical.to_string())
    }

    /// Run a library's at-exit actions and close it
    pub fn unload_library(
        &mut self,
        ctx: &mut InterpreterContext,
        name: &str,
    ) -> UnloadResult {
        let Some((canonical, library)) = self.resolver.find_library(name) else {
            return UnloadResult::NotFound;
        };
        if library.permanent {
            return UnloadResult::Permanent;
        }
        let canonical = canonical.to_string();
        let actions = ctx
            .at_exit
            .take_owned(&AtExitOwner::Library(canonical.clone()));
        self.run_at_exit(ctx, actions);
        self.resolver.close_library(&canonical);
        info!("unloaded library `{}`", canonical);
        UnloadResult::Unloaded
    }
}

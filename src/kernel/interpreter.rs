//! Interpreter façade
//!
//! Ties wrapping, incremental compilation and execution together behind a
//! small set of operations. Every operation reports a discriminant; none of
//! them fails by panicking on user input.
//!
//! ```rust
//! use weft::Interpreter;
//!
//! let mut interp = Interpreter::new();
//! assert!(interp.declare("int x = 5;").is_success());
//! assert_eq!(interp.evaluate("x + 1").value.and_then(|v| v.as_int()), Some(6));
//! ```

use std::fs;
use std::io::Write;
use std::path::Path;

use tracing::{debug, info, warn};

use super::callbacks::InterpreterCallbacks;
use super::compiler::{CompilationResult, CompileOutput, CompileRequest, IncrementalCompiler};
use super::context::{FileKind, InterpreterContext, LoadedFileRecord};
use super::engine::symbols::LazyFunctionCreator;
use super::engine::{
    CodeStatus, Execution, ExecutionEngine, ExecutionResult, LoadLibResult, SymbolLocation,
    UnloadResult,
};
use super::naming::UniqueNamer;
use super::transaction::{CompilationOptions, DeclId, Transaction, TransactionId};
use super::wrapper::{InputWrapper, WrapKind};
use crate::backends::jit::{JitConfig, TreeJit};
use crate::backends::loader::{looks_like_shared_object, DylibLoader, LibraryLoader};
use crate::backends::{ExecFault, JitBackend, NativeFunction, Value};
use crate::frontend::{CFrontEnd, FrontEnd};
use crate::util::config::{InterpreterConfig, UnloadPolicy};
use crate::util::diagnostic::Diagnostic;

/// Provides source text defining a missing symbol
pub type DefinitionProvider = Box<dyn FnMut(&str) -> Option<String>>;

/// How submitted text is treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InputMode {
    Declare,
    Parse,
    Evaluate,
    Echo,
    Execute,
}

/// Wrapped input buffered until it is lexically complete
#[derive(Debug)]
struct PendingInput {
    mode: InputMode,
    text: String,
}

/// Entity that can be unloaded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unloadable<'a> {
    Transaction(TransactionId),
    Library(&'a str),
}

/// Result of one interpreter operation
#[derive(Debug, Clone)]
pub struct Outcome {
    pub result: CompilationResult,
    pub transaction: Option<TransactionId>,
    /// Set when the input was executed
    pub execution: Option<ExecutionResult>,
    pub value: Option<Value>,
    /// Missing symbols when execution reported them.
    ///
    /// Providing them (`add_symbol`, `load_library`) or unloading the
    /// transaction whose initializer needs them lets later input run again.
    pub unresolved: Vec<String>,
    pub fault: Option<ExecFault>,
    pub diagnostics: Vec<Diagnostic>,
}

impl Outcome {
    fn compiled(output: CompileOutput) -> Self {
        Self {
            result: output.result,
            transaction: output.transaction,
            execution: None,
            value: None,
            unresolved: Vec::new(),
            fault: None,
            diagnostics: output.diagnostics,
        }
    }

    fn more_input() -> Self {
        Self {
            result: CompilationResult::MoreInputExpected,
            transaction: None,
            execution: None,
            value: None,
            unresolved: Vec::new(),
            fault: None,
            diagnostics: Vec::new(),
        }
    }

    fn with_execution(
        mut self,
        execution: Execution,
    ) -> Self {
        self.execution = Some(execution.result);
        self.value = execution.value;
        self.unresolved = execution.unresolved;
        self.fault = execution.fault;
        self
    }

    /// Compiled, and executed successfully if it ran at all
    pub fn is_success(&self) -> bool {
        self.result == CompilationResult::Success
            && self
                .execution
                .map_or(true, |e| e == ExecutionResult::Success)
    }

    pub fn needs_more_input(&self) -> bool {
        self.result == CompilationResult::MoreInputExpected
    }
}

/// The incremental interpreter
pub struct Interpreter<F = CFrontEnd, B = TreeJit>
where
    F: FrontEnd,
    B: JitBackend<Unit = F::Unit>,
{
    config: InterpreterConfig,
    ctx: InterpreterContext,
    compiler: IncrementalCompiler<F>,
    engine: ExecutionEngine<B>,
    wrapper: InputWrapper,
    pending: Option<PendingInput>,
    definition_provider: Option<DefinitionProvider>,
    callbacks: Option<Box<dyn InterpreterCallbacks>>,
    output: Box<dyn Write>,
}

impl Interpreter<CFrontEnd, TreeJit> {
    pub fn new() -> Self {
        Self::with_config(InterpreterConfig::default())
    }

    /// Interpreter loading shared objects from disk
    pub fn with_config(config: InterpreterConfig) -> Self {
        Self::with_loader(config, Box::new(DylibLoader::new()))
    }

    /// Interpreter with a custom library loader
    pub fn with_loader(
        config: InterpreterConfig,
        loader: Box<dyn LibraryLoader>,
    ) -> Self {
        let backend = TreeJit::with_config(JitConfig {
            max_call_depth: config.max_call_depth,
            max_frame_slots: config.max_frame_slots,
        });
        Self::with_parts(config, CFrontEnd::new(), backend, loader)
    }
}

impl Default for Interpreter<CFrontEnd, TreeJit> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F, B> Interpreter<F, B>
where
    F: FrontEnd,
    B: JitBackend<Unit = F::Unit>,
{
    pub fn with_parts(
        config: InterpreterConfig,
        front: F,
        backend: B,
        loader: Box<dyn LibraryLoader>,
    ) -> Self {
        Self {
            config,
            ctx: InterpreterContext::new(),
            compiler: IncrementalCompiler::new(front),
            engine: ExecutionEngine::new(backend, loader),
            wrapper: InputWrapper::new(),
            pending: None,
            definition_provider: None,
            callbacks: None,
            output: Box::new(std::io::stdout()),
        }
    }

    /// Redirect echoed values
    pub fn with_output(
        mut self,
        output: impl Write + 'static,
    ) -> Self {
        self.output = Box::new(output);
        self
    }

    /// Install an observer, replacing any earlier one
    pub fn set_callbacks(
        &mut self,
        callbacks: Option<Box<dyn InterpreterCallbacks>>,
    ) {
        self.callbacks = callbacks;
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Compile top-level declarations; code is generated on first use
    pub fn declare(
        &mut self,
        text: &str,
    ) -> Outcome {
        self.submit(text, InputMode::Declare)
    }

    /// Compile declarations without ever generating code
    pub fn parse(
        &mut self,
        text: &str,
    ) -> Outcome {
        self.submit(text, InputMode::Parse)
    }

    /// Compile and run `text`, capturing its value
    pub fn evaluate(
        &mut self,
        text: &str,
    ) -> Outcome {
        self.submit(text, InputMode::Evaluate)
    }

    /// Evaluate and print the value to the output sink
    pub fn echo(
        &mut self,
        text: &str,
    ) -> Outcome {
        self.submit(text, InputMode::Echo)
    }

    /// Compile and run `text` as statements, discarding any value
    pub fn execute(
        &mut self,
        text: &str,
    ) -> Outcome {
        self.submit(text, InputMode::Execute)
    }

    /// Declare or evaluate, whichever `text` calls for
    pub fn process(
        &mut self,
        text: &str,
    ) -> Outcome {
        if self.is_continuing() {
            return self.submit(text, InputMode::Evaluate);
        }
        if self.config.raw_input || !self.wrapper.needs_wrapping(text) {
            self.declare(text)
        } else {
            self.evaluate(text)
        }
    }

    fn submit(
        &mut self,
        text: &str,
        mode: InputMode,
    ) -> Outcome {
        if let Some(mut pending) = self.pending.take() {
            InputWrapper::join_continuation(&mut pending.text, text);
            return self.submit_wrapped(pending.text, pending.mode);
        }
        if self.compiler.has_open() {
            // The open transaction keeps the options it was started with.
            return self.compile_and_run(text, CompilationOptions::declaration(), None, None);
        }
        match mode {
            InputMode::Declare => {
                self.compile_and_run(text, CompilationOptions::declaration(), None, None)
            }
            InputMode::Parse => {
                self.compile_and_run(text, CompilationOptions::parse_only(), None, None)
            }
            InputMode::Evaluate | InputMode::Echo | InputMode::Execute => {
                self.submit_wrapped(text.to_string(), mode)
            }
        }
    }

    fn submit_wrapped(
        &mut self,
        text: String,
        mode: InputMode,
    ) -> Outcome {
        if self.config.raw_input || !self.wrapper.needs_wrapping(&text) {
            return self.compile_and_run(&text, CompilationOptions::execution(), None, None);
        }
        if !InputWrapper::is_complete(&text) {
            debug!("buffering incomplete input");
            self.pending = Some(PendingInput { mode, text });
            return Outcome::more_input();
        }

        let kind = match mode {
            InputMode::Execute => WrapKind::Statements,
            _ => InputWrapper::value_kind(&text),
        };
        let compiler = &self.compiler;
        let wrapped = self
            .wrapper
            .wrap(&text, kind, |name| compiler.is_name_declared(name));

        let mut outcome = self.compile_and_run(
            &wrapped.text,
            CompilationOptions::execution(),
            Some(wrapped.entry),
            None,
        );
        outcome.diagnostics = outcome
            .diagnostics
            .into_iter()
            .map(|diag| diag.remap(&wrapped.shim))
            .collect();
        if outcome.needs_more_input() {
            // Wrapped text is balanced, so the parser cannot really want more.
            self.compiler.abandon_open();
            outcome.result = CompilationResult::Failure;
        }

        if mode == InputMode::Echo {
            if let Some(value) = outcome.value {
                if let Err(err) = writeln!(self.output, "{}", value) {
                    warn!("cannot echo value: {}", err);
                }
            }
        }
        outcome
    }

    fn compile_and_run(
        &mut self,
        text: &str,
        options: CompilationOptions,
        entry: Option<String>,
        origin: Option<DeclId>,
    ) -> Outcome {
        let request = CompileRequest {
            input: text,
            options: options.with_fatal_warnings(self.config.fatal_warnings),
            entry,
            origin,
        };
        let output = self.compiler.compile(&mut self.ctx.log, request);
        let outcome = Outcome::compiled(output);
        if outcome.result != CompilationResult::Success {
            return outcome;
        }
        let Some(id) = outcome.transaction else {
            return outcome;
        };
        self.track_committed(id);

        let Some(transaction) = self.ctx.log.get(id) else {
            return outcome;
        };
        if !transaction.options().run_static_initializers {
            return outcome;
        }
        let entry = transaction.entry().map(str::to_string);
        let execution = self.run_with_autoload(id, entry.as_deref());
        outcome.with_execution(execution)
    }

    /// Hand a committed transaction's code to the engine
    fn track_committed(
        &mut self,
        id: TransactionId,
    ) {
        let Some(transaction) = self.ctx.log.get(id) else {
            return;
        };
        let unit = self.compiler.front_mut().lower(transaction);
        if self.config.print_ir {
            debug!("transaction {} lowered to {:#?}", id, unit);
        }
        self.engine.track(transaction, unit);
        if let Some(callbacks) = self.callbacks.as_mut() {
            callbacks.transaction_committed(transaction);
        }
    }

    /// Run, declaring definitions of missing symbols once if possible
    fn run_with_autoload(
        &mut self,
        id: TransactionId,
        entry: Option<&str>,
    ) -> Execution {
        let execution = self.engine.emit_and_run(&mut self.ctx, id, entry);
        if execution.result != ExecutionResult::UnresolvedSymbols {
            return execution;
        }
        let Some(provider) = self.definition_provider.as_mut() else {
            return execution;
        };

        let sources: Vec<(String, String)> = execution
            .unresolved
            .iter()
            .filter_map(|name| provider(name.as_str()).map(|source| (name.clone(), source)))
            .collect();
        let mut declared = 0;
        for (name, source) in sources {
            let origin = self.compiler.front().lookup(&name);
            let request = CompileRequest {
                input: &source,
                options: CompilationOptions::declaration(),
                entry: None,
                origin,
            };
            let output = self.compiler.compile(&mut self.ctx.log, request);
            match (output.result, output.transaction) {
                (CompilationResult::Success, Some(autoloaded)) => {
                    info!("autoloaded a definition of `{}`", name);
                    self.track_committed(autoloaded);
                    declared += 1;
                }
                (CompilationResult::MoreInputExpected, _) => {
                    self.compiler.abandon_open();
                    warn!("autoload source for `{}` is incomplete", name);
                }
                _ => warn!("autoload source for `{}` does not compile", name),
            }
        }

        if declared == 0 {
            execution
        } else {
            self.engine.emit_and_run(&mut self.ctx, id, entry)
        }
    }

    /// Load a source file or, if allowed, a shared library
    pub fn load_file(
        &mut self,
        path: impl AsRef<Path>,
        allow_shared_lib: bool,
    ) -> CompilationResult {
        let path = path.as_ref();
        let display = path.to_string_lossy();
        if allow_shared_lib && looks_like_shared_object(&display) {
            return match self.load_library(&display, false) {
                LoadLibResult::Error => CompilationResult::Failure,
                _ => CompilationResult::Success,
            };
        }

        let name = path
            .canonicalize()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|_| display.into_owned());
        if self.ctx.find_loaded(&name, FileKind::Source).is_some() {
            debug!("`{}` is already loaded", name);
            return CompilationResult::Success;
        }
        let source = match fs::read_to_string(path) {
            Ok(source) => source,
            Err(err) => {
                warn!("cannot read `{}`: {}", name, err);
                return CompilationResult::Failure;
            }
        };

        let outcome = self.compile_and_run(&source, CompilationOptions::declaration(), None, None);
        match outcome.result {
            CompilationResult::Success => {
                self.ctx.record_loaded(LoadedFileRecord {
                    name,
                    kind: FileKind::Source,
                    library: None,
                });
                CompilationResult::Success
            }
            CompilationResult::MoreInputExpected => {
                warn!("`{}` ends inside an unterminated construct", name);
                self.compiler.abandon_open();
                CompilationResult::Failure
            }
            CompilationResult::Failure => CompilationResult::Failure,
        }
    }

    /// Load a dynamic library
    pub fn load_library(
        &mut self,
        name: &str,
        permanent: bool,
    ) -> LoadLibResult {
        let result = self.engine.load_library(
            &mut self.ctx,
            name,
            permanent,
            &self.config.library_search_paths,
        );
        if result == LoadLibResult::Success {
            if let (Some(callbacks), Some(record)) =
                (self.callbacks.as_mut(), self.ctx.loaded_files.last())
            {
                callbacks.library_loaded(&record.name);
            }
        }
        result
    }

    /// Reverse a committed transaction or a loaded library
    pub fn unload(
        &mut self,
        entity: Unloadable<'_>,
    ) -> UnloadResult {
        let id = match entity {
            Unloadable::Library(name) => return self.unload_library(name),
            Unloadable::Transaction(id) => id,
        };
        if !self.ctx.log.contains(id) {
            return UnloadResult::NotFound;
        }

        let dependents = self.engine.dependents(id);
        if !dependents.is_empty() {
            match self.config.unload_policy {
                UnloadPolicy::RejectLiveDependents => {
                    info!(
                        "refusing to unload transaction {}: {} live dependent(s)",
                        id,
                        dependents.len()
                    );
                    return UnloadResult::HasDependents(dependents);
                }
                UnloadPolicy::AllowDangling => {
                    warn!(
                        "unloading transaction {} leaves dangling references in {:?}",
                        id, dependents
                    );
                }
            }
        }

        self.engine.unload(&mut self.ctx, id);
        let removed = self.compiler.unload(&mut self.ctx.log, id);
        if let (Some(callbacks), Some(removed)) = (self.callbacks.as_mut(), removed) {
            callbacks.transaction_unloaded(&removed);
        }
        UnloadResult::Unloaded
    }

    fn unload_library(
        &mut self,
        name: &str,
    ) -> UnloadResult {
        let canonical = self.engine.library_name(name);
        let result = self.engine.unload_library(&mut self.ctx, name);
        if result == UnloadResult::Unloaded {
            if let (Some(callbacks), Some(canonical)) = (self.callbacks.as_mut(), canonical) {
                callbacks.library_unloaded(&canonical);
            }
        }
        result
    }

    /// Unload the most recent committed transaction
    pub fn unload_last(&mut self) -> UnloadResult {
        match self.ctx.log.last().map(Transaction::id) {
            Some(id) => self.unload(Unloadable::Transaction(id)),
            None => UnloadResult::NotFound,
        }
    }

    pub fn create_unique_name(&mut self) -> String {
        self.wrapper.namer_mut().reserve()
    }

    pub fn is_unique_name(
        &self,
        name: &str,
    ) -> bool {
        UniqueNamer::is_generated(name)
    }

    /// Run a declared function that takes no arguments
    pub fn run_function(
        &mut self,
        name: &str,
    ) -> Execution {
        let Some(info) = self.compiler.front().function_info(name) else {
            return Execution::new(ExecutionResult::UnknownFunction);
        };
        if info.arity != 0 {
            return Execution::new(ExecutionResult::UnknownFunction);
        }
        let Some(definition) = info.definition else {
            return Execution::new(ExecutionResult::FunctionNotCompiled);
        };
        match self.engine.status(definition) {
            None | Some(CodeStatus::NoCodeGen) => {
                Execution::new(ExecutionResult::FunctionNotCompiled)
            }
            Some(_) => self.run_with_autoload(definition, Some(name)),
        }
    }

    /// Generate deferred code and run pending static initializers.
    ///
    /// An id that is not in the log reports `UnknownFunction`.
    pub fn emit_all_decls(
        &mut self,
        id: TransactionId,
    ) -> Execution {
        self.run_with_autoload(id, None)
    }

    /// Register a process symbol
    pub fn add_symbol(
        &mut self,
        name: &str,
        function: NativeFunction,
    ) {
        self.engine.add_symbol(name, function);
    }

    pub fn install_lazy_function_creator(
        &mut self,
        creator: LazyFunctionCreator,
    ) {
        self.engine.install_lazy_function_creator(creator);
    }

    /// Source of definitions for symbols found missing at execution time
    pub fn set_definition_provider(
        &mut self,
        provider: DefinitionProvider,
    ) {
        self.definition_provider = Some(provider);
    }

    pub fn address_of_global(
        &mut self,
        name: &str,
    ) -> Option<SymbolLocation> {
        self.engine.locate_symbol(name)
    }

    /// Run every outstanding at-exit action, newest first
    pub fn run_static_destructors_once(&mut self) -> usize {
        self.engine.run_static_destructors_once(&mut self.ctx)
    }

    /// Never wrap input from now on
    pub fn enable_raw_input(
        &mut self,
        raw: bool,
    ) {
        self.config.raw_input = raw;
    }

    pub fn is_declared(
        &self,
        name: &str,
    ) -> bool {
        self.compiler.is_name_declared(name)
    }

    pub fn loaded_files(&self) -> &[LoadedFileRecord] {
        &self.ctx.loaded_files
    }

    pub fn first_transaction(&self) -> Option<&Transaction> {
        self.ctx.log.first()
    }

    pub fn last_transaction(&self) -> Option<&Transaction> {
        self.ctx.log.last()
    }

    pub fn transaction(
        &self,
        id: TransactionId,
    ) -> Option<&Transaction> {
        self.ctx.log.get(id)
    }

    pub fn code_status(
        &self,
        id: TransactionId,
    ) -> Option<CodeStatus> {
        self.engine.status(id)
    }

    /// Whether the next input continues unfinished input
    pub fn is_continuing(&self) -> bool {
        self.pending.is_some() || self.compiler.has_open()
    }

    /// Drop unfinished input
    pub fn cancel_continuation(&mut self) {
        self.pending = None;
        if let Some(id) = self.compiler.abandon_open() {
            debug!("abandoned transaction {}", id);
        }
    }
}

impl<F, B> Drop for Interpreter<F, B>
where
    F: FrontEnd,
    B: JitBackend<Unit = F::Unit>,
{
    fn drop(&mut self) {
        if self.config.run_destructors_on_drop && !self.ctx.at_exit.is_empty() {
            let ran = self.run_static_destructors_once();
            debug!("ran {} at-exit action(s) on shutdown", ran);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declare_then_evaluate() {
        let mut interp = Interpreter::new();
        assert!(interp.declare("int x = 5;").is_success());
        let outcome = interp.evaluate("x + 1");
        assert_eq!(outcome.value, Some(Value::Int(6)));
        assert_eq!(interp.last_transaction().map(|t| t.id()), outcome.transaction);
    }

    #[test]
    fn test_wrapped_continuation_is_buffered() {
        let mut interp = Interpreter::new();
        let first = interp.evaluate("(1 +");
        assert!(first.needs_more_input());
        assert!(interp.is_continuing());
        assert_eq!(interp.evaluate(" 2)").value, Some(Value::Int(3)));
        assert!(!interp.is_continuing());
    }

    #[test]
    fn test_execute_discards_value() {
        let mut interp = Interpreter::new();
        interp.declare("int n = 0;");
        let outcome = interp.execute("n = n + 4;");
        assert_eq!(outcome.value, Some(Value::Void));
        assert_eq!(interp.evaluate("n").value, Some(Value::Int(4)));
    }

    #[test]
    fn test_diagnostics_point_at_user_line() {
        let mut interp = Interpreter::new();
        let outcome = interp.evaluate("nope + 1");
        assert_eq!(outcome.result, CompilationResult::Failure);
        assert_eq!(outcome.diagnostics[0].span.start.line, 1);
    }

    #[test]
    fn test_raw_input_never_wraps() {
        let mut interp = Interpreter::new();
        interp.enable_raw_input(true);
        assert_eq!(interp.process("1 + 1").result, CompilationResult::Failure);
        assert!(interp.process("int k = 2;").is_success());
    }

    #[test]
    fn test_unique_names() {
        let mut interp = Interpreter::new();
        let a = interp.create_unique_name();
        let b = interp.create_unique_name();
        assert_ne!(a, b);
        assert!(interp.is_unique_name(&a));
        assert!(!interp.is_unique_name("main"));
    }
}

//! Incremental compiler
//!
//! Feeds input to the front end inside a new or continuing transaction and
//! settles the transaction: committed, rolled back, or left collecting when
//! the input stops inside an unterminated construct.

use tracing::{debug, info};

use super::transaction::{
    CompilationOptions, DeclId, Transaction, TransactionId, TransactionLog, TransactionState,
};
use crate::frontend::{FrontEnd, ParseOutcome};
use crate::util::diagnostic::Diagnostic;

/// Result of one compilation request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilationResult {
    Success,
    Failure,
    /// The transaction stays open; call again with the continuation
    MoreInputExpected,
}

/// One compilation request
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub input: &'a str,
    pub options: CompilationOptions,
    /// Synthetic entry function of wrapped input
    pub entry: Option<String>,
    /// Declaration that triggered the request
    pub origin: Option<DeclId>,
}

impl<'a> CompileRequest<'a> {
    pub fn new(
        input: &'a str,
        options: CompilationOptions,
    ) -> Self {
        Self {
            input,
            options,
            entry: None,
            origin: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    pub result: CompilationResult,
    /// Transaction the request was compiled in
    pub transaction: Option<TransactionId>,
    /// Non-benign diagnostics
    pub diagnostics: Vec<Diagnostic>,
}

/// Drives a [`FrontEnd`] transaction by transaction
#[derive(Debug)]
pub struct IncrementalCompiler<F> {
    front: F,
    /// Transaction collecting continuation input
    open: Option<Transaction>,
}

impl<F: FrontEnd> IncrementalCompiler<F> {
    pub fn new(front: F) -> Self {
        Self { front, open: None }
    }

    pub fn front(&self) -> &F {
        &self.front
    }

    pub fn front_mut(&mut self) -> &mut F {
        &mut self.front
    }

    /// Whether a transaction waits for continuation input
    pub fn has_open(&self) -> bool {
        self.open.is_some()
    }

    pub fn is_name_declared(
        &self,
        name: &str,
    ) -> bool {
        self.front.lookup(name).is_some()
    }

    /// Begin a transaction explicitly.
    ///
    /// The returned scope rolls the transaction back unless it is committed
    /// or kept open.
    ///
    /// # Panics
    ///
    /// If another transaction is still collecting continuation input.
    pub fn begin_transaction(
        &mut self,
        log: &mut TransactionLog,
        options: CompilationOptions,
    ) -> TransactionScope<'_, F> {
        assert!(
            self.open.is_none(),
            "a transaction is still collecting input"
        );
        let transaction = Transaction::new(log.allocate_id(), options);
        debug!("begin transaction {}", transaction.id());
        TransactionScope {
            front: &mut self.front,
            open: &mut self.open,
            txn: Some(transaction),
        }
    }

    /// Compile one increment
    pub fn compile(
        &mut self,
        log: &mut TransactionLog,
        request: CompileRequest<'_>,
    ) -> CompileOutput {
        let transaction = match self.open.take() {
            Some(transaction) => {
                debug!("continue transaction {}", transaction.id());
                transaction
            }
            None => {
                let mut transaction = Transaction::new(log.allocate_id(), request.options);
                transaction.set_origin(request.origin);
                transaction.set_entry(request.entry);
                debug!("begin transaction {}", transaction.id());
                transaction
            }
        };
        let id = transaction.id();
        let fatal_warnings = transaction.options().fatal_warnings;
        let mut scope = TransactionScope {
            front: &mut self.front,
            open: &mut self.open,
            txn: Some(transaction),
        };

        let outcome = scope.feed(request.input);
        let diagnostics: Vec<Diagnostic> = scope
            .front
            .take_diagnostics()
            .into_iter()
            .filter(|diag| !diag.is_benign())
            .collect();

        let result = match outcome {
            ParseOutcome::Incomplete => {
                scope.keep_open();
                CompilationResult::MoreInputExpected
            }
            ParseOutcome::FatalDiagnostic => {
                scope.rollback();
                CompilationResult::Failure
            }
            ParseOutcome::Complete => {
                scope.complete();
                if diagnostics.iter().any(|diag| diag.is_fatal(fatal_warnings)) {
                    scope.rollback();
                    CompilationResult::Failure
                } else {
                    scope.set_diagnostics(diagnostics.clone());
                    scope.commit(log);
                    CompilationResult::Success
                }
            }
        };

        CompileOutput {
            result,
            transaction: Some(id),
            diagnostics,
        }
    }

    /// Roll back the transaction waiting for continuation input
    pub fn abandon_open(&mut self) -> Option<TransactionId> {
        let transaction = self.open.take()?;
        let id = transaction.id();
        rollback(&mut self.front, transaction);
        Some(id)
    }

    /// Remove an unloaded transaction from the log and hide its declarations
    pub fn unload(
        &mut self,
        log: &mut TransactionLog,
        id: TransactionId,
    ) -> Option<Transaction> {
        let transaction = log.remove(id)?;
        self.front.forget(&transaction);
        Some(transaction)
    }
}

fn rollback<F: FrontEnd>(
    front: &mut F,
    mut transaction: Transaction,
) {
    if !transaction.state().is_terminal() {
        transaction.mark_rolled_back();
    }
    front.rollback(&transaction);
    info!("rolled back transaction {}", transaction.id());
}

/// Scoped transaction that is rolled back unless settled otherwise
pub struct TransactionScope<'c, F: FrontEnd> {
    front: &'c mut F,
    open: &'c mut Option<Transaction>,
    txn: Option<Transaction>,
}

impl<F: FrontEnd> TransactionScope<'_, F> {
    fn current(&mut self) -> &mut Transaction {
        match self.txn.as_mut() {
            Some(transaction) => transaction,
            None => unreachable!("transaction scope already settled"),
        }
    }

    pub fn transaction(&self) -> Option<&Transaction> {
        self.txn.as_ref()
    }

    /// Feed input to the front end
    pub fn feed(
        &mut self,
        input: &str,
    ) -> ParseOutcome {
        let Self { front, txn, .. } = self;
        match txn.as_mut() {
            Some(transaction) => front.parse_increment(input, transaction),
            None => unreachable!("transaction scope already settled"),
        }
    }

    fn complete(&mut self) {
        self.current().mark_complete();
    }

    fn set_diagnostics(
        &mut self,
        diagnostics: Vec<Diagnostic>,
    ) {
        self.current().set_diagnostics(diagnostics);
    }

    /// Leave the transaction collecting for continuation input
    pub fn keep_open(mut self) {
        if let Some(transaction) = self.txn.take() {
            debug_assert_eq!(transaction.state(), TransactionState::Collecting);
            *self.open = Some(transaction);
        }
    }

    /// Commit and append to the log
    pub fn commit(
        mut self,
        log: &mut TransactionLog,
    ) -> Option<TransactionId> {
        let mut transaction = self.txn.take()?;
        if transaction.state() == TransactionState::Collecting {
            transaction.mark_complete();
        }
        transaction.mark_committed();
        self.front.commit(&transaction);
        let id = transaction.id();
        info!(
            "committed transaction {} ({} declaration(s))",
            id,
            transaction.decls().len()
        );
        log.append(transaction);
        Some(id)
    }

    pub fn rollback(mut self) {
        if let Some(transaction) = self.txn.take() {
            rollback(self.front, transaction);
        }
    }
}

impl<F: FrontEnd> Drop for TransactionScope<'_, F> {
    fn drop(&mut self) {
        if let Some(transaction) = self.txn.take() {
            rollback(self.front, transaction);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::CFrontEnd;
    use crate::util::diagnostic::DiagnosticCode;

    fn compile(
        compiler: &mut IncrementalCompiler<CFrontEnd>,
        log: &mut TransactionLog,
        input: &str,
    ) -> CompileOutput {
        compiler.compile(log, CompileRequest::new(input, CompilationOptions::declaration()))
    }

    #[test]
    fn test_success_commits_to_log() {
        let mut compiler = IncrementalCompiler::new(CFrontEnd::new());
        let mut log = TransactionLog::new();
        let out = compile(&mut compiler, &mut log, "int x = 5;");
        assert_eq!(out.result, CompilationResult::Success);
        assert_eq!(log.len(), 1);
        assert_eq!(log.last().map(Transaction::state), Some(TransactionState::Committed));
        assert!(compiler.is_name_declared("x"));
    }

    #[test]
    fn test_failure_leaves_no_trace() {
        let mut compiler = IncrementalCompiler::new(CFrontEnd::new());
        let mut log = TransactionLog::new();
        let out = compile(&mut compiler, &mut log, "int y = undefinedSymbol();");
        assert_eq!(out.result, CompilationResult::Failure);
        assert_eq!(out.diagnostics[0].code, DiagnosticCode::UndeclaredIdentifier);
        assert!(log.is_empty());
        assert!(!compiler.is_name_declared("y"));
    }

    #[test]
    fn test_continuation_keeps_one_transaction() {
        let mut compiler = IncrementalCompiler::new(CFrontEnd::new());
        let mut log = TransactionLog::new();
        let first = compile(&mut compiler, &mut log, "int f() {");
        assert_eq!(first.result, CompilationResult::MoreInputExpected);
        assert!(compiler.has_open());
        assert!(!compiler.is_name_declared("f"));

        let second = compile(&mut compiler, &mut log, "return 1; }");
        assert_eq!(second.result, CompilationResult::Success);
        assert_eq!(first.transaction, second.transaction);
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_benign_diagnostics_are_dropped() {
        let mut compiler = IncrementalCompiler::new(CFrontEnd::new());
        let mut log = TransactionLog::new();
        compile(&mut compiler, &mut log, "int a = 1;");
        let out = compile(&mut compiler, &mut log, "void f() { a == 1; a + 1; }");
        assert_eq!(out.result, CompilationResult::Success);
        assert!(out.diagnostics.is_empty());
    }

    #[test]
    fn test_fatal_warnings_roll_back() {
        let mut compiler = IncrementalCompiler::new(CFrontEnd::new());
        let mut log = TransactionLog::new();
        let options = CompilationOptions::declaration().with_fatal_warnings(true);
        let out = compiler.compile(
            &mut log,
            CompileRequest::new("int f(int c) { if (c) { return 1; } }", options),
        );
        assert_eq!(out.result, CompilationResult::Failure);
        assert_eq!(out.diagnostics[0].code, DiagnosticCode::MissingReturn);
        assert!(!compiler.is_name_declared("f"));

        let out = compile(&mut compiler, &mut log, "int f(int c) { if (c) { return 1; } }");
        assert_eq!(out.result, CompilationResult::Success);
        assert_eq!(out.diagnostics.len(), 1);
    }

    #[test]
    fn test_dropped_scope_rolls_back() {
        let mut compiler = IncrementalCompiler::new(CFrontEnd::new());
        let mut log = TransactionLog::new();
        {
            let mut scope = compiler.begin_transaction(&mut log, CompilationOptions::declaration());
            assert_eq!(scope.feed("int z = 3;"), ParseOutcome::Complete);
        }
        assert!(!compiler.is_name_declared("z"));
        assert!(log.is_empty());

        let mut scope = compiler.begin_transaction(&mut log, CompilationOptions::declaration());
        scope.feed("int z = 3;");
        let mut committed = TransactionLog::new();
        assert!(scope.commit(&mut committed).is_some());
        assert!(compiler.is_name_declared("z"));
    }

    #[test]
    fn test_unload_hides_declarations() {
        let mut compiler = IncrementalCompiler::new(CFrontEnd::new());
        let mut log = TransactionLog::new();
        let id = compile(&mut compiler, &mut log, "int g() { return 2; }")
            .transaction
            .unwrap();
        assert!(compiler.unload(&mut log, id).is_some());
        assert!(!compiler.is_name_declared("g"));
        assert!(log.is_empty());
        assert!(compiler.unload(&mut log, id).is_none());
    }

    #[test]
    fn test_abandon_open_transaction() {
        let mut compiler = IncrementalCompiler::new(CFrontEnd::new());
        let mut log = TransactionLog::new();
        compile(&mut compiler, &mut log, "int h() {");
        assert!(compiler.abandon_open().is_some());
        assert!(!compiler.has_open());
        assert_eq!(
            compile(&mut compiler, &mut log, "return 1; }").result,
            CompilationResult::Failure
        );
    }
}

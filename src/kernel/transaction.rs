//! Transactions
//!
//! A transaction is one atomically committed-or-rolled-back batch of
//! declarations produced by a single incremental compilation step.
//!
//! ```text
//! Collecting ──► Complete ──► Committed
//!     │              │
//!     └──────────────┴──────► RolledBack
//! ```

use std::collections::BTreeMap;
use std::fmt;

use super::wrapper::InputWrapper;
use crate::util::diagnostic::Diagnostic;

/// Sequence number of a transaction; establishes commit order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl fmt::Display for TransactionId {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Opaque handle to a declaration owned by the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclId(pub u32);

/// Lifecycle state of a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Declarations are being appended
    Collecting,
    /// The front end is done; nothing more will be added
    Complete,
    /// Declarations are visible to lookups and code generation
    Committed,
    /// Declarations were discarded
    RolledBack,
}

impl TransactionState {
    /// Whether no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }

    fn can_become(
        &self,
        next: TransactionState,
    ) -> bool {
        use TransactionState::*;
        matches!(
            (self, next),
            (Collecting, Complete)
                | (Collecting, RolledBack)
                | (Complete, Committed)
                | (Complete, RolledBack)
        )
    }
}

/// Options driving one compilation step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompilationOptions {
    /// Generate code for the declarations at all
    pub code_generation: bool,
    /// Emit and run static initializers right after commit
    pub run_static_initializers: bool,
    /// Non-benign warnings abort the transaction
    pub fatal_warnings: bool,
}

impl CompilationOptions {
    /// Declarations whose code is generated lazily, on first execution
    pub fn declaration() -> Self {
        Self {
            code_generation: true,
            run_static_initializers: false,
            fatal_warnings: false,
        }
    }

    /// Declarations that never get code (header import)
    pub fn parse_only() -> Self {
        Self {
            code_generation: false,
            run_static_initializers: false,
            fatal_warnings: false,
        }
    }

    /// Input that is executed right away
    pub fn execution() -> Self {
        Self {
            code_generation: true,
            run_static_initializers: true,
            fatal_warnings: false,
        }
    }

    /// Same options with `fatal_warnings` set
    pub fn with_fatal_warnings(
        mut self,
        fatal: bool,
    ) -> Self {
        self.fatal_warnings = fatal;
        self
    }
}

impl Default for CompilationOptions {
    fn default() -> Self {
        Self::declaration()
    }
}

/// One unit of incremental compilation
#[derive(Debug, Clone)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    decls: Vec<DeclId>,
    options: CompilationOptions,
    origin: Option<DeclId>,
    source: String,
    entry: Option<String>,
    diagnostics: Vec<Diagnostic>,
}

impl Transaction {
    /// Start collecting a new transaction
    pub fn new(
        id: TransactionId,
        options: CompilationOptions,
    ) -> Self {
        Self {
            id,
            state: TransactionState::Collecting,
            decls: Vec::new(),
            options,
            origin: None,
            source: String::new(),
            entry: None,
            diagnostics: Vec::new(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Declarations in declaration order
    pub fn decls(&self) -> &[DeclId] {
        &self.decls
    }

    pub fn options(&self) -> &CompilationOptions {
        &self.options
    }

    /// Declaration that triggered this transaction, if any
    pub fn origin(&self) -> Option<DeclId> {
        self.origin
    }

    pub fn set_origin(
        &mut self,
        origin: Option<DeclId>,
    ) {
        self.origin = origin;
    }

    /// Source text accumulated across continuation calls
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Append continuation text
    pub fn append_source(
        &mut self,
        text: &str,
    ) {
        assert_eq!(
            self.state,
            TransactionState::Collecting,
            "transaction {} no longer accepts input",
            self.id
        );
        InputWrapper::join_continuation(&mut self.source, text);
    }

    /// Append a declaration handle
    pub fn push_decl(
        &mut self,
        decl: DeclId,
    ) {
        assert_eq!(
            self.state,
            TransactionState::Collecting,
            "transaction {} no longer accepts declarations",
            self.id
        );
        self.decls.push(decl);
    }

    /// Name of the synthetic entry function, for wrapped input
    pub fn entry(&self) -> Option<&str> {
        self.entry.as_deref()
    }

    pub fn set_entry(
        &mut self,
        entry: Option<String>,
    ) {
        self.entry = entry;
    }

    /// Diagnostics kept after the benign ones were filtered out
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn set_diagnostics(
        &mut self,
        diagnostics: Vec<Diagnostic>,
    ) {
        self.diagnostics = diagnostics;
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn mark_complete(&mut self) {
        self.transition(TransactionState::Complete);
    }

    pub fn mark_committed(&mut self) {
        self.transition(TransactionState::Committed);
    }

    pub fn mark_rolled_back(&mut self) {
        self.transition(TransactionState::RolledBack);
    }

    fn transition(
        &mut self,
        next: TransactionState,
    ) {
        assert!(
            self.state.can_become(next),
            "invalid transition of transaction {}: {:?} -> {:?}",
            self.id,
            self.state,
            next
        );
        self.state = next;
    }
}

/// Totally ordered log of committed transactions
#[derive(Debug, Default)]
pub struct TransactionLog {
    entries: BTreeMap<TransactionId, Transaction>,
    next_seq: u64,
}

impl TransactionLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hand out the next sequence number
    pub fn allocate_id(&mut self) -> TransactionId {
        let id = TransactionId(self.next_seq);
        self.next_seq += 1;
        id
    }

    /// Append a committed transaction
    pub fn append(
        &mut self,
        transaction: Transaction,
    ) {
        assert_eq!(transaction.state(), TransactionState::Committed);
        debug_assert!(self
            .entries
            .keys()
            .next_back()
            .map_or(true, |last| *last < transaction.id()));
        self.entries.insert(transaction.id(), transaction);
    }

    pub fn get(
        &self,
        id: TransactionId,
    ) -> Option<&Transaction> {
        self.entries.get(&id)
    }

    pub fn contains(
        &self,
        id: TransactionId,
    ) -> bool {
        self.entries.contains_key(&id)
    }

    /// Remove an unloaded transaction
    pub fn remove(
        &mut self,
        id: TransactionId,
    ) -> Option<Transaction> {
        self.entries.remove(&id)
    }

    /// Transactions in commit order
    pub fn iter(&self) -> impl Iterator<Item = &Transaction> {
        self.entries.values()
    }

    pub fn first(&self) -> Option<&Transaction> {
        self.entries.values().next()
    }

    pub fn last(&self) -> Option<&Transaction> {
        self.entries.values().next_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Reference front end for mini-C
//!
//! Each call re-parses the whole text accumulated in a collecting
//! transaction, so feeding `s1` and then `s2` behaves exactly like feeding
//! `s1 + s2` at once. Nothing reaches the declaration table until the
//! accumulated text parses completely.

use std::collections::HashMap;

use tracing::{debug, trace};

use super::decls::{DeclKind, DeclTable};
use super::parser::{parse_program, ParseError};
use super::sema::analyze;
use super::{FrontEnd, FunctionInfo, ParseOutcome};
use crate::backends::ir::CodeUnit;
use crate::kernel::transaction::{DeclId, Transaction, TransactionId};
use crate::util::diagnostic::Diagnostic;

/// Front end for the mini-C language
#[derive(Debug, Default)]
pub struct CFrontEnd {
    table: DeclTable,
    /// Lowered code of transactions not yet handed out
    units: HashMap<TransactionId, CodeUnit>,
    diagnostics: Vec<Diagnostic>,
}

impl CFrontEnd {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live declarations
    pub fn live_declarations(&self) -> usize {
        self.table.live_count()
    }
}

impl FrontEnd for CFrontEnd {
    type Unit = CodeUnit;

    fn parse_increment(
        &mut self,
        input: &str,
        transaction: &mut Transaction,
    ) -> ParseOutcome {
        transaction.append_source(input);
        let items = match parse_program(transaction.source()) {
            Ok(items) => items,
            Err(ParseError::Incomplete) => {
                trace!("transaction {} awaits more input", transaction.id());
                return ParseOutcome::Incomplete;
            }
            Err(ParseError::Invalid(diag)) => {
                self.diagnostics.push(diag);
                return ParseOutcome::FatalDiagnostic;
            }
        };

        let analysis = analyze(&items, &mut self.table, transaction.id());
        let failed = analysis.has_errors();
        self.diagnostics.extend(analysis.diagnostics);
        for decl in analysis.decls {
            transaction.push_decl(decl);
        }
        if failed {
            return ParseOutcome::FatalDiagnostic;
        }
        debug!(
            "transaction {} declares {} item(s)",
            transaction.id(),
            transaction.decls().len()
        );
        self.units.insert(transaction.id(), analysis.unit);
        ParseOutcome::Complete
    }

    fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    fn commit(
        &mut self,
        transaction: &Transaction,
    ) {
        self.table.commit(transaction.id());
    }

    fn rollback(
        &mut self,
        transaction: &Transaction,
    ) {
        self.units.remove(&transaction.id());
        let erased = self.table.forget(transaction.id());
        trace!("rolled back {} declaration(s)", erased);
    }

    fn forget(
        &mut self,
        transaction: &Transaction,
    ) {
        self.units.remove(&transaction.id());
        self.table.forget(transaction.id());
    }

    fn lookup(
        &self,
        name: &str,
    ) -> Option<DeclId> {
        self.table.lookup(name).map(|r| r.id)
    }

    fn decl_name(
        &self,
        decl: DeclId,
    ) -> Option<&str> {
        self.table.get(decl).map(|r| r.name.as_str())
    }

    fn decl_owner(
        &self,
        decl: DeclId,
    ) -> Option<TransactionId> {
        self.table.get(decl).map(|r| r.owner)
    }

    fn function_info(
        &self,
        name: &str,
    ) -> Option<FunctionInfo> {
        let record = self.table.lookup(name)?;
        match record.kind {
            DeclKind::Function {
                arity, definition, ..
            } => Some(FunctionInfo {
                decl: record.id,
                arity,
                definition,
            }),
            DeclKind::Variable => None,
        }
    }

    fn lower(
        &mut self,
        transaction: &Transaction,
    ) -> CodeUnit {
        self.units
            .remove(&transaction.id())
            .unwrap_or_else(|| CodeUnit {
                transaction: Some(transaction.id()),
                ..CodeUnit::default()
            })
    }
}

//! Front-end collaborator
//!
//! The incremental compiler drives a [`FrontEnd`] one increment at a time and
//! never looks inside declarations beyond their names and owners.
//! [`CFrontEnd`] is the reference implementation for a small C-like language.

pub mod ast;
pub mod decls;
pub mod lexer;
pub mod minic;
pub mod parser;
pub mod sema;

use std::fmt;

pub use minic::CFrontEnd;

use crate::kernel::transaction::{DeclId, Transaction, TransactionId};
use crate::util::diagnostic::Diagnostic;

/// Outcome of feeding one increment to the front end
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseOutcome {
    /// All input was consumed and checked; declarations were appended
    Complete,
    /// The input stops inside an unterminated construct
    Incomplete,
    /// An error was diagnosed
    FatalDiagnostic,
}

/// What the front end knows about a function
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FunctionInfo {
    pub decl: DeclId,
    pub arity: usize,
    /// Transaction holding the body, if any
    pub definition: Option<TransactionId>,
}

/// Compiler front end contract
pub trait FrontEnd {
    /// Lowered form handed to the code generator
    type Unit: fmt::Debug;

    /// Feed `input` as the continuation of `transaction`'s text.
    ///
    /// Appends declaration handles to `transaction` when the accumulated text
    /// is complete. Declarations stay pending until [`FrontEnd::commit`].
    fn parse_increment(
        &mut self,
        input: &str,
        transaction: &mut Transaction,
    ) -> ParseOutcome;

    /// Diagnostics produced since the last call
    fn take_diagnostics(&mut self) -> Vec<Diagnostic>;

    /// Make the transaction's declarations visible
    fn commit(
        &mut self,
        transaction: &Transaction,
    );

    /// Discard the transaction's declarations without a trace
    fn rollback(
        &mut self,
        transaction: &Transaction,
    );

    /// Hide the declarations of an unloaded transaction
    fn forget(
        &mut self,
        transaction: &Transaction,
    );

    /// Latest live declaration of `name`
    fn lookup(
        &self,
        name: &str,
    ) -> Option<DeclId>;

    fn decl_name(
        &self,
        decl: DeclId,
    ) -> Option<&str>;

    /// Transaction that introduced `decl`
    fn decl_owner(
        &self,
        decl: DeclId,
    ) -> Option<TransactionId>;

    /// Signature of the function `name`, if it is one
    fn function_info(
        &self,
        name: &str,
    ) -> Option<FunctionInfo>;

    /// Lower a complete transaction for code generation
    fn lower(
        &mut self,
        transaction: &Transaction,
    ) -> Self::Unit;
}

//! Interpreter observer hooks
//!
//! Every method has an empty default, so an observer only implements the
//! events it cares about.

use super::transaction::Transaction;

/// Observer of program-state changes
pub trait InterpreterCallbacks {
    /// A transaction was appended to the log
    fn transaction_committed(
        &mut self,
        _transaction: &Transaction,
    ) {
    }

    /// A transaction was removed from the log, after its at-exit actions ran
    fn transaction_unloaded(
        &mut self,
        _transaction: &Transaction,
    ) {
    }

    /// A library was opened; `name` is its canonical name
    fn library_loaded(
        &mut self,
        _name: &str,
    ) {
    }

    /// A library was closed, after its at-exit actions ran
    fn library_unloaded(
        &mut self,
        _name: &str,
    ) {
    }
}

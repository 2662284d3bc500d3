//! Incremental compilation and execution core
//!
//! - [`naming`]: collision-free generated names
//! - [`wrapper`]: wrapping bare statements into functions
//! - [`transaction`]: transactions and the commit log
//! - [`compiler`]: the incremental compiler
//! - [`engine`]: code generation, static initialization, at-exit actions
//! - [`interpreter`]: the façade tying them together
//! - [`context`]: the program state they share
//! - [`callbacks`]: observer hooks on that state

pub mod callbacks;
pub mod compiler;
pub mod context;
pub mod engine;
pub mod interpreter;
pub mod naming;
pub mod transaction;
pub mod wrapper;

pub use callbacks::InterpreterCallbacks;
pub use compiler::{CompilationResult, IncrementalCompiler};
pub use context::InterpreterContext;
pub use engine::{ExecutionEngine, ExecutionResult};
pub use interpreter::{Interpreter, Outcome};
pub use transaction::{CompilationOptions, Transaction, TransactionId, TransactionState};

//! Weft
//!
//! Incremental compilation and execution core of an interactive C-like
//! interpreter. Input arrives piece by piece; every piece is compiled in a
//! transaction that either commits atomically or leaves no trace, and
//! committed code can be generated, run and unloaded again.
//!
//! # Example
//!
//! ```rust
//! use weft::{CompilationResult, Interpreter};
//!
//! let mut interp = Interpreter::new();
//! assert_eq!(interp.declare("int f() {").result, CompilationResult::MoreInputExpected);
//! assert!(interp.declare("return 1; }").is_success());
//! assert_eq!(interp.evaluate("f()").value.and_then(|v| v.as_int()), Some(1));
//! ```

#![warn(rust_2018_idioms)]

pub mod backends;
pub mod frontend;
pub mod kernel;
pub mod util;

pub use anyhow::{Context, Result};

pub use backends::{NativeFunction, Value};
pub use kernel::callbacks::InterpreterCallbacks;
pub use kernel::compiler::CompilationResult;
pub use kernel::engine::{ExecutionResult, LoadLibResult, UnloadResult};
pub use kernel::interpreter::{Interpreter, Outcome, Unloadable};
pub use util::config::{InterpreterConfig, UnloadPolicy};

use tracing::debug;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run snippets through a fresh interpreter, one `process` call each.
///
/// Returns the value of every snippet that produced one.
///
/// ```rust
/// let values = weft::run_snippets(&["int x = 5;", "x * 2"]).unwrap();
/// assert_eq!(values, vec![None, Some(weft::Value::Int(10))]);
/// ```
pub fn run_snippets(snippets: &[&str]) -> Result<Vec<Option<Value>>> {
    let mut interp = Interpreter::new();
    let mut values = Vec::with_capacity(snippets.len());
    for (index, snippet) in snippets.iter().enumerate() {
        debug!("snippet {}: {}", index, snippet);
        let outcome = interp.process(snippet);
        match outcome.result {
            CompilationResult::Success => {}
            CompilationResult::MoreInputExpected => {
                anyhow::bail!("snippet {} is incomplete", index)
            }
            CompilationResult::Failure => {
                let messages: Vec<String> =
                    outcome.diagnostics.iter().map(ToString::to_string).collect();
                anyhow::bail!("snippet {} failed: {}", index, messages.join("; "))
            }
        }
        if let Some(execution) = outcome.execution {
            if execution != ExecutionResult::Success {
                anyhow::bail!("snippet {} did not run: {:?}", index, execution);
            }
        }
        values.push(outcome.value);
    }
    Ok(values)
}

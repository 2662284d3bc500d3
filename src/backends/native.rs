//! Native functions callable from generated code
//!
//! A native function is either a Rust closure registered in-process or a raw
//! C symbol found in a shared library. Raw symbols are called with the C ABI
//! as `extern "C" fn(i64, ...) -> i64` with up to [`MAX_NATIVE_ARITY`]
//! arguments.

use std::fmt;
use std::sync::Arc;

use super::ExecFault;

/// Maximum number of arguments for raw C symbols
pub const MAX_NATIVE_ARITY: usize = 4;

/// Rust closure usable as a native function
pub type HostFn = Arc<dyn Fn(&[i64]) -> i64 + Send + Sync>;

/// A function provided by the host process
#[derive(Clone)]
pub enum NativeFunction {
    /// In-process Rust closure
    Host(HostFn),
    /// Address of a C function in a loaded library
    Raw { name: String, address: usize },
}

impl NativeFunction {
    /// Wrap a Rust closure
    pub fn host(f: impl Fn(&[i64]) -> i64 + Send + Sync + 'static) -> Self {
        NativeFunction::Host(Arc::new(f))
    }

    /// Call the function with integer arguments
    pub fn call(
        &self,
        args: &[i64],
    ) -> Result<i64, ExecFault> {
        match self {
            NativeFunction::Host(f) => Ok(f(args)),
            NativeFunction::Raw { name, address } => call_raw(name, *address, args),
        }
    }
}

impl fmt::Debug for NativeFunction {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        match self {
            NativeFunction::Host(_) => f.write_str("NativeFunction::Host(..)"),
            NativeFunction::Raw { name, address } => f
                .debug_struct("NativeFunction::Raw")
                .field("name", name)
                .field("address", &format_args!("{:#x}", address))
                .finish(),
        }
    }
}

#[allow(unsafe_code)]
fn call_raw(
    name: &str,
    address: usize,
    args: &[i64],
) -> Result<i64, ExecFault> {
    type F0 = extern "C" fn() -> i64;
    type F1 = extern "C" fn(i64) -> i64;
    type F2 = extern "C" fn(i64, i64) -> i64;
    type F3 = extern "C" fn(i64, i64, i64) -> i64;
    type F4 = extern "C" fn(i64, i64, i64, i64) -> i64;

    if address == 0 {
        return Err(ExecFault::Unresolved(name.to_string()));
    }
    let ptr = address as *const ();
    // SAFETY: the address was produced by the dynamic loader for a symbol the
    // user declared `extern`; the declaration fixes the integer-only signature.
    let result = unsafe {
        match args {
            [] => std::mem::transmute::<*const (), F0>(ptr)(),
            [a] => std::mem::transmute::<*const (), F1>(ptr)(*a),
            [a, b] => std::mem::transmute::<*const (), F2>(ptr)(*a, *b),
            [a, b, c] => std::mem::transmute::<*const (), F3>(ptr)(*a, *b, *c),
            [a, b, c, d] => std::mem::transmute::<*const (), F4>(ptr)(*a, *b, *c, *d),
            _ => {
                return Err(ExecFault::NativeArity {
                    name: name.to_string(),
                    arity: args.len(),
                })
            }
        }
    };
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    extern "C" fn add3(
        a: i64,
        b: i64,
        c: i64,
    ) -> i64 {
        a + b + c
    }

    #[test]
    fn test_host_closure() {
        let f = NativeFunction::host(|args| args.iter().sum());
        assert_eq!(f.call(&[1, 2, 3]).unwrap(), 6);
    }

    #[test]
    fn test_raw_symbol_call() {
        let f = NativeFunction::Raw {
            name: "add3".to_string(),
            address: add3 as usize,
        };
        assert_eq!(f.call(&[1, 2, 3]).unwrap(), 6);
    }

    #[test]
    fn test_raw_symbol_arity_limit() {
        let f = NativeFunction::Raw {
            name: "add3".to_string(),
            address: add3 as usize,
        };
        let err = f.call(&[0; 5]).unwrap_err();
        assert!(matches!(err, ExecFault::NativeArity { arity: 5, .. }));
    }
}

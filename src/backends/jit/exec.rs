//! Tree-walking evaluator for installed modules
//!
//! Calls are bound late: every call looks the callee up at the time it
//! happens, first among live JIT symbols and then through the host.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::backends::ir::{BinaryOp, Expr, Function, Stmt, UnaryOp};
use crate::backends::{ExecFault, RuntimeHost, SymbolAddress, SymbolKind, Value};

use super::TreeJit;

/// Call frame of one function activation
#[derive(Debug)]
pub struct Frame {
    slots: Vec<i64>,
}

impl Frame {
    /// Create a frame and bind arguments to the parameter slots.
    ///
    /// Surplus arguments are dropped and missing ones read as zero, which is
    /// what at-exit callbacks with no parameter rely on.
    pub fn with_args(
        function: &Function,
        args: &[i64],
    ) -> Self {
        let mut slots = vec![0; function.frame_size.max(function.params)];
        for (slot, arg) in slots.iter_mut().zip(args.iter().take(function.params)) {
            *slot = *arg;
        }
        Self { slots }
    }
}

enum Flow {
    Normal,
    Return(Option<i64>),
}

/// Runs code against a [`TreeJit`]'s symbols and global storage
pub(super) struct Evaluator<'a> {
    symbols: &'a HashMap<String, SymbolAddress>,
    functions: HashMap<String, Rc<Function>>,
    globals: &'a mut HashMap<String, i64>,
    host: &'a mut dyn RuntimeHost,
    depth: usize,
    max_depth: usize,
}

impl<'a> Evaluator<'a> {
    pub(super) fn new(
        jit: &'a mut TreeJit,
        host: &'a mut dyn RuntimeHost,
    ) -> Self {
        let functions = jit
            .modules
            .values()
            .flat_map(|module| module.functions.iter())
            .map(|f| (f.name.clone(), Rc::clone(f)))
            .collect();
        Self {
            symbols: &jit.symbols,
            functions,
            globals: &mut jit.globals,
            host,
            depth: 0,
            max_depth: jit.config.max_call_depth,
        }
    }

    /// Run a function with already-evaluated arguments
    pub(super) fn call_function(
        &mut self,
        function: &Function,
        args: &[i64],
    ) -> Result<Value, ExecFault> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(ExecFault::StackOverflow { depth: self.depth });
        }
        trace!("call `{}` at depth {}", function.name, self.depth);

        let mut frame = Frame::with_args(function, args);
        let flow = self.exec_block(&function.body, &mut frame);
        self.depth -= 1;

        let returned = match flow? {
            Flow::Return(value) => value,
            Flow::Normal => None,
        };
        Ok(if function.returns_value {
            Value::Int(returned.unwrap_or(0))
        } else {
            Value::Void
        })
    }

    /// Evaluate an expression with no locals in scope
    pub(super) fn eval_detached(
        &mut self,
        expr: &Expr,
    ) -> Result<i64, ExecFault> {
        let mut frame = Frame { slots: Vec::new() };
        self.eval(expr, &mut frame)
    }

    pub(super) fn store_global(
        &mut self,
        name: &str,
        value: i64,
    ) -> Result<(), ExecFault> {
        match self.globals.get_mut(name) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ExecFault::Unresolved(name.to_string())),
        }
    }

    fn exec_block(
        &mut self,
        body: &[Stmt],
        frame: &mut Frame,
    ) -> Result<Flow, ExecFault> {
        for stmt in body {
            if let Flow::Return(value) = self.exec(stmt, frame)? {
                return Ok(Flow::Return(value));
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(
        &mut self,
        stmt: &Stmt,
        frame: &mut Frame,
    ) -> Result<Flow, ExecFault> {
        match stmt {
            Stmt::Expr(expr) => {
                self.eval(expr, frame)?;
                Ok(Flow::Normal)
            }
            Stmt::Store(slot, expr) => {
                let value = self.eval(expr, frame)?;
                frame.slots[*slot] = value;
                Ok(Flow::Normal)
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                if self.eval(cond, frame)? != 0 {
                    self.exec_block(then, frame)
                } else {
                    self.exec_block(otherwise, frame)
                }
            }
            Stmt::While { cond, body } => {
                while self.eval(cond, frame)? != 0 {
                    if let Flow::Return(value) = self.exec_block(body, frame)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Ok(Flow::Normal)
            }
            Stmt::Return(expr) => {
                let value = match expr {
                    Some(expr) => Some(self.eval(expr, frame)?),
                    None => None,
                };
                Ok(Flow::Return(value))
            }
        }
    }

    fn eval(
        &mut self,
        expr: &Expr,
        frame: &mut Frame,
    ) -> Result<i64, ExecFault> {
        match expr {
            Expr::Int(n) => Ok(*n),
            Expr::Local(slot) => Ok(frame.slots[*slot]),
            Expr::Global(name) => self
                .globals
                .get(name)
                .copied()
                .ok_or_else(|| ExecFault::Unresolved(name.clone())),
            Expr::AssignLocal(slot, value) => {
                let value = self.eval(value, frame)?;
                frame.slots[*slot] = value;
                Ok(value)
            }
            Expr::AssignGlobal(name, value) => {
                let value = self.eval(value, frame)?;
                self.store_global(name, value)?;
                Ok(value)
            }
            Expr::Call { callee, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, frame)?);
                }
                self.call(callee, &values)
            }
            Expr::AtExit { function, arg } => {
                let arg = self.eval(arg, frame)?;
                let address = self
                    .symbols
                    .get(function)
                    .filter(|address| address.kind == SymbolKind::Function)
                    .copied()
                    .ok_or_else(|| ExecFault::Unresolved(function.clone()))?;
                self.host
                    .register_at_exit(function, address, Value::Int(arg));
                Ok(0)
            }
            Expr::Unary(op, operand) => {
                let value = self.eval(operand, frame)?;
                Ok(match op {
                    UnaryOp::Neg => value.wrapping_neg(),
                    UnaryOp::Not => (value == 0) as i64,
                })
            }
            Expr::Binary(op, lhs, rhs) => {
                let lhs = self.eval(lhs, frame)?;
                let rhs = self.eval(rhs, frame)?;
                binary(*op, lhs, rhs)
            }
            Expr::And(lhs, rhs) => {
                if self.eval(lhs, frame)? == 0 {
                    return Ok(0);
                }
                Ok((self.eval(rhs, frame)? != 0) as i64)
            }
            Expr::Or(lhs, rhs) => {
                if self.eval(lhs, frame)? != 0 {
                    return Ok(1);
                }
                Ok((self.eval(rhs, frame)? != 0) as i64)
            }
        }
    }

    fn call(
        &mut self,
        callee: &str,
        args: &[i64],
    ) -> Result<i64, ExecFault> {
        let jit_symbol = self
            .symbols
            .get(callee)
            .filter(|address| address.kind == SymbolKind::Function)
            .and_then(|_| self.functions.get(callee).cloned());
        if let Some(function) = jit_symbol {
            let value = self.call_function(&function, args)?;
            return Ok(value.as_int().unwrap_or(0));
        }
        match self.host.resolve_native(callee) {
            Some(native) => native.call(args),
            None => Err(ExecFault::Unresolved(callee.to_string())),
        }
    }
}

fn binary(
    op: BinaryOp,
    lhs: i64,
    rhs: i64,
) -> Result<i64, ExecFault> {
    Ok(match op {
        BinaryOp::Add => lhs.wrapping_add(rhs),
        BinaryOp::Sub => lhs.wrapping_sub(rhs),
        BinaryOp::Mul => lhs.wrapping_mul(rhs),
        BinaryOp::Div => {
            if rhs == 0 {
                return Err(ExecFault::DivisionByZero);
            }
            lhs.wrapping_div(rhs)
        }
        BinaryOp::Rem => {
            if rhs == 0 {
                return Err(ExecFault::DivisionByZero);
            }
            lhs.wrapping_rem(rhs)
        }
        BinaryOp::Eq => (lhs == rhs) as i64,
        BinaryOp::Ne => (lhs != rhs) as i64,
        BinaryOp::Lt => (lhs < rhs) as i64,
        BinaryOp::Le => (lhs <= rhs) as i64,
        BinaryOp::Gt => (lhs > rhs) as i64,
        BinaryOp::Ge => (lhs >= rhs) as i64,
    })
}

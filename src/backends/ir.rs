//! Lowered code units
//!
//! The hand-off format between the reference front end and the reference
//! JIT. Names are resolved to locals (frame slots) or to global symbols;
//! global symbols stay late-bound strings so that a unit may reference
//! definitions that arrive in later transactions or in libraries.

use std::collections::BTreeSet;

use crate::kernel::transaction::{DeclId, TransactionId};

/// Index of a local in a function frame
pub type Slot = usize;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

/// Lowered expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    Local(Slot),
    Global(String),
    AssignLocal(Slot, Box<Expr>),
    AssignGlobal(String, Box<Expr>),
    Call { callee: String, args: Vec<Expr> },
    /// Register `function(arg)` to run when the owner is unloaded
    AtExit { function: String, arg: Box<Expr> },
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

/// Lowered statement
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Store(Slot, Expr),
    If {
        cond: Expr,
        then: Vec<Stmt>,
        otherwise: Vec<Stmt>,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
    },
    Return(Option<Expr>),
}

/// Lowered function definition
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub decl: DeclId,
    /// Parameters occupy the first slots of the frame
    pub params: usize,
    pub frame_size: usize,
    pub returns_value: bool,
    pub body: Vec<Stmt>,
}

/// Global variable definition
#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub name: String,
    pub decl: DeclId,
    /// Constant initial value; zero when absent
    pub constant: Option<i64>,
}

/// Dynamic initializer of a global
#[derive(Debug, Clone, PartialEq)]
pub struct Initializer {
    pub global: String,
    pub decl: DeclId,
    pub value: Expr,
}

/// Everything one transaction contributes to the program
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CodeUnit {
    pub transaction: Option<TransactionId>,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    /// In declaration order
    pub initializers: Vec<Initializer>,
}

impl CodeUnit {
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty() && self.globals.is_empty()
    }

    /// Symbols the unit defines
    pub fn defined_symbols(&self) -> Vec<String> {
        self.globals
            .iter()
            .map(|g| g.name.clone())
            .chain(self.functions.iter().map(|f| f.name.clone()))
            .collect()
    }
}

/// Global symbols referenced by an expression tree
pub fn expr_references(
    expr: &Expr,
    out: &mut BTreeSet<String>,
) {
    match expr {
        Expr::Int(_) | Expr::Local(_) => {}
        Expr::Global(name) => {
            out.insert(name.clone());
        }
        Expr::AssignLocal(_, value) => expr_references(value, out),
        Expr::AssignGlobal(name, value) => {
            out.insert(name.clone());
            expr_references(value, out);
        }
        Expr::Call { callee, args } => {
            out.insert(callee.clone());
            for arg in args {
                expr_references(arg, out);
            }
        }
        Expr::AtExit { function, arg } => {
            out.insert(function.clone());
            expr_references(arg, out);
        }
        Expr::Unary(_, operand) => expr_references(operand, out),
        Expr::Binary(_, lhs, rhs) | Expr::And(lhs, rhs) | Expr::Or(lhs, rhs) => {
            expr_references(lhs, out);
            expr_references(rhs, out);
        }
    }
}

/// Global symbols referenced by a statement list
pub fn body_references(
    body: &[Stmt],
    out: &mut BTreeSet<String>,
) {
    for stmt in body {
        match stmt {
            Stmt::Expr(expr) | Stmt::Store(_, expr) => expr_references(expr, out),
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                expr_references(cond, out);
                body_references(then, out);
                body_references(otherwise, out);
            }
            Stmt::While { cond, body } => {
                expr_references(cond, out);
                body_references(body, out);
            }
            Stmt::Return(Some(expr)) => expr_references(expr, out),
            Stmt::Return(None) => {}
        }
    }
}

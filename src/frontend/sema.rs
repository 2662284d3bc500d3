//! Semantic analysis and lowering
//!
//! Checks the items of one transaction against the declaration table,
//! records their declarations as pending, and lowers them into a
//! [`CodeUnit`]. Analysis keeps going after an error so that one increment
//! reports as much as it can.

use std::collections::HashMap;

use super::ast::{BinOp, Expr, ExprKind, Item, Param, Stmt, Type, UnOp};
use super::decls::{DeclKind, DeclTable, ReturnKind};
use crate::backends::ir;
use crate::kernel::transaction::{DeclId, TransactionId};
use crate::util::diagnostic::{Diagnostic, DiagnosticCode};
use crate::util::span::Span;

/// Name of the builtin that registers at-exit actions
pub const ATEXIT_BUILTIN: &str = "atexit";

/// Result of analysing one transaction
#[derive(Debug, Default)]
pub struct Analysis {
    /// Declarations in declaration order
    pub decls: Vec<DeclId>,
    pub unit: ir::CodeUnit,
    pub diagnostics: Vec<Diagnostic>,
}

impl Analysis {
    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_error)
    }
}

/// Check and lower `items` on behalf of transaction `owner`
pub fn analyze(
    items: &[Item],
    table: &mut DeclTable,
    owner: TransactionId,
) -> Analysis {
    let mut analyzer = Analyzer {
        table,
        owner,
        out: Analysis {
            unit: ir::CodeUnit {
                transaction: Some(owner),
                ..ir::CodeUnit::default()
            },
            ..Analysis::default()
        },
    };
    for item in items {
        match item {
            Item::Variable {
                ty,
                name,
                init,
                span,
            } => analyzer.variable(*ty, name, init.as_ref(), *span),
            Item::Function {
                ret,
                name,
                params,
                body,
                span,
                ..
            } => analyzer.function(*ret, name, params, body.as_deref(), *span),
        }
    }
    analyzer.out
}

/// Type of an expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExprType {
    Int,
    Void,
}

/// Per-function checking state
#[derive(Debug, Default)]
struct Scope {
    frames: Vec<HashMap<String, ir::Slot>>,
    next_slot: ir::Slot,
    /// `None` while an `auto` return type is undeduced
    returns: Option<ReturnKind>,
}

impl Scope {
    fn global() -> Self {
        Self::default()
    }

    fn local(
        &self,
        name: &str,
    ) -> Option<ir::Slot> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name).copied())
    }

    fn bind(
        &mut self,
        name: &str,
    ) -> ir::Slot {
        let slot = self.next_slot;
        self.next_slot += 1;
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.to_string(), slot);
        }
        slot
    }

    fn declared_here(
        &self,
        name: &str,
    ) -> bool {
        self.frames
            .last()
            .is_some_and(|frame| frame.contains_key(name))
    }
}

struct Analyzer<'t> {
    table: &'t mut DeclTable,
    owner: TransactionId,
    out: Analysis,
}

impl Analyzer<'_> {
    fn report(
        &mut self,
        code: DiagnosticCode,
        message: impl Into<String>,
        span: Span,
    ) {
        self.out
            .diagnostics
            .push(Diagnostic::new(code, message, span));
    }

    fn declare(
        &mut self,
        name: &str,
        kind: DeclKind,
        span: Span,
    ) -> DeclId {
        let id = self.table.declare(name, kind, self.owner, span);
        self.out.decls.push(id);
        id
    }

    fn variable(
        &mut self,
        ty: Type,
        name: &str,
        init: Option<&Expr>,
        span: Span,
    ) {
        match ty {
            Type::Int => {}
            Type::Void => {
                self.report(
                    DiagnosticCode::VoidVariable,
                    format!("variable `{}` declared void", name),
                    span,
                );
                return;
            }
            Type::Auto => {
                self.report(
                    DiagnosticCode::TypeMismatch,
                    format!("`auto` is only allowed as a return type (`{}`)", name),
                    span,
                );
                return;
            }
        }
        if let Some(existing) = self.table.lookup(name) {
            let code = match existing.kind {
                DeclKind::Variable => DiagnosticCode::Redefinition,
                DeclKind::Function { .. } => DiagnosticCode::ConflictingDeclaration,
            };
            self.report(code, format!("redefinition of `{}`", name), span);
            return;
        }

        let value = init.map(|init| {
            let mut scope = Scope::global();
            let (ty, value) = self.expr(init, &mut scope);
            self.expect_int(ty, init.span);
            value
        });
        let decl = self.declare(name, DeclKind::Variable, span);

        let constant = match &value {
            None => Some(0),
            Some(ir::Expr::Int(n)) => Some(*n),
            Some(_) => None,
        };
        self.out.unit.globals.push(ir::Global {
            name: name.to_string(),
            decl,
            constant,
        });
        if let (None, Some(value)) = (constant, value) {
            self.out.unit.initializers.push(ir::Initializer {
                global: name.to_string(),
                decl,
                value,
            });
        }
    }

    fn function(
        &mut self,
        ret: Type,
        name: &str,
        params: &[Param],
        body: Option<&[Stmt]>,
        span: Span,
    ) {
        let returns = match ret {
            Type::Int => Some(ReturnKind::Int),
            Type::Void => Some(ReturnKind::Void),
            Type::Auto if body.is_none() => {
                self.report(
                    DiagnosticCode::TypeMismatch,
                    format!("`{}` with deduced return type needs a body", name),
                    span,
                );
                return;
            }
            Type::Auto => None,
        };

        let mut previous_definition = None;
        let mut previous_returns = None;
        match self.table.lookup(name).map(|r| r.kind) {
            Some(DeclKind::Variable) => {
                self.report(
                    DiagnosticCode::ConflictingDeclaration,
                    format!("`{}` redeclared as a different kind of symbol", name),
                    span,
                );
                return;
            }
            Some(DeclKind::Function {
                arity,
                returns: prev_returns,
                definition,
            }) => {
                let returns_differ = returns.is_some_and(|r| r != prev_returns);
                if arity != params.len() || returns_differ {
                    self.report(
                        DiagnosticCode::ConflictingDeclaration,
                        format!("conflicting types for `{}`", name),
                        span,
                    );
                    return;
                }
                if body.is_some() && definition.is_some() {
                    self.report(
                        DiagnosticCode::Redefinition,
                        format!("redefinition of `{}`", name),
                        span,
                    );
                    return;
                }
                previous_definition = definition;
                previous_returns = Some(prev_returns);
            }
            None => {}
        }

        let definition = if body.is_some() {
            Some(self.owner)
        } else {
            previous_definition
        };
        let decl = self.declare(
            name,
            DeclKind::Function {
                arity: params.len(),
                returns: returns.unwrap_or(ReturnKind::Int),
                definition,
            },
            span,
        );

        let Some(body) = body else {
            return;
        };

        let mut scope = Scope {
            frames: vec![HashMap::new()],
            returns,
            ..Scope::default()
        };
        for param in params {
            if param.ty != Type::Int {
                self.report(
                    DiagnosticCode::VoidVariable,
                    format!("parameter `{}` must be `int`", param.name),
                    param.span,
                );
            }
            if scope.declared_here(&param.name) {
                self.report(
                    DiagnosticCode::Redefinition,
                    format!("duplicate parameter `{}`", param.name),
                    param.span,
                );
            }
            self.warn_shadowing(&param.name, param.span);
            scope.bind(&param.name);
        }

        let lowered = self.block(body, &mut scope);

        let returns = scope.returns.unwrap_or(ReturnKind::Void);
        if ret == Type::Auto {
            if previous_returns.is_some_and(|prev| prev != returns) {
                self.report(
                    DiagnosticCode::ConflictingDeclaration,
                    format!("conflicting types for `{}`", name),
                    span,
                );
            }
            self.table.refine(
                decl,
                DeclKind::Function {
                    arity: params.len(),
                    returns,
                    definition,
                },
            );
        }
        if returns == ReturnKind::Int && !always_returns(body) {
            self.report(
                DiagnosticCode::MissingReturn,
                format!("control may reach the end of non-void function `{}`", name),
                span,
            );
        }

        self.out.unit.functions.push(ir::Function {
            name: name.to_string(),
            decl,
            params: params.len(),
            frame_size: scope.next_slot,
            returns_value: returns == ReturnKind::Int,
            body: lowered,
        });
    }

    fn warn_shadowing(
        &mut self,
        name: &str,
        span: Span,
    ) {
        if self.table.lookup(name).is_some() {
            self.report(
                DiagnosticCode::ShadowedGlobal,
                format!("local `{}` shadows a global declaration", name),
                span,
            );
        }
    }

    fn expect_int(
        &mut self,
        ty: ExprType,
        span: Span,
    ) {
        if ty != ExprType::Int {
            self.report(
                DiagnosticCode::TypeMismatch,
                "void value used where an `int` is required",
                span,
            );
        }
    }

    fn block(
        &mut self,
        stmts: &[Stmt],
        scope: &mut Scope,
    ) -> Vec<ir::Stmt> {
        let mut lowered = Vec::new();
        self.nested(stmts, scope, &mut lowered);
        lowered
    }

    /// Lower a nested block; its slots stay unique so the code is flattened
    fn nested(
        &mut self,
        stmts: &[Stmt],
        scope: &mut Scope,
        out: &mut Vec<ir::Stmt>,
    ) {
        scope.frames.push(HashMap::new());
        for stmt in stmts {
            if let Some(lowered) = self.stmt(stmt, scope, out) {
                out.push(lowered);
            }
        }
        scope.frames.pop();
    }

    fn stmt(
        &mut self,
        stmt: &Stmt,
        scope: &mut Scope,
        out: &mut Vec<ir::Stmt>,
    ) -> Option<ir::Stmt> {
        match stmt {
            Stmt::Local {
                ty,
                name,
                init,
                span,
            } => {
                if *ty != Type::Int {
                    self.report(
                        DiagnosticCode::VoidVariable,
                        format!("variable `{}` declared void", name),
                        *span,
                    );
                }
                if scope.declared_here(name) {
                    self.report(
                        DiagnosticCode::Redefinition,
                        format!("redefinition of local `{}`", name),
                        *span,
                    );
                }
                let value = match init {
                    Some(init) => {
                        let (ty, value) = self.expr(init, scope);
                        self.expect_int(ty, init.span);
                        value
                    }
                    None => ir::Expr::Int(0),
                };
                self.warn_shadowing(name, *span);
                let slot = scope.bind(name);
                Some(ir::Stmt::Store(slot, value))
            }
            Stmt::Expr(expr) => {
                match &expr.kind {
                    ExprKind::Binary(op, _, _) if op.is_comparison() => self.report(
                        DiagnosticCode::UnusedComparison,
                        "comparison result unused",
                        expr.span,
                    ),
                    ExprKind::Int(_)
                    | ExprKind::Name(_)
                    | ExprKind::Unary(_, _)
                    | ExprKind::Binary(_, _, _) => self.report(
                        DiagnosticCode::UnusedValue,
                        "expression result unused",
                        expr.span,
                    ),
                    ExprKind::Assign(_, _) | ExprKind::Call { .. } => {}
                }
                let (_, value) = self.expr(expr, scope);
                Some(ir::Stmt::Expr(value))
            }
            Stmt::If {
                cond,
                then,
                otherwise,
            } => {
                let cond = self.condition(cond, scope);
                Some(ir::Stmt::If {
                    cond,
                    then: self.block(then, scope),
                    otherwise: self.block(otherwise, scope),
                })
            }
            Stmt::While { cond, body } => {
                let cond = self.condition(cond, scope);
                Some(ir::Stmt::While {
                    cond,
                    body: self.block(body, scope),
                })
            }
            Stmt::Return { value, span } => Some(self.ret(value.as_ref(), *span, scope)),
            Stmt::Block(stmts) => {
                self.nested(stmts, scope, out);
                None
            }
            Stmt::Empty => None,
        }
    }

    fn condition(
        &mut self,
        cond: &Expr,
        scope: &mut Scope,
    ) -> ir::Expr {
        let (ty, value) = self.expr(cond, scope);
        self.expect_int(ty, cond.span);
        value
    }

    fn ret(
        &mut self,
        value: Option<&Expr>,
        span: Span,
        scope: &mut Scope,
    ) -> ir::Stmt {
        let lowered = value.map(|value| self.expr(value, scope));
        let found = match &lowered {
            Some((ExprType::Int, _)) => ReturnKind::Int,
            _ => ReturnKind::Void,
        };
        match scope.returns {
            None => scope.returns = Some(found),
            Some(expected) if expected != found => {
                let message = match expected {
                    ReturnKind::Int => "non-void function must return a value",
                    ReturnKind::Void => "void function cannot return a value",
                };
                self.report(DiagnosticCode::InvalidReturn, message, span);
            }
            Some(_) => {}
        }
        ir::Stmt::Return(lowered.map(|(_, expr)| expr))
    }

    fn expr(
        &mut self,
        expr: &Expr,
        scope: &mut Scope,
    ) -> (ExprType, ir::Expr) {
        let poisoned = (ExprType::Int, ir::Expr::Int(0));
        match &expr.kind {
            ExprKind::Int(n) => (ExprType::Int, ir::Expr::Int(*n)),
            ExprKind::Name(name) => {
                if let Some(slot) = scope.local(name) {
                    return (ExprType::Int, ir::Expr::Local(slot));
                }
                match self.table.lookup(name).map(|r| r.kind) {
                    Some(DeclKind::Variable) => (ExprType::Int, ir::Expr::Global(name.clone())),
                    Some(DeclKind::Function { .. }) => {
                        self.report(
                            DiagnosticCode::TypeMismatch,
                            format!("function `{}` used as a value", name),
                            expr.span,
                        );
                        poisoned
                    }
                    None => {
                        self.undeclared(name, expr.span);
                        poisoned
                    }
                }
            }
            ExprKind::Assign(target, value) => {
                let (ty, value) = self.expr(value, scope);
                self.expect_int(ty, expr.span);
                let ExprKind::Name(name) = &target.kind else {
                    self.report(
                        DiagnosticCode::NotAssignable,
                        "left side of assignment is not a variable",
                        target.span,
                    );
                    return poisoned;
                };
                if let Some(slot) = scope.local(name) {
                    return (ExprType::Int, ir::Expr::AssignLocal(slot, Box::new(value)));
                }
                match self.table.lookup(name).map(|r| r.kind) {
                    Some(DeclKind::Variable) => (
                        ExprType::Int,
                        ir::Expr::AssignGlobal(name.clone(), Box::new(value)),
                    ),
                    Some(DeclKind::Function { .. }) => {
                        self.report(
                            DiagnosticCode::NotAssignable,
                            format!("cannot assign to function `{}`", name),
                            target.span,
                        );
                        poisoned
                    }
                    None => {
                        self.undeclared(name, target.span);
                        poisoned
                    }
                }
            }
            ExprKind::Call { callee, args } => self.call(callee, args, expr.span, scope),
            ExprKind::Unary(op, operand) => {
                let (ty, operand) = self.expr(operand, scope);
                self.expect_int(ty, expr.span);
                let op = match op {
                    UnOp::Neg => ir::UnaryOp::Neg,
                    UnOp::Not => ir::UnaryOp::Not,
                };
                // Keeps `-5` a constant initializer
                if let (ir::UnaryOp::Neg, ir::Expr::Int(n)) = (op, &operand) {
                    return (ExprType::Int, ir::Expr::Int(n.wrapping_neg()));
                }
                (ExprType::Int, ir::Expr::Unary(op, Box::new(operand)))
            }
            ExprKind::Binary(op, lhs, rhs) => {
                let (lty, lhs) = self.expr(lhs, scope);
                let (rty, rhs) = self.expr(rhs, scope);
                self.expect_int(lty, expr.span);
                self.expect_int(rty, expr.span);
                let (lhs, rhs) = (Box::new(lhs), Box::new(rhs));
                let lowered = match op {
                    BinOp::And => ir::Expr::And(lhs, rhs),
                    BinOp::Or => ir::Expr::Or(lhs, rhs),
                    BinOp::Add => ir::Expr::Binary(ir::BinaryOp::Add, lhs, rhs),
                    BinOp::Sub => ir::Expr::Binary(ir::BinaryOp::Sub, lhs, rhs),
                    BinOp::Mul => ir::Expr::Binary(ir::BinaryOp::Mul, lhs, rhs),
                    BinOp::Div => ir::Expr::Binary(ir::BinaryOp::Div, lhs, rhs),
                    BinOp::Rem => ir::Expr::Binary(ir::BinaryOp::Rem, lhs, rhs),
                    BinOp::Eq => ir::Expr::Binary(ir::BinaryOp::Eq, lhs, rhs),
                    BinOp::Ne => ir::Expr::Binary(ir::BinaryOp::Ne, lhs, rhs),
                    BinOp::Lt => ir::Expr::Binary(ir::BinaryOp::Lt, lhs, rhs),
                    BinOp::Le => ir::Expr::Binary(ir::BinaryOp::Le, lhs, rhs),
                    BinOp::Gt => ir::Expr::Binary(ir::BinaryOp::Gt, lhs, rhs),
                    BinOp::Ge => ir::Expr::Binary(ir::BinaryOp::Ge, lhs, rhs),
                };
                (ExprType::Int, lowered)
            }
        }
    }

    fn call(
        &mut self,
        callee: &str,
        args: &[Expr],
        span: Span,
        scope: &mut Scope,
    ) -> (ExprType, ir::Expr) {
        let poisoned = (ExprType::Int, ir::Expr::Int(0));
        if scope.local(callee).is_some() {
            self.report(
                DiagnosticCode::NotCallable,
                format!("`{}` is not a function", callee),
                span,
            );
            return poisoned;
        }
        let kind = self.table.lookup(callee).map(|r| r.kind);
        if kind.is_none() && callee == ATEXIT_BUILTIN {
            return self.at_exit(args, span, scope);
        }

        let (arity, returns) = match kind {
            Some(DeclKind::Function { arity, returns, .. }) => (arity, returns),
            Some(DeclKind::Variable) => {
                self.report(
                    DiagnosticCode::NotCallable,
                    format!("`{}` is not a function", callee),
                    span,
                );
                return poisoned;
            }
            None => {
                self.undeclared(callee, span);
                return poisoned;
            }
        };
        if arity != args.len() {
            self.report(
                DiagnosticCode::ArityMismatch,
                format!(
                    "`{}` takes {} argument(s) but {} were supplied",
                    callee,
                    arity,
                    args.len()
                ),
                span,
            );
        }
        let mut lowered = Vec::with_capacity(args.len());
        for arg in args {
            let (ty, value) = self.expr(arg, scope);
            self.expect_int(ty, arg.span);
            lowered.push(value);
        }
        let ty = match returns {
            ReturnKind::Int => ExprType::Int,
            ReturnKind::Void => ExprType::Void,
        };
        (
            ty,
            ir::Expr::Call {
                callee: callee.to_string(),
                args: lowered,
            },
        )
    }

    fn at_exit(
        &mut self,
        args: &[Expr],
        span: Span,
        scope: &mut Scope,
    ) -> (ExprType, ir::Expr) {
        let poisoned = (ExprType::Int, ir::Expr::Int(0));
        let (target, arg) = match args {
            [target] => (target, None),
            [target, arg] => (target, Some(arg)),
            _ => {
                self.report(
                    DiagnosticCode::ArityMismatch,
                    "`atexit` takes a function and an optional argument",
                    span,
                );
                return poisoned;
            }
        };
        let ExprKind::Name(function) = &target.kind else {
            self.report(
                DiagnosticCode::TypeMismatch,
                "`atexit` expects a function name",
                target.span,
            );
            return poisoned;
        };
        match self.table.lookup(function).map(|r| r.kind) {
            Some(DeclKind::Function { arity, .. }) if arity <= 1 => {}
            Some(DeclKind::Function { .. }) | Some(DeclKind::Variable) => {
                self.report(
                    DiagnosticCode::TypeMismatch,
                    format!("`{}` cannot be registered with `atexit`", function),
                    target.span,
                );
                return poisoned;
            }
            None => {
                self.undeclared(function, target.span);
                return poisoned;
            }
        }
        let arg = match arg {
            Some(arg) => {
                let (ty, value) = self.expr(arg, scope);
                self.expect_int(ty, arg.span);
                value
            }
            None => ir::Expr::Int(0),
        };
        (
            ExprType::Int,
            ir::Expr::AtExit {
                function: function.clone(),
                arg: Box::new(arg),
            },
        )
    }

    fn undeclared(
        &mut self,
        name: &str,
        span: Span,
    ) {
        self.report(
            DiagnosticCode::UndeclaredIdentifier,
            format!("use of undeclared identifier `{}`", name),
            span,
        );
    }
}

/// Whether every path through `stmts` ends in a `return`
fn always_returns(stmts: &[Stmt]) -> bool {
    stmts.iter().any(|stmt| match stmt {
        Stmt::Return { .. } => true,
        Stmt::If {
            then, otherwise, ..
        } => always_returns(then) && always_returns(otherwise),
        Stmt::Block(inner) => always_returns(inner),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_program;

    fn run(
        table: &mut DeclTable,
        owner: u64,
        source: &str,
    ) -> Analysis {
        let items = parse_program(source).unwrap();
        let analysis = analyze(&items, table, TransactionId(owner));
        table.commit(TransactionId(owner));
        analysis
    }

    fn codes(analysis: &Analysis) -> Vec<DiagnosticCode> {
        analysis.diagnostics.iter().map(|d| d.code).collect()
    }

    #[test]
    fn test_constant_and_dynamic_initializers() {
        let mut table = DeclTable::new();
        let analysis = run(&mut table, 0, "int a = -3; int b; int c = a * 2;");
        assert!(analysis.diagnostics.is_empty());
        let constants: Vec<Option<i64>> =
            analysis.unit.globals.iter().map(|g| g.constant).collect();
        assert_eq!(constants, vec![Some(-3), Some(0), None]);
        assert_eq!(analysis.unit.initializers.len(), 1);
        assert_eq!(analysis.unit.initializers[0].global, "c");
    }

    #[test]
    fn test_undeclared_identifier() {
        let mut table = DeclTable::new();
        let analysis = run(&mut table, 0, "int y = undefinedSymbol();");
        assert_eq!(codes(&analysis), vec![DiagnosticCode::UndeclaredIdentifier]);
        assert!(analysis.has_errors());
    }

    #[test]
    fn test_prototype_then_definition() {
        let mut table = DeclTable::new();
        run(&mut table, 0, "int f(int a);");
        let analysis = run(&mut table, 1, "int f(int a) { return a; }");
        assert!(analysis.diagnostics.is_empty());

        let again = run(&mut table, 2, "int f(int a) { return a; }");
        assert_eq!(codes(&again), vec![DiagnosticCode::Redefinition]);
        let conflict = run(&mut table, 3, "void f(int a, int b);");
        assert_eq!(codes(&conflict), vec![DiagnosticCode::ConflictingDeclaration]);
    }

    #[test]
    fn test_auto_return_is_deduced() {
        let mut table = DeclTable::new();
        run(&mut table, 0, "void v() {} auto a() { return v(); } auto b() { return 2; }");
        let kind = |name: &str| table.lookup(name).map(|r| r.kind);
        assert!(matches!(
            kind("a"),
            Some(DeclKind::Function {
                returns: ReturnKind::Void,
                ..
            })
        ));
        assert!(matches!(
            kind("b"),
            Some(DeclKind::Function {
                returns: ReturnKind::Int,
                ..
            })
        ));
    }

    #[test]
    fn test_warnings() {
        let mut table = DeclTable::new();
        run(&mut table, 0, "int g;");
        let analysis = run(
            &mut table,
            1,
            "int f(int x) { int g = 1; x + 1; x == 2; if (x) { return 1; } }",
        );
        assert_eq!(
            codes(&analysis),
            vec![
                DiagnosticCode::ShadowedGlobal,
                DiagnosticCode::UnusedValue,
                DiagnosticCode::UnusedComparison,
                DiagnosticCode::MissingReturn,
            ]
        );
        assert!(!analysis.has_errors());
    }

    #[test]
    fn test_type_errors() {
        let mut table = DeclTable::new();
        run(&mut table, 0, "void v(); int n;");
        let cases = [
            ("int a = v() + 1;", DiagnosticCode::TypeMismatch),
            ("int b = n();", DiagnosticCode::NotCallable),
            ("int c() { v = 1; return 0; }", DiagnosticCode::NotAssignable),
            ("void d;", DiagnosticCode::VoidVariable),
            ("void e() { return 1; }", DiagnosticCode::InvalidReturn),
            ("int f() { return v(1); }", DiagnosticCode::ArityMismatch),
        ];
        for (i, (source, code)) in cases.iter().enumerate() {
            let analysis = run(&mut table, i as u64 + 1, source);
            assert!(codes(&analysis).contains(code), "{}: {:?}", source, analysis);
        }
    }

    #[test]
    fn test_atexit_builtin() {
        let mut table = DeclTable::new();
        run(&mut table, 0, "void bye(int code) {}");
        let analysis = run(&mut table, 1, "int r = atexit(bye, 3);");
        assert!(analysis.diagnostics.is_empty());
        assert!(matches!(
            &analysis.unit.initializers[0].value,
            ir::Expr::AtExit { function, .. } if function == "bye"
        ));
    }
}

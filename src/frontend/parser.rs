//! Recursive descent parser for mini-C
//!
//! A syntax error found at the end of input is not reported as an error but
//! as [`ParseError::Incomplete`]: the user has not finished typing yet.

use super::ast::{BinOp, Expr, ExprKind, Item, Param, Stmt, Type, UnOp};
use super::lexer::{tokenize, LexError, Token, TokenKind};
use crate::util::diagnostic::{Diagnostic, DiagnosticCode};
use crate::util::span::Span;

/// Parse failure
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The input stops inside a construct
    Incomplete,
    Invalid(Diagnostic),
}

impl From<LexError> for ParseError {
    fn from(err: LexError) -> Self {
        match err {
            LexError::Incomplete => ParseError::Incomplete,
            LexError::Invalid(diag) => ParseError::Invalid(diag),
        }
    }
}

type PResult<T> = Result<T, ParseError>;

/// Deepest statement or expression nesting accepted.
///
/// Later stages recurse over the tree as well, so the limit keeps all of
/// them within a default thread stack.
pub const MAX_NESTING_DEPTH: usize = 128;

/// Parse a whole translation unit
pub fn parse_program(source: &str) -> PResult<Vec<Item>> {
    let tokens = tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let mut items = Vec::new();
    while !parser.at(&TokenKind::Eof) {
        items.push(parser.item()?);
    }
    Ok(items)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Current statement and expression nesting
    depth: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        // The token stream always ends with Eof
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn at(
        &self,
        kind: &TokenKind,
    ) -> bool {
        &self.peek().kind == kind
    }

    fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(
        &mut self,
        kind: &TokenKind,
    ) -> bool {
        if self.at(kind) {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error<T>(
        &self,
        message: impl Into<String>,
    ) -> PResult<T> {
        let token = self.peek();
        if token.kind == TokenKind::Eof {
            return Err(ParseError::Incomplete);
        }
        Err(ParseError::Invalid(Diagnostic::new(
            DiagnosticCode::UnexpectedToken,
            message,
            token.span,
        )))
    }

    /// Run `parse` one nesting level deeper
    fn nested<T>(
        &mut self,
        parse: fn(&mut Self) -> PResult<T>,
    ) -> PResult<T> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(ParseError::Invalid(Diagnostic::new(
                DiagnosticCode::NestingTooDeep,
                format!("nesting exceeds the limit of {}", MAX_NESTING_DEPTH),
                self.peek().span,
            )));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn expect(
        &mut self,
        kind: TokenKind,
        what: &str,
    ) -> PResult<Token> {
        if self.at(&kind) {
            Ok(self.bump())
        } else {
            self.error(format!("expected {}, found {:?}", what, self.peek().kind))
        }
    }

    fn ident(&mut self) -> PResult<(String, Span)> {
        match self.peek().kind.clone() {
            TokenKind::Identifier(name) => {
                let span = self.bump().span;
                Ok((name, span))
            }
            other => self.error(format!("expected identifier, found {:?}", other)),
        }
    }

    fn ty(&mut self) -> Option<Type> {
        let ty = match self.peek().kind {
            TokenKind::KwInt => Type::Int,
            TokenKind::KwVoid => Type::Void,
            TokenKind::KwAuto => Type::Auto,
            _ => return None,
        };
        self.bump();
        Some(ty)
    }

    fn item(&mut self) -> PResult<Item> {
        let start = self.peek().span;
        let is_extern = self.eat(&TokenKind::KwExtern);
        let Some(ty) = self.ty() else {
            return self.error("expected a declaration");
        };
        let (name, _) = self.ident()?;

        if !self.eat(&TokenKind::LParen) {
            if is_extern {
                return Err(ParseError::Invalid(Diagnostic::new(
                    DiagnosticCode::UnexpectedToken,
                    format!("extern variable `{}` is not supported", name),
                    start,
                )));
            }
            let init = if self.eat(&TokenKind::Assign) {
                Some(self.expr()?)
            } else {
                None
            };
            let end = self.expect(TokenKind::Semicolon, "`;`")?.span;
            return Ok(Item::Variable {
                ty,
                name,
                init,
                span: start.to(end),
            });
        }

        let params = self.params()?;
        let (body, end) = if self.at(&TokenKind::LBrace) {
            if is_extern {
                return self.error("extern function cannot have a body");
            }
            let open = self.peek().span;
            let body = self.block()?;
            (Some(body), open)
        } else {
            (None, self.expect(TokenKind::Semicolon, "`;` or function body")?.span)
        };
        Ok(Item::Function {
            ret: ty,
            name,
            params,
            body,
            is_extern,
            span: start.to(end),
        })
    }

    fn params(&mut self) -> PResult<Vec<Param>> {
        let mut params = Vec::new();
        if self.eat(&TokenKind::RParen) {
            return Ok(params);
        }
        if self.at(&TokenKind::KwVoid)
            && self.tokens.get(self.pos + 1).map(|t| &t.kind) == Some(&TokenKind::RParen)
        {
            self.bump();
            self.bump();
            return Ok(params);
        }
        loop {
            let start = self.peek().span;
            let Some(ty) = self.ty() else {
                return self.error("expected parameter type");
            };
            let (name, end) = self.ident()?;
            params.push(Param {
                ty,
                name,
                span: start.to(end),
            });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`")?;
        Ok(params)
    }

    fn block(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(TokenKind::LBrace, "`{`")?;
        let mut stmts = Vec::new();
        while !self.eat(&TokenKind::RBrace) {
            stmts.push(self.stmt()?);
        }
        Ok(stmts)
    }

    /// Statement used as the body of `if`/`while`
    fn body(&mut self) -> PResult<Vec<Stmt>> {
        Ok(match self.stmt()? {
            Stmt::Block(stmts) => stmts,
            stmt => vec![stmt],
        })
    }

    fn stmt(&mut self) -> PResult<Stmt> {
        self.nested(Self::stmt_at_depth)
    }

    fn stmt_at_depth(&mut self) -> PResult<Stmt> {
        let start = self.peek().span;
        match self.peek().kind {
            TokenKind::KwInt | TokenKind::KwVoid => {
                let ty = self.ty().unwrap_or(Type::Int);
                let (name, _) = self.ident()?;
                let init = if self.eat(&TokenKind::Assign) {
                    Some(self.expr()?)
                } else {
                    None
                };
                let end = self.expect(TokenKind::Semicolon, "`;`")?.span;
                Ok(Stmt::Local {
                    ty,
                    name,
                    init,
                    span: start.to(end),
                })
            }
            TokenKind::KwAuto | TokenKind::KwExtern => {
                self.error("only `int` locals are supported")
            }
            TokenKind::KwIf => {
                self.bump();
                self.expect(TokenKind::LParen, "`(`")?;
                let cond = self.expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                let then = self.body()?;
                let otherwise = if self.eat(&TokenKind::KwElse) {
                    self.body()?
                } else {
                    Vec::new()
                };
                Ok(Stmt::If {
                    cond,
                    then,
                    otherwise,
                })
            }
            TokenKind::KwWhile => {
                self.bump();
                self.expect(TokenKind::LParen, "`(`")?;
                let cond = self.expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                let body = self.body()?;
                Ok(Stmt::While { cond, body })
            }
            TokenKind::KwReturn => {
                self.bump();
                let value = if self.at(&TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.expr()?)
                };
                let end = self.expect(TokenKind::Semicolon, "`;`")?.span;
                Ok(Stmt::Return {
                    value,
                    span: start.to(end),
                })
            }
            TokenKind::LBrace => Ok(Stmt::Block(self.block()?)),
            TokenKind::Semicolon => {
                self.bump();
                Ok(Stmt::Empty)
            }
            _ => {
                let expr = self.expr()?;
                self.expect(TokenKind::Semicolon, "`;`")?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn expr(&mut self) -> PResult<Expr> {
        self.nested(Self::expr_at_depth)
    }

    fn expr_at_depth(&mut self) -> PResult<Expr> {
        let target = self.logic_or()?;
        if self.eat(&TokenKind::Assign) {
            let value = self.expr()?;
            let span = target.span.to(value.span);
            return Ok(Expr {
                kind: ExprKind::Assign(Box::new(target), Box::new(value)),
                span,
            });
        }
        Ok(target)
    }

    fn binary_level(
        &mut self,
        ops: &[(TokenKind, BinOp)],
        next: fn(&mut Self) -> PResult<Expr>,
    ) -> PResult<Expr> {
        let mut lhs = next(self)?;
        'outer: loop {
            for (token, op) in ops {
                if self.eat(token) {
                    let rhs = next(self)?;
                    let span = lhs.span.to(rhs.span);
                    lhs = Expr {
                        kind: ExprKind::Binary(*op, Box::new(lhs), Box::new(rhs)),
                        span,
                    };
                    continue 'outer;
                }
            }
            return Ok(lhs);
        }
    }

    fn logic_or(&mut self) -> PResult<Expr> {
        self.binary_level(&[(TokenKind::OrOr, BinOp::Or)], Self::logic_and)
    }

    fn logic_and(&mut self) -> PResult<Expr> {
        self.binary_level(&[(TokenKind::AndAnd, BinOp::And)], Self::equality)
    }

    fn equality(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[(TokenKind::EqEq, BinOp::Eq), (TokenKind::Neq, BinOp::Ne)],
            Self::relational,
        )
    }

    fn relational(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::Le, BinOp::Le),
                (TokenKind::Lt, BinOp::Lt),
                (TokenKind::Ge, BinOp::Ge),
                (TokenKind::Gt, BinOp::Gt),
            ],
            Self::additive,
        )
    }

    fn additive(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[(TokenKind::Plus, BinOp::Add), (TokenKind::Minus, BinOp::Sub)],
            Self::multiplicative,
        )
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        self.binary_level(
            &[
                (TokenKind::Star, BinOp::Mul),
                (TokenKind::Slash, BinOp::Div),
                (TokenKind::Percent, BinOp::Rem),
            ],
            Self::unary,
        )
    }

    fn unary(&mut self) -> PResult<Expr> {
        let start = self.peek().span;
        let op = match self.peek().kind {
            TokenKind::Minus => UnOp::Neg,
            TokenKind::Not => UnOp::Not,
            _ => return self.primary(),
        };
        self.bump();
        let operand = self.nested(Self::unary)?;
        let span = start.to(operand.span);
        Ok(Expr {
            kind: ExprKind::Unary(op, Box::new(operand)),
            span,
        })
    }

    fn primary(&mut self) -> PResult<Expr> {
        let start = self.peek().span;
        match self.peek().kind.clone() {
            TokenKind::IntLiteral(n) => {
                self.bump();
                Ok(Expr {
                    kind: ExprKind::Int(n),
                    span: start,
                })
            }
            TokenKind::Identifier(name) => {
                self.bump();
                if !self.eat(&TokenKind::LParen) {
                    return Ok(Expr {
                        kind: ExprKind::Name(name),
                        span: start,
                    });
                }
                let mut args = Vec::new();
                if !self.at(&TokenKind::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if !self.eat(&TokenKind::Comma) {
                            break;
                        }
                    }
                }
                let end = self.expect(TokenKind::RParen, "`)`")?.span;
                Ok(Expr {
                    kind: ExprKind::Call { callee: name, args },
                    span: start.to(end),
                })
            }
            TokenKind::LParen => {
                self.bump();
                let inner = self.expr()?;
                self.expect(TokenKind::RParen, "`)`")?;
                Ok(inner)
            }
            other => self.error(format!("expected expression, found {:?}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_declarations() {
        let items = parse_program("int x = 5; extern int g(); int f(int a, int b) { return a + b; }")
            .unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].name(), "x");
        assert!(matches!(
            &items[1],
            Item::Function {
                is_extern: true,
                body: None,
                ..
            }
        ));
        match &items[2] {
            Item::Function { params, body, .. } => {
                assert_eq!(params.len(), 2);
                assert_eq!(body.as_ref().map(Vec::len), Some(1));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        let items = parse_program("int v = 1 + 2 * 3 == 7 && !0;").unwrap();
        let Item::Variable { init: Some(init), .. } = &items[0] else {
            panic!("expected a variable");
        };
        match &init.kind {
            ExprKind::Binary(BinOp::And, lhs, _) => {
                assert!(matches!(lhs.kind, ExprKind::Binary(BinOp::Eq, _, _)));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_void_parameter_list() {
        let items = parse_program("int f(void);").unwrap();
        assert!(matches!(&items[0], Item::Function { params, .. } if params.is_empty()));
    }

    #[test]
    fn test_eof_inside_construct_is_incomplete() {
        assert_eq!(parse_program("int f() {"), Err(ParseError::Incomplete));
        assert_eq!(parse_program("int x = (1 +"), Err(ParseError::Incomplete));
        assert_eq!(parse_program("int x = 5"), Err(ParseError::Incomplete));
        assert_eq!(parse_program("int x; /* more"), Err(ParseError::Incomplete));
    }

    #[test]
    fn test_syntax_errors_are_invalid() {
        assert!(matches!(
            parse_program("int x = ;"),
            Err(ParseError::Invalid(_))
        ));
        assert!(matches!(
            parse_program("extern int v;"),
            Err(ParseError::Invalid(_))
        ));
        assert!(matches!(
            parse_program("int f() { return 1; } }"),
            Err(ParseError::Invalid(_))
        ));
    }

    fn nesting_code(source: &str) -> Option<DiagnosticCode> {
        match parse_program(source) {
            Err(ParseError::Invalid(diag)) => Some(diag.code),
            _ => None,
        }
    }

    #[test]
    fn test_nesting_is_bounded() {
        let parens = |depth: usize| {
            format!("int v = {}1{};", "(".repeat(depth), ")".repeat(depth))
        };
        assert!(parse_program(&parens(100)).is_ok());
        assert_eq!(
            nesting_code(&parens(100_000)),
            Some(DiagnosticCode::NestingTooDeep)
        );

        let negations = format!("int v = {}1;", "-".repeat(10_000));
        assert_eq!(nesting_code(&negations), Some(DiagnosticCode::NestingTooDeep));

        let blocks = format!("void f() {{ {}{} }}", "{".repeat(5_000), "}".repeat(5_000));
        assert_eq!(nesting_code(&blocks), Some(DiagnosticCode::NestingTooDeep));
    }
}

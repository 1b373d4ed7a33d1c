use crate::compiler::ast::*;
use crate::lexer::tokens::{Token, TokenKind};
use crate::parser::error::ParseError;
use crate::utils::loc::join;
use miette::SourceSpan;
use std::iter::Peekable;
use std::slice::Iter;

type Result<T> = std::result::Result<T, ParseError>;

/// Deepest nesting of expressions and blocks the parser accepts. Every later
/// pass walks the tree recursively.
pub const MAX_NESTING: usize = 100;

/// Parse a token stream produced by [`crate::lexer::core::lex`].
///
/// `filename` and `src` are only used to attach source snippets to errors.
pub fn parse<'a>(filename: &str, src: &str, tokens: &[Token<'a>]) -> Result<Program<'a>> {
    let mut p = Parser {
        filename,
        src,
        iter: tokens.iter().peekable(),
        last: None,
        depth: 0,
    };
    p.program()
}

struct Parser<'t, 'a> {
    filename: &'t str,
    src: &'t str,
    iter: Peekable<Iter<'t, Token<'a>>>,
    last: Option<&'t Token<'a>>,
    depth: usize,
}

impl<'t, 'a> Parser<'t, 'a> {
    fn peek(&mut self) -> Option<&'t TokenKind<'a>> {
        self.iter.peek().map(|t| &t.kind)
    }
    fn peek_token(&mut self) -> Option<&'t Token<'a>> {
        self.iter.peek().copied()
    }
    fn next(&mut self) -> Option<&'t Token<'a>> {
        let tok = self.iter.next();
        if tok.is_some() {
            self.last = tok;
        }
        tok
    }
    fn at(&mut self, want: &TokenKind) -> bool {
        matches!(self.peek(), Some(k) if k == want)
    }
    fn eat(&mut self, want: &TokenKind) -> bool {
        if self.at(want) {
            self.next();
            true
        } else {
            false
        }
    }

    /// Go one level deeper. Errors abort the whole parse, so only the success
    /// path has to [`Parser::leave`] again.
    fn enter(&mut self, what: &str) -> Result<()> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            let span = self
                .peek_token()
                .map(Token::span)
                .unwrap_or_else(|| self.last_span());
            return Err(self.error(
                span,
                "nesting limit reached here",
                format!("{what} nested too deeply (limit is {MAX_NESTING})"),
            ));
        }
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    fn last_span(&self) -> SourceSpan {
        self.last
            .map(Token::span)
            .unwrap_or_else(|| SourceSpan::from((0, 0)))
    }

    fn error(&self, span: SourceSpan, label: &str, message: String) -> ParseError {
        ParseError::new(self.filename, self.src, span, label, message)
    }

    /// Error pointing at the next token, which did not match `what`.
    fn unexpected(&mut self, what: &str) -> ParseError {
        match self.peek_token() {
            Some(tok) => self.error(
                tok.span(),
                "unexpected token",
                format!("expected {what}, found {}", tok.kind.describe()),
            ),
            None => self.error(
                self.last_span(),
                "input ends here",
                format!("expected {what}, found end of file"),
            ),
        }
    }

    fn expect(&mut self, want: TokenKind) -> Result<&'t Token<'a>> {
        if self.at(&want) {
            if let Some(tok) = self.next() {
                return Ok(tok);
            }
        }
        Err(self.unexpected(&want.describe()))
    }

    fn expect_identifier(&mut self) -> Result<(Identifier<'a>, SourceSpan)> {
        match self.peek_token() {
            Some(Token {
                kind: TokenKind::Identifier(name),
                ..
            }) => {
                let name = *name;
                let tok = self.next();
                Ok((name, tok.map(Token::span).unwrap_or_else(|| self.last_span())))
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    fn expect_newline(&mut self) -> Result<()> {
        if self.eat(&TokenKind::Newline) {
            Ok(())
        } else {
            Err(self.unexpected("end of line"))
        }
    }

    fn program(&mut self) -> Result<Program<'a>> {
        let mut body = Vec::new();

        while !matches!(self.peek(), Some(TokenKind::Eof) | None) {
            body.push(self.statement()?);
        }
        self.expect(TokenKind::Eof)?;

        Ok(Program { body })
    }

    fn statement(&mut self) -> Result<Stmt<'a>> {
        let Some(tok) = self.peek_token() else {
            return Err(self.unexpected("statement"));
        };
        let start = tok.span();
        let line = tok.line;

        let kind = match tok.kind {
            TokenKind::If => self.if_stmt()?,
            TokenKind::While => self.while_stmt()?,
            TokenKind::Def => self.def_stmt()?,
            TokenKind::Indent => {
                return Err(self.error(
                    start,
                    "remove this indentation",
                    "unexpected indent".to_string(),
                ));
            }
            _ => {
                let kind = self.simple()?;
                self.expect_newline()?;
                kind
            }
        };

        Ok(Stmt {
            kind,
            span: join(start, self.last_span()),
            line,
        })
    }

    fn simple(&mut self) -> Result<StmtKind<'a>> {
        Ok(match self.peek() {
            Some(TokenKind::Pass) => {
                self.next();
                StmtKind::Pass
            }
            Some(TokenKind::Break) => {
                self.next();
                StmtKind::Break
            }
            Some(TokenKind::Continue) => {
                self.next();
                StmtKind::Continue
            }
            Some(TokenKind::Return) => {
                self.next();
                if self.at(&TokenKind::Newline) {
                    StmtKind::Return(None)
                } else {
                    StmtKind::Return(Some(self.expression()?))
                }
            }
            Some(TokenKind::Import) => {
                self.next();
                let (name, _) = self.expect_identifier()?;
                StmtKind::Import(name)
            }
            Some(TokenKind::Assert) => {
                self.next();
                let test = self.expression()?;
                let message = if self.eat(&TokenKind::Comma) {
                    Some(self.expression()?)
                } else {
                    None
                };
                StmtKind::Assert(AssertStmt { test, message })
            }
            _ => {
                let expr = self.expression()?;
                if self.eat(&TokenKind::Assign) {
                    let value = self.expression()?;
                    StmtKind::Assign(Assignment {
                        target: expr,
                        value,
                    })
                } else {
                    StmtKind::Expr(expr)
                }
            }
        })
    }

    fn block(&mut self) -> Result<Vec<Stmt<'a>>> {
        if !self.eat(&TokenKind::Newline) {
            // `if x: pass` style one-liner.
            let Some(tok) = self.peek_token() else {
                return Err(self.unexpected("statement"));
            };
            let (start, line) = (tok.span(), tok.line);
            let kind = self.simple()?;
            self.expect_newline()?;
            return Ok(vec![Stmt {
                kind,
                span: join(start, self.last_span()),
                line,
            }]);
        }

        if !self.eat(&TokenKind::Indent) {
            return Err(self.unexpected("an indented block"));
        }
        self.enter("block")?;
        let mut body = Vec::new();
        while !self.eat(&TokenKind::Dedent) {
            body.push(self.statement()?);
        }
        self.leave(1);
        Ok(body)
    }

    fn if_stmt(&mut self) -> Result<StmtKind<'a>> {
        self.expect(TokenKind::If)?;
        let mut branches = vec![self.branch()?];
        while self.eat(&TokenKind::Elif) {
            branches.push(self.branch()?);
        }
        let orelse = if self.eat(&TokenKind::Else) {
            self.expect(TokenKind::Colon)?;
            Some(self.block()?)
        } else {
            None
        };
        Ok(StmtKind::If(IfStmt { branches, orelse }))
    }

    fn branch(&mut self) -> Result<Branch<'a>> {
        let condition = self.expression()?;
        self.expect(TokenKind::Colon)?;
        let body = self.block()?;
        Ok(Branch { condition, body })
    }

    fn while_stmt(&mut self) -> Result<StmtKind<'a>> {
        self.expect(TokenKind::While)?;
        let Branch { condition, body } = self.branch()?;
        Ok(StmtKind::While(WhileStmt { condition, body }))
    }

    fn def_stmt(&mut self) -> Result<StmtKind<'a>> {
        self.expect(TokenKind::Def)?;
        let (name, _) = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;

        let mut params = Vec::new();
        while !self.at(&TokenKind::RParen) {
            let (name, span) = self.expect_identifier()?;
            params.push(Param { name, span });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        self.expect(TokenKind::RParen)?;
        self.expect(TokenKind::Colon)?;
        let body = self.block()?;
        Ok(StmtKind::Def(FunctionDef { name, params, body }))
    }

    fn expression(&mut self) -> Result<Expression<'a>> {
        self.enter("expression")?;
        let expr = self.or_expr()?;
        self.leave(1);
        Ok(expr)
    }

    // Operator chains build left-deep trees, so every operator in a chain
    // counts as one level of nesting.
    fn or_expr(&mut self) -> Result<Expression<'a>> {
        let mut left = self.and_expr()?;
        let mut chain = 0;
        while self.eat(&TokenKind::Or) {
            self.enter("expression")?;
            chain += 1;
            let rhs = self.and_expr()?;
            left = logical(left, LogicalOp::Or, rhs);
        }
        self.leave(chain);
        Ok(left)
    }

    fn and_expr(&mut self) -> Result<Expression<'a>> {
        let mut left = self.not_expr()?;
        let mut chain = 0;
        while self.eat(&TokenKind::And) {
            self.enter("expression")?;
            chain += 1;
            let rhs = self.not_expr()?;
            left = logical(left, LogicalOp::And, rhs);
        }
        self.leave(chain);
        Ok(left)
    }

    fn not_expr(&mut self) -> Result<Expression<'a>> {
        if self.eat(&TokenKind::Not) {
            let start = self.last_span();
            self.enter("expression")?;
            let operand = self.not_expr()?;
            self.leave(1);
            let span = join(start, operand.span);
            return Ok(Expression {
                kind: ExprKind::Unary(Box::new(UnaryExpr {
                    op: UnaryOp::Not,
                    operand,
                })),
                span,
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expression<'a>> {
        let lhs = self.binary_expr(0)?;
        let Some(op) = self.peek().and_then(comp_op) else {
            return Ok(lhs);
        };
        self.next();
        let rhs = self.binary_expr(0)?;

        if let Some(tok) = self.peek_token() {
            if comp_op(&tok.kind).is_some() {
                return Err(self.error(
                    tok.span(),
                    "second comparison",
                    "chained comparisons are not supported".to_string(),
                ));
            }
        }

        let span = join(lhs.span, rhs.span);
        Ok(Expression {
            kind: ExprKind::Compare(Box::new(CompareExpr { lhs, op, rhs })),
            span,
        })
    }

    fn binary_expr(&mut self, min_prec: usize) -> Result<Expression<'a>> {
        let precedence: &[&[TokenKind]] = &[
            &[TokenKind::Plus, TokenKind::Minus],
            &[TokenKind::Star, TokenKind::DoubleSlash, TokenKind::Percent],
        ];
        let Some(ops) = precedence.get(min_prec) else {
            return self.unary();
        };

        let mut left = self.binary_expr(min_prec + 1)?;
        let mut chain = 0;
        while let Some(op_tok) = self.peek().filter(|t| ops.contains(*t)) {
            let op = match op_tok {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                TokenKind::Star => BinOp::Mul,
                TokenKind::DoubleSlash => BinOp::FloorDiv,
                _ => BinOp::Mod,
            };
            self.next();
            self.enter("expression")?;
            chain += 1;
            let rhs = self.binary_expr(min_prec + 1)?;
            let span = join(left.span, rhs.span);
            left = Expression {
                kind: ExprKind::Binary(Box::new(BinaryExpr { lhs: left, op, rhs })),
                span,
            };
        }
        self.leave(chain);
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expression<'a>> {
        if self.eat(&TokenKind::Minus) {
            let start = self.last_span();
            self.enter("expression")?;
            let operand = self.unary()?;
            self.leave(1);
            let span = join(start, operand.span);
            return Ok(Expression {
                kind: ExprKind::Unary(Box::new(UnaryExpr {
                    op: UnaryOp::Neg,
                    operand,
                })),
                span,
            });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expression<'a>> {
        let mut expr = self.primary()?;
        let mut chain = 0;
        loop {
            if matches!(self.peek(), Some(TokenKind::LParen | TokenKind::Dot)) {
                self.enter("expression")?;
                chain += 1;
            }
            if self.eat(&TokenKind::LParen) {
                let mut args = Vec::new();
                while !self.at(&TokenKind::RParen) {
                    args.push(self.expression()?);
                    if !self.eat(&TokenKind::Comma) {
                        break;
                    }
                }
                let close = self.expect(TokenKind::RParen)?.span();
                let span = join(expr.span, close);
                expr = Expression {
                    kind: ExprKind::Call(Box::new(Call { callee: expr, args })),
                    span,
                };
            } else if self.eat(&TokenKind::Dot) {
                let (name, name_span) = self.expect_identifier()?;
                let span = join(expr.span, name_span);
                expr = Expression {
                    kind: ExprKind::Attribute(Box::new(Attribute { value: expr, name })),
                    span,
                };
            } else {
                self.leave(chain);
                return Ok(expr);
            }
        }
    }

    fn primary(&mut self) -> Result<Expression<'a>> {
        let Some(tok) = self.peek_token() else {
            return Err(self.unexpected("expression"));
        };
        let span = tok.span();
        let kind = match &tok.kind {
            TokenKind::Int(i) => ExprKind::Literal(Literal::Int(*i)),
            TokenKind::Str(s) => ExprKind::Literal(Literal::Str(s.clone())),
            TokenKind::True => ExprKind::Literal(Literal::Bool(true)),
            TokenKind::False => ExprKind::Literal(Literal::Bool(false)),
            TokenKind::None => ExprKind::Literal(Literal::None),
            TokenKind::Identifier(id) => ExprKind::Identifier(*id),
            TokenKind::LParen => {
                self.next();
                let inner = self.expression()?;
                let close = self.expect(TokenKind::RParen)?.span();
                return Ok(Expression {
                    kind: inner.kind,
                    span: join(span, close),
                });
            }
            _ => return Err(self.unexpected("expression")),
        };
        self.next();
        Ok(Expression { kind, span })
    }
}

fn comp_op(kind: &TokenKind) -> Option<CompOp> {
    Some(match kind {
        TokenKind::EqEq => CompOp::Eq,
        TokenKind::NotEq => CompOp::Ne,
        TokenKind::Lt => CompOp::Lt,
        TokenKind::Le => CompOp::Le,
        TokenKind::Gt => CompOp::Gt,
        TokenKind::Ge => CompOp::Ge,
        _ => return None,
    })
}

fn logical<'a>(lhs: Expression<'a>, op: LogicalOp, rhs: Expression<'a>) -> Expression<'a> {
    let span = join(lhs.span, rhs.span);
    Expression {
        kind: ExprKind::Logical(Box::new(LogicalExpr { lhs, op, rhs })),
        span,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::core::lex;

    fn parse_src(src: &str) -> Result<Program<'_>> {
        let tokens = lex("<test>", src).unwrap();
        parse("<test>", src, &tokens)
    }

    fn only_expr(src: &str) -> ExprKind<'_> {
        let program = parse_src(src).unwrap();
        match program.body.into_iter().next().map(|s| s.kind) {
            Some(StmtKind::Expr(e)) => e.kind,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn parses_call_with_literal() {
        let ExprKind::Call(call) = only_expr("print(1)\n") else {
            panic!("expected a call");
        };
        assert_eq!(call.callee.kind, ExprKind::Identifier("print"));
        assert_eq!(call.args.len(), 1);
        assert_eq!(call.args[0].kind, ExprKind::Literal(Literal::Int(1)));
    }

    #[test]
    fn empty_program_has_no_statements() {
        assert!(parse_src("").unwrap().body.is_empty());
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let ExprKind::Binary(add) = only_expr("1 + 2 * 3\n") else {
            panic!("expected binary");
        };
        assert_eq!(add.op, BinOp::Add);
        let ExprKind::Binary(mul) = &add.rhs.kind else {
            panic!("expected nested binary");
        };
        assert_eq!(mul.op, BinOp::Mul);
    }

    #[test]
    fn subtraction_is_left_associative() {
        let ExprKind::Binary(outer) = only_expr("10 - 4 - 3\n") else {
            panic!("expected binary");
        };
        assert!(matches!(outer.lhs.kind, ExprKind::Binary(_)));
        assert_eq!(outer.rhs.kind, ExprKind::Literal(Literal::Int(3)));
    }

    #[test]
    fn logical_operators_nest_by_precedence() {
        let ExprKind::Logical(or) = only_expr("a or b and not c\n") else {
            panic!("expected logical");
        };
        assert_eq!(or.op, LogicalOp::Or);
        let ExprKind::Logical(and) = &or.rhs.kind else {
            panic!("expected `and` on the right");
        };
        assert_eq!(and.op, LogicalOp::And);
        assert!(matches!(and.rhs.kind, ExprKind::Unary(_)));
    }

    #[test]
    fn attribute_then_call() {
        let ExprKind::Call(call) = only_expr("util.greet('x')\n") else {
            panic!("expected call");
        };
        let ExprKind::Attribute(attr) = &call.callee.kind else {
            panic!("expected attribute callee");
        };
        assert_eq!(attr.name, "greet");
    }

    #[test]
    fn parses_compound_statements() {
        let src = "\
def fact(n):
    if n <= 1:
        return 1
    elif n == 2: return 2
    else:
        return n * fact(n - 1)
i = 0
while i < 3:
    i = i + 1
";
        let program = parse_src(src).unwrap();
        assert_eq!(program.body.len(), 3);

        let StmtKind::Def(def) = &program.body[0].kind else {
            panic!("expected def");
        };
        assert_eq!(def.name, "fact");
        assert_eq!(def.params.len(), 1);
        let StmtKind::If(if_stmt) = &def.body[0].kind else {
            panic!("expected if");
        };
        assert_eq!(if_stmt.branches.len(), 2);
        assert!(if_stmt.orelse.is_some());

        assert!(matches!(program.body[1].kind, StmtKind::Assign(_)));
        assert_eq!(program.body[2].line, 8);
    }

    #[test]
    fn assert_with_message_and_import() {
        let program = parse_src("import util\nassert x, 'boom'\n").unwrap();
        assert_eq!(program.body[0].kind, StmtKind::Import("util"));
        let StmtKind::Assert(a) = &program.body[1].kind else {
            panic!("expected assert");
        };
        assert!(a.message.is_some());
    }

    #[test]
    fn missing_paren_reports_found_token() {
        let err = parse_src("print(1\n").unwrap_err();
        assert_eq!(err.message, "expected `)`, found end of line");
    }

    #[test]
    fn missing_block_is_an_error() {
        let err = parse_src("if x:\nprint(1)\n").unwrap_err();
        assert_eq!(
            err.message,
            "expected an indented block, found identifier `print`"
        );
    }

    #[test]
    fn unexpected_indent_is_an_error() {
        let err = parse_src("  x = 1\n").unwrap_err();
        assert_eq!(err.message, "unexpected indent");
    }

    #[test]
    fn chained_comparison_is_rejected() {
        let err = parse_src("a < b < c\n").unwrap_err();
        assert_eq!(err.message, "chained comparisons are not supported");
    }

    fn nested(open: &str, core: &str, close: &str, levels: usize) -> String {
        format!("x = {}{core}{}\n", open.repeat(levels), close.repeat(levels))
    }

    #[test]
    fn nesting_within_the_limit_parses() {
        assert!(parse_src(&nested("(", "1", ")", MAX_NESTING - 2)).is_ok());
        assert!(parse_src(&nested("-", "1", "", MAX_NESTING - 2)).is_ok());
    }

    #[test]
    fn deep_parentheses_are_rejected() {
        let err = parse_src(&nested("(", "1", ")", 1000)).unwrap_err();
        assert_eq!(
            err.message,
            format!("expression nested too deeply (limit is {MAX_NESTING})")
        );
    }

    #[test]
    fn long_unary_and_not_runs_are_rejected() {
        for src in [
            nested("-", "1", "", 50_000),
            nested("not ", "x", "", 50_000),
            nested("f(", "1", ")", 1000),
        ] {
            let err = parse_src(&src).unwrap_err();
            assert!(err.message.starts_with("expression nested too deeply"));
        }
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        let src = format!("x = 1{}\n", " + 1".repeat(MAX_NESTING * 10));
        let err = parse_src(&src).unwrap_err();
        assert!(err.message.starts_with("expression nested too deeply"));

        let ok = format!("x = 1{}\n", " + 1".repeat(MAX_NESTING / 2));
        assert!(parse_src(&ok).is_ok());
    }

    #[test]
    fn deep_blocks_are_rejected() {
        let mut src = String::new();
        for level in 0..=MAX_NESTING {
            src.push_str(&format!("{}def f():\n", " ".repeat(level)));
        }
        src.push_str(&format!("{}pass\n", " ".repeat(MAX_NESTING + 1)));
        let err = parse_src(&src).unwrap_err();
        assert_eq!(
            err.message,
            format!("block nested too deeply (limit is {MAX_NESTING})")
        );
    }

    #[test]
    fn error_span_points_at_offending_token() {
        let err = parse_src("x = = 1\n").unwrap_err();
        assert_eq!(err.span.offset(), 4);
        assert_eq!(err.message, "expected expression, found `=`");
    }
}

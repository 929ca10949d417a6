//! Recursive-descent parser.
//!
//! Precedence, loosest first: assignment, `|>`, `||`, `&&`, equality,
//! comparison, `..`, additive, multiplicative, unary, postfix
//! (call / index / member / method call).
//!
//! Semicolons separate statements; the one before a closing `}` or the
//! end of input may be omitted.

use crate::ast::{BinOp, Expr, Stmt, UnOp};
use crate::lexer::{tokenize, ParseError, Spanned, Token};

pub struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    pub fn new(src: &str) -> Result<Parser, ParseError> {
        Ok(Parser {
            tokens: tokenize(src)?,
            pos: 0,
        })
    }

    /// Parse a whole translation unit.
    pub fn parse_program(&mut self) -> Result<Vec<Stmt>, ParseError> {
        let mut stmts = Vec::new();
        loop {
            self.eat_semicolons();
            if self.peek() == &Token::Eof {
                return Ok(stmts);
            }
            stmts.push(self.statement()?);
        }
    }

    /// Parse a single expression (for `compile_expr` / `exprtofn`).
    pub fn parse_expression(&mut self) -> Result<Expr, ParseError> {
        let expr = self.expression()?;
        self.eat_semicolons();
        self.expect_token(Token::Eof, "expected end of expression")?;
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)].token
    }

    fn here(&self) -> (u32, u32) {
        let s = &self.tokens[self.pos.min(self.tokens.len() - 1)];
        (s.line, s.col)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].token.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn eat(&mut self, tok: &Token) -> bool {
        if self.peek() == tok {
            self.bump();
            true
        } else {
            false
        }
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        let (line, col) = self.here();
        ParseError::new(message, line, col)
    }

    fn expect_token(&mut self, tok: Token, context: &str) -> Result<(), ParseError> {
        if self.peek() == &tok {
            self.bump();
            Ok(())
        } else {
            Err(self.error_here(format!("{}, found {}", context, self.peek().describe())))
        }
    }

    fn expect_ident(&mut self, context: &str) -> Result<String, ParseError> {
        match self.peek().clone() {
            Token::Ident(name) => {
                self.bump();
                Ok(name)
            }
            other => Err(self.error_here(format!("{}, found {}", context, other.describe()))),
        }
    }

    fn eat_semicolons(&mut self) {
        while self.eat(&Token::Semi) {}
    }

    /// A terminating semicolon may be omitted before `}` or end of input.
    fn end_of_statement(&mut self) -> Result<(), ParseError> {
        if self.eat(&Token::Semi) {
            self.eat_semicolons();
            return Ok(());
        }
        match self.peek() {
            Token::RBrace | Token::Eof => Ok(()),
            other => Err(self.error_here(format!(
                "expected ';' after statement, found {}",
                other.describe()
            ))),
        }
    }

    fn statement(&mut self) -> Result<Stmt, ParseError> {
        match self.peek() {
            Token::Let => self.let_statement(),
            Token::If => self.if_statement(),
            Token::While => self.while_statement(),
            Token::For => self.for_statement(),
            Token::Return => self.return_statement(),
            Token::Break => {
                self.bump();
                self.end_of_statement()?;
                Ok(Stmt::Break)
            }
            Token::Continue => {
                self.bump();
                self.end_of_statement()?;
                Ok(Stmt::Continue)
            }
            Token::LBrace => Ok(Stmt::Block(self.block()?)),
            Token::Fn => self.fn_statement(),
            _ => {
                let expr = self.expression()?;
                self.end_of_statement()?;
                Ok(Stmt::Expr(expr))
            }
        }
    }

    fn let_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump(); // let
        let name = self.expect_ident("expected variable name after 'let'")?;
        let init = if self.eat(&Token::Assign) {
            self.expression()?
        } else {
            Expr::Nil
        };
        self.end_of_statement()?;
        Ok(Stmt::Let { name, init })
    }

    fn if_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump(); // if
        self.expect_token(Token::LParen, "expected '(' after 'if'")?;
        let cond = self.expression()?;
        self.expect_token(Token::RParen, "expected ')' after condition")?;
        let then_branch = self.block()?;

        let else_branch = if self.eat(&Token::Else) {
            if self.peek() == &Token::If {
                Some(vec![self.if_statement()?])
            } else {
                Some(self.block()?)
            }
        } else {
            None
        };

        Ok(Stmt::If {
            cond,
            then_branch,
            else_branch,
        })
    }

    fn while_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump(); // while
        self.expect_token(Token::LParen, "expected '(' after 'while'")?;
        let cond = self.expression()?;
        self.expect_token(Token::RParen, "expected ')' after condition")?;
        let body = self.block()?;
        Ok(Stmt::While { cond, body })
    }

    fn for_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump(); // for
        self.expect_token(Token::LParen, "expected '(' after 'for'")?;

        let init = if self.eat(&Token::Semi) {
            None
        } else if self.peek() == &Token::Let {
            let stmt = self.let_statement()?;
            Some(Box::new(stmt))
        } else {
            let expr = self.expression()?;
            self.expect_token(Token::Semi, "expected ';' after for-loop initializer")?;
            Some(Box::new(Stmt::Expr(expr)))
        };

        let cond = if self.peek() == &Token::Semi {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_token(Token::Semi, "expected ';' after for-loop condition")?;

        let step = if self.peek() == &Token::RParen {
            None
        } else {
            Some(self.expression()?)
        };
        self.expect_token(Token::RParen, "expected ')' after for-loop header")?;

        let body = self.block()?;
        Ok(Stmt::For {
            init,
            cond,
            step,
            body,
        })
    }

    fn return_statement(&mut self) -> Result<Stmt, ParseError> {
        self.bump(); // return
        let value = match self.peek() {
            Token::Semi | Token::RBrace | Token::Eof => None,
            _ => Some(self.expression()?),
        };
        self.end_of_statement()?;
        Ok(Stmt::Return(value))
    }

    fn fn_statement(&mut self) -> Result<Stmt, ParseError> {
        // A statement-position `fn` with a name is a declaration; an
        // anonymous one is an expression statement (a function literal)
        if let Token::Ident(_) = self.tokens[(self.pos + 1).min(self.tokens.len() - 1)].token {
            self.bump(); // fn
            let name = self.expect_ident("expected function name")?;
            let params = self.param_list()?;
            let body = self.block()?;
            Ok(Stmt::FnDecl { name, params, body })
        } else {
            let expr = self.expression()?;
            self.end_of_statement()?;
            Ok(Stmt::Expr(expr))
        }
    }

    fn param_list(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect_token(Token::LParen, "expected '(' before parameter list")?;
        let mut params = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                params.push(self.expect_ident("expected parameter name")?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect_token(Token::Comma, "expected ',' between parameters")?;
            }
        }
        Ok(params)
    }

    fn block(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect_token(Token::LBrace, "expected '{'")?;
        let mut stmts = Vec::new();
        loop {
            self.eat_semicolons();
            if self.eat(&Token::RBrace) {
                return Ok(stmts);
            }
            if self.peek() == &Token::Eof {
                return Err(self.error_here("expected '}' before end of input"));
            }
            stmts.push(self.statement()?);
        }
    }

    // Expression grammar

    fn expression(&mut self) -> Result<Expr, ParseError> {
        self.assignment()
    }

    fn assignment(&mut self) -> Result<Expr, ParseError> {
        let target = self.pipe()?;

        if self.eat(&Token::Assign) {
            match target {
                Expr::Ident(_) | Expr::Index { .. } | Expr::Member { .. } => {}
                _ => {
                    return Err(self.error_here(
                        "assignment target must be a variable, index or member expression",
                    ));
                }
            }
            let value = self.assignment()?;
            return Ok(Expr::Assign {
                target: Box::new(target),
                value: Box::new(value),
            });
        }

        Ok(target)
    }

    /// `a |> f(b)` is `f(a, b)`; a non-call right-hand side is called
    /// with the piped value as its only argument.
    fn pipe(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.logic_or()?;
        while self.eat(&Token::Pipe) {
            let rhs = self.logic_or()?;
            lhs = match rhs {
                Expr::Call { callee, mut args } => {
                    args.insert(0, lhs);
                    Expr::Call { callee, args }
                }
                Expr::MethodCall { recv, name, mut args } => {
                    args.insert(0, lhs);
                    Expr::MethodCall { recv, name, args }
                }
                other => Expr::Call {
                    callee: Box::new(other),
                    args: vec![lhs],
                },
            };
        }
        Ok(lhs)
    }

    fn logic_or(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.logic_and()?;
        while self.eat(&Token::OrOr) {
            let rhs = self.logic_and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn logic_and(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.equality()?;
        while self.eat(&Token::AndAnd) {
            let rhs = self.equality()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn equality(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.comparison()?;
        loop {
            let op = match self.peek() {
                Token::Eq => BinOp::Eq,
                Token::Ne => BinOp::Ne,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.comparison()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn comparison(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.concat()?;
        loop {
            let op = match self.peek() {
                Token::Lt => BinOp::Lt,
                Token::Le => BinOp::Le,
                Token::Gt => BinOp::Gt,
                Token::Ge => BinOp::Ge,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.concat()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn concat(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.additive()?;
        while self.eat(&Token::DotDot) {
            let rhs = self.additive()?;
            lhs = Expr::Binary {
                op: BinOp::Concat,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => return Ok(lhs),
            };
            self.bump();
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek() {
            Token::Minus => UnOp::Neg,
            Token::Bang => UnOp::Not,
            _ => return self.postfix(),
        };
        self.bump();
        let operand = self.unary()?;
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn postfix(&mut self) -> Result<Expr, ParseError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Token::LParen => {
                    let args = self.arg_list()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        args,
                    };
                }
                Token::LBracket => {
                    self.bump();
                    let key = self.expression()?;
                    self.expect_token(Token::RBracket, "expected ']' after index")?;
                    expr = Expr::Index {
                        obj: Box::new(expr),
                        key: Box::new(key),
                    };
                }
                Token::Dot => {
                    self.bump();
                    let name = self.expect_ident("expected member name after '.'")?;
                    if self.peek() == &Token::LParen {
                        let args = self.arg_list()?;
                        expr = Expr::MethodCall {
                            recv: Box::new(expr),
                            name,
                            args,
                        };
                    } else {
                        expr = Expr::Member {
                            obj: Box::new(expr),
                            name,
                        };
                    }
                }
                _ => return Ok(expr),
            }
        }
    }

    fn arg_list(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect_token(Token::LParen, "expected '('")?;
        let mut args = Vec::new();
        if !self.eat(&Token::RParen) {
            loop {
                args.push(self.expression()?);
                if self.eat(&Token::RParen) {
                    break;
                }
                self.expect_token(Token::Comma, "expected ',' between arguments")?;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.peek().clone() {
            Token::Nil => {
                self.bump();
                Ok(Expr::Nil)
            }
            Token::True => {
                self.bump();
                Ok(Expr::Bool(true))
            }
            Token::False => {
                self.bump();
                Ok(Expr::Bool(false))
            }
            Token::Int(i) => {
                self.bump();
                Ok(Expr::Int(i))
            }
            Token::Float(f) => {
                self.bump();
                Ok(Expr::Float(f))
            }
            Token::Str(s) => {
                self.bump();
                Ok(Expr::Str(s))
            }
            Token::Ident(name) => {
                self.bump();
                Ok(Expr::Ident(name))
            }
            Token::LParen => {
                self.bump();
                let expr = self.expression()?;
                self.expect_token(Token::RParen, "expected ')'")?;
                Ok(expr)
            }
            Token::LBracket => self.array_literal(),
            Token::LBrace => self.map_literal(),
            Token::Fn => self.fn_literal(),
            other => Err(self.error_here(format!("expected an expression, found {}", other.describe()))),
        }
    }

    fn array_literal(&mut self) -> Result<Expr, ParseError> {
        self.bump(); // [
        let mut items = Vec::new();
        if !self.eat(&Token::RBracket) {
            loop {
                items.push(self.expression()?);
                if self.eat(&Token::RBracket) {
                    break;
                }
                self.expect_token(Token::Comma, "expected ',' between array elements")?;
            }
        }
        Ok(Expr::Array(items))
    }

    fn map_literal(&mut self) -> Result<Expr, ParseError> {
        self.bump(); // {
        let mut entries = Vec::new();
        if !self.eat(&Token::RBrace) {
            loop {
                let key = match self.peek().clone() {
                    Token::Ident(name) => {
                        self.bump();
                        Expr::Str(name)
                    }
                    Token::Str(s) => {
                        self.bump();
                        Expr::Str(s)
                    }
                    Token::Int(i) => {
                        self.bump();
                        Expr::Int(i)
                    }
                    Token::Float(f) => {
                        self.bump();
                        Expr::Float(f)
                    }
                    other => {
                        return Err(self.error_here(format!(
                            "expected a map key, found {}",
                            other.describe()
                        )));
                    }
                };
                self.expect_token(Token::Colon, "expected ':' after map key")?;
                let value = self.expression()?;
                entries.push((key, value));
                if self.eat(&Token::RBrace) {
                    break;
                }
                self.expect_token(Token::Comma, "expected ',' between map entries")?;
            }
        }
        Ok(Expr::Map(entries))
    }

    fn fn_literal(&mut self) -> Result<Expr, ParseError> {
        self.bump(); // fn
        let name = match self.peek().clone() {
            Token::Ident(n) => {
                self.bump();
                Some(n)
            }
            _ => None,
        };
        let params = self.param_list()?;
        let body = self.block()?;
        Ok(Expr::FnLit { name, params, body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Vec<Stmt> {
        Parser::new(src).unwrap().parse_program().unwrap()
    }

    fn parse_err(src: &str) -> ParseError {
        match Parser::new(src).and_then(|mut p| p.parse_program()) {
            Ok(_) => panic!("expected parse failure for {:?}", src),
            Err(e) => e,
        }
    }

    #[test]
    fn test_trailing_semicolon_is_optional() {
        assert_eq!(parse("return 2 + 3"), parse("return 2 + 3;"));
    }

    #[test]
    fn test_missing_inner_semicolon_is_an_error() {
        let err = parse_err("let a = 1 let b = 2");
        assert!(err.message.contains(';'));
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let stmts = parse("return 1 + 2 * 3;");
        match &stmts[0] {
            Stmt::Return(Some(Expr::Binary { op: BinOp::Add, rhs, .. })) => {
                assert!(matches!(**rhs, Expr::Binary { op: BinOp::Mul, .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_pipe_desugars_to_call_with_prepended_argument() {
        let stmts = parse("return a |> f(b);");
        match &stmts[0] {
            Stmt::Return(Some(Expr::Call { callee, args })) => {
                assert_eq!(**callee, Expr::Ident("f".to_string()));
                assert_eq!(args[0], Expr::Ident("a".to_string()));
                assert_eq!(args[1], Expr::Ident("b".to_string()));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_pipe_to_bare_function() {
        let stmts = parse("return x |> f;");
        match &stmts[0] {
            Stmt::Return(Some(Expr::Call { args, .. })) => {
                assert_eq!(args.len(), 1);
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_member_vs_method_call() {
        let stmts = parse("m.k = 1; m.f(2);");
        assert!(matches!(
            &stmts[0],
            Stmt::Expr(Expr::Assign { target, .. }) if matches!(**target, Expr::Member { .. })
        ));
        assert!(matches!(
            &stmts[1],
            Stmt::Expr(Expr::MethodCall { name, .. }) if name == "f"
        ));
    }

    #[test]
    fn test_map_literal_key_forms() {
        let stmts = parse(r#"return {re: 1, "im": 2, 3: "x"};"#);
        match &stmts[0] {
            Stmt::Return(Some(Expr::Map(entries))) => {
                assert_eq!(entries[0].0, Expr::Str("re".to_string()));
                assert_eq!(entries[1].0, Expr::Str("im".to_string()));
                assert_eq!(entries[2].0, Expr::Int(3));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_fn_declaration_and_literal() {
        let stmts = parse("fn add(a, b) { return a + b; } let f = fn (x) { return x; };");
        assert!(matches!(&stmts[0], Stmt::FnDecl { name, params, .. }
            if name == "add" && params.len() == 2));
        assert!(matches!(&stmts[1], Stmt::Let { init: Expr::FnLit { .. }, .. }));
    }

    #[test]
    fn test_invalid_assignment_target() {
        let err = parse_err("1 + 2 = 3;");
        assert!(err.message.contains("assignment target"));
    }

    #[test]
    fn test_for_loop_header_forms() {
        parse("for (let i = 0; i < 10; i = i + 1) { }");
        parse("for (;;) { break; }");
        parse("for (i = 0; i < 3;) { }");
    }

    #[test]
    fn test_if_else_chain() {
        let stmts = parse("if (a) { } else if (b) { } else { }");
        match &stmts[0] {
            Stmt::If { else_branch: Some(els), .. } => {
                assert!(matches!(els[0], Stmt::If { .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_concat_precedence_between_comparison_and_additive() {
        // a .. b == c parses as (a .. b) == c
        let stmts = parse(r#"return "a" .. "b" == "ab";"#);
        match &stmts[0] {
            Stmt::Return(Some(Expr::Binary { op: BinOp::Eq, lhs, .. })) => {
                assert!(matches!(**lhs, Expr::Binary { op: BinOp::Concat, .. }));
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_error_position_reported() {
        let err = parse_err("let\n  = 2;");
        assert_eq!(err.line, 2);
    }
}

//! Recursive-descent parser producing the filter AST.
//!
//! Precedence, loosest first: `|`, `,`, `//`, `or`, `and`, comparisons,
//! `+ -`, `* / %`, unary minus, postfix (`.a`, `[i]`, `[]`, `?`).
//! `Term as $x | body` binds a variable over the rest of the pipe.

use serde_json::Value;

use super::TransformError;
use super::builtins;
use super::lexer::{StrPart, Token};

/// Nesting beyond this is rejected to keep recursion bounded. Each paren or
/// bracket level costs two units and about a dozen frames, so this stays well
/// inside a 2 MiB thread stack in unoptimized builds.
const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Identity,
    RecurseAll,
    Literal(Value),
    Template(Vec<TemplatePart>),
    Var(String),
    Index(Box<Expr>, Box<Expr>),
    Slice(Box<Expr>, Option<Box<Expr>>, Option<Box<Expr>>),
    Iterate(Box<Expr>),
    Try(Box<Expr>, Option<Box<Expr>>),
    Array(Option<Box<Expr>>),
    Object(Vec<(ObjKey, Expr)>),
    Neg(Box<Expr>),
    Pipe(Box<Expr>, Box<Expr>),
    Comma(Box<Expr>, Box<Expr>),
    Alt(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    If(Vec<(Expr, Expr)>, Option<Box<Expr>>),
    Bind(Box<Expr>, String, Box<Expr>),
    Reduce(Box<Expr>, String, Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TemplatePart {
    Lit(String),
    Expr(Expr),
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum ObjKey {
    Name(String),
    Computed(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

const KEYWORDS: &[&str] = &[
    "if", "then", "elif", "else", "end", "as", "reduce", "foreach", "try", "catch", "def",
    "and", "or", "label", "import", "include",
];

/// Parse a token stream into an expression and check names.
pub(crate) fn parse(tokens: Vec<Token>) -> Result<Expr, TransformError> {
    if tokens.is_empty() {
        return Ok(Expr::Identity);
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
        last_postfix: (0, 0),
    };
    let expr = parser.pipe(true)?;
    if let Some(token) = parser.peek() {
        return Err(syntax(format!("unexpected token {:?}", token)));
    }
    check_names(&expr, &mut Vec::new())?;
    Ok(expr)
}

fn syntax(message: impl Into<String>) -> TransformError {
    TransformError::Syntax(message.into())
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    /// Token span of the most recently completed postfix expression.
    last_postfix: (usize, usize),
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, word: &str) -> bool {
        if matches!(self.peek(), Some(Token::Ident(w)) if w == word) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, token: &Token, context: &str) -> Result<(), TransformError> {
        if self.eat(token) {
            Ok(())
        } else {
            Err(syntax(format!(
                "expected {:?} {}, found {}",
                token,
                context,
                self.describe_next()
            )))
        }
    }

    fn expect_keyword(&mut self, word: &str) -> Result<(), TransformError> {
        if self.eat_keyword(word) {
            Ok(())
        } else {
            Err(syntax(format!("expected '{}', found {}", word, self.describe_next())))
        }
    }

    fn describe_next(&self) -> String {
        match self.peek() {
            Some(token) => format!("{:?}", token),
            None => "end of input".to_string(),
        }
    }

    fn enter(&mut self) -> Result<(), TransformError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(syntax("expression nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// Undo `count` calls to [`Parser::enter`] made by an operator loop.
    fn leave_n(&mut self, count: usize) {
        self.depth -= count;
    }

    // ─────────────────────────────────────────────────────────────────────
    // Precedence levels
    // ─────────────────────────────────────────────────────────────────────

    /// `a | b`, right associative. Object values are parsed without `,`.
    fn pipe(&mut self, allow_comma: bool) -> Result<Expr, TransformError> {
        self.enter()?;
        let result = self.pipe_inner(allow_comma);
        self.leave();
        result
    }

    fn pipe_inner(&mut self, allow_comma: bool) -> Result<Expr, TransformError> {
        let start = self.pos;
        let lhs = if allow_comma { self.comma()? } else { self.alternative()? };

        if matches!(self.peek(), Some(Token::Ident(w)) if w == "as") {
            if self.last_postfix != (start, self.pos) {
                return Err(syntax("'as' must follow a simple term; add parentheses"));
            }
            self.pos += 1;
            let name = self.variable_name()?;
            self.expect(&Token::Pipe, "after variable binding")?;
            let body = self.pipe(allow_comma)?;
            return Ok(Expr::Bind(Box::new(lhs), name, Box::new(body)));
        }

        if self.eat(&Token::Pipe) {
            let rhs = self.pipe(allow_comma)?;
            return Ok(Expr::Pipe(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn variable_name(&mut self) -> Result<String, TransformError> {
        match self.next() {
            Some(Token::Var(name)) => Ok(name),
            Some(Token::LBracket | Token::LBrace) => Err(syntax("destructuring patterns are not supported")),
            other => Err(syntax(format!("expected $variable, found {:?}", other))),
        }
    }

    fn comma(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.alternative()?;
        let mut nested = 0;
        while self.eat(&Token::Comma) {
            self.enter()?;
            nested += 1;
            let rhs = self.alternative()?;
            lhs = Expr::Comma(Box::new(lhs), Box::new(rhs));
        }
        self.leave_n(nested);
        Ok(lhs)
    }

    fn alternative(&mut self) -> Result<Expr, TransformError> {
        let lhs = self.or()?;
        if self.eat(&Token::Alt) {
            self.enter()?;
            let rhs = self.alternative();
            self.leave();
            return Ok(Expr::Alt(Box::new(lhs), Box::new(rhs?)));
        }
        Ok(lhs)
    }

    fn or(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.and()?;
        let mut nested = 0;
        while self.eat_keyword("or") {
            self.enter()?;
            nested += 1;
            let rhs = self.and()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        self.leave_n(nested);
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.comparison()?;
        let mut nested = 0;
        while self.eat_keyword("and") {
            self.enter()?;
            nested += 1;
            let rhs = self.comparison()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        self.leave_n(nested);
        Ok(lhs)
    }

    fn comparison(&mut self) -> Result<Expr, TransformError> {
        let lhs = self.additive()?;
        let op = match self.peek() {
            Some(Token::Eq) => BinOp::Eq,
            Some(Token::Ne) => BinOp::Ne,
            Some(Token::Lt) => BinOp::Lt,
            Some(Token::Le) => BinOp::Le,
            Some(Token::Gt) => BinOp::Gt,
            Some(Token::Ge) => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.pos += 1;
        let rhs = self.additive()?;
        if matches!(
            self.peek(),
            Some(Token::Eq | Token::Ne | Token::Lt | Token::Le | Token::Gt | Token::Ge)
        ) {
            return Err(syntax("comparison operators do not chain; add parentheses"));
        }
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn additive(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.multiplicative()?;
        let mut nested = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinOp::Add,
                Some(Token::Minus) => BinOp::Sub,
                _ => {
                    self.leave_n(nested);
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.enter()?;
            nested += 1;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, TransformError> {
        let mut lhs = self.unary()?;
        let mut nested = 0;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinOp::Mul,
                Some(Token::Slash) => BinOp::Div,
                Some(Token::Percent) => BinOp::Mod,
                _ => {
                    self.leave_n(nested);
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.enter()?;
            nested += 1;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, TransformError> {
        if self.eat(&Token::Minus) {
            self.enter()?;
            let inner = self.unary();
            self.leave();
            return Ok(Expr::Neg(Box::new(inner?)));
        }
        self.postfix()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Terms
    // ─────────────────────────────────────────────────────────────────────

    fn postfix(&mut self) -> Result<Expr, TransformError> {
        let start = self.pos;
        let mut expr = self.term()?;
        let mut nested = 0;
        loop {
            if !matches!(self.peek(), Some(Token::Field(_) | Token::Dot | Token::LBracket | Token::Question)) {
                break;
            }
            self.enter()?;
            nested += 1;
            match self.peek() {
                Some(Token::Field(name)) => {
                    let key = Expr::Literal(Value::String(name.clone()));
                    self.pos += 1;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                Some(Token::Dot) if matches!(self.peek_at(1), Some(Token::Str(_))) => {
                    self.pos += 1;
                    let key = self.string_literal()?;
                    expr = Expr::Index(Box::new(expr), Box::new(key));
                }
                Some(Token::Dot) if self.peek_at(1) == Some(&Token::LBracket) => {
                    self.pos += 1;
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    expr = self.bracket_suffix(expr)?;
                }
                Some(Token::Question) => {
                    self.pos += 1;
                    expr = Expr::Try(Box::new(expr), None);
                }
                _ => break,
            }
        }
        self.leave_n(nested);
        self.last_postfix = (start, self.pos);
        Ok(expr)
    }

    /// After `[`: iteration, index or slice.
    fn bracket_suffix(&mut self, target: Expr) -> Result<Expr, TransformError> {
        if self.eat(&Token::RBracket) {
            return Ok(Expr::Iterate(Box::new(target)));
        }
        if self.eat(&Token::Colon) {
            let to = self.pipe(true)?;
            self.expect(&Token::RBracket, "to close slice")?;
            return Ok(Expr::Slice(Box::new(target), None, Some(Box::new(to))));
        }
        let index = self.pipe(true)?;
        if self.eat(&Token::Colon) {
            let to = if self.peek() == Some(&Token::RBracket) {
                None
            } else {
                Some(Box::new(self.pipe(true)?))
            };
            self.expect(&Token::RBracket, "to close slice")?;
            return Ok(Expr::Slice(Box::new(target), Some(Box::new(index)), to));
        }
        self.expect(&Token::RBracket, "to close index")?;
        Ok(Expr::Index(Box::new(target), Box::new(index)))
    }

    fn term(&mut self) -> Result<Expr, TransformError> {
        self.enter()?;
        let result = self.term_inner();
        self.leave();
        result
    }

    fn term_inner(&mut self) -> Result<Expr, TransformError> {
        let Some(token) = self.next() else {
            return Err(syntax("unexpected end of filter"));
        };
        match token {
            Token::Dot => match self.peek() {
                Some(Token::Str(_)) => {
                    let key = self.string_literal()?;
                    Ok(Expr::Index(Box::new(Expr::Identity), Box::new(key)))
                }
                _ => Ok(Expr::Identity),
            },
            Token::DotDot => Ok(Expr::RecurseAll),
            Token::Field(name) => Ok(Expr::Index(
                Box::new(Expr::Identity),
                Box::new(Expr::Literal(Value::String(name))),
            )),
            Token::Number(n) => Ok(Expr::Literal(builtins::number(n))),
            Token::Str(parts) => self.template(parts),
            Token::Var(name) => Ok(Expr::Var(name)),
            Token::LParen => {
                let inner = self.pipe(true)?;
                self.expect(&Token::RParen, "to close parenthesis")?;
                Ok(inner)
            }
            Token::LBracket => {
                if self.eat(&Token::RBracket) {
                    return Ok(Expr::Array(None));
                }
                let inner = self.pipe(true)?;
                self.expect(&Token::RBracket, "to close array")?;
                Ok(Expr::Array(Some(Box::new(inner))))
            }
            Token::LBrace => self.object(),
            Token::Ident(word) => self.word(word),
            other => Err(syntax(format!("unexpected token {:?}", other))),
        }
    }

    fn string_literal(&mut self) -> Result<Expr, TransformError> {
        match self.next() {
            Some(Token::Str(parts)) => self.template(parts),
            other => Err(syntax(format!("expected string, found {:?}", other))),
        }
    }

    fn template(&mut self, parts: Vec<StrPart>) -> Result<Expr, TransformError> {
        if parts.iter().all(|p| matches!(p, StrPart::Lit(_))) {
            let text: String = parts
                .into_iter()
                .filter_map(|p| match p {
                    StrPart::Lit(s) => Some(s),
                    StrPart::Interp(_) => None,
                })
                .collect();
            return Ok(Expr::Literal(Value::String(text)));
        }

        let mut out = Vec::with_capacity(parts.len());
        for part in parts {
            match part {
                StrPart::Lit(s) => out.push(TemplatePart::Lit(s)),
                StrPart::Interp(tokens) => {
                    let mut inner = Parser {
                        tokens,
                        pos: 0,
                        depth: self.depth,
                        last_postfix: (0, 0),
                    };
                    let expr = inner.pipe(true)?;
                    if inner.peek().is_some() {
                        return Err(syntax("unexpected token in string interpolation"));
                    }
                    out.push(TemplatePart::Expr(expr));
                }
            }
        }
        Ok(Expr::Template(out))
    }

    fn word(&mut self, word: String) -> Result<Expr, TransformError> {
        match word.as_str() {
            "null" => Ok(Expr::Literal(Value::Null)),
            "true" => Ok(Expr::Literal(Value::Bool(true))),
            "false" => Ok(Expr::Literal(Value::Bool(false))),
            "if" => self.conditional(),
            "reduce" => self.reduce(),
            "try" => {
                let body = self.postfix()?;
                let handler = if self.eat_keyword("catch") {
                    Some(Box::new(self.postfix()?))
                } else {
                    None
                };
                Ok(Expr::Try(Box::new(body), handler))
            }
            "def" => Err(syntax("function definitions are not supported")),
            "foreach" | "label" | "import" | "include" => {
                Err(syntax(format!("'{}' is not supported", word)))
            }
            w if KEYWORDS.contains(&w) => Err(syntax(format!("unexpected keyword '{}'", w))),
            _ => {
                let mut args = Vec::new();
                if self.eat(&Token::LParen) {
                    loop {
                        args.push(self.pipe(true)?);
                        if self.eat(&Token::Semicolon) {
                            continue;
                        }
                        self.expect(&Token::RParen, "to close arguments")?;
                        break;
                    }
                }
                Ok(Expr::Call(word, args))
            }
        }
    }

    fn conditional(&mut self) -> Result<Expr, TransformError> {
        let mut branches = Vec::new();
        let cond = self.pipe(true)?;
        self.expect_keyword("then")?;
        let then = self.pipe(true)?;
        branches.push((cond, then));

        loop {
            if self.eat_keyword("elif") {
                let cond = self.pipe(true)?;
                self.expect_keyword("then")?;
                let then = self.pipe(true)?;
                branches.push((cond, then));
            } else if self.eat_keyword("else") {
                let otherwise = self.pipe(true)?;
                self.expect_keyword("end")?;
                return Ok(Expr::If(branches, Some(Box::new(otherwise))));
            } else {
                self.expect_keyword("end")?;
                return Ok(Expr::If(branches, None));
            }
        }
    }

    fn reduce(&mut self) -> Result<Expr, TransformError> {
        let source = self.postfix()?;
        self.expect_keyword("as")?;
        let name = self.variable_name()?;
        self.expect(&Token::LParen, "after reduce binding")?;
        let init = self.pipe(true)?;
        self.expect(&Token::Semicolon, "between reduce init and update")?;
        let update = self.pipe(true)?;
        self.expect(&Token::RParen, "to close reduce")?;
        Ok(Expr::Reduce(Box::new(source), name, Box::new(init), Box::new(update)))
    }

    fn object(&mut self) -> Result<Expr, TransformError> {
        let mut entries = Vec::new();
        if self.eat(&Token::RBrace) {
            return Ok(Expr::Object(entries));
        }

        loop {
            let (key, shorthand) = match self.next() {
                Some(Token::Ident(name)) => {
                    let value = Expr::Index(
                        Box::new(Expr::Identity),
                        Box::new(Expr::Literal(Value::String(name.clone()))),
                    );
                    (ObjKey::Name(name), value)
                }
                Some(Token::Var(name)) => (ObjKey::Name(name.clone()), Expr::Var(name)),
                Some(Token::Str(parts)) => match self.template(parts)? {
                    Expr::Literal(Value::String(name)) => {
                        let value = Expr::Index(
                            Box::new(Expr::Identity),
                            Box::new(Expr::Literal(Value::String(name.clone()))),
                        );
                        (ObjKey::Name(name), value)
                    }
                    key => {
                        let value = Expr::Index(Box::new(Expr::Identity), Box::new(key.clone()));
                        (ObjKey::Computed(key), value)
                    }
                },
                Some(Token::Number(n)) => {
                    return Err(syntax(format!("object keys must be strings, found {}", n)));
                }
                Some(Token::LParen) => {
                    let key = self.pipe(true)?;
                    self.expect(&Token::RParen, "to close computed key")?;
                    self.expect(&Token::Colon, "after computed key")?;
                    let value = self.object_value()?;
                    entries.push((ObjKey::Computed(key), value));
                    if self.object_entry_end()? {
                        return Ok(Expr::Object(entries));
                    }
                    continue;
                }
                other => return Err(syntax(format!("invalid object key {:?}", other))),
            };

            let value = if self.eat(&Token::Colon) {
                self.object_value()?
            } else {
                shorthand
            };
            entries.push((key, value));
            if self.object_entry_end()? {
                return Ok(Expr::Object(entries));
            }
        }
    }

    fn object_value(&mut self) -> Result<Expr, TransformError> {
        self.pipe(false)
    }

    /// Consume `,` or `}`; true when the object is closed.
    fn object_entry_end(&mut self) -> Result<bool, TransformError> {
        if self.eat(&Token::Comma) {
            return Ok(false);
        }
        self.expect(&Token::RBrace, "to close object")?;
        Ok(true)
    }
}

/// Reject unknown functions, wrong arities and unbound variables up front.
fn check_names(expr: &Expr, scope: &mut Vec<String>) -> Result<(), TransformError> {
    match expr {
        Expr::Identity | Expr::RecurseAll | Expr::Literal(_) => Ok(()),
        Expr::Var(name) => {
            if scope.iter().any(|v| v == name) {
                Ok(())
            } else {
                Err(syntax(format!("${} is not defined", name)))
            }
        }
        Expr::Template(parts) => parts.iter().try_for_each(|p| match p {
            TemplatePart::Lit(_) => Ok(()),
            TemplatePart::Expr(e) => check_names(e, scope),
        }),
        Expr::Index(a, b)
        | Expr::Pipe(a, b)
        | Expr::Comma(a, b)
        | Expr::Alt(a, b)
        | Expr::And(a, b)
        | Expr::Or(a, b)
        | Expr::Binary(_, a, b) => {
            check_names(a, scope)?;
            check_names(b, scope)
        }
        Expr::Slice(target, from, to) => {
            check_names(target, scope)?;
            if let Some(from) = from {
                check_names(from, scope)?;
            }
            if let Some(to) = to {
                check_names(to, scope)?;
            }
            Ok(())
        }
        Expr::Iterate(e) | Expr::Neg(e) => check_names(e, scope),
        Expr::Try(body, handler) => {
            check_names(body, scope)?;
            match handler {
                Some(h) => check_names(h, scope),
                None => Ok(()),
            }
        }
        Expr::Array(inner) => match inner {
            Some(e) => check_names(e, scope),
            None => Ok(()),
        },
        Expr::Object(entries) => entries.iter().try_for_each(|(key, value)| {
            if let ObjKey::Computed(k) = key {
                check_names(k, scope)?;
            }
            check_names(value, scope)
        }),
        Expr::If(branches, otherwise) => {
            for (cond, then) in branches {
                check_names(cond, scope)?;
                check_names(then, scope)?;
            }
            match otherwise {
                Some(e) => check_names(e, scope),
                None => Ok(()),
            }
        }
        Expr::Bind(source, name, body) => {
            check_names(source, scope)?;
            scope.push(name.clone());
            let result = check_names(body, scope);
            scope.pop();
            result
        }
        Expr::Reduce(source, name, init, update) => {
            check_names(source, scope)?;
            check_names(init, scope)?;
            scope.push(name.clone());
            let result = check_names(update, scope);
            scope.pop();
            result
        }
        Expr::Call(name, args) => {
            if !builtins::exists(name, args.len()) {
                return Err(syntax(format!("{}/{} is not defined", name, args.len())));
            }
            args.iter().try_for_each(|a| check_names(a, scope))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::lexer::tokenize;
    use serde_json::json;

    fn parse_str(src: &str) -> Result<Expr, TransformError> {
        parse(tokenize(src)?)
    }

    fn field(name: &str) -> Expr {
        Expr::Index(
            Box::new(Expr::Identity),
            Box::new(Expr::Literal(json!(name))),
        )
    }

    #[test]
    fn test_empty_filter_is_identity() {
        assert_eq!(parse_str("").unwrap(), Expr::Identity);
        assert_eq!(parse_str(".").unwrap(), Expr::Identity);
    }

    #[test]
    fn test_pipe_binds_looser_than_comma() {
        let expr = parse_str(".a, .b | .c").unwrap();
        assert_eq!(
            expr,
            Expr::Pipe(
                Box::new(Expr::Comma(Box::new(field("a")), Box::new(field("b")))),
                Box::new(field("c"))
            )
        );
    }

    #[test]
    fn test_arithmetic_precedence() {
        let expr = parse_str("1 + 2 * 3").unwrap();
        let Expr::Binary(BinOp::Add, _, rhs) = expr else {
            panic!("expected addition at the root");
        };
        assert!(matches!(*rhs, Expr::Binary(BinOp::Mul, _, _)));
    }

    #[test]
    fn test_postfix_chain() {
        let expr = parse_str(".a[0].b[]?").unwrap();
        assert!(matches!(expr, Expr::Try(_, None)));
        assert!(parse_str(r#"."Family Type".x"#).is_ok());
        assert!(parse_str(".a.[1:]").is_ok());
    }

    #[test]
    fn test_binding_scope() {
        assert!(parse_str(".[] as $x | $x").is_ok());
        assert!(parse_str("$x").is_err());
        assert!(parse_str("(.[] as $x | $x), $x").is_err());
        assert!(parse_str("reduce .[] as $r (0; . + $r)").is_ok());
    }

    #[test]
    fn test_object_forms() {
        assert!(parse_str("{$missing}").is_err());

        let expr = parse_str(r#"{a, "b c": 1, (.k): .v | tostring, w: .x}"#).unwrap();
        let Expr::Object(entries) = expr else {
            panic!("expected object");
        };
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].0, ObjKey::Name("a".into()));
    }

    #[test]
    fn test_unknown_function_and_arity() {
        let err = parse_str("input").unwrap_err();
        assert!(err.to_string().contains("input/0 is not defined"));
        assert!(parse_str("env").is_err());
        assert!(parse_str("map").is_err());
        assert!(parse_str("map(.a)").is_ok());
    }

    #[test]
    fn test_unsupported_constructs() {
        assert!(parse_str("def f: .; f").is_err());
        assert!(parse_str(". as [$a] | $a").is_err());
        assert!(parse_str("1 < 2 < 3").is_err());
        assert!(parse_str(".a |").is_err());
        assert!(parse_str("(.a").is_err());
    }

    #[test]
    fn test_deep_nesting_is_rejected() {
        let src = format!("{}.{}", "(".repeat(1000), ")".repeat(1000));
        assert!(parse_str(&src).is_err());
    }

    #[test]
    fn test_nesting_within_limit_parses() {
        let src = format!("{}.{}", "(".repeat(20), ")".repeat(20));
        assert_eq!(parse_str(&src).unwrap(), Expr::Identity);
    }

    #[test]
    fn test_if_without_else() {
        let expr = parse_str("if . then 1 elif false then 2 end").unwrap();
        assert!(matches!(expr, Expr::If(ref b, None) if b.len() == 2));
    }
}

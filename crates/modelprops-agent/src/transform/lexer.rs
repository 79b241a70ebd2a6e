//! Tokenizer for filter expressions.

use super::TransformError;

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    /// `.` on its own.
    Dot,
    /// `..`
    DotDot,
    /// `.name`
    Field(String),
    Number(f64),
    /// A string literal, possibly with `\(...)` interpolations.
    Str(Vec<StrPart>),
    Ident(String),
    /// `$name`
    Var(String),
    Pipe,
    Comma,
    Colon,
    Semicolon,
    Question,
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// `//`
    Alt,
}

/// A piece of a string literal.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum StrPart {
    Lit(String),
    Interp(Vec<Token>),
}

/// String interpolations nested deeper than this are rejected.
const MAX_INTERPOLATION_DEPTH: usize = 16;

/// Split `source` into tokens.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, TransformError> {
    let mut lexer = Lexer {
        chars: source.chars().collect(),
        pos: 0,
        interpolation_depth: 0,
    };
    lexer.tokens(false)
}

struct Lexer {
    chars: Vec<char>,
    pos: usize,
    interpolation_depth: usize,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

impl Lexer {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn error(&self, message: impl Into<String>) -> TransformError {
        TransformError::Syntax(format!("{} at offset {}", message.into(), self.pos))
    }

    /// Lex until end of input, or until the `)` closing an interpolation.
    fn tokens(&mut self, in_interpolation: bool) -> Result<Vec<Token>, TransformError> {
        let mut tokens = Vec::new();
        let mut depth = 0usize;

        loop {
            self.skip_trivia();
            let Some(c) = self.peek() else {
                if in_interpolation {
                    return Err(self.error("unterminated string interpolation"));
                }
                return Ok(tokens);
            };

            let token = match c {
                '.' => self.dot()?,
                '"' => {
                    self.pos += 1;
                    Token::Str(self.string()?)
                }
                '$' => {
                    self.pos += 1;
                    let name = self.ident();
                    if name.is_empty() {
                        return Err(self.error("expected variable name after '$'"));
                    }
                    Token::Var(name)
                }
                c if c.is_ascii_digit() => self.number()?,
                c if is_ident_start(c) => Token::Ident(self.ident()),
                '(' => {
                    self.pos += 1;
                    depth += 1;
                    Token::LParen
                }
                ')' => {
                    self.pos += 1;
                    if in_interpolation && depth == 0 {
                        return Ok(tokens);
                    }
                    depth = depth.saturating_sub(1);
                    Token::RParen
                }
                _ => self.punct(c)?,
            };
            tokens.push(token);
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.pos += 1;
            } else if c == '#' {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
    }

    fn dot(&mut self) -> Result<Token, TransformError> {
        self.pos += 1;
        match self.peek() {
            Some('.') => {
                self.pos += 1;
                Ok(Token::DotDot)
            }
            Some(c) if is_ident_start(c) => Ok(Token::Field(self.ident())),
            Some(c) if c.is_ascii_digit() => {
                self.pos -= 1;
                self.number()
            }
            _ => Ok(Token::Dot),
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }

    fn number(&mut self) -> Result<Token, TransformError> {
        let start = self.pos;
        while self.peek().is_some_and(|c| c.is_ascii_digit() || c == '.') {
            self.pos += 1;
        }
        if matches!(self.peek(), Some('e' | 'E')) {
            let sign = matches!(self.peek_at(1), Some('+' | '-'));
            let digit_at = if sign { 2 } else { 1 };
            if self.peek_at(digit_at).is_some_and(|c| c.is_ascii_digit()) {
                self.pos += digit_at;
                while self.peek().is_some_and(|c| c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let text: String = self.chars[start..self.pos].iter().collect();
        text.parse::<f64>()
            .map(Token::Number)
            .map_err(|_| self.error(format!("invalid number '{}'", text)))
    }

    /// Lex a string body; the opening quote is already consumed.
    fn string(&mut self) -> Result<Vec<StrPart>, TransformError> {
        let mut parts = Vec::new();
        let mut buf = String::new();

        loop {
            let Some(c) = self.peek() else {
                return Err(self.error("unterminated string"));
            };
            self.pos += 1;
            match c {
                '"' => break,
                '\\' => {
                    let Some(esc) = self.peek() else {
                        return Err(self.error("unterminated escape"));
                    };
                    self.pos += 1;
                    match esc {
                        '"' => buf.push('"'),
                        '\\' => buf.push('\\'),
                        '/' => buf.push('/'),
                        'n' => buf.push('\n'),
                        't' => buf.push('\t'),
                        'r' => buf.push('\r'),
                        'b' => buf.push('\u{8}'),
                        'f' => buf.push('\u{c}'),
                        'u' => buf.push(self.unicode_escape()?),
                        '(' => {
                            if !buf.is_empty() {
                                parts.push(StrPart::Lit(std::mem::take(&mut buf)));
                            }
                            if self.interpolation_depth == MAX_INTERPOLATION_DEPTH {
                                return Err(self.error("string interpolation nested too deeply"));
                            }
                            self.interpolation_depth += 1;
                            let inner = self.tokens(true);
                            self.interpolation_depth -= 1;
                            parts.push(StrPart::Interp(inner?));
                        }
                        other => return Err(self.error(format!("invalid escape '\\{}'", other))),
                    }
                }
                other => buf.push(other),
            }
        }

        if !buf.is_empty() {
            parts.push(StrPart::Lit(buf));
        }
        Ok(parts)
    }

    fn unicode_escape(&mut self) -> Result<char, TransformError> {
        let code = self.hex4()?;
        if (0xD800..0xDC00).contains(&code) {
            if self.peek() == Some('\\') && self.peek_at(1) == Some('u') {
                self.pos += 2;
                let low = self.hex4()?;
                if (0xDC00..0xE000).contains(&low) {
                    let combined = 0x10000 + ((code - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(combined).ok_or_else(|| self.error("invalid surrogate pair"));
                }
            }
            return Err(self.error("invalid surrogate pair"));
        }
        char::from_u32(code).ok_or_else(|| self.error("invalid unicode escape"))
    }

    fn hex4(&mut self) -> Result<u32, TransformError> {
        let end = self.pos + 4;
        if end > self.chars.len() {
            return Err(self.error("truncated unicode escape"));
        }
        let hex: String = self.chars[self.pos..end].iter().collect();
        self.pos = end;
        u32::from_str_radix(&hex, 16).map_err(|_| self.error(format!("invalid unicode escape '{}'", hex)))
    }

    fn punct(&mut self, c: char) -> Result<Token, TransformError> {
        let next = self.peek_at(1);
        let (token, width) = match (c, next) {
            ('/', Some('/')) => (Token::Alt, 2),
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('|', _) => (Token::Pipe, 1),
            (',', _) => (Token::Comma, 1),
            (':', _) => (Token::Colon, 1),
            (';', _) => (Token::Semicolon, 1),
            ('?', _) => (Token::Question, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            ('{', _) => (Token::LBrace, 1),
            ('}', _) => (Token::RBrace, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('=', _) => return Err(self.error("assignment is not supported")),
            (other, _) => return Err(self.error(format!("unexpected character '{}'", other))),
        };
        self.pos += width;
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_and_fields() {
        assert_eq!(
            tokenize(".[] | .Width").unwrap(),
            vec![
                Token::Dot,
                Token::LBracket,
                Token::RBracket,
                Token::Pipe,
                Token::Field("Width".into())
            ]
        );
        assert_eq!(tokenize("..").unwrap(), vec![Token::DotDot]);
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            tokenize("1 2.5 1e3 .5").unwrap(),
            vec![
                Token::Number(1.0),
                Token::Number(2.5),
                Token::Number(1000.0),
                Token::Number(0.5)
            ]
        );
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokenize("// == != <= >= < > $x").unwrap(),
            vec![
                Token::Alt,
                Token::Eq,
                Token::Ne,
                Token::Le,
                Token::Ge,
                Token::Lt,
                Token::Gt,
                Token::Var("x".into())
            ]
        );
    }

    #[test]
    fn test_string_escapes() {
        let tokens = tokenize(r#""a\"b\n\u00e9""#).unwrap();
        assert_eq!(tokens, vec![Token::Str(vec![StrPart::Lit("a\"b\né".into())])]);
    }

    #[test]
    fn test_string_interpolation() {
        let tokens = tokenize(r#""w=\(.w + (1))!""#).unwrap();
        let Token::Str(parts) = &tokens[0] else {
            panic!("expected string");
        };
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], StrPart::Lit("w=".into()));
        assert!(matches!(&parts[1], StrPart::Interp(inner) if inner.len() == 5));
        assert_eq!(parts[2], StrPart::Lit("!".into()));
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            tokenize(".a # width\n| .b").unwrap(),
            vec![Token::Field("a".into()), Token::Pipe, Token::Field("b".into())]
        );
    }

    #[test]
    fn test_errors() {
        assert!(matches!(tokenize("\"open"), Err(TransformError::Syntax(_))));
        assert!(matches!(tokenize(".a = 1"), Err(TransformError::Syntax(_))));
        assert!(matches!(tokenize("@csv"), Err(TransformError::Syntax(_))));
        assert!(matches!(tokenize("\"\\(.a\""), Err(TransformError::Syntax(_))));
    }

    #[test]
    fn test_interpolation_nesting_is_bounded() {
        let mut src = String::from(".a");
        for _ in 0..40 {
            src = format!("\"\\({src})\"");
        }
        assert!(matches!(tokenize(&src), Err(TransformError::Syntax(_))));

        let mut shallow = String::from(".a");
        for _ in 0..3 {
            shallow = format!("\"\\({shallow})\"");
        }
        assert!(tokenize(&shallow).is_ok());
    }
}

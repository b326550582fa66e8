//! Tokenizer and precedence-climbing parser.

use super::{BinaryOp, Expression, IN_PRECEDENCE};
use crate::error::{SchemaError, SchemaResult};
use crate::name::Name;
use strata_codec::Value;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Integer(i64),
    Number(f64),
    Str(String),
    Op(&'static str),
    End,
}

const OPERATORS: [&str; 19] = [
    "==", "!=", "<=", ">=", "&&", "||", "<", ">", "!", "+", "-", "*", "/", "%", "(", ")", "[",
    "]", ",",
];

struct Lexer<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn error(&self, message: impl std::fmt::Display) -> SchemaError {
        SchemaError::expression(format!("{message} at {} in '{}'", self.pos, self.text))
    }

    fn peek_char(&self) -> Option<char> {
        self.text[self.pos..].chars().next()
    }

    fn tokenize(mut self) -> SchemaResult<Vec<(usize, Token)>> {
        let mut out = Vec::new();
        loop {
            while self.peek_char().is_some_and(char::is_whitespace) {
                self.pos += self.peek_char().map_or(0, char::len_utf8);
            }
            let start = self.pos;
            let Some(c) = self.peek_char() else {
                out.push((start, Token::End));
                return Ok(out);
            };
            let token = if c.is_ascii_alphabetic() || c == '_' {
                self.ident()
            } else if c.is_ascii_digit() {
                self.number()?
            } else if c == '"' || c == '\'' {
                self.string(c)?
            } else if c == '.' {
                self.pos += 1;
                Token::Op(".")
            } else {
                let rest = &self.text[self.pos..];
                let op = OPERATORS
                    .iter()
                    .find(|op| rest.starts_with(*op))
                    .ok_or_else(|| self.error(format!("unexpected character '{c}'")))?;
                self.pos += op.len();
                Token::Op(*op)
            };
            out.push((start, token));
        }
    }

    fn ident(&mut self) -> Token {
        let start = self.pos;
        while self
            .peek_char()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            self.pos += 1;
        }
        Token::Ident(self.text[start..self.pos].to_string())
    }

    fn number(&mut self) -> SchemaResult<Token> {
        let start = self.pos;
        let bytes = self.text.as_bytes();
        let digits = |pos: &mut usize| {
            while *pos < bytes.len() && bytes[*pos].is_ascii_digit() {
                *pos += 1;
            }
        };
        digits(&mut self.pos);
        let mut float = false;
        if self.pos + 1 < bytes.len() && bytes[self.pos] == b'.' && bytes[self.pos + 1].is_ascii_digit()
        {
            float = true;
            self.pos += 1;
            digits(&mut self.pos);
        }
        if self.pos < bytes.len() && (bytes[self.pos] == b'e' || bytes[self.pos] == b'E') {
            let mut pos = self.pos + 1;
            if pos < bytes.len() && (bytes[pos] == b'+' || bytes[pos] == b'-') {
                pos += 1;
            }
            if pos < bytes.len() && bytes[pos].is_ascii_digit() {
                float = true;
                digits(&mut pos);
                self.pos = pos;
            }
        }
        let literal = &self.text[start..self.pos];
        if float {
            literal
                .parse()
                .map(Token::Number)
                .map_err(|_| self.error(format!("invalid number '{literal}'")))
        } else {
            literal
                .parse()
                .map(Token::Integer)
                .map_err(|_| self.error(format!("integer out of range '{literal}'")))
        }
    }

    fn string(&mut self, quote: char) -> SchemaResult<Token> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            let c = self
                .peek_char()
                .ok_or_else(|| self.error("unterminated string"))?;
            self.pos += c.len_utf8();
            match c {
                '\\' => {
                    let escaped = self
                        .peek_char()
                        .ok_or_else(|| self.error("unterminated escape"))?;
                    self.pos += escaped.len_utf8();
                    out.push(match escaped {
                        'n' => '\n',
                        'r' => '\r',
                        't' => '\t',
                        other => other,
                    });
                }
                c if c == quote => return Ok(Token::Str(out)),
                c => out.push(c),
            }
        }
    }
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<(usize, Token)>,
    index: usize,
}

pub(super) fn parse(text: &str) -> SchemaResult<Expression> {
    let tokens = Lexer { text, pos: 0 }.tokenize()?;
    let mut parser = Parser {
        text,
        tokens,
        index: 0,
    };
    let expression = parser.expression(0)?;
    match parser.peek() {
        Token::End => Ok(expression),
        other => Err(parser.error(format!("unexpected {other:?}"))),
    }
}

fn binary_op(token: &Token) -> Option<BinaryOp> {
    Some(match token {
        Token::Op("||") => BinaryOp::Or,
        Token::Op("&&") => BinaryOp::And,
        Token::Op("==") => BinaryOp::Eq,
        Token::Op("!=") => BinaryOp::Ne,
        Token::Op("<") => BinaryOp::Lt,
        Token::Op("<=") => BinaryOp::Le,
        Token::Op(">") => BinaryOp::Gt,
        Token::Op(">=") => BinaryOp::Ge,
        Token::Op("+") => BinaryOp::Add,
        Token::Op("-") => BinaryOp::Sub,
        Token::Op("*") => BinaryOp::Mul,
        Token::Op("/") => BinaryOp::Div,
        Token::Op("%") => BinaryOp::Mod,
        _ => return None,
    })
}

impl Parser<'_> {
    fn peek(&self) -> &Token {
        self.tokens
            .get(self.index)
            .map_or(&Token::End, |(_, token)| token)
    }

    fn next(&mut self) -> Token {
        let token = self.peek().clone();
        if self.index < self.tokens.len() {
            self.index += 1;
        }
        token
    }

    fn error(&self, message: impl std::fmt::Display) -> SchemaError {
        let pos = self.tokens.get(self.index).map_or(self.text.len(), |(p, _)| *p);
        SchemaError::expression(format!("{message} at {pos} in '{}'", self.text))
    }

    fn expect(&mut self, op: &'static str) -> SchemaResult<()> {
        if self.peek() == &Token::Op(op) {
            self.index += 1;
            Ok(())
        } else {
            Err(self.error(format!("expected '{op}'")))
        }
    }

    fn expression(&mut self, min: u8) -> SchemaResult<Expression> {
        let mut left = self.unary()?;
        loop {
            let token = self.peek();
            if matches!(token, Token::Ident(word) if word == "in") {
                if IN_PRECEDENCE < min {
                    break;
                }
                self.index += 1;
                let list = self.expression(IN_PRECEDENCE + 1)?;
                left = Expression::In {
                    value: Box::new(left),
                    list: Box::new(list),
                };
                continue;
            }
            let Some(op) = binary_op(token) else { break };
            let precedence = op.precedence();
            if precedence < min {
                break;
            }
            self.index += 1;
            let right = self.expression(precedence + 1)?;
            left = Expression::binary(op, left, right);
        }
        Ok(left)
    }

    fn unary(&mut self) -> SchemaResult<Expression> {
        match self.peek() {
            Token::Op("!") => {
                self.index += 1;
                Ok(Expression::Not(Box::new(self.unary()?)))
            }
            Token::Op("-") => {
                self.index += 1;
                Ok(Expression::Negate(Box::new(self.unary()?)))
            }
            _ => self.primary(),
        }
    }

    fn list(&mut self, close: &'static str) -> SchemaResult<Vec<Expression>> {
        let mut items = Vec::new();
        if self.peek() == &Token::Op(close) {
            self.index += 1;
            return Ok(items);
        }
        loop {
            items.push(self.expression(0)?);
            match self.next() {
                Token::Op(",") => continue,
                Token::Op(op) if op == close => return Ok(items),
                _ => return Err(self.error(format!("expected ',' or '{close}'"))),
            }
        }
    }

    fn word(&mut self, word: String) -> SchemaResult<Expression> {
        match word.as_str() {
            "null" => return Ok(Expression::Constant(Value::Null)),
            "true" => return Ok(Expression::Constant(Value::Bool(true))),
            "false" => return Ok(Expression::Constant(Value::Bool(false))),
            _ => {}
        }
        if self.peek() == &Token::Op("(") {
            self.index += 1;
            let args = self.list(")")?;
            return Ok(Expression::Call { name: word, args });
        }
        let mut parts = vec![word];
        while self.peek() == &Token::Op(".") {
            self.index += 1;
            match self.next() {
                Token::Ident(part) => parts.push(part),
                _ => return Err(self.error("expected member name after '.'")),
            }
        }
        Ok(Expression::Path(Name::of(parts)))
    }

    fn primary(&mut self) -> SchemaResult<Expression> {
        match self.next() {
            Token::Integer(n) => Ok(Expression::Constant(Value::Integer(n))),
            Token::Number(n) => Ok(Expression::Constant(Value::Number(n))),
            Token::Str(s) => Ok(Expression::Constant(Value::String(s))),
            Token::Op("(") => {
                let inner = self.expression(0)?;
                self.expect(")")?;
                Ok(inner)
            }
            Token::Op("[") => Ok(Expression::Array(self.list("]")?)),
            Token::Ident(word) => self.word(word),
            Token::End => Err(self.error("unexpected end of expression")),
            other => Err(self.error(format!("unexpected {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_and_associativity() {
        let e = parse("1 + 2 * 3 - 4").unwrap();
        assert_eq!(
            e,
            Expression::binary(
                BinaryOp::Sub,
                Expression::binary(
                    BinaryOp::Add,
                    Expression::constant(1),
                    Expression::binary(
                        BinaryOp::Mul,
                        Expression::constant(2),
                        Expression::constant(3)
                    ),
                ),
                Expression::constant(4),
            )
        );
    }

    #[test]
    fn literals() {
        assert_eq!(parse("1.5e2").unwrap(), Expression::constant(150.0));
        assert_eq!(parse("'single'").unwrap(), Expression::constant("single"));
        assert_eq!(parse("null").unwrap(), Expression::Constant(Value::Null));
        assert_eq!(parse("[]").unwrap(), Expression::Array(vec![]));
    }

    #[test]
    fn calls_and_paths() {
        let e = parse("lower(author.name)").unwrap();
        assert_eq!(
            e,
            Expression::Call {
                name: "lower".into(),
                args: vec![Expression::path("author.name")],
            }
        );
        assert_eq!(
            parse("count()").unwrap(),
            Expression::Call {
                name: "count".into(),
                args: vec![],
            }
        );
    }

    #[test]
    fn in_binds_tighter_than_and() {
        let e = parse("a in [1, 2] && b").unwrap();
        assert!(matches!(e, Expression::Binary { op: BinaryOp::And, .. }));
    }

    #[test]
    fn errors_carry_position() {
        let err = parse("a == ").unwrap_err();
        assert!(err.to_string().contains("unexpected end"));
        assert!(parse("a == 1 )").is_err());
        assert!(parse("\"open").is_err());
        assert!(parse("a # b").is_err());
        assert!(parse("a.").is_err());
    }
}

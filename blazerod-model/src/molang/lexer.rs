//! Molang tokenizer

use super::ParseError;

#[derive(Debug, Clone, PartialEq)]
pub(super) enum Token {
    Number(f32),
    Ident(String),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Comma,
    Semicolon,
    Question,
    Colon,
    Coalesce,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    Assign,
    Eof,
}

/// Token plus its byte offset in the source
pub(super) type Spanned = (Token, usize);

pub(super) fn tokenize(source: &str) -> Result<Vec<Spanned>, ParseError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos];
        if c.is_ascii_whitespace() {
            pos += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == b'.' && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit)) {
            while pos < bytes.len() && (bytes[pos].is_ascii_digit() || bytes[pos] == b'.') {
                pos += 1;
            }
            let text = &source[start..pos];
            let value = text
                .parse::<f32>()
                .map_err(|_| ParseError::new(start, format!("invalid number {text:?}")))?;
            // Float suffix as written by some exporters: `1.5f`
            if pos < bytes.len() && (bytes[pos] == b'f' || bytes[pos] == b'F') {
                pos += 1;
            }
            tokens.push((Token::Number(value), start));
            continue;
        }

        if c.is_ascii_alphabetic() || c == b'_' {
            while pos < bytes.len()
                && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_' || bytes[pos] == b'.')
            {
                pos += 1;
            }
            let ident = source[start..pos].to_ascii_lowercase();
            if ident.ends_with('.') {
                return Err(ParseError::new(start, format!("dangling '.' in {ident:?}")));
            }
            tokens.push((Token::Ident(ident), start));
            continue;
        }

        if c == b'\'' {
            pos += 1;
            let content_start = pos;
            while pos < bytes.len() && bytes[pos] != b'\'' {
                pos += 1;
            }
            if pos >= bytes.len() {
                return Err(ParseError::new(start, "unterminated string"));
            }
            tokens.push((Token::Str(source[content_start..pos].to_string()), start));
            pos += 1;
            continue;
        }

        let next = bytes.get(pos + 1).copied();
        let (token, width) = match (c, next) {
            (b'?', Some(b'?')) => (Token::Coalesce, 2),
            (b'=', Some(b'=')) => (Token::Eq, 2),
            (b'!', Some(b'=')) => (Token::Ne, 2),
            (b'<', Some(b'=')) => (Token::Le, 2),
            (b'>', Some(b'=')) => (Token::Ge, 2),
            (b'&', Some(b'&')) => (Token::And, 2),
            (b'|', Some(b'|')) => (Token::Or, 2),
            (b'+', _) => (Token::Plus, 1),
            (b'-', _) => (Token::Minus, 1),
            (b'*', _) => (Token::Star, 1),
            (b'/', _) => (Token::Slash, 1),
            (b'(', _) => (Token::LParen, 1),
            (b')', _) => (Token::RParen, 1),
            (b'{', _) => (Token::LBrace, 1),
            (b'}', _) => (Token::RBrace, 1),
            (b',', _) => (Token::Comma, 1),
            (b';', _) => (Token::Semicolon, 1),
            (b'?', _) => (Token::Question, 1),
            (b':', _) => (Token::Colon, 1),
            (b'<', _) => (Token::Lt, 1),
            (b'>', _) => (Token::Gt, 1),
            (b'!', _) => (Token::Not, 1),
            (b'=', _) => (Token::Assign, 1),
            _ => {
                let ch = source[start..].chars().next().unwrap_or('?');
                return Err(ParseError::new(start, format!("unexpected character {ch:?}")));
            }
        };
        tokens.push((token, start));
        pos += width;
    }

    tokens.push((Token::Eof, source.len()));
    Ok(tokens)
}

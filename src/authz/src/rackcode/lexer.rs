//! Tokenizer for the rule language

use crate::error::SyntaxError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum TokenKind {
    /// Bare word: keyword, predicate function name, integer or tag name
    Word(String),
    /// `"quoted text"`
    Str(String),
    /// `{tag name}`
    Brace(String),
    /// `[predicate name]`
    Bracket(String),
    LParen,
    RParen,
    Eq, // ==
    Ne, // !=
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Token {
    pub kind: TokenKind,
    /// Byte offset of the first character
    pub offset: usize,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '$' | '.' | ':' | '-')
}

/// Split rule source into tokens. Whitespace and `#` comments are dropped.
pub(crate) fn tokenize(source: &str) -> Result<Vec<Token>, SyntaxError> {
    let mut tokens = Vec::new();
    let mut chars = source.char_indices().peekable();

    while let Some(&(offset, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '#' => {
                while let Some(&(_, c)) = chars.peek() {
                    if c == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '(' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::LParen, offset });
            }
            ')' => {
                chars.next();
                tokens.push(Token { kind: TokenKind::RParen, offset });
            }
            '=' | '!' => {
                chars.next();
                match chars.peek() {
                    Some(&(_, '=')) => {
                        chars.next();
                        let kind = if c == '=' { TokenKind::Eq } else { TokenKind::Ne };
                        tokens.push(Token { kind, offset });
                    }
                    _ => {
                        return Err(SyntaxError::at(
                            source,
                            offset,
                            format!("unexpected character `{c}` (did you mean `{c}=`?)"),
                        ));
                    }
                }
            }
            '{' | '[' => {
                chars.next();
                let close = if c == '{' { '}' } else { ']' };
                let mut text = String::new();
                let mut closed = false;
                for (_, inner) in chars.by_ref() {
                    if inner == close {
                        closed = true;
                        break;
                    }
                    if inner == '\n' {
                        break;
                    }
                    text.push(inner);
                }
                if !closed {
                    return Err(SyntaxError::at(
                        source,
                        offset,
                        format!("unterminated `{c}`, expected `{close}`"),
                    ));
                }
                let name = text.trim().to_string();
                if name.is_empty() {
                    return Err(SyntaxError::at(
                        source,
                        offset,
                        format!("empty name inside `{c}{close}`"),
                    ));
                }
                let kind = if c == '{' {
                    TokenKind::Brace(name)
                } else {
                    TokenKind::Bracket(name)
                };
                tokens.push(Token { kind, offset });
            }
            '"' => {
                chars.next();
                let mut text = String::new();
                let mut closed = false;
                while let Some((_, inner)) = chars.next() {
                    match inner {
                        '"' => {
                            closed = true;
                            break;
                        }
                        '\\' => match chars.next() {
                            Some((_, escaped)) => text.push(escaped),
                            None => break,
                        },
                        other => text.push(other),
                    }
                }
                if !closed {
                    return Err(SyntaxError::at(
                        source,
                        offset,
                        "unterminated string literal",
                    ));
                }
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    offset,
                });
            }
            c if is_word_char(c) => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if !is_word_char(c) {
                        break;
                    }
                    word.push(c);
                    chars.next();
                }
                tokens.push(Token {
                    kind: TokenKind::Word(word),
                    offset,
                });
            }
            other => {
                return Err(SyntaxError::at(
                    source,
                    offset,
                    format!("unexpected character `{other}`"),
                ));
            }
        }
    }

    Ok(tokens)
}

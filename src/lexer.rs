//! Tokenizer for Prolog surface syntax.

use crate::error::{ParseError, ParseErrorKind};
use crate::intern::{Interner, Symbol};
use crate::token::{Span, Token, TokenKind, VarName};

const SYMBOL_CHARS: &[u8] = b"+-*/\\^<>=~:.?@#&$";

pub struct Lexer<'a> {
    source: &'a str,
    bytes: &'a [u8],
    pos: usize,
    /// True when the previous token was an atom/`)`/`]`/`}` with no
    /// whitespace before the current `(` — distinguishes `foo(` (argument
    /// list) from `foo (` (bracketed term applied to an atom).
    prev_was_adjacent: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Lexer { source, bytes: source.as_bytes(), pos: 0, prev_was_adjacent: false }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn skip_layout(&mut self) -> Result<bool, ParseError> {
        let start = self.pos;
        loop {
            match self.peek() {
                Some(b) if b.is_ascii_whitespace() => {
                    self.pos += 1;
                }
                Some(b'%') => {
                    while !matches!(self.peek(), None | Some(b'\n')) {
                        self.pos += 1;
                    }
                }
                Some(b'/') if self.peek_at(1) == Some(b'*') => {
                    let comment_start = self.pos;
                    self.pos += 2;
                    loop {
                        match self.peek() {
                            None => {
                                return Err(ParseError::new(
                                    ParseErrorKind::UnterminatedBlockComment,
                                    Span::new(comment_start, self.pos),
                                ));
                            }
                            Some(b'*') if self.peek_at(1) == Some(b'/') => {
                                self.pos += 2;
                                break;
                            }
                            _ => self.pos += 1,
                        }
                    }
                }
                _ => break,
            }
        }
        Ok(self.pos != start)
    }

    /// Reads the next token, interning atoms/variables/strings into
    /// `interner` as it goes.
    pub fn next_token(&mut self, interner: &mut Interner) -> Result<Token, ParseError> {
        let had_layout = self.skip_layout()?;
        let start = self.pos;
        let Some(b) = self.peek() else {
            return Ok(Token::new(TokenKind::Eof, Span::new(start, start)));
        };

        let adjacent = !had_layout && self.prev_was_adjacent;
        self.prev_was_adjacent = false;

        let tok = match b {
            b'(' => {
                self.pos += 1;
                if adjacent {
                    TokenKind::LParenFunctor
                } else {
                    TokenKind::LParen
                }
            }
            b')' => {
                self.pos += 1;
                self.prev_was_adjacent = true;
                TokenKind::RParen
            }
            b'[' => {
                self.pos += 1;
                TokenKind::LBracket
            }
            b']' => {
                self.pos += 1;
                self.prev_was_adjacent = true;
                TokenKind::RBracket
            }
            b'{' => {
                self.pos += 1;
                TokenKind::LBrace
            }
            b'}' => {
                self.pos += 1;
                self.prev_was_adjacent = true;
                TokenKind::RBrace
            }
            b',' => {
                self.pos += 1;
                TokenKind::Comma
            }
            b'|' => {
                self.pos += 1;
                TokenKind::Bar
            }
            b'!' => {
                self.pos += 1;
                self.prev_was_adjacent = true;
                TokenKind::Atom(interner.intern("!"))
            }
            b';' => {
                self.pos += 1;
                TokenKind::Atom(interner.intern(";"))
            }
            b'\'' => return self.lex_quoted_atom(interner, start),
            b'"' => return self.lex_string(interner, start),
            b'_' | b'A'..=b'Z' => return Ok(self.lex_variable(interner, start)),
            b'a'..=b'z' => return Ok(self.lex_name(interner, start)),
            b'0'..=b'9' => return self.lex_number(start),
            b if SYMBOL_CHARS.contains(&b) => return self.lex_symbolic(interner, start),
            other => {
                self.pos += 1;
                return Err(ParseError::new(
                    ParseErrorKind::UnexpectedToken {
                        expected: "a token",
                        found: format!("{:?}", other as char),
                    },
                    Span::new(start, self.pos),
                ));
            }
        };
        Ok(Token::new(tok, Span::new(start, self.pos)))
    }

    fn lex_variable(&mut self, interner: &mut Interner, start: usize) -> Token {
        self.pos += 1;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let text = &self.source[start..self.pos];
        self.prev_was_adjacent = true;
        let kind = if text == "_" {
            TokenKind::Var(VarName::Anonymous)
        } else {
            TokenKind::Var(VarName::Named(interner.intern(text)))
        };
        Token::new(kind, Span::new(start, self.pos))
    }

    fn lex_name(&mut self, interner: &mut Interner, start: usize) -> Token {
        self.pos += 1;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'_') {
            self.pos += 1;
        }
        let text = &self.source[start..self.pos];
        self.prev_was_adjacent = true;
        Token::new(TokenKind::Atom(interner.intern(text)), Span::new(start, self.pos))
    }

    /// A maximal run of symbol characters is one token. `.` is special-cased
    /// below: a lone `.` followed by layout or EOF is the clause terminator,
    /// not an atom.
    fn lex_symbolic(&mut self, interner: &mut Interner, start: usize) -> Result<Token, ParseError> {
        if self.peek() == Some(b'.') {
            let next = self.peek_at(1);
            if next.is_none() || next.is_some_and(|b| b.is_ascii_whitespace() || b == b'%') {
                self.pos += 1;
                self.prev_was_adjacent = false;
                return Ok(Token::new(TokenKind::End, Span::new(start, self.pos)));
            }
        }
        while matches!(self.peek(), Some(b) if SYMBOL_CHARS.contains(&b)) {
            self.pos += 1;
        }
        let text = &self.source[start..self.pos];
        self.prev_was_adjacent = true;
        Ok(Token::new(
            TokenKind::Symbolic(interner.intern(text)),
            Span::new(start, self.pos),
        ))
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, ParseError> {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
        let mut is_real = false;
        if self.peek() == Some(b'.') && matches!(self.peek_at(1), Some(b'0'..=b'9')) {
            is_real = true;
            self.pos += 1;
            while matches!(self.peek(), Some(b'0'..=b'9')) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e') | Some(b'E')) {
            let mark = self.pos;
            self.pos += 1;
            if matches!(self.peek(), Some(b'+') | Some(b'-')) {
                self.pos += 1;
            }
            if matches!(self.peek(), Some(b'0'..=b'9')) {
                is_real = true;
                while matches!(self.peek(), Some(b'0'..=b'9')) {
                    self.pos += 1;
                }
            } else {
                self.pos = mark;
            }
        }
        let text = &self.source[start..self.pos];
        self.prev_was_adjacent = true;
        let span = Span::new(start, self.pos);
        if is_real {
            let value: f64 = text.parse().map_err(|_| {
                ParseError::new(
                    ParseErrorKind::UnexpectedToken { expected: "a real number", found: text.to_string() },
                    span,
                )
            })?;
            Ok(Token::new(TokenKind::Real(value), span))
        } else {
            let value: i64 = text.parse().map_err(|_| {
                ParseError::new(
                    ParseErrorKind::UnexpectedToken { expected: "an integer", found: text.to_string() },
                    span,
                )
            })?;
            Ok(Token::new(TokenKind::Int(value), span))
        }
    }

    fn lex_quoted_atom(&mut self, interner: &mut Interner, start: usize) -> Result<Token, ParseError> {
        let text = self.lex_quoted(start, b'\'')?;
        self.prev_was_adjacent = true;
        Ok(Token::new(TokenKind::Atom(interner.intern(&text)), Span::new(start, self.pos)))
    }

    fn lex_string(&mut self, interner: &mut Interner, start: usize) -> Result<Token, ParseError> {
        let text = self.lex_quoted(start, b'"')?;
        self.prev_was_adjacent = true;
        Ok(Token::new(TokenKind::Str(interner.intern(&text)), Span::new(start, self.pos)))
    }

    /// Shared scanner for `'...'` and `"..."`, handling `\\`-escapes and a
    /// doubled quote (`''`/`""`) as a literal quote character.
    fn lex_quoted(&mut self, start: usize, quote: u8) -> Result<String, ParseError> {
        self.pos += 1;
        let mut out = String::new();
        loop {
            match self.peek() {
                None => {
                    return Err(ParseError::new(ParseErrorKind::UnterminatedString, Span::new(start, self.pos)));
                }
                Some(b) if b == quote => {
                    self.pos += 1;
                    if self.peek() == Some(quote) {
                        out.push(quote as char);
                        self.pos += 1;
                    } else {
                        break;
                    }
                }
                Some(b'\\') => {
                    self.pos += 1;
                    let esc_start = self.pos;
                    match self.bump() {
                        Some(b'n') => out.push('\n'),
                        Some(b't') => out.push('\t'),
                        Some(b'r') => out.push('\r'),
                        Some(b'\\') => out.push('\\'),
                        Some(b'\'') => out.push('\''),
                        Some(b'"') => out.push('"'),
                        Some(b'\n') => {}
                        Some(other) => {
                            return Err(ParseError::new(
                                ParseErrorKind::InvalidEscape(other as char),
                                Span::new(esc_start, self.pos),
                            ));
                        }
                        None => {
                            return Err(ParseError::new(ParseErrorKind::UnterminatedString, Span::new(start, self.pos)));
                        }
                    }
                }
                Some(_) => {
                    let rest = &self.source[self.pos..];
                    let ch = rest.chars().next().unwrap();
                    out.push(ch);
                    self.pos += ch.len_utf8();
                }
            }
        }
        Ok(out)
    }

    pub fn pos(&self) -> usize {
        self.pos
    }
}

/// Interns the reserved functor-ish atoms the compiler looks for by name
/// (`nil`, `.`'s list constructor is spelled out as `Term::List`, so only
/// the empty-list atom needs a well-known [`Symbol`]).
pub fn intern_well_known(interner: &mut Interner) -> Symbol {
    interner.intern("nil")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<TokenKind> {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new(src);
        let mut out = Vec::new();
        loop {
            let tok = lexer.next_token(&mut interner).unwrap();
            let done = tok.kind == TokenKind::Eof;
            out.push(tok.kind);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn lexes_fact_with_functor_paren() {
        let toks = tokens("foo(bar).");
        assert!(matches!(toks[1], TokenKind::LParenFunctor));
        assert_eq!(toks.last(), Some(&TokenKind::Eof));
        assert!(toks.iter().any(|t| *t == TokenKind::End));
    }

    #[test]
    fn distinguishes_adjacent_and_spaced_parens() {
        let toks = tokens("foo (bar)");
        assert_eq!(toks[1], TokenKind::LParen);
    }

    #[test]
    fn lexes_variable_vs_anonymous() {
        let toks = tokens("X _ _Foo");
        assert!(matches!(toks[0], TokenKind::Var(VarName::Named(_))));
        assert_eq!(toks[1], TokenKind::Var(VarName::Anonymous));
        assert!(matches!(toks[2], TokenKind::Var(VarName::Named(_))));
    }

    #[test]
    fn lexes_integer_and_real() {
        let toks = tokens("1 2.5 3e2");
        assert_eq!(toks[0], TokenKind::Int(1));
        assert_eq!(toks[1], TokenKind::Real(2.5));
        assert_eq!(toks[2], TokenKind::Real(300.0));
    }

    #[test]
    fn dot_followed_by_digit_is_not_end() {
        let toks = tokens("X = 1.5.");
        // the `.` inside 1.5 must not be End; only the trailing one is.
        let end_count = toks.iter().filter(|t| **t == TokenKind::End).count();
        assert_eq!(end_count, 1);
    }

    #[test]
    fn lexes_quoted_atom_with_escape() {
        let toks = tokens("'it''s a \\n test'");
        match &toks[0] {
            TokenKind::Atom(_) => {}
            other => panic!("expected quoted atom, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_block_comment_errors() {
        let mut interner = Interner::new();
        let mut lexer = Lexer::new("/* never closes");
        let err = lexer.next_token(&mut interner).unwrap_err();
        assert!(matches!(err.kind, ParseErrorKind::UnterminatedBlockComment));
    }

    #[test]
    fn line_comment_is_skipped() {
        let toks = tokens("foo. % trailing comment\nbar.");
        assert!(toks.iter().any(|t| matches!(t, TokenKind::Atom(_))));
    }
}

//! Lexer for QLang source text.
//!
//! The lexer is pull based: [`Lexer::next_token`] scans exactly one token
//! on demand. Malformed input never stops it; unknown characters and
//! unterminated strings are recorded as diagnostics and scanning goes on,
//! so the parser always receives a token stream ending in `Eof`.

use std::fmt;

use tracing::warn;

use crate::diagnostic::{Diagnostic, codes};
use crate::span::Position;

/// Kind of a token produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    // Special
    Eof,

    // Identifiers and literals
    Identifier,
    Int,
    Float,
    String,

    // Keywords
    Quantum,
    Entangle,
    Superposition,
    Function,
    Let,
    If,
    Else,
    While,
    For,
    Return,
    True,
    False,
    Null,
    Import,
    Export,

    // Punctuation
    LParen,    // (
    RParen,    // )
    LBrace,    // {
    RBrace,    // }
    LBracket,  // [
    RBracket,  // ]
    Comma,     // ,
    Semicolon, // ;
    Colon,     // :
    Dot,       // .

    // Operators
    Plus,         // +
    Minus,        // -
    Star,         // *
    Slash,        // /
    Equal,        // =
    EqualEqual,   // ==
    Bang,         // !
    BangEqual,    // !=
    Less,         // <
    LessEqual,    // <=
    Greater,      // >
    GreaterEqual, // >=
    AndAnd,       // &&
    OrOr,         // ||
    Ampersand,    // &
    Pipe,         // |
    Caret,        // ^
    Tilde,        // ~
}

impl TokenKind {
    pub fn is_keyword(self) -> bool {
        KEYWORDS.iter().any(|(_, kind)| *kind == self)
    }

    /// Short human-readable description used in parse errors.
    pub fn describe(self) -> &'static str {
        use TokenKind::*;
        match self {
            Eof => "end of input",
            Identifier => "identifier",
            Int => "integer literal",
            Float => "float literal",
            String => "string literal",
            Quantum => "'quantum'",
            Entangle => "'entangle'",
            Superposition => "'superposition'",
            Function => "'function'",
            Let => "'let'",
            If => "'if'",
            Else => "'else'",
            While => "'while'",
            For => "'for'",
            Return => "'return'",
            True => "'true'",
            False => "'false'",
            Null => "'null'",
            Import => "'import'",
            Export => "'export'",
            LParen => "'('",
            RParen => "')'",
            LBrace => "'{'",
            RBrace => "'}'",
            LBracket => "'['",
            RBracket => "']'",
            Comma => "','",
            Semicolon => "';'",
            Colon => "':'",
            Dot => "'.'",
            Plus => "'+'",
            Minus => "'-'",
            Star => "'*'",
            Slash => "'/'",
            Equal => "'='",
            EqualEqual => "'=='",
            Bang => "'!'",
            BangEqual => "'!='",
            Less => "'<'",
            LessEqual => "'<='",
            Greater => "'>'",
            GreaterEqual => "'>='",
            AndAnd => "'&&'",
            OrOr => "'||'",
            Ampersand => "'&'",
            Pipe => "'|'",
            Caret => "'^'",
            Tilde => "'~'",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.describe())
    }
}

/// The fixed keyword table. Shared read-only by every lexer instance.
pub const KEYWORDS: &[(&str, TokenKind)] = &[
    ("quantum", TokenKind::Quantum),
    ("entangle", TokenKind::Entangle),
    ("superposition", TokenKind::Superposition),
    ("function", TokenKind::Function),
    ("let", TokenKind::Let),
    ("if", TokenKind::If),
    ("else", TokenKind::Else),
    ("while", TokenKind::While),
    ("for", TokenKind::For),
    ("return", TokenKind::Return),
    ("true", TokenKind::True),
    ("false", TokenKind::False),
    ("null", TokenKind::Null),
    ("import", TokenKind::Import),
    ("export", TokenKind::Export),
];

/// Classify an identifier-shaped word as a keyword, if it is one.
pub fn keyword(text: &str) -> Option<TokenKind> {
    KEYWORDS
        .iter()
        .find(|(word, _)| *word == text)
        .map(|(_, kind)| *kind)
}

/// A single token. `text` holds the lexeme; for string literals it is the
/// raw content between the quotes with escapes left in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: u32,
    pub column: u32,
}

impl Token {
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

/// Result of lexing a whole source string at once.
#[derive(Debug)]
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Lex a complete source string. The last token is always `Eof`.
pub fn tokenize(source: &str) -> LexResult {
    let mut lexer = Lexer::new(source);
    let mut tokens = Vec::new();
    loop {
        let token = lexer.next_token();
        let done = token.kind == TokenKind::Eof;
        tokens.push(token);
        if done {
            break;
        }
    }
    LexResult {
        tokens,
        diagnostics: lexer.take_diagnostics(),
    }
}

pub struct Lexer<'src> {
    source: &'src str,
    bytes: &'src [u8],
    index: usize,
    line: u32,
    column: u32,
    diagnostics: Vec<Diagnostic>,
}

impl<'src> Lexer<'src> {
    pub fn new(source: &'src str) -> Self {
        Lexer {
            source,
            bytes: source.as_bytes(),
            index: 0,
            line: 1,
            column: 1,
            diagnostics: Vec::new(),
        }
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn take_diagnostics(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.diagnostics)
    }

    /// Scan the next token. Once the input is exhausted every call returns
    /// an `Eof` token at the final position.
    pub fn next_token(&mut self) -> Token {
        loop {
            self.skip_trivia();

            let line = self.line;
            let column = self.column;
            let start = self.index;

            let Some(ch) = self.peek_byte() else {
                return Token {
                    kind: TokenKind::Eof,
                    text: String::new(),
                    line,
                    column,
                };
            };

            let kind = match ch {
                b'"' => return self.lex_string(line, column),
                b'0'..=b'9' => self.lex_number(),
                _ if is_ident_start(ch) => self.lex_ident_or_keyword(start),
                _ => match self.lex_operator(ch) {
                    Some(kind) => kind,
                    None => {
                        self.unknown_character(line, column);
                        continue;
                    }
                },
            };

            return Token {
                kind,
                text: self.source[start..self.index].to_string(),
                line,
                column,
            };
        }
    }

    fn skip_trivia(&mut self) {
        while let Some(ch) = self.peek_byte() {
            match ch {
                b' ' | b'\t' | b'\n' | b'\r' => self.bump(),
                b'/' if self.peek_next() == Some(b'/') => {
                    while let Some(c) = self.peek_byte() {
                        if c == b'\n' {
                            break;
                        }
                        self.bump();
                    }
                }
                b'/' if self.peek_next() == Some(b'*') => {
                    self.bump();
                    self.bump();
                    // An unclosed block comment runs to end of input.
                    while let Some(c) = self.peek_byte() {
                        if c == b'*' && self.peek_next() == Some(b'/') {
                            self.bump();
                            self.bump();
                            break;
                        }
                        self.bump();
                    }
                }
                _ => break,
            }
        }
    }

    fn lex_string(&mut self, line: u32, column: u32) -> Token {
        self.bump(); // opening quote
        let content_start = self.index;

        while let Some(ch) = self.peek_byte() {
            match ch {
                b'"' => {
                    let text = self.source[content_start..self.index].to_string();
                    self.bump(); // closing quote
                    return Token {
                        kind: TokenKind::String,
                        text,
                        line,
                        column,
                    };
                }
                b'\\' => {
                    self.bump();
                    if self.peek_byte().is_some() {
                        self.bump();
                    }
                }
                _ => self.bump(),
            }
        }

        let position = Position::new(line, column);
        warn!(%position, "unterminated string literal");
        self.diagnostics.push(
            Diagnostic::error("unterminated string literal", position)
                .with_code(codes::UNTERMINATED_STRING),
        );
        Token {
            kind: TokenKind::String,
            text: self.source[content_start..self.index].to_string(),
            line,
            column,
        }
    }

    fn lex_number(&mut self) -> TokenKind {
        self.eat_digits();
        if self.peek_byte() == Some(b'.') {
            self.bump();
            self.eat_digits();
            TokenKind::Float
        } else {
            TokenKind::Int
        }
    }

    fn eat_digits(&mut self) {
        while let Some(b'0'..=b'9') = self.peek_byte() {
            self.bump();
        }
    }

    fn lex_ident_or_keyword(&mut self, start: usize) -> TokenKind {
        while let Some(ch) = self.peek_byte() {
            if is_ident_continue(ch) {
                self.bump();
            } else {
                break;
            }
        }
        keyword(&self.source[start..self.index]).unwrap_or(TokenKind::Identifier)
    }

    fn lex_operator(&mut self, ch: u8) -> Option<TokenKind> {
        use TokenKind::*;

        let two = match (ch, self.peek_next()) {
            (b'=', Some(b'=')) => Some(EqualEqual),
            (b'!', Some(b'=')) => Some(BangEqual),
            (b'<', Some(b'=')) => Some(LessEqual),
            (b'>', Some(b'=')) => Some(GreaterEqual),
            (b'&', Some(b'&')) => Some(AndAnd),
            (b'|', Some(b'|')) => Some(OrOr),
            _ => None,
        };
        if let Some(kind) = two {
            self.bump();
            self.bump();
            return Some(kind);
        }

        let one = match ch {
            b'(' => LParen,
            b')' => RParen,
            b'{' => LBrace,
            b'}' => RBrace,
            b'[' => LBracket,
            b']' => RBracket,
            b',' => Comma,
            b';' => Semicolon,
            b':' => Colon,
            b'.' => Dot,
            b'+' => Plus,
            b'-' => Minus,
            b'*' => Star,
            b'/' => Slash,
            b'=' => Equal,
            b'!' => Bang,
            b'<' => Less,
            b'>' => Greater,
            b'&' => Ampersand,
            b'|' => Pipe,
            b'^' => Caret,
            b'~' => Tilde,
            _ => return None,
        };
        self.bump();
        Some(one)
    }

    fn unknown_character(&mut self, line: u32, column: u32) {
        let ch = self.source[self.index..].chars().next().unwrap_or('\u{fffd}');
        let position = Position::new(line, column);
        warn!(%position, character = %ch.escape_debug(), "unknown character");
        self.diagnostics.push(
            Diagnostic::error(
                format!("unknown character '{}' at line {line}, column {column}", ch.escape_debug()),
                position,
            )
            .with_code(codes::UNKNOWN_CHARACTER),
        );
        self.bump();
    }

    fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.index).copied()
    }

    fn peek_next(&self) -> Option<u8> {
        self.bytes.get(self.index + 1).copied()
    }

    /// Advance past one character, keeping line and column in step.
    fn bump(&mut self) {
        let Some(ch) = self.source[self.index..].chars().next() else {
            return;
        };
        self.index += ch.len_utf8();
        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
    }
}

fn is_ident_start(ch: u8) -> bool {
    ch.is_ascii_alphabetic() || ch == b'_'
}

fn is_ident_continue(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_'
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn kinds(source: &str) -> Vec<TokenKind> {
        tokenize(source).tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn lexes_declaration() {
        use TokenKind::*;
        assert_eq!(
            kinds("let x = 5;"),
            vec![Let, Identifier, Equal, Int, Semicolon, Eof]
        );
    }

    #[test]
    fn classifies_every_keyword() {
        for (word, kind) in KEYWORDS {
            let result = tokenize(word);
            assert_eq!(result.tokens[0].kind, *kind, "keyword {word}");
            assert!(kind.is_keyword());
        }
        assert_eq!(kinds("quantumx")[0], TokenKind::Identifier);
    }

    #[test]
    fn distinguishes_int_and_float() {
        let result = tokenize("42 3.25 7.");
        let tokens = &result.tokens;
        assert_eq!(tokens[0].kind, TokenKind::Int);
        assert_eq!(tokens[0].text, "42");
        assert_eq!(tokens[1].kind, TokenKind::Float);
        assert_eq!(tokens[1].text, "3.25");
        assert_eq!(tokens[2].kind, TokenKind::Float);
        assert_eq!(tokens[2].text, "7.");
    }

    #[test]
    fn prefers_two_character_operators() {
        use TokenKind::*;
        assert_eq!(
            kinds("== != <= >= && || = ! < > & | ^ ~"),
            vec![
                EqualEqual, BangEqual, LessEqual, GreaterEqual, AndAnd, OrOr, Equal, Bang, Less,
                Greater, Ampersand, Pipe, Caret, Tilde, Eof
            ]
        );
    }

    #[test]
    fn records_positions_before_scanning() {
        let result = tokenize("let\n  foo = 1;");
        let foo = &result.tokens[1];
        assert_eq!(foo.text, "foo");
        assert_eq!((foo.line, foo.column), (2, 3));
        let one = &result.tokens[3];
        assert_eq!((one.line, one.column), (2, 9));
    }

    #[test]
    fn skips_both_comment_forms() {
        use TokenKind::*;
        assert_eq!(
            kinds("a // line comment\n /* block\n comment */ b"),
            vec![Identifier, Identifier, Eof]
        );
    }

    #[test]
    fn unterminated_block_comment_stops_at_eof() {
        let result = tokenize("a /* never closed");
        assert_eq!(result.tokens.len(), 2);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn string_keeps_escaped_quote() {
        let result = tokenize(r#""say \"hi\"" x"#);
        assert_eq!(result.tokens[0].kind, TokenKind::String);
        assert_eq!(result.tokens[0].text, r#"say \"hi\""#);
        assert_eq!(result.tokens[1].kind, TokenKind::Identifier);
    }

    #[test]
    fn unterminated_string_is_recoverable() {
        let result = tokenize("\"abc");
        assert_eq!(result.tokens[0].kind, TokenKind::String);
        assert_eq!(result.tokens[0].text, "abc");
        assert_eq!(result.tokens[1].kind, TokenKind::Eof);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].code, Some(codes::UNTERMINATED_STRING));
    }

    #[test]
    fn unknown_characters_are_skipped() {
        use TokenKind::*;
        let result = tokenize("a @ b # é c");
        let kinds: Vec<_> = result.tokens.iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![Identifier, Identifier, Identifier, Eof]);
        assert_eq!(result.diagnostics.len(), 3);
        assert!(result.diagnostics[0].message.contains("line 1, column 3"));
    }

    #[test]
    fn eof_is_sticky() {
        let mut lexer = Lexer::new("x");
        assert_eq!(lexer.next_token().kind, TokenKind::Identifier);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
        assert_eq!(lexer.next_token().kind, TokenKind::Eof);
    }

    proptest! {
        #[test]
        fn relexing_word_text_keeps_kind(word in "[A-Za-z_][A-Za-z0-9_]{0,12}") {
            let first = tokenize(&word).tokens.remove(0);
            let again = tokenize(&first.text).tokens.remove(0);
            prop_assert_eq!(first.kind, again.kind);
            prop_assert_eq!(first.text, again.text);
        }

        #[test]
        fn relexing_number_text_keeps_kind(number in "[0-9]{1,9}(\\.[0-9]{0,4})?") {
            let first = tokenize(&number).tokens.remove(0);
            let again = tokenize(&first.text).tokens.remove(0);
            prop_assert_eq!(first.kind, again.kind);
        }

        #[test]
        fn never_panics_and_ends_with_eof(input in "\\PC{0,64}") {
            let result = tokenize(&input);
            prop_assert_eq!(result.tokens.last().map(|t| t.kind), Some(TokenKind::Eof));
        }
    }
}

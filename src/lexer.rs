//! Lexer: a stream of classified tokens read from a preprocessed C source,
//! one character at a time with a one-character lookahead.

use crate::error::{CompileError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenType {
    Alphanumeric,
    Number,
    Character,
    String,
    Punctuation,
    End,
}

/// Two- and three-character punctuation forms, longest first so the scanner
/// can greedily match.
const MULTI_CHAR_PUNCTUATION: &[&str] = &[
    "<<=", ">>=", "++", "--", "&&", "||", "<<", ">>", "->", "+=", "-=", "*=", "/=", "%=", "&=",
    "|=", "^=", "<=", ">=", "==", "!=",
];

#[derive(Clone)]
pub struct Lexer {
    chars: Vec<char>,
    pos: usize,
    pub filename: String,
    pub line: u32,
    pub token: String,
    pub token_type: TokenType,
    /// Set whenever an explicit `#line` directive is parsed, so the compiler
    /// (which owns the emitter this lexer has no reference to) can re-emit an
    /// equivalent directive downstream. Cleared by `take_pending_line_directive`.
    pending_line_directive: Option<(u32, String)>,
}

impl Lexer {
    pub fn new(source: &str, filename: &str) -> Result<Self> {
        let mut lexer = Lexer {
            chars: source.chars().collect(),
            pos: 0,
            filename: filename.to_string(),
            line: 1,
            token: String::new(),
            token_type: TokenType::End,
            pending_line_directive: None,
        };
        lexer.consume()?;
        Ok(lexer)
    }

    fn current(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn advance_char(&mut self) {
        if let Some(c) = self.current() {
            if c == '\n' {
                self.line += 1;
            }
            self.pos += 1;
        }
    }

    fn starts_with(&self, s: &str) -> bool {
        s.chars()
            .enumerate()
            .all(|(i, c)| self.peek_at(i) == Some(c))
    }

    fn skip_char(&mut self, n: usize) {
        for _ in 0..n {
            self.advance_char();
        }
    }

    fn is_identifier_start(c: char) -> bool {
        c.is_ascii_alphabetic() || c == '_' || c == '$'
    }

    fn is_identifier_continue(c: char) -> bool {
        c.is_ascii_alphanumeric() || c == '_' || c == '$'
    }

    /// Skips whitespace and `#line` directives between tokens. Any other
    /// `#` directive is a fatal error: the preprocessor should have already
    /// consumed it.
    fn skip_trivia(&mut self) -> Result<()> {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance_char();
                }
                Some('#') => {
                    self.parse_line_directive()?;
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_line_directive(&mut self) -> Result<()> {
        self.advance_char(); // '#'
        while self.current() == Some(' ') {
            self.advance_char();
        }
        if self.starts_with("line") {
            self.skip_char(4);
        }
        while self.current() == Some(' ') {
            self.advance_char();
        }
        let mut digits = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.advance_char();
            } else {
                break;
            }
        }
        if digits.is_empty() {
            return Err(CompileError::fatal("Malformed `#line` directive."));
        }
        let line: u32 = digits
            .parse()
            .map_err(|_| CompileError::fatal("Malformed `#line` directive."))?;
        while self.current() == Some(' ') {
            self.advance_char();
        }
        if self.current() == Some('"') {
            self.advance_char();
            let mut name = String::new();
            while let Some(c) = self.current() {
                if c == '"' {
                    self.advance_char();
                    break;
                }
                name.push(c);
                self.advance_char();
            }
            self.filename = name;
        }
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            self.advance_char();
        }
        self.line = line;
        self.pending_line_directive = Some((line, self.filename.clone()));
        Ok(())
    }

    /// Returns and clears the most recently parsed explicit `#line`
    /// directive, if any has been seen since the last call.
    pub fn take_pending_line_directive(&mut self) -> Option<(u32, String)> {
        self.pending_line_directive.take()
    }

    fn decode_escape(&mut self) -> Result<u8> {
        // The backslash has already been consumed.
        let c = self
            .current()
            .ok_or_else(|| CompileError::fatal("Unterminated escape sequence."))?;
        let byte = match c {
            'a' => 0x07,
            'b' => 0x08,
            't' => 0x09,
            'n' => 0x0a,
            'v' => 0x0b,
            'f' => 0x0c,
            'r' => 0x0d,
            'e' => 0x1b,
            '"' => b'"',
            '\'' => b'\'',
            '?' => b'?',
            '\\' => b'\\',
            _ => {
                return Err(CompileError::fatal(format!(
                    "Unsupported escape sequence `\\{c}`."
                )))
            }
        };
        self.advance_char();
        Ok(byte)
    }

    fn consume_prefix_if_literal_follows(&mut self) -> bool {
        // u, U, L, u8 immediately followed by `"` or `'` are string/char
        // encoding prefixes; their semantics are otherwise ignored.
        let prefixes: [&str; 4] = ["u8", "u", "U", "L"];
        for p in prefixes {
            if self.starts_with(p) {
                let after = self.peek_at(p.chars().count());
                if after == Some('"') || after == Some('\'') {
                    self.skip_char(p.chars().count());
                    return true;
                }
            }
        }
        false
    }

    /// Scans the next token into `self.token`/`self.token_type`.
    pub fn consume(&mut self) -> Result<()> {
        self.skip_trivia()?;

        let Some(c) = self.current() else {
            self.token.clear();
            self.token_type = TokenType::End;
            return Ok(());
        };

        if self.consume_prefix_if_literal_follows() {
            // fall through: current() is now `"` or `'`.
        }
        let c = self.current().unwrap();

        if Self::is_identifier_start(c) {
            let mut s = String::new();
            while let Some(c) = self.current() {
                if Self::is_identifier_continue(c) {
                    s.push(c);
                    self.advance_char();
                } else {
                    break;
                }
            }
            self.token = s;
            self.token_type = TokenType::Alphanumeric;
            return Ok(());
        }

        if c.is_ascii_digit() {
            let mut s = String::new();
            while let Some(c) = self.current() {
                if c.is_ascii_alphanumeric() || c == '.' {
                    s.push(c);
                    self.advance_char();
                } else {
                    break;
                }
            }
            self.token = s;
            self.token_type = TokenType::Number;
            return Ok(());
        }

        if c == '\'' {
            self.advance_char();
            let byte = if self.current() == Some('\\') {
                self.advance_char();
                self.decode_escape()?
            } else {
                let ch = self
                    .current()
                    .ok_or_else(|| CompileError::fatal("Unterminated character literal."))?;
                self.advance_char();
                ch as u8
            };
            if self.current() != Some('\'') {
                return Err(CompileError::fatal(
                    "Expected closing `'` after character literal.",
                ));
            }
            self.advance_char();
            self.token = (byte as char).to_string();
            self.token_type = TokenType::Character;
            return Ok(());
        }

        if c == '"' {
            self.advance_char();
            let mut bytes: Vec<u8> = Vec::new();
            loop {
                match self.current() {
                    None => return Err(CompileError::fatal("Unterminated string literal.")),
                    Some('"') => {
                        self.advance_char();
                        break;
                    }
                    Some('\\') => {
                        self.advance_char();
                        bytes.push(self.decode_escape()?);
                    }
                    Some(c) => {
                        bytes.push(c as u8);
                        self.advance_char();
                    }
                }
            }
            bytes.push(0);
            self.token = bytes.iter().map(|&b| b as char).collect();
            self.token_type = TokenType::String;
            return Ok(());
        }

        const SINGLE: &str = "+-*/%&|^!~<>=()[]{}.?:,;";
        if SINGLE.contains(c) {
            for candidate in MULTI_CHAR_PUNCTUATION {
                if self.starts_with(candidate) {
                    self.token = candidate.to_string();
                    self.token_type = TokenType::Punctuation;
                    self.skip_char(candidate.chars().count());
                    return Ok(());
                }
            }
            self.token = c.to_string();
            self.token_type = TokenType::Punctuation;
            self.advance_char();
            return Ok(());
        }

        Err(CompileError::fatal(format!("Unexpected character `{c}`.")))
    }

    /// Consumes and returns ownership of the current token's spelling.
    pub fn take(&mut self) -> Result<String> {
        let s = self.token.clone();
        self.consume()?;
        Ok(s)
    }

    pub fn is(&self, s: &str) -> bool {
        self.token == s
    }

    pub fn accept(&mut self, s: &str) -> Result<bool> {
        if self.is(s) {
            self.consume()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    pub fn expect(&mut self, s: &str, message: &str) -> Result<()> {
        if self.accept(s)? {
            Ok(())
        } else {
            Err(CompileError::fatal(message.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(src: &str) -> Vec<(TokenType, String)> {
        let mut lexer = Lexer::new(src, "<test>").unwrap();
        let mut out = Vec::new();
        while lexer.token_type != TokenType::End {
            out.push((lexer.token_type, lexer.token.clone()));
            lexer.consume().unwrap();
        }
        out
    }

    #[test]
    fn lexes_keywords_and_punctuation() {
        let t = tokens("int main(void){return 0;}");
        assert_eq!(t[0], (TokenType::Alphanumeric, "int".to_string()));
        assert_eq!(t[2], (TokenType::Punctuation, "(".to_string()));
    }

    #[test]
    fn lexes_two_and_three_char_punctuation() {
        let t = tokens("a<<=b>>c&&d");
        let kinds: Vec<_> = t.iter().map(|(_, s)| s.clone()).collect();
        assert!(kinds.contains(&"<<=".to_string()));
        assert!(kinds.contains(&">>".to_string()));
        assert!(kinds.contains(&"&&".to_string()));
    }

    #[test]
    fn decodes_escape_sequences() {
        let t = tokens(r#"'\n'"#);
        assert_eq!(t[0].0, TokenType::Character);
        assert_eq!(t[0].1.as_bytes()[0], b'\n');
    }

    #[test]
    fn rejects_unsupported_escape() {
        let mut lexer = Lexer::new(r#"'\x41'"#, "<test>").unwrap();
        let err = lexer.consume();
        assert!(err.is_err());
    }

    #[test]
    fn handles_line_directive() {
        let mut lexer = Lexer::new("#line 42 \"foo.c\"\nint x;", "<test>").unwrap();
        assert_eq!(lexer.line, 42);
        assert_eq!(lexer.filename, "foo.c");
        assert_eq!(lexer.token, "int");
    }

    #[test]
    fn identifier_allows_dollar_sign() {
        let t = tokens("$foo bar_$baz");
        assert_eq!(t[0], (TokenType::Alphanumeric, "$foo".to_string()));
        assert_eq!(t[1], (TokenType::Alphanumeric, "bar_$baz".to_string()));
    }
}

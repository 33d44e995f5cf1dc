//! Tolerant C tokenizer
//!
//! Converts raw source text into a flat [`Token`] stream. Unlike a compiler
//! front end this lexer never gives up on unfamiliar input: it is fed single
//! lines pulled out of arbitrary user programs, so unknown characters become
//! [`TokenKind::Other`] and an unterminated block comment simply ends the
//! stream. Preprocessor directives are skipped.

use std::fmt;

/// Source location information for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl SourceLocation {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// All token kinds produced by the lexer.
///
/// Type names (`int`, `char`, `struct`, typedef names) are plain
/// identifiers: the trackers only care whether a word precedes a path,
/// never which type it names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenKind {
    // Literals (raw source text, escapes untouched)
    Number(String),
    StringLiteral(String),
    CharLiteral(String),

    Ident(String),

    // Control-flow keywords
    If,
    Else,
    While,
    Do,
    For,
    Switch,
    Case,
    Default,
    Break,
    Continue,
    Return,
    Goto,
    Sizeof,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,

    // Comparison
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,

    // Logical
    AndAnd,
    OrOr,
    Bang,

    // Bitwise
    Amp,
    Pipe,
    Caret,
    Tilde,
    LtLt,
    GtGt,

    // Assignment
    Eq,
    /// Any compound assignment (`+=`, `<<=`, ...), kept verbatim.
    CompoundAssign(&'static str),

    PlusPlus,
    MinusMinus,

    // Member access
    Dot,
    Arrow,

    Question,
    Colon,

    // Punctuation
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Semicolon,
    Comma,
    Ellipsis,

    /// Anything the lexer does not recognise (`@`, `$`, stray `\`).
    Other(char),
}

impl TokenKind {
    /// Words need a separating space when two of them are adjacent.
    pub fn is_word(&self) -> bool {
        matches!(
            self,
            TokenKind::Number(_)
                | TokenKind::Ident(_)
                | TokenKind::If
                | TokenKind::Else
                | TokenKind::While
                | TokenKind::Do
                | TokenKind::For
                | TokenKind::Switch
                | TokenKind::Case
                | TokenKind::Default
                | TokenKind::Break
                | TokenKind::Continue
                | TokenKind::Return
                | TokenKind::Goto
                | TokenKind::Sizeof
        )
    }

    /// Control keywords that introduce a parenthesised header.
    pub fn takes_header(&self) -> bool {
        matches!(
            self,
            TokenKind::If | TokenKind::While | TokenKind::For | TokenKind::Switch
        )
    }

    pub fn ident(&self) -> Option<&str> {
        match self {
            TokenKind::Ident(name) => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for TokenKind {
    /// Writes the token back as C source text.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Number(n) => write!(f, "{}", n),
            TokenKind::StringLiteral(s) => write!(f, "\"{}\"", s),
            TokenKind::CharLiteral(c) => write!(f, "'{}'", c),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::If => write!(f, "if"),
            TokenKind::Else => write!(f, "else"),
            TokenKind::While => write!(f, "while"),
            TokenKind::Do => write!(f, "do"),
            TokenKind::For => write!(f, "for"),
            TokenKind::Switch => write!(f, "switch"),
            TokenKind::Case => write!(f, "case"),
            TokenKind::Default => write!(f, "default"),
            TokenKind::Break => write!(f, "break"),
            TokenKind::Continue => write!(f, "continue"),
            TokenKind::Return => write!(f, "return"),
            TokenKind::Goto => write!(f, "goto"),
            TokenKind::Sizeof => write!(f, "sizeof"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::EqEq => write!(f, "=="),
            TokenKind::NotEq => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Le => write!(f, "<="),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Ge => write!(f, ">="),
            TokenKind::AndAnd => write!(f, "&&"),
            TokenKind::OrOr => write!(f, "||"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::Amp => write!(f, "&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::LtLt => write!(f, "<<"),
            TokenKind::GtGt => write!(f, ">>"),
            TokenKind::Eq => write!(f, "="),
            TokenKind::CompoundAssign(op) => write!(f, "{}", op),
            TokenKind::PlusPlus => write!(f, "++"),
            TokenKind::MinusMinus => write!(f, "--"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Semicolon => write!(f, ";"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Ellipsis => write!(f, "..."),
            TokenKind::Other(c) => write!(f, "{}", c),
        }
    }
}

/// A token together with the place it was read from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub location: SourceLocation,
}

/// Renders tokens as compact C text.
///
/// Whitespace is dropped except for a single space between adjacent words,
/// so `head -> next` and `head->next` render identically.
pub fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev_word = false;
    for token in tokens {
        let word = token.kind.is_word();
        if word && prev_word {
            out.push(' ');
        }
        out.push_str(&token.kind.to_string());
        prev_word = word;
    }
    out
}

/// Failure to finish a string or character literal
#[derive(Debug)]
pub struct LexError {
    pub message: String,
    pub location: SourceLocation,
}

impl fmt::Display for LexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}: {}",
            self.location.line, self.location.column, self.message
        )
    }
}

impl std::error::Error for LexError {}

/// Char cursor over one line or a whole file
pub struct Lexer {
    input: Vec<char>,
    position: usize,
    line: usize,
    column: usize,
    at_line_start: bool,
}

impl Lexer {
    /// Cursor over `input`, first line numbered 1.
    pub fn new(input: &str) -> Self {
        Self::starting_at(input, 1)
    }

    /// Cursor whose first line is reported as `line`.
    pub fn starting_at(input: &str, line: usize) -> Self {
        Self {
            input: input.chars().collect(),
            position: 0,
            line,
            column: 1,
            at_line_start: true,
        }
    }

    /// Lexes to the end of input, stopping at the first unterminated literal
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace_and_comments();

            if self.is_at_end() {
                break;
            }

            if self.at_line_start && self.peek() == Some('#') {
                self.skip_preprocessor_directive();
                continue;
            }

            self.at_line_start = false;
            tokens.push(self.next_token()?);
        }

        Ok(tokens)
    }

    fn next_token(&mut self) -> Result<Token, LexError> {
        let location = self.current_location();
        let ch = self.advance().ok_or_else(|| LexError {
            message: "Unexpected end of input".to_string(),
            location,
        })?;

        let kind = match ch {
            '"' => self.string_literal(location)?,
            '\'' => self.char_literal(location)?,
            '0'..='9' => self.number_literal(ch),
            '.' if self.peek().is_some_and(|c| c.is_ascii_digit()) => self.number_literal(ch),
            'a'..='z' | 'A'..='Z' | '_' => self.identifier_or_keyword(ch),

            '+' => {
                if self.eat('+') {
                    TokenKind::PlusPlus
                } else if self.eat('=') {
                    TokenKind::CompoundAssign("+=")
                } else {
                    TokenKind::Plus
                }
            }
            '-' => {
                if self.eat('-') {
                    TokenKind::MinusMinus
                } else if self.eat('=') {
                    TokenKind::CompoundAssign("-=")
                } else if self.eat('>') {
                    TokenKind::Arrow
                } else {
                    TokenKind::Minus
                }
            }
            '*' => self.with_assign(TokenKind::Star, "*="),
            '/' => self.with_assign(TokenKind::Slash, "/="),
            '%' => self.with_assign(TokenKind::Percent, "%="),
            '^' => self.with_assign(TokenKind::Caret, "^="),
            '=' => {
                if self.eat('=') {
                    TokenKind::EqEq
                } else {
                    TokenKind::Eq
                }
            }
            '!' => {
                if self.eat('=') {
                    TokenKind::NotEq
                } else {
                    TokenKind::Bang
                }
            }
            '<' => {
                if self.eat('<') {
                    self.with_assign(TokenKind::LtLt, "<<=")
                } else if self.eat('=') {
                    TokenKind::Le
                } else {
                    TokenKind::Lt
                }
            }
            '>' => {
                if self.eat('>') {
                    self.with_assign(TokenKind::GtGt, ">>=")
                } else if self.eat('=') {
                    TokenKind::Ge
                } else {
                    TokenKind::Gt
                }
            }
            '&' => {
                if self.eat('&') {
                    TokenKind::AndAnd
                } else {
                    self.with_assign(TokenKind::Amp, "&=")
                }
            }
            '|' => {
                if self.eat('|') {
                    TokenKind::OrOr
                } else {
                    self.with_assign(TokenKind::Pipe, "|=")
                }
            }
            '.' => {
                if self.peek() == Some('.') && self.peek_ahead(1) == Some('.') {
                    self.advance();
                    self.advance();
                    TokenKind::Ellipsis
                } else {
                    TokenKind::Dot
                }
            }
            '~' => TokenKind::Tilde,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ';' => TokenKind::Semicolon,
            ',' => TokenKind::Comma,
            other => TokenKind::Other(other),
        };

        Ok(Token { kind, location })
    }

    /// `op` or, when followed by `=`, the compound assignment `compound`.
    fn with_assign(&mut self, op: TokenKind, compound: &'static str) -> TokenKind {
        if self.eat('=') {
            TokenKind::CompoundAssign(compound)
        } else {
            op
        }
    }

    fn string_literal(&mut self, start: SourceLocation) -> Result<TokenKind, LexError> {
        let mut raw = String::new();

        while let Some(ch) = self.peek() {
            match ch {
                '"' => {
                    self.advance();
                    return Ok(TokenKind::StringLiteral(raw));
                }
                '\\' => {
                    raw.push(ch);
                    self.advance();
                    if let Some(escaped) = self.advance() {
                        raw.push(escaped);
                    }
                }
                '\n' => break,
                _ => {
                    raw.push(ch);
                    self.advance();
                }
            }
        }

        Err(LexError {
            message: "Unterminated string literal".to_string(),
            location: start,
        })
    }

    fn char_literal(&mut self, start: SourceLocation) -> Result<TokenKind, LexError> {
        let mut raw = String::new();

        while let Some(ch) = self.peek() {
            match ch {
                '\'' => {
                    self.advance();
                    return Ok(TokenKind::CharLiteral(raw));
                }
                '\\' => {
                    raw.push(ch);
                    self.advance();
                    if let Some(escaped) = self.advance() {
                        raw.push(escaped);
                    }
                }
                '\n' => break,
                _ => {
                    raw.push(ch);
                    self.advance();
                }
            }
        }

        Err(LexError {
            message: "Unterminated character literal".to_string(),
            location: start,
        })
    }

    /// Integers, floats, hex and suffixed literals are all kept as raw text.
    fn number_literal(&mut self, first: char) -> TokenKind {
        let mut raw = String::new();
        raw.push(first);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '.' || ch == '_' {
                raw.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        TokenKind::Number(raw)
    }

    fn identifier_or_keyword(&mut self, first: char) -> TokenKind {
        let mut ident = String::new();
        ident.push(first);

        while let Some(ch) = self.peek() {
            if ch.is_ascii_alphanumeric() || ch == '_' {
                ident.push(ch);
                self.advance();
            } else {
                break;
            }
        }

        match ident.as_str() {
            "if" => TokenKind::If,
            "else" => TokenKind::Else,
            "while" => TokenKind::While,
            "do" => TokenKind::Do,
            "for" => TokenKind::For,
            "switch" => TokenKind::Switch,
            "case" => TokenKind::Case,
            "default" => TokenKind::Default,
            "break" => TokenKind::Break,
            "continue" => TokenKind::Continue,
            "return" => TokenKind::Return,
            "goto" => TokenKind::Goto,
            "sizeof" => TokenKind::Sizeof,
            _ => TokenKind::Ident(ident),
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some('\n') => {
                    self.advance();
                    self.at_line_start = true;
                }
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('\\') if self.peek_ahead(1) == Some('\n') => {
                    // line continuation
                    self.advance();
                    self.advance();
                }
                Some('/') if self.peek_ahead(1) == Some('/') => self.skip_line_comment(),
                Some('/') if self.peek_ahead(1) == Some('*') => self.skip_block_comment(),
                _ => break,
            }
        }
    }

    fn skip_line_comment(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    /// An unterminated block comment runs to the end of the input.
    fn skip_block_comment(&mut self) {
        self.advance(); // '/'
        self.advance(); // '*'

        while !self.is_at_end() {
            if self.peek() == Some('*') && self.peek_ahead(1) == Some('/') {
                self.advance();
                self.advance();
                return;
            }
            self.advance();
        }
    }

    fn skip_preprocessor_directive(&mut self) {
        while let Some(ch) = self.peek() {
            if ch == '\\' && self.peek_ahead(1) == Some('\n') {
                self.advance();
                self.advance();
                continue;
            }
            if ch == '\n' {
                break;
            }
            self.advance();
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn peek(&self) -> Option<char> {
        self.input.get(self.position).copied()
    }

    fn peek_ahead(&self, n: usize) -> Option<char> {
        self.input.get(self.position + n).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = *self.input.get(self.position)?;
        self.position += 1;

        if ch == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }

        Some(ch)
    }

    fn is_at_end(&self) -> bool {
        self.position >= self.input.len()
    }

    fn current_location(&self) -> SourceLocation {
        SourceLocation::new(self.line, self.column)
    }
}

/// Tokenizes `input`, returning `None` when it cannot be lexed.
pub fn tokenize(input: &str) -> Option<Vec<Token>> {
    Lexer::new(input).tokenize().ok()
}

/// Replaces comment text with spaces, keeping newlines.
///
/// Line and column positions survive, so a multi-line block comment leaves
/// blank lines behind instead of lines that read like code. Comment markers
/// inside string and character literals are left alone.
pub fn blank_comments(input: &str) -> String {
    let chars: Vec<char> = input.chars().collect();
    let mut out = String::with_capacity(input.len());
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        let next = chars.get(i + 1).copied();
        match ch {
            '/' if next == Some('/') => {
                while i < chars.len() && chars[i] != '\n' {
                    out.push(' ');
                    i += 1;
                }
            }
            '/' if next == Some('*') => {
                out.push_str("  ");
                i += 2;
                while i < chars.len() {
                    if chars[i] == '*' && chars.get(i + 1) == Some(&'/') {
                        out.push_str("  ");
                        i += 2;
                        break;
                    }
                    out.push(if chars[i] == '\n' { '\n' } else { ' ' });
                    i += 1;
                }
            }
            '"' | '\'' => {
                out.push(ch);
                i += 1;
                while i < chars.len() && chars[i] != '\n' {
                    let c = chars[i];
                    out.push(c);
                    i += 1;
                    if c == '\\' {
                        if let Some(&escaped) = chars.get(i) {
                            out.push(escaped);
                            i += 1;
                        }
                    } else if c == ch {
                        break;
                    }
                }
            }
            _ => {
                out.push(ch);
                i += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_comments_keeps_lines_and_literals() {
        let src = "a = 1; // note\n/* free(obj)\n * free(obj) */ b = \"/* x */\";\nc = '/';";
        let blanked = blank_comments(src);
        let lines: Vec<&str> = blanked.lines().collect();

        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0].trim_end(), "a = 1;");
        assert_eq!(lines[1].trim(), "");
        assert_eq!(lines[2].trim(), "b = \"/* x */\";");
        assert_eq!(lines[3], "c = '/';");
    }

    fn kinds(src: &str) -> Vec<TokenKind> {
        Lexer::new(src)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| t.kind)
            .collect()
    }

    #[test]
    fn test_simple_tokens() {
        let tokens = kinds("int main() { return 0; }");

        assert!(matches!(tokens[0], TokenKind::Ident(ref s) if s == "int"));
        assert!(matches!(tokens[1], TokenKind::Ident(ref s) if s == "main"));
        assert_eq!(tokens[2], TokenKind::LParen);
        assert_eq!(tokens[3], TokenKind::RParen);
        assert_eq!(tokens[4], TokenKind::LBrace);
        assert_eq!(tokens[5], TokenKind::Return);
        assert!(matches!(tokens[6], TokenKind::Number(ref n) if n == "0"));
        assert_eq!(tokens[7], TokenKind::Semicolon);
        assert_eq!(tokens[8], TokenKind::RBrace);
        assert_eq!(tokens.len(), 9);
    }

    #[test]
    fn test_operators() {
        let tokens = kinds("++ -- += -= == != && || -> <<= ...");

        assert_eq!(tokens[0], TokenKind::PlusPlus);
        assert_eq!(tokens[1], TokenKind::MinusMinus);
        assert_eq!(tokens[2], TokenKind::CompoundAssign("+="));
        assert_eq!(tokens[3], TokenKind::CompoundAssign("-="));
        assert_eq!(tokens[4], TokenKind::EqEq);
        assert_eq!(tokens[5], TokenKind::NotEq);
        assert_eq!(tokens[6], TokenKind::AndAnd);
        assert_eq!(tokens[7], TokenKind::OrOr);
        assert_eq!(tokens[8], TokenKind::Arrow);
        assert_eq!(tokens[9], TokenKind::CompoundAssign("<<="));
        assert_eq!(tokens[10], TokenKind::Ellipsis);
    }

    #[test]
    fn test_comments() {
        let tokens = kinds("int x; // comment\nint y; /* block\ncomment */ int z;");

        assert_eq!(tokens.len(), 9);
        assert!(matches!(tokens[7], TokenKind::Ident(ref s) if s == "z"));
    }

    #[test]
    fn test_unterminated_block_comment_is_tolerated() {
        let tokens = kinds("free(p); /* trailing");
        assert_eq!(tokens.len(), 5);
    }

    #[test]
    fn test_preprocessor_skip() {
        let tokens = kinds("#include <stdio.h>\nint x;");
        assert!(matches!(tokens[0], TokenKind::Ident(ref s) if s == "int"));
        assert!(matches!(tokens[1], TokenKind::Ident(ref s) if s == "x"));
    }

    #[test]
    fn test_unknown_characters_do_not_fail() {
        let tokens = kinds("x = y @ 0x1Fu;");
        assert!(tokens.contains(&TokenKind::Other('@')));
        assert!(tokens.contains(&TokenKind::Number("0x1Fu".to_string())));
    }

    #[test]
    fn test_braces_in_strings_are_not_tokens() {
        let tokens = kinds(r#"printf("{ %d }\n", x);"#);
        assert!(!tokens.contains(&TokenKind::LBrace));
        assert!(!tokens.contains(&TokenKind::RBrace));
    }

    #[test]
    fn test_render_is_whitespace_insensitive() {
        let a = render(&Lexer::new("head -> next [ i ]").tokenize().unwrap());
        let b = render(&Lexer::new("head->next[i]").tokenize().unwrap());
        assert_eq!(a, b);
        assert_eq!(a, "head->next[i]");

        let decl = render(&Lexer::new("struct node  *n").tokenize().unwrap());
        assert_eq!(decl, "struct node*n");
    }

    #[test]
    fn test_line_numbers_follow_offset() {
        let tokens = Lexer::starting_at("a;\n\nb;", 10).tokenize().unwrap();
        assert_eq!(tokens[0].location.line, 10);
        assert_eq!(tokens[2].location.line, 12);
    }
}

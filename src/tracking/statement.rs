//! Statement-level view of a C source line
//!
//! A line is lexed and split at top-level `;` and braces. Control headers
//! (`if (...)`, `for (...)`, `else`, `case X:`, labels) are peeled off the
//! front of each piece, so `if (p) free(p);` is a plain `free(p)` and
//! `for (i = 0; i < n; i++) arr[i] = malloc(8);` is an assignment to `arr[i]`.
//!
//! Expressions come back in canonical form (see [`render`]), which is the
//! form tracked paths are stored in.

use crate::source::lexer::{render, tokenize, Token, TokenKind};

/// Allocation functions whose result starts a tracked lifetime.
const ALLOCATORS: &[&str] = &["malloc", "calloc", "strdup"];

/// Right-hand sides that clear a pointer instead of copying it.
const NULL_VALUES: &[&str] = &["NULL", "0", "nullptr"];

/// One statement with its control-flow prefix removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    tokens: Vec<Token>,
}

/// `target = value` with the target reduced to the written path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub target: String,
    pub value: String,
}

impl Assignment {
    pub fn is_null(&self) -> bool {
        NULL_VALUES.contains(&self.value.as_str())
    }
}

/// What a caller does with the value a callee returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Consumption {
    /// `receiver = callee(...)`
    Stored(String),
    /// `return callee(...)`
    Forwarded,
    /// `callee(...);` on its own
    Discarded,
    /// Passed straight into some other expression or call.
    Escaped,
}

/// Splits a source line into statements. Unlexable lines yield nothing.
pub fn statements(line: &str) -> Vec<Statement> {
    let Some(tokens) = tokenize(line) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;

    for token in tokens {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
            TokenKind::Semicolon | TokenKind::LBrace | TokenKind::RBrace if depth == 0 => {
                push_statement(&mut out, std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(token);
    }
    push_statement(&mut out, current);
    out
}

fn push_statement(out: &mut Vec<Statement>, tokens: Vec<Token>) {
    let body = strip_control(&tokens);
    if !body.is_empty() {
        out.push(Statement {
            tokens: body.to_vec(),
        });
    }
}

/// Drops leading `if (..)`, `while (..)`, `else`, `do`, `case X:` and labels.
fn strip_control(mut tokens: &[Token]) -> &[Token] {
    loop {
        let Some(first) = tokens.first() else {
            return tokens;
        };
        match &first.kind {
            TokenKind::Else | TokenKind::Do => tokens = &tokens[1..],
            kind if kind.takes_header() => {
                match tokens.get(1).filter(|t| t.kind == TokenKind::LParen) {
                    Some(_) => match matching_close(tokens, 1) {
                        Some(close) => tokens = &tokens[close + 1..],
                        // Header continues on the next line.
                        None => return &[],
                    },
                    None => tokens = &tokens[1..],
                }
            }
            TokenKind::Case | TokenKind::Default => {
                match tokens.iter().position(|t| t.kind == TokenKind::Colon) {
                    Some(colon) => tokens = &tokens[colon + 1..],
                    None => return &[],
                }
            }
            TokenKind::Ident(_) if tokens.get(1).is_some_and(|t| t.kind == TokenKind::Colon) => {
                tokens = &tokens[2..];
            }
            _ => return tokens,
        }
    }
}

/// Index of the bracket closing the one at `open`.
fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Index of the first `kind` token outside any brackets.
fn find_top_level(tokens: &[Token], kind: &TokenKind) -> Option<usize> {
    let mut depth = 0usize;
    for (i, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::LParen | TokenKind::LBracket => depth += 1,
            TokenKind::RParen | TokenKind::RBracket => depth = depth.saturating_sub(1),
            ref k if depth == 0 && k == kind => return Some(i),
            _ => {}
        }
    }
    None
}

/// True for a parenthesised group that reads as a type name, e.g. `(char *)`.
fn is_cast(inner: &[Token]) -> bool {
    let words = inner.iter().filter(|t| t.kind.ident().is_some()).count();
    let stars = inner.iter().filter(|t| t.kind == TokenKind::Star).count();
    !inner.is_empty()
        && words > 0
        && words + stars == inner.len()
        && (stars > 0 || words > 1 || inner[0].kind.ident() == Some("void"))
}

/// Removes redundant outer parentheses and leading casts.
fn strip_wrapping(mut tokens: &[Token]) -> &[Token] {
    while tokens.first().is_some_and(|t| t.kind == TokenKind::LParen) {
        let Some(close) = matching_close(tokens, 0) else {
            break;
        };
        if close == tokens.len() - 1 {
            tokens = &tokens[1..close];
        } else if is_cast(&tokens[1..close])
            && !matches!(
                tokens[close + 1].kind,
                TokenKind::Arrow | TokenKind::Dot | TokenKind::LBracket
            )
        {
            tokens = &tokens[close + 1..];
        } else {
            break;
        }
    }
    tokens
}

/// Reduces an assignment's left side to the path it writes.
///
/// Declarations keep only the declarator: `Node *n` is `n`, `int x` is `x`.
/// A leading dereference stays, so `*p` never matches a tracked path.
fn written_path(lhs: &[Token]) -> String {
    if lhs.first().is_some_and(|t| t.kind == TokenKind::Star) {
        return render(lhs);
    }

    let last_star = lhs.iter().rposition(|t| t.kind == TokenKind::Star);
    if let Some(star) = last_star {
        if lhs[..star].iter().all(|t| t.kind.ident().is_some() || t.kind == TokenKind::Star) {
            return render(&lhs[star + 1..]);
        }
    }

    // `struct node n`: the declarator is the last of the leading words.
    let leading_words = lhs.iter().take_while(|t| t.kind.ident().is_some()).count();
    if leading_words >= 2 {
        return render(&lhs[leading_words - 1..]);
    }

    render(lhs)
}

impl Statement {
    pub fn text(&self) -> String {
        render(&self.tokens)
    }

    /// True when the statement calls `name(...)`.
    pub fn calls(&self, name: &str) -> bool {
        self.call_position(name).is_some()
    }

    fn call_position(&self, name: &str) -> Option<usize> {
        self.tokens.windows(2).position(|pair| {
            pair[0].kind.ident() == Some(name) && pair[1].kind == TokenKind::LParen
        })
    }

    pub fn is_allocation(&self) -> bool {
        ALLOCATORS.iter().any(|name| self.calls(name))
    }

    pub fn is_free(&self) -> bool {
        self.calls("free")
    }

    /// Argument of the first `free(...)` call, casts removed.
    pub fn free_argument(&self) -> Option<String> {
        let at = self.call_position("free")?;
        let close = matching_close(&self.tokens, at + 1)?;
        let arg = strip_wrapping(&self.tokens[at + 2..close]);
        Some(render(arg))
    }

    pub fn is_return(&self) -> bool {
        self.tokens
            .first()
            .is_some_and(|t| t.kind == TokenKind::Return)
    }

    /// Expression after `return`, or `None` for a bare `return`.
    pub fn returned_value(&self) -> Option<String> {
        if !self.is_return() {
            return None;
        }
        let value = strip_wrapping(&self.tokens[1..]);
        if value.is_empty() {
            None
        } else {
            Some(render(value))
        }
    }

    /// Plain `=` assignment. Comparisons and compound assignments are not.
    pub fn assignment(&self) -> Option<Assignment> {
        let eq = find_top_level(&self.tokens, &TokenKind::Eq)?;
        if eq == 0 {
            return None;
        }
        let lhs = &self.tokens[..eq];
        let mut rhs = &self.tokens[eq + 1..];
        // `int *a = x, *b = y;` keeps only the first declarator.
        if let Some(comma) = find_top_level(rhs, &TokenKind::Comma) {
            rhs = &rhs[..comma];
        }
        let target = written_path(lhs);
        if target.is_empty() {
            return None;
        }
        Some(Assignment {
            target,
            value: render(strip_wrapping(rhs)),
        })
    }

    /// Classifies how this statement uses the result of `callee(...)`.
    pub fn consumption_of(&self, callee: &str) -> Option<Consumption> {
        let at = self.call_position(callee)?;

        if let Some(assignment) = self.assignment() {
            if find_top_level(&self.tokens, &TokenKind::Eq).is_some_and(|eq| at > eq) {
                return Some(Consumption::Stored(assignment.target));
            }
        }
        if self.is_return() {
            return Some(Consumption::Forwarded);
        }

        let bare = strip_wrapping(&self.tokens);
        let close = matching_close(bare, 1);
        let whole_call = bare.first().and_then(|t| t.kind.ident()) == Some(callee)
            && close == Some(bare.len() - 1);
        if whole_call {
            Some(Consumption::Discarded)
        } else {
            Some(Consumption::Escaped)
        }
    }
}

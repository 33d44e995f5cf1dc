//! Access-path algebra
//!
//! Paths are canonical strings produced by [`crate::source::lexer::render`]:
//! `head->next->data`, `arr[i]`, `s.buf`. A segment boundary is a `->`, `[`
//! or `.` that is not nested inside brackets or parentheses.

/// Byte offsets of every top-level accessor in `path`.
fn boundaries(path: &str) -> Vec<usize> {
    let bytes = path.as_bytes();
    let mut depth = 0usize;
    let mut out = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => {
                if depth == 0 && i > 0 {
                    out.push(i);
                }
                depth += 1;
            }
            b'(' => depth += 1,
            b']' | b')' => depth = depth.saturating_sub(1),
            b'-' if depth == 0 && bytes.get(i + 1) == Some(&b'>') && i > 0 => {
                out.push(i);
                i += 1;
            }
            b'.' if depth == 0 && i > 0 => out.push(i),
            _ => {}
        }
        i += 1;
    }
    out
}

/// The variable a path starts from: `head` for `head->next[2]`.
pub fn root_of(path: &str) -> &str {
    match boundaries(path).first() {
        Some(&end) => &path[..end],
        None => path,
    }
}

/// Every structural prefix of `path`, shortest first, ending with `path`.
pub fn build_segments(path: &str) -> Vec<String> {
    let mut segments: Vec<String> = boundaries(path)
        .into_iter()
        .map(|end| path[..end].to_string())
        .collect();
    segments.push(path.to_string());
    segments
}

/// True when `path` continues past `prefix` through a member or index access.
pub fn extends_past(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.starts_with("->") || rest.starts_with('[') || rest.starts_with('.'),
        None => false,
    }
}

/// Accessor chain left after removing `prefix` from `path`.
///
/// `suffix("n->data", "n")` is `Some("->data")`; an equal path yields `""`.
pub fn suffix<'a>(path: &'a str, prefix: &str) -> Option<&'a str> {
    if path == prefix {
        Some("")
    } else if extends_past(path, prefix) {
        Some(&path[prefix.len()..])
    } else {
        None
    }
}

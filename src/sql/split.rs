//! Statement splitting.
//!
//! A batch is split on every `;` that is not escaped as `\;`. Leading comments are removed
//! from each statement, blank and comment-only statements are dropped, and escaped
//! separators are unescaped in the output.

/// Split a batch into individual statements.
pub fn split_statements(batch: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut rest = batch;

    while !rest.is_empty() {
        match find_separator(rest) {
            None => {
                statements.push(rest.trim().to_string());
                rest = "";
            }
            Some(0) => rest = &rest[1..],
            Some(pos) => {
                statements.push(rest[..pos].trim().to_string());
                rest = &rest[pos + 1..];
            }
        }
    }

    statements
        .into_iter()
        .filter_map(|stmt| {
            let stmt = strip_leading_comments(&stmt);
            if stmt.trim().is_empty() || stmt.starts_with("//") || stmt.starts_with("--") {
                return None;
            }
            Some(stmt.replace("\\;", ";"))
        })
        .collect()
}

/// Index of the first unescaped `;`.
fn find_separator(s: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut from = 0;
    while let Some(offset) = s[from..].find(';') {
        let pos = from + offset;
        if pos > 0 && bytes[pos - 1] == b'\\' {
            from = pos + 1;
            continue;
        }
        return Some(pos);
    }
    None
}

fn strip_leading_comments(stmt: &str) -> &str {
    let mut stmt = stmt.trim();
    loop {
        if stmt.starts_with("//") || stmt.starts_with("--") {
            stmt = match stmt.find('\n') {
                Some(eol) => &stmt[eol + 1..],
                None => "",
            };
        } else if stmt.starts_with("/*") {
            stmt = match stmt.find("*/") {
                Some(end) => &stmt[end + 2..],
                None => "",
            };
        } else {
            return stmt;
        }
        stmt = stmt.trim();
    }
}

/// Join statements back into one batch, escaping separators inside them.
pub fn join_statements<S: AsRef<str>>(statements: &[S]) -> String {
    statements
        .iter()
        .map(|s| s.as_ref().replace(';', "\\;"))
        .collect::<Vec<_>>()
        .join(";")
}

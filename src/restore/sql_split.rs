// complete-restore/src/restore/sql_split.rs
//! Splits a plain-text SQL dump into individually executable statements.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    Normal,
    Quoted(char),
    LineComment,
    BlockComment,
    DollarQuoted,
}

/// Splits `sql` on the active delimiter (initially `;`).
///
/// Delimiters inside quotes, comments and `$tag$` bodies are ignored, and
/// `DELIMITER <token>` lines switch the active delimiter. Comment-only
/// fragments are dropped.
pub fn split_statements(sql: &str) -> Vec<String> {
    let chars: Vec<char> = sql.chars().collect();
    let mut statements = Vec::new();
    let mut delimiter: Vec<char> = vec![';'];
    let mut current = String::new();
    let mut state = ScanState::Normal;
    let mut dollar_tag: Vec<char> = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match state {
            ScanState::Normal => {
                if is_line_start(&chars, i) && !has_executable_content(&current) {
                    if let Some((new_delimiter, next)) = parse_delimiter_directive(&chars, i) {
                        current.clear();
                        delimiter = new_delimiter;
                        i = next;
                        continue;
                    }
                }

                if starts_with(&chars, i, &delimiter) {
                    push_statement(&mut statements, &mut current);
                    i += delimiter.len();
                    continue;
                }

                match c {
                    '\'' | '"' | '`' => state = ScanState::Quoted(c),
                    '-' if chars.get(i + 1) == Some(&'-')
                        && chars.get(i + 2).is_none_or(|next| next.is_whitespace()) =>
                    {
                        state = ScanState::LineComment
                    }
                    '#' if current.trim().is_empty() => state = ScanState::LineComment,
                    '/' if chars.get(i + 1) == Some(&'*') => {
                        current.push_str("/*");
                        i += 2;
                        state = ScanState::BlockComment;
                        continue;
                    }
                    '$' => {
                        if let Some(tag) = dollar_tag_at(&chars, i) {
                            current.extend(tag.iter());
                            i += tag.len();
                            dollar_tag = tag;
                            state = ScanState::DollarQuoted;
                            continue;
                        }
                    }
                    _ => {}
                }
                current.push(c);
                i += 1;
            }
            ScanState::Quoted(quote) => {
                current.push(c);
                if c == '\\' && quote != '`' {
                    if let Some(&escaped) = chars.get(i + 1) {
                        current.push(escaped);
                        i += 2;
                        continue;
                    }
                } else if c == quote {
                    state = ScanState::Normal;
                }
                i += 1;
            }
            ScanState::LineComment => {
                current.push(c);
                if c == '\n' {
                    state = ScanState::Normal;
                }
                i += 1;
            }
            ScanState::BlockComment => {
                if c == '*' && chars.get(i + 1) == Some(&'/') {
                    current.push_str("*/");
                    i += 2;
                    state = ScanState::Normal;
                    continue;
                }
                current.push(c);
                i += 1;
            }
            ScanState::DollarQuoted => {
                if starts_with(&chars, i, &dollar_tag) {
                    current.extend(dollar_tag.iter());
                    i += dollar_tag.len();
                    state = ScanState::Normal;
                    continue;
                }
                current.push(c);
                i += 1;
            }
        }
    }

    push_statement(&mut statements, &mut current);
    statements
}

fn push_statement(statements: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if has_executable_content(trimmed) {
        statements.push(trimmed.to_string());
    }
    current.clear();
}

/// False when `fragment` holds nothing but whitespace and plain comments.
/// MySQL executable comments (`/*! ... */`) count as content.
fn has_executable_content(fragment: &str) -> bool {
    let mut rest = fragment;
    loop {
        rest = rest.trim_start();
        if rest.starts_with("--") || rest.starts_with('#') {
            match rest.find('\n') {
                Some(end) => rest = &rest[end + 1..],
                None => return false,
            }
        } else if rest.starts_with("/*") && !rest.starts_with("/*!") {
            match rest.find("*/") {
                Some(end) => rest = &rest[end + 2..],
                None => return false,
            }
        } else {
            return !rest.is_empty();
        }
    }
}

fn is_line_start(chars: &[char], i: usize) -> bool {
    i == 0 || chars[i - 1] == '\n'
}

fn starts_with(chars: &[char], i: usize, pattern: &[char]) -> bool {
    !pattern.is_empty() && chars.len() >= i + pattern.len() && chars[i..i + pattern.len()] == *pattern
}

/// Parses `DELIMITER <token>` starting at a line start; returns the token and
/// the index just past the directive's line.
fn parse_delimiter_directive(chars: &[char], start: usize) -> Option<(Vec<char>, usize)> {
    const KEYWORD: &str = "DELIMITER";

    let mut i = start;
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        i += 1;
    }
    for expected in KEYWORD.chars() {
        if chars.get(i)?.to_ascii_uppercase() != expected {
            return None;
        }
        i += 1;
    }
    if !matches!(chars.get(i), Some(' ') | Some('\t')) {
        return None;
    }
    while i < chars.len() && (chars[i] == ' ' || chars[i] == '\t') {
        i += 1;
    }

    let mut token = Vec::new();
    while i < chars.len() && !chars[i].is_whitespace() {
        token.push(chars[i]);
        i += 1;
    }
    if token.is_empty() {
        return None;
    }

    while i < chars.len() && chars[i] != '\n' {
        i += 1;
    }
    if i < chars.len() {
        i += 1;
    }
    Some((token, i))
}

/// Recognises a PostgreSQL dollar-quote opener (`$$` or `$tag$`) at `i`.
fn dollar_tag_at(chars: &[char], i: usize) -> Option<Vec<char>> {
    if i > 0 {
        let previous = chars[i - 1];
        if previous.is_alphanumeric() || previous == '_' || previous == '$' {
            return None;
        }
    }

    let mut j = i + 1;
    while j < chars.len() && (chars[j].is_alphanumeric() || chars[j] == '_') {
        j += 1;
    }
    if chars.get(j) != Some(&'$') {
        return None;
    }
    if chars.get(i + 1).is_some_and(|first| first.is_ascii_digit()) {
        return None;
    }
    Some(chars[i..=j].to_vec())
}

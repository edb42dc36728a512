// src/query/context.rs - What the caret is sitting on

use crate::buffer::utf16_to_byte;
use lsp_types::Position;
use regex::Regex;

fn is_word(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

pub fn line_at(text: &str, line: u32) -> &str {
    text.lines().nth(line as usize).unwrap_or_default()
}

/// The caret's line up to the caret.
pub fn line_prefix(text: &str, position: Position) -> &str {
    let line = line_at(text, position.line);
    &line[..utf16_to_byte(line, position.character)]
}

/// Everything before the caret, across lines.
pub fn text_before(text: &str, position: Position) -> String {
    let mut before = String::new();
    for line in text.lines().take(position.line as usize) {
        before.push_str(line);
        before.push('\n');
    }
    before.push_str(line_prefix(text, position));
    before
}

/// `receiver` `operator` `partial`, as in `io.std|`, `s:up|` or `pri|`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompletionQuery {
    pub receiver: String,
    pub operator: Option<char>,
    pub partial: String,
}

impl CompletionQuery {
    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty() && self.partial.is_empty()
    }
}

pub fn completion_query(prefix: &str) -> CompletionQuery {
    let partial_start = prefix
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c))
        .last()
        .map(|(i, _)| i)
        .unwrap_or(prefix.len());
    let partial = prefix[partial_start..].to_string();
    let rest = &prefix[..partial_start];

    let operator = match rest.chars().last() {
        Some(op @ ('.' | ':')) if !rest.ends_with("..") && !rest.ends_with("::") => Some(op),
        _ => None,
    };
    let receiver = match operator {
        Some(_) => {
            let rest = &rest[..rest.len() - 1];
            let start = rest
                .char_indices()
                .rev()
                .take_while(|(_, c)| is_word(*c) || *c == '.')
                .last()
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            rest[start..].trim_matches('.').to_string()
        }
        None => String::new(),
    };
    // `3.` and `1.5` are number literals, not member access.
    let receiver = if receiver.starts_with(|c: char| c.is_ascii_digit()) {
        String::new()
    } else {
        receiver
    };

    let operator = if receiver.is_empty() { None } else { operator };
    CompletionQuery {
        receiver,
        operator,
        partial,
    }
}

/// The qualified identifier under the caret: qualification to the left, word
/// characters to the right. `util.ad|d` gives `util.add`.
pub fn identifier_at(line: &str, byte_col: usize) -> Option<String> {
    let byte_col = byte_col.min(line.len());
    let start = line[..byte_col]
        .char_indices()
        .rev()
        .take_while(|(_, c)| is_word(*c) || *c == '.' || *c == ':')
        .last()
        .map(|(i, _)| i)
        .unwrap_or(byte_col);
    let end = line[byte_col..]
        .char_indices()
        .find(|(_, c)| !is_word(*c))
        .map(|(i, _)| byte_col + i)
        .unwrap_or(line.len());
    let ident = line[start..end].trim_matches(|c| c == '.' || c == ':');
    if ident.is_empty() || !ident.chars().any(is_word) {
        None
    } else {
        Some(ident.to_string())
    }
}

/// The pseudo-type of `name` from its nearest assignment on or above `line`:
/// `string`, `file`, `table`, or the module a `require` loads.
pub fn infer_type(text: &str, line: u32, name: &str) -> Option<String> {
    let pattern = format!(r"^\s*(?:local\s+)?{}\s*=([^=].*)$", regex::escape(name));
    let assignment = Regex::new(&pattern).ok()?;
    let lines: Vec<&str> = text.lines().take(line as usize + 1).collect();
    let rhs = lines
        .iter()
        .rev()
        .find_map(|line| assignment.captures(line).map(|c| c[1].trim().to_string()))?;
    classify(&rhs)
}

fn classify(rhs: &str) -> Option<String> {
    if rhs.starts_with('"') || rhs.starts_with('\'') || rhs.starts_with("[[") || rhs.starts_with("[=")
    {
        return Some("string".to_string());
    }
    if ["io.open(", "io.popen(", "io.tmpfile("]
        .iter()
        .any(|opener| rhs.starts_with(opener))
    {
        return Some("file".to_string());
    }
    if rhs.starts_with('{') {
        return Some("table".to_string());
    }
    if let Some(rest) = rhs.strip_prefix("require") {
        let module = rest
            .trim_start_matches(|c: char| c == '(' || c.is_whitespace())
            .trim_start_matches(['"', '\''])
            .split(['"', '\''])
            .next()
            .unwrap_or_default();
        if !module.is_empty() {
            return Some(module.rsplit('.').next().unwrap_or(module).to_string());
        }
    }
    None
}

/// Swap the leading name of `expression` for its inferred type, if it has one.
pub fn substitute_receiver(text: &str, line: u32, expression: &str) -> String {
    let head_end = expression
        .find(['.', ':'])
        .unwrap_or(expression.len());
    let head = &expression[..head_end];
    match infer_type(text, line, head) {
        Some(inferred) => format!("{}{}", inferred, &expression[head_end..]),
        None => expression.to_string(),
    }
}

/// The identifier under the caret with its receiver's inferred type substituted.
pub fn symbol_at(text: &str, position: Position) -> Option<String> {
    let line = line_at(text, position.line);
    let ident = identifier_at(line, utf16_to_byte(line, position.character))?;
    if ident.contains(['.', ':']) {
        Some(substitute_receiver(text, position.line, &ident))
    } else {
        Some(ident)
    }
}

// src/query/signature.rs - Which call the caret is inside, and which argument

use super::context::{substitute_receiver, text_before};
use super::hover::{best_matches, lookup};
use crate::index::Index;
use lsp_types::{
    Documentation, MarkupContent, MarkupKind, ParameterInformation, ParameterLabel, Position,
    SignatureHelp, SignatureInformation,
};

const KEYWORDS: &[&str] = &[
    "and", "do", "else", "elseif", "for", "function", "if", "in", "local", "not", "or",
    "repeat", "return", "then", "until", "while",
];

#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub callee: String,
    /// Zero-based argument index at the caret.
    pub active_parameter: u32,
}

/// Scan backwards from the end of `before` for the innermost unclosed call.
///
/// Commas count at the call's own nesting level. Passing the opening brace of a table
/// literal (or a bare parenthesis) restarts the count, since the commas seen so far
/// belonged to it.
pub fn call_site(before: &str) -> Option<CallSite> {
    let chars = mask_literals(before);
    let mut depth = 0u32;
    let mut commas = 0u32;
    for i in (0..chars.len()).rev() {
        match chars[i] {
            ')' | '}' | ']' => depth += 1,
            '(' | '{' | '[' if depth > 0 => depth -= 1,
            '(' | '{' => match callee_before(&chars[..i]) {
                Some(callee) => {
                    return Some(CallSite {
                        callee,
                        active_parameter: commas,
                    });
                }
                None => commas = 0,
            },
            '[' => commas = 0,
            ',' if depth == 0 => commas += 1,
            _ => {}
        }
    }
    None
}

fn callee_before(chars: &[char]) -> Option<String> {
    let end = chars.iter().rposition(|c| !c.is_whitespace())? + 1;
    let start = chars[..end]
        .iter()
        .rposition(|c| !(c.is_alphanumeric() || matches!(c, '_' | '.' | ':')))
        .map(|i| i + 1)
        .unwrap_or(0);
    let callee: String = chars[start..end].iter().collect();
    let callee = callee.trim_matches(|c| c == '.' || c == ':');
    if callee.is_empty()
        || KEYWORDS.contains(&callee)
        || callee.starts_with(|c: char| c.is_ascii_digit())
    {
        None
    } else {
        Some(callee.to_string())
    }
}

/// Blank out string literals and comments so brackets inside them don't count.
fn mask_literals(text: &str) -> Vec<char> {
    let mut out: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < out.len() {
        match out[i] {
            quote @ ('"' | '\'') => {
                let mut j = i + 1;
                while j < out.len() && out[j] != quote && out[j] != '\n' {
                    if out[j] == '\\' {
                        out[j] = ' ';
                        j += 1;
                        if j >= out.len() {
                            break;
                        }
                    }
                    out[j] = ' ';
                    j += 1;
                }
                i = j + 1;
            }
            '-' if out.get(i + 1) == Some(&'-') => {
                while i < out.len() && out[i] != '\n' {
                    out[i] = ' ';
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    out
}

/// UTF-16 offsets of each parameter inside the parenthesized list of `label`.
pub fn parameter_offsets(label: &str) -> Vec<[u32; 2]> {
    let (Some(open), Some(close)) = (label.find('('), label.rfind(')')) else {
        return Vec::new();
    };
    if close <= open + 1 {
        return Vec::new();
    }
    let mut offsets = Vec::new();
    let mut start = open + 1;
    for (i, c) in label[..close].char_indices().skip_while(|(i, _)| *i <= open) {
        if c == ',' {
            push_param(label, start, i, &mut offsets);
            start = i + 1;
        }
    }
    push_param(label, start, close, &mut offsets);
    offsets
}

fn push_param(label: &str, start: usize, end: usize, offsets: &mut Vec<[u32; 2]>) {
    let raw = &label[start..end];
    let lead = raw.len() - raw.trim_start().len();
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }
    let from = utf16_len(&label[..start + lead]);
    offsets.push([from, from + utf16_len(trimmed)]);
}

fn utf16_len(text: &str) -> u32 {
    text.encode_utf16().count() as u32
}

pub fn signature_help(
    index: &Index,
    file_label: &str,
    text: &str,
    position: Position,
) -> Option<SignatureHelp> {
    let site = call_site(&text_before(text, position))?;
    let method_call = site.callee.contains(':');
    let callee = substitute_receiver(text, position.line, &site.callee);

    let entries = index.entries();
    let signatures: Vec<SignatureInformation> = best_matches(lookup(&entries, file_label, &callee))
        .into_iter()
        .filter(|m| m.api.header().contains('('))
        .map(|m| {
            let label = m.api.header().to_string();
            let shift = u32::from(method_call && !label.contains(':'));
            let body = m.api.doc.split_once('\n').map(|(_, rest)| rest.trim());
            SignatureInformation {
                parameters: Some(
                    parameter_offsets(&label)
                        .into_iter()
                        .map(|range| ParameterInformation {
                            label: ParameterLabel::LabelOffsets(range),
                            documentation: None,
                        })
                        .collect(),
                ),
                documentation: body.filter(|b| !b.is_empty()).map(|b| {
                    Documentation::MarkupContent(MarkupContent {
                        kind: MarkupKind::PlainText,
                        value: b.to_string(),
                    })
                }),
                active_parameter: Some(site.active_parameter + shift),
                label,
            }
        })
        .collect();
    if signatures.is_empty() {
        return None;
    }

    let active_parameter = signatures[0].active_parameter;
    Some(SignatureHelp {
        signatures,
        active_signature: Some(0),
        active_parameter,
    })
}

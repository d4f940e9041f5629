//! Entry-point validation
//!
//! Runs on preprocessed code so macro-built signatures are already expanded,
//! and catches a missing or malformed `mainImage` before the compiler sees it.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::utils::{PassName, PreprocessorFailure, ENTRY_POINT_NAME, ENTRY_POINT_SIGNATURE};

static ENTRY_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s+mainImage\s*\(").unwrap());
static ENTRY_SIGNATURE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^void\s+mainImage\s*\(\s*out\s+vec4\s+[A-Za-z_]\w*\s*,\s*(?:in\s+)?vec2\s+[A-Za-z_]\w*\s*\)")
        .unwrap()
});

/// Words that can sit in front of a call without making it a declaration
const EXPRESSION_KEYWORDS: &[&str] = &["return", "else", "case", "do"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum DeclarationKind {
    Definition,
    Prototype,
    Other,
}

#[derive(Debug)]
struct Declaration {
    start: usize,
    name_offset: usize,
    kind: DeclarationKind,
}

/// Validate the entry point of an expanded pass
///
/// Performs these checks:
/// 1. Source is not empty
/// 2. `mainImage` is defined as a function (error on line 0 otherwise)
/// 3. Every declaration matches `void mainImage(out vec4, [in] vec2)`
///    (error on the line of the first one that does not)
pub fn validate_entry_point(expanded_code: &str, pass: PassName) -> Result<(), PreprocessorFailure> {
    if expanded_code.trim().is_empty() {
        return Err(PreprocessorFailure::single(pass, 0, "Shader source is empty"));
    }

    let code = blank_comments(expanded_code);
    let declarations = find_declarations(&code);

    if !declarations.iter().any(|d| d.kind != DeclarationKind::Prototype) {
        log::debug!("[Validator] {} has no {} definition", pass, ENTRY_POINT_NAME);
        return Err(PreprocessorFailure::single(
            pass,
            0,
            format!(
                "Missing entry point '{}'.\n\nRequired:\n{}",
                ENTRY_POINT_NAME, ENTRY_POINT_SIGNATURE
            ),
        ));
    }

    if let Some(bad) = declarations
        .iter()
        .find(|d| !ENTRY_SIGNATURE.is_match(&code[d.start..]))
    {
        let line = code[..bad.name_offset].matches('\n').count() + 1;
        log::debug!("[Validator] {} has a malformed {} on line {}", pass, ENTRY_POINT_NAME, line);
        return Err(PreprocessorFailure::single(
            pass,
            line,
            format!(
                "Incorrect signature for '{}'.\n\nExpected:\n{}",
                ENTRY_POINT_NAME, ENTRY_POINT_SIGNATURE
            ),
        ));
    }

    Ok(())
}

/// Every `<type> mainImage(...)` in comment-free code, skipping call sites
fn find_declarations(code: &str) -> Vec<Declaration> {
    ENTRY_DECLARATION
        .captures_iter(code)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let leader = caps.get(1)?;
            if EXPRESSION_KEYWORDS.contains(&leader.as_str()) {
                return None;
            }
            let name_offset = whole.start() + code[whole.start()..].find(ENTRY_POINT_NAME)?;
            let kind = match closing_paren(code, whole.end()) {
                Some(close) => match code[close + 1..].trim_start().chars().next() {
                    Some('{') => DeclarationKind::Definition,
                    Some(';') => DeclarationKind::Prototype,
                    _ => DeclarationKind::Other,
                },
                None => DeclarationKind::Other,
            };
            Some(Declaration {
                start: whole.start(),
                name_offset,
                kind,
            })
        })
        .collect()
}

/// Byte offset of the `)` closing a parameter list that opens just before `from`
fn closing_paren(code: &str, from: usize) -> Option<usize> {
    let mut depth = 1;
    for (offset, c) in code[from..].char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    return Some(from + offset);
                }
            }
            _ => {}
        }
    }
    None
}

/// Replace comment text with spaces, keeping newlines so line numbers survive
fn blank_comments(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut chars = code.chars().peekable();
    let mut in_line_comment = false;
    let mut in_block_comment = false;

    while let Some(c) = chars.next() {
        if in_line_comment {
            if c == '\n' {
                in_line_comment = false;
                out.push('\n');
            } else {
                out.push(' ');
            }
        } else if in_block_comment {
            if c == '*' && chars.peek() == Some(&'/') {
                chars.next();
                in_block_comment = false;
                out.push_str("  ");
            } else {
                out.push(if c == '\n' { '\n' } else { ' ' });
            }
        } else if c == '/' && chars.peek() == Some(&'/') {
            chars.next();
            in_line_comment = true;
            out.push_str("  ");
        } else if c == '/' && chars.peek() == Some(&'*') {
            chars.next();
            in_block_comment = true;
            out.push_str("  ");
        } else {
            out.push(c);
        }
    }

    out
}

//! Macro and conditional preprocessor for shader passes
//!
//! Expands `#define` macros (object-like and function-like), evaluates
//! `#ifdef`/`#ifndef`/`#if`/`#elif`/`#else`/`#endif` blocks and strips the
//! handled directive lines. Every kept output line records the input line it
//! came from so compiler diagnostics can be traced back to the editor.
//!
//! Directives the preprocessor does not own (`#version`, `#extension`,
//! `#pragma`, ...) are passed through untouched for the compiler.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;

use crate::compiler::expression;
use crate::utils::{PreprocessorError, MAX_EXPANSION_DEPTH};

static TOKEN_PASTE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[ \t]*##[ \t]*").unwrap());
static DEFINED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\bdefined\s*\(\s*([A-Za-z_]\w*)\s*\)|\bdefined\s+([A-Za-z_]\w*)").unwrap()
});

/// Sparse map from output line to input line (both 1-based)
///
/// Lines with no single origin have no entry. Lookups that need an answer
/// anyway use the nearest preceding mapped line, which is usually right for
/// diagnostics and never points past the offending code.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineMap {
    entries: BTreeMap<usize, usize>,
}

impl LineMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, output_line: usize, input_line: usize) {
        self.entries.insert(output_line, input_line);
    }

    /// Exact entry for an output line
    pub fn get(&self, output_line: usize) -> Option<usize> {
        self.entries.get(&output_line).copied()
    }

    /// Entry for an output line, falling back to the nearest preceding mapped line
    pub fn lookup(&self, output_line: usize) -> Option<usize> {
        self.nearest_at_or_after(output_line, 1)
    }

    /// Like [`LineMap::lookup`], but never falls back below `floor`
    pub fn nearest_at_or_after(&self, output_line: usize, floor: usize) -> Option<usize> {
        if output_line < floor {
            return None;
        }
        self.entries
            .range(floor..=output_line)
            .next_back()
            .map(|(_, input)| *input)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.entries.iter().map(|(o, i)| (*o, *i))
    }
}

/// Output of a preprocessing run
#[derive(Debug, Clone, Default)]
pub struct PreprocessResult {
    pub code: String,
    pub errors: Vec<PreprocessorError>,
    pub line_map: LineMap,
}

impl PreprocessResult {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Number of lines in a piece of source, where "" is a single empty line
pub fn line_count(code: &str) -> usize {
    code.split('\n').count()
}

#[derive(Debug, Clone)]
struct MacroDef {
    params: Option<Vec<String>>,
    body: String,
    line: usize,
}

#[derive(Debug)]
struct Conditional {
    directive: &'static str,
    opened_at: usize,
    parent_active: bool,
    /// Some branch of this block has already been taken
    taken: bool,
    active: bool,
    seen_else: bool,
}

#[derive(Debug)]
enum ExpandError {
    Recursion(String),
    Arity {
        name: String,
        expected: usize,
        found: usize,
    },
}

/// Preprocess a complete source text with an empty macro table
pub fn preprocess(input: &str) -> PreprocessResult {
    Preprocessor::new().run(input)
}

#[derive(Debug, Default)]
pub struct Preprocessor {
    macros: HashMap<String, MacroDef>,
    errors: Vec<PreprocessorError>,
    reported_recursion: HashSet<String>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run(mut self, input: &str) -> PreprocessResult {
        let lines: Vec<&str> = input.split('\n').collect();
        let mut output: Vec<String> = Vec::with_capacity(lines.len());
        let mut line_map = LineMap::new();
        let mut stack: Vec<Conditional> = Vec::new();
        let mut in_block_comment = false;

        let mut i = 0;
        while i < lines.len() {
            let line_no = i + 1;
            let line = lines[i];
            let active = stack.last().map_or(true, |c| c.active);

            if !in_block_comment && line.trim_start().starts_with('#') {
                // Join backslash-continued directive lines
                let first = i;
                let mut directive = line.trim().to_string();
                while directive.ends_with('\\') && i + 1 < lines.len() {
                    directive.pop();
                    i += 1;
                    directive.push(' ');
                    directive.push_str(lines[i].trim());
                }

                if !self.handle_directive(&directive, line_no, active, &mut stack) && active {
                    for (offset, passthrough) in lines[first..=i].iter().enumerate() {
                        output.push(passthrough.to_string());
                        line_map.insert(output.len(), first + offset + 1);
                    }
                }
                i += 1;
                continue;
            }

            if active {
                let expanded = self.expand_line(line, line_no, &mut in_block_comment);
                output.push(expanded);
                line_map.insert(output.len(), line_no);
            }
            i += 1;
        }

        for open in &stack {
            self.errors.push(PreprocessorError::new(
                open.opened_at,
                format!("Unterminated {} block (missing #endif)", open.directive),
            ));
        }
        self.errors.sort_by_key(|e| e.line);

        if !self.errors.is_empty() {
            log::debug!(
                "[Preprocessor] {} error(s) in {} input lines",
                self.errors.len(),
                lines.len()
            );
        }

        PreprocessResult {
            code: output.join("\n"),
            errors: self.errors,
            line_map,
        }
    }

    /// Returns false if the directive is not one the preprocessor owns
    fn handle_directive(
        &mut self,
        directive: &str,
        line: usize,
        active: bool,
        stack: &mut Vec<Conditional>,
    ) -> bool {
        let body = directive.trim_start_matches('#').trim_start();
        let keyword_len = body
            .find(|c: char| !c.is_ascii_alphabetic())
            .unwrap_or(body.len());
        let (keyword, rest) = body.split_at(keyword_len);
        let rest = strip_comments(rest).trim().to_string();

        match keyword {
            "" => {}
            "define" => {
                if active {
                    self.define_macro(&rest, line);
                }
            }
            "undef" => {
                if active {
                    match leading_identifier(&rest) {
                        Some(name) => {
                            self.macros.remove(name);
                        }
                        None => self.error(line, "#undef requires a macro name"),
                    }
                }
            }
            "ifdef" | "ifndef" => {
                let opener: &'static str = if keyword == "ifdef" { "#ifdef" } else { "#ifndef" };
                let mut condition = false;
                if active {
                    match leading_identifier(&rest) {
                        Some(name) => {
                            condition = self.macros.contains_key(name) == (keyword == "ifdef");
                        }
                        None => self.error(line, format!("{} requires a macro name", opener)),
                    }
                }
                stack.push(Conditional {
                    directive: opener,
                    opened_at: line,
                    parent_active: active,
                    taken: condition || !active,
                    active: active && condition,
                    seen_else: false,
                });
            }
            "if" => {
                let condition = active && self.evaluate_condition(&rest, line);
                stack.push(Conditional {
                    directive: "#if",
                    opened_at: line,
                    parent_active: active,
                    taken: condition || !active,
                    active: condition,
                    seen_else: false,
                });
            }
            "elif" => match stack.last_mut() {
                None => self.error(line, "#elif without matching #if"),
                Some(block) if block.seen_else => self.error(line, "#elif after #else"),
                Some(block) => {
                    if block.parent_active && !block.taken {
                        let condition = self.evaluate_condition(&rest, line);
                        block.active = condition;
                        block.taken = condition;
                    } else {
                        block.active = false;
                    }
                }
            },
            "else" => match stack.last_mut() {
                None => self.error(line, "#else without matching #if/#ifdef"),
                Some(block) if block.seen_else => self.error(line, "Duplicate #else in conditional block"),
                Some(block) => {
                    block.seen_else = true;
                    block.active = block.parent_active && !block.taken;
                    block.taken = true;
                }
            },
            "endif" => {
                if stack.pop().is_none() {
                    self.error(line, "#endif without matching #if/#ifdef");
                }
            }
            "error" => {
                if active {
                    self.error(line, format!("#error {}", rest));
                }
            }
            _ => return false,
        }

        true
    }

    fn define_macro(&mut self, rest: &str, line: usize) {
        let Some(name) = leading_identifier(rest) else {
            self.error(line, "#define requires a valid macro name");
            return;
        };
        let after_name = &rest[name.len()..];

        let (params, body) = if let Some(param_text) = after_name.strip_prefix('(') {
            let Some(close) = param_text.find(')') else {
                self.error(line, format!("Unterminated parameter list in #define {}", name));
                return;
            };
            let mut params = Vec::new();
            let list = param_text[..close].trim();
            if !list.is_empty() {
                for param in list.split(',').map(str::trim) {
                    if leading_identifier(param) != Some(param) {
                        self.error(line, format!("Invalid parameter '{}' in #define {}", param, name));
                        return;
                    }
                    params.push(param.to_string());
                }
            }
            (Some(params), param_text[close + 1..].trim())
        } else {
            (None, after_name.trim())
        };

        self.macros.insert(
            name.to_string(),
            MacroDef {
                params,
                body: body.to_string(),
                line,
            },
        );
    }

    fn evaluate_condition(&mut self, expr: &str, line: usize) -> bool {
        let resolved = DEFINED.replace_all(expr, |caps: &regex::Captures| {
            let name = caps.get(1).or_else(|| caps.get(2)).map_or("", |m| m.as_str());
            if self.macros.contains_key(name) { "1" } else { "0" }
        });

        let expanded = match self.expand_text(&resolved, 0) {
            Ok(text) => text,
            Err(err) => {
                self.report_expand_error(err, line);
                return false;
            }
        };

        match expression::evaluate(&expanded) {
            Ok(value) => value != 0,
            Err(msg) => {
                self.error(line, format!("Invalid #if expression: {}", msg));
                false
            }
        }
    }

    /// Expand macros in the code parts of a line, leaving comments untouched
    fn expand_line(&mut self, line: &str, line_no: usize, in_block_comment: &mut bool) -> String {
        if self.macros.is_empty() {
            update_block_comment_state(line, in_block_comment);
            return line.to_string();
        }

        let mut out = String::with_capacity(line.len());
        let mut rest = line;
        loop {
            if *in_block_comment {
                match rest.find("*/") {
                    Some(end) => {
                        out.push_str(&rest[..end + 2]);
                        rest = &rest[end + 2..];
                        *in_block_comment = false;
                    }
                    None => {
                        out.push_str(rest);
                        break;
                    }
                }
            }

            let line_comment = rest.find("//");
            let block_comment = rest.find("/*");
            match (line_comment, block_comment) {
                (Some(lc), bc) if bc.map_or(true, |bc| lc < bc) => {
                    out.push_str(&self.expand_code(&rest[..lc], line_no));
                    out.push_str(&rest[lc..]);
                    break;
                }
                (_, Some(bc)) => {
                    out.push_str(&self.expand_code(&rest[..bc], line_no));
                    out.push_str("/*");
                    rest = &rest[bc + 2..];
                    *in_block_comment = true;
                }
                _ => {
                    out.push_str(&self.expand_code(rest, line_no));
                    break;
                }
            }
        }
        out
    }

    fn expand_code(&mut self, code: &str, line_no: usize) -> String {
        match self.expand_text(code, 0) {
            Ok(expanded) => expanded,
            Err(err) => {
                self.report_expand_error(err, line_no);
                code.to_string()
            }
        }
    }

    fn report_expand_error(&mut self, err: ExpandError, line_no: usize) {
        match err {
            ExpandError::Recursion(name) => {
                if self.reported_recursion.insert(name.clone()) {
                    let def_line = self.macros.get(&name).map_or(line_no, |m| m.line);
                    self.error(
                        def_line,
                        format!(
                            "Macro '{}' expands recursively (expansion depth exceeded {})",
                            name, MAX_EXPANSION_DEPTH
                        ),
                    );
                }
            }
            ExpandError::Arity {
                name,
                expected,
                found,
            } => self.error(
                line_no,
                format!(
                    "Macro '{}' expects {} argument(s) but {} were given",
                    name, expected, found
                ),
            ),
        }
    }

    fn expand_text(&self, text: &str, depth: usize) -> Result<String, ExpandError> {
        let bytes = text.as_bytes();
        let mut out = String::with_capacity(text.len());
        let mut i = 0;

        while i < bytes.len() {
            let b = bytes[i];
            if b.is_ascii_digit() {
                let start = i;
                while i < bytes.len() && (is_ident_char(bytes[i]) || bytes[i] == b'.') {
                    i += 1;
                }
                out.push_str(&text[start..i]);
            } else if is_ident_start(b) {
                let start = i;
                while i < bytes.len() && is_ident_char(bytes[i]) {
                    i += 1;
                }
                let ident = &text[start..i];

                let Some(def) = self.macros.get(ident) else {
                    out.push_str(ident);
                    continue;
                };
                if depth >= MAX_EXPANSION_DEPTH {
                    return Err(ExpandError::Recursion(ident.to_string()));
                }

                match &def.params {
                    None => {
                        let expanded = self.expand_text(&def.body, depth + 1)?;
                        let rest = &text[i..];
                        match self.trailing_function_macro(&expanded) {
                            Some(name) if rest.trim_start().starts_with('(') => {
                                // The body names a function-like macro whose call follows it
                                out.push_str(&expanded[..expanded.len() - name.len()]);
                                let spliced = format!("{}{}", name, rest);
                                out.push_str(&self.expand_text(&spliced, depth + 1)?);
                                return Ok(out);
                            }
                            _ => out.push_str(&expanded),
                        }
                    }
                    Some(params) => {
                        let Some((mut args, consumed)) = parse_invocation_args(&text[i..]) else {
                            // Function-like macro name without a call
                            out.push_str(ident);
                            continue;
                        };
                        i += consumed;

                        if params.is_empty() && args.len() == 1 && args[0].trim().is_empty() {
                            args.clear();
                        }
                        if args.len() != params.len() {
                            return Err(ExpandError::Arity {
                                name: ident.to_string(),
                                expected: params.len(),
                                found: args.len(),
                            });
                        }

                        let expanded_args = args
                            .iter()
                            .map(|arg| self.expand_text(arg.trim(), depth + 1))
                            .collect::<Result<Vec<_>, _>>()?;
                        let substituted = substitute_params(&def.body, params, &expanded_args);
                        out.push_str(&self.expand_text(&substituted, depth + 1)?);
                    }
                }
            } else {
                let start = i;
                while i < bytes.len() && !is_ident_char(bytes[i]) {
                    i += 1;
                }
                out.push_str(&text[start..i]);
            }
        }

        Ok(out)
    }

    fn trailing_function_macro<'a>(&self, text: &'a str) -> Option<&'a str> {
        let bytes = text.as_bytes();
        let mut start = bytes.len();
        while start > 0 && is_ident_char(bytes[start - 1]) {
            start -= 1;
        }
        if start == bytes.len() || !is_ident_start(bytes[start]) {
            return None;
        }
        let name = &text[start..];
        match self.macros.get(name) {
            Some(def) if def.params.is_some() => Some(name),
            _ => None,
        }
    }

    fn error(&mut self, line: usize, message: impl Into<String>) {
        self.errors.push(PreprocessorError::new(line, message));
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}

/// The identifier at the start of `text`, if it begins with one
fn leading_identifier(text: &str) -> Option<&str> {
    let bytes = text.as_bytes();
    if bytes.first().map_or(true, |b| !is_ident_start(*b)) {
        return None;
    }
    let end = bytes.iter().position(|b| !is_ident_char(*b)).unwrap_or(bytes.len());
    Some(&text[..end])
}

/// Parse `( a, (b, c), d )` at the start of `rest`. Returns the raw arguments
/// and the number of bytes consumed, or None if there is no complete call.
fn parse_invocation_args(rest: &str) -> Option<(Vec<&str>, usize)> {
    let bytes = rest.as_bytes();
    let mut i = 0;
    while i < bytes.len() && (bytes[i] == b' ' || bytes[i] == b'\t') {
        i += 1;
    }
    if bytes.get(i) != Some(&b'(') {
        return None;
    }

    i += 1;
    let mut depth = 1;
    let mut arg_start = i;
    let mut args = Vec::new();
    while i < bytes.len() {
        match bytes[i] {
            b'(' => depth += 1,
            b')' => {
                depth -= 1;
                if depth == 0 {
                    args.push(&rest[arg_start..i]);
                    return Some((args, i + 1));
                }
            }
            b',' if depth == 1 => {
                args.push(&rest[arg_start..i]);
                arg_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    None
}

fn substitute_params(body: &str, params: &[String], args: &[String]) -> String {
    let bytes = body.as_bytes();
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < bytes.len() {
        if is_ident_start(bytes[i]) {
            let start = i;
            while i < bytes.len() && is_ident_char(bytes[i]) {
                i += 1;
            }
            let ident = &body[start..i];
            match params.iter().position(|p| p == ident) {
                Some(idx) => out.push_str(&args[idx]),
                None => out.push_str(ident),
            }
        } else if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && (is_ident_char(bytes[i]) || bytes[i] == b'.') {
                i += 1;
            }
            out.push_str(&body[start..i]);
        } else {
            let start = i;
            while i < bytes.len() && !is_ident_char(bytes[i]) {
                i += 1;
            }
            out.push_str(&body[start..i]);
        }
    }

    if out.contains("##") {
        TOKEN_PASTE.replace_all(&out, "").into_owned()
    } else {
        out
    }
}

/// Remove `//` and single-line `/* */` comments from directive text
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let line_comment = rest.find("//");
        let block_comment = rest.find("/*");
        match (line_comment, block_comment) {
            (Some(lc), bc) if bc.map_or(true, |bc| lc < bc) => {
                out.push_str(&rest[..lc]);
                return out;
            }
            (_, Some(bc)) => {
                out.push_str(&rest[..bc]);
                out.push(' ');
                match rest[bc + 2..].find("*/") {
                    Some(end) => rest = &rest[bc + 2 + end + 2..],
                    None => return out,
                }
            }
            _ => {
                out.push_str(rest);
                return out;
            }
        }
    }
}

fn update_block_comment_state(line: &str, in_block_comment: &mut bool) {
    let mut rest = line;
    loop {
        if *in_block_comment {
            match rest.find("*/") {
                Some(end) => {
                    rest = &rest[end + 2..];
                    *in_block_comment = false;
                }
                None => return,
            }
        }
        let line_comment = rest.find("//");
        match rest.find("/*") {
            Some(bc) if line_comment.map_or(true, |lc| bc < lc) => {
                rest = &rest[bc + 2..];
                *in_block_comment = true;
            }
            _ => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_identity(result: &PreprocessResult, input: &str) -> bool {
        let n = line_count(input);
        result.line_map.len() == n && (1..=n).all(|l| result.line_map.get(l) == Some(l))
    }

    #[test]
    fn test_plain_source_round_trips() {
        let src = "void mainImage(out vec4 c, vec2 p) {\n    c = vec4(1.0);\n}\n";
        let result = preprocess(src);
        assert!(result.is_ok());
        assert_eq!(result.code, src);
        assert!(is_identity(&result, src));
    }

    #[test]
    fn test_object_macro_expansion() {
        let result = preprocess("#define PI 3.14159\nfloat x = PI;");
        assert!(result.is_ok());
        assert_eq!(result.code, "float x = 3.14159;");
        assert_eq!(result.line_map.get(1), Some(2));
    }

    #[test]
    fn test_function_macro_with_nested_macros() {
        let src = "#define TWO 2.0\n#define SCALE(x, y) ((x) * (y) * TWO)\nfloat v = SCALE(a, min(b, c));";
        let result = preprocess(src);
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.code, "float v = ((a) * (min(b, c)) * 2.0);");
    }

    #[test]
    fn test_function_macro_without_call_is_untouched() {
        let result = preprocess("#define F(x) x\nfloat F = 1.0;");
        assert_eq!(result.code, "float F = 1.0;");
    }

    #[test]
    fn test_macro_argument_count_mismatch() {
        let result = preprocess("#define F(a, b) a + b\nfloat x = F(1);");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 2);
    }

    #[test]
    fn test_macros_in_comments_are_not_expanded() {
        let result = preprocess("#define X 1\nfloat a = X; // X stays\n/* X\nX */ float b = X;");
        assert_eq!(result.code, "float a = 1; // X stays\n/* X\nX */ float b = 1;");
    }

    #[test]
    fn test_token_paste() {
        let result = preprocess("#define FIELD(n) value_ ## n\nfloat FIELD(2);");
        assert_eq!(result.code, "float value_2;");
    }

    #[test]
    fn test_undef() {
        let result = preprocess("#define A 1\nA\n#undef A\nA");
        assert_eq!(result.code, "1\nA");
        assert_eq!(result.line_map.get(2), Some(4));
    }

    #[test]
    fn test_ifdef_else_removes_untaken_branch() {
        let src = "#define HQ\n#ifdef HQ\nhigh\n#else\nlow\n#endif\nafter";
        let result = preprocess(src);
        assert!(result.is_ok());
        assert_eq!(result.code, "high\nafter");
        assert_eq!(result.line_map.get(1), Some(3));
        assert_eq!(result.line_map.get(2), Some(7));
    }

    #[test]
    fn test_ifndef_and_nesting() {
        let src = "#ifndef A\n#ifdef B\nb\n#else\nnot_b\n#endif\n#endif";
        let result = preprocess(src);
        assert!(result.is_ok());
        assert_eq!(result.code, "not_b");
    }

    #[test]
    fn test_nested_blocks_inside_untaken_branch() {
        let src = "#ifdef NOPE\n#ifdef ALSO\nx\n#else\ny\n#endif\n#else\nz\n#endif";
        let result = preprocess(src);
        assert!(result.is_ok());
        assert_eq!(result.code, "z");
    }

    #[test]
    fn test_if_elif_expressions() {
        let src = "#define LEVEL 2\n#if LEVEL > 2\nthree\n#elif LEVEL == 2 && defined(LEVEL)\ntwo\n#else\none\n#endif";
        let result = preprocess(src);
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.code, "two");
    }

    #[test]
    fn test_unknown_directives_pass_through() {
        let src = "#version 300 es\n#extension GL_OES_standard_derivatives : enable\nfloat x;";
        let result = preprocess(src);
        assert!(result.is_ok());
        assert_eq!(result.code, src);
    }

    #[test]
    fn test_continued_define() {
        let src = "#define ADD(a, b) \\\n    ((a) + (b))\nfloat x = ADD(1, 2);";
        let result = preprocess(src);
        assert!(result.is_ok());
        assert_eq!(result.code, "float x = ((1) + (2));");
        assert_eq!(result.line_map.get(1), Some(3));
    }

    #[test]
    fn test_define_body_comment_is_dropped() {
        let result = preprocess("#define PI 3.14 // approximately\nPI");
        assert_eq!(result.code, "3.14");
    }

    #[test]
    fn test_unterminated_conditional() {
        let result = preprocess("float a;\n#ifdef FOO\nfloat b;");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 2);
        assert!(result.errors[0].message.contains("#ifdef"));
    }

    #[test]
    fn test_unmatched_else_and_endif() {
        let result = preprocess("a\n#else\nb");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 2);

        let result = preprocess("a\nb\n#endif");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 3);
    }

    #[test]
    fn test_duplicate_else() {
        let result = preprocess("#ifdef A\n#else\n#else\n#endif");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 3);
    }

    #[test]
    fn test_self_referential_macro_fails_at_definition() {
        let result = preprocess("float a;\n#define LOOP LOOP + 1\nfloat b = LOOP;\nfloat c = LOOP;");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 2);
        assert!(result.errors[0].message.contains("LOOP"));
    }

    #[test]
    fn test_mutually_recursive_macros() {
        let result = preprocess("#define A B\n#define B A\nA");
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].line == 1 || result.errors[0].line == 2);
    }

    #[test]
    fn test_error_directive() {
        let result = preprocess("#ifndef FEATURE\n#error FEATURE required\n#endif");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 2);
    }

    #[test]
    fn test_object_macro_naming_function_macro_takes_following_call() {
        let result = preprocess("#define F(x) x*2\n#define G F\nfloat a = G(3);");
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.code, "float a = 3*2;");

        let result = preprocess("#define F(x) (x+1)\n#define G -F\nfloat b = G (2) + G;");
        assert!(result.is_ok(), "{:?}", result.errors);
        assert_eq!(result.code, "float b = -(2+1) + -F;");
    }

    #[test]
    fn test_elif_without_opener() {
        let result = preprocess("#elif 1\nfloat a;");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 1);
        assert!(result.errors[0].message.contains("#elif"));
    }

    #[test]
    fn test_elif_after_else() {
        let result = preprocess("#if 1\n#else\n#elif 1\n#endif");
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[0].line, 3);
    }

    #[test]
    fn test_malformed_if_expression() {
        let result = preprocess("#if 1 +\nfloat a;\n#endif");
        assert!(!result.is_ok());
        assert_eq!(result.errors[0].line, 1);
        assert!(result.errors[0].message.contains("Invalid #if expression"));
    }

    #[test]
    fn test_line_map_lookup_falls_back() {
        let mut map = LineMap::new();
        map.insert(1, 10);
        map.insert(4, 20);
        assert_eq!(map.lookup(3), Some(10));
        assert_eq!(map.lookup(4), Some(20));
        assert_eq!(map.nearest_at_or_after(3, 2), None);
        assert_eq!(map.lookup(0), None);
    }

    proptest! {
        #[test]
        fn prop_directive_free_source_is_identity(
            lines in proptest::collection::vec("[a-zA-Z0-9_ ;=+*(){}.,/]{0,40}", 1..30)
        ) {
            let src = lines.join("\n");
            let result = preprocess(&src);
            prop_assert!(result.is_ok());
            prop_assert_eq!(&result.code, &src);
            prop_assert!(is_identity(&result, &src));
        }

        #[test]
        fn prop_lone_unmatched_directive_reports_its_line(
            before in proptest::collection::vec("[a-z ;]{0,20}", 0..10),
            after in proptest::collection::vec("[a-z ;]{0,20}", 0..10),
            directive in prop_oneof![Just("#else"), Just("#endif")],
        ) {
            let mut lines: Vec<String> = before.clone();
            lines.push(directive.to_string());
            lines.extend(after);
            let result = preprocess(&lines.join("\n"));
            prop_assert_eq!(result.errors.len(), 1);
            prop_assert_eq!(result.errors[0].line, before.len() + 1);
        }
    }
}

//! Compiler log parsing and diagnostic remapping
//!
//! Raw compiler logs refer to lines of the assembled source. This module pulls
//! out the line-tagged messages, moves each one back to the pass and line the
//! user actually wrote, and rewrites known compiler phrasings into short
//! editor-friendly sentences.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::compiler::assembler::AssembledUnit;
use crate::utils::PassName;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Error,
    Warning,
}

/// A compiler message attributed to an original pass and line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// 1-based line in the pass; 0 when the message has no resolvable line
    pub original_line: usize,
    pub pass: PassName,
    pub severity: Severity,
    pub message: String,
    /// Line in the assembled source as reported by the compiler (0 if none)
    pub raw_compiler_line: usize,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let severity = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        if self.original_line > 0 {
            write!(f, "{} {}:{}: {}", severity, self.pass, self.original_line, self.message)
        } else {
            write!(f, "{} {}: {}", severity, self.pass, self.message)
        }
    }
}

static LOG_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(ERROR|WARNING):\s*[^:]*:(\d+):\s*(.*)$").unwrap());
static SEVERITY_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*(error|warning)\s*:\s*").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Ordered rewrites from known compiler phrasings to short messages.
/// The first match wins.
static REWRITES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"'([^']*)'\s*:\s*undeclared identifier", "Undeclared identifier: $1"),
        (r"(?i)unknown variable:?\s*'?(\w+)'?", "Undeclared identifier: $1"),
        (r"(?i)unknown function\s*'?(\w+)'?", "Unknown function: $1"),
        (
            r"'([^']*)'\s*:\s*cannot convert from\s*'([^']*)'\s*to\s*'([^']*)'",
            "Cannot convert from $2 to $3",
        ),
        (
            r"'([^']*)'\s*:\s*wrong operand types.*",
            "Operand types do not match for operator $1",
        ),
        (
            r"'([^']*)'\s*:\s*no matching overloaded function found",
            "No matching overload for function $1",
        ),
        (
            r"'([^']*)'\s*:\s*l-value required.*",
            "Invalid assignment target: $1",
        ),
        (
            r"'([^']*)'\s*:\s*vector field selection out of range",
            "Vector component out of range: $1",
        ),
        (
            r"'([^']*)'\s*:\s*(?:array\s+)?index out of range.*",
            "Index out of range: $1",
        ),
        (
            r"'([^']*)'\s*:\s*syntax error.*expecting.*';'.*",
            "Missing semicolon near $1",
        ),
        (r"'([^']*)'\s*:\s*syntax error.*", "Syntax error near $1"),
        (r"(?i)unexpected end of file.*", "Unexpected end of file (missing closing brace?)"),
        (r"'([^']*)'\s*:\s*redefinition", "Redefinition of $1"),
        (
            r"'([^']*)'\s*:\s*(?:cannot be used with|illegal use of|invalid)?\s*.*qualifier.*",
            "Invalid use of qualifier $1",
        ),
    ]
    .into_iter()
    .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), replacement))
    .collect()
});

/// Parse a raw compiler log for a pass and remap it to original lines
pub fn map_diagnostics(raw_log: &str, pass: PassName, unit: &AssembledUnit) -> Vec<Diagnostic> {
    let mut diagnostics: Vec<Diagnostic> = Vec::new();

    for log_line in raw_log.lines() {
        if log_line.trim().is_empty() {
            continue;
        }

        if let Some(caps) = LOG_LINE.captures(log_line) {
            let severity = if &caps[1] == "ERROR" {
                Severity::Error
            } else {
                Severity::Warning
            };
            let raw_line: usize = caps[2].parse().unwrap_or(0);
            let (attributed, original_line) = unit.resolve_final_line(raw_line);

            diagnostics.push(Diagnostic {
                original_line,
                pass: attributed,
                severity,
                message: normalize_message(&caps[3]),
                raw_compiler_line: raw_line,
            });
            continue;
        }

        let lower = log_line.to_lowercase();
        if lower.contains("error") || lower.contains("failed") {
            let message = normalize_message(log_line);
            let seen = diagnostics
                .iter()
                .any(|d| d.original_line == 0 && d.pass == pass && d.message == message);
            if !seen {
                diagnostics.push(Diagnostic {
                    original_line: 0,
                    pass,
                    severity: Severity::Error,
                    message,
                    raw_compiler_line: 0,
                });
            }
        }
    }

    log::debug!(
        "[Diagnostics] {} message(s) mapped for {}",
        diagnostics.len(),
        pass
    );
    diagnostics
}

/// Rewrite a compiler message into a short, capitalized, quote-free sentence
pub fn normalize_message(message: &str) -> String {
    let stripped = SEVERITY_PREFIX.replace(message.trim(), "");

    for (pattern, replacement) in REWRITES.iter() {
        if let Some(caps) = pattern.captures(&stripped) {
            let mut out = String::new();
            caps.expand(replacement, &mut out);
            return finish(&out.replace(['\'', '"'], ""));
        }
    }

    finish(&stripped)
}

fn finish(text: &str) -> String {
    let collapsed = WHITESPACE.replace_all(text.trim(), " ");
    let mut chars = collapsed.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// True if any diagnostic is an error (warnings alone do not fail a compile)
pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::assembler::assemble;
    use crate::compiler::preprocessor::LineMap;

    fn bare_unit(pass: PassName, start: usize, common: usize) -> AssembledUnit {
        AssembledUnit {
            pass,
            final_source: String::new(),
            expanded_code: String::new(),
            user_code_start_line: start,
            common_line_count: common,
            line_map: LineMap::new(),
        }
    }

    #[test]
    fn test_undeclared_identifier() {
        let unit = bare_unit(PassName::Image, 0, 0);
        let diags = map_diagnostics("ERROR: 0:2: 'foo' : undeclared identifier", PassName::Image, &unit);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].original_line, 2);
        assert_eq!(diags[0].severity, Severity::Error);
        assert!(diags[0].message.contains("Undeclared identifier"));
        assert!(diags[0].message.contains("foo"));
        assert!(!diags[0].message.contains('\''));
        assert!(!diags[0].message.contains('"'));
    }

    #[test]
    fn test_warning_severity() {
        let unit = bare_unit(PassName::BufferA, 0, 0);
        let diags = map_diagnostics("WARNING: 0:7: 'x' : unused variable", PassName::BufferA, &unit);
        assert_eq!(diags[0].severity, Severity::Warning);
        assert_eq!(diags[0].original_line, 7);
        assert!(!has_errors(&diags));
    }

    #[test]
    fn test_unlined_errors_are_emitted_once() {
        let unit = bare_unit(PassName::Image, 10, 0);
        let log = "Shader compilation failed\nShader compilation failed\nsome info text\n";
        let diags = map_diagnostics(log, PassName::Image, &unit);
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].original_line, 0);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn test_lines_are_clamped() {
        let unit = bare_unit(PassName::Image, 40, 0);
        let diags = map_diagnostics("ERROR: 0:3: 'x' : syntax error", PassName::Image, &unit);
        assert_eq!(diags[0].original_line, 1);
        assert_eq!(diags[0].raw_compiler_line, 3);
    }

    #[test]
    fn test_empty_common_never_reattributes() {
        let unit = assemble("", "float a;\nfloat b;\nfloat c;", PassName::BufferD).unwrap();
        assert_eq!(unit.common_line_count, 0);
        for offset in 0..6 {
            let log = format!("ERROR: 0:{}: 'x' : undeclared identifier", unit.user_code_start_line + offset);
            let diags = map_diagnostics(&log, PassName::BufferD, &unit);
            assert_eq!(diags[0].pass, PassName::BufferD);
        }
    }

    #[test]
    fn test_common_lines_reattributed_for_every_pass() {
        let common = "#define SCALE 2.0\nfloat helper(float x) {\n    return x * SCALE;\n}";
        for pass in PassName::RENDER_ORDER {
            let unit = assemble(common, "void mainImage(out vec4 c, vec2 p) { c = vec4(helper(1.0)); }", pass).unwrap();
            assert!(unit.common_line_count > 0);
            for line in 1..=unit.common_line_count {
                let log = format!("ERROR: 0:{}: 'y' : undeclared identifier", unit.user_code_start_line + line);
                let diags = map_diagnostics(&log, pass, &unit);
                assert_eq!(diags[0].pass, PassName::Common);
                assert!(diags[0].original_line >= 1);
            }
        }
    }

    #[test]
    fn test_pass_lines_mapped_through_preprocessor() {
        let common = "float a;\n#define Q 1.0";
        let code = "#ifdef MISSING\nnope\n#endif\nfloat b = Q;\nfloat c = 1.0 +;";
        let unit = assemble(common, code, PassName::Image).unwrap();
        // Expanded: "float a;" (common), "" (separator), "float b = 1.0;", "float c = 1.0 +;"
        let raw = unit.user_code_start_line + 4;
        let log = format!("ERROR: 0:{}: ';' : syntax error", raw);
        let diags = map_diagnostics(&log, PassName::Image, &unit);
        assert_eq!(diags[0].pass, PassName::Image);
        assert_eq!(diags[0].original_line, 5);
        assert_eq!(diags[0].message, "Syntax error near ;");

        let log = format!("ERROR: 0:{}: 'a' : redefinition", unit.user_code_start_line + 1);
        let diags = map_diagnostics(&log, PassName::Image, &unit);
        assert_eq!(diags[0].pass, PassName::Common);
        assert_eq!(diags[0].original_line, 1);
        assert_eq!(diags[0].message, "Redefinition of a");
    }

    #[test]
    fn test_normalization_rules() {
        assert_eq!(
            normalize_message("'assign' : cannot convert from 'const float' to 'highp 4-component vector of float'"),
            "Cannot convert from const float to highp 4-component vector of float"
        );
        assert_eq!(
            normalize_message("'texture' : no matching overloaded function found"),
            "No matching overload for function texture"
        );
        assert_eq!(
            normalize_message("'assign' :  l-value required \"uv\" (can't modify an input)"),
            "Invalid assignment target: assign"
        );
        assert_eq!(
            normalize_message("'w' : vector field selection out of range"),
            "Vector component out of range: w"
        );
        assert_eq!(
            normalize_message("'}' : syntax error, unexpected RIGHT_BRACE, expecting COMMA or SEMICOLON ';'"),
            "Missing semicolon near }"
        );
        assert_eq!(
            normalize_message("Unknown variable: colour"),
            "Undeclared identifier: colour"
        );
    }

    #[test]
    fn test_generic_cleanup() {
        assert_eq!(normalize_message("ERROR:   something   odd\thappened "), "Something odd happened");
        assert_eq!(normalize_message(""), "");
    }
}

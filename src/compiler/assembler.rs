//! Pass assembly: Common + pass source, preprocessed and wrapped in the scaffold

use once_cell::sync::Lazy;
use regex::Regex;

use crate::compiler::preprocessor::{line_count, preprocess, LineMap};
use crate::utils::{
    PassName, PreprocessorError, PreprocessorFailure, DEFAULT_PRECISIONS, PRECISION_PLACEHOLDER,
    SCAFFOLD_TEMPLATE, USER_CODE_PLACEHOLDER,
};

static VERSION_LINE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*#\s*version\b").unwrap());
static PRECISION_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*precision\s+(lowp|mediump|highp)\s+([A-Za-z_]\w*)\s*;\s*$").unwrap()
});

/// Separator placed between Common and the pass when they are preprocessed together
const COMMON_SEPARATOR: &str = "\n\n";

/// A pass ready for the external compiler, plus what is needed to map its
/// diagnostics back to the editor
#[derive(Debug, Clone)]
pub struct AssembledUnit {
    pub pass: PassName,
    /// Scaffold + expanded code, exactly as handed to the compiler
    pub final_source: String,
    /// Expanded Common + pass code, without scaffold
    pub expanded_code: String,
    /// Scaffold lines preceding the expanded code
    pub user_code_start_line: usize,
    /// Lines occupied by the expanded Common code (0 without Common)
    pub common_line_count: usize,
    /// Expanded line -> original line, relative to the pass the line is attributed to
    pub line_map: LineMap,
}

impl AssembledUnit {
    /// Attribute a 1-based line of `expanded_code` to a pass and an original line.
    ///
    /// Lines up to and including `common_line_count` belong to Common. Lines
    /// before the expanded code (scaffold header) are reported on line 1 of
    /// the compiled pass.
    pub fn resolve_expanded_line(&self, adjusted: isize) -> (PassName, usize) {
        if adjusted < 1 {
            return (self.pass, 1);
        }
        let adjusted = adjusted as usize;
        let has_common = self.pass != PassName::Common && self.common_line_count > 0;

        if has_common && adjusted <= self.common_line_count {
            let line = self.line_map.nearest_at_or_after(adjusted, 1).unwrap_or(adjusted);
            return (PassName::Common, line.max(1));
        }

        let (floor, fallback) = if has_common {
            let start = self.common_line_count + 1;
            (start, adjusted.saturating_sub(start))
        } else {
            (1, adjusted)
        };
        let line = self
            .line_map
            .nearest_at_or_after(adjusted, floor)
            .unwrap_or(fallback);
        (self.pass, line.max(1))
    }

    /// Attribute a 1-based line of `final_source`
    pub fn resolve_final_line(&self, raw_line: usize) -> (PassName, usize) {
        self.resolve_expanded_line(raw_line as isize - self.user_code_start_line as isize)
    }
}

fn strip_trailing_continuation(code: &str) -> &str {
    code.trim_end_matches([' ', '\t'])
        .strip_suffix('\\')
        .unwrap_or(code)
}

/// Combine Common and a pass's code, preprocess, and wrap in the scaffold
pub fn assemble(
    common: &str,
    user_code: &str,
    pass: PassName,
) -> Result<AssembledUnit, PreprocessorFailure> {
    // A continuation on Common's last line would swallow the separator
    let common = strip_trailing_continuation(common);
    let has_common = !common.trim().is_empty();
    let common_raw_lines = if has_common { line_count(common) } else { 0 };

    let combined = if has_common {
        format!("{}{}{}", common, COMMON_SEPARATOR, user_code)
    } else {
        user_code.to_string()
    };

    let result = preprocess(&combined);
    if !result.errors.is_empty() {
        return Err(attribute_errors(result.errors, common_raw_lines, pass));
    }

    // Map expanded lines to lines relative to the pass they came from
    let mut line_map = LineMap::new();
    for (output_line, input_line) in result.line_map.iter() {
        if !has_common || input_line <= common_raw_lines {
            line_map.insert(output_line, input_line);
        } else if input_line > common_raw_lines + 1 {
            line_map.insert(output_line, input_line - common_raw_lines - 1);
        }
    }

    // Only the count of the expanded Common matters downstream
    let common_line_count = if has_common {
        line_count(&preprocess(common).code)
    } else {
        0
    };

    let (expanded_code, precisions) = relocate_header_directives(&result.code);
    let header = precision_header(&precisions);
    let scaffold = SCAFFOLD_TEMPLATE.replace(PRECISION_PLACEHOLDER, &header);
    let (before, after) = scaffold
        .split_once(USER_CODE_PLACEHOLDER)
        .unwrap_or((scaffold.as_str(), ""));
    let user_code_start_line = before.matches('\n').count();

    let mut final_source =
        String::with_capacity(before.len() + expanded_code.len() + after.len());
    final_source.push_str(before);
    final_source.push_str(&expanded_code);
    final_source.push_str(after);

    log::debug!(
        "[Assembler] {} assembled: {} scaffold lines, {} common lines, {} total bytes",
        pass,
        user_code_start_line,
        common_line_count,
        final_source.len()
    );

    Ok(AssembledUnit {
        pass,
        final_source,
        expanded_code,
        user_code_start_line,
        common_line_count,
        line_map,
    })
}

/// Errors inside Common fail Common; anything else fails the pass, with lines
/// made relative to the pass's own code
fn attribute_errors(
    errors: Vec<PreprocessorError>,
    common_raw_lines: usize,
    pass: PassName,
) -> PreprocessorFailure {
    let (common_errors, pass_errors): (Vec<_>, Vec<_>) = errors
        .into_iter()
        .partition(|e| e.line >= 1 && e.line <= common_raw_lines);

    if !common_errors.is_empty() {
        log::warn!("[Assembler] Preprocessing failed in Common while assembling {}", pass);
        return PreprocessorFailure::new(PassName::Common, common_errors);
    }

    let offset = if common_raw_lines > 0 { common_raw_lines + 1 } else { 0 };
    let errors = pass_errors
        .into_iter()
        .map(|e| PreprocessorError {
            line: if e.line == 0 { 0 } else { e.line.saturating_sub(offset).max(1) },
            message: e.message,
        })
        .collect();
    log::warn!("[Assembler] Preprocessing failed in {}", pass);
    PreprocessorFailure::new(pass, errors)
}

/// Blank out user `#version` and `precision` lines, keeping line numbering.
/// Returns the cleaned code and the requested precision per type (last wins).
fn relocate_header_directives(code: &str) -> (String, Vec<(String, String)>) {
    let mut precisions: Vec<(String, String)> = Vec::new();
    let lines: Vec<&str> = code
        .split('\n')
        .map(|line| {
            if VERSION_LINE.is_match(line) {
                return "";
            }
            if let Some(caps) = PRECISION_LINE.captures(line) {
                let qualifier = caps[1].to_string();
                let ty = caps[2].to_string();
                match precisions.iter_mut().find(|(t, _)| *t == ty) {
                    Some(entry) => entry.1 = qualifier,
                    None => precisions.push((ty, qualifier)),
                }
                return "";
            }
            line
        })
        .collect();
    (lines.join("\n"), precisions)
}

fn precision_header(user: &[(String, String)]) -> String {
    let mut statements = Vec::new();
    for (ty, default_qualifier) in DEFAULT_PRECISIONS {
        let qualifier = user
            .iter()
            .find(|(t, _)| t == ty)
            .map_or(default_qualifier, |(_, q)| q.as_str());
        statements.push(format!("precision {} {};", qualifier, ty));
    }
    for (ty, qualifier) in user {
        if !DEFAULT_PRECISIONS.iter().any(|(t, _)| t == ty) {
            statements.push(format!("precision {} {};", qualifier, ty));
        }
    }
    statements.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    const IMAGE: &str = "void mainImage(out vec4 c, vec2 p){ float x = PI; c = vec4(x); }";

    #[test]
    fn test_assemble_without_common() {
        let unit = assemble("", "void mainImage(out vec4 c, vec2 p) { c = vec4(1.0); }", PassName::Image).unwrap();
        assert_eq!(unit.common_line_count, 0);
        assert_eq!(unit.final_source.matches("#version").count(), 1);

        let lines: Vec<&str> = unit.final_source.lines().collect();
        assert!(lines[unit.user_code_start_line].starts_with("void mainImage"));
        assert!(unit.final_source.trim_end().ends_with('}'));
        assert!(unit.final_source.contains("mainImage(fragColor, gl_FragCoord.xy);"));
    }

    #[test]
    fn test_common_macros_visible_to_pass() {
        let unit = assemble("#define PI 3.14159", IMAGE, PassName::Image).unwrap();
        assert!(unit.expanded_code.contains("3.14159"));
        assert!(!unit.expanded_code.contains("#define"));
        assert!(unit.common_line_count > 0);
    }

    #[test]
    fn test_common_error_attributed_to_common() {
        let err = assemble("float a;\n#ifdef X", IMAGE, PassName::BufferA).unwrap_err();
        assert_eq!(err.pass, PassName::Common);
        assert_eq!(err.errors[0].line, 2);
    }

    #[test]
    fn test_pass_error_relative_to_pass() {
        let err = assemble("float a;\nfloat b;", "float c;\n#endif", PassName::BufferB).unwrap_err();
        assert_eq!(err.pass, PassName::BufferB);
        assert_eq!(err.errors[0].line, 2);
    }

    #[test]
    fn test_precision_relocated_once() {
        let code = "precision mediump float;\nvoid mainImage(out vec4 c, vec2 p) { c = vec4(1.0); }";
        let unit = assemble("precision mediump float;", code, PassName::Image).unwrap();
        assert_eq!(unit.final_source.matches("precision mediump float;").count(), 1);
        assert!(!unit.final_source.contains("precision highp float;"));
        assert!(unit.final_source.contains("precision highp int;"));

        let header_end = unit.final_source.find("ShaderInputs").unwrap();
        assert!(unit.final_source.find("precision mediump float;").unwrap() < header_end);
        // Blanked, not removed
        assert_eq!(unit.expanded_code.lines().nth(2), Some(""));
    }

    #[test]
    fn test_user_version_dropped() {
        let code = "#version 300 es\nvoid mainImage(out vec4 c, vec2 p) { c = vec4(1.0); }";
        let unit = assemble("", code, PassName::Image).unwrap();
        assert_eq!(unit.final_source.matches("#version").count(), 1);
        assert!(unit.final_source.starts_with("#version 450"));
    }

    #[test]
    fn test_resolve_lines_across_common_seam() {
        let common = "float a;\nfloat b;";
        let code = "float c;\nfloat d;";
        let unit = assemble(common, code, PassName::Image).unwrap();
        assert_eq!(unit.common_line_count, 2);

        assert_eq!(unit.resolve_expanded_line(1), (PassName::Common, 1));
        assert_eq!(unit.resolve_expanded_line(2), (PassName::Common, 2));
        // Line 3 is the separator, line 4 is the pass's first line
        assert_eq!(unit.resolve_expanded_line(4), (PassName::Image, 1));
        assert_eq!(unit.resolve_expanded_line(5), (PassName::Image, 2));
        assert_eq!(unit.resolve_expanded_line(0), (PassName::Image, 1));
    }

    #[test]
    fn test_common_ending_in_continuation_keeps_seam() {
        let unit = assemble("#define X 1 \\", "float c = X;\nfloat d;", PassName::Image).unwrap();
        assert_eq!(unit.common_line_count, 1);
        assert!(unit.expanded_code.contains("float c = 1;"));
        assert_eq!(unit.resolve_expanded_line(2), (PassName::Image, 1));
        assert_eq!(unit.resolve_expanded_line(3), (PassName::Image, 2));
    }

    #[test]
    fn test_resolve_through_removed_directives() {
        let code = "#define K 2.0\n#ifdef NOPE\nskipped\n#endif\nfloat k = K;";
        let unit = assemble("", code, PassName::BufferC).unwrap();
        assert_eq!(unit.expanded_code, "float k = 2.0;");
        assert_eq!(unit.resolve_expanded_line(1), (PassName::BufferC, 5));
        let raw = unit.user_code_start_line + 1;
        assert_eq!(unit.resolve_final_line(raw), (PassName::BufferC, 5));
    }
}

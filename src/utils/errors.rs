use std::fmt;

use crate::compiler::diagnostics::{Diagnostic, Severity};
use crate::utils::PassName;

/// A structural problem found while preprocessing or validating a pass.
/// `line` is relative to the text handed to that step; 0 means "no line".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorError {
    pub line: usize,
    pub message: String,
}

impl PreprocessorError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            message: message.into(),
        }
    }
}

/// Preprocessing or entry-point validation failed for a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreprocessorFailure {
    pub pass: PassName,
    pub errors: Vec<PreprocessorError>,
}

impl PreprocessorFailure {
    pub fn new(pass: PassName, errors: Vec<PreprocessorError>) -> Self {
        Self { pass, errors }
    }

    pub fn single(pass: PassName, line: usize, message: impl Into<String>) -> Self {
        Self::new(pass, vec![PreprocessorError::new(line, message)])
    }

    /// Surface the failure as editor diagnostics
    pub fn to_diagnostics(&self) -> Vec<Diagnostic> {
        self.errors
            .iter()
            .map(|e| Diagnostic {
                original_line: e.line,
                pass: self.pass,
                severity: Severity::Error,
                message: e.message.clone(),
                raw_compiler_line: 0,
            })
            .collect()
    }
}

impl fmt::Display for PreprocessorFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.pass)?;
        for e in &self.errors {
            if e.line > 0 {
                write!(f, "\n  line {}: {}", e.line, e.message)?;
            } else {
                write!(f, "\n  {}", e.message)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for PreprocessorFailure {}

/// Errors surfaced by the compilation pipeline and thumbnail rendering
#[derive(Debug, Clone)]
pub enum ShaderError {
    /// Malformed directives or macro cycles
    Preprocessor(PreprocessorFailure),
    /// Entry point missing or malformed
    Validation(PreprocessorFailure),
    /// The external compiler rejected the assembled source
    Compilation {
        pass: PassName,
        diagnostics: Vec<Diagnostic>,
    },
    /// Rendering or capturing a frame failed
    Render(String),
    /// Reading or decoding a shader document or config failed
    Io(String),
}

impl fmt::Display for ShaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShaderError::Preprocessor(failure) => write!(f, "Preprocessor error {}", failure),
            ShaderError::Validation(failure) => write!(f, "Validation error {}", failure),
            ShaderError::Compilation { pass, diagnostics } => {
                write!(f, "Compilation error [{}]", pass)?;
                for d in diagnostics {
                    write!(f, "\n  {}", d)?;
                }
                Ok(())
            }
            ShaderError::Render(msg) => write!(f, "Render error: {}", msg),
            ShaderError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ShaderError {}

impl From<PreprocessorFailure> for ShaderError {
    fn from(failure: PreprocessorFailure) -> Self {
        ShaderError::Preprocessor(failure)
    }
}

/// Format a shader error for display in the editor's error panel
pub fn format_shader_error(err: &ShaderError) -> String {
    match err {
        ShaderError::Compilation { pass, diagnostics } if !diagnostics.is_empty() => {
            let mut out = format!("{} failed to compile:", pass);
            for d in diagnostics {
                out.push_str("\n  ");
                out.push_str(&d.to_string());
            }
            out
        }
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_to_diagnostics_keeps_pass_and_line() {
        let failure = PreprocessorFailure::single(PassName::Common, 3, "Unmatched #endif");
        let diags = failure.to_diagnostics();
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].pass, PassName::Common);
        assert_eq!(diags[0].original_line, 3);
        assert_eq!(diags[0].severity, Severity::Error);
    }

    #[test]
    fn test_format_preprocessor_error() {
        let err = ShaderError::from(PreprocessorFailure::single(PassName::Image, 0, "Missing entry point"));
        let text = format_shader_error(&err);
        assert!(text.contains("[Image]"));
        assert!(text.contains("Missing entry point"));
        assert!(!text.contains("line 0"));
    }
}

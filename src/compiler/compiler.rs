use crate::compiler::assembler::{assemble, AssembledUnit};
use crate::compiler::diagnostics::{has_errors, map_diagnostics, Diagnostic, Severity};
use crate::compiler::oracle::CompileOracle;
use crate::utils::{
    catch_panic_mut, common_code, format_panic_message, format_shader_error, validate_entry_point,
    PassName, PassSource, PreprocessorError, PreprocessorFailure, ShaderError,
};

/// Where a compile attempt currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileStage {
    Idle,
    Preprocessing,
    Assembled,
    Validating,
    ExternallyCompiling,
    Succeeded,
    Failed,
}

/// A pass the external compiler accepted
#[derive(Debug, Clone)]
pub struct CompiledPass {
    pub pass: PassName,
    pub unit: AssembledUnit,
    /// Remapped warnings from the compiler's info log
    pub warnings: Vec<Diagnostic>,
}

/// Handles one compile attempt per pass: preprocess, assemble, validate,
/// hand to the oracle, remap what comes back
pub struct ShaderCompiler<O: CompileOracle> {
    oracle: O,
    stage: CompileStage,
}

impl<O: CompileOracle> ShaderCompiler<O> {
    /// Create a new shader compiler around an external compiler
    pub fn new(oracle: O) -> Self {
        Self {
            oracle,
            stage: CompileStage::Idle,
        }
    }

    /// Stage reached by the most recent attempt
    pub fn stage(&self) -> CompileStage {
        self.stage
    }

    pub fn oracle_mut(&mut self) -> &mut O {
        &mut self.oracle
    }

    pub fn into_inner(self) -> O {
        self.oracle
    }

    /// Compile a single pass against the given Common code
    pub fn compile_pass(
        &mut self,
        common: &str,
        source: &PassSource,
    ) -> Result<CompiledPass, CompilationResult> {
        let pass = source.name;
        let result = self.run_stages(common, source);
        self.stage = if result.is_ok() {
            CompileStage::Succeeded
        } else {
            CompileStage::Failed
        };
        match &result {
            Ok(compiled) => log::info!(
                "[ShaderCompiler] {} compiled successfully ({} warning(s))",
                pass,
                compiled.warnings.len()
            ),
            Err(failure) => log::error!(
                "[ShaderCompiler] {} failed: {}",
                pass,
                format_shader_error(&failure.to_shader_error())
            ),
        }
        result
    }

    fn run_stages(
        &mut self,
        common: &str,
        source: &PassSource,
    ) -> Result<CompiledPass, CompilationResult> {
        let pass = source.name;

        self.stage = CompileStage::Preprocessing;
        let unit =
            assemble(common, &source.code, pass).map_err(CompilationResult::PreprocessorError)?;
        self.stage = CompileStage::Assembled;

        self.stage = CompileStage::Validating;
        if let Err(failure) = validate_entry_point(&unit.expanded_code, pass) {
            return Err(CompilationResult::ValidationError(remap_validation(&unit, failure)));
        }

        self.stage = CompileStage::ExternallyCompiling;
        log::debug!(
            "[ShaderCompiler] Handing {} to the external compiler ({} bytes)",
            pass,
            unit.final_source.len()
        );
        let oracle = &mut self.oracle;
        let outcome = catch_panic_mut(|| oracle.compile(pass, &unit.final_source));

        let diagnostics = match outcome {
            Ok(Ok(info_log)) => {
                let diagnostics = map_diagnostics(&info_log, pass, &unit);
                if !has_errors(&diagnostics) {
                    return Ok(CompiledPass {
                        pass,
                        unit,
                        warnings: diagnostics,
                    });
                }
                diagnostics
            }
            Ok(Err(error_log)) => {
                let mut diagnostics = map_diagnostics(&error_log, pass, &unit);
                if !has_errors(&diagnostics) {
                    diagnostics.push(line_less_error(pass, "Shader compilation failed"));
                }
                diagnostics
            }
            Err(panic_msg) => {
                log::error!("[ShaderCompiler] External compiler panicked on {}: {}", pass, panic_msg);
                vec![line_less_error(pass, format_panic_message(&panic_msg))]
            }
        };

        Err(CompilationResult::CompilationError { pass, diagnostics })
    }

    /// Compile every pass with code (Image always) in render order
    pub fn compile_all(&mut self, passes: &[PassSource]) -> CompileReport {
        let common = common_code(passes);
        let mut report = CompileReport::default();

        for name in PassName::RENDER_ORDER {
            let source = match passes.iter().find(|p| p.name == name) {
                Some(source) if name == PassName::Image || source.has_code() => source.clone(),
                None if name == PassName::Image => PassSource::new(PassName::Image, ""),
                _ => continue,
            };

            match self.compile_pass(common, &source) {
                Ok(compiled) => report.compiled.push(compiled),
                Err(failure) => {
                    // A broken Common fails every pass the same way
                    if !report.failures.contains(&failure) {
                        report.failures.push(failure);
                    }
                }
            }
        }

        log::info!(
            "[ShaderCompiler] Compiled {} pass(es), {} failure(s)",
            report.compiled.len(),
            report.failures.len()
        );
        report
    }
}

/// Validator lines refer to the expanded Common + pass text
fn remap_validation(unit: &AssembledUnit, failure: PreprocessorFailure) -> PreprocessorFailure {
    let mut attributed = failure.pass;
    let errors = failure
        .errors
        .into_iter()
        .map(|e| {
            if e.line == 0 {
                return e;
            }
            let (pass, line) = unit.resolve_expanded_line(e.line as isize);
            attributed = pass;
            PreprocessorError::new(line, e.message)
        })
        .collect();
    PreprocessorFailure::new(attributed, errors)
}

fn line_less_error(pass: PassName, message: impl Into<String>) -> Diagnostic {
    Diagnostic {
        original_line: 0,
        pass,
        severity: Severity::Error,
        message: message.into(),
        raw_compiler_line: 0,
    }
}

/// Result of a failed compile attempt
#[derive(Debug, Clone, PartialEq)]
pub enum CompilationResult {
    /// Malformed directives, macro recursion, unterminated blocks
    PreprocessorError(PreprocessorFailure),

    /// Entry point missing or with the wrong signature
    ValidationError(PreprocessorFailure),

    /// The external compiler rejected the assembled source
    CompilationError {
        pass: PassName,
        diagnostics: Vec<Diagnostic>,
    },
}

impl CompilationResult {
    /// Pass the failure is attributed to
    pub fn pass(&self) -> PassName {
        match self {
            CompilationResult::PreprocessorError(f) | CompilationResult::ValidationError(f) => {
                f.pass
            }
            CompilationResult::CompilationError { pass, .. } => *pass,
        }
    }

    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            CompilationResult::PreprocessorError(f) | CompilationResult::ValidationError(f) => {
                f.to_diagnostics()
            }
            CompilationResult::CompilationError { diagnostics, .. } => diagnostics.clone(),
        }
    }

    pub fn to_shader_error(&self) -> ShaderError {
        match self {
            CompilationResult::PreprocessorError(f) => ShaderError::Preprocessor(f.clone()),
            CompilationResult::ValidationError(f) => ShaderError::Validation(f.clone()),
            CompilationResult::CompilationError { pass, diagnostics } => ShaderError::Compilation {
                pass: *pass,
                diagnostics: diagnostics.clone(),
            },
        }
    }
}

/// Outcome of compiling a whole shader
#[derive(Debug, Clone, Default)]
pub struct CompileReport {
    pub compiled: Vec<CompiledPass>,
    pub failures: Vec<CompilationResult>,
}

impl CompileReport {
    /// False if any error diagnostic exists; warnings alone still succeed
    pub fn is_success(&self) -> bool {
        !has_errors(&self.diagnostics())
    }

    /// Every diagnostic across passes, duplicates removed
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        let mut all: Vec<Diagnostic> = Vec::new();
        let from_failures = self.failures.iter().flat_map(|f| f.diagnostics());
        let from_warnings = self.compiled.iter().flat_map(|c| c.warnings.iter().cloned());
        for d in from_failures.chain(from_warnings) {
            let seen = all.iter().any(|e| {
                e.pass == d.pass
                    && e.original_line == d.original_line
                    && e.severity == d.severity
                    && e.message == d.message
            });
            if !seen {
                all.push(d);
            }
        }
        all
    }

    /// Diagnostics attributed to one pass (Common included)
    pub fn diagnostics_for(&self, pass: PassName) -> Vec<Diagnostic> {
        self.diagnostics().into_iter().filter(|d| d.pass == pass).collect()
    }

    pub fn compiled_pass(&self, pass: PassName) -> Option<&CompiledPass> {
        self.compiled.iter().find(|c| c.pass == pass)
    }
}

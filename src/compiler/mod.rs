pub mod assembler;
#[allow(clippy::module_inception)]
pub mod compiler;
pub mod diagnostics;
pub mod expression;
pub mod oracle;
pub mod preprocessor;

pub use assembler::{assemble, AssembledUnit};
pub use compiler::{CompilationResult, CompileReport, CompileStage, CompiledPass, ShaderCompiler};
pub use diagnostics::{has_errors, map_diagnostics, normalize_message, Diagnostic, Severity};
pub use oracle::{CompileOracle, NagaOracle};
pub use preprocessor::{preprocess, LineMap, PreprocessResult, Preprocessor};

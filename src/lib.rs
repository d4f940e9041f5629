//! Multipass shader compilation pipeline
//!
//! Turns the passes of a multipass fragment shader (Image, Buffer A-D and a
//! shared Common pass) into compilable units: directives are expanded with a
//! line map kept alongside, each pass is wrapped in the uniform scaffold, the
//! entry point is checked, and compiler logs are mapped back to the pass and
//! line the user wrote. Thumbnails are rendered through a bounded queue that
//! shares one rendering context.

pub mod compiler;
pub mod thumbnail;
pub mod utils;

pub use compiler::{
    assemble, preprocess, CompilationResult, CompileOracle, CompileReport, Diagnostic,
    NagaOracle, Severity, ShaderCompiler,
};
pub use thumbnail::{RenderContext, ThumbnailQueue};
pub use utils::{PassName, PassSource, PipelineConfig, ShaderError, ShaderJson};

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "webshard_pipeline",
    version,
    about = "Preprocess, assemble and check multipass fragment shaders"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Command,

    /// Pipeline configuration JSON (thumbnail settings)
    #[arg(long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Compile every pass of a shader document and report diagnostics
    Check {
        /// Shader document (JSON with image/common/buffer_a..d)
        shader: String,

        /// Print diagnostics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Run the preprocessor over a single source file
    Preprocess {
        /// GLSL source file
        file: String,

        /// Also print the output -> input line map
        #[arg(long)]
        line_map: bool,
    },
    /// Print the exact source handed to the compiler for one pass
    Assemble {
        /// Shader document (JSON)
        shader: String,

        /// Pass to assemble (Image, "Buffer A", buffer_b, ...)
        #[arg(long, default_value = "Image")]
        pass: String,
    },
    /// Print the effective pipeline configuration
    Config,
}

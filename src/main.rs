use std::process::ExitCode;

use clap::Parser;

use webshard_pipeline::compiler::{assemble, preprocess, NagaOracle, ShaderCompiler};
use webshard_pipeline::utils::{
    common_code, format_shader_error, PassName, PipelineConfig, ShaderError, ShaderJson,
};

mod cli;

use cli::{CliArgs, Command};

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let args = CliArgs::parse();
    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("{}", format_shader_error(&e));
            ExitCode::FAILURE
        }
    }
}

fn run(args: CliArgs) -> Result<ExitCode, ShaderError> {
    let config = match &args.config {
        Some(path) => PipelineConfig::from_json_file(path)?,
        None => PipelineConfig::default(),
    };

    match args.command {
        Command::Check { shader, json } => {
            let document = ShaderJson::from_file(&shader)?;
            let passes = document.to_pass_sources();
            let mut compiler = ShaderCompiler::new(NagaOracle::new());
            let report = compiler.compile_all(&passes);
            let diagnostics = report.diagnostics();

            if json {
                let out = serde_json::to_string_pretty(&diagnostics)
                    .map_err(|e| ShaderError::Io(e.to_string()))?;
                println!("{}", out);
            } else {
                for d in &diagnostics {
                    println!("{}", d);
                }
                if report.is_success() {
                    println!("{}: {} pass(es) compiled", shader, report.compiled.len());
                }
            }

            Ok(if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::Preprocess { file, line_map } => {
            let source = std::fs::read_to_string(&file)
                .map_err(|e| ShaderError::Io(format!("Failed to read {}: {}", file, e)))?;
            let result = preprocess(&source);

            for e in &result.errors {
                eprintln!("{}:{}: {}", file, e.line, e.message);
            }
            if !result.is_ok() {
                return Ok(ExitCode::FAILURE);
            }

            println!("{}", result.code);
            if line_map {
                for (output, input) in result.line_map.iter() {
                    eprintln!("{} -> {}", output, input);
                }
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Assemble { shader, pass } => {
            let pass_name = PassName::parse(&pass)
                .filter(|p| *p != PassName::Common)
                .ok_or_else(|| ShaderError::Io(format!("Unknown pass '{}'", pass)))?;
            let passes = ShaderJson::from_file(&shader)?.to_pass_sources();
            let code = passes
                .iter()
                .find(|p| p.name == pass_name)
                .map(|p| p.code.as_str())
                .ok_or_else(|| ShaderError::Io(format!("{} has no {} pass", shader, pass_name)))?;

            let unit = assemble(common_code(&passes), code, pass_name)?;
            print!("{}", unit.final_source);
            Ok(ExitCode::SUCCESS)
        }
        Command::Config => {
            let out = serde_json::to_string_pretty(&config)
                .map_err(|e| ShaderError::Io(e.to_string()))?;
            println!("{}", out);
            Ok(ExitCode::SUCCESS)
        }
    }
}

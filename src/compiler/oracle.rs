//! External compiler seam
//!
//! The pipeline never type-checks shader code itself. A [`CompileOracle`]
//! receives the assembled source and answers with the compiler's raw log in
//! the `SEVERITY: <file>:<line>: <message>` convention.

use crate::utils::PassName;

/// Something that can compile an assembled pass
pub trait CompileOracle {
    /// Compile `source` for `pass`.
    ///
    /// `Ok` carries the info log (may hold warnings, may be empty).
    /// `Err` carries the raw error log.
    fn compile(&mut self, pass: PassName, source: &str) -> Result<String, String>;
}

impl<O: CompileOracle + ?Sized> CompileOracle for &mut O {
    fn compile(&mut self, pass: PassName, source: &str) -> Result<String, String> {
        (**self).compile(pass, source)
    }
}

impl<O: CompileOracle + ?Sized> CompileOracle for Box<O> {
    fn compile(&mut self, pass: PassName, source: &str) -> Result<String, String> {
        (**self).compile(pass, source)
    }
}

/// Reference oracle backed by naga's GLSL front-end and validator
#[derive(Default)]
pub struct NagaOracle {
    frontend: naga::front::glsl::Frontend,
}

impl NagaOracle {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompileOracle for NagaOracle {
    fn compile(&mut self, pass: PassName, source: &str) -> Result<String, String> {
        log::debug!("[NagaOracle] Parsing {} ({} bytes)", pass, source.len());

        let options = naga::front::glsl::Options {
            stage: naga::ShaderStage::Fragment,
            defines: Default::default(),
        };
        let module = self.frontend.parse(&options, source).map_err(|parse_errors| {
            parse_errors
                .errors
                .iter()
                .map(|e| log_entry(source, e.meta, &e.kind.to_string()))
                .collect::<Vec<_>>()
                .join("\n")
        })?;

        let mut validator = naga::valid::Validator::new(
            naga::valid::ValidationFlags::all(),
            naga::valid::Capabilities::all(),
        );
        if let Err(err) = validator.validate(&module) {
            let span = err
                .spans()
                .next()
                .map(|(span, _)| *span)
                .unwrap_or_default();
            return Err(log_entry(source, span, &err.as_inner().to_string()));
        }

        log::debug!("[NagaOracle] {} passed validation", pass);
        Ok(String::new())
    }
}

fn log_entry(source: &str, span: naga::Span, message: &str) -> String {
    let message = message.replace('\n', " ");
    if span.is_defined() {
        format!("ERROR: 0:{}: {}", span.location(source).line_number, message)
    } else {
        format!("ERROR: {}", message)
    }
}

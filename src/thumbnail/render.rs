use crate::compiler::{CompileOracle, ShaderCompiler};
use crate::utils::{
    encode_data_url, format_shader_error, CapturedFrame, PassSource, ShaderError,
    ShaderUniforms, ThumbnailConfig,
};

/// An offscreen rendering context able to run a compiled shader
///
/// The context receives each assembled pass through [`CompileOracle`], keeps
/// whatever it built, and draws them on `render_frame`. Contexts are scarce
/// (a GPU/GL context each) so the thumbnail queue shares exactly one.
pub trait RenderContext: CompileOracle {
    /// Draw one frame with every pass compiled since the last reset
    fn render_frame(&mut self, uniforms: &ShaderUniforms) -> Result<(), String>;

    /// Read back the Image pass output of the last frame
    fn capture(&mut self) -> Result<CapturedFrame, String>;

    /// Drop pipelines from a previous job
    fn reset(&mut self) {}
}

/// Compile, draw and capture one still frame, returning it as a data URL
pub fn render_thumbnail<C: RenderContext + ?Sized>(
    context: &mut C,
    passes: &[PassSource],
    config: &ThumbnailConfig,
) -> Result<String, ShaderError> {
    context.reset();

    let report = ShaderCompiler::new(&mut *context).compile_all(passes);
    if let Some(failure) = report.failures.first() {
        let err = failure.to_shader_error();
        log::warn!("[Thumbnail] Compilation failed: {}", format_shader_error(&err));
        return Err(err);
    }

    let uniforms = ShaderUniforms::at_time(config.width, config.height, config.time);
    context.render_frame(&uniforms).map_err(ShaderError::Render)?;
    let frame = context.capture().map_err(ShaderError::Render)?;

    encode_data_url(&frame, config.format)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::PassName;

    struct FlatContext {
        compiled: Vec<PassName>,
        size: (u32, u32),
    }

    impl CompileOracle for FlatContext {
        fn compile(&mut self, pass: PassName, source: &str) -> Result<String, String> {
            if source.contains("undefinedThing") {
                return Err("ERROR: 0:1: 'undefinedThing' : undeclared identifier".to_string());
            }
            self.compiled.push(pass);
            Ok(String::new())
        }
    }

    impl RenderContext for FlatContext {
        fn render_frame(&mut self, uniforms: &ShaderUniforms) -> Result<(), String> {
            self.size = (uniforms.resolution[0] as u32, uniforms.resolution[1] as u32);
            Ok(())
        }

        fn capture(&mut self) -> Result<CapturedFrame, String> {
            Ok(CapturedFrame::solid(self.size.0, self.size.1, [0, 0, 255, 255]))
        }

        fn reset(&mut self) {
            self.compiled.clear();
        }
    }

    const IMAGE: &str = "void mainImage(out vec4 c, in vec2 p) { c = vec4(0.0, 0.0, 1.0, 1.0); }";

    #[test]
    fn test_render_thumbnail_produces_png() {
        let mut ctx = FlatContext { compiled: Vec::new(), size: (0, 0) };
        let passes = vec![
            PassSource::new(PassName::BufferA, IMAGE),
            PassSource::new(PassName::Image, IMAGE),
        ];
        let url = render_thumbnail(&mut ctx, &passes, &ThumbnailConfig::default()).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));
        assert_eq!(ctx.compiled, vec![PassName::BufferA, PassName::Image]);
        assert_eq!(ctx.size, (320, 180));
    }

    #[test]
    fn test_compile_failure_is_reported() {
        let mut ctx = FlatContext { compiled: Vec::new(), size: (0, 0) };
        let code = "void mainImage(out vec4 c, in vec2 p) { c = undefinedThing; }";
        let err = render_thumbnail(
            &mut ctx,
            &[PassSource::new(PassName::Image, code)],
            &ThumbnailConfig::default(),
        )
        .unwrap_err();
        assert!(matches!(err, ShaderError::Compilation { .. }));
    }
}

//! Centralized shader constants and scaffold code
//!
//! All scaffold-related constants are defined here once so the assembler,
//! the validator and the uniform layout agree on them.

/// Name of the function every pass must define
pub const ENTRY_POINT_NAME: &str = "mainImage";

/// The exact signature quoted back to the user when the entry point is wrong
pub const ENTRY_POINT_SIGNATURE: &str = "void mainImage(out vec4 fragColor, in vec2 fragCoord)";

/// Upper bound on nested macro expansion per top-level invocation
pub const MAX_EXPANSION_DEPTH: usize = 64;

/// Version directive owned by the scaffold. User `#version` lines are dropped.
pub const SCAFFOLD_VERSION: &str = "#version 450";

/// Precision statements emitted when the user does not declare their own
pub const DEFAULT_PRECISIONS: [(&str, &str); 2] = [("float", "highp"), ("int", "highp")];

/// Replaced by the precision statements (one per line)
pub const PRECISION_PLACEHOLDER: &str = "{{PRECISION}}";

/// Replaced by the preprocessed Common + pass code
pub const USER_CODE_PLACEHOLDER: &str = "{{USER_CODE}}";

/// Scaffold wrapped around every pass before it is handed to the compiler
///
/// Includes:
/// - Uniform block matching `ShaderUniforms` (std140)
/// - iChannel0-3 sampling inputs
/// - Output binding and a `main` that calls the entry point
pub const SCAFFOLD_TEMPLATE: &str = r#"#version 450
{{PRECISION}}

// Auto-injected uniforms (available in all passes)
layout(set = 0, binding = 0) uniform ShaderInputs {
    vec3 iResolution;
    float iTime;
    float iTimeDelta;
    int iFrame;
    vec4 iMouse;
    vec4 iDate;
};

// Sampling inputs (iChannel0-3)
layout(set = 1, binding = 0) uniform texture2D _iChannel0Texture;
layout(set = 1, binding = 1) uniform sampler _iChannel0Sampler;
layout(set = 1, binding = 2) uniform texture2D _iChannel1Texture;
layout(set = 1, binding = 3) uniform sampler _iChannel1Sampler;
layout(set = 1, binding = 4) uniform texture2D _iChannel2Texture;
layout(set = 1, binding = 5) uniform sampler _iChannel2Sampler;
layout(set = 1, binding = 6) uniform texture2D _iChannel3Texture;
layout(set = 1, binding = 7) uniform sampler _iChannel3Sampler;
#define iChannel0 sampler2D(_iChannel0Texture, _iChannel0Sampler)
#define iChannel1 sampler2D(_iChannel1Texture, _iChannel1Sampler)
#define iChannel2 sampler2D(_iChannel2Texture, _iChannel2Sampler)
#define iChannel3 sampler2D(_iChannel3Texture, _iChannel3Sampler)

layout(location = 0) out vec4 fragColor;

{{USER_CODE}}

void main() {
    mainImage(fragColor, gl_FragCoord.xy);
}
"#;

/// Default thumbnail size (width, height)
pub const DEFAULT_THUMBNAIL_SIZE: [u32; 2] = [320, 180];

/// Logical time (seconds) at which thumbnails are rendered
pub const DEFAULT_THUMBNAIL_TIME: f32 = 1.0;

/// Pause between two drained thumbnail requests
pub const DEFAULT_DRAIN_DELAY_MS: u64 = 50;

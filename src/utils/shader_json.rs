use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::{PassName, PassSource, ShaderError};

/// JSON shader document for editor imports/exports
/// Supports both plain text and base64-encoded pass code
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShaderJson {
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<String>,

    /// Encoding format: "plain" or "base64" (default: "plain")
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Image pass - required
    #[serde(alias = "fragment")]
    pub image: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub common: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_a: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_b: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_c: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub buffer_d: Option<String>,
}

fn default_version() -> String {
    "1.0".to_string()
}

fn default_encoding() -> String {
    "plain".to_string()
}

impl ShaderJson {
    /// Parse JSON shader from string and decode if needed
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        let mut shader: Self = serde_json::from_str(json_str)?;

        if shader.encoding == "base64" {
            shader.image = decode_base64(&shader.image).unwrap_or(shader.image);
            for code in shader.optional_passes_mut() {
                if let Some(encoded) = code.take() {
                    *code = Some(decode_base64(&encoded).unwrap_or(encoded));
                }
            }
            shader.encoding = default_encoding();
        }

        Ok(shader)
    }

    /// Read and parse a shader document from disk
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        log::info!("[ShaderJson] Loading shader from: {}", path.display());
        let text = std::fs::read_to_string(path)
            .map_err(|e| ShaderError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_json(&text)
            .map_err(|e| ShaderError::Io(format!("Invalid shader JSON in {}: {}", path.display(), e)))
    }

    /// Build a document from an editor snapshot
    pub fn from_pass_sources(passes: &[PassSource]) -> Self {
        let mut shader = Self {
            version: default_version(),
            encoding: default_encoding(),
            exported_at: Some(chrono::Local::now().to_rfc3339()),
            ..Default::default()
        };
        for pass in passes {
            let code = Some(pass.code.clone());
            match pass.name {
                PassName::Image => shader.image = pass.code.clone(),
                PassName::Common => shader.common = code,
                PassName::BufferA => shader.buffer_a = code,
                PassName::BufferB => shader.buffer_b = code,
                PassName::BufferC => shader.buffer_c = code,
                PassName::BufferD => shader.buffer_d = code,
            }
        }
        shader
    }

    /// Serialize, base64-encoding every pass when `encode` is set
    pub fn to_json(&self, encode: bool) -> Result<String, serde_json::Error> {
        let mut out = self.clone();
        if encode {
            out.encoding = "base64".to_string();
            out.image = Self::encode_to_base64(&out.image);
            for code in out.optional_passes_mut().into_iter().flatten() {
                *code = Self::encode_to_base64(code);
            }
        }
        serde_json::to_string_pretty(&out)
    }

    /// Encode shader code to base64 for safe JSON storage
    pub fn encode_to_base64(code: &str) -> String {
        base64::Engine::encode(&base64::engine::general_purpose::STANDARD, code.as_bytes())
    }

    /// Pass snapshot for the compiler, Image first, absent passes omitted
    pub fn to_pass_sources(&self) -> Vec<PassSource> {
        let mut passes = vec![PassSource::new(PassName::Image, self.image.clone())];
        let optional = [
            (PassName::Common, &self.common),
            (PassName::BufferA, &self.buffer_a),
            (PassName::BufferB, &self.buffer_b),
            (PassName::BufferC, &self.buffer_c),
            (PassName::BufferD, &self.buffer_d),
        ];
        for (name, code) in optional {
            if let Some(code) = code {
                passes.push(PassSource::new(name, code.clone()));
            }
        }
        passes
    }

    fn optional_passes_mut(&mut self) -> [&mut Option<String>; 5] {
        [
            &mut self.common,
            &mut self.buffer_a,
            &mut self.buffer_b,
            &mut self.buffer_c,
            &mut self.buffer_d,
        ]
    }
}

/// Decode base64 string to UTF-8 text
fn decode_base64(encoded: &str) -> Option<String> {
    use base64::Engine;
    base64::engine::general_purpose::STANDARD
        .decode(encoded.as_bytes())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_shader() {
        let json = r#"{
            "version": "1.0",
            "image": "void mainImage(out vec4 c, in vec2 p) { c = vec4(1.0); }"
        }"#;

        let shader = ShaderJson::from_json(json).unwrap();
        let passes = shader.to_pass_sources();

        assert_eq!(passes.len(), 1);
        assert_eq!(passes[0].name, PassName::Image);
        assert!(passes[0].code.contains("mainImage"));
    }

    #[test]
    fn test_multipass_shader() {
        let json = r#"{
            "fragment": "Image code",
            "common": "Common code",
            "buffer_a": "BufferA code"
        }"#;

        let shader = ShaderJson::from_json(json).unwrap();
        let passes = shader.to_pass_sources();

        assert_eq!(passes.len(), 3);
        assert_eq!(passes[0].code, "Image code");
        assert!(passes.iter().any(|p| p.name == PassName::Common && p.code == "Common code"));
        assert!(passes.iter().any(|p| p.name == PassName::BufferA));
    }

    #[test]
    fn test_base64_document() {
        let json = format!(
            r#"{{"encoding": "base64", "image": "{}", "buffer_b": "{}"}}"#,
            ShaderJson::encode_to_base64("#define A 1\nfloat a = A;"),
            ShaderJson::encode_to_base64("float b;")
        );
        let shader = ShaderJson::from_json(&json).unwrap();
        assert_eq!(shader.image, "#define A 1\nfloat a = A;");
        assert_eq!(shader.buffer_b.as_deref(), Some("float b;"));
    }

    #[test]
    fn test_export_from_snapshot() {
        let passes = vec![
            PassSource::new(PassName::Image, "image"),
            PassSource::new(PassName::BufferD, "d"),
        ];
        let json = ShaderJson::from_pass_sources(&passes).to_json(true).unwrap();
        assert!(json.contains("\"base64\""));
        assert!(!json.contains("\"image\": \"image\""));

        let reloaded = ShaderJson::from_json(&json).unwrap();
        assert_eq!(reloaded.image, "image");
        assert_eq!(reloaded.buffer_d.as_deref(), Some("d"));
        assert!(reloaded.common.is_none());
    }

    #[test]
    fn test_missing_image_is_rejected() {
        assert!(ShaderJson::from_json(r#"{"buffer_a": "x"}"#).is_err());
    }
}

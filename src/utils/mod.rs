pub mod config;
pub mod errors;
pub mod image_capture;
pub mod panic_handler;
pub mod pass;
pub mod shader_constants;
pub mod shader_json;
pub mod shader_validator;
pub mod uniforms;

pub use config::{PipelineConfig, ThumbnailConfig, ThumbnailFormat};
pub use errors::{format_shader_error, PreprocessorError, PreprocessorFailure, ShaderError};
pub use image_capture::{encode_data_url, CapturedFrame};
pub use panic_handler::{catch_panic_mut, format_panic_message};
pub use pass::{common_code, PassName, PassSource};
pub use shader_constants::*;
pub use shader_json::ShaderJson;
pub use shader_validator::validate_entry_point;
pub use uniforms::ShaderUniforms;

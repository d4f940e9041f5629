use std::io::Cursor;

use base64::Engine;
use image::{DynamicImage, RgbaImage};

use crate::utils::{ShaderError, ThumbnailFormat};

/// Pixels read back from a render context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedFrame {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8, row-major, top row first
    pub rgba: Vec<u8>,
}

impl CapturedFrame {
    pub fn new(width: u32, height: u32, rgba: Vec<u8>) -> Self {
        Self { width, height, rgba }
    }

    /// A frame filled with one color
    pub fn solid(width: u32, height: u32, color: [u8; 4]) -> Self {
        let rgba = color
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self::new(width, height, rgba)
    }
}

/// Encode a captured frame as a `data:` URL
pub fn encode_data_url(frame: &CapturedFrame, format: ThumbnailFormat) -> Result<String, ShaderError> {
    let expected = frame.width as usize * frame.height as usize * 4;
    if frame.width == 0 || frame.height == 0 || frame.rgba.len() != expected {
        return Err(ShaderError::Render(format!(
            "Captured frame is {}x{} but holds {} bytes (expected {})",
            frame.width,
            frame.height,
            frame.rgba.len(),
            expected
        )));
    }

    let img = RgbaImage::from_raw(frame.width, frame.height, frame.rgba.clone())
        .ok_or_else(|| ShaderError::Render("Captured frame buffer too small".to_string()))?;

    // JPEG carries no alpha channel
    let (image, image_format) = match format {
        ThumbnailFormat::Png => (DynamicImage::ImageRgba8(img), image::ImageFormat::Png),
        ThumbnailFormat::Jpeg => (
            DynamicImage::ImageRgb8(DynamicImage::ImageRgba8(img).to_rgb8()),
            image::ImageFormat::Jpeg,
        ),
    };

    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), image_format)
        .map_err(|e| ShaderError::Render(format!("Failed to encode thumbnail: {}", e)))?;

    log::debug!(
        "[ImageCapture] Encoded {}x{} frame as {} ({} bytes)",
        frame.width,
        frame.height,
        format.mime_type(),
        bytes.len()
    );

    Ok(format!(
        "data:{};base64,{}",
        format.mime_type(),
        base64::engine::general_purpose::STANDARD.encode(&bytes)
    ))
}

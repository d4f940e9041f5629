use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::utils::{
    ShaderError, DEFAULT_DRAIN_DELAY_MS, DEFAULT_THUMBNAIL_SIZE, DEFAULT_THUMBNAIL_TIME,
};

/// Image container for encoded thumbnails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThumbnailFormat {
    #[default]
    Png,
    Jpeg,
}

impl ThumbnailFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            ThumbnailFormat::Png => "image/png",
            ThumbnailFormat::Jpeg => "image/jpeg",
        }
    }
}

/// Thumbnail queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThumbnailConfig {
    pub width: u32,
    pub height: u32,
    /// Logical time (seconds) of the captured frame
    pub time: f32,
    pub format: ThumbnailFormat,
    /// Pause between drained jobs so the shared context is not saturated
    pub drain_delay_ms: u64,
    /// Resolve a job as failed if it has not answered within this bound
    pub render_timeout_ms: Option<u64>,
    /// Attach repeat requests for an unresolved key to the pending job
    pub coalesce_duplicates: bool,
}

impl Default for ThumbnailConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_THUMBNAIL_SIZE[0],
            height: DEFAULT_THUMBNAIL_SIZE[1],
            time: DEFAULT_THUMBNAIL_TIME,
            format: ThumbnailFormat::Png,
            drain_delay_ms: DEFAULT_DRAIN_DELAY_MS,
            render_timeout_ms: None,
            coalesce_duplicates: false,
        }
    }
}

impl ThumbnailConfig {
    pub fn drain_delay(&self) -> Duration {
        Duration::from_millis(self.drain_delay_ms)
    }

    pub fn render_timeout(&self) -> Option<Duration> {
        self.render_timeout_ms.map(Duration::from_millis)
    }
}

/// Top-level pipeline configuration, loaded from JSON
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub thumbnail: ThumbnailConfig,
}

impl PipelineConfig {
    pub fn from_json(json_str: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json_str)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| ShaderError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        let config = Self::from_json(&text)
            .map_err(|e| ShaderError::Io(format!("Invalid config {}: {}", path.display(), e)))?;
        log::info!("[Config] Loaded {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = PipelineConfig::from_json("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.thumbnail.width, 320);
        assert_eq!(config.thumbnail.render_timeout(), None);
        assert!(!config.thumbnail.coalesce_duplicates);
    }

    #[test]
    fn test_partial_override() {
        let config = PipelineConfig::from_json(
            r#"{"thumbnail": {"format": "jpeg", "render_timeout_ms": 2000, "drain_delay_ms": 0}}"#,
        )
        .unwrap();
        assert_eq!(config.thumbnail.format, ThumbnailFormat::Jpeg);
        assert_eq!(config.thumbnail.render_timeout(), Some(Duration::from_secs(2)));
        assert_eq!(config.thumbnail.drain_delay(), Duration::ZERO);
        assert_eq!(config.thumbnail.height, 180);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = PipelineConfig::from_json_file("/nonexistent/pipeline.json").unwrap_err();
        assert!(matches!(err, ShaderError::Io(_)));
    }
}

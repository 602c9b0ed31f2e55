//! Render request and composition metadata types.
//!
//! A render request is the single payload accepted by every pipeline
//! entry point (CLI, batch rows, parallel segments). It is validated in
//! full before any session or subprocess is acquired.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use framecast_common::error::FramecastResult;

use crate::validate;

/// Raster format for captured frames and image-sequence output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
}

impl ImageFormat {
    /// File extension without the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
        }
    }

    /// Wire identifier used by the frontend capture endpoint.
    pub fn as_str(&self) -> &'static str {
        self.extension()
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "png" => Some(ImageFormat::Png),
            "jpeg" | "jpg" => Some(ImageFormat::Jpeg),
            _ => None,
        }
    }
}

/// Composition metadata reported by the frontend.
///
/// Fetched once per run and shared across batch rows unless a row or a
/// global flag overrides individual fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionMetadata {
    /// Composition identifier.
    pub id: String,

    /// Composition width in pixels.
    pub width: u32,

    /// Composition height in pixels.
    pub height: u32,

    /// Frame rate.
    pub fps: f64,

    /// Total timeline length in frames.
    pub duration_in_frames: u32,
}

/// A fully-specified request to render one frame range of a composition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderRequest {
    /// Composition identifier.
    pub composition_id: String,

    /// Output width in pixels.
    pub width: u32,

    /// Output height in pixels.
    pub height: u32,

    /// Frame rate.
    pub fps: f64,

    /// Total timeline length of the composition in frames.
    pub duration_in_frames: u32,

    /// First frame to render (inclusive).
    #[serde(default)]
    pub start_frame: u32,

    /// Last frame to render (inclusive).
    pub end_frame: u32,

    /// Codec identifier (resolved against the codec registry).
    pub codec: String,

    /// Constant rate factor; `None` uses the codec's default.
    #[serde(default)]
    pub crf: Option<u32>,

    /// Explicit video bitrate (e.g. "8M"); overrides CRF when set.
    #[serde(default)]
    pub bitrate: Option<String>,

    /// Render scale factor applied to composition dimensions.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// Input parameters forwarded to the composition.
    #[serde(default)]
    pub input_props: serde_json::Value,

    /// Whether audio is dropped even if the codec supports it.
    #[serde(default)]
    pub muted: bool,

    /// Render numbered image files instead of an encoded container.
    #[serde(default)]
    pub image_sequence: bool,

    /// Captured frame format.
    #[serde(default)]
    pub image_format: ImageFormat,

    /// JPEG capture quality (0-100); ignored for PNG.
    #[serde(default = "default_image_quality")]
    pub image_quality: u8,

    /// Worker pool size for parallel rendering.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Base URL of the composition-rendering frontend.
    pub frontend_url: String,

    /// Whether non-local frontend hosts are accepted.
    #[serde(default)]
    pub allow_remote_frontend: bool,

    /// Per-attempt timeout waiting for a composition to settle (ms).
    #[serde(default = "default_capture_timeout_ms")]
    pub capture_timeout_ms: u64,

    /// Retry budget for the settle wait before a frame is declared hung.
    #[serde(default = "default_capture_retries")]
    pub capture_retries: u32,

    /// Optional audio file muxed into the output.
    #[serde(default)]
    pub audio_path: Option<PathBuf>,

    /// Codec-specific quality profile name (e.g. ProRes "hq").
    #[serde(default)]
    pub quality_profile: Option<String>,
}

fn default_scale() -> f64 {
    1.0
}

fn default_image_quality() -> u8 {
    80
}

fn default_concurrency() -> usize {
    1
}

fn default_capture_timeout_ms() -> u64 {
    30_000
}

fn default_capture_retries() -> u32 {
    2
}

impl RenderRequest {
    /// Build a request for the full timeline of a composition with
    /// defaults everywhere else.
    pub fn for_composition(meta: &CompositionMetadata, frontend_url: impl Into<String>) -> Self {
        Self {
            composition_id: meta.id.clone(),
            width: meta.width,
            height: meta.height,
            fps: meta.fps,
            duration_in_frames: meta.duration_in_frames,
            start_frame: 0,
            end_frame: meta.duration_in_frames.saturating_sub(1),
            codec: "h264".to_string(),
            crf: None,
            bitrate: None,
            scale: default_scale(),
            input_props: serde_json::Value::Null,
            muted: false,
            image_sequence: false,
            image_format: ImageFormat::default(),
            image_quality: default_image_quality(),
            concurrency: default_concurrency(),
            frontend_url: frontend_url.into(),
            allow_remote_frontend: false,
            capture_timeout_ms: default_capture_timeout_ms(),
            capture_retries: default_capture_retries(),
            audio_path: None,
            quality_profile: None,
        }
    }

    /// Total number of frames this request renders.
    pub fn total_frames(&self) -> u32 {
        self.end_frame - self.start_frame + 1
    }

    /// Validate every parameter of the request.
    ///
    /// Codec-specific constraints (CRF range, palette restrictions) are
    /// checked by the codec registry after the codec id is resolved;
    /// everything else is checked here, before any resource is touched.
    pub fn validate(&self) -> FramecastResult<()> {
        use framecast_common::error::FramecastError;

        if self.composition_id.trim().is_empty() {
            return Err(FramecastError::validation("composition id is empty"));
        }
        validate::ensure_dimension(self.width as i64)?;
        validate::ensure_dimension(self.height as i64)?;
        validate::ensure_frame_rate(self.fps)?;
        validate::validate_frame_range(self.start_frame, self.end_frame, self.duration_in_frames)?;
        if let Some(crf) = self.crf {
            validate::ensure_quality_factor(crf as i64)?;
        }
        validate::ensure_scale(self.scale)?;
        validate::ensure_image_quality(self.image_quality as i64)?;
        if self.concurrency == 0 {
            return Err(FramecastError::validation("concurrency must be >= 1"));
        }
        validate::validate_frontend_url(&self.frontend_url, self.allow_remote_frontend)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta() -> CompositionMetadata {
        CompositionMetadata {
            id: "intro".to_string(),
            width: 1920,
            height: 1080,
            fps: 30.0,
            duration_in_frames: 300,
        }
    }

    fn request() -> RenderRequest {
        RenderRequest::for_composition(&meta(), "http://localhost:3000")
    }

    #[test]
    fn test_for_composition_covers_full_timeline() {
        let req = request();
        assert_eq!(req.start_frame, 0);
        assert_eq!(req.end_frame, 299);
        assert_eq!(req.total_frames(), 300);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut req = request();
        req.start_frame = 100;
        req.end_frame = 50;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_end_at_duration() {
        let mut req = request();
        req.end_frame = 300;
        assert!(req.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_remote_frontend_unless_allowed() {
        let mut req = request();
        req.frontend_url = "http://render.example.com".to_string();
        assert!(req.validate().is_err());
        req.allow_remote_frontend = true;
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_request_serde_defaults() {
        let json = serde_json::json!({
            "composition_id": "intro",
            "width": 1280,
            "height": 720,
            "fps": 30.0,
            "duration_in_frames": 120,
            "end_frame": 119,
            "codec": "h264",
            "frontend_url": "http://localhost:3000",
        });
        let req: RenderRequest = serde_json::from_value(json).unwrap();
        assert_eq!(req.start_frame, 0);
        assert_eq!(req.scale, 1.0);
        assert_eq!(req.image_quality, 80);
        assert_eq!(req.image_format, ImageFormat::Png);
        assert!(!req.muted);
    }

    #[test]
    fn test_image_format_parse() {
        assert_eq!(ImageFormat::parse("jpg"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::parse("PNG"), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::parse("webp"), None);
    }
}

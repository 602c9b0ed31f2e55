pub mod batch;
pub mod check;
pub mod codecs;
pub mod render;
pub mod still;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_render_model::ImageFormat;

/// Parse inline JSON or `@file` input props.
pub fn parse_props(raw: Option<&str>) -> anyhow::Result<serde_json::Value> {
    let Some(raw) = raw else {
        return Ok(serde_json::Value::Null);
    };

    let content = if let Some(path) = raw.strip_prefix('@') {
        std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read props file {path}: {e}"))?
    } else {
        raw.to_string()
    };

    serde_json::from_str(&content).map_err(|e| anyhow::anyhow!("Invalid props JSON: {e}"))
}

/// Resolve an image format flag.
pub fn parse_image_format(raw: &str) -> FramecastResult<ImageFormat> {
    ImageFormat::parse(raw).ok_or_else(|| {
        FramecastError::validation(format!(
            "image format must be png or jpeg, got '{raw}'"
        ))
    })
}

//! Render a single frame to an image file.

use std::path::PathBuf;
use std::sync::Arc;

use framecast_common::config::AppConfig;
use framecast_frame_source::http::HttpProvider;
use framecast_frame_source::source::FrameSourceProvider;
use framecast_render_engine::render_still;
use framecast_render_model::{validate, RenderRequest};

use super::{parse_image_format, parse_props};

#[allow(clippy::too_many_arguments)]
pub async fn run(
    composition: String,
    frame: u32,
    output: Option<PathBuf>,
    image_format: String,
    image_quality: String,
    scale: String,
    props: Option<String>,
    frontend_url: Option<String>,
    allow_remote: bool,
) -> anyhow::Result<()> {
    let config = AppConfig::load();
    let allow_remote = allow_remote || config.render.allow_remote_frontend;
    let frontend_url = validate::validate_frontend_url(
        frontend_url.as_deref().unwrap_or(&config.frontend_url),
        allow_remote,
    )?;

    let image_format = parse_image_format(&image_format)?;
    let image_quality = validate::parse_image_quality(&image_quality)?;
    let scale = validate::parse_scale(&scale)?;
    let input_props = parse_props(props.as_deref())?;

    let provider = Arc::new(HttpProvider::new(&frontend_url));
    let meta = provider.metadata(&composition).await?;

    let mut request = RenderRequest::for_composition(&meta, &frontend_url);
    request.scale = scale;
    request.input_props = input_props;
    request.image_format = image_format;
    request.image_quality = image_quality;
    request.allow_remote_frontend = allow_remote;
    request.capture_timeout_ms = config.render.capture_timeout_ms;
    request.capture_retries = config.render.capture_retries;

    let out_path = output.unwrap_or_else(|| {
        config
            .output_dir
            .join(format!("{composition}-{frame}.{}", image_format.extension()))
    });

    println!("Rendering still frame {frame} of: {composition}");
    let path = render_still(provider.as_ref(), &request, frame, &out_path).await?;
    println!("Still written: {}", path.display());
    Ok(())
}

//! Render a composition to video.

use std::path::PathBuf;
use std::sync::Arc;

use framecast_common::config::AppConfig;
use framecast_frame_source::http::HttpProvider;
use framecast_frame_source::source::FrameSourceProvider;
use framecast_render_engine::{render_video, RenderOutcome};
use framecast_render_model::{validate, RenderRequest};

use super::{parse_image_format, parse_props};

pub struct RenderArgs {
    pub composition: String,
    pub output: Option<PathBuf>,
    pub codec: Option<String>,
    pub crf: Option<String>,
    pub bitrate: Option<String>,
    pub width: Option<String>,
    pub height: Option<String>,
    pub start: u32,
    pub end: Option<u32>,
    pub scale: String,
    pub props: Option<String>,
    pub muted: bool,
    pub audio: Option<PathBuf>,
    pub sequence: bool,
    pub image_format: String,
    pub image_quality: String,
    pub concurrency: Option<usize>,
    pub prores_profile: Option<String>,
    pub frontend_url: Option<String>,
    pub allow_remote: bool,
    pub json: bool,
}

pub async fn run(args: RenderArgs) -> anyhow::Result<()> {
    let config = AppConfig::load();
    let allow_remote = args.allow_remote || config.render.allow_remote_frontend;
    let frontend_url = validate::validate_frontend_url(
        args.frontend_url.as_deref().unwrap_or(&config.frontend_url),
        allow_remote,
    )?;

    // Coerce raw flag values before anything is fetched or spawned.
    let crf = args.crf.as_deref().map(validate::parse_quality_factor).transpose()?;
    let scale = validate::parse_scale(&args.scale)?;
    let image_format = parse_image_format(&args.image_format)?;
    let image_quality = validate::parse_image_quality(&args.image_quality)?;
    let width = args.width.as_deref().map(validate::parse_dimension).transpose()?;
    let height = args.height.as_deref().map(validate::parse_dimension).transpose()?;
    let input_props = parse_props(args.props.as_deref())?;

    let provider = Arc::new(HttpProvider::new(&frontend_url));
    let meta = provider.metadata(&args.composition).await?;

    let mut request = RenderRequest::for_composition(&meta, &frontend_url);
    request.codec = args.codec.unwrap_or_else(|| config.render.codec.clone());
    request.crf = crf;
    request.bitrate = args.bitrate;
    request.width = width.unwrap_or(meta.width);
    request.height = height.unwrap_or(meta.height);
    request.start_frame = args.start;
    request.end_frame = args.end.unwrap_or(meta.duration_in_frames.saturating_sub(1));
    request.scale = scale;
    request.input_props = input_props;
    request.muted = args.muted;
    request.audio_path = args.audio;
    request.image_sequence = args.sequence;
    request.image_format = image_format;
    request.image_quality = image_quality;
    request.concurrency = args.concurrency.unwrap_or(config.render.concurrency);
    request.allow_remote_frontend = allow_remote;
    request.capture_timeout_ms = config.render.capture_timeout_ms;
    request.capture_retries = config.render.capture_retries;
    request.quality_profile = args.prores_profile;

    let out_path = args.output.unwrap_or_else(|| {
        if request.image_sequence {
            config.output_dir.join(&args.composition)
        } else {
            let extension = framecast_encoder::Codec::parse(&request.codec)
                .map(|c| c.profile().extension)
                .unwrap_or("mp4");
            config
                .output_dir
                .join(format!("{}.{extension}", args.composition))
        }
    });

    if !args.json {
        println!("Rendering composition: {}", args.composition);
        println!("  Output: {}", out_path.display());
        println!("  Codec: {}", request.codec);
        println!("  Frames: {}..{}", request.start_frame, request.end_frame);
        println!("  Concurrency: {}", request.concurrency);
    }

    let total = request.total_frames();
    let progress: Option<framecast_render_engine::ProgressCallback> = if args.json {
        None
    } else {
        Some(Box::new(move |done, _| {
            print!("\r  Progress: {done}/{total} frames  ");
        }))
    };

    let outcome = render_video(provider, request, &out_path, progress).await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&outcome_json(&outcome))?);
    } else {
        println!("\nRender complete: {}", outcome.out_path.display());
        println!(
            "  {} frames as {} in {:.1}s",
            outcome.total_frames, outcome.codec, outcome.elapsed_secs
        );
    }
    Ok(())
}

fn outcome_json(outcome: &RenderOutcome) -> serde_json::Value {
    let absolute = std::fs::canonicalize(&outcome.out_path)
        .unwrap_or_else(|_| outcome.out_path.clone());
    serde_json::json!({
        "output": outcome.out_path,
        "absolute_path": absolute,
        "total_frames": outcome.total_frames,
        "codec": outcome.codec,
        "elapsed_secs": outcome.elapsed_secs,
    })
}

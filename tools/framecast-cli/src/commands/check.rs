//! Check system capabilities.

use framecast_common::config::AppConfig;
use framecast_common::error::FramecastError;
use framecast_encoder::is_ffmpeg_available;
use framecast_frame_source::http::HttpProvider;
use framecast_frame_source::source::FrameSourceProvider;

pub async fn run() -> anyhow::Result<()> {
    println!("Framecast System Check");
    println!("{}", "=".repeat(50));

    let config = AppConfig::load();
    let mut ready = true;

    if is_ffmpeg_available() {
        println!("[OK] ffmpeg found on PATH");
    } else {
        println!("[FAIL] ffmpeg not found on PATH");
        ready = false;
    }

    // Any HTTP answer, including "no such composition", proves the
    // frontend is reachable.
    let provider = HttpProvider::new(&config.frontend_url);
    match provider.metadata("__framecast_check__").await {
        Ok(_) | Err(FramecastError::CompositionNotFound { .. }) => {
            println!("[OK] Frontend reachable at {}", config.frontend_url);
        }
        Err(e) => {
            println!("[FAIL] Frontend unreachable at {}: {e}", config.frontend_url);
            ready = false;
        }
    }

    println!("[OK] Output directory: {}", config.output_dir.display());

    println!();
    if ready {
        println!("All required capabilities are available. Framecast is ready.");
    } else {
        println!("Some required capabilities are missing. See above for fixes.");
    }
    Ok(())
}

//! Framecast CLI — Command-line interface for rendering compositions.
//!
//! Usage:
//!   framecast render <COMPOSITION>          Render a composition to video
//!   framecast still <COMPOSITION>           Render a single frame to an image
//!   framecast batch <COMPOSITION> <DATA>    Render one output per data row
//!   framecast codecs                        List registered codecs
//!   framecast check                         Check system capabilities

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(
    name = "framecast",
    about = "Batch and parallel rendering for parameterized compositions",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a composition to a video file or image sequence
    Render {
        /// Composition identifier
        composition: String,

        /// Output path (defaults to the configured output directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Codec identifier (h264, h265, vp8, vp9, prores, gif)
        #[arg(long)]
        codec: Option<String>,

        /// Quality factor (CRF); codec default when omitted
        #[arg(long)]
        crf: Option<String>,

        /// Explicit video bitrate (e.g. 8M); replaces CRF control
        #[arg(long)]
        bitrate: Option<String>,

        /// Output width (defaults to the composition's width)
        #[arg(long)]
        width: Option<String>,

        /// Output height (defaults to the composition's height)
        #[arg(long)]
        height: Option<String>,

        /// First frame to render (inclusive)
        #[arg(long, default_value = "0")]
        start: u32,

        /// Last frame to render (inclusive, defaults to the end)
        #[arg(long)]
        end: Option<u32>,

        /// Render scale factor
        #[arg(long, default_value = "1")]
        scale: String,

        /// Input props as inline JSON or @path/to/file.json
        #[arg(long)]
        props: Option<String>,

        /// Drop audio even when the codec supports it
        #[arg(long)]
        muted: bool,

        /// Audio file muxed into the output
        #[arg(long)]
        audio: Option<PathBuf>,

        /// Write numbered image files instead of an encoded container
        #[arg(long)]
        sequence: bool,

        /// Captured frame format (png, jpeg)
        #[arg(long, default_value = "png")]
        image_format: String,

        /// JPEG capture quality (0-100)
        #[arg(long, default_value = "80")]
        image_quality: String,

        /// Worker pool size for parallel rendering
        #[arg(long)]
        concurrency: Option<usize>,

        /// ProRes quality profile name
        #[arg(long)]
        prores_profile: Option<String>,

        /// Frontend base URL
        #[arg(long)]
        frontend_url: Option<String>,

        /// Accept a non-local frontend host
        #[arg(long)]
        allow_remote: bool,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Render a single frame to an image file
    Still {
        /// Composition identifier
        composition: String,

        /// Frame index to capture
        #[arg(long, default_value = "0")]
        frame: u32,

        /// Output image path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Captured frame format (png, jpeg)
        #[arg(long, default_value = "png")]
        image_format: String,

        /// JPEG capture quality (0-100)
        #[arg(long, default_value = "80")]
        image_quality: String,

        /// Render scale factor
        #[arg(long, default_value = "1")]
        scale: String,

        /// Input props as inline JSON or @path/to/file.json
        #[arg(long)]
        props: Option<String>,

        /// Frontend base URL
        #[arg(long)]
        frontend_url: Option<String>,

        /// Accept a non-local frontend host
        #[arg(long)]
        allow_remote: bool,
    },

    /// Render one output per row of a data file
    Batch {
        /// Composition identifier
        composition: String,

        /// Data file (.csv or .json array of objects)
        data: PathBuf,

        /// Output filename pattern, e.g. "{name}-{_index}.mp4"
        #[arg(long, default_value = "{_index}.mp4")]
        pattern: String,

        /// Directory receiving per-row artifacts
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Codec identifier
        #[arg(long)]
        codec: Option<String>,

        /// Quality factor (CRF); codec default when omitted
        #[arg(long)]
        crf: Option<String>,

        /// Drop audio even when the codec supports it
        #[arg(long)]
        muted: bool,

        /// Write numbered image files instead of encoded containers
        #[arg(long)]
        sequence: bool,

        /// Worker pool size
        #[arg(long)]
        concurrency: Option<usize>,

        /// Cancel the whole run on the first row failure
        #[arg(long)]
        fail_fast: bool,

        /// Frontend base URL
        #[arg(long)]
        frontend_url: Option<String>,

        /// Accept a non-local frontend host
        #[arg(long)]
        allow_remote: bool,
    },

    /// List registered codecs
    Codecs {
        /// Print the registry as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check system capabilities
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    framecast_common::logging::init_logging(&framecast_common::config::LoggingConfig {
        level: log_level.to_string(),
        json: false,
        file: None,
    });

    match cli.command {
        Commands::Render {
            composition,
            output,
            codec,
            crf,
            bitrate,
            width,
            height,
            start,
            end,
            scale,
            props,
            muted,
            audio,
            sequence,
            image_format,
            image_quality,
            concurrency,
            prores_profile,
            frontend_url,
            allow_remote,
            json,
        } => {
            commands::render::run(commands::render::RenderArgs {
                composition,
                output,
                codec,
                crf,
                bitrate,
                width,
                height,
                start,
                end,
                scale,
                props,
                muted,
                audio,
                sequence,
                image_format,
                image_quality,
                concurrency,
                prores_profile,
                frontend_url,
                allow_remote,
                json,
            })
            .await
        }
        Commands::Still {
            composition,
            frame,
            output,
            image_format,
            image_quality,
            scale,
            props,
            frontend_url,
            allow_remote,
        } => {
            commands::still::run(
                composition,
                frame,
                output,
                image_format,
                image_quality,
                scale,
                props,
                frontend_url,
                allow_remote,
            )
            .await
        }
        Commands::Batch {
            composition,
            data,
            pattern,
            output_dir,
            codec,
            crf,
            muted,
            sequence,
            concurrency,
            fail_fast,
            frontend_url,
            allow_remote,
        } => {
            commands::batch::run(commands::batch::BatchArgs {
                composition,
                data,
                pattern,
                output_dir,
                codec,
                crf,
                muted,
                sequence,
                concurrency,
                fail_fast,
                frontend_url,
                allow_remote,
            })
            .await
        }
        Commands::Codecs { json } => commands::codecs::run(json),
        Commands::Check => commands::check::run().await,
    }
}

//! Batch rendering driven by a data file.

use std::path::PathBuf;
use std::sync::Arc;

use framecast_common::config::AppConfig;
use framecast_frame_source::http::HttpProvider;
use framecast_render_engine::{
    batch::{run_batch, shared_base, BatchOptions},
    data::parse_rows_file,
};
use framecast_render_model::validate;

pub struct BatchArgs {
    pub composition: String,
    pub data: PathBuf,
    pub pattern: String,
    pub output_dir: Option<PathBuf>,
    pub codec: Option<String>,
    pub crf: Option<String>,
    pub muted: bool,
    pub sequence: bool,
    pub concurrency: Option<usize>,
    pub fail_fast: bool,
    pub frontend_url: Option<String>,
    pub allow_remote: bool,
}

pub async fn run(args: BatchArgs) -> anyhow::Result<()> {
    let config = AppConfig::load();
    let allow_remote = args.allow_remote || config.render.allow_remote_frontend;
    let frontend_url = validate::validate_frontend_url(
        args.frontend_url.as_deref().unwrap_or(&config.frontend_url),
        allow_remote,
    )?;
    let crf = args.crf.as_deref().map(validate::parse_quality_factor).transpose()?;

    let rows = parse_rows_file(&args.data)?;
    if rows.is_empty() {
        return Err(anyhow::anyhow!(
            "Data file {} contains no rows",
            args.data.display()
        ));
    }

    let provider = Arc::new(HttpProvider::new(&frontend_url));
    let mut base = shared_base(provider.as_ref(), &args.composition, &frontend_url).await?;
    base.codec = args.codec.unwrap_or_else(|| config.render.codec.clone());
    base.crf = crf;
    base.muted = args.muted;
    base.image_sequence = args.sequence;
    base.allow_remote_frontend = allow_remote;
    base.capture_timeout_ms = config.render.capture_timeout_ms;
    base.capture_retries = config.render.capture_retries;

    let options = BatchOptions {
        output_pattern: args.pattern,
        output_dir: args.output_dir.unwrap_or_else(|| config.output_dir.clone()),
        concurrency: args.concurrency.unwrap_or(config.render.concurrency),
        fail_fast: args.fail_fast,
    };

    println!("Batch rendering: {}", args.composition);
    println!("  Rows: {}", rows.len());
    println!("  Output dir: {}", options.output_dir.display());
    println!("  Concurrency: {}", options.concurrency);

    let total_rows = rows.len();
    let summary = run_batch(
        provider,
        base,
        rows,
        options,
        Some(Box::new(move |done, total| {
            print!("\r  Progress: {done}/{total} frames ({total_rows} rows)  ");
        })),
    )
    .await?;

    println!("\nPer-row results:");
    for outcome in &summary.outcomes {
        match &outcome.output {
            Ok(path) => println!("  row {:>3}: {}", outcome.index, path.display()),
            Err(error) => println!("  row {:>3}: FAILED - {error}", outcome.index),
        }
    }

    println!(
        "\nBatch finished: {} total, {} succeeded, {} failed in {:.1}s",
        summary.total, summary.succeeded, summary.failed, summary.elapsed_secs
    );
    println!("  Output dir: {}", summary.output_dir.display());

    if summary.failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

//! One render job: a contiguous frame range rendered to one artifact.
//!
//! The job owns exactly one capture session and (unless it is writing
//! an image sequence) one encoder subprocess. Frames flow from capture
//! to sink strictly in timeline order; both resources are released on
//! every exit path, including cancellation.

use std::path::{Path, PathBuf};

use framecast_common::cancel::CancelFlag;
use framecast_common::clock::RunClock;
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_encoder::codecs::EncodeOptions;
use framecast_encoder::session::{EncoderSession, EncoderSettings};
use framecast_encoder::Codec;
use framecast_frame_source::source::{FrameSource, FrameSourceProvider, SourceConfig};
use framecast_render_model::RenderRequest;

use crate::progress::{ProgressEvent, ProgressSender};

/// Result of a completed render.
#[derive(Debug, Clone)]
pub struct RenderOutcome {
    /// Path of the final artifact (file, or directory for sequences).
    pub out_path: PathBuf,

    /// Number of frames rendered.
    pub total_frames: u32,

    /// Codec identifier used.
    pub codec: String,

    /// Wall-clock seconds the render took.
    pub elapsed_secs: f64,
}

/// Shared context a job runs under.
#[derive(Clone)]
pub struct JobContext {
    /// Cooperative cancellation flag, observed at suspension points.
    pub cancel: CancelFlag,

    /// Progress event sink; `None` disables reporting.
    pub progress: Option<ProgressSender>,
}

impl JobContext {
    pub fn detached() -> Self {
        Self {
            cancel: CancelFlag::new(),
            progress: None,
        }
    }
}

/// Destination for captured frames.
///
/// Either an encoder subprocess or a directory of numbered images; the
/// job drives both through the same narrow surface so teardown is
/// uniform.
#[async_trait::async_trait]
trait FrameSink: Send {
    async fn write_frame(&mut self, frame_index: u32, bytes: &[u8]) -> FramecastResult<()>;

    /// Finalize and return the artifact path.
    async fn finish(self: Box<Self>) -> FramecastResult<PathBuf>;

    /// Tear down without producing an artifact. Removes partial output.
    async fn abort(self: Box<Self>);
}

struct EncoderSink {
    session: EncoderSession,
    out_path: PathBuf,
}

#[async_trait::async_trait]
impl FrameSink for EncoderSink {
    async fn write_frame(&mut self, _frame_index: u32, bytes: &[u8]) -> FramecastResult<()> {
        self.session.write_frame(bytes).await
    }

    async fn finish(self: Box<Self>) -> FramecastResult<PathBuf> {
        self.session.finish().await
    }

    async fn abort(self: Box<Self>) {
        self.session.abort().await;
        tokio::fs::remove_file(&self.out_path).await.ok();
    }
}

struct ImageSequenceSink {
    dir: PathBuf,
    extension: &'static str,
    written: Vec<PathBuf>,
}

impl ImageSequenceSink {
    async fn create(dir: &Path, extension: &'static str) -> FramecastResult<Self> {
        tokio::fs::create_dir_all(dir).await?;
        Ok(Self {
            dir: dir.to_path_buf(),
            extension,
            written: Vec::new(),
        })
    }
}

#[async_trait::async_trait]
impl FrameSink for ImageSequenceSink {
    async fn write_frame(&mut self, frame_index: u32, bytes: &[u8]) -> FramecastResult<()> {
        let path = self
            .dir
            .join(format!("element-{frame_index:05}.{}", self.extension));
        tokio::fs::write(&path, bytes).await?;
        self.written.push(path);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> FramecastResult<PathBuf> {
        Ok(self.dir)
    }

    async fn abort(self: Box<Self>) {
        for path in &self.written {
            tokio::fs::remove_file(path).await.ok();
        }
        // Succeeds only when no sibling job still has files here.
        tokio::fs::remove_dir(&self.dir).await.ok();
    }
}

fn source_config(request: &RenderRequest) -> SourceConfig {
    SourceConfig {
        composition_id: request.composition_id.clone(),
        width: request.width,
        height: request.height,
        scale: request.scale,
        input_props: request.input_props.clone(),
        image_format: request.image_format,
        image_quality: request.image_quality,
        capture_timeout_ms: request.capture_timeout_ms,
        capture_retries: request.capture_retries,
    }
}

async fn open_sink(request: &RenderRequest, out_path: &Path) -> FramecastResult<Box<dyn FrameSink>> {
    if request.image_sequence {
        let sink = ImageSequenceSink::create(out_path, request.image_format.extension()).await?;
        return Ok(Box::new(sink));
    }

    let codec = Codec::parse(&request.codec)?;
    let settings = EncoderSettings {
        codec,
        options: EncodeOptions {
            crf: request.crf,
            bitrate: request.bitrate.clone(),
            quality_profile: request.quality_profile.clone(),
            fps: request.fps,
        },
        fps: request.fps,
        out_path: out_path.to_path_buf(),
        audio_path: request.audio_path.clone(),
        muted: request.muted,
    };
    let session = EncoderSession::spawn(settings).await?;
    Ok(Box::new(EncoderSink {
        session,
        out_path: out_path.to_path_buf(),
    }))
}

/// Render the request's frame range to `out_path`.
///
/// Expects an already-validated request. The capture session is opened
/// before the encoder is spawned, and both are torn down on every
/// failure and cancellation path before the error propagates.
pub async fn run_render_job(
    provider: &dyn FrameSourceProvider,
    request: &RenderRequest,
    job_id: &str,
    out_path: &Path,
    ctx: &JobContext,
) -> FramecastResult<PathBuf> {
    let clock = RunClock::start();
    let total = request.total_frames();

    let mut source = provider.open_source();
    source.open(&source_config(request)).await?;

    let mut sink = match open_sink(request, out_path).await {
        Ok(sink) => sink,
        Err(e) => {
            source.close().await.ok();
            return Err(e);
        }
    };

    tracing::debug!(
        job = job_id,
        start = request.start_frame,
        end = request.end_frame,
        out = %out_path.display(),
        "Render job started"
    );

    let mut frames_done = 0u32;
    for frame in request.start_frame..=request.end_frame {
        if ctx.cancel.is_cancelled() {
            teardown(source, sink).await;
            return Err(FramecastError::cancelled(job_id));
        }

        // Capture, then write: the sink sees frames in strictly
        // increasing timeline order. A full encoder pipe blocks the
        // write, which throttles capture to encoder throughput.
        let bytes = match source.seek_and_capture(frame).await {
            Ok(bytes) => bytes,
            Err(e) => {
                teardown(source, sink).await;
                return Err(e);
            }
        };

        if let Err(e) = sink.write_frame(frame, &bytes).await {
            // The encoder already reaped itself on a write failure;
            // aborting the sink removes the partial artifact.
            teardown(source, sink).await;
            return Err(e);
        }

        frames_done += 1;
        if let Some(progress) = &ctx.progress {
            progress
                .send(ProgressEvent {
                    job: job_id.to_string(),
                    frames_done,
                    total,
                })
                .ok();
        }
    }

    source.close().await.ok();
    let artifact = sink.finish().await?;

    tracing::info!(
        job = job_id,
        frames = total,
        elapsed_secs = clock.elapsed_secs(),
        out = %artifact.display(),
        "Render job finished"
    );
    Ok(artifact)
}

async fn teardown(mut source: Box<dyn FrameSource>, sink: Box<dyn FrameSink>) {
    sink.abort().await;
    source.close().await.ok();
}

/// Render exactly one frame of the composition to an image file.
pub async fn render_still(
    provider: &dyn FrameSourceProvider,
    request: &RenderRequest,
    frame: u32,
    out_path: &Path,
) -> FramecastResult<PathBuf> {
    request.validate()?;
    framecast_render_model::validate_frame_range(frame, frame, request.duration_in_frames)?;

    let mut source = provider.open_source();
    source.open(&source_config(request)).await?;

    let bytes = match source.seek_and_capture(frame).await {
        Ok(bytes) => bytes,
        Err(e) => {
            source.close().await.ok();
            return Err(e);
        }
    };
    source.close().await.ok();

    if let Some(parent) = out_path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    tokio::fs::write(out_path, &bytes).await?;
    Ok(out_path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_frame_source::fake::{FakeProvider, FakeScript};
    use framecast_render_model::CompositionMetadata;

    fn meta() -> CompositionMetadata {
        CompositionMetadata {
            id: "intro".to_string(),
            width: 320,
            height: 180,
            fps: 30.0,
            duration_in_frames: 30,
        }
    }

    fn sequence_request() -> RenderRequest {
        let mut request = RenderRequest::for_composition(&meta(), "http://localhost:3000");
        request.image_sequence = true;
        request
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("framecast_job_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[tokio::test]
    async fn test_sequence_job_writes_every_frame_in_order() {
        let provider = FakeProvider::new(meta());
        let request = sequence_request();
        let dir = temp_dir("order");

        let out = run_render_job(&provider, &request, "render", &dir, &JobContext::detached())
            .await
            .unwrap();
        assert_eq!(out, dir);

        let stats = provider.stats();
        let expected: Vec<u32> = (0..30).collect();
        assert_eq!(stats.frames_captured, expected);
        assert_eq!(stats.sessions_closed, 1);

        for frame in 0..30 {
            let path = dir.join(format!("element-{frame:05}.png"));
            let bytes = std::fs::read(&path).unwrap();
            assert_eq!(bytes, FakeProvider::frame_payload(frame));
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_job_reports_progress() {
        let provider = FakeProvider::new(meta());
        let request = sequence_request();
        let dir = temp_dir("progress");

        let (tx, mut rx) = crate::progress::progress_channel();
        let ctx = JobContext {
            cancel: CancelFlag::new(),
            progress: Some(tx),
        };
        run_render_job(&provider, &request, "render", &dir, &ctx)
            .await
            .unwrap();
        drop(ctx);

        let mut last = None;
        while let Some(event) = rx.recv().await {
            last = Some(event);
        }
        let last = last.unwrap();
        assert_eq!(last.frames_done, 30);
        assert_eq!(last.total, 30);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_failure_mid_render_tears_down_and_cleans_partials() {
        let provider = FakeProvider::with_script(
            meta(),
            FakeScript {
                fail_at_frame: Some(10),
                ..FakeScript::default()
            },
        );
        let request = sequence_request();
        let dir = temp_dir("teardown");

        let err = run_render_job(&provider, &request, "render", &dir, &JobContext::detached())
            .await
            .unwrap_err();
        assert!(matches!(err, FramecastError::Connection { .. }));

        let stats = provider.stats();
        // Session released despite the failure.
        assert_eq!(stats.sessions_closed, 1);
        // No partial frames survive the abort.
        assert!(!dir.join("element-00000.png").exists());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_cancellation_stops_at_frame_boundary() {
        let provider = FakeProvider::new(meta());
        let request = sequence_request();
        let dir = temp_dir("cancel");

        let ctx = JobContext::detached();
        ctx.cancel.cancel();
        let err = run_render_job(&provider, &request, "segment 1", &dir, &ctx)
            .await
            .unwrap_err();
        assert!(err.is_cancellation());

        // The session was opened and must still be released.
        let stats = provider.stats();
        assert_eq!(stats.sessions_opened, stats.sessions_closed);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_render_still_writes_one_frame() {
        let provider = FakeProvider::new(meta());
        let request = RenderRequest::for_composition(&meta(), "http://localhost:3000");
        let dir = temp_dir("still");
        let out = dir.join("poster.png");

        render_still(&provider, &request, 12, &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), FakeProvider::frame_payload(12));
        assert_eq!(provider.stats().frames_captured, vec![12]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_render_still_rejects_out_of_range_frame() {
        let provider = FakeProvider::new(meta());
        let request = RenderRequest::for_composition(&meta(), "http://localhost:3000");
        let dir = temp_dir("still_range");

        let err = render_still(&provider, &request, 30, &dir.join("poster.png"))
            .await
            .unwrap_err();
        assert!(matches!(err, FramecastError::Validation { .. }));
        // Validation failed before any session was opened.
        assert_eq!(provider.stats().sessions_opened, 0);
    }
}

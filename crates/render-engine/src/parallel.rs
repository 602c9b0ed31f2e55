//! Parallel render coordination.
//!
//! One render is split into contiguous, non-overlapping segments; each
//! segment runs as an independent render job under a bounded pool. The
//! merge is a lossless stream concatenation in ascending segment-start
//! order, never completion order, so the final artifact is
//! byte-consistent regardless of scheduling. Any segment failure fails
//! the whole render and removes every intermediate.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use framecast_common::cancel::CancelFlag;
use framecast_common::clock::RunClock;
use framecast_common::error::{FramecastError, FramecastResult};
use framecast_encoder::session::concat_segments;
use framecast_encoder::Codec;
use framecast_frame_source::source::FrameSourceProvider;
use framecast_render_model::RenderRequest;

use crate::job::{run_render_job, JobContext, RenderOutcome};
use crate::progress::{progress_channel, ProgressCallback, ProgressReporter};

/// A contiguous frame sub-range owned by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub index: usize,
    /// First frame (inclusive).
    pub start: u32,
    /// Last frame (inclusive).
    pub end: u32,
}

impl Segment {
    pub fn frame_count(&self) -> u32 {
        self.end - self.start + 1
    }
}

/// Split `[start, end]` into `min(concurrency, total)` contiguous
/// segments. The final segment absorbs any remainder.
pub fn plan_segments(start: u32, end: u32, concurrency: usize) -> Vec<Segment> {
    let total = (end - start + 1) as usize;
    let count = concurrency.clamp(1, total);
    let base = (total / count) as u32;

    let mut segments = Vec::with_capacity(count);
    let mut cursor = start;
    for index in 0..count {
        let seg_end = if index == count - 1 {
            end
        } else {
            cursor + base - 1
        };
        segments.push(Segment {
            index,
            start: cursor,
            end: seg_end,
        });
        cursor = seg_end + 1;
    }
    segments
}

/// Render a full request, splitting across segment workers when the
/// request's concurrency allows it.
///
/// Validates the request (including codec-specific constraints) before
/// any session or subprocess is acquired.
pub async fn render_video(
    provider: Arc<dyn FrameSourceProvider>,
    request: RenderRequest,
    out_path: &Path,
    progress: Option<ProgressCallback>,
) -> FramecastResult<RenderOutcome> {
    request.validate()?;

    let codec_label = if request.image_sequence {
        format!("{}-sequence", request.image_format.extension())
    } else {
        let codec = Codec::parse(&request.codec)?;
        codec.profile().effective_crf(&to_encode_options(&request))?;
        codec.as_str().to_string()
    };

    let clock = RunClock::start();
    let total_frames = request.total_frames();
    let segments = plan_segments(request.start_frame, request.end_frame, request.concurrency);

    if !request.image_sequence && segments.len() > 1 {
        let codec = Codec::parse(&request.codec)?;
        if codec.profile().requires_palette {
            // Per-segment palettegen would produce different palettes,
            // shifting colors at concat boundaries.
            return Err(FramecastError::validation(format!(
                "codec {codec} requires palette generation and cannot be segmented; \
                 render with concurrency 1"
            )));
        }
    }

    tracing::info!(
        composition = %request.composition_id,
        frames = total_frames,
        segments = segments.len(),
        codec = %codec_label,
        "Starting render"
    );

    let (progress_tx, progress_rx) = progress_channel();
    let reporter =
        progress.map(|callback| ProgressReporter::spawn(progress_rx, total_frames, callback));

    let artifact = if segments.len() == 1 {
        let ctx = JobContext {
            cancel: CancelFlag::new(),
            progress: Some(progress_tx),
        };
        run_render_job(provider.as_ref(), &request, "render", out_path, &ctx).await?
    } else {
        run_segmented(provider, &request, &segments, out_path, progress_tx).await?
    };

    if let Some(reporter) = reporter {
        reporter.finish().await;
    }

    let outcome = RenderOutcome {
        out_path: artifact,
        total_frames,
        codec: codec_label,
        elapsed_secs: clock.elapsed_secs(),
    };
    tracing::info!(
        out = %outcome.out_path.display(),
        elapsed_secs = outcome.elapsed_secs,
        "Render complete"
    );
    Ok(outcome)
}

async fn run_segmented(
    provider: Arc<dyn FrameSourceProvider>,
    request: &RenderRequest,
    segments: &[Segment],
    out_path: &Path,
    progress_tx: crate::progress::ProgressSender,
) -> FramecastResult<PathBuf> {
    let cancel = CancelFlag::new();
    let pool = Arc::new(Semaphore::new(request.concurrency));
    let mut tasks: JoinSet<(usize, FramecastResult<PathBuf>)> = JoinSet::new();

    for segment in segments {
        let segment = *segment;
        let provider = provider.clone();
        let pool = pool.clone();
        let ctx = JobContext {
            cancel: cancel.clone(),
            progress: Some(progress_tx.clone()),
        };

        let mut seg_request = request.clone();
        seg_request.start_frame = segment.start;
        seg_request.end_frame = segment.end;
        // Audio is muxed once at the merge; segment encoders stay
        // video-only.
        seg_request.audio_path = None;

        let seg_out = segment_out_path(request, out_path, segment.index);
        let job_id = format!("segment {} [{}..{}]", segment.index, segment.start, segment.end);

        tasks.spawn(async move {
            let _permit = match pool.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (segment.index, Err(FramecastError::cancelled(job_id.as_str()))),
            };
            if ctx.cancel.is_cancelled() {
                return (segment.index, Err(FramecastError::cancelled(job_id.as_str())));
            }
            let result = run_render_job(provider.as_ref(), &seg_request, &job_id, &seg_out, &ctx)
                .await
                .map_err(|e| e.in_unit(&job_id));
            (segment.index, result)
        });
    }
    drop(progress_tx);

    let mut outputs: Vec<Option<PathBuf>> = vec![None; segments.len()];
    let mut first_error: Option<FramecastError> = None;

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, Ok(path))) => outputs[index] = Some(path),
            Ok((index, Err(e))) => {
                if !e.is_cancellation() {
                    tracing::warn!(segment = index, error = %e, "Segment failed; cancelling siblings");
                }
                cancel.cancel();
                keep_first_real_error(&mut first_error, e);
            }
            Err(join_err) => {
                cancel.cancel();
                keep_first_real_error(
                    &mut first_error,
                    FramecastError::Other(anyhow::anyhow!("segment task panicked: {join_err}")),
                );
            }
        }
    }

    if let Some(error) = first_error {
        cleanup_partials(request, out_path, &outputs).await;
        return Err(error);
    }

    if request.image_sequence {
        // Segments wrote disjoint numbered files into the final
        // directory; nothing to merge.
        return Ok(out_path.to_path_buf());
    }

    let ordered: Vec<PathBuf> = outputs.into_iter().flatten().collect();
    let audio = request
        .audio_path
        .as_deref()
        .filter(|_| !request.muted)
        .filter(|_| {
            Codec::parse(&request.codec)
                .map(|c| c.profile().supports_audio)
                .unwrap_or(false)
        });

    let merge = concat_segments(&ordered, out_path, audio).await;
    for segment in &ordered {
        tokio::fs::remove_file(segment).await.ok();
    }
    merge?;

    Ok(out_path.to_path_buf())
}

fn to_encode_options(request: &RenderRequest) -> framecast_encoder::EncodeOptions {
    framecast_encoder::EncodeOptions {
        crf: request.crf,
        bitrate: request.bitrate.clone(),
        quality_profile: request.quality_profile.clone(),
        fps: request.fps,
    }
}

fn segment_out_path(request: &RenderRequest, out_path: &Path, index: usize) -> PathBuf {
    if request.image_sequence {
        // All segments share the final directory; frame numbering keeps
        // their files disjoint.
        return out_path.to_path_buf();
    }
    let extension = out_path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    out_path.with_extension(format!("seg-{index:03}.{extension}"))
}

fn keep_first_real_error(slot: &mut Option<FramecastError>, error: FramecastError) {
    match slot {
        None => *slot = Some(error),
        // A real failure beats the cancellations it caused.
        Some(existing) if existing.is_cancellation() && !error.is_cancellation() => {
            *slot = Some(error)
        }
        Some(_) => {}
    }
}

async fn cleanup_partials(request: &RenderRequest, out_path: &Path, outputs: &[Option<PathBuf>]) {
    if request.image_sequence {
        for frame in request.start_frame..=request.end_frame {
            let path = out_path.join(format!(
                "element-{frame:05}.{}",
                request.image_format.extension()
            ));
            tokio::fs::remove_file(path).await.ok();
        }
        return;
    }
    for path in outputs.iter().flatten() {
        tokio::fs::remove_file(path).await.ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_frame_source::fake::{FakeProvider, FakeScript};
    use framecast_render_model::CompositionMetadata;

    fn meta(duration: u32) -> CompositionMetadata {
        CompositionMetadata {
            id: "intro".to_string(),
            width: 320,
            height: 180,
            fps: 30.0,
            duration_in_frames: duration,
        }
    }

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("framecast_parallel_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_segments_cover_range_contiguously() {
        let segments = plan_segments(0, 299, 4);
        assert_eq!(segments.len(), 4);
        assert_eq!(segments[0].start, 0);
        assert_eq!(segments.last().unwrap().end, 299);
        for pair in segments.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
        let total: u32 = segments.iter().map(Segment::frame_count).sum();
        assert_eq!(total, 300);
    }

    #[test]
    fn test_final_segment_absorbs_remainder() {
        let segments = plan_segments(0, 9, 3);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].frame_count(), 3);
        assert_eq!(segments[1].frame_count(), 3);
        assert_eq!(segments[2].frame_count(), 4);
    }

    #[test]
    fn test_concurrency_capped_to_frame_count() {
        let segments = plan_segments(10, 12, 8);
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| s.frame_count() == 1));
    }

    #[test]
    fn test_mid_timeline_ranges() {
        let segments = plan_segments(100, 199, 2);
        assert_eq!(segments[0], Segment { index: 0, start: 100, end: 149 });
        assert_eq!(segments[1], Segment { index: 1, start: 150, end: 199 });
    }

    #[tokio::test]
    async fn test_parallel_matches_sequential_frame_set() {
        // Staggered per-session delays make later segments finish
        // first; the artifact must still be in timeline order.
        let provider = Arc::new(FakeProvider::with_script(
            meta(60),
            FakeScript {
                session_delays_ms: vec![15, 0, 7, 2],
                ..FakeScript::default()
            },
        ));
        let mut request = RenderRequest::for_composition(&meta(60), "http://localhost:3000");
        request.image_sequence = true;
        request.concurrency = 4;

        let dir = temp_dir("ordering");
        let outcome = render_video(provider.clone(), request, &dir, None)
            .await
            .unwrap();
        assert_eq!(outcome.total_frames, 60);

        // Same frame set as a sequential render of the identical range,
        // each artifact holding its own frame's payload.
        let mut captured = provider.stats().frames_captured;
        captured.sort_unstable();
        assert_eq!(captured, (0..60).collect::<Vec<_>>());
        for frame in 0..60 {
            let path = dir.join(format!("element-{frame:05}.png"));
            assert_eq!(
                std::fs::read(&path).unwrap(),
                FakeProvider::frame_payload(frame),
                "frame {frame} out of place"
            );
        }
        assert_eq!(provider.stats().sessions_closed, 4);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_segment_failure_cancels_run_and_removes_partials() {
        let provider = Arc::new(FakeProvider::with_script(
            meta(60),
            FakeScript {
                // Frame 40 lives in the third of four segments.
                fail_at_frame: Some(40),
                session_delays_ms: vec![5],
                ..FakeScript::default()
            },
        ));
        let mut request = RenderRequest::for_composition(&meta(60), "http://localhost:3000");
        request.image_sequence = true;
        request.concurrency = 4;

        let dir = temp_dir("failure");
        let err = render_video(provider.clone(), request, &dir, None)
            .await
            .unwrap_err();
        assert!(!err.is_cancellation());
        assert!(err.to_string().contains("segment"));

        // Every opened session was released and no partial frame
        // survives as a deliverable.
        let stats = provider.stats();
        assert_eq!(stats.sessions_opened, stats.sessions_closed);
        for frame in 0..60 {
            assert!(!dir.join(format!("element-{frame:05}.png")).exists());
        }
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_palette_codec_rejected_in_parallel_mode() {
        let provider = Arc::new(FakeProvider::new(meta(60)));
        let mut request = RenderRequest::for_composition(&meta(60), "http://localhost:3000");
        request.codec = "gif".to_string();
        request.concurrency = 4;

        let err = render_video(provider.clone(), request, &temp_dir("palette").join("a.gif"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FramecastError::Validation { .. }));
        // Rejected before any session was opened.
        assert_eq!(provider.stats().sessions_opened, 0);
    }

    #[tokio::test]
    async fn test_unknown_codec_rejected_before_any_session() {
        let provider = Arc::new(FakeProvider::new(meta(60)));
        let mut request = RenderRequest::for_composition(&meta(60), "http://localhost:3000");
        request.codec = "av2".to_string();

        let err = render_video(provider.clone(), request, &temp_dir("codec").join("a.mp4"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, FramecastError::UnknownCodec { .. }));
        assert_eq!(provider.stats().sessions_opened, 0);
    }

    #[tokio::test]
    async fn test_progress_reaches_total_across_segments() {
        let provider = Arc::new(FakeProvider::new(meta(40)));
        let mut request = RenderRequest::for_composition(&meta(40), "http://localhost:3000");
        request.image_sequence = true;
        request.concurrency = 4;

        let seen = Arc::new(std::sync::Mutex::new((0u32, 0u32)));
        let sink = seen.clone();
        let dir = temp_dir("progress");
        render_video(
            provider,
            request,
            &dir,
            Some(Box::new(move |done, total| {
                *sink.lock().unwrap() = (done, total);
            })),
        )
        .await
        .unwrap();

        assert_eq!(*seen.lock().unwrap(), (40, 40));
        std::fs::remove_dir_all(&dir).ok();
    }
}

//! Deterministic in-process frame source for pipeline tests.
//!
//! Renders a small text payload per frame index instead of a real
//! raster image. The pipeline treats frame bytes as opaque, so tests
//! can decode artifacts and assert exactly which frames landed where.
//! Failure and delay injection let tests exercise teardown, timeout,
//! and out-of-order segment completion paths without any network.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use framecast_common::error::{FramecastError, FramecastResult};
use framecast_render_model::CompositionMetadata;

use crate::source::{FrameSource, FrameSourceProvider, SourceConfig};

/// Scripted behavior for fake sessions.
#[derive(Debug, Clone, Default)]
pub struct FakeScript {
    /// Capture of this frame index fails with a connection error.
    pub fail_at_frame: Option<u32>,

    /// Capture of this frame index never settles (render timeout).
    pub hang_at_frame: Option<u32>,

    /// Sessions whose input props set this key to `true` fail their
    /// first capture. Lets batch tests fail specific rows.
    pub fail_prop: Option<String>,

    /// Per-session capture delay in ms, cycled by session open order.
    /// Staggered delays randomize segment completion order.
    pub session_delays_ms: Vec<u64>,
}

/// Observable counters shared by every session of one provider.
#[derive(Debug, Default)]
pub struct FakeStats {
    pub sessions_opened: usize,
    pub sessions_closed: usize,
    pub metadata_calls: usize,
    /// Every captured frame index, in global capture order.
    pub frames_captured: Vec<u32>,
}

/// Provider handing out scripted in-process capture sessions.
pub struct FakeProvider {
    meta: CompositionMetadata,
    script: FakeScript,
    stats: Arc<Mutex<FakeStats>>,
    sessions_created: AtomicUsize,
}

impl FakeProvider {
    pub fn new(meta: CompositionMetadata) -> Self {
        Self::with_script(meta, FakeScript::default())
    }

    pub fn with_script(meta: CompositionMetadata, script: FakeScript) -> Self {
        Self {
            meta,
            script,
            stats: Arc::new(Mutex::new(FakeStats::default())),
            sessions_created: AtomicUsize::new(0),
        }
    }

    /// Snapshot of the shared counters.
    pub fn stats(&self) -> FakeStats {
        let guard = self.stats.lock().unwrap();
        FakeStats {
            sessions_opened: guard.sessions_opened,
            sessions_closed: guard.sessions_closed,
            metadata_calls: guard.metadata_calls,
            frames_captured: guard.frames_captured.clone(),
        }
    }

    /// The payload a fake session captures for `frame`.
    pub fn frame_payload(frame: u32) -> Vec<u8> {
        format!("frame:{frame:06}\n").into_bytes()
    }
}

#[async_trait::async_trait]
impl FrameSourceProvider for FakeProvider {
    async fn metadata(&self, composition_id: &str) -> FramecastResult<CompositionMetadata> {
        self.stats.lock().unwrap().metadata_calls += 1;
        if composition_id != self.meta.id {
            return Err(FramecastError::composition_not_found(composition_id));
        }
        Ok(self.meta.clone())
    }

    fn open_source(&self) -> Box<dyn FrameSource> {
        let index = self.sessions_created.fetch_add(1, Ordering::SeqCst);
        let delay_ms = match self.script.session_delays_ms.as_slice() {
            [] => 0,
            delays => delays[index % delays.len()],
        };
        Box::new(FakeFrameSource {
            meta_id: self.meta.id.clone(),
            script: self.script.clone(),
            stats: self.stats.clone(),
            delay_ms,
            open: false,
            fail_injected: false,
        })
    }
}

/// One scripted capture session.
pub struct FakeFrameSource {
    meta_id: String,
    script: FakeScript,
    stats: Arc<Mutex<FakeStats>>,
    delay_ms: u64,
    open: bool,
    fail_injected: bool,
}

#[async_trait::async_trait]
impl FrameSource for FakeFrameSource {
    async fn open(&mut self, config: &SourceConfig) -> FramecastResult<()> {
        if config.composition_id != self.meta_id {
            return Err(FramecastError::composition_not_found(&config.composition_id));
        }
        if let Some(key) = &self.script.fail_prop {
            if config.input_props.get(key).and_then(|v| v.as_bool()) == Some(true) {
                self.fail_injected = true;
            }
        }
        self.open = true;
        self.stats.lock().unwrap().sessions_opened += 1;
        Ok(())
    }

    async fn seek_and_capture(&mut self, frame: u32) -> FramecastResult<Vec<u8>> {
        if !self.open {
            return Err(FramecastError::connection("seek on a closed session"));
        }
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail_injected {
            return Err(FramecastError::connection(format!(
                "injected session failure at frame {frame}"
            )));
        }
        if self.script.fail_at_frame == Some(frame) {
            return Err(FramecastError::connection(format!(
                "injected capture failure at frame {frame}"
            )));
        }
        if self.script.hang_at_frame == Some(frame) {
            return Err(FramecastError::render_timeout(
                frame,
                3,
                "1 delay handles still pending",
            ));
        }

        self.stats.lock().unwrap().frames_captured.push(frame);
        Ok(FakeProvider::frame_payload(frame))
    }

    async fn close(&mut self) -> FramecastResult<()> {
        if self.open {
            self.open = false;
            self.stats.lock().unwrap().sessions_closed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecast_render_model::ImageFormat;

    fn meta() -> CompositionMetadata {
        CompositionMetadata {
            id: "intro".to_string(),
            width: 320,
            height: 180,
            fps: 30.0,
            duration_in_frames: 90,
        }
    }

    fn config() -> SourceConfig {
        SourceConfig {
            composition_id: "intro".to_string(),
            width: 320,
            height: 180,
            scale: 1.0,
            input_props: serde_json::Value::Null,
            image_format: ImageFormat::Png,
            image_quality: 80,
            capture_timeout_ms: 100,
            capture_retries: 1,
        }
    }

    #[tokio::test]
    async fn test_capture_is_deterministic() {
        let provider = FakeProvider::new(meta());
        let mut source = provider.open_source();
        source.open(&config()).await.unwrap();
        let first = source.seek_and_capture(12).await.unwrap();
        let second = source.seek_and_capture(12).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(first, FakeProvider::frame_payload(12));
        source.close().await.unwrap();

        let stats = provider.stats();
        assert_eq!(stats.sessions_opened, 1);
        assert_eq!(stats.sessions_closed, 1);
        assert_eq!(stats.frames_captured, vec![12, 12]);
    }

    #[tokio::test]
    async fn test_unknown_composition_is_rejected() {
        let provider = FakeProvider::new(meta());
        assert!(matches!(
            provider.metadata("missing").await,
            Err(FramecastError::CompositionNotFound { .. })
        ));

        let mut source = provider.open_source();
        let mut bad = config();
        bad.composition_id = "missing".to_string();
        assert!(source.open(&bad).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_failures() {
        let provider = FakeProvider::with_script(
            meta(),
            FakeScript {
                fail_at_frame: Some(5),
                hang_at_frame: Some(7),
                ..FakeScript::default()
            },
        );
        let mut source = provider.open_source();
        source.open(&config()).await.unwrap();

        assert!(source.seek_and_capture(4).await.is_ok());
        assert!(matches!(
            source.seek_and_capture(5).await,
            Err(FramecastError::Connection { .. })
        ));
        assert!(matches!(
            source.seek_and_capture(7).await,
            Err(FramecastError::RenderTimeout { frame: 7, .. })
        ));
    }

    #[tokio::test]
    async fn test_double_close_is_idempotent() {
        let provider = FakeProvider::new(meta());
        let mut source = provider.open_source();
        source.open(&config()).await.unwrap();
        source.close().await.unwrap();
        source.close().await.unwrap();
        assert_eq!(provider.stats().sessions_closed, 1);
    }
}

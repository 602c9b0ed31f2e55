//! The frame source capability boundary.

use framecast_common::error::FramecastResult;
use framecast_render_model::{CompositionMetadata, ImageFormat};

/// Configuration for opening a capture session against one composition.
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Composition identifier.
    pub composition_id: String,

    /// Render width in pixels.
    pub width: u32,

    /// Render height in pixels.
    pub height: u32,

    /// Render scale factor.
    pub scale: f64,

    /// Input parameters forwarded to the composition.
    pub input_props: serde_json::Value,

    /// Captured frame format.
    pub image_format: ImageFormat,

    /// JPEG capture quality (0-100); ignored for PNG.
    pub image_quality: u8,

    /// Per-attempt timeout waiting for the composition to settle (ms).
    pub capture_timeout_ms: u64,

    /// Retry budget for the settle wait.
    pub capture_retries: u32,
}

/// Abstract interface for one frame capture session.
///
/// A session is exclusively owned by one render job. Seeks may target
/// any frame in any order; parallel workers start at their own
/// segment's first frame, not frame 0.
#[async_trait::async_trait]
pub trait FrameSource: Send {
    /// Establish the session against the composition.
    ///
    /// Fails with `Connection` if the frontend is unreachable and
    /// `CompositionNotFound` if the identifier is unknown.
    async fn open(&mut self, config: &SourceConfig) -> FramecastResult<()>;

    /// Seek the composition clock to `frame`, wait until it reports no
    /// outstanding asynchronous work, and capture one raster image.
    ///
    /// The wait is bounded: each attempt waits at most the configured
    /// timeout and the retry budget caps the number of attempts;
    /// exhaustion raises `RenderTimeout` carrying the frame index.
    async fn seek_and_capture(&mut self, frame: u32) -> FramecastResult<Vec<u8>>;

    /// Release the session. Must run on every exit path; closing an
    /// already-closed session is a no-op.
    async fn close(&mut self) -> FramecastResult<()>;
}

/// Factory for capture sessions plus composition metadata lookup.
///
/// Coordinators hold one provider and open one session per worker.
#[async_trait::async_trait]
pub trait FrameSourceProvider: Send + Sync {
    /// Fetch composition metadata (dimensions, fps, duration).
    async fn metadata(&self, composition_id: &str) -> FramecastResult<CompositionMetadata>;

    /// Create a fresh, unopened capture session.
    fn open_source(&self) -> Box<dyn FrameSource>;
}

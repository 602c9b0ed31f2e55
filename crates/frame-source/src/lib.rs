//! Framecast Frame Source
//!
//! Drives one external rendering session frame-by-frame: seek the
//! composition clock, wait for pending asynchronous work to settle,
//! capture a raster image. The frontend is an opaque network endpoint;
//! the pipeline only sees the narrow [`FrameSource`] capability trait,
//! which also has a deterministic in-process fake for tests.

pub mod fake;
pub mod http;
pub mod source;

pub use fake::{FakeFrameSource, FakeProvider, FakeScript};
pub use http::{HttpFrameSource, HttpProvider};
pub use source::{FrameSource, FrameSourceProvider, SourceConfig};

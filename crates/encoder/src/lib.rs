//! Framecast Encoder
//!
//! Two halves: a static codec registry translating codec identifiers
//! into ffmpeg argument sets, and the encoder session that owns one
//! ffmpeg subprocess fed an ordered image stream on stdin.

pub mod codecs;
pub mod session;

pub use codecs::{Codec, CodecProfile, CrfSupport, EncodeOptions};
pub use session::{concat_segments, is_ffmpeg_available, EncoderSession, EncoderSettings};

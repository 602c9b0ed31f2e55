//! Static codec registry.
//!
//! Every codec declares its container extension, pixel format, quality
//! range, and capability flags once; argument construction is a pure
//! function of the codec and the encode options. Identical inputs
//! always produce an identical argument vector.

use framecast_common::error::{FramecastError, FramecastResult};

/// Supported video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    H264,
    H265,
    Vp8,
    Vp9,
    ProRes,
    Gif,
}

/// CRF support declared by a codec: default value and inclusive range.
#[derive(Debug, Clone, Copy)]
pub struct CrfSupport {
    pub default: u32,
    pub min: u32,
    pub max: u32,
}

/// Immutable descriptor for one codec.
#[derive(Debug, Clone, Copy)]
pub struct CodecProfile {
    pub codec: Codec,
    /// Container extension without the leading dot.
    pub extension: &'static str,
    /// Output pixel format.
    pub pixel_format: &'static str,
    /// CRF quality control, if the codec supports it.
    pub crf: Option<CrfSupport>,
    pub supports_audio: bool,
    pub supports_alpha: bool,
    /// Whether encoding needs a palette generation filter pass.
    pub requires_palette: bool,
    /// One-line description for the codec listing.
    pub description: &'static str,
}

/// Options influencing argument construction.
#[derive(Debug, Clone, Default)]
pub struct EncodeOptions {
    /// Constant rate factor; `None` uses the codec's default.
    pub crf: Option<u32>,

    /// Explicit video bitrate (e.g. "8M"); replaces CRF control.
    pub bitrate: Option<String>,

    /// Codec-specific quality profile name (ProRes).
    pub quality_profile: Option<String>,

    /// Frame rate, used by filter-based codecs.
    pub fps: f64,
}

/// Default ProRes profile applied when the requested name is unknown.
pub const DEFAULT_PRORES_PROFILE: &str = "hq";

const PRORES_PROFILES: &[(&str, &str)] = &[
    ("proxy", "0"),
    ("light", "1"),
    ("standard", "2"),
    ("hq", "3"),
    ("4444", "4"),
    ("4444-xq", "5"),
];

static REGISTRY: &[CodecProfile] = &[
    CodecProfile {
        codec: Codec::H264,
        extension: "mp4",
        pixel_format: "yuv420p",
        crf: Some(CrfSupport {
            default: 18,
            min: 0,
            max: 51,
        }),
        supports_audio: true,
        supports_alpha: false,
        requires_palette: false,
        description: "H.264 (libx264), broadest compatibility",
    },
    CodecProfile {
        codec: Codec::H265,
        extension: "mp4",
        pixel_format: "yuv420p",
        crf: Some(CrfSupport {
            default: 23,
            min: 0,
            max: 51,
        }),
        supports_audio: true,
        supports_alpha: false,
        requires_palette: false,
        description: "H.265 (libx265), smaller files, slower encode",
    },
    CodecProfile {
        codec: Codec::Vp8,
        extension: "webm",
        pixel_format: "yuv420p",
        crf: Some(CrfSupport {
            default: 9,
            min: 4,
            max: 63,
        }),
        supports_audio: true,
        supports_alpha: true,
        requires_palette: false,
        description: "VP8 (libvpx), WebM with alpha support",
    },
    CodecProfile {
        codec: Codec::Vp9,
        extension: "webm",
        pixel_format: "yuv420p",
        crf: Some(CrfSupport {
            default: 28,
            min: 0,
            max: 63,
        }),
        supports_audio: true,
        supports_alpha: true,
        requires_palette: false,
        description: "VP9 (libvpx-vp9), efficient WebM",
    },
    CodecProfile {
        codec: Codec::ProRes,
        extension: "mov",
        pixel_format: "yuv422p10le",
        crf: None,
        supports_audio: true,
        supports_alpha: true,
        requires_palette: false,
        description: "Apple ProRes (prores_ks), intermediate editing codec",
    },
    CodecProfile {
        codec: Codec::Gif,
        extension: "gif",
        pixel_format: "rgb8",
        crf: None,
        supports_audio: false,
        supports_alpha: false,
        requires_palette: true,
        description: "Animated GIF via single-pass palettegen/paletteuse",
    },
];

impl Codec {
    /// Every registered codec.
    pub fn all() -> &'static [Codec] {
        &[
            Codec::H264,
            Codec::H265,
            Codec::Vp8,
            Codec::Vp9,
            Codec::ProRes,
            Codec::Gif,
        ]
    }

    /// Resolve a codec identifier.
    pub fn parse(raw: &str) -> FramecastResult<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "h264" => Ok(Codec::H264),
            "h265" | "hevc" => Ok(Codec::H265),
            "vp8" => Ok(Codec::Vp8),
            "vp9" => Ok(Codec::Vp9),
            "prores" => Ok(Codec::ProRes),
            "gif" => Ok(Codec::Gif),
            _ => Err(FramecastError::unknown_codec(raw)),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Codec::H264 => "h264",
            Codec::H265 => "h265",
            Codec::Vp8 => "vp8",
            Codec::Vp9 => "vp9",
            Codec::ProRes => "prores",
            Codec::Gif => "gif",
        }
    }

    /// The immutable profile for this codec. Total over the enum.
    pub fn profile(&self) -> &'static CodecProfile {
        REGISTRY
            .iter()
            .find(|p| p.codec == *self)
            .unwrap_or_else(|| unreachable!("every codec variant is registered"))
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CodecProfile {
    /// Resolve and range-check the effective CRF for these options.
    ///
    /// Returns `None` for codecs without CRF control.
    pub fn effective_crf(&self, options: &EncodeOptions) -> FramecastResult<Option<u32>> {
        let Some(support) = self.crf else {
            if options.crf.is_some() {
                return Err(FramecastError::validation(format!(
                    "codec {} does not support a quality factor",
                    self.codec
                )));
            }
            return Ok(None);
        };

        let crf = options.crf.unwrap_or(support.default);
        if crf < support.min || crf > support.max {
            return Err(FramecastError::validation(format!(
                "quality factor for {} must be in [{}, {}], got {crf}",
                self.codec, support.min, support.max
            )));
        }
        Ok(Some(crf))
    }

    /// Build the video half of the ffmpeg argument list.
    ///
    /// Pure and deterministic; every registered codec yields a
    /// non-empty list.
    pub fn build_video_args(&self, options: &EncodeOptions) -> FramecastResult<Vec<String>> {
        let crf = self.effective_crf(options)?;
        let mut args: Vec<String> = Vec::new();

        match self.codec {
            Codec::H264 => {
                args.extend(strings(&["-c:v", "libx264", "-preset", "medium"]));
                push_rate_control(&mut args, crf, options.bitrate.as_deref());
                args.extend(strings(&[
                    "-pix_fmt",
                    self.pixel_format,
                    "-movflags",
                    "+faststart",
                ]));
            }
            Codec::H265 => {
                args.extend(strings(&["-c:v", "libx265", "-preset", "medium"]));
                push_rate_control(&mut args, crf, options.bitrate.as_deref());
                args.extend(strings(&[
                    "-pix_fmt",
                    self.pixel_format,
                    "-tag:v",
                    "hvc1",
                    "-movflags",
                    "+faststart",
                ]));
            }
            Codec::Vp8 => {
                args.extend(strings(&["-c:v", "libvpx"]));
                push_rate_control(&mut args, crf, options.bitrate.as_deref());
                if options.bitrate.is_none() {
                    // libvpx treats -crf as a ceiling unless the target
                    // bitrate is pinned.
                    args.extend(strings(&["-b:v", "1M"]));
                }
                args.extend(strings(&["-pix_fmt", self.pixel_format]));
            }
            Codec::Vp9 => {
                args.extend(strings(&["-c:v", "libvpx-vp9"]));
                push_rate_control(&mut args, crf, options.bitrate.as_deref());
                if options.bitrate.is_none() {
                    // -b:v 0 switches libvpx-vp9 into constant-quality mode.
                    args.extend(strings(&["-b:v", "0"]));
                }
                args.extend(strings(&["-pix_fmt", self.pixel_format]));
            }
            Codec::ProRes => {
                let profile = resolve_prores_profile(options.quality_profile.as_deref());
                args.extend(strings(&["-c:v", "prores_ks", "-profile:v"]));
                args.push(profile.to_string());
                args.extend(strings(&["-pix_fmt", self.pixel_format]));
            }
            Codec::Gif => {
                // One invocation with a palette filter graph; a separate
                // palettegen pass would double the subprocess count and
                // leave a palette file behind on failure.
                let fps = if options.fps > 0.0 { options.fps } else { 30.0 };
                args.push("-vf".to_string());
                args.push(format!(
                    "fps={fps},split[s0][s1];[s0]palettegen[p];[s1][p]paletteuse"
                ));
                args.extend(strings(&["-loop", "0"]));
            }
        }

        Ok(args)
    }
}

/// Audio argument construction, independent of the video codec.
///
/// Returns the encode-side arguments appended after the video args when
/// a second audio input is present.
pub fn build_audio_args() -> Vec<String> {
    strings(&["-c:a", "aac", "-b:a", "192k", "-shortest"])
}

fn push_rate_control(args: &mut Vec<String>, crf: Option<u32>, bitrate: Option<&str>) {
    if let Some(bitrate) = bitrate {
        args.push("-b:v".to_string());
        args.push(bitrate.to_string());
    } else if let Some(crf) = crf {
        args.push("-crf".to_string());
        args.push(crf.to_string());
    }
}

fn resolve_prores_profile(requested: Option<&str>) -> &'static str {
    let name = requested.unwrap_or(DEFAULT_PRORES_PROFILE);
    let normalized = name.trim().to_ascii_lowercase();
    if let Some((_, value)) = PRORES_PROFILES.iter().find(|(n, _)| *n == normalized) {
        return value;
    }

    tracing::warn!(
        requested = name,
        fallback = DEFAULT_PRORES_PROFILE,
        "Unknown ProRes profile, using default"
    );
    PRORES_PROFILES
        .iter()
        .find(|(n, _)| *n == DEFAULT_PRORES_PROFILE)
        .map(|(_, v)| *v)
        .unwrap_or("3")
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

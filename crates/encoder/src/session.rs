//! Encoder subprocess session.
//!
//! One `EncoderSession` owns one ffmpeg process for its whole lifetime:
//! spawned with an image2pipe input, fed frames strictly in timeline
//! order on stdin, then either finished (stdin closed, exit status
//! validated) or aborted (killed and reaped). stderr is drained
//! concurrently so the child never blocks on a full pipe.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};

use framecast_common::error::{FramecastError, FramecastResult};

use crate::codecs::{build_audio_args, Codec, EncodeOptions};

/// Settings for one encoder invocation.
#[derive(Debug, Clone)]
pub struct EncoderSettings {
    /// Target codec.
    pub codec: Codec,

    /// Encode options forwarded to the codec registry.
    pub options: EncodeOptions,

    /// Input frame rate of the piped image stream.
    pub fps: f64,

    /// Output file path; its extension should match the codec profile.
    pub out_path: PathBuf,

    /// Optional audio input muxed into the output.
    pub audio_path: Option<PathBuf>,

    /// Whether audio is dropped even when available.
    pub muted: bool,
}

impl EncoderSettings {
    /// Whether this invocation muxes an audio input.
    pub fn wants_audio(&self) -> bool {
        !self.muted && self.audio_path.is_some() && self.codec.profile().supports_audio
    }
}

/// Build the complete ffmpeg argument list for a session.
///
/// Pure; exposed separately from spawning so tests can assert on the
/// grammar without a subprocess.
pub fn build_encoder_args(settings: &EncoderSettings) -> FramecastResult<Vec<String>> {
    let mut args: Vec<String> = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "image2pipe".to_string(),
        "-framerate".to_string(),
        format_fps(settings.fps),
        "-i".to_string(),
        "-".to_string(),
    ];

    let wants_audio = settings.wants_audio();
    if wants_audio {
        if let Some(audio) = &settings.audio_path {
            args.push("-i".to_string());
            args.push(audio.display().to_string());
        }
    }

    args.extend(settings.codec.profile().build_video_args(&settings.options)?);

    if wants_audio {
        args.extend(build_audio_args());
    } else {
        args.push("-an".to_string());
    }

    args.push(settings.out_path.display().to_string());
    Ok(args)
}

/// A live ffmpeg subprocess accepting an ordered frame stream.
pub struct EncoderSession {
    child: Child,
    stdin: Option<ChildStdin>,
    stderr_task: tokio::task::JoinHandle<String>,
    out_path: PathBuf,
    frames_written: u64,
}

impl EncoderSession {
    /// Spawn the encoder process.
    pub async fn spawn(settings: EncoderSettings) -> FramecastResult<Self> {
        if let Some(parent) = settings.out_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let args = build_encoder_args(&settings)?;
        tracing::debug!(out = %settings.out_path.display(), ?args, "Spawning ffmpeg");

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                FramecastError::encode_failed(format!(
                    "failed to spawn ffmpeg (is it installed and on PATH?): {e}"
                ))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| FramecastError::encode_failed("failed to open ffmpeg stdin"))?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| FramecastError::encode_failed("failed to capture ffmpeg stderr"))?;

        // Drain stderr concurrently so ffmpeg never blocks on a full pipe.
        let stderr_task = tokio::spawn(async move {
            use tokio::io::AsyncReadExt;
            let mut reader = stderr;
            let mut output = String::new();
            match reader.read_to_string(&mut output).await {
                Ok(_) => output,
                Err(err) => format!("<failed to read ffmpeg stderr: {err}>"),
            }
        });

        Ok(Self {
            child,
            stdin: Some(stdin),
            stderr_task,
            out_path: settings.out_path,
            frames_written: 0,
        })
    }

    /// Write one encoded image to the input stream.
    ///
    /// Frames must arrive in strictly increasing timeline order; the
    /// encoder interprets stdin as an order-dependent fixed-rate
    /// stream. A full pipe blocks here, which throttles capture to
    /// encoder throughput.
    pub async fn write_frame(&mut self, frame: &[u8]) -> FramecastResult<()> {
        let Some(stdin) = self.stdin.as_mut() else {
            return Err(FramecastError::encode_failed(
                "write after encoder input was closed",
            ));
        };

        if let Err(write_err) = stdin.write_all(frame).await {
            // Usually a broken pipe: ffmpeg died and closed its end.
            // Reap it and surface its diagnostics instead of the bare
            // I/O error.
            let diagnostics = self.collect_failure().await;
            return Err(FramecastError::encode_failed(format!(
                "writing frame {} failed ({write_err}): {diagnostics}",
                self.frames_written
            )));
        }

        self.frames_written += 1;
        Ok(())
    }

    /// Close the input stream, await the exit status, and validate it.
    pub async fn finish(mut self) -> FramecastResult<PathBuf> {
        drop(self.stdin.take());

        let status = self
            .child
            .wait()
            .await
            .map_err(|e| FramecastError::encode_failed(format!("failed to wait on ffmpeg: {e}")))?;

        let stderr = await_stderr(self.stderr_task).await;

        if !status.success() {
            return Err(FramecastError::encode_failed(format!(
                "ffmpeg exited with status {status}: {}",
                stderr.trim()
            )));
        }

        tracing::debug!(
            out = %self.out_path.display(),
            frames = self.frames_written,
            "Encoder finished"
        );
        Ok(self.out_path)
    }

    /// Kill the subprocess and reap it. Used on every error and
    /// cancellation path; never fails the caller's teardown.
    pub async fn abort(mut self) {
        drop(self.stdin.take());
        if let Err(e) = self.child.start_kill() {
            tracing::warn!(error = %e, "Failed to kill ffmpeg");
        }
        if let Err(e) = self.child.wait().await {
            tracing::warn!(error = %e, "Failed to reap ffmpeg");
        }
        self.stderr_task.abort();
    }

    /// Number of frames accepted so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    async fn collect_failure(&mut self) -> String {
        drop(self.stdin.take());
        let _ = self.child.start_kill();
        let _ = self.child.wait().await;

        let mut output = String::new();
        if let Ok(joined) =
            tokio::time::timeout(std::time::Duration::from_secs(5), &mut self.stderr_task).await
        {
            if let Ok(text) = joined {
                output = text;
            }
        }
        if output.trim().is_empty() {
            "<no stderr output>".to_string()
        } else {
            output.trim().to_string()
        }
    }
}

async fn await_stderr(task: tokio::task::JoinHandle<String>) -> String {
    match task.await {
        Ok(text) => text,
        Err(_) => "<failed to join stderr reader>".to_string(),
    }
}

/// Losslessly concatenate encoded segments into one output file.
///
/// Uses the concat demuxer with stream copy (no re-encoding), so the
/// merged file is byte-consistent regardless of which segment finished
/// first. Segments must be passed in ascending timeline order. An
/// optional audio input is muxed during the merge.
pub async fn concat_segments(
    segments: &[PathBuf],
    out_path: &Path,
    audio_path: Option<&Path>,
) -> FramecastResult<()> {
    if segments.is_empty() {
        return Err(FramecastError::encode_failed(
            "no segments to concatenate",
        ));
    }

    let list_path = out_path.with_extension("segments.txt");
    let mut list = String::new();
    for segment in segments {
        // The concat demuxer's quoting rule: single quotes around the
        // path, embedded quotes escaped.
        let escaped = segment.display().to_string().replace('\'', "'\\''");
        list.push_str(&format!("file '{escaped}'\n"));
    }
    tokio::fs::write(&list_path, list).await?;

    let mut args: Vec<String> = vec![
        "-y".to_string(),
        "-hide_banner".to_string(),
        "-loglevel".to_string(),
        "error".to_string(),
        "-f".to_string(),
        "concat".to_string(),
        "-safe".to_string(),
        "0".to_string(),
        "-i".to_string(),
        list_path.display().to_string(),
    ];

    if let Some(audio) = audio_path {
        args.push("-i".to_string());
        args.push(audio.display().to_string());
        args.extend([
            "-map".to_string(),
            "0:v".to_string(),
            "-map".to_string(),
            "1:a".to_string(),
        ]);
        args.push("-c:v".to_string());
        args.push("copy".to_string());
        args.extend(build_audio_args());
    } else {
        args.push("-c".to_string());
        args.push("copy".to_string());
    }

    args.push(out_path.display().to_string());

    let output = Command::new("ffmpeg")
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| FramecastError::encode_failed(format!("failed to run ffmpeg concat: {e}")))?;

    tokio::fs::remove_file(&list_path).await.ok();

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(FramecastError::encode_failed(format!(
            "segment concat exited with status {}: {}",
            output.status,
            stderr.trim()
        )));
    }

    Ok(())
}

/// Whether ffmpeg is reachable on PATH.
pub fn is_ffmpeg_available() -> bool {
    std::process::Command::new("ffmpeg")
        .arg("-version")
        .stdout(std::process::Stdio::null())
        .stderr(std::process::Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}


fn format_fps(fps: f64) -> String {
    if (fps - fps.round()).abs() < f64::EPSILON {
        format!("{}", fps.round() as u64)
    } else {
        format!("{fps}")
    }
}

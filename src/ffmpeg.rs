//! `MediaEngine` backed by the `ffmpeg` and `ffprobe` command line tools.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::engine::{MediaEngine, ProgressFn, TranscodeJob, TranscodeOutcome};
use crate::error::EngineError;
use crate::probe::MediaInfo;
use crate::progress::ProgressParser;

const STDERR_TAIL: usize = 4096;

#[derive(Debug, Clone)]
pub struct FfmpegCli {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegCli {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        FfmpegCli {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, EngineError> {
        let tool = tool_name(&self.ffprobe);
        let output = Command::new(&self.ffprobe)
            .args(["-v", "error", "-print_format", "json", "-show_format", "-show_streams"])
            .arg(path_arg(path))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|source| EngineError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(EngineError::Exited {
                tool,
                status: output.status.to_string(),
                detail: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_probe_output(&output.stdout)
    }

    async fn run(
        &self,
        job: &TranscodeJob,
        progress: &ProgressFn<'_>,
        cancel: CancellationToken,
    ) -> Result<TranscodeOutcome, EngineError> {
        let tool = tool_name(&self.ffmpeg);
        let args = transcode_args(job);
        debug!("ffmpeg args: {:?}", args);

        let mut child = Command::new(&self.ffmpeg)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| EngineError::Spawn {
                tool: tool.clone(),
                source,
            })?;

        let stdout = child.stdout.take().ok_or_else(|| EngineError::Io {
            tool: tool.clone(),
            source: io::Error::other("stdout was not captured"),
        })?;
        let stderr = child.stderr.take().map(|stderr| tokio::spawn(read_tail(stderr)));

        let mut lines = BufReader::new(stdout).lines();
        let mut parser = ProgressParser::new(job.duration);
        let mut stdout_open = true;

        let status = loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    // kill() also reaps the child.
                    if let Err(err) = child.kill().await {
                        warn!("could not kill {}: {}", tool, err);
                    }
                    if let Some(task) = stderr {
                        task.abort();
                    }
                    return Ok(TranscodeOutcome::Cancelled);
                }
                line = lines.next_line(), if stdout_open => match line {
                    Ok(Some(line)) => {
                        if let Some(pct) = parser.feed(&line) {
                            progress(pct);
                        }
                    }
                    Ok(None) => stdout_open = false,
                    Err(err) => {
                        warn!("could not read {} progress: {}", tool, err);
                        stdout_open = false;
                    }
                },
                status = child.wait(), if !stdout_open => {
                    break status.map_err(|source| EngineError::Io {
                        tool: tool.clone(),
                        source,
                    })?;
                }
            }
        };

        if status.success() {
            return Ok(TranscodeOutcome::Completed);
        }

        let detail = match stderr {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };
        Ok(TranscodeOutcome::Failed {
            tool,
            status: status.to_string(),
            detail,
        })
    }
}

impl MediaEngine for FfmpegCli {
    fn analyze<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<MediaInfo, EngineError>> {
        self.probe(path).boxed()
    }

    fn transcode<'a>(
        &'a self,
        job: &'a TranscodeJob,
        progress: &'a ProgressFn<'a>,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<TranscodeOutcome, EngineError>> {
        self.run(job, progress, cancel).boxed()
    }
}

/// Maps a codec name from the format policy onto the ffmpeg encoder that
/// produces it.
pub fn encoder_for(codec: &str) -> &str {
    match codec {
        "h264" => "libx264",
        "vp9" => "libvpx-vp9",
        "vorbis" => "libvorbis",
        "mp3" => "libmp3lame",
        other => other,
    }
}

pub(crate) fn transcode_args(job: &TranscodeJob) -> Vec<String> {
    let mut args: Vec<String> = ["-hide_banner", "-nostats", "-progress", "pipe:1"]
        .into_iter()
        .map(String::from)
        .collect();
    args.push(if job.overwrite { "-y" } else { "-n" }.to_string());
    args.push("-i".to_string());
    args.push(path_arg(&job.input).to_string_lossy().into_owned());
    args.extend([
        "-c:v".to_string(),
        encoder_for(job.video_codec).to_string(),
        "-b:v".to_string(),
        job.video_bit_rate.to_string(),
        "-c:a".to_string(),
        encoder_for(job.audio_codec).to_string(),
        "-b:a".to_string(),
        job.audio_bit_rate.to_string(),
    ]);
    args.push(path_arg(&job.output).to_string_lossy().into_owned());
    args
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    duration: Option<String>,
    disposition: Option<HashMap<String, i32>>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

impl ProbeStream {
    fn is_video(&self) -> bool {
        // Cover art shows up as a video stream with attached_pic set.
        let attached_pic = self
            .disposition
            .as_ref()
            .and_then(|d| d.get("attached_pic"))
            .is_some_and(|&flag| flag != 0);
        self.codec_type.as_deref() == Some("video") && !attached_pic
    }
}

pub(crate) fn parse_probe_output(json: &[u8]) -> Result<MediaInfo, EngineError> {
    let output: ProbeOutput = serde_json::from_slice(json).map_err(|err| EngineError::Parse {
        tool: "ffprobe".to_string(),
        message: err.to_string(),
    })?;

    let container = output
        .format
        .as_ref()
        .and_then(|f| parse_seconds(f.duration.as_deref()));
    let longest_stream = output
        .streams
        .iter()
        .filter_map(|s| parse_seconds(s.duration.as_deref()))
        .max();

    Ok(MediaInfo {
        duration: container.or(longest_stream).unwrap_or_default(),
        has_video: output.streams.iter().any(ProbeStream::is_video),
    })
}

fn parse_seconds(value: Option<&str>) -> Option<Duration> {
    let secs = value?.trim().parse::<f64>().ok()?;
    if secs.is_finite() && secs >= 0.0 {
        Some(Duration::from_secs_f64(secs))
    } else {
        None
    }
}

/// Keeps a relative path that starts with `-` from being read as an option.
fn path_arg(path: &Path) -> PathBuf {
    if path.is_relative() && path.as_os_str().to_string_lossy().starts_with('-') {
        Path::new(".").join(path)
    } else {
        path.to_path_buf()
    }
}

fn tool_name(program: &Path) -> String {
    program
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.to_string_lossy().into_owned())
}

async fn read_tail<R: AsyncRead + Unpin>(mut reader: R) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if buf.len() > STDERR_TAIL * 2 {
                    buf.drain(..buf.len() - STDERR_TAIL);
                }
            }
        }
    }
    let start = buf.len().saturating_sub(STDERR_TAIL);
    String::from_utf8_lossy(&buf[start..]).trim().to_string()
}

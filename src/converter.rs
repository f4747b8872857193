use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::engine::{MediaEngine, TranscodeJob, TranscodeOutcome};
use crate::error::{EngineError, Error, Result};
use crate::formats::{SupportedFormat, AUDIO_BIT_RATE, VIDEO_BIT_RATE};
use crate::probe::{self, MediaInfo, Prober};
use crate::progress::MonotonicProgress;

/// Caller supplied progress callback, percentage in `0.0..=100.0`.
pub type ProgressSink = Arc<dyn Fn(f64) + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub struct ConversionResult {
    pub output_path: PathBuf,
    pub duration: Duration,
}

/// Validates conversion requests and drives the media engine.
///
/// Once [`Converter::dispose`] has been called every operation fails with
/// [`Error::AlreadyDisposed`] and conversions still in flight are cancelled.
pub struct Converter {
    engine: Arc<dyn MediaEngine>,
    prober: Prober,
    strict_exit: bool,
    disposed: AtomicBool,
    shutdown: CancellationToken,
}

impl Converter {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Converter {
            prober: Prober::new(Arc::clone(&engine)),
            engine,
            strict_exit: false,
            disposed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// When set, a transcoder that exits unsuccessfully without raising an
    /// error fails the conversion instead of returning the output path.
    pub fn with_strict_exit(mut self, strict: bool) -> Self {
        self.strict_exit = strict;
        self
    }

    pub fn dispose(&self) {
        if !self.disposed.swap(true, Ordering::AcqRel) {
            self.shutdown.cancel();
            info!("converter disposed");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    fn ensure_alive(&self) -> Result<()> {
        if self.is_disposed() {
            return Err(Error::AlreadyDisposed);
        }
        Ok(())
    }

    pub async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        self.ensure_alive()?;
        self.prober.probe(path).await
    }

    /// Converts `input` next to itself, replacing the extension with
    /// `output_format`. An existing file at that path is overwritten.
    ///
    /// A transcoder that finishes with a non-success status is only logged
    /// unless strict exit checking is enabled, so a returned path does not by
    /// itself prove the output is playable.
    pub async fn convert(
        &self,
        input: &Path,
        output_format: &str,
        progress: Option<ProgressSink>,
        cancel: Option<CancellationToken>,
    ) -> Result<ConversionResult> {
        self.ensure_alive()?;
        info!(input = %input.display(), format = output_format, "starting conversion");

        if !probe::is_file(input).await {
            warn!(input = %input.display(), "input file not found");
            return Err(Error::InputNotFound(input.to_path_buf()));
        }

        let Some(format) = SupportedFormat::parse(output_format) else {
            warn!(format = output_format, "unsupported output format");
            return Err(Error::UnsupportedFormat {
                format: output_format.to_string(),
            });
        };

        let info = self.prober.probe(input).await?;
        info!(
            input = %input.display(),
            duration = info.duration.as_secs_f64(),
            "duration probed"
        );
        if !info.has_video {
            warn!(input = %input.display(), "input has no video stream");
            return Err(Error::NoVideoStream(input.to_path_buf()));
        }

        let codecs = format.codecs();
        let job = TranscodeJob {
            input: input.to_path_buf(),
            output: input.with_extension(format.extension()),
            video_codec: codecs.video,
            audio_codec: codecs.audio,
            video_bit_rate: VIDEO_BIT_RATE,
            audio_bit_rate: AUDIO_BIT_RATE,
            overwrite: true,
            duration: info.duration,
        };

        let monotonic = MonotonicProgress::new();
        let report = |pct: f64| {
            if let Some(pct) = monotonic.observe(pct) {
                debug!(progress = pct, "conversion progress");
                if let Some(sink) = &progress {
                    sink(pct);
                }
            }
        };

        let call = self.shutdown.child_token();
        let caller = cancel.unwrap_or_else(CancellationToken::new);
        let outcome = {
            let mut transcode = self.engine.transcode(&job, &report, call.clone());
            loop {
                tokio::select! {
                    outcome = &mut transcode => break outcome,
                    _ = caller.cancelled(), if !call.is_cancelled() => call.cancel(),
                }
            }
        };

        match outcome {
            Ok(TranscodeOutcome::Completed) => {
                info!(output = %job.output.display(), "conversion completed");
            }
            Ok(TranscodeOutcome::Failed {
                tool,
                status,
                detail,
            }) => {
                if self.strict_exit {
                    error!(input = %input.display(), %tool, %status, "transcoder reported failure");
                    return Err(Error::TranscoderFailure(EngineError::Exited {
                        tool,
                        status,
                        detail,
                    }));
                }
                warn!(
                    output = %job.output.display(),
                    %status,
                    "transcoder reported failure, returning output path anyway"
                );
            }
            Ok(TranscodeOutcome::Cancelled) => {
                info!(input = %input.display(), "conversion cancelled");
                return Err(Error::Cancelled);
            }
            Err(err) => {
                error!(
                    input = %input.display(),
                    output = %job.output.display(),
                    "conversion failed: {}",
                    err
                );
                return Err(err.into());
            }
        }

        Ok(ConversionResult {
            output_path: job.output,
            duration: info.duration,
        })
    }
}

impl Drop for Converter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

//! In-process analysis through libavformat. Transcoding still goes through the
//! ffmpeg CLI so that cancellation can always terminate a child process.

use std::path::Path;
use std::time::Duration;

use ffmpeg_next::{format, media};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::engine::{MediaEngine, ProgressFn, TranscodeJob, TranscodeOutcome};
use crate::error::EngineError;
use crate::ffmpeg::FfmpegCli;
use crate::probe::MediaInfo;

pub struct LibavEngine {
    cli: FfmpegCli,
}

impl LibavEngine {
    pub fn new(cli: FfmpegCli) -> Result<Self, EngineError> {
        ffmpeg_next::init()?;
        Ok(LibavEngine { cli })
    }
}

impl MediaEngine for LibavEngine {
    fn analyze<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<MediaInfo, EngineError>> {
        let path = path.to_path_buf();
        async move { tokio::task::spawn_blocking(move || analyze_blocking(&path)).await? }.boxed()
    }

    fn transcode<'a>(
        &'a self,
        job: &'a TranscodeJob,
        progress: &'a ProgressFn<'a>,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<TranscodeOutcome, EngineError>> {
        self.cli.transcode(job, progress, cancel)
    }
}

fn analyze_blocking(path: &Path) -> Result<MediaInfo, EngineError> {
    let ictx = format::input(path)?;

    // Container duration is in AV_TIME_BASE (microsecond) units.
    let duration = if ictx.duration() > 0 {
        Duration::from_micros(ictx.duration() as u64)
    } else {
        ictx.streams()
            .filter(|stream| stream.duration() > 0)
            .map(|stream| {
                let tb = stream.time_base();
                let secs = stream.duration() as f64 * f64::from(tb.numerator())
                    / f64::from(tb.denominator().max(1));
                Duration::from_secs_f64(secs.max(0.0))
            })
            .max()
            .unwrap_or_default()
    };

    let has_video = ictx.streams().any(|stream| {
        stream.parameters().medium() == media::Type::Video
            && !stream
                .disposition()
                .contains(format::stream::Disposition::ATTACHED_PIC)
    });

    Ok(MediaInfo {
        duration,
        has_video,
    })
}

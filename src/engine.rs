use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio_util::sync::CancellationToken;

use crate::error::EngineError;
use crate::probe::MediaInfo;

/// Receives progress as a percentage in `0.0..=100.0`.
pub type ProgressFn<'a> = dyn Fn(f64) + Send + Sync + 'a;

/// A fully resolved transcoder invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub input: PathBuf,
    pub output: PathBuf,
    pub video_codec: &'static str,
    pub audio_codec: &'static str,
    pub video_bit_rate: usize,
    pub audio_bit_rate: usize,
    pub overwrite: bool,
    /// Source duration, used to turn elapsed output time into a percentage.
    pub duration: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscodeOutcome {
    Completed,
    /// The process finished on its own but reported non-success.
    Failed {
        tool: String,
        status: String,
        detail: String,
    },
    Cancelled,
}

/// The external transcoder, reduced to the two capabilities the converter needs.
///
/// `transcode` must not leave a child process behind once the returned future
/// resolves or is dropped, including after `cancel` fires.
pub trait MediaEngine: Send + Sync {
    fn analyze<'a>(&'a self, path: &'a Path) -> BoxFuture<'a, Result<MediaInfo, EngineError>>;

    fn transcode<'a>(
        &'a self,
        job: &'a TranscodeJob,
        progress: &'a ProgressFn<'a>,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<TranscodeOutcome, EngineError>>;
}

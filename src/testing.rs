use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use crate::engine::{MediaEngine, ProgressFn, TranscodeJob, TranscodeOutcome};
use crate::error::EngineError;
use crate::probe::MediaInfo;

/// Scriptable engine that writes a small output file instead of transcoding.
pub struct FakeEngine {
    info: MediaInfo,
    outcome: TranscodeOutcome,
    progress: Vec<f64>,
    fail: bool,
    wait_for_cancel: bool,
    analyze_calls: AtomicUsize,
    saw_cancel: AtomicBool,
    jobs: Mutex<Vec<TranscodeJob>>,
}

impl Default for FakeEngine {
    fn default() -> Self {
        FakeEngine::new(MediaInfo {
            duration: Duration::from_secs(65),
            has_video: true,
        })
    }
}

impl FakeEngine {
    pub fn new(info: MediaInfo) -> Self {
        FakeEngine {
            info,
            outcome: TranscodeOutcome::Completed,
            progress: Vec::new(),
            fail: false,
            wait_for_cancel: false,
            analyze_calls: AtomicUsize::new(0),
            saw_cancel: AtomicBool::new(false),
            jobs: Mutex::new(Vec::new()),
        }
    }

    pub fn with_outcome(mut self, outcome: TranscodeOutcome) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn with_progress(mut self, progress: Vec<f64>) -> Self {
        self.progress = progress;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn until_cancelled(mut self) -> Self {
        self.wait_for_cancel = true;
        self
    }

    pub fn analyze_calls(&self) -> usize {
        self.analyze_calls.load(Ordering::SeqCst)
    }

    pub fn saw_cancel(&self) -> bool {
        self.saw_cancel.load(Ordering::SeqCst)
    }

    pub fn jobs(&self) -> Vec<TranscodeJob> {
        self.jobs.lock().unwrap().clone()
    }
}

impl MediaEngine for FakeEngine {
    fn analyze<'a>(&'a self, _path: &'a Path) -> BoxFuture<'a, Result<MediaInfo, EngineError>> {
        self.analyze_calls.fetch_add(1, Ordering::SeqCst);
        let info = self.info;
        async move { Ok(info) }.boxed()
    }

    fn transcode<'a>(
        &'a self,
        job: &'a TranscodeJob,
        progress: &'a ProgressFn<'a>,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<TranscodeOutcome, EngineError>> {
        async move {
            self.jobs.lock().unwrap().push(job.clone());

            if self.fail {
                return Err(EngineError::Spawn {
                    tool: "fake".to_string(),
                    source: io::Error::other("no such engine"),
                });
            }
            for pct in &self.progress {
                progress(*pct);
            }
            if self.wait_for_cancel {
                cancel.cancelled().await;
                self.saw_cancel.store(true, Ordering::SeqCst);
                return Ok(TranscodeOutcome::Cancelled);
            }

            std::fs::write(&job.output, b"converted").map_err(|source| EngineError::Io {
                tool: "fake".to_string(),
                source,
            })?;
            Ok(self.outcome.clone())
        }
        .boxed()
    }
}

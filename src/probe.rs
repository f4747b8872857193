use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tokio::fs;
use tracing::{debug, error};

use crate::engine::MediaEngine;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MediaInfo {
    /// Zero when the container does not report a duration.
    pub duration: Duration,
    pub has_video: bool,
}

/// Read-only stream inspection on top of the engine's analyze capability.
///
/// A file without video is a valid probe result; deciding that it cannot be
/// converted is up to the caller.
#[derive(Clone)]
pub struct Prober {
    engine: Arc<dyn MediaEngine>,
}

impl Prober {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Prober { engine }
    }

    pub async fn probe(&self, path: &Path) -> Result<MediaInfo> {
        if !is_file(path).await {
            return Err(Error::InputNotFound(path.to_path_buf()));
        }

        let info = self.engine.analyze(path).await.map_err(|err| {
            error!(path = %path.display(), "probe failed: {}", err);
            Error::from(err)
        })?;
        debug!(
            path = %path.display(),
            duration = info.duration.as_secs_f64(),
            has_video = info.has_video,
            "probed media"
        );
        Ok(info)
    }
}

pub(crate) async fn is_file(path: &Path) -> bool {
    fs::metadata(path)
        .await
        .map(|meta| meta.is_file())
        .unwrap_or(false)
}

pub mod config;
pub mod converter;
pub mod dto;
pub mod engine;
pub mod error;
pub mod ffmpeg;
pub mod formats;
#[cfg(feature = "libav")]
pub mod libav;
pub mod probe;
pub mod progress;
pub mod server;
#[cfg(test)]
mod testing;
pub mod upload;

pub use converter::{ConversionResult, Converter, ProgressSink};
pub use engine::{MediaEngine, TranscodeJob, TranscodeOutcome};
pub use error::{EngineError, Error, Result};
pub use probe::MediaInfo;
pub use upload::{StoredUpload, UploadGate};

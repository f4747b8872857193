//! Output container policy and the upload extension whitelist.
//!
//! The two tables are intentionally separate: what we accept on upload is not
//! the same set as what we can produce.

use std::fmt;

use crate::error::{Error, Result};

pub const VIDEO_BIT_RATE: usize = 2_000_000;
pub const AUDIO_BIT_RATE: usize = 128_000;

pub const OUTPUT_FORMATS: &[&str] = &["mp4", "webm", "avi", "mov", "mkv"];
pub const UPLOAD_EXTENSIONS: &[&str] = &["mp4", "avi", "mov", "mkv", "wmv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SupportedFormat {
    Mp4,
    Webm,
    Avi,
    Mov,
    Mkv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CodecPair {
    pub video: &'static str,
    pub audio: &'static str,
}

const CODECS: &[(SupportedFormat, CodecPair)] = &[
    (SupportedFormat::Mp4, CodecPair { video: "h264", audio: "aac" }),
    (SupportedFormat::Webm, CodecPair { video: "vp9", audio: "vorbis" }),
    (SupportedFormat::Avi, CodecPair { video: "mpeg4", audio: "mp3" }),
    (SupportedFormat::Mov, CodecPair { video: "h264", audio: "aac" }),
    (SupportedFormat::Mkv, CodecPair { video: "h264", audio: "aac" }),
];

impl SupportedFormat {
    /// Parses `mp4`, `MP4`, `.mp4` and the like.
    pub fn parse(format: &str) -> Option<SupportedFormat> {
        match normalize(format).as_str() {
            "mp4" => Some(SupportedFormat::Mp4),
            "webm" => Some(SupportedFormat::Webm),
            "avi" => Some(SupportedFormat::Avi),
            "mov" => Some(SupportedFormat::Mov),
            "mkv" => Some(SupportedFormat::Mkv),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            SupportedFormat::Mp4 => "mp4",
            SupportedFormat::Webm => "webm",
            SupportedFormat::Avi => "avi",
            SupportedFormat::Mov => "mov",
            SupportedFormat::Mkv => "mkv",
        }
    }

    pub fn codecs(self) -> CodecPair {
        // CODECS is ordered by discriminant.
        CODECS[self as usize].1
    }
}

impl fmt::Display for SupportedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Lower-cases and strips a single leading `.`.
pub fn normalize(format: &str) -> String {
    let format = format.trim();
    format.strip_prefix('.').unwrap_or(format).to_lowercase()
}

pub fn is_supported(format: &str) -> bool {
    SupportedFormat::parse(format).is_some()
}

pub fn codecs_for(format: &str) -> Result<CodecPair> {
    SupportedFormat::parse(format)
        .map(SupportedFormat::codecs)
        .ok_or_else(|| Error::UnsupportedFormat {
            format: format.to_string(),
        })
}

pub fn is_allowed_upload_extension(extension: &str) -> bool {
    let extension = normalize(extension);
    UPLOAD_EXTENSIONS.contains(&extension.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_output_format_is_supported_in_any_spelling() {
        for format in OUTPUT_FORMATS {
            assert!(is_supported(format), "{format}");
            assert!(is_supported(&format.to_uppercase()), "{format}");
            assert!(is_supported(&format!(".{format}")), "{format}");
            assert!(is_supported(&format!(".{}", format.to_uppercase())), "{format}");
        }
    }

    #[test]
    fn anything_else_is_unsupported() {
        for format in ["", ".", "flv", "wmv", "mp", "mp4.", "..mp4", "mp4x", "h264"] {
            assert!(!is_supported(format), "{format}");
        }
    }

    #[test]
    fn codecs_ignore_case_and_leading_dot() {
        let expected = CodecPair {
            video: "h264",
            audio: "aac",
        };
        assert_eq!(codecs_for("MP4").unwrap(), expected);
        assert_eq!(codecs_for(".mp4").unwrap(), expected);
        assert_eq!(codecs_for("mp4").unwrap(), expected);
    }

    #[test]
    fn every_format_has_exactly_one_codec_pair() {
        for format in OUTPUT_FORMATS {
            let parsed = SupportedFormat::parse(format).unwrap();
            let entries = CODECS.iter().filter(|(f, _)| *f == parsed).count();
            assert_eq!(entries, 1, "{format}");
            assert_eq!(CODECS[parsed as usize].0, parsed);
            assert_eq!(parsed.extension(), *format);
        }
        assert_eq!(
            codecs_for("webm").unwrap(),
            CodecPair {
                video: "vp9",
                audio: "vorbis"
            }
        );
        assert_eq!(
            codecs_for("avi").unwrap(),
            CodecPair {
                video: "mpeg4",
                audio: "mp3"
            }
        );
    }

    #[test]
    fn unknown_format_has_no_codecs() {
        match codecs_for("flv") {
            Err(Error::UnsupportedFormat { format }) => assert_eq!(format, "flv"),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn upload_whitelist_differs_from_output_formats() {
        assert!(is_allowed_upload_extension("WMV"));
        assert!(!is_supported("wmv"));
        assert!(is_supported("webm"));
        assert!(!is_allowed_upload_extension("webm"));
        assert!(!is_allowed_upload_extension("txt"));
    }
}

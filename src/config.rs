use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_LISTEN: &str = "0.0.0.0:8090";
const DEFAULT_CONVERT_TIMEOUT: u64 = 60 * 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub listen: String,
    pub upload_dir: PathBuf,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub convert_timeout: Duration,
    pub strict_transcode: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let upload_dir = lookup("UPLOAD_DIR")
            .filter(|val| !val.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| env::temp_dir().join("vtranscoder-uploads"));

        Config {
            listen: lookup("LISTEN").unwrap_or_else(|| DEFAULT_LISTEN.to_string()),
            upload_dir,
            ffmpeg_path: lookup("FFMPEG_PATH")
                .filter(|val| !val.is_empty())
                .map_or_else(|| PathBuf::from("ffmpeg"), PathBuf::from),
            ffprobe_path: lookup("FFPROBE_PATH")
                .filter(|val| !val.is_empty())
                .map_or_else(|| PathBuf::from("ffprobe"), PathBuf::from),
            convert_timeout: Duration::from_secs(
                lookup("CONVERT_TIMEOUT_SEC")
                    .and_then(|val| val.parse::<u64>().ok())
                    .filter(|&val| val > 0)
                    .unwrap_or(DEFAULT_CONVERT_TIMEOUT),
            ),
            strict_transcode: lookup("STRICT_TRANSCODE")
                .map(|val| matches!(val.to_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults() {
        let cfg = config(&[]);
        assert_eq!(cfg.listen, "0.0.0.0:8090");
        assert_eq!(cfg.upload_dir, env::temp_dir().join("vtranscoder-uploads"));
        assert_eq!(cfg.ffmpeg_path, PathBuf::from("ffmpeg"));
        assert_eq!(cfg.ffprobe_path, PathBuf::from("ffprobe"));
        assert_eq!(cfg.convert_timeout, Duration::from_secs(3600));
        assert!(!cfg.strict_transcode);
    }

    #[test]
    fn overrides() {
        let cfg = config(&[
            ("LISTEN", "127.0.0.1:9000"),
            ("UPLOAD_DIR", "/srv/uploads"),
            ("FFMPEG_PATH", "/opt/ffmpeg/bin/ffmpeg"),
            ("FFPROBE_PATH", "/opt/ffmpeg/bin/ffprobe"),
            ("CONVERT_TIMEOUT_SEC", "90"),
            ("STRICT_TRANSCODE", "TRUE"),
        ]);
        assert_eq!(cfg.listen, "127.0.0.1:9000");
        assert_eq!(cfg.upload_dir, PathBuf::from("/srv/uploads"));
        assert_eq!(cfg.ffmpeg_path, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(cfg.ffprobe_path, PathBuf::from("/opt/ffmpeg/bin/ffprobe"));
        assert_eq!(cfg.convert_timeout, Duration::from_secs(90));
        assert!(cfg.strict_transcode);
    }

    #[test]
    fn invalid_timeout_falls_back_to_default() {
        for value in ["0", "-5", "soon"] {
            let cfg = config(&[("CONVERT_TIMEOUT_SEC", value)]);
            assert_eq!(cfg.convert_timeout, Duration::from_secs(3600), "{value}");
        }
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Accumulates `ffmpeg -progress` key/value lines and yields a percentage at
/// the end of each block.
pub struct ProgressParser {
    duration: Duration,
    out_time: Option<Duration>,
}

impl ProgressParser {
    pub fn new(duration: Duration) -> Self {
        ProgressParser {
            duration,
            out_time: None,
        }
    }

    pub fn feed(&mut self, line: &str) -> Option<f64> {
        let (key, value) = line.trim().split_once('=')?;
        match key {
            // Older ffmpeg builds write microseconds under out_time_ms as well.
            "out_time_us" | "out_time_ms" => {
                if let Ok(us) = value.trim().parse::<i64>() {
                    self.out_time = Some(Duration::from_micros(us.max(0) as u64));
                }
                None
            }
            "progress" => {
                if value.trim() == "end" {
                    return Some(100.0);
                }
                let out_time = self.out_time?;
                if self.duration.is_zero() {
                    return None;
                }
                let pct = out_time.as_secs_f64() / self.duration.as_secs_f64() * 100.0;
                Some(pct.clamp(0.0, 100.0))
            }
            _ => None,
        }
    }
}

/// Drops any report that would move progress backwards and clamps the rest
/// to `0.0..=100.0`.
pub struct MonotonicProgress {
    last: AtomicU64,
}

impl MonotonicProgress {
    pub fn new() -> Self {
        MonotonicProgress {
            last: AtomicU64::new(f64::NEG_INFINITY.to_bits()),
        }
    }

    pub fn observe(&self, pct: f64) -> Option<f64> {
        if pct.is_nan() {
            return None;
        }
        let pct = pct.clamp(0.0, 100.0);
        let mut current = self.last.load(Ordering::Acquire);
        loop {
            if pct < f64::from_bits(current) {
                return None;
            }
            match self.last.compare_exchange_weak(
                current,
                pct.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(pct),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for MonotonicProgress {
    fn default() -> Self {
        Self::new()
    }
}

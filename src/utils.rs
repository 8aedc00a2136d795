use std::time::{SystemTime, UNIX_EPOCH};

pub fn get_current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Per-second rate of `count` over a window of `window_seconds`.
pub fn per_second(count: f64, window_seconds: u64) -> f64 {
    if window_seconds == 0 {
        return 0.0;
    }
    count / window_seconds as f64
}

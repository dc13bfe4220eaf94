use std::sync::LazyLock;

use regex::Regex;

static DURATION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Duration: (\d+):(\d+):([\d.]+)").expect("invalid duration regex"));
static TIME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"out_time_ms=(\d+)").expect("invalid time regex"));

/// Parse one line of engine output. Returns (percent 0-100 or None, clip
/// duration in seconds or None). The duration comes from the banner the
/// engine prints before encoding; percent only once the duration is known.
pub fn parse_engine_progress(line: &str, current_duration: Option<f64>) -> (Option<u8>, Option<f64>) {
    if let Some(caps) = DURATION_RE.captures(line) {
        let hours: f64 = caps[1].parse().unwrap_or(0.0);
        let minutes: f64 = caps[2].parse().unwrap_or(0.0);
        let seconds: f64 = caps[3].parse().unwrap_or(0.0);
        let duration = hours * 3600.0 + minutes * 60.0 + seconds;
        return (None, Some(duration));
    }

    if let Some(caps) = TIME_RE.captures(line)
        && let Some(dur) = current_duration
        && dur > 0.0
    {
        let current_time_ms: i64 = caps[1].parse().unwrap_or(0);
        let current_time = current_time_ms as f64 / 1_000_000.0;
        let percent = ((current_time / dur) * 100.0).min(100.0).round() as u8;
        return (Some(percent), Some(dur));
    }

    (None, current_duration)
}

//! Best-effort progress estimation from worker log lines.
//!
//! The extraction worker reports progress only through unstructured,
//! timestamped text, so the supervisor maps marker phrases to progress
//! floors and ceilings. This is inherently tied to the worker's exact
//! phrasing — which is why the whole heuristic is isolated in this one
//! pure function, swappable for structured progress events without
//! touching the tracker or supervisor.

/// Map one worker output line to a progress percentage.
///
/// `lines_seen` is the running count of output lines, used to creep
/// progress toward each phase's ceiling as the run produces more output.
/// The result is a hint, not a measurement: the tracker still enforces
/// monotonicity.
pub fn progress_hint(line: &str, lines_seen: usize) -> u8 {
    let n = lines_seen as u64;
    let capped = |ceiling: u64, base: u64, divisor: u64| (base + n / divisor).min(ceiling) as u8;

    if line.contains("all files processed") {
        100
    } else if line.contains("fully processed") {
        capped(95, 85, 3)
    } else if line.contains("uploading rows") {
        capped(85, 70, 4)
    } else if line.contains("analyzing") {
        capped(70, 50, 6)
    } else if line.contains("analysis started") {
        capped(50, 30, 8)
    } else if line.contains("processing started") {
        capped(30, 20, 10)
    } else if line.contains("connected") || line.contains("initialized") {
        15
    } else {
        20
    }
}

/// Pick the status-line worthy part of an output line, if any.
///
/// Routine lines keep the generic "in progress" message; lines announcing
/// starts, completions, uploads, or failures replace it, with the
/// `[HH:MM:SS]` stamp stripped.
pub fn salient_message(line: &str) -> Option<String> {
    const KEYWORDS: &[&str] = &[
        "started",
        "complete",
        "processed",
        "uploaded",
        "connected",
        "success",
        "failed",
        "error",
    ];
    if KEYWORDS.iter().any(|k| line.contains(k)) {
        Some(strip_stamp(line).to_string())
    } else {
        None
    }
}

fn strip_stamp(line: &str) -> &str {
    if line.starts_with('[') {
        if let Some(end) = line.find("] ") {
            return &line[end + 2..];
        }
    }
    line
}

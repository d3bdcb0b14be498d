//! Resource metric collection over a remote shell.
//!
//! One standardized one-liner per metric. Parsing is defensive by contract:
//! a missing or malformed value yields `None` and the probe stays a
//! liveness-only verdict. Metric trouble must never fake a host failure.

/// Shell one-liner reporting CPU utilization percent.
pub const CPU_COMMAND: &str =
    "top -bn1 | grep 'Cpu(s)' | awk '{print $2}' | sed 's/%us,//'";

/// Shell one-liner reporting memory utilization percent.
pub const MEM_COMMAND: &str = "free | grep Mem | awk '{print ($3/$2) * 100.0}'";

/// Shell one-liner reporting root-filesystem disk utilization percent.
pub const DISK_COMMAND: &str = "df -h / | tail -1 | awk '{print $5}' | sed 's/%//'";

/// Parses a percentage value out of command output.
///
/// Accepts surrounding whitespace and a trailing `%`. Returns `None` for
/// anything that does not parse to a finite number.
#[must_use]
pub fn parse_percent(output: &str) -> Option<f64> {
    let trimmed = output.trim().trim_end_matches('%');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => None,
    }
}

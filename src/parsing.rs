use std::time::Duration;

use crate::types::{PodUsageTotals, PodRequestTotals};

// binary suffixes must be tried before their decimal prefixes
const MEMORY_SUFFIXES: &[(&str, f64)] = &[
    ("Ki", 1024.0),
    ("Mi", 1_048_576.0),
    ("Gi", 1_073_741_824.0),
    ("Ti", 1_099_511_627_776.0),
    ("Pi", 1_125_899_906_842_624.0),
    ("Ei", 1_152_921_504_606_846_976.0),
    ("k", 1e3),
    ("K", 1e3),
    ("M", 1e6),
    ("G", 1e9),
    ("T", 1e12),
    ("P", 1e15),
    ("E", 1e18),
];

/// CPU quantity to millicores: `250m`, `0.5`, `2`, or the `n`/`u` forms the
/// metrics API reports.
pub fn parse_cpu_to_millicores(q: &str) -> Option<i64> {
    let q = q.trim();
    if let Some(nanos) = q.strip_suffix('n') {
        return nanos.parse::<i128>().ok().map(|n| (n / 1_000_000) as i64);
    }
    if let Some(micros) = q.strip_suffix('u') {
        return micros.parse::<i128>().ok().map(|u| (u / 1_000) as i64);
    }
    if let Some(milli) = q.strip_suffix('m') {
        return milli.parse::<i64>().ok();
    }
    q.parse::<f64>().ok().map(|cores| (cores * 1000.0).round() as i64)
}

/// Memory quantity to bytes. Plain numbers are bytes; decimal exponents
/// (`1e3`) and the canonical milli form (`1288490188800m`) are accepted.
pub fn parse_memory_to_bytes(q: &str) -> Option<i64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    if let Ok(bytes) = q.parse::<i64>() {
        return Some(bytes);
    }
    if let Some(bytes) = parse_decimal(q) {
        return Some(bytes.round() as i64);
    }
    if let Some(milli) = q.strip_suffix('m') {
        return parse_decimal(milli).map(|v| (v / 1000.0).round() as i64);
    }
    // `5E` fails parse_decimal above and lands on the exa suffix here
    MEMORY_SUFFIXES.iter().find_map(|(suffix, scale)| {
        let value = parse_decimal(q.strip_suffix(suffix)?)?;
        Some((value * scale).round() as i64)
    })
}

/// Digits with an optional fraction and exponent. Rejects `inf` and `nan`.
fn parse_decimal(s: &str) -> Option<f64> {
    let numeric = s.chars().any(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'));
    if !numeric {
        return None;
    }
    s.parse::<f64>().ok()
}

/// Usage as a percentage of requests; `None` where nothing (or zero) is requested.
pub fn compute_utilization_percentages(usage: &PodUsageTotals, req: &PodRequestTotals) -> (Option<f64>, Option<f64>) {
    let pct = |used: i64, requested: Option<i64>| {
        requested
            .filter(|r| *r > 0)
            .map(|r| used as f64 / r as f64 * 100.0)
    };
    (
        pct(usage.cpu_millicores, req.cpu_millicores),
        pct(usage.memory_bytes, req.memory_bytes),
    )
}

/// `None` when neither percentage is known.
pub fn any_exceeds(cpu_pct: Option<f64>, mem_pct: Option<f64>, threshold: f64) -> Option<bool> {
    if cpu_pct.is_none() && mem_pct.is_none() {
        return None;
    }
    Some([cpu_pct, mem_pct].into_iter().flatten().any(|v| v > threshold))
}

/// Parses humantime forms (`500ms`, `30s`, `1m30s`, `1h`) or a bare number
/// of seconds.
pub fn parse_duration(raw: &str) -> Result<Duration, String> {
    let q = raw.trim();
    if let Ok(secs) = q.parse::<u64>() {
        return Ok(Duration::from_secs(secs));
    }
    humantime::parse_duration(q).map_err(|e| format!("invalid duration `{}`: {}", raw, e))
}

/// Renders millicores the way quantities are usually written: whole cores
/// without a suffix, fractions in `m`.
pub fn format_millicores(mc: Option<i64>) -> String {
    match mc {
        None | Some(0) => "0".to_string(),
        Some(v) if v % 1000 == 0 => format!("{}", v / 1000),
        Some(v) => format!("{}m", v),
    }
}

pub fn format_bytes(bytes: Option<i64>) -> String {
    const UNITS: &[(&str, i64)] = &[
        ("Gi", 1024 * 1024 * 1024),
        ("Mi", 1024 * 1024),
        ("Ki", 1024),
    ];
    let b = match bytes {
        None | Some(0) => return "0".to_string(),
        Some(b) => b,
    };
    for (suf, mul) in UNITS {
        if b % mul == 0 {
            return format!("{}{}", b / mul, suf);
        }
    }
    b.to_string()
}

const BINARY_UNITS: &[(&str, i64)] = &[
    ("Ki", 1024),
    ("Mi", 1024 * 1024),
    ("Gi", 1024 * 1024 * 1024),
    ("Ti", 1024_i64.pow(4)),
    ("Pi", 1024_i64.pow(5)),
    ("Ei", 1024_i64.pow(6)),
];

const DECIMAL_UNITS: &[(&str, i64)] = &[
    ("k", 1000),
    ("K", 1000),
    ("M", 1000 * 1000),
    ("G", 1000 * 1000 * 1000),
    ("T", 1000_i64.pow(4)),
    ("P", 1000_i64.pow(5)),
    ("E", 1000_i64.pow(6)),
];

const KIB: f64 = 1024.0;

/// Parse a Kubernetes CPU quantity (`250m`, `0.5`, `2`, `1000000n`, `500u`) into millicores.
pub fn parse_cpu_to_millicores(q: &str) -> Option<i64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }
    if let Some(nanos) = q.strip_suffix('n') {
        return nanos.parse::<i128>().ok().and_then(|n| i64::try_from(n / 1_000_000).ok());
    }
    if let Some(micros) = q.strip_suffix('u') {
        return micros.parse::<i128>().ok().and_then(|u| i64::try_from(u / 1_000).ok());
    }
    if let Some(millis) = q.strip_suffix('m') {
        return millis.parse::<i64>().ok();
    }
    q.parse::<f64>().ok().and_then(|cores| to_i64(cores * 1000.0))
}

/// Parse a Kubernetes memory quantity (`512Mi`, `1G`, `1024`) into bytes.
pub fn parse_memory_to_bytes(q: &str) -> Option<i64> {
    let q = q.trim();
    if q.is_empty() {
        return None;
    }

    // Binary suffixes first so `Mi` is never read as decimal `M` followed by junk.
    for (suffix, multiplier) in BINARY_UNITS.iter().chain(DECIMAL_UNITS) {
        if let Some(number) = q.strip_suffix(suffix) {
            return number
                .parse::<f64>()
                .ok()
                .and_then(|v| to_i64(v * (*multiplier as f64)));
        }
    }
    q.parse::<i64>().ok()
}

/// Round to the nearest integer; `None` for values an `i64` cannot hold.
fn to_i64(value: f64) -> Option<i64> {
    let rounded = value.round();
    // i64::MAX as f64 rounds up to 2^63, which is already out of range
    if rounded.is_finite() && rounded >= i64::MIN as f64 && rounded < i64::MAX as f64 {
        Some(rounded as i64)
    } else {
        None
    }
}

/// `part` as a percentage of `whole`, rounded to two decimals. `None` when `whole` is not positive.
pub fn percent_of(part: i64, whole: i64) -> Option<f64> {
    if whole <= 0 {
        return None;
    }
    Some(round2(part as f64 / whole as f64 * 100.0))
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn format_cpu(millicores: i64) -> String {
    if millicores >= 1000 {
        format!("{:.2} cores", millicores as f64 / 1000.0)
    } else {
        format!("{}m", millicores)
    }
}

pub fn format_memory(bytes: i64) -> String {
    let b = bytes as f64;
    if b >= KIB.powi(4) {
        format!("{:.2} Ti", b / KIB.powi(4))
    } else if b >= KIB.powi(3) {
        format!("{:.2} Gi", b / KIB.powi(3))
    } else if b >= KIB.powi(2) {
        format!("{:.2} Mi", b / KIB.powi(2))
    } else if b >= KIB {
        format!("{:.2} Ki", b / KIB)
    } else {
        format!("{} B", bytes)
    }
}

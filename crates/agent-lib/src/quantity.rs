//! Kubernetes resource quantity parsing
//!
//! Converts CPU and memory quantity strings (`"250m"`, `"1.5"`, `"128Mi"`,
//! `"500M"`) into canonical integer units. Both parsers return `None` for
//! input they cannot interpret; callers choose whether that means zero.

/// Parse a CPU quantity into millicores
///
/// Suffix `n` is nanocores, `u` microcores, `m` millicores, and no suffix
/// means whole cores. The result is rounded to the nearest millicore.
pub fn cpu_to_millicores(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }

    let (number, divisor, multiplier) = if let Some(n) = raw.strip_suffix('n') {
        (n, 1e6, 1.0)
    } else if let Some(n) = raw.strip_suffix('u') {
        (n, 1e3, 1.0)
    } else if let Some(n) = raw.strip_suffix('m') {
        (n, 1.0, 1.0)
    } else {
        (raw, 1.0, 1000.0)
    };

    let value = parse_non_negative(number)?;
    Some((value * multiplier / divisor).round() as u64)
}

/// Parse a memory quantity into bytes
///
/// Binary suffixes (`Ki`..`Ei`) are powers of 1024, decimal suffixes
/// (`K`..`E`) powers of 1000, and a bare number is already bytes.
pub fn memory_to_bytes(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    let split = raw
        .find(|c: char| c.is_ascii_alphabetic())
        .unwrap_or(raw.len());
    let (number, unit) = raw.split_at(split);

    let factor: f64 = match unit {
        "" => 1.0,
        "Ki" => 1024f64,
        "Mi" => 1024f64.powi(2),
        "Gi" => 1024f64.powi(3),
        "Ti" => 1024f64.powi(4),
        "Pi" => 1024f64.powi(5),
        "Ei" => 1024f64.powi(6),
        "K" | "k" => 1e3,
        "M" => 1e6,
        "G" => 1e9,
        "T" => 1e12,
        "P" => 1e15,
        "E" => 1e18,
        _ => return None,
    };

    let value = parse_non_negative(number)?;
    Some((value * factor).round() as u64)
}

/// Percentage of `limit` consumed by `usage`
///
/// `None` when the limit is unknown or zero, so "no limit" never reads as
/// an infinite or zero percentage.
pub fn usage_percent(usage: u64, limit: Option<u64>) -> Option<f64> {
    match limit {
        Some(limit) if limit > 0 => Some(usage as f64 / limit as f64 * 100.0),
        _ => None,
    }
}

fn parse_non_negative(number: &str) -> Option<f64> {
    if number.is_empty() {
        return None;
    }
    let value: f64 = number.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_suffixes() {
        assert_eq!(cpu_to_millicores("500m"), Some(500));
        assert_eq!(cpu_to_millicores("2"), Some(2000));
        assert_eq!(cpu_to_millicores("0.5"), Some(500));
        assert_eq!(cpu_to_millicores("250000000n"), Some(250));
        assert_eq!(cpu_to_millicores("1500u"), Some(2));
    }

    #[test]
    fn test_cpu_rounds_to_nearest() {
        assert_eq!(cpu_to_millicores("1499999n"), Some(1));
        assert_eq!(cpu_to_millicores("1500000n"), Some(2));
        assert_eq!(cpu_to_millicores("0.0004"), Some(0));
    }

    #[test]
    fn test_cpu_unparsable() {
        assert_eq!(cpu_to_millicores(""), None);
        assert_eq!(cpu_to_millicores("   "), None);
        assert_eq!(cpu_to_millicores("m"), None);
        assert_eq!(cpu_to_millicores("abc"), None);
        assert_eq!(cpu_to_millicores("-1"), None);
    }

    #[test]
    fn test_memory_units() {
        assert_eq!(memory_to_bytes("128Mi"), Some(128 * 1024 * 1024));
        assert_eq!(memory_to_bytes("1Gi"), Some(1024 * 1024 * 1024));
        assert_eq!(memory_to_bytes("500M"), Some(500_000_000));
        assert_eq!(memory_to_bytes("1024"), Some(1024));
        assert_eq!(memory_to_bytes("64Ki"), Some(65536));
        assert_eq!(memory_to_bytes("2k"), Some(2000));
        assert_eq!(memory_to_bytes("1.5Gi"), Some(1_610_612_736));
    }

    #[test]
    fn test_memory_unparsable() {
        assert_eq!(memory_to_bytes(""), None);
        assert_eq!(memory_to_bytes("Mi"), None);
        assert_eq!(memory_to_bytes("12Xi"), None);
        assert_eq!(memory_to_bytes("12 Mi"), None);
    }

    #[test]
    fn test_usage_percent() {
        assert_eq!(usage_percent(250, Some(500)), Some(50.0));
        assert_eq!(usage_percent(250, Some(0)), None);
        assert_eq!(usage_percent(250, None), None);

        let limit = memory_to_bytes("not-a-quantity");
        assert_eq!(usage_percent(100, limit), None);
    }
}

//! Percentages and byte sizes as they appear in policy documents.

use crate::error::PolicyError;

/// Parse `"80%"`, `"80 %"` or a bare `"80"` as a percentage.
pub fn parse_percent(field: &str, value: &str) -> Result<f64, PolicyError> {
    let trimmed = value.trim();
    let number = trimmed.strip_suffix('%').unwrap_or(trimmed).trim();
    match number.parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        _ => Err(invalid(field, value)),
    }
}

/// Parse a size such as `"4GB"`, `"512 MiB"`, `"100MB/s"` or `"10mbps"` into bytes.
///
/// Units are binary multiples (`KB` = `KiB` = 1024). A bare number is bytes.
/// A trailing `/s` or `ps` rate suffix is accepted and ignored.
pub fn parse_bytes(field: &str, value: &str) -> Result<u64, PolicyError> {
    let mut s = value.trim().to_ascii_lowercase();
    if let Some(stripped) = s.strip_suffix("/s") {
        s = stripped.trim_end().to_string();
    } else if let Some(stripped) = s.strip_suffix("ps") {
        s = stripped.to_string();
    }

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number.parse().map_err(|_| invalid(field, value))?;
    if !number.is_finite() || number < 0.0 {
        return Err(invalid(field, value));
    }

    let multiplier: u64 = match unit.trim() {
        "" | "b" => 1,
        "k" | "kb" | "kib" => 1 << 10,
        "m" | "mb" | "mib" => 1 << 20,
        "g" | "gb" | "gib" => 1 << 30,
        "t" | "tb" | "tib" => 1 << 40,
        _ => return Err(invalid(field, value)),
    };
    Ok((number * multiplier as f64).round() as u64)
}

/// Render bytes with the largest unit that keeps the value readable.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(&str, u64); 4] = [("TB", 1 << 40), ("GB", 1 << 30), ("MB", 1 << 20), ("KB", 1 << 10)];
    for (unit, size) in UNITS {
        if bytes >= size {
            let value = bytes as f64 / size as f64;
            return if bytes % size == 0 {
                format!("{}{unit}", bytes / size)
            } else {
                format!("{value:.2}{unit}")
            };
        }
    }
    format!("{bytes}B")
}

pub fn format_percent(value: f64) -> String {
    format!("{value}%")
}

fn invalid(field: &str, value: &str) -> PolicyError {
    PolicyError::InvalidQuantity {
        field: field.to_string(),
        value: value.to_string(),
    }
}

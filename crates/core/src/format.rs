//! Human-readable byte sizes.

const UNITS: [&str; 7] = ["B", "K", "M", "G", "T", "P", "E"];

/// Format a byte count with a single-letter binary unit.
///
/// Uses one decimal place with a trailing `.0` dropped, so `1536` becomes
/// `1.5K` and `1048576` becomes `1M`.
pub fn format_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{}B", bytes);
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let text = format!("{:.1}", value);
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{}{}", text, UNITS[unit])
}

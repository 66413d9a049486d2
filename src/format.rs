const UNITS: [&str; 7] = ["B", "KB", "MB", "GB", "TB", "PB", "EB"];

/// Human readable size with 1024-based units and one decimal place.
///
/// A trailing `.0` is dropped: `1536` is `"1.5KB"`, `1048576` is `"1MB"`.
pub fn format_bytes(bytes: u64) -> String {
    let mut place = 0;
    let mut scale = 1u64;
    while place + 1 < UNITS.len() && bytes / scale >= 1024 {
        scale *= 1024;
        place += 1;
    }

    let mut value = round_tenths(bytes as f64 / scale as f64);
    // 1023.95KB rounds up to 1024KB; show it as 1MB instead.
    if value >= 1024.0 && place + 1 < UNITS.len() {
        value = round_tenths(value / 1024.0);
        place += 1;
    }
    if value.fract() == 0.0 {
        format!("{:.0}{}", value, UNITS[place])
    } else {
        format!("{:.1}{}", value, UNITS[place])
    }
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

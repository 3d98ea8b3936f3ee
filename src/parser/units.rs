//! Size, speed, and ETA token parsing for downloader output.

use std::sync::LazyLock;

use regex::Regex;

/// Matches a size token: optional `~` (approximate), a decimal number, and a
/// binary or decimal unit suffix.
#[allow(clippy::expect_used)]
static SIZE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^~?(\d+(?:\.\d+)?)\s*(B|KB|KiB|MB|MiB|GB|GiB)$")
        .expect("size regex is valid") // Static pattern, safe to panic
});

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Parses a size token like `"2.00MiB"` or `"~1.5GiB"` into bytes.
///
/// Units scale by 1024 per step; decimal aliases (`KB`, `MB`, `GB`) are
/// accepted with the same binary multipliers because the downloader emits
/// both spellings. Returns `None` for `N/A` or anything unrecognized.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn parse_size(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" {
        return None;
    }

    let caps = SIZE_PATTERN.captures(s)?;
    let num: f64 = caps.get(1)?.as_str().parse().ok()?;
    let multiplier = match caps.get(2)?.as_str() {
        "B" => 1.0,
        "KB" | "KiB" => KIB,
        "MB" | "MiB" => MIB,
        "GB" | "GiB" => GIB,
        _ => return None,
    };

    Some((num * multiplier).round() as u64)
}

/// Parses a speed token like `"2.00MiB/s"` into bytes per second.
#[must_use]
pub fn parse_speed(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "Unknown" {
        return None;
    }
    parse_size(s.strip_suffix("/s").unwrap_or(s))
}

/// Parses an ETA token into seconds.
///
/// Accepts `mm:ss`, `h:mm:ss`, or a bare seconds count. The literals
/// `--:--` and `00:00` mean "unknown" and parse to `None`, not zero.
#[must_use]
pub fn parse_eta(s: &str) -> Option<u64> {
    let s = s.trim();
    if s.is_empty() || s == "N/A" || s == "Unknown" || s == "--:--" || s == "00:00" {
        return None;
    }

    // Checked arithmetic: these values come straight off a subprocess's
    // stdout, and an absurd field must read as "no ETA", not a panic.
    let parts: Vec<&str> = s.split(':').collect();
    match parts.len() {
        1 => parts[0].parse().ok(),
        2 => {
            let mins: u64 = parts[0].parse().ok()?;
            let secs: u64 = parts[1].parse().ok()?;
            mins.checked_mul(60)?.checked_add(secs)
        }
        3 => {
            let hours: u64 = parts[0].parse().ok()?;
            let mins: u64 = parts[1].parse().ok()?;
            let secs: u64 = parts[2].parse().ok()?;
            hours
                .checked_mul(3600)?
                .checked_add(mins.checked_mul(60)?)?
                .checked_add(secs)
        }
        _ => None,
    }
}

/// Formats a byte count with the same binary units the parser accepts.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn format_size(bytes: u64) -> String {
    let b = bytes as f64;
    if b >= GIB {
        format!("{:.2}GiB", b / GIB)
    } else if b >= MIB {
        format!("{:.2}MiB", b / MIB)
    } else if b >= KIB {
        format!("{:.2}KiB", b / KIB)
    } else {
        format!("{bytes}B")
    }
}

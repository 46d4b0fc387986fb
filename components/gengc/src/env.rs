//! Environment variable readers used by [`crate::GcConfig::from_env`].
//!
//! Sizes accept an optional `K`, `M` or `G` suffix (binary multiples) and a
//! trailing `B`, so `512K`, `4m` and `1GB` are all valid.

/// Splits a size string into its numeric part and binary multiplier.
pub(crate) fn parse_float_and_factor(value: &str) -> Option<(f64, usize)> {
    let mut value = value.trim();
    if value.is_empty() {
        return None;
    }
    if value.len() > 1 && (value.ends_with('b') || value.ends_with('B')) {
        value = &value[..value.len() - 1];
    }

    let (number, factor) = match value.as_bytes()[value.len() - 1] {
        b'g' | b'G' => (&value[..value.len() - 1], 1024 * 1024 * 1024),
        b'm' | b'M' => (&value[..value.len() - 1], 1024 * 1024),
        b'k' | b'K' => (&value[..value.len() - 1], 1024),
        _ => (value, 1),
    };

    number.trim().parse::<f64>().ok().map(|x| (x, factor))
}

/// Parses a byte size such as `256K`.
pub(crate) fn parse_size(value: &str) -> Option<usize> {
    let (value, factor) = parse_float_and_factor(value)?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * factor as f64) as usize)
}

/// Parses a boolean flag: `1`, `true`, `yes` and `on` are true.
pub(crate) fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn read_string_from_env(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

pub(crate) fn read_uint_from_env(var: &str) -> Option<usize> {
    read_string_from_env(var).and_then(|v| parse_size(&v))
}

pub(crate) fn read_float_from_env(var: &str) -> Option<f64> {
    read_string_from_env(var).and_then(|v| v.trim().parse::<f64>().ok())
}

pub(crate) fn read_bool_from_env(var: &str) -> Option<bool> {
    read_string_from_env(var).and_then(|v| parse_bool(&v))
}

use strsim::jaro_winkler;

/// Minimum Jaro-Winkler similarity for a player name to be offered as a suggestion.
const NAME_SIMILARITY_THRESHOLD: f64 = 0.85;

/// Round to the nearest integer, ties to even (`60.5 -> 60`, `61.5 -> 62`).
pub fn round_half_even(value: f64) -> f64 {
    value.round_ties_even()
}

/// `round(100 * part / whole)`, or `None` when `whole` is zero.
pub fn percentage(part: usize, whole: usize) -> Option<u32> {
    if whole == 0 {
        return None;
    }
    let pct = round_half_even(100.0 * part as f64 / whole as f64);
    Some(pct as u32)
}

/// Round to `digits` decimals for display.
pub fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}

/// Format a ratio the way the dashboard shows it, e.g. `6/10 (60%)`.
pub fn format_ratio(part: usize, whole: usize, pct: u32) -> String {
    format!("{}/{} ({}%)", part, whole, pct)
}

/// Format a signed delta with an explicit sign, e.g. `+0.35` / `-0.25`.
pub fn format_delta(value: f64) -> String {
    let rounded = round_to(value, 2);
    if rounded > 0.0 {
        format!("+{:.2}", rounded)
    } else if rounded == 0.0 {
        "0.00".to_string()
    } else {
        format!("{:.2}", rounded)
    }
}

/// Closest candidate to `name`, if any is similar enough to be a likely typo.
pub fn closest_name<'a, I>(name: &str, candidates: I) -> Option<String>
where
    I: IntoIterator<Item = &'a String>,
{
    let needle = name.to_lowercase();
    candidates
        .into_iter()
        .map(|candidate| (candidate, jaro_winkler(&needle, &candidate.to_lowercase())))
        .filter(|(_, score)| *score >= NAME_SIMILARITY_THRESHOLD)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(candidate, _)| candidate.clone())
}

/// Parse `#RRGGBB` into RGB components.
pub fn parse_hex_color(hex: &str) -> Option<[u8; 3]> {
    let digits = hex.strip_prefix('#')?;
    if digits.len() != 6 {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some([channel(0)?, channel(2)?, channel(4)?])
}

use domains::FALLBACK_DOMINANT_COLOR;

const DARK_TEXT: &str = "#1a1a1a";
const LIGHT_TEXT: &str = "#ffffff";

/// Readable text colour over a `#rrggbb` background: dark on light
/// backgrounds, white otherwise (including unparseable input).
pub fn contrast_color(background: &str) -> &'static str {
    let Some((r, g, b)) = parse_hex(background) else {
        return LIGHT_TEXT;
    };
    let luminance = (0.299 * r as f64 + 0.587 * g as f64 + 0.114 * b as f64) / 255.0;
    if luminance > 0.5 {
        DARK_TEXT
    } else {
        LIGHT_TEXT
    }
}

/// Text colour for a Moment that may not have a dominant colour yet.
pub fn text_color_for(dominant: Option<&str>) -> &'static str {
    contrast_color(dominant.unwrap_or(FALLBACK_DOMINANT_COLOR))
}

fn parse_hex(hex: &str) -> Option<(u8, u8, u8)> {
    let digits = hex.strip_prefix('#').unwrap_or(hex);
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }
    let channel = |i: usize| u8::from_str_radix(&digits[i..i + 2], 16).ok();
    Some((channel(0)?, channel(2)?, channel(4)?))
}

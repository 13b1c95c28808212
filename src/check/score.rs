//! Score-to-tier mapping for reputation percentages

/// Tier marker for a score that could not be parsed
pub const UNKNOWN_TIER: &str = "❓";

/// Map a percentage string to a severity tier glyph
///
/// Thresholds ascend from clean to suspicious:
/// - 0-10: ⚪
/// - 10-30: 🟢
/// - 30-50: 🟡
/// - 50-70: 🟠
/// - 70-90: 🔴
/// - 90+: ⚫
///
/// Anything that does not parse as a leading numeric value maps to ❓.
pub fn tier_for(percentage: &str) -> &'static str {
    let cleaned = percentage.replacen('%', "", 1);
    let val: f64 = match cleaned.trim().parse() {
        Ok(v) => v,
        Err(_) => return UNKNOWN_TIER,
    };
    if val.is_nan() {
        return UNKNOWN_TIER;
    }
    if val <= 10.0 {
        "⚪"
    } else if val <= 30.0 {
        "🟢"
    } else if val <= 50.0 {
        "🟡"
    } else if val <= 70.0 {
        "🟠"
    } else if val <= 90.0 {
        "🔴"
    } else {
        "⚫"
    }
}

/// Currency markers stripped from displayed prices.
const CURRENCY_MARKERS: [&str; 5] = ["€", "EUR", "$", "£", "USD"];

/// Convert a displayed price such as `"1.234,56 €"` into a dot-decimal value.
///
/// Dots are treated as thousands separators and the comma as the decimal mark,
/// which is how the marketplace renders prices. Returns `None` when the
/// remainder is not a finite, non-negative number.
pub fn normalize_price(text: &str) -> Option<f64> {
    let mut cleaned = text.to_string();
    for marker in CURRENCY_MARKERS {
        cleaned = cleaned.replace(marker, "");
    }

    let cleaned: String = cleaned
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '.')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

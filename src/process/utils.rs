/// Trim whitespace, a leading BOM, and outer quotes if present.
pub fn clean_str(raw: &str) -> String {
    let trimmed = raw.trim_start_matches('\u{feff}').trim();
    if trimmed.starts_with('"') && trimmed.ends_with('"') && trimmed.len() >= 2 {
        trimmed[1..trimmed.len() - 1].trim().to_string()
    } else {
        trimmed.to_string()
    }
}

/// Header comparison key: lowercase alphanumerics only, so `SSA State/County Code`
/// and `ssa_state_county_code` compare equal.
pub fn header_key(raw: &str) -> String {
    clean_str(raw)
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Outcome of parsing a numeric cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Value(f64),
    /// CMS masks small counts with `*`.
    Suppressed,
    Missing,
    Invalid,
}

/// Parse `1,234`, `$1,050.00`, `12.5%` style cells.
pub fn parse_numeric(raw: &str) -> Numeric {
    let cleaned = clean_str(raw);
    if cleaned.is_empty() {
        return Numeric::Missing;
    }
    if cleaned.chars().all(|c| c == '*') {
        return Numeric::Suppressed;
    }
    let digits: String = cleaned
        .chars()
        .filter(|c| !matches!(c, ',' | '$' | '%' | ' '))
        .collect();
    match digits.parse::<f64>() {
        Ok(v) if v.is_finite() => Numeric::Value(v),
        _ => Numeric::Invalid,
    }
}

/// Normalize a state+county code to 5 digits. Files drop leading zeros (`1000` → `01000`).
pub fn county_code(raw: &str) -> Option<String> {
    let cleaned = clean_str(raw);
    let digits = cleaned.strip_suffix(".0").unwrap_or(&cleaned);
    if digits.is_empty() || digits.len() > 5 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{:0>5}", digits))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_str_strips_quotes_and_bom() {
        assert_eq!(clean_str("  \"Cook\" "), "Cook");
        assert_eq!(clean_str("\u{feff}Contract Number"), "Contract Number");
        assert_eq!(clean_str("\""), "\"");
    }

    #[test]
    fn header_keys_ignore_punctuation() {
        assert_eq!(header_key("SSA State/County Code"), "ssastatecountycode");
        assert_eq!(header_key("FIPST/Cnty"), header_key("fipst_cnty"));
    }

    #[test]
    fn numeric_cells() {
        assert_eq!(parse_numeric("1,234"), Numeric::Value(1234.0));
        assert_eq!(parse_numeric("$1,050.00"), Numeric::Value(1050.0));
        assert_eq!(parse_numeric("12.5%"), Numeric::Value(12.5));
        assert_eq!(parse_numeric("*"), Numeric::Suppressed);
        assert_eq!(parse_numeric(" "), Numeric::Missing);
        assert_eq!(parse_numeric("n/a"), Numeric::Invalid);
    }

    #[test]
    fn county_codes_are_padded() {
        assert_eq!(county_code("1000").as_deref(), Some("01000"));
        assert_eq!(county_code("17031").as_deref(), Some("17031"));
        assert_eq!(county_code("17031.0").as_deref(), Some("17031"));
        assert_eq!(county_code(""), None);
        assert_eq!(county_code("170311"), None);
        assert_eq!(county_code("IL"), None);
    }
}

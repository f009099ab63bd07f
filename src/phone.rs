use rlibphonenumber::{region_code::RegionCode, PhoneNumber, PhoneNumberFormat, PHONE_NUMBER_UTIL};

/// Remove every whitespace character from a phone cell.
pub fn strip_whitespace(raw: &str) -> String {
    raw.chars().filter(|c| !c.is_whitespace()).collect()
}

/// Normalize a phone cell for output.
///
/// Whitespace is always stripped. With a default region configured the
/// number is additionally formatted as E.164; numbers libphonenumber cannot
/// parse keep their stripped form.
pub fn normalize_phone(raw: &str, default_region: Option<&str>) -> String {
    let stripped = strip_whitespace(raw);
    if stripped.is_empty() {
        return stripped;
    }

    match default_region {
        Some(region) if !region.is_empty() => {
            parse_with_regions(&stripped, region).unwrap_or(stripped)
        }
        _ => stripped,
    }
}

fn parse_with_regions(input: &str, default_region: &str) -> Option<String> {
    let util = &*PHONE_NUMBER_UTIL;
    let mut candidates: Vec<&str> = vec![default_region];

    let unknown = RegionCode::get_unknown();
    if !default_region.eq_ignore_ascii_case(unknown) {
        candidates.push(unknown);
    }

    for region in candidates {
        if let Ok(parsed) = util.parse(input, region) {
            return Some(format_parsed_number(&parsed));
        }
    }

    None
}

fn format_parsed_number(number: &PhoneNumber) -> String {
    let mut normalized = PHONE_NUMBER_UTIL
        .format(number, PhoneNumberFormat::E164)
        .into_owned();

    if number.has_extension() {
        let ext = number.extension();
        if !ext.is_empty() {
            normalized.push_str(";ext=");
            normalized.push_str(ext);
        }
    }

    normalized
}

/// Drop a leading `tel:` URI scheme, if any.
pub fn strip_tel_scheme(value: &str) -> &str {
    strip_scheme(value, "tel:")
}

/// Drop a leading `mailto:` URI scheme, if any.
pub fn strip_mailto_scheme(value: &str) -> &str {
    strip_scheme(value, "mailto:")
}

fn strip_scheme<'a>(value: &'a str, scheme: &str) -> &'a str {
    let trimmed = value.trim();
    match trimmed.get(..scheme.len()) {
        Some(prefix) if prefix.eq_ignore_ascii_case(scheme) => trimmed[scheme.len()..].trim(),
        _ => trimmed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_all_whitespace() {
        assert_eq!(strip_whitespace(" 138 0013\t8000 "), "13800138000");
        assert_eq!(normalize_phone("  ", None), "");
    }

    #[test]
    fn region_normalizes_to_e164() {
        assert_eq!(normalize_phone("138 0013 8000", Some("CN")), "+8613800138000");
        assert_eq!(normalize_phone("+1 650 253 0000", Some("CN")), "+16502530000");
    }

    #[test]
    fn unparseable_numbers_keep_stripped_form() {
        assert_eq!(normalize_phone("n / a", Some("CN")), "n/a");
        assert_eq!(normalize_phone("138 0013 8000", None), "13800138000");
    }

    #[test]
    fn schemes_are_stripped_case_insensitively() {
        assert_eq!(strip_tel_scheme("tel:+8613800138000"), "+8613800138000");
        assert_eq!(strip_tel_scheme("TEL: 123"), "123");
        assert_eq!(strip_tel_scheme("123"), "123");
        assert_eq!(strip_mailto_scheme("mailto:a@b.cn"), "a@b.cn");
        assert_eq!(strip_mailto_scheme("a@b.cn"), "a@b.cn");
    }
}

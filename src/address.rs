//! Best-effort decomposition of free-text postal addresses.
//!
//! The heuristic is tuned for Chinese addressing conventions: a six digit
//! postal code, the literal country name 中国, a city ending in 市 and a
//! district or county ending in 区/县/自治区/特别行政区. Each step removes
//! what it matched before the next one runs, and the leftover text becomes
//! the street line. When several tokens qualify the first one wins. It is not
//! a general international address parser.

use std::sync::OnceLock;

use regex::Regex;

const COUNTRY_CN: &str = "中国";

fn ascii_word_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[A-Za-z0-9_]+").expect("valid ascii word regex"))
}

fn city_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\s;]+市").expect("valid city regex"))
}

fn region_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[^\s;]+区|[^\s;]+县|[^\s;]+自治区|[^\s;]+特别行政区")
            .expect("valid region regex")
    })
}

/// The seven positional components of a vCard `ADR` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredAddress {
    pub po_box: String,
    pub extended: String,
    pub street: String,
    pub city: String,
    pub region: String,
    pub postal_code: String,
    pub country: String,
}

impl StructuredAddress {
    /// Build from already split `ADR` components; missing positions are empty.
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = components.into_iter().map(Into::into);
        let mut next = || parts.next().unwrap_or_default();
        Self {
            po_box: next(),
            extended: next(),
            street: next(),
            city: next(),
            region: next(),
            postal_code: next(),
            country: next(),
        }
    }

    /// `;`-joined `ADR` value.
    pub fn to_value(&self) -> String {
        [
            self.po_box.as_str(),
            self.extended.as_str(),
            self.street.as_str(),
            self.city.as_str(),
            self.region.as_str(),
            self.postal_code.as_str(),
            self.country.as_str(),
        ]
        .join(";")
    }

    /// Street through country, skipping empty parts, separated by spaces.
    pub fn display(&self) -> String {
        [
            self.street.as_str(),
            self.city.as_str(),
            self.region.as_str(),
            self.postal_code.as_str(),
            self.country.as_str(),
        ]
        .into_iter()
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
    }
}

/// Split one free-text address into its structured components.
pub fn parse_address(input: &str) -> StructuredAddress {
    let mut rest = input.to_string();

    let postal_code = take_postal_code(&mut rest);

    let country = if rest.contains(COUNTRY_CN) {
        rest = rest.replacen(COUNTRY_CN, "", 1);
        COUNTRY_CN.to_string()
    } else {
        String::new()
    };

    let city = take_first(city_regex(), &mut rest);
    let region = take_first(region_regex(), &mut rest);

    StructuredAddress {
        street: rest.trim().to_string(),
        city,
        region,
        postal_code,
        country,
        ..StructuredAddress::default()
    }
}

// A postal code is a standalone run of exactly six digits: an ASCII word
// (letters, digits, underscore) made only of digits.
fn take_postal_code(rest: &mut String) -> String {
    let found = ascii_word_regex()
        .find_iter(rest)
        .find(|m| m.as_str().len() == 6 && m.as_str().bytes().all(|b| b.is_ascii_digit()))
        .map(|m| (m.range(), m.as_str().to_string()));

    match found {
        Some((range, code)) => {
            rest.replace_range(range, "");
            code
        }
        None => String::new(),
    }
}

fn take_first(re: &Regex, rest: &mut String) -> String {
    let found = re.find(rest).map(|m| (m.range(), m.as_str().to_string()));
    match found {
        Some((range, token)) => {
            rest.replace_range(range, "");
            token
        }
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_chinese_address() {
        let adr = parse_address("北京市朝阳区某路1号 100020 中国");
        assert_eq!(adr.city, "北京市");
        assert_eq!(adr.region, "朝阳区");
        assert_eq!(adr.postal_code, "100020");
        assert_eq!(adr.country, "中国");
        assert_eq!(adr.street, "某路1号");
        assert_eq!(adr.to_value(), ";;某路1号;北京市;朝阳区;100020;中国");
    }

    #[test]
    fn heuristic_miss_keeps_whole_input_as_street() {
        let adr = parse_address("  1600 Amphitheatre Pkwy, Mountain View  ");
        assert_eq!(adr.street, "1600 Amphitheatre Pkwy, Mountain View");
        assert!(adr.city.is_empty());
        assert!(adr.region.is_empty());
        assert!(adr.postal_code.is_empty());
        assert!(adr.country.is_empty());
    }

    #[test]
    fn postal_code_needs_exactly_six_standalone_digits() {
        assert_eq!(parse_address("路 1234567 号").postal_code, "");
        assert_eq!(parse_address("A100020").postal_code, "");
        assert_eq!(parse_address("幸福路100020号").postal_code, "100020");
    }

    #[test]
    fn first_postal_code_wins() {
        let adr = parse_address("200000 上海市 100000");
        assert_eq!(adr.postal_code, "200000");
        assert_eq!(adr.city, "上海市");
        assert_eq!(adr.street, "100000");
    }

    #[test]
    fn county_and_special_region_tokens() {
        let adr = parse_address("某某县城关镇");
        assert_eq!(adr.region, "某某县");
        assert_eq!(adr.street, "城关镇");

        let adr = parse_address("香港特别行政区 中环");
        assert_eq!(adr.region, "香港特别行政区");
        assert_eq!(adr.street, "中环");
    }

    #[test]
    fn from_components_pads_missing_positions() {
        let adr = StructuredAddress::from_components(vec!["", "", "Main St 1", "Springfield"]);
        assert_eq!(adr.city, "Springfield");
        assert_eq!(adr.country, "");
        assert_eq!(adr.display(), "Main St 1 Springfield");
    }
}

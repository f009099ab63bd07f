//! Structured-name support.
//!
//! When no column feeds `N` directly, the encoder derives it from the full
//! name. Names written with Latin letters are split on whitespace; anything
//! else (CJK names in practice) is split after the first character, which is
//! taken as the family name.

use unicode_script::{Script, UnicodeScript};

/// True if any character of `s` is a Latin-script letter.
pub fn has_latin_letter(s: &str) -> bool {
    s.chars()
        .any(|c| c.is_alphabetic() && c.script() == Script::Latin)
}

/// The five positional components of a vCard `N` value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StructuredName {
    pub family: String,
    pub given: String,
    pub middle: String,
    pub prefix: String,
    pub suffix: String,
}

impl StructuredName {
    pub fn from_components<I, S>(components: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut parts = components.into_iter().map(Into::into);
        let mut next = || parts.next().unwrap_or_default();
        Self {
            family: next(),
            given: next(),
            middle: next(),
            prefix: next(),
            suffix: next(),
        }
    }

    /// Derive a structured name from a display name.
    pub fn synthesize(full_name: &str) -> Self {
        let name = full_name.trim();

        if has_latin_letter(name) {
            let parts: Vec<&str> = name.split_whitespace().collect();
            let family = parts.last().copied().unwrap_or(name).to_string();
            let given = if parts.len() > 1 { parts[0] } else { "" }.to_string();
            let middle = if parts.len() > 2 {
                parts[1..parts.len() - 1].join(" ")
            } else {
                String::new()
            };
            return Self {
                family,
                given,
                middle,
                ..Self::default()
            };
        }

        let mut chars = name.chars();
        let family = chars.next().map(String::from).unwrap_or_default();
        Self {
            family,
            given: chars.as_str().to_string(),
            ..Self::default()
        }
    }

    /// `;`-joined `N` value.
    pub fn to_value(&self) -> String {
        [
            self.family.as_str(),
            self.given.as_str(),
            self.middle.as_str(),
            self.prefix.as_str(),
            self.suffix.as_str(),
        ]
        .join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_has_latin_letter() {
        assert!(has_latin_letter("John Doe"));
        assert!(has_latin_letter("José"));
        assert!(has_latin_letter("张 Lee"));
        assert!(!has_latin_letter("张三"));
        assert!(!has_latin_letter("Иван"));
        assert!(!has_latin_letter("123 456"));
    }

    #[test]
    fn latin_names_split_on_whitespace() {
        assert_eq!(StructuredName::synthesize("John Q Public").to_value(), "Public;John;Q;;");
        assert_eq!(StructuredName::synthesize("John Smith").to_value(), "Smith;John;;;");
        assert_eq!(
            StructuredName::synthesize("  Anna  Maria   de Souza ").to_value(),
            "Souza;Anna;Maria de;;"
        );
        assert_eq!(StructuredName::synthesize("Madonna").to_value(), "Madonna;;;;");
    }

    #[test]
    fn cjk_names_split_after_first_character() {
        assert_eq!(StructuredName::synthesize("张三").to_value(), "张;三;;;");
        assert_eq!(StructuredName::synthesize("欧阳娜娜").to_value(), "欧;阳娜娜;;;");
        assert_eq!(StructuredName::synthesize("李").to_value(), "李;;;;");
    }

    #[test]
    fn from_components_pads_missing_positions() {
        let name = StructuredName::from_components(vec!["Smith", "John"]);
        assert_eq!(name.given, "John");
        assert_eq!(name.suffix, "");
    }
}

//! Column to vCard field assignment.
//!
//! A [`ColumnMapping`] is proposed from header names by [`suggest`], reviewed
//! (on the CLI: dumped as TOML, edited, passed back) and then used read-only
//! by the encoder for every row.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::catalog::{default_type, FieldKey, UnknownField, Version};

/// One spreadsheet row: column name to cell text.
pub type Row = HashMap<String, String>;

/// Trimmed cell text, empty when the column is absent.
pub fn cell<'a>(row: &'a Row, column: &str) -> &'a str {
    row.get(column).map(|value| value.trim()).unwrap_or_default()
}

/// What a column feeds: a catalog field or a named `X-` property.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Target {
    Field(FieldKey),
    Extension(String),
}

impl Target {
    pub fn key(&self) -> FieldKey {
        match self {
            Target::Field(key) => *key,
            Target::Extension(_) => FieldKey::Extension,
        }
    }

    /// Property name written to the vCard.
    pub fn property_name(&self) -> &str {
        match self {
            Target::Field(key) => key.as_str(),
            Target::Extension(name) => name,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.property_name())
    }
}

impl FromStr for Target {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        if let Some(suffix) = name.strip_prefix("X-") {
            let valid = !suffix.is_empty()
                && suffix
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-');
            return if valid {
                Ok(Target::Extension(name))
            } else {
                Err(UnknownField(s.trim().to_string()))
            };
        }
        name.parse::<FieldKey>().map(Target::Field)
    }
}

impl TryFrom<String> for Target {
    type Error = UnknownField;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        target.property_name().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    pub column: String,
    pub target: Target,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub type_param: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub pref: bool,
}

impl FieldMapping {
    pub fn new(column: impl Into<String>, target: Target) -> Self {
        Self {
            column: column.into(),
            target,
            type_param: None,
            pref: false,
        }
    }

    pub fn with_type(mut self, type_param: impl Into<String>) -> Self {
        self.type_param = Some(type_param.into());
        self
    }

    pub fn preferred(mut self) -> Self {
        self.pref = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    #[error("no column is mapped to the required target(s): {}", .0.join(", "))]
    MissingTargets(Vec<&'static str>),
    #[error("only one column may be mapped to FN, found: {}", .0.join(", "))]
    DuplicateFullName(Vec<String>),
}

/// Ordered column assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default)]
    pub fields: Vec<FieldMapping>,
}

impl ColumnMapping {
    pub fn new(fields: Vec<FieldMapping>) -> Self {
        Self { fields }
    }

    pub fn push(&mut self, field: FieldMapping) {
        self.fields.push(field);
    }

    fn first_column(&self, key: FieldKey) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.target == Target::Field(key))
            .map(|f| f.column.as_str())
    }

    pub fn full_name_column(&self) -> Option<&str> {
        self.first_column(FieldKey::FormattedName)
    }

    /// The phone that decides whether a row is encoded: the first TEL column.
    pub fn phone_column(&self) -> Option<&str> {
        self.first_column(FieldKey::Tel)
    }

    pub fn maps_structured_name(&self) -> bool {
        self.first_column(FieldKey::Name).is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.full_name_column().is_some() && self.phone_column().is_some()
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        let mut missing = Vec::new();
        if self.full_name_column().is_none() {
            missing.push("full name (FN)");
        }
        if self.phone_column().is_none() {
            missing.push("phone (TEL)");
        }
        if !missing.is_empty() {
            return Err(MappingError::MissingTargets(missing));
        }

        let full_names: Vec<String> = self
            .fields
            .iter()
            .filter(|f| f.target == Target::Field(FieldKey::FormattedName))
            .map(|f| f.column.clone())
            .collect();
        if full_names.len() > 1 {
            return Err(MappingError::DuplicateFullName(full_names));
        }

        Ok(())
    }

    /// Mapped columns that the header does not contain.
    pub fn unknown_columns<S: AsRef<str>>(&self, header: &[S]) -> Vec<&str> {
        let unknown: Vec<&str> = self
            .fields
            .iter()
            .map(|f| f.column.as_str())
            .filter(|column| !header.iter().any(|h| h.as_ref() == *column))
            .collect();
        for column in &unknown {
            warn!(column, "mapped column is not present in the header");
        }
        unknown
    }

    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(self)
    }
}

// First match wins; nickname precedes full name so `name` does not swallow it.
const SUGGESTION_RULES: &[(FieldKey, &str)] = &[
    (FieldKey::Nickname, r"nickname|nick|昵称"),
    (FieldKey::FormattedName, r"name|姓名|full|显示"),
    (FieldKey::Tel, r"phone|mobile|tel|电话|手机号"),
    (FieldKey::Email, r"mail|邮箱|邮件"),
    (FieldKey::Org, r"company|org|组织|单位"),
    (FieldKey::Title, r"title|position|职位|职务"),
    (FieldKey::Adr, r"address|addr|地址"),
    (FieldKey::Note, r"notes|note|备注"),
    (FieldKey::Bday, r"birthday|bday|生日"),
    (FieldKey::Url, r"url|website|网站"),
    (FieldKey::Gender, r"gender|sex|性别"),
];

fn suggestion_rules() -> &'static [(FieldKey, Regex)] {
    static RULES: OnceLock<Vec<(FieldKey, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        SUGGESTION_RULES
            .iter()
            .map(|(key, pattern)| {
                let re = Regex::new(&format!("(?i){pattern}")).expect("valid suggestion regex");
                (*key, re)
            })
            .collect()
    })
}

/// Field a column name most likely holds under `version`, if any.
pub fn suggest_target(column: &str, version: Version) -> Option<FieldKey> {
    suggestion_rules()
        .iter()
        .filter(|(key, _)| key.applies_to(version))
        .find(|(_, re)| re.is_match(column))
        .map(|(key, _)| *key)
}

/// Propose a mapping for a header. Unrecognized columns are left out.
pub fn suggest<S: AsRef<str>>(columns: &[S], version: Version) -> ColumnMapping {
    let mut mapping = ColumnMapping::default();
    let mut has_full_name = false;

    for column in columns {
        let column = column.as_ref();
        let Some(key) = suggest_target(column, version) else {
            debug!(column, "no field suggested; column ignored");
            continue;
        };

        if key == FieldKey::FormattedName {
            if has_full_name {
                debug!(column, "full name already assigned; column ignored");
                continue;
            }
            has_full_name = true;
        }

        let mut field = FieldMapping::new(column, Target::Field(key));
        field.type_param = default_type(key, version).map(str::to_string);
        mapping.push(field);
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets(mapping: &ColumnMapping) -> Vec<(String, String)> {
        mapping
            .fields
            .iter()
            .map(|f| (f.column.clone(), f.target.to_string()))
            .collect()
    }

    #[test]
    fn suggests_from_latin_and_cjk_headers() {
        let columns = ["姓名", "电话号码", "公司", "备注", "Remarks"];
        let mapping = suggest(&columns, Version::V3);
        assert_eq!(
            targets(&mapping),
            vec![
                ("姓名".to_string(), "FN".to_string()),
                ("电话号码".to_string(), "TEL".to_string()),
                ("备注".to_string(), "NOTE".to_string()),
            ]
        );

        let mapping = suggest(&["Full Name", "Mobile", "Organization", "Notes"], Version::V4);
        assert_eq!(
            targets(&mapping),
            vec![
                ("Full Name".to_string(), "FN".to_string()),
                ("Mobile".to_string(), "TEL".to_string()),
                ("Organization".to_string(), "ORG".to_string()),
                ("Notes".to_string(), "NOTE".to_string()),
            ]
        );
    }

    #[test]
    fn tel_default_type_follows_version() {
        let v3 = suggest(&["Phone"], Version::V3);
        let v4 = suggest(&["Phone"], Version::V4);
        assert_eq!(v3.fields[0].type_param.as_deref(), Some("CELL"));
        assert_eq!(v4.fields[0].type_param.as_deref(), Some("cell"));
        assert!(!v3.fields[0].pref);
    }

    #[test]
    fn only_first_name_column_becomes_full_name() {
        let mapping = suggest(&["Name", "Display Name", "Nickname", "Phone"], Version::V3);
        assert_eq!(
            targets(&mapping),
            vec![
                ("Name".to_string(), "FN".to_string()),
                ("Nickname".to_string(), "NICKNAME".to_string()),
                ("Phone".to_string(), "TEL".to_string()),
            ]
        );
        assert!(mapping.validate().is_ok());
    }

    #[test]
    fn version_specific_fields_are_not_suggested_out_of_version() {
        assert_eq!(suggest_target("Gender", Version::V4), Some(FieldKey::Gender));
        assert_eq!(suggest_target("性别", Version::V3), None);
    }

    #[test]
    fn completeness_requires_name_and_phone() {
        let mut mapping = ColumnMapping::default();
        assert!(!mapping.is_complete());
        assert_eq!(
            mapping.validate(),
            Err(MappingError::MissingTargets(vec!["full name (FN)", "phone (TEL)"]))
        );

        mapping.push(FieldMapping::new("n", Target::Field(FieldKey::FormattedName)));
        assert!(!mapping.is_complete());
        mapping.push(FieldMapping::new("p", Target::Field(FieldKey::Tel)));
        assert!(mapping.is_complete());
        assert_eq!(mapping.phone_column(), Some("p"));

        mapping.push(FieldMapping::new("n2", Target::Field(FieldKey::FormattedName)));
        assert_eq!(
            mapping.validate(),
            Err(MappingError::DuplicateFullName(vec!["n".to_string(), "n2".to_string()]))
        );
    }

    #[test]
    fn targets_parse_fields_and_extensions() {
        assert_eq!("tel".parse::<Target>().unwrap(), Target::Field(FieldKey::Tel));
        assert_eq!(
            "x-skype".parse::<Target>().unwrap(),
            Target::Extension("X-SKYPE".to_string())
        );
        assert!("X-".parse::<Target>().is_err());
        assert!("X-*".parse::<Target>().is_err());
        assert!("PHONE".parse::<Target>().is_err());
    }

    #[test]
    fn mapping_round_trips_through_toml() {
        let mapping = ColumnMapping::new(vec![
            FieldMapping::new("姓名", Target::Field(FieldKey::FormattedName)),
            FieldMapping::new("手机", Target::Field(FieldKey::Tel))
                .with_type("CELL")
                .preferred(),
            FieldMapping::new("Skype", Target::Extension("X-SKYPE".to_string())),
        ]);

        let text = mapping.to_toml().unwrap();
        assert!(text.contains("[[fields]]"));
        assert!(text.contains("target = \"X-SKYPE\""));
        assert_eq!(ColumnMapping::from_toml(&text).unwrap(), mapping);
    }

    #[test]
    fn unknown_field_in_toml_is_rejected() {
        let err = ColumnMapping::from_toml("[[fields]]\ncolumn = \"a\"\ntarget = \"PHONE\"\n");
        assert!(err.is_err());
    }

    #[test]
    fn unknown_columns_are_reported() {
        let mapping = ColumnMapping::new(vec![
            FieldMapping::new("Name", Target::Field(FieldKey::FormattedName)),
            FieldMapping::new("Cell", Target::Field(FieldKey::Tel)),
        ]);
        assert_eq!(mapping.unknown_columns(&["Name"]), vec!["Cell"]);
    }

    #[test]
    fn cell_trims_and_defaults_to_empty() {
        let row: Row = [("a".to_string(), "  x ".to_string())].into_iter().collect();
        assert_eq!(cell(&row, "a"), "x");
        assert_eq!(cell(&row, "b"), "");
    }
}

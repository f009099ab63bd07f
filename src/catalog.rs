//! Static registry of the contact fields the codec understands.
//!
//! The table is plain data: one [`FieldDefinition`] per [`FieldKey`], in the
//! same order as the enum, tagged with the vCard versions it exists in. The
//! encoder and decoder dispatch on [`FieldKey`] with exhaustive matches; this
//! module only answers lookups.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// vCard major version targeted by the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Version {
    #[default]
    #[serde(rename = "3.0")]
    V3,
    #[serde(rename = "4.0")]
    V4,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VersionError {
    #[error("unsupported vCard version `{0}` (expected 3.0 or 4.0)")]
    Unsupported(String),
}

impl Version {
    pub fn as_str(&self) -> &'static str {
        match self {
            Version::V3 => "3.0",
            Version::V4 => "4.0",
        }
    }

    /// Conventional download name for a document of this version.
    pub fn output_file_name(&self) -> String {
        format!("contacts-{}.vcf", self.as_str())
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "3.0" | "3" => Ok(Version::V3),
            "4.0" | "4" => Ok(Version::V4),
            other => Err(VersionError::Unsupported(other.to_string())),
        }
    }
}

/// Stable identifier of a catalog field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKey {
    Version,
    FormattedName,
    Name,
    Tel,
    Email,
    Org,
    Title,
    Adr,
    Label,
    Url,
    Note,
    Bday,
    Nickname,
    Photo,
    Uid,
    Rev,
    Categories,
    Gender,
    Anniversary,
    Lang,
    Role,
    Tz,
    /// Any `X-` property, passed through verbatim under its own name.
    Extension,
    Impp,
    Sound,
}

/// Classes of multi-valued fields that share TYPE vocabularies and PREF rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldClass {
    Phone,
    Email,
    Address,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldDefinition {
    pub key: FieldKey,
    pub name: &'static str,
    pub label_zh: &'static str,
    pub v3: bool,
    pub v4: bool,
    pub description: &'static str,
}

impl FieldDefinition {
    pub fn applies_to(&self, version: Version) -> bool {
        match version {
            Version::V3 => self.v3,
            Version::V4 => self.v4,
        }
    }
}

const fn field(
    key: FieldKey,
    name: &'static str,
    label_zh: &'static str,
    v3: bool,
    v4: bool,
    description: &'static str,
) -> FieldDefinition {
    FieldDefinition {
        key,
        name,
        label_zh,
        v3,
        v4,
        description,
    }
}

/// Every supported field, in `FieldKey` declaration order.
pub static FIELDS: [FieldDefinition; 25] = [
    field(FieldKey::Version, "VERSION", "版本号", true, true, "vCard version (3.0 or 4.0)."),
    field(FieldKey::FormattedName, "FN", "全名", true, true, "Display name of the contact; required."),
    field(FieldKey::Name, "N", "姓名结构", true, true, "Family;Given;Middle;Prefix;Suffix."),
    field(FieldKey::Tel, "TEL", "电话号码", true, true, "Phone number; TYPE such as CELL, WORK, HOME."),
    field(FieldKey::Email, "EMAIL", "电子邮箱", true, true, "Email address; TYPE such as INTERNET."),
    field(FieldKey::Org, "ORG", "组织/公司", true, true, "Company and department."),
    field(FieldKey::Title, "TITLE", "职位/头衔", true, true, "Job title."),
    field(FieldKey::Adr, "ADR", "地址", true, true, "Postal address; TYPE such as HOME, WORK."),
    field(FieldKey::Label, "LABEL", "地址标签", true, false, "Printable address label tied to ADR."),
    field(FieldKey::Url, "URL", "网站", true, true, "Personal or company website."),
    field(FieldKey::Note, "NOTE", "备注", true, true, "Free-form notes."),
    field(FieldKey::Bday, "BDAY", "生日", true, true, "Birthday, YYYY-MM-DD."),
    field(FieldKey::Nickname, "NICKNAME", "昵称", true, true, "Nickname."),
    field(FieldKey::Photo, "PHOTO", "头像", true, true, "Photo, base64 data URI or URL."),
    field(FieldKey::Uid, "UID", "唯一标识符", true, true, "Unique identifier; generated."),
    field(FieldKey::Rev, "REV", "最后修改时间", true, true, "Revision timestamp; generated."),
    field(FieldKey::Categories, "CATEGORIES", "分类", true, true, "Comma separated tags."),
    field(FieldKey::Gender, "GENDER", "性别", false, true, "M, F, O, N or U."),
    field(FieldKey::Anniversary, "ANNIVERSARY", "纪念日", false, true, "Anniversary date."),
    field(FieldKey::Lang, "LANG", "语言", false, true, "Language tag such as zh-CN."),
    field(FieldKey::Role, "ROLE", "角色", true, true, "Role within the organization."),
    field(FieldKey::Tz, "TZ", "时区", true, true, "Time zone such as +08:00."),
    field(FieldKey::Extension, "X-*", "自定义字段", true, true, "Custom X- property, e.g. X-SKYPE."),
    field(FieldKey::Impp, "IMPP", "即时通讯", false, true, "Instant messaging URI."),
    field(FieldKey::Sound, "SOUND", "音频信息", true, true, "Pronunciation audio."),
];

/// Catalog fields available under `version`, in catalog order.
pub fn fields_for(version: Version) -> Vec<&'static FieldDefinition> {
    FIELDS.iter().filter(|f| f.applies_to(version)).collect()
}

impl FieldKey {
    pub fn definition(self) -> &'static FieldDefinition {
        &FIELDS[self as usize]
    }

    pub fn as_str(self) -> &'static str {
        self.definition().name
    }

    pub fn applies_to(self, version: Version) -> bool {
        self.definition().applies_to(version)
    }

    pub fn class(self) -> Option<FieldClass> {
        match self {
            FieldKey::Tel => Some(FieldClass::Phone),
            FieldKey::Email => Some(FieldClass::Email),
            FieldKey::Adr | FieldKey::Label => Some(FieldClass::Address),
            _ => None,
        }
    }

    /// Properties that carry `CHARSET=UTF-8` under vCard 3.0.
    pub fn needs_charset_v3(self) -> bool {
        matches!(
            self,
            FieldKey::FormattedName
                | FieldKey::Name
                | FieldKey::Org
                | FieldKey::Title
                | FieldKey::Role
                | FieldKey::Note
                | FieldKey::Categories
                | FieldKey::Adr
                | FieldKey::Label
                | FieldKey::Nickname
        )
    }

    /// Written by the encoder itself; mapped columns never feed them.
    pub fn is_managed(self) -> bool {
        matches!(self, FieldKey::Version | FieldKey::Uid | FieldKey::Rev)
    }
}

impl fmt::Display for FieldKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown vCard field `{0}`")]
pub struct UnknownField(pub String);

impl FromStr for FieldKey {
    type Err = UnknownField;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        if upper.starts_with("X-") {
            return Ok(FieldKey::Extension);
        }
        FIELDS
            .iter()
            .find(|f| f.name == upper)
            .map(|f| f.key)
            .ok_or_else(|| UnknownField(s.trim().to_string()))
    }
}

const TEL_TYPES_V3: &[&str] = &["CELL", "VOICE", "WORK", "HOME", "FAX", "PAGER"];
const TEL_TYPES_V4: &[&str] = &[
    "cell",
    "voice",
    "work",
    "home",
    "fax",
    "text",
    "video",
    "pager",
    "textphone",
];
const EMAIL_TYPES: &[&str] = &["INTERNET", "A400"];
const ADR_TYPES_V3: &[&str] = &["HOME", "WORK", "POSTAL", "PARCEL"];
const ADR_TYPES_V4: &[&str] = &["home", "work", "dom", "intl"];

/// TYPE tokens offered for a field under `version`; empty when the field
/// takes no TYPE parameter.
pub fn type_vocabulary(key: FieldKey, version: Version) -> &'static [&'static str] {
    match (key.class(), version) {
        (Some(FieldClass::Phone), Version::V3) => TEL_TYPES_V3,
        (Some(FieldClass::Phone), Version::V4) => TEL_TYPES_V4,
        (Some(FieldClass::Email), _) => EMAIL_TYPES,
        (Some(FieldClass::Address), Version::V3) => ADR_TYPES_V3,
        (Some(FieldClass::Address), Version::V4) => ADR_TYPES_V4,
        (None, _) => &[],
    }
}

/// TYPE assigned to a freshly suggested mapping of `key`.
pub fn default_type(key: FieldKey, version: Version) -> Option<&'static str> {
    match (key, version) {
        (FieldKey::Tel, Version::V3) => Some("CELL"),
        (FieldKey::Tel, Version::V4) => Some("cell"),
        (FieldKey::Email, _) => Some("INTERNET"),
        (FieldKey::Adr, Version::V3) => Some("HOME"),
        (FieldKey::Adr, Version::V4) => Some("home"),
        _ => None,
    }
}

/// Chinese display label for a TYPE token (or the `pref` marker).
pub fn type_label_zh(token: &str) -> Option<&'static str> {
    let label = match token.trim().to_ascii_lowercase().as_str() {
        "home" => "家庭",
        "work" => "工作",
        "voice" => "语音",
        "cell" => "手机",
        "fax" => "传真",
        "pager" => "寻呼机",
        "text" => "短信",
        "video" => "视频",
        "textphone" => "助听设备",
        "internet" => "互联网邮件",
        "a400" => "X.400 邮件",
        "postal" => "邮政地址",
        "parcel" => "包裹地址",
        "dom" => "境内地址",
        "intl" => "国际地址",
        "pref" => "首选",
        _ => return None,
    };
    Some(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_order_matches_enum() {
        for (idx, def) in FIELDS.iter().enumerate() {
            assert_eq!(def.key as usize, idx, "{} is out of place", def.name);
            assert_eq!(def.key.definition().name, def.name);
        }
    }

    #[test]
    fn fields_for_filters_by_version() {
        let v3: Vec<_> = fields_for(Version::V3).iter().map(|f| f.name).collect();
        let v4: Vec<_> = fields_for(Version::V4).iter().map(|f| f.name).collect();

        assert!(v3.contains(&"LABEL"));
        assert!(!v3.contains(&"GENDER"));
        assert!(!v3.contains(&"IMPP"));
        assert!(v4.contains(&"GENDER"));
        assert!(!v4.contains(&"LABEL"));
        assert_eq!(v3[0], "VERSION");
        assert_eq!(v4[1], "FN");
    }

    #[test]
    fn field_key_parses_case_insensitively() {
        assert_eq!("tel".parse::<FieldKey>().unwrap(), FieldKey::Tel);
        assert_eq!(" Fn ".parse::<FieldKey>().unwrap(), FieldKey::FormattedName);
        assert_eq!("x-skype".parse::<FieldKey>().unwrap(), FieldKey::Extension);
        assert!("PHONE".parse::<FieldKey>().is_err());
    }

    #[test]
    fn version_parses_known_tags_only() {
        assert_eq!("3.0".parse::<Version>().unwrap(), Version::V3);
        assert_eq!("4".parse::<Version>().unwrap(), Version::V4);
        assert_eq!(
            "2.1".parse::<Version>(),
            Err(VersionError::Unsupported("2.1".to_string()))
        );
        assert_eq!(Version::V4.output_file_name(), "contacts-4.0.vcf");
    }

    #[test]
    fn type_defaults_follow_version_casing() {
        assert_eq!(default_type(FieldKey::Tel, Version::V3), Some("CELL"));
        assert_eq!(default_type(FieldKey::Tel, Version::V4), Some("cell"));
        assert_eq!(default_type(FieldKey::Org, Version::V4), None);
        assert!(type_vocabulary(FieldKey::Tel, Version::V4).contains(&"textphone"));
        assert!(type_vocabulary(FieldKey::Label, Version::V3).contains(&"POSTAL"));
        assert!(type_vocabulary(FieldKey::Note, Version::V3).is_empty());
    }

    #[test]
    fn zh_labels_ignore_case() {
        assert_eq!(type_label_zh("CELL"), Some("手机"));
        assert_eq!(type_label_zh("cell"), Some("手机"));
        assert_eq!(type_label_zh("PREF"), Some("首选"));
        assert_eq!(type_label_zh("x-custom"), None);
    }
}

//! Row to vCard encoding.
//!
//! Every version-specific rule lives here: TYPE casing, the `PREF`
//! representation, `tel:`/`mailto:` URIs, the 3.0 `CHARSET=UTF-8`
//! annotation and which properties exist at all in a given version.

use std::sync::OnceLock;

use rayon::prelude::*;
use regex::Regex;
use time::macros::format_description;
use time::OffsetDateTime;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::address::parse_address;
use crate::catalog::{FieldClass, FieldKey, Version};
use crate::mapping::{cell, ColumnMapping, FieldMapping, Row};
use crate::names::StructuredName;
use crate::phone::normalize_phone;
use crate::vcard::{escape_text, Parameter, Property, VCardRecord, CRLF};

pub const DEFAULT_PRODUCT_ID: &str = "-//vcfsheet//CSV-to-vCard//EN";
/// Media type of the documents [`encode_rows`] produces.
pub const VCARD_MIME_TYPE: &str = "text/vcard; charset=utf-8";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodeOptions {
    pub version: Version,
    /// ISO region used to normalize phones to E.164, e.g. `CN`.
    pub phone_region: Option<String>,
    pub product_id: String,
}

impl EncodeOptions {
    pub fn new(version: Version) -> Self {
        Self {
            version,
            phone_region: None,
            product_id: DEFAULT_PRODUCT_ID.to_string(),
        }
    }
}

/// Tracks which field classes already carried the preferred marker in the
/// record being built. Created per record, never shared.
#[derive(Debug, Default, Clone, Copy)]
pub struct PreferenceTracker {
    phone: bool,
    email: bool,
}

impl PreferenceTracker {
    /// Claim the marker for `class`; true only for the first claim.
    pub fn claim(&mut self, class: FieldClass) -> bool {
        let used = match class {
            FieldClass::Phone => &mut self.phone,
            FieldClass::Email => &mut self.email,
            FieldClass::Address => return false,
        };
        !std::mem::replace(used, true)
    }
}

/// Outcome of encoding a batch of rows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncodeReport {
    pub document: String,
    pub encoded: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct Encoder {
    options: EncodeOptions,
}

impl Encoder {
    pub fn new(options: EncodeOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EncodeOptions {
        &self.options
    }

    /// Encode one row, or `None` when its full name or phone is empty.
    pub fn encode(&self, row: &Row, mapping: &ColumnMapping) -> Option<String> {
        self.encode_record(row, mapping).map(|record| record.to_string())
    }

    pub fn encode_record(&self, row: &Row, mapping: &ColumnMapping) -> Option<VCardRecord> {
        let region = self.options.phone_region.as_deref();
        let name = mapping
            .full_name_column()
            .map(|column| cell(row, column))
            .unwrap_or_default();
        let phone = mapping
            .phone_column()
            .map(|column| normalize_phone(cell(row, column), region))
            .unwrap_or_default();

        if name.is_empty() || phone.is_empty() {
            debug!(
                has_name = !name.is_empty(),
                has_phone = !phone.is_empty(),
                "row skipped: full name or phone is empty"
            );
            return None;
        }

        let version = self.options.version;
        let mut record = VCardRecord::new(version.as_str());
        record.push(Property::new("PRODID", self.options.product_id.as_str()));

        if !mapping.maps_structured_name() {
            let synthesized = StructuredName::synthesize(name).to_value();
            record.push(self.text_property(FieldKey::Name, "N", &synthesized));
        }

        let mut prefs = PreferenceTracker::default();
        for field in &mapping.fields {
            let value = cell(row, &field.column);
            if value.is_empty() {
                continue;
            }
            if let Some(property) = self.encode_field(field, value, &mut prefs) {
                record.push(property);
            }
        }

        record.push(Property::new("UID", format!("urn:uuid:{}", Uuid::new_v4())));
        match revision_timestamp(OffsetDateTime::now_utc()) {
            Ok(rev) => record.push(Property::new("REV", rev)),
            Err(err) => warn!(error = %err, "REV omitted: timestamp could not be formatted"),
        }
        Some(record)
    }

    /// Encode a batch in parallel, keeping row order.
    pub fn encode_rows(&self, rows: &[Row], mapping: &ColumnMapping) -> EncodeReport {
        self.encode_rows_with(rows, mapping, || {})
    }

    /// Like [`Encoder::encode_rows`], calling `tick` once per processed row.
    pub fn encode_rows_with<F>(&self, rows: &[Row], mapping: &ColumnMapping, tick: F) -> EncodeReport
    where
        F: Fn() + Sync,
    {
        let blocks: Vec<String> = rows
            .par_iter()
            .map(|row| {
                tick();
                self.encode(row, mapping)
            })
            .collect::<Vec<_>>()
            .into_iter()
            .flatten()
            .collect();

        EncodeReport {
            encoded: blocks.len(),
            skipped: rows.len() - blocks.len(),
            document: blocks.join(CRLF),
        }
    }

    fn encode_field(
        &self,
        field: &FieldMapping,
        value: &str,
        prefs: &mut PreferenceTracker,
    ) -> Option<Property> {
        let version = self.options.version;
        let key = field.target.key();

        if !key.applies_to(version) {
            debug!(field = %field.target, %version, "field not available in this version; dropped");
            return None;
        }

        match key {
            FieldKey::Tel => Some(self.tel_property(field, value, prefs)),
            FieldKey::Email => Some(self.email_property(field, value, prefs)),
            FieldKey::Adr => Some(self.adr_property(field, value)),
            FieldKey::Label => Some(self.label_property(field, value)),
            FieldKey::Gender => Some(Property::new("GENDER", gender_code(value))),
            FieldKey::Photo => Some(photo_property(value)),
            FieldKey::Version | FieldKey::Uid | FieldKey::Rev => {
                debug!(field = %field.target, "field is written by the encoder; column ignored");
                None
            }
            FieldKey::FormattedName
            | FieldKey::Name
            | FieldKey::Org
            | FieldKey::Title
            | FieldKey::Url
            | FieldKey::Note
            | FieldKey::Bday
            | FieldKey::Nickname
            | FieldKey::Categories
            | FieldKey::Anniversary
            | FieldKey::Lang
            | FieldKey::Role
            | FieldKey::Tz
            | FieldKey::Extension
            | FieldKey::Impp
            | FieldKey::Sound => Some(self.text_property(key, field.target.property_name(), value)),
        }
    }

    fn text_property(&self, key: FieldKey, name: &str, value: &str) -> Property {
        let property = Property::new(name, escape_text(value));
        self.with_charset(key, property)
    }

    fn with_charset(&self, key: FieldKey, property: Property) -> Property {
        if self.options.version == Version::V3 && key.needs_charset_v3() {
            property.with_param(Parameter::single("CHARSET", "UTF-8"))
        } else {
            property
        }
    }

    fn tel_property(
        &self,
        field: &FieldMapping,
        value: &str,
        prefs: &mut PreferenceTracker,
    ) -> Property {
        let number = normalize_phone(value, self.options.phone_region.as_deref());
        let types = self.type_tokens(field, Some("CELL"));
        let pref = field.pref && prefs.claim(FieldClass::Phone);

        match self.options.version {
            Version::V3 => Property::new("TEL", number).with_param(v3_type_param(types, pref)),
            Version::V4 => with_v4_pref(
                Property::new("TEL", format!("tel:{number}"))
                    .with_param(Parameter::new("TYPE", types)),
                pref,
            ),
        }
    }

    fn email_property(
        &self,
        field: &FieldMapping,
        value: &str,
        prefs: &mut PreferenceTracker,
    ) -> Property {
        let pref = field.pref && prefs.claim(FieldClass::Email);

        match self.options.version {
            Version::V3 => {
                let types = self.type_tokens(field, Some("INTERNET"));
                Property::new("EMAIL", escape_text(value)).with_param(v3_type_param(types, pref))
            }
            Version::V4 => {
                let address = if value.to_ascii_lowercase().starts_with("mailto:") {
                    value.to_string()
                } else {
                    format!("mailto:{value}")
                };
                let mut property = Property::new("EMAIL", escape_text(&address));
                let types = self.type_tokens(field, None);
                if !types.is_empty() {
                    property = property.with_param(Parameter::new("TYPE", types));
                }
                with_v4_pref(property, pref)
            }
        }
    }

    fn adr_property(&self, field: &FieldMapping, value: &str) -> Property {
        let payload = if value.contains(';') {
            value.to_string()
        } else {
            parse_address(value).to_value()
        };
        self.typed_text_property(FieldKey::Adr, field, &payload)
    }

    fn label_property(&self, field: &FieldMapping, value: &str) -> Property {
        self.typed_text_property(FieldKey::Label, field, value)
    }

    // `NAME[;TYPE=..][;CHARSET=UTF-8]:value`, TYPE only when one was mapped.
    fn typed_text_property(&self, key: FieldKey, field: &FieldMapping, value: &str) -> Property {
        let mut property = Property::new(key.as_str(), escape_text(value));
        let types = self.type_tokens(field, None);
        if !types.is_empty() {
            property = property.with_param(Parameter::new("TYPE", types));
        }
        self.with_charset(key, property)
    }

    /// Mapped TYPE tokens in version casing, or `fallback` when none were set.
    fn type_tokens(&self, field: &FieldMapping, fallback: Option<&str>) -> Vec<String> {
        let mut tokens: Vec<&str> = field
            .type_param
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("PREF"))
            .collect();
        if tokens.is_empty() {
            tokens.extend(fallback);
        }

        tokens
            .into_iter()
            .map(|t| match self.options.version {
                Version::V3 => t.to_ascii_uppercase(),
                Version::V4 => t.to_ascii_lowercase(),
            })
            .collect()
    }
}

fn v3_type_param(mut types: Vec<String>, pref: bool) -> Parameter {
    if pref {
        types.push("PREF".to_string());
    }
    Parameter::new("TYPE", types)
}

fn with_v4_pref(property: Property, pref: bool) -> Property {
    if pref {
        property.with_param(Parameter::single("PREF", "1"))
    } else {
        property
    }
}

/// Single-letter vCard 4.0 gender code for a free-form cell.
pub fn gender_code(value: &str) -> String {
    let normalized = value.trim().to_lowercase();
    let code = match normalized.as_str() {
        "m" | "male" | "男" => "M",
        "f" | "female" | "女" => "F",
        "o" | "other" | "其他" => "O",
        "n" | "none" | "无" => "N",
        "u" | "unknown" | "未知" => "U",
        _ => {
            return normalized
                .chars()
                .next()
                .map(|c| c.to_uppercase().collect())
                .unwrap_or_else(|| "U".to_string())
        }
    };
    code.to_string()
}

fn photo_data_uri_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)^data:image/(jpeg|jpg|png);base64,(.+)$").expect("valid data uri regex")
    })
}

fn photo_property(value: &str) -> Property {
    let Some(caps) = photo_data_uri_regex().captures(value) else {
        return Property::new("PHOTO", escape_text(value));
    };

    let media = match caps[1].to_ascii_uppercase().as_str() {
        "PNG" => "PNG",
        _ => "JPEG",
    };
    let payload: String = caps[2].chars().filter(|c| !c.is_whitespace()).collect();
    Property::new("PHOTO", payload)
        .with_param(Parameter::single("TYPE", media))
        .with_param(Parameter::single("ENCODING", "B"))
}

/// Compact ISO-8601 basic UTC timestamp, e.g. `20240102T030405Z`.
pub fn revision_timestamp(at: OffsetDateTime) -> Result<String, time::error::Format> {
    at.to_offset(time::UtcOffset::UTC)
        .format(format_description!("[year][month][day]T[hour][minute][second]Z"))
}

/// Encode one row with default options for `version`.
pub fn encode(row: &Row, mapping: &ColumnMapping, version: Version) -> Option<String> {
    Encoder::new(EncodeOptions::new(version)).encode(row, mapping)
}

/// Encode a batch of rows into one CRLF-joined document.
pub fn encode_rows(rows: &[Row], mapping: &ColumnMapping, options: &EncodeOptions) -> EncodeReport {
    Encoder::new(options.clone()).encode_rows(rows, mapping)
}

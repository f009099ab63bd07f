//! vCard to row projection.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::address::StructuredAddress;
use crate::catalog::type_label_zh;
use crate::names::StructuredName;
use crate::phone::{strip_mailto_scheme, strip_tel_scheme};
use crate::vcard::{self, split_structured, unescape_text, Property, VCardRecord};

/// Column order of decoded output.
pub const COLUMNS: [&str; 24] = [
    "VERSION",
    "FN",
    "N_Last",
    "N_First",
    "N_Middle",
    "N_Prefix",
    "N_Suffix",
    "ORG",
    "TITLE",
    "TELs",
    "EMAILs",
    "ADRs",
    "LABELs",
    "NOTE",
    "UID",
    "REV",
    "GENDER",
    "NICKNAME",
    "CATEGORIES",
    "ADR_Street",
    "ADR_City",
    "ADR_Region",
    "ADR_Postal",
    "ADR_Country",
];

const INSTANCE_SEPARATOR: &str = " | ";

/// One decoded contact. Field order matches [`COLUMNS`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactRow {
    #[serde(rename = "VERSION")]
    pub version: String,
    #[serde(rename = "FN")]
    pub formatted_name: String,
    #[serde(rename = "N_Last")]
    pub name_last: String,
    #[serde(rename = "N_First")]
    pub name_first: String,
    #[serde(rename = "N_Middle")]
    pub name_middle: String,
    #[serde(rename = "N_Prefix")]
    pub name_prefix: String,
    #[serde(rename = "N_Suffix")]
    pub name_suffix: String,
    #[serde(rename = "ORG")]
    pub org: String,
    #[serde(rename = "TITLE")]
    pub title: String,
    #[serde(rename = "TELs")]
    pub tels: String,
    #[serde(rename = "EMAILs")]
    pub emails: String,
    #[serde(rename = "ADRs")]
    pub adrs: String,
    #[serde(rename = "LABELs")]
    pub labels: String,
    #[serde(rename = "NOTE")]
    pub note: String,
    #[serde(rename = "UID")]
    pub uid: String,
    #[serde(rename = "REV")]
    pub rev: String,
    #[serde(rename = "GENDER")]
    pub gender: String,
    #[serde(rename = "NICKNAME")]
    pub nickname: String,
    #[serde(rename = "CATEGORIES")]
    pub categories: String,
    #[serde(rename = "ADR_Street")]
    pub adr_street: String,
    #[serde(rename = "ADR_City")]
    pub adr_city: String,
    #[serde(rename = "ADR_Region")]
    pub adr_region: String,
    #[serde(rename = "ADR_Postal")]
    pub adr_postal: String,
    #[serde(rename = "ADR_Country")]
    pub adr_country: String,
}

impl ContactRow {
    /// Values in [`COLUMNS`] order.
    pub fn values(&self) -> [&str; 24] {
        [
            &self.version,
            &self.formatted_name,
            &self.name_last,
            &self.name_first,
            &self.name_middle,
            &self.name_prefix,
            &self.name_suffix,
            &self.org,
            &self.title,
            &self.tels,
            &self.emails,
            &self.adrs,
            &self.labels,
            &self.note,
            &self.uid,
            &self.rev,
            &self.gender,
            &self.nickname,
            &self.categories,
            &self.adr_street,
            &self.adr_city,
            &self.adr_region,
            &self.adr_postal,
            &self.adr_country,
        ]
        .map(String::as_str)
    }

    /// Value of a column by its output name.
    pub fn get(&self, column: &str) -> Option<&str> {
        COLUMNS
            .iter()
            .position(|c| *c == column)
            .map(|idx| self.values()[idx])
    }
}

/// How TYPE tokens are rendered next to multi-instance values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelStyle {
    /// Tokens as written, the preferred marker as `pref`.
    #[default]
    Raw,
    /// Chinese labels; unknown tokens as written.
    Zh,
}

impl std::str::FromStr for LabelStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "raw" => Ok(LabelStyle::Raw),
            "zh" => Ok(LabelStyle::Zh),
            other => Err(format!("unknown label style '{other}' (expected raw or zh)")),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecodeOptions {
    pub labels: LabelStyle,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodeReport {
    pub rows: Vec<ContactRow>,
    /// Blocks that could not be parsed.
    pub skipped: usize,
}

/// Decode every parseable block with raw labels.
pub fn decode(document: &str) -> Vec<ContactRow> {
    decode_with(document, &DecodeOptions::default()).rows
}

pub fn decode_with(document: &str, options: &DecodeOptions) -> DecodeReport {
    let mut report = DecodeReport::default();

    for (idx, block) in vcard::parse(document).into_iter().enumerate() {
        match block {
            Ok(record) => report.rows.push(project(&record, options.labels)),
            Err(err) => {
                warn!(block = idx + 1, error = %err, "skipping unparseable vCard block");
                report.skipped += 1;
            }
        }
    }

    debug!(
        decoded = report.rows.len(),
        skipped = report.skipped,
        "decoded vCard document"
    );
    report
}

/// Flatten one record into the fixed column set.
pub fn project(record: &VCardRecord, labels: LabelStyle) -> ContactRow {
    let text = |name: &str| {
        record
            .first(name)
            .map(|p| unescape_text(&p.value))
            .unwrap_or_default()
    };

    let name = record
        .first("N")
        .map(|p| StructuredName::from_components(split_structured(&p.value)))
        .unwrap_or_default();

    let addresses: Vec<(StructuredAddress, &Property)> = record
        .all("ADR")
        .map(|p| (StructuredAddress::from_components(split_structured(&p.value)), p))
        .collect();

    let tels = join_instances(record.all("TEL"), labels, |p| {
        strip_tel_scheme(&p.value).to_string()
    });
    let emails = join_instances(record.all("EMAIL"), labels, |p| {
        unescape_text(strip_mailto_scheme(&p.value))
    });
    let adrs = addresses
        .iter()
        .map(|(adr, p)| with_labels(adr.display(), p, labels))
        .collect::<Vec<_>>()
        .join(INSTANCE_SEPARATOR);
    let label_values = join_instances(record.all("LABEL"), labels, |p| unescape_text(&p.value));

    let first_adr = addresses
        .first()
        .map(|(adr, _)| adr.clone())
        .unwrap_or_default();

    ContactRow {
        version: record.version.clone(),
        formatted_name: text("FN"),
        name_last: name.family,
        name_first: name.given,
        name_middle: name.middle,
        name_prefix: name.prefix,
        name_suffix: name.suffix,
        org: text("ORG"),
        title: text("TITLE"),
        tels,
        emails,
        adrs,
        labels: label_values,
        note: text("NOTE"),
        uid: text("UID"),
        rev: text("REV"),
        gender: text("GENDER"),
        nickname: text("NICKNAME"),
        categories: text("CATEGORIES"),
        adr_street: first_adr.street,
        adr_city: first_adr.city,
        adr_region: first_adr.region,
        adr_postal: first_adr.postal_code,
        adr_country: first_adr.country,
    }
}

fn join_instances<'a, I, F>(properties: I, labels: LabelStyle, value_of: F) -> String
where
    I: Iterator<Item = &'a Property>,
    F: Fn(&Property) -> String,
{
    properties
        .map(|p| with_labels(value_of(p), p, labels))
        .collect::<Vec<_>>()
        .join(INSTANCE_SEPARATOR)
}

// `value (label,label)` when the instance carries TYPE or PREF, else `value`.
fn with_labels(value: String, property: &Property, style: LabelStyle) -> String {
    let mut tokens: Vec<&str> = property.types();
    if property.is_preferred() {
        tokens.push("pref");
    }
    if tokens.is_empty() {
        return value;
    }

    let rendered: Vec<&str> = match style {
        LabelStyle::Raw => tokens,
        LabelStyle::Zh => tokens
            .into_iter()
            .map(|t| type_label_zh(t).unwrap_or(t))
            .collect(),
    };
    format!("{value} ({})", rendered.join(","))
}

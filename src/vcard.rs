//! Line-level vCard grammar shared by the encoder and the decoder.
//!
//! Parsing is deliberately tolerant: it accepts 2.1/3.0/4.0 input, bare
//! 2.1-style parameters (`TEL;CELL;PREF:`), property groups (`item1.TEL`),
//! folded lines and quoted-printable values. Each `BEGIN:VCARD` block is
//! parsed on its own so one broken block never poisons the rest of a
//! document.

use std::fmt;

use thiserror::Error;

pub const BEGIN_VCARD: &str = "BEGIN:VCARD";
pub const END_VCARD: &str = "END:VCARD";
pub const CRLF: &str = "\r\n";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("block is missing END:VCARD")]
    Truncated,
    #[error("block has no VERSION property")]
    MissingVersion,
    #[error("malformed property line `{0}`")]
    MalformedLine(String),
    #[error("invalid quoted-printable value: {0}")]
    QuotedPrintable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub values: Vec<String>,
}

impl Parameter {
    pub fn new(name: impl Into<String>, values: Vec<String>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    pub fn single(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(name, vec![value.into()])
    }
}

impl fmt::Display for Parameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.values.is_empty() {
            return f.write_str(&self.name);
        }

        let formatted_values = if self.values.len() == 1 {
            format_param_value(&self.values[0])
        } else {
            self.values
                .iter()
                .map(|v| v.trim().to_string())
                .collect::<Vec<_>>()
                .join(",")
        };

        write!(f, "{}={}", self.name, formatted_values)
    }
}

/// One content line: `[group.]NAME[;PARAM=VALUE[,VALUE]]*:value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub group: Option<String>,
    pub name: String,
    pub params: Vec<Parameter>,
    pub value: String,
}

impl Property {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            group: None,
            name: name.into(),
            params: Vec::new(),
            value: value.into(),
        }
    }

    pub fn with_param(mut self, param: Parameter) -> Self {
        self.params.push(param);
        self
    }

    pub fn param_values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.params
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(name))
            .flat_map(|p| p.values.iter().map(String::as_str))
    }

    /// TYPE tokens in source order, without the 3.0 `PREF` pseudo-type.
    pub fn types(&self) -> Vec<&str> {
        self.param_values("TYPE")
            .flat_map(|value| value.split(','))
            .map(str::trim)
            .filter(|t| !t.is_empty() && !t.eq_ignore_ascii_case("PREF"))
            .collect()
    }

    /// Preferred either through `TYPE=...,PREF` (3.0) or a `PREF` parameter (4.0).
    pub fn is_preferred(&self) -> bool {
        let typed = self
            .param_values("TYPE")
            .flat_map(|value| value.split(','))
            .any(|t| t.trim().eq_ignore_ascii_case("PREF"));
        typed || self.params.iter().any(|p| p.name.eq_ignore_ascii_case("PREF"))
    }
}

impl fmt::Display for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(group) = &self.group {
            write!(f, "{group}.")?;
        }
        f.write_str(&self.name)?;
        for param in &self.params {
            write!(f, ";{param}")?;
        }
        write!(f, ":{}", self.value)
    }
}

/// A parsed or freshly built vCard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCardRecord {
    pub version: String,
    pub properties: Vec<Property>,
}

impl VCardRecord {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            properties: Vec::new(),
        }
    }

    pub fn push(&mut self, property: Property) {
        self.properties.push(property);
    }

    /// All instances of a property, case-insensitive on the name.
    pub fn all<'a>(&'a self, name: &str) -> impl Iterator<Item = &'a Property> + 'a {
        let name = name.to_owned();
        self.properties
            .iter()
            .filter(move |p| p.name.eq_ignore_ascii_case(&name))
    }

    pub fn first(&self, name: &str) -> Option<&Property> {
        self.all(name).next()
    }
}

impl fmt::Display for VCardRecord {
    /// CRLF-joined block without a trailing line break.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{BEGIN_VCARD}{CRLF}VERSION:{}{CRLF}", self.version)?;
        for property in &self.properties {
            write!(f, "{property}{CRLF}")?;
        }
        f.write_str(END_VCARD)
    }
}

/// Parse every `BEGIN:VCARD` block of `input`, one result per block.
pub fn parse(input: &str) -> Vec<Result<VCardRecord, ParseError>> {
    split_blocks(input).iter().map(parse_block).collect()
}

struct RawBlock {
    lines: Vec<String>,
    complete: bool,
}

fn split_blocks(content: &str) -> Vec<RawBlock> {
    let mut blocks: Vec<RawBlock> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut inside = false;

    for raw_line in content.lines() {
        let line = raw_line.trim_end_matches('\r');
        if line.trim().eq_ignore_ascii_case(BEGIN_VCARD) {
            if inside && !current.is_empty() {
                blocks.push(RawBlock {
                    lines: std::mem::take(&mut current),
                    complete: false,
                });
            }
            inside = true;
        }

        if inside {
            current.push(line.to_string());
            if line.trim().eq_ignore_ascii_case(END_VCARD) {
                blocks.push(RawBlock {
                    lines: std::mem::take(&mut current),
                    complete: true,
                });
                inside = false;
            }
        }
    }

    if inside && !current.is_empty() {
        blocks.push(RawBlock {
            lines: current,
            complete: false,
        });
    }

    blocks
}

fn parse_block(block: &RawBlock) -> Result<VCardRecord, ParseError> {
    if !block.complete {
        return Err(ParseError::Truncated);
    }

    let mut version: Option<String> = None;
    let mut properties = Vec::new();

    for line in unfold_lines(&block.lines) {
        let trimmed = line.trim();
        if trimmed.is_empty()
            || trimmed.eq_ignore_ascii_case(BEGIN_VCARD)
            || trimmed.eq_ignore_ascii_case(END_VCARD)
        {
            continue;
        }

        let property = parse_property(&line)?;
        if property.name == "VERSION" {
            version = Some(property.value.trim().to_string());
            continue;
        }
        properties.push(property);
    }

    let version = version
        .filter(|v| !v.is_empty())
        .ok_or(ParseError::MissingVersion)?;
    Ok(VCardRecord {
        version,
        properties,
    })
}

fn unfold_lines(lines: &[String]) -> Vec<String> {
    let mut unfolded: Vec<String> = Vec::new();
    for line in lines {
        let mut handled = false;
        if let Some(last) = unfolded.last_mut() {
            if line.starts_with(' ') || line.starts_with('\t') {
                if last.ends_with('=') && has_quoted_printable_encoding(last) {
                    last.pop();
                }
                last.push_str(&line[1..]);
                handled = true;
            } else if last.ends_with('=') && has_quoted_printable_encoding(last) {
                last.pop();
                last.push_str(line);
                handled = true;
            }
        }

        if !handled {
            unfolded.push(line.clone());
        }
    }
    unfolded
}

fn has_quoted_printable_encoding(line: &str) -> bool {
    match split_content_line(line) {
        Some((lhs, _)) => lhs.split(';').skip(1).any(|part| {
            let trimmed = part.trim();
            match trimmed.split_once('=') {
                Some((name, value)) => {
                    name.trim().eq_ignore_ascii_case("ENCODING")
                        && value.trim().eq_ignore_ascii_case("QUOTED-PRINTABLE")
                }
                None => trimmed.eq_ignore_ascii_case("QUOTED-PRINTABLE"),
            }
        }),
        None => false,
    }
}

// First `:` outside a double-quoted parameter value.
fn split_content_line(line: &str) -> Option<(&str, &str)> {
    let mut quoted = false;
    for (idx, ch) in line.char_indices() {
        match ch {
            '"' => quoted = !quoted,
            ':' if !quoted => return Some((&line[..idx], &line[idx + 1..])),
            _ => {}
        }
    }
    None
}

fn parse_property(line: &str) -> Result<Property, ParseError> {
    let (lhs, raw_value) =
        split_content_line(line).ok_or_else(|| ParseError::MalformedLine(line.to_string()))?;

    let mut parts = lhs.split(';');
    let property_part = parts.next().unwrap_or_default().trim();
    let (group, name) = split_group(property_part);
    if name.is_empty() {
        return Err(ParseError::MalformedLine(line.to_string()));
    }

    let mut params = Vec::new();
    let mut quoted_printable = false;
    for raw in parts {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        match trimmed.split_once('=') {
            Some((param_name, param_value)) => {
                let upper = param_name.trim().to_ascii_uppercase();
                if upper == "CHARSET" {
                    continue;
                }
                if upper == "ENCODING"
                    && param_value.trim().eq_ignore_ascii_case("QUOTED-PRINTABLE")
                {
                    quoted_printable = true;
                }
                let param_value = param_value.trim();
                let values = if param_value.starts_with('"') {
                    vec![clean_quotes(param_value)]
                } else {
                    param_value.split(',').map(clean_quotes).collect()
                };
                params.push(Parameter::new(upper, values));
            }
            None => {
                if trimmed.eq_ignore_ascii_case("QUOTED-PRINTABLE") {
                    quoted_printable = true;
                    params.push(Parameter::single("ENCODING", "QUOTED-PRINTABLE"));
                } else if trimmed.eq_ignore_ascii_case("BASE64") {
                    params.push(Parameter::single("ENCODING", "BASE64"));
                } else {
                    params.push(Parameter::single("TYPE", trimmed));
                }
            }
        }
    }

    let value = if quoted_printable {
        decode_quoted_printable(raw_value.trim())?
    } else {
        raw_value.to_string()
    };

    Ok(Property {
        group: group.map(str::to_string),
        name: name.to_ascii_uppercase(),
        params,
        value,
    })
}

fn split_group(property: &str) -> (Option<&str>, &str) {
    match property.split_once('.') {
        Some((group, name)) => (Some(group), name),
        None => (None, property),
    }
}

fn decode_quoted_printable(input: &str) -> Result<String, ParseError> {
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i] != '=' {
            let mut buf = [0u8; 4];
            bytes.extend_from_slice(chars[i].encode_utf8(&mut buf).as_bytes());
            i += 1;
            continue;
        }

        if i + 1 >= chars.len() {
            // Trailing soft line break
            break;
        }

        match chars[i + 1] {
            '\r' => {
                i += 2;
                if i < chars.len() && chars[i] == '\n' {
                    i += 1;
                }
            }
            '\n' => i += 2,
            a => {
                let b = chars
                    .get(i + 2)
                    .copied()
                    .ok_or_else(|| ParseError::QuotedPrintable("truncated escape".to_string()))?;
                let value = decode_hex_pair(a, b)
                    .ok_or_else(|| ParseError::QuotedPrintable(format!("invalid escape ={a}{b}")))?;
                bytes.push(value);
                i += 3;
            }
        }
    }

    let decoded =
        String::from_utf8(bytes).map_err(|err| ParseError::QuotedPrintable(err.to_string()))?;
    Ok(decoded.replace('\r', "").replace('\n', "\\n"))
}

fn decode_hex_pair(a: char, b: char) -> Option<u8> {
    let high = a.to_digit(16)?;
    let low = b.to_digit(16)?;
    Some(((high << 4) | low) as u8)
}

fn clean_quotes(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].to_string()
    } else {
        trimmed.to_string()
    }
}

fn format_param_value(value: &str) -> String {
    let trimmed = value.trim();
    if trimmed.contains(',') || trimmed.contains(';') || trimmed.contains(':') {
        format!("\"{}\"", trimmed.replace('"', "'"))
    } else {
        trimmed.to_string()
    }
}

/// Escape backslashes and line breaks so a text value stays on one content
/// line and reads back unchanged through [`unescape_text`].
pub fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace("\r\n", "\\n")
        .replace(['\r', '\n'], "\\n")
}

/// Undo vCard text escapes (`\n`, `\,`, `\;`, `\\`).
pub fn unescape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

/// Split a structured value (`N`, `ADR`) on unescaped `;` and unescape each
/// component.
pub fn split_structured(value: &str) -> Vec<String> {
    let mut components = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for ch in value.chars() {
        if escaped {
            current.push('\\');
            current.push(ch);
            escaped = false;
        } else if ch == '\\' {
            escaped = true;
        } else if ch == ';' {
            components.push(unescape_text(&std::mem::take(&mut current)));
        } else {
            current.push(ch);
        }
    }
    if escaped {
        current.push('\\');
    }
    components.push(unescape_text(&current));
    components
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_one(input: &str) -> VCardRecord {
        let mut results = parse(input);
        assert_eq!(results.len(), 1);
        results.remove(0).unwrap()
    }

    #[test]
    fn unfold_lines_handles_quoted_printable_soft_breaks() {
        let lines = vec![
            "NOTE;ENCODING=QUOTED-PRINTABLE:Hello=".to_string(),
            "World".to_string(),
        ];

        let unfolded = unfold_lines(&lines);
        assert_eq!(
            unfolded,
            vec!["NOTE;ENCODING=QUOTED-PRINTABLE:HelloWorld".to_string()]
        );
    }

    #[test]
    fn unfold_lines_joins_folded_continuations() {
        let lines = vec!["NOTE:Hello ".to_string(), " World".to_string()];
        assert_eq!(unfold_lines(&lines), vec!["NOTE:Hello World".to_string()]);
    }

    #[test]
    fn unfold_lines_does_not_merge_non_qp_lines() {
        let lines = vec![
            "PHOTO;ENCODING=BASE64:abc=".to_string(),
            "END:VCARD".to_string(),
        ];

        let unfolded = unfold_lines(&lines);
        assert_eq!(unfolded, lines);
    }

    #[test]
    fn decode_quoted_printable_decodes_utf8_hex_pairs() {
        assert_eq!(decode_quoted_printable("Line=3D1").unwrap(), "Line=1");
        assert_eq!(decode_quoted_printable("=E5=BC=A0=E4=B8=89").unwrap(), "张三");
        assert_eq!(decode_quoted_printable("Trailing=").unwrap(), "Trailing");
        assert!(decode_quoted_printable("bad=ZZ").is_err());
    }

    #[test]
    fn parses_v3_parameters_and_groups() {
        let card = parse_one(
            "BEGIN:VCARD\r\nVERSION:3.0\r\nFN;CHARSET=UTF-8:张三\r\nitem1.TEL;TYPE=CELL,PREF:138\r\nEND:VCARD\r\n",
        );
        assert_eq!(card.version, "3.0");

        let fn_prop = card.first("fn").unwrap();
        assert_eq!(fn_prop.value, "张三");
        assert!(fn_prop.params.is_empty());

        let tel = card.first("TEL").unwrap();
        assert_eq!(tel.group.as_deref(), Some("item1"));
        assert_eq!(tel.types(), vec!["CELL"]);
        assert!(tel.is_preferred());
    }

    #[test]
    fn parses_bare_v21_parameters() {
        let card = parse_one(
            "BEGIN:VCARD\nVERSION:2.1\nTEL;CELL;PREF:555\nNOTE;QUOTED-PRINTABLE:a=3Db\nEND:VCARD",
        );
        let tel = card.first("TEL").unwrap();
        assert_eq!(tel.types(), vec!["CELL"]);
        assert!(tel.is_preferred());
        assert_eq!(card.first("NOTE").unwrap().value, "a=b");
    }

    #[test]
    fn parses_v4_pref_parameter_and_uri_value() {
        let card = parse_one(
            "BEGIN:VCARD\r\nVERSION:4.0\r\nTEL;TYPE=cell;PREF=1:tel:+8613800138000\r\nEND:VCARD",
        );
        let tel = card.first("TEL").unwrap();
        assert_eq!(tel.value, "tel:+8613800138000");
        assert_eq!(tel.types(), vec!["cell"]);
        assert!(tel.is_preferred());
    }

    #[test]
    fn quoted_parameter_values_may_hold_colons() {
        let card = parse_one(
            "BEGIN:VCARD\r\nVERSION:4.0\r\nTEL;TYPE=\"work,voice\":tel:+1\r\nEND:VCARD",
        );
        let tel = card.first("TEL").unwrap();
        assert_eq!(tel.types(), vec!["work", "voice"]);
        assert_eq!(tel.value, "tel:+1");
    }

    #[test]
    fn truncated_and_versionless_blocks_fail_independently() {
        let input = "BEGIN:VCARD\r\nVERSION:4.0\r\nFN:A\r\nEND:VCARD\r\n\
                     BEGIN:VCARD\r\nFN:B\r\nEND:VCARD\r\n\
                     BEGIN:VCARD\r\nVERSION:4.0\r\nFN:C\r\n";
        let results = parse(input);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(results[1], Err(ParseError::MissingVersion));
        assert_eq!(results[2], Err(ParseError::Truncated));
    }

    #[test]
    fn nested_begin_truncates_the_open_block() {
        let input = "BEGIN:VCARD\nVERSION:3.0\nFN:A\nBEGIN:VCARD\nVERSION:3.0\nFN:B\nEND:VCARD\n";
        let results = parse(input);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0], Err(ParseError::Truncated));
        assert_eq!(results[1].as_ref().unwrap().first("FN").unwrap().value, "B");
    }

    #[test]
    fn line_without_colon_is_malformed() {
        let results = parse("BEGIN:VCARD\nVERSION:3.0\nGARBAGE\nEND:VCARD\n");
        assert_eq!(
            results[0],
            Err(ParseError::MalformedLine("GARBAGE".to_string()))
        );
    }

    #[test]
    fn record_renders_crlf_block() {
        let mut record = VCardRecord::new("3.0");
        record.push(
            Property::new("TEL", "138")
                .with_param(Parameter::new("TYPE", vec!["CELL".into(), "PREF".into()])),
        );
        record.push(Property::new("FN", "A").with_param(Parameter::single("CHARSET", "UTF-8")));
        assert_eq!(
            record.to_string(),
            "BEGIN:VCARD\r\nVERSION:3.0\r\nTEL;TYPE=CELL,PREF:138\r\nFN;CHARSET=UTF-8:A\r\nEND:VCARD"
        );
    }

    #[test]
    fn structured_values_respect_escapes() {
        assert_eq!(
            split_structured("Doe;John\\;Jr;;;"),
            vec!["Doe", "John;Jr", "", "", ""]
        );
        assert_eq!(unescape_text("a\\nb\\, c\\\\"), "a\nb, c\\");
        assert_eq!(escape_text("a\r\nb\nc"), "a\\nb\\nc");
        assert_eq!(escape_text("ACME\\new"), "ACME\\\\new");
    }

    #[test]
    fn escaped_text_reads_back_unchanged() {
        for original in ["ACME\\new dept", "C:\\\\share\r\nline two", "trailing\\"] {
            assert_eq!(unescape_text(&escape_text(original)), original.replace("\r\n", "\n"));
        }
    }

    #[test]
    fn lookup_name_may_be_dropped_before_the_result() {
        let card = parse_one("BEGIN:VCARD\r\nVERSION:4.0\r\nTEL:123\r\nEND:VCARD\r\n");
        let tel = {
            let name = String::from("tel");
            card.first(&name)
        };
        assert_eq!(tel.map(|p| p.value.as_str()), Some("123"));
        assert_eq!(card.all(&String::from("TEL")).count(), 1);
    }
}

//! Contact spreadsheet <-> vCard conversion.
//!
//! [`encode()`] turns spreadsheet rows into vCard 3.0 or 4.0 text according to a
//! [`mapping::ColumnMapping`]; [`decode()`] flattens vCard text back into a fixed
//! set of columns. Both are pure functions over in-memory data; file handling
//! lives in [`sheet`] and the binary.

pub mod address;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod encode;
pub mod logging;
pub mod mapping;
pub mod names;
pub mod phone;
pub mod sheet;
pub mod vcard;

pub use catalog::{FieldKey, Version};
pub use decode::{decode, decode_with, ContactRow, DecodeOptions, DecodeReport, LabelStyle};
pub use encode::{encode, encode_rows, EncodeOptions, EncodeReport, Encoder};
pub use mapping::{ColumnMapping, FieldMapping, Row, Target};

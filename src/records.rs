//! User directory codec
//!
//! `users.json` is decoded into loosely-typed [`Record`]s rather than a fixed
//! struct so that fields Slack adds in future exports survive the rewrite
//! untouched. Field order is preserved.

use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::{Map, Value};
use std::io::Read;

/// One user's directory entry: field name to JSON value, in file order
pub type Record = Map<String, Value>;

/// Field holding the join key
pub const ID_FIELD: &str = "id";
/// Field holding the display handle, used only in log lines
pub const NAME_FIELD: &str = "name";
/// Field holding the nested profile sub-record
pub const PROFILE_FIELD: &str = "profile";

/// Indentation used by Slack's own exports
const INDENT: &[u8] = b"    ";

/// Typed accessors that return `None` instead of failing on absent or mistyped fields
pub trait RecordExt {
    /// String value of `field`
    fn str_field(&self, field: &str) -> Option<&str>;

    /// Nested record under `field`
    fn record_field(&self, field: &str) -> Option<&Record>;

    /// Mutable nested record under `field`
    fn record_field_mut(&mut self, field: &str) -> Option<&mut Record>;

    /// Insert or replace a string field, keeping its position if it already exists
    fn set_str(&mut self, field: &str, value: impl Into<String>);

    /// The record's `id`, if it is a string
    fn id(&self) -> Option<&str> {
        self.str_field(ID_FIELD)
    }

    /// The record's `name`, or an empty string
    fn name(&self) -> &str {
        self.str_field(NAME_FIELD).unwrap_or_default()
    }
}

impl RecordExt for Record {
    fn str_field(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    fn record_field(&self, field: &str) -> Option<&Record> {
        self.get(field).and_then(Value::as_object)
    }

    fn record_field_mut(&mut self, field: &str) -> Option<&mut Record> {
        self.get_mut(field).and_then(Value::as_object_mut)
    }

    fn set_str(&mut self, field: &str, value: impl Into<String>) {
        self.insert(field.to_string(), Value::String(value.into()));
    }
}

/// Decode the contents of the user directory entry
///
/// `entry` names the archive entry and only appears in error messages.
pub fn decode<R: Read>(entry: &str, reader: R) -> Result<Vec<Record>> {
    serde_json::from_reader(reader).map_err(|e| {
        if e.is_io() {
            Error::Io(std::io::Error::other(format!(
                "failed to read {}: {}",
                entry, e
            )))
        } else {
            Error::MalformedInput {
                entry: entry.to_string(),
                reason: e.to_string(),
            }
        }
    })
}

/// Encode records with four-space indentation and a trailing newline
pub fn encode(records: &[Record]) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(INDENT);
    let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
    records.serialize(&mut serializer)?;
    buf.push(b'\n');
    Ok(buf)
}

//! Canonical records produced by the normaliser.

use std::io;

use serde::Serialize;
use serde_json::Value;
use serde_json::ser::Formatter;

/// An immutable JSON document produced from one fetched response.
///
/// Object keys keep their insertion order so that re-serialising a record
/// reproduces the field order of the original body.
///
/// # Examples
///
/// ```
/// use fetchsink_core::Record;
///
/// # fn main() -> Result<(), serde_json::Error> {
/// let record = Record::from_slice(br#"{"word":"nostalgic","score":42}"#)?;
/// assert_eq!(record.to_json_text()?, r#"{"word": "nostalgic", "score": 42}"#);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Record {
    value: Value,
}

impl Record {
    /// Wrap an already-parsed JSON value.
    #[must_use]
    pub const fn new(value: Value) -> Self {
        Self { value }
    }

    /// Parse a record from raw JSON bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes).map(Self::new)
    }

    /// Borrow the underlying JSON value.
    #[must_use]
    pub const fn as_value(&self) -> &Value {
        &self.value
    }

    /// Consume the record, returning the underlying JSON value.
    #[must_use]
    pub fn into_value(self) -> Value {
        self.value
    }

    /// Look up a top-level field when the record is an object.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.value.as_object().and_then(|map| map.get(field))
    }

    /// Serialise with `", "` and `": "` separators, matching the layout most
    /// JSON producers in the scripting world emit by default.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut buffer = Vec::new();
        let mut serializer = serde_json::Serializer::with_formatter(&mut buffer, SpacedFormatter);
        self.value.serialize(&mut serializer)?;
        Ok(buffer)
    }

    /// Same as [`Record::to_json_bytes`] but as a `String`.
    pub fn to_json_text(&self) -> Result<String, serde_json::Error> {
        let bytes = self.to_json_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

impl From<Value> for Record {
    fn from(value: Value) -> Self {
        Self::new(value)
    }
}

/// Output of normalising a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// A parsed JSON document.
    Structured(Record),
    /// Any other body, kept verbatim.
    Text(String),
}

impl Payload {
    /// Borrow the structured record, if any.
    #[must_use]
    pub const fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Structured(record) => Some(record),
            Self::Text(_) => None,
        }
    }

    /// Bytes a file sink writes for this payload.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        match self {
            Self::Structured(record) => record.to_json_bytes(),
            Self::Text(text) => Ok(text.as_bytes().to_vec()),
        }
    }

    /// Short label used in log lines and error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Structured(_) => "structured",
            Self::Text(_) => "text",
        }
    }
}

/// Compact single-line JSON with a space after `,` and `:`.
#[derive(Debug, Clone, Copy, Default)]
struct SpacedFormatter;

impl Formatter for SpacedFormatter {
    fn begin_array_value<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_key<W>(&mut self, writer: &mut W, first: bool) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        if first {
            Ok(())
        } else {
            writer.write_all(b", ")
        }
    }

    fn begin_object_value<W>(&mut self, writer: &mut W) -> io::Result<()>
    where
        W: ?Sized + io::Write,
    {
        writer.write_all(b": ")
    }
}

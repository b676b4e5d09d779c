//! NDEF record types.
//!
//! `NdefRecord` is the raw wire-level record (TNF, type, payload, optional id).
//! `RecordContent` is the typed view of its payload produced by `decode`.

use serde::{Deserialize, Serialize};

use super::{text, uri, NdefError, RTD_TEXT, RTD_URI};

/// Type Name Format: the 3-bit code in bits 0-2 of the record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Tnf {
    #[default]
    Empty,
    WellKnown,
    Media,
    AbsoluteUri,
    External,
    Unknown,
    Unchanged,
    Reserved,
}

impl Tnf {
    /// Decode the TNF from a header byte (only the low three bits are read).
    pub fn from_header(header: u8) -> Self {
        match header & super::TNF_MASK {
            0x00 => Tnf::Empty,
            0x01 => Tnf::WellKnown,
            0x02 => Tnf::Media,
            0x03 => Tnf::AbsoluteUri,
            0x04 => Tnf::External,
            0x05 => Tnf::Unknown,
            0x06 => Tnf::Unchanged,
            _ => Tnf::Reserved,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Tnf::Empty => 0x00,
            Tnf::WellKnown => 0x01,
            Tnf::Media => 0x02,
            Tnf::AbsoluteUri => 0x03,
            Tnf::External => 0x04,
            Tnf::Unknown => 0x05,
            Tnf::Unchanged => 0x06,
            Tnf::Reserved => 0x07,
        }
    }
}

/// A single NDEF record as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NdefRecord {
    pub tnf: Tnf,
    /// Record type, e.g. `b"T"` for text or `b"U"` for URI.
    pub record_type: Vec<u8>,
    pub payload: Vec<u8>,
    pub id: Option<Vec<u8>>,
}

impl NdefRecord {
    /// Build a well-known text record (`T`) with the given language code.
    pub fn text(text: &str, language: &str) -> Result<Self, NdefError> {
        Ok(Self {
            tnf: Tnf::WellKnown,
            record_type: RTD_TEXT.to_vec(),
            payload: text::build_payload(text, language)?,
            id: None,
        })
    }

    /// Build a well-known URI record (`U`), abbreviating the longest known prefix.
    pub fn uri(uri: &str) -> Self {
        Self {
            tnf: Tnf::WellKnown,
            record_type: RTD_URI.to_vec(),
            payload: uri::build_payload(uri),
            id: None,
        }
    }

    /// Attach a record id. Sets the IL flag when encoded.
    pub fn with_id(mut self, id: impl Into<Vec<u8>>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn is_text(&self) -> bool {
        self.tnf == Tnf::WellKnown && self.record_type == RTD_TEXT
    }
}

/// Typed interpretation of a decoded record's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum RecordContent {
    Text { text: String, language: String },
    Uri { uri: String },
    Raw { hex: String },
    /// The record could not be decoded. Other records in the message are unaffected.
    Error { message: String },
}

impl RecordContent {
    pub fn is_error(&self) -> bool {
        matches!(self, RecordContent::Error { .. })
    }

    /// The decoded text, if this is a text record.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            RecordContent::Text { text, .. } => Some(text),
            _ => None,
        }
    }
}

/// A record as read off a tag, with its payload interpreted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedRecord {
    pub record: NdefRecord,
    pub content: RecordContent,
}

//! NDEF binary record codec.
//!
//! Only the short-record form is produced: each record is
//! `[header][type len][payload len][id len?][type][id?][payload]` with
//! one-byte lengths. The header carries MB (0x80), ME (0x40), SR (0x10),
//! IL (0x08) and the TNF in bits 0-2.
//!
//! Decoding is resilient: a record that cannot be interpreted becomes a
//! `RecordContent::Error` entry and the records before it are kept.

pub mod text;
pub mod types;
pub mod uri;

pub use types::{DecodedRecord, NdefRecord, RecordContent, Tnf};

use thiserror::Error;

/// Message Begin.
pub const FLAG_MB: u8 = 0x80;
/// Message End.
pub const FLAG_ME: u8 = 0x40;
/// Chunk Flag.
pub const FLAG_CF: u8 = 0x20;
/// Short Record.
pub const FLAG_SR: u8 = 0x10;
/// ID Length present.
pub const FLAG_IL: u8 = 0x08;
pub const TNF_MASK: u8 = 0x07;

/// Largest length expressible in a short-record length field.
pub const MAX_SHORT_RECORD_LEN: usize = 255;

/// Well-known record type for text.
pub const RTD_TEXT: &[u8] = b"T";
/// Well-known record type for URIs.
pub const RTD_URI: &[u8] = b"U";

/// Default language code for text records.
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NdefError {
    #[error("{field} length {len} exceeds the short-record limit of {max} bytes")]
    CapacityExceeded {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("Malformed record: {0}")]
    MalformedRecord(String),
    #[error("Invalid language code: {0}")]
    InvalidLanguageCode(String),
}

/// Encode records as an NDEF message. MB is set on the first record and ME on the last.
pub fn encode(records: &[NdefRecord]) -> Result<Vec<u8>, NdefError> {
    let mut out = Vec::new();
    let last = records.len().saturating_sub(1);
    for (index, record) in records.iter().enumerate() {
        encode_record(&mut out, record, index == 0, index == last)?;
    }
    Ok(out)
}

/// Encode text records with caller-supplied message boundaries.
///
/// Each entry is `(text, is_first, is_last)`; the header's MB/ME bits follow
/// the flags exactly.
pub fn encode_text(entries: &[(&str, bool, bool)], language: &str) -> Result<Vec<u8>, NdefError> {
    let mut out = Vec::new();
    for &(text, is_first, is_last) in entries {
        let record = NdefRecord::text(text, language)?;
        encode_record(&mut out, &record, is_first, is_last)?;
    }
    Ok(out)
}

fn encode_record(
    out: &mut Vec<u8>,
    record: &NdefRecord,
    is_first: bool,
    is_last: bool,
) -> Result<(), NdefError> {
    check_short_len("type", record.record_type.len())?;
    check_short_len("payload", record.payload.len())?;
    if let Some(id) = &record.id {
        check_short_len("id", id.len())?;
    }

    let mut header = FLAG_SR | record.tnf.bits();
    if is_first {
        header |= FLAG_MB;
    }
    if is_last {
        header |= FLAG_ME;
    }
    if record.id.is_some() {
        header |= FLAG_IL;
    }

    out.push(header);
    out.push(record.record_type.len() as u8);
    out.push(record.payload.len() as u8);
    if let Some(id) = &record.id {
        out.push(id.len() as u8);
    }
    out.extend_from_slice(&record.record_type);
    if let Some(id) = &record.id {
        out.extend_from_slice(id);
    }
    out.extend_from_slice(&record.payload);
    Ok(())
}

fn check_short_len(field: &'static str, len: usize) -> Result<(), NdefError> {
    if len > MAX_SHORT_RECORD_LEN {
        return Err(NdefError::CapacityExceeded {
            field,
            len,
            max: MAX_SHORT_RECORD_LEN,
        });
    }
    Ok(())
}

/// Decode an NDEF message.
///
/// Never fails as a whole. A record whose lengths overrun the buffer ends
/// the message with an error entry; a record with an unsupported header or
/// an undecodable payload gets an error entry and decoding continues.
pub fn decode(bytes: &[u8]) -> Vec<DecodedRecord> {
    let mut cursor = Cursor::new(bytes);
    let mut decoded = Vec::new();

    while !cursor.is_empty() {
        let mut record = NdefRecord::default();
        match read_record(&mut cursor, &mut record) {
            Ok(header) => {
                let content = interpret(header, &record);
                decoded.push(DecodedRecord { record, content });
                if header & FLAG_ME != 0 {
                    if !cursor.is_empty() {
                        log::debug!(
                            "Ignoring {} trailing bytes after message end",
                            cursor.remaining()
                        );
                    }
                    break;
                }
            }
            Err(e) => {
                log::warn!("NDEF record {} malformed: {}", decoded.len(), e);
                decoded.push(DecodedRecord {
                    record,
                    content: RecordContent::Error {
                        message: e.to_string(),
                    },
                });
                // Record boundaries are lost after an overrun
                break;
            }
        }
    }

    decoded
}

/// Read one record's fields into `record`, returning its header byte.
///
/// On error `record` holds whatever was read before the failure.
fn read_record(cursor: &mut Cursor<'_>, record: &mut NdefRecord) -> Result<u8, NdefError> {
    let header = cursor.byte("header")?;
    record.tnf = Tnf::from_header(header);

    let type_len = cursor.byte("type length")? as usize;
    let payload_len = if header & FLAG_SR != 0 {
        cursor.byte("payload length")? as usize
    } else {
        let bytes = cursor.take(4, "payload length")?;
        u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
    };
    let id_len = if header & FLAG_IL != 0 {
        Some(cursor.byte("id length")? as usize)
    } else {
        None
    };

    record.record_type = cursor.take(type_len, "type")?.to_vec();
    if let Some(id_len) = id_len {
        record.id = Some(cursor.take(id_len, "id")?.to_vec());
    }

    match cursor.take(payload_len, "payload") {
        Ok(payload) => record.payload = payload.to_vec(),
        Err(e) => {
            record.payload = cursor.rest().to_vec();
            return Err(e);
        }
    }

    Ok(header)
}

/// Interpret a structurally complete record's payload.
fn interpret(header: u8, record: &NdefRecord) -> RecordContent {
    let error = |message: String| RecordContent::Error { message };

    if header & FLAG_SR == 0 {
        return error("long-record form is not supported".to_string());
    }
    if header & FLAG_CF != 0 {
        return error("chunked records are not supported".to_string());
    }

    match record.tnf {
        Tnf::Unchanged | Tnf::Reserved => {
            error(format!("unrecognized TNF 0x{:02x}", record.tnf.bits()))
        }
        Tnf::WellKnown if record.record_type == RTD_TEXT => {
            match text::parse_payload(&record.payload) {
                Ok((text, language)) => RecordContent::Text { text, language },
                Err(e) => error(e.to_string()),
            }
        }
        Tnf::WellKnown if record.record_type == RTD_URI => {
            match uri::parse_payload(&record.payload) {
                Ok(uri) => RecordContent::Uri { uri },
                Err(e) => error(e.to_string()),
            }
        }
        _ => RecordContent::Raw {
            hex: hex::encode(&record.payload),
        },
    }
}

/// Bounds-checked reader over a byte slice.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    fn byte(&mut self, what: &str) -> Result<u8, NdefError> {
        Ok(self.take(1, what)?[0])
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8], NdefError> {
        if len > self.remaining() {
            return Err(NdefError::MalformedRecord(format!(
                "declared {} length {} exceeds remaining {} bytes",
                what,
                len,
                self.remaining()
            )));
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }
}

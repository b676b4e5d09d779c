//! Well-known URI record (`U`) payloads.
//!
//! The first payload byte is an identifier code abbreviating a common URI
//! prefix. Code 0x00 means no abbreviation; 0x01-0x23 index `URI_PREFIXES`.

use super::NdefError;

/// Prefixes for identifier codes 0x01..=0x23, in code order.
pub const URI_PREFIXES: [&str; 35] = [
    "http://www.",
    "https://www.",
    "http://",
    "https://",
    "tel:",
    "mailto:",
    "ftp://anonymous:anonymous@",
    "ftp://ftp.",
    "ftps://",
    "sftp://",
    "smb://",
    "nfs://",
    "ftp://",
    "dav://",
    "news:",
    "telnet://",
    "imap:",
    "rtsp://",
    "urn:",
    "pop:",
    "sip:",
    "sips:",
    "tftp:",
    "btspp://",
    "btl2cap://",
    "btgoep://",
    "tcpobex://",
    "irdaobex://",
    "file://",
    "urn:epc:id:",
    "urn:epc:tag:",
    "urn:epc:pat:",
    "urn:epc:raw:",
    "urn:epc:",
    "urn:nfc:",
];

/// Look up the prefix for an identifier code.
pub fn prefix(code: u8) -> Option<&'static str> {
    match code {
        0 => Some(""),
        n => URI_PREFIXES.get(n as usize - 1).copied(),
    }
}

/// Expand a URI payload into the full URI.
pub fn parse_payload(payload: &[u8]) -> Result<String, NdefError> {
    let Some((&code, rest)) = payload.split_first() else {
        return Err(NdefError::MalformedRecord("empty URI payload".to_string()));
    };

    let prefix = prefix(code).ok_or_else(|| {
        NdefError::MalformedRecord(format!("unknown URI identifier code 0x{:02x}", code))
    })?;
    let remainder = std::str::from_utf8(rest)
        .map_err(|_| NdefError::MalformedRecord("URI is not valid UTF-8".to_string()))?;

    Ok(format!("{}{}", prefix, remainder))
}

/// Build a URI payload using the longest matching prefix code.
pub fn build_payload(uri: &str) -> Vec<u8> {
    let best = URI_PREFIXES
        .iter()
        .enumerate()
        .filter(|(_, p)| uri.starts_with(*p))
        .max_by_key(|(_, p)| p.len());

    let (code, remainder) = match best {
        Some((index, p)) => ((index + 1) as u8, &uri[p.len()..]),
        None => (0u8, uri),
    };

    let mut payload = Vec::with_capacity(1 + remainder.len());
    payload.push(code);
    payload.extend_from_slice(remainder.as_bytes());
    payload
}

//! Well-known text record (`T`) payloads.
//!
//! Payload layout: `[status][language code][text]`. Status bit 7 selects
//! UTF-16 text, bits 0-5 hold the language-code length.

use super::NdefError;

/// Status bit marking the text as UTF-16.
pub const STATUS_UTF16: u8 = 0x80;

/// Low six status bits: language-code length.
pub const LANGUAGE_LENGTH_MASK: u8 = 0x3F;

/// Build a UTF-8 text payload.
pub fn build_payload(text: &str, language: &str) -> Result<Vec<u8>, NdefError> {
    let lang = language.as_bytes();
    if lang.len() > LANGUAGE_LENGTH_MASK as usize {
        return Err(NdefError::InvalidLanguageCode(language.to_string()));
    }

    let mut payload = Vec::with_capacity(1 + lang.len() + text.len());
    payload.push(lang.len() as u8);
    payload.extend_from_slice(lang);
    payload.extend_from_slice(text.as_bytes());
    Ok(payload)
}

/// Parse a text payload into `(text, language)`.
pub fn parse_payload(payload: &[u8]) -> Result<(String, String), NdefError> {
    let Some((&status, rest)) = payload.split_first() else {
        return Err(NdefError::MalformedRecord("empty text payload".to_string()));
    };

    let lang_len = (status & LANGUAGE_LENGTH_MASK) as usize;
    if lang_len > rest.len() {
        return Err(NdefError::MalformedRecord(format!(
            "language code length {} exceeds payload length {}",
            lang_len,
            rest.len()
        )));
    }

    let (lang, body) = rest.split_at(lang_len);
    let language = String::from_utf8_lossy(lang).into_owned();

    let text = if status & STATUS_UTF16 != 0 {
        decode_utf16(body)?
    } else {
        String::from_utf8(body.to_vec())
            .map_err(|_| NdefError::MalformedRecord("text is not valid UTF-8".to_string()))?
    };

    Ok((text, language))
}

/// Decode UTF-16 text, big-endian unless a little-endian BOM is present.
fn decode_utf16(body: &[u8]) -> Result<String, NdefError> {
    if body.len() % 2 != 0 {
        return Err(NdefError::MalformedRecord(
            "UTF-16 text has an odd byte length".to_string(),
        ));
    }

    let little_endian = body.starts_with(&[0xFF, 0xFE]);
    let units: Vec<u16> = body
        .chunks_exact(2)
        .map(|pair| {
            if little_endian {
                u16::from_le_bytes([pair[0], pair[1]])
            } else {
                u16::from_be_bytes([pair[0], pair[1]])
            }
        })
        .collect();

    // Drop a leading BOM in either byte order
    let units = match units.first() {
        Some(0xFEFF) => &units[1..],
        _ => &units[..],
    };

    String::from_utf16(units)
        .map_err(|_| NdefError::MalformedRecord("text is not valid UTF-16".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_payload_layout() {
        let payload = build_payload("Hello", "en").unwrap();
        assert_eq!(payload[0], 2);
        assert_eq!(&payload[1..3], b"en");
        assert_eq!(&payload[3..], b"Hello");
    }

    #[test]
    fn test_parse_payload_utf8() {
        let payload = build_payload("héllo wörld", "de").unwrap();
        let (text, language) = parse_payload(&payload).unwrap();
        assert_eq!(text, "héllo wörld");
        assert_eq!(language, "de");
    }

    #[test]
    fn test_parse_payload_utf16_be() {
        let mut payload = vec![STATUS_UTF16 | 2, b'e', b'n'];
        for unit in "Hi".encode_utf16() {
            payload.extend_from_slice(&unit.to_be_bytes());
        }
        let (text, language) = parse_payload(&payload).unwrap();
        assert_eq!(text, "Hi");
        assert_eq!(language, "en");
    }

    #[test]
    fn test_parse_payload_utf16_le_bom() {
        let mut payload = vec![STATUS_UTF16 | 2, b'e', b'n', 0xFF, 0xFE];
        for unit in "ok".encode_utf16() {
            payload.extend_from_slice(&unit.to_le_bytes());
        }
        let (text, _) = parse_payload(&payload).unwrap();
        assert_eq!(text, "ok");
    }

    #[test]
    fn test_parse_payload_rejects_short_language() {
        // Status claims a 5-byte language code but only 2 bytes follow
        let err = parse_payload(&[0x05, b'e', b'n']).unwrap_err();
        assert!(matches!(err, NdefError::MalformedRecord(_)));
    }

    #[test]
    fn test_parse_payload_empty() {
        assert!(parse_payload(&[]).is_err());
    }

    #[test]
    fn test_build_payload_rejects_long_language() {
        let lang = "x".repeat(64);
        assert!(matches!(
            build_payload("t", &lang),
            Err(NdefError::InvalidLanguageCode(_))
        ));
    }
}

//! Modified UTF-7 for mailbox names (RFC 3501 section 5.1.3).

use base64::alphabet::IMAP_MUTF7;
use base64::engine::general_purpose::{GeneralPurpose, NO_PAD};
use base64::Engine;

use crate::error::{ParseError, Result};

const MUTF7: GeneralPurpose = GeneralPurpose::new(&IMAP_MUTF7, NO_PAD);

fn is_direct(c: char) -> bool {
    (' '..='~').contains(&c) && c != '&'
}

/// Encodes a mailbox name for the wire.
pub fn encode(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut pending: Vec<u16> = Vec::new();

    let flush = |pending: &mut Vec<u16>, out: &mut String| {
        if pending.is_empty() {
            return;
        }
        let bytes: Vec<u8> = pending.iter().flat_map(|u| u.to_be_bytes()).collect();
        out.push('&');
        out.push_str(&MUTF7.encode(bytes));
        out.push('-');
        pending.clear();
    };

    for c in name.chars() {
        if is_direct(c) {
            flush(&mut pending, &mut out);
            out.push(c);
        } else if c == '&' {
            flush(&mut pending, &mut out);
            out.push_str("&-");
        } else {
            let mut units = [0u16; 2];
            pending.extend_from_slice(c.encode_utf16(&mut units));
        }
    }
    flush(&mut pending, &mut out);
    out
}

/// Decodes a mailbox name received from the server.
pub fn decode(name: &str) -> Result<String> {
    let invalid = || ParseError::Utf7(name.to_string());
    let mut out = String::with_capacity(name.len());
    let mut rest = name;

    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('-').ok_or_else(invalid)?;
        let encoded = &after[..end];
        if encoded.is_empty() {
            out.push('&');
        } else {
            let bytes = MUTF7.decode(encoded).map_err(|_| invalid())?;
            if bytes.len() % 2 != 0 {
                return Err(invalid().into());
            }
            let units: Vec<u16> = bytes
                .chunks(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            let decoded = String::from_utf16(&units).map_err(|_| invalid())?;
            out.push_str(&decoded);
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    const PAIRS: &[(&str, &str)] = &[
        ("INBOX", "INBOX"),
        ("Encyclopædia", "Encyclop&AOY-dia"),
        ("Tom & Jerry", "Tom &- Jerry"),
        ("~peter/mail/台北/日本語", "~peter/mail/&U,BTFw-/&ZeVnLIqe-"),
        ("📧", "&2D3c5w-"),
    ];

    #[test]
    fn encodes() {
        for (plain, wire) in PAIRS {
            assert_eq!(encode(plain), *wire);
        }
    }

    #[test]
    fn decodes() {
        for (plain, wire) in PAIRS {
            assert_eq!(decode(wire).unwrap(), *plain);
        }
    }

    #[test]
    fn rejects_malformed_names() {
        assert!(decode("&AOY").is_err());
        assert!(decode("&A-").is_err());
        assert!(decode("&2D0-").is_err());
    }
}

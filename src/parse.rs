use bytes::BytesMut;
use imap_proto::{Capability, MailboxDatum, Response};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::error::{Error, ParseError, Result};
use crate::types::ResponseData;

static AUTH_RESP_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\+ ?(.*)\r\n$").unwrap());

/// Parses one complete logical line, literals included, into a response.
pub fn parse_response(line: BytesMut) -> Result<ResponseData> {
    ResponseData::try_new(line, |raw| {
        match imap_proto::parser::parse_response(raw) {
            Ok((rest, response)) if rest.is_empty() => Ok(response),
            Ok(_) | Err(_) => Err(Error::Parse(ParseError::Invalid(raw.to_vec()))),
        }
    })
}

/// Extracts and decodes the base64 challenge of an `AUTHENTICATE` continuation request.
pub fn parse_authenticate_challenge(response: &ResponseData) -> Result<Vec<u8>> {
    let raw = response.raw();
    let data = AUTH_RESP_REGEX
        .captures(raw)
        .and_then(|cap| cap.get(1))
        .map(|m| m.as_bytes())
        .ok_or_else(|| {
            ParseError::Authentication(String::from_utf8_lossy(raw).into_owned(), None)
        })?;

    base64::Engine::decode(&base64::engine::general_purpose::STANDARD, data).map_err(|e| {
        ParseError::Authentication(String::from_utf8_lossy(data).into_owned(), Some(e)).into()
    })
}

/// The capability names announced by a `CAPABILITY` response, upper-cased.
pub fn parse_capabilities(response: &ResponseData) -> Option<Vec<String>> {
    match response.parsed() {
        Response::Capabilities(caps) => Some(caps.iter().map(capability_name).collect()),
        _ => None,
    }
}

fn capability_name(cap: &Capability<'_>) -> String {
    match cap {
        Capability::Imap4rev1 => "IMAP4REV1".to_string(),
        Capability::Auth(mechanism) => format!("AUTH={}", mechanism.to_uppercase()),
        Capability::Atom(atom) => atom.to_uppercase(),
    }
}

/// The message numbers of a `SEARCH` response.
pub fn parse_ids(response: &ResponseData) -> Option<Vec<u32>> {
    match response.parsed() {
        Response::MailboxData(MailboxDatum::Search(ids)) => Some(ids.clone()),
        _ => None,
    }
}

/// The message number of an `EXPUNGE` response.
pub fn parse_expunge(response: &ResponseData) -> Option<u32> {
    match response.parsed() {
        Response::Expunge(id) => Some(*id),
        _ => None,
    }
}

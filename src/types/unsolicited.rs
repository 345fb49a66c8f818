use imap_proto::{MailboxDatum, Response};

use crate::types::{Reply, Seq};

/// The untagged responses a server may send at any time to report changes in the selected
/// mailbox (see [RFC 3501 section 7](https://tools.ietf.org/html/rfc3501#section-7)).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsolicitedResponse {
    /// The number of messages in the mailbox.
    Exists(u32),
    /// The number of messages with the `\Recent` flag set.
    Recent(u32),
    /// A message was permanently removed; later sequence numbers shift down by one.
    Expunge(Seq),
    /// Any other untagged response.
    Other(Reply),
}

impl From<&Reply> for UnsolicitedResponse {
    fn from(reply: &Reply) -> Self {
        match reply.parsed() {
            Response::MailboxData(MailboxDatum::Exists(n)) => UnsolicitedResponse::Exists(*n),
            Response::MailboxData(MailboxDatum::Recent(n)) => UnsolicitedResponse::Recent(*n),
            Response::Expunge(n) => UnsolicitedResponse::Expunge(*n),
            _ => UnsolicitedResponse::Other(reply.clone()),
        }
    }
}

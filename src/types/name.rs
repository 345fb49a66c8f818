use imap_proto::types::NameAttribute;
use imap_proto::{MailboxDatum, Response};

use crate::types::ResponseData;
use crate::utf7;

/// A name that matches a `LIST` or `LSUB` command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Name {
    attributes: Vec<String>,
    delimiter: Option<String>,
    name: String,
}

impl Name {
    /// Extracts a name from a `LIST`/`LSUB` response, decoding the mailbox name from modified
    /// UTF-7. Returns `None` for any other response.
    ///
    /// A name that is not valid modified UTF-7 is kept as sent.
    pub(crate) fn from_mailbox_data(resp: &ResponseData) -> Option<Self> {
        match resp.parsed() {
            Response::MailboxData(MailboxDatum::List {
                name_attributes,
                delimiter,
                name,
            }) => Some(Name {
                attributes: name_attributes.iter().map(attribute_name).collect(),
                delimiter: delimiter.as_ref().map(|d| d.to_string()),
                name: utf7::decode(name).unwrap_or_else(|err| {
                    log::warn!("{}", err);
                    name.to_string()
                }),
            }),
            _ => None,
        }
    }

    /// Attributes of this name, such as `\Noselect` or `\HasChildren`.
    pub fn attributes(&self) -> &[String] {
        &self.attributes[..]
    }

    /// The hierarchy delimiter is a character used to delimit levels of hierarchy in a mailbox
    /// name.  A client can use it to create child mailboxes, and to search higher or lower levels
    /// of naming hierarchy.  All children of a top-level hierarchy node use the same
    /// separator character.  `None` means that no hierarchy exists; the name is a "flat" name.
    pub fn delimiter(&self) -> Option<&str> {
        self.delimiter.as_deref()
    }

    /// The name represents an unambiguous left-to-right hierarchy, and are valid for use as a
    /// reference in `LIST` and `LSUB` commands. Unless `\Noselect` is indicated, the name is
    /// also valid as an argument for commands, such as `SELECT`, that accept mailbox names.
    pub fn name(&self) -> &str {
        &self.name
    }
}

fn attribute_name(attribute: &NameAttribute<'_>) -> String {
    match attribute {
        NameAttribute::NoInferiors => "\\Noinferiors".into(),
        NameAttribute::NoSelect => "\\Noselect".into(),
        NameAttribute::Marked => "\\Marked".into(),
        NameAttribute::Unmarked => "\\Unmarked".into(),
        NameAttribute::All => "\\All".into(),
        NameAttribute::Archive => "\\Archive".into(),
        NameAttribute::Drafts => "\\Drafts".into(),
        NameAttribute::Flagged => "\\Flagged".into(),
        NameAttribute::Junk => "\\Junk".into(),
        NameAttribute::Sent => "\\Sent".into(),
        NameAttribute::Trash => "\\Trash".into(),
        NameAttribute::Extension(s) => s.to_string(),
        #[allow(unreachable_patterns)]
        other => format!("{:?}", other),
    }
}

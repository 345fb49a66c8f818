use std::fmt;
use std::rc::Rc;

use bytes::BytesMut;
use imap_proto::{RequestId, Response, Status};
use self_cell::self_cell;

self_cell!(
    /// A parsed server response together with the line it was parsed from.
    pub struct ResponseData {
        owner: BytesMut,

        #[covariant]
        dependent: Response,
    }
);

/// A shared handle to a parsed response, as handed to every listener that observes it.
pub type Reply = Rc<ResponseData>;

impl std::cmp::PartialEq for ResponseData {
    fn eq(&self, other: &Self) -> bool {
        self.parsed() == other.parsed()
    }
}

impl std::cmp::Eq for ResponseData {}

impl fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseData")
            .field("raw", &self.borrow_owner().len())
            .field("response", self.borrow_dependent())
            .finish()
    }
}

impl ResponseData {
    /// The tag of the command this response completes, if it is a tagged response.
    pub fn request_id(&self) -> Option<&RequestId> {
        match self.borrow_dependent() {
            Response::Done { ref tag, .. } => Some(tag),
            _ => None,
        }
    }

    /// The parsed form of the response.
    pub fn parsed(&self) -> &Response<'_> {
        self.borrow_dependent()
    }

    /// The raw bytes of the line, including any literals and the trailing CRLF.
    pub fn raw(&self) -> &[u8] {
        self.borrow_owner()
    }

    /// Whether this is an untagged `BYE`.
    pub fn is_bye(&self) -> bool {
        matches!(
            self.parsed(),
            Response::Data {
                status: Status::Bye,
                ..
            }
        )
    }

    /// The human-readable text of a status response, or an empty string.
    pub fn information(&self) -> String {
        match self.parsed() {
            Response::Done { information, .. }
            | Response::Data { information, .. }
            | Response::Continue { information, .. } => {
                information.as_deref().unwrap_or("").to_string()
            }
            _ => String::new(),
        }
    }
}

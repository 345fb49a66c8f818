use imap_proto::RequestId;

/// Request ID generator.
///
/// Tags are the configured prefix followed by a counter of at least four digits. The counter
/// starts at one and never wraps, so a tag is never reused on a connection.
#[derive(Debug)]
pub struct IdGenerator {
    prefix: String,
    /// Last returned ID.
    next: u64,
}

impl IdGenerator {
    /// Creates a new request ID generator.
    pub fn new() -> Self {
        Self::with_prefix("A")
    }

    /// Creates a generator whose tags start with `prefix`.
    pub fn with_prefix<S: Into<String>>(prefix: S) -> Self {
        Self {
            prefix: prefix.into(),
            next: 0,
        }
    }
}

impl Default for IdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl IdGenerator {
    /// Returns the next tag.
    pub fn next_tag(&mut self) -> RequestId {
        self.next += 1;
        RequestId(format!("{}{:04}", self.prefix, self.next))
    }
}

impl Iterator for IdGenerator {
    type Item = RequestId;
    fn next(&mut self) -> Option<Self::Item> {
        Some(self.next_tag())
    }
}

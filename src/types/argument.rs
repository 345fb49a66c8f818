use chrono::{DateTime, TimeZone, Utc};

/// A command argument, serialized by the [formatter](crate::formatter).
///
/// Most arguments are built through the `From` conversions:
///
/// ```
/// use async_imap_engine::types::Argument;
///
/// let args: Vec<Argument> = vec!["INBOX".into(), 42u32.into(), vec![Argument::flag("Seen")].into()];
/// assert_eq!(args[1], Argument::Number(42));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Argument {
    /// `NIL`.
    Nil,
    /// A string, sent as an atom, a quoted string or a literal depending on its bytes.
    Str(Vec<u8>),
    /// A number; only values in `0..2^32` can be sent.
    Number(i128),
    /// A parenthesized list.
    List(Vec<Argument>),
    /// A date-time, sent in the quoted `INTERNALDATE` form in UTC.
    Time(DateTime<Utc>),
    /// A system flag or keyword, sent with a leading backslash.
    Flag(String),
    /// Text sent exactly as given, such as sequence sets and fetch item lists.
    Raw(String),
    /// Bytes that are always sent as a literal.
    Literal(Vec<u8>),
}

impl Argument {
    /// A flag such as `\Seen`, given without the backslash.
    pub fn flag<S: Into<String>>(name: S) -> Self {
        Argument::Flag(name.into())
    }

    /// Verbatim text.
    pub fn raw<S: Into<String>>(text: S) -> Self {
        Argument::Raw(text.into())
    }

    /// A payload that must be sent as a literal.
    pub fn literal<B: Into<Vec<u8>>>(bytes: B) -> Self {
        Argument::Literal(bytes.into())
    }
}

impl From<&str> for Argument {
    fn from(s: &str) -> Self {
        Argument::Str(s.as_bytes().to_vec())
    }
}

impl From<String> for Argument {
    fn from(s: String) -> Self {
        Argument::Str(s.into_bytes())
    }
}

impl From<&String> for Argument {
    fn from(s: &String) -> Self {
        Argument::Str(s.as_bytes().to_vec())
    }
}

impl From<&[u8]> for Argument {
    fn from(b: &[u8]) -> Self {
        Argument::Str(b.to_vec())
    }
}

impl From<Vec<u8>> for Argument {
    fn from(b: Vec<u8>) -> Self {
        Argument::Str(b)
    }
}

macro_rules! number_from {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Argument {
                fn from(n: $t) -> Self {
                    Argument::Number(n as i128)
                }
            }
        )*
    };
}

number_from!(u8, u16, u32, u64, usize, i8, i16, i32, i64, i128);

impl From<Vec<Argument>> for Argument {
    fn from(list: Vec<Argument>) -> Self {
        Argument::List(list)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Argument {
    fn from(time: DateTime<Tz>) -> Self {
        Argument::Time(time.with_timezone(&Utc))
    }
}

impl<T: Into<Argument>> From<Option<T>> for Argument {
    fn from(value: Option<T>) -> Self {
        value.map_or(Argument::Nil, Into::into)
    }
}

//! This module contains types used throughout the IMAP protocol.

mod argument;
pub use self::argument::Argument;

mod command;
pub use self::command::{Command, PendingCommands};

mod id_generator;
pub(crate) use self::id_generator::IdGenerator;

mod name;
pub use self::name::Name;

mod response_data;
pub use self::response_data::{Reply, ResponseData};

mod unsolicited;
pub use self::unsolicited::UnsolicitedResponse;

mod thirdparty;
pub use self::thirdparty::*;

/// Message sequence numbers are 32-bit unsigned integers.
pub type Seq = u32;

/// UIDs are 32-bit unsigned integers too.
pub type Uid = u32;

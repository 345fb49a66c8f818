//! Contains types that are from third-party dependencies that are used in the public API

use chrono::{DateTime, FixedOffset};

/// TlsStream re-exports [`async_native_tls::TlsStream`].
pub type TlsStream<T> = async_native_tls::TlsStream<T>;

/// TcpStream re-exports [`async_std::net::TcpStream`].
pub type TcpStream = async_std::net::TcpStream;

/// FixedOffsetDateTime is an alias for a fixed-offset ([`FixedOffset`]) [`DateTime`]
pub type FixedOffsetDateTime = DateTime<FixedOffset>;

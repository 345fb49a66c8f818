use std::fmt;
use std::io;

use async_channel::{Receiver, Sender};
use bytes::BytesMut;
use futures::future::{self, Either};
use futures::io::{AsyncRead as Read, AsyncReadExt, AsyncWrite as Write, AsyncWriteExt};
use once_cell::sync::Lazy;
use regex::bytes::Regex;

use crate::connection::{Connection, Transport};
use crate::error::{Error, ParseError, Result};

static LITERAL_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([0-9]+)\}$").unwrap());

/// Splits the inbound byte stream into logical response lines.
///
/// A line ends at a CRLF that is not part of a literal: when the text before a CRLF ends with
/// `{N}`, the next N bytes belong to the line no matter what they contain.
#[derive(Debug, Default)]
pub struct LineAssembler {
    buffer: BytesMut,
    /// Where to continue looking for the end of the current line.
    scan_from: usize,
}

impl LineAssembler {
    const MAX_CAPACITY: usize = 512 * 1024 * 1024; // 512 MiB

    /// Creates an empty assembler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bytes waiting to be assembled.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Appends received bytes.
    pub fn push(&mut self, data: &[u8]) -> Result<()> {
        let total = self.buffer.len() + data.len();
        if total > Self::MAX_CAPACITY {
            return Err(ParseError::TooLarge(total).into());
        }
        self.buffer.extend_from_slice(data);
        Ok(())
    }

    /// Removes and returns the next complete line, CRLF included, if there is one.
    pub fn next_line(&mut self) -> Result<Option<BytesMut>> {
        let mut from = self.scan_from;
        loop {
            if from > self.buffer.len() {
                self.scan_from = from;
                return Ok(None);
            }
            let end = match self.buffer[from..].windows(2).position(|w| w == b"\r\n") {
                Some(pos) => from + pos,
                None => {
                    // a CR at the very end may be completed by the next read
                    self.scan_from = from.max(self.buffer.len().saturating_sub(1));
                    return Ok(None);
                }
            };
            match literal_len(&self.buffer[..end])? {
                Some(len) => from = end + 2 + len,
                None => {
                    self.scan_from = 0;
                    return Ok(Some(self.buffer.split_to(end + 2)));
                }
            }
        }
    }
}

fn literal_len(line: &[u8]) -> Result<Option<usize>> {
    if line.last() != Some(&b'}') {
        return Ok(None);
    }
    let digits = match LITERAL_REGEX.captures(line).and_then(|cap| cap.get(1)) {
        Some(digits) => digits.as_bytes(),
        None => return Ok(None),
    };
    std::str::from_utf8(digits)
        .ok()
        .and_then(|d| d.parse::<usize>().ok())
        .filter(|len| *len <= LineAssembler::MAX_CAPACITY)
        .map(Some)
        .ok_or_else(|| ParseError::TooLarge(usize::MAX).into())
}

/// A [`Transport`] that queues outbound bytes for an [`ImapStream`].
#[derive(Debug, Clone)]
pub struct ChannelTransport {
    sender: Sender<Vec<u8>>,
}

impl ChannelTransport {
    pub(crate) fn new() -> (Self, Receiver<Vec<u8>>) {
        let (sender, receiver) = async_channel::unbounded();
        (ChannelTransport { sender }, receiver)
    }
}

impl Transport for ChannelTransport {
    fn write_bytes(&self, data: &[u8]) -> io::Result<()> {
        self.sender
            .try_send(data.to_vec())
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "connection closed"))
    }

    fn close(&self) {
        self.sender.close();
    }
}

/// Drives a [`Connection`] over an async byte stream.
///
/// Nothing is read or written until [`ImapStream::run`] is polled. It is usually run on the same
/// task as the code issuing commands, e.g. with `futures::join!`.
pub struct ImapStream<T> {
    inner: T,
    connection: Connection,
    outbound: Receiver<Vec<u8>>,
}

impl<T> fmt::Debug for ImapStream<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapStream")
            .field("connection", &self.connection)
            .field("queued", &self.outbound.len())
            .finish()
    }
}

impl<T: Read + Write + Unpin> ImapStream<T> {
    pub(crate) fn new(inner: T, connection: Connection, outbound: Receiver<Vec<u8>>) -> Self {
        ImapStream {
            inner,
            connection,
            outbound,
        }
    }

    /// Reads from and writes to the stream until either side closes.
    ///
    /// Reaching the end of the stream unbinds the connection, so outstanding commands fail
    /// unless the session was being logged out. I/O errors fail the whole connection and are
    /// returned as well.
    pub async fn run(self) -> Result<()> {
        let ImapStream {
            inner,
            connection,
            outbound,
        } = self;
        let (mut reader, mut writer) = inner.split();

        let read_loop = async {
            let mut buf = vec![0u8; 4096];
            loop {
                let n = reader.read(&mut buf).await?;
                if n == 0 {
                    log::debug!("server closed the connection");
                    return Ok::<_, io::Error>(());
                }
                connection.receive_data(&buf[..n]);
            }
        };

        let write_loop = async {
            while let Ok(chunk) = outbound.recv().await {
                writer.write_all(&chunk).await?;
                writer.flush().await?;
            }
            writer.close().await
        };

        futures::pin_mut!(read_loop);
        futures::pin_mut!(write_loop);
        match future::select(read_loop, write_loop).await {
            Either::Left((res, write_loop)) => {
                finish(&connection, res)?;
                // the connection is closed by now; flush what was queued before that
                if let Err(err) = write_loop.await {
                    log::debug!("unable to flush after the server closed: {}", err);
                }
                Ok(())
            }
            Either::Right((res, _)) => finish(&connection, res),
        }
    }
}

fn finish(connection: &Connection, res: io::Result<()>) -> Result<()> {
    match res {
        Ok(()) => {
            connection.unbind();
            Ok(())
        }
        Err(err) => {
            let err = Error::from(err);
            connection.fail_all(err.clone());
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn lines(chunks: &[&[u8]]) -> Vec<Vec<u8>> {
        let mut assembler = LineAssembler::new();
        let mut out = Vec::new();
        for chunk in chunks {
            assembler.push(chunk).unwrap();
            while let Some(line) = assembler.next_line().unwrap() {
                out.push(line.to_vec());
            }
        }
        out
    }

    #[test]
    fn splits_plain_lines() {
        assert_eq!(
            lines(&[&b"* OK hi\r\nA0001 OK done\r\n* partial"[..]]),
            vec![b"* OK hi\r\n".to_vec(), b"A0001 OK done\r\n".to_vec()]
        );
    }

    #[test]
    fn literals_are_part_of_the_line() {
        let data: &[u8] = b"LOGIN {3}\r\njoe{5}blogs\r\n";
        assert_eq!(lines(&[data]), vec![data.to_vec()]);
    }

    #[test]
    fn literals_may_contain_line_breaks() {
        let data: &[u8] = b"* 1 FETCH (BODY[] {7}\r\na\r\nb\r\nc)\r\n";
        assert_eq!(lines(&[data]), vec![data.to_vec()]);
    }

    #[test]
    fn any_split_gives_the_same_lines() {
        let data: &[u8] = b"LOGIN {3}\r\njoe{5}blogs\r\n* 2 EXISTS\r\n";
        let expected = vec![
            b"LOGIN {3}\r\njoe{5}blogs\r\n".to_vec(),
            b"* 2 EXISTS\r\n".to_vec(),
        ];
        for i in 0..data.len() {
            for j in i..data.len() {
                assert_eq!(
                    lines(&[&data[..i], &data[i..j], &data[j..]]),
                    expected,
                    "split at {} and {}",
                    i,
                    j
                );
            }
        }
    }

    #[test]
    fn oversized_input_is_rejected() {
        let mut assembler = LineAssembler::new();
        assembler.push(b"* 1 FETCH (BODY[] {999999999999}\r\n").unwrap();
        assert!(matches!(
            assembler.next_line(),
            Err(Error::Parse(ParseError::TooLarge(_)))
        ));
    }

    #[test]
    fn closed_channels_refuse_writes() {
        let (transport, receiver) = ChannelTransport::new();
        transport.write_bytes(b"A0001 NOOP\r\n").unwrap();
        transport.close();
        assert!(transport.write_bytes(b"A0002 NOOP\r\n").is_err());
        assert_eq!(receiver.try_recv().unwrap(), b"A0001 NOOP\r\n".to_vec());
        assert!(receiver.try_recv().is_err());
    }
}

use std::cell::{Cell, RefCell};
use std::cmp::min;
use std::pin::Pin;
use std::rc::Rc;

use futures::io::{AsyncRead as Read, AsyncWrite as Write, Error, ErrorKind, Result};
use futures::task::{Context, Poll};

use crate::connection::Transport;

/// A scripted server: reads return `read_buf` and then end of stream, writes are recorded.
///
/// Every read first yields once, so a driver polling reads and writes side by side gets to
/// flush its writes in between.
#[derive(Default, Clone, Debug)]
pub struct MockStream {
    read_buf: Vec<u8>,
    read_pos: usize,
    written_buf: Rc<RefCell<Vec<u8>>>,
    err_on_read: bool,
    read_chunk: Option<usize>,
    yielded: bool,
}

impl MockStream {
    pub fn new(read_buf: Vec<u8>) -> MockStream {
        MockStream::default().with_buf(read_buf)
    }

    pub fn with_buf(mut self, read_buf: Vec<u8>) -> MockStream {
        self.read_buf = read_buf;
        self
    }

    pub fn with_err(mut self) -> MockStream {
        self.err_on_read = true;
        self
    }

    /// Hands out at most `size` bytes per read.
    pub fn with_chunks(mut self, size: usize) -> MockStream {
        self.read_chunk = Some(size);
        self
    }

    /// Everything written so far, by this handle or any clone of it.
    pub fn written(&self) -> Vec<u8> {
        self.written_buf.borrow().clone()
    }
}

impl Read for MockStream {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut [u8],
    ) -> Poll<Result<usize>> {
        if !self.yielded {
            self.yielded = true;
            cx.waker().wake_by_ref();
            return Poll::Pending;
        }
        self.yielded = false;

        if self.err_on_read {
            return Poll::Ready(Err(Error::new(ErrorKind::Other, "MockStream Error")));
        }
        let mut write_len = min(buf.len(), self.read_buf.len() - self.read_pos);
        if let Some(chunk) = self.read_chunk {
            write_len = min(write_len, chunk);
        }
        let max_pos = self.read_pos + write_len;
        buf[..write_len].copy_from_slice(&self.read_buf[self.read_pos..max_pos]);
        self.read_pos = max_pos;
        Poll::Ready(Ok(write_len))
    }
}

impl Write for MockStream {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<Result<usize>> {
        self.written_buf.borrow_mut().extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_close(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }
}

/// A [`Transport`] that records what the connection writes.
#[derive(Default, Clone, Debug)]
pub struct MockTransport {
    written: Rc<RefCell<Vec<u8>>>,
    closes: Rc<Cell<usize>>,
}

impl MockTransport {
    pub fn written(&self) -> Vec<u8> {
        self.written.borrow().clone()
    }

    pub fn closes(&self) -> usize {
        self.closes.get()
    }
}

impl Transport for MockTransport {
    fn write_bytes(&self, data: &[u8]) -> std::io::Result<()> {
        if self.closes.get() > 0 {
            return Err(Error::new(ErrorKind::BrokenPipe, "MockTransport closed"));
        }
        self.written.borrow_mut().extend_from_slice(data);
        Ok(())
    }

    fn close(&self) {
        self.closes.set(self.closes.get() + 1);
    }
}

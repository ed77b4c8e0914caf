//! Buffered, line-delimited byte channel over a connection socket.
//!
//! Both the client-facing and the origin-facing side of the proxy talk through
//! a [`Channel`]. It offers the three primitives the request pipeline needs:
//! read one line, read exactly `n` bytes, and write everything. Any
//! `AsyncRead + AsyncWrite` stream works, which lets tests substitute
//! [`tokio::io::duplex`] pipes for sockets.

use bytes::Bytes;
use thiserror::Error;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader,
};

/// Errors produced by channel operations.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The peer closed the connection before a single byte of the line arrived.
    #[error("connection closed by peer")]
    Closed,

    /// A line exceeded the configured bound without a terminator.
    #[error("line exceeds {limit} bytes")]
    LineTooLong { limit: usize },

    /// The peer closed the connection before `expected` bytes were delivered.
    #[error("connection closed before {expected} bytes were received")]
    Truncated { expected: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A buffered bidirectional byte channel.
///
/// Reads go through an internal buffer; writes go straight to the stream.
#[derive(Debug)]
pub struct Channel<S> {
    inner: BufReader<S>,
    max_line: usize,
}

impl<S> Channel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps `stream`, bounding every [`read_line`](Self::read_line) to `max_line` bytes.
    pub fn new(stream: S, max_line: usize) -> Self {
        Self {
            inner: BufReader::new(stream),
            max_line,
        }
    }

    /// Reads one line, including its `\n` terminator.
    ///
    /// If the peer closes mid-line the partial line is returned; the next call
    /// then fails with [`ChannelError::Closed`].
    ///
    /// # Errors
    ///
    /// - [`ChannelError::Closed`]: end of stream before any byte was read.
    /// - [`ChannelError::LineTooLong`]: `max_line` bytes arrived without a `\n`.
    pub async fn read_line(&mut self) -> Result<Vec<u8>, ChannelError> {
        let mut line = Vec::new();
        let n = (&mut self.inner)
            .take(self.max_line as u64)
            .read_until(b'\n', &mut line)
            .await?;

        if n == 0 {
            return Err(ChannelError::Closed);
        }
        if n == self.max_line && !line.ends_with(b"\n") {
            return Err(ChannelError::LineTooLong {
                limit: self.max_line,
            });
        }
        Ok(line)
    }

    /// Reads exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ChannelError::Truncated`] if the stream ends first.
    pub async fn read_exact(&mut self, len: usize) -> Result<Bytes, ChannelError> {
        let mut buf = vec![0u8; len];
        match self.inner.read_exact(&mut buf).await {
            Ok(_) => Ok(Bytes::from(buf)),
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                Err(ChannelError::Truncated { expected: len })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Writes all of `buf` to the stream.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), ChannelError> {
        self.inner.get_mut().write_all(buf).await?;
        Ok(())
    }

    /// Flushes buffered writes in the underlying stream.
    pub async fn flush(&mut self) -> Result<(), ChannelError> {
        self.inner.get_mut().flush().await?;
        Ok(())
    }

    /// Copies `reader` into the stream until `reader` reaches end of file.
    ///
    /// Returns the number of bytes copied.
    pub async fn copy_from<R>(&mut self, reader: &mut R) -> Result<u64, ChannelError>
    where
        R: AsyncRead + Unpin + ?Sized,
    {
        Ok(tokio::io::copy(reader, self.inner.get_mut()).await?)
    }

    /// Shuts down the write half of the stream.
    pub async fn shutdown(&mut self) -> Result<(), ChannelError> {
        self.inner.get_mut().shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn reads_lines_then_closed() {
        let (near, mut far) = tokio::io::duplex(1024);
        far.write_all(b"GET / HTTP/1.0\r\nHost: a\r\n\r\n").await.unwrap();
        drop(far);

        let mut ch = Channel::new(near, 64);
        assert_eq!(ch.read_line().await.unwrap(), b"GET / HTTP/1.0\r\n");
        assert_eq!(ch.read_line().await.unwrap(), b"Host: a\r\n");
        assert_eq!(ch.read_line().await.unwrap(), b"\r\n");
        assert!(matches!(ch.read_line().await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn partial_line_before_eof_is_returned() {
        let (near, mut far) = tokio::io::duplex(1024);
        far.write_all(b"no terminator").await.unwrap();
        drop(far);

        let mut ch = Channel::new(near, 64);
        assert_eq!(ch.read_line().await.unwrap(), b"no terminator");
        assert!(matches!(ch.read_line().await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn overlong_line_is_rejected() {
        let (near, mut far) = tokio::io::duplex(1024);
        far.write_all(&[b'a'; 100]).await.unwrap();

        let mut ch = Channel::new(near, 16);
        assert!(matches!(
            ch.read_line().await,
            Err(ChannelError::LineTooLong { limit: 16 })
        ));
    }

    #[tokio::test]
    async fn line_of_exactly_the_limit_is_accepted() {
        let (near, mut far) = tokio::io::duplex(1024);
        far.write_all(b"abc\r\n").await.unwrap();

        let mut ch = Channel::new(near, 5);
        assert_eq!(ch.read_line().await.unwrap(), b"abc\r\n");
    }

    #[tokio::test]
    async fn read_exact_after_lines_uses_buffered_bytes() {
        let (near, mut far) = tokio::io::duplex(1024);
        far.write_all(b"Content-length: 5\r\n\r\nhello").await.unwrap();

        let mut ch = Channel::new(near, 64);
        ch.read_line().await.unwrap();
        ch.read_line().await.unwrap();
        assert_eq!(&ch.read_exact(5).await.unwrap()[..], b"hello");
    }

    #[tokio::test]
    async fn read_exact_reports_truncation() {
        let (near, mut far) = tokio::io::duplex(1024);
        far.write_all(b"abc").await.unwrap();
        drop(far);

        let mut ch = Channel::new(near, 64);
        assert!(matches!(
            ch.read_exact(10).await,
            Err(ChannelError::Truncated { expected: 10 })
        ));
    }

    #[tokio::test]
    async fn writes_reach_the_peer() {
        let (near, mut far) = tokio::io::duplex(1024);
        let mut ch = Channel::new(near, 64);
        ch.write_all(b"ping").await.unwrap();
        ch.flush().await.unwrap();

        let mut buf = [0u8; 4];
        far.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");
    }
}

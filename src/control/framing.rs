//! Newline framing over byte streams.
//!
//! ```text
//! <UTF-8 JSON or text>\n
//! ```
//!
//! A line may arrive split across any number of reads, and one read may
//! carry several lines.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::error::{ControlError, ControlResult};
use super::protocol::MAX_LINE_LEN;

/// Read one line into `buf`, without its `\n`.
///
/// Bytes of an incomplete line are left in `buf`, so this is safe to use in
/// `tokio::select!`: if the future is dropped mid-line, calling it again with
/// the same buffer continues the line. The caller clears `buf` after handling
/// a complete line.
///
/// Returns [`ControlError::ConnectionClosed`] at end of stream (a trailing
/// unterminated line is discarded) and [`ControlError::LineTooLong`] once the
/// line exceeds [`MAX_LINE_LEN`].
pub async fn read_line<R>(reader: &mut R, buf: &mut Vec<u8>) -> ControlResult<()>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let available = reader.fill_buf().await?;
        if available.is_empty() {
            return Err(ControlError::ConnectionClosed);
        }

        let (consumed, complete) = match available.iter().position(|b| *b == b'\n') {
            Some(pos) => {
                buf.extend_from_slice(&available[..pos]);
                (pos + 1, true)
            }
            None => {
                buf.extend_from_slice(available);
                (available.len(), false)
            }
        };
        reader.consume(consumed);

        if buf.len() > MAX_LINE_LEN {
            return Err(ControlError::LineTooLong);
        }
        if complete {
            return Ok(());
        }
    }
}

/// Write `line` plus terminator as one buffer.
pub async fn write_line<W>(writer: &mut W, line: &str) -> ControlResult<()>
where
    W: AsyncWrite + Unpin,
{
    let mut frame = Vec::with_capacity(line.len() + 1);
    frame.extend_from_slice(line.as_bytes());
    frame.push(b'\n');
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncWriteExt, BufReader};

    #[tokio::test]
    async fn test_reads_multiple_lines_from_one_chunk() {
        let data: &[u8] = b"one\ntwo\n";
        let mut reader = BufReader::new(data);
        let mut buf = Vec::new();

        read_line(&mut reader, &mut buf).await.unwrap();
        assert_eq!(buf, b"one");
        buf.clear();
        read_line(&mut reader, &mut buf).await.unwrap();
        assert_eq!(buf, b"two");
        buf.clear();
        assert!(matches!(
            read_line(&mut reader, &mut buf).await,
            Err(ControlError::ConnectionClosed)
        ));
    }

    #[tokio::test]
    async fn test_reassembles_split_line() {
        let (mut tx, rx) = tokio::io::duplex(64);
        let mut reader = BufReader::new(rx);

        let reader_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            read_line(&mut reader, &mut buf).await.unwrap();
            buf
        });

        tx.write_all(b"{\"type\":").await.unwrap();
        tx.flush().await.unwrap();
        tokio::task::yield_now().await;
        tx.write_all(b"\"getStatus\"}\n").await.unwrap();

        assert_eq!(reader_task.await.unwrap(), b"{\"type\":\"getStatus\"}");
    }

    #[tokio::test]
    async fn test_rejects_long_line() {
        let data = vec![b'a'; MAX_LINE_LEN + 10];
        let mut reader = BufReader::new(data.as_slice());
        let mut buf = Vec::new();

        assert!(matches!(
            read_line(&mut reader, &mut buf).await,
            Err(ControlError::LineTooLong)
        ));
    }

    #[tokio::test]
    async fn test_accepts_line_at_limit() {
        let mut data = vec![b'a'; MAX_LINE_LEN];
        data.push(b'\n');
        let mut reader = BufReader::new(data.as_slice());
        let mut buf = Vec::new();

        read_line(&mut reader, &mut buf).await.unwrap();
        assert_eq!(buf.len(), MAX_LINE_LEN);
    }

    #[tokio::test]
    async fn test_write_line_appends_terminator() {
        let mut out = Vec::new();
        write_line(&mut out, "hello").await.unwrap();
        assert_eq!(out, b"hello\n");
    }
}

//! NETCONF message framing over a byte stream (RFC 6242).
//!
//! Base 1.0 peers delimit messages with `]]>]]>`. Once both sides announced
//! base 1.1 in their hellos every later message uses chunked framing:
//! `\n#<size>\n<data>` repeated, closed by `\n##\n`.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};

pub const END_OF_MESSAGE: &[u8] = b"]]>]]>";
pub const DEFAULT_MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;
const MAX_CHUNK_SIZE: u64 = u32::MAX as u64;
const MAX_CHUNK_DIGITS: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Framing {
    EndOfMessage,
    Chunked,
}

#[derive(Debug, thiserror::Error)]
pub enum FramingError {
    /// Clean end of stream between messages.
    #[error("peer closed the connection")]
    Closed,
    #[error("peer closed the connection inside a message")]
    Truncated,
    #[error("invalid chunk framing: {0}")]
    InvalidChunk(String),
    #[error("message exceeds {0} bytes")]
    TooLarge(usize),
    #[error("framing i/o failure: {0}")]
    Io(#[from] std::io::Error),
}

/// Frames `payload` for the wire.
pub fn encode_message(payload: &[u8], framing: Framing) -> Vec<u8> {
    match framing {
        Framing::EndOfMessage => {
            let mut out = Vec::with_capacity(payload.len() + END_OF_MESSAGE.len());
            out.extend_from_slice(payload);
            out.extend_from_slice(END_OF_MESSAGE);
            out
        }
        Framing::Chunked => {
            let mut out = Vec::with_capacity(payload.len() + 24);
            if !payload.is_empty() {
                out.extend_from_slice(format!("\n#{}\n", payload.len()).as_bytes());
                out.extend_from_slice(payload);
            }
            out.extend_from_slice(b"\n##\n");
            out
        }
    }
}

/// Reads one complete message and returns its payload without framing.
pub async fn read_message<R>(
    reader: &mut R,
    framing: Framing,
    limit: usize,
) -> Result<Vec<u8>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    match framing {
        Framing::EndOfMessage => read_end_of_message(reader, limit).await,
        Framing::Chunked => read_chunked(reader, limit).await,
    }
}

async fn read_end_of_message<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    loop {
        let read = reader.read_until(b'>', &mut buf).await?;
        if read == 0 {
            return if buf.iter().all(u8::is_ascii_whitespace) {
                Err(FramingError::Closed)
            } else {
                Err(FramingError::Truncated)
            };
        }
        if buf.ends_with(END_OF_MESSAGE) {
            buf.truncate(buf.len() - END_OF_MESSAGE.len());
            return Ok(buf);
        }
        if buf.len() > limit {
            return Err(FramingError::TooLarge(limit));
        }
    }
}

async fn read_chunked<R>(reader: &mut R, limit: usize) -> Result<Vec<u8>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut payload = Vec::new();
    let mut first = true;
    loop {
        match read_byte(reader).await? {
            Some(b'\n') => {}
            None if first => return Err(FramingError::Closed),
            None => return Err(FramingError::Truncated),
            Some(other) => {
                return Err(FramingError::InvalidChunk(format!(
                    "expected newline, got 0x{other:02x}"
                )))
            }
        }
        first = false;
        expect_byte(reader, b'#').await?;

        let size = match read_byte(reader).await?.ok_or(FramingError::Truncated)? {
            b'#' => {
                expect_byte(reader, b'\n').await?;
                if payload.is_empty() {
                    return Err(FramingError::InvalidChunk("message without chunks".into()));
                }
                return Ok(payload);
            }
            digit @ b'1'..=b'9' => read_chunk_size(reader, digit).await?,
            other => {
                return Err(FramingError::InvalidChunk(format!(
                    "bad chunk size start 0x{other:02x}"
                )))
            }
        };
        if payload.len() as u64 + size > limit as u64 {
            return Err(FramingError::TooLarge(limit));
        }

        let start = payload.len();
        payload.resize(start + size as usize, 0);
        reader
            .read_exact(&mut payload[start..])
            .await
            .map_err(|err| match err.kind() {
                std::io::ErrorKind::UnexpectedEof => FramingError::Truncated,
                _ => FramingError::Io(err),
            })?;
    }
}

async fn read_chunk_size<R>(reader: &mut R, first_digit: u8) -> Result<u64, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let mut size = u64::from(first_digit - b'0');
    let mut digits = 1;
    loop {
        match read_byte(reader).await?.ok_or(FramingError::Truncated)? {
            b'\n' => break,
            digit @ b'0'..=b'9' => {
                digits += 1;
                if digits > MAX_CHUNK_DIGITS {
                    return Err(FramingError::InvalidChunk("chunk size too long".into()));
                }
                size = size * 10 + u64::from(digit - b'0');
            }
            other => {
                return Err(FramingError::InvalidChunk(format!(
                    "bad chunk size byte 0x{other:02x}"
                )))
            }
        }
    }
    if size > MAX_CHUNK_SIZE {
        return Err(FramingError::InvalidChunk(format!("chunk size {size} out of range")));
    }
    Ok(size)
}

async fn read_byte<R>(reader: &mut R) -> Result<Option<u8>, FramingError>
where
    R: AsyncBufRead + Unpin,
{
    let available = reader.fill_buf().await?;
    let Some(&byte) = available.first() else {
        return Ok(None);
    };
    reader.consume(1);
    Ok(Some(byte))
}

async fn expect_byte<R>(reader: &mut R, wanted: u8) -> Result<(), FramingError>
where
    R: AsyncBufRead + Unpin,
{
    match read_byte(reader).await? {
        Some(byte) if byte == wanted => Ok(()),
        Some(byte) => Err(FramingError::InvalidChunk(format!(
            "expected 0x{wanted:02x}, got 0x{byte:02x}"
        ))),
        None => Err(FramingError::Truncated),
    }
}

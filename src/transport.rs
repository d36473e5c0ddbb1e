// src/transport.rs
// Session transport: an ordered, bidirectional message channel to one device,
// with NETCONF 1.0 end-of-message and 1.1 chunked framing.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::trace;

use crate::errors::NetconfError;

pub const EOM_DELIMITER: &[u8] = b"]]>]]>";

/// Largest message accepted from a device.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

const READ_CHUNK: usize = 8192;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("connection closed by peer")]
    Closed,
    #[error("framing error: {0}")]
    Framing(String),
    #[error("message exceeds {} bytes", MAX_MESSAGE_SIZE)]
    TooLarge,
    #[error("connect failed: {0}")]
    Connect(String),
}

impl From<TransportError> for NetconfError {
    fn from(err: TransportError) -> Self {
        NetconfError::transport(err.to_string())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Framing {
    EndOfMessage,
    Chunked,
}

/// One authenticated message channel. Replies come back in send order.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, message: &str) -> Result<(), TransportError>;

    /// Next complete message from the peer.
    async fn recv(&mut self) -> Result<String, TransportError>;

    /// Called once after the hello exchange settles the framing.
    fn set_framing(&mut self, framing: Framing);

    async fn close(&mut self) -> Result<(), TransportError>;
}

/// Framing over any reader/writer pair (TCP halves, child process pipes,
/// in-memory duplex streams).
pub struct FramedTransport<R, W> {
    reader: R,
    writer: W,
    framing: Framing,
    inbound: Deframer,
}

impl<R, W> FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(reader: R, writer: W) -> Self {
        FramedTransport {
            reader,
            writer,
            framing: Framing::EndOfMessage,
            inbound: Deframer::default(),
        }
    }

    pub fn framing(&self) -> Framing {
        self.framing
    }
}

#[async_trait]
impl<R, W> Transport for FramedTransport<R, W>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn send(&mut self, message: &str) -> Result<(), TransportError> {
        let frame = match self.framing {
            Framing::EndOfMessage => {
                let mut frame = Vec::with_capacity(message.len() + EOM_DELIMITER.len());
                frame.extend_from_slice(message.as_bytes());
                frame.extend_from_slice(EOM_DELIMITER);
                frame
            }
            Framing::Chunked => encode_chunked(message.as_bytes()),
        };
        trace!("Writing {} byte frame", frame.len());
        self.writer.write_all(&frame).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<String, TransportError> {
        loop {
            if let Some(message) = self.inbound.next_message(self.framing)? {
                return String::from_utf8(message)
                    .map_err(|e| TransportError::Framing(format!("reply is not UTF-8: {}", e)));
            }
            if self.inbound.buffered() > MAX_MESSAGE_SIZE {
                return Err(TransportError::TooLarge);
            }
            let mut chunk = [0u8; READ_CHUNK];
            let read = self.reader.read(&mut chunk).await?;
            if read == 0 {
                return Err(TransportError::Closed);
            }
            self.inbound.extend(&chunk[..read]);
        }
    }

    fn set_framing(&mut self, framing: Framing) {
        self.framing = framing;
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.writer.shutdown().await?;
        Ok(())
    }
}

pub fn encode_chunked(message: &[u8]) -> Vec<u8> {
    let mut frame = Vec::with_capacity(message.len() + 24);
    if !message.is_empty() {
        frame.extend_from_slice(format!("\n#{}\n", message.len()).as_bytes());
        frame.extend_from_slice(message);
    }
    frame.extend_from_slice(b"\n##\n");
    frame
}

/// Inbound byte buffer that splits off complete messages. Scan progress is
/// kept between reads so each byte is examined once per message.
#[derive(Debug, Default)]
pub struct Deframer {
    buffer: Vec<u8>,
    // End-of-message: bytes already searched for the delimiter.
    eom_scanned: usize,
    // Chunked: offset of the next chunk header and the payload so far.
    chunk_pos: usize,
    chunk_payload: Vec<u8>,
}

impl Deframer {
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    pub fn next_message(&mut self, framing: Framing) -> Result<Option<Vec<u8>>, TransportError> {
        match framing {
            Framing::EndOfMessage => Ok(self.next_eom()),
            Framing::Chunked => {
                let result = self.next_chunked();
                if result.is_err() {
                    self.chunk_pos = 0;
                    self.chunk_payload.clear();
                }
                result
            }
        }
    }

    /// Removes and returns the first end-of-message delimited frame, if complete.
    fn next_eom(&mut self) -> Option<Vec<u8>> {
        let start = self.eom_scanned;
        let Some(offset) = self.buffer[start..]
            .windows(EOM_DELIMITER.len())
            .position(|window| window == EOM_DELIMITER)
        else {
            // A delimiter may straddle the next read.
            self.eom_scanned = self.buffer.len().saturating_sub(EOM_DELIMITER.len() - 1);
            return None;
        };
        let end = start + offset;
        let mut message: Vec<u8> = self.buffer.drain(..end + EOM_DELIMITER.len()).collect();
        message.truncate(end);
        self.eom_scanned = 0;
        Some(message)
    }

    /// Removes and returns the first complete chunked message (RFC 6242 §4.2).
    /// Returns `Ok(None)` until the end-of-chunks marker has arrived.
    fn next_chunked(&mut self) -> Result<Option<Vec<u8>>, TransportError> {
        let buffer = &self.buffer;
        loop {
            let pos = self.chunk_pos;
            if buffer.len() < pos + 2 {
                return Ok(None);
            }
            if &buffer[pos..pos + 2] != b"\n#" {
                return Err(TransportError::Framing(format!(
                    "expected chunk header at offset {}",
                    pos
                )));
            }
            let header = pos + 2;
            match buffer.get(header).copied() {
                None => return Ok(None),
                Some(b'#') => {
                    match buffer.get(header + 1).copied() {
                        None => return Ok(None),
                        Some(b'\n') => {}
                        Some(_) => {
                            return Err(TransportError::Framing("malformed end-of-chunks marker".into()))
                        }
                    }
                    self.buffer.drain(..header + 2);
                    self.chunk_pos = 0;
                    return Ok(Some(std::mem::take(&mut self.chunk_payload)));
                }
                Some(_) => {}
            }
            let Some(newline) = buffer[header..].iter().position(|b| *b == b'\n') else {
                // chunk-size is at most 10 digits
                if buffer.len() - header > 10 {
                    return Err(TransportError::Framing("chunk size too long".into()));
                }
                return Ok(None);
            };
            let digits = &buffer[header..header + newline];
            let size = parse_chunk_size(digits).ok_or_else(|| {
                TransportError::Framing(format!(
                    "invalid chunk size '{}'",
                    String::from_utf8_lossy(digits)
                ))
            })?;
            if self.chunk_payload.len() + size > MAX_MESSAGE_SIZE {
                return Err(TransportError::TooLarge);
            }
            let data = header + newline + 1;
            if buffer.len() < data + size {
                return Ok(None);
            }
            self.chunk_payload.extend_from_slice(&buffer[data..data + size]);
            self.chunk_pos = data + size;
        }
    }
}

// chunk-size = [1-9][0-9]*, at most 4294967295.
fn parse_chunk_size(digits: &[u8]) -> Option<usize> {
    match digits.first() {
        Some(b'1'..=b'9') => {}
        _ => return None,
    }
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }
    std::str::from_utf8(digits).ok()?.parse::<u32>().ok().map(|size| size as usize)
}

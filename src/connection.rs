// ABOUTME: Provides TCP transport for the mirror link with read-exact framing
// ABOUTME: Reads typed packets into a reusable compressed buffer and writes acks

use crate::codec::{
    self, CodecError, FrameHeader, Opcode, Packet, FRAME_HEADER_LEN, KIND_COMMAND, KIND_FRAME,
    MAGIC, MAX_COMPRESSED_SLACK,
};
use std::collections::TryReserveError;
use std::io::{self, ErrorKind};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::net::TcpStream;

/// One TCP connection to the mirror server.
///
/// The stream carries frame and command packets from the server; the only
/// bytes the client ever sends back are acknowledgements. Frame payloads land
/// in a compressed buffer that is reused across packets and grown only on
/// resolution change, so the steady state performs no allocation.
///
/// Reads follow a strict read-exact discipline: each field is read in full or
/// the connection is considered lost. There is no resynchronization - after a
/// framing violation the caller must drop the connection and reconnect.
#[derive(Debug)]
pub struct Connection {
    // Write-buffered so ack bytes coalesce into a single small segment.
    stream: BufWriter<TcpStream>,

    // Reusable landing zone for compressed payloads (`Z` in the protocol).
    compressed: Vec<u8>,

    // Current payload ceiling: pixel count plus compression slack.
    max_payload: usize,
}

impl Connection {
    /// Connect to `host:port` with `TCP_NODELAY` enabled.
    ///
    /// `pixel_count` sizes the compressed buffer for the session's current
    /// resolution.
    pub async fn connect(host: &str, port: u16, pixel_count: usize) -> io::Result<Connection> {
        let stream = TcpStream::connect((host, port)).await?;
        stream.set_nodelay(true)?;

        let max_payload = pixel_count + MAX_COMPRESSED_SLACK;
        let mut compressed = Vec::new();
        compressed
            .try_reserve_exact(max_payload)
            .map_err(|_| io::Error::from(ErrorKind::OutOfMemory))?;

        Ok(Connection {
            stream: BufWriter::new(stream),
            compressed,
            max_payload,
        })
    }

    /// Grow (or shrink) the payload ceiling after a resolution change.
    ///
    /// Allocation happens before anything is installed, so a failure leaves
    /// the old buffer and ceiling untouched.
    pub fn set_frame_budget(&mut self, pixel_count: usize) -> Result<(), TryReserveError> {
        let max_payload = pixel_count + MAX_COMPRESSED_SLACK;
        if max_payload > self.compressed.capacity() {
            let want = max_payload - self.compressed.len();
            self.compressed.try_reserve_exact(want)?;
        }
        self.max_payload = max_payload;
        Ok(())
    }

    /// Read one packet from the stream.
    ///
    /// Returns `Ok(None)` when the server closes the connection cleanly on a
    /// packet boundary. A close mid-packet, a framing violation, or any I/O
    /// failure is an error; the caller treats all of them as connection loss.
    pub async fn read_packet(&mut self) -> Result<Option<Packet<'_>>, CodecError> {
        let mut magic = [0u8; 2];
        match self.stream.read_exact(&mut magic).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        if magic[0] != MAGIC {
            return Err(CodecError::BadMagic(magic[0]));
        }

        match magic[1] {
            KIND_COMMAND => {
                let opcode = self.stream.read_u8().await?;
                let mut body = [0u8; 4];
                let body_len = if opcode == Opcode::Resolution as u8 {
                    4
                } else {
                    // Every other command, known or not, carries one value byte.
                    1
                };
                self.stream.read_exact(&mut body[..body_len]).await?;
                Ok(Some(Packet::Command(codec::decode_command(
                    opcode,
                    &body[..body_len],
                ))))
            }
            KIND_FRAME => {
                let mut raw = [0u8; FRAME_HEADER_LEN];
                self.stream.read_exact(&mut raw).await?;
                let header = FrameHeader::decode(&raw);

                let length = header.length as usize;
                if length > self.max_payload {
                    return Err(CodecError::OversizedPayload {
                        length: header.length,
                        max: self.max_payload,
                    });
                }

                self.compressed.resize(length, 0);
                self.stream.read_exact(&mut self.compressed).await?;

                Ok(Some(Packet::Frame {
                    header,
                    payload: &self.compressed,
                }))
            }
            other => Err(CodecError::UnknownKind(other)),
        }
    }

    /// Write and flush an acknowledgement for `seq`.
    ///
    /// Ack bytes are the only client-to-server traffic; the server relies on
    /// them arriving in packet order, which the single buffered stream
    /// guarantees.
    pub async fn send_ack(&mut self, seq: u32) -> io::Result<()> {
        self.stream.write_all(&codec::encode_ack(seq)).await?;
        self.stream.flush().await
    }

    /// Current payload ceiling (pixel count plus compression slack).
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }
}
